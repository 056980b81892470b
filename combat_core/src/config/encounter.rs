//! Encounter description: who fights, for how long, how many times

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{load_toml, parse_toml, ConfigError, EngineConstants};
use crate::stats::{Stat, Stats};
use crate::types::UnitKind;
use crate::unit::UnitConfig;

/// Top-level encounter file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterConfig {
    /// Encounter length in seconds
    pub duration_secs: f64,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub seed: u64,
    /// Worker threads; rayon's default when absent
    #[serde(default)]
    pub threads: Option<usize>,
    pub player: PlayerConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub constants: EngineConstants,
}

fn default_iterations() -> u32 {
    1000
}

/// The simulated character
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_label")]
    pub label: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub base_mana: f64,
    #[serde(default)]
    pub stats: BTreeMap<Stat, f64>,
}

fn default_player_label() -> String {
    "player".to_string()
}

fn default_level() -> u32 {
    60
}

/// An enemy the player attacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub label: String,
    #[serde(default = "default_target_level")]
    pub level: u32,
    #[serde(default)]
    pub armor: f64,
    /// Resistances and any other defensive stats
    #[serde(default)]
    pub stats: BTreeMap<Stat, f64>,
    #[serde(default)]
    pub can_block: bool,
    #[serde(default)]
    pub can_parry: bool,
}

fn default_target_level() -> u32 {
    63
}

impl EncounterConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(ConfigError::Validation(format!(
                "duration_secs must be positive, got {}",
                self.duration_secs
            )));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Validation(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Validation(
                "threads must be at least 1 when set".to_string(),
            ));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::Validation(
                "encounter needs at least one target".to_string(),
            ));
        }
        if self.player.level == 0 || self.targets.iter().any(|t| t.level == 0) {
            return Err(ConfigError::Validation(
                "unit levels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl PlayerConfig {
    pub fn unit_config(&self) -> UnitConfig {
        UnitConfig {
            label: self.label.clone(),
            kind: UnitKind::Player,
            level: self.level,
            stats: Stats::from(&self.stats),
            base_mana: self.base_mana,
            ..UnitConfig::default()
        }
    }
}

impl TargetConfig {
    pub fn unit_config(&self) -> UnitConfig {
        let mut stats = Stats::from(&self.stats);
        stats[Stat::Armor] += self.armor;
        UnitConfig {
            label: self.label.clone(),
            kind: UnitKind::Npc,
            level: self.level,
            stats,
            can_block: self.can_block,
            can_parry: self.can_parry,
            ..UnitConfig::default()
        }
    }
}

/// Load and validate an encounter file
pub fn load_encounter(path: &Path) -> Result<EncounterConfig, ConfigError> {
    let config: EncounterConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

/// Parse and validate an encounter from a TOML string
pub fn parse_encounter(content: &str) -> Result<EncounterConfig, ConfigError> {
    let config: EncounterConfig = parse_toml(content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        duration_secs = 180.0
        iterations = 500
        seed = 7

        [player]
        label = "mage"
        level = 60
        base_mana = 1000.0
        stats = { intellect = 250.0, spell_power = 400.0 }

        [[targets]]
        label = "boss"
        level = 63
        armor = 3731.0
        stats = { fire_resistance = 75.0 }
        can_block = true
    "#;

    #[test]
    fn test_parse_sample_encounter() {
        let config = parse_encounter(SAMPLE).unwrap();
        assert_eq!(config.iterations, 500);
        assert_eq!(config.duration(), Duration::from_secs(180));
        assert_eq!(config.targets.len(), 1);

        let player = config.player.unit_config();
        assert!((player.stats[Stat::SpellPower] - 400.0).abs() < 1e-9);

        let target = config.targets[0].unit_config();
        assert_eq!(target.kind, UnitKind::Npc);
        assert!((target.stats[Stat::Armor] - 3731.0).abs() < 1e-9);
        assert!((target.stats[Stat::FireResistance] - 75.0).abs() < 1e-9);
        assert!(target.can_block);
    }

    #[test]
    fn test_validation_rejects_empty_targets() {
        let toml = r#"
            duration_secs = 60.0
            [player]
        "#;
        let err = parse_encounter(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_zero_duration() {
        let toml = r#"
            duration_secs = 0.0
            [player]
            [[targets]]
            label = "dummy"
        "#;
        assert!(matches!(
            parse_encounter(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            parse_encounter("duration_secs = ["),
            Err(ConfigError::Parse(_))
        ));
    }
}
