//! Tunable engine constants

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::secs;

/// All engine constants. Every field falls back to its default when absent
/// from the TOML source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConstants {
    pub combat: CombatConstants,
    pub resources: ResourceConstants,
    pub limits: EngineLimits,
}

/// Attack table, crit and mitigation constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConstants {
    /// GCD length used by content that does not override it (seconds)
    pub default_gcd_secs: f64,
    pub spell_crit_multiplier: f64,
    pub physical_crit_multiplier: f64,
    pub healing_crit_multiplier: f64,
    /// Spell miss at equal level
    pub base_spell_miss: f64,
    /// Additional spell miss per level of target advantage, up to two levels
    pub spell_miss_per_level: f64,
    /// Spell miss at three levels of target advantage
    pub spell_miss_high: f64,
    /// Additional spell miss per level beyond three
    pub spell_miss_per_level_high: f64,
    pub min_spell_miss: f64,
    pub base_melee_miss: f64,
    /// Melee miss per point of defense-over-weapon skill
    pub melee_miss_per_skill: f64,
    /// Melee miss per skill point once the gap exceeds `melee_skill_threshold`
    pub melee_miss_per_skill_high: f64,
    pub melee_skill_threshold: f64,
    /// Base dodge/parry/block chance before the skill gap
    pub base_avoidance: f64,
    pub avoidance_per_skill: f64,
    pub melee_crit_suppression_per_level: f64,
    pub skill_per_level: f64,
    pub partial_resist_per_level: f64,
    pub max_partial_resist: f64,
    pub armor_base: f64,
    pub armor_per_level: f64,
    pub max_armor_reduction: f64,
    pub healing_threat_ratio: f64,
}

impl Default for CombatConstants {
    fn default() -> Self {
        CombatConstants {
            default_gcd_secs: 1.5,
            spell_crit_multiplier: 1.5,
            physical_crit_multiplier: 2.0,
            healing_crit_multiplier: 1.5,
            base_spell_miss: 0.04,
            spell_miss_per_level: 0.01,
            spell_miss_high: 0.17,
            spell_miss_per_level_high: 0.11,
            min_spell_miss: 0.01,
            base_melee_miss: 0.05,
            melee_miss_per_skill: 0.001,
            melee_miss_per_skill_high: 0.002,
            melee_skill_threshold: 10.0,
            base_avoidance: 0.05,
            avoidance_per_skill: 0.001,
            melee_crit_suppression_per_level: 0.01,
            skill_per_level: 5.0,
            partial_resist_per_level: 0.02,
            max_partial_resist: 0.75,
            armor_base: 400.0,
            armor_per_level: 85.0,
            max_armor_reduction: 0.75,
            healing_threat_ratio: 0.5,
        }
    }
}

impl CombatConstants {
    pub fn default_gcd(&self) -> Duration {
        Duration::from_secs_f64(self.default_gcd_secs.max(0.0))
    }
}

/// Resource regeneration constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConstants {
    pub mana_tick_secs: f64,
    /// Window after spending mana during which spirit regen is suppressed
    pub five_second_rule_secs: f64,
    pub spirit_regen_base: f64,
    pub spirit_regen_per_point: f64,
    pub energy_tick_secs: f64,
    pub energy_per_tick: f64,
    pub max_energy: f64,
    pub focus_tick_secs: f64,
    pub focus_per_tick: f64,
    pub max_focus: f64,
    pub max_rage: f64,
    pub rage_dealt_factor: f64,
    pub rage_taken_factor: f64,
}

impl Default for ResourceConstants {
    fn default() -> Self {
        ResourceConstants {
            mana_tick_secs: 2.0,
            five_second_rule_secs: 5.0,
            spirit_regen_base: 12.5,
            spirit_regen_per_point: 0.25,
            energy_tick_secs: 2.0,
            energy_per_tick: 20.0,
            max_energy: 100.0,
            focus_tick_secs: 1.0,
            focus_per_tick: 5.0,
            max_focus: 100.0,
            max_rage: 100.0,
            rage_dealt_factor: 7.5,
            rage_taken_factor: 2.5,
        }
    }
}

impl ResourceConstants {
    pub fn mana_tick(&self) -> Duration {
        secs(self.mana_tick_secs)
    }

    pub fn five_second_rule(&self) -> Duration {
        secs(self.five_second_rule_secs)
    }

    pub fn energy_tick(&self) -> Duration {
        secs(self.energy_tick_secs)
    }

    pub fn focus_tick(&self) -> Duration {
        secs(self.focus_tick_secs)
    }
}

/// Safety bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Registering more spells than this on one unit is a setup error
    pub max_spells_per_unit: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        EngineLimits {
            max_spells_per_unit: 200,
        }
    }
}
