//! Configuration loading from TOML files

mod constants;
mod encounter;

pub use constants::{CombatConstants, EngineConstants, EngineLimits, ResourceConstants};
pub use encounter::{load_encounter, parse_encounter, EncounterConfig, PlayerConfig, TargetConfig};

pub use crate::error::ConfigError;

use std::fs;
use std::path::Path;

/// Read a TOML file and deserialize it
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Deserialize TOML text
pub fn parse_toml<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(content)?)
}
