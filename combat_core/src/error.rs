//! Error types
//!
//! Configuration problems are fatal and surface as [`ConfigError`] from
//! registration, finalization and config loading. A spell that simply cannot
//! be cast right now is not an error; [`CastFailure`] only describes why.

use std::time::Duration;

use thiserror::Error;

use crate::resource::ResourceKind;
use crate::types::ActionId;

/// Setup or configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("spell {0} has a damage or threat multiplier but no proc mask")]
    MissingProcMask(ActionId),
    #[error("spell {0} has a damage or threat multiplier but no school")]
    MissingSchool(ActionId),
    #[error("spell {0} has a cooldown timer with zero duration")]
    CooldownWithoutDuration(ActionId),
    #[error("spell {0} has a cost but no default cast")]
    CostWithoutCast(ActionId),
    #[error("spell {0} configures more than one cost type")]
    AmbiguousCost(ActionId),
    #[error("spell {0} sets both a dot and a hot")]
    DotAndHot(ActionId),
    #[error("unit {unit} exceeded the limit of {limit} registered spells")]
    TooManySpells { unit: String, limit: usize },
    #[error("spell {action}: dynamic field `{field}` must be 1 at finalize, found {value}")]
    NonDefaultDynamicField {
        action: ActionId,
        field: &'static str,
        value: f64,
    },
    #[error("spell {0} uses metric splits together with a non-zero tag")]
    SplitMetricsWithTag(ActionId),
    #[error("unit {unit} already has an aura labelled `{label}`")]
    DuplicateAuraLabel { unit: String, label: String },
    #[error("aura `{0}` registered after the simulation was finalized")]
    AuraAfterFinalize(String),
    #[error("unit `{0}` added after the simulation was finalized")]
    UnitAfterFinalize(String),
    #[error("simulation must be finalized before running")]
    NotFinalized,
    #[error("simulation is already finalized")]
    AlreadyFinalized,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Reason a cast is not possible at the current simulation time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CastFailure {
    #[error("extra cast condition failed")]
    ExtraCondition,
    #[error("cannot cast while moving")]
    Moving,
    #[error("already casting until {until:?}")]
    Hardcasting { until: Duration },
    #[error("global cooldown ready at {ready_at:?}")]
    GlobalCooldown { ready_at: Duration },
    #[error("on cooldown until {ready_at:?}")]
    Cooldown { ready_at: Duration },
    #[error("not enough {resource} (current = {current:.1}, cost = {cost:.1})")]
    InsufficientResource {
        resource: ResourceKind,
        current: f64,
        cost: f64,
    },
}
