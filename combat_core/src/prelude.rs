//! Prelude module for convenient imports
//!
//! ```rust
//! use combat_core::prelude::*;
//! ```

// Engine
pub use crate::sim::Simulation;
pub use crate::runner::{run_iterations, RunOptions};
pub use crate::config::{EncounterConfig, EngineConstants};
pub use crate::error::{CastFailure, ConfigError};

// Identity and handles
pub use crate::types::{
    secs, ActionId, AuraId, DotId, ProcMask, SpellFlags, SpellId, SpellSchool, UnitId,
};

// Building blocks
pub use crate::aura::AuraConfig;
pub use crate::cast::{Cast, CastConfig};
pub use crate::cost::{ManaCostOptions, ResourceCostOptions};
pub use crate::dot::{DotConfig, RefreshPolicy};
pub use crate::shield::ShieldConfig;
pub use crate::spell::SpellConfig;
pub use crate::unit::UnitConfig;

// Outcomes
pub use crate::outcome::OutcomeApplier;
pub use crate::result::{HitOutcome, SpellResult};
pub use crate::resource::ResourceKind;
pub use crate::stats::{Stat, Stats};
pub use crate::timer::Cooldown;
