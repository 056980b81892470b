//! combat_core - Discrete-event combat simulation engine
//!
//! This library provides:
//! - Simulation: event queue, clock and per-iteration reset
//! - Units with stats, resources, timers and a rotation hook
//! - Spells: cast pipeline, costs, cooldowns and metrics
//! - Auras with stacks, expiry and spell-hit observers
//! - Dots, hots and absorb shields layered on auras
//! - Outcome resolution against an attack table
//! - A parallel runner aggregating many seeded iterations

pub mod aura;
pub mod cast;
pub mod config;
pub mod cost;
pub mod damage;
pub mod defense;
pub mod dot;
pub mod error;
pub mod event;
pub mod metrics;
pub mod outcome;
pub mod prelude;
pub mod resource;
pub mod result;
pub mod runner;
pub mod shield;
pub mod sim;
pub mod spell;
pub mod stats;
pub mod timer;
pub mod types;
pub mod unit;

// Re-export core types for convenience
pub use aura::{Aura, AuraConfig};
pub use cast::{Cast, CastConfig};
pub use config::{load_encounter, parse_encounter, EncounterConfig, EngineConstants};
pub use cost::{ManaCostOptions, ResourceCostOptions, SpellCost};
pub use dot::{Dot, DotConfig, DotSnapshot, RefreshPolicy};
pub use error::{CastFailure, ConfigError};
pub use metrics::{IterationResult, SimulationResult, SpellMetrics, UnitMetrics};
pub use outcome::{OutcomeApplier, OutcomeContext};
pub use resource::ResourceKind;
pub use result::{HitOutcome, SpellResult};
pub use runner::{run_iterations, RunOptions};
pub use shield::{Shield, ShieldConfig};
pub use sim::Simulation;
pub use spell::{Spell, SpellConfig};
pub use stats::{Dynamic, Stat, Stats};
pub use timer::{Cooldown, Timer};
pub use types::{
    secs, ActionId, AuraId, DefenseType, DotId, ProcMask, ShieldId, SpellFlags, SpellId,
    SpellSchool, TimerId, UnitId, UnitKind,
};
pub use unit::{PseudoStats, Unit, UnitConfig};
