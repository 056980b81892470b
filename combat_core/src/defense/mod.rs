//! Defensive mitigation: armor for physical damage, partial resists for magic

mod armor;
mod resistance;

pub use armor::{armor_multiplier, armor_needed_for_reduction, armor_reduction};
pub use resistance::{average_resist, partial_resist_multiplier, resist_bin};
