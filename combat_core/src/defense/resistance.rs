//! Partial resists for magic damage
//!
//! A magic hit resists 0%, 25%, 50% or 75% of its damage. The roll picks
//! between the two bins adjacent to the target's average resist so that
//! the expected resisted fraction equals that average exactly.

use crate::config::CombatConstants;

const BIN_WIDTH: f64 = 0.25;

/// Average resisted fraction from level advantage and resistance
pub fn average_resist(
    constants: &CombatConstants,
    level_delta: i32,
    resistance: f64,
    attacker_level: u32,
) -> f64 {
    let from_level = constants.partial_resist_per_level * level_delta.max(0) as f64;
    let from_resistance = if resistance > 0.0 {
        resistance / (attacker_level.max(1) as f64 * 5.0) * 0.75
    } else {
        0.0
    };
    (from_level + from_resistance).clamp(0.0, constants.max_partial_resist)
}

/// Resisted fraction for a uniform `roll` in [0, 1)
pub fn resist_bin(average: f64, roll: f64) -> f64 {
    if average <= 0.0 {
        return 0.0;
    }
    let scaled = average / BIN_WIDTH;
    let lower = scaled.floor();
    let upper_weight = scaled - lower;
    let bin = if roll < upper_weight { lower + 1.0 } else { lower };
    (bin * BIN_WIDTH).min(0.75)
}

/// Damage multiplier for a uniform `roll`
pub fn partial_resist_multiplier(average: f64, roll: f64) -> f64 {
    1.0 - resist_bin(average, roll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_level_advantage_only() {
        let c = CombatConstants::default();
        assert!((average_resist(&c, 3, 0.0, 60) - 0.06).abs() < 1e-12);
        assert_eq!(average_resist(&c, -2, 0.0, 60), 0.0);
    }

    #[test]
    fn test_resistance_term() {
        let c = CombatConstants::default();
        // 75 resistance vs level 60: 75 / 300 * 0.75
        assert!((average_resist(&c, 0, 75.0, 60) - 0.1875).abs() < 1e-12);
    }

    #[test]
    fn test_average_is_capped() {
        let c = CombatConstants::default();
        assert!((average_resist(&c, 3, 10_000.0, 60) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_bins_are_adjacent() {
        assert_eq!(resist_bin(0.1, 0.0), 0.25);
        assert_eq!(resist_bin(0.1, 0.5), 0.0);
        assert_eq!(resist_bin(0.6, 0.0), 0.75);
        assert_eq!(resist_bin(0.6, 0.9), 0.5);
        assert_eq!(resist_bin(0.75, 0.0), 0.75);
    }

    proptest! {
        #[test]
        fn prop_bin_mean_matches_average(average in 0.0f64..0.75) {
            // Integrate the roll over a fine uniform grid
            let steps = 10_000;
            let mean: f64 = (0..steps)
                .map(|i| resist_bin(average, (i as f64 + 0.5) / steps as f64))
                .sum::<f64>() / steps as f64;
            prop_assert!((mean - average).abs() < 1e-3);
        }
    }
}
