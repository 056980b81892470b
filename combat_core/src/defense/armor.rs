//! Armor - physical damage reduction scaled by attacker level

use crate::config::CombatConstants;

/// Fraction of physical damage removed by `armor` against an attacker of
/// `attacker_level`:
/// `armor / (armor + base + per_level * level)`, capped.
pub fn armor_reduction(constants: &CombatConstants, armor: f64, attacker_level: u32) -> f64 {
    if armor <= 0.0 {
        return 0.0;
    }
    let divisor = armor + constants.armor_base + constants.armor_per_level * attacker_level as f64;
    (armor / divisor).clamp(0.0, constants.max_armor_reduction)
}

/// Multiplier applied to physical damage
pub fn armor_multiplier(constants: &CombatConstants, armor: f64, attacker_level: u32) -> f64 {
    1.0 - armor_reduction(constants, armor, attacker_level)
}

/// Armor required to reach `reduction` (0..1) against `attacker_level`
pub fn armor_needed_for_reduction(
    constants: &CombatConstants,
    reduction: f64,
    attacker_level: u32,
) -> f64 {
    if reduction <= 0.0 {
        return 0.0;
    }
    if reduction >= constants.max_armor_reduction {
        return f64::INFINITY;
    }
    // reduction = armor / (armor + k)  =>  armor = reduction * k / (1 - reduction)
    let k = constants.armor_base + constants.armor_per_level * attacker_level as f64;
    reduction * k / (1.0 - reduction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_armor_no_reduction() {
        let c = CombatConstants::default();
        assert_eq!(armor_reduction(&c, 0.0, 60), 0.0);
        assert_eq!(armor_multiplier(&c, -50.0, 60), 1.0);
    }

    #[test]
    fn test_boss_armor_at_level_sixty() {
        let c = CombatConstants::default();
        // 3731 / (3731 + 400 + 5100)
        let reduction = armor_reduction(&c, 3731.0, 60);
        assert!((reduction - 0.4042).abs() < 0.001);
    }

    #[test]
    fn test_reduction_is_capped() {
        let c = CombatConstants::default();
        assert!((armor_reduction(&c, 1.0e9, 60) - c.max_armor_reduction).abs() < 1e-12);
    }

    #[test]
    fn test_armor_needed_inverts_reduction() {
        let c = CombatConstants::default();
        let armor = armor_needed_for_reduction(&c, 0.5, 60);
        assert!((armor_reduction(&c, armor, 60) - 0.5).abs() < 1e-9);
        assert!(armor_needed_for_reduction(&c, 0.9, 60).is_infinite());
    }
}
