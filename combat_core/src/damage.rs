//! Damage and healing resolution
//!
//! Pipeline for one resolution:
//!
//! 1. base amount plus bonus coefficient times school power
//! 2. attacker multipliers
//! 3. armor or partial resist (healing skips this)
//! 4. target multipliers
//! 5. outcome applier
//!
//! Dealing a result lets shields absorb, records damage taken, threat,
//! metrics and rage, then notifies auras.

use rand::Rng;
use tracing::trace;

use crate::defense::{armor_multiplier, partial_resist_multiplier};
use crate::outcome::{OutcomeApplier, OutcomeContext};
use crate::resource::{rage_from_damage_dealt, rage_from_damage_taken, ResourceKind};
use crate::result::SpellResult;
use crate::sim::Simulation;
use crate::stats::Stat;
use crate::types::{ProcMask, SpellFlags, SpellId, SpellSchool, UnitId};

/// Amount entering step 2 of the pipeline plus what steps 2-5 need
#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolution {
    pub amount: f64,
    pub attacker_multiplier: f64,
    pub snapshot_crit_chance: f64,
    pub is_healing: bool,
    pub is_periodic: bool,
}

impl Simulation {
    /// Spell and unit multipliers on the caster's side
    pub fn attacker_multiplier(&self, spell: SpellId, healing: bool) -> f64 {
        let s = self.spell(spell);
        if s.flags().contains(SpellFlags::IGNORE_ATTACKER_MODIFIERS) {
            return 1.0;
        }
        let ps = &self.unit(spell.unit).pseudo_stats;
        if healing {
            s.spell_multiplier() * ps.healing_dealt
        } else {
            s.spell_multiplier()
                * self.unit(spell.unit).school_damage_dealt_multiplier(s.school())
                * ps.damage_dealt
        }
    }

    /// Multipliers on the receiving side
    pub fn target_multiplier(&self, spell: SpellId, target: UnitId, healing: bool) -> f64 {
        let s = self.spell(spell);
        if s.flags().contains(SpellFlags::IGNORE_TARGET_MODIFIERS) {
            return 1.0;
        }
        let defender = self.unit(target);
        if healing {
            defender.pseudo_stats.healing_taken
        } else {
            defender.school_damage_taken_multiplier(s.school()) * defender.pseudo_stats.damage_taken
        }
    }

    /// `base + bonus_coefficient * power` for the caster's relevant power
    pub(crate) fn scaled_base(&self, spell: SpellId, base: f64, coefficient: f64, healing: bool) -> f64 {
        if coefficient == 0.0 {
            return base;
        }
        let caster = self.unit(spell.unit);
        let power = if healing {
            caster.healing_power()
        } else {
            caster.school_power(self.spell(spell).school())
        };
        base + coefficient * power
    }

    fn resistance_multiplier(
        &mut self,
        spell: SpellId,
        target: UnitId,
        ctx: &OutcomeContext,
        expected: bool,
    ) -> f64 {
        let s = self.spell(spell);
        if s.school() == SpellSchool::PHYSICAL {
            if s.flags().contains(SpellFlags::IGNORE_ARMOR) {
                return 1.0;
            }
            let armor = self.unit(target).stat(Stat::Armor);
            let level = self.unit(spell.unit).level();
            return armor_multiplier(&self.constants.combat, armor, level);
        }
        if !s.takes_partial_resists() {
            return 1.0;
        }
        if expected {
            1.0 - ctx.average_resist
        } else {
            let roll = self.rng.gen::<f64>();
            partial_resist_multiplier(ctx.average_resist, roll)
        }
    }

    pub(crate) fn resolve(
        &mut self,
        spell: SpellId,
        target: UnitId,
        resolution: Resolution,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let mut ctx = self.outcome_context(spell, target);
        ctx.snapshot_crit_chance = resolution.snapshot_crit_chance;

        let mut result = SpellResult {
            is_healing: resolution.is_healing,
            is_periodic: resolution.is_periodic,
            ..SpellResult::new(target)
        };
        let mut amount = resolution.amount * resolution.attacker_multiplier;
        if !resolution.is_healing {
            let resist = self.resistance_multiplier(spell, target, &ctx, applier.is_expected());
            result.resistance_multiplier = resist;
            amount *= resist;
        }
        amount *= self.target_multiplier(spell, target, resolution.is_healing);

        result.damage = amount.max(0.0);
        result.pre_outcome_damage = result.damage;
        applier.apply(&ctx, &mut result, &mut self.rng);
        result
    }

    fn calc(
        &mut self,
        spell: SpellId,
        target: UnitId,
        base: f64,
        applier: OutcomeApplier,
        is_healing: bool,
        is_periodic: bool,
    ) -> SpellResult {
        let coefficient = self.spell(spell).bonus_coefficient;
        let resolution = Resolution {
            amount: self.scaled_base(spell, base, coefficient, is_healing),
            attacker_multiplier: self.attacker_multiplier(spell, is_healing),
            snapshot_crit_chance: 0.0,
            is_healing,
            is_periodic,
        };
        self.resolve(spell, target, resolution, applier)
    }

    pub fn calc_damage(&mut self, spell: SpellId, target: UnitId, base: f64, applier: OutcomeApplier) -> SpellResult {
        self.calc(spell, target, base, applier, false, false)
    }

    pub fn calc_and_deal_damage(
        &mut self,
        spell: SpellId,
        target: UnitId,
        base: f64,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let mut result = self.calc_damage(spell, target, base, applier);
        self.deal_damage(spell, &mut result);
        result
    }

    pub fn calc_healing(&mut self, spell: SpellId, target: UnitId, base: f64, applier: OutcomeApplier) -> SpellResult {
        self.calc(spell, target, base, applier, true, false)
    }

    pub fn calc_and_deal_healing(
        &mut self,
        spell: SpellId,
        target: UnitId,
        base: f64,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let mut result = self.calc_healing(spell, target, base, applier);
        self.deal_healing(spell, &mut result);
        result
    }

    /// Periodic damage from live stats, for ticks without a snapshot
    pub fn calc_periodic_damage(
        &mut self,
        spell: SpellId,
        target: UnitId,
        base: f64,
        applier: OutcomeApplier,
    ) -> SpellResult {
        self.calc(spell, target, base, applier, false, true)
    }

    pub fn calc_and_deal_periodic_damage(
        &mut self,
        spell: SpellId,
        target: UnitId,
        base: f64,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let mut result = self.calc_periodic_damage(spell, target, base, applier);
        self.deal_damage(spell, &mut result);
        result
    }

    pub fn calc_periodic_healing(
        &mut self,
        spell: SpellId,
        target: UnitId,
        base: f64,
        applier: OutcomeApplier,
    ) -> SpellResult {
        self.calc(spell, target, base, applier, true, true)
    }

    /// Only the outcome roll, with no amount attached
    pub fn calc_outcome(&mut self, spell: SpellId, target: UnitId, applier: OutcomeApplier) -> SpellResult {
        let ctx = self.outcome_context(spell, target);
        let mut result = SpellResult::new(target);
        applier.apply(&ctx, &mut result, &mut self.rng);
        result
    }

    /// Record an amount-less result and notify auras
    pub fn deal_outcome(&mut self, spell: SpellId, result: &mut SpellResult) {
        result.damage = 0.0;
        self.deal(spell, result);
    }

    pub fn deal_damage(&mut self, spell: SpellId, result: &mut SpellResult) {
        result.is_healing = false;
        self.deal(spell, result);
    }

    pub fn deal_healing(&mut self, spell: SpellId, result: &mut SpellResult) {
        result.is_healing = true;
        self.deal(spell, result);
    }

    fn deal(&mut self, spell: SpellId, result: &mut SpellResult) {
        let target = result.target;
        let s = self.spell(spell);
        let (flags, proc_mask) = (s.flags(), s.proc_mask());
        let (spell_threat, flat_threat) = (s.threat_multiplier.get(), s.flat_threat_bonus);

        if !result.is_healing && result.damage > 0.0 {
            result.absorbed = self.absorb_damage(target, result.damage);
        }
        let taken = result.damage - result.absorbed;

        let raw_threat = if result.is_healing {
            result.damage * self.constants.combat.healing_threat_ratio
        } else {
            result.damage
        };
        let flat = if result.landed() { flat_threat } else { 0.0 };
        result.threat =
            (raw_threat * spell_threat + flat) * self.unit(spell.unit).pseudo_stats.threat_multiplier;

        if !result.is_healing {
            self.units[target.index()].damage_taken += taken;
            self.generate_rage(spell.unit, target, proc_mask, result, taken);
        }

        if !flags.contains(SpellFlags::NO_METRICS) {
            if let Some(metrics) = self.spell_mut(spell).metrics.target_mut(target) {
                metrics.record(result);
            }
        }
        if !flags.contains(SpellFlags::NO_LOGS) {
            trace!(
                sim_time = ?self.current_time,
                action = %self.spell(spell).action_id(),
                %target,
                outcome = ?result.outcome,
                amount = result.damage,
                absorbed = result.absorbed,
                healing = result.is_healing,
                periodic = result.is_periodic,
                "spell resolved"
            );
        }

        let dealt = *result;
        self.fan_out_spell_hit(spell, &dealt);
    }

    fn generate_rage(
        &mut self,
        attacker: UnitId,
        target: UnitId,
        proc_mask: ProcMask,
        result: &SpellResult,
        taken: f64,
    ) {
        let constants = &self.constants.resources;
        let a = &self.units[attacker.index()];
        if a.resources.has(ResourceKind::Rage)
            && proc_mask.matches(ProcMask::MELEE_WHITE_HIT)
            && result.landed()
            && result.damage > 0.0
        {
            let rage = rage_from_damage_dealt(constants, a.level(), result.damage);
            self.units[attacker.index()].resources.gain(ResourceKind::Rage, rage);
        }

        let constants = &self.constants.resources;
        let t = &self.units[target.index()];
        if t.resources.has(ResourceKind::Rage) && taken > 0.0 {
            let rage = rage_from_damage_taken(constants, t.level(), taken);
            self.units[target.index()].resources.gain(ResourceKind::Rage, rage);
        }
    }

    /// Replace the resistance multiplier of a result with the average one
    pub fn finalize_expected(&self, spell: SpellId, result: &mut SpellResult) {
        if !self.spell(spell).takes_partial_resists() || result.resistance_multiplier <= 0.0 {
            return;
        }
        let average = 1.0 - self.outcome_context(spell, result.target).average_resist;
        result.damage = result.damage / result.resistance_multiplier * average;
        result.resistance_multiplier = average;
    }

    /// Expected damage of one cast, `None` without a calculator
    pub fn expected_initial_damage(&mut self, spell: SpellId, target: UnitId) -> Option<f64> {
        let calc = self.spell(spell).expected_initial_damage.clone()?;
        let mut result = calc(self, spell, target, false);
        self.finalize_expected(spell, &mut result);
        Some(result.damage)
    }

    /// Expected damage of one tick computed from current stats
    pub fn expected_tick_damage(&mut self, spell: SpellId, target: UnitId) -> Option<f64> {
        let calc = self.spell(spell).expected_tick_damage.clone()?;
        let mut result = calc(self, spell, target, false);
        self.finalize_expected(spell, &mut result);
        Some(result.damage)
    }

    /// Expected damage of the next tick of the dot already on `target`
    pub fn expected_tick_damage_from_current_snapshot(&mut self, spell: SpellId, target: UnitId) -> Option<f64> {
        let calc = self.spell(spell).expected_tick_damage.clone()?;
        let mut result = calc(self, spell, target, true);
        self.finalize_expected(spell, &mut result);
        Some(result.damage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConstants;
    use crate::result::HitOutcome;
    use crate::spell::SpellConfig;
    use crate::stats::Stats;
    use crate::types::ActionId;
    use crate::unit::UnitConfig;
    use std::time::Duration;

    fn setup(school: SpellSchool, target_stats: Stats) -> (Simulation, SpellId, UnitId) {
        let mut sim = Simulation::new(EngineConstants::default(), Duration::from_secs(60));
        let player = sim
            .add_unit(UnitConfig::player("p", 60).with_stats(Stats::default().with(Stat::SpellPower, 200.0)))
            .unwrap();
        let target = sim
            .add_unit(UnitConfig::target("t", 60).with_stats(target_stats))
            .unwrap();
        let config = SpellConfig {
            bonus_coefficient: 0.5,
            ..SpellConfig::damage(ActionId::spell(1), school, ProcMask::SPELL_DAMAGE)
        };
        let spell = sim.register_spell(player, config).unwrap();
        sim.finalize().unwrap();
        (sim, spell, target)
    }

    #[test]
    fn test_pipeline_applies_coefficient_and_multipliers() {
        let (mut sim, spell, target) = setup(SpellSchool::FIRE, Stats::default());
        sim.spell_mut(spell).damage_multiplier.multiply(1.1);
        sim.unit_mut(target).pseudo_stats.school_damage_taken[crate::types::SchoolIndex::Fire.index()] = 1.2;
        let result = sim.calc_damage(spell, target, 100.0, OutcomeApplier::AlwaysHit);
        // Level 60 vs 60 with no resistance: no partial resist
        assert_eq!(result.outcome, HitOutcome::Hit);
        assert!((result.damage - 200.0 * 1.1 * 1.2).abs() < 1e-9);
        assert!((result.pre_outcome_damage - result.damage).abs() < 1e-9);
    }

    #[test]
    fn test_armor_reduces_physical() {
        let (mut sim, spell, target) =
            setup(SpellSchool::PHYSICAL, Stats::default().with(Stat::Armor, 5500.0));
        let result = sim.calc_damage(spell, target, 100.0, OutcomeApplier::AlwaysHit);
        // 5500 / (5500 + 400 + 5100) = 0.5
        assert!((result.resistance_multiplier - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_threat_and_metrics_on_deal() {
        let (mut sim, spell, target) = setup(SpellSchool::FROST, Stats::default());
        sim.spell_mut(spell).threat_multiplier.set(2.0);
        let result = sim.calc_and_deal_damage(spell, target, 50.0, OutcomeApplier::AlwaysHit);
        assert!((result.threat - result.damage * 2.0).abs() < 1e-9);
        let metrics = sim.spell_metrics(spell, target).unwrap();
        assert_eq!(metrics.hits, 1);
        assert!((metrics.total_damage - result.damage).abs() < 1e-9);
        assert!((sim.unit(target).damage_taken() - result.damage).abs() < 1e-9);
    }

    #[test]
    fn test_expected_partial_resist_uses_average() {
        let (mut sim, spell, target) =
            setup(SpellSchool::SHADOW, Stats::default().with(Stat::ShadowResistance, 75.0));
        let result = sim.calc_damage(spell, target, 100.0, OutcomeApplier::ExpectedMagicAlwaysHit);
        assert!((result.resistance_multiplier - (1.0 - 0.1875)).abs() < 1e-9);
    }

    #[test]
    fn test_expected_damage_absent_without_calculator() {
        let (mut sim, spell, target) = setup(SpellSchool::FIRE, Stats::default());
        assert_eq!(sim.expected_initial_damage(spell, target), None);
    }
}
