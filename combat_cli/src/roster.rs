//! Demonstration roster: a shadow caster with a nuke, a rolling dot, a
//! stacking debuff and an instant-cast proc, driven by a priority rotation.

use std::time::Duration;

use combat_core::prelude::*;
use combat_core::types::SchoolIndex;
use tracing::debug;

pub const SHADOW_BOLT: ActionId = ActionId::spell(25307);
pub const CORRUPTION: ActionId = ActionId::spell(25311);

const VULNERABILITY_PER_STACK: f64 = 0.04;
const TRANCE_CHANCE: f64 = 0.05;

/// Build and finalize a simulation for `encounter`
pub fn build(encounter: &EncounterConfig) -> Result<Simulation, ConfigError> {
    let mut sim = Simulation::new(encounter.constants.clone(), encounter.duration());
    let player = sim.add_unit(encounter.player.unit_config())?;
    let mut targets = Vec::with_capacity(encounter.targets.len());
    for target in &encounter.targets {
        targets.push(sim.add_unit(target.unit_config())?);
    }

    let mut vulnerability = Vec::with_capacity(targets.len());
    for &target in &targets {
        vulnerability.push((target, sim.register_aura(target, shadow_vulnerability())?));
    }

    let trance = sim.register_aura(player, AuraConfig::new("Shadow Trance", secs(10.0)))?;
    let gcd = Duration::from_secs_f64(encounter.constants.combat.default_gcd_secs);

    let shadow_bolt = sim.register_spell(
        player,
        SpellConfig {
            mana_cost: ManaCostOptions::flat(380.0),
            cast: CastConfig::new(Cast::new(gcd, secs(3.0))).with_modify_cast(move |sim, _, cast| {
                if sim.aura(trance).is_active() {
                    cast.cast_time = Duration::ZERO;
                    sim.deactivate_aura(trance);
                }
            }),
            bonus_coefficient: 0.857,
            ..SpellConfig::damage(SHADOW_BOLT, SpellSchool::SHADOW, ProcMask::SPELL_DAMAGE)
        }
        .with_apply_effects(move |sim, target, spell| {
            let result = sim.calc_and_deal_damage(spell, target, 510.0, OutcomeApplier::MagicHitAndCrit);
            if !result.landed() {
                return;
            }
            if let Some(&(_, aura)) = vulnerability.iter().find(|(unit, _)| *unit == target) {
                sim.activate_aura(aura);
            }
        })
        .with_expected_initial_damage(|sim, spell, target, _| {
            sim.calc_damage(spell, target, 510.0, OutcomeApplier::ExpectedMagicHitAndCrit)
        }),
    )?;

    let corruption = sim.register_spell(
        player,
        SpellConfig {
            mana_cost: ManaCostOptions::flat(290.0),
            cast: CastConfig::new(Cast::instant(gcd)),
            dot: Some(
                DotConfig::new("Corruption", 6, secs(3.0))
                    .with_bonus_coefficient(0.156)
                    .with_rollover()
                    .on_snapshot(|sim, dot, rollover| sim.dot_snapshot(dot, 137.0, rollover)),
            ),
            ..SpellConfig::damage(CORRUPTION, SpellSchool::SHADOW, ProcMask::SPELL_DAMAGE)
        }
        .with_apply_effects(|sim, target, spell| {
            let mut result = sim.calc_outcome(spell, target, OutcomeApplier::MagicHit);
            if result.landed() {
                if let Some(dot) = sim.dot_on(spell, target) {
                    sim.apply_dot(dot);
                }
            }
            sim.deal_outcome(spell, &mut result);
        })
        .with_expected_tick_damage(|sim, spell, target, from_snapshot| {
            match sim.dot_on(spell, target) {
                Some(dot) if from_snapshot => {
                    sim.calc_periodic_snapshot_damage(dot, target, OutcomeApplier::ExpectedTick)
                }
                _ => {
                    let coefficient = 0.156;
                    let power = sim.unit(spell.unit).school_power(SpellSchool::SHADOW);
                    sim.calc_periodic_damage(spell, target, 137.0 + coefficient * power, OutcomeApplier::ExpectedTick)
                }
            }
        }),
    )?;

    sim.register_aura(
        player,
        AuraConfig::permanent("Nightfall")
            .on_reset(|sim, id| sim.activate_aura(id))
            .on_periodic_damage_dealt(move |sim, _, spell, result| {
                if sim.spell(spell).action_id() == CORRUPTION && result.landed() && sim.proc(TRANCE_CHANCE) {
                    sim.activate_aura(trance);
                }
            }),
    )?;

    sim.set_rotation(player, move |sim, unit| {
        let Some(target) = sim.unit(unit).current_target else {
            return;
        };
        let dot_running = sim
            .dot_on(corruption, target)
            .is_some_and(|dot| sim.dot_remaining_duration(dot) > secs(3.0));
        if !dot_running && sim.cast(corruption, Some(target)) {
            return;
        }
        if sim.cast(shadow_bolt, Some(target)) {
            return;
        }
        // Out of mana: look again after the next regen tick
        let retry = sim.current_time() + sim.constants().resources.mana_tick();
        debug!(sim_time = ?sim.current_time(), "rotation idle");
        sim.wait_until(unit, retry);
    });

    sim.finalize()?;
    Ok(sim)
}

/// Target debuff: each stack adds shadow damage taken
fn shadow_vulnerability() -> AuraConfig {
    AuraConfig::new("Shadow Vulnerability", secs(12.0))
        .with_action_id(ActionId::spell(17800))
        .with_max_stacks(5)
        .on_gain(|sim, aura| scale_shadow_taken(sim, aura, 0, 1))
        .on_stacks_change(|sim, aura, old, new| scale_shadow_taken(sim, aura, old, new))
        .on_expire(|sim, aura| {
            let stacks = sim.aura(aura).stacks();
            scale_shadow_taken(sim, aura, stacks, 0);
        })
}

fn scale_shadow_taken(sim: &mut Simulation, aura: AuraId, old: u32, new: u32) {
    let unit = sim.aura(aura).unit();
    let factor = |stacks: u32| 1.0 + VULNERABILITY_PER_STACK * f64::from(stacks);
    let taken = &mut sim.unit_mut(unit).pseudo_stats.school_damage_taken[SchoolIndex::Shadow.index()];
    *taken = *taken / factor(old) * factor(new);
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_core::config::parse_encounter;

    const DEFAULT: &str = include_str!("../encounters/default.toml");

    #[test]
    fn test_default_encounter_builds_and_runs() {
        let encounter = parse_encounter(DEFAULT).unwrap();
        let mut sim = build(&encounter).unwrap();
        let iteration = sim.run_iteration(1).unwrap();
        let warlock = &iteration.units[0];
        assert_eq!(warlock.label, "warlock");
        assert!(warlock.damage > 0.0);

        let corruption = warlock
            .spells
            .iter()
            .find(|(action, _)| *action == CORRUPTION)
            .map(|(_, m)| *m)
            .unwrap();
        assert!(corruption.ticks + corruption.crit_ticks > 0);
        assert!(iteration.units[1].damage_taken > 0.0);
    }

    #[test]
    fn test_vulnerability_stacks_and_clears() {
        let encounter = parse_encounter(DEFAULT).unwrap();
        let mut sim = build(&encounter).unwrap();
        sim.reset(3);
        let boss = sim.unit_by_label("boss").unwrap();
        let aura = sim.get_aura(boss, "Shadow Vulnerability").unwrap();
        let shadow = SchoolIndex::Shadow.index();

        for _ in 0..7 {
            sim.activate_aura(aura);
        }
        let taken = sim.unit(boss).pseudo_stats.school_damage_taken[shadow];
        assert!((taken - 1.2).abs() < 1e-9);

        sim.deactivate_aura(aura);
        let taken = sim.unit(boss).pseudo_stats.school_damage_taken[shadow];
        assert!((taken - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_expected_damage_available() {
        let encounter = parse_encounter(DEFAULT).unwrap();
        let mut sim = build(&encounter).unwrap();
        sim.reset(1);
        let player = sim.unit_by_label("warlock").unwrap();
        let boss = sim.unit_by_label("boss").unwrap();
        let bolt = sim.get_spell(player, SHADOW_BOLT).unwrap();
        let corruption = sim.get_spell(player, CORRUPTION).unwrap();

        let nuke = sim.expected_initial_damage(bolt, boss).unwrap();
        let tick = sim.expected_tick_damage(corruption, boss).unwrap();
        assert!(nuke > tick);
        assert!(tick > 0.0);
        assert!(sim.expected_initial_damage(corruption, boss).is_none());
    }
}
