//! Attack tables and outcome appliers
//!
//! Every chance a resolution needs is computed up front into an
//! [`OutcomeContext`] of plain numbers, so appliers can roll against the
//! simulation RNG without borrowing any unit.

use rand::Rng;

use crate::config::CombatConstants;
use crate::defense::average_resist;
use crate::result::{HitOutcome, SpellResult};
use crate::sim::Simulation;
use crate::spell::Spell;
use crate::stats::Stat;
use crate::types::{DefenseType, SpellFlags, SpellId, SpellSchool, UnitId};
use crate::unit::Unit;

/// Level and skill based avoidance of one attacker/defender pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttackTable {
    /// Defender level minus attacker level
    pub level_delta: i32,
    pub spell_miss: f64,
    pub melee_miss: f64,
    pub dodge: f64,
    pub parry: f64,
    pub block: f64,
    pub melee_crit_suppression: f64,
}

impl AttackTable {
    pub fn new(constants: &CombatConstants, attacker: &Unit, defender: &Unit) -> Self {
        let level_delta = defender.level() as i32 - attacker.level() as i32;
        let skill_gap = (level_delta as f64 * constants.skill_per_level).max(0.0);

        let melee_miss_per_skill = if skill_gap > constants.melee_skill_threshold {
            constants.melee_miss_per_skill_high
        } else {
            constants.melee_miss_per_skill
        };
        let avoidance = constants.base_avoidance + constants.avoidance_per_skill * skill_gap;
        let ps = &defender.pseudo_stats;

        AttackTable {
            level_delta,
            spell_miss: spell_miss(constants, level_delta),
            melee_miss: constants.base_melee_miss + melee_miss_per_skill * skill_gap,
            dodge: if ps.can_dodge {
                avoidance + defender.stat(Stat::Dodge) / 100.0
            } else {
                0.0
            },
            parry: if ps.can_parry {
                avoidance + defender.stat(Stat::Parry) / 100.0
            } else {
                0.0
            },
            block: if ps.can_block {
                avoidance + defender.stat(Stat::Block) / 100.0
            } else {
                0.0
            },
            melee_crit_suppression: constants.melee_crit_suppression_per_level
                * level_delta.max(0) as f64,
        }
    }
}

/// Base spell miss chance for a level difference
pub fn spell_miss(constants: &CombatConstants, level_delta: i32) -> f64 {
    let miss = match level_delta {
        d if d <= 2 => constants.base_spell_miss + constants.spell_miss_per_level * d as f64,
        3 => constants.spell_miss_high,
        d => constants.spell_miss_high + constants.spell_miss_per_level_high * (d - 3) as f64,
    };
    miss.clamp(constants.min_spell_miss, 0.99)
}

/// Spell crit chance of `attacker` casting `spell`, 0..1
pub fn spell_crit_chance(attacker: &Unit, spell: &Spell) -> f64 {
    ((attacker.stat(Stat::SpellCrit) + spell.bonus_crit.get()) / 100.0).clamp(0.0, 1.0)
}

/// Every chance and multiplier an applier may need
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutcomeContext {
    pub spell_hit_chance: f64,
    pub spell_crit_chance: f64,
    pub melee_miss_chance: f64,
    pub dodge_chance: f64,
    pub parry_chance: f64,
    pub block_chance: f64,
    pub block_value: f64,
    pub melee_crit_chance: f64,
    pub crit_multiplier: f64,
    pub healing_crit_multiplier: f64,
    /// Crit chance captured by a dot snapshot
    pub snapshot_crit_chance: f64,
    pub average_resist: f64,
}

impl OutcomeContext {
    fn crit(&self, healing: bool) -> f64 {
        if healing {
            self.healing_crit_multiplier
        } else {
            self.crit_multiplier
        }
    }

    /// Chance a yellow melee or ranged attack connects
    pub fn physical_land_chance(&self) -> f64 {
        (1.0 - self.melee_miss_chance - self.dodge_chance - self.parry_chance).clamp(0.0, 1.0)
    }
}

/// How a calculated amount turns into one outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeApplier {
    AlwaysHit,
    MagicHit,
    MagicCrit,
    MagicHitAndCrit,
    /// Single roll over the whole white-hit table
    MeleeWhite,
    /// Avoidance roll, then a separate crit roll
    MeleeSpecialHitAndCrit,
    RangedHitAndCrit,
    HealingCrit,
    Tick,
    /// Crit roll against the dot's snapshot crit chance
    TickSnapshotCrit,

    ExpectedMagicAlwaysHit,
    ExpectedMagicHit,
    ExpectedMagicHitAndCrit,
    ExpectedPhysicalHitAndCrit,
    ExpectedHealingCrit,
    ExpectedTick,
    ExpectedTickSnapshotCrit,
}

impl OutcomeApplier {
    /// Expected appliers scale by probabilities instead of rolling
    pub fn is_expected(self) -> bool {
        matches!(
            self,
            OutcomeApplier::ExpectedMagicAlwaysHit
                | OutcomeApplier::ExpectedMagicHit
                | OutcomeApplier::ExpectedMagicHitAndCrit
                | OutcomeApplier::ExpectedPhysicalHitAndCrit
                | OutcomeApplier::ExpectedHealingCrit
                | OutcomeApplier::ExpectedTick
                | OutcomeApplier::ExpectedTickSnapshotCrit
        )
    }

    pub fn apply<R: Rng + ?Sized>(self, ctx: &OutcomeContext, result: &mut SpellResult, rng: &mut R) {
        let healing = result.is_healing;
        match self {
            OutcomeApplier::AlwaysHit | OutcomeApplier::Tick => hit(result),
            OutcomeApplier::MagicHit => {
                if rng.gen::<f64>() < ctx.spell_hit_chance {
                    hit(result)
                } else {
                    miss(result, HitOutcome::Miss)
                }
            }
            OutcomeApplier::MagicCrit => {
                roll_crit(result, ctx.spell_crit_chance, ctx.crit(healing), rng)
            }
            OutcomeApplier::MagicHitAndCrit => {
                if rng.gen::<f64>() < ctx.spell_hit_chance {
                    roll_crit(result, ctx.spell_crit_chance, ctx.crit(healing), rng)
                } else {
                    miss(result, HitOutcome::Miss)
                }
            }
            OutcomeApplier::MeleeWhite => {
                let roll = rng.gen::<f64>();
                let mut threshold = ctx.melee_miss_chance;
                if roll < threshold {
                    return miss(result, HitOutcome::Miss);
                }
                threshold += ctx.dodge_chance;
                if roll < threshold {
                    return miss(result, HitOutcome::Dodge);
                }
                threshold += ctx.parry_chance;
                if roll < threshold {
                    return miss(result, HitOutcome::Parry);
                }
                threshold += ctx.block_chance;
                if roll < threshold {
                    return block(result, ctx.block_value);
                }
                threshold += ctx.melee_crit_chance;
                if roll < threshold {
                    crit(result, ctx.crit_multiplier)
                } else {
                    hit(result)
                }
            }
            OutcomeApplier::MeleeSpecialHitAndCrit => {
                let roll = rng.gen::<f64>();
                let mut threshold = ctx.melee_miss_chance;
                if roll < threshold {
                    return miss(result, HitOutcome::Miss);
                }
                threshold += ctx.dodge_chance;
                if roll < threshold {
                    return miss(result, HitOutcome::Dodge);
                }
                threshold += ctx.parry_chance;
                if roll < threshold {
                    return miss(result, HitOutcome::Parry);
                }
                threshold += ctx.block_chance;
                if roll < threshold {
                    return block(result, ctx.block_value);
                }
                roll_crit(result, ctx.melee_crit_chance, ctx.crit_multiplier, rng)
            }
            OutcomeApplier::RangedHitAndCrit => {
                if rng.gen::<f64>() < ctx.melee_miss_chance {
                    miss(result, HitOutcome::Miss)
                } else {
                    roll_crit(result, ctx.melee_crit_chance, ctx.crit_multiplier, rng)
                }
            }
            OutcomeApplier::HealingCrit => {
                roll_crit(result, ctx.spell_crit_chance, ctx.healing_crit_multiplier, rng)
            }
            OutcomeApplier::TickSnapshotCrit => {
                roll_crit(result, ctx.snapshot_crit_chance, ctx.crit(healing), rng)
            }

            OutcomeApplier::ExpectedMagicAlwaysHit | OutcomeApplier::ExpectedTick => hit(result),
            OutcomeApplier::ExpectedMagicHit => {
                result.damage *= ctx.spell_hit_chance;
                result.outcome = HitOutcome::Hit;
            }
            OutcomeApplier::ExpectedMagicHitAndCrit => {
                result.damage *=
                    ctx.spell_hit_chance * average_crit(ctx.spell_crit_chance, ctx.crit(healing));
                result.outcome = HitOutcome::Hit;
            }
            OutcomeApplier::ExpectedPhysicalHitAndCrit => {
                result.damage *= ctx.physical_land_chance()
                    * average_crit(ctx.melee_crit_chance, ctx.crit_multiplier);
                result.outcome = HitOutcome::Hit;
            }
            OutcomeApplier::ExpectedHealingCrit => {
                result.damage *= average_crit(ctx.spell_crit_chance, ctx.healing_crit_multiplier);
                result.outcome = HitOutcome::Hit;
            }
            OutcomeApplier::ExpectedTickSnapshotCrit => {
                result.damage *= average_crit(ctx.snapshot_crit_chance, ctx.crit(healing));
                result.outcome = HitOutcome::Hit;
            }
        }
    }
}

fn average_crit(chance: f64, multiplier: f64) -> f64 {
    1.0 + chance.clamp(0.0, 1.0) * (multiplier - 1.0)
}

fn hit(result: &mut SpellResult) {
    result.outcome = HitOutcome::Hit;
}

fn crit(result: &mut SpellResult, multiplier: f64) {
    result.outcome = HitOutcome::Crit;
    result.damage *= multiplier;
}

fn miss(result: &mut SpellResult, outcome: HitOutcome) {
    result.outcome = outcome;
    result.damage = 0.0;
}

fn block(result: &mut SpellResult, block_value: f64) {
    result.outcome = HitOutcome::Block;
    result.damage = (result.damage - block_value).max(0.0);
}

fn roll_crit<R: Rng + ?Sized>(result: &mut SpellResult, chance: f64, multiplier: f64, rng: &mut R) {
    if rng.gen::<f64>() < chance {
        crit(result, multiplier)
    } else {
        hit(result)
    }
}

impl Simulation {
    /// Chances for `spell` against `target` from current stats
    pub fn outcome_context(&self, spell: SpellId, target: UnitId) -> OutcomeContext {
        let constants = &self.constants.combat;
        let s = self.spell(spell);
        let attacker = self.unit(spell.unit);
        let defender = self.unit(target);
        let table = AttackTable::new(constants, attacker, defender);

        let avg_resist = if s.school().is_empty() || s.school() == SpellSchool::PHYSICAL {
            0.0
        } else {
            average_resist(
                constants,
                table.level_delta,
                defender.resistance(s.school()),
                attacker.level(),
            )
        };

        let spell_hit = attacker.stat(Stat::SpellHit) + s.bonus_hit.get();
        let mut spell_hit_chance =
            (1.0 - (table.spell_miss - spell_hit / 100.0).max(constants.min_spell_miss)).clamp(0.0, 1.0);
        if s.flags().contains(SpellFlags::BINARY) {
            spell_hit_chance *= 1.0 - avg_resist;
        }

        let melee_hit = attacker.stat(Stat::MeleeHit) + s.bonus_hit.get();
        let melee_miss_chance = (table.melee_miss - melee_hit / 100.0).max(0.0);
        let melee_crit_chance = ((attacker.stat(Stat::MeleeCrit) + s.bonus_crit.get()) / 100.0
            - table.melee_crit_suppression)
            .clamp(0.0, 1.0);

        let physical_defense = matches!(s.defense_type(), DefenseType::Melee | DefenseType::Ranged);
        let (dodge, parry, block) = match s.defense_type() {
            DefenseType::Melee => (table.dodge, table.parry, table.block),
            DefenseType::Ranged => (0.0, 0.0, table.block),
            _ => (0.0, 0.0, 0.0),
        };
        let base_crit = if physical_defense || s.school() == SpellSchool::PHYSICAL {
            constants.physical_crit_multiplier
        } else {
            constants.spell_crit_multiplier
        };
        let bonus = s.crit_damage_bonus.get();

        OutcomeContext {
            spell_hit_chance,
            spell_crit_chance: spell_crit_chance(attacker, s),
            melee_miss_chance,
            dodge_chance: dodge,
            parry_chance: parry,
            block_chance: block,
            block_value: defender.stat(Stat::BlockValue),
            melee_crit_chance,
            crit_multiplier: 1.0 + (base_crit - 1.0) * bonus,
            healing_crit_multiplier: 1.0 + (constants.healing_crit_multiplier - 1.0) * bonus,
            snapshot_crit_chance: 0.0,
            average_resist: avg_resist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitId;
    use crate::unit::UnitConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn context() -> OutcomeContext {
        OutcomeContext {
            spell_hit_chance: 0.83,
            spell_crit_chance: 0.2,
            melee_miss_chance: 0.08,
            dodge_chance: 0.065,
            parry_chance: 0.14,
            block_chance: 0.05,
            block_value: 40.0,
            melee_crit_chance: 0.25,
            crit_multiplier: 1.5,
            healing_crit_multiplier: 1.5,
            snapshot_crit_chance: 0.3,
            average_resist: 0.06,
        }
    }

    fn result(damage: f64) -> SpellResult {
        SpellResult {
            damage,
            ..SpellResult::new(UnitId(1))
        }
    }

    #[test]
    fn test_spell_miss_by_level() {
        let c = CombatConstants::default();
        assert!((spell_miss(&c, 0) - 0.04).abs() < 1e-12);
        assert!((spell_miss(&c, 2) - 0.06).abs() < 1e-12);
        assert!((spell_miss(&c, 3) - 0.17).abs() < 1e-12);
        assert!((spell_miss(&c, 4) - 0.28).abs() < 1e-12);
        assert!((spell_miss(&c, -10) - c.min_spell_miss).abs() < 1e-12);
    }

    #[test]
    fn test_attack_table_boss() {
        let c = CombatConstants::default();
        let attacker = Unit::new(UnitId(0), 0, UnitConfig::player("p", 60));
        let defender = Unit::new(
            UnitId(1),
            1,
            UnitConfig {
                can_parry: true,
                ..UnitConfig::target("boss", 63)
            },
        );
        let table = AttackTable::new(&c, &attacker, &defender);
        assert_eq!(table.level_delta, 3);
        // 15 skill gap is past the threshold
        assert!((table.melee_miss - 0.08).abs() < 1e-12);
        assert!((table.dodge - 0.065).abs() < 1e-12);
        assert!((table.parry - 0.065).abs() < 1e-12);
        assert_eq!(table.block, 0.0);
        assert!((table.melee_crit_suppression - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_white_table_partitions_outcomes() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..20_000 {
            let mut r = result(100.0);
            OutcomeApplier::MeleeWhite.apply(&ctx, &mut r, &mut rng);
            *counts.entry(r.outcome).or_insert(0u32) += 1;
            match r.outcome {
                HitOutcome::Miss | HitOutcome::Dodge | HitOutcome::Parry => assert_eq!(r.damage, 0.0),
                HitOutcome::Block => assert!((r.damage - 60.0).abs() < 1e-9),
                HitOutcome::Crit => assert!((r.damage - 150.0).abs() < 1e-9),
                HitOutcome::Hit => assert!((r.damage - 100.0).abs() < 1e-9),
            }
        }
        let miss = counts[&HitOutcome::Miss] as f64 / 20_000.0;
        assert!((miss - 0.08).abs() < 0.01);
        let crit = counts[&HitOutcome::Crit] as f64 / 20_000.0;
        assert!((crit - 0.25).abs() < 0.015);
    }

    #[test]
    fn test_expected_matches_average_of_rolls() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let trials = 50_000;
        let total: f64 = (0..trials)
            .map(|_| {
                let mut r = result(100.0);
                OutcomeApplier::MagicHitAndCrit.apply(&ctx, &mut r, &mut rng);
                r.damage
            })
            .sum();
        let mut expected = result(100.0);
        OutcomeApplier::ExpectedMagicHitAndCrit.apply(&ctx, &mut expected, &mut rng);
        let average = total / trials as f64;
        assert!((average - expected.damage).abs() / expected.damage < 0.01);
    }

    #[test]
    fn test_healing_crit_and_ticks() {
        let ctx = OutcomeContext {
            spell_crit_chance: 1.0,
            healing_crit_multiplier: 1.5,
            ..context()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut heal = SpellResult {
            is_healing: true,
            ..result(200.0)
        };
        OutcomeApplier::HealingCrit.apply(&ctx, &mut heal, &mut rng);
        assert!(heal.did_crit());
        assert!((heal.damage - 300.0).abs() < 1e-9);

        let mut tick = result(50.0);
        OutcomeApplier::Tick.apply(&ctx, &mut tick, &mut rng);
        assert_eq!(tick.outcome, HitOutcome::Hit);
        assert!((tick.damage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_expected_flag() {
        assert!(OutcomeApplier::ExpectedTick.is_expected());
        assert!(!OutcomeApplier::TickSnapshotCrit.is_expected());
    }
}
