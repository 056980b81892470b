//! Unit stat block
//!
//! Stats are a fixed array indexed by [`Stat`]. A unit keeps its base
//! stats and derives effective stats by applying enabled
//! [`StatDependency`] entries on top.

mod dependency;
mod dynamic;

pub use dependency::{StatDependency, StatDependencyId, StatDependencyManager};
pub use dynamic::Dynamic;

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::types::SchoolIndex;

/// Every stat a unit can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    // Primary
    Strength,
    Agility,
    Stamina,
    Intellect,
    Spirit,
    // Offensive
    AttackPower,
    RangedAttackPower,
    SpellPower,
    ArcanePower,
    FirePower,
    FrostPower,
    HolyPower,
    NaturePower,
    ShadowPower,
    HealingPower,
    /// Percent chance, 1.0 = 1%
    SpellHit,
    SpellCrit,
    MeleeHit,
    MeleeCrit,
    Mp5,
    // Pools
    Mana,
    Health,
    // Defensive
    Armor,
    BlockValue,
    Defense,
    Dodge,
    Parry,
    Block,
    // Resistances
    ArcaneResistance,
    FireResistance,
    FrostResistance,
    NatureResistance,
    ShadowResistance,
}

impl Stat {
    pub const COUNT: usize = 33;

    pub fn index(self) -> usize {
        self as usize
    }

    /// School-specific spell power stat
    pub fn school_power(school: SchoolIndex) -> Option<Stat> {
        match school {
            SchoolIndex::Physical => None,
            SchoolIndex::Arcane => Some(Stat::ArcanePower),
            SchoolIndex::Fire => Some(Stat::FirePower),
            SchoolIndex::Frost => Some(Stat::FrostPower),
            SchoolIndex::Holy => Some(Stat::HolyPower),
            SchoolIndex::Nature => Some(Stat::NaturePower),
            SchoolIndex::Shadow => Some(Stat::ShadowPower),
        }
    }

    /// Resistance stat for a magic school; physical uses armor, holy has none
    pub fn resistance(school: SchoolIndex) -> Option<Stat> {
        match school {
            SchoolIndex::Arcane => Some(Stat::ArcaneResistance),
            SchoolIndex::Fire => Some(Stat::FireResistance),
            SchoolIndex::Frost => Some(Stat::FrostResistance),
            SchoolIndex::Nature => Some(Stat::NatureResistance),
            SchoolIndex::Shadow => Some(Stat::ShadowResistance),
            SchoolIndex::Physical | SchoolIndex::Holy => None,
        }
    }
}

/// Fixed-size stat array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats([f64; Stat::COUNT]);

impl Default for Stats {
    fn default() -> Self {
        Stats([0.0; Stat::COUNT])
    }
}

impl Stats {
    /// Builder-style setter
    pub fn with(mut self, stat: Stat, value: f64) -> Self {
        self[stat] = value;
        self
    }

    pub fn from_pairs(pairs: &[(Stat, f64)]) -> Self {
        let mut stats = Stats::default();
        for &(stat, value) in pairs {
            stats[stat] += value;
        }
        stats
    }

    /// Non-zero entries, for config round-trips and logging
    pub fn to_map(&self) -> BTreeMap<Stat, f64> {
        let mut map = BTreeMap::new();
        for (i, value) in self.0.iter().enumerate() {
            if *value != 0.0 {
                if let Some(stat) = STAT_ORDER.get(i) {
                    map.insert(*stat, *value);
                }
            }
        }
        map
    }
}

impl From<&BTreeMap<Stat, f64>> for Stats {
    fn from(map: &BTreeMap<Stat, f64>) -> Self {
        let mut stats = Stats::default();
        for (stat, value) in map {
            stats[*stat] = *value;
        }
        stats
    }
}

impl Index<Stat> for Stats {
    type Output = f64;

    fn index(&self, stat: Stat) -> &f64 {
        &self.0[stat.index()]
    }
}

impl IndexMut<Stat> for Stats {
    fn index_mut(&mut self, stat: Stat) -> &mut f64 {
        &mut self.0[stat.index()]
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(mut self, rhs: Stats) -> Stats {
        self += rhs;
        self
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Stats) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += b;
        }
    }
}

const STAT_ORDER: [Stat; Stat::COUNT] = [
    Stat::Strength,
    Stat::Agility,
    Stat::Stamina,
    Stat::Intellect,
    Stat::Spirit,
    Stat::AttackPower,
    Stat::RangedAttackPower,
    Stat::SpellPower,
    Stat::ArcanePower,
    Stat::FirePower,
    Stat::FrostPower,
    Stat::HolyPower,
    Stat::NaturePower,
    Stat::ShadowPower,
    Stat::HealingPower,
    Stat::SpellHit,
    Stat::SpellCrit,
    Stat::MeleeHit,
    Stat::MeleeCrit,
    Stat::Mp5,
    Stat::Mana,
    Stat::Health,
    Stat::Armor,
    Stat::BlockValue,
    Stat::Defense,
    Stat::Dodge,
    Stat::Parry,
    Stat::Block,
    Stat::ArcaneResistance,
    Stat::FireResistance,
    Stat::FrostResistance,
    Stat::NatureResistance,
    Stat::ShadowResistance,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_order_matches_discriminants() {
        for (i, stat) in STAT_ORDER.iter().enumerate() {
            assert_eq!(stat.index(), i);
        }
    }

    #[test]
    fn test_add_and_index() {
        let a = Stats::from_pairs(&[(Stat::Intellect, 100.0), (Stat::SpellPower, 50.0)]);
        let b = Stats::default().with(Stat::SpellPower, 25.0);
        let sum = a + b;
        assert!((sum[Stat::SpellPower] - 75.0).abs() < 1e-9);
        assert!((sum[Stat::Intellect] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_map_conversion_keeps_non_zero() {
        let stats = Stats::default()
            .with(Stat::FireResistance, 75.0)
            .with(Stat::Armor, 3000.0);
        let map = stats.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(Stats::from(&map), stats);
    }

    #[test]
    fn test_school_stats() {
        assert_eq!(Stat::school_power(SchoolIndex::Fire), Some(Stat::FirePower));
        assert_eq!(Stat::school_power(SchoolIndex::Physical), None);
        assert_eq!(Stat::resistance(SchoolIndex::Holy), None);
        assert_eq!(
            Stat::resistance(SchoolIndex::Shadow),
            Some(Stat::ShadowResistance)
        );
    }
}
