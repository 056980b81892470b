//! Resource cost strategies for spells

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CastFailure, ConfigError};
use crate::resource::ResourceKind;
use crate::types::ActionId;
use crate::unit::Unit;

/// Mana cost: either a flat amount or a fraction of the caster's base mana
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManaCostOptions {
    /// Fraction of base mana, e.g. 0.21
    pub base_cost: f64,
    pub flat_cost: f64,
    /// 0 means 1
    pub multiplier: f64,
}

impl ManaCostOptions {
    pub fn flat(cost: f64) -> Self {
        ManaCostOptions {
            flat_cost: cost,
            ..Default::default()
        }
    }

    pub fn base(fraction: f64) -> Self {
        ManaCostOptions {
            base_cost: fraction,
            ..Default::default()
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.base_cost != 0.0 || self.flat_cost != 0.0
    }

    fn amount(&self, base_mana: f64) -> f64 {
        let cost = if self.flat_cost != 0.0 {
            self.flat_cost
        } else {
            self.base_cost * base_mana
        };
        cost * multiplier_or_one(self.multiplier)
    }
}

/// Energy, rage or focus cost with the fraction refunded on a miss
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCostOptions {
    pub cost: f64,
    /// Fraction of the spent amount returned by a refund
    pub refund: f64,
    /// 0 means 1
    pub multiplier: f64,
}

impl ResourceCostOptions {
    pub fn new(cost: f64) -> Self {
        ResourceCostOptions {
            cost,
            ..Default::default()
        }
    }

    pub fn with_refund(mut self, refund: f64) -> Self {
        self.refund = refund;
        self
    }

    pub(crate) fn is_set(&self) -> bool {
        self.cost != 0.0
    }

    fn amount(&self) -> f64 {
        self.cost * multiplier_or_one(self.multiplier)
    }
}

fn multiplier_or_one(multiplier: f64) -> f64 {
    if multiplier == 0.0 {
        1.0
    } else {
        multiplier
    }
}

/// Which resource a spell pays with and how refunds work
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpellCost {
    Mana,
    Energy { refund: f64 },
    Rage { refund: f64 },
    Focus { refund: f64 },
}

impl SpellCost {
    /// Pick the single configured cost and compute its amount.
    /// More than one configured cost is ambiguous.
    pub(crate) fn from_options(
        action: ActionId,
        mana: &ManaCostOptions,
        energy: &ResourceCostOptions,
        rage: &ResourceCostOptions,
        focus: &ResourceCostOptions,
        base_mana: f64,
    ) -> Result<Option<(SpellCost, f64)>, ConfigError> {
        let set = [mana.is_set(), energy.is_set(), rage.is_set(), focus.is_set()];
        if set.iter().filter(|s| **s).count() > 1 {
            return Err(ConfigError::AmbiguousCost(action));
        }
        let cost = if mana.is_set() {
            Some((SpellCost::Mana, mana.amount(base_mana)))
        } else if energy.is_set() {
            Some((SpellCost::Energy { refund: energy.refund }, energy.amount()))
        } else if rage.is_set() {
            Some((SpellCost::Rage { refund: rage.refund }, rage.amount()))
        } else if focus.is_set() {
            Some((SpellCost::Focus { refund: focus.refund }, focus.amount()))
        } else {
            None
        };
        Ok(cost)
    }

    pub fn resource(&self) -> ResourceKind {
        match self {
            SpellCost::Mana => ResourceKind::Mana,
            SpellCost::Energy { .. } => ResourceKind::Energy,
            SpellCost::Rage { .. } => ResourceKind::Rage,
            SpellCost::Focus { .. } => ResourceKind::Focus,
        }
    }

    pub fn meets_requirement(&self, unit: &Unit, cost: f64) -> bool {
        cost <= 0.0 || unit.resources().current(self.resource()) >= cost
    }

    pub fn cost_failure_reason(&self, unit: &Unit, cost: f64) -> CastFailure {
        CastFailure::InsufficientResource {
            resource: self.resource(),
            current: unit.resources().current(self.resource()),
            cost,
        }
    }

    /// Returns the amount removed from the pool
    pub fn spend_cost(&self, unit: &mut Unit, cost: f64, now: Duration) -> f64 {
        unit.resources.spend(self.resource(), cost, now)
    }

    /// Mana refunds the whole spent amount; other resources their refund fraction
    pub fn issue_refund(&self, unit: &mut Unit, spent: f64) -> f64 {
        let amount = match self {
            SpellCost::Mana => spent,
            SpellCost::Energy { refund } | SpellCost::Rage { refund } | SpellCost::Focus { refund } => {
                spent * refund
            }
        };
        unit.resources.refund(self.resource(), amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConstants;
    use crate::stats::{Stat, Stats};
    use crate::types::UnitId;
    use crate::unit::UnitConfig;

    fn unit_with(resource: ResourceKind, mana: f64) -> Unit {
        let mut unit = Unit::new(
            UnitId(0),
            0,
            UnitConfig::player("p", 60)
                .with_stats(Stats::default().with(Stat::Mana, mana))
                .with_resource(resource),
        );
        unit.finalize(&ResourceConstants::default());
        unit
    }

    #[test]
    fn test_mana_cost_from_base_mana() {
        let options = ManaCostOptions {
            base_cost: 0.1,
            multiplier: 0.5,
            ..Default::default()
        };
        let (cost, amount) = SpellCost::from_options(
            ActionId::spell(1),
            &options,
            &ResourceCostOptions::default(),
            &ResourceCostOptions::default(),
            &ResourceCostOptions::default(),
            2000.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(cost, SpellCost::Mana);
        assert!((amount - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_costs_are_ambiguous() {
        let err = SpellCost::from_options(
            ActionId::spell(1),
            &ManaCostOptions::flat(10.0),
            &ResourceCostOptions::new(40.0),
            &ResourceCostOptions::default(),
            &ResourceCostOptions::default(),
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousCost(_)));
    }

    #[test]
    fn test_no_cost_configured() {
        let none = SpellCost::from_options(
            ActionId::spell(1),
            &ManaCostOptions::default(),
            &ResourceCostOptions::default(),
            &ResourceCostOptions::default(),
            &ResourceCostOptions::default(),
            100.0,
        )
        .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_insufficient_mana_reason() {
        let unit = unit_with(ResourceKind::Mana, 15.0);
        let cost = SpellCost::Mana;
        assert!(!cost.meets_requirement(&unit, 20.0));
        let reason = cost.cost_failure_reason(&unit, 20.0);
        assert_eq!(reason.to_string(), "not enough mana (current = 15.0, cost = 20.0)");
    }

    #[test]
    fn test_energy_refund_fraction() {
        let mut unit = unit_with(ResourceKind::Energy, 0.0);
        let cost = SpellCost::Energy { refund: 0.8 };
        let spent = cost.spend_cost(&mut unit, 40.0, Duration::ZERO);
        assert!((spent - 40.0).abs() < 1e-9);
        let refunded = cost.issue_refund(&mut unit, spent);
        assert!((refunded - 32.0).abs() < 1e-9);
        assert!((unit.resources().current(ResourceKind::Energy) - 92.0).abs() < 1e-9);
    }

    #[test]
    fn test_mana_refund_is_full() {
        let mut unit = unit_with(ResourceKind::Mana, 500.0);
        let spent = SpellCost::Mana.spend_cost(&mut unit, 120.0, Duration::ZERO);
        SpellCost::Mana.issue_refund(&mut unit, spent);
        assert!((unit.resources().current(ResourceKind::Mana) - 500.0).abs() < 1e-9);
    }
}
