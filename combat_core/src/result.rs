//! Result of resolving one spell against one target

use serde::{Deserialize, Serialize};

use crate::types::UnitId;

/// The single outcome a resolution settles on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitOutcome {
    #[default]
    Hit,
    Crit,
    Block,
    Miss,
    Dodge,
    Parry,
}

impl HitOutcome {
    /// Hit, crit and block all connect
    pub fn landed(self) -> bool {
        matches!(self, HitOutcome::Hit | HitOutcome::Crit | HitOutcome::Block)
    }
}

/// Damage or healing produced by one resolution.
///
/// A plain value: calculators return it on the stack and pass it by
/// reference to hooks, so casts never allocate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpellResult {
    pub target: UnitId,
    pub outcome: HitOutcome,
    /// Damage, or healing when `is_healing`
    pub damage: f64,
    /// Amount before the outcome applier ran
    pub pre_outcome_damage: f64,
    pub threat: f64,
    /// 1.0 when nothing was resisted
    pub resistance_multiplier: f64,
    /// Portion of `damage` soaked by shields when dealt
    pub absorbed: f64,
    pub is_healing: bool,
    pub is_periodic: bool,
}

impl SpellResult {
    pub fn new(target: UnitId) -> Self {
        SpellResult {
            target,
            outcome: HitOutcome::Hit,
            damage: 0.0,
            pre_outcome_damage: 0.0,
            threat: 0.0,
            resistance_multiplier: 1.0,
            absorbed: 0.0,
            is_healing: false,
            is_periodic: false,
        }
    }

    pub fn landed(&self) -> bool {
        self.outcome.landed()
    }

    pub fn did_crit(&self) -> bool {
        self.outcome == HitOutcome::Crit
    }

    pub fn did_block(&self) -> bool {
        self.outcome == HitOutcome::Block
    }

    pub fn is_partial_resist(&self) -> bool {
        self.resistance_multiplier < 1.0 && self.resistance_multiplier > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landed_outcomes() {
        assert!(HitOutcome::Hit.landed());
        assert!(HitOutcome::Crit.landed());
        assert!(HitOutcome::Block.landed());
        assert!(!HitOutcome::Miss.landed());
        assert!(!HitOutcome::Dodge.landed());
        assert!(!HitOutcome::Parry.landed());
    }

    #[test]
    fn test_partial_resist_detection() {
        let mut result = SpellResult::new(UnitId(1));
        assert!(!result.is_partial_resist());
        result.resistance_multiplier = 0.75;
        assert!(result.is_partial_resist());
    }
}
