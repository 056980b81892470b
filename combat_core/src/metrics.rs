//! Metrics collection
//!
//! Spells count casts and outcomes per target during an iteration. At the
//! end of each iteration the simulation folds those counters into an
//! [`IterationResult`]; [`UnitMetrics`] aggregates iterations into running
//! statistics and [`SimulationResult`] is the serializable summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::{ResourceKind, ResourceMetrics};
use crate::result::{HitOutcome, SpellResult};
use crate::types::{ActionId, UnitId};

/// Counters for one spell against one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellMetrics {
    pub casts: u32,
    pub hits: u32,
    pub misses: u32,
    pub crits: u32,
    pub dodges: u32,
    pub parries: u32,
    pub blocks: u32,
    pub ticks: u32,
    pub crit_ticks: u32,
    pub total_damage: f64,
    pub total_healing: f64,
    pub total_threat: f64,
    pub total_shielding: f64,
}

impl SpellMetrics {
    /// Count a dealt result
    pub fn record(&mut self, result: &SpellResult) {
        if result.is_periodic {
            match result.outcome {
                HitOutcome::Crit => self.crit_ticks += 1,
                o if o.landed() => self.ticks += 1,
                _ => self.misses += 1,
            }
        } else {
            match result.outcome {
                HitOutcome::Hit => self.hits += 1,
                HitOutcome::Crit => self.crits += 1,
                HitOutcome::Block => self.blocks += 1,
                HitOutcome::Miss => self.misses += 1,
                HitOutcome::Dodge => self.dodges += 1,
                HitOutcome::Parry => self.parries += 1,
            }
        }
        if result.is_healing {
            self.total_healing += result.damage;
        } else {
            self.total_damage += result.damage;
        }
        self.total_threat += result.threat;
    }

    pub fn merge(&mut self, other: &SpellMetrics) {
        self.casts += other.casts;
        self.hits += other.hits;
        self.misses += other.misses;
        self.crits += other.crits;
        self.dodges += other.dodges;
        self.parries += other.parries;
        self.blocks += other.blocks;
        self.ticks += other.ticks;
        self.crit_ticks += other.crit_ticks;
        self.total_damage += other.total_damage;
        self.total_healing += other.total_healing;
        self.total_threat += other.total_threat;
        self.total_shielding += other.total_shielding;
    }

    /// Resolutions that connected, direct and periodic
    pub fn landed(&self) -> u32 {
        self.hits + self.crits + self.blocks + self.ticks + self.crit_ticks
    }
}

/// Per-target metrics for each split key. Key 0 is the default split.
#[derive(Debug, Clone, Default)]
pub struct SplitMetrics {
    splits: BTreeMap<i32, Vec<SpellMetrics>>,
    current: i32,
}

impl SplitMetrics {
    /// Allocate `max(num_splits, 1)` splits sized for `units` targets
    pub(crate) fn new(num_splits: usize, units: usize) -> Self {
        let splits = (0..num_splits.max(1) as i32)
            .map(|key| (key, vec![SpellMetrics::default(); units]))
            .collect();
        SplitMetrics { splits, current: 0 }
    }

    pub fn current_key(&self) -> i32 {
        self.current
    }

    /// Select the split subsequent casts are counted in; unknown keys are ignored
    pub(crate) fn set_split(&mut self, key: i32) -> bool {
        if self.splits.contains_key(&key) {
            self.current = key;
            true
        } else {
            false
        }
    }

    pub(crate) fn target_mut(&mut self, target: UnitId) -> Option<&mut SpellMetrics> {
        self.splits
            .get_mut(&self.current)
            .and_then(|v| v.get_mut(target.index()))
    }

    pub fn target(&self, key: i32, target: UnitId) -> Option<&SpellMetrics> {
        self.splits.get(&key).and_then(|v| v.get(target.index()))
    }

    /// Sum over every target for each split key
    pub fn totals(&self) -> impl Iterator<Item = (i32, SpellMetrics)> + '_ {
        self.splits.iter().map(|(key, per_target)| {
            let mut total = SpellMetrics::default();
            for m in per_target {
                total.merge(m);
            }
            (*key, total)
        })
    }

    pub(crate) fn reset(&mut self) {
        for per_target in self.splits.values_mut() {
            per_target.fill(SpellMetrics::default());
        }
        self.current = 0;
    }
}

/// Streaming mean/variance (Welford)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: u64,
    pub mean: f64,
    m2: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStats {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn stdev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

/// One unit's totals for a single iteration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitIteration {
    pub unit: u32,
    pub label: String,
    pub damage: f64,
    pub healing: f64,
    pub threat: f64,
    pub damage_taken: f64,
    pub spells: Vec<(ActionId, SpellMetrics)>,
    /// (label, uptime seconds, activations)
    pub auras: Vec<(String, f64, u32)>,
    pub resources: Vec<(ResourceKind, ResourceMetrics)>,
}

/// Everything one iteration produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub seed: u64,
    pub duration_secs: f64,
    pub units: Vec<UnitIteration>,
}

/// Totals of one action across iterations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMetrics {
    pub action: ActionId,
    pub metrics: SpellMetrics,
}

/// Cross-iteration aura statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuraMetrics {
    /// Average fraction of the encounter the aura was active
    pub uptime: RunningStats,
    pub activations: u64,
}

/// Aggregated metrics of one unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitMetrics {
    pub label: String,
    pub dps: RunningStats,
    pub hps: RunningStats,
    pub tps: RunningStats,
    pub dtps: RunningStats,
    pub actions: Vec<ActionMetrics>,
    pub auras: BTreeMap<String, AuraMetrics>,
    pub resources: BTreeMap<ResourceKind, ResourceMetrics>,
    #[serde(skip)]
    action_index: BTreeMap<ActionId, usize>,
}

impl UnitMetrics {
    pub fn add_iteration(&mut self, iteration: &UnitIteration, duration_secs: f64) {
        if self.label.is_empty() {
            self.label.clone_from(&iteration.label);
        }
        let secs = duration_secs.max(f64::EPSILON);
        self.dps.add(iteration.damage / secs);
        self.hps.add(iteration.healing / secs);
        self.tps.add(iteration.threat / secs);
        self.dtps.add(iteration.damage_taken / secs);

        for (action, metrics) in &iteration.spells {
            let idx = *self.action_index.entry(*action).or_insert_with(|| {
                self.actions.push(ActionMetrics {
                    action: *action,
                    metrics: SpellMetrics::default(),
                });
                self.actions.len() - 1
            });
            self.actions[idx].metrics.merge(metrics);
        }

        for (label, uptime, activations) in &iteration.auras {
            let entry = self.auras.entry(label.clone()).or_default();
            entry.uptime.add(uptime / secs);
            entry.activations += u64::from(*activations);
        }

        for (kind, m) in &iteration.resources {
            let entry = self.resources.entry(*kind).or_default();
            entry.gained += m.gained;
            entry.spent += m.spent;
            entry.refunded += m.refunded;
        }
    }

    pub fn action(&self, action: ActionId) -> Option<&SpellMetrics> {
        self.action_index
            .get(&action)
            .map(|&idx| &self.actions[idx].metrics)
    }
}

/// Serializable summary of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub iterations: u32,
    pub duration_secs: f64,
    pub units: Vec<UnitMetrics>,
}

impl SimulationResult {
    /// Fold iterations in the order given
    pub fn from_iterations<'a>(iterations: impl IntoIterator<Item = &'a IterationResult>) -> Self {
        let mut result = SimulationResult::default();
        for iteration in iterations {
            result.add_iteration(iteration);
        }
        result
    }

    pub fn add_iteration(&mut self, iteration: &IterationResult) {
        self.iterations += 1;
        self.duration_secs = iteration.duration_secs;
        if self.units.len() < iteration.units.len() {
            self.units
                .resize_with(iteration.units.len(), UnitMetrics::default);
        }
        for (metrics, unit) in self.units.iter_mut().zip(&iteration.units) {
            metrics.add_iteration(unit, iteration.duration_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_outcomes() {
        let mut metrics = SpellMetrics::default();
        let mut result = SpellResult::new(UnitId(1));
        result.damage = 100.0;
        result.threat = 100.0;
        metrics.record(&result);

        result.outcome = HitOutcome::Crit;
        result.damage = 150.0;
        metrics.record(&result);

        result.outcome = HitOutcome::Miss;
        result.damage = 0.0;
        metrics.record(&result);

        result.is_periodic = true;
        result.outcome = HitOutcome::Hit;
        result.damage = 20.0;
        metrics.record(&result);

        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.crits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.ticks, 1);
        assert_eq!(metrics.landed(), 3);
        assert!((metrics.total_damage - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_metrics_are_independent() {
        let mut split = SplitMetrics::new(2, 3);
        split.target_mut(UnitId(2)).unwrap().casts += 1;
        assert!(split.set_split(1));
        split.target_mut(UnitId(2)).unwrap().casts += 5;
        assert!(!split.set_split(7));
        assert_eq!(split.current_key(), 1);

        assert_eq!(split.target(0, UnitId(2)).unwrap().casts, 1);
        assert_eq!(split.target(1, UnitId(2)).unwrap().casts, 5);

        split.reset();
        assert_eq!(split.current_key(), 0);
        assert_eq!(split.totals().map(|(_, m)| m.casts).sum::<u32>(), 0);
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.add(v);
        }
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.stdev() - 2.138).abs() < 0.001);
        assert!((stats.min - 2.0).abs() < 1e-9);
        assert!((stats.max - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_metrics_aggregate_actions() {
        let action = ActionId::spell(1);
        let iteration = UnitIteration {
            label: "mage".to_string(),
            damage: 1000.0,
            spells: vec![(
                action,
                SpellMetrics {
                    casts: 4,
                    total_damage: 1000.0,
                    ..Default::default()
                },
            )],
            auras: vec![("Arcane Power".to_string(), 5.0, 1)],
            ..Default::default()
        };
        let mut metrics = UnitMetrics::default();
        metrics.add_iteration(&iteration, 10.0);
        metrics.add_iteration(&iteration, 10.0);

        assert!((metrics.dps.mean - 100.0).abs() < 1e-9);
        assert_eq!(metrics.action(action).unwrap().casts, 8);
        let aura = &metrics.auras["Arcane Power"];
        assert!((aura.uptime.mean - 0.5).abs() < 1e-9);
        assert_eq!(aura.activations, 2);
    }

    #[test]
    fn test_result_serializes_for_reporting() {
        let iteration = IterationResult {
            seed: 3,
            duration_secs: 60.0,
            units: vec![UnitIteration {
                label: "mage".to_string(),
                damage: 600.0,
                spells: vec![(ActionId::spell(116), SpellMetrics::default())],
                resources: vec![(ResourceKind::Mana, ResourceMetrics::default())],
                ..Default::default()
            }],
        };
        let result = SimulationResult::from_iterations([&iteration]);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["iterations"], 1);
        assert_eq!(json["units"][0]["label"], "mage");
        assert_eq!(json["units"][0]["dps"]["mean"], 10.0);
        assert!(json["units"][0]["resources"].get("mana").is_some());
        assert!(json["units"][0].get("action_index").is_none());
    }
}
