//! Resource pools and their regeneration
//!
//! Each unit may carry mana, energy, rage and focus. Mana, energy and focus
//! regenerate on fixed ticks driven by the event queue; rage is generated
//! from melee damage dealt and taken.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ResourceConstants;
use crate::event::{EventKind, EventPriority};
use crate::sim::Simulation;
use crate::stats::Stat;
use crate::types::UnitId;

/// A spendable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Mana,
    Energy,
    Rage,
    Focus,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Mana,
        ResourceKind::Energy,
        ResourceKind::Rage,
        ResourceKind::Focus,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Mana => "mana",
            ResourceKind::Energy => "energy",
            ResourceKind::Rage => "rage",
            ResourceKind::Focus => "focus",
        };
        f.write_str(name)
    }
}

/// Current and maximum amount of one resource
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourcePool {
    current: f64,
    max: f64,
    initial: f64,
}

impl ResourcePool {
    pub fn new(initial: f64, max: f64) -> Self {
        let initial = initial.clamp(0.0, max.max(0.0));
        ResourcePool {
            current: initial,
            max,
            initial,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns the amount actually gained after capping
    fn gain(&mut self, amount: f64) -> f64 {
        let before = self.current;
        self.current = (self.current + amount.max(0.0)).min(self.max);
        self.current - before
    }

    /// Returns the amount actually removed
    fn spend(&mut self, amount: f64) -> f64 {
        let before = self.current;
        self.current = (self.current - amount.max(0.0)).max(0.0);
        before - self.current
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Per-iteration resource bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub gained: f64,
    pub spent: f64,
    pub refunded: f64,
}

/// All pools of a unit
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pools: [Option<ResourcePool>; 4],
    metrics: [ResourceMetrics; 4],
    last_mana_spend: Option<Duration>,
}

impl Resources {
    pub fn pool(&self, kind: ResourceKind) -> Option<&ResourcePool> {
        self.pools[kind.index()].as_ref()
    }

    pub fn has(&self, kind: ResourceKind) -> bool {
        self.pools[kind.index()].is_some()
    }

    /// Current amount, zero when the unit has no such pool
    pub fn current(&self, kind: ResourceKind) -> f64 {
        self.pool(kind).map_or(0.0, ResourcePool::current)
    }

    pub fn metrics(&self, kind: ResourceKind) -> ResourceMetrics {
        self.metrics[kind.index()]
    }

    /// True while spirit-based mana regen is suppressed
    pub fn in_five_second_rule(&self, now: Duration, window: Duration) -> bool {
        self.last_mana_spend
            .is_some_and(|at| now < at.saturating_add(window))
    }

    pub(crate) fn enable(&mut self, kind: ResourceKind, initial: f64, max: f64) {
        self.pools[kind.index()] = Some(ResourcePool::new(initial, max));
    }

    pub(crate) fn gain(&mut self, kind: ResourceKind, amount: f64) -> f64 {
        let Some(pool) = self.pools[kind.index()].as_mut() else {
            return 0.0;
        };
        let gained = pool.gain(amount);
        self.metrics[kind.index()].gained += gained;
        gained
    }

    pub(crate) fn spend(&mut self, kind: ResourceKind, amount: f64, now: Duration) -> f64 {
        let Some(pool) = self.pools[kind.index()].as_mut() else {
            return 0.0;
        };
        let spent = pool.spend(amount);
        self.metrics[kind.index()].spent += spent;
        if kind == ResourceKind::Mana && spent > 0.0 {
            self.last_mana_spend = Some(now);
        }
        spent
    }

    pub(crate) fn refund(&mut self, kind: ResourceKind, amount: f64) -> f64 {
        let Some(pool) = self.pools[kind.index()].as_mut() else {
            return 0.0;
        };
        let refunded = pool.gain(amount);
        self.metrics[kind.index()].refunded += refunded;
        refunded
    }

    pub(crate) fn reset(&mut self) {
        for pool in self.pools.iter_mut().flatten() {
            pool.reset();
        }
        self.metrics = Default::default();
        self.last_mana_spend = None;
    }
}

/// Rage conversion value for a unit level
pub fn rage_conversion(level: u32) -> f64 {
    let l = level as f64;
    0.0091107836 * l * l + 3.225598133 * l + 4.2652911
}

pub(crate) fn rage_from_damage_dealt(constants: &ResourceConstants, level: u32, damage: f64) -> f64 {
    constants.rage_dealt_factor * damage / rage_conversion(level)
}

pub(crate) fn rage_from_damage_taken(constants: &ResourceConstants, level: u32, damage: f64) -> f64 {
    constants.rage_taken_factor * damage / rage_conversion(level)
}

impl Simulation {
    /// Schedule the first regeneration tick of every ticking pool
    pub(crate) fn start_resource_ticks(&mut self, unit: UnitId) {
        let resources = &self.constants.resources;
        let ticks = [
            (ResourceKind::Mana, resources.mana_tick()),
            (ResourceKind::Energy, resources.energy_tick()),
            (ResourceKind::Focus, resources.focus_tick()),
        ];
        for (kind, tick) in ticks {
            if self.units[unit.index()].resources.has(kind) && !tick.is_zero() {
                self.schedule_resource_tick(unit, kind, tick);
            }
        }
    }

    fn schedule_resource_tick(&mut self, unit: UnitId, kind: ResourceKind, tick: Duration) {
        let at = self.current_time.saturating_add(tick);
        let order = self.units[unit.index()].order;
        self.queue.push(
            at,
            EventPriority::ResourceTick,
            order,
            EventKind::ResourceTick { unit, resource: kind },
        );
    }

    pub(crate) fn on_resource_tick(&mut self, unit: UnitId, kind: ResourceKind) {
        let now = self.current_time;
        let constants = &self.constants.resources;
        let u = &self.units[unit.index()];
        let (amount, tick) = match kind {
            ResourceKind::Mana => {
                let tick = constants.mana_tick();
                let mp5 = u.stats()[Stat::Mp5] * tick.as_secs_f64() / 5.0;
                let spirit_stat = u.stats()[Stat::Spirit];
                let spirit = if spirit_stat > 0.0 {
                    constants.spirit_regen_base + spirit_stat * constants.spirit_regen_per_point
                } else {
                    0.0
                };
                let spirit = if u
                    .resources
                    .in_five_second_rule(now, constants.five_second_rule())
                {
                    spirit * u.pseudo_stats.in_combat_regen
                } else {
                    spirit
                };
                (mp5 + spirit, tick)
            }
            ResourceKind::Energy => (constants.energy_per_tick, constants.energy_tick()),
            ResourceKind::Focus => (constants.focus_per_tick, constants.focus_tick()),
            ResourceKind::Rage => return,
        };

        let gained = self.units[unit.index()].resources.gain(kind, amount);
        trace!(sim_time = ?now, %unit, resource = %kind, gained, "resource tick");
        self.schedule_resource_tick(unit, kind, tick);
    }

    /// Add resource outside of regular regeneration (procs, potions)
    pub fn add_resource(&mut self, unit: UnitId, kind: ResourceKind, amount: f64) -> f64 {
        self.units[unit.index()].resources.gain(kind, amount)
    }

    /// Remove resource outside of spell costs
    pub fn spend_resource(&mut self, unit: UnitId, kind: ResourceKind, amount: f64) -> f64 {
        let now = self.current_time;
        self.units[unit.index()].resources.spend(kind, amount, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_caps_and_floors() {
        let mut pool = ResourcePool::new(50.0, 100.0);
        assert!((pool.gain(80.0) - 50.0).abs() < 1e-9);
        assert!((pool.current() - 100.0).abs() < 1e-9);
        assert!((pool.spend(130.0) - 100.0).abs() < 1e-9);
        assert!(pool.current().abs() < 1e-9);
        pool.reset();
        assert!((pool.current() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_mana_spend_starts_five_second_rule() {
        let mut resources = Resources::default();
        resources.enable(ResourceKind::Mana, 1000.0, 1000.0);
        let window = Duration::from_secs(5);
        assert!(!resources.in_five_second_rule(Duration::ZERO, window));

        resources.spend(ResourceKind::Mana, 100.0, Duration::from_secs(10));
        assert!(resources.in_five_second_rule(Duration::from_secs(14), window));
        assert!(!resources.in_five_second_rule(Duration::from_secs(15), window));
        assert!((resources.metrics(ResourceKind::Mana).spent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_pool_is_inert() {
        let mut resources = Resources::default();
        assert_eq!(resources.gain(ResourceKind::Energy, 20.0), 0.0);
        assert_eq!(resources.current(ResourceKind::Energy), 0.0);
    }

    #[test]
    fn test_rage_conversion_at_sixty() {
        let c = rage_conversion(60);
        assert!((c - 230.6).abs() < 0.1);
        let constants = ResourceConstants::default();
        let rage = rage_from_damage_dealt(&constants, 60, c);
        assert!((rage - 7.5).abs() < 1e-9);
        assert!((rage_from_damage_taken(&constants, 60, c) - 2.5).abs() < 1e-9);
    }
}
