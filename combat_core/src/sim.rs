//! Simulation clock and iteration driver
//!
//! The simulation owns every unit (and through them every spell, aura and
//! timer). One iteration resets all dynamic state, seeds the RNG, then pops
//! events in order until the next one lies beyond the encounter duration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::EngineConstants;
use crate::error::ConfigError;
use crate::event::{CustomEvent, EventKind, EventPriority, EventQueue};
use crate::metrics::{IterationResult, SimulationResult, UnitIteration};
use crate::resource::ResourceKind;
use crate::spell::Spell;
use crate::timer::Timer;
use crate::types::{SpellFlags, SpellId, TimerId, UnitId, UnitKind};
use crate::unit::{ReadyHook, Unit, UnitConfig};

pub struct Simulation {
    pub(crate) units: Vec<Unit>,
    pub(crate) queue: EventQueue,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) current_time: Duration,
    pub(crate) duration: Duration,
    pub(crate) constants: EngineConstants,
    pub(crate) finalized: bool,
    next_order: u64,
    seed: u64,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("units", &self.units)
            .field("current_time", &self.current_time)
            .field("duration", &self.duration)
            .field("finalized", &self.finalized)
            .field("pending_events", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    pub fn new(constants: EngineConstants, duration: Duration) -> Self {
        Simulation {
            units: Vec::new(),
            queue: EventQueue::default(),
            rng: ChaCha8Rng::seed_from_u64(0),
            current_time: Duration::ZERO,
            duration,
            constants,
            finalized: false,
            next_order: 0,
            seed: 0,
        }
    }

    /// Registration order shared by units, spells and auras
    pub(crate) fn next_order(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    pub fn add_unit(&mut self, config: UnitConfig) -> Result<UnitId, ConfigError> {
        if self.finalized {
            return Err(ConfigError::UnitAfterFinalize(config.label));
        }
        let id = UnitId(self.units.len() as u32);
        let order = self.next_order();
        self.units.push(Unit::new(id, order, config));
        Ok(id)
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.index()]
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut Unit {
        &mut self.units[id.index()]
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit_by_label(&self, label: &str) -> Option<UnitId> {
        self.units.iter().find(|u| u.label() == label).map(Unit::id)
    }

    /// A fresh ready-at timer owned by `unit`, for cooldowns
    pub fn new_timer(&mut self, unit: UnitId) -> TimerId {
        self.units[unit.index()].new_timer()
    }

    pub fn timer(&self, id: TimerId) -> &Timer {
        &self.units[id.unit.index()].timers[id.index as usize]
    }

    pub fn timer_mut(&mut self, id: TimerId) -> &mut Timer {
        &mut self.units[id.unit.index()].timers[id.index as usize]
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn remaining_time(&self) -> Duration {
        self.duration.saturating_sub(self.current_time)
    }

    pub fn constants(&self) -> &EngineConstants {
        &self.constants
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Seed of the current iteration
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Uniform in [0, 1)
    pub fn random_float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// True with probability `chance`
    pub fn proc(&mut self, chance: f64) -> bool {
        chance > 0.0 && self.rng.gen::<f64>() < chance
    }

    /// Install the rotation: called whenever `unit` is free to act
    pub fn set_rotation(&mut self, unit: UnitId, f: impl Fn(&mut Simulation, UnitId) + Send + Sync + 'static) {
        let hook: ReadyHook = Arc::new(f);
        self.units[unit.index()].on_ready = Some(hook);
    }

    /// One-shot callback at an absolute time
    pub fn schedule_at(&mut self, at: Duration, f: impl FnOnce(&mut Simulation) + Send + 'static) {
        let event: CustomEvent = Box::new(f);
        let at = at.max(self.current_time);
        self.queue
            .push(at, EventPriority::Custom, u64::MAX, EventKind::Custom(event));
    }

    pub fn schedule_after(&mut self, delay: Duration, f: impl FnOnce(&mut Simulation) + Send + 'static) {
        let at = self.current_time.saturating_add(delay);
        self.schedule_at(at, f);
    }

    /// Close registration: finalize units and spells, pick default
    /// targets, run aura on-init hooks
    pub fn finalize(&mut self) -> Result<(), ConfigError> {
        if self.finalized {
            return Err(ConfigError::AlreadyFinalized);
        }
        for unit in &mut self.units {
            unit.finalize(&self.constants.resources);
        }

        let first_npc = self
            .units
            .iter()
            .find(|u| u.kind() == UnitKind::Npc)
            .map(Unit::id);
        for unit in &mut self.units {
            if unit.current_target.is_none() && unit.kind() != UnitKind::Npc {
                unit.current_target = first_npc;
            }
        }

        for unit in 0..self.units.len() {
            for index in 0..self.units[unit].spells.len() {
                let id = SpellId {
                    unit: UnitId(unit as u32),
                    index: index as u32,
                };
                self.finalize_spell(id)?;
            }
        }
        self.finalized = true;
        self.init_auras();
        debug!(units = self.units.len(), "simulation finalized");
        Ok(())
    }

    /// Restore every unit, spell and aura to its baseline and seed the RNG
    pub fn reset(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.current_time = Duration::ZERO;
        self.queue.clear();

        for unit in &mut self.units {
            unit.reset();
        }
        self.reset_spells();
        self.reset_auras();

        for unit in 0..self.units.len() {
            let id = UnitId(unit as u32);
            self.start_resource_ticks(id);
            self.schedule_unit_ready(id);
        }
    }

    /// Run one iteration seeded with `seed`
    pub fn run_iteration(&mut self, seed: u64) -> Result<IterationResult, ConfigError> {
        if !self.finalized {
            return Err(ConfigError::NotFinalized);
        }
        self.reset(seed);
        debug!(seed, duration = ?self.duration, "iteration start");

        self.process_events();
        self.current_time = self.duration;
        Ok(self.collect_iteration())
    }

    /// Dispatch every event due at or before `at` (capped at the encounter
    /// duration), then move the clock to `at`. Used to step a reset
    /// simulation by hand.
    pub fn advance_to(&mut self, at: Duration) {
        let at = at.min(self.duration);
        self.dispatch_until(at);
        self.current_time = self.current_time.max(at);
    }

    /// Dispatch events until the queue is empty or the next one lies
    /// beyond the encounter duration
    fn process_events(&mut self) {
        self.dispatch_until(self.duration);
    }

    fn dispatch_until(&mut self, limit: Duration) {
        while let Some(at) = self.queue.peek_time() {
            if at > limit {
                break;
            }
            let Some(event) = self.queue.pop() else {
                break;
            };
            self.current_time = event.at;
            self.dispatch(event.kind);
        }
    }

    fn dispatch(&mut self, kind: EventKind) {
        match kind {
            EventKind::DotTick { dot, generation } => self.on_dot_tick_event(dot, generation),
            EventKind::AuraExpire { aura, generation } => self.on_aura_expire_event(aura, generation),
            EventKind::CastComplete { spell, target } => self.complete_cast(spell, target),
            EventKind::ResourceTick { unit, resource } => self.on_resource_tick(unit, resource),
            EventKind::UnitReady { unit, generation } => self.on_unit_ready_event(unit, generation),
            EventKind::Custom(f) => f(self),
        }
    }

    /// Fold the iteration's counters into a result
    pub fn collect_iteration(&self) -> IterationResult {
        let now = self.current_time;
        let units = self
            .units
            .iter()
            .map(|unit| {
                let mut iteration = UnitIteration {
                    unit: unit.id().0,
                    label: unit.label().to_string(),
                    damage_taken: unit.damage_taken(),
                    ..UnitIteration::default()
                };
                for spell in unit.spells().iter().filter(|s| reports_metrics(s)) {
                    for (action, metrics) in spell.metrics_by_action() {
                        iteration.damage += metrics.total_damage;
                        iteration.healing += metrics.total_healing;
                        iteration.threat += metrics.total_threat;
                        iteration.spells.push((action, metrics));
                    }
                }
                iteration.auras = unit
                    .auras()
                    .iter()
                    .filter(|a| a.activations() > 0)
                    .map(|a| (a.label().to_string(), a.uptime(now).as_secs_f64(), a.activations()))
                    .collect();
                iteration.resources = ResourceKind::ALL
                    .into_iter()
                    .filter(|kind| unit.resources().has(*kind))
                    .map(|kind| (kind, unit.resources().metrics(kind)))
                    .collect();
                iteration
            })
            .collect();

        IterationResult {
            seed: self.seed,
            duration_secs: self.duration.as_secs_f64(),
            units,
        }
    }

    /// Run `iterations` sequentially with seeds `base_seed + i`
    pub fn run(&mut self, iterations: u32, base_seed: u64) -> Result<SimulationResult, ConfigError> {
        let mut result = SimulationResult::default();
        for i in 0..iterations {
            let iteration = self.run_iteration(base_seed.wrapping_add(u64::from(i)))?;
            result.add_iteration(&iteration);
        }
        info!(iterations, "simulation complete");
        Ok(result)
    }
}

fn reports_metrics(spell: &Spell) -> bool {
    !spell.flags().contains(SpellFlags::NO_METRICS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aura::AuraConfig;
    use crate::cast::{Cast, CastConfig};
    use crate::cost::ManaCostOptions;
    use crate::outcome::OutcomeApplier;
    use crate::spell::SpellConfig;
    use crate::stats::{Stat, Stats};
    use crate::types::{ActionId, ProcMask, SpellSchool};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_run_requires_finalize() {
        let mut sim = Simulation::new(EngineConstants::default(), secs(10));
        assert!(matches!(sim.run_iteration(1), Err(ConfigError::NotFinalized)));
        sim.finalize().unwrap();
        assert!(matches!(sim.finalize(), Err(ConfigError::AlreadyFinalized)));
        assert!(matches!(
            sim.add_unit(UnitConfig::player("late", 60)),
            Err(ConfigError::UnitAfterFinalize(_))
        ));
    }

    #[test]
    fn test_default_target_is_first_npc() {
        let mut sim = Simulation::new(EngineConstants::default(), secs(10));
        let player = sim.add_unit(UnitConfig::player("p", 60)).unwrap();
        let boss = sim.add_unit(UnitConfig::target("boss", 63)).unwrap();
        sim.add_unit(UnitConfig::target("add", 60)).unwrap();
        sim.finalize().unwrap();
        assert_eq!(sim.unit(player).current_target, Some(boss));
        assert_eq!(sim.unit(boss).current_target, None);
    }

    #[test]
    fn test_custom_events_run_in_time_then_fifo_order() {
        let mut sim = Simulation::new(EngineConstants::default(), secs(10));
        sim.add_unit(UnitConfig::player("p", 60)).unwrap();
        sim.finalize().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        sim.reset(5);
        for (at, tag) in [(3, "c"), (1, "a"), (3, "d"), (20, "never")] {
            let log = Arc::clone(&log);
            sim.schedule_at(secs(at), move |_| log.lock().unwrap().push(tag));
        }
        sim.process_events();
        assert_eq!(*log.lock().unwrap(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_rotation_casts_until_oom_and_resets_each_iteration() {
        let mut sim = Simulation::new(EngineConstants::default(), secs(30));
        let mage = sim
            .add_unit(UnitConfig::player("mage", 60).with_stats(Stats::default().with(Stat::Mana, 1000.0)))
            .unwrap();
        sim.add_unit(UnitConfig::target("boss", 60)).unwrap();
        let bolt = sim
            .register_spell(
                mage,
                SpellConfig {
                    mana_cost: ManaCostOptions::flat(300.0),
                    cast: CastConfig::new(Cast::new(secs(1), Duration::from_millis(2500))),
                    ..SpellConfig::damage(ActionId::spell(116), SpellSchool::FROST, ProcMask::SPELL_DAMAGE)
                }
                .with_apply_effects(|sim, target, spell| {
                    sim.calc_and_deal_damage(spell, target, 100.0, OutcomeApplier::AlwaysHit);
                }),
            )
            .unwrap();
        sim.set_rotation(mage, move |sim, _| {
            sim.cast(bolt, None);
        });
        sim.finalize().unwrap();

        for seed in [1, 2] {
            let result = sim.run_iteration(seed).unwrap();
            let mage_result = &result.units[0];
            // 1000 mana with little regen buys three casts
            let casts: u32 = mage_result.spells.iter().map(|(_, m)| m.casts).sum();
            assert_eq!(casts, 3);
            assert!((mage_result.damage - 300.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reset_restores_auras_and_runs_reset_hooks() {
        let mut sim = Simulation::new(EngineConstants::default(), secs(10));
        let unit = sim.add_unit(UnitConfig::player("p", 60)).unwrap();
        let resets = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&resets);
        let stance = sim
            .register_aura(
                unit,
                AuraConfig::permanent("Stance").on_reset(move |sim, id| {
                    r.fetch_add(1, Ordering::SeqCst);
                    sim.activate_aura(id);
                }),
            )
            .unwrap();
        let buff = sim
            .register_aura(unit, AuraConfig::new("Buff", secs(4)))
            .unwrap();
        sim.finalize().unwrap();

        sim.reset(1);
        sim.activate_aura(buff);
        sim.reset(2);
        assert!(!sim.aura(buff).is_active());
        assert!(sim.aura(stance).is_active());
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    }
}
