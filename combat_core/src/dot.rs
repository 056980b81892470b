//! Periodic effects: dots and hots
//!
//! A dot is a spell sub-effect carried by an aura on its target. Applying
//! it captures a snapshot (per-tick base amount, attacker multiplier, crit
//! chance) and schedules ticks every `tick_length`; ticks resolve from the
//! snapshot, never from live caster stats. The last tick of a cycle
//! deactivates the aura.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::aura::{AuraConfig, AuraLink};
use crate::damage::Resolution;
use crate::error::ConfigError;
use crate::event::{EventKind, EventPriority};
use crate::outcome::{spell_crit_chance, OutcomeApplier};
use crate::result::SpellResult;
use crate::sim::Simulation;
use crate::types::{AuraId, DotId, EffectSlot, SpellFlags, SpellId, UnitId, UnitKind};

/// Runs at application: `(sim, dot, is_rollover)`. Expected to call
/// [`Simulation::dot_snapshot`].
pub type DotSnapshotFn = Arc<dyn Fn(&mut Simulation, DotId, bool) + Send + Sync>;
/// Replaces the default tick
pub type DotTickFn = Arc<dyn Fn(&mut Simulation, DotId) + Send + Sync>;

/// What re-applying an active dot does to its cadence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Next tick one tick length from now
    #[default]
    Restart,
    /// Keep the pending tick; remaining ticks reset to the full count
    Extend,
}

#[derive(Clone)]
pub struct DotConfig {
    /// Label and hooks of the carrying aura. The duration is derived from
    /// the tick count and tick length.
    pub aura: AuraConfig,
    pub number_of_ticks: u32,
    pub tick_length: Duration,
    pub bonus_coefficient: f64,
    pub refresh: RefreshPolicy,
    /// Re-application keeps the previous multiplier and crit snapshot
    pub rollover: bool,
    /// Only on the caster
    pub self_only: bool,
    /// Also create a single area copy carried by the caster
    pub aoe: bool,
    pub on_snapshot: Option<DotSnapshotFn>,
    pub on_tick: Option<DotTickFn>,
}

impl fmt::Debug for DotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DotConfig")
            .field("aura", &self.aura)
            .field("number_of_ticks", &self.number_of_ticks)
            .field("tick_length", &self.tick_length)
            .field("refresh", &self.refresh)
            .field("rollover", &self.rollover)
            .finish_non_exhaustive()
    }
}

impl DotConfig {
    pub fn new(label: impl Into<String>, number_of_ticks: u32, tick_length: Duration) -> Self {
        DotConfig {
            aura: AuraConfig::new(label, tick_length * number_of_ticks),
            number_of_ticks,
            tick_length,
            bonus_coefficient: 0.0,
            refresh: RefreshPolicy::Restart,
            rollover: false,
            self_only: false,
            aoe: false,
            on_snapshot: None,
            on_tick: None,
        }
    }

    pub fn with_bonus_coefficient(mut self, coefficient: f64) -> Self {
        self.bonus_coefficient = coefficient;
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_rollover(mut self) -> Self {
        self.rollover = true;
        self
    }

    pub fn self_only(mut self) -> Self {
        self.self_only = true;
        self
    }

    pub fn with_aoe(mut self) -> Self {
        self.aoe = true;
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&mut Simulation, DotId, bool) + Send + Sync + 'static) -> Self {
        self.on_snapshot = Some(Arc::new(f));
        self
    }

    pub fn on_tick(mut self, f: impl Fn(&mut Simulation, DotId) + Send + Sync + 'static) -> Self {
        self.on_tick = Some(Arc::new(f));
        self
    }
}

/// Values captured at application
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DotSnapshot {
    /// Per-tick amount including the power bonus
    pub base_damage: f64,
    pub attacker_multiplier: f64,
    pub crit_chance: f64,
}

pub struct Dot {
    id: DotId,
    aura: AuraId,
    number_of_ticks: u32,
    tick_length: Duration,
    bonus_coefficient: f64,
    refresh: RefreshPolicy,
    rollover: bool,
    is_healing: bool,
    on_snapshot: Option<DotSnapshotFn>,
    on_tick: Option<DotTickFn>,

    snapshot: DotSnapshot,
    ticks_remaining: u32,
    tick_count: u32,
    next_tick_at: Duration,
    tick_pending: bool,
    generation: u64,
}

impl fmt::Debug for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dot")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("ticks_remaining", &self.ticks_remaining)
            .field("next_tick_at", &self.next_tick_at)
            .finish_non_exhaustive()
    }
}

impl Dot {
    pub fn id(&self) -> DotId {
        self.id
    }

    pub fn aura(&self) -> AuraId {
        self.aura
    }

    pub fn number_of_ticks(&self) -> u32 {
        self.number_of_ticks
    }

    pub fn tick_length(&self) -> Duration {
        self.tick_length
    }

    pub fn is_healing(&self) -> bool {
        self.is_healing
    }

    pub fn snapshot(&self) -> DotSnapshot {
        self.snapshot
    }

    pub fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    /// Ticks delivered in the current cycle
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    pub fn next_tick_at(&self) -> Duration {
        self.next_tick_at
    }

    /// Time of the last tick of the current cycle
    fn ends_at(&self) -> Duration {
        self.next_tick_at + self.tick_length * self.ticks_remaining.saturating_sub(1)
    }

    pub(crate) fn reset(&mut self) {
        self.snapshot = DotSnapshot::default();
        self.ticks_remaining = 0;
        self.tick_count = 0;
        self.next_tick_at = Duration::ZERO;
        self.tick_pending = false;
        self.generation += 1;
    }
}

impl Simulation {
    pub(crate) fn create_dots(&mut self, spell: SpellId, config: &DotConfig, is_healing: bool) -> Result<(), ConfigError> {
        for slot in self.sub_effect_slots(spell, config.self_only, config.aoe) {
            let owner = Simulation::slot_owner(spell, slot);
            let id = DotId { spell, slot };
            let mut aura_config = config.aura.clone();
            aura_config.label = Simulation::sub_effect_label(&config.aura.label, spell, slot);
            aura_config.duration = config.tick_length * config.number_of_ticks;
            let aura = self.register_aura_unchecked(owner, aura_config)?;
            self.aura_mut(aura).link = Some(AuraLink::Dot(id));

            let dot = Dot {
                id,
                aura,
                number_of_ticks: config.number_of_ticks,
                tick_length: config.tick_length,
                bonus_coefficient: config.bonus_coefficient,
                refresh: config.refresh,
                rollover: config.rollover,
                is_healing,
                on_snapshot: config.on_snapshot.clone(),
                on_tick: config.on_tick.clone(),
                snapshot: DotSnapshot::default(),
                ticks_remaining: 0,
                tick_count: 0,
                next_tick_at: Duration::ZERO,
                tick_pending: false,
                generation: 0,
            };
            self.spell_mut(spell).periodic.insert(slot, dot);
        }
        Ok(())
    }

    pub fn dot(&self, id: DotId) -> Option<&Dot> {
        self.spell(id.spell).periodic.get(id.slot)
    }

    fn dot_mut(&mut self, id: DotId) -> Option<&mut Dot> {
        self.spell_mut(id.spell).periodic.get_mut(id.slot)
    }

    /// Dot of `spell` carried by `target`
    pub fn dot_on(&self, spell: SpellId, target: UnitId) -> Option<DotId> {
        let id = DotId::new(spell, target);
        self.dot(id).map(Dot::id)
    }

    pub fn aoe_dot(&self, spell: SpellId) -> Option<DotId> {
        let id = DotId::aoe(spell);
        self.dot(id).map(Dot::id)
    }

    pub fn hot_on(&self, spell: SpellId, target: UnitId) -> Option<DotId> {
        self.dot_on(spell, target).filter(|id| self.dot(*id).is_some_and(Dot::is_healing))
    }

    pub fn self_hot(&self, spell: SpellId) -> Option<DotId> {
        self.hot_on(spell, spell.unit)
    }

    pub fn dot_is_active(&self, id: DotId) -> bool {
        self.dot(id)
            .is_some_and(|dot| self.aura(dot.aura).is_active())
    }

    pub fn dot_remaining_duration(&self, id: DotId) -> Duration {
        self.dot(id).map_or(Duration::ZERO, |dot| {
            self.aura(dot.aura).remaining_duration(self.current_time)
        })
    }

    pub fn dot_tick_count(&self, id: DotId) -> u32 {
        self.dot(id).map_or(0, Dot::tick_count)
    }

    pub fn deactivate_dot(&mut self, id: DotId) {
        if let Some(aura) = self.dot(id).map(Dot::aura) {
            self.deactivate_aura(aura);
        }
    }

    /// Apply or re-apply a dot. Zero ticks is a no-op.
    pub fn apply_dot(&mut self, id: DotId) {
        let Some(dot) = self.dot(id) else {
            return;
        };
        if dot.number_of_ticks == 0 {
            return;
        }
        let (aura, rollover, refresh, on_snapshot) =
            (dot.aura, dot.rollover, dot.refresh, dot.on_snapshot.clone());
        let active = self.aura(aura).is_active();

        let is_rollover = active && rollover;
        match on_snapshot {
            Some(hook) => hook(self, id, is_rollover),
            None => self.dot_snapshot(id, 0.0, is_rollover),
        }

        let now = self.current_time;
        let order = self.spell(id.spell).order;
        let Some(dot) = self.dot_mut(id) else {
            return;
        };
        dot.ticks_remaining = dot.number_of_ticks;
        dot.tick_count = 0;
        let keep_pending = active && refresh == RefreshPolicy::Extend && dot.tick_pending;
        if !keep_pending {
            dot.generation += 1;
            dot.next_tick_at = now + dot.tick_length;
            dot.tick_pending = true;
            let (at, generation) = (dot.next_tick_at, dot.generation);
            self.queue.push(
                at,
                EventPriority::DotTick,
                order,
                EventKind::DotTick { dot: id, generation },
            );
        }

        let ends_at = self.dot(id).map_or(now, Dot::ends_at);
        if active {
            self.refresh_aura(aura);
        } else {
            self.activate_aura(aura);
        }
        self.update_aura_expires(aura, ends_at);

        if !self.spell(id.spell).flags().contains(SpellFlags::NO_LOGS) {
            trace!(sim_time = ?now, action = %self.spell(id.spell).action_id(), slot = ?id.slot, rollover = is_rollover, "dot applied");
        }
    }

    /// Capture the snapshot of a dot. `base` is the per-tick amount before
    /// the power bonus.
    ///
    /// On a rollover only the attacker multiplier and crit chance carry
    /// over; the per-tick amount is always rebuilt from current power, so a
    /// rollover snapshot equals the previous one exactly only while the
    /// caster's power is unchanged.
    pub fn dot_snapshot(&mut self, id: DotId, base: f64, is_rollover: bool) {
        let Some(dot) = self.dot(id) else {
            return;
        };
        let (healing, coefficient) = (dot.is_healing, dot.bonus_coefficient);
        let spell = id.spell;
        let base_damage = self.scaled_base(spell, base, coefficient, healing);
        let attacker_multiplier = self.attacker_multiplier(spell, healing);
        let crit_chance = spell_crit_chance(self.unit(spell.unit), self.spell(spell));

        if let Some(dot) = self.dot_mut(id) {
            dot.snapshot.base_damage = base_damage;
            if !is_rollover {
                dot.snapshot.attacker_multiplier = attacker_multiplier;
                dot.snapshot.crit_chance = crit_chance;
            }
        }
    }

    pub(crate) fn on_dot_tick_event(&mut self, id: DotId, generation: u64) {
        let now = self.current_time;
        let order = self.spell(id.spell).order;
        let Some(dot) = self.dot_mut(id) else {
            return;
        };
        if dot.generation != generation || dot.ticks_remaining == 0 {
            return;
        }
        dot.ticks_remaining -= 1;
        dot.tick_count += 1;
        let last = dot.ticks_remaining == 0;
        if last {
            dot.tick_pending = false;
        } else {
            dot.next_tick_at += dot.tick_length;
            let at = dot.next_tick_at;
            self.queue.push(
                at,
                EventPriority::DotTick,
                order,
                EventKind::DotTick { dot: id, generation },
            );
        }

        let Some(dot) = self.dot(id) else {
            return;
        };
        let tick = dot.tick_count;
        match dot.on_tick.clone() {
            Some(hook) => hook(self, id),
            None => self.default_dot_tick(id),
        }
        trace!(sim_time = ?now, action = %self.spell(id.spell).action_id(), tick, "dot tick");

        let Some(dot) = self.dot(id) else {
            return;
        };
        if last && dot.generation == generation && dot.ticks_remaining == 0 {
            let aura = dot.aura;
            self.deactivate_aura(aura);
        }
    }

    fn default_dot_tick(&mut self, id: DotId) {
        let targets = match id.slot {
            EffectSlot::Target(unit) => vec![unit],
            EffectSlot::Aoe => self.enemies_of(id.spell.unit),
        };
        for target in targets {
            self.calc_and_deal_periodic_snapshot(id, target, OutcomeApplier::Tick);
        }
    }

    /// Units on the other side of `unit`
    pub fn enemies_of(&self, unit: UnitId) -> Vec<UnitId> {
        let hostile = self.unit(unit).kind() == UnitKind::Npc;
        self.units
            .iter()
            .filter(|u| (u.kind() == UnitKind::Npc) != hostile)
            .map(|u| u.id())
            .collect()
    }

    pub(crate) fn on_dot_aura_removed(&mut self, id: DotId) {
        if let Some(dot) = self.dot_mut(id) {
            dot.generation += 1;
            dot.ticks_remaining = 0;
            dot.tick_pending = false;
        }
    }

    /// Deactivate the active dot that expires first; ties go to the first listed
    pub fn cancel_soonest_expiring(&mut self, dots: &[DotId]) -> Option<DotId> {
        let now = self.current_time;
        let mut soonest: Option<(DotId, Duration)> = None;
        for &id in dots {
            if !self.dot_is_active(id) {
                continue;
            }
            let remaining = self.dot_remaining_duration(id);
            if soonest.map_or(true, |(_, best)| remaining < best) {
                soonest = Some((id, remaining));
            }
        }
        let (id, _) = soonest?;
        trace!(sim_time = ?now, action = %self.spell(id.spell).action_id(), "dot cancelled");
        self.deactivate_dot(id);
        Some(id)
    }

    /// Resolve one tick of `id` against `target` from its snapshot
    pub fn calc_periodic_snapshot_damage(
        &mut self,
        id: DotId,
        target: UnitId,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let Some(dot) = self.dot(id) else {
            return SpellResult::new(target);
        };
        let snapshot = dot.snapshot;
        let resolution = Resolution {
            amount: snapshot.base_damage,
            attacker_multiplier: snapshot.attacker_multiplier,
            snapshot_crit_chance: snapshot.crit_chance,
            is_healing: dot.is_healing,
            is_periodic: true,
        };
        self.resolve(id.spell, target, resolution, applier)
    }

    fn calc_and_deal_periodic_snapshot(&mut self, id: DotId, target: UnitId, applier: OutcomeApplier) -> SpellResult {
        let mut result = self.calc_periodic_snapshot_damage(id, target, applier);
        if result.is_healing {
            self.deal_healing(id.spell, &mut result);
        } else {
            self.deal_damage(id.spell, &mut result);
        }
        result
    }

    pub fn calc_and_deal_periodic_snapshot_damage(
        &mut self,
        id: DotId,
        target: UnitId,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let mut result = self.calc_periodic_snapshot_damage(id, target, applier);
        self.deal_damage(id.spell, &mut result);
        result
    }

    pub fn calc_and_deal_periodic_snapshot_healing(
        &mut self,
        id: DotId,
        target: UnitId,
        applier: OutcomeApplier,
    ) -> SpellResult {
        let mut result = self.calc_periodic_snapshot_damage(id, target, applier);
        self.deal_healing(id.spell, &mut result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConstants;
    use crate::spell::SpellConfig;
    use crate::stats::{Stat, Stats};
    use crate::types::{ActionId, ProcMask, SpellSchool};
    use crate::unit::UnitConfig;

    fn setup(dot: DotConfig) -> (Simulation, SpellId, UnitId) {
        let mut sim = Simulation::new(EngineConstants::default(), Duration::from_secs(60));
        let player = sim
            .add_unit(UnitConfig::player("p", 60).with_stats(Stats::default().with(Stat::SpellPower, 100.0)))
            .unwrap();
        let target = sim.add_unit(UnitConfig::target("t", 60)).unwrap();
        let config = SpellConfig {
            dot: Some(dot),
            ..SpellConfig::damage(ActionId::spell(10), SpellSchool::SHADOW, ProcMask::SPELL_DAMAGE)
        }
        .with_apply_effects(|sim, target, spell| {
            if let Some(dot) = sim.dot_on(spell, target) {
                sim.apply_dot(dot);
            }
        });
        let spell = sim.register_spell(player, config).unwrap();
        sim.finalize().unwrap();
        (sim, spell, target)
    }

    #[test]
    fn test_dot_aura_is_registered_per_unit() {
        let (sim, spell, target) = setup(DotConfig::new("Pain", 6, Duration::from_secs(3)));
        assert!(sim.get_aura(target, "Pain-0").is_some());
        assert!(sim.get_aura(spell.unit, "Pain-0").is_some());
        assert!(sim.aoe_dot(spell).is_none());
        assert!(sim.hot_on(spell, target).is_none());
    }

    #[test]
    fn test_snapshot_includes_coefficient_and_multiplier() {
        let (mut sim, spell, target) = setup(
            DotConfig::new("Pain", 6, Duration::from_secs(3))
                .with_bonus_coefficient(0.2)
                .on_snapshot(|sim, dot, rollover| sim.dot_snapshot(dot, 50.0, rollover)),
        );
        sim.spell_mut(spell).damage_multiplier.set(1.5);
        sim.cast(spell, Some(target));
        let dot = sim.dot_on(spell, target).unwrap();
        let snapshot = sim.dot(dot).unwrap().snapshot();
        assert!((snapshot.base_damage - 70.0).abs() < 1e-9);
        assert!((snapshot.attacker_multiplier - 1.5).abs() < 1e-9);
        assert!(sim.dot_is_active(dot));
        assert_eq!(sim.dot_remaining_duration(dot), Duration::from_secs(18));
    }

    #[test]
    fn test_zero_ticks_is_noop() {
        let (mut sim, spell, target) = setup(DotConfig::new("Nothing", 0, Duration::from_secs(3)));
        sim.cast(spell, Some(target));
        let dot = sim.dot_on(spell, target).unwrap();
        assert!(!sim.dot_is_active(dot));
    }

    #[test]
    fn test_cancel_soonest_expiring_prefers_first_on_tie() {
        let (mut sim, spell, target) = setup(DotConfig::new("Pain", 4, Duration::from_secs(2)));
        let player = spell.unit;
        let on_target = sim.dot_on(spell, target).unwrap();
        let on_self = sim.dot_on(spell, player).unwrap();
        sim.apply_dot(on_target);
        sim.apply_dot(on_self);
        assert_eq!(sim.cancel_soonest_expiring(&[on_self, on_target]), Some(on_self));
        assert!(!sim.dot_is_active(on_self));
        assert!(sim.dot_is_active(on_target));
        sim.deactivate_dot(on_target);
        assert_eq!(sim.cancel_soonest_expiring(&[on_self, on_target]), None);
    }
}
