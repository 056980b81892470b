//! Aura engine - buff/debuff lifecycle
//!
//! An aura is registered once on a unit and activated many times.
//! Activation of an inactive aura grants one stack (for stacking auras) and
//! schedules expiration; activating an active aura refreshes its expiration
//! and adds a stack. Hooks let content react to gain, expiry, stack changes,
//! reset and to spells landing on or from the owning unit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::event::{EventKind, EventPriority};
use crate::result::SpellResult;
use crate::sim::Simulation;
use crate::types::{ActionId, AuraId, DotId, ShieldId, SpellId, UnitId, NEVER_EXPIRES};

pub type AuraHook = Arc<dyn Fn(&mut Simulation, AuraId) + Send + Sync>;
/// Receives `(old_stacks, new_stacks)`
pub type StacksChangeHook = Arc<dyn Fn(&mut Simulation, AuraId, u32, u32) + Send + Sync>;
pub type SpellHitHook = Arc<dyn Fn(&mut Simulation, AuraId, SpellId, &SpellResult) + Send + Sync>;
pub type CastCompleteHook = Arc<dyn Fn(&mut Simulation, AuraId, SpellId) + Send + Sync>;

/// Optional callbacks of an aura
#[derive(Clone, Default)]
pub struct AuraHooks {
    /// Once, at finalize
    pub on_init: Option<AuraHook>,
    pub on_gain: Option<AuraHook>,
    pub on_expire: Option<AuraHook>,
    /// At the start of every iteration, after all state was cleared
    pub on_reset: Option<AuraHook>,
    pub on_stacks_change: Option<StacksChangeHook>,
    /// Any spell resolution by the owner, periodic ticks included
    pub on_spell_hit_dealt: Option<SpellHitHook>,
    /// Any spell resolution against the owner, periodic ticks included
    pub on_spell_hit_taken: Option<SpellHitHook>,
    /// Only periodic ticks by the owner; runs before on-spell-hit-dealt
    pub on_periodic_damage_dealt: Option<SpellHitHook>,
    pub on_cast_complete: Option<CastCompleteHook>,
}

/// Description of an aura to register
#[derive(Clone, Default)]
pub struct AuraConfig {
    pub label: String,
    pub action_id: Option<ActionId>,
    pub duration: Duration,
    /// 0 for non-stacking auras
    pub max_stacks: u32,
    pub hooks: AuraHooks,
}

impl fmt::Debug for AuraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuraConfig")
            .field("label", &self.label)
            .field("action_id", &self.action_id)
            .field("duration", &self.duration)
            .field("max_stacks", &self.max_stacks)
            .finish_non_exhaustive()
    }
}

impl AuraConfig {
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        AuraConfig {
            label: label.into(),
            duration,
            ..AuraConfig::default()
        }
    }

    /// An aura that stays until deactivated
    pub fn permanent(label: impl Into<String>) -> Self {
        AuraConfig::new(label, NEVER_EXPIRES)
    }

    pub fn with_action_id(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }

    pub fn with_max_stacks(mut self, max_stacks: u32) -> Self {
        self.max_stacks = max_stacks;
        self
    }

    pub fn on_init(mut self, f: impl Fn(&mut Simulation, AuraId) + Send + Sync + 'static) -> Self {
        self.hooks.on_init = Some(Arc::new(f));
        self
    }

    pub fn on_gain(mut self, f: impl Fn(&mut Simulation, AuraId) + Send + Sync + 'static) -> Self {
        self.hooks.on_gain = Some(Arc::new(f));
        self
    }

    pub fn on_expire(mut self, f: impl Fn(&mut Simulation, AuraId) + Send + Sync + 'static) -> Self {
        self.hooks.on_expire = Some(Arc::new(f));
        self
    }

    pub fn on_reset(mut self, f: impl Fn(&mut Simulation, AuraId) + Send + Sync + 'static) -> Self {
        self.hooks.on_reset = Some(Arc::new(f));
        self
    }

    pub fn on_stacks_change(
        mut self,
        f: impl Fn(&mut Simulation, AuraId, u32, u32) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_stacks_change = Some(Arc::new(f));
        self
    }

    pub fn on_spell_hit_dealt(
        mut self,
        f: impl Fn(&mut Simulation, AuraId, SpellId, &SpellResult) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_spell_hit_dealt = Some(Arc::new(f));
        self
    }

    pub fn on_spell_hit_taken(
        mut self,
        f: impl Fn(&mut Simulation, AuraId, SpellId, &SpellResult) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_spell_hit_taken = Some(Arc::new(f));
        self
    }

    pub fn on_periodic_damage_dealt(
        mut self,
        f: impl Fn(&mut Simulation, AuraId, SpellId, &SpellResult) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_periodic_damage_dealt = Some(Arc::new(f));
        self
    }

    pub fn on_cast_complete(
        mut self,
        f: impl Fn(&mut Simulation, AuraId, SpellId) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_cast_complete = Some(Arc::new(f));
        self
    }
}

/// Sub-effect an aura carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuraLink {
    Dot(DotId),
    Shield(ShieldId),
}

/// A registered aura and its live state
pub struct Aura {
    id: AuraId,
    pub(crate) order: u64,
    label: String,
    action_id: Option<ActionId>,
    duration: Duration,
    initial_duration: Duration,
    max_stacks: u32,
    pub(crate) hooks: AuraHooks,
    pub(crate) link: Option<AuraLink>,

    active: bool,
    stacks: u32,
    start_time: Duration,
    expires_at: Duration,
    generation: u64,

    uptime: Duration,
    activations: u32,
}

impl fmt::Debug for Aura {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aura")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("active", &self.active)
            .field("stacks", &self.stacks)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Aura {
    fn new(id: AuraId, order: u64, config: AuraConfig) -> Self {
        Aura {
            id,
            order,
            label: config.label,
            action_id: config.action_id,
            duration: config.duration,
            initial_duration: config.duration,
            max_stacks: config.max_stacks,
            hooks: config.hooks,
            link: None,
            active: false,
            stacks: 0,
            start_time: Duration::ZERO,
            expires_at: Duration::ZERO,
            generation: 0,
            uptime: Duration::ZERO,
            activations: 0,
        }
    }

    pub fn id(&self) -> AuraId {
        self.id
    }

    pub fn unit(&self) -> UnitId {
        self.id.unit
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn action_id(&self) -> Option<ActionId> {
        self.action_id
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn max_stacks(&self) -> u32 {
        self.max_stacks
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stacks(&self) -> u32 {
        self.stacks
    }

    pub fn start_time(&self) -> Duration {
        self.start_time
    }

    pub fn expires_at(&self) -> Duration {
        if self.active {
            self.expires_at
        } else {
            Duration::ZERO
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.duration == NEVER_EXPIRES
    }

    /// Zero when inactive, [`NEVER_EXPIRES`] for permanent auras
    pub fn remaining_duration(&self, now: Duration) -> Duration {
        if !self.active {
            Duration::ZERO
        } else if self.expires_at == NEVER_EXPIRES {
            NEVER_EXPIRES
        } else {
            self.expires_at.saturating_sub(now)
        }
    }

    /// Total active time this iteration, including the running span
    pub fn uptime(&self, now: Duration) -> Duration {
        if self.active {
            self.uptime + now.saturating_sub(self.start_time)
        } else {
            self.uptime
        }
    }

    pub fn activations(&self) -> u32 {
        self.activations
    }

    fn reset(&mut self) {
        self.active = false;
        self.stacks = 0;
        self.start_time = Duration::ZERO;
        self.expires_at = Duration::ZERO;
        self.generation += 1;
        self.duration = self.initial_duration;
        self.uptime = Duration::ZERO;
        self.activations = 0;
    }
}

impl Simulation {
    /// Register an aura on `unit`. Labels are unique per unit and
    /// registration is closed once the simulation is finalized.
    pub fn register_aura(&mut self, unit: UnitId, config: AuraConfig) -> Result<AuraId, ConfigError> {
        if self.finalized {
            return Err(ConfigError::AuraAfterFinalize(config.label));
        }
        self.register_aura_unchecked(unit, config)
    }

    /// Returns the existing aura with the same label, or registers a new one
    pub fn get_or_register_aura(
        &mut self,
        unit: UnitId,
        config: AuraConfig,
    ) -> Result<AuraId, ConfigError> {
        match self.get_aura(unit, &config.label) {
            Some(id) => Ok(id),
            None => self.register_aura(unit, config),
        }
    }

    pub(crate) fn register_aura_unchecked(
        &mut self,
        unit: UnitId,
        config: AuraConfig,
    ) -> Result<AuraId, ConfigError> {
        let u = &self.units[unit.index()];
        if u.aura_labels.contains_key(&config.label) {
            return Err(ConfigError::DuplicateAuraLabel {
                unit: u.label().to_string(),
                label: config.label,
            });
        }
        let order = self.next_order();
        let u = &mut self.units[unit.index()];

        let index = u.auras.len() as u32;
        let id = AuraId { unit, index };
        let hooks = &config.hooks;
        if hooks.on_spell_hit_dealt.is_some() {
            u.hooks.spell_hit_dealt.push(index);
        }
        if hooks.on_spell_hit_taken.is_some() {
            u.hooks.spell_hit_taken.push(index);
        }
        if hooks.on_periodic_damage_dealt.is_some() {
            u.hooks.periodic_damage_dealt.push(index);
        }
        if hooks.on_cast_complete.is_some() {
            u.hooks.cast_complete.push(index);
        }
        u.aura_labels.insert(config.label.clone(), index);
        u.auras.push(Aura::new(id, order, config));
        Ok(id)
    }

    pub fn get_aura(&self, unit: UnitId, label: &str) -> Option<AuraId> {
        self.units[unit.index()]
            .aura_labels
            .get(label)
            .map(|&index| AuraId { unit, index })
    }

    pub fn aura(&self, id: AuraId) -> &Aura {
        &self.units[id.unit.index()].auras[id.index as usize]
    }

    pub(crate) fn aura_mut(&mut self, id: AuraId) -> &mut Aura {
        &mut self.units[id.unit.index()].auras[id.index as usize]
    }

    /// Activate, or refresh and add a stack if already active
    pub fn activate_aura(&mut self, id: AuraId) {
        let now = self.current_time;
        let aura = self.aura(id);
        if aura.active {
            let (stacks, max) = (aura.stacks, aura.max_stacks);
            self.refresh_aura(id);
            if max > 0 && stacks < max {
                self.set_aura_stacks(id, stacks + 1);
            }
            return;
        }

        let aura = self.aura_mut(id);
        aura.active = true;
        aura.start_time = now;
        aura.activations += 1;
        if aura.max_stacks > 0 {
            aura.stacks = 1;
        }
        aura.generation += 1;
        aura.expires_at = expiration(now, aura.duration);
        let (expires_at, generation, order) = (aura.expires_at, aura.generation, aura.order);
        self.schedule_aura_expire(id, expires_at, generation, order);

        debug!(sim_time = ?now, aura = self.aura(id).label(), unit = %id.unit, "aura gained");
        if let Some(hook) = self.aura(id).hooks.on_gain.clone() {
            hook(self, id);
        }
    }

    /// Restart the duration from now; inactive auras are activated
    pub fn refresh_aura(&mut self, id: AuraId) {
        if !self.aura(id).active {
            self.activate_aura(id);
            return;
        }
        let now = self.current_time;
        let aura = self.aura_mut(id);
        aura.generation += 1;
        aura.expires_at = expiration(now, aura.duration);
        let (expires_at, generation, order) = (aura.expires_at, aura.generation, aura.order);
        self.schedule_aura_expire(id, expires_at, generation, order);
    }

    /// Replace the expiration time of an active aura
    pub fn update_aura_expires(&mut self, id: AuraId, expires_at: Duration) {
        if !self.aura(id).active {
            return;
        }
        let aura = self.aura_mut(id);
        aura.generation += 1;
        aura.expires_at = expires_at;
        let (generation, order) = (aura.generation, aura.order);
        self.schedule_aura_expire(id, expires_at, generation, order);
    }

    /// Change the duration used by later activations and refreshes
    pub fn set_aura_duration(&mut self, id: AuraId, duration: Duration) {
        self.aura_mut(id).duration = duration;
    }

    /// Deactivate: fires on-expire, then clears stacks
    pub fn deactivate_aura(&mut self, id: AuraId) {
        let now = self.current_time;
        let aura = self.aura_mut(id);
        if !aura.active {
            return;
        }
        aura.active = false;
        aura.generation += 1;
        aura.uptime += now.saturating_sub(aura.start_time);
        let link = aura.link;

        debug!(sim_time = ?now, aura = self.aura(id).label(), unit = %id.unit, "aura expired");
        match link {
            Some(AuraLink::Dot(dot)) => self.on_dot_aura_removed(dot),
            Some(AuraLink::Shield(shield)) => self.on_shield_aura_removed(shield),
            None => {}
        }
        if let Some(hook) = self.aura(id).hooks.on_expire.clone() {
            hook(self, id);
        }
        let aura = self.aura_mut(id);
        if !aura.active {
            aura.stacks = 0;
        }
    }

    /// Set the stack count; fires on-stacks-change when the value changes
    pub fn set_aura_stacks(&mut self, id: AuraId, stacks: u32) {
        let aura = self.aura_mut(id);
        if !aura.active {
            warn!(aura = aura.label(), "set stacks on inactive aura ignored");
            return;
        }
        let new = stacks.min(aura.max_stacks);
        let old = aura.stacks;
        if new == old {
            return;
        }
        aura.stacks = new;
        if let Some(hook) = aura.hooks.on_stacks_change.clone() {
            hook(self, id, old, new);
        }
    }

    pub fn add_aura_stack(&mut self, id: AuraId) {
        let stacks = self.aura(id).stacks;
        self.set_aura_stacks(id, stacks.saturating_add(1));
    }

    pub fn remove_aura_stack(&mut self, id: AuraId) {
        let stacks = self.aura(id).stacks;
        self.set_aura_stacks(id, stacks.saturating_sub(1));
    }

    fn schedule_aura_expire(&mut self, aura: AuraId, at: Duration, generation: u64, order: u64) {
        if at == NEVER_EXPIRES || at > self.duration {
            return;
        }
        self.queue.push(
            at,
            EventPriority::AuraExpire,
            order,
            EventKind::AuraExpire { aura, generation },
        );
    }

    pub(crate) fn on_aura_expire_event(&mut self, id: AuraId, generation: u64) {
        let aura = self.aura(id);
        if aura.active && aura.generation == generation {
            self.deactivate_aura(id);
        }
    }

    pub(crate) fn init_auras(&mut self) {
        self.init_auras_after(&[]);
    }

    pub(crate) fn aura_counts(&self) -> Vec<usize> {
        self.units.iter().map(|u| u.auras.len()).collect()
    }

    /// Run on-init for auras registered after `counts` was taken; units
    /// missing from `counts` start at zero
    pub(crate) fn init_auras_after(&mut self, counts: &[usize]) {
        for unit in 0..self.units.len() {
            let start = counts.get(unit).copied().unwrap_or(0);
            for index in start..self.units[unit].auras.len() {
                let id = self.units[unit].auras[index].id;
                if let Some(hook) = self.units[unit].auras[index].hooks.on_init.clone() {
                    hook(self, id);
                }
            }
        }
    }

    /// Silently clear every aura, then run on-reset hooks in registration order
    pub(crate) fn reset_auras(&mut self) {
        for unit in &mut self.units {
            for aura in &mut unit.auras {
                aura.reset();
            }
        }
        for unit in 0..self.units.len() {
            for index in 0..self.units[unit].auras.len() {
                let id = self.units[unit].auras[index].id;
                if let Some(hook) = self.units[unit].auras[index].hooks.on_reset.clone() {
                    hook(self, id);
                }
            }
        }
    }

    /// Notify the caster's and the target's auras about a dealt result.
    /// Periodic ticks first reach the caster's periodic hooks, then follow
    /// the same dealt/taken path as direct hits.
    pub(crate) fn fan_out_spell_hit(&mut self, spell: SpellId, result: &SpellResult) {
        let caster = spell.unit.index();
        if result.is_periodic {
            for i in 0..self.units[caster].hooks.periodic_damage_dealt.len() {
                let index = self.units[caster].hooks.periodic_damage_dealt[i] as usize;
                let aura = &self.units[caster].auras[index];
                if !aura.active {
                    continue;
                }
                let id = aura.id;
                if let Some(hook) = aura.hooks.on_periodic_damage_dealt.clone() {
                    hook(self, id, spell, result);
                }
            }
        }

        for i in 0..self.units[caster].hooks.spell_hit_dealt.len() {
            let index = self.units[caster].hooks.spell_hit_dealt[i] as usize;
            let aura = &self.units[caster].auras[index];
            if !aura.active {
                continue;
            }
            let id = aura.id;
            if let Some(hook) = aura.hooks.on_spell_hit_dealt.clone() {
                hook(self, id, spell, result);
            }
        }

        let target = result.target.index();
        for i in 0..self.units[target].hooks.spell_hit_taken.len() {
            let index = self.units[target].hooks.spell_hit_taken[i] as usize;
            let aura = &self.units[target].auras[index];
            if !aura.active {
                continue;
            }
            let id = aura.id;
            if let Some(hook) = aura.hooks.on_spell_hit_taken.clone() {
                hook(self, id, spell, result);
            }
        }
    }

    pub(crate) fn fan_out_cast_complete(&mut self, spell: SpellId) {
        let caster = spell.unit.index();
        for i in 0..self.units[caster].hooks.cast_complete.len() {
            let index = self.units[caster].hooks.cast_complete[i] as usize;
            let aura = &self.units[caster].auras[index];
            if !aura.active {
                continue;
            }
            let id = aura.id;
            if let Some(hook) = aura.hooks.on_cast_complete.clone() {
                hook(self, id, spell);
            }
        }
    }
}

fn expiration(now: Duration, duration: Duration) -> Duration {
    if duration == NEVER_EXPIRES {
        NEVER_EXPIRES
    } else {
        now.saturating_add(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConstants;
    use crate::unit::UnitConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn sim_with_unit() -> (Simulation, UnitId) {
        let mut sim = Simulation::new(EngineConstants::default(), Duration::from_secs(120));
        let unit = sim.add_unit(UnitConfig::player("p", 60)).unwrap();
        (sim, unit)
    }

    #[test]
    fn test_five_activations_fire_four_stack_changes() {
        let (mut sim, unit) = sim_with_unit();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&changes);
        let aura = sim
            .register_aura(
                unit,
                AuraConfig::new("Stacker", Duration::from_secs(30))
                    .with_max_stacks(5)
                    .on_stacks_change(move |_, _, old, new| {
                        seen.lock().unwrap().push((old, new));
                    }),
            )
            .unwrap();
        sim.finalize().unwrap();

        for _ in 0..5 {
            sim.activate_aura(aura);
        }
        assert_eq!(sim.aura(aura).stacks(), 5);
        assert_eq!(
            *changes.lock().unwrap(),
            vec![(1, 2), (2, 3), (3, 4), (4, 5)]
        );

        // Saturated: refresh only
        sim.activate_aura(aura);
        assert_eq!(changes.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_deactivate_fires_expire_then_clears_stacks() {
        let (mut sim, unit) = sim_with_unit();
        let stacks_at_expire = Arc::new(AtomicU32::new(99));
        let seen = Arc::clone(&stacks_at_expire);
        let aura = sim
            .register_aura(
                unit,
                AuraConfig::new("Buff", Duration::from_secs(10))
                    .with_max_stacks(3)
                    .on_expire(move |sim, id| {
                        seen.store(sim.aura(id).stacks(), Ordering::SeqCst);
                    }),
            )
            .unwrap();
        sim.finalize().unwrap();

        sim.activate_aura(aura);
        sim.activate_aura(aura);
        sim.deactivate_aura(aura);
        assert_eq!(stacks_at_expire.load(Ordering::SeqCst), 2);
        assert_eq!(sim.aura(aura).stacks(), 0);
        assert!(!sim.aura(aura).is_active());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let (mut sim, unit) = sim_with_unit();
        sim.register_aura(unit, AuraConfig::permanent("A")).unwrap();
        let err = sim
            .register_aura(unit, AuraConfig::permanent("A"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAuraLabel { .. }));
        let again = sim.get_or_register_aura(unit, AuraConfig::permanent("A"));
        assert_eq!(again.unwrap(), sim.get_aura(unit, "A").unwrap());
    }

    #[test]
    fn test_rejected_duplicate_keeps_order_dense() {
        let (mut sim, unit) = sim_with_unit();
        let a = sim.register_aura(unit, AuraConfig::permanent("A")).unwrap();
        assert!(sim.register_aura(unit, AuraConfig::permanent("A")).is_err());
        let b = sim.register_aura(unit, AuraConfig::permanent("B")).unwrap();
        assert_eq!(sim.aura(b).order, sim.aura(a).order + 1);
    }

    #[test]
    fn test_register_after_finalize_rejected() {
        let (mut sim, unit) = sim_with_unit();
        sim.finalize().unwrap();
        let err = sim
            .register_aura(unit, AuraConfig::permanent("Late"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::AuraAfterFinalize(_)));
    }

    #[test]
    fn test_refresh_replaces_expiration() {
        let (mut sim, unit) = sim_with_unit();
        let aura = sim
            .register_aura(unit, AuraConfig::new("Buff", Duration::from_secs(10)))
            .unwrap();
        sim.finalize().unwrap();
        sim.activate_aura(aura);
        assert_eq!(sim.aura(aura).expires_at(), Duration::from_secs(10));
        assert_eq!(
            sim.aura(aura).remaining_duration(Duration::from_secs(4)),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn test_permanent_aura_never_expires() {
        let (mut sim, unit) = sim_with_unit();
        let aura = sim
            .register_aura(unit, AuraConfig::permanent("Stance"))
            .unwrap();
        sim.finalize().unwrap();
        sim.activate_aura(aura);
        assert!(sim.aura(aura).is_permanent());
        assert_eq!(sim.aura(aura).remaining_duration(Duration::from_secs(5)), NEVER_EXPIRES);
        // Non-stacking auras ignore stack changes
        sim.set_aura_stacks(aura, 3);
        assert_eq!(sim.aura(aura).stacks(), 0);
    }
}
