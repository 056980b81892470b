//! Cast state machine
//!
//! A cast goes Idle -> eligibility -> casting (when cast time > 0) ->
//! effects applied. Eligibility is checked up front and a failing check
//! changes nothing. Costs and cooldowns are paid when the cast completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::CastFailure;
use crate::event::{EventKind, EventPriority};
use crate::sim::Simulation;
use crate::timer::Cooldown;
use crate::types::{SpellFlags, SpellId, UnitId};

/// Cost and timing of one cast
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cast {
    pub cost: f64,
    pub gcd: Duration,
    pub cast_time: Duration,
    pub channel_time: Duration,
}

impl Cast {
    pub fn new(gcd: Duration, cast_time: Duration) -> Self {
        Cast {
            gcd,
            cast_time,
            ..Cast::default()
        }
    }

    /// GCD-only instant cast
    pub fn instant(gcd: Duration) -> Self {
        Cast::new(gcd, Duration::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        *self == Cast::default()
    }

    /// How long the caster is busy: the longer of GCD and cast plus channel
    pub fn effective_time(&self) -> Duration {
        self.gcd.max(self.cast_time + self.channel_time)
    }
}

/// Overrides the cast time computed from the default cast and haste
pub type CastTimeFn = Arc<dyn Fn(&Simulation, SpellId) -> Duration + Send + Sync>;
/// Extra gate on top of GCD, cooldown and cost: `(sim, target)`
pub type CastConditionFn = Arc<dyn Fn(&Simulation, UnitId) -> bool + Send + Sync>;
/// Adjusts the current cast after eligibility passed and before it starts
pub type ModifyCastFn = Arc<dyn Fn(&mut Simulation, SpellId, &mut Cast) + Send + Sync>;

/// Timing and gating of a spell
#[derive(Clone, Default)]
pub struct CastConfig {
    pub default_cast: Cast,
    pub cd: Cooldown,
    pub shared_cd: Cooldown,
    pub ignore_haste: bool,
    pub cast_time: Option<CastTimeFn>,
    pub modify_cast: Option<ModifyCastFn>,
}

impl fmt::Debug for CastConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastConfig")
            .field("default_cast", &self.default_cast)
            .field("cd", &self.cd)
            .field("shared_cd", &self.shared_cd)
            .field("ignore_haste", &self.ignore_haste)
            .finish_non_exhaustive()
    }
}

impl CastConfig {
    pub fn new(default_cast: Cast) -> Self {
        CastConfig {
            default_cast,
            ..CastConfig::default()
        }
    }

    pub fn with_cooldown(mut self, cd: Cooldown) -> Self {
        self.cd = cd;
        self
    }

    pub fn with_shared_cooldown(mut self, cd: Cooldown) -> Self {
        self.shared_cd = cd;
        self
    }

    pub fn ignoring_haste(mut self) -> Self {
        self.ignore_haste = true;
        self
    }

    pub fn with_cast_time(mut self, f: impl Fn(&Simulation, SpellId) -> Duration + Send + Sync + 'static) -> Self {
        self.cast_time = Some(Arc::new(f));
        self
    }

    pub fn with_modify_cast(
        mut self,
        f: impl Fn(&mut Simulation, SpellId, &mut Cast) + Send + Sync + 'static,
    ) -> Self {
        self.modify_cast = Some(Arc::new(f));
        self
    }
}

/// One of three mutually exclusive ways a spell is cast
#[derive(Clone)]
pub(crate) enum CastShape {
    /// No default cast, no cooldown, no extra condition: effects apply directly
    AutoOrProc,
    /// No default cast, gated by a cooldown or an extra condition
    Simple,
    /// Has a default cast: GCD, hardcast lock, cost
    Timed { modify_cast: Option<ModifyCastFn> },
}

impl CastShape {
    pub(crate) fn derive(config: &CastConfig, has_extra_condition: bool) -> Self {
        if config.default_cast.is_empty() {
            if config.cd.is_set() || config.shared_cd.is_set() || has_extra_condition {
                CastShape::Simple
            } else {
                CastShape::AutoOrProc
            }
        } else {
            CastShape::Timed {
                modify_cast: config.modify_cast.clone(),
            }
        }
    }

    fn is_timed(&self) -> bool {
        matches!(self, CastShape::Timed { .. })
    }
}

impl Simulation {
    /// First failing precondition, in check order, or `None` if castable
    pub fn cast_failure(&self, spell: SpellId, target: UnitId) -> Option<CastFailure> {
        let now = self.current_time;
        let s = self.spell(spell);
        let unit = self.unit(spell.unit);

        if let Some(condition) = &s.extra_cast_condition {
            if !condition(self, target) {
                return Some(CastFailure::ExtraCondition);
            }
        }
        let timed = s.shape.is_timed();
        if timed && unit.moving && !s.default_cast.cast_time.is_zero() {
            return Some(CastFailure::Moving);
        }
        if timed && unit.is_casting(now) {
            return Some(CastFailure::Hardcasting {
                until: unit.hardcast_until(),
            });
        }
        if !s.default_cast.gcd.is_zero() && !unit.gcd().is_ready(now) {
            return Some(CastFailure::GlobalCooldown {
                ready_at: unit.gcd().ready_at(),
            });
        }
        for cd in [s.cd, s.shared_cd] {
            if let Some(timer) = cd.timer.map(|t| self.timer(t)) {
                if !timer.is_ready(now) {
                    return Some(CastFailure::Cooldown {
                        ready_at: timer.ready_at(),
                    });
                }
            }
        }
        if let Some(cost) = s.cost {
            let amount = s.default_cast.cost * s.cost_multiplier.get();
            if !cost.meets_requirement(unit, amount) {
                return Some(cost.cost_failure_reason(unit, amount));
            }
        }
        None
    }

    pub fn can_cast(&self, spell: SpellId, target: UnitId) -> bool {
        self.cast_failure(spell, target).is_none()
    }

    /// Cast `spell` at `target`, or at the caster's current target.
    /// Returns false, changing nothing, if the cast is not possible.
    pub fn cast(&mut self, spell: SpellId, target: Option<UnitId>) -> bool {
        let target = self.resolve_target(spell, target);
        match self.spell(spell).shape.clone() {
            CastShape::AutoOrProc => {
                self.log_cast(spell, target);
                self.apply_spell_effects(spell, target);
                true
            }
            CastShape::Simple => {
                if let Some(reason) = self.cast_failure(spell, target) {
                    trace!(sim_time = ?self.current_time, action = %self.spell(spell).action_id(), %reason, "cast failed");
                    return false;
                }
                self.start_cooldowns(spell);
                self.log_cast(spell, target);
                self.apply_spell_effects(spell, target);
                true
            }
            CastShape::Timed { modify_cast } => self.cast_timed(spell, target, modify_cast),
        }
    }

    fn cast_timed(&mut self, spell: SpellId, target: UnitId, modify_cast: Option<ModifyCastFn>) -> bool {
        if let Some(reason) = self.cast_failure(spell, target) {
            trace!(sim_time = ?self.current_time, action = %self.spell(spell).action_id(), %reason, "cast failed");
            return false;
        }

        let s = self.spell(spell);
        let mut cast = s.default_cast;
        cast.cost *= s.cost_multiplier.get();
        if let Some(modify) = modify_cast {
            modify(self, spell, &mut cast);
            if let Some(cost) = self.spell(spell).cost {
                if !cost.meets_requirement(self.unit(spell.unit), cast.cost) {
                    return false;
                }
            }
        }
        cast.cast_time = self.compute_cast_time(spell, cast.cast_time);

        let now = self.current_time;
        self.spell_mut(spell).cur_cast = cast;
        let unit = &mut self.units[spell.unit.index()];
        if !cast.gcd.is_zero() {
            unit.gcd.set(now + cast.gcd);
        }
        let busy = cast.cast_time + cast.channel_time;
        if !busy.is_zero() {
            unit.hardcast_until = now + busy;
        }
        self.log_cast(spell, target);

        if cast.cast_time.is_zero() {
            self.complete_cast(spell, target);
        } else {
            let order = self.spell(spell).order;
            self.queue.push(
                now + cast.cast_time,
                EventPriority::CastComplete,
                order,
                EventKind::CastComplete { spell, target },
            );
        }
        self.schedule_unit_ready(spell.unit);
        true
    }

    /// Pay the cost, start cooldowns, notify auras, apply effects
    pub(crate) fn complete_cast(&mut self, spell: SpellId, target: UnitId) {
        let now = self.current_time;
        let s = self.spell(spell);
        let (cost, amount, flags) = (s.cost, s.cur_cast.cost, s.flags());
        let spent = match cost {
            Some(cost) => cost.spend_cost(&mut self.units[spell.unit.index()], amount, now),
            None => 0.0,
        };
        self.spell_mut(spell).last_spent = spent;
        self.start_cooldowns(spell);
        if !flags.contains(SpellFlags::NO_LOGS) {
            trace!(sim_time = ?now, action = %self.spell(spell).action_id(), "cast complete");
        }
        if !flags.contains(SpellFlags::NO_ON_CAST_COMPLETE) {
            self.fan_out_cast_complete(spell);
        }
        self.apply_spell_effects(spell, target);
    }

    /// Refund what the last completed cast actually spent, according to the
    /// spell's refund rule. The spent amount is consumed by the refund.
    pub fn issue_refund(&mut self, spell: SpellId) -> f64 {
        let s = self.spell(spell);
        let Some(cost) = s.cost else {
            return 0.0;
        };
        let spent = s.last_spent;
        self.spell_mut(spell).last_spent = 0.0;
        cost.issue_refund(&mut self.units[spell.unit.index()], spent)
    }

    fn start_cooldowns(&mut self, spell: SpellId) {
        let now = self.current_time;
        let s = self.spell(spell);
        for cd in [s.cd, s.shared_cd] {
            if let Some(timer) = cd.timer {
                self.timer_mut(timer).set(now + cd.duration);
            }
        }
    }

    fn compute_cast_time(&self, spell: SpellId, base: Duration) -> Duration {
        let s = self.spell(spell);
        let time = match &s.cast_time_fn {
            Some(f) => f(self, spell),
            None if s.ignore_haste => base,
            None => self.unit(spell.unit).apply_cast_speed(base),
        };
        time.mul_f64(s.cast_time_multiplier.get().max(0.0))
    }

    /// Cast time of the default cast with haste and multipliers applied
    pub fn cast_time(&self, spell: SpellId) -> Duration {
        self.compute_cast_time(spell, self.spell(spell).default_cast.cast_time)
    }

    /// Time the caster is busy: the longer of GCD and cast plus channel
    pub fn effective_cast_time(&self, spell: SpellId) -> Duration {
        let s = self.spell(spell);
        s.default_cast
            .gcd
            .max(self.cast_time(spell) + s.default_cast.channel_time)
    }

    /// Flight time to the caster's target; zero missile speed means instant
    pub fn travel_time(&self, spell: SpellId) -> Duration {
        let speed = self.spell(spell).missile_speed();
        if speed <= 0.0 {
            return Duration::ZERO;
        }
        let distance = self.unit(spell.unit).distance_from_target.max(0.0);
        Duration::from_secs_f64(distance / speed)
    }

    /// When both the spell's own and shared cooldown are over
    pub fn ready_at(&self, spell: SpellId) -> Duration {
        let s = self.spell(spell);
        [s.cd, s.shared_cd]
            .iter()
            .filter_map(|cd| cd.timer)
            .map(|t| self.timer(t).ready_at())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_ready(&self, spell: SpellId) -> bool {
        self.ready_at(spell) <= self.current_time
    }

    pub fn time_to_ready(&self, spell: SpellId) -> Duration {
        self.ready_at(spell).saturating_sub(self.current_time)
    }

    fn resolve_target(&self, spell: SpellId, target: Option<UnitId>) -> UnitId {
        target
            .or(self.unit(spell.unit).current_target)
            .unwrap_or(spell.unit)
    }

    fn log_cast(&self, spell: SpellId, target: UnitId) {
        let s = self.spell(spell);
        if s.flags().contains(SpellFlags::NO_LOGS) {
            return;
        }
        debug!(
            sim_time = ?self.current_time,
            unit = %spell.unit,
            %target,
            action = %s.action_id(),
            cost = s.cur_cast.cost,
            cast_time = ?s.cur_cast.cast_time,
            "casting"
        );
    }

    /// Wake the unit's rotation once GCD and hardcast are both over
    pub(crate) fn schedule_unit_ready(&mut self, unit: UnitId) {
        let at = self.unit(unit).next_ready_at().max(self.current_time);
        self.schedule_ready_at(unit, at);
    }

    /// Wake the unit's rotation at `at` instead of when it is next free
    pub fn wait_until(&mut self, unit: UnitId, at: Duration) {
        let at = at.max(self.current_time);
        self.schedule_ready_at(unit, at);
    }

    fn schedule_ready_at(&mut self, unit: UnitId, at: Duration) {
        let u = &mut self.units[unit.index()];
        if u.on_ready.is_none() {
            return;
        }
        u.ready_generation += 1;
        let (generation, order) = (u.ready_generation, u.order);
        self.queue.push(
            at,
            EventPriority::UnitReady,
            order,
            EventKind::UnitReady { unit, generation },
        );
    }

    pub(crate) fn on_unit_ready_event(&mut self, unit: UnitId, generation: u64) {
        let u = self.unit(unit);
        if u.ready_generation != generation {
            return;
        }
        if let Some(hook) = u.on_ready.clone() {
            hook(self, unit);
        }
    }
}
