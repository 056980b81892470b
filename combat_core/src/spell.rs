//! Spells: registration, finalization, per-iteration reset and effects
//!
//! A spell is configured once through [`SpellConfig`] and owned by one
//! unit. Multipliers are [`Dynamic`] values so content can change them
//! during an iteration and have them restored on reset.

use std::fmt;
use std::sync::Arc;

use crate::cast::{Cast, CastConditionFn, CastConfig, CastShape, CastTimeFn};
use crate::cost::{ManaCostOptions, ResourceCostOptions, SpellCost};
use crate::dot::{Dot, DotConfig};
use crate::error::ConfigError;
use crate::metrics::{SpellMetrics, SplitMetrics};
use crate::result::SpellResult;
use crate::shield::{Shield, ShieldConfig};
use crate::sim::Simulation;
use crate::stats::Dynamic;
use crate::timer::Cooldown;
use crate::types::{
    ActionId, DefenseType, EffectSlot, ProcMask, SpellFlags, SpellId, SpellSchool, UnitId,
};
use crate::unit::SpellRegisteredHook;

/// Runs when the spell lands: `(sim, target, spell)`
pub type ApplyEffectsFn = Arc<dyn Fn(&mut Simulation, UnitId, SpellId) + Send + Sync>;
/// Computes a result with expected-value outcome appliers.
/// The flag asks tick calculators to use the dot's current snapshot.
pub type ExpectedDamageFn =
    Arc<dyn Fn(&mut Simulation, SpellId, UnitId, bool) -> SpellResult + Send + Sync>;

/// Everything needed to register a spell
#[derive(Clone, Default)]
pub struct SpellConfig {
    pub action_id: ActionId,
    pub rank: u32,
    pub required_level: u32,
    pub school: SpellSchool,
    pub defense_type: DefenseType,
    pub proc_mask: ProcMask,
    pub flags: SpellFlags,
    /// Yards per second; 0 means the spell lands instantly
    pub missile_speed: f64,
    /// Number of independent metric buckets, 0 for the default single one
    pub metric_splits: usize,

    pub mana_cost: ManaCostOptions,
    pub energy_cost: ResourceCostOptions,
    pub rage_cost: ResourceCostOptions,
    pub focus_cost: ResourceCostOptions,

    pub cast: CastConfig,
    pub extra_cast_condition: Option<CastConditionFn>,

    /// Percent points added to hit chance
    pub bonus_hit: f64,
    /// Percent points added to crit chance
    pub bonus_crit: f64,
    /// Extra crit damage, stored internally as `1 + crit_damage_bonus`
    pub crit_damage_bonus: f64,
    pub damage_multiplier: f64,
    pub damage_multiplier_additive: f64,
    pub bonus_coefficient: f64,
    pub threat_multiplier: f64,
    pub flat_threat_bonus: f64,

    pub apply_effects: Option<ApplyEffectsFn>,
    pub expected_initial_damage: Option<ExpectedDamageFn>,
    pub expected_tick_damage: Option<ExpectedDamageFn>,

    pub dot: Option<DotConfig>,
    pub hot: Option<DotConfig>,
    pub shield: Option<ShieldConfig>,
}

impl fmt::Debug for SpellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpellConfig")
            .field("action_id", &self.action_id)
            .field("rank", &self.rank)
            .field("school", &self.school)
            .field("proc_mask", &self.proc_mask)
            .field("flags", &self.flags)
            .field("cast", &self.cast)
            .finish_non_exhaustive()
    }
}

impl SpellConfig {
    pub fn new(action_id: ActionId) -> Self {
        SpellConfig {
            action_id,
            ..SpellConfig::default()
        }
    }

    /// A damaging spell with unit damage and threat multipliers
    pub fn damage(action_id: ActionId, school: SpellSchool, proc_mask: ProcMask) -> Self {
        SpellConfig {
            action_id,
            school,
            proc_mask,
            damage_multiplier: 1.0,
            threat_multiplier: 1.0,
            ..SpellConfig::default()
        }
    }

    pub fn with_apply_effects(
        mut self,
        f: impl Fn(&mut Simulation, UnitId, SpellId) + Send + Sync + 'static,
    ) -> Self {
        self.apply_effects = Some(Arc::new(f));
        self
    }

    pub fn with_extra_cast_condition(
        mut self,
        f: impl Fn(&Simulation, UnitId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.extra_cast_condition = Some(Arc::new(f));
        self
    }

    pub fn with_expected_initial_damage(
        mut self,
        f: impl Fn(&mut Simulation, SpellId, UnitId, bool) -> SpellResult + Send + Sync + 'static,
    ) -> Self {
        self.expected_initial_damage = Some(Arc::new(f));
        self
    }

    pub fn with_expected_tick_damage(
        mut self,
        f: impl Fn(&mut Simulation, SpellId, UnitId, bool) -> SpellResult + Send + Sync + 'static,
    ) -> Self {
        self.expected_tick_damage = Some(Arc::new(f));
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let action = self.action_id;
        if self.damage_multiplier != 0.0 || self.threat_multiplier != 0.0 {
            if self.proc_mask == ProcMask::UNKNOWN {
                return Err(ConfigError::MissingProcMask(action));
            }
            if self.school.is_empty() {
                return Err(ConfigError::MissingSchool(action));
            }
        }
        for cd in [self.cast.cd, self.cast.shared_cd] {
            if cd.is_set() && cd.duration.is_zero() {
                return Err(ConfigError::CooldownWithoutDuration(action));
            }
        }
        let has_cost = self.mana_cost.is_set()
            || self.energy_cost.is_set()
            || self.rage_cost.is_set()
            || self.focus_cost.is_set();
        if self.cast.default_cast.is_empty() && has_cost {
            return Err(ConfigError::CostWithoutCast(action));
        }
        if self.dot.is_some() && self.hot.is_some() {
            return Err(ConfigError::DotAndHot(action));
        }
        Ok(())
    }
}

/// Per-target copies of a sub-effect plus an optional area copy
#[derive(Debug, Clone)]
pub(crate) struct EffectArray<T> {
    per_target: Vec<Option<T>>,
    aoe: Option<T>,
}

impl<T> Default for EffectArray<T> {
    fn default() -> Self {
        EffectArray {
            per_target: Vec::new(),
            aoe: None,
        }
    }
}

impl<T> EffectArray<T> {
    pub fn get(&self, slot: EffectSlot) -> Option<&T> {
        match slot {
            EffectSlot::Target(unit) => self.per_target.get(unit.index()).and_then(Option::as_ref),
            EffectSlot::Aoe => self.aoe.as_ref(),
        }
    }

    pub fn get_mut(&mut self, slot: EffectSlot) -> Option<&mut T> {
        match slot {
            EffectSlot::Target(unit) => self
                .per_target
                .get_mut(unit.index())
                .and_then(Option::as_mut),
            EffectSlot::Aoe => self.aoe.as_mut(),
        }
    }

    pub fn insert(&mut self, slot: EffectSlot, value: T) {
        match slot {
            EffectSlot::Target(unit) => {
                if self.per_target.len() <= unit.index() {
                    self.per_target.resize_with(unit.index() + 1, || None);
                }
                self.per_target[unit.index()] = Some(value);
            }
            EffectSlot::Aoe => self.aoe = Some(value),
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.per_target
            .iter_mut()
            .flatten()
            .chain(self.aoe.iter_mut())
    }
}

/// A registered spell
pub struct Spell {
    id: SpellId,
    pub(crate) order: u64,
    action_id: ActionId,
    initial_tag: i32,
    rank: u32,
    required_level: u32,
    school: SpellSchool,
    defense_type: DefenseType,
    proc_mask: ProcMask,
    flags: SpellFlags,
    missile_speed: f64,
    metric_splits: usize,

    pub(crate) cost: Option<SpellCost>,
    pub(crate) default_cast: Cast,
    pub(crate) cur_cast: Cast,
    /// Resource actually removed by the last completed cast
    pub(crate) last_spent: f64,
    pub(crate) cd: Cooldown,
    pub(crate) shared_cd: Cooldown,
    pub(crate) shape: CastShape,
    pub(crate) ignore_haste: bool,
    pub(crate) cast_time_fn: Option<CastTimeFn>,
    pub(crate) extra_cast_condition: Option<CastConditionFn>,
    pub(crate) apply_effects: Option<ApplyEffectsFn>,
    pub(crate) expected_initial_damage: Option<ExpectedDamageFn>,
    pub(crate) expected_tick_damage: Option<ExpectedDamageFn>,

    pub bonus_hit: Dynamic,
    pub bonus_crit: Dynamic,
    pub crit_damage_bonus: Dynamic,
    pub damage_multiplier: Dynamic,
    pub damage_multiplier_additive: Dynamic,
    pub threat_multiplier: Dynamic,
    /// Must be 1 at finalize
    pub cast_time_multiplier: Dynamic,
    /// Must be 1 at finalize
    pub cost_multiplier: Dynamic,
    pub bonus_coefficient: f64,
    pub flat_threat_bonus: f64,

    pub(crate) metrics: SplitMetrics,
    casts: u32,

    pub(crate) periodic: EffectArray<Dot>,
    periodic_config: Option<(DotConfig, bool)>,
    pub(crate) shields: EffectArray<Shield>,
    shield_config: Option<ShieldConfig>,
    finalized: bool,
}

impl fmt::Debug for Spell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spell")
            .field("id", &self.id)
            .field("action_id", &self.action_id)
            .field("rank", &self.rank)
            .field("school", &self.school)
            .field("default_cast", &self.default_cast)
            .finish_non_exhaustive()
    }
}

impl Spell {
    fn new(id: SpellId, order: u64, config: SpellConfig, cost: Option<(SpellCost, f64)>) -> Self {
        let mut default_cast = config.cast.default_cast;
        let spell_cost = cost.map(|(cost, amount)| {
            default_cast.cost = amount;
            cost
        });

        let mut damage_multiplier = config.damage_multiplier;
        let mut damage_multiplier_additive = config.damage_multiplier_additive;
        if damage_multiplier != 0.0 && damage_multiplier_additive == 0.0 {
            damage_multiplier_additive = 1.0;
        }
        if damage_multiplier_additive != 0.0 && damage_multiplier == 0.0 {
            damage_multiplier = 1.0;
        }

        let shape = CastShape::derive(&config.cast, config.extra_cast_condition.is_some());
        let periodic_config = match (config.dot, config.hot) {
            (Some(dot), _) => Some((dot, false)),
            (None, Some(hot)) => Some((hot, true)),
            (None, None) => None,
        };

        Spell {
            id,
            order,
            action_id: config.action_id,
            initial_tag: config.action_id.tag,
            rank: config.rank,
            required_level: config.required_level,
            school: config.school,
            defense_type: config.defense_type,
            proc_mask: config.proc_mask,
            flags: config.flags,
            missile_speed: config.missile_speed,
            metric_splits: config.metric_splits,
            cost: spell_cost,
            default_cast,
            cur_cast: default_cast,
            last_spent: 0.0,
            cd: config.cast.cd,
            shared_cd: config.cast.shared_cd,
            shape,
            ignore_haste: config.cast.ignore_haste,
            cast_time_fn: config.cast.cast_time,
            extra_cast_condition: config.extra_cast_condition,
            apply_effects: config.apply_effects,
            expected_initial_damage: config.expected_initial_damage,
            expected_tick_damage: config.expected_tick_damage,
            bonus_hit: Dynamic::new(config.bonus_hit),
            bonus_crit: Dynamic::new(config.bonus_crit),
            crit_damage_bonus: Dynamic::new(1.0 + config.crit_damage_bonus),
            damage_multiplier: Dynamic::new(damage_multiplier),
            damage_multiplier_additive: Dynamic::new(damage_multiplier_additive),
            threat_multiplier: Dynamic::new(config.threat_multiplier),
            cast_time_multiplier: Dynamic::new(1.0),
            cost_multiplier: Dynamic::new(1.0),
            bonus_coefficient: config.bonus_coefficient,
            flat_threat_bonus: config.flat_threat_bonus,
            metrics: SplitMetrics::default(),
            casts: 0,
            periodic: EffectArray::default(),
            periodic_config,
            shields: EffectArray::default(),
            shield_config: config.shield,
            finalized: false,
        }
    }

    pub fn id(&self) -> SpellId {
        self.id
    }

    pub fn action_id(&self) -> ActionId {
        self.action_id
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn required_level(&self) -> u32 {
        self.required_level
    }

    pub fn school(&self) -> SpellSchool {
        self.school
    }

    pub fn defense_type(&self) -> DefenseType {
        self.defense_type
    }

    pub fn proc_mask(&self) -> ProcMask {
        self.proc_mask
    }

    pub fn flags(&self) -> SpellFlags {
        self.flags
    }

    pub fn missile_speed(&self) -> f64 {
        self.missile_speed
    }

    pub fn cost(&self) -> Option<SpellCost> {
        self.cost
    }

    pub fn default_cast(&self) -> Cast {
        self.default_cast
    }

    /// The cast most recently started
    pub fn cur_cast(&self) -> Cast {
        self.cur_cast
    }

    pub fn cooldown(&self) -> Cooldown {
        self.cd
    }

    pub fn shared_cooldown(&self) -> Cooldown {
        self.shared_cd
    }

    /// Effect applications this iteration
    pub fn casts(&self) -> u32 {
        self.casts
    }

    pub fn metrics(&self) -> &SplitMetrics {
        &self.metrics
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Totals of each split under the action id it reports as
    pub(crate) fn metrics_by_action(&self) -> impl Iterator<Item = (ActionId, SpellMetrics)> + '_ {
        let base = self.action_id.with_tag(self.initial_tag);
        let split = self.metric_splits > 0;
        self.metrics
            .totals()
            .map(move |(key, m)| (if split { base.with_tag(key) } else { base }, m))
    }

    /// Combined spell-side damage multiplier
    pub fn spell_multiplier(&self) -> f64 {
        self.damage_multiplier.get() * self.damage_multiplier_additive.get()
    }

    /// Takes level and resistance based partial resists
    pub(crate) fn takes_partial_resists(&self) -> bool {
        !self.school.is_empty()
            && !self.school.matches(SpellSchool::PHYSICAL)
            && !self
                .flags
                .intersects(SpellFlags::BINARY | SpellFlags::IGNORE_RESISTS)
    }

    fn check_dynamic_defaults(&self) -> Result<(), ConfigError> {
        let fields = [
            ("cast_time_multiplier", self.cast_time_multiplier),
            ("cost_multiplier", self.cost_multiplier),
        ];
        for (field, value) in fields {
            if !value.is_default(1.0) {
                return Err(ConfigError::NonDefaultDynamicField {
                    action: self.action_id,
                    field,
                    value: value.get(),
                });
            }
        }
        Ok(())
    }

    fn snapshot_dynamics(&mut self) {
        for value in self.dynamics_mut() {
            value.snapshot();
        }
    }

    fn dynamics_mut(&mut self) -> [&mut Dynamic; 8] {
        [
            &mut self.bonus_hit,
            &mut self.bonus_crit,
            &mut self.crit_damage_bonus,
            &mut self.damage_multiplier,
            &mut self.damage_multiplier_additive,
            &mut self.threat_multiplier,
            &mut self.cast_time_multiplier,
            &mut self.cost_multiplier,
        ]
    }

    fn reset(&mut self) {
        for value in self.dynamics_mut() {
            value.reset();
        }
        self.action_id = self.action_id.with_tag(self.initial_tag);
        self.cur_cast = self.default_cast;
        self.last_spent = 0.0;
        self.metrics.reset();
        self.casts = 0;
        for dot in self.periodic.iter_mut() {
            dot.reset();
        }
        for shield in self.shields.iter_mut() {
            shield.reset();
        }
    }
}

impl Simulation {
    /// Register a spell on `unit`. Registering an existing (action, rank)
    /// returns the existing spell.
    pub fn register_spell(&mut self, unit: UnitId, config: SpellConfig) -> Result<SpellId, ConfigError> {
        let u = &self.units[unit.index()];
        if let Some(existing) = u
            .spells
            .iter()
            .find(|s| s.action_id == config.action_id && s.rank == config.rank)
        {
            return Ok(existing.id);
        }
        let limit = self.constants.limits.max_spells_per_unit;
        if u.spells.len() >= limit {
            return Err(ConfigError::TooManySpells {
                unit: u.label().to_string(),
                limit,
            });
        }

        config.validate()?;
        let cost = SpellCost::from_options(
            config.action_id,
            &config.mana_cost,
            &config.energy_cost,
            &config.rage_cost,
            &config.focus_cost,
            u.base_mana(),
        )?;

        let order = self.next_order();
        let u = &mut self.units[unit.index()];
        let id = SpellId {
            unit,
            index: u.spells.len() as u32,
        };
        u.spells.push(Spell::new(id, order, config, cost));

        for i in 0..self.units[unit.index()].spell_registered.len() {
            let hook = self.units[unit.index()].spell_registered[i].clone();
            hook(self, id);
        }
        if self.finalized {
            // Dot and shield auras created here missed the finalize-time init pass
            let counts = self.aura_counts();
            self.finalize_spell(id)?;
            self.init_auras_after(&counts);
        }
        Ok(id)
    }

    /// First spell on `unit` with this action id
    pub fn get_spell(&self, unit: UnitId, action_id: ActionId) -> Option<SpellId> {
        self.units[unit.index()]
            .spells
            .iter()
            .find(|s| s.action_id == action_id)
            .map(Spell::id)
    }

    pub fn get_or_register_spell(&mut self, unit: UnitId, config: SpellConfig) -> Result<SpellId, ConfigError> {
        match self.get_spell(unit, config.action_id) {
            Some(id) => Ok(id),
            None => self.register_spell(unit, config),
        }
    }

    /// Observe spell registration on `unit`; runs immediately for spells
    /// registered earlier
    pub fn on_spell_registered(
        &mut self,
        unit: UnitId,
        f: impl Fn(&mut Simulation, SpellId) + Send + Sync + 'static,
    ) {
        let hook: SpellRegisteredHook = Arc::new(f);
        self.units[unit.index()].spell_registered.push(Arc::clone(&hook));
        for index in 0..self.units[unit.index()].spells.len() {
            let id = SpellId {
                unit,
                index: index as u32,
            };
            hook(self, id);
        }
    }

    pub fn spell(&self, id: SpellId) -> &Spell {
        &self.units[id.unit.index()].spells[id.index as usize]
    }

    pub fn spell_mut(&mut self, id: SpellId) -> &mut Spell {
        &mut self.units[id.unit.index()].spells[id.index as usize]
    }

    pub(crate) fn finalize_spell(&mut self, id: SpellId) -> Result<(), ConfigError> {
        let unit_count = self.units.len();
        let s = self.spell_mut(id);
        if s.finalized {
            return Ok(());
        }
        s.check_dynamic_defaults()?;
        if s.metric_splits > 0 && s.action_id.tag != 0 {
            return Err(ConfigError::SplitMetricsWithTag(s.action_id));
        }
        s.snapshot_dynamics();
        s.metrics = SplitMetrics::new(s.metric_splits, unit_count);
        let periodic = s.periodic_config.take();
        let shield = s.shield_config.take();

        if let Some((config, is_healing)) = periodic {
            self.create_dots(id, &config, is_healing)?;
        }
        if let Some(config) = shield {
            self.create_shields(id, &config)?;
        }
        self.spell_mut(id).finalized = true;
        Ok(())
    }

    pub(crate) fn reset_spells(&mut self) {
        for unit in &mut self.units {
            for spell in &mut unit.spells {
                spell.reset();
            }
        }
    }

    /// Count the cast and run the effect callback
    pub(crate) fn apply_spell_effects(&mut self, spell: SpellId, target: UnitId) {
        let s = self.spell_mut(spell);
        s.casts += 1;
        if let Some(m) = s.metrics.target_mut(target) {
            m.casts += 1;
        }
        if let Some(effects) = s.apply_effects.clone() {
            effects(self, target, spell);
        }
    }

    /// Apply effects without any cast bookkeeping (cost, GCD, cooldowns)
    pub fn skip_cast_and_apply_effects(&mut self, spell: SpellId, target: UnitId) {
        self.apply_spell_effects(spell, target);
    }

    /// Route subsequent metrics of `spell` into split `key`
    pub fn set_metrics_split(&mut self, spell: SpellId, key: i32) {
        let s = self.spell_mut(spell);
        if s.metrics.set_split(key) {
            s.action_id = s.action_id.with_tag(key);
        }
    }

    /// Metrics of `spell` against `target` in the current split
    pub fn spell_metrics(&self, spell: SpellId, target: UnitId) -> Option<&SpellMetrics> {
        let metrics = &self.spell(spell).metrics;
        metrics.target(metrics.current_key(), target)
    }

    /// Casts per minute so far this iteration
    pub fn cur_cpm(&self, spell: SpellId) -> f64 {
        let minutes = self.current_time.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.spell(spell).casts as f64 / minutes
    }

    /// Average damage per cast in the current split
    pub fn cur_damage_per_cast(&self, spell: SpellId) -> f64 {
        let metrics = &self.spell(spell).metrics;
        let key = metrics.current_key();
        let total = metrics
            .totals()
            .find(|(k, _)| *k == key)
            .map(|(_, m)| m)
            .unwrap_or_default();
        if total.casts == 0 {
            0.0
        } else {
            (total.total_damage + total.total_healing) / total.casts as f64
        }
    }

    pub(crate) fn slot_owner(spell: SpellId, slot: EffectSlot) -> UnitId {
        match slot {
            EffectSlot::Target(unit) => unit,
            EffectSlot::Aoe => spell.unit,
        }
    }

    /// Label for a sub-effect aura, unique per caster and slot
    pub(crate) fn sub_effect_label(label: &str, spell: SpellId, slot: EffectSlot) -> String {
        match slot {
            EffectSlot::Target(_) => format!("{label}-{}", spell.unit.0),
            EffectSlot::Aoe => format!("{label}-{}-aoe", spell.unit.0),
        }
    }

    pub(crate) fn sub_effect_slots(&self, spell: SpellId, self_only: bool, aoe: bool) -> Vec<EffectSlot> {
        let mut slots: Vec<EffectSlot> = if self_only {
            vec![EffectSlot::Target(spell.unit)]
        } else {
            (0..self.units.len() as u32)
                .map(|i| EffectSlot::Target(UnitId(i)))
                .collect()
        };
        if aoe {
            slots.push(EffectSlot::Aoe);
        }
        slots
    }
}
