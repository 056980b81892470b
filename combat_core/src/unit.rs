//! Units: the actors that own spells, auras, timers and resources

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::aura::Aura;
use crate::config::ResourceConstants;
use crate::resource::{ResourceKind, Resources};
use crate::sim::Simulation;
use crate::spell::Spell;
use crate::stats::{Stat, StatDependency, StatDependencyId, StatDependencyManager, Stats};
use crate::timer::Timer;
use crate::types::{SchoolIndex, SpellId, SpellSchool, TimerId, UnitId, UnitKind};

/// Called whenever the unit can act again (GCD and hardcast both over).
/// This is where a rotation decides what to cast next.
pub type ReadyHook = Arc<dyn Fn(&mut Simulation, UnitId) + Send + Sync>;
/// Called for every spell registered on a unit, including ones that
/// existed before the observer was added
pub type SpellRegisteredHook = Arc<dyn Fn(&mut Simulation, SpellId) + Send + Sync>;

/// How to build a unit
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub label: String,
    pub kind: UnitKind,
    pub level: u32,
    pub stats: Stats,
    /// Base mana used by percentage mana costs
    pub base_mana: f64,
    /// Pools besides mana, which is enabled whenever the unit has mana
    pub resources: Vec<ResourceKind>,
    pub can_block: bool,
    pub can_parry: bool,
    pub can_dodge: bool,
    pub distance_from_target: f64,
}

impl Default for UnitConfig {
    fn default() -> Self {
        UnitConfig {
            label: "unit".to_string(),
            kind: UnitKind::Player,
            level: 60,
            stats: Stats::default(),
            base_mana: 0.0,
            resources: Vec::new(),
            can_block: false,
            can_parry: false,
            can_dodge: true,
            distance_from_target: 0.0,
        }
    }
}

impl UnitConfig {
    pub fn player(label: &str, level: u32) -> Self {
        UnitConfig {
            label: label.to_string(),
            level,
            ..UnitConfig::default()
        }
    }

    pub fn target(label: &str, level: u32) -> Self {
        UnitConfig {
            label: label.to_string(),
            kind: UnitKind::Npc,
            level,
            ..UnitConfig::default()
        }
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_resource(mut self, kind: ResourceKind) -> Self {
        if !self.resources.contains(&kind) {
            self.resources.push(kind);
        }
        self
    }
}

/// Modifiers that are not stats: multipliers and behaviour switches.
/// Content mutates these freely during an iteration; reset restores them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoStats {
    pub school_damage_dealt: [f64; SchoolIndex::COUNT],
    pub school_damage_taken: [f64; SchoolIndex::COUNT],
    pub damage_dealt: f64,
    pub damage_taken: f64,
    pub healing_dealt: f64,
    pub healing_taken: f64,
    pub threat_multiplier: f64,
    /// Higher is faster: cast time is divided by this
    pub cast_speed: f64,
    /// Fraction of spirit regen kept while the five-second rule is active
    pub in_combat_regen: f64,
    pub can_block: bool,
    pub can_parry: bool,
    pub can_dodge: bool,
}

impl Default for PseudoStats {
    fn default() -> Self {
        PseudoStats {
            school_damage_dealt: [1.0; SchoolIndex::COUNT],
            school_damage_taken: [1.0; SchoolIndex::COUNT],
            damage_dealt: 1.0,
            damage_taken: 1.0,
            healing_dealt: 1.0,
            healing_taken: 1.0,
            threat_multiplier: 1.0,
            cast_speed: 1.0,
            in_combat_regen: 0.0,
            can_block: false,
            can_parry: false,
            can_dodge: true,
        }
    }
}

/// Indices of auras carrying each kind of event hook, in registration order
#[derive(Debug, Clone, Default)]
pub(crate) struct HookIndex {
    pub spell_hit_dealt: Vec<u32>,
    pub spell_hit_taken: Vec<u32>,
    pub periodic_damage_dealt: Vec<u32>,
    pub cast_complete: Vec<u32>,
    pub shields: Vec<u32>,
}

/// An actor in the simulation
pub struct Unit {
    pub(crate) id: UnitId,
    pub(crate) order: u64,
    label: String,
    kind: UnitKind,
    level: u32,

    base_stats: Stats,
    initial_base_stats: Stats,
    stats: Stats,
    dependencies: StatDependencyManager,
    pub pseudo_stats: PseudoStats,
    initial_pseudo_stats: PseudoStats,
    base_mana: f64,
    configured_resources: Vec<ResourceKind>,

    pub(crate) spells: Vec<Spell>,
    pub(crate) auras: Vec<Aura>,
    pub(crate) aura_labels: HashMap<String, u32>,
    pub(crate) hooks: HookIndex,
    pub(crate) timers: Vec<Timer>,
    pub(crate) gcd: Timer,
    pub(crate) hardcast_until: Duration,

    pub(crate) resources: Resources,
    pub current_target: Option<UnitId>,
    pub moving: bool,
    pub distance_from_target: f64,
    initial_distance: f64,

    pub(crate) spell_registered: Vec<SpellRegisteredHook>,
    pub(crate) on_ready: Option<ReadyHook>,
    pub(crate) ready_generation: u64,

    pub(crate) damage_taken: f64,
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("level", &self.level)
            .field("spells", &self.spells.len())
            .field("auras", &self.auras.len())
            .finish()
    }
}

impl Unit {
    pub(crate) fn new(id: UnitId, order: u64, config: UnitConfig) -> Self {
        let pseudo_stats = PseudoStats {
            can_block: config.can_block,
            can_parry: config.can_parry,
            can_dodge: config.can_dodge,
            ..PseudoStats::default()
        };
        Unit {
            id,
            order,
            label: config.label,
            kind: config.kind,
            level: config.level,
            base_stats: config.stats,
            initial_base_stats: config.stats,
            stats: config.stats,
            dependencies: StatDependencyManager::default(),
            pseudo_stats,
            initial_pseudo_stats: pseudo_stats,
            base_mana: config.base_mana,
            configured_resources: config.resources,
            spells: Vec::new(),
            auras: Vec::new(),
            aura_labels: HashMap::new(),
            hooks: HookIndex::default(),
            timers: Vec::new(),
            gcd: Timer::default(),
            hardcast_until: Duration::ZERO,
            resources: Resources::default(),
            current_target: None,
            moving: false,
            distance_from_target: config.distance_from_target,
            initial_distance: config.distance_from_target,
            spell_registered: Vec::new(),
            on_ready: None,
            ready_generation: 0,
            damage_taken: 0.0,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn base_mana(&self) -> f64 {
        self.base_mana
    }

    /// Effective stats, dependencies applied
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stat(&self, stat: Stat) -> f64 {
        self.stats[stat]
    }

    pub fn base_stats(&self) -> &Stats {
        &self.base_stats
    }

    pub fn add_stat(&mut self, stat: Stat, amount: f64) {
        self.base_stats[stat] += amount;
        self.recompute_stats();
    }

    pub fn add_stats(&mut self, stats: &Stats) {
        self.base_stats += *stats;
        self.recompute_stats();
    }

    /// Register a disabled `to += from * ratio` dependency
    pub fn new_dynamic_stat_dependency(&mut self, from: Stat, to: Stat, ratio: f64) -> StatDependencyId {
        self.dependencies
            .add(StatDependency::Convert { from, to, ratio })
    }

    /// Register a disabled `stat *= factor` dependency
    pub fn new_dynamic_multiply_stat(&mut self, stat: Stat, factor: f64) -> StatDependencyId {
        self.dependencies
            .add(StatDependency::Multiply { stat, factor })
    }

    pub fn enable_dynamic_stat_dep(&mut self, dep: StatDependencyId) {
        if self.dependencies.set_enabled(dep, true) {
            self.recompute_stats();
        }
    }

    pub fn disable_dynamic_stat_dep(&mut self, dep: StatDependencyId) {
        if self.dependencies.set_enabled(dep, false) {
            self.recompute_stats();
        }
    }

    pub fn is_stat_dep_enabled(&self, dep: StatDependencyId) -> bool {
        self.dependencies.is_enabled(dep)
    }

    fn recompute_stats(&mut self) {
        self.stats = self.dependencies.apply(&self.base_stats);
    }

    pub fn spells(&self) -> &[Spell] {
        &self.spells
    }

    pub fn auras(&self) -> &[Aura] {
        &self.auras
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn timer(&self, id: TimerId) -> Option<&Timer> {
        if id.unit != self.id {
            return None;
        }
        self.timers.get(id.index as usize)
    }

    pub fn gcd(&self) -> &Timer {
        &self.gcd
    }

    pub fn hardcast_until(&self) -> Duration {
        self.hardcast_until
    }

    pub fn is_casting(&self, now: Duration) -> bool {
        self.hardcast_until > now
    }

    /// When the unit can next start a GCD-bound cast
    pub fn next_ready_at(&self) -> Duration {
        self.gcd.ready_at().max(self.hardcast_until)
    }

    pub fn damage_taken(&self) -> f64 {
        self.damage_taken
    }

    pub fn apply_cast_speed(&self, duration: Duration) -> Duration {
        if self.pseudo_stats.cast_speed > 0.0 {
            duration.div_f64(self.pseudo_stats.cast_speed)
        } else {
            duration
        }
    }

    /// Spell power for a (possibly multi-school) spell: the best school wins
    pub fn school_power(&self, school: SpellSchool) -> f64 {
        let generic = self.stats[Stat::SpellPower];
        school
            .base_schools()
            .filter_map(Stat::school_power)
            .map(|s| generic + self.stats[s])
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))))
            .unwrap_or(0.0)
    }

    pub fn healing_power(&self) -> f64 {
        self.stats[Stat::HealingPower]
    }

    pub fn school_damage_dealt_multiplier(&self, school: SpellSchool) -> f64 {
        school
            .base_schools()
            .map(|s| self.pseudo_stats.school_damage_dealt[s.index()])
            .fold(None, |best: Option<f64>, m| Some(best.map_or(m, |b| b.max(m))))
            .unwrap_or(1.0)
    }

    pub fn school_damage_taken_multiplier(&self, school: SpellSchool) -> f64 {
        school
            .base_schools()
            .map(|s| self.pseudo_stats.school_damage_taken[s.index()])
            .fold(None, |best: Option<f64>, m| Some(best.map_or(m, |b| b.max(m))))
            .unwrap_or(1.0)
    }

    /// Lowest resistance among the spell's schools; the attacker picks the weakest
    pub fn resistance(&self, school: SpellSchool) -> f64 {
        school
            .base_schools()
            .map(|s| Stat::resistance(s).map_or(0.0, |stat| self.stats[stat]))
            .fold(None, |best: Option<f64>, r| Some(best.map_or(r, |b| b.min(r))))
            .unwrap_or(0.0)
    }

    pub(crate) fn new_timer(&mut self) -> TimerId {
        self.timers.push(Timer::default());
        TimerId {
            unit: self.id,
            index: (self.timers.len() - 1) as u32,
        }
    }

    /// Capture the baseline restored at every reset and size resource pools
    pub(crate) fn finalize(&mut self, constants: &ResourceConstants) {
        self.dependencies.snapshot();
        self.recompute_stats();
        self.initial_base_stats = self.base_stats;
        self.initial_pseudo_stats = self.pseudo_stats;
        self.initial_distance = self.distance_from_target;

        let mana = self.stats[Stat::Mana];
        if mana > 0.0 || self.configured_resources.contains(&ResourceKind::Mana) {
            self.resources.enable(ResourceKind::Mana, mana, mana);
        }
        for kind in self.configured_resources.clone() {
            match kind {
                ResourceKind::Mana => {}
                ResourceKind::Energy => {
                    self.resources
                        .enable(kind, constants.max_energy, constants.max_energy)
                }
                ResourceKind::Rage => self.resources.enable(kind, 0.0, constants.max_rage),
                ResourceKind::Focus => {
                    self.resources
                        .enable(kind, constants.max_focus, constants.max_focus)
                }
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.base_stats = self.initial_base_stats;
        self.dependencies.reset();
        self.recompute_stats();
        self.pseudo_stats = self.initial_pseudo_stats;
        self.distance_from_target = self.initial_distance;
        self.moving = false;
        for timer in &mut self.timers {
            timer.reset();
        }
        self.gcd.reset();
        self.hardcast_until = Duration::ZERO;
        self.resources.reset();
        self.ready_generation += 1;
        self.damage_taken = 0.0;
    }
}
