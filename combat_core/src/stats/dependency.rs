//! Dynamic stat dependencies that auras toggle at runtime

use super::{Stat, Stats};

/// Handle returned when a dependency is registered on a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatDependencyId(pub(crate) usize);

/// How one stat feeds into another
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatDependency {
    /// `to += from * ratio`
    Convert { from: Stat, to: Stat, ratio: f64 },
    /// `stat *= factor`
    Multiply { stat: Stat, factor: f64 },
}

/// Ordered list of dependencies with enable flags.
///
/// Dependencies apply in registration order, so a conversion registered
/// after a multiplier sees the multiplied source value.
#[derive(Debug, Clone, Default)]
pub struct StatDependencyManager {
    deps: Vec<StatDependency>,
    enabled: Vec<bool>,
    initial_enabled: Vec<bool>,
}

impl StatDependencyManager {
    pub fn add(&mut self, dep: StatDependency) -> StatDependencyId {
        self.deps.push(dep);
        self.enabled.push(false);
        self.initial_enabled.push(false);
        StatDependencyId(self.deps.len() - 1)
    }

    /// Returns true if the flag changed
    pub fn set_enabled(&mut self, id: StatDependencyId, enabled: bool) -> bool {
        match self.enabled.get_mut(id.0) {
            Some(flag) if *flag != enabled => {
                *flag = enabled;
                true
            }
            _ => false,
        }
    }

    pub fn is_enabled(&self, id: StatDependencyId) -> bool {
        self.enabled.get(id.0).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Effective stats: `base` with every enabled dependency applied
    pub fn apply(&self, base: &Stats) -> Stats {
        let mut out = *base;
        for (dep, _) in self.deps.iter().zip(&self.enabled).filter(|(_, on)| **on) {
            match *dep {
                StatDependency::Convert { from, to, ratio } => {
                    out[to] += out[from] * ratio;
                }
                StatDependency::Multiply { stat, factor } => {
                    out[stat] *= factor;
                }
            }
        }
        out
    }

    pub(crate) fn snapshot(&mut self) {
        self.initial_enabled.clone_from(&self.enabled);
    }

    pub(crate) fn reset(&mut self) {
        self.enabled.clone_from(&self.initial_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_apply_in_order() {
        let mut mgr = StatDependencyManager::default();
        let mult = mgr.add(StatDependency::Multiply {
            stat: Stat::Intellect,
            factor: 1.1,
        });
        let conv = mgr.add(StatDependency::Convert {
            from: Stat::Intellect,
            to: Stat::SpellPower,
            ratio: 0.5,
        });

        let base = Stats::default().with(Stat::Intellect, 100.0);
        assert!((mgr.apply(&base)[Stat::SpellPower]).abs() < 1e-9);

        mgr.set_enabled(conv, true);
        assert!((mgr.apply(&base)[Stat::SpellPower] - 50.0).abs() < 1e-9);

        mgr.set_enabled(mult, true);
        let out = mgr.apply(&base);
        assert!((out[Stat::Intellect] - 110.0).abs() < 1e-9);
        assert!((out[Stat::SpellPower] - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_enabled_flags() {
        let mut mgr = StatDependencyManager::default();
        let always = mgr.add(StatDependency::Multiply {
            stat: Stat::Stamina,
            factor: 1.05,
        });
        let toggled = mgr.add(StatDependency::Multiply {
            stat: Stat::Spirit,
            factor: 2.0,
        });
        mgr.set_enabled(always, true);
        mgr.snapshot();

        assert!(mgr.set_enabled(toggled, true));
        assert!(!mgr.set_enabled(toggled, true));
        mgr.set_enabled(always, false);
        mgr.reset();

        assert!(mgr.is_enabled(always));
        assert!(!mgr.is_enabled(toggled));
    }
}
