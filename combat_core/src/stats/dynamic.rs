//! Dynamic - a two-tier value with a per-iteration baseline

use serde::{Deserialize, Serialize};

/// A value that content may change during an iteration, restored to its
/// baseline on reset.
///
/// - `initial`: captured once when the simulation is finalized
/// - `current`: the working value read during an iteration
///
/// Before finalize, setup code (talents, gear) mutates `current` freely;
/// [`Dynamic::snapshot`] then promotes it to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dynamic {
    initial: f64,
    current: f64,
}

impl Default for Dynamic {
    fn default() -> Self {
        Dynamic::new(1.0)
    }
}

impl Dynamic {
    pub const fn new(value: f64) -> Self {
        Dynamic {
            initial: value,
            current: value,
        }
    }

    /// Current working value
    pub fn get(&self) -> f64 {
        self.current
    }

    /// Baseline restored on reset
    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn set(&mut self, value: f64) {
        self.current = value;
    }

    pub fn add(&mut self, delta: f64) {
        self.current += delta;
    }

    pub fn multiply(&mut self, factor: f64) {
        self.current *= factor;
    }

    /// Divide out a factor previously applied with [`Dynamic::multiply`]
    pub fn divide(&mut self, factor: f64) {
        if factor != 0.0 {
            self.current /= factor;
        }
    }

    /// Promote the current value to the baseline
    pub(crate) fn snapshot(&mut self) {
        self.initial = self.current;
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }

    pub(crate) fn is_default(&self, default: f64) -> bool {
        (self.current - default).abs() < f64::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_then_reset_restores_baseline() {
        let mut value = Dynamic::new(1.0);
        value.multiply(1.1);
        value.snapshot();
        assert!((value.initial() - 1.1).abs() < 1e-12);

        value.add(0.5);
        value.multiply(2.0);
        value.reset();
        assert!((value.get() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_divide_undoes_multiply() {
        let mut value = Dynamic::new(2.0);
        value.multiply(1.3);
        value.divide(1.3);
        assert!((value.get() - 2.0).abs() < 1e-12);
        value.divide(0.0);
        assert!((value.get() - 2.0).abs() < 1e-12);
    }
}
