//! Ready-at timers and cooldowns

use std::time::Duration;

use crate::types::TimerId;

/// A single "ready at" timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    ready_at: Duration,
}

impl Timer {
    pub fn ready_at(&self) -> Duration {
        self.ready_at
    }

    pub fn set(&mut self, ready_at: Duration) {
        self.ready_at = ready_at;
    }

    pub fn is_ready(&self, now: Duration) -> bool {
        self.ready_at <= now
    }

    pub fn time_to_ready(&self, now: Duration) -> Duration {
        self.ready_at.saturating_sub(now)
    }

    pub fn reset(&mut self) {
        self.ready_at = Duration::ZERO;
    }
}

/// A timer handle plus the duration it is set for when triggered.
/// Several spells may hold the same `TimerId` to share one cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cooldown {
    pub timer: Option<TimerId>,
    pub duration: Duration,
}

impl Cooldown {
    pub fn new(timer: TimerId, duration: Duration) -> Self {
        Cooldown {
            timer: Some(timer),
            duration,
        }
    }

    pub fn is_set(&self) -> bool {
        self.timer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_readiness() {
        let mut timer = Timer::default();
        assert!(timer.is_ready(Duration::ZERO));

        timer.set(Duration::from_secs(6));
        assert!(!timer.is_ready(Duration::from_secs(5)));
        assert!(timer.is_ready(Duration::from_secs(6)));
        assert_eq!(
            timer.time_to_ready(Duration::from_secs(2)),
            Duration::from_secs(4)
        );
        assert_eq!(timer.time_to_ready(Duration::from_secs(9)), Duration::ZERO);

        timer.reset();
        assert_eq!(timer.ready_at(), Duration::ZERO);
    }
}
