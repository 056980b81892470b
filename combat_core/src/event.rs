//! Event queue for the simulation clock
//!
//! A min-heap ordered by `(time, priority, owner order, sequence)`. Equal
//! times resolve by priority class, then by the registration order of the
//! owning spell, aura or unit, then first-in first-out.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::resource::ResourceKind;
use crate::sim::Simulation;
use crate::types::{AuraId, DotId, SpellId, UnitId};

/// Tie-break class for events scheduled at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    DotTick = 0,
    AuraExpire = 1,
    CastComplete = 2,
    Custom = 3,
    ResourceTick = 4,
    UnitReady = 5,
}

/// One-shot callback scheduled with [`Simulation::schedule_at`]
pub type CustomEvent = Box<dyn FnOnce(&mut Simulation) + Send>;

pub(crate) enum EventKind {
    DotTick { dot: DotId, generation: u64 },
    AuraExpire { aura: AuraId, generation: u64 },
    CastComplete { spell: SpellId, target: UnitId },
    ResourceTick { unit: UnitId, resource: ResourceKind },
    UnitReady { unit: UnitId, generation: u64 },
    Custom(CustomEvent),
}

pub(crate) struct Event {
    pub at: Duration,
    pub priority: EventPriority,
    pub order: u64,
    pub seq: u64,
    pub kind: EventKind,
}

impl Event {
    fn key(&self) -> (Duration, EventPriority, u64, u64) {
        (self.at, self.priority, self.order, self.seq)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending events. The heap keeps its capacity across iterations.
#[derive(Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Event>,
    next_seq: u64,
}

impl EventQueue {
    pub fn push(&mut self, at: Duration, priority: EventPriority, order: u64, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Event {
            at,
            priority,
            order,
            seq,
            kind,
        });
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    pub fn peek_time(&self) -> Option<Duration> {
        self.heap.peek().map(|e| e.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_ready(queue: &mut EventQueue, at: u64, priority: EventPriority, order: u64) {
        queue.push(
            Duration::from_millis(at),
            priority,
            order,
            EventKind::UnitReady {
                unit: UnitId(0),
                generation: 0,
            },
        );
    }

    fn drain(queue: &mut EventQueue) -> Vec<(u64, EventPriority, u64, u64)> {
        let mut out = Vec::new();
        while let Some(e) = queue.pop() {
            out.push((e.at.as_millis() as u64, e.priority, e.order, e.seq));
        }
        out
    }

    #[test]
    fn test_time_orders_first() {
        let mut queue = EventQueue::default();
        unit_ready(&mut queue, 300, EventPriority::DotTick, 0);
        unit_ready(&mut queue, 100, EventPriority::UnitReady, 0);
        unit_ready(&mut queue, 200, EventPriority::Custom, 0);
        let times: Vec<_> = drain(&mut queue).iter().map(|e| e.0).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn test_priority_then_owner_then_fifo() {
        let mut queue = EventQueue::default();
        unit_ready(&mut queue, 100, EventPriority::UnitReady, 0);
        unit_ready(&mut queue, 100, EventPriority::CastComplete, 5);
        unit_ready(&mut queue, 100, EventPriority::CastComplete, 2);
        unit_ready(&mut queue, 100, EventPriority::DotTick, 9);
        unit_ready(&mut queue, 100, EventPriority::AuraExpire, 1);
        unit_ready(&mut queue, 100, EventPriority::CastComplete, 2);

        let order: Vec<_> = drain(&mut queue)
            .iter()
            .map(|e| (e.1, e.2, e.3))
            .collect();
        assert_eq!(
            order,
            vec![
                (EventPriority::DotTick, 9, 3),
                (EventPriority::AuraExpire, 1, 4),
                (EventPriority::CastComplete, 2, 2),
                (EventPriority::CastComplete, 2, 5),
                (EventPriority::CastComplete, 5, 1),
                (EventPriority::UnitReady, 0, 0),
            ]
        );
    }

    #[test]
    fn test_clear_resets_sequence() {
        let mut queue = EventQueue::default();
        unit_ready(&mut queue, 1, EventPriority::Custom, 0);
        queue.clear();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.peek_time(), None);
        unit_ready(&mut queue, 1, EventPriority::Custom, 0);
        assert_eq!(queue.pop().map(|e| e.seq), Some(0));
    }
}
