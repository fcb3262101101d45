//! Deadline scheduler polled once per loop iteration
//!
//! Timers live in a min-heap keyed by deadline. Cancelling only removes the
//! live entry; its heap slot is dropped lazily when it reaches the top.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Handle to a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<E> {
    event: E,
    deadline: Duration,
    period: Option<Duration>,
    /// Matches the heap slot that is currently authoritative for this timer
    generation: u64,
}

#[derive(Debug)]
pub struct Scheduler<E> {
    heap: BinaryHeap<Reverse<(Duration, u64, TimerId)>>,
    entries: HashMap<TimerId, Entry<E>>,
    next_id: u64,
    next_generation: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            next_id: 0,
            next_generation: 0,
        }
    }
}

impl<E: Clone> Scheduler<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `event` once at `deadline`
    pub fn schedule(&mut self, deadline: Duration, event: E) -> TimerId {
        self.insert(deadline, None, event)
    }

    /// Fire `event` every `period`, first at `now + period`
    pub fn schedule_repeating(&mut self, now: Duration, period: Duration, event: E) -> TimerId {
        // A zero period would fire on every poll
        let period = period.max(Duration::from_millis(1));
        self.insert(now + period, Some(period), event)
    }

    /// Cancel a timer. Returns whether it was still pending; cancelling a
    /// fired or already cancelled timer is a no-op.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn deadline(&self, id: TimerId) -> Option<Duration> {
        self.entries.get(&id).map(|entry| entry.deadline)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every timer due at `now`, earliest first.
    ///
    /// A repeating timer is re-armed one period later, or one period from
    /// `now` if it is already that far behind, so a stalled loop never sees
    /// a burst of catch-up events.
    pub fn pop_due(&mut self, now: Duration) -> Vec<(TimerId, E)> {
        let mut due = Vec::new();

        while let Some(&Reverse((deadline, generation, id))) = self.heap.peek() {
            if deadline > now {
                break;
            }
            self.heap.pop();

            let live = self
                .entries
                .get(&id)
                .is_some_and(|entry| entry.generation == generation);
            if !live {
                continue;
            }

            let period = self.entries.get(&id).and_then(|entry| entry.period);
            match period {
                Some(period) => {
                    let mut next = deadline + period;
                    if next <= now {
                        next = now + period;
                    }
                    let generation = self.bump_generation();
                    if let Some(entry) = self.entries.get_mut(&id) {
                        entry.deadline = next;
                        entry.generation = generation;
                        due.push((id, entry.event.clone()));
                    }
                    self.heap.push(Reverse((next, generation, id)));
                }
                None => {
                    if let Some(entry) = self.entries.remove(&id) {
                        due.push((id, entry.event));
                    }
                }
            }
        }

        due
    }

    fn insert(&mut self, deadline: Duration, period: Option<Duration>, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let generation = self.bump_generation();

        self.entries.insert(
            id,
            Entry {
                event,
                deadline,
                period,
                generation,
            },
        );
        self.heap.push(Reverse((deadline, generation, id)));
        id
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_one_shot_fires_once_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(secs(20), "late");
        scheduler.schedule(secs(10), "early");

        assert!(scheduler.pop_due(secs(5)).is_empty());
        assert_eq!(scheduler.next_deadline(), Some(secs(10)));

        let fired: Vec<_> = scheduler.pop_due(secs(30)).into_iter().map(|(_, e)| e).collect();
        assert_eq!(fired, vec!["early", "late"]);
        assert!(scheduler.is_empty());
        assert!(scheduler.pop_due(secs(60)).is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule(secs(5), ());

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.pop_due(secs(10)).is_empty());

        let fired = scheduler.schedule(secs(1), ());
        assert_eq!(scheduler.pop_due(secs(1)).len(), 1);
        assert!(!scheduler.cancel(fired));
    }

    #[test]
    fn test_repeating_keeps_cadence() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule_repeating(secs(0), secs(10), 'r');

        assert_eq!(scheduler.pop_due(secs(10)).len(), 1);
        assert_eq!(scheduler.deadline(id), Some(secs(20)));
        assert_eq!(scheduler.pop_due(secs(21)).len(), 1);
        assert_eq!(scheduler.deadline(id), Some(secs(30)));
    }

    #[test]
    fn test_late_repeating_timer_does_not_burst() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule_repeating(secs(0), secs(10), 'r');

        assert_eq!(scheduler.pop_due(secs(95)).len(), 1);
        assert_eq!(scheduler.deadline(id), Some(secs(105)));
        assert!(scheduler.pop_due(secs(100)).is_empty());
    }

    #[test]
    fn test_cancelled_repeating_timer_stops() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule_repeating(secs(0), secs(1), 'r');
        scheduler.pop_due(secs(1));
        scheduler.cancel(id);

        assert!(scheduler.pop_due(secs(100)).is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }
}
