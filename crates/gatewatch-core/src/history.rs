//! Bounded, most-recent-first notification history.

use crate::events::RecognitionEvent;
use std::collections::VecDeque;

/// Number of events the dashboard keeps.
pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct NotificationHistory {
    entries: VecDeque<RecognitionEvent>,
    capacity: usize,
}

impl Default for NotificationHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl NotificationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend `event`; returns the oldest entry if it was dropped to make room.
    pub fn push(&mut self, event: RecognitionEvent) -> Option<RecognitionEvent> {
        self.entries.push_front(event);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Remove the entry at `index` (0 = most recent). Out-of-range is a no-op.
    pub fn dismiss(&mut self, index: usize) -> Option<RecognitionEvent> {
        self.entries.remove(index)
    }

    pub fn get(&self, index: usize) -> Option<&RecognitionEvent> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&RecognitionEvent> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecognitionEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPayload;
    use chrono::{TimeZone, Utc};

    fn event(n: i64) -> RecognitionEvent {
        RecognitionEvent {
            timestamp: Utc.timestamp_opt(n, 0).unwrap(),
            payload: EventPayload::VisitUpdated {
                person_id: Some(format!("p{n}")),
                status: None,
            },
        }
    }

    fn ids(history: &NotificationHistory) -> Vec<i64> {
        history.iter().map(|e| e.timestamp.timestamp()).collect()
    }

    #[test]
    fn test_push_is_most_recent_first() {
        let mut history = NotificationHistory::default();
        history.push(event(1));
        history.push(event(2));
        assert_eq!(ids(&history), vec![2, 1]);
        assert_eq!(history.latest().map(|e| e.timestamp.timestamp()), Some(2));
    }

    #[test]
    fn test_eleventh_event_drops_oldest() {
        let mut history = NotificationHistory::default();
        for n in 1..=10 {
            assert!(history.push(event(n)).is_none());
        }
        let dropped = history.push(event(11)).expect("oldest must be dropped");
        assert_eq!(dropped.timestamp.timestamp(), 1);
        assert_eq!(history.len(), 10);
        assert_eq!(ids(&history), (2..=11).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = NotificationHistory::with_capacity(3);
        for n in 0..50 {
            history.push(event(n));
            assert!(history.len() <= 3);
        }
    }

    #[test]
    fn test_dismiss_removes_exactly_one_entry() {
        let mut history = NotificationHistory::default();
        for n in 1..=5 {
            history.push(event(n));
        }
        let before: Vec<RecognitionEvent> = history.iter().cloned().collect();

        let removed = history.dismiss(2).unwrap();
        assert_eq!(removed, before[2]);

        let after: Vec<RecognitionEvent> = history.iter().cloned().collect();
        let mut expected = before.clone();
        expected.remove(2);
        assert_eq!(after, expected);
    }

    #[test]
    fn test_dismiss_out_of_range_is_noop() {
        let mut history = NotificationHistory::default();
        history.push(event(1));
        assert!(history.dismiss(5).is_none());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut history = NotificationHistory::with_capacity(0);
        history.push(event(1));
        history.push(event(2));
        assert_eq!(ids(&history), vec![2]);
        assert_eq!(history.capacity(), 1);
    }
}
