//! Per-key coalescing queue for asynchronous hardware events.

use std::collections::{BTreeMap, VecDeque};

/// An event that can be coalesced with others for the same key.
pub trait Coalesce {
    type Key: Ord + Clone;

    fn key(&self) -> Self::Key;

    /// A withdrawal discards every pending event for its key.
    fn is_withdrawal(&self) -> bool;
}

/// Queue that keeps at most the latest state per key.
///
/// Coalescing rules:
/// - a withdrawal drops all pending events for the key, then queues itself
/// - an update replaces a pending update for the key (newest wins)
/// - an update after a pending withdrawal is queued behind it
///
/// Events for one key come out in arrival order. Keys are drained in key
/// order.
pub struct EventQueue<E: Coalesce> {
    pending: BTreeMap<E::Key, VecDeque<E>>,
    len: usize,
}

impl<E: Coalesce> std::fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("keys", &self.pending.len())
            .field("len", &self.len)
            .finish()
    }
}

impl<E: Coalesce> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Coalesce> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, event: E) {
        let queue = self.pending.entry(event.key()).or_default();

        if event.is_withdrawal() {
            self.len -= queue.len();
            queue.clear();
            queue.push_back(event);
            self.len += 1;
            return;
        }

        match queue.back_mut() {
            Some(last) if !last.is_withdrawal() => *last = event,
            _ => {
                queue.push_back(event);
                self.len += 1;
            }
        }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = E>) {
        for event in events {
            self.push(event);
        }
    }

    /// Removes up to `max` events.
    pub fn pop_batch(&mut self, max: usize) -> Vec<E> {
        let mut batch = Vec::with_capacity(max.min(self.len));
        while batch.len() < max {
            let Some(mut entry) = self.pending.first_entry() else {
                break;
            };
            if let Some(event) = entry.get_mut().pop_front() {
                batch.push(event);
                self.len -= 1;
            }
            if entry.get().is_empty() {
                entry.remove();
            }
        }
        batch
    }

    pub fn drain(&mut self) -> Vec<E> {
        self.pop_batch(self.len)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Set(u32, char),
        Gone(u32),
    }

    impl Coalesce for Ev {
        type Key = u32;

        fn key(&self) -> u32 {
            match self {
                Ev::Set(k, _) | Ev::Gone(k) => *k,
            }
        }

        fn is_withdrawal(&self) -> bool {
            matches!(self, Ev::Gone(_))
        }
    }

    #[test]
    fn test_updates_coalesce_newest_wins() {
        let mut queue = EventQueue::new();
        queue.extend([Ev::Set(1, 'a'), Ev::Set(1, 'b'), Ev::Set(2, 'x')]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec![Ev::Set(1, 'b'), Ev::Set(2, 'x')]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_withdrawal_supersedes_pending_updates() {
        let mut queue = EventQueue::new();
        queue.extend([Ev::Set(1, 'a'), Ev::Gone(1)]);
        assert_eq!(queue.drain(), vec![Ev::Gone(1)]);
    }

    #[test]
    fn test_update_after_withdrawal_is_kept() {
        let mut queue = EventQueue::new();
        queue.extend([Ev::Gone(1), Ev::Set(1, 'a'), Ev::Set(1, 'b')]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec![Ev::Gone(1), Ev::Set(1, 'b')]);
    }

    #[test]
    fn test_pop_batch_respects_limit() {
        let mut queue = EventQueue::new();
        queue.extend((0..5).map(|k| Ev::Set(k, 'z')));

        let first = queue.pop_batch(3);
        assert_eq!(first.len(), 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_batch(10), vec![Ev::Set(3, 'z'), Ev::Set(4, 'z')]);
        assert!(queue.pop_batch(1).is_empty());
    }
}
