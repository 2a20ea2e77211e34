//! Last-write-wins cell for overlapping refreshes.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Holds the value of the newest completed request.
///
/// Callers take a ticket before issuing a request and hand it back with the
/// result; results carrying an older ticket than the one already applied are
/// dropped.
#[derive(Debug, Default)]
pub struct Latest<T> {
    issued: AtomicU64,
    slot: Mutex<Slot<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    applied: u64,
    value: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            applied: 0,
            value: None,
        }
    }
}

impl<T: Clone> Latest<T> {
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Next sequence number; strictly increasing, starts at 1.
    pub fn ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store `value` unless a newer ticket was already applied.
    pub fn apply(&self, ticket: u64, value: T) -> bool {
        let mut slot = self.slot.lock();
        if ticket <= slot.applied {
            return false;
        }
        slot.applied = ticket;
        slot.value = Some(value);
        true
    }

    pub fn get(&self) -> Option<T> {
        self.slot.lock().value.clone()
    }

    /// Ticket of the value currently held, 0 if none.
    pub fn applied(&self) -> u64 {
        self.slot.lock().applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_results_are_dropped() {
        let cell = Latest::new();
        let first = cell.ticket();
        let second = cell.ticket();
        assert!(second > first);

        assert!(cell.apply(second, "new"));
        assert!(!cell.apply(first, "old"));
        assert_eq!(cell.get(), Some("new"));
        assert_eq!(cell.applied(), second);
    }

    #[test]
    fn test_in_order_results_overwrite() {
        let cell = Latest::new();
        let a = cell.ticket();
        assert!(cell.apply(a, 1));
        let b = cell.ticket();
        assert!(cell.apply(b, 2));
        assert_eq!(cell.get(), Some(2));
    }
}
