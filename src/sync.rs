//! Capacity-1 cross-task handoff queue with overwrite-latest semantics.
//!
//! Credential and settings changes are rare, user-driven events where
//! only the most recent pending request matters: a second submission
//! before the consumer wakes simply supersedes the first.  The producer
//! therefore never blocks, and the consumer polls at its own loop rate.
//!
//! A `Mutex<Option<T>>` is sufficient here — both sides hold the lock
//! for a handful of instructions, far below any task deadline, and the
//! queue never sits on the 1 ms dispense hot path.

use std::sync::Mutex;

/// Single-slot, latest-wins queue.
#[derive(Debug)]
pub struct SlotQueue<T> {
    slot: Mutex<Option<T>>,
}

impl<T> SlotQueue<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Deposit a value, replacing any unconsumed predecessor.
    /// Returns `true` if an older value was displaced.
    pub fn send(&self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.replace(value).is_some()
    }

    /// Take the pending value, if any.  Non-blocking.
    pub fn recv(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    /// True if a value is waiting.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl<T> Default for SlotQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_recv_is_none() {
        let q: SlotQueue<u32> = SlotQueue::new();
        assert!(q.recv().is_none());
        assert!(!q.is_pending());
    }

    #[test]
    fn latest_wins() {
        let q = SlotQueue::new();
        assert!(!q.send(1));
        assert!(q.send(2)); // displaces 1
        assert_eq!(q.recv(), Some(2));
        assert!(q.recv().is_none());
    }

    #[test]
    fn consume_is_destructive() {
        let q = SlotQueue::new();
        q.send("creds");
        assert!(q.is_pending());
        assert_eq!(q.recv(), Some("creds"));
        assert!(!q.is_pending());
    }
}
