//! Photo-interrupter ISR signals for the hopper and dispense chutes.
//!
//! Both sensors trigger on a falling edge (treat blocking the light
//! path).  The handlers run in interrupt context and must complete in
//! O(1) with no blocking and no I/O, so each one only flips atomics in
//! a [`PhotogateSignals`] block; the dispense controller polls those
//! atomics and owns every actual state transition.
//!
//! ## Guard flag
//!
//! The emitter LEDs that drive the sensors are toggled around each
//! dispense session, and their output is garbage while stabilising.
//! The controller raises the guard across those settle windows; while
//! the guard is up the hopper handler does nothing.  The dispense
//! handler is deliberately unguarded — clearing the `dispensing` flag
//! is idempotent and is the session's sole normal-path exit signal.
//!
//! No debouncing here: spurious re-triggers only re-run an idempotent
//! store, and the controller's settle windows absorb the bounce.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Atomic signal block shared between the ISRs and the dispense
/// controller.  A single static instance backs the real interrupt
/// handlers; tests construct their own to stay isolated.
#[derive(Debug)]
pub struct PhotogateSignals {
    /// While true, the hopper handler must not react (settle window).
    guard: AtomicBool,
    /// Session-active flag; cleared by the dispense-chute ISR.
    dispensing: AtomicBool,
    /// Accumulated actuation time without a hopper sighting (ms).
    /// Carries over between sessions; zeroed only by the hopper ISR.
    starve_ms: AtomicU32,
    /// Set by the hopper ISR on a confirmed sighting; consumed once by
    /// the controller to retract the hopper-empty warning.
    hopper_seen: AtomicBool,
}

impl PhotogateSignals {
    pub const fn new() -> Self {
        Self {
            guard: AtomicBool::new(true),
            dispensing: AtomicBool::new(false),
            starve_ms: AtomicU32::new(0),
            hopper_seen: AtomicBool::new(false),
        }
    }

    // ── ISR side ──────────────────────────────────────────────

    /// Hopper photo-interrupter falling edge.
    pub fn hopper_edge(&self) {
        if !self.guard.load(Ordering::Acquire) {
            self.starve_ms.store(0, Ordering::Release);
            self.hopper_seen.store(true, Ordering::Release);
        }
    }

    /// Dispense-chute photo-interrupter falling edge.
    pub fn dispense_edge(&self) {
        self.dispensing.store(false, Ordering::Release);
    }

    // ── Controller side (single consumer) ─────────────────────

    pub fn set_guard(&self, up: bool) {
        self.guard.store(up, Ordering::Release);
    }

    pub fn guard(&self) -> bool {
        self.guard.load(Ordering::Acquire)
    }

    pub fn set_dispensing(&self, on: bool) {
        self.dispensing.store(on, Ordering::Release);
    }

    pub fn dispensing(&self) -> bool {
        self.dispensing.load(Ordering::Acquire)
    }

    /// Accumulate actuation time into the starve counter and return the
    /// new total.  Racing a hopper ISR reset is benign: the worst case
    /// under-counts by one poll period.
    pub fn add_starve_ms(&self, elapsed_ms: u32) -> u32 {
        self.starve_ms
            .fetch_add(elapsed_ms, Ordering::AcqRel)
            .saturating_add(elapsed_ms)
    }

    pub fn starve_ms(&self) -> u32 {
        self.starve_ms.load(Ordering::Acquire)
    }

    /// Consume a pending hopper sighting.
    pub fn take_hopper_seen(&self) -> bool {
        self.hopper_seen.swap(false, Ordering::AcqRel)
    }
}

impl Default for PhotogateSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// The signal block wired to the real GPIO interrupt handlers.
/// `static` because ESP-IDF ISR callbacks cannot capture closures.
pub static PHOTOGATE: PhotogateSignals = PhotogateSignals::new();

/// Registered for the hopper sensor's falling edge.
pub fn hopper_isr_handler() {
    PHOTOGATE.hopper_edge();
}

/// Registered for the dispense-chute sensor's falling edge.
pub fn dispense_isr_handler() {
    PHOTOGATE.dispense_edge();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_hopper_edge_is_ignored() {
        let sig = PhotogateSignals::new();
        sig.add_starve_ms(4000);
        sig.set_guard(true);
        sig.hopper_edge();
        assert_eq!(sig.starve_ms(), 4000);
        assert!(!sig.take_hopper_seen());
    }

    #[test]
    fn unguarded_hopper_edge_resets_starve() {
        let sig = PhotogateSignals::new();
        sig.add_starve_ms(4000);
        sig.set_guard(false);
        sig.hopper_edge();
        assert_eq!(sig.starve_ms(), 0);
        assert!(sig.take_hopper_seen());
        // consumed once
        assert!(!sig.take_hopper_seen());
    }

    #[test]
    fn dispense_edge_clears_flag_even_under_guard() {
        let sig = PhotogateSignals::new();
        sig.set_dispensing(true);
        sig.set_guard(true);
        sig.dispense_edge();
        assert!(!sig.dispensing());
    }

    #[test]
    fn repeated_edges_are_idempotent() {
        let sig = PhotogateSignals::new();
        sig.set_guard(false);
        sig.set_dispensing(true);
        for _ in 0..5 {
            sig.dispense_edge();
            sig.hopper_edge();
        }
        assert!(!sig.dispensing());
        assert_eq!(sig.starve_ms(), 0);
    }
}
