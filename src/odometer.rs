//! Debounced wheel odometer.
//!
//! Converts accepted wheel-sensor pulses into distance and compares it
//! against the dispense threshold.  The trip counter monotonically
//! increases until an explicit [`reset`](Odometer::reset) — fired after
//! a dispense triggers or on a stats reset — while lifetime distance is
//! tracked separately in [`Counters`](crate::config::Counters) and is
//! untouched by trip resets.

use log::debug;

/// Trip-distance accumulator.
#[derive(Debug)]
pub struct Odometer {
    pulse_count: u32,
    distance_per_pulse_cm: u32,
    threshold_cm: u32,
}

impl Odometer {
    pub fn new(distance_per_pulse_cm: u32, threshold_cm: u32) -> Self {
        Self {
            pulse_count: 0,
            distance_per_pulse_cm,
            threshold_cm,
        }
    }

    /// Record one debounced wheel pulse.
    pub fn record_pulse(&mut self) {
        self.pulse_count = self.pulse_count.saturating_add(1);
        debug!(
            "odometer: {} cm of {} cm",
            self.distance_cm(),
            self.threshold_cm
        );
    }

    /// Trip distance so far.
    pub fn distance_cm(&self) -> u32 {
        self.pulse_count
            .saturating_mul(self.distance_per_pulse_cm)
    }

    pub fn pulse_count(&self) -> u32 {
        self.pulse_count
    }

    /// True once the trip distance has reached the threshold.  The
    /// caller gates this on the fatal-fault latch; the odometer itself
    /// only does the arithmetic.
    pub fn threshold_reached(&self) -> bool {
        self.distance_cm() >= self.threshold_cm
    }

    /// Zero the trip counter.  Lifetime distance lives elsewhere and is
    /// deliberately not touched here.
    pub fn reset(&mut self) {
        self.pulse_count = 0;
    }

    /// Apply a runtime threshold change from the settings surface.
    pub fn set_threshold_cm(&mut self, threshold_cm: u32) {
        self.threshold_cm = threshold_cm;
    }

    pub fn threshold_cm(&self) -> u32 {
        self.threshold_cm
    }
}
