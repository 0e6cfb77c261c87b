//! Latched device-fault supervisor.
//!
//! The latch accumulates a [`DeviceFault`] bitmask with strict
//! single-writer discipline: the dispense controller sets bits, the
//! hopper detection path may clear `HopperEmpty` on a confirmed
//! sighting, and **nothing** clears `OutOfTreats` except the explicit
//! external reset from the web or telemetry surface.
//!
//! ## Fault lifecycle
//!
//! 1. The actuating loop's starve accumulator crosses its limit →
//!    `HopperEmpty` latches (informational, dispensing continues).
//! 2. A session hits the hard ceiling → `OutOfTreats` latches; the
//!    fault LED goes solid and all dispensing is suppressed.
//! 3. A user presses "reset errors" → `clear_all()` drops both bits
//!    and threshold dispensing resumes immediately.

use crate::error::DeviceFault;
use log::{info, warn};

/// Owner of the latched fault bitmask.
#[derive(Debug, Default)]
pub struct FaultLatch {
    mask: u8,
}

impl FaultLatch {
    pub fn new() -> Self {
        Self { mask: 0 }
    }

    /// Latch a fault.  Logs only on the rising edge.
    pub fn latch(&mut self, fault: DeviceFault) {
        if self.mask & fault.mask() == 0 {
            warn!("fault latched: {fault}");
        }
        self.mask |= fault.mask();
    }

    /// Clear a single fault bit (used when the hopper sensor confirms
    /// a treat, retracting the informational warning).
    pub fn clear(&mut self, fault: DeviceFault) {
        if self.mask & fault.mask() != 0 {
            info!("fault cleared: {fault}");
        }
        self.mask &= !fault.mask();
    }

    /// Explicit external reset — the only path that clears `OutOfTreats`.
    pub fn clear_all(&mut self) {
        if self.mask != 0 {
            info!("all faults cleared by external reset");
        }
        self.mask = 0;
    }

    pub fn has(&self, fault: DeviceFault) -> bool {
        self.mask & fault.mask() != 0
    }

    pub fn any(&self) -> bool {
        self.mask != 0
    }

    /// Raw bitmask for telemetry / status snapshots.
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// True while dispensing (threshold **and** manual) is suppressed.
    pub fn dispense_suppressed(&self) -> bool {
        self.has(DeviceFault::OutOfTreats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let latch = FaultLatch::new();
        assert!(!latch.any());
        assert!(!latch.dispense_suppressed());
    }

    #[test]
    fn hopper_empty_does_not_suppress_dispensing() {
        let mut latch = FaultLatch::new();
        latch.latch(DeviceFault::HopperEmpty);
        assert!(latch.any());
        assert!(!latch.dispense_suppressed());
    }

    #[test]
    fn out_of_treats_suppresses_until_reset() {
        let mut latch = FaultLatch::new();
        latch.latch(DeviceFault::OutOfTreats);
        assert!(latch.dispense_suppressed());

        // A confirmed hopper sighting does not unlatch the fatal fault.
        latch.clear(DeviceFault::HopperEmpty);
        assert!(latch.dispense_suppressed());

        latch.clear_all();
        assert!(!latch.dispense_suppressed());
        assert!(!latch.any());
    }

    #[test]
    fn mask_tracks_both_bits() {
        let mut latch = FaultLatch::new();
        latch.latch(DeviceFault::HopperEmpty);
        latch.latch(DeviceFault::OutOfTreats);
        assert_eq!(
            latch.mask(),
            DeviceFault::HopperEmpty.mask() | DeviceFault::OutOfTreats.mask()
        );
    }
}
