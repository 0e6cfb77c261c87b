//! Process-wide shared state, single-writer / multi-reader.
//!
//! The original firmware shared these values as raw `volatile` globals.
//! Here each field is an atomic sized for torn-free access, grouped in
//! one struct that is handed to every task by reference.  Ownership
//! discipline is enforced by API shape:
//!
//! - network state: written only by the network supervisor;
//! - fault mirror and dispense activity: written only by the control task;
//! - request flags (manual dispense, fault reset, stats reset, trial
//!   mode): set by the web/telemetry surfaces, consumed exactly once by
//!   their owning task via `swap`.
//!
//! No mutexes — every field is a small alignment-safe primitive.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::dispense::StateId;
use crate::network::NetworkState;

/// Shared snapshot hub passed to every task.
#[derive(Debug)]
pub struct SharedState {
    /// Published [`NetworkState`] discriminant.
    network: AtomicU8,
    /// Mirror of the latched fault bitmask for cross-task readers.
    fault_mask: AtomicU8,
    /// True while a dispense session is between PreRoll and Settling.
    dispense_active: AtomicBool,
    /// Published dispense [`StateId`] discriminant.
    dispense_state: AtomicU8,

    /// One-shot request flags (set by producers, `swap`-consumed once).
    manual_dispense: AtomicBool,
    fault_reset: AtomicBool,
    stats_reset: AtomicBool,
    trial_mode: AtomicBool,
    wifi_reset: AtomicBool,
    config_reset: AtomicBool,
    restart: AtomicBool,

    /// Live counter mirrors for the status/telemetry surfaces.
    lifetime_distance_cm: AtomicU32,
    treats_dispensed: AtomicU32,
    trip_distance_cm: AtomicU32,
    distance_threshold_cm: AtomicU32,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            network: AtomicU8::new(NetworkState::Disconnected as u8),
            fault_mask: AtomicU8::new(0),
            dispense_active: AtomicBool::new(false),
            dispense_state: AtomicU8::new(StateId::Idle as u8),
            manual_dispense: AtomicBool::new(false),
            fault_reset: AtomicBool::new(false),
            stats_reset: AtomicBool::new(false),
            trial_mode: AtomicBool::new(false),
            wifi_reset: AtomicBool::new(false),
            config_reset: AtomicBool::new(false),
            restart: AtomicBool::new(false),
            lifetime_distance_cm: AtomicU32::new(0),
            treats_dispensed: AtomicU32::new(0),
            trip_distance_cm: AtomicU32::new(0),
            distance_threshold_cm: AtomicU32::new(0),
        }
    }

    // ── Network state (single writer: network supervisor) ─────

    pub fn publish_network(&self, state: NetworkState) {
        self.network.store(state as u8, Ordering::Release);
    }

    pub fn network(&self) -> NetworkState {
        NetworkState::from_u8(self.network.load(Ordering::Acquire))
    }

    // ── Fault mirror (single writer: control task) ────────────

    pub fn publish_faults(&self, mask: u8) {
        self.fault_mask.store(mask, Ordering::Release);
    }

    pub fn fault_mask(&self) -> u8 {
        self.fault_mask.load(Ordering::Acquire)
    }

    // ── Dispense activity (single writer: control task) ───────

    pub fn publish_dispense_active(&self, active: bool) {
        self.dispense_active.store(active, Ordering::Release);
    }

    pub fn dispense_active(&self) -> bool {
        self.dispense_active.load(Ordering::Acquire)
    }

    pub fn publish_dispense_state(&self, state: StateId) {
        self.dispense_state.store(state as u8, Ordering::Release);
    }

    pub fn dispense_state(&self) -> StateId {
        StateId::from_index(self.dispense_state.load(Ordering::Acquire) as usize)
    }

    // ── Request flags ─────────────────────────────────────────

    pub fn request_manual_dispense(&self) {
        self.manual_dispense.store(true, Ordering::Release);
    }

    /// Consume the manual-dispense request, if one is pending.
    pub fn take_manual_dispense(&self) -> bool {
        self.manual_dispense.swap(false, Ordering::AcqRel)
    }

    pub fn request_fault_reset(&self) {
        self.fault_reset.store(true, Ordering::Release);
    }

    pub fn take_fault_reset(&self) -> bool {
        self.fault_reset.swap(false, Ordering::AcqRel)
    }

    pub fn request_stats_reset(&self) {
        self.stats_reset.store(true, Ordering::Release);
    }

    pub fn take_stats_reset(&self) -> bool {
        self.stats_reset.swap(false, Ordering::AcqRel)
    }

    pub fn request_trial_mode(&self) {
        self.trial_mode.store(true, Ordering::Release);
    }

    pub fn take_trial_mode(&self) -> bool {
        self.trial_mode.swap(false, Ordering::AcqRel)
    }

    pub fn request_wifi_reset(&self) {
        self.wifi_reset.store(true, Ordering::Release);
    }

    pub fn take_wifi_reset(&self) -> bool {
        self.wifi_reset.swap(false, Ordering::AcqRel)
    }

    pub fn request_config_reset(&self) {
        self.config_reset.store(true, Ordering::Release);
    }

    pub fn take_config_reset(&self) -> bool {
        self.config_reset.swap(false, Ordering::AcqRel)
    }

    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::Release);
    }

    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::AcqRel)
    }

    // ── Counter mirrors (single writer: control task) ─────────

    pub fn publish_counters(&self, lifetime_cm: u32, treats: u32, trip_cm: u32) {
        self.lifetime_distance_cm
            .store(lifetime_cm, Ordering::Release);
        self.treats_dispensed.store(treats, Ordering::Release);
        self.trip_distance_cm.store(trip_cm, Ordering::Release);
    }

    pub fn lifetime_distance_cm(&self) -> u32 {
        self.lifetime_distance_cm.load(Ordering::Acquire)
    }

    pub fn treats_dispensed(&self) -> u32 {
        self.treats_dispensed.load(Ordering::Acquire)
    }

    pub fn trip_distance_cm(&self) -> u32 {
        self.trip_distance_cm.load(Ordering::Acquire)
    }

    pub fn publish_threshold_cm(&self, cm: u32) {
        self.distance_threshold_cm.store(cm, Ordering::Release);
    }

    pub fn distance_threshold_cm(&self) -> u32 {
        self.distance_threshold_cm.load(Ordering::Acquire)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
