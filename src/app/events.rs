//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them — log to serial, publish over
//! MQTT, refresh the web status cache.

use serde::Serialize;

use crate::dispense::StateId;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// The dispense FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A dispense session completed and a treat was credited.
    TreatDispensed { lifetime_total: u32 },

    /// One or more device faults are newly latched.
    FaultRaised(u8),

    /// All latched faults were cleared by an external reset.
    FaultsCleared,

    /// Lifetime counters were zeroed by an external stats reset.
    StatsReset,
}

/// A point-in-time snapshot suitable for telemetry publication or the
/// web status surface.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    /// Dispense FSM state name.
    pub dispense_state: &'static str,
    /// True while a dispense session is in flight.
    pub dispensing: bool,
    /// Network supervisory state name.
    pub network_state: &'static str,
    /// Distance accumulated toward the next trigger, centimetres.
    pub trip_distance_cm: u32,
    /// Trigger threshold, centimetres.
    pub distance_threshold_cm: u32,
    /// Total distance ever recorded, centimetres.
    pub lifetime_distance_cm: u32,
    /// Total treats credited over the device lifetime.
    pub treats_dispensed: u32,
    /// Hopper appears empty (informational, self-clearing on detection).
    pub hopper_empty: bool,
    /// Dispense timed out — latched until an external reset.
    pub out_of_treats: bool,
}
