//! Shared mutable context threaded through every dispense state handler.
//!
//! `DispenseContext` is the single struct that state handlers read from
//! and write to: ISR signal handles, actuator command outputs, timing,
//! configuration, and the latched fault state.  The control task applies
//! `commands` to the real actuators after each tick.

use crate::config::DispenserConfig;
use crate::faults::FaultLatch;
use crate::sensors::photogate::PhotogateSignals;

// ---------------------------------------------------------------------------
// Actuator commands (written by state handlers; consumed by control task)
// ---------------------------------------------------------------------------

/// Commands that state handlers write to request actuator actions.
/// The control task applies these to the actual drivers each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorCommands {
    /// Drive the wheel motor at dispense speed (`false` = hold neutral).
    pub motor_run: bool,
    /// Power the photo-interrupter emitter LEDs.
    pub sensor_leds_on: bool,
}

impl ActuatorCommands {
    /// Motor neutral, emitters dark — safe default.
    pub fn all_off() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// DispenseContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct DispenseContext {
    // -- Timing --
    /// Milliseconds accumulated since the current state was entered.
    pub ms_in_state: u32,
    /// Milliseconds accumulated since the motor started this session.
    pub session_elapsed_ms: u32,
    /// Wall-clock milliseconds covered by the tick in progress.
    pub tick_elapsed_ms: u32,

    // -- ISR signals --
    /// Photo-interrupter edge signals shared with interrupt context.
    pub signals: &'static PhotogateSignals,

    // -- Actuator outputs --
    /// Commands to be applied to actuators after the FSM tick.
    pub commands: ActuatorCommands,

    // -- Configuration --
    /// Dispenser tuning parameters (settle, starve, timeout windows).
    pub config: DispenserConfig,

    // -- Faults --
    /// Latched fault state.  `OutOfTreats` gates new sessions.
    pub faults: FaultLatch,

    // -- Session bookkeeping --
    /// True once a trigger (threshold or manual) is waiting to be served.
    pending_trigger: bool,
    /// Set when the in-flight session was aborted by the hard timeout.
    pub session_timed_out: bool,
    /// Sessions that ran to completion (treat confirmed at the chute).
    /// The app service diffs this against its own count to credit treats.
    pub sessions_completed: u32,
}

impl DispenseContext {
    pub fn new(config: DispenserConfig, signals: &'static PhotogateSignals) -> Self {
        Self {
            ms_in_state: 0,
            session_elapsed_ms: 0,
            tick_elapsed_ms: 0,
            signals,
            commands: ActuatorCommands::all_off(),
            config,
            faults: FaultLatch::new(),
            pending_trigger: false,
            session_timed_out: false,
            sessions_completed: 0,
        }
    }

    /// Arm a dispense request.  Idempotent while one is already pending;
    /// the Idle handler consumes it on the next tick.
    pub fn request_dispense(&mut self) {
        self.pending_trigger = true;
    }

    /// Consume the pending trigger, if any.
    pub fn take_trigger(&mut self) -> bool {
        core::mem::take(&mut self.pending_trigger)
    }

    pub fn trigger_pending(&self) -> bool {
        self.pending_trigger
    }
}
