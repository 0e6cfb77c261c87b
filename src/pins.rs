//! GPIO / peripheral pin assignments for the TreatWheel main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Hall-effect wheel position sensor — one pulse per magnet pass.
pub const WHEEL_SENSOR_GPIO: i32 = 4;

/// Photo-interrupter watching the hopper feed path.  Falling edge =
/// treat blocking the light path.  Driven by its paired LED output, so
/// the signal is only meaningful while [`HOPPER_LED_GPIO`] is high.
pub const HOPPER_SENSOR_GPIO: i32 = 17;

/// Photo-interrupter watching the dispense chute exit.  Falling edge =
/// treat leaving the machine.
pub const DISPENSE_SENSOR_GPIO: i32 = 16;

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Emitter LED for the hopper photo-interrupter.  Only energised
/// around a dispense session to save power and LED lifetime.
pub const HOPPER_LED_GPIO: i32 = 18;

/// Emitter LED for the dispense-chute photo-interrupter.
pub const DISPENSE_LED_GPIO: i32 = 19;

/// Continuous-rotation servo signal (50 Hz PWM).
pub const MOTOR_GPIO: i32 = 21;

/// Fault indicator LED — driven solid while the fully-out-of-treats
/// fault is latched.
pub const FAULT_LED_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Servo signal configuration
// ---------------------------------------------------------------------------

/// Standard 50 Hz servo frame rate.
pub const MOTOR_PWM_FREQ_HZ: u32 = 50;
/// Pulse width commanding the continuous servo to hold still.
pub const MOTOR_NEUTRAL_US: u32 = 1500;
/// Pulse width commanding dispense-direction rotation.
pub const MOTOR_DISPENSE_US: u32 = 2000;
/// Servo attach limits (matches the stock horn driver on the original
/// board).
pub const MOTOR_MIN_US: u32 = 544;
pub const MOTOR_MAX_US: u32 = 2400;
