//! System configuration parameters and persisted records.
//!
//! All tunable parameters for the TreatWheel dispenser.  Values are
//! persisted via NVS (non-volatile storage) and can be overridden from
//! the web configuration surface.
//!
//! Oversized credential and setting strings are **clamped** to their
//! buffer capacity rather than rejected — the radio and flash limits are
//! hard, and the UI intentionally has no validation-error path.

use serde::{Deserialize, Serialize};

/// Hardware radio limit: SSID payload, excluding NUL.
pub const SSID_MAX_BYTES: usize = 31;
/// Hardware radio limit: WPA2 passphrase payload, excluding NUL.
pub const PASSPHRASE_MAX_BYTES: usize = 63;

// ---------------------------------------------------------------------------
// WiFi credentials
// ---------------------------------------------------------------------------

/// SSID + passphrase pair, fixed-capacity to match the radio's limits.
///
/// Produced by the web surface, consumed once by the network supervisor
/// through the credential slot queue, then persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: heapless::String<SSID_MAX_BYTES>,
    pub passphrase: heapless::String<PASSPHRASE_MAX_BYTES>,
}

impl WifiCredentials {
    /// Build credentials from untrusted input, truncating to capacity.
    pub fn clamped(ssid: &str, passphrase: &str) -> Self {
        Self {
            ssid: clamp_str(ssid),
            passphrase: clamp_str(passphrase),
        }
    }

    /// True when no network has been configured yet.
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }
}

/// Truncate `s` to the capacity of the target string, on a char boundary.
fn clamp_str<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// MQTT configuration
// ---------------------------------------------------------------------------

/// Broker connection settings for the telemetry publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub server: heapless::String<64>,
    pub port: u16,
    pub username: heapless::String<32>,
    pub password: heapless::String<64>,
    pub topic_prefix: heapless::String<64>,
    pub enabled: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: clamp_str("10.4.0.4"),
            port: 1883,
            username: clamp_str("treat_wheel"),
            password: heapless::String::new(),
            topic_prefix: clamp_str("iot/device/treatwheel"),
            enabled: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispenser configuration
// ---------------------------------------------------------------------------

/// Core dispenser tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenserConfig {
    /// Distance at which a dispense triggers automatically (cm).
    pub distance_threshold_cm: u32,
    /// Wheel circumference divided by the number of magnets (cm/pulse).
    pub distance_per_pulse_cm: u32,
    /// Minimum gap between accepted wheel pulses (ms).  Zero disables
    /// debouncing; raise slowly if position reads bounce.
    pub wheel_debounce_ms: u32,

    /// Settle window bracketing motor actuation, during which the
    /// photo-interrupter readings are not trusted (ms).
    pub settle_ms: u32,
    /// Accumulated starve time before the hopper-empty warning latches (ms).
    pub hopper_empty_ms: u32,
    /// Hard ceiling on a single dispense session (ms).
    pub dispense_timeout_ms: u32,

    /// Control-task poll period (ms).  Must stay short: the actuation
    /// loop exits on an ISR-cleared flag.
    pub control_loop_interval_ms: u32,
    /// Network supervisor poll period (ms).
    pub network_poll_interval_ms: u32,
    /// Bounded wait for one station connection attempt (ms).
    pub connect_timeout_ms: u32,
    /// Telemetry publish interval (seconds).
    pub telemetry_interval_secs: u32,
    /// Counter auto-save debounce (seconds) — flash write-cycle limits.
    pub counter_save_interval_secs: u32,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            distance_threshold_cm: 100 * 100, // 100 m
            distance_per_pulse_cm: 22,
            wheel_debounce_ms: 0,

            settle_ms: 200,
            hopper_empty_ms: 5_000,
            dispense_timeout_ms: 30_000,

            control_loop_interval_ms: 1,
            network_poll_interval_ms: 200,
            connect_timeout_ms: 15_000,
            telemetry_interval_secs: 300,
            counter_save_interval_secs: 3600,
        }
    }
}

impl DispenserConfig {
    /// Clamp a threshold update to a sane floor.  A zero threshold would
    /// drain the hopper continuously, so the setter refuses to go below
    /// one wheel revolution's worth of distance.
    pub fn set_distance_threshold_cm(&mut self, cm: u32) {
        self.distance_threshold_cm = cm.max(self.distance_per_pulse_cm.max(1));
    }
}

// ---------------------------------------------------------------------------
// Lifetime counters
// ---------------------------------------------------------------------------

/// Lifetime usage statistics, persisted on a slow debounce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Total distance ever recorded on the wheel (cm).  Survives trip
    /// resets of the odometer.
    pub lifetime_distance_cm: u32,
    /// Total treats successfully dispensed.
    pub treats_dispensed: u32,
}

// ---------------------------------------------------------------------------
// Aggregate persisted record
// ---------------------------------------------------------------------------

/// Everything the persistence gateway loads at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub wifi: WifiCredentials,
    pub mqtt: MqttConfig,
    pub dispenser: DispenserConfig,
    pub counters: Counters,
}
