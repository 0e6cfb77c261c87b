//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (actuators, storage, event sinks) implement these
//! traits.  The [`AppService`](super::service::AppService) consumes them
//! via generics, so the domain core never touches hardware directly.
//! The wheel and photo-interrupter inputs are *not* ports: they arrive
//! through lock-free ISR signals owned by [`crate::sensors`].

use crate::config::{Counters, MqttConfig, StoredConfig, WifiCredentials};
use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to command actuators.
pub trait ActuatorPort {
    /// Drive the dispense wheel motor at dispense speed.
    fn motor_dispense(&mut self);

    /// Hold the motor at its neutral (stopped) position.
    fn motor_neutral(&mut self);

    /// Power or darken both photo-interrupter emitter LEDs together.
    fn set_sensor_leds(&mut self, on: bool);

    /// Drive the fault indicator output.
    fn set_fault_led(&mut self, on: bool);

    /// Motor neutral, all indicators off — safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Persistence port (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Load/save contract for configuration and counters.
///
/// Every operation is idempotent and safe to call repeatedly; callers
/// tolerate defaulted values when storage is empty or corrupt.
pub trait PersistencePort {
    /// Load the full stored record, defaulting any missing section.
    fn load_config(&self) -> Result<StoredConfig, StorageError>;

    /// Persist WiFi credentials alone (hot path for the provisioning flow).
    fn save_wifi(&mut self, creds: &WifiCredentials) -> Result<(), StorageError>;

    /// Persist the settings the web surface can change.
    fn save_config(
        &mut self,
        mqtt: &MqttConfig,
        distance_threshold_cm: u32,
    ) -> Result<(), StorageError>;

    /// Persist lifetime counters (periodic, and on stats reset).
    fn save_counters(&mut self, counters: &Counters) -> Result<(), StorageError>;

    /// Forget stored credentials.
    fn clear_wifi(&mut self) -> Result<(), StorageError>;

    /// Forget stored settings (counters survive).
    fn clear_config(&mut self) -> Result<(), StorageError>;

    /// True until [`set_initial_config`](Self::set_initial_config) has
    /// run once on this device.
    fn first_boot(&self) -> Result<bool, StorageError>;

    /// One-time initializer: write factory defaults and clear the
    /// first-boot marker.
    fn set_initial_config(&mut self, defaults: &StoredConfig) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT,
/// web status cache).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
