//! Inbound settings updates to the application service.
//!
//! One-shot requests (manual dispense, fault reset, stats reset, trial
//! mode) travel as atomic flags on [`SharedState`](crate::state::SharedState);
//! only the richer settings payload needs a queue.  The web surface
//! produces at most one of these per user action and the newest always
//! supersedes older unconsumed ones, so a capacity-1 slot queue carries
//! them to the control task.

use serde::Deserialize;

use crate::config::MqttConfig;

/// A partial settings change from the web surface.  `None` fields are
/// left untouched.  Deserialises directly from the settings endpoint's
/// JSON body, where absent keys map to `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    /// New dispense trigger distance, centimetres.
    pub distance_threshold_cm: Option<u32>,
    /// New wheel-pulse debounce interval, milliseconds.
    pub wheel_debounce_ms: Option<u32>,
    /// Replacement MQTT broker configuration.
    pub mqtt: Option<MqttConfig>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.distance_threshold_cm.is_none()
            && self.wheel_debounce_ms.is_none()
            && self.mqtt.is_none()
    }
}
