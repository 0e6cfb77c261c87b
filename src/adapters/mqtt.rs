//! MQTT telemetry publisher.
//!
//! Read-only consumer of the shared counter/fault mirrors with one
//! inbound command surface: a `manualDispense` message, which lands in
//! the same request flag the web portal uses.
//!
//! Topic layout under the configured prefix:
//!
//! | topic                   | payload                      |
//! |-------------------------|------------------------------|
//! | `…/totalDistance`       | lifetime distance in metres  |
//! | `…/totalTreatsDispensed`| lifetime treat count         |
//! | `…/isOutOfTreats`       | `True` / `False`             |
//! | `…/manualDispense` (in) | `1` triggers a dispense      |
//!
//! Wire transport is behind [`MqttTransport`], so the publisher logic
//! runs under host tests against a recording stub.

use log::{info, warn};

use crate::config::MqttConfig;
use crate::error::{CommsError, DeviceFault};
use crate::state::SharedState;

// ───────────────────────────────────────────────────────────────
// Transport boundary
// ───────────────────────────────────────────────────────────────

/// Commands that can arrive over the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundCommand {
    ManualDispense,
}

pub trait MqttTransport {
    fn is_connected(&self) -> bool;

    /// (Re)connect and subscribe to the inbound command topic.
    fn connect(&mut self, cfg: &MqttConfig) -> Result<(), CommsError>;

    /// Drop the broker connection (benign when already down).
    fn disconnect(&mut self);

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), CommsError>;

    /// Pop one decoded inbound command, if any arrived since last poll.
    fn take_inbound(&mut self) -> Option<InboundCommand>;
}

// ───────────────────────────────────────────────────────────────
// Publisher
// ───────────────────────────────────────────────────────────────

/// Drives a transport from the telemetry task: reconnect, publish stats
/// on an interval, forward inbound dispense commands.
pub struct TelemetryPublisher<T: MqttTransport> {
    transport: T,
    cfg: MqttConfig,
    publish_interval_secs: u64,
    last_publish_secs: Option<u64>,
}

impl<T: MqttTransport> TelemetryPublisher<T> {
    pub fn new(transport: T, cfg: MqttConfig, publish_interval_secs: u64) -> Self {
        Self {
            transport,
            cfg,
            publish_interval_secs,
            last_publish_secs: None,
        }
    }

    /// Apply a settings change from the web surface.  Drops any live
    /// broker connection so the next tick reconnects against the new
    /// server, without waiting for a reboot.
    pub fn set_config(&mut self, cfg: MqttConfig) {
        if self.transport.is_connected() {
            self.transport.disconnect();
        }
        self.cfg = cfg;
        info!("mqtt config updated (enabled: {})", self.cfg.enabled);
    }

    /// One poll from the telemetry task.  `online` must be true only
    /// while the network supervisor reports a station connection — MQTT
    /// stays silent in AP and trial modes.
    pub fn tick(&mut self, now_secs: u64, online: bool, shared: &SharedState) {
        if !self.cfg.enabled || !online {
            return;
        }

        if !self.transport.is_connected() {
            if let Err(err) = self.transport.connect(&self.cfg) {
                warn!("mqtt connect failed: {err}");
                return;
            }
            info!("mqtt connected to {}:{}", self.cfg.server, self.cfg.port);
        }

        while let Some(cmd) = self.transport.take_inbound() {
            match cmd {
                InboundCommand::ManualDispense => {
                    info!("mqtt: manual dispense requested");
                    shared.request_manual_dispense();
                }
            }
        }

        let due = match self.last_publish_secs {
            None => true,
            Some(t) => now_secs.saturating_sub(t) >= self.publish_interval_secs,
        };
        if due {
            self.publish_stats(shared);
            self.last_publish_secs = Some(now_secs);
        }
    }

    fn publish_stats(&mut self, shared: &SharedState) {
        let prefix = self.cfg.topic_prefix.as_str();
        let distance_m = shared.lifetime_distance_cm() / 100;
        let out_of_treats = shared.fault_mask() & DeviceFault::OutOfTreats.mask() != 0;

        let results = [
            self.transport
                .publish(&format!("{prefix}/totalDistance"), &distance_m.to_string()),
            self.transport.publish(
                &format!("{prefix}/totalTreatsDispensed"),
                &shared.treats_dispensed().to_string(),
            ),
            self.transport.publish(
                &format!("{prefix}/isOutOfTreats"),
                if out_of_treats { "True" } else { "False" },
            ),
        ];
        if results.iter().any(Result::is_err) {
            warn!("mqtt publish failed, will retry next interval");
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF transport
// ───────────────────────────────────────────────────────────────

/// Device transport over the ESP-IDF MQTT client.
///
/// The client handle needs the TLS/event-loop wiring from main.rs;
/// until a broker deployment exists for field units this backend
/// reports "not connected" and the publisher idles.
#[cfg(target_os = "espidf")]
pub struct EspMqttTransport;

#[cfg(target_os = "espidf")]
impl EspMqttTransport {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl MqttTransport for EspMqttTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn connect(&mut self, cfg: &MqttConfig) -> Result<(), CommsError> {
        // esp_idf_svc::mqtt::client::EspMqttClient::new with
        // MqttClientConfiguration { username, password, .. } and a
        // subscription to "<prefix>/manualDispense".
        info!("mqtt(espidf): broker {}:{} configured, client wiring pending", cfg.server, cfg.port);
        Err(CommsError::MqttConnectFailed)
    }

    fn disconnect(&mut self) {}

    fn publish(&mut self, _topic: &str, _payload: &str) -> Result<(), CommsError> {
        Err(CommsError::MqttPublishFailed)
    }

    fn take_inbound(&mut self) -> Option<InboundCommand> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation transport (host tests)
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimMqtt {
    connected: bool,
    pub connected_to: Option<String>,
    pub published: Vec<(String, String)>,
    inbound: std::collections::VecDeque<InboundCommand>,
}

#[cfg(not(target_os = "espidf"))]
impl SimMqtt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&mut self, cmd: InboundCommand) {
        self.inbound.push_back(cmd);
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttTransport for SimMqtt {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, cfg: &MqttConfig) -> Result<(), CommsError> {
        self.connected = true;
        self.connected_to = Some(format!("{}:{}", cfg.server, cfg.port));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), CommsError> {
        self.published.push((topic.to_owned(), payload.to_owned()));
        Ok(())
    }

    fn take_inbound(&mut self) -> Option<InboundCommand> {
        self.inbound.pop_front()
    }
}
