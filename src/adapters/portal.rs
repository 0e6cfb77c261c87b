//! Web configuration portal, transport-agnostic core.
//!
//! The original device exposed a small set of HTTP endpoints while in
//! AP mode (and on the LAN once connected): status JSON, Wi-Fi
//! credential submission, dispenser/MQTT settings, and one-shot actions
//! (manual dispense, error reset, stats reset, trial run).  This module
//! holds the behaviour behind those endpoints; the route table itself
//! is wired to `esp_idf_svc::http::server::EspHttpServer` in `main.rs`
//! and each handler is a one-line call into [`Portal`].
//!
//! Every mutation goes through a lock-free seam: one-shot actions set
//! [`SharedState`] request flags, and structured payloads (credentials,
//! settings) travel over capacity-one [`SlotQueue`]s where a newer
//! submission simply replaces an unconsumed older one.

use log::info;

use crate::app::commands::SettingsUpdate;
use crate::app::events::TelemetrySnapshot;
use crate::config::WifiCredentials;
use crate::error::DeviceFault;
use crate::network::NetworkState;
use crate::state::SharedState;
use crate::sync::SlotQueue;

/// Handler backend shared by all portal routes.  `Copy` because every
/// field is a `'static` reference, so each route closure takes its own.
#[derive(Clone, Copy)]
pub struct Portal {
    shared: &'static SharedState,
    creds_tx: &'static SlotQueue<WifiCredentials>,
    settings_tx: &'static SlotQueue<SettingsUpdate>,
}

impl Portal {
    pub fn new(
        shared: &'static SharedState,
        creds_tx: &'static SlotQueue<WifiCredentials>,
        settings_tx: &'static SlotQueue<SettingsUpdate>,
    ) -> Self {
        Self {
            shared,
            creds_tx,
            settings_tx,
        }
    }

    // ── Credential / settings submission ──────────────────────

    /// Queue Wi-Fi credentials for the network supervisor.  Oversized
    /// fields are truncated to what the radio accepts (31/63 bytes).
    pub fn submit_credentials(&self, ssid: &str, passphrase: &str) {
        let creds = WifiCredentials::clamped(ssid, passphrase);
        info!("portal: credentials submitted for '{}'", creds.ssid);
        self.creds_tx.send(creds);
    }

    /// Queue a settings change for the control task.  Empty updates
    /// (no field present) are dropped.
    pub fn submit_settings(&self, update: SettingsUpdate) {
        if update.is_empty() {
            return;
        }
        info!("portal: settings update submitted");
        self.settings_tx.send(update);
    }

    // ── One-shot actions ──────────────────────────────────────

    pub fn dispense_treat(&self) {
        info!("portal: manual dispense requested");
        self.shared.request_manual_dispense();
    }

    pub fn reset_error_states(&self) {
        info!("portal: fault reset requested");
        self.shared.request_fault_reset();
    }

    pub fn reset_stats(&self) {
        info!("portal: stats reset requested");
        self.shared.request_stats_reset();
    }

    /// Request a trial run without stored credentials.  Accepted only
    /// while the supervisor sits in AP mode; anywhere else the request
    /// is rejected at submission time rather than latched for later.
    pub fn start_trial_mode(&self) -> bool {
        if self.shared.network() != NetworkState::ApMode {
            info!("portal: trial mode rejected, not in setup mode");
            return false;
        }
        info!("portal: trial mode requested");
        self.shared.request_trial_mode();
        true
    }

    /// Forget the stored network; the control task clears NVS and then
    /// restarts so the device comes back up in AP mode.
    pub fn reset_wifi_credentials(&self) {
        info!("portal: credential reset requested");
        self.shared.request_wifi_reset();
    }

    /// Forget stored settings (counters survive).
    pub fn reset_configuration(&self) {
        info!("portal: settings reset requested");
        self.shared.request_config_reset();
    }

    pub fn restart_device(&self) {
        info!("portal: restart requested");
        self.shared.request_restart();
    }

    // ── Status surface ────────────────────────────────────────

    /// Build a status snapshot from the shared mirrors.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let faults = self.shared.fault_mask();
        TelemetrySnapshot {
            dispense_state: self.shared.dispense_state().name(),
            dispensing: self.shared.dispense_active(),
            network_state: self.shared.network().name(),
            trip_distance_cm: self.shared.trip_distance_cm(),
            distance_threshold_cm: self.shared.distance_threshold_cm(),
            lifetime_distance_cm: self.shared.lifetime_distance_cm(),
            treats_dispensed: self.shared.treats_dispensed(),
            hopper_empty: faults & DeviceFault::HopperEmpty.mask() != 0,
            out_of_treats: faults & DeviceFault::OutOfTreats.mask() != 0,
        }
    }

    /// Status snapshot serialised for the `/status` endpoint.
    pub fn status_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqttConfig;
    use crate::dispense::StateId;
    use crate::network::NetworkState;

    fn portal() -> Portal {
        Portal::new(
            Box::leak(Box::new(SharedState::new())),
            Box::leak(Box::new(SlotQueue::new())),
            Box::leak(Box::new(SlotQueue::new())),
        )
    }

    #[test]
    fn actions_set_their_request_flags() {
        let portal = portal();
        portal.dispense_treat();
        portal.reset_error_states();
        portal.reset_stats();
        portal.reset_wifi_credentials();
        portal.reset_configuration();
        portal.restart_device();

        assert!(portal.shared.take_manual_dispense());
        assert!(portal.shared.take_fault_reset());
        assert!(portal.shared.take_stats_reset());
        assert!(portal.shared.take_wifi_reset());
        assert!(portal.shared.take_config_reset());
        assert!(portal.shared.take_restart());
    }

    #[test]
    fn trial_mode_is_rejected_outside_setup_mode() {
        let portal = portal();

        // A provisioned device must not latch the request for some
        // later, unrelated fall-back into AP mode.
        portal.shared.publish_network(NetworkState::Connected);
        assert!(!portal.start_trial_mode());
        assert!(!portal.shared.take_trial_mode());

        portal.shared.publish_network(NetworkState::ApMode);
        assert!(portal.start_trial_mode());
        assert!(portal.shared.take_trial_mode());
    }

    #[test]
    fn credentials_are_clamped_and_queued() {
        let portal = portal();
        let long_ssid = "x".repeat(40);
        portal.submit_credentials(&long_ssid, "hunter22-hunter22");

        let creds = portal.creds_tx.recv().expect("credentials queued");
        assert_eq!(creds.ssid.len(), 31);
        assert_eq!(creds.passphrase.as_str(), "hunter22-hunter22");
    }

    #[test]
    fn newer_credentials_replace_unconsumed_ones() {
        let portal = portal();
        portal.submit_credentials("barn", "first-pass-here");
        portal.submit_credentials("paddock", "second-pass-here");

        let creds = portal.creds_tx.recv().expect("credentials queued");
        assert_eq!(creds.ssid.as_str(), "paddock");
        assert!(portal.creds_tx.recv().is_none());
    }

    #[test]
    fn empty_settings_updates_are_dropped() {
        let portal = portal();
        portal.submit_settings(SettingsUpdate::default());
        assert!(!portal.settings_tx.is_pending());

        portal.submit_settings(SettingsUpdate {
            distance_threshold_cm: Some(5_000),
            ..SettingsUpdate::default()
        });
        let update = portal.settings_tx.recv().expect("settings queued");
        assert_eq!(update.distance_threshold_cm, Some(5_000));
    }

    #[test]
    fn settings_can_carry_mqtt_config() {
        let portal = portal();
        portal.submit_settings(SettingsUpdate {
            mqtt: Some(MqttConfig {
                enabled: true,
                ..MqttConfig::default()
            }),
            ..SettingsUpdate::default()
        });
        let update = portal.settings_tx.recv().expect("settings queued");
        assert!(update.mqtt.expect("mqtt present").enabled);
    }

    #[test]
    fn status_reflects_the_shared_mirrors() {
        let portal = portal();
        portal.shared.publish_network(NetworkState::ApMode);
        portal.shared.publish_dispense_state(StateId::Actuating);
        portal.shared.publish_dispense_active(true);
        portal.shared.publish_counters(2_200, 3, 440);
        portal.shared.publish_threshold_cm(10_000);
        portal
            .shared
            .publish_faults(DeviceFault::HopperEmpty.mask());

        let snap = portal.snapshot();
        assert_eq!(snap.network_state, "ApMode");
        assert_eq!(snap.dispense_state, "Actuating");
        assert!(snap.dispensing);
        assert_eq!(snap.lifetime_distance_cm, 2_200);
        assert_eq!(snap.treats_dispensed, 3);
        assert_eq!(snap.trip_distance_cm, 440);
        assert_eq!(snap.distance_threshold_cm, 10_000);
        assert!(snap.hopper_empty);
        assert!(!snap.out_of_treats);

        let json = portal.status_json();
        assert!(json.contains("\"treats_dispensed\":3"));
    }
}
