//! TreatWheel Firmware — Main Entry Point
//!
//! Hexagonal architecture with a dual-core task split.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareActuators  LogEventSink  NvsGateway  EspWifiLink      │
//! │  (ActuatorPort)     (EventSink)   (Persistence) (Connectivity) │
//! │  Portal (HTTP)      TelemetryPublisher (MQTT)                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  odometer · dispense FSM · counters                    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Core 1: 1 ms control loop      Core 0: network · web · MQTT   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod config;
mod error;
mod faults;
mod odometer;
mod pins;
mod state;
mod sync;

pub mod app;
mod adapters;
mod drivers;
pub mod dispense;
pub mod network;
mod sensors;

// ── Imports ───────────────────────────────────────────────────
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use adapters::hardware::HardwareActuators;
use adapters::log_sink::LogEventSink;
use adapters::mqtt::{EspMqttTransport, TelemetryPublisher};
use adapters::nvs::NvsGateway;
use adapters::portal::Portal;
use adapters::time::Uptime;
use adapters::wifi::EspWifiLink;
use app::commands::SettingsUpdate;
use app::ports::PersistencePort;
use app::service::AppService;
use config::{MqttConfig, StoredConfig, WifiCredentials};
use drivers::task_pin::{spawn_on_core, Core};
use drivers::watchdog::Watchdog;
use network::{NetworkState, NetworkSupervisor};
use sensors::photogate::PHOTOGATE;
use sensors::wheel::WHEEL;
use state::SharedState;
use sync::SlotQueue;

// ── Cross-task statics ────────────────────────────────────────
//
// The control task is the single writer of the dispense/fault/counter
// mirrors; the network supervisor owns the network mirror; the web and
// MQTT surfaces only set request flags and push queue entries.

static SHARED: SharedState = SharedState::new();
static CREDS_QUEUE: SlotQueue<WifiCredentials> = SlotQueue::new();
static SETTINGS_QUEUE: SlotQueue<SettingsUpdate> = SlotQueue::new();
static MQTT_QUEUE: SlotQueue<MqttConfig> = SlotQueue::new();

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  TreatWheel v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Initialise hardware peripherals ────────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = drivers::hw_init::init_isr_service() {
        log::error!("ISR service init failed: {} — continuing without ISRs", e);
    }

    // ── 3. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsGateway::new()
        .map_err(|e| anyhow::anyhow!("NVS init failed: {e}"))?;
    if nvs.first_boot().unwrap_or(true) {
        info!("First boot — seeding NVS with defaults");
        if let Err(e) = nvs.set_initial_config(&StoredConfig::default()) {
            warn!("Initial config seed failed: {e}");
        }
    }
    let stored = match nvs.load_config() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({e}), using defaults");
            StoredConfig::default()
        }
    };

    // ── 4. Network supervisor task (core 0) ───────────────────
    let net_creds = stored.wifi.clone();
    let connect_timeout_ms = stored.dispenser.connect_timeout_ms;
    let net_poll_ms = stored.dispenser.network_poll_interval_ms;
    let mut net_store = NvsGateway::new()
        .map_err(|e| anyhow::anyhow!("NVS handle for network task failed: {e}"))?;
    spawn_on_core(Core::Pro, 5, 16, "network\0", move || {
        let mut link = match EspWifiLink::new() {
            Ok(link) => link,
            Err(e) => {
                log::error!("WiFi init failed: {e} — network task exiting");
                return;
            }
        };
        let mut supervisor = NetworkSupervisor::new(net_creds, connect_timeout_ms);
        let clock = Uptime::new();
        let mut last_ms = clock.now_ms();
        loop {
            std::thread::sleep(std::time::Duration::from_millis(net_poll_ms as u64));
            let now = clock.now_ms();
            let elapsed = now.wrapping_sub(last_ms);
            last_ms = now;
            supervisor.tick(elapsed, &mut link, &mut net_store, &CREDS_QUEUE, &SHARED);
        }
    });

    // ── 5. MQTT telemetry task (core 0) ───────────────────────
    let mqtt_cfg = stored.mqtt.clone();
    let telemetry_secs = u64::from(stored.dispenser.telemetry_interval_secs);
    spawn_on_core(Core::Pro, 4, 16, "telemetry\0", move || {
        let uptime = Uptime::new();
        let mut publisher =
            TelemetryPublisher::new(EspMqttTransport::new(), mqtt_cfg, telemetry_secs);
        loop {
            std::thread::sleep(std::time::Duration::from_secs(1));
            if let Some(cfg) = MQTT_QUEUE.recv() {
                publisher.set_config(cfg);
            }
            let online = SHARED.network() == NetworkState::Connected;
            publisher.tick(uptime.uptime_secs(), online, &SHARED);
        }
    });

    // ── 6. Dispense control task (core 1) ─────────────────────
    let control_interval_ms = stored.dispenser.control_loop_interval_ms;
    let control = spawn_on_core(Core::App, 10, 16, "dispense\0", move || {
        let watchdog = Watchdog::new();
        let mut hw = HardwareActuators::new();
        let mut sink = LogEventSink::new();
        let mut service = AppService::new(&stored, &PHOTOGATE, &WHEEL, &SHARED);
        service.start(&mut sink);

        // Tick with measured elapsed time, not the nominal sleep: the
        // dispense timers must not drift with scheduler jitter.
        let clock = Uptime::new();
        let mut last_ms = clock.now_ms();
        loop {
            std::thread::sleep(std::time::Duration::from_millis(control_interval_ms as u64));
            let now = clock.now_ms();
            let elapsed = now.wrapping_sub(last_ms);
            last_ms = now;
            service.tick(elapsed, &mut hw, &mut sink);
            if let Some(update) = SETTINGS_QUEUE.recv() {
                if let Some(mqtt) = service.handle_settings(update, &mut nvs) {
                    MQTT_QUEUE.send(mqtt);
                }
            }
            if service.handle_maintenance(&mut nvs) {
                info!("restart requested, flushing and rebooting");
                service.force_save_if_dirty(&mut nvs);
                // SAFETY: esp_restart never returns.
                unsafe { esp_idf_svc::sys::esp_restart() };
            }
            service.auto_save_if_needed(&mut nvs);
            watchdog.feed();
        }
    });

    // ── 7. Web portal (core 0, httpd worker threads) ──────────
    let portal = Portal::new(&SHARED, &CREDS_QUEUE, &SETTINGS_QUEUE);
    let _server = serve_portal(portal).context("web portal start failed")?;

    info!("System ready.");
    control.join().ok();
    Ok(())
}

// ── Web portal routes ─────────────────────────────────────────

#[derive(Deserialize)]
struct CredsBody {
    ssid: String,
    #[serde(default)]
    passphrase: String,
}

/// Wire the portal handlers to the httpd route table.  The returned
/// server owns its worker threads and must stay alive for the routes
/// to keep serving.
fn serve_portal(
    portal: Portal,
) -> Result<esp_idf_svc::http::server::EspHttpServer<'static>> {
    use esp_idf_svc::http::server::{Configuration, EspHttpServer};
    use esp_idf_svc::http::Method;
    use esp_idf_svc::io::{Read, Write};

    let mut server = EspHttpServer::new(&Configuration::default())?;

    server.fn_handler("/status", Method::Get, move |req| -> anyhow::Result<()> {
        let json = portal.status_json();
        let mut resp = req.into_response(
            200,
            Some("OK"),
            &[("Content-Type", "application/json")],
        )?;
        resp.write_all(json.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler("/wifi", Method::Post, move |mut req| -> anyhow::Result<()> {
        let mut buf = [0u8; 256];
        let n = req.read(&mut buf)?;
        match serde_json::from_slice::<CredsBody>(&buf[..n]) {
            Ok(body) => {
                portal.submit_credentials(&body.ssid, &body.passphrase);
                req.into_ok_response()?.write_all(b"ok")?;
            }
            Err(_) => {
                req.into_status_response(400)?.write_all(b"bad request")?;
            }
        }
        Ok(())
    })?;

    server.fn_handler("/settings", Method::Post, move |mut req| -> anyhow::Result<()> {
        let mut buf = [0u8; 512];
        let n = req.read(&mut buf)?;
        match serde_json::from_slice::<SettingsUpdate>(&buf[..n]) {
            Ok(update) => {
                portal.submit_settings(update);
                req.into_ok_response()?.write_all(b"ok")?;
            }
            Err(_) => {
                req.into_status_response(400)?.write_all(b"bad request")?;
            }
        }
        Ok(())
    })?;

    server.fn_handler("/dispense", Method::Post, move |req| -> anyhow::Result<()> {
        portal.dispense_treat();
        req.into_ok_response()?.write_all(b"ok")?;
        Ok(())
    })?;

    server.fn_handler("/resetErrors", Method::Post, move |req| -> anyhow::Result<()> {
        portal.reset_error_states();
        req.into_ok_response()?.write_all(b"ok")?;
        Ok(())
    })?;

    server.fn_handler("/resetStats", Method::Post, move |req| -> anyhow::Result<()> {
        portal.reset_stats();
        req.into_ok_response()?.write_all(b"ok")?;
        Ok(())
    })?;

    server.fn_handler("/trialMode", Method::Post, move |req| -> anyhow::Result<()> {
        if portal.start_trial_mode() {
            req.into_ok_response()?.write_all(b"ok")?;
        } else {
            req.into_status_response(409)?
                .write_all(b"not in setup mode")?;
        }
        Ok(())
    })?;

    server.fn_handler("/scan", Method::Get, move |req| -> anyhow::Result<()> {
        match adapters::wifi::scan_ssids() {
            Ok(records) => {
                let json = serde_json::to_string(&records)?;
                let mut resp = req.into_response(
                    200,
                    Some("OK"),
                    &[("Content-Type", "application/json")],
                )?;
                resp.write_all(json.as_bytes())?;
            }
            Err(_) => {
                req.into_status_response(503)?
                    .write_all(b"scan unavailable")?;
            }
        }
        Ok(())
    })?;

    server.fn_handler("/reset_wifi", Method::Post, move |req| -> anyhow::Result<()> {
        portal.reset_wifi_credentials();
        req.into_ok_response()?
            .write_all(b"credentials cleared, device restarting")?;
        Ok(())
    })?;

    server.fn_handler("/reset_config", Method::Post, move |req| -> anyhow::Result<()> {
        portal.reset_configuration();
        req.into_ok_response()?.write_all(b"settings cleared")?;
        Ok(())
    })?;

    server.fn_handler("/restart", Method::Post, move |req| -> anyhow::Result<()> {
        portal.restart_device();
        req.into_ok_response()?.write_all(b"restarting")?;
        Ok(())
    })?;

    Ok(server)
}
