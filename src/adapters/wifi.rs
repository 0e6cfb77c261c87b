//! WiFi link adapter.
//!
//! Defines [`ConnectivityPort`] — the boundary the network supervisor
//! drives — plus two implementations:
//!
//! - **`EspWifiLink`** (`target_os = "espidf"`): raw ESP-IDF WiFi driver
//!   calls, station and soft-AP modes.
//! - **`SimWifi`** (all other targets): deterministic simulation for
//!   host-side supervisor tests.
//!
//! The adapter is deliberately dumb: every connect is fire-and-forget
//! and the supervisor owns all timing (the 15 s per-attempt deadline,
//! the poll cadence, the AP fallback).

use serde::Serialize;

use crate::config::WifiCredentials;
use crate::error::CommsError;

/// Open-AP name broadcast while waiting for provisioning.
pub const AP_SSID: &str = "TreatWheel-Setup";

/// One visible network from a provisioning scan, serialised straight
/// onto the `/scan` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub ssid: String,
    pub rssi: i32,
    pub auth: &'static str,
}

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

pub trait ConnectivityPort {
    /// Begin a station connection attempt.  Non-blocking; the caller
    /// polls [`is_connected`](Self::is_connected) for the outcome.
    fn begin_connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError>;

    /// Current link status.
    fn is_connected(&self) -> bool;

    /// Drop the station link (also aborts an in-flight attempt).
    fn disconnect(&mut self);

    /// Bring up the open provisioning access point.
    fn start_ap(&mut self) -> Result<(), CommsError>;

    /// Tear the access point down.
    fn stop_ap(&mut self);
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf {
    use super::{AP_SSID, ConnectivityPort};
    use crate::config::WifiCredentials;
    use crate::error::CommsError;
    use esp_idf_svc::sys::*;
    use log::{info, warn};

    pub struct EspWifiLink {
        started: bool,
    }

    impl EspWifiLink {
        /// Initialise the WiFi driver.  Call once from main() after NVS
        /// init (the driver persists calibration data there).
        pub fn new() -> Result<Self, CommsError> {
            // SAFETY: one-time driver bring-up from the single main-task
            // context; no other WiFi call can race it.
            unsafe {
                if esp_netif_init() != ESP_OK {
                    return Err(CommsError::WifiConnectFailed);
                }
                let ret = esp_event_loop_create_default();
                if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
                    return Err(CommsError::WifiConnectFailed);
                }
                esp_netif_create_default_wifi_sta();
                esp_netif_create_default_wifi_ap();

                // The driver validates the magic word and needs the OSI /
                // crypto function tables filled in, so the config must be
                // built the way WIFI_INIT_CONFIG_DEFAULT() does — a zeroed
                // struct is rejected with ESP_ERR_WIFI_INIT_STATE.
                let cfg = wifi_init_config_t {
                    osi_funcs: core::ptr::addr_of_mut!(g_wifi_osi_funcs),
                    wpa_crypto_funcs: g_wifi_default_wpa_crypto_funcs,
                    static_rx_buf_num: 10,
                    dynamic_rx_buf_num: 32,
                    tx_buf_type: 1,
                    static_tx_buf_num: 0,
                    dynamic_tx_buf_num: 32,
                    cache_tx_buf_num: 0,
                    csi_enable: 0,
                    ampdu_rx_enable: 1,
                    ampdu_tx_enable: 1,
                    amsdu_tx_enable: 0,
                    nvs_enable: 1,
                    nano_enable: 0,
                    rx_ba_win: 6,
                    wifi_task_core_id: 0,
                    beacon_max_len: 752,
                    mgmt_sbuf_num: 32,
                    feature_caps: g_wifi_feature_caps,
                    sta_disconnected_pm: false,
                    espnow_max_encrypt_num: 7,
                    magic: WIFI_INIT_CONFIG_MAGIC as i32,
                    ..Default::default()
                };
                if esp_wifi_init(&cfg) != ESP_OK {
                    return Err(CommsError::WifiConnectFailed);
                }
            }
            info!("WiFi driver initialised");
            Ok(Self { started: false })
        }

        fn stop_if_started(&mut self) {
            if self.started {
                // SAFETY: driver was initialised in new(); stop is benign
                // even when already stopped.
                unsafe {
                    esp_wifi_stop();
                }
                self.started = false;
            }
        }
    }

    impl ConnectivityPort for EspWifiLink {
        fn begin_connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
            self.stop_if_started();

            // SAFETY: wifi_config_t is a C union; the sta member is fully
            // initialised below before the driver reads it.
            unsafe {
                let mut cfg: wifi_config_t = core::mem::zeroed();
                let ssid = creds.ssid.as_bytes();
                let pass = creds.passphrase.as_bytes();
                cfg.sta.ssid[..ssid.len()].copy_from_slice(ssid);
                cfg.sta.password[..pass.len()].copy_from_slice(pass);

                if esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA) != ESP_OK
                    || esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut cfg) != ESP_OK
                    || esp_wifi_start() != ESP_OK
                {
                    warn!("station bring-up failed");
                    return Err(CommsError::WifiConnectFailed);
                }
                self.started = true;
                if esp_wifi_connect() != ESP_OK {
                    return Err(CommsError::WifiConnectFailed);
                }
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            // SAFETY: read-only query; valid whenever the driver is up.
            let mut ap: wifi_ap_record_t = unsafe { core::mem::zeroed() };
            self.started && unsafe { esp_wifi_sta_get_ap_info(&mut ap) } == ESP_OK
        }

        fn disconnect(&mut self) {
            // SAFETY: benign when not connected.
            unsafe {
                esp_wifi_disconnect();
            }
            self.stop_if_started();
        }

        fn start_ap(&mut self) -> Result<(), CommsError> {
            self.stop_if_started();

            // SAFETY: as in begin_connect — the ap member is initialised
            // before the driver reads the union.
            unsafe {
                let mut cfg: wifi_config_t = core::mem::zeroed();
                let ssid = AP_SSID.as_bytes();
                cfg.ap.ssid[..ssid.len()].copy_from_slice(ssid);
                cfg.ap.ssid_len = ssid.len() as u8;
                cfg.ap.channel = 1;
                cfg.ap.authmode = wifi_auth_mode_t_WIFI_AUTH_OPEN;
                cfg.ap.max_connection = 4;

                if esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_AP) != ESP_OK
                    || esp_wifi_set_config(wifi_interface_t_WIFI_IF_AP, &mut cfg) != ESP_OK
                    || esp_wifi_start() != ESP_OK
                {
                    warn!("access point bring-up failed");
                    return Err(CommsError::ApStartFailed);
                }
            }
            self.started = true;
            info!("access point '{AP_SSID}' up");
            Ok(())
        }

        fn stop_ap(&mut self) {
            self.stop_if_started();
        }
    }
}

#[cfg(target_os = "espidf")]
pub use espidf::EspWifiLink;

/// Blocking scan for nearby station networks, for the provisioning UI.
/// Needs the driver up with station mode active; in pure AP mode the
/// scan fails and the caller reports the surface unavailable.
#[cfg(target_os = "espidf")]
pub fn scan_ssids() -> Result<Vec<ScanRecord>, CommsError> {
    use esp_idf_svc::sys::*;

    // SAFETY: read-only driver queries plus a blocking scan; the driver
    // rejects the call cleanly if it is not in a scannable mode.
    unsafe {
        if esp_wifi_scan_start(core::ptr::null(), true) != ESP_OK {
            return Err(CommsError::WifiConnectFailed);
        }
        let mut count: u16 = 0;
        if esp_wifi_scan_get_ap_num(&mut count) != ESP_OK {
            return Err(CommsError::WifiConnectFailed);
        }
        let mut records: Vec<wifi_ap_record_t> =
            vec![core::mem::zeroed(); count as usize];
        if esp_wifi_scan_get_ap_records(&mut count, records.as_mut_ptr()) != ESP_OK {
            return Err(CommsError::WifiConnectFailed);
        }
        records.truncate(count as usize);

        Ok(records
            .iter()
            .map(|rec| {
                let len = rec
                    .ssid
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(rec.ssid.len());
                ScanRecord {
                    ssid: String::from_utf8_lossy(&rec.ssid[..len]).into_owned(),
                    rssi: i32::from(rec.rssi),
                    auth: auth_name(rec.authmode),
                }
            })
            .collect())
    }
}

#[cfg(target_os = "espidf")]
fn auth_name(mode: esp_idf_svc::sys::wifi_auth_mode_t) -> &'static str {
    use esp_idf_svc::sys::*;
    match mode {
        wifi_auth_mode_t_WIFI_AUTH_OPEN => "Open",
        wifi_auth_mode_t_WIFI_AUTH_WEP => "WEP",
        wifi_auth_mode_t_WIFI_AUTH_WPA_PSK => "WPA",
        wifi_auth_mode_t_WIFI_AUTH_WPA2_PSK => "WPA2",
        wifi_auth_mode_t_WIFI_AUTH_WPA_WPA2_PSK => "WPA/WPA2",
        wifi_auth_mode_t_WIFI_AUTH_WPA3_PSK => "WPA3",
        wifi_auth_mode_t_WIFI_AUTH_WPA2_WPA3_PSK => "WPA2/WPA3",
        _ => "Unknown",
    }
}

/// Host build: no radio, so the scan comes back empty.
#[cfg(not(target_os = "espidf"))]
pub fn scan_ssids() -> Result<Vec<ScanRecord>, CommsError> {
    Ok(Vec::new())
}

// ───────────────────────────────────────────────────────────────
// Simulation backend (host tests)
// ───────────────────────────────────────────────────────────────

/// Deterministic link simulation: a "reachable" network accepts the
/// first poll after `begin_connect`, an "unreachable" one never does.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug)]
pub struct SimWifi {
    reachable: bool,
    connected: bool,
    ap_active: bool,
    connect_attempts: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimWifi {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            connected: false,
            ap_active: false,
            connect_attempts: 0,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::reachable()
        }
    }

    /// Simulate the AP vanishing mid-session.
    pub fn drop_link(&mut self) {
        self.connected = false;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    pub fn ap_active(&self) -> bool {
        self.ap_active
    }
}

#[cfg(not(target_os = "espidf"))]
impl ConnectivityPort for SimWifi {
    fn begin_connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        log::info!("WiFi(sim): connect to '{}'", creds.ssid);
        self.connect_attempts += 1;
        self.ap_active = false;
        self.connected = self.reachable;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn start_ap(&mut self) -> Result<(), CommsError> {
        log::info!("WiFi(sim): access point '{AP_SSID}' up");
        self.connected = false;
        self.ap_active = true;
        Ok(())
    }

    fn stop_ap(&mut self) {
        self.ap_active = false;
    }
}
