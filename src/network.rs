//! Network supervisory state machine.
//!
//! Cycles the radio among station, access-point, and trial modes:
//!
//! ```text
//!              [no stored creds]
//!  DISCONNECTED ───────────────────────────▶ AP MODE ──[manual]──▶ TRIAL
//!       │                                      ▲  │                  │
//!  [creds stored]                     [timeout]│  │[new creds]       │[new creds]
//!       ▼                                      │  ▼                  ▼
//!  CONNECTING ─────[link up]──▶ CONNECTED ──[link lost / new creds]──▶ DISCONNECTED
//! ```
//!
//! The supervisor is the **sole writer** of the shared network state;
//! every other task reads it through [`SharedState`].  Credential
//! updates arrive through a capacity-1 slot queue where the newest
//! submission silently supersedes any unconsumed older one — credential
//! changes are rare, user-driven events and only the latest matters.

use log::{info, warn};

use crate::adapters::wifi::ConnectivityPort;
use crate::app::ports::PersistencePort;
use crate::config::WifiCredentials;
use crate::state::SharedState;
use crate::sync::SlotQueue;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Supervisory connectivity state.  Exactly one value is active at any
/// time; stored as a `u8` in [`SharedState`] for torn-free cross-task
/// reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetworkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    ApMode = 3,
    TrialMode = 4,
}

impl NetworkState {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::ApMode,
            4 => Self::TrialMode,
            _ => Self::Disconnected,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::ApMode => "ApMode",
            Self::TrialMode => "TrialMode",
        }
    }

    /// True when telemetry publishing over the network is permitted.
    /// Trial mode explicitly disables network-dependent features.
    pub fn online(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Owns the connectivity lifecycle.  Driven by the network task at a
/// coarse poll interval (~200 ms); all waits are bounded.
pub struct NetworkSupervisor {
    state: NetworkState,
    /// Credentials the station is (or will be) connecting with.
    creds: WifiCredentials,
    /// Wall-clock time spent in the current connection attempt.
    connect_elapsed_ms: u32,
    /// Per-attempt connection deadline.
    connect_timeout_ms: u32,
}

impl NetworkSupervisor {
    pub fn new(creds: WifiCredentials, connect_timeout_ms: u32) -> Self {
        Self {
            state: NetworkState::Disconnected,
            creds,
            connect_elapsed_ms: 0,
            connect_timeout_ms,
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn credentials(&self) -> &WifiCredentials {
        &self.creds
    }

    /// Advance the supervisor by one poll of `elapsed_ms` wall-clock time.
    ///
    /// Drains at most one pending credential update, then runs the
    /// current state's logic.  Publishes the (possibly new) state to
    /// `shared` before returning.
    pub fn tick<L, P>(
        &mut self,
        elapsed_ms: u32,
        link: &mut L,
        store: &mut P,
        creds_rx: &SlotQueue<WifiCredentials>,
        shared: &SharedState,
    ) where
        L: ConnectivityPort,
        P: PersistencePort,
    {
        if self.drain_credentials(link, store, creds_rx) {
            shared.publish_network(self.state);
            return;
        }

        match self.state {
            NetworkState::Disconnected => {
                if self.creds.is_empty() {
                    info!("no stored credentials, starting access point");
                    self.enter_ap(link);
                } else {
                    info!("connecting to '{}'", self.creds.ssid);
                    self.connect_elapsed_ms = 0;
                    match link.begin_connect(&self.creds) {
                        Ok(()) => self.set_state(NetworkState::Connecting),
                        Err(err) => {
                            warn!("connect attempt failed to start: {err}");
                            self.enter_ap(link);
                        }
                    }
                }
            }
            NetworkState::Connecting => {
                self.connect_elapsed_ms = self.connect_elapsed_ms.saturating_add(elapsed_ms);
                if link.is_connected() {
                    info!("connected to '{}'", self.creds.ssid);
                    self.set_state(NetworkState::Connected);
                } else if self.connect_elapsed_ms >= self.connect_timeout_ms {
                    warn!(
                        "connection to '{}' timed out after {} ms, falling back to access point",
                        self.creds.ssid, self.connect_elapsed_ms
                    );
                    link.disconnect();
                    self.enter_ap(link);
                }
            }
            NetworkState::Connected => {
                if !link.is_connected() {
                    warn!("link lost, restarting connection cycle");
                    self.set_state(NetworkState::Disconnected);
                }
            }
            NetworkState::ApMode => {
                // Trial mode is a manual escape valid only from here.
                if shared.take_trial_mode() {
                    info!("entering trial mode, network features disabled");
                    self.set_state(NetworkState::TrialMode);
                }
            }
            NetworkState::TrialMode => {
                // Parked until a credential submission restarts the cycle.
            }
        }

        shared.publish_network(self.state);
    }

    /// Consume a pending credential update, if any: persist,
    /// drop the current link, and restart the cycle from Disconnected.
    /// Returns `true` when a transition happened.
    fn drain_credentials<L, P>(
        &mut self,
        link: &mut L,
        store: &mut P,
        creds_rx: &SlotQueue<WifiCredentials>,
    ) -> bool
    where
        L: ConnectivityPort,
        P: PersistencePort,
    {
        let Some(creds) = creds_rx.recv() else {
            return false;
        };
        info!("credential update received for '{}'", creds.ssid);

        // Persist BEFORE any reconnect attempt so a power cycle mid-
        // transition comes back up with the new network.
        if let Err(err) = store.save_wifi(&creds) {
            warn!("failed to persist credentials: {err}");
        }
        self.creds = creds;

        match self.state {
            NetworkState::Connected | NetworkState::Connecting => link.disconnect(),
            NetworkState::ApMode | NetworkState::TrialMode => link.stop_ap(),
            NetworkState::Disconnected => {}
        }
        self.set_state(NetworkState::Disconnected);
        true
    }

    fn enter_ap<L: ConnectivityPort>(&mut self, link: &mut L) {
        match link.start_ap() {
            Ok(()) => self.set_state(NetworkState::ApMode),
            Err(err) => {
                // Radio refused AP mode; stay Disconnected and retry the
                // whole cycle next poll.
                warn!("failed to start access point: {err}");
                self.set_state(NetworkState::Disconnected);
            }
        }
    }

    fn set_state(&mut self, next: NetworkState) {
        if next != self.state {
            info!("network: {} -> {}", self.state.name(), next.name());
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::wifi::SimWifi;
    use crate::app::ports::PersistencePort;
    use crate::adapters::nvs::NvsGateway;

    const POLL_MS: u32 = 200;
    const TIMEOUT_MS: u32 = 15_000;

    fn creds(ssid: &str) -> WifiCredentials {
        WifiCredentials::clamped(ssid, "hunter22-hunter22")
    }

    fn shared() -> &'static SharedState {
        Box::leak(Box::new(SharedState::new()))
    }

    fn run_polls<L: ConnectivityPort, P: PersistencePort>(
        sup: &mut NetworkSupervisor,
        n: u32,
        link: &mut L,
        store: &mut P,
        rx: &SlotQueue<WifiCredentials>,
        shared: &SharedState,
    ) {
        for _ in 0..n {
            sup.tick(POLL_MS, link, store, rx, shared);
        }
    }

    #[test]
    fn no_credentials_goes_straight_to_ap_mode() {
        let shared = shared();
        let rx = SlotQueue::new();
        let mut link = SimWifi::unreachable();
        let mut store = NvsGateway::new_sim();
        let mut sup = NetworkSupervisor::new(WifiCredentials::default(), TIMEOUT_MS);

        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::ApMode);
        assert_eq!(link.connect_attempts(), 0);
        assert_eq!(shared.network(), NetworkState::ApMode);
    }

    #[test]
    fn unreachable_network_falls_back_within_timeout() {
        let shared = shared();
        let rx = SlotQueue::new();
        let mut link = SimWifi::unreachable();
        let mut store = NvsGateway::new_sim();
        let mut sup = NetworkSupervisor::new(creds("barn"), TIMEOUT_MS);

        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connecting);

        // One poll interval of slack past the deadline.
        run_polls(&mut sup, TIMEOUT_MS / POLL_MS + 1, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::ApMode);
        assert_eq!(link.connect_attempts(), 1);
    }

    #[test]
    fn reachable_network_connects_and_survives_polls() {
        let shared = shared();
        let rx = SlotQueue::new();
        let mut link = SimWifi::reachable();
        let mut store = NvsGateway::new_sim();
        let mut sup = NetworkSupervisor::new(creds("barn"), TIMEOUT_MS);

        run_polls(&mut sup, 5, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connected);

        run_polls(&mut sup, 50, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connected);
    }

    #[test]
    fn link_loss_restarts_the_cycle() {
        let shared = shared();
        let rx = SlotQueue::new();
        let mut link = SimWifi::reachable();
        let mut store = NvsGateway::new_sim();
        let mut sup = NetworkSupervisor::new(creds("barn"), TIMEOUT_MS);

        run_polls(&mut sup, 5, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connected);

        link.drop_link();
        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Disconnected);
        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connecting);
    }

    #[test]
    fn credentials_while_connected_persist_before_reconnect() {
        let shared = shared();
        let rx = SlotQueue::new();
        let mut link = SimWifi::reachable();
        let mut store = NvsGateway::new_sim();
        let mut sup = NetworkSupervisor::new(creds("barn"), TIMEOUT_MS);

        run_polls(&mut sup, 5, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connected);

        rx.send(creds("paddock"));
        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Disconnected);
        assert_eq!(store.load_config().unwrap().wifi.ssid.as_str(), "paddock");
        // Fresh attempt begins on the following poll, with the new SSID.
        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connecting);
        assert_eq!(sup.credentials().ssid.as_str(), "paddock");
    }

    #[test]
    fn newest_credential_submission_wins() {
        let rx = SlotQueue::new();
        rx.send(creds("first"));
        rx.send(creds("second"));
        assert_eq!(rx.recv().unwrap().ssid.as_str(), "second");
        assert!(rx.recv().is_none());
    }

    #[test]
    fn trial_mode_only_enterable_from_ap_mode() {
        let shared = shared();
        let rx = SlotQueue::new();
        let mut link = SimWifi::reachable();
        let mut store = NvsGateway::new_sim();
        let mut sup = NetworkSupervisor::new(creds("barn"), TIMEOUT_MS);

        run_polls(&mut sup, 5, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connected);

        // Request ignored while connected; the flag is consumed by the
        // ApMode handler only.
        shared.request_trial_mode();
        run_polls(&mut sup, 5, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::Connected);

        let mut link = SimWifi::unreachable();
        let mut sup = NetworkSupervisor::new(WifiCredentials::default(), TIMEOUT_MS);
        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::ApMode);
        sup.tick(POLL_MS, &mut link, &mut store, &rx, shared);
        assert_eq!(sup.state(), NetworkState::TrialMode);
        assert!(!sup.state().online());
    }
}
