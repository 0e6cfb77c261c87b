//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the dispense FSM, the odometer, and the lifetime
//! counters, and is driven by the control task at ~1 ms intervals.  All
//! I/O flows through port traits injected at call sites, so the entire
//! service runs under host tests with mock adapters.
//!
//! ```text
//!   ISR signals ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!                   │         AppService          │
//!   ActuatorPort ◀──│  odometer · FSM · counters  │──▶ PersistencePort
//!                   └─────────────────────────────┘
//! ```
//!
//! Cross-task communication happens over [`SharedState`]: the service
//! consumes one-shot request flags (manual dispense, fault reset, stats
//! reset) and publishes dispense/fault/counter mirrors for the web and
//! telemetry tasks to read without locks.

use log::{info, warn};

use crate::config::{Counters, DispenserConfig, MqttConfig, StoredConfig};
use crate::dispense::context::DispenseContext;
use crate::dispense::states::build_state_table;
use crate::dispense::{DispenseFsm, StateId};
use crate::odometer::Odometer;
use crate::sensors::photogate::PhotogateSignals;
use crate::sensors::wheel::{WheelPulse, WheelSensor};
use crate::state::SharedState;

use super::commands::SettingsUpdate;
use super::events::{AppEvent, TelemetrySnapshot};
use super::ports::{ActuatorPort, EventSink, PersistencePort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all dispenser domain logic.
pub struct AppService {
    fsm: DispenseFsm,
    ctx: DispenseContext,
    wheel: WheelSensor<'static>,
    odometer: Odometer,
    mqtt: MqttConfig,
    counters: Counters,
    shared: &'static SharedState,

    /// Milliseconds since service start (wraps after ~49 days; only
    /// ever compared through wrapping subtraction).
    now_ms: u32,
    /// Sessions already credited to the treat counter.
    credited_sessions: u32,
    /// Fault mask as of the previous tick, for edge detection.
    prev_fault_mask: u8,
    counters_dirty: bool,
    last_counter_save_ms: u32,
    counter_save_interval_ms: u32,
}

impl AppService {
    /// Construct the service from a loaded configuration record.
    ///
    /// Does **not** start the FSM — call [`start`](Self::start) next.
    pub fn new(
        stored: &StoredConfig,
        signals: &'static PhotogateSignals,
        wheel_pulse: &'static WheelPulse,
        shared: &'static SharedState,
    ) -> Self {
        let cfg = stored.dispenser.clone();
        let odometer = Odometer::new(cfg.distance_per_pulse_cm, cfg.distance_threshold_cm);
        let wheel = WheelSensor::new(wheel_pulse, cfg.wheel_debounce_ms);
        let counter_save_interval_ms = cfg.counter_save_interval_secs.saturating_mul(1000);
        let ctx = DispenseContext::new(cfg, signals);
        let fsm = DispenseFsm::new(build_state_table(), StateId::Idle);

        Self {
            fsm,
            ctx,
            wheel,
            odometer,
            mqtt: stored.mqtt.clone(),
            counters: stored.counters.clone(),
            shared,
            now_ms: 0,
            credited_sessions: 0,
            prev_fault_mask: 0,
            counters_dirty: false,
            last_counter_save_ms: 0,
            counter_save_interval_ms,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in Idle and publish the initial mirrors.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        self.publish_shared();
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("dispenser service started in {:?}", self.fsm.current_state());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle covering `elapsed_ms` of wall-clock time:
    /// drain requests → poll wheel → arm trigger → FSM tick → apply
    /// actuators → publish mirrors.
    pub fn tick(
        &mut self,
        elapsed_ms: u32,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        self.now_ms = self.now_ms.wrapping_add(elapsed_ms);
        let prev_state = self.fsm.current_state();

        // 1. One-shot requests from the web/MQTT tasks.
        if self.shared.take_fault_reset() {
            info!("fault reset requested");
            // Flags only; the starve accumulator keeps its value until a
            // hopper treat is actually detected.
            self.ctx.faults.clear_all();
            sink.emit(&AppEvent::FaultsCleared);
        }
        if self.shared.take_stats_reset() {
            info!("stats reset requested");
            self.odometer.reset();
            self.counters = Counters::default();
            self.counters_dirty = true;
            // Backdate the save clock so the next auto-save pass flushes
            // the zeroed counters immediately.
            self.last_counter_save_ms = self.now_ms.wrapping_sub(self.counter_save_interval_ms);
            sink.emit(&AppEvent::StatsReset);
        }
        if self.shared.take_manual_dispense() {
            // Suppression under the out-of-treats latch happens in the
            // Idle handler, identically for manual and threshold triggers.
            self.ctx.request_dispense();
        }

        // 2. Wheel pulses → trip odometer + lifetime distance.
        let pulses = self.wheel.poll(self.now_ms);
        for _ in 0..pulses {
            self.odometer.record_pulse();
            self.counters.lifetime_distance_cm = self
                .counters
                .lifetime_distance_cm
                .saturating_add(self.ctx.config.distance_per_pulse_cm);
        }
        if pulses > 0 {
            // Distance accrues without a treat on most rides; it still
            // has to survive a power cycle via the periodic save.
            self.counters_dirty = true;
        }

        // 3. Threshold trigger.  The trip odometer restarts the moment
        // the trigger fires, so distance ridden during the dispense
        // already counts toward the next treat.
        if self.odometer.threshold_reached()
            && !self.ctx.faults.dispense_suppressed()
            && prev_state == StateId::Idle
            && !self.ctx.trigger_pending()
        {
            info!(
                "distance threshold reached ({} cm), triggering dispense",
                self.odometer.distance_cm()
            );
            self.ctx.request_dispense();
            self.odometer.reset();
        }

        // 4. Dispense FSM.
        self.fsm.tick(&mut self.ctx, elapsed_ms);

        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }

        // 5. Credit completed sessions exactly once.
        let completed = self.ctx.sessions_completed;
        if completed != self.credited_sessions {
            let delta = completed.wrapping_sub(self.credited_sessions);
            self.credited_sessions = completed;
            self.counters.treats_dispensed =
                self.counters.treats_dispensed.saturating_add(delta);
            self.counters_dirty = true;
            sink.emit(&AppEvent::TreatDispensed {
                lifetime_total: self.counters.treats_dispensed,
            });
        }

        // 6. Fault edges.
        let mask = self.ctx.faults.mask();
        if mask & !self.prev_fault_mask != 0 {
            sink.emit(&AppEvent::FaultRaised(mask));
        }
        self.prev_fault_mask = mask;

        // 7. Actuators, then the lock-free mirrors.
        self.apply_actuators(hw);
        self.publish_shared();
    }

    // ── Settings handling ─────────────────────────────────────

    /// Apply a settings update from the web surface and persist it.
    ///
    /// Returns the new MQTT configuration when the update carried one,
    /// so the caller can forward it to the telemetry task — broker
    /// changes take effect without a reboot.
    pub fn handle_settings(
        &mut self,
        update: SettingsUpdate,
        store: &mut impl PersistencePort,
    ) -> Option<MqttConfig> {
        if update.is_empty() {
            return None;
        }
        if let Some(cm) = update.distance_threshold_cm {
            self.ctx.config.set_distance_threshold_cm(cm);
            self.odometer
                .set_threshold_cm(self.ctx.config.distance_threshold_cm);
            info!(
                "distance threshold set to {} cm",
                self.ctx.config.distance_threshold_cm
            );
        }
        if let Some(ms) = update.wheel_debounce_ms {
            self.ctx.config.wheel_debounce_ms = ms;
            self.wheel.set_debounce_ms(ms);
        }
        let mqtt_changed = update.mqtt.is_some();
        if let Some(mqtt) = update.mqtt {
            self.mqtt = mqtt;
        }
        if let Err(err) = store.save_config(&self.mqtt, self.ctx.config.distance_threshold_cm) {
            warn!("failed to persist settings: {err}");
        }
        mqtt_changed.then(|| self.mqtt.clone())
    }

    /// Consume pending un-provisioning requests from the web surface.
    /// Returns `true` when the caller should restart the device (after
    /// flushing any dirty counters).
    pub fn handle_maintenance(&mut self, store: &mut impl PersistencePort) -> bool {
        let mut restart = self.shared.take_restart();
        if self.shared.take_wifi_reset() {
            info!("clearing stored credentials");
            if let Err(err) = store.clear_wifi() {
                warn!("credential clear failed: {err}");
            }
            // The radio only forgets the network on the next boot.
            restart = true;
        }
        if self.shared.take_config_reset() {
            info!("clearing stored settings");
            if let Err(err) = store.clear_config() {
                warn!("settings clear failed: {err}");
            }
        }
        restart
    }

    // ── Counter persistence ───────────────────────────────────

    /// Periodically flush dirty counters.  Returns `true` on save.
    ///
    /// Flash wear is the constraint here: treats arrive many times a
    /// day but counters only need to survive a power cycle roughly
    /// intact, so saves are spaced by a long interval.
    pub fn auto_save_if_needed(&mut self, store: &mut impl PersistencePort) -> bool {
        if !self.counters_dirty {
            return false;
        }
        if self.now_ms.wrapping_sub(self.last_counter_save_ms) < self.counter_save_interval_ms {
            return false;
        }
        self.flush_counters(store)
    }

    /// Flush dirty counters immediately (stats reset, shutdown).
    pub fn force_save_if_dirty(&mut self, store: &mut impl PersistencePort) {
        if self.counters_dirty {
            self.flush_counters(store);
        }
    }

    fn flush_counters(&mut self, store: &mut impl PersistencePort) -> bool {
        match store.save_counters(&self.counters) {
            Ok(()) => {
                self.counters_dirty = false;
                self.last_counter_save_ms = self.now_ms;
                info!(
                    "counters saved ({} cm, {} treats)",
                    self.counters.lifetime_distance_cm, self.counters.treats_dispensed
                );
                true
            }
            Err(err) => {
                warn!("counter save failed: {err}");
                false
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn fault_mask(&self) -> u8 {
        self.ctx.faults.mask()
    }

    pub fn mqtt_config(&self) -> &MqttConfig {
        &self.mqtt
    }

    pub fn dispenser_config(&self) -> &DispenserConfig {
        &self.ctx.config
    }

    /// Build a telemetry snapshot from the current domain state plus
    /// the published network state.
    pub fn build_telemetry(&self) -> TelemetrySnapshot {
        use crate::error::DeviceFault;
        TelemetrySnapshot {
            dispense_state: self.fsm.current_state().name(),
            dispensing: self.fsm.current_state().is_dispensing(),
            network_state: self.shared.network().name(),
            trip_distance_cm: self.odometer.distance_cm(),
            distance_threshold_cm: self.odometer.threshold_cm(),
            lifetime_distance_cm: self.counters.lifetime_distance_cm,
            treats_dispensed: self.counters.treats_dispensed,
            hopper_empty: self.ctx.faults.has(DeviceFault::HopperEmpty),
            out_of_treats: self.ctx.faults.has(DeviceFault::OutOfTreats),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Translate FSM actuator commands into port calls.
    fn apply_actuators(&self, hw: &mut impl ActuatorPort) {
        use crate::error::DeviceFault;
        if self.ctx.commands.motor_run {
            hw.motor_dispense();
        } else {
            hw.motor_neutral();
        }
        hw.set_sensor_leds(self.ctx.commands.sensor_leds_on);
        hw.set_fault_led(self.ctx.faults.has(DeviceFault::OutOfTreats));
    }

    /// Refresh the lock-free mirrors other tasks read.
    fn publish_shared(&self) {
        self.shared
            .publish_dispense_active(self.fsm.current_state().is_dispensing());
        self.shared.publish_dispense_state(self.fsm.current_state());
        self.shared
            .publish_threshold_cm(self.odometer.threshold_cm());
        self.shared.publish_faults(self.ctx.faults.mask());
        self.shared.publish_counters(
            self.counters.lifetime_distance_cm,
            self.counters.treats_dispensed,
            self.odometer.distance_cm(),
        );
    }
}
