//! Integration tests: AppService → dispense FSM → actuators.
//!
//! Runs on host only — the sim actuator and persistence backends stand
//! in for the ESP-IDF peripherals.

#![cfg(not(target_os = "espidf"))]

use treatwheel::adapters::hardware::HardwareActuators;
use treatwheel::adapters::nvs::NvsGateway;
use treatwheel::app::events::AppEvent;
use treatwheel::app::ports::{EventSink, PersistencePort};
use treatwheel::app::commands::SettingsUpdate;
use treatwheel::app::service::AppService;
use treatwheel::config::{MqttConfig, StoredConfig, WifiCredentials};
use treatwheel::dispense::StateId;
use treatwheel::drivers::motor::MotorState;
use treatwheel::error::DeviceFault;
use treatwheel::sensors::photogate::PhotogateSignals;
use treatwheel::sensors::wheel::WheelPulse;
use treatwheel::state::SharedState;

// ── Mock event sink ───────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

impl RecordingSink {
    fn treats_dispensed(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::TreatDispensed { .. }))
            .count()
    }
}

// ── Test rig ──────────────────────────────────────────────────

struct Rig {
    service: AppService,
    signals: &'static PhotogateSignals,
    wheel: &'static WheelPulse,
    shared: &'static SharedState,
    hw: HardwareActuators,
    sink: RecordingSink,
}

impl Rig {
    fn new() -> Self {
        Self::with_config(StoredConfig::default())
    }

    fn with_config(stored: StoredConfig) -> Self {
        let signals: &'static PhotogateSignals = Box::leak(Box::new(PhotogateSignals::new()));
        let wheel: &'static WheelPulse = Box::leak(Box::new(WheelPulse::new()));
        let shared: &'static SharedState = Box::leak(Box::new(SharedState::new()));
        let mut service = AppService::new(&stored, signals, wheel, shared);
        let mut sink = RecordingSink::default();
        service.start(&mut sink);
        Self {
            service,
            signals,
            wheel,
            shared,
            hw: HardwareActuators::new(),
            sink,
        }
    }

    /// Advance the control loop by `ms` one-millisecond ticks.
    fn run_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.service.tick(1, &mut self.hw, &mut self.sink);
        }
    }

    /// Ride far enough to cross the distance threshold (default 100 m
    /// at 22 cm/pulse).
    fn ride_past_threshold(&mut self) {
        for _ in 0..455 {
            self.wheel.edge();
        }
        self.run_ms(1);
    }

    /// Complete the in-flight session: treat falls past the hopper gate,
    /// then lands in the chute.
    fn drop_treat(&mut self) {
        assert_eq!(self.service.state(), StateId::Actuating);
        self.signals.hopper_edge();
        self.signals.dispense_edge();
        self.run_ms(1);
        assert_eq!(self.service.state(), StateId::Settling);
    }
}

// ── Automatic dispensing ──────────────────────────────────────

#[test]
fn distance_threshold_triggers_a_full_session() {
    let mut rig = Rig::new();
    assert_eq!(rig.service.state(), StateId::Idle);

    rig.ride_past_threshold();
    assert_eq!(rig.service.state(), StateId::PreRoll);
    assert!(rig.hw.sensor_leds_on());

    // Pre-roll settle, then the motor starts.
    rig.run_ms(200);
    assert_eq!(rig.service.state(), StateId::Actuating);
    assert_eq!(rig.hw.motor_state(), MotorState::Dispensing);

    rig.run_ms(50);
    rig.drop_treat();
    assert_eq!(rig.hw.motor_state(), MotorState::Neutral);

    // Settling, then back to Idle with the treat credited.
    rig.run_ms(200);
    assert_eq!(rig.service.state(), StateId::Idle);
    assert!(!rig.hw.sensor_leds_on());
    assert_eq!(rig.service.counters().treats_dispensed, 1);
    assert_eq!(rig.sink.treats_dispensed(), 1);
}

#[test]
fn trip_odometer_restarts_at_trigger_time() {
    let mut rig = Rig::new();
    rig.ride_past_threshold();

    // Distance ridden during the dispense counts toward the next treat.
    rig.wheel.edge();
    rig.wheel.edge();
    rig.run_ms(1);
    assert_eq!(rig.shared.trip_distance_cm(), 44);

    // Lifetime distance keeps the full total.
    assert_eq!(rig.shared.lifetime_distance_cm(), (455 + 2) * 22);
}

#[test]
fn manual_dispense_runs_the_same_session() {
    let mut rig = Rig::new();
    rig.shared.request_manual_dispense();
    rig.run_ms(1);
    assert_eq!(rig.service.state(), StateId::PreRoll);

    rig.run_ms(200);
    rig.drop_treat();
    rig.run_ms(200);
    assert_eq!(rig.service.counters().treats_dispensed, 1);
}

// ── Fault handling ────────────────────────────────────────────

#[test]
fn timeout_latches_out_of_treats_and_suppresses_dispensing() {
    let mut rig = Rig::new();
    rig.shared.request_manual_dispense();
    rig.run_ms(1 + 200); // trigger + pre-roll
    assert_eq!(rig.service.state(), StateId::Actuating);

    // Nothing ever falls: hard timeout aborts the session.
    rig.run_ms(30_000);
    assert_eq!(rig.service.state(), StateId::Settling);
    assert_eq!(rig.hw.motor_state(), MotorState::Neutral);

    rig.run_ms(200);
    assert_eq!(rig.service.state(), StateId::Idle);
    assert_eq!(rig.service.counters().treats_dispensed, 0);
    assert_eq!(rig.sink.treats_dispensed(), 0);
    assert!(rig.service.fault_mask() & DeviceFault::OutOfTreats.mask() != 0);
    assert!(rig.hw.fault_led_on());

    // Latched: further triggers are refused in Idle.
    rig.shared.request_manual_dispense();
    rig.run_ms(10);
    assert_eq!(rig.service.state(), StateId::Idle);

    // External reset re-enables dispensing and drops the fault LED.
    rig.shared.request_fault_reset();
    rig.run_ms(1);
    assert_eq!(rig.service.fault_mask(), 0);
    assert!(!rig.hw.fault_led_on());

    rig.shared.request_manual_dispense();
    rig.run_ms(1);
    assert_eq!(rig.service.state(), StateId::PreRoll);
}

#[test]
fn starve_time_accumulates_across_sessions() {
    let mut rig = Rig::new();

    // First session: 3 s of actuation with no hopper detection, then the
    // treat finally drops (seen only at the chute).
    rig.shared.request_manual_dispense();
    rig.run_ms(1 + 200);
    rig.run_ms(3_000);
    rig.signals.dispense_edge();
    rig.run_ms(1 + 200);
    assert_eq!(rig.service.state(), StateId::Idle);
    assert_eq!(rig.service.fault_mask(), 0);

    // Second session: after ~2 more starved seconds the accumulated
    // total crosses 5 s and the hopper-empty warning latches.
    rig.shared.request_manual_dispense();
    rig.run_ms(1 + 200);
    rig.run_ms(2_100);
    assert!(rig.service.fault_mask() & DeviceFault::HopperEmpty.mask() != 0);

    // A hopper detection clears both the warning and the accumulator.
    rig.signals.hopper_edge();
    rig.signals.dispense_edge();
    rig.run_ms(1);
    assert_eq!(rig.service.fault_mask(), 0);
    // The tick that consumed the edges still counts toward the fresh
    // accumulator, so "reset" means back near zero, not exactly zero.
    assert!(rig.signals.starve_ms() < 10);
}

#[test]
fn hopper_empty_warning_does_not_suppress_dispensing() {
    let mut rig = Rig::new();

    // Starve long enough to latch the warning, then complete.
    rig.shared.request_manual_dispense();
    rig.run_ms(1 + 200);
    rig.run_ms(5_100);
    assert!(rig.service.fault_mask() & DeviceFault::HopperEmpty.mask() != 0);
    rig.signals.dispense_edge();
    rig.run_ms(1 + 200);

    // The warning alone must not block the next session.
    rig.shared.request_manual_dispense();
    rig.run_ms(1);
    assert_eq!(rig.service.state(), StateId::PreRoll);
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn counters_survive_a_reboot_through_the_gateway() {
    let mut store = NvsGateway::new_sim();
    let mut rig = Rig::new();

    rig.shared.request_manual_dispense();
    rig.run_ms(1 + 200);
    rig.drop_treat();
    rig.run_ms(200);
    assert_eq!(rig.service.counters().treats_dispensed, 1);

    rig.service.force_save_if_dirty(&mut store);
    let reloaded = store.load_config().expect("load after save");
    assert_eq!(reloaded.counters.treats_dispensed, 1);
    assert!(reloaded.counters.lifetime_distance_cm == 0);
}

#[test]
fn stats_reset_zeroes_and_flushes_immediately() {
    let mut store = NvsGateway::new_sim();
    let mut rig = Rig::new();

    rig.ride_past_threshold();
    rig.run_ms(200);
    rig.drop_treat();
    rig.run_ms(200);
    rig.service.force_save_if_dirty(&mut store);

    rig.shared.request_stats_reset();
    rig.run_ms(1);
    assert_eq!(rig.service.counters().treats_dispensed, 0);
    assert_eq!(rig.shared.lifetime_distance_cm(), 0);
    assert_eq!(rig.shared.trip_distance_cm(), 0);

    // The save clock is backdated, so the periodic pass flushes now
    // instead of waiting out the debounce interval.
    assert!(rig.service.auto_save_if_needed(&mut store));
    let reloaded = store.load_config().expect("load after reset");
    assert_eq!(reloaded.counters, treatwheel::config::Counters::default());
}

#[test]
fn distance_only_rides_persist_on_the_save_interval() {
    let mut store = NvsGateway::new_sim();
    let mut stored = StoredConfig::default();
    stored.dispenser.counter_save_interval_secs = 1;
    let mut rig = Rig::with_config(stored);

    // A short ride, well below the dispense threshold: no treat, but
    // the lifetime distance still has to survive a power cycle.
    for _ in 0..10 {
        rig.wheel.edge();
    }
    rig.run_ms(1);
    assert_eq!(rig.shared.lifetime_distance_cm(), 220);
    assert_eq!(rig.service.counters().treats_dispensed, 0);

    rig.run_ms(1_100);
    assert!(rig.service.auto_save_if_needed(&mut store));
    let reloaded = store.load_config().expect("load after save");
    assert_eq!(reloaded.counters.lifetime_distance_cm, 220);
}

#[test]
fn mqtt_settings_are_forwarded_for_the_live_publisher() {
    let mut store = NvsGateway::new_sim();
    let mut rig = Rig::new();

    let update = SettingsUpdate {
        mqtt: Some(MqttConfig {
            enabled: true,
            ..MqttConfig::default()
        }),
        ..SettingsUpdate::default()
    };
    let forwarded = rig
        .service
        .handle_settings(update, &mut store)
        .expect("mqtt config handed back");
    assert!(forwarded.enabled);

    // Updates without an MQTT section leave the publisher alone.
    let update = SettingsUpdate {
        distance_threshold_cm: Some(20_000),
        ..SettingsUpdate::default()
    };
    assert!(rig.service.handle_settings(update, &mut store).is_none());
}

// ── Un-provisioning ───────────────────────────────────────────

#[test]
fn wifi_reset_clears_credentials_and_requests_restart() {
    let mut store = NvsGateway::new_sim();
    store
        .save_wifi(&WifiCredentials::clamped("barn", "hunter22-hunter22"))
        .expect("save creds");
    let mut rig = Rig::new();

    rig.shared.request_wifi_reset();
    assert!(rig.service.handle_maintenance(&mut store));

    let reloaded = store.load_config().expect("load after clear");
    assert_eq!(reloaded.wifi, WifiCredentials::default());
}

#[test]
fn config_reset_clears_settings_but_keeps_counters() {
    let mut store = NvsGateway::new_sim();
    store
        .save_config(
            &MqttConfig {
                enabled: true,
                ..MqttConfig::default()
            },
            5_000,
        )
        .expect("save settings");
    store
        .save_counters(&treatwheel::config::Counters {
            lifetime_distance_cm: 2_200,
            treats_dispensed: 3,
        })
        .expect("save counters");
    let mut rig = Rig::new();

    rig.shared.request_config_reset();
    assert!(!rig.service.handle_maintenance(&mut store));

    let reloaded = store.load_config().expect("load after clear");
    assert!(!reloaded.mqtt.enabled);
    assert_eq!(
        reloaded.dispenser.distance_threshold_cm,
        StoredConfig::default().dispenser.distance_threshold_cm
    );
    assert_eq!(reloaded.counters.lifetime_distance_cm, 2_200);
}

#[test]
fn restart_request_surfaces_through_maintenance() {
    let mut store = NvsGateway::new_sim();
    let mut rig = Rig::new();
    assert!(!rig.service.handle_maintenance(&mut store));

    rig.shared.request_restart();
    assert!(rig.service.handle_maintenance(&mut store));
}

#[test]
fn first_boot_seeds_defaults_once() {
    let mut store = NvsGateway::new_sim();
    assert!(store.first_boot().expect("first_boot"));

    store
        .set_initial_config(&StoredConfig::default())
        .expect("seed");
    assert!(!store.first_boot().expect("first_boot after seed"));
    assert_eq!(
        store.load_config().expect("load"),
        StoredConfig::default()
    );
}
