//! Property tests for the core data structures.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32
//! targets. On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;
use treatwheel::config::{Counters, WifiCredentials, PASSPHRASE_MAX_BYTES, SSID_MAX_BYTES};
use treatwheel::odometer::Odometer;
use treatwheel::sync::SlotQueue;

// ── Odometer arithmetic ───────────────────────────────────────

proptest! {
    /// Distance is exact pulse arithmetic — no drift, no rounding.
    #[test]
    fn distance_is_pulses_times_step(
        pulses in 0u32..5_000,
        per_pulse in 1u32..200,
        threshold in 1u32..2_000_000,
    ) {
        let mut odo = Odometer::new(per_pulse, threshold);
        for _ in 0..pulses {
            odo.record_pulse();
        }
        prop_assert_eq!(odo.distance_cm(), pulses * per_pulse);
        prop_assert_eq!(odo.pulse_count(), pulses);
        prop_assert_eq!(
            odo.threshold_reached(),
            pulses * per_pulse >= threshold
        );
    }

    /// A trip reset zeroes the trip but never touches the threshold.
    #[test]
    fn reset_clears_trip_only(
        pulses in 1u32..5_000,
        per_pulse in 1u32..200,
        threshold in 1u32..2_000_000,
    ) {
        let mut odo = Odometer::new(per_pulse, threshold);
        for _ in 0..pulses {
            odo.record_pulse();
        }
        odo.reset();
        prop_assert_eq!(odo.distance_cm(), 0);
        prop_assert_eq!(odo.pulse_count(), 0);
        prop_assert_eq!(odo.threshold_cm(), threshold);
        prop_assert!(!odo.threshold_reached());
    }
}

// ── Credential clamping ───────────────────────────────────────

proptest! {
    /// Clamping never exceeds the radio's byte limits and never splits
    /// a multi-byte character.
    #[test]
    fn clamped_credentials_fit_the_radio(
        ssid in ".{0,80}",
        passphrase in ".{0,120}",
    ) {
        let creds = WifiCredentials::clamped(&ssid, &passphrase);
        prop_assert!(creds.ssid.len() <= SSID_MAX_BYTES);
        prop_assert!(creds.passphrase.len() <= PASSPHRASE_MAX_BYTES);
        // Truncation preserves a prefix of the input.
        prop_assert!(ssid.starts_with(creds.ssid.as_str()));
        prop_assert!(passphrase.starts_with(creds.passphrase.as_str()));
    }

    /// Inputs already within capacity pass through untouched.
    #[test]
    fn short_credentials_are_identity(
        ssid in "[a-zA-Z0-9 _-]{1,31}",
        passphrase in "[a-zA-Z0-9 _-]{0,63}",
    ) {
        let creds = WifiCredentials::clamped(&ssid, &passphrase);
        prop_assert_eq!(creds.ssid.as_str(), ssid.as_str());
        prop_assert_eq!(creds.passphrase.as_str(), passphrase.as_str());
    }
}

// ── Slot queue ────────────────────────────────────────────────

proptest! {
    /// However many sends race ahead of the consumer, the queue yields
    /// exactly the newest value, then goes empty.
    #[test]
    fn slot_queue_keeps_newest(values in proptest::collection::vec(any::<u32>(), 1..20)) {
        let queue = SlotQueue::new();
        for v in &values {
            queue.send(*v);
        }
        prop_assert_eq!(queue.recv(), Some(*values.last().unwrap()));
        prop_assert_eq!(queue.recv(), None);
    }
}

// ── Persistence encoding ──────────────────────────────────────

proptest! {
    /// Counter records survive the NVS blob encoding for any values.
    #[test]
    fn counters_roundtrip_through_postcard(
        lifetime in any::<u32>(),
        treats in any::<u32>(),
    ) {
        let counters = Counters {
            lifetime_distance_cm: lifetime,
            treats_dispensed: treats,
        };
        let bytes = postcard::to_allocvec(&counters).unwrap();
        let back: Counters = postcard::from_bytes(&bytes).unwrap();
        prop_assert_eq!(counters, back);
    }
}
