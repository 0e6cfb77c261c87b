//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! The MQTT publisher implements the same trait for its event feed.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::TreatDispensed { lifetime_total } => {
                info!("TREAT | dispensed, lifetime total {}", lifetime_total);
            }
            AppEvent::FaultRaised(mask) => {
                warn!("FAULT | raised, mask=0b{:02b}", mask);
            }
            AppEvent::FaultsCleared => {
                info!("FAULT | all cleared");
            }
            AppEvent::StatsReset => {
                info!("STATS | counters zeroed");
            }
        }
    }
}
