//! Driven adapters — implementations of the port traits plus the
//! outward-facing task surfaces (web portal, MQTT telemetry).

pub mod hardware;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod portal;
pub mod time;
pub mod wifi;
