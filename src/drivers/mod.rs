//! Actuator drivers, hardware initialisation, and peripheral helpers.

pub mod hw_init;
pub mod indicator;
pub mod motor;
pub mod task_pin;
pub mod watchdog;
