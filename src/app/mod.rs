//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the business rules for the TreatWheel dispenser:
//! odometer accounting, dispense FSM orchestration, fault latching, and
//! counter persistence.  All interaction with hardware and storage
//! happens through **port traits** defined in [`ports`], keeping this
//! layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
