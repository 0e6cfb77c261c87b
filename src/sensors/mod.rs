//! Sensor subsystem — interrupt-adjacent signal capture.
//!
//! The two photo-interrupters and the wheel hall-effect sensor all fire
//! GPIO interrupts.  The handlers live here and do nothing but flip
//! atomics; every state transition happens in the polling tasks that
//! consume those atomics (event producer, single consumer).

pub mod photogate;
pub mod wheel;
