//! Continuous-rotation servo driver for the dispense wheel.
//!
//! The wheel is turned by a continuous-rotation hobby servo: a 1500 µs
//! pulse holds it stationary, 2000 µs spins it at full dispense speed.
//! There is no position feedback — the photo-interrupters decide when
//! enough rotation has happened.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: writes real LEDC duty via hw_init helpers.
//! On host/test: tracks commanded state in-memory only.

use crate::drivers::hw_init;
use crate::pins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Neutral,
    Dispensing,
}

pub struct MotorDriver {
    state: MotorState,
}

impl MotorDriver {
    /// Construct with the signal line parked at neutral.
    pub fn new() -> Self {
        hw_init::motor_set_us(pins::MOTOR_NEUTRAL_US);
        Self {
            state: MotorState::Neutral,
        }
    }

    /// Spin at dispense speed.
    pub fn dispense(&mut self) {
        if self.state != MotorState::Dispensing {
            hw_init::motor_set_us(pins::MOTOR_DISPENSE_US);
            self.state = MotorState::Dispensing;
        }
    }

    /// Hold stationary.  Idempotent; always writes the pulse so a glitched
    /// duty register recovers on the next call.
    pub fn neutral(&mut self) {
        hw_init::motor_set_us(pins::MOTOR_NEUTRAL_US);
        self.state = MotorState::Neutral;
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == MotorState::Dispensing
    }
}

impl Default for MotorDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_neutral_and_toggles() {
        let mut motor = MotorDriver::new();
        assert!(!motor.is_running());
        motor.dispense();
        assert!(motor.is_running());
        motor.neutral();
        assert_eq!(motor.state(), MotorState::Neutral);
    }
}
