//! Hardware actuator adapter.
//!
//! Implements [`ActuatorPort`] over the motor and indicator drivers.
//! On ESP-IDF the drivers hit real LEDC/GPIO registers; on host targets
//! they track commanded state in-memory, which also makes this adapter
//! usable directly in integration tests.

use crate::app::ports::ActuatorPort;
use crate::drivers::indicator::Indicators;
use crate::drivers::motor::{MotorDriver, MotorState};

pub struct HardwareActuators {
    motor: MotorDriver,
    indicators: Indicators,
}

impl HardwareActuators {
    pub fn new() -> Self {
        Self {
            motor: MotorDriver::new(),
            indicators: Indicators::new(),
        }
    }

    pub fn motor_state(&self) -> MotorState {
        self.motor.state()
    }

    pub fn sensor_leds_on(&self) -> bool {
        self.indicators.sensor_leds_on()
    }

    pub fn fault_led_on(&self) -> bool {
        self.indicators.fault_led_on()
    }
}

impl Default for HardwareActuators {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorPort for HardwareActuators {
    fn motor_dispense(&mut self) {
        self.motor.dispense();
    }

    fn motor_neutral(&mut self) {
        self.motor.neutral();
    }

    fn set_sensor_leds(&mut self, on: bool) {
        self.indicators.set_sensor_leds(on);
    }

    fn set_fault_led(&mut self, on: bool) {
        self.indicators.set_fault_led(on);
    }

    fn all_off(&mut self) {
        self.motor.neutral();
        self.indicators.all_off();
    }
}
