//! Indicator outputs: photo-interrupter emitter LEDs and the fault lamp.
//!
//! The two emitter LEDs light the photo-interrupter beams and are only
//! powered during a dispense session; they switch together.  The fault
//! lamp is driven continuously while the out-of-treats fault is latched.

use crate::drivers::hw_init;
use crate::pins;

pub struct Indicators {
    sensor_leds_on: bool,
    fault_led_on: bool,
}

impl Indicators {
    pub fn new() -> Self {
        Self {
            sensor_leds_on: false,
            fault_led_on: false,
        }
    }

    /// Power or darken both emitter LEDs together.
    pub fn set_sensor_leds(&mut self, on: bool) {
        if self.sensor_leds_on != on {
            hw_init::gpio_write(pins::HOPPER_LED_GPIO, on);
            hw_init::gpio_write(pins::DISPENSE_LED_GPIO, on);
            self.sensor_leds_on = on;
        }
    }

    pub fn set_fault_led(&mut self, on: bool) {
        if self.fault_led_on != on {
            hw_init::gpio_write(pins::FAULT_LED_GPIO, on);
            self.fault_led_on = on;
        }
    }

    pub fn all_off(&mut self) {
        self.set_sensor_leds(false);
        self.set_fault_led(false);
    }

    pub fn sensor_leds_on(&self) -> bool {
        self.sensor_leds_on
    }

    pub fn fault_led_on(&self) -> bool {
        self.fault_led_on
    }
}

impl Default for Indicators {
    fn default() -> Self {
        Self::new()
    }
}
