//! One-shot hardware peripheral initialization.
//!
//! Configures GPIO directions, the 50 Hz LEDC timer driving the servo
//! motor, and the GPIO interrupt service using raw ESP-IDF sys calls.
//! Called once from `main()` before any task starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcInitFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={rc})"),
            Self::LedcInitFailed(rc) => write!(f, "LEDC timer/channel config failed (rc={rc})"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={rc})"),
        }
    }
}

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before any task spawns; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_gpio_outputs()?;
        init_ledc()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // Wheel hall sensor and both photo-interrupter detectors are
    // active-low open-collector outputs: pull-up, falling-edge interrupt.
    let input_pins = [
        pins::WHEEL_SENSOR_GPIO,
        pins::HOPPER_SENSOR_GPIO,
        pins::DISPENSE_SENSOR_GPIO,
    ];

    for &pin in &input_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!("hw_init: GPIO inputs configured");
    Ok(())
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let output_pins = [
        pins::HOPPER_LED_GPIO,
        pins::DISPENSE_LED_GPIO,
        pins::FAULT_LED_GPIO,
    ];

    for &pin in &output_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe { gpio_set_level(pin, 0) };
    }

    info!("hw_init: GPIO outputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an already-configured output pin;
    // pin was validated during init_gpio_outputs().
    unsafe {
        gpio_set_level(pin, if high { 1 } else { 0 });
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

// ── LEDC PWM (servo pulse generation) ────────────────────────

/// LEDC duty resolution used for the servo timer.  14 bits at 50 Hz
/// gives ~1.2 µs of pulse-width granularity.
const SERVO_DUTY_BITS: u32 = 14;
/// Servo frame period at 50 Hz.
const SERVO_PERIOD_US: u64 = 20_000;

pub const LEDC_CH_MOTOR: u32 = 0;

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    // Timer 0: continuous-rotation servo (50 Hz, 14-bit).
    // SAFETY: Called from the single main-task context via init_peripherals().
    let timer0 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_14_BIT,
        freq_hz: pins::MOTOR_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    let ret = unsafe { ledc_timer_config(&timer0) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed(ret));
    }

    // Channel 0: motor signal line, parked at the neutral pulse so a
    // reset mid-dispense leaves the wheel stopped.
    let ret = unsafe {
        ledc_channel_config(&ledc_channel_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel: ledc_channel_t_LEDC_CHANNEL_0,
            timer_sel: ledc_timer_t_LEDC_TIMER_0,
            gpio_num: pins::MOTOR_GPIO,
            duty: us_to_duty(pins::MOTOR_NEUTRAL_US),
            hpoint: 0,
            ..Default::default()
        })
    };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed(ret));
    }

    info!("hw_init: LEDC configured (motor=CH0, 50 Hz servo frame)");
    Ok(())
}

/// Convert a servo pulse width in microseconds to LEDC duty ticks.
pub fn us_to_duty(us: u32) -> u32 {
    ((us as u64) << SERVO_DUTY_BITS).div_euclid(SERVO_PERIOD_US) as u32
}

#[cfg(target_os = "espidf")]
pub fn motor_set_us(us: u32) {
    let us = us.clamp(pins::MOTOR_MIN_US, pins::MOTOR_MAX_US);
    // SAFETY: the motor channel was configured in init_ledc(); duty
    // register writes are race-free since only the control task calls this.
    unsafe {
        ledc_set_duty(
            ledc_mode_t_LEDC_LOW_SPEED_MODE,
            LEDC_CH_MOTOR,
            us_to_duty(us),
        );
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, LEDC_CH_MOTOR);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn motor_set_us(_us: u32) {}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn wheel_gpio_isr(_arg: *mut core::ffi::c_void) {
    crate::sensors::wheel::wheel_isr_handler();
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn hopper_gpio_isr(_arg: *mut core::ffi::c_void) {
    crate::sensors::photogate::hopper_isr_handler();
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn dispense_gpio_isr(_arg: *mut core::ffi::c_void) {
    crate::sensors::photogate::dispense_isr_handler();
}

/// Install the per-pin GPIO ISR service and register interrupt handlers.
/// Call after init_peripherals() and before any task starts.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed (acceptable).  The handlers registered
    // below are static functions that only touch lock-free atomics.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        // Wheel hall sensor: falling edge per magnet pass.
        gpio_isr_handler_add(
            pins::WHEEL_SENSOR_GPIO,
            Some(wheel_gpio_isr),
            core::ptr::null_mut(),
        );
        gpio_intr_enable(pins::WHEEL_SENSOR_GPIO);

        // Hopper photo-interrupter: falling edge when a treat blocks the beam.
        gpio_isr_handler_add(
            pins::HOPPER_SENSOR_GPIO,
            Some(hopper_gpio_isr),
            core::ptr::null_mut(),
        );
        gpio_intr_enable(pins::HOPPER_SENSOR_GPIO);

        // Dispense chute photo-interrupter: falling edge on treat exit.
        gpio_isr_handler_add(
            pins::DISPENSE_SENSOR_GPIO,
            Some(dispense_gpio_isr),
            core::ptr::null_mut(),
        );
        gpio_intr_enable(pins::DISPENSE_SENSOR_GPIO);

        info!("hw_init: ISR service installed (wheel, hopper, dispense)");
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins;

    #[test]
    fn servo_duty_conversion_spans_the_pulse_range() {
        // 1500 µs of a 20 ms frame is 7.5% of 2^14 ticks.
        assert_eq!(us_to_duty(pins::MOTOR_NEUTRAL_US), 1228);
        assert_eq!(us_to_duty(pins::MOTOR_DISPENSE_US), 1638);
        assert_eq!(us_to_duty(0), 0);
        assert_eq!(us_to_duty(20_000), 1 << 14);
    }
}
