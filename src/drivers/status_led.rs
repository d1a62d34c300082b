//! Status LED driver.
//!
//! A single LED on a GPIO, generic over `embedded-hal`'s [`OutputPin`]
//! so the driver works with any pin implementation (ESP-IDF `PinDriver`
//! on device, a mock pin in tests). Provisioning mode holds the LED
//! solid on; normal operation and standalone leave it off.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::ports::{Indicator, IndicatorMode};

pub struct StatusLed<P: OutputPin> {
    pin: P,
    /// Polarity: `true` when the LED lights on a high level.
    active_high: bool,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(pin: P, active_high: bool) -> Self {
        Self { pin, active_high }
    }

    fn set_lit(&mut self, lit: bool) {
        let result = if lit == self.active_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            warn!("status LED write failed");
        }
    }
}

impl<P: OutputPin> Indicator for StatusLed<P> {
    fn set_mode(&mut self, mode: IndicatorMode) {
        match mode {
            IndicatorMode::Provisioning => self.set_lit(true),
            IndicatorMode::Off | IndicatorMode::Normal => self.set_lit(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct MockPin {
        high: bool,
        writes: u32,
    }

    impl embedded_hal::digital::ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn provisioning_lights_active_high_led() {
        let mut led = StatusLed::new(MockPin::default(), true);
        led.set_mode(IndicatorMode::Provisioning);
        assert!(led.pin.high);
        led.set_mode(IndicatorMode::Normal);
        assert!(!led.pin.high);
    }

    #[test]
    fn provisioning_respects_active_low_polarity() {
        let mut led = StatusLed::new(MockPin::default(), false);
        led.set_mode(IndicatorMode::Provisioning);
        assert!(!led.pin.high);
        led.set_mode(IndicatorMode::Off);
        assert!(led.pin.high);
    }
}
