//! Reset-trigger button driver.
//!
//! Active-low momentary switch with external pull-up, polled from the
//! orchestrator tick. Holding the button past the threshold fires the
//! factory-reset trigger once per hold; the device reboots into
//! configuration mode before a second fire could matter.

use embedded_hal::digital::InputPin;
use log::info;

use crate::adapters::time::MonotonicClock;
use crate::ports::ResetTrigger;

/// Default hold duration that counts as a reset request.
const HOLD_MS: u64 = 5_000;

pub struct ResetButton<P: InputPin> {
    pin: P,
    clock: MonotonicClock,
    hold_ms: u64,
    pressed_since: Option<u64>,
    fired: bool,
}

impl<P: InputPin> ResetButton<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            clock: MonotonicClock::new(),
            hold_ms: HOLD_MS,
            pressed_since: None,
            fired: false,
        }
    }

    /// Override the hold threshold (shorter in tests).
    pub fn with_hold_ms(mut self, hold_ms: u64) -> Self {
        self.hold_ms = hold_ms;
        self
    }
}

impl<P: InputPin> ResetTrigger for ResetButton<P> {
    fn fired(&mut self) -> bool {
        let held = self.pin.is_low().unwrap_or(false);
        let now_ms = self.clock.now_ms();

        if !held {
            self.pressed_since = None;
            self.fired = false;
            return false;
        }

        let since = *self.pressed_since.get_or_insert(now_ms);
        if !self.fired && now_ms.saturating_sub(since) >= self.hold_ms {
            info!("reset button held {}ms", now_ms - since);
            self.fired = true;
            return true;
        }
        false
    }
}
