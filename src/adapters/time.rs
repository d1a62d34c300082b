//! Monotonic clock adapter.
//!
//! All portal timing (scan debounce, deferred reboot) is driven from a
//! single millisecond counter:
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **all other targets** — uses `std::time::Instant` for host-side tests.

/// Monotonic milliseconds-since-boot source.
pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
