//! Wi-Fi scan debouncer.
//!
//! Scanning is the only slow I/O in the portal loop besides the proxy
//! bridge, so it is never awaited: the debouncer drives an explicit
//! idle → running → completed-or-failed cycle, polled once per tick.
//! A fixed minimum interval separates the end of one scan from the start
//! of the next to bound radio and CPU usage.

use log::{info, warn};
use serde::Serialize;

use crate::ports::{ScanPoll, WifiControl};

/// Minimum interval between the end of one scan and the start of the next.
pub const SCAN_INTERVAL_MS: u64 = 20_000;

// ───────────────────────────────────────────────────────────────
// Network entries
// ───────────────────────────────────────────────────────────────

/// Encryption vocabulary reported by `/networks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EncryptionKind {
    #[serde(rename = "none")]
    Open,
    #[serde(rename = "wep")]
    Wep,
    #[serde(rename = "wpa")]
    Wpa,
    #[serde(rename = "wpa2")]
    Wpa2,
    #[serde(rename = "wpa_wpa2")]
    WpaWpa2,
    /// Unknown or auto-negotiated schemes.
    #[serde(rename = "auto")]
    Auto,
}

/// One access point from a completed scan. Ephemeral: rebuilt on every
/// completed scan, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEntry {
    pub ssid: String,
    pub bssid: String,
    pub rssi: i8,
    pub signal: u8,
    pub encryption: EncryptionKind,
}

/// Map RSSI (dBm) onto a 0–100 signal percentage.
pub fn rssi_to_percentage(rssi: i8) -> u8 {
    if rssi <= -100 {
        0
    } else if rssi >= -50 {
        100
    } else {
        (2 * (i16::from(rssi) + 100)) as u8
    }
}

// ───────────────────────────────────────────────────────────────
// Debouncer
// ───────────────────────────────────────────────────────────────

/// Outcome of one debouncer tick, for the portal's bookkeeping.
#[derive(Debug, PartialEq)]
pub enum ScanEvent {
    /// Nothing happened this tick.
    None,
    /// A new scan was started.
    Started,
    /// The in-flight scan failed; the timer was rearmed.
    Failed,
    /// The in-flight scan completed with a fresh network list.
    Completed(Vec<NetworkEntry>),
}

/// Drives the scan cycle. Owned by the portal; transitions happen only
/// inside [`ScanDebouncer::tick`].
pub struct ScanDebouncer {
    interval_ms: u64,
    next_at_ms: u64,
    in_flight: bool,
    result_count: usize,
}

impl ScanDebouncer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            // First scan fires on the first tick.
            next_at_ms: 0,
            in_flight: false,
            result_count: 0,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Poll the radio once.
    ///
    /// While a scan is in flight the timer is left alone; on failure the
    /// timer is rearmed so the next attempt waits the full debounce
    /// interval rather than retrying immediately.
    pub fn tick<W: WifiControl>(&mut self, wifi: &mut W, now_ms: u64) -> ScanEvent {
        if self.in_flight {
            return match wifi.poll_scan() {
                ScanPoll::Running => ScanEvent::None,
                ScanPoll::Idle => {
                    // Radio lost track of the scan; treat as a failure.
                    warn!("Wi-Fi scan vanished, rearming timer");
                    self.in_flight = false;
                    self.result_count = 0;
                    self.next_at_ms = now_ms + self.interval_ms;
                    ScanEvent::Failed
                }
                ScanPoll::Failed => {
                    warn!("Wi-Fi scan failed");
                    self.in_flight = false;
                    self.result_count = 0;
                    self.next_at_ms = now_ms + self.interval_ms;
                    ScanEvent::Failed
                }
                ScanPoll::Completed(networks) => {
                    info!("Wi-Fi scan completed: {} networks", networks.len());
                    self.in_flight = false;
                    self.result_count = networks.len();
                    self.next_at_ms = now_ms + self.interval_ms;
                    ScanEvent::Completed(networks)
                }
            };
        }

        if now_ms >= self.next_at_ms {
            info!("Triggering Wi-Fi scan");
            match wifi.start_scan() {
                Ok(()) => {
                    self.in_flight = true;
                    ScanEvent::Started
                }
                Err(e) => {
                    warn!("Wi-Fi scan start failed: {e}");
                    self.next_at_ms = now_ms + self.interval_ms;
                    ScanEvent::Failed
                }
            }
        } else {
            ScanEvent::None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
