//! Port traits — the hexagonal boundary between the boot/portal logic and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Portal / BootOrchestrator (domain)
//! ```
//!
//! Driven adapters (Wi-Fi, NVS, HTTP client, status LED) implement these
//! traits. The portal and the boot machinery consume them via generics or
//! boxed trait objects, so the domain core never touches ESP-IDF directly
//! and the whole logic suite runs on the host.

use core::fmt;

use crate::portal::scan::NetworkEntry;

// ───────────────────────────────────────────────────────────────
// Storage port (domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the configuration document, the
/// next-boot intent record and the UI bundle blob.
///
/// Implementations MUST commit writes atomically — no partial state may be
/// observable after power loss. The ESP-IDF NVS API guarantees this
/// natively; the in-memory simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the stored bytes, or `NotFound`.
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi control port (domain ↔ radio)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    ApStartFailed,
    ScanStartFailed,
    ConnectFailed,
    InvalidCredentials,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApStartFailed => write!(f, "software AP start failed"),
            Self::ScanStartFailed => write!(f, "Wi-Fi scan start failed"),
            Self::ConnectFailed => write!(f, "Wi-Fi connect failed"),
            Self::InvalidCredentials => write!(f, "SSID or password invalid"),
        }
    }
}

/// Result of polling an asynchronous scan. Owned by the portal's scan
/// debouncer; the adapter only reports what the radio says right now.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPoll {
    /// No scan has been started.
    Idle,
    /// Scan still in flight — check again next tick.
    Running,
    /// The radio gave up; no results.
    Failed,
    /// Scan finished with the given access points.
    Completed(Vec<NetworkEntry>),
}

/// Link state of the station interface, mapped 1:1 onto the portal's
/// `/wifi/status` vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    ConnectFailed,
    ConnectionLost,
    NoSsidAvailable,
    Connected { local_ip: String },
    Disconnected,
    Other,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ConnectFailed => "connect_failed",
            Self::ConnectionLost => "connection_lost",
            Self::NoSsidAvailable => "no_ssid_available",
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::Other => "other",
        }
    }
}

/// Everything the portal needs from the radio. One implementation wraps
/// the ESP-IDF Wi-Fi driver in dual AP+STA mode; the host implementation
/// is scriptable for tests.
pub trait WifiControl {
    /// Bring up the software access point. `password: None` = open network.
    fn start_access_point(&mut self, ssid: &str, password: Option<&str>) -> Result<(), WifiError>;

    /// The access point's own IPv4 address as a literal string.
    fn ap_ip(&self) -> &str;

    /// Kick off an asynchronous network scan. Must not block.
    fn start_scan(&mut self) -> Result<(), WifiError>;

    /// Poll the in-flight scan. Must not block.
    fn poll_scan(&mut self) -> ScanPoll;

    /// Begin a credential-based STA connection attempt. Returns as soon as
    /// the attempt is initiated; association is observed via `link_status`.
    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError>;

    /// Current station link state.
    fn link_status(&self) -> LinkStatus;
}

// ───────────────────────────────────────────────────────────────
// Proxy client port (portal ↔ upstream HTTP)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    ConnectFailed,
    RequestFailed,
    Timeout,
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "upstream connect failed"),
            Self::RequestFailed => write!(f, "upstream request failed"),
            Self::Timeout => write!(f, "upstream timed out"),
        }
    }
}

/// Response relayed back from an upstream server.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The transparent-proxy bridge. The one deliberately blocking call in the
/// portal: the original client is already suspended awaiting a response,
/// and the implementation bounds its own duration with a network timeout.
/// Implementations MUST close the upstream connection on every exit path.
pub trait ProxyClient {
    fn forward(
        &mut self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) -> Result<UpstreamResponse, ProxyError>;
}

// ───────────────────────────────────────────────────────────────
// Status indicator port (domain → LED)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    Off,
    /// Solid on — device is serving the provisioning portal.
    Provisioning,
    /// Normal operation.
    Normal,
}

/// Visual status indicator. Boot modes drive it; the driver decides how
/// the mode maps onto the hardware (single LED, RGB, nothing at all).
pub trait Indicator {
    fn set_mode(&mut self, mode: IndicatorMode);
}

/// No-op indicator for firmware without a status LED.
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn set_mode(&mut self, _mode: IndicatorMode) {}
}

// ───────────────────────────────────────────────────────────────
// Reset trigger port (hardware → orchestrator)
// ───────────────────────────────────────────────────────────────

/// Factory-reset signal, typically a button held past a threshold.
/// Polled once per orchestrator tick; a `true` return is consumed.
pub trait ResetTrigger {
    fn fired(&mut self) -> bool;
}
