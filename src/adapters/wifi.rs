//! Wi-Fi adapter.
//!
//! Implements [`WifiControl`] — the hexagonal boundary for the radio.
//! Configuration mode uses it in dual AP+STA mode: the software access
//! point hosts the portal while the station side scans and tries out
//! candidate credentials.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF Wi-Fi driver calls via
//!   `esp_idf_svc::wifi::EspWifi`.
//! - **all other targets**: [`SimWifi`], a scriptable stand-in for
//!   host-side tests.

use log::info;

use crate::ports::{LinkStatus, ScanPoll, WifiControl, WifiError};

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use espidf_impl::EspWifiControl;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use super::*;
    use log::warn;
    use std::sync::{Arc, Mutex};

    use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
        ScanConfig, WifiEvent,
    };

    use crate::portal::scan::{EncryptionKind, NetworkEntry, rssi_to_percentage};

    /// Coarse link hint maintained from driver events. The driver cannot
    /// always distinguish `no_ssid_available` from an auth failure without
    /// reason codes, so the hint tracks what is observable: whether the
    /// last disconnect interrupted an attempt or an established link.
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum LinkHint {
        Idle,
        Connecting,
        Connected,
        ConnectFailed,
        ConnectionLost,
    }

    pub struct EspWifiControl {
        driver: EspWifi<'static>,
        ap_ip: String,
        hint: Arc<Mutex<LinkHint>>,
        scan_started: bool,
        _subscription: EspSubscription<'static, System>,
    }

    impl EspWifiControl {
        pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, WifiError> {
            let driver =
                EspWifi::new(modem, sysloop.clone(), None).map_err(|_| WifiError::ApStartFailed)?;

            let hint = Arc::new(Mutex::new(LinkHint::Idle));
            let hint_for_events = Arc::clone(&hint);
            let subscription = sysloop
                .subscribe::<WifiEvent, _>(move |event| {
                    let mut hint = match hint_for_events.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    match event {
                        WifiEvent::StaConnected(_) => *hint = LinkHint::Connected,
                        WifiEvent::StaDisconnected(_) => {
                            *hint = match *hint {
                                LinkHint::Connected => LinkHint::ConnectionLost,
                                LinkHint::Connecting => LinkHint::ConnectFailed,
                                other => other,
                            };
                        }
                        _ => {}
                    }
                })
                .map_err(|_| WifiError::ApStartFailed)?;

            Ok(Self {
                driver,
                ap_ip: String::new(),
                hint,
                scan_started: false,
                _subscription: subscription,
            })
        }

        fn hint(&self) -> LinkHint {
            match self.hint.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }

        fn set_hint(&self, value: LinkHint) {
            match self.hint.lock() {
                Ok(mut guard) => *guard = value,
                Err(poisoned) => *poisoned.into_inner() = value,
            }
        }
    }

    fn encryption_kind(auth: Option<AuthMethod>) -> EncryptionKind {
        match auth {
            Some(AuthMethod::None) => EncryptionKind::Open,
            Some(AuthMethod::WEP) => EncryptionKind::Wep,
            Some(AuthMethod::WPA) => EncryptionKind::Wpa,
            Some(AuthMethod::WPA2Personal | AuthMethod::WPA2Enterprise) => EncryptionKind::Wpa2,
            Some(AuthMethod::WPAWPA2Personal) => EncryptionKind::WpaWpa2,
            _ => EncryptionKind::Auto,
        }
    }

    fn bssid_string(bssid: &[u8; 6]) -> String {
        use core::fmt::Write;
        let mut out = String::with_capacity(17);
        for (i, byte) in bssid.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ":");
            }
            let _ = write!(out, "{byte:02X}");
        }
        out
    }

    impl WifiControl for EspWifiControl {
        fn start_access_point(
            &mut self,
            ssid: &str,
            password: Option<&str>,
        ) -> Result<(), WifiError> {
            let mut ap = AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|_| WifiError::InvalidCredentials)?,
                ..Default::default()
            };
            if let Some(password) = password {
                ap.password = password
                    .try_into()
                    .map_err(|_| WifiError::InvalidCredentials)?;
                ap.auth_method = AuthMethod::WPA2Personal;
            } else {
                ap.auth_method = AuthMethod::None;
            }

            // Dual mode: the AP hosts the portal while the STA side scans
            // and attempts candidate credentials.
            self.driver
                .set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap))
                .map_err(|_| WifiError::ApStartFailed)?;
            self.driver.start().map_err(|_| WifiError::ApStartFailed)?;

            let ip_info = self
                .driver
                .ap_netif()
                .get_ip_info()
                .map_err(|_| WifiError::ApStartFailed)?;
            self.ap_ip = ip_info.ip.to_string();
            info!("WiFi: AP '{}' up at {}", ssid, self.ap_ip);
            Ok(())
        }

        fn ap_ip(&self) -> &str {
            &self.ap_ip
        }

        fn start_scan(&mut self) -> Result<(), WifiError> {
            self.driver
                .start_scan(&ScanConfig::default(), false)
                .map_err(|_| WifiError::ScanStartFailed)?;
            self.scan_started = true;
            Ok(())
        }

        fn poll_scan(&mut self) -> ScanPoll {
            if !self.scan_started {
                return ScanPoll::Idle;
            }
            match self.driver.is_scan_done() {
                Ok(false) => ScanPoll::Running,
                Ok(true) => {
                    self.scan_started = false;
                    match self.driver.get_scan_result() {
                        Ok(aps) => ScanPoll::Completed(
                            aps.iter()
                                .map(|ap| NetworkEntry {
                                    ssid: ap.ssid.to_string(),
                                    bssid: bssid_string(&ap.bssid),
                                    rssi: ap.signal_strength,
                                    signal: rssi_to_percentage(ap.signal_strength),
                                    encryption: encryption_kind(ap.auth_method),
                                })
                                .collect(),
                        ),
                        Err(e) => {
                            warn!("WiFi: scan result fetch failed: {e}");
                            ScanPoll::Failed
                        }
                    }
                }
                Err(e) => {
                    warn!("WiFi: scan failed: {e}");
                    self.scan_started = false;
                    ScanPoll::Failed
                }
            }
        }

        fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
            let client = ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| WifiError::InvalidCredentials)?,
                password: password
                    .try_into()
                    .map_err(|_| WifiError::InvalidCredentials)?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            };

            // Preserve the AP half of the mixed configuration.
            let ap = match self.driver.get_configuration() {
                Ok(Configuration::Mixed(_, ap) | Configuration::AccessPoint(ap)) => ap,
                _ => AccessPointConfiguration::default(),
            };
            self.driver
                .set_configuration(&Configuration::Mixed(client, ap))
                .map_err(|_| WifiError::ConnectFailed)?;

            self.set_hint(LinkHint::Connecting);
            self.driver.connect().map_err(|_| WifiError::ConnectFailed)?;
            info!("WiFi: connection attempt to '{}' initiated", ssid);
            Ok(())
        }

        fn link_status(&self) -> LinkStatus {
            match self.hint() {
                LinkHint::Idle => LinkStatus::Idle,
                LinkHint::Connecting => LinkStatus::Disconnected,
                LinkHint::ConnectFailed => LinkStatus::ConnectFailed,
                LinkHint::ConnectionLost => LinkStatus::ConnectionLost,
                LinkHint::Connected => match self.driver.sta_netif().get_ip_info() {
                    Ok(info) if !info.ip.is_unspecified() => LinkStatus::Connected {
                        local_ip: info.ip.to_string(),
                    },
                    _ => LinkStatus::Other,
                },
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Scriptable Wi-Fi stand-in for host tests.
///
/// Tests queue `ScanPoll` outcomes; each `poll_scan` consumes one entry
/// (an empty queue reports `Running`, keeping an in-flight scan pending).
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimWifi {
    pub ap: Option<(String, Option<String>)>,
    pub scan_outcomes: std::collections::VecDeque<ScanPoll>,
    pub connect_attempts: Vec<(String, String)>,
    pub link: Option<LinkStatus>,
    pub fail_scan_start: bool,
    scans_started: u32,
    ap_ip: String,
}

#[cfg(not(target_os = "espidf"))]
impl SimWifi {
    pub fn new() -> Self {
        Self {
            ap_ip: "192.168.4.1".to_string(),
            ..Self::default()
        }
    }

    pub fn scans_started(&self) -> u32 {
        self.scans_started
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiControl for SimWifi {
    fn start_access_point(&mut self, ssid: &str, password: Option<&str>) -> Result<(), WifiError> {
        info!("WiFi(sim): AP '{}' up at {}", ssid, self.ap_ip);
        self.ap = Some((ssid.to_string(), password.map(str::to_string)));
        Ok(())
    }

    fn ap_ip(&self) -> &str {
        &self.ap_ip
    }

    fn start_scan(&mut self) -> Result<(), WifiError> {
        if self.fail_scan_start {
            return Err(WifiError::ScanStartFailed);
        }
        self.scans_started += 1;
        Ok(())
    }

    fn poll_scan(&mut self) -> ScanPoll {
        self.scan_outcomes.pop_front().unwrap_or(ScanPoll::Running)
    }

    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        self.connect_attempts
            .push((ssid.to_string(), password.to_string()));
        Ok(())
    }

    fn link_status(&self) -> LinkStatus {
        self.link.clone().unwrap_or(LinkStatus::Idle)
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn sim_records_connect_attempts() {
        let mut wifi = SimWifi::new();
        wifi.begin_connect("HomeNet", "secret123").unwrap();
        assert_eq!(
            wifi.connect_attempts,
            vec![("HomeNet".to_string(), "secret123".to_string())]
        );
    }

    #[test]
    fn sim_scan_outcomes_drain_in_order() {
        let mut wifi = SimWifi::new();
        wifi.scan_outcomes.push_back(ScanPoll::Running);
        wifi.scan_outcomes.push_back(ScanPoll::Failed);
        assert_eq!(wifi.poll_scan(), ScanPoll::Running);
        assert_eq!(wifi.poll_scan(), ScanPoll::Failed);
        // Exhausted queue keeps the scan pending.
        assert_eq!(wifi.poll_scan(), ScanPoll::Running);
    }

    #[test]
    fn sim_scan_start_failure() {
        let mut wifi = SimWifi::new();
        wifi.fail_scan_start = true;
        assert_eq!(wifi.start_scan(), Err(WifiError::ScanStartFailed));
        assert_eq!(wifi.scans_started(), 0);
    }
}
