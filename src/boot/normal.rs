//! Normal boot mode.
//!
//! Connects the station interface using the stored credentials and hands
//! the link to the device-protocol client. The protocol itself (message
//! bus, topics, payloads) is an external collaborator behind
//! [`DeviceProtocolClient`]; this mode only owns the connect/reconnect
//! cycle and the mode-transition contract it shares with the other boot
//! implementations.

use log::{info, warn};

use crate::context::{lock, SharedContext};
use crate::ports::{Indicator, IndicatorMode, LinkStatus, WifiControl};

use super::standalone::UserCallback;
use super::Boot;

/// Ticks between reconnect attempts after a lost link.
const RECONNECT_BACKOFF_TICKS: u32 = 200;

/// The device-protocol client driven while the link is up. Implemented
/// outside this crate; the framework only reports link transitions and
/// forwards ticks.
pub trait DeviceProtocolClient {
    fn on_link_up(&mut self, local_ip: &str);
    fn on_link_down(&mut self);
    fn tick(&mut self);
}

/// Protocol stub for firmware that only wants the link managed.
pub struct NullProtocolClient;

impl DeviceProtocolClient for NullProtocolClient {
    fn on_link_up(&mut self, local_ip: &str) {
        info!("link up at {local_ip}");
    }
    fn on_link_down(&mut self) {
        info!("link down");
    }
    fn tick(&mut self) {}
}

pub struct BootNormal<W: WifiControl> {
    ctx: SharedContext,
    wifi: W,
    indicator: Box<dyn Indicator + Send>,
    client: Box<dyn DeviceProtocolClient + Send>,
    user_loop: Option<UserCallback>,
    link_up: bool,
    connect_started: bool,
    backoff_ticks: u32,
}

impl<W: WifiControl> BootNormal<W> {
    pub fn new(
        ctx: SharedContext,
        wifi: W,
        indicator: Box<dyn Indicator + Send>,
        client: Box<dyn DeviceProtocolClient + Send>,
    ) -> Self {
        Self {
            ctx,
            wifi,
            indicator,
            client,
            user_loop: None,
            link_up: false,
            connect_started: false,
            backoff_ticks: 0,
        }
    }

    pub fn with_loop(mut self, callback: UserCallback) -> Self {
        self.user_loop = Some(callback);
        self
    }

    fn begin_connect(&mut self) {
        let (ssid, password) = {
            let ctx = lock(&self.ctx);
            match ctx.config.load(&ctx.settings) {
                Ok(doc) => (doc.wifi.ssid, doc.wifi.password),
                Err(e) => {
                    warn!("normal mode without valid configuration: {e}");
                    return;
                }
            }
        };

        match self.wifi.begin_connect(&ssid, &password) {
            Ok(()) => {
                info!("connecting to '{ssid}'");
                self.connect_started = true;
            }
            Err(e) => warn!("connect attempt failed to start: {e}"),
        }
    }
}

impl<W: WifiControl> Boot for BootNormal<W> {
    fn name(&self) -> &'static str {
        "normal"
    }

    fn setup(&mut self) {
        if lock(&self.ctx).flags.disable_normal {
            info!("normal operation disabled pending reboot");
            return;
        }
        self.indicator.set_mode(IndicatorMode::Normal);
        self.begin_connect();
    }

    fn tick(&mut self) {
        if lock(&self.ctx).flags.disable_normal {
            return;
        }

        match self.wifi.link_status() {
            LinkStatus::Connected { local_ip } => {
                self.backoff_ticks = 0;
                if !self.link_up {
                    self.link_up = true;
                    self.client.on_link_up(&local_ip);
                }
                self.client.tick();
            }
            status => {
                if self.link_up {
                    self.link_up = false;
                    warn!("link lost ({})", status.as_str());
                    self.client.on_link_down();
                }
                if self.connect_started {
                    // Spread retries out; the radio bounds each attempt
                    // with its own timeout.
                    self.backoff_ticks += 1;
                    if self.backoff_ticks >= RECONNECT_BACKOFF_TICKS {
                        self.backoff_ticks = 0;
                        self.begin_connect();
                    }
                }
            }
        }

        if let Some(user_loop) = self.user_loop.as_mut() {
            user_loop();
        }
    }
}
