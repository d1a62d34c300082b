//! Hearth reference firmware — main entry point.
//!
//! Wires the framework to real peripherals and runs the boot-mode
//! orchestrator:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  startup                                                     │
//! │    NVS ─▶ ConfigStore ─▶ boot intent + validity              │
//! │                 │                                            │
//! │                 ▼                                            │
//! │          BootOrchestrator ── owns exactly one of ──┐         │
//! │                 │                                  │         │
//! │   BootStandalone · BootConfig (portal) · BootNormal│         │
//! │                 │                                  │         │
//! │  scheduler loop: tick ── reboot flag ──▶ esp_restart         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::info;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;

use hearth::adapters::nvs::NvsStorage;
use hearth::adapters::wifi::EspWifiControl;
use hearth::boot::config::BootConfig;
use hearth::boot::normal::{BootNormal, NullProtocolClient};
use hearth::boot::standalone::BootStandalone;
use hearth::boot::{select_mode, take_boot_override, Boot, BootMode, BootOrchestrator};
use hearth::config::ConfigStore;
use hearth::context::{lock, AppContext, FirmwareInfo, SharedContext};
use hearth::drivers::reset_button::ResetButton;
use hearth::drivers::status_led::StatusLed;
use hearth::portal::proxy::EspProxyClient;
use hearth::portal::Portal;
use hearth::ports::Indicator;
use hearth::registry::{NodeRegistry, SettingKind, SettingValue, SettingsRegistry};

/// Scheduler period. Short enough that DNS and scan polling stay
/// responsive, long enough to leave the radio task plenty of air.
const TICK_PERIOD: Duration = Duration::from_millis(10);

fn main() -> Result<()> {
    // ── ESP-IDF bootstrap ─────────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Hearth v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── Registries declared by this firmware ──────────────────
    let mut settings = SettingsRegistry::new();
    settings.optional(
        "publish_interval",
        "telemetry publish interval in seconds",
        SettingValue::Long(60),
    );
    settings.require("zone", "installation zone label", SettingKind::Text);

    let mut nodes = NodeRegistry::new();
    nodes.register("light", "switch");

    // ── Configuration store + boot intent ─────────────────────
    let mut storage = NvsStorage::new()?;
    let override_mode = take_boot_override(&mut storage);
    let config = ConfigStore::new(Box::new(storage));
    let config_valid = config.is_valid(&settings).is_ok();

    let mode = select_mode(None, override_mode, config_valid);
    info!("boot mode selected: {}", mode.as_str());

    let ctx: SharedContext = Arc::new(Mutex::new(AppContext::new(
        "Hearth",
        FirmwareInfo {
            name: "hearth-reference",
            version: env!("CARGO_PKG_VERSION"),
        },
        config,
        settings,
        nodes,
    )));

    let led: Box<dyn Indicator + Send> = Box::new(StatusLed::new(
        PinDriver::output(peripherals.pins.gpio2)?,
        true,
    ));

    // ── Select and own exactly one boot implementation ────────
    let boot: Box<dyn Boot + Send> = match mode {
        BootMode::Standalone => Box::new(BootStandalone::new(Arc::clone(&ctx), led)),
        BootMode::Configuration => {
            let wifi = EspWifiControl::new(peripherals.modem, sysloop)
                .map_err(|e| anyhow::anyhow!("Wi-Fi init failed: {e}"))?;
            let portal = Portal::new(wifi, EspProxyClient::new());
            Box::new(BootConfig::new(Arc::clone(&ctx), portal, led))
        }
        BootMode::Normal => {
            let wifi = EspWifiControl::new(peripherals.modem, sysloop)
                .map_err(|e| anyhow::anyhow!("Wi-Fi init failed: {e}"))?;
            Box::new(BootNormal::new(
                Arc::clone(&ctx),
                wifi,
                led,
                Box::new(NullProtocolClient),
            ))
        }
    };

    // BOOT button doubles as the factory-reset trigger when held.
    let reset = ResetButton::new(PinDriver::input(peripherals.pins.gpio0)?);
    let mut orchestrator =
        BootOrchestrator::new(Arc::clone(&ctx), boot).with_reset_trigger(Box::new(reset));

    // ── Scheduler loop ────────────────────────────────────────
    loop {
        orchestrator.tick();

        if lock(&ctx).flags.reboot {
            info!("rebooting");
            // Let any in-flight HTTP response drain before restart.
            thread::sleep(Duration::from_millis(100));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        thread::sleep(TICK_PERIOD);
    }
}
