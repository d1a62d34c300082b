//! Boot-mode state machine.
//!
//! Exactly one boot implementation owns the device per power cycle:
//!
//! ```text
//!            ┌─────────────────────────────────────────────┐
//!            │  startup                                    │
//!            │                                             │
//!            │  one-shot override pending? ──▶ honor it    │
//!            │  else config valid?         ──▶ Normal      │
//!            │  else                       ──▶ Configuration│
//!            └─────────────────────────────────────────────┘
//! ```
//!
//! Standalone is only reachable through explicit firmware configuration
//! and never initialises the network stack. There is no in-process mode
//! switch: a mode change persists the new intent and raises the reboot
//! flag, and the next power cycle picks it up.

pub mod config;
pub mod normal;
pub mod standalone;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CONFIG_NAMESPACE;
use crate::context::{lock, SharedContext};
use crate::ports::{ResetTrigger, StorageError, StoragePort};

const INTENT_KEY: &str = "bootmode";

// ───────────────────────────────────────────────────────────────
// Modes
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootMode {
    Standalone,
    Configuration,
    Normal,
}

impl BootMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Configuration => "configuration",
            Self::Normal => "normal",
        }
    }
}

/// Pick the mode for this power cycle.
///
/// Precedence: a pending one-shot override, then the firmware's
/// explicitly configured mode, then configuration validity.
pub fn select_mode(
    configured: Option<BootMode>,
    override_mode: Option<BootMode>,
    config_valid: bool,
) -> BootMode {
    if let Some(mode) = override_mode {
        return mode;
    }
    if let Some(mode) = configured {
        return mode;
    }
    if config_valid {
        BootMode::Normal
    } else {
        BootMode::Configuration
    }
}

// ───────────────────────────────────────────────────────────────
// Persisted one-shot intent
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct IntentRecord {
    mode: BootMode,
}

/// Persist the mode the *next* boot must honor.
pub fn set_next_boot(
    storage: &mut (dyn StoragePort + Send),
    mode: BootMode,
) -> Result<(), StorageError> {
    let record = IntentRecord { mode };
    let bytes = postcard::to_allocvec(&record).map_err(|_| StorageError::IoError)?;
    storage.write(CONFIG_NAMESPACE, INTENT_KEY, &bytes)?;
    info!("next boot mode persisted: {}", mode.as_str());
    Ok(())
}

/// Read and consume the pending override, if any. The record is erased
/// before it is returned so it applies to exactly one boot.
pub fn take_boot_override(storage: &mut (dyn StoragePort + Send)) -> Option<BootMode> {
    let bytes = match storage.read(CONFIG_NAMESPACE, INTENT_KEY) {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound) => return None,
        Err(e) => {
            warn!("boot intent read failed: {e}");
            return None;
        }
    };

    if let Err(e) = storage.delete(CONFIG_NAMESPACE, INTENT_KEY) {
        warn!("boot intent erase failed: {e}");
    }

    match postcard::from_bytes::<IntentRecord>(&bytes) {
        Ok(record) => {
            info!("honoring one-shot boot mode override: {}", record.mode.as_str());
            Some(record.mode)
        }
        Err(_) => {
            warn!("boot intent record corrupt, ignoring");
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Boot contract
// ───────────────────────────────────────────────────────────────

/// The `setup`/`tick` contract every boot mode implements. `setup` runs
/// once; `tick` runs on every scheduler pass and must not block.
pub trait Boot {
    fn name(&self) -> &'static str;
    fn setup(&mut self);
    fn tick(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Orchestrator
// ───────────────────────────────────────────────────────────────

/// Owns the single active boot implementation for this power cycle and
/// forwards every scheduler tick to it.
pub struct BootOrchestrator {
    ctx: SharedContext,
    boot: Box<dyn Boot + Send>,
    started: bool,
    reset: Option<Box<dyn ResetTrigger + Send>>,
}

impl BootOrchestrator {
    pub fn new(ctx: SharedContext, boot: Box<dyn Boot + Send>) -> Self {
        info!("boot mode: {}", boot.name());
        Self {
            ctx,
            boot,
            started: false,
            reset: None,
        }
    }

    pub fn with_reset_trigger(mut self, trigger: Box<dyn ResetTrigger + Send>) -> Self {
        self.reset = Some(trigger);
        self
    }

    pub fn boot_name(&self) -> &'static str {
        self.boot.name()
    }

    /// One scheduler pass: `setup` once, then `tick`. A fired reset
    /// trigger erases the configuration, persists Configuration as the
    /// next-boot intent and raises the reboot flag.
    pub fn tick(&mut self) {
        if !self.started {
            self.boot.setup();
            self.started = true;
        }

        if self.reset.as_mut().is_some_and(|t| t.fired()) {
            warn!("reset trigger fired: erasing configuration");
            let mut ctx = lock(&self.ctx);
            if let Err(e) = ctx.config.erase() {
                warn!("configuration erase failed: {e}");
            }
            if let Err(e) = set_next_boot(ctx.config.storage_mut(), BootMode::Configuration) {
                warn!("boot intent write failed: {e}");
            }
            ctx.flags.reboot = true;
            return;
        }

        if lock(&self.ctx).flags.reboot {
            return;
        }

        self.boot.tick();
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;
    use crate::config::ConfigStore;
    use crate::context::{AppContext, FirmwareInfo};
    use crate::registry::{NodeRegistry, SettingsRegistry};
    use std::sync::{Arc, Mutex};

    fn shared_ctx() -> SharedContext {
        Arc::new(Mutex::new(AppContext::new(
            "Hearth",
            FirmwareInfo {
                name: "test-fw",
                version: "0.0.1",
            },
            ConfigStore::new(Box::new(NvsStorage::new().unwrap())),
            SettingsRegistry::new(),
            NodeRegistry::new(),
        )))
    }

    #[test]
    fn override_beats_everything() {
        assert_eq!(
            select_mode(Some(BootMode::Standalone), Some(BootMode::Configuration), true),
            BootMode::Configuration
        );
    }

    #[test]
    fn configured_standalone_wins_over_validity() {
        assert_eq!(
            select_mode(Some(BootMode::Standalone), None, true),
            BootMode::Standalone
        );
    }

    #[test]
    fn valid_config_boots_normal() {
        assert_eq!(select_mode(None, None, true), BootMode::Normal);
    }

    #[test]
    fn missing_config_boots_configuration() {
        assert_eq!(select_mode(None, None, false), BootMode::Configuration);
    }

    #[test]
    fn boot_override_is_consumed_once() {
        let mut storage = NvsStorage::new().unwrap();
        set_next_boot(&mut storage, BootMode::Configuration).unwrap();

        assert_eq!(
            take_boot_override(&mut storage),
            Some(BootMode::Configuration)
        );
        // Second read: nothing pending.
        assert_eq!(take_boot_override(&mut storage), None);
    }

    #[test]
    fn corrupt_override_is_ignored_and_cleared() {
        let mut storage = NvsStorage::new().unwrap();
        storage
            .write(CONFIG_NAMESPACE, INTENT_KEY, &[0xFF, 0xFF, 0xFF])
            .unwrap();
        assert_eq!(take_boot_override(&mut storage), None);
        assert!(!storage.exists(CONFIG_NAMESPACE, INTENT_KEY));
    }

    // ── Orchestrator ──────────────────────────────────────────

    struct CountingBoot {
        setups: Arc<Mutex<u32>>,
        ticks: Arc<Mutex<u32>>,
    }

    impl Boot for CountingBoot {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn setup(&mut self) {
            *self.setups.lock().unwrap() += 1;
        }
        fn tick(&mut self) {
            *self.ticks.lock().unwrap() += 1;
        }
    }

    struct OneShotReset {
        armed: bool,
    }

    impl ResetTrigger for OneShotReset {
        fn fired(&mut self) -> bool {
            core::mem::take(&mut self.armed)
        }
    }

    #[test]
    fn setup_runs_once_then_ticks() {
        let ctx = shared_ctx();
        let setups = Arc::new(Mutex::new(0));
        let ticks = Arc::new(Mutex::new(0));
        let mut orchestrator = BootOrchestrator::new(
            Arc::clone(&ctx),
            Box::new(CountingBoot {
                setups: Arc::clone(&setups),
                ticks: Arc::clone(&ticks),
            }),
        );

        orchestrator.tick();
        orchestrator.tick();
        orchestrator.tick();
        assert_eq!(*setups.lock().unwrap(), 1);
        assert_eq!(*ticks.lock().unwrap(), 3);
    }

    #[test]
    fn reset_trigger_erases_and_flags_reboot() {
        let ctx = shared_ctx();
        {
            let mut guard = lock(&ctx);
            let registry = SettingsRegistry::new();
            let doc = serde_json::json!({
                "name": "dev",
                "wifi": {"ssid": "Net", "password": "pw123456"},
                "bus": {"host": "broker.lan"},
            });
            guard
                .config
                .write(&serde_json::to_vec(&doc).unwrap(), &registry)
                .unwrap();
        }

        let ticks = Arc::new(Mutex::new(0));
        let mut orchestrator = BootOrchestrator::new(
            Arc::clone(&ctx),
            Box::new(CountingBoot {
                setups: Arc::new(Mutex::new(0)),
                ticks: Arc::clone(&ticks),
            }),
        )
        .with_reset_trigger(Box::new(OneShotReset { armed: true }));

        orchestrator.tick();

        let mut guard = lock(&ctx);
        assert!(guard.flags.reboot);
        let registry = SettingsRegistry::new();
        assert!(guard.config.is_valid(&registry).is_err());
        assert_eq!(
            take_boot_override(guard.config.storage_mut()),
            Some(BootMode::Configuration)
        );
        // Reset pre-empted the boot's own tick.
        assert_eq!(*ticks.lock().unwrap(), 0);
    }

    #[test]
    fn reboot_flag_stops_ticking() {
        let ctx = shared_ctx();
        lock(&ctx).flags.reboot = true;

        let ticks = Arc::new(Mutex::new(0));
        let mut orchestrator = BootOrchestrator::new(
            Arc::clone(&ctx),
            Box::new(CountingBoot {
                setups: Arc::new(Mutex::new(0)),
                ticks: Arc::clone(&ticks),
            }),
        );

        orchestrator.tick();
        assert_eq!(*ticks.lock().unwrap(), 0);
    }
}
