//! Standalone boot mode.
//!
//! Runs the firmware author's callbacks with no network stack at all.
//! Reachable only through explicit firmware configuration.

use log::info;

use crate::context::SharedContext;
use crate::ports::{Indicator, IndicatorMode};

use super::Boot;

/// User callback installed by the firmware author.
pub type UserCallback = Box<dyn FnMut() + Send>;

pub struct BootStandalone {
    _ctx: SharedContext,
    indicator: Box<dyn Indicator + Send>,
    user_setup: Option<UserCallback>,
    user_loop: Option<UserCallback>,
}

impl BootStandalone {
    pub fn new(ctx: SharedContext, indicator: Box<dyn Indicator + Send>) -> Self {
        Self {
            _ctx: ctx,
            indicator,
            user_setup: None,
            user_loop: None,
        }
    }

    pub fn with_setup(mut self, callback: UserCallback) -> Self {
        self.user_setup = Some(callback);
        self
    }

    pub fn with_loop(mut self, callback: UserCallback) -> Self {
        self.user_loop = Some(callback);
        self
    }
}

impl Boot for BootStandalone {
    fn name(&self) -> &'static str {
        "standalone"
    }

    fn setup(&mut self) {
        info!("standalone mode: no network stack");
        self.indicator.set_mode(IndicatorMode::Normal);
        if let Some(setup) = self.user_setup.as_mut() {
            setup();
        }
    }

    fn tick(&mut self) {
        if let Some(user_loop) = self.user_loop.as_mut() {
            user_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;
    use crate::config::ConfigStore;
    use crate::context::{AppContext, FirmwareInfo};
    use crate::ports::NullIndicator;
    use crate::registry::{NodeRegistry, SettingsRegistry};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_user_callbacks() {
        let ctx = Arc::new(Mutex::new(AppContext::new(
            "Hearth",
            FirmwareInfo {
                name: "fw",
                version: "0",
            },
            ConfigStore::new(Box::new(NvsStorage::new().unwrap())),
            SettingsRegistry::new(),
            NodeRegistry::new(),
        )));

        let loops = Arc::new(AtomicU32::new(0));
        let loops_in_cb = Arc::clone(&loops);
        let mut boot = BootStandalone::new(ctx, Box::new(NullIndicator))
            .with_loop(Box::new(move || {
                loops_in_cb.fetch_add(1, Ordering::Relaxed);
            }));

        boot.setup();
        boot.tick();
        boot.tick();
        assert_eq!(loops.load(Ordering::Relaxed), 2);
    }
}
