//! Provisioning UI bundle.
//!
//! The single-file HTML bundle is flashed into storage as a raw DEFLATE
//! stream (`assets::ui`) and inflated once when configuration mode
//! starts. When no bundle is present the portal's `/` route answers 404
//! with a pointer to the HTTP API instead.

use log::{info, warn};
use miniz_oxide::inflate::decompress_to_vec;

use crate::ports::StoragePort;

pub const UI_NAMESPACE: &str = "assets";
pub const UI_KEY: &str = "ui";

/// Inflated bundle size guard — a corrupt length prefix must not be able
/// to exhaust the heap.
const UI_MAX_INFLATED: usize = 128 * 1024;

/// Load and inflate the UI bundle, if one is flashed.
pub fn load_bundle<S: StoragePort + ?Sized>(storage: &S) -> Option<Vec<u8>> {
    let compressed = storage.read(UI_NAMESPACE, UI_KEY).ok()?;
    match decompress_to_vec(&compressed) {
        Ok(html) if html.len() <= UI_MAX_INFLATED => {
            info!(
                "UI bundle loaded ({} -> {} bytes)",
                compressed.len(),
                html.len()
            );
            Some(html)
        }
        Ok(html) => {
            warn!("UI bundle too large after inflate ({} bytes), ignoring", html.len());
            None
        }
        Err(e) => {
            warn!("UI bundle corrupt, ignoring: {e}");
            None
        }
    }
}
