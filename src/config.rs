//! Configuration document and store.
//!
//! The device's configuration is one JSON document: network credentials,
//! message-bus endpoint, device name and a `settings` sub-object for
//! firmware-declared custom values. The store guarantees all-or-nothing
//! validity — a document is either fully absent or validates against the
//! complete schema; a partially-valid document is never persisted and
//! never read back as valid.
//!
//! Every fallible operation returns a `Result` carrying a human-readable
//! reason; nothing in here panics or aborts.

use core::fmt;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ports::{StorageError, StoragePort};
use crate::registry::SettingsRegistry;

pub const CONFIG_NAMESPACE: &str = "hearth";
const CONFIG_KEY: &str = "config";

const MAX_NAME_LEN: usize = 64;
const MAX_SSID_LEN: usize = 32;
const MAX_WIFI_PASSWORD_LEN: usize = 64;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Body is not parseable JSON.
    Parse(String),
    /// Document violates the schema; the reason is client-facing.
    Invalid(String),
    /// No valid configuration is stored.
    NotConfigured,
    /// The storage backend failed.
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(reason) => write!(f, "invalid JSON: {reason}"),
            Self::Invalid(reason) => write!(f, "{reason}"),
            Self::NotConfigured => write!(f, "no configuration stored"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ───────────────────────────────────────────────────────────────
// Document schema
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WifiCredentials {
    pub ssid: String,
    /// Empty for open networks.
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusEndpoint {
    pub host: String,
    #[serde(default = "default_bus_port")]
    pub port: u16,
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_bus_port() -> u16 {
    1883
}

fn default_base_topic() -> String {
    "devices/".to_string()
}

/// The complete configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    pub name: String,
    pub wifi: WifiCredentials,
    pub bus: BusEndpoint,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(reason.into())
}

/// Parse and validate a full document against the schema and the
/// declared settings registry.
pub fn parse_document(body: &[u8], registry: &SettingsRegistry) -> Result<ConfigDocument, ConfigError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_value(&value, registry)
}

/// Validate an already-parsed JSON value.
pub fn validate_value(value: &Value, registry: &SettingsRegistry) -> Result<ConfigDocument, ConfigError> {
    let doc: ConfigDocument =
        serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;

    if doc.name.is_empty() || doc.name.len() > MAX_NAME_LEN {
        return Err(invalid("name must be 1-64 characters"));
    }
    if doc.wifi.ssid.is_empty() || doc.wifi.ssid.len() > MAX_SSID_LEN {
        return Err(invalid("wifi.ssid must be 1-32 characters"));
    }
    if doc.wifi.password.len() > MAX_WIFI_PASSWORD_LEN {
        return Err(invalid("wifi.password must be at most 64 characters"));
    }
    if doc.bus.host.is_empty() {
        return Err(invalid("bus.host is required"));
    }
    if doc.bus.port == 0 {
        return Err(invalid("bus.port must be 1-65535"));
    }

    validate_settings(&doc.settings, registry)?;
    Ok(doc)
}

fn validate_settings(settings: &Map<String, Value>, registry: &SettingsRegistry) -> Result<(), ConfigError> {
    for descriptor in registry.iter() {
        match settings.get(descriptor.name) {
            Some(value) => {
                if !descriptor.kind.accepts(value) {
                    return Err(invalid(format!(
                        "setting '{}' must be of type {}",
                        descriptor.name,
                        descriptor.kind.as_str()
                    )));
                }
            }
            None if descriptor.required => {
                return Err(invalid(format!(
                    "required setting '{}' missing",
                    descriptor.name
                )));
            }
            None => {}
        }
    }

    for key in settings.keys() {
        if registry.find(key).is_none() {
            return Err(invalid(format!("unknown setting '{key}'")));
        }
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// JSON merge
// ───────────────────────────────────────────────────────────────

/// Deep-merge `patch` onto `base`: objects merge recursively, every other
/// value replaces. Disjoint keys accumulate; reapplying the same patch is
/// idempotent.
pub fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) if base_value.is_object() && patch_value.is_object() => {
                        merge_json(base_value, patch_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Remove credential material before a document leaves the device.
pub fn elide_secrets(mut value: Value) -> Value {
    if let Some(wifi) = value.get_mut("wifi").and_then(Value::as_object_mut) {
        wifi.remove("password");
    }
    if let Some(bus) = value.get_mut("bus").and_then(Value::as_object_mut) {
        bus.remove("password");
    }
    value
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

/// Persistent configuration store over a [`StoragePort`]. The single
/// source of truth for configuration validity.
pub struct ConfigStore {
    storage: Box<dyn StoragePort + Send>,
}

impl ConfigStore {
    pub fn new(storage: Box<dyn StoragePort + Send>) -> Self {
        Self { storage }
    }

    /// Borrow the underlying storage for other namespaced consumers
    /// (boot intent record, UI bundle).
    pub fn storage(&self) -> &(dyn StoragePort + Send) {
        &*self.storage
    }

    pub fn storage_mut(&mut self) -> &mut (dyn StoragePort + Send) {
        &mut *self.storage
    }

    /// Whether a stored document exists and validates.
    pub fn is_valid(&self, registry: &SettingsRegistry) -> Result<(), ConfigError> {
        self.load(registry).map(|_| ())
    }

    /// Load and validate the stored document.
    pub fn load(&self, registry: &SettingsRegistry) -> Result<ConfigDocument, ConfigError> {
        let bytes = match self.storage.read(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound) => return Err(ConfigError::NotConfigured),
            Err(e) => return Err(e.into()),
        };
        parse_document(&bytes, registry)
    }

    /// The stored document with secrets elided, for `GET /config`.
    pub fn read_safe(&self, registry: &SettingsRegistry) -> Result<Value, ConfigError> {
        let doc = self.load(registry)?;
        let value = serde_json::to_value(&doc).map_err(|e| invalid(e.to_string()))?;
        Ok(elide_secrets(value))
    }

    /// Validate and persist a full document. Nothing is written unless
    /// the whole document validates.
    pub fn write(&mut self, body: &[u8], registry: &SettingsRegistry) -> Result<(), ConfigError> {
        let doc = parse_document(body, registry)?;
        self.persist(&doc)?;
        info!("configuration stored for device '{}'", doc.name);
        Ok(())
    }

    /// Merge a partial document onto the stored one, validate the result
    /// and persist it. The stored document is untouched on any failure.
    pub fn patch(&mut self, body: &[u8], registry: &SettingsRegistry) -> Result<(), ConfigError> {
        let patch: Value =
            serde_json::from_slice(body).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if !patch.is_object() {
            return Err(invalid("patch must be a JSON object"));
        }

        let mut base = match self.storage.read(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ConfigError::Parse(e.to_string()))?,
            Err(StorageError::NotFound) => Value::Object(Map::new()),
            Err(e) => return Err(e.into()),
        };

        merge_json(&mut base, &patch);
        let doc = validate_value(&base, registry)?;
        self.persist(&doc)?;
        info!("configuration patched for device '{}'", doc.name);
        Ok(())
    }

    /// Erase the stored document (factory reset / reset trigger).
    pub fn erase(&mut self) -> Result<(), ConfigError> {
        self.storage.delete(CONFIG_NAMESPACE, CONFIG_KEY)?;
        Ok(())
    }

    fn persist(&mut self, doc: &ConfigDocument) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec(doc).map_err(|e| invalid(e.to_string()))?;
        self.storage.write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;
    use crate::registry::{SettingKind, SettingValue};
    use serde_json::json;

    fn store() -> ConfigStore {
        ConfigStore::new(Box::new(NvsStorage::new().unwrap()))
    }

    fn full_doc() -> Value {
        json!({
            "name": "garden-light",
            "wifi": { "ssid": "HomeNet", "password": "secret123" },
            "bus": { "host": "broker.lan", "port": 1883 },
        })
    }

    #[test]
    fn accepts_minimal_valid_document() {
        let registry = SettingsRegistry::new();
        let doc = validate_value(&full_doc(), &registry).unwrap();
        assert_eq!(doc.name, "garden-light");
        assert_eq!(doc.bus.base_topic, "devices/");
    }

    #[test]
    fn rejects_missing_wifi() {
        let registry = SettingsRegistry::new();
        let value = json!({ "name": "x", "bus": { "host": "h" } });
        assert!(matches!(
            validate_value(&value, &registry),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_empty_ssid() {
        let registry = SettingsRegistry::new();
        let mut value = full_doc();
        value["wifi"]["ssid"] = json!("");
        let err = validate_value(&value, &registry).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid("wifi.ssid must be 1-32 characters".to_string())
        );
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let registry = SettingsRegistry::new();
        let mut value = full_doc();
        value["mystery"] = json!(1);
        assert!(matches!(
            validate_value(&value, &registry),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_zero_port() {
        let registry = SettingsRegistry::new();
        let mut value = full_doc();
        value["bus"]["port"] = json!(0);
        assert!(matches!(
            validate_value(&value, &registry),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn required_setting_enforced() {
        let mut registry = SettingsRegistry::new();
        registry.require("zone", "irrigation zone", SettingKind::Long);

        let err = validate_value(&full_doc(), &registry).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid("required setting 'zone' missing".to_string())
        );

        let mut value = full_doc();
        value["settings"] = json!({ "zone": 3 });
        assert!(validate_value(&value, &registry).is_ok());
    }

    #[test]
    fn setting_type_mismatch_rejected() {
        let mut registry = SettingsRegistry::new();
        registry.optional("debug", "verbose logging", SettingValue::Bool(false));

        let mut value = full_doc();
        value["settings"] = json!({ "debug": "yes" });
        let err = validate_value(&value, &registry).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid("setting 'debug' must be of type bool".to_string())
        );
    }

    #[test]
    fn unknown_setting_rejected() {
        let registry = SettingsRegistry::new();
        let mut value = full_doc();
        value["settings"] = json!({ "surprise": 1 });
        assert!(matches!(
            validate_value(&value, &registry),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn write_then_load_round_trips() {
        let registry = SettingsRegistry::new();
        let mut store = store();
        let body = serde_json::to_vec(&full_doc()).unwrap();

        store.write(&body, &registry).unwrap();
        let doc = store.load(&registry).unwrap();
        assert_eq!(doc.wifi.ssid, "HomeNet");
        assert!(store.is_valid(&registry).is_ok());
    }

    #[test]
    fn invalid_write_persists_nothing() {
        let registry = SettingsRegistry::new();
        let mut store = store();
        assert!(store.write(b"{\"name\": \"\"}", &registry).is_err());
        assert_eq!(store.is_valid(&registry), Err(ConfigError::NotConfigured));
    }

    #[test]
    fn read_safe_elides_passwords() {
        let registry = SettingsRegistry::new();
        let mut store = store();
        let mut value = full_doc();
        value["bus"]["username"] = json!("bus-user");
        value["bus"]["password"] = json!("bus-pass");
        store
            .write(&serde_json::to_vec(&value).unwrap(), &registry)
            .unwrap();

        let safe = store.read_safe(&registry).unwrap();
        assert!(safe["wifi"].get("password").is_none());
        assert!(safe["bus"].get("password").is_none());
        assert_eq!(safe["bus"]["username"], "bus-user");
        assert_eq!(safe["wifi"]["ssid"], "HomeNet");
    }

    #[test]
    fn patch_merges_and_keeps_rest() {
        let registry = SettingsRegistry::new();
        let mut store = store();
        store
            .write(&serde_json::to_vec(&full_doc()).unwrap(), &registry)
            .unwrap();

        store
            .patch(br#"{"wifi": {"ssid": "NewNet"}}"#, &registry)
            .unwrap();
        let doc = store.load(&registry).unwrap();
        assert_eq!(doc.wifi.ssid, "NewNet");
        // Untouched siblings survive the merge.
        assert_eq!(doc.wifi.password, "secret123");
        assert_eq!(doc.bus.host, "broker.lan");
    }

    #[test]
    fn invalid_patch_leaves_store_untouched() {
        let registry = SettingsRegistry::new();
        let mut store = store();
        store
            .write(&serde_json::to_vec(&full_doc()).unwrap(), &registry)
            .unwrap();

        assert!(store.patch(br#"{"wifi": {"ssid": ""}}"#, &registry).is_err());
        let doc = store.load(&registry).unwrap();
        assert_eq!(doc.wifi.ssid, "HomeNet");
    }

    #[test]
    fn merge_disjoint_keys_accumulate() {
        let mut base = json!({});
        merge_json(&mut base, &json!({"a": 1}));
        merge_json(&mut base, &json!({"b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_is_idempotent_on_reapplication() {
        let mut base = json!({});
        merge_json(&mut base, &json!({"a": 1}));
        merge_json(&mut base, &json!({"a": 1}));
        assert_eq!(base, json!({"a": 1}));
    }

    #[test]
    fn merge_overlapping_key_replaces() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 3});
        merge_json(&mut base, &json!({"a": {"y": 9}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 9}, "b": 3}));
    }

    #[test]
    fn merge_scalar_replaces_object() {
        let mut base = json!({"a": {"x": 1}});
        merge_json(&mut base, &json!({"a": 5}));
        assert_eq!(base, json!({"a": 5}));
    }

    #[test]
    fn erase_clears_validity() {
        let registry = SettingsRegistry::new();
        let mut store = store();
        store
            .write(&serde_json::to_vec(&full_doc()).unwrap(), &registry)
            .unwrap();
        store.erase().unwrap();
        assert_eq!(store.is_valid(&registry), Err(ConfigError::NotConfigured));
    }
}
