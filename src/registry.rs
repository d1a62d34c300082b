//! Read-only introspection registries.
//!
//! Firmware authors declare their custom settings and logical device
//! nodes at startup; the portal's `/device-info` route reports both so a
//! provisioning client can render a configuration form. Neither registry
//! is consulted for anything else at runtime — the typed settings layer
//! proper is outside this crate.

use serde_json::Value;

// ───────────────────────────────────────────────────────────────
// Setting values
// ───────────────────────────────────────────────────────────────

/// A settings value, over the closed set of supported kinds.
///
/// Matching is exhaustive by construction — adding a kind forces every
/// consumer to handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Long,
    Double,
    Text,
}

impl SettingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Long => "long",
            Self::Double => "double",
            Self::Text => "string",
        }
    }

    /// Whether a JSON value is acceptable for this kind. Longs must be
    /// integral; doubles accept any JSON number.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Long => value.is_i64() || value.is_u64(),
            Self::Double => value.is_number(),
            Self::Text => value.is_string(),
        }
    }
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Bool(_) => SettingKind::Bool,
            Self::Long(_) => SettingKind::Long,
            Self::Double(_) => SettingKind::Double,
            Self::Text(_) => SettingKind::Text,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(v) => Value::Bool(*v),
            Self::Long(v) => Value::from(*v),
            Self::Double(v) => Value::from(*v),
            Self::Text(v) => Value::from(v.clone()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Settings registry
// ───────────────────────────────────────────────────────────────

/// One declared custom setting.
#[derive(Debug, Clone)]
pub struct SettingDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: SettingKind,
    pub required: bool,
    /// Default for optional settings; `None` for required ones.
    pub default: Option<SettingValue>,
}

#[derive(Debug, Default)]
pub struct SettingsRegistry {
    entries: Vec<SettingDescriptor>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required setting (must be present in the configuration
    /// document's `settings` object).
    pub fn require(&mut self, name: &'static str, description: &'static str, kind: SettingKind) {
        self.entries.push(SettingDescriptor {
            name,
            description,
            kind,
            required: true,
            default: None,
        });
    }

    /// Declare an optional setting with a default.
    pub fn optional(
        &mut self,
        name: &'static str,
        description: &'static str,
        default: SettingValue,
    ) {
        self.entries.push(SettingDescriptor {
            name,
            description,
            kind: default.kind(),
            required: false,
            default: Some(default),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &SettingDescriptor> {
        self.entries.iter()
    }

    pub fn find(&self, name: &str) -> Option<&SettingDescriptor> {
        self.entries.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Node registry
// ───────────────────────────────────────────────────────────────

/// One logical sub-component of the device (a relay, a sensor, ...).
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub id: &'static str,
    pub type_name: &'static str,
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    entries: Vec<NodeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &'static str, type_name: &'static str) {
        self.entries.push(NodeDescriptor { id, type_name });
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_setting_kind_follows_default() {
        let mut registry = SettingsRegistry::new();
        registry.optional("interval", "publish interval", SettingValue::Long(60));
        let setting = registry.find("interval").unwrap();
        assert_eq!(setting.kind, SettingKind::Long);
        assert!(!setting.required);
        assert_eq!(setting.default, Some(SettingValue::Long(60)));
    }

    #[test]
    fn kind_accepts_json_values() {
        assert!(SettingKind::Bool.accepts(&json!(true)));
        assert!(!SettingKind::Bool.accepts(&json!(1)));
        assert!(SettingKind::Long.accepts(&json!(42)));
        assert!(!SettingKind::Long.accepts(&json!(4.2)));
        assert!(SettingKind::Double.accepts(&json!(4.2)));
        assert!(SettingKind::Double.accepts(&json!(42)));
        assert!(SettingKind::Text.accepts(&json!("x")));
        assert!(!SettingKind::Text.accepts(&json!(null)));
    }

    #[test]
    fn kind_strings_match_report_vocabulary() {
        assert_eq!(SettingKind::Bool.as_str(), "bool");
        assert_eq!(SettingKind::Long.as_str(), "long");
        assert_eq!(SettingKind::Double.as_str(), "double");
        assert_eq!(SettingKind::Text.as_str(), "string");
    }

    #[test]
    fn node_registry_preserves_order() {
        let mut nodes = NodeRegistry::new();
        nodes.register("relay", "switch");
        nodes.register("temp", "sensor");
        let ids: Vec<_> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["relay", "temp"]);
    }
}
