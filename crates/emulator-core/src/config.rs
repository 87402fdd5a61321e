//! Human-editable system configuration: which master and devices to build
//! and with what parameters.
//!
//! This is the "blueprint" serialization form. The other form, the exchange
//! bundle in [`crate::exchange`], captures a running machine instead.

use serde::{Deserialize, Serialize};

/// One component entry: a registry kind name plus a free-form context value.
///
/// The context is deserialized by the component's own factory, so new kinds
/// can carry arbitrary parameters without changing this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Registry kind name, e.g. `"ram32"`.
    pub name: String,
    /// Construction parameters; `null` for components that take none.
    #[serde(default)]
    pub context: serde_json::Value,
}

/// A whole system: exactly one master and any number of devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    /// The bus master.
    pub master: ComponentConfig,
    /// Devices, attached to the bus in listed order.
    pub devices: Vec<ComponentConfig>,
}

/// Context for a `ram32` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamContext {
    /// Base address in bytes.
    pub address: u32,
    /// Size in bytes; rounded up to a whole number of words.
    pub size: u32,
}

/// Context for a `rom32` device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomContext {
    /// Base address in bytes.
    pub address: u32,
    /// Initial word contents.
    #[serde(default)]
    pub contents: Vec<u32>,
    /// Whether writes are ignored. Defaults to true.
    #[serde(rename = "readOnly", default = "default_read_only")]
    pub read_only: bool,
}

const fn default_read_only() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{ComponentConfig, RamContext, RomContext, SystemConfiguration};

    #[test]
    fn system_configuration_roundtrips_through_json() {
        let config = SystemConfiguration {
            master: ComponentConfig {
                name: "rv32".to_owned(),
                context: serde_json::Value::Null,
            },
            devices: vec![ComponentConfig {
                name: "ram32".to_owned(),
                context: serde_json::json!({ "address": 128, "size": 64 }),
            }],
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: SystemConfiguration = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_context_defaults_to_null() {
        let config: ComponentConfig = serde_json::from_str(r#"{ "name": "consolelog" }"#).unwrap();
        assert_eq!(config.context, serde_json::Value::Null);
    }

    #[test]
    fn rom_context_uses_camel_case_read_only_key() {
        let context: RomContext = serde_json::from_str(
            r#"{ "address": 0, "contents": [19], "readOnly": false }"#,
        )
        .unwrap();
        assert!(!context.read_only);

        let defaulted: RomContext = serde_json::from_str(r#"{ "address": 0 }"#).unwrap();
        assert!(defaulted.read_only);
        assert!(defaulted.contents.is_empty());
    }

    #[test]
    fn ram_context_sizes_are_bytes() {
        let context: RamContext =
            serde_json::from_str(r#"{ "address": 4096, "size": 1024 }"#).unwrap();
        assert_eq!(context.address, 4096);
        assert_eq!(context.size, 1024);
    }
}
