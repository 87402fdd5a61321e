//! Component registry: maps kind names to construction functions.
//!
//! New master or device kinds plug in by registering a factory pair; the
//! machine and bus never enumerate kinds themselves.

use std::collections::HashMap;

use thiserror::Error;

use crate::bus::{Device, Master};
use crate::config::{RamContext, RomContext};
use crate::devices::{ConsoleLog, Ram32, Rom32};
use crate::exchange::ExchangeError;
use crate::masters::{Rv32Cpu, SimpleCpu, ZeroToZero};

/// Errors while building components from a system configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration names a master kind the registry does not know.
    #[error("unknown master kind '{0}'")]
    UnknownMaster(String),
    /// The configuration names a device kind the registry does not know.
    #[error("unknown device kind '{0}'")]
    UnknownDevice(String),
    /// A context value did not deserialize into the component's parameters.
    #[error("invalid context for '{name}'")]
    InvalidContext {
        /// Kind name of the component being built.
        name: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Builds a master from configuration context.
pub type MasterFromContext = fn(&serde_json::Value) -> Result<Box<dyn Master>, BuildError>;
/// Rebuilds a master from an exchanged state buffer and id.
pub type MasterFromState = fn(&[u8], String) -> Result<Box<dyn Master>, ExchangeError>;
/// Builds a device from configuration context.
pub type DeviceFromContext = fn(&serde_json::Value) -> Result<Box<dyn Device>, BuildError>;
/// Rebuilds a device from an exchanged state buffer and id.
pub type DeviceFromState = fn(&[u8], String) -> Result<Box<dyn Device>, ExchangeError>;

/// Factory pair for one master kind.
#[derive(Clone, Copy)]
pub struct MasterFactory {
    /// Construction from a configuration context.
    pub from_context: MasterFromContext,
    /// Reconstruction from an exchanged state buffer.
    pub from_state: MasterFromState,
}

/// Factory pair for one device kind.
#[derive(Clone, Copy)]
pub struct DeviceFactory {
    /// Construction from a configuration context.
    pub from_context: DeviceFromContext,
    /// Reconstruction from an exchanged state buffer.
    pub from_state: DeviceFromState,
}

/// Name-keyed factories for every known master and device kind.
#[derive(Clone)]
pub struct ComponentRegistry {
    masters: HashMap<String, MasterFactory>,
    devices: HashMap<String, DeviceFactory>,
}

impl ComponentRegistry {
    /// An empty registry with no known kinds.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            masters: HashMap::new(),
            devices: HashMap::new(),
        }
    }

    /// Registers (or replaces) a master kind.
    pub fn register_master(&mut self, name: &str, factory: MasterFactory) {
        self.masters.insert(name.to_owned(), factory);
    }

    /// Registers (or replaces) a device kind.
    pub fn register_device(&mut self, name: &str, factory: DeviceFactory) {
        self.devices.insert(name.to_owned(), factory);
    }

    /// Builds a master from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownMaster`] for an unregistered name, or
    /// the factory's own error for a bad context.
    pub fn master_from_context(
        &self,
        name: &str,
        context: &serde_json::Value,
    ) -> Result<Box<dyn Master>, BuildError> {
        let factory = self
            .masters
            .get(name)
            .ok_or_else(|| BuildError::UnknownMaster(name.to_owned()))?;
        (factory.from_context)(context)
    }

    /// Rebuilds a master from exchanged identity and state.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UnknownComponent`] for an unregistered
    /// name, or the factory's own error for a bad buffer.
    pub fn master_from_state(
        &self,
        name: &str,
        state: &[u8],
        uuid: String,
    ) -> Result<Box<dyn Master>, ExchangeError> {
        let factory = self
            .masters
            .get(name)
            .ok_or_else(|| ExchangeError::UnknownComponent(name.to_owned()))?;
        (factory.from_state)(state, uuid)
    }

    /// Builds a device from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownDevice`] for an unregistered name, or
    /// the factory's own error for a bad context.
    pub fn device_from_context(
        &self,
        name: &str,
        context: &serde_json::Value,
    ) -> Result<Box<dyn Device>, BuildError> {
        let factory = self
            .devices
            .get(name)
            .ok_or_else(|| BuildError::UnknownDevice(name.to_owned()))?;
        (factory.from_context)(context)
    }

    /// Rebuilds a device from exchanged identity and state.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UnknownComponent`] for an unregistered
    /// name, or the factory's own error for a bad buffer.
    pub fn device_from_state(
        &self,
        name: &str,
        state: &[u8],
        uuid: String,
    ) -> Result<Box<dyn Device>, ExchangeError> {
        let factory = self
            .devices
            .get(name)
            .ok_or_else(|| ExchangeError::UnknownComponent(name.to_owned()))?;
        (factory.from_state)(state, uuid)
    }
}

impl Default for ComponentRegistry {
    /// Registry with every built-in kind: the `rv32`, `simplecpu`, and
    /// `z2z` masters, and the `ram32`, `rom32`, and `consolelog` devices.
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register_master(
            Rv32Cpu::NAME,
            MasterFactory {
                from_context: |_context| Ok(Box::new(Rv32Cpu::from_context())),
                from_state: |state, uuid| Ok(Box::new(Rv32Cpu::from_state(state, uuid)?)),
            },
        );
        registry.register_master(
            SimpleCpu::NAME,
            MasterFactory {
                from_context: |_context| Ok(Box::new(SimpleCpu::from_context())),
                from_state: |state, uuid| Ok(Box::new(SimpleCpu::from_state(state, uuid)?)),
            },
        );
        registry.register_master(
            ZeroToZero::NAME,
            MasterFactory {
                from_context: |_context| Ok(Box::new(ZeroToZero::from_context())),
                from_state: |_state, uuid| Ok(Box::new(ZeroToZero::new(uuid))),
            },
        );

        registry.register_device(
            Ram32::NAME,
            DeviceFactory {
                from_context: |context| {
                    let context: RamContext =
                        serde_json::from_value(context.clone()).map_err(|source| {
                            BuildError::InvalidContext {
                                name: Ram32::NAME.to_owned(),
                                source,
                            }
                        })?;
                    Ok(Box::new(Ram32::from_context(context)))
                },
                from_state: |state, uuid| Ok(Box::new(Ram32::from_state(state, uuid)?)),
            },
        );
        registry.register_device(
            Rom32::NAME,
            DeviceFactory {
                from_context: |context| {
                    let context: RomContext =
                        serde_json::from_value(context.clone()).map_err(|source| {
                            BuildError::InvalidContext {
                                name: Rom32::NAME.to_owned(),
                                source,
                            }
                        })?;
                    Ok(Box::new(Rom32::from_context(context)))
                },
                from_state: |state, uuid| Ok(Box::new(Rom32::from_state(state, uuid)?)),
            },
        );
        registry.register_device(
            ConsoleLog::NAME,
            DeviceFactory {
                from_context: |_context| Ok(Box::new(ConsoleLog::from_context())),
                from_state: |_state, uuid| Ok(Box::new(ConsoleLog::new(uuid))),
            },
        );

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildError, ComponentRegistry};
    use crate::exchange::ExchangeError;

    #[test]
    fn default_registry_knows_the_builtin_kinds() {
        let registry = ComponentRegistry::default();
        let null = serde_json::Value::Null;
        for name in ["rv32", "simplecpu", "z2z"] {
            assert!(registry.master_from_context(name, &null).is_ok());
        }
        assert!(registry.device_from_context("consolelog", &null).is_ok());
        let ram_context = serde_json::json!({ "address": 0, "size": 16 });
        assert!(registry.device_from_context("ram32", &ram_context).is_ok());
        let rom_context = serde_json::json!({ "address": 0, "contents": [1, 2] });
        assert!(registry.device_from_context("rom32", &rom_context).is_ok());
    }

    #[test]
    fn unknown_kinds_are_reported_by_name() {
        let registry = ComponentRegistry::default();
        let null = serde_json::Value::Null;
        assert!(matches!(
            registry.master_from_context("warp-drive", &null),
            Err(BuildError::UnknownMaster(name)) if name == "warp-drive"
        ));
        assert!(matches!(
            registry.device_from_state("warp-drive", &[], "d".to_owned()),
            Err(ExchangeError::UnknownComponent(name)) if name == "warp-drive"
        ));
    }

    #[test]
    fn bad_context_is_a_build_error() {
        let registry = ComponentRegistry::default();
        let bad = serde_json::json!({ "address": "not-a-number" });
        assert!(matches!(
            registry.device_from_context("ram32", &bad),
            Err(BuildError::InvalidContext { name, .. }) if name == "ram32"
        ));
    }

    #[test]
    fn custom_kinds_can_be_registered() {
        let mut registry = ComponentRegistry::empty();
        registry.register_master(
            "z2z",
            super::MasterFactory {
                from_context: |_| Ok(Box::new(crate::masters::ZeroToZero::from_context())),
                from_state: |_, uuid| Ok(Box::new(crate::masters::ZeroToZero::new(uuid))),
            },
        );
        assert!(registry
            .master_from_context("z2z", &serde_json::Value::Null)
            .is_ok());
        assert!(registry
            .device_from_context("consolelog", &serde_json::Value::Null)
            .is_err());
    }
}
