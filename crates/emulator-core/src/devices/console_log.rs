//! `consolelog`: logs all bus traffic and claims no addresses.

use tracing::info;

use crate::bus::{mint_component_id, ComponentInfo, Device};
use crate::config::ComponentConfig;

/// Diagnostic device that narrates everything it sees on the bus.
pub struct ConsoleLog {
    uuid: String,
}

impl ConsoleLog {
    /// Registry kind name.
    pub const NAME: &'static str = "consolelog";

    /// Builds the device with the given id.
    #[must_use]
    pub const fn new(uuid: String) -> Self {
        Self { uuid }
    }

    /// Builds the device with a fresh id.
    #[must_use]
    pub fn from_context() -> Self {
        Self::new(mint_component_id())
    }
}

impl Device for ConsoleLog {
    fn device_read(&mut self, _io_tick: u64, address: u32) -> Option<u32> {
        info!("READ: {address:x}");
        None
    }

    fn device_write(&mut self, _io_tick: u64, address: u32, value: u32) {
        info!("WRITE: {address:x} = {value:x}");
    }

    fn device_tick(&mut self, _tick: u64) {
        info!("TICK");
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo {
            name: Self::NAME.to_owned(),
            uuid: self.uuid.clone(),
        }
    }

    fn export_state(&self) -> Vec<u8> {
        Vec::new()
    }

    fn to_config(&self) -> ComponentConfig {
        ComponentConfig {
            name: Self::NAME.to_owned(),
            context: serde_json::Value::Null,
        }
    }
}
