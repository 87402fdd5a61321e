//! `z2z`: writes zero to address zero on every IO cycle.
//!
//! Useful as the simplest possible master when exercising buses and
//! devices.

use tracing::trace;

use crate::bus::{mint_component_id, Bus, BusError, ComponentInfo, Master};
use crate::config::ComponentConfig;

/// The `z2z` bus master.
pub struct ZeroToZero {
    uuid: String,
}

impl ZeroToZero {
    /// Registry kind name.
    pub const NAME: &'static str = "z2z";

    /// Builds the master with the given id.
    #[must_use]
    pub const fn new(uuid: String) -> Self {
        Self { uuid }
    }

    /// Builds the master with a fresh id. The context carries no
    /// parameters.
    #[must_use]
    pub fn from_context() -> Self {
        Self::new(mint_component_id())
    }
}

impl Master for ZeroToZero {
    fn master_io(&mut self, io_tick: u64, bus: &mut Bus) -> Result<(), BusError> {
        bus.write(io_tick, 0, 0);
        Ok(())
    }

    fn master_tick(&mut self, _tick: u64) {
        trace!("z2z: tick");
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

#[cfg(test)]
mod tests {
    use super::ZeroToZero;
    use crate::bus::{Bus, BusDirection, Master};

    #[test]
    fn writes_zero_to_zero_every_io_cycle() {
        let mut master = ZeroToZero::from_context();
        let mut bus = Bus::new(Vec::new());
        for tick in 0..3 {
            master.master_io(tick, &mut bus).unwrap();
            assert_eq!(bus.transaction().address, 0);
            assert_eq!(bus.transaction().value, 0);
            assert_eq!(bus.transaction().direction, BusDirection::Write);
            bus.tick(tick);
        }
    }
}
