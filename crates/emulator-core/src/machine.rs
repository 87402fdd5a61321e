//! The machine: one master wired to one bus, advanced tick by tick.
//!
//! A machine serializes two ways: [`Machine::to_system_configuration`]
//! captures the blueprint (what to build), [`Machine::to_exchange`]
//! captures the running state (what it is right now). Exchanging a machine
//! is a move by convention: after handing the bundle away, the local copy
//! must not be ticked again.

use thiserror::Error;

use crate::bus::{Bus, BusError, BusTransaction, ComponentInfo, Device, Master, TickGuard};
use crate::config::SystemConfiguration;
use crate::exchange::{
    read_u32_be, BusExchange, ComponentExchange, ExchangeBundle, ExchangeError, ExchangeInfo,
};
use crate::registry::{BuildError, ComponentRegistry};

/// Errors from advancing a machine by one tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    /// The master's IO raised a fatal bus error; the tick was aborted.
    #[error(transparent)]
    Bus(#[from] BusError),
}

fn exchange_info(info: &ComponentInfo) -> ExchangeInfo {
    ExchangeInfo {
        name: info.name.clone(),
        uuid: info.uuid.clone(),
    }
}

/// A master, its bus, and the tick counter.
pub struct Machine {
    master: Box<dyn Master>,
    master_guard: TickGuard,
    bus: Bus,
    tick: u64,
}

impl Machine {
    /// Wires a master to a fresh bus over `devices`.
    #[must_use]
    pub fn from_parts(master: Box<dyn Master>, devices: Vec<Box<dyn Device>>) -> Self {
        Self {
            master,
            master_guard: TickGuard::default(),
            bus: Bus::new(devices),
            tick: 0,
        }
    }

    /// Builds a machine from a blueprint, constructing every component
    /// through the registry.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for unknown kinds or invalid contexts.
    pub fn from_system_configuration(
        config: &SystemConfiguration,
        registry: &ComponentRegistry,
    ) -> Result<Self, BuildError> {
        let master = registry.master_from_context(&config.master.name, &config.master.context)?;
        let devices = config
            .devices
            .iter()
            .map(|device| registry.device_from_context(&device.name, &device.context))
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Self::from_parts(master, devices))
    }

    /// Resumes a machine from an exchanged snapshot.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] for unknown kinds or malformed state
    /// buffers.
    pub fn from_exchange(
        bundle: &ExchangeBundle,
        registry: &ComponentRegistry,
    ) -> Result<Self, ExchangeError> {
        let master = registry.master_from_state(
            &bundle.master.info.name,
            &bundle.master.state,
            bundle.master.info.uuid.clone(),
        )?;
        let devices = bundle
            .bus
            .devices
            .iter()
            .map(|device| {
                registry.device_from_state(
                    &device.info.name,
                    &device.state,
                    device.info.uuid.clone(),
                )
            })
            .collect::<Result<Vec<_>, ExchangeError>>()?;

        let bus_state = &bundle.bus.exchange.state;
        if bus_state.len() != 9 {
            return Err(ExchangeError::BadLength {
                got: bus_state.len(),
                reason: "expected the 9-byte bus transaction buffer",
            });
        }
        let direction_byte = bus_state[8];
        let transaction = BusTransaction {
            address: read_u32_be(bus_state, 0)?,
            value: read_u32_be(bus_state, 4)?,
            direction: crate::bus::BusDirection::from_byte(direction_byte).ok_or(
                ExchangeError::BadField {
                    field: "bus direction",
                    value: u32::from(direction_byte),
                },
            )?,
        };

        Ok(Self {
            master,
            master_guard: TickGuard::default(),
            bus: Bus::with_parts(devices, bundle.bus.exchange.info.uuid.clone(), transaction),
            tick: 0,
        })
    }

    /// Serializes the blueprint form.
    #[must_use]
    pub fn to_system_configuration(&self) -> SystemConfiguration {
        SystemConfiguration {
            master: self.master.to_config(),
            devices: self.bus.device_configs(),
        }
    }

    /// Serializes the running-state form.
    #[must_use]
    pub fn to_exchange(&self) -> ExchangeBundle {
        ExchangeBundle {
            master: ComponentExchange {
                info: exchange_info(&self.master.info()),
                state: self.master.export_state(),
            },
            bus: BusExchange {
                exchange: ComponentExchange {
                    info: exchange_info(&self.bus.info()),
                    state: self.bus.export_state(),
                },
                devices: self
                    .bus
                    .device_states()
                    .into_iter()
                    .map(|(info, state)| ComponentExchange {
                        info: exchange_info(&info),
                        state,
                    })
                    .collect(),
            },
        }
    }

    /// Ticks advanced so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// The bus, for observing the last transaction.
    #[must_use]
    pub const fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Advances one tick: master IO, master tick, bus (device) tick.
    ///
    /// Replaying is safe: every component is guarded by its tick number.
    ///
    /// # Errors
    ///
    /// Returns a [`TickError`] when the master's IO collides on the bus;
    /// the tick counter does not advance.
    pub fn do_tick(&mut self) -> Result<(), TickError> {
        if self.master_guard.should_io(self.tick) {
            self.master.master_io(self.tick, &mut self.bus)?;
        }
        if self.master_guard.should_tick(self.tick) {
            self.master.master_tick(self.tick);
        }
        self.bus.tick(self.tick);
        self.tick += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Machine, TickError};
    use crate::codec::{make_add, make_addi, make_j, make_sw};
    use crate::config::{ComponentConfig, RamContext, SystemConfiguration};
    use crate::devices::{ConsoleLog, Ram32};
    use crate::masters::ZeroToZero;
    use crate::registry::ComponentRegistry;

    fn z2z_machine() -> Machine {
        Machine::from_parts(
            Box::new(ZeroToZero::from_context()),
            vec![Box::new(ConsoleLog::from_context())],
        )
    }

    #[test]
    fn runs_with_default_setup() {
        let mut machine = z2z_machine();
        for _ in 0..10 {
            machine.do_tick().unwrap();
        }
        assert_eq!(machine.tick_count(), 10);
    }

    #[test]
    fn builds_from_a_system_configuration() {
        let config: SystemConfiguration = serde_json::from_str(
            r#"{
                "master": { "name": "rv32", "context": null },
                "devices": [
                    { "name": "rom32", "context": { "address": 0, "contents": [19] } },
                    { "name": "ram32", "context": { "address": 128, "size": 64 } }
                ]
            }"#,
        )
        .unwrap();
        let registry = ComponentRegistry::default();
        let mut machine = Machine::from_system_configuration(&config, &registry).unwrap();
        machine.do_tick().unwrap();

        let back = machine.to_system_configuration();
        assert_eq!(back.master.name, "rv32");
        assert_eq!(back.devices.len(), 2);
        assert_eq!(back.devices[1].name, "ram32");
    }

    #[test]
    fn unknown_kind_fails_to_build() {
        let config = SystemConfiguration {
            master: ComponentConfig {
                name: "warp-drive".to_owned(),
                context: serde_json::Value::Null,
            },
            devices: Vec::new(),
        };
        let registry = ComponentRegistry::default();
        assert!(Machine::from_system_configuration(&config, &registry).is_err());
    }

    #[test]
    fn collision_surfaces_through_do_tick() {
        let overlapping = || {
            Ram32::from_context(RamContext {
                address: 0,
                size: 16,
            })
        };
        let mut machine = Machine::from_parts(
            Box::new(crate::masters::Rv32Cpu::from_context()),
            vec![Box::new(overlapping()), Box::new(overlapping())],
        );
        let err = machine.do_tick().unwrap_err();
        assert!(matches!(err, TickError::Bus(_)));
        assert_eq!(machine.tick_count(), 0);
    }

    #[test]
    fn exchange_roundtrip_resumes_mid_program() {
        let registry = ComponentRegistry::default();
        let program = vec![
            make_addi(1, 0, 40),
            make_addi(2, 0, 2),
            make_add(3, 1, 2),
            make_sw(0, 3, 128),
            make_j(-16),
        ];
        let build = |program: &[u32]| {
            Machine::from_system_configuration(
                &SystemConfiguration {
                    master: ComponentConfig {
                        name: "rv32".to_owned(),
                        context: serde_json::Value::Null,
                    },
                    devices: vec![
                        ComponentConfig {
                            name: "rom32".to_owned(),
                            context: serde_json::json!({ "address": 0, "contents": program }),
                        },
                        ComponentConfig {
                            name: "ram32".to_owned(),
                            context: serde_json::json!({ "address": 128, "size": 64 }),
                        },
                    ],
                },
                &ComponentRegistry::default(),
            )
            .unwrap()
        };

        let mut original = build(&program);
        for _ in 0..3 {
            original.do_tick().unwrap();
        }

        // Move to a new owner mid-program and keep ticking both.
        let bundle = original.to_exchange();
        let mut resumed = Machine::from_exchange(&bundle, &registry).unwrap();
        for _ in 0..2 {
            original.do_tick().unwrap();
            resumed.do_tick().unwrap();
        }

        assert_eq!(resumed.to_exchange(), original.to_exchange());
    }

    #[test]
    fn malformed_bus_buffer_is_rejected() {
        let registry = ComponentRegistry::default();
        let mut bundle = z2z_machine().to_exchange();
        bundle.bus.exchange.state.pop();
        assert!(Machine::from_exchange(&bundle, &registry).is_err());
    }
}
