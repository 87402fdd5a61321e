//! Core emulation crate: a tick-accurate bus framework with pluggable
//! masters and devices, plus the `rv32` CPU that drives it.

/// Instruction word encoding and decoding for the RV32I subset.
pub mod codec;
pub use codec::{
    decode, encode_i, encode_j, encode_r, encode_s, make_add, make_addi, make_j, make_jal,
    make_nop, make_ret, make_sub, make_sw, sign_extend, to_field, Instruction, Opcode,
    FUNCT3_ADDI, FUNCT3_ADD_SUB, FUNCT3_SW, FUNCT7_ADD, FUNCT7_SUB,
};

/// The shared bus, component traits, and tick bookkeeping.
pub mod bus;
pub use bus::{
    mint_component_id, Bus, BusDirection, BusError, BusTransaction, ComponentInfo, Device, Master,
    TickGuard,
};

/// Declarative system blueprints and per-component contexts.
pub mod config;
pub use config::{ComponentConfig, RamContext, RomContext, SystemConfiguration};

/// Binary state-exchange bundles for moving running machines.
pub mod exchange;
pub use exchange::{
    push_u32_be, read_u32_be, BusExchange, ComponentExchange, ExchangeBundle, ExchangeError,
    ExchangeInfo,
};

/// Memory-mapped devices: `ram32`, `rom32`, and `consolelog`.
pub mod devices;
pub use devices::{ConsoleLog, Ram32, Rom32};

/// Bus masters: the `rv32` CPU, `simplecpu`, and `z2z`.
pub mod masters;
pub use masters::{Rv32Cpu, SimpleCpu, SimpleInstruction, StepOutcome, ZeroToZero};

/// Kind-name factories for building components by configuration or state.
pub mod registry;
pub use registry::{
    BuildError, ComponentRegistry, DeviceFactory, DeviceFromContext, DeviceFromState,
    MasterFactory, MasterFromContext, MasterFromState,
};

/// The machine: one master, one bus, one tick counter.
pub mod machine;
pub use machine::{Machine, TickError};

/// Worker-thread runner driving a machine by message.
pub mod runner;
pub use runner::{BackgroundRunner, RunnerError};
