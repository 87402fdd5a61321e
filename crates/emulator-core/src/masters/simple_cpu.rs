//! `simplecpu`: a one-register accumulator machine.
//!
//! Each instruction is a word-sized opcode optionally followed by a word
//! operand, so most instructions take several ticks to move through the
//! read/process/write states.

use tracing::{trace, warn};

use crate::bus::{mint_component_id, Bus, BusError, ComponentInfo, Master};
use crate::config::ComponentConfig;
use crate::exchange::{push_u32_be, read_u32_be, ExchangeError};

/// Multi-cycle execution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum CpuState {
    ReadInstruction = 0,
    ProcessInstruction = 1,
    ReadWordFromRam = 2,
    ReadWordFromRamStage2 = 3,
    WriteWordToRam = 4,
}

impl CpuState {
    const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::ReadInstruction),
            1 => Some(Self::ProcessInstruction),
            2 => Some(Self::ReadWordFromRam),
            3 => Some(Self::ReadWordFromRamStage2),
            4 => Some(Self::WriteWordToRam),
            _ => None,
        }
    }
}

/// Instruction opcodes; each is followed by an operand word except `Noop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum SimpleInstruction {
    Noop = 0,
    LoadImmediate = 1,
    AddToRegister = 2,
    StoreAtAddress = 3,
    LoadFromAddress = 4,
}

impl SimpleInstruction {
    /// Converts an instruction word into an opcode.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Noop),
            1 => Some(Self::LoadImmediate),
            2 => Some(Self::AddToRegister),
            3 => Some(Self::StoreAtAddress),
            4 => Some(Self::LoadFromAddress),
            _ => None,
        }
    }
}

/// The `simplecpu` bus master.
pub struct SimpleCpu {
    uuid: String,
    state: CpuState,
    ip: u32,
    data_rq: u32,
    dword: u32,
    current_instruction: u32,
    register: u32,
}

impl SimpleCpu {
    /// Registry kind name.
    pub const NAME: &'static str = "simplecpu";

    /// Builds a CPU reset to address zero.
    #[must_use]
    pub const fn new(uuid: String) -> Self {
        Self {
            uuid,
            state: CpuState::ReadInstruction,
            ip: 0,
            data_rq: 0,
            dword: 0,
            current_instruction: 0,
            register: 0,
        }
    }

    /// Builds a CPU with a fresh id. The context carries no parameters.
    #[must_use]
    pub fn from_context() -> Self {
        Self::new(mint_component_id())
    }

    /// Rebuilds a CPU from an exchanged state buffer.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] when the buffer is not exactly 24 bytes
    /// or the state field holds an unknown value.
    pub fn from_state(state: &[u8], uuid: String) -> Result<Self, ExchangeError> {
        if state.len() != 24 {
            return Err(ExchangeError::BadLength {
                got: state.len(),
                reason: "expected exactly 24 bytes",
            });
        }
        let state_raw = read_u32_be(state, 0)?;
        Ok(Self {
            uuid,
            state: CpuState::from_u32(state_raw).ok_or(ExchangeError::BadField {
                field: "execution state",
                value: state_raw,
            })?,
            ip: read_u32_be(state, 4)?,
            data_rq: read_u32_be(state, 8)?,
            dword: read_u32_be(state, 12)?,
            current_instruction: read_u32_be(state, 16)?,
            register: read_u32_be(state, 20)?,
        })
    }

    /// Accumulator value.
    #[must_use]
    pub const fn register(&self) -> u32 {
        self.register
    }

    /// Current instruction pointer.
    #[must_use]
    pub const fn ip(&self) -> u32 {
        self.ip
    }
}

impl Master for SimpleCpu {
    #[allow(clippy::option_if_let_else)]
    fn master_io(&mut self, io_tick: u64, bus: &mut Bus) -> Result<(), BusError> {
        match self.state {
            CpuState::ReadInstruction => match bus.read(io_tick, self.ip)? {
                Some(word) => {
                    self.dword = word;
                    self.state = CpuState::ProcessInstruction;
                }
                None => warn!("scpu: no response @ 0x{:08x}", self.ip),
            },
            CpuState::ReadWordFromRam | CpuState::ReadWordFromRamStage2 => {
                match bus.read(io_tick, self.data_rq)? {
                    Some(word) => self.dword = word,
                    None => warn!("scpu: no response @ 0x{:08x}", self.data_rq),
                }
            }
            CpuState::WriteWordToRam => bus.write(io_tick, self.data_rq, self.register),
            CpuState::ProcessInstruction => {}
        }
        Ok(())
    }

    fn master_tick(&mut self, _tick: u64) {
        trace!("scpu: tick, state {:?}", self.state);

        match self.state {
            CpuState::ReadInstruction => {}

            CpuState::ProcessInstruction => {
                self.current_instruction = self.dword;
                match SimpleInstruction::from_u32(self.current_instruction) {
                    Some(SimpleInstruction::Noop) => {
                        trace!("scpu: noop");
                        self.ip += 4;
                        self.state = CpuState::ReadInstruction;
                    }
                    Some(_) => {
                        self.state = CpuState::ReadWordFromRam;
                        self.data_rq = self.ip + 4;
                    }
                    None => {
                        warn!("scpu: unknown instruction {}, skipping", self.dword);
                        self.ip += 4;
                        self.state = CpuState::ReadInstruction;
                    }
                }
            }

            CpuState::ReadWordFromRam => {
                match SimpleInstruction::from_u32(self.current_instruction) {
                    Some(SimpleInstruction::LoadImmediate) => {
                        self.register = self.dword;
                        self.ip += 8;
                        self.state = CpuState::ReadInstruction;
                    }
                    Some(SimpleInstruction::AddToRegister) => {
                        self.register = self.register.wrapping_add(self.dword);
                        self.ip += 8;
                        self.state = CpuState::ReadInstruction;
                    }
                    Some(SimpleInstruction::StoreAtAddress) => {
                        self.data_rq = self.dword;
                        self.state = CpuState::WriteWordToRam;
                    }
                    Some(SimpleInstruction::LoadFromAddress) => {
                        self.data_rq = self.dword;
                        self.state = CpuState::ReadWordFromRamStage2;
                    }
                    _ => {}
                }
            }

            CpuState::ReadWordFromRamStage2 => {
                self.register = self.dword;
                self.ip += 8;
                self.state = CpuState::ReadInstruction;
            }

            CpuState::WriteWordToRam => {
                self.ip += 8;
                self.state = CpuState::ReadInstruction;
            }
        }

        trace!("scpu: reg={}", self.register);
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo {
            name: Self::NAME.to_owned(),
            uuid: self.uuid.clone(),
        }
    }

    fn export_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(24);
        push_u32_be(&mut state, self.state as u32);
        push_u32_be(&mut state, self.ip);
        push_u32_be(&mut state, self.data_rq);
        push_u32_be(&mut state, self.dword);
        push_u32_be(&mut state, self.current_instruction);
        push_u32_be(&mut state, self.register);
        state
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
    use super::{SimpleCpu, SimpleInstruction};
    use crate::bus::{Bus, Master};
    use crate::config::{RamContext, RomContext};
    use crate::devices::{Ram32, Rom32};

    fn machine_parts(program: Vec<u32>) -> (SimpleCpu, Bus) {
        let rom = Rom32::from_context(RomContext {
            address: 0,
            contents: program,
            read_only: true,
        });
        let ram = Ram32::from_context(RamContext {
            address: 0x1000,
            size: 64,
        });
        (
            SimpleCpu::new("scpu".to_owned()),
            Bus::new(vec![Box::new(rom), Box::new(ram)]),
        )
    }

    fn run(cpu: &mut SimpleCpu, bus: &mut Bus, ticks: u64) {
        for tick in 0..ticks {
            cpu.master_io(tick, bus).unwrap();
            cpu.master_tick(tick);
            bus.tick(tick);
        }
    }

    #[test]
    fn load_immediate_and_add() {
        let (mut cpu, mut bus) = machine_parts(vec![
            SimpleInstruction::LoadImmediate as u32,
            40,
            SimpleInstruction::AddToRegister as u32,
            2,
        ]);
        run(&mut cpu, &mut bus, 6);
        assert_eq!(cpu.register(), 42);
        assert_eq!(cpu.ip(), 16);
    }

    #[test]
    fn store_at_address_writes_the_accumulator() {
        let (mut cpu, mut bus) = machine_parts(vec![
            SimpleInstruction::LoadImmediate as u32,
            7,
            SimpleInstruction::StoreAtAddress as u32,
            0x1000,
            SimpleInstruction::LoadImmediate as u32,
            0,
            SimpleInstruction::LoadFromAddress as u32,
            0x1000,
        ]);
        run(&mut cpu, &mut bus, 16);
        assert_eq!(cpu.register(), 7);
    }

    #[test]
    fn unknown_instruction_is_skipped() {
        let (mut cpu, mut bus) = machine_parts(vec![99, SimpleInstruction::Noop as u32]);
        run(&mut cpu, &mut bus, 4);
        assert_eq!(cpu.ip(), 8);
    }

    #[test]
    fn state_buffer_roundtrip() {
        let (mut cpu, mut bus) =
            machine_parts(vec![SimpleInstruction::LoadImmediate as u32, 40]);
        run(&mut cpu, &mut bus, 2);
        let state = cpu.export_state();
        assert_eq!(state.len(), 24);
        let restored = SimpleCpu::from_state(&state, "scpu".to_owned()).unwrap();
        assert_eq!(restored.export_state(), state);
    }
}
