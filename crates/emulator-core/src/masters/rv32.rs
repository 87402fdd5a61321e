//! `rv32`: a multi-cycle RV32I subset CPU.
//!
//! The CPU overlaps IO with execution: while the execution state machine
//! retires the word fetched last tick, the IO state machine is already
//! fetching or storing for the next one. `x0` is hardwired to zero.
//!
//! ADDI adds the raw unsigned 12-bit immediate field; stores and jumps
//! sign-extend their offsets.

use tracing::{debug, trace, warn};

use crate::bus::{mint_component_id, Bus, BusError, ComponentInfo, Master};
use crate::codec::{
    decode, sign_extend, Instruction, Opcode, FUNCT3_ADDI, FUNCT3_ADD_SUB, FUNCT3_SW, FUNCT7_ADD,
    FUNCT7_SUB,
};
use crate::config::ComponentConfig;
use crate::exchange::{push_u32_be, read_u32_be, ExchangeError};

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 32;

/// Execution state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum ExecState {
    Read = 0,
    StoreToReg = 1,
    StoreFromReg = 2,
    Noop = 3,
}

impl ExecState {
    const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Read),
            1 => Some(Self::StoreToReg),
            2 => Some(Self::StoreFromReg),
            3 => Some(Self::Noop),
            _ => None,
        }
    }
}

/// IO state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum IoState {
    Read = 0,
    Write = 1,
    Noop = 2,
}

impl IoState {
    const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Noop),
            _ => None,
        }
    }
}

/// Result of one decode/execute attempt.
///
/// Anomalies while running never abort the simulation; they surface as a
/// diagnostic and the CPU stalls on the offending word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The word decoded and its effects were applied.
    Executed,
    /// The word did not execute; the reason is human-readable.
    Diagnostic(String),
}

/// The `rv32` bus master.
pub struct Rv32Cpu {
    uuid: String,
    ip: u32,
    state: ExecState,
    op1: u32,
    io_state: IoState,
    io_op1: u32,
    io_op2: u32,
    registers: [u32; REGISTER_COUNT],
}

impl Rv32Cpu {
    /// Registry kind name.
    pub const NAME: &'static str = "rv32";

    /// Builds a CPU reset to address zero.
    #[must_use]
    pub const fn new(uuid: String) -> Self {
        Self {
            uuid,
            ip: 0,
            state: ExecState::Read,
            op1: 0,
            io_state: IoState::Read,
            io_op1: 0,
            io_op2: 0,
            registers: [0; REGISTER_COUNT],
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
    /// Returns an [`ExchangeError`] when the buffer is not exactly 152
    /// bytes or a state field holds an unknown value.
    pub fn from_state(state: &[u8], uuid: String) -> Result<Self, ExchangeError> {
        if state.len() != 24 + REGISTER_COUNT * 4 {
            return Err(ExchangeError::BadLength {
                got: state.len(),
                reason: "expected 24 header bytes plus 32 registers",
            });
        }
        let exec_raw = read_u32_be(state, 4)?;
        let io_raw = read_u32_be(state, 12)?;
        let mut registers = [0u32; REGISTER_COUNT];
        for (i, register) in registers.iter_mut().enumerate() {
            *register = read_u32_be(state, 24 + i * 4)?;
        }
        Ok(Self {
            uuid,
            ip: read_u32_be(state, 0)?,
            state: ExecState::from_u32(exec_raw).ok_or(ExchangeError::BadField {
                field: "execution state",
                value: exec_raw,
            })?,
            op1: read_u32_be(state, 8)?,
            io_state: IoState::from_u32(io_raw).ok_or(ExchangeError::BadField {
                field: "io state",
                value: io_raw,
            })?,
            io_op1: read_u32_be(state, 16)?,
            io_op2: read_u32_be(state, 20)?,
            registers,
        })
    }

    /// Current instruction pointer.
    #[must_use]
    pub const fn ip(&self) -> u32 {
        self.ip
    }

    /// Reads a register; `x0` always reads zero.
    #[must_use]
    pub const fn register(&self, n: usize) -> u32 {
        if n == 0 {
            0
        } else {
            self.registers[n]
        }
    }

    fn set_register(&mut self, n: usize, value: u32) {
        if n != 0 {
            self.registers[n] = value;
        }
    }

    /// Points the IO state machine at the next fetch. `None` falls through
    /// to the next sequential word.
    fn next_instruction(&mut self, next_address: Option<u32>) {
        self.ip = next_address.unwrap_or_else(|| self.ip.wrapping_add(4));
        self.io_op1 = self.ip;
        self.io_state = IoState::Read;
        self.state = ExecState::Read;
    }

    /// Decodes and retires one instruction word.
    fn execute(&mut self, word: u32) -> StepOutcome {
        let Some(instruction) = decode(word) else {
            return StepOutcome::Diagnostic(format!("invalid instruction 0x{word:08x}"));
        };

        match instruction {
            Instruction::I {
                opcode: Opcode::OpImm,
                rd,
                funct3,
                rs1,
                imm,
            } => {
                if funct3 != FUNCT3_ADDI {
                    return StepOutcome::Diagnostic(format!("unknown I funct3 {funct3}"));
                }
                debug!("rv32: ADDI x{rd} = x{rs1} + 0x{imm:x}");
                self.set_register(rd.into(), self.register(rs1.into()).wrapping_add(imm));
                self.next_instruction(None);
                StepOutcome::Executed
            }

            Instruction::R {
                rd,
                funct3: FUNCT3_ADD_SUB,
                rs1,
                rs2,
                funct7,
                ..
            } => {
                let (rs1, rs2) = (usize::from(rs1), usize::from(rs2));
                let value = match funct7 {
                    FUNCT7_ADD => {
                        debug!("rv32: ADD x{rd} = x{rs1} + x{rs2}");
                        self.register(rs1).wrapping_add(self.register(rs2))
                    }
                    FUNCT7_SUB => {
                        debug!("rv32: SUB x{rd} = x{rs1} - x{rs2}");
                        self.register(rs1).wrapping_sub(self.register(rs2))
                    }
                    other => {
                        return StepOutcome::Diagnostic(format!("unknown R funct7 {other}"));
                    }
                };
                self.set_register(rd.into(), value);
                self.next_instruction(None);
                StepOutcome::Executed
            }
            Instruction::R { funct3, .. } => {
                StepOutcome::Diagnostic(format!("unknown R funct3 {funct3}"))
            }

            Instruction::S {
                funct3: FUNCT3_SW,
                rs1,
                rs2,
                imm,
                ..
            } => {
                let offset = sign_extend(imm, 12);
                debug!("rv32: SW m[x{rs1} + 0x{offset:x}] = x{rs2}");
                self.io_state = IoState::Write;
                self.io_op1 = self
                    .register(rs1.into())
                    .wrapping_add_signed(offset);
                self.io_op2 = self.register(rs2.into());
                self.state = ExecState::Noop;
                StepOutcome::Executed
            }
            Instruction::S { funct3, .. } => {
                StepOutcome::Diagnostic(format!("unknown S funct3 {funct3}"))
            }

            Instruction::J { rd, imm, .. } => {
                let offset = sign_extend(imm, 20);
                debug!("rv32: JAL x{rd} = 0x{:x}", self.ip.wrapping_add(4));
                self.set_register(rd.into(), self.ip.wrapping_add(4));
                self.next_instruction(Some(self.ip.wrapping_add_signed(offset)));
                StepOutcome::Executed
            }

            Instruction::I { opcode, .. } => {
                StepOutcome::Diagnostic(format!("unimplemented opcode {opcode:?}"))
            }
        }
    }
}

impl Master for Rv32Cpu {
    #[allow(clippy::option_if_let_else)]
    fn master_io(&mut self, io_tick: u64, bus: &mut Bus) -> Result<(), BusError> {
        match self.io_state {
            IoState::Read => match bus.read(io_tick, self.io_op1)? {
                Some(value) => {
                    self.io_op2 = value;
                    self.io_state = IoState::Noop;
                }
                None => {
                    warn!("rv32: no response @ 0x{:08x}", self.io_op1);
                    self.io_op2 = 0;
                }
            },
            IoState::Write => {
                let address = if self.io_op1 % 4 == 0 {
                    self.io_op1
                } else {
                    warn!("rv32: unaligned store @ 0x{:08x}, rounding down", self.io_op1);
                    self.io_op1 & !3
                };
                bus.write(io_tick, address, self.io_op2);
                self.io_state = IoState::Noop;
                self.state = ExecState::StoreFromReg;
            }
            IoState::Noop => {}
        }
        Ok(())
    }

    fn master_tick(&mut self, _tick: u64) {
        trace!("rv32: tick");
        match self.state {
            ExecState::Read => {
                if let StepOutcome::Diagnostic(reason) = self.execute(self.io_op2) {
                    warn!("rv32: {reason}");
                }
            }
            ExecState::StoreToReg => {
                warn!("rv32: state StoreToReg not implemented");
            }
            ExecState::StoreFromReg => self.next_instruction(None),
            ExecState::Noop => {}
        }
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo {
            name: Self::NAME.to_owned(),
            uuid: self.uuid.clone(),
        }
    }

    fn export_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(24 + REGISTER_COUNT * 4);
        push_u32_be(&mut state, self.ip);
        push_u32_be(&mut state, self.state as u32);
        push_u32_be(&mut state, self.op1);
        push_u32_be(&mut state, self.io_state as u32);
        push_u32_be(&mut state, self.io_op1);
        push_u32_be(&mut state, self.io_op2);
        for register in &self.registers {
            push_u32_be(&mut state, *register);
        }
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
    use super::{Rv32Cpu, StepOutcome};
    use crate::bus::{Bus, Master};
    use crate::codec::{make_addi, make_ret};
    use crate::config::RomContext;
    use crate::devices::Rom32;

    fn cpu() -> Rv32Cpu {
        Rv32Cpu::new("cpu".to_owned())
    }

    fn rom_bus(words: Vec<u32>) -> Bus {
        Bus::new(vec![Box::new(Rom32::from_context(RomContext {
            address: 0,
            contents: words,
            read_only: true,
        }))])
    }

    #[test]
    fn fetch_then_execute_addi() {
        let mut cpu = cpu();
        let mut bus = rom_bus(vec![make_addi(1, 0, 40), make_addi(2, 1, 2)]);

        // Tick 0: fetch word 0, execute it.
        cpu.master_io(0, &mut bus).unwrap();
        cpu.master_tick(0);
        assert_eq!(cpu.register(1), 40);
        assert_eq!(cpu.ip(), 4);

        // Tick 1: fetch word 1, execute it.
        cpu.master_io(1, &mut bus).unwrap();
        cpu.master_tick(1);
        assert_eq!(cpu.register(2), 42);
        assert_eq!(cpu.ip(), 8);
    }

    #[test]
    fn x0_stays_zero() {
        let mut cpu = cpu();
        let mut bus = rom_bus(vec![make_addi(0, 0, 99)]);
        cpu.master_io(0, &mut bus).unwrap();
        cpu.master_tick(0);
        assert_eq!(cpu.register(0), 0);
        // The instruction still retired.
        assert_eq!(cpu.ip(), 4);
    }

    #[test]
    fn addi_adds_the_raw_immediate_field() {
        let mut cpu = cpu();
        let mut bus = rom_bus(vec![make_addi(1, 0, 0xFFF)]);
        cpu.master_io(0, &mut bus).unwrap();
        cpu.master_tick(0);
        // The immediate is not sign-extended: 0xFFF adds 4095, not -1.
        assert_eq!(cpu.register(1), 4095);
    }

    #[test]
    fn unimplemented_word_stalls_without_advancing() {
        let mut cpu = cpu();
        let mut bus = rom_bus(vec![make_ret()]);
        cpu.master_io(0, &mut bus).unwrap();
        cpu.master_tick(0);
        assert_eq!(cpu.ip(), 0);
    }

    #[test]
    fn diagnostic_names_the_invalid_word() {
        let mut cpu = cpu();
        assert_eq!(
            cpu.execute(0),
            StepOutcome::Diagnostic("invalid instruction 0x00000000".to_owned())
        );
    }

    #[test]
    fn no_response_reads_zero_and_retries() {
        let mut cpu = cpu();
        let mut bus = Bus::new(Vec::new());
        cpu.master_io(0, &mut bus).unwrap();
        // Decodes word 0, which is invalid: the CPU stalls.
        cpu.master_tick(0);
        assert_eq!(cpu.ip(), 0);
    }

    #[test]
    fn state_buffer_roundtrip_mid_instruction() {
        let mut cpu = cpu();
        let mut bus = rom_bus(vec![make_addi(5, 0, 17)]);
        cpu.master_io(0, &mut bus).unwrap();
        cpu.master_tick(0);

        let state = cpu.export_state();
        assert_eq!(state.len(), 152);
        let restored = Rv32Cpu::from_state(&state, "cpu".to_owned()).unwrap();
        assert_eq!(restored.export_state(), state);
        assert_eq!(restored.register(5), 17);
        assert_eq!(restored.ip(), 4);
    }

    #[test]
    fn corrupt_state_fields_are_rejected() {
        let mut state = cpu().export_state();
        state[4..8].copy_from_slice(&99u32.to_be_bytes());
        assert!(Rv32Cpu::from_state(&state, "cpu".to_owned()).is_err());
        assert!(Rv32Cpu::from_state(&[0; 10], "cpu".to_owned()).is_err());
    }
}
