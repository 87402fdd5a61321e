//! Concrete bus masters.

/// RV32I fetch/execute state machine.
pub mod rv32;
/// One-register accumulator machine with word operands.
pub mod simple_cpu;
/// Trivial master that writes zero to address zero.
pub mod zero_to_zero;

pub use rv32::{Rv32Cpu, StepOutcome};
pub use simple_cpu::{SimpleCpu, SimpleInstruction};
pub use zero_to_zero::ZeroToZero;
