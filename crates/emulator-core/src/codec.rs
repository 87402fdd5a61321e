//! RV32I instruction word packing and unpacking.
//!
//! Covers the R/I/S/J formats used by the `rv32` master. Immediates are kept
//! as raw field bits: an `I` immediate is the unsigned 12-bit packing and a
//! `J` immediate is the 20-bit byte offset before the `imm[19|9:0|10|18:11]`
//! shuffle. Use [`sign_extend`] to interpret a raw field as a signed value
//! and [`to_field`] to mask a signed offset back into a field.

/// RV32I major opcodes (low 7 bits of the instruction word).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    Lui = 0b011_0111,
    Auipc = 0b001_0111,
    Jal = 0b110_1111,
    Jalr = 0b110_0111,
    Branch = 0b110_0011,
    Load = 0b000_0011,
    Store = 0b010_0011,
    OpImm = 0b001_0011,
    Op = 0b011_0011,
    MiscMem = 0b000_1111,
    System = 0b111_0011,
}

impl Opcode {
    /// Converts the low 7 bits of an instruction word into a known opcode.
    #[must_use]
    pub const fn from_u7(raw: u8) -> Option<Self> {
        match raw {
            0b011_0111 => Some(Self::Lui),
            0b001_0111 => Some(Self::Auipc),
            0b110_1111 => Some(Self::Jal),
            0b110_0111 => Some(Self::Jalr),
            0b110_0011 => Some(Self::Branch),
            0b000_0011 => Some(Self::Load),
            0b010_0011 => Some(Self::Store),
            0b001_0011 => Some(Self::OpImm),
            0b011_0011 => Some(Self::Op),
            0b000_1111 => Some(Self::MiscMem),
            0b111_0011 => Some(Self::System),
            _ => None,
        }
    }
}

/// `funct3` for ADDI under [`Opcode::OpImm`].
pub const FUNCT3_ADDI: u8 = 0b000;
/// `funct3` for the ADD/SUB group under [`Opcode::Op`].
pub const FUNCT3_ADD_SUB: u8 = 0b000;
/// `funct3` for SW under [`Opcode::Store`].
pub const FUNCT3_SW: u8 = 0b010;
/// `funct7` selecting ADD within the ADD/SUB group.
pub const FUNCT7_ADD: u8 = 0b000_0000;
/// `funct7` selecting SUB within the ADD/SUB group.
pub const FUNCT7_SUB: u8 = 0b010_0000;

/// A decoded RV32I instruction, one variant per handled format.
///
/// Field widths match the wire encoding; `imm` values are raw field bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Instruction {
    R {
        opcode: Opcode,
        rd: u8,
        funct3: u8,
        rs1: u8,
        rs2: u8,
        funct7: u8,
    },
    I {
        opcode: Opcode,
        rd: u8,
        funct3: u8,
        rs1: u8,
        imm: u32,
    },
    S {
        opcode: Opcode,
        funct3: u8,
        rs1: u8,
        rs2: u8,
        imm: u32,
    },
    J {
        opcode: Opcode,
        rd: u8,
        imm: u32,
    },
}

impl Instruction {
    /// Packs this instruction into its 32-bit wire encoding.
    #[must_use]
    pub fn encode(self) -> u32 {
        match self {
            Self::R {
                opcode,
                rd,
                funct3,
                rs1,
                rs2,
                funct7,
            } => encode_r(opcode, rd, funct3, rs1, rs2, funct7),
            Self::I {
                opcode,
                rd,
                funct3,
                rs1,
                imm,
            } => encode_i(opcode, rd, funct3, rs1, imm),
            Self::S {
                opcode,
                funct3,
                rs1,
                rs2,
                imm,
            } => encode_s(opcode, funct3, rs1, rs2, imm),
            Self::J { opcode, rd, imm } => encode_j(opcode, rd, imm),
        }
    }
}

// 32-bit encodings use the low bits bbb11 where bbb != 111.
const fn verify_opcode(opcode: Opcode) {
    let raw = opcode as u32;
    assert!(raw < 128, "opcode out of range");
    assert!((raw & 0b11100) != 0b11100, "not a 32-bit encoding");
}

const fn verify_register(r: u8) {
    assert!(r < 32, "register index out of range");
}

/// Packs an R-format instruction.
///
/// # Panics
///
/// Panics if any field exceeds its encoded width. Field violations indicate
/// a caller bug, not bad user input.
#[must_use]
pub fn encode_r(opcode: Opcode, rd: u8, funct3: u8, rs1: u8, rs2: u8, funct7: u8) -> u32 {
    verify_opcode(opcode);
    verify_register(rd);
    verify_register(rs1);
    verify_register(rs2);
    assert!(funct3 < 8, "funct3 out of range");
    assert!(funct7 < 128, "funct7 out of range");

    opcode as u32
        | u32::from(rd) << 7
        | u32::from(funct3) << 12
        | u32::from(rs1) << 15
        | u32::from(rs2) << 20
        | u32::from(funct7) << 25
}

/// Packs an I-format instruction. `imm` is the raw unsigned 12-bit field.
///
/// # Panics
///
/// Panics if any field exceeds its encoded width.
#[must_use]
pub fn encode_i(opcode: Opcode, rd: u8, funct3: u8, rs1: u8, imm: u32) -> u32 {
    verify_opcode(opcode);
    verify_register(rd);
    verify_register(rs1);
    assert!(funct3 < 8, "funct3 out of range");
    assert!(imm < 4096, "I immediate out of range");

    opcode as u32 | u32::from(rd) << 7 | u32::from(funct3) << 12 | u32::from(rs1) << 15 | imm << 20
}

/// Packs an S-format instruction, splitting `imm` into `imm[4:0]`/`imm[11:5]`.
///
/// # Panics
///
/// Panics if any field exceeds its encoded width.
#[must_use]
pub fn encode_s(opcode: Opcode, funct3: u8, rs1: u8, rs2: u8, imm: u32) -> u32 {
    verify_opcode(opcode);
    verify_register(rs1);
    verify_register(rs2);
    assert!(funct3 < 8, "funct3 out of range");
    assert!(imm < 4096, "S immediate out of range");

    opcode as u32
        | (imm & 0b1_1111) << 7
        | u32::from(funct3) << 12
        | u32::from(rs1) << 15
        | u32::from(rs2) << 20
        | ((imm >> 5) & 0b111_1111) << 25
}

/// Packs a J-format instruction, shuffling `imm` as `imm[19|9:0|10|18:11]`.
///
/// `imm` is a raw 20-bit byte offset, not halfword-shifted.
///
/// # Panics
///
/// Panics if any field exceeds its encoded width.
#[must_use]
pub fn encode_j(opcode: Opcode, rd: u8, imm: u32) -> u32 {
    verify_opcode(opcode);
    verify_register(rd);
    assert!(imm < 1_048_576, "J immediate out of range");

    opcode as u32
        | u32::from(rd) << 7
        | ((imm >> 11) & 0b1111_1111) << 12
        | ((imm >> 10) & 0b1) << 20
        | (imm & 0b11_1111_1111) << 21
        | ((imm >> 19) & 0b1) << 31
}

/// Unpacks an instruction word.
///
/// Only the LOAD, OP-IMM, OP, STORE, and JAL opcodes decode to a format;
/// every other word returns `None`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decode(word: u32) -> Option<Instruction> {
    let opcode = Opcode::from_u7((word & 0b111_1111) as u8)?;

    let rd = ((word >> 7) & 0b1_1111) as u8;
    let funct3 = ((word >> 12) & 0b111) as u8;
    let rs1 = ((word >> 15) & 0b1_1111) as u8;
    let rs2 = ((word >> 20) & 0b1_1111) as u8;

    match opcode {
        Opcode::Load | Opcode::OpImm => Some(Instruction::I {
            opcode,
            rd,
            funct3,
            rs1,
            imm: (word >> 20) & 0b1111_1111_1111,
        }),
        Opcode::Op => Some(Instruction::R {
            opcode,
            rd,
            funct3,
            rs1,
            rs2,
            funct7: ((word >> 25) & 0b111_1111) as u8,
        }),
        Opcode::Store => Some(Instruction::S {
            opcode,
            funct3,
            rs1,
            rs2,
            imm: ((word >> 7) & 0b1_1111) | ((word >> 25) & 0b111_1111) << 5,
        }),
        Opcode::Jal => Some(Instruction::J {
            opcode,
            rd,
            // imm[19|9:0|10|18:11]
            imm: ((word >> 31) & 0b1) << 19
                | ((word >> 12) & 0b1111_1111) << 11
                | ((word >> 20) & 0b1) << 10
                | (word >> 21) & 0b11_1111_1111,
        }),
        _ => None,
    }
}

/// Interprets the low `bits` of `raw` as a two's-complement signed value.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend(raw: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((raw << shift) as i32) >> shift
}

/// Masks a signed offset into an `bits`-wide raw field.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn to_field(value: i32, bits: u32) -> u32 {
    (value as u32) & ((1 << bits) - 1)
}

/// `add rd, rs1, rs2`
#[must_use]
pub fn make_add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    encode_r(Opcode::Op, rd, FUNCT3_ADD_SUB, rs1, rs2, FUNCT7_ADD)
}

/// `sub rd, rs1, rs2`
#[must_use]
pub fn make_sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
    encode_r(Opcode::Op, rd, FUNCT3_ADD_SUB, rs1, rs2, FUNCT7_SUB)
}

/// `addi rd, rs1, imm` with a raw 12-bit immediate field.
#[must_use]
pub fn make_addi(rd: u8, rs1: u8, imm: u32) -> u32 {
    encode_i(Opcode::OpImm, rd, FUNCT3_ADDI, rs1, imm)
}

/// The canonical NOP, `addi x0, x0, 0`.
#[must_use]
pub fn make_nop() -> u32 {
    make_addi(0, 0, 0)
}

/// `sw rs2, offset(rs1)` with a signed byte offset.
#[must_use]
pub fn make_sw(rs1: u8, rs2: u8, offset: i32) -> u32 {
    encode_s(Opcode::Store, FUNCT3_SW, rs1, rs2, to_field(offset, 12))
}

/// `jal rd, offset` with a signed byte offset.
#[must_use]
pub fn make_jal(rd: u8, offset: i32) -> u32 {
    encode_j(Opcode::Jal, rd, to_field(offset, 20))
}

/// `j offset`, an alias for `jal x0, offset`.
#[must_use]
pub fn make_j(offset: i32) -> u32 {
    make_jal(0, offset)
}

/// `ret`, encoded as `jalr x0, 0(ra)`.
#[must_use]
pub fn make_ret() -> u32 {
    encode_i(Opcode::Jalr, 0, 0, 1, 0)
}
