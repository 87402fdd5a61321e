//! Two-pass assembler: pass 1 assigns label offsets, pass 2 encodes.
//!
//! The dialect is line-oriented. A line holds any number of `label:`
//! prefixes, then at most one directive or instruction; `#` starts a
//! comment. `.offset N` moves the emission-offset cursor that labels and
//! jump targets are computed against, without padding the output buffer.
//!
//! Output is a little-endian instruction stream capped at
//! [`MAX_OUTPUT_BYTES`].

use std::collections::HashMap;

use emulator_core::codec::{
    encode_i, encode_s, make_jal, make_ret, to_field, Opcode, FUNCT3_ADDI, FUNCT3_SW,
};
use thiserror::Error;

use crate::lexer::{tokenize, LexError, Token, TokenKind};

/// Fixed capacity of the assembled output, in bytes.
pub const MAX_OUTPUT_BYTES: usize = 256;

/// Errors from assembling a token stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// A line starts with a mnemonic the assembler does not know.
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
    /// A `.` directive other than `.offset`.
    #[error("unknown directive: .{0}")]
    UnknownDirective(String),
    /// Arguments after the first were not separated by a comma.
    #[error("missing comma in {0} arguments")]
    MissingComma(String),
    /// An argument was absent or of the wrong shape.
    #[error("cannot read {what} argument of {mnemonic}")]
    BadArgument {
        /// The mnemonic being parsed.
        mnemonic: String,
        /// Which argument failed, e.g. "register" or "immediate".
        what: &'static str,
    },
    /// A jump names a label no line defines.
    #[error("cannot find label {0}")]
    UnresolvedLabel(String),
    /// The same label is defined twice.
    #[error("label {0} already exists")]
    DuplicateLabel(String),
    /// Tokens remained on a line after the statement was read.
    #[error("unexpected trailing tokens: {0}")]
    LeftoverTokens(String),
    /// `.offset` was given a negative cursor position.
    #[error(".offset must be non-negative, got {0}")]
    NegativeOffset(i64),
    /// The program does not fit the fixed output capacity.
    #[error("program exceeds {MAX_OUTPUT_BYTES} bytes of output")]
    OutputOverflow,
    /// An immediate or resolved jump offset does not fit its field.
    #[error("{mnemonic} value {value} out of range")]
    ImmediateOutOfRange {
        /// The mnemonic being encoded.
        mnemonic: &'static str,
        /// The offending value.
        value: i64,
    },
}

/// Errors from assembling straight from source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source did not tokenize.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// The token stream did not assemble.
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

/// Where a jump lands: a label to resolve, or a literal byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    /// Resolved against the label table in pass 2.
    Label(String),
    /// Used as the byte offset directly.
    Imm(i64),
}

/// One parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `addi rd, rs1, imm`
    Addi {
        /// Destination register.
        rd: u8,
        /// Source register.
        rs1: u8,
        /// Immediate; encoded as a raw 12-bit field.
        imm: i64,
    },
    /// `sw rs1, rs2, imm`: stores `rs2` at `rs1 + imm`.
    Sw {
        /// Base address register.
        rs1: u8,
        /// Register holding the value to store.
        rs2: u8,
        /// Signed byte offset from the base.
        imm: i64,
    },
    /// `ret`; encodes `jalr x0, 0(ra)`.
    Ret,
    /// `jal rd, target`
    Jal {
        /// Link register.
        rd: u8,
        /// Label or literal byte offset.
        target: JumpTarget,
    },
}

/// One meaningful line element, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    SetOffset(u32),
    Label(String),
    Statement(Statement),
}

/// ABI register names, including the dialect's `rs` alias for `x2`.
fn abi_register(name: &str) -> Option<u8> {
    let n = match name {
        "zero" => 0,
        "ra" => 1,
        "sp" | "rs" => 2,
        "gp" => 3,
        "tp" => 4,
        "t0" => 5,
        "t1" => 6,
        "t2" => 7,
        "s0" | "fp" => 8,
        "s1" => 9,
        "a0" => 10,
        "a1" => 11,
        "a2" => 12,
        "a3" => 13,
        "a4" => 14,
        "a5" => 15,
        "a6" => 16,
        "a7" => 17,
        "s2" => 18,
        "s3" => 19,
        "s4" => 20,
        "s5" => 21,
        "s6" => 22,
        "s7" => 23,
        "s8" => 24,
        "s9" => 25,
        "s10" => 26,
        "s11" => 27,
        "t3" => 28,
        "t4" => 29,
        "t5" => 30,
        "t6" => 31,
        _ => return None,
    };
    Some(n)
}

fn register_number(name: &str) -> Option<u8> {
    let name = name.to_lowercase();
    if let Some(digits) = name.strip_prefix('x') {
        let n: u8 = digits.parse().ok()?;
        return (n < 32).then_some(n);
    }
    abi_register(&name)
}

/// Cursor over one line's tokens; spaces and comments are transparent.
struct Line<'a> {
    tokens: &'a [Token],
}

impl<'a> Line<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let mut line = Self { tokens };
        line.skip_trivia();
        line
    }

    fn skip_trivia(&mut self) {
        while let Some(token) = self.tokens.first() {
            if matches!(token.kind, TokenKind::Space | TokenKind::Comment) {
                self.tokens = &self.tokens[1..];
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) {
        if !self.tokens.is_empty() {
            self.tokens = &self.tokens[1..];
        }
        self.skip_trivia();
    }

    fn peek(&self, n: usize) -> Option<&'a TokenKind> {
        self.tokens
            .iter()
            .map(|token| &token.kind)
            .filter(|kind| !matches!(kind, TokenKind::Space | TokenKind::Comment))
            .nth(n)
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn take_comma(&mut self) -> bool {
        if matches!(self.peek(0), Some(TokenKind::Comma)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn take_register(&mut self) -> Option<u8> {
        if let Some(TokenKind::Literal(name)) = self.peek(0) {
            let number = register_number(name)?;
            self.advance();
            return Some(number);
        }
        None
    }

    fn take_number(&mut self) -> Option<i64> {
        if let Some(TokenKind::Number(value)) = self.peek(0) {
            let value = *value;
            self.advance();
            return Some(value);
        }
        None
    }

    fn take_target(&mut self) -> Option<JumpTarget> {
        match self.peek(0) {
            Some(TokenKind::Number(value)) => {
                let value = *value;
                self.advance();
                Some(JumpTarget::Imm(value))
            }
            Some(TokenKind::Literal(name)) => {
                let name = name.clone();
                self.advance();
                Some(JumpTarget::Label(name))
            }
            _ => None,
        }
    }

    fn remainder(&self) -> String {
        self.tokens
            .iter()
            .map(|token| format!("{:?}", token.kind))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `.offset N`
fn read_directive(line: &mut Line<'_>) -> Result<Option<Item>, AssembleError> {
    if !matches!(line.peek(0), Some(TokenKind::Dot)) {
        return Ok(None);
    }
    line.advance();
    let Some(TokenKind::Literal(name)) = line.peek(0) else {
        return Err(AssembleError::UnknownDirective(String::new()));
    };
    let name = name.clone();
    line.advance();
    if name != "offset" {
        return Err(AssembleError::UnknownDirective(name));
    }
    let value = line.take_number().ok_or(AssembleError::BadArgument {
        mnemonic: ".offset".to_owned(),
        what: "number",
    })?;
    let value = u32::try_from(value).map_err(|_| AssembleError::NegativeOffset(value))?;
    Ok(Some(Item::SetOffset(value)))
}

/// `label:`
fn read_label(line: &mut Line<'_>) -> Option<String> {
    if let (Some(TokenKind::Literal(name)), Some(TokenKind::Colon)) = (line.peek(0), line.peek(1))
    {
        let name = name.clone();
        line.advance();
        line.advance();
        return Some(name);
    }
    None
}

fn bad_argument(mnemonic: &str, what: &'static str) -> AssembleError {
    AssembleError::BadArgument {
        mnemonic: mnemonic.to_owned(),
        what,
    }
}

#[allow(clippy::too_many_lines)]
fn read_instruction(line: &mut Line<'_>) -> Result<Option<Statement>, AssembleError> {
    let Some(TokenKind::Literal(mnemonic)) = line.peek(0) else {
        return Ok(None);
    };
    let mnemonic = mnemonic.to_lowercase();
    line.advance();

    let statement = match mnemonic.as_str() {
        "addi" => {
            let rd = line
                .take_register()
                .ok_or_else(|| bad_argument(&mnemonic, "destination register"))?;
            if !line.take_comma() {
                return Err(AssembleError::MissingComma(mnemonic));
            }
            let rs1 = line
                .take_register()
                .ok_or_else(|| bad_argument(&mnemonic, "source register"))?;
            if !line.take_comma() {
                return Err(AssembleError::MissingComma(mnemonic));
            }
            let imm = line
                .take_number()
                .ok_or_else(|| bad_argument(&mnemonic, "immediate"))?;
            Statement::Addi { rd, rs1, imm }
        }
        "sw" => {
            let rs1 = line
                .take_register()
                .ok_or_else(|| bad_argument(&mnemonic, "base register"))?;
            if !line.take_comma() {
                return Err(AssembleError::MissingComma(mnemonic));
            }
            let rs2 = line
                .take_register()
                .ok_or_else(|| bad_argument(&mnemonic, "value register"))?;
            if !line.take_comma() {
                return Err(AssembleError::MissingComma(mnemonic));
            }
            let imm = line
                .take_number()
                .ok_or_else(|| bad_argument(&mnemonic, "offset"))?;
            Statement::Sw { rs1, rs2, imm }
        }
        "ret" => Statement::Ret,
        "jal" => {
            let rd = line
                .take_register()
                .ok_or_else(|| bad_argument(&mnemonic, "link register"))?;
            if !line.take_comma() {
                return Err(AssembleError::MissingComma(mnemonic));
            }
            let target = line
                .take_target()
                .ok_or_else(|| bad_argument(&mnemonic, "jump target"))?;
            Statement::Jal { rd, target }
        }
        _ => return Err(AssembleError::InvalidInstruction(mnemonic)),
    };
    Ok(Some(statement))
}

/// Parses the token stream into items, line by line.
fn parse(tokens: &[Token]) -> Result<Vec<Item>, AssembleError> {
    let mut items = Vec::new();

    for raw_line in tokens.split(|token| matches!(token.kind, TokenKind::NewLine)) {
        let mut line = Line::new(raw_line);

        if let Some(item) = read_directive(&mut line)? {
            items.push(item);
        } else {
            while let Some(label) = read_label(&mut line) {
                items.push(Item::Label(label));
            }
            if let Some(statement) = read_instruction(&mut line)? {
                items.push(Item::Statement(statement));
            }
        }

        if !line.is_empty() {
            return Err(AssembleError::LeftoverTokens(line.remainder()));
        }
    }

    Ok(items)
}

/// Pass 1: labels at their emission offsets. Forward references resolve
/// because encoding is deferred to pass 2.
fn collect_labels(items: &[Item]) -> Result<HashMap<String, u32>, AssembleError> {
    let mut labels = HashMap::new();
    let mut offset: u32 = 0;

    for item in items {
        match item {
            Item::SetOffset(value) => offset = *value,
            Item::Label(name) => {
                if labels.insert(name.clone(), offset).is_some() {
                    return Err(AssembleError::DuplicateLabel(name.clone()));
                }
            }
            Item::Statement(_) => offset += 4,
        }
    }

    Ok(labels)
}

fn encode_statement(
    statement: &Statement,
    offset: u32,
    labels: &HashMap<String, u32>,
) -> Result<u32, AssembleError> {
    match statement {
        Statement::Addi { rd, rs1, imm } => {
            if !(-2048..=4095).contains(imm) {
                return Err(AssembleError::ImmediateOutOfRange {
                    mnemonic: "addi",
                    value: *imm,
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            Ok(encode_i(
                Opcode::OpImm,
                *rd,
                FUNCT3_ADDI,
                *rs1,
                to_field(*imm as i32, 12),
            ))
        }
        Statement::Sw { rs1, rs2, imm } => {
            if !(-2048..=2047).contains(imm) {
                return Err(AssembleError::ImmediateOutOfRange {
                    mnemonic: "sw",
                    value: *imm,
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            Ok(encode_s(
                Opcode::Store,
                FUNCT3_SW,
                *rs1,
                *rs2,
                to_field(*imm as i32, 12),
            ))
        }
        Statement::Ret => Ok(make_ret()),
        Statement::Jal { rd, target } => {
            let jump = match target {
                JumpTarget::Imm(value) => *value,
                JumpTarget::Label(name) => {
                    let position = labels
                        .get(name)
                        .ok_or_else(|| AssembleError::UnresolvedLabel(name.clone()))?;
                    i64::from(*position) - i64::from(offset)
                }
            };
            if !(-524_288..=524_287).contains(&jump) {
                return Err(AssembleError::ImmediateOutOfRange {
                    mnemonic: "jal",
                    value: jump,
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            Ok(make_jal(*rd, jump as i32))
        }
    }
}

/// Assembles a token stream into a little-endian instruction image.
///
/// # Errors
///
/// Returns an [`AssembleError`] describing the first problem found.
pub fn assemble(tokens: &[Token]) -> Result<Vec<u8>, AssembleError> {
    let items = parse(tokens)?;
    let labels = collect_labels(&items)?;

    let mut output = Vec::new();
    let mut offset: u32 = 0;

    for item in &items {
        match item {
            Item::SetOffset(value) => offset = *value,
            Item::Label(_) => {}
            Item::Statement(statement) => {
                let word = encode_statement(statement, offset, &labels)?;
                if output.len() + 4 > MAX_OUTPUT_BYTES {
                    return Err(AssembleError::OutputOverflow);
                }
                output.extend_from_slice(&word.to_le_bytes());
                offset += 4;
            }
        }
    }

    Ok(output)
}

/// Tokenizes and assembles in one step.
///
/// # Errors
///
/// Returns a [`SourceError`] wrapping the lex or assembly failure.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, SourceError> {
    Ok(assemble(&tokenize(source)?)?)
}

#[cfg(test)]
mod tests {
    use emulator_core::codec::{make_addi, make_jal, make_ret, make_sw};

    use super::{assemble_source, AssembleError, SourceError, MAX_OUTPUT_BYTES};

    fn words(binary: &[u8]) -> Vec<u32> {
        binary
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn assemble_err(source: &str) -> AssembleError {
        match assemble_source(source).unwrap_err() {
            SourceError::Assemble(error) => error,
            SourceError::Lex(error) => panic!("unexpected lex error: {error}"),
        }
    }

    #[test]
    fn assembles_a_minimal_program() {
        let binary = assemble_source("addi x1, x0, 40\naddi x2, x1, 2\nret\n").unwrap();
        assert_eq!(
            words(&binary),
            vec![make_addi(1, 0, 40), make_addi(2, 1, 2), make_ret()]
        );
    }

    #[test]
    fn abi_names_and_case_are_accepted() {
        let binary = assemble_source("ADDI RA, zero, 1\naddi rs, fp, 2\n").unwrap();
        assert_eq!(words(&binary), vec![make_addi(1, 0, 1), make_addi(2, 8, 2)]);
    }

    #[test]
    fn backward_jump_resolves_to_a_negative_offset() {
        let binary = assemble_source("loop: addi x1, x1, 1\njal x0, loop\n").unwrap();
        assert_eq!(words(&binary)[1], make_jal(0, -4));
    }

    #[test]
    fn forward_jump_resolves_to_a_positive_offset() {
        let binary = assemble_source("jal x0, end\naddi x1, x0, 1\nend: ret\n").unwrap();
        assert_eq!(words(&binary)[0], make_jal(0, 8));
    }

    #[test]
    fn numeric_jump_targets_pass_through() {
        let binary = assemble_source("jal ra, -16\n").unwrap();
        assert_eq!(words(&binary), vec![make_jal(1, -16)]);
    }

    #[test]
    fn offset_directive_moves_labels_not_output() {
        // The jump target sits at cursor 64 while only one word precedes
        // it in the output.
        let binary = assemble_source("jal x0, there\n.offset 64\nthere: ret\n").unwrap();
        assert_eq!(words(&binary), vec![make_jal(0, 64), make_ret()]);
        assert_eq!(binary.len(), 8);
    }

    #[test]
    fn stores_encode_with_signed_offsets() {
        let binary = assemble_source("sw x0, x3, 128\nsw x5, x6, -4\n").unwrap();
        assert_eq!(words(&binary), vec![make_sw(0, 3, 128), make_sw(5, 6, -4)]);
    }

    #[test]
    fn comments_labels_and_blank_lines_coexist() {
        let source = "\
# counts forever
start:
    addi t0, t0, 1   # increment
    jal zero, start
";
        let binary = assemble_source(source).unwrap();
        assert_eq!(words(&binary), vec![make_addi(5, 5, 1), make_jal(0, -4)]);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        assert_eq!(
            assemble_err("a: ret\na: ret\n"),
            AssembleError::DuplicateLabel("a".to_owned())
        );
    }

    #[test]
    fn unresolved_label_is_an_error() {
        assert_eq!(
            assemble_err("jal x0, nowhere\n"),
            AssembleError::UnresolvedLabel("nowhere".to_owned())
        );
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        assert_eq!(
            assemble_err("frobnicate x1\n"),
            AssembleError::InvalidInstruction("frobnicate".to_owned())
        );
    }

    #[test]
    fn unknown_directive_is_an_error() {
        assert_eq!(
            assemble_err(".align 4\n"),
            AssembleError::UnknownDirective("align".to_owned())
        );
    }

    #[test]
    fn negative_offset_directive_is_an_error() {
        assert_eq!(assemble_err(".offset -4\n"), AssembleError::NegativeOffset(-4));
    }

    #[test]
    fn missing_comma_is_an_error() {
        assert_eq!(
            assemble_err("addi x1 x0, 1\n"),
            AssembleError::MissingComma("addi".to_owned())
        );
    }

    #[test]
    fn trailing_tokens_are_an_error() {
        assert!(matches!(
            assemble_err("ret ret\n"),
            AssembleError::LeftoverTokens(_)
        ));
    }

    #[test]
    fn immediate_out_of_range_is_an_error() {
        assert!(matches!(
            assemble_err("addi x1, x0, 4096\n"),
            AssembleError::ImmediateOutOfRange {
                mnemonic: "addi",
                ..
            }
        ));
    }

    #[test]
    fn output_capacity_is_enforced() {
        let source = "ret\n".repeat(MAX_OUTPUT_BYTES / 4 + 1);
        assert_eq!(assemble_err(&source), AssembleError::OutputOverflow);

        let exact = "ret\n".repeat(MAX_OUTPUT_BYTES / 4);
        assert_eq!(assemble_source(&exact).unwrap().len(), MAX_OUTPUT_BYTES);
    }

    #[test]
    fn lex_errors_surface_through_assemble_source() {
        assert!(matches!(
            assemble_source("addi @, x0, 1\n").unwrap_err(),
            SourceError::Lex(_)
        ));
    }
}
