//! Assembler library for the emulator's RV32I instruction subset.

/// Two-pass assembly over a token stream.
pub mod assembler;
/// Tokenizer for the assembly dialect.
pub mod lexer;

pub use assembler::{
    assemble, assemble_source, AssembleError, JumpTarget, SourceError, Statement,
    MAX_OUTPUT_BYTES,
};
pub use lexer::{tokenize, LexError, Token, TokenKind};
