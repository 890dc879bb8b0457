//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while decoding or building bytecode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Invalid opcode byte
    #[error("Invalid opcode 0x{byte:02x} at offset {offset}")]
    InvalidOpcode {
        /// The offending byte
        byte: u8,
        /// Offset of the byte
        offset: usize,
    },

    /// Operand runs past the end of the buffer
    #[error("Truncated {opcode} operand at offset {offset}")]
    Truncated {
        /// Opcode whose operand is incomplete
        opcode: &'static str,
        /// Offset of the instruction
        offset: usize,
    },

    /// Inline string has no NUL terminator
    #[error("Unterminated string operand at offset {0}")]
    UnterminatedString(usize),

    /// Inline string is not valid UTF-8
    #[error("Invalid UTF-8 in string operand at offset {0}")]
    InvalidUtf8(usize),

    /// Inline string contains an interior NUL byte
    #[error("String operand contains a NUL byte: {0:?}")]
    InteriorNul(String),

    /// Unexpected end of bytecode
    #[error("Unexpected end of bytecode")]
    UnexpectedEnd,

    /// Label used by a jump was never bound
    #[error("Unbound label {0}")]
    UnboundLabel(usize),

    /// Jump distance does not fit in a 32-bit delta
    #[error("Jump from {from} to {to} is out of range")]
    JumpOutOfRange {
        /// Jump instruction address
        from: usize,
        /// Target address
        to: usize,
    },

    /// Bytecode larger than the 32-bit address space
    #[error("Bytecode too large: {0} bytes")]
    TooLarge(usize),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
