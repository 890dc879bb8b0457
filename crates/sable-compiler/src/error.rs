//! Compilation errors

use sable_bytecode::BytecodeError;
use thiserror::Error;

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Nothing to compile
    #[error("Empty expression")]
    Empty,

    /// Character that starts no token
    #[error("Unknown token {ch:?} at column {column}")]
    UnknownToken {
        /// The character
        ch: char,
        /// 1-based column
        column: usize,
    },

    /// `)` without a matching `(`
    #[error("Unmatched ')' at column {0}")]
    UnmatchedClose(usize),

    /// `(` never closed
    #[error("Unclosed '(' at column {0}")]
    UnclosedOpen(usize),

    /// Operator without enough operands
    #[error("Operator '{op}' at column {column} is missing an operand")]
    MissingOperand {
        /// Operator symbol
        op: char,
        /// 1-based column
        column: usize,
    },

    /// Literal outside the 32-bit signed range
    #[error("Integer literal {literal} at column {column} does not fit in 32 bits")]
    IntegerOverflow {
        /// Literal text
        literal: String,
        /// 1-based column
        column: usize,
    },

    /// Well-formed tokens in an invalid arrangement
    #[error("Syntax error at column {column}: {message}")]
    Syntax {
        /// Error message
        message: String,
        /// 1-based column
        column: usize,
    },

    /// Encoding failure
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),
}

impl CompileError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, column: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            column,
        }
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
