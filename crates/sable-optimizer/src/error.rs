//! Optimizer errors
//!
//! None of these escape [`crate::BytecodeOptimizer::optimize`]; they make the
//! fallback to the original bytecode explicit in the pass signatures.

use sable_bytecode::BytecodeError;
use thiserror::Error;

/// Reasons bytecode fails self-validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Simulated depth went negative
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(u32),

    /// Jump landing somewhere other than an instruction start
    #[error("Jump at offset {address} targets {target}, which is not an instruction")]
    InvalidJumpTarget {
        /// Jump instruction offset
        address: u32,
        /// Computed target
        target: i64,
    },

    /// Instructions overlap, leave a gap, or overrun the buffer
    #[error("Instruction at offset {address} expected at {expected}")]
    NonContiguous {
        /// Actual offset
        address: u32,
        /// Offset where the previous instruction ended
        expected: u32,
    },

    /// Bytecode does not decode
    #[error("Undecodable bytecode: {0}")]
    Decode(#[from] BytecodeError),
}

/// Errors raised inside optimization passes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    /// Input or intermediate bytecode does not decode
    #[error("Decode error: {0}")]
    Decode(#[from] BytecodeError),

    /// Result failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A rewritten jump no longer fits a 32-bit delta
    #[error("Jump at offset {address} cannot reach {target}")]
    JumpOutOfRange {
        /// New jump offset
        address: u32,
        /// New target offset
        target: u32,
    },

    /// Invariant broken inside a pass
    #[error("Internal error in {pass}: {message}")]
    Internal {
        /// Pass name
        pass: &'static str,
        /// What went wrong
        message: String,
    },
}

impl OptimizeError {
    /// Create an internal error
    pub fn internal(pass: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            pass,
            message: message.into(),
        }
    }
}

/// Result type for optimizer operations
pub type OptimizeResult<T> = Result<T, OptimizeError>;
