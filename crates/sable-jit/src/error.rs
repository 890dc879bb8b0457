//! JIT errors

use sable_bytecode::BytecodeError;
use thiserror::Error;

/// Why a compilation failed. Reported through
/// [`crate::JitCompilationResult::error_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    /// `compile` called before `initialize`
    #[error("JIT compiler not initialized")]
    NotInitialized,

    /// Nothing to compile
    #[error("Empty bytecode")]
    EmptyBytecode,

    /// Bytecode does not decode
    #[error("Translation failed: {0}")]
    Decode(#[from] BytecodeError),

    /// Some path pops from an empty stack
    #[error("Translation failed: stack underflow at offset {address}")]
    StackUnderflow {
        /// Offending instruction
        address: u32,
    },

    /// Two paths reach one address with different stack depths
    #[error("Translation failed: inconsistent stack depth at offset {address} ({expected} vs {found})")]
    InconsistentStack {
        /// Merge point
        address: u32,
        /// Depth recorded first
        expected: u32,
        /// Depth arriving later
        found: u32,
    },

    /// Jump to something other than an instruction start or the end of code
    #[error("Translation failed: jump at offset {address} targets {target}")]
    InvalidJumpTarget {
        /// Jump instruction
        address: u32,
        /// Computed target
        target: i64,
    },

    /// Operand stack would need too much of the machine stack
    #[error("Translation failed: stack depth {0} exceeds the native limit")]
    StackTooDeep(u32),

    /// Native code exceeds what a rel32 branch can span
    #[error("Translation failed: native code too large ({0} bytes)")]
    CodeTooLarge(usize),

    /// The operating system refused the mapping
    #[error("Failed to allocate executable memory: {0}")]
    Allocation(String),

    /// Changing page protection failed
    #[error("Failed to protect executable memory: {0}")]
    Protection(String),
}

/// Why [`crate::JitCompiler::try_execute`] did not run native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Compilation failed or the result has no executable region
    #[error("function is not compiled")]
    NotCompiled,

    /// Stored code, region or checksum disagree
    #[error("code integrity check failed")]
    IntegrityCheckFailed,

    /// Native code hit a runtime fault (division by zero)
    #[error("native code faulted")]
    Fault,

    /// A panic unwound out of execution
    #[error("execution panicked")]
    Panicked,

    /// This target cannot run x86-64 code
    #[error("native execution is not supported on this target")]
    UnsupportedTarget,
}

impl ExecError {
    /// Sentinel returned by [`crate::JitCompiler::execute`]
    pub const fn code(self) -> i32 {
        match self {
            Self::NotCompiled => -1,
            Self::IntegrityCheckFailed => -2,
            Self::Fault | Self::Panicked => -3,
            Self::UnsupportedTarget => -4,
        }
    }
}
