//! Engine errors

use sable_compiler::CompileError;
use sable_jit::ExecError;
use sable_vm::VmError;
use thiserror::Error;

/// Why an expression could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The expression did not compile
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// The interpreter stopped with an error
    #[error("script execution failed: {0}")]
    Runtime(#[from] VmError),

    /// The JIT could not produce native code
    #[error("JIT compilation failed: {0}")]
    Jit(String),

    /// Native code did not run to completion
    #[error("script execution failed: {0}")]
    Native(#[from] ExecError),

    /// The bytecode needs host services the JIT does not provide
    #[error("bytecode uses {0}, which native code cannot run")]
    NotJittable(String),
}

impl EngineError {
    /// JIT failure with a message
    pub fn jit(message: impl Into<String>) -> Self {
        Self::Jit(message.into())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
