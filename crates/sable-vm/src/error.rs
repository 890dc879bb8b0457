//! Runtime errors

use sable_bytecode::BytecodeError;
use thiserror::Error;

/// Reasons a run stops without reaching `HALT`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// `DIV` or `MOD` with a zero divisor
    #[error("Division by zero at offset {0}")]
    DivByZero(usize),

    /// `CALL_NATIVE` for a name nobody registered
    #[error("Unknown native function: {0}")]
    UnknownNativeFn(String),

    /// Native call refused by the VM configuration
    #[error("Native call not allowed: {0}")]
    NativeCallDenied(String),

    /// Native callback panicked
    #[error("Native function panicked: {0}")]
    NativePanicked(String),

    /// Byte that is not an opcode
    #[error("Unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Pop from an empty stack
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Stack grew past `max_stack_bytes`
    #[error("Stack overflow (limit {0} bytes)")]
    StackOverflow(usize),

    /// Immediate operand cut off by the end of the buffer
    #[error("Truncated operand at offset {0}")]
    Truncated(usize),

    /// Malformed inline operand
    #[error("Malformed bytecode: {0}")]
    Malformed(#[from] BytecodeError),

    /// Jump landing outside the buffer
    #[error("Jump at offset {from} to {target} is out of bounds")]
    JumpOutOfBounds {
        /// Jump instruction offset
        from: usize,
        /// Computed destination
        target: i64,
    },

    /// Run exceeded `max_instructions`
    #[error("Instruction limit of {0} exceeded")]
    InstructionLimit(u64),

    /// `LOAD_MEM`/`STORE_MEM` address outside VM memory
    #[error("Memory address {0} out of bounds")]
    MemoryOutOfBounds(i32),
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;
