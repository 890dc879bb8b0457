//! # Sable Bytecode
//!
//! Instruction model shared by the compiler, optimizer, JIT and interpreter.
//!
//! ## Encoding
//!
//! - One opcode byte per instruction
//! - `PUSH_INT`, `PUSH_FLOAT` and the jumps carry a little-endian 4-byte operand
//! - `PUSH_STR` and `CALL_NATIVE` carry an inline NUL-terminated UTF-8 string
//! - Jump operands are signed byte deltas from the end of the jump instruction

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod cursor;
pub mod disasm;
pub mod error;
pub mod eval;
pub mod instruction;
pub mod opcode;

pub use builder::{BytecodeBuilder, Label};
pub use cursor::Cursor;
pub use disasm::disassemble;
pub use error::BytecodeError;
pub use eval::{eval_binary, eval_unary};
pub use instruction::{Instruction, decode, decode_at, encode, instructions};
pub use opcode::{OperandKind, Opcode};

/// Width of one VM stack slot in bytes
pub const SLOT_SIZE: usize = 4;
