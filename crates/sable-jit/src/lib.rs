//! # Sable JIT
//!
//! Translates Sable bytecode to x86-64 machine code.
//!
//! Compilation runs a level-gated subset of the optimizer passes, checks
//! that every path agrees on stack depth, emits one fixed instruction
//! sequence per opcode and loads the result into a read-execute region.
//! Compiled functions can be cached by name under a byte budget; the
//! stored copy of the code is checksummed and optionally XOR-masked, and
//! execution refuses code whose checksum no longer matches.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cache;
pub mod codegen;
pub mod compiler;
pub mod depth;
#[cfg(target_arch = "x86_64")]
pub mod disasm;
pub mod error;
pub mod memory;
pub mod security;
pub mod settings;

pub use cache::CodeCache;
pub use compiler::{JitCompilationResult, JitCompiler};
#[cfg(target_arch = "x86_64")]
pub use disasm::disassemble_native;
pub use error::{ExecError, JitError};
pub use memory::{ExecutableMemoryArena, ExecutableRegion, Protection, SystemArena};
pub use settings::JitSettings;
