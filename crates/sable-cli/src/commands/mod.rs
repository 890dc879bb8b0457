//! CLI command implementations.

pub mod disasm;
pub mod eval;
pub mod stats;
pub mod tokens;
