//! # Sable Compiler
//!
//! Compiles textual expressions into Sable bytecode.
//!
//! Two input forms are accepted:
//!
//! - `name()` compiles to a single `CALL_NATIVE name` followed by `HALT`
//! - infix integer arithmetic over `+ - * / %` and parentheses, converted with
//!   the shunting-yard algorithm and emitted in postfix order, ending in `HALT`
//!
//! No optimization happens here; see `sable-optimizer`.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod lexer;
pub mod parser;

use std::sync::LazyLock;

use regex::Regex;
use sable_bytecode::BytecodeBuilder;

pub use error::{CompileError, CompileResult};
pub use lexer::{BinaryOp, Token, TokenKind, tokenize};
pub use parser::{Postfix, to_postfix};

static CALL_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\)\s*$").expect("valid regex")
});

/// Name of the native function if `source` is exactly a call form
pub fn native_call_name(source: &str) -> Option<&str> {
    CALL_FORM
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Compile an expression to bytecode
pub fn compile(source: &str) -> CompileResult<Vec<u8>> {
    let mut builder = BytecodeBuilder::new();

    if let Some(name) = native_call_name(source) {
        tracing::debug!(name, "compiling native call");
        builder.call_native(name)?;
        builder.halt();
        return Ok(builder.build()?);
    }

    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(CompileError::Empty);
    }
    let program = to_postfix(&tokens)?;

    for step in &program {
        match *step {
            Postfix::Push(value) => {
                builder.push_int(value);
            }
            Postfix::Apply { op, .. } => {
                builder.op(op.opcode());
            }
        }
    }
    builder.halt();

    let code = builder.build()?;
    tracing::debug!(tokens = tokens.len(), bytes = code.len(), "compiled expression");
    Ok(code)
}
