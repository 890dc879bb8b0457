//! Human-readable listings

use std::fmt::Write;

use crate::instruction::instructions;

/// Render one instruction per line.
///
/// Decoding stops at the first malformed instruction, which is reported on
/// the last line instead of failing the whole listing.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut out = String::new();
    for item in instructions(bytes) {
        match item {
            Ok(instruction) => {
                let _ = writeln!(out, "{instruction}");
            }
            Err(err) => {
                let _ = writeln!(out, "<error: {err}>");
            }
        }
    }
    out
}
