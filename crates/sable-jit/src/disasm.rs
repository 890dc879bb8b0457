//! Native code listing

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};

/// Intel-syntax listing of x86-64 machine code, one instruction per line
pub fn disassemble_native(code: &[u8]) -> String {
    let mut decoder = Decoder::with_ip(64, code, 0, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut instruction = Instruction::default();
    let mut text = String::new();
    let mut listing = String::new();

    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        text.clear();
        formatter.format(&instruction, &mut text);
        let start = instruction.ip() as usize;
        let bytes: Vec<String> = code[start..start + instruction.len()]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        listing.push_str(&format!("{start:04X}  {:<24} {text}\n", bytes.join(" ")));
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{EPILOGUE, PROLOGUE};

    #[test]
    fn test_prologue_and_epilogue() {
        let mut code = PROLOGUE.to_vec();
        code.extend_from_slice(&EPILOGUE);
        let listing = disassemble_native(&code);
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with("push rbp"));
        assert!(lines[1].contains("mov rbp,rsp"));
        assert!(lines[2].contains("mov r8,rdx"));
        assert!(lines[5].ends_with("ret"));
    }
}
