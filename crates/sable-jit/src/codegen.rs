//! x86-64 code generation
//!
//! Each bytecode instruction maps onto a short fixed sequence. The operand
//! stack lives on the machine stack, one 8-byte slot per value, with
//! arithmetic done on the low 32 bits. The generated function follows the
//! System V ABI as `fn(context, args, fault: *mut u32) -> i32`. The host
//! context and argument pointers arrive in rdi and rsi and are left alone.
//! The prologue moves `fault` out of rdx, which `cdq` overwrites, into r8; a
//! zero divisor stores 1 through it and returns 0.

use std::collections::BTreeMap;

use sable_bytecode::{Instruction, Opcode};

use crate::depth::DepthMap;
use crate::error::JitError;

/// `push rbp; mov rbp, rsp; mov r8, rdx`
pub const PROLOGUE: [u8; 7] = [0x55, 0x48, 0x89, 0xE5, 0x49, 0x89, 0xD0];

/// `mov rsp, rbp; pop rbp; ret`
pub const EPILOGUE: [u8; 5] = [0x48, 0x89, 0xEC, 0x5D, 0xC3];

/// Deepest operand stack translated to native code (512 KiB of machine stack)
pub const MAX_NATIVE_STACK_DEPTH: u32 = 1 << 16;

const PUSH_RAX: u8 = 0x50;
const POP_RAX: u8 = 0x58;
const POP_RCX: u8 = 0x59;
const PUSH_IMM32: u8 = 0x68;
const TEST_EAX_EAX: [u8; 2] = [0x85, 0xC0];
const TEST_ECX_ECX: [u8; 2] = [0x85, 0xC9];
const MOVZX_EAX_AL: [u8; 3] = [0x0F, 0xB6, 0xC0];
const XOR_EAX_EAX: [u8; 2] = [0x31, 0xC0];

/// Branch destination in generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JumpLabel {
    /// Code for the bytecode instruction at this address
    Bytecode(u32),
    /// Shared fault exit
    Fault,
}

/// rel32 field waiting for its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Offset of the 4-byte displacement
    pub offset: usize,
    /// Where the branch goes
    pub target: JumpLabel,
}

/// Growable machine code buffer with labels and pending relocations
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
    labels: BTreeMap<JumpLabel, usize>,
    relocations: Vec<Relocation>,
}

impl CodeBuffer {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write offset
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Append one byte
    pub fn emit_byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Append a little-endian 16-bit value
    pub fn emit_word(&mut self, word: u16) {
        self.code.extend_from_slice(&word.to_le_bytes());
    }

    /// Append a little-endian 32-bit value
    pub fn emit_dword(&mut self, dword: u32) {
        self.code.extend_from_slice(&dword.to_le_bytes());
    }

    /// Append raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Bind `label` to the current position
    pub fn bind(&mut self, label: JumpLabel) {
        self.labels.insert(label, self.code.len());
    }

    /// Code offset bound to `label`
    pub fn label_offset(&self, label: JumpLabel) -> Option<usize> {
        self.labels.get(&label).copied()
    }

    /// Bytecode address to code offset
    pub fn label_map(&self) -> BTreeMap<u32, usize> {
        self.labels
            .iter()
            .filter_map(|(label, &offset)| match label {
                JumpLabel::Bytecode(address) => Some((*address, offset)),
                JumpLabel::Fault => None,
            })
            .collect()
    }

    /// Pending relocations
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Emit a rel32 placeholder branching to `target`
    pub fn emit_rel32(&mut self, target: JumpLabel) {
        self.relocations.push(Relocation {
            offset: self.code.len(),
            target,
        });
        self.emit_dword(0);
    }

    /// Patch every relocation and return the finished code
    pub fn finish(mut self) -> Result<Vec<u8>, JitError> {
        if i32::try_from(self.code.len()).is_err() {
            return Err(JitError::CodeTooLarge(self.code.len()));
        }
        for relocation in &self.relocations {
            let Some(&target) = self.labels.get(&relocation.target) else {
                let address = match relocation.target {
                    JumpLabel::Bytecode(address) => address,
                    JumpLabel::Fault => 0,
                };
                return Err(JitError::InvalidJumpTarget {
                    address,
                    target: i64::from(address),
                });
            };
            let displacement = target as i64 - (relocation.offset as i64 + 4);
            let bytes = (displacement as i32).to_le_bytes();
            self.code[relocation.offset..relocation.offset + 4].copy_from_slice(&bytes);
        }
        Ok(self.code)
    }
}

/// Translate decoded, depth-checked bytecode into a native function
pub fn translate(instructions: &[Instruction], len: u32, depths: &DepthMap) -> Result<Vec<u8>, JitError> {
    if depths.max_depth > MAX_NATIVE_STACK_DEPTH {
        return Err(JitError::StackTooDeep(depths.max_depth));
    }

    let mut buf = CodeBuffer::new();
    buf.emit_bytes(&PROLOGUE);

    for instruction in instructions {
        buf.bind(JumpLabel::Bytecode(instruction.address));
        if let Some(depth) = depths.at(instruction.address) {
            emit_instruction(&mut buf, instruction, depth);
        }
    }

    buf.bind(JumpLabel::Bytecode(len));
    if let Some(depth) = depths.end_depth {
        emit_return(&mut buf, depth);
    }

    buf.bind(JumpLabel::Fault);
    emit_fault_exit(&mut buf);

    buf.finish()
}

fn emit_instruction(buf: &mut CodeBuffer, instruction: &Instruction, depth: u32) {
    match instruction.opcode {
        Opcode::PushInt | Opcode::PushFloat => {
            buf.emit_byte(PUSH_IMM32);
            buf.emit_dword(instruction.imm().unwrap_or_default());
        }
        Opcode::Pop => buf.emit_byte(POP_RAX),
        // push qword [rsp]
        Opcode::Dup => buf.emit_bytes(&[0xFF, 0x34, 0x24]),
        // add eax, ecx
        Opcode::Add => emit_binary(buf, &[0x01, 0xC8]),
        // sub eax, ecx
        Opcode::Sub => emit_binary(buf, &[0x29, 0xC8]),
        // imul eax, ecx
        Opcode::Mul => emit_binary(buf, &[0x0F, 0xAF, 0xC1]),
        Opcode::Div => emit_division(buf, false),
        Opcode::Mod => emit_division(buf, true),
        // and al, cl
        Opcode::And => emit_logical(buf, 0x20),
        // or al, cl
        Opcode::Or => emit_logical(buf, 0x08),
        // sete
        Opcode::CmpEq => emit_compare(buf, 0x94),
        // setg
        Opcode::CmpGt => emit_compare(buf, 0x9F),
        Opcode::Not => {
            buf.emit_byte(POP_RAX);
            buf.emit_bytes(&TEST_EAX_EAX);
            buf.emit_bytes(&[0x0F, 0x94, 0xC0]);
            buf.emit_bytes(&MOVZX_EAX_AL);
            buf.emit_byte(PUSH_RAX);
        }
        Opcode::Jmp => {
            buf.emit_byte(0xE9);
            emit_jump_target(buf, instruction);
        }
        Opcode::JmpIfZero | Opcode::JmpIfNotZero => {
            let condition = if instruction.opcode == Opcode::JmpIfZero { 0x84 } else { 0x85 };
            buf.emit_byte(POP_RAX);
            buf.emit_bytes(&TEST_EAX_EAX);
            buf.emit_bytes(&[0x0F, condition]);
            emit_jump_target(buf, instruction);
        }
        Opcode::Halt => emit_return(buf, depth),

        // Placeholders that keep the stack shape of the interpreter
        Opcode::PushStr => {
            buf.emit_byte(PUSH_IMM32);
            buf.emit_dword(0);
        }
        Opcode::LoadMem => {
            buf.emit_byte(POP_RAX);
            buf.emit_byte(PUSH_IMM32);
            buf.emit_dword(0);
        }
        Opcode::StoreMem => buf.emit_bytes(&[POP_RAX, POP_RAX]),
        Opcode::CallNative | Opcode::Nop => {}
    }
}

fn emit_jump_target(buf: &mut CodeBuffer, instruction: &Instruction) {
    // depth analysis already rejected targets that are not instructions
    let target = instruction.jump_target().unwrap_or_default();
    buf.emit_rel32(JumpLabel::Bytecode(target));
}

/// `pop rcx; pop rax; <op eax, ecx>; push rax`
fn emit_binary(buf: &mut CodeBuffer, op: &[u8]) {
    buf.emit_bytes(&[POP_RCX, POP_RAX]);
    buf.emit_bytes(op);
    buf.emit_byte(PUSH_RAX);
}

/// `cmp eax, ecx; setcc al; movzx eax, al`
fn emit_compare(buf: &mut CodeBuffer, setcc: u8) {
    buf.emit_bytes(&[POP_RCX, POP_RAX]);
    buf.emit_bytes(&[0x39, 0xC8]);
    buf.emit_bytes(&[0x0F, setcc, 0xC0]);
    buf.emit_bytes(&MOVZX_EAX_AL);
    buf.emit_byte(PUSH_RAX);
}

/// Normalize both operands to 0/1, then combine the low bytes
fn emit_logical(buf: &mut CodeBuffer, op8: u8) {
    buf.emit_bytes(&[POP_RCX, POP_RAX]);
    buf.emit_bytes(&TEST_EAX_EAX);
    buf.emit_bytes(&[0x0F, 0x95, 0xC0]); // setne al
    buf.emit_bytes(&TEST_ECX_ECX);
    buf.emit_bytes(&[0x0F, 0x95, 0xC1]); // setne cl
    buf.emit_bytes(&[op8, 0xC8]);
    buf.emit_bytes(&MOVZX_EAX_AL);
    buf.emit_byte(PUSH_RAX);
}

/// Guarded `idiv`. A zero divisor branches to the fault exit; a divisor of
/// -1 is handled without `idiv` so `i32::MIN / -1` wraps instead of trapping.
fn emit_division(buf: &mut CodeBuffer, remainder: bool) {
    buf.emit_bytes(&[POP_RCX, POP_RAX]);
    buf.emit_bytes(&TEST_ECX_ECX);
    buf.emit_bytes(&[0x0F, 0x84]); // jz fault
    buf.emit_rel32(JumpLabel::Fault);
    buf.emit_bytes(&[0x83, 0xF9, 0xFF]); // cmp ecx, -1
    buf.emit_bytes(&[0x75, 0x04]); // jne idiv
    if remainder {
        buf.emit_bytes(&XOR_EAX_EAX);
        buf.emit_bytes(&[0xEB, 0x05]); // jmp push
    } else {
        buf.emit_bytes(&[0xF7, 0xD8]); // neg eax
        buf.emit_bytes(&[0xEB, 0x03]); // jmp push
    }
    buf.emit_byte(0x99); // cdq
    buf.emit_bytes(&[0xF7, 0xF9]); // idiv ecx
    if remainder {
        buf.emit_bytes(&[0x89, 0xD0]); // mov eax, edx
    }
    buf.emit_byte(PUSH_RAX);
}

/// Return the top of stack (0 when empty)
fn emit_return(buf: &mut CodeBuffer, depth: u32) {
    if depth > 0 {
        buf.emit_byte(POP_RAX);
    } else {
        buf.emit_bytes(&XOR_EAX_EAX);
    }
    buf.emit_bytes(&EPILOGUE);
}

/// `mov dword [r8], 1; xor eax, eax` then return
fn emit_fault_exit(buf: &mut CodeBuffer) {
    buf.emit_bytes(&[0x41, 0xC7, 0x00]);
    buf.emit_dword(1);
    buf.emit_bytes(&XOR_EAX_EAX);
    buf.emit_bytes(&EPILOGUE);
}
