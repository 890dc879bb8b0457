//! Bytecode emitter with forward-referencing labels

use crate::error::{BytecodeError, Result};
use crate::instruction::IMM32_INSTRUCTION_SIZE;
use crate::opcode::Opcode;

/// Jump destination created by [`BytecodeBuilder::new_label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Builds an encoded bytecode buffer.
///
/// Jumps to labels are emitted with a placeholder delta and patched in
/// [`BytecodeBuilder::build`] once every label has an address.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    /// (offset of the jump opcode, label)
    fixups: Vec<(usize, Label)>,
}

impl BytecodeBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write offset
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Emit an operand-less opcode
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode.to_byte());
        self
    }

    /// Emit `PUSH_INT value`
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        self.op_imm(Opcode::PushInt, value as u32)
    }

    /// Emit `PUSH_FLOAT value`
    pub fn push_float(&mut self, value: f32) -> &mut Self {
        self.op_imm(Opcode::PushFloat, value.to_bits())
    }

    /// Emit `PUSH_STR text`
    pub fn push_str(&mut self, text: &str) -> Result<&mut Self> {
        self.op_cstr(Opcode::PushStr, text)
    }

    /// Emit `CALL_NATIVE name`
    pub fn call_native(&mut self, name: &str) -> Result<&mut Self> {
        self.op_cstr(Opcode::CallNative, name)
    }

    /// Emit a jump with an explicit byte delta
    pub fn jump_raw(&mut self, opcode: Opcode, delta: i32) -> &mut Self {
        debug_assert!(opcode.is_jump());
        self.op_imm(opcode, delta as u32)
    }

    /// Allocate an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current offset
    pub fn bind(&mut self, label: Label) -> &mut Self {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.code.len());
        }
        self
    }

    /// Emit a jump to a label
    pub fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        debug_assert!(opcode.is_jump());
        self.fixups.push((self.code.len(), label));
        self.op_imm(opcode, 0)
    }

    /// Emit `HALT`
    pub fn halt(&mut self) -> &mut Self {
        self.op(Opcode::Halt)
    }

    /// Patch label references and return the encoded buffer
    pub fn build(mut self) -> Result<Vec<u8>> {
        for &(at, label) in &self.fixups {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or(BytecodeError::UnboundLabel(label.0))?;
            let base = at as i64 + i64::from(IMM32_INSTRUCTION_SIZE);
            let delta = i32::try_from(target as i64 - base)
                .map_err(|_| BytecodeError::JumpOutOfRange { from: at, to: target })?;
            self.code[at + 1..at + 5].copy_from_slice(&delta.to_le_bytes());
        }
        Ok(self.code)
    }

    fn op_imm(&mut self, opcode: Opcode, imm: u32) -> &mut Self {
        self.code.push(opcode.to_byte());
        self.code.extend_from_slice(&imm.to_le_bytes());
        self
    }

    fn op_cstr(&mut self, opcode: Opcode, text: &str) -> Result<&mut Self> {
        if text.as_bytes().contains(&0) {
            return Err(BytecodeError::InteriorNul(text.to_string()));
        }
        self.code.push(opcode.to_byte());
        self.code.extend_from_slice(text.as_bytes());
        self.code.push(0);
        Ok(self)
    }
}
