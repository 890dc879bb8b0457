//! Decoded instructions
//!
//! An [`Instruction`] is a view over one encoded instruction: its opcode, its
//! operands and where it lives in the buffer. Instructions are recomputed by
//! decoding whenever they are needed and are never stored alongside bytecode.

use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::error::{BytecodeError, Result};
use crate::opcode::{OperandKind, Opcode};

/// Size of an instruction carrying a 4-byte immediate
pub const IMM32_INSTRUCTION_SIZE: u32 = 5;

/// A single decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Operation
    pub opcode: Opcode,
    /// Numeric operands (at most one for the current opcode set)
    pub operands: SmallVec<[u32; 1]>,
    /// Inline string operand for `CALL_NATIVE` / `PUSH_STR`
    pub text: Option<String>,
    /// Byte offset of the opcode
    pub address: u32,
    /// Encoded length in bytes
    pub size: u32,
}

impl Instruction {
    /// Instruction without operands
    pub fn new(opcode: Opcode, address: u32) -> Self {
        Self {
            opcode,
            operands: SmallVec::new(),
            text: None,
            address,
            size: 1,
        }
    }

    /// Instruction with a 4-byte immediate
    pub fn with_imm(opcode: Opcode, imm: u32, address: u32) -> Self {
        let mut operands = SmallVec::new();
        operands.push(imm);
        Self {
            opcode,
            operands,
            text: None,
            address,
            size: IMM32_INSTRUCTION_SIZE,
        }
    }

    /// Instruction with an inline string
    pub fn with_text(opcode: Opcode, text: impl Into<String>, address: u32) -> Self {
        let text = text.into();
        let size = 2 + text.len() as u32;
        Self {
            opcode,
            operands: SmallVec::new(),
            text: Some(text),
            address,
            size,
        }
    }

    /// `PUSH_INT value`
    pub fn push_int(value: i32, address: u32) -> Self {
        Self::with_imm(Opcode::PushInt, value as u32, address)
    }

    /// Jump at `address` whose destination is the absolute offset `target`.
    ///
    /// Returns `None` when the distance does not fit in a signed 32-bit delta.
    pub fn jump_to(opcode: Opcode, address: u32, target: u32) -> Option<Self> {
        let delta = jump_delta_between(address, target)?;
        Some(Self::with_imm(opcode, delta as u32, address))
    }

    /// First numeric operand
    #[inline]
    pub fn imm(&self) -> Option<u32> {
        self.operands.first().copied()
    }

    /// Integer pushed by a `PUSH_INT`
    pub fn int_value(&self) -> Option<i32> {
        match self.opcode {
            Opcode::PushInt => self.imm().map(|v| v as i32),
            _ => None,
        }
    }

    /// Signed byte delta of a jump, relative to the end of the instruction
    pub fn jump_delta(&self) -> Option<i32> {
        if self.opcode.is_jump() {
            self.imm().map(|v| v as i32)
        } else {
            None
        }
    }

    /// Absolute destination of a jump.
    ///
    /// `None` for non-jumps and for deltas that point before offset 0.
    pub fn jump_target(&self) -> Option<u32> {
        let delta = self.jump_delta()?;
        let target = i64::from(self.next_address()) + i64::from(delta);
        u32::try_from(target).ok()
    }

    /// Every address control may transfer to besides fall-through
    pub fn jump_targets(&self) -> SmallVec<[u32; 1]> {
        self.jump_target().into_iter().collect()
    }

    /// Rewrite the delta so the jump lands on `target` from its current address
    pub fn set_jump_target(&mut self, target: u32) -> bool {
        if !self.opcode.is_jump() {
            return false;
        }
        match jump_delta_between(self.address, target) {
            Some(delta) => {
                self.operands.clear();
                self.operands.push(delta as u32);
                true
            }
            None => false,
        }
    }

    /// Address of the following instruction
    #[inline]
    pub fn next_address(&self) -> u32 {
        self.address.saturating_add(self.size)
    }

    /// Any jump
    #[inline]
    pub fn is_jump(&self) -> bool {
        self.opcode.is_jump()
    }

    /// Jump taken only on a popped condition
    #[inline]
    pub fn is_conditional(&self) -> bool {
        self.opcode.is_conditional_jump()
    }

    /// Pushes or pops at least one value
    pub fn modifies_stack(&self) -> bool {
        self.opcode.stack_effect() != (0, 0)
    }

    /// Reads VM memory
    #[inline]
    pub fn reads_memory(&self) -> bool {
        self.opcode.reads_memory()
    }

    /// Writes VM memory
    #[inline]
    pub fn writes_memory(&self) -> bool {
        self.opcode.writes_memory()
    }

    /// Length of the encoded form
    pub fn encoded_len(&self) -> u32 {
        match self.opcode.operand_kind() {
            OperandKind::None => 1,
            OperandKind::Imm32 => IMM32_INSTRUCTION_SIZE,
            OperandKind::CStr => 2 + self.text.as_deref().map_or(0, |t| t.len() as u32),
        }
    }

    /// Append the encoded form to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode.to_byte());
        match self.opcode.operand_kind() {
            OperandKind::None => {}
            OperandKind::Imm32 => out.extend_from_slice(&self.imm().unwrap_or(0).to_le_bytes()),
            OperandKind::CStr => {
                if let Some(text) = &self.text {
                    out.extend_from_slice(text.as_bytes());
                }
                out.push(0);
            }
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}: {}", self.address, self.opcode)?;
        match self.opcode {
            Opcode::PushInt => write!(f, " {}", self.imm().unwrap_or(0) as i32),
            Opcode::PushFloat => write!(f, " {}", f32::from_bits(self.imm().unwrap_or(0))),
            Opcode::PushStr | Opcode::CallNative => {
                write!(f, " {:?}", self.text.as_deref().unwrap_or(""))
            }
            _ if self.is_jump() => match self.jump_target() {
                Some(target) => write!(f, " {:+} -> {:04}", self.jump_delta().unwrap_or(0), target),
                None => write!(f, " {:+} -> <invalid>", self.jump_delta().unwrap_or(0)),
            },
            _ => Ok(()),
        }
    }
}

fn jump_delta_between(address: u32, target: u32) -> Option<i32> {
    let base = i64::from(address) + i64::from(IMM32_INSTRUCTION_SIZE);
    i32::try_from(i64::from(target) - base).ok()
}

/// Decode the instruction starting at `offset`
pub fn decode_at(bytes: &[u8], offset: usize) -> Result<Instruction> {
    let address = u32::try_from(offset).map_err(|_| BytecodeError::TooLarge(bytes.len()))?;
    let mut cursor = Cursor::at(bytes, offset);
    let byte = cursor.read_u8()?;
    let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode { byte, offset })?;

    let instruction = match opcode.operand_kind() {
        OperandKind::None => Instruction::new(opcode, address),
        OperandKind::Imm32 => {
            let imm = cursor.read_u32_le().map_err(|_| BytecodeError::Truncated {
                opcode: opcode.name(),
                offset,
            })?;
            Instruction::with_imm(opcode, imm, address)
        }
        OperandKind::CStr => {
            let text = cursor.read_cstr()?;
            Instruction::with_text(opcode, text, address)
        }
    };
    debug_assert_eq!(instruction.size as usize, cursor.position() - offset);
    Ok(instruction)
}

/// Iterator decoding a buffer front to back
pub struct Instructions<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        match decode_at(self.bytes, self.offset) {
            Ok(instruction) => {
                self.offset += instruction.size as usize;
                Some(Ok(instruction))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Lazily decode every instruction
pub fn instructions(bytes: &[u8]) -> Instructions<'_> {
    Instructions {
        bytes,
        offset: 0,
        failed: false,
    }
}

/// Decode the whole buffer; it must be consumed exactly
pub fn decode(bytes: &[u8]) -> Result<Vec<Instruction>> {
    if u32::try_from(bytes.len()).is_err() {
        return Err(BytecodeError::TooLarge(bytes.len()));
    }
    instructions(bytes).collect()
}

/// Encode a sequence of instructions back to bytes
pub fn encode(instructions: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::with_capacity(instructions.iter().map(|i| i.encoded_len() as usize).sum());
    for instruction in instructions {
        instruction.encode_into(&mut out);
    }
    out
}
