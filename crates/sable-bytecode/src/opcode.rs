//! Opcode set and operand layout

use serde::{Deserialize, Serialize};

/// Bytecode opcodes
///
/// Stack-based instruction set. Every instruction is one opcode byte followed
/// by the operand described by [`Opcode::operand_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Constants ====================
    /// Push a 32-bit integer immediate
    PushInt = 0x01,
    /// Push a 32-bit float immediate (raw bits)
    PushFloat = 0x02,
    /// Push an inline NUL-terminated string
    PushStr = 0x03,

    // ==================== Stack ====================
    /// Discard the top value
    Pop = 0x10,
    /// Duplicate the top value
    Dup = 0x11,

    // ==================== Arithmetic ====================
    /// lhs + rhs
    Add = 0x20,
    /// lhs - rhs
    Sub = 0x21,
    /// lhs * rhs
    Mul = 0x22,
    /// lhs / rhs (traps on zero)
    Div = 0x23,
    /// lhs % rhs (traps on zero)
    Mod = 0x24,

    // ==================== Logical ====================
    /// 1 if both operands are nonzero
    And = 0x30,
    /// 1 if either operand is nonzero
    Or = 0x31,
    /// 1 if the operand is zero
    Not = 0x32,

    // ==================== Comparison ====================
    /// 1 if lhs == rhs
    CmpEq = 0x38,
    /// 1 if lhs > rhs
    CmpGt = 0x39,

    // ==================== Control Flow ====================
    /// Unconditional jump by a signed byte delta
    Jmp = 0x40,
    /// Pop; jump if zero
    JmpIfZero = 0x41,
    /// Pop; jump if nonzero
    JmpIfNotZero = 0x42,

    // ==================== Native ====================
    /// Call a host-registered function by inline name
    CallNative = 0x50,

    // ==================== Memory ====================
    /// Pop an address, push the word stored there
    LoadMem = 0x60,
    /// Pop a value and an address, store the value
    StoreMem = 0x61,

    // ==================== VM Control ====================
    /// No operation
    Nop = 0x70,
    /// Stop execution successfully
    Halt = 0xFF,
}

/// Shape of the operand that follows an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Little-endian 4-byte immediate
    Imm32,
    /// NUL-terminated UTF-8 string
    CStr,
}

impl Opcode {
    /// All opcodes, in byte order
    pub const ALL: [Opcode; 23] = [
        Self::PushInt,
        Self::PushFloat,
        Self::PushStr,
        Self::Pop,
        Self::Dup,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::And,
        Self::Or,
        Self::Not,
        Self::CmpEq,
        Self::CmpGt,
        Self::Jmp,
        Self::JmpIfZero,
        Self::JmpIfNotZero,
        Self::CallNative,
        Self::LoadMem,
        Self::StoreMem,
        Self::Nop,
        Self::Halt,
    ];

    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::PushInt),
            0x02 => Some(Self::PushFloat),
            0x03 => Some(Self::PushStr),
            0x10 => Some(Self::Pop),
            0x11 => Some(Self::Dup),
            0x20 => Some(Self::Add),
            0x21 => Some(Self::Sub),
            0x22 => Some(Self::Mul),
            0x23 => Some(Self::Div),
            0x24 => Some(Self::Mod),
            0x30 => Some(Self::And),
            0x31 => Some(Self::Or),
            0x32 => Some(Self::Not),
            0x38 => Some(Self::CmpEq),
            0x39 => Some(Self::CmpGt),
            0x40 => Some(Self::Jmp),
            0x41 => Some(Self::JmpIfZero),
            0x42 => Some(Self::JmpIfNotZero),
            0x50 => Some(Self::CallNative),
            0x60 => Some(Self::LoadMem),
            0x61 => Some(Self::StoreMem),
            0x70 => Some(Self::Nop),
            0xFF => Some(Self::Halt),
            _ => None,
        }
    }

    /// Convert to raw byte
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Mnemonic used by the disassembler
    pub const fn name(self) -> &'static str {
        match self {
            Self::PushInt => "PUSH_INT",
            Self::PushFloat => "PUSH_FLOAT",
            Self::PushStr => "PUSH_STR",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::CmpEq => "CMP_EQ",
            Self::CmpGt => "CMP_GT",
            Self::Jmp => "JMP",
            Self::JmpIfZero => "JMP_IF_ZERO",
            Self::JmpIfNotZero => "JMP_IF_NOT_ZERO",
            Self::CallNative => "CALL_NATIVE",
            Self::LoadMem => "LOAD_MEM",
            Self::StoreMem => "STORE_MEM",
            Self::Nop => "NOP",
            Self::Halt => "HALT",
        }
    }

    /// Operand layout for this opcode
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            Self::PushInt | Self::PushFloat | Self::Jmp | Self::JmpIfZero | Self::JmpIfNotZero => {
                OperandKind::Imm32
            }
            Self::PushStr | Self::CallNative => OperandKind::CStr,
            _ => OperandKind::None,
        }
    }

    /// Any jump
    #[inline]
    pub const fn is_jump(self) -> bool {
        matches!(self, Self::Jmp | Self::JmpIfZero | Self::JmpIfNotZero)
    }

    /// Jump that pops a condition
    #[inline]
    pub const fn is_conditional_jump(self) -> bool {
        matches!(self, Self::JmpIfZero | Self::JmpIfNotZero)
    }

    /// Binary operator popping two values and pushing one
    #[inline]
    pub const fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::And
                | Self::Or
                | Self::CmpEq
                | Self::CmpGt
        )
    }

    /// Instruction pushes a value without popping anything
    #[inline]
    pub const fn is_pure_push(self) -> bool {
        matches!(self, Self::PushInt | Self::PushFloat | Self::PushStr)
    }

    /// Execution never falls through to the next instruction
    #[inline]
    pub const fn ends_flow(self) -> bool {
        matches!(self, Self::Jmp | Self::Halt)
    }

    /// Number of values popped and pushed
    pub const fn stack_effect(self) -> (u32, u32) {
        match self {
            Self::PushInt | Self::PushFloat | Self::PushStr => (0, 1),
            Self::Pop => (1, 0),
            Self::Dup => (1, 2),
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Mod
            | Self::And
            | Self::Or
            | Self::CmpEq
            | Self::CmpGt => (2, 1),
            Self::Not => (1, 1),
            Self::JmpIfZero | Self::JmpIfNotZero => (1, 0),
            Self::LoadMem => (1, 1),
            Self::StoreMem => (2, 0),
            Self::Jmp | Self::CallNative | Self::Nop | Self::Halt => (0, 0),
        }
    }

    /// Reads VM memory
    #[inline]
    pub const fn reads_memory(self) -> bool {
        matches!(self, Self::LoadMem)
    }

    /// Writes VM memory
    #[inline]
    pub const fn writes_memory(self) -> bool {
        matches!(self, Self::StoreMem)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
