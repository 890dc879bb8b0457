//! Abstract values for constant tracking

use sable_bytecode::{Instruction, Opcode, eval_binary, eval_unary};

/// Statically known value of a stack slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    /// 32-bit integer
    Int32(i32),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// Not knowable at compile time
    Unknown,
}

impl ConstantValue {
    /// Whether the value is statically known
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Integer payload, if this is a known integer
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Value pushed by a constant instruction
    pub fn from_instruction(instruction: &Instruction) -> Self {
        match instruction.opcode {
            Opcode::PushInt => instruction.int_value().map_or(Self::Unknown, Self::Int32),
            Opcode::PushFloat => instruction
                .imm()
                .map_or(Self::Unknown, |bits| Self::Float32(f32::from_bits(bits))),
            _ => Self::Unknown,
        }
    }

    /// Result of a binary opcode.
    ///
    /// Only integer operands fold; the interpreter has no float arithmetic,
    /// so float operands and zero divisors give `Unknown`.
    pub fn fold_binary(opcode: Opcode, lhs: Self, rhs: Self) -> Self {
        match (lhs, rhs) {
            (Self::Int32(a), Self::Int32(b)) => eval_binary(opcode, a, b).map_or(Self::Unknown, Self::Int32),
            _ => Self::Unknown,
        }
    }

    /// Result of a unary opcode
    pub fn fold_unary(opcode: Opcode, value: Self) -> Self {
        match value {
            Self::Int32(v) => eval_unary(opcode, v).map_or(Self::Unknown, Self::Int32),
            _ => Self::Unknown,
        }
    }

    /// Least upper bound of two values reaching the same point
    pub fn merge(self, other: Self) -> Self {
        if self == other { self } else { Self::Unknown }
    }
}

/// Abstract stack contents at one program point
#[derive(Debug, Clone, PartialEq)]
pub struct StackState {
    /// Slots from bottom to top
    pub values: Vec<ConstantValue>,
    /// False once reasoning is no longer possible (underflow, depth mismatch)
    pub is_valid: bool,
}

impl Default for StackState {
    fn default() -> Self {
        Self::empty()
    }
}

impl StackState {
    /// Valid empty stack
    pub fn empty() -> Self {
        Self {
            values: Vec::new(),
            is_valid: true,
        }
    }

    /// Poisoned state
    pub fn invalid() -> Self {
        Self {
            values: Vec::new(),
            is_valid: false,
        }
    }

    /// Number of slots
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// Top slot
    pub fn top(&self) -> Option<ConstantValue> {
        self.values.last().copied()
    }

    /// State after executing `instruction`
    pub fn apply(&self, instruction: &Instruction) -> StackState {
        if !self.is_valid {
            return Self::invalid();
        }
        let mut next = self.clone();
        if next.step(instruction).is_none() {
            return Self::invalid();
        }
        next
    }

    fn step(&mut self, instruction: &Instruction) -> Option<()> {
        let values = &mut self.values;
        match instruction.opcode {
            Opcode::PushInt | Opcode::PushFloat => {
                values.push(ConstantValue::from_instruction(instruction));
            }
            Opcode::PushStr => values.push(ConstantValue::Unknown),
            Opcode::Pop | Opcode::JmpIfZero | Opcode::JmpIfNotZero => {
                values.pop()?;
            }
            Opcode::Dup => {
                let top = *values.last()?;
                values.push(top);
            }
            Opcode::Not => {
                let value = values.pop()?;
                values.push(ConstantValue::fold_unary(Opcode::Not, value));
            }
            Opcode::LoadMem => {
                values.pop()?;
                values.push(ConstantValue::Unknown);
            }
            Opcode::StoreMem => {
                values.pop()?;
                values.pop()?;
            }
            op if op.is_binary() => {
                let rhs = values.pop()?;
                let lhs = values.pop()?;
                values.push(ConstantValue::fold_binary(op, lhs, rhs));
            }
            _ => {}
        }
        Some(())
    }

    /// Combine with the state arriving over another edge.
    ///
    /// Returns true if `self` changed.
    pub fn merge_from(&mut self, other: &StackState) -> bool {
        if !self.is_valid {
            return false;
        }
        if !other.is_valid || other.values.len() != self.values.len() {
            *self = Self::invalid();
            return true;
        }
        let mut changed = false;
        for (mine, theirs) in self.values.iter_mut().zip(&other.values) {
            let merged = mine.merge(*theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        changed
    }
}
