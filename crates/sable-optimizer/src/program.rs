//! Decoded program view and re-emission with address translation
//!
//! Passes work on decoded instructions that keep their *original* addresses,
//! and jumps keep targets expressed in original addresses. Only when a pass is
//! done does [`reassemble`] assign new addresses and recompute every jump
//! delta through an old-to-new translation map. A target whose instruction
//! was removed is forwarded to the next surviving instruction.

use std::collections::{BTreeMap, BTreeSet};

use sable_bytecode::{Instruction, Opcode, decode, encode};

use crate::error::{OptimizeError, OptimizeResult, ValidationError};

/// Decoded instructions plus the size of the buffer they came from
#[derive(Debug, Clone)]
pub struct Program {
    /// Instructions in address order
    pub instructions: Vec<Instruction>,
    /// Encoded length in bytes
    pub len: u32,
}

impl Program {
    /// Decode a buffer.
    ///
    /// Every jump must land on an instruction start or at the end of the
    /// buffer, so a pass never sees a target it could forward elsewhere.
    pub fn decode(bytes: &[u8]) -> OptimizeResult<Self> {
        let instructions = decode(bytes)?;
        let len = bytes.len() as u32;
        let starts: BTreeSet<u32> = instructions.iter().map(|i| i.address).collect();
        for instruction in instructions.iter().filter(|i| i.is_jump()) {
            let target = instruction.jump_target();
            if !target.is_some_and(|t| t == len || starts.contains(&t)) {
                let delta = instruction.jump_delta().unwrap_or(0);
                return Err(ValidationError::InvalidJumpTarget {
                    address: instruction.address,
                    target: i64::from(instruction.next_address()) + i64::from(delta),
                }
                .into());
            }
        }
        Ok(Self { instructions, len })
    }

    /// Index of the instruction starting at `address`
    pub fn index_of(&self, address: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&address, |i| i.address)
            .ok()
    }

    /// Every address some jump lands on
    pub fn jump_targets(&self) -> BTreeSet<u32> {
        self.instructions
            .iter()
            .filter_map(Instruction::jump_target)
            .collect()
    }

    /// Addresses reachable from offset 0.
    ///
    /// Every jump target is followed, and every instruction except an
    /// unconditional `JMP` also falls through to its successor.
    pub fn reachable(&self) -> BTreeSet<u32> {
        let mut reached = BTreeSet::new();
        if self.instructions.is_empty() {
            return reached;
        }
        let mut worklist = vec![0u32];
        while let Some(address) = worklist.pop() {
            let Some(index) = self.index_of(address) else {
                continue;
            };
            if !reached.insert(address) {
                continue;
            }
            let instruction = &self.instructions[index];
            if let Some(target) = instruction.jump_target() {
                worklist.push(target);
            }
            let falls_through = instruction.opcode != Opcode::Jmp;
            if let Some(next) = self.instructions.get(index + 1).filter(|_| falls_through) {
                worklist.push(next.address);
            }
        }
        reached
    }
}

/// True if a jump lands strictly inside `(first, last]`.
///
/// Rewriting a window is only safe when control can enter it at its first
/// instruction alone.
pub fn targets_inside(targets: &BTreeSet<u32>, first: u32, last: u32) -> bool {
    first < last && targets.range(first + 1..=last).next().is_some()
}

/// Encode `kept` (ascending original addresses) with fresh addresses and
/// retargeted jumps.
pub fn reassemble(kept: &[Instruction]) -> OptimizeResult<Vec<u8>> {
    let mut translation = BTreeMap::new();
    let mut next = 0u32;
    for instruction in kept {
        if translation.insert(instruction.address, next).is_some() {
            return Err(OptimizeError::internal(
                "reassemble",
                format!("duplicate address {}", instruction.address),
            ));
        }
        next += instruction.encoded_len();
    }
    let end = next;

    let translate = |old: u32| -> u32 {
        translation
            .range(old..)
            .next()
            .map_or(end, |(_, &new)| new)
    };

    let mut out = Vec::with_capacity(kept.len());
    for instruction in kept {
        let mut moved = instruction.clone();
        moved.address = translate(instruction.address);
        moved.size = instruction.encoded_len();
        if let Some(old_target) = instruction.jump_target() {
            let target = translate(old_target);
            if !moved.set_jump_target(target) {
                return Err(OptimizeError::JumpOutOfRange {
                    address: moved.address,
                    target,
                });
            }
        }
        out.push(moved);
    }

    Ok(encode(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_bytecode::BytecodeBuilder;

    #[test]
    fn test_reassemble_forwards_removed_targets() {
        // 0: JMP -> 10, 5: PUSH 1, 10: PUSH 2, 15: HALT
        let mut b = BytecodeBuilder::new();
        let target = b.new_label();
        b.jump(Opcode::Jmp, target).push_int(1).bind(target).push_int(2).halt();
        let program = Program::decode(&b.build().unwrap()).unwrap();

        // drop PUSH 1 and PUSH 2; the jump must now land on HALT
        let kept = vec![program.instructions[0].clone(), program.instructions[3].clone()];
        let bytes = reassemble(&kept).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded[0].jump_target(), Some(5));
        assert_eq!(decoded[1].opcode, Opcode::Halt);
    }

    #[test]
    fn test_backward_jump_retargeted() {
        let mut b = BytecodeBuilder::new();
        let top = b.new_label();
        b.op(Opcode::Nop).bind(top).push_int(1).op(Opcode::Pop).jump(Opcode::Jmp, top);
        let program = Program::decode(&b.build().unwrap()).unwrap();
        let kept: Vec<_> = program.instructions[1..].to_vec();
        let decoded = decode(&reassemble(&kept).unwrap()).unwrap();
        assert_eq!(decoded[2].jump_target(), Some(0));
    }

    #[test]
    fn test_reachability_follows_both_edges() {
        let mut b = BytecodeBuilder::new();
        let skip = b.new_label();
        let dead = b.new_label();
        b.push_int(1)
            .jump(Opcode::JmpIfZero, skip)
            .jump(Opcode::Jmp, dead)
            .push_int(9)
            .bind(skip)
            .bind(dead)
            .halt();
        let program = Program::decode(&b.build().unwrap()).unwrap();
        let reached = program.reachable();
        assert!(reached.contains(&0));
        assert!(reached.contains(&5));
        assert!(reached.contains(&10));
        assert!(!reached.contains(&15));
        assert!(reached.contains(&20));
    }

    #[test]
    fn test_decode_rejects_jump_into_operand() {
        // 0: NOP, 1: PUSH 7, 6: JMP -> 2 (inside PUSH's operand), 11: HALT
        let mut b = BytecodeBuilder::new();
        b.op(Opcode::Nop).push_int(7).jump_raw(Opcode::Jmp, -9).halt();
        assert_eq!(
            Program::decode(&b.build().unwrap()).unwrap_err(),
            OptimizeError::Validation(ValidationError::InvalidJumpTarget { address: 6, target: 2 })
        );
    }

    #[test]
    fn test_decode_accepts_jump_to_end() {
        let mut b = BytecodeBuilder::new();
        b.push_int(1).jump_raw(Opcode::JmpIfZero, 0);
        let program = Program::decode(&b.build().unwrap()).unwrap();
        assert_eq!(program.instructions[1].jump_target(), Some(program.len));
    }

    #[test]
    fn test_targets_inside() {
        let targets: BTreeSet<u32> = [5, 20].into_iter().collect();
        assert!(targets_inside(&targets, 0, 5));
        assert!(!targets_inside(&targets, 5, 10));
        assert!(!targets_inside(&targets, 6, 19));
    }
}
