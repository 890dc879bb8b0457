//! Self-validation applied to optimizer input and output

use std::collections::{BTreeMap, BTreeSet};

use sable_bytecode::{Instruction, decode};

use crate::error::ValidationError;

/// Run every check on an encoded buffer
pub fn validate(bytes: &[u8]) -> Result<(), ValidationError> {
    let instructions = decode(bytes)?;
    check_contiguity(&instructions, bytes.len())?;
    check_stack_balance(&instructions)?;
    check_jump_targets(&instructions)?;
    check_flow_stack(&instructions)?;
    Ok(())
}

/// Linear depth simulation: depth may end above zero but never drop below it
pub fn check_stack_balance(instructions: &[Instruction]) -> Result<(), ValidationError> {
    let mut depth: i64 = 0;
    for instruction in instructions {
        let (pops, pushes) = instruction.opcode.stack_effect();
        depth -= i64::from(pops);
        if depth < 0 {
            return Err(ValidationError::StackUnderflow(instruction.address));
        }
        depth += i64::from(pushes);
    }
    Ok(())
}

/// Depth never drops below zero on any control-flow path from offset 0.
///
/// Tracks the smallest depth each reachable instruction can be entered
/// with. Jumps must already have passed [`check_jump_targets`].
pub fn check_flow_stack(instructions: &[Instruction]) -> Result<(), ValidationError> {
    let mut lowest: BTreeMap<u32, u32> = BTreeMap::new();
    let mut worklist = Vec::new();
    if let Some(first) = instructions.first() {
        lowest.insert(first.address, 0);
        worklist.push(0usize);
    }

    while let Some(index) = worklist.pop() {
        let instruction = &instructions[index];
        let depth = lowest.get(&instruction.address).copied().unwrap_or_default();
        let (pops, pushes) = instruction.opcode.stack_effect();
        let after = depth
            .checked_sub(pops)
            .ok_or(ValidationError::StackUnderflow(instruction.address))?
            + pushes;

        let jump = instruction.jump_target();
        let fall = (!instruction.opcode.ends_flow()).then(|| instruction.next_address());
        for next in jump.into_iter().chain(fall) {
            let Ok(next_index) = instructions.binary_search_by_key(&next, |i| i.address) else {
                continue;
            };
            let lowered = lowest.get(&next).is_none_or(|&known| after < known);
            if lowered {
                lowest.insert(next, after);
                worklist.push(next_index);
            }
        }
    }
    Ok(())
}

/// Every jump lands on the start of a decoded instruction
pub fn check_jump_targets(instructions: &[Instruction]) -> Result<(), ValidationError> {
    let starts: BTreeSet<u32> = instructions.iter().map(|i| i.address).collect();
    for instruction in instructions.iter().filter(|i| i.is_jump()) {
        let delta = instruction.jump_delta().unwrap_or(0);
        let target = i64::from(instruction.next_address()) + i64::from(delta);
        let valid = u32::try_from(target).is_ok_and(|t| starts.contains(&t));
        if !valid {
            return Err(ValidationError::InvalidJumpTarget {
                address: instruction.address,
                target,
            });
        }
    }
    Ok(())
}

/// Addresses form a gapless, non-overlapping run that ends at `len`
pub fn check_contiguity(instructions: &[Instruction], len: usize) -> Result<(), ValidationError> {
    let mut expected = 0u32;
    for instruction in instructions {
        if instruction.address != expected {
            return Err(ValidationError::NonContiguous {
                address: instruction.address,
                expected,
            });
        }
        expected = instruction.next_address();
    }
    if expected as usize != len {
        return Err(ValidationError::NonContiguous {
            address: len as u32,
            expected,
        });
    }
    Ok(())
}
