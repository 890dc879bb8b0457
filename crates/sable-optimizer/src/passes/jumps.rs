//! Jump optimization
//!
//! - Jump chains collapse: a jump whose destination is an unconditional
//!   `JMP` is retargeted to the end of the chain (cycles are left alone)
//! - Jumps that cannot be reached are deleted
//! - A `JMP` to the very next instruction is deleted; a conditional jump to
//!   the next instruction becomes a `POP`

use std::collections::{BTreeMap, BTreeSet};

use sable_bytecode::{Instruction, Opcode};

use crate::error::OptimizeResult;
use crate::passes::PassOutcome;
use crate::program::{Program, reassemble};

/// Final destination of a jump chain starting at `target`.
///
/// `jump_map` maps the address of every unconditional `JMP` to its target.
/// Returns `target` unchanged when the chain loops.
pub fn resolve_jump_chain(jump_map: &BTreeMap<u32, u32>, origin: u32, target: u32) -> u32 {
    let mut visited = BTreeSet::from([origin]);
    let mut current = target;
    while let Some(&next) = jump_map.get(&current) {
        if !visited.insert(current) {
            return target;
        }
        current = next;
    }
    current
}

/// Simplify jumps
pub fn optimize_jumps(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    let program = Program::decode(bytes)?;
    let reached = program.reachable();

    let jump_map: BTreeMap<u32, u32> = program
        .instructions
        .iter()
        .filter(|i| i.opcode == Opcode::Jmp)
        .filter_map(|i| i.jump_target().map(|t| (i.address, t)))
        .collect();

    let mut out: Vec<Instruction> = Vec::with_capacity(program.instructions.len());
    let mut jumps = 0;
    let mut removed = 0;

    for (index, instruction) in program.instructions.iter().enumerate() {
        let Some(target) = instruction.jump_target() else {
            out.push(instruction.clone());
            continue;
        };

        if !reached.contains(&instruction.address) {
            removed += 1;
            jumps += 1;
            continue;
        }

        let resolved = resolve_jump_chain(&jump_map, instruction.address, target);
        let mut rewritten = instruction.clone();
        if resolved != target && rewritten.set_jump_target(resolved) {
            jumps += 1;
        }

        let lands_on_next = program
            .instructions
            .get(index + 1)
            .is_some_and(|next| rewritten.jump_target() == Some(next.address));
        if lands_on_next {
            jumps += 1;
            if rewritten.is_conditional() {
                out.push(Instruction::new(Opcode::Pop, instruction.address));
            } else {
                removed += 1;
            }
            continue;
        }

        out.push(rewritten);
    }

    if jumps == 0 {
        return Ok(PassOutcome::unchanged(bytes));
    }
    tracing::debug!(jumps, removed, "jumps optimized");

    Ok(PassOutcome {
        bytecode: reassemble(&out)?,
        removed,
        jumps,
        ..PassOutcome::default()
    })
}
