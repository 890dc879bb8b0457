//! Stack-operation cleanup
//!
//! Removes values that are pushed and immediately discarded. Unlike the
//! peephole table, `DUP; POP` is only dropped when stack simulation proves
//! the `DUP` had something to copy, so a failing program keeps failing.

use sable_bytecode::{Instruction, Opcode};

use crate::analysis::stack_states;
use crate::error::OptimizeResult;
use crate::passes::PassOutcome;
use crate::program::{Program, reassemble, targets_inside};

/// Remove push/pop and dup/pop pairs whose value is never observed
pub fn optimize_stack_operations(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    let program = Program::decode(bytes)?;
    let targets = program.jump_targets();
    let states = stack_states(&program);

    let mut out: Vec<Instruction> = Vec::with_capacity(program.instructions.len());
    let mut removed = 0;

    for instruction in &program.instructions {
        if instruction.opcode == Opcode::Pop
            && let Some(producer) = out.last()
            && !targets_inside(&targets, producer.address, instruction.address)
        {
            let discardable = match producer.opcode {
                Opcode::PushInt | Opcode::PushFloat => true,
                Opcode::Dup => states
                    .get(&producer.address)
                    .is_some_and(|s| s.is_valid && s.depth() >= 1),
                _ => false,
            };
            if discardable {
                out.pop();
                removed += 2;
                continue;
            }
        }
        out.push(instruction.clone());
    }

    if removed == 0 {
        return Ok(PassOutcome::unchanged(bytes));
    }
    tracing::debug!(removed, "stack operations removed");

    Ok(PassOutcome {
        bytecode: reassemble(&out)?,
        removed,
        ..PassOutcome::default()
    })
}
