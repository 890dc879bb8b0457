//! Constant branch folding
//!
//! `PUSH_INT c; JMP_IF_ZERO L` with a known `c` either always jumps (becomes
//! `JMP L`) or never jumps (both instructions disappear). Same for
//! `JMP_IF_NOT_ZERO`.

use sable_bytecode::{Instruction, Opcode};

use crate::error::{OptimizeError, OptimizeResult};
use crate::passes::PassOutcome;
use crate::program::{Program, reassemble, targets_inside};

/// Replace conditional jumps on constant conditions
pub fn fold_constant_branches(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    let program = Program::decode(bytes)?;
    let targets = program.jump_targets();

    let mut out: Vec<Instruction> = Vec::with_capacity(program.instructions.len());
    let mut jumps = 0;
    let mut removed = 0;
    let mut combined = 0;

    for instruction in &program.instructions {
        if instruction.is_conditional()
            && let Some(target) = instruction.jump_target()
            && let Some(condition) = out.last().and_then(Instruction::int_value)
            && let Some(push_address) = out.last().map(|p| p.address)
            && !targets_inside(&targets, push_address, instruction.address)
        {
            let taken = (condition == 0) == (instruction.opcode == Opcode::JmpIfZero);
            out.pop();
            jumps += 1;
            if taken {
                let jump = Instruction::jump_to(Opcode::Jmp, push_address, target).ok_or_else(|| {
                    OptimizeError::internal("branch folding", "jump distance overflow")
                })?;
                out.push(jump);
                combined += 1;
            } else {
                removed += 2;
            }
            continue;
        }
        out.push(instruction.clone());
    }

    if jumps == 0 {
        return Ok(PassOutcome::unchanged(bytes));
    }
    tracing::debug!(jumps, "constant branches folded");

    Ok(PassOutcome {
        bytecode: reassemble(&out)?,
        removed,
        combined,
        jumps,
        ..PassOutcome::default()
    })
}
