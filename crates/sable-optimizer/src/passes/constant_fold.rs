//! Constant folding
//!
//! `PUSH_INT a; PUSH_INT b; op` becomes `PUSH_INT (a op b)` and
//! `PUSH_INT a; NOT` becomes `PUSH_INT !a`. The scan works on the tail of the
//! already rewritten output, so folds cascade: `1 2 + 3 *` collapses to a
//! single push. Zero divisors are never folded.

use sable_bytecode::{Instruction, Opcode};

use crate::constant::ConstantValue;
use crate::error::OptimizeResult;
use crate::passes::PassOutcome;
use crate::program::{Program, reassemble, targets_inside};

/// Evaluate constant arithmetic ahead of time
pub fn fold_constants(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    let program = Program::decode(bytes)?;
    let targets = program.jump_targets();

    let mut out: Vec<Instruction> = Vec::with_capacity(program.instructions.len());
    let mut folded = 0;
    let mut combined = 0;

    for instruction in &program.instructions {
        let opcode = instruction.opcode;

        if opcode.is_binary() && out.len() >= 2 {
            let lhs = &out[out.len() - 2];
            let rhs = &out[out.len() - 1];
            let value = ConstantValue::fold_binary(
                opcode,
                ConstantValue::from_instruction(lhs),
                ConstantValue::from_instruction(rhs),
            );
            if let Some(result) = value.as_int()
                && !targets_inside(&targets, lhs.address, instruction.address)
            {
                let start = lhs.address;
                out.truncate(out.len() - 2);
                out.push(Instruction::push_int(result, start));
                folded += 1;
                combined += 2;
                continue;
            }
        }

        if opcode == Opcode::Not
            && let Some(operand) = out.last()
            && let Some(result) =
                ConstantValue::fold_unary(opcode, ConstantValue::from_instruction(operand)).as_int()
            && !targets_inside(&targets, operand.address, instruction.address)
        {
            let start = operand.address;
            out.pop();
            out.push(Instruction::push_int(result, start));
            folded += 1;
            combined += 1;
            continue;
        }

        out.push(instruction.clone());
    }

    if folded == 0 {
        return Ok(PassOutcome::unchanged(bytes));
    }
    tracing::debug!(folded, "constants folded");

    Ok(PassOutcome {
        bytecode: reassemble(&out)?,
        combined,
        folded,
        ..PassOutcome::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_bytecode::{BytecodeBuilder, decode};

    fn ops(bytes: &[u8]) -> Vec<(Opcode, Option<i32>)> {
        decode(bytes)
            .unwrap()
            .iter()
            .map(|i| (i.opcode, i.int_value()))
            .collect()
    }

    #[test]
    fn test_simple_fold() {
        let mut b = BytecodeBuilder::new();
        b.push_int(3).push_int(4).op(Opcode::Add).halt();
        let outcome = fold_constants(&b.build().unwrap()).unwrap();
        assert_eq!(outcome.folded, 1);
        assert_eq!(ops(&outcome.bytecode), vec![(Opcode::PushInt, Some(7)), (Opcode::Halt, None)]);
    }

    #[test]
    fn test_cascading_fold() {
        // 3 4 2 * +
        let mut b = BytecodeBuilder::new();
        b.push_int(3)
            .push_int(4)
            .push_int(2)
            .op(Opcode::Mul)
            .op(Opcode::Add)
            .halt();
        let outcome = fold_constants(&b.build().unwrap()).unwrap();
        assert_eq!(outcome.folded, 2);
        assert_eq!(ops(&outcome.bytecode), vec![(Opcode::PushInt, Some(11)), (Opcode::Halt, None)]);
    }

    #[test]
    fn test_zero_divisor_left_alone() {
        let mut b = BytecodeBuilder::new();
        b.push_int(5).push_int(0).op(Opcode::Mod);
        let code = b.build().unwrap();
        let outcome = fold_constants(&code).unwrap();
        assert!(!outcome.changed());
        assert_eq!(outcome.bytecode, code);
    }

    #[test]
    fn test_not_folds() {
        let mut b = BytecodeBuilder::new();
        b.push_int(0).op(Opcode::Not).halt();
        let outcome = fold_constants(&b.build().unwrap()).unwrap();
        assert_eq!(ops(&outcome.bytecode)[0], (Opcode::PushInt, Some(1)));
    }

    #[test]
    fn test_jump_into_pattern_blocks_fold() {
        // a jump lands on the second push, so the pair cannot merge
        let mut b = BytecodeBuilder::new();
        let mid = b.new_label();
        b.push_int(0)
            .jump(Opcode::JmpIfZero, mid)
            .push_int(2)
            .bind(mid)
            .push_int(3)
            .op(Opcode::Add)
            .halt();
        let code = b.build().unwrap();
        let outcome = fold_constants(&code).unwrap();
        assert!(!outcome.changed());
        assert_eq!(outcome.bytecode, code);
    }

    #[test]
    fn test_jump_to_pattern_start_still_folds() {
        let mut b = BytecodeBuilder::new();
        let start = b.new_label();
        b.push_int(0)
            .jump(Opcode::JmpIfZero, start)
            .bind(start)
            .push_int(2)
            .push_int(3)
            .op(Opcode::Add)
            .halt();
        let outcome = fold_constants(&b.build().unwrap()).unwrap();
        assert_eq!(outcome.folded, 1);
        let decoded = decode(&outcome.bytecode).unwrap();
        assert_eq!(decoded[1].jump_target(), Some(decoded[2].address));
        assert_eq!(decoded[2].int_value(), Some(5));
    }

    #[test]
    fn test_float_operands_not_folded() {
        let mut b = BytecodeBuilder::new();
        b.push_float(1.5).push_int(2).op(Opcode::Add);
        assert!(!fold_constants(&b.build().unwrap()).unwrap().changed());
    }
}
