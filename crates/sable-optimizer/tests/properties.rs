//! Optimizer properties checked against the interpreter

use proptest::prelude::*;
use sable_bytecode::{BytecodeBuilder, Opcode, decode};
use sable_compiler::compile;
use sable_optimizer::passes::peephole;
use sable_optimizer::{BytecodeOptimizer, OptimizationLevel};
use sable_vm::Vm;

// ============================================================================
// Helpers
// ============================================================================

/// One step of a generated program
#[derive(Debug, Clone)]
enum Step {
    Push(i32),
    Binary(Opcode),
    Not,
    Dup,
    Pop,
    Nop,
    /// `PUSH cond; JZ skip; PUSH x; POP; skip:`
    SkipIfZero(i32, i32),
    /// `JMP skip; PUSH x; skip:`
    JumpOver(i32),
    /// Emitted whatever the depth, so it may underflow
    Unchecked(Opcode),
    /// `JMP dup; PUSH x; dup: DUP; POP`, underflowing on an empty stack
    JumpToDup(i32),
}

fn step() -> impl Strategy<Value = Step> {
    let binary = prop::sample::select(vec![
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::And,
        Opcode::Or,
        Opcode::CmpEq,
        Opcode::CmpGt,
    ]);
    prop_oneof![
        4 => (-20i32..20).prop_map(Step::Push),
        3 => binary.prop_map(Step::Binary),
        1 => Just(Step::Not),
        1 => Just(Step::Dup),
        1 => Just(Step::Pop),
        1 => Just(Step::Nop),
        1 => (-2i32..2, -5i32..5).prop_map(|(c, x)| Step::SkipIfZero(c, x)),
        1 => (-5i32..5).prop_map(Step::JumpOver),
        1 => prop::sample::select(vec![Opcode::Pop, Opcode::Dup, Opcode::Not, Opcode::Add])
            .prop_map(Step::Unchecked),
        1 => (-5i32..5).prop_map(Step::JumpToDup),
    ]
}

/// Assemble steps. Checked steps are skipped where they would underflow;
/// `Unchecked` and `JumpToDup` are always emitted.
fn assemble(steps: &[Step]) -> Vec<u8> {
    let mut b = BytecodeBuilder::new();
    let mut depth = 0usize;
    for step in steps {
        match *step {
            Step::Push(v) => {
                b.push_int(v);
                depth += 1;
            }
            Step::Binary(op) if depth >= 2 => {
                b.op(op);
                depth -= 1;
            }
            Step::Not if depth >= 1 => {
                b.op(Opcode::Not);
            }
            Step::Dup if depth >= 1 => {
                b.op(Opcode::Dup);
                depth += 1;
            }
            Step::Pop if depth >= 1 => {
                b.op(Opcode::Pop);
                depth -= 1;
            }
            Step::Nop => {
                b.op(Opcode::Nop);
            }
            Step::SkipIfZero(cond, x) => {
                let skip = b.new_label();
                b.push_int(cond)
                    .jump(Opcode::JmpIfZero, skip)
                    .push_int(x)
                    .op(Opcode::Pop)
                    .bind(skip);
            }
            Step::JumpOver(x) => {
                let skip = b.new_label();
                b.jump(Opcode::Jmp, skip).push_int(x).bind(skip);
            }
            Step::Unchecked(op) => {
                b.op(op);
                let (pops, pushes) = op.stack_effect();
                depth = depth.saturating_sub(pops as usize) + pushes as usize;
            }
            Step::JumpToDup(x) => {
                let dup = b.new_label();
                b.jump(Opcode::Jmp, dup)
                    .push_int(x)
                    .bind(dup)
                    .op(Opcode::Dup)
                    .op(Opcode::Pop);
            }
            _ => {}
        }
    }
    b.halt();
    b.build().unwrap()
}

fn run(code: &[u8]) -> Option<Vec<i32>> {
    let mut vm = Vm::new();
    vm.run(code).then(|| vm.stack_values())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn none_level_is_identity(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut optimizer = BytecodeOptimizer::new();
        prop_assert_eq!(optimizer.optimize(&bytes, OptimizationLevel::None), bytes);
    }

    #[test]
    fn optimized_programs_behave_the_same(steps in prop::collection::vec(step(), 0..40)) {
        let code = assemble(&steps);
        let expected = run(&code);
        let mut optimizer = BytecodeOptimizer::new();
        for level in OptimizationLevel::ALL {
            let optimized = optimizer.optimize(&code, level);
            prop_assert!(optimized.len() <= code.len());
            prop_assert_eq!(run(&optimized), expected.clone(), "level {}", level);
        }
    }

    #[test]
    fn failing_programs_still_fail(steps in prop::collection::vec(step(), 0..40)) {
        let code = assemble(&steps);
        if run(&code).is_none() {
            let mut optimizer = BytecodeOptimizer::new();
            for level in OptimizationLevel::ALL {
                prop_assert_eq!(run(&optimizer.optimize(&code, level)), None, "level {}", level);
            }
        }
    }

    #[test]
    fn peephole_is_idempotent(steps in prop::collection::vec(step(), 0..40)) {
        let once = peephole(&assemble(&steps)).unwrap().bytecode;
        let twice = peephole(&once).unwrap();
        prop_assert!(!twice.changed());
        prop_assert_eq!(twice.bytecode, once);
    }
}

// ============================================================================
// Pipeline with the compiler
// ============================================================================

#[test]
fn test_compiled_expression_folds_to_one_push() {
    let code = compile("3 + 4 * 2").unwrap();
    let mut optimizer = BytecodeOptimizer::new();
    let optimized = optimizer.optimize(&code, OptimizationLevel::Aggressive);
    let decoded = decode(&optimized).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].int_value(), Some(11));
    assert_eq!(run(&optimized), Some(vec![11]));
}

#[test]
fn test_zero_modulus_is_not_folded() {
    let code = compile("5 % 0").unwrap();
    let mut optimizer = BytecodeOptimizer::new();
    let optimized = optimizer.optimize(&code, OptimizationLevel::Aggressive);
    let opcodes: Vec<_> = decode(&optimized).unwrap().iter().map(|i| i.opcode).collect();
    assert!(opcodes.contains(&Opcode::Mod));
    assert_eq!(optimizer.last_stats().constants_folded, 0);
    assert_eq!(run(&optimized), None);
}

#[test]
fn test_underflow_behind_jump_still_fails() {
    let code = assemble(&[Step::JumpToDup(5)]);
    assert_eq!(run(&code), None);
    let mut optimizer = BytecodeOptimizer::new();
    for level in OptimizationLevel::ALL {
        assert_eq!(optimizer.optimize(&code, level), code, "level {level}");
        assert_eq!(run(&peephole(&code).unwrap().bytecode), None);
    }
}

#[test]
fn test_native_call_survives_optimization() {
    let code = compile("Tick()").unwrap();
    let mut optimizer = BytecodeOptimizer::new();
    assert_eq!(optimizer.optimize(&code, OptimizationLevel::Aggressive), code);
}
