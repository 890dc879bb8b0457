//! Native execution checked against the interpreter

#![cfg(all(target_arch = "x86_64", unix))]

use proptest::prelude::*;
use std::ffi::c_void;
use std::ptr::null_mut;

use sable_bytecode::{BytecodeBuilder, Opcode};
use sable_compiler::compile;
use sable_jit::{ExecError, JitCompilationResult, JitCompiler, JitSettings};
use sable_vm::Vm;

// ============================================================================
// Helpers
// ============================================================================

fn jit_with(settings: JitSettings) -> JitCompiler {
    let jit = JitCompiler::new();
    assert!(jit.initialize(settings));
    jit
}

fn jit() -> JitCompiler {
    jit_with(JitSettings::default())
}

fn run_jit(jit: &JitCompiler, bytecode: &[u8]) -> Result<i32, ExecError> {
    let result = jit.compile(bytecode, "");
    assert!(result.success, "compile failed: {:?}", result.error_message);
    jit.try_execute(&result, null_mut(), null_mut())
}

fn call(jit: &JitCompiler, result: &JitCompilationResult) -> i32 {
    jit.execute(result, null_mut(), null_mut())
}

fn run_vm(bytecode: &[u8]) -> Option<i32> {
    let mut vm = Vm::new();
    if vm.run(bytecode) { Some(vm.top().unwrap_or(0)) } else { None }
}

fn expression() -> impl Strategy<Value = String> {
    let leaf = (0i32..100).prop_map(|n| n.to_string());
    leaf.prop_recursive(4, 32, 2, |inner| {
        (inner.clone(), prop::sample::select(vec!['+', '-', '*', '/', '%']), inner)
            .prop_map(|(lhs, op, rhs)| format!("({lhs} {op} {rhs})"))
    })
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_compiled_expressions() {
    let jit = jit();
    assert_eq!(run_jit(&jit, &compile("3 + 4 * 2").unwrap()), Ok(11));
    assert_eq!(run_jit(&jit, &compile("(1+2)*3").unwrap()), Ok(9));
    assert_eq!(run_jit(&jit, &compile("7 - 10").unwrap()), Ok(-3));
    assert_eq!(run_jit(&jit, &compile("17 % 5").unwrap()), Ok(2));
}

#[test]
fn test_division_by_zero_faults_and_recovers() {
    let jit = jit_with(JitSettings {
        enable_optimizations: false,
        ..JitSettings::default()
    });
    let mut b = BytecodeBuilder::new();
    b.push_int(1).push_int(0).op(Opcode::Div).halt();
    let faulty = jit.compile(&b.build().unwrap(), "faulty");
    assert_eq!(call(&jit, &faulty), -3);
    assert_eq!(jit.try_execute(&faulty, null_mut(), null_mut()), Err(ExecError::Fault));

    assert_eq!(run_jit(&jit, &compile("8 / 2").unwrap()), Ok(4));
}

#[test]
fn test_min_divided_by_minus_one_wraps() {
    let jit = jit_with(JitSettings {
        enable_optimizations: false,
        ..JitSettings::default()
    });
    let mut div = BytecodeBuilder::new();
    div.push_int(i32::MIN).push_int(-1).op(Opcode::Div).halt();
    assert_eq!(run_jit(&jit, &div.build().unwrap()), Ok(i32::MIN));

    let mut rem = BytecodeBuilder::new();
    rem.push_int(i32::MIN).push_int(-1).op(Opcode::Mod).halt();
    assert_eq!(run_jit(&jit, &rem.build().unwrap()), Ok(0));
}

#[test]
fn test_logic_and_comparisons() {
    let jit = jit_with(JitSettings {
        enable_optimizations: false,
        ..JitSettings::default()
    });
    let cases: [(i32, i32, Opcode, i32); 8] = [
        (5, 3, Opcode::CmpGt, 1),
        (3, 5, Opcode::CmpGt, 0),
        (4, 4, Opcode::CmpEq, 1),
        (4, -4, Opcode::CmpEq, 0),
        (2, 9, Opcode::And, 1),
        (0, 9, Opcode::And, 0),
        (0, 0, Opcode::Or, 0),
        (0, -7, Opcode::Or, 1),
    ];
    for (lhs, rhs, op, expected) in cases {
        let mut b = BytecodeBuilder::new();
        b.push_int(lhs).push_int(rhs).op(op).halt();
        assert_eq!(run_jit(&jit, &b.build().unwrap()), Ok(expected), "{lhs} {op} {rhs}");
    }

    let mut not = BytecodeBuilder::new();
    not.push_int(0).op(Opcode::Not).push_int(12).op(Opcode::Not).op(Opcode::Add).halt();
    assert_eq!(run_jit(&jit, &not.build().unwrap()), Ok(1));
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_countdown_loop() {
    let jit = jit_with(JitSettings {
        enable_optimizations: false,
        ..JitSettings::default()
    });
    let mut b = BytecodeBuilder::new();
    let top = b.new_label();
    b.push_int(100)
        .bind(top)
        .push_int(1)
        .op(Opcode::Sub)
        .op(Opcode::Dup)
        .jump(Opcode::JmpIfNotZero, top)
        .push_int(42)
        .op(Opcode::Add)
        .halt();
    let code = b.build().unwrap();
    assert_eq!(run_jit(&jit, &code), Ok(42));
    assert_eq!(run_vm(&code), Some(42));
}

#[test]
fn test_branch_selects_value() {
    for (condition, expected) in [(0, 20), (1, 10)] {
        let mut b = BytecodeBuilder::new();
        let other = b.new_label();
        let end = b.new_label();
        b.push_int(condition)
            .jump(Opcode::JmpIfZero, other)
            .push_int(10)
            .jump(Opcode::Jmp, end)
            .bind(other)
            .push_int(20)
            .bind(end)
            .halt();
        let code = b.build().unwrap();
        for level in 0..=3 {
            let jit = jit_with(JitSettings {
                optimization_level: level,
                ..JitSettings::default()
            });
            assert_eq!(run_jit(&jit, &code), Ok(expected));
        }
    }
}

#[test]
fn test_jump_into_operand_never_compiles() {
    // 0: NOP, 1: PUSH 7, 6: JMP -> 2, 11: HALT
    let mut b = BytecodeBuilder::new();
    b.op(Opcode::Nop).push_int(7).jump_raw(Opcode::Jmp, -9).halt();
    let code = b.build().unwrap();
    for enable_optimizations in [true, false] {
        for level in 0..=3 {
            let jit = jit_with(JitSettings {
                optimization_level: level,
                enable_optimizations,
                ..JitSettings::default()
            });
            let result = jit.compile(&code, "");
            assert!(!result.success, "level {level}");
            assert_eq!(
                result.error_message.as_deref(),
                Some("Translation failed: jump at offset 6 targets 2")
            );
            assert_eq!(call(&jit, &result), -1);
        }
    }
}

#[test]
fn test_running_off_the_end_returns_top() {
    let jit = jit();
    let mut b = BytecodeBuilder::new();
    b.push_int(5).push_int(6);
    assert_eq!(run_jit(&jit, &b.build().unwrap()), Ok(6));

    let mut empty = BytecodeBuilder::new();
    empty.op(Opcode::Nop);
    assert_eq!(run_jit(&jit, &empty.build().unwrap()), Ok(0));
}

#[test]
fn test_placeholders_keep_stack_shape() {
    let jit = jit_with(JitSettings {
        enable_optimizations: false,
        ..JitSettings::default()
    });
    let mut b = BytecodeBuilder::new();
    b.push_int(9);
    b.push_str("ignored").unwrap();
    b.op(Opcode::Pop);
    b.call_native("Anything").unwrap();
    b.push_int(0).op(Opcode::LoadMem).op(Opcode::Pop).halt();
    assert_eq!(run_jit(&jit, &b.build().unwrap()), Ok(9));
}

// ============================================================================
// Entry point
// ============================================================================

#[test]
fn test_context_and_args_reach_native_code_untouched() {
    let jit = jit_with(JitSettings {
        enable_optimizations: false,
        ..JitSettings::default()
    });
    let mut context = 0xC0FFEEu64;
    let mut args = [1i32, 2, 3];
    let context_ptr = (&mut context as *mut u64).cast::<c_void>();
    let args_ptr = args.as_mut_ptr().cast::<c_void>();

    let value = jit.compile(&compile("(20 - 6) * 3 % 5").unwrap(), "");
    assert_eq!(jit.execute(&value, context_ptr, args_ptr), 2);

    let mut b = BytecodeBuilder::new();
    b.push_int(4).push_int(0).op(Opcode::Mod).halt();
    let faulty = jit.compile(&b.build().unwrap(), "");
    assert_eq!(jit.try_execute(&faulty, context_ptr, args_ptr), Err(ExecError::Fault));

    assert_eq!(context, 0xC0FFEE);
    assert_eq!(args, [1, 2, 3]);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_overflow_keeps_only_newest() {
    let code = compile("1 + 2").unwrap();
    let size = jit().compile(&code, "").code_size;

    let jit = jit_with(JitSettings {
        max_code_cache_size: size + 1,
        ..JitSettings::default()
    });
    let first = jit.compile(&code, "first");
    let second = jit.compile(&code, "second");
    assert_eq!(jit.cached_names(), vec!["second".to_string()]);
    assert_eq!(jit.get_cache_size_bytes(), second.code_size);

    // evicted results stay usable through their own handle
    assert_eq!(call(&jit, &first), 3);
    let cached = jit.cache_get("second").unwrap();
    assert_eq!(call(&jit, &cached), 3);
}

#[test]
fn test_shared_between_threads() {
    let jit = std::sync::Arc::new(jit());
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let jit = std::sync::Arc::clone(&jit);
            std::thread::spawn(move || {
                let code = compile(&format!("{n} * 10 + 1")).unwrap();
                let result = jit.compile(&code, &format!("f{n}"));
                call(&jit, &result)
            })
        })
        .collect();
    let values: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(values, vec![1, 11, 21, 31]);
    assert_eq!(jit.cached_names().len(), 4);
}

// ============================================================================
// Agreement with the interpreter
// ============================================================================

proptest! {
    #[test]
    fn jit_agrees_with_interpreter(source in expression(), level in 0u8..=3) {
        let code = compile(&source).unwrap();
        let jit = jit_with(JitSettings {
            optimization_level: level,
            ..JitSettings::default()
        });
        let native = run_jit(&jit, &code);
        let interpreted = run_vm(&code);
        match interpreted {
            Some(value) => prop_assert_eq!(native, Ok(value), "{}", source),
            None => prop_assert_eq!(native, Err(ExecError::Fault), "{}", source),
        }
    }
}
