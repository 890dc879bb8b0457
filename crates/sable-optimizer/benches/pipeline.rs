//! Optimizer Pipeline Benchmarks
//!
//! Measures each optimization level on compiled expressions and on a
//! branch-heavy program with dead code.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use sable_bytecode::{BytecodeBuilder, Opcode};
use sable_compiler::compile;
use sable_optimizer::{BytecodeOptimizer, OptimizationLevel, analyze_stack_states};

/// Long constant expression: every operator is foldable
fn arithmetic_chain() -> Vec<u8> {
    let source = (1..=64)
        .map(|n| format!("({n} * 3 + {n}) % 7"))
        .collect::<Vec<_>>()
        .join(" + ");
    compile(&source).expect("benchmark expression compiles")
}

/// Constant branches, jump chains and dead pushes
fn branchy_program() -> Vec<u8> {
    let mut b = BytecodeBuilder::new();
    for round in 0..64 {
        let skip = b.new_label();
        let hop = b.new_label();
        b.push_int(round % 2)
            .jump(Opcode::JmpIfZero, hop)
            .push_int(round)
            .op(Opcode::Pop)
            .bind(hop)
            .jump(Opcode::Jmp, skip)
            .push_int(-1)
            .op(Opcode::Nop)
            .bind(skip)
            .op(Opcode::Nop);
    }
    b.push_int(0).halt();
    b.build().expect("benchmark program builds")
}

fn bench_levels(c: &mut Criterion) {
    let programs = [("arithmetic", arithmetic_chain()), ("branchy", branchy_program())];

    for (name, code) in &programs {
        let mut group = c.benchmark_group(format!("optimize_{name}"));
        for level in OptimizationLevel::ALL {
            group.bench_function(level.as_str(), |b| {
                let mut optimizer = BytecodeOptimizer::new();
                b.iter(|| optimizer.optimize(black_box(code), level))
            });
        }
        group.finish();
    }
}

fn bench_stack_analysis(c: &mut Criterion) {
    let code = branchy_program();
    c.bench_function("analyze_stack_states", |b| {
        b.iter(|| analyze_stack_states(black_box(&code)))
    });
}

criterion_group!(benches, bench_levels, bench_stack_analysis);
criterion_main!(benches);
