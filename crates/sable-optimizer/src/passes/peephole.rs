//! Peephole optimization over a table of rewrite rules

use std::collections::{BTreeMap, BTreeSet};

use sable_bytecode::{Instruction, Opcode};

use crate::analysis::stack_states;
use crate::constant::StackState;
use crate::error::OptimizeResult;
use crate::passes::PassOutcome;
use crate::program::{Program, reassemble, targets_inside};

/// `pattern` is rewritten to `replacement` (operand-less opcodes only)
#[derive(Debug, Clone, Copy)]
pub struct PeepholeRule {
    /// Opcodes to match, in order
    pub pattern: &'static [Opcode],
    /// Opcodes emitted instead
    pub replacement: &'static [Opcode],
    /// Only rewrite where the stack provably holds a value on entry
    pub needs_operand: bool,
    /// Human-readable summary
    pub description: &'static str,
}

/// Rules tried in order at each position; the first match wins
pub const PEEPHOLE_RULES: &[PeepholeRule] = &[
    PeepholeRule {
        pattern: &[Opcode::PushInt, Opcode::Pop],
        replacement: &[],
        needs_operand: false,
        description: "integer pushed then discarded",
    },
    PeepholeRule {
        pattern: &[Opcode::PushFloat, Opcode::Pop],
        replacement: &[],
        needs_operand: false,
        description: "float pushed then discarded",
    },
    PeepholeRule {
        pattern: &[Opcode::Dup, Opcode::Pop],
        replacement: &[],
        needs_operand: true,
        description: "duplicate discarded",
    },
    PeepholeRule {
        pattern: &[Opcode::Not, Opcode::Not, Opcode::Not],
        replacement: &[Opcode::Not],
        needs_operand: false,
        description: "triple negation",
    },
    PeepholeRule {
        pattern: &[Opcode::Nop],
        replacement: &[],
        needs_operand: false,
        description: "no-op",
    },
];

/// Apply [`PEEPHOLE_RULES`] until nothing matches.
///
/// Running to a fixpoint makes the pass idempotent: a second application
/// never finds anything left to rewrite.
pub fn peephole(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    rewrite_with(bytes, PEEPHOLE_RULES)
}

/// Strip `NOP`s only
pub fn remove_nops(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    const NOP_ONLY: &[PeepholeRule] = &[PeepholeRule {
        pattern: &[Opcode::Nop],
        replacement: &[],
        needs_operand: false,
        description: "no-op",
    }];
    rewrite_with(bytes, NOP_ONLY)
}

fn rewrite_with(bytes: &[u8], rules: &[PeepholeRule]) -> OptimizeResult<PassOutcome> {
    let program = Program::decode(bytes)?;
    let targets = program.jump_targets();
    // rewrites keep original addresses and never change the depth at a
    // surviving instruction, so the entry states stay valid across sweeps
    let states = if rules.iter().any(|r| r.needs_operand) {
        stack_states(&program)
    } else {
        BTreeMap::new()
    };

    let mut current = program.instructions;
    let mut removed = 0;
    let mut combined = 0;

    loop {
        let (next, stats) = rewrite_once(&current, &targets, &states, rules);
        if stats == (0, 0) {
            break;
        }
        removed += stats.0;
        combined += stats.1;
        current = next;
    }

    if removed + combined == 0 {
        return Ok(PassOutcome::unchanged(bytes));
    }
    tracing::debug!(removed, combined, "peephole rewrites applied");

    Ok(PassOutcome {
        bytecode: reassemble(&current)?,
        removed,
        combined,
        ..PassOutcome::default()
    })
}

/// One left-to-right sweep. Returns the rewritten stream and
/// `(instructions removed, instructions combined)`.
fn rewrite_once(
    instructions: &[Instruction],
    targets: &BTreeSet<u32>,
    states: &BTreeMap<u32, StackState>,
    rules: &[PeepholeRule],
) -> (Vec<Instruction>, (usize, usize)) {
    let mut out = Vec::with_capacity(instructions.len());
    let mut removed = 0;
    let mut combined = 0;
    let mut i = 0;

    'scan: while i < instructions.len() {
        for rule in rules {
            let Some(window) = instructions.get(i..i + rule.pattern.len()) else {
                continue;
            };
            let matches = window
                .iter()
                .zip(rule.pattern)
                .all(|(ins, op)| ins.opcode == *op);
            let first = window[0].address;
            let last = window[window.len() - 1].address;
            if !matches || targets_inside(targets, first, last) {
                continue;
            }
            let has_operand = states
                .get(&first)
                .is_some_and(|s| s.is_valid && s.depth() >= 1);
            if rule.needs_operand && !has_operand {
                continue;
            }

            for (slot, opcode) in window.iter().zip(rule.replacement) {
                out.push(Instruction::new(*opcode, slot.address));
            }
            let shrink = rule.pattern.len() - rule.replacement.len();
            if rule.replacement.is_empty() {
                removed += shrink;
            } else {
                combined += shrink;
            }
            i += rule.pattern.len();
            continue 'scan;
        }
        out.push(instructions[i].clone());
        i += 1;
    }

    (out, (removed, combined))
}
