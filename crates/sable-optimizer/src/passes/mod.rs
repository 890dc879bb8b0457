//! Optimization passes
//!
//! Every pass takes encoded bytecode and returns new encoded bytecode plus the
//! counters it contributes to [`crate::OptimizationStats`]. Passes decode on
//! entry and re-emit through [`crate::program::reassemble`], so each one can be
//! used on its own (the JIT runs a subset of them).

mod branch_fold;
mod constant_fold;
mod dead_code;
mod jumps;
mod peephole;
mod stack_ops;

pub use branch_fold::fold_constant_branches;
pub use constant_fold::fold_constants;
pub use dead_code::eliminate_dead_code;
pub use jumps::optimize_jumps;
pub use peephole::{PEEPHOLE_RULES, PeepholeRule, peephole, remove_nops};
pub use stack_ops::optimize_stack_operations;

use crate::error::OptimizeResult;
use crate::level::OptimizationLevel;

/// Result of running one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Rewritten bytecode
    pub bytecode: Vec<u8>,
    /// Instructions deleted outright
    pub removed: usize,
    /// Instructions merged away
    pub combined: usize,
    /// Constant expressions evaluated
    pub folded: usize,
    /// Jumps retargeted, simplified or removed
    pub jumps: usize,
}

impl PassOutcome {
    /// Outcome for a pass that changed nothing
    pub fn unchanged(bytecode: &[u8]) -> Self {
        Self {
            bytecode: bytecode.to_vec(),
            ..Self::default()
        }
    }

    /// Whether any rewrite happened
    pub fn changed(&self) -> bool {
        self.removed + self.combined + self.folded + self.jumps > 0
    }
}

/// Signature shared by all passes
pub type PassFn = fn(&[u8]) -> OptimizeResult<PassOutcome>;

/// A pass and the lowest level that runs it
#[derive(Debug, Clone, Copy)]
pub struct PassInfo {
    /// Name reported in statistics
    pub name: &'static str,
    /// Implementation
    pub run: PassFn,
    /// Lowest level that enables the pass
    pub min_level: OptimizationLevel,
}

/// Passes in execution order
pub const PIPELINE: &[PassInfo] = &[
    PassInfo {
        name: "Branch Folding",
        run: fold_constant_branches,
        min_level: OptimizationLevel::Aggressive,
    },
    PassInfo {
        name: "Dead Code Elimination",
        run: eliminate_dead_code,
        min_level: OptimizationLevel::Basic,
    },
    PassInfo {
        name: "Constant Folding",
        run: fold_constants,
        min_level: OptimizationLevel::Basic,
    },
    PassInfo {
        name: "Stack Optimization",
        run: optimize_stack_operations,
        min_level: OptimizationLevel::Basic,
    },
    PassInfo {
        name: "Jump Optimization",
        run: optimize_jumps,
        min_level: OptimizationLevel::Medium,
    },
    PassInfo {
        name: "Peephole Optimization",
        run: peephole,
        min_level: OptimizationLevel::Medium,
    },
];

/// Passes enabled at `level`, in execution order
pub fn passes_for(level: OptimizationLevel) -> impl Iterator<Item = &'static PassInfo> {
    PIPELINE.iter().filter(move |p| level >= p.min_level)
}
