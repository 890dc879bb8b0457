//! Pass pipeline driver

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::analysis::{HOT_SPOT_THRESHOLD, find_hot_spots};
use crate::error::OptimizeResult;
use crate::level::OptimizationLevel;
use crate::passes::{PassOutcome, passes_for};
use crate::stats::OptimizationStats;
use crate::validate::validate;

/// Upper bound on pipeline repetitions at [`OptimizationLevel::Aggressive`]
pub const MAX_AGGRESSIVE_ROUNDS: usize = 4;

/// Runs the pass pipeline and keeps statistics for the last run
#[derive(Debug, Default)]
pub struct BytecodeOptimizer {
    stats: OptimizationStats,
    execution_counts: BTreeMap<u32, u32>,
}

impl BytecodeOptimizer {
    /// Create an optimizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimize `bytecode` at `level`.
    ///
    /// Never fails: invalid input, a failing pass, or output that does not
    /// validate all yield a copy of the input, with `fell_back` set in
    /// [`Self::last_stats`].
    pub fn optimize(&mut self, bytecode: &[u8], level: OptimizationLevel) -> Vec<u8> {
        match self.try_optimize(bytecode, level) {
            Ok(optimized) => optimized,
            Err(error) => {
                warn!(%error, %level, "optimization abandoned, keeping original bytecode");
                self.stats = OptimizationStats {
                    original_size: bytecode.len(),
                    optimized_size: bytecode.len(),
                    optimization_time_ms: self.stats.optimization_time_ms,
                    fell_back: true,
                    ..OptimizationStats::default()
                };
                bytecode.to_vec()
            }
        }
    }

    /// Like [`Self::optimize`] but reports why the result was rejected
    pub fn try_optimize(
        &mut self,
        bytecode: &[u8],
        level: OptimizationLevel,
    ) -> OptimizeResult<Vec<u8>> {
        let started = Instant::now();
        self.stats = OptimizationStats {
            original_size: bytecode.len(),
            optimized_size: bytecode.len(),
            ..OptimizationStats::default()
        };

        let result = self.run_pipeline(bytecode, level);
        self.stats.optimization_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let optimized = result?;
        self.stats.optimized_size = optimized.len();
        debug!(
            %level,
            original = self.stats.original_size,
            optimized = self.stats.optimized_size,
            "bytecode optimized"
        );
        Ok(optimized)
    }

    fn run_pipeline(&mut self, bytecode: &[u8], level: OptimizationLevel) -> OptimizeResult<Vec<u8>> {
        if level == OptimizationLevel::None {
            return Ok(bytecode.to_vec());
        }
        validate(bytecode)?;

        let rounds = if level == OptimizationLevel::Aggressive {
            MAX_AGGRESSIVE_ROUNDS
        } else {
            1
        };

        let mut current = bytecode.to_vec();
        for round in 0..rounds {
            let mut changed = false;
            for pass in passes_for(level) {
                let outcome = (pass.run)(&current)?;
                if outcome.changed() {
                    debug!(pass = pass.name, round, size = outcome.bytecode.len(), "pass applied");
                    self.absorb(pass.name, &outcome);
                    changed = true;
                }
                current = outcome.bytecode;
            }
            if !changed {
                break;
            }
        }

        validate(&current)?;
        Ok(current)
    }

    fn absorb(&mut self, name: &str, outcome: &PassOutcome) {
        self.stats.instructions_removed += outcome.removed;
        self.stats.instructions_combined += outcome.combined;
        self.stats.constants_folded += outcome.folded;
        self.stats.jumps_optimized += outcome.jumps;
        self.stats.record_pass(name);
    }

    /// Statistics of the most recent call
    pub fn last_stats(&self) -> &OptimizationStats {
        &self.stats
    }

    /// Record per-address execution counts gathered by a profiler
    pub fn set_profiling_data(&mut self, execution_counts: BTreeMap<u32, u32>) {
        self.execution_counts = execution_counts;
    }

    /// Addresses whose recorded count exceeds the hot-spot threshold
    pub fn hot_spots(&self) -> Vec<u32> {
        find_hot_spots(&self.execution_counts, HOT_SPOT_THRESHOLD)
    }
}
