//! Per-run optimizer statistics

use serde::Serialize;

/// Counters for one `optimize` call; reset at entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationStats {
    /// Input size in bytes
    pub original_size: usize,
    /// Output size in bytes
    pub optimized_size: usize,
    /// Instructions deleted outright
    pub instructions_removed: usize,
    /// Instructions merged into fewer instructions
    pub instructions_combined: usize,
    /// Constant expressions evaluated ahead of time
    pub constants_folded: usize,
    /// Jumps retargeted, simplified or removed
    pub jumps_optimized: usize,
    /// Wall time spent in milliseconds
    pub optimization_time_ms: f64,
    /// Names of passes that changed the bytecode, in order
    pub applied_optimizations: Vec<String>,
    /// Output was discarded in favour of the input
    pub fell_back: bool,
}

impl OptimizationStats {
    /// Bytes saved
    pub fn bytes_saved(&self) -> usize {
        self.original_size.saturating_sub(self.optimized_size)
    }

    /// Output size relative to input size (1.0 when nothing changed)
    pub fn size_ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.optimized_size as f64 / self.original_size as f64
        }
    }

    pub(crate) fn record_pass(&mut self, name: &str) {
        if !self.applied_optimizations.iter().any(|n| n == name) {
            self.applied_optimizations.push(name.to_string());
        }
    }
}

impl std::fmt::Display for OptimizationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "size: {} -> {} bytes", self.original_size, self.optimized_size)?;
        writeln!(f, "instructions removed: {}", self.instructions_removed)?;
        writeln!(f, "instructions combined: {}", self.instructions_combined)?;
        writeln!(f, "constants folded: {}", self.constants_folded)?;
        writeln!(f, "jumps optimized: {}", self.jumps_optimized)?;
        writeln!(f, "time: {:.3} ms", self.optimization_time_ms)?;
        if self.fell_back {
            writeln!(f, "result discarded: validation failed")?;
        }
        write!(f, "passes: {}", self.applied_optimizations.join(", "))
    }
}
