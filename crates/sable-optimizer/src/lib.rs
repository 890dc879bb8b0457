//! # Sable Optimizer
//!
//! Bytecode-to-bytecode optimization and static analysis.
//!
//! [`BytecodeOptimizer::optimize`] runs the passes enabled by an
//! [`OptimizationLevel`] and validates the result. Anything that goes wrong
//! yields the original bytecode, so callers never see an optimizer error.
//!
//! Passes keep original addresses while rewriting and re-emit through an
//! old-to-new address map, so every jump delta stays correct when
//! instructions disappear.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod constant;
pub mod error;
pub mod level;
pub mod optimizer;
pub mod passes;
pub mod program;
pub mod stats;
pub mod validate;

pub use analysis::{
    BasicBlock, HOT_SPOT_THRESHOLD, analyze_stack_states, build_basic_blocks,
    estimate_execution_complexity, extract_string_constants, find_hot_spots, find_native_calls,
};
pub use constant::{ConstantValue, StackState};
pub use error::{OptimizeError, OptimizeResult, ValidationError};
pub use level::OptimizationLevel;
pub use optimizer::BytecodeOptimizer;
pub use passes::{PassInfo, PassOutcome};
pub use stats::OptimizationStats;
pub use validate::validate;
