//! Dead code elimination

use crate::error::OptimizeResult;
use crate::passes::PassOutcome;
use crate::program::{Program, reassemble};

/// Drop every instruction that no path from offset 0 reaches
pub fn eliminate_dead_code(bytes: &[u8]) -> OptimizeResult<PassOutcome> {
    let program = Program::decode(bytes)?;
    let reached = program.reachable();

    let kept: Vec<_> = program
        .instructions
        .iter()
        .filter(|i| reached.contains(&i.address))
        .cloned()
        .collect();

    let removed = program.instructions.len() - kept.len();
    if removed == 0 {
        return Ok(PassOutcome::unchanged(bytes));
    }
    tracing::debug!(removed, "dead code eliminated");

    Ok(PassOutcome {
        bytecode: reassemble(&kept)?,
        removed,
        ..PassOutcome::default()
    })
}
