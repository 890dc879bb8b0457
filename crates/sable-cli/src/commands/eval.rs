//! `sable eval`

use anyhow::Result;
use sable_engine::{Engine, EngineConfig};

pub fn run(config: EngineConfig, expr: &str) -> Result<()> {
    let engine = Engine::new(config);
    let report = engine.eval(expr)?;

    match report.value {
        Some(value) => println!("{value}"),
        None => println!("(empty stack)"),
    }
    eprintln!(
        "{} -> {} bytes, {}",
        report.bytecode_size,
        report.optimized_size,
        if report.used_jit { "native" } else { "interpreted" }
    );

    if engine.config().jit.enable_profiling {
        for (key, value) in engine.jit().profiling_data() {
            eprintln!("{key}: {value}");
        }
    }
    Ok(())
}
