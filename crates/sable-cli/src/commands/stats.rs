//! `sable stats`

use anyhow::Result;
use sable_engine::{Engine, EngineConfig};
use sable_optimizer::{build_basic_blocks, estimate_execution_complexity, find_native_calls};

pub fn run(config: EngineConfig, expr: &str, json: bool) -> Result<()> {
    let engine = Engine::new(config);
    let bytecode = engine.compile(expr)?;
    let optimized = engine.optimize(&bytecode);
    let stats = engine.last_stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("level:                 {}", engine.config().optimization_level);
    println!("original size:         {}", stats.original_size);
    println!("optimized size:        {}", stats.optimized_size);
    println!("bytes saved:           {} ({:.1}%)", stats.bytes_saved(), (1.0 - stats.size_ratio()) * 100.0);
    println!("instructions removed:  {}", stats.instructions_removed);
    println!("instructions combined: {}", stats.instructions_combined);
    println!("constants folded:      {}", stats.constants_folded);
    println!("jumps optimized:       {}", stats.jumps_optimized);
    println!("time:                  {:.3} ms", stats.optimization_time_ms);
    if stats.fell_back {
        println!("fell back:             input kept");
    }
    if !stats.applied_optimizations.is_empty() {
        println!("passes:                {}", stats.applied_optimizations.join(", "));
    }

    println!(
        "complexity:            {:.1} -> {:.1}",
        estimate_execution_complexity(&bytecode)?,
        estimate_execution_complexity(&optimized)?
    );
    println!("basic blocks:          {}", build_basic_blocks(&optimized)?.len());
    for (address, name) in find_native_calls(&optimized) {
        println!("native call:           {name} at {address:04}");
    }
    Ok(())
}
