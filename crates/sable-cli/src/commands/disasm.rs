//! `sable disasm`

use anyhow::Result;
use sable_bytecode::disassemble;
use sable_engine::{Engine, EngineConfig};

pub fn run(config: EngineConfig, expr: &str, native: bool) -> Result<()> {
    let engine = Engine::new(config);
    let bytecode = engine.compile(expr)?;
    let optimized = engine.optimize(&bytecode);

    println!("; compiled ({} bytes)", bytecode.len());
    print!("{}", disassemble(&bytecode));
    println!(
        "; optimized at {} ({} bytes)",
        engine.config().optimization_level,
        optimized.len()
    );
    print!("{}", disassemble(&optimized));

    if native {
        print_native(&engine, &optimized)?;
    }
    Ok(())
}

#[cfg(target_arch = "x86_64")]
fn print_native(engine: &Engine, bytecode: &[u8]) -> Result<()> {
    let result = engine.jit().compile(bytecode, "");
    if !result.success {
        anyhow::bail!(
            "JIT compilation failed: {}",
            result.error_message.unwrap_or_default()
        );
    }
    println!(
        "; native ({} bytes, checksum {:08X})",
        result.code_size, result.checksum
    );
    print!("{}", sable_jit::disassemble_native(&result.plain_code()));
    Ok(())
}

#[cfg(not(target_arch = "x86_64"))]
fn print_native(_engine: &Engine, _bytecode: &[u8]) -> Result<()> {
    anyhow::bail!("native disassembly is only available on x86-64")
}
