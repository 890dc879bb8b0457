//! Host context

use std::ptr;

use parking_lot::Mutex;
use tracing::{debug, warn};

use sable_bytecode::{Opcode, decode};
use sable_compiler::compile;
use sable_jit::depth::is_natively_supported;
use sable_jit::{ExecError, JitCompiler};
use sable_optimizer::{BytecodeOptimizer, OptimizationLevel, OptimizationStats};
use sable_vm::Vm;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// What one evaluation did
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    /// Top of the stack when the script finished, if anything was left
    pub value: Option<i32>,
    /// Compiled size before optimization
    pub bytecode_size: usize,
    /// Size after optimization
    pub optimized_size: usize,
    /// Optimizer counters for this evaluation
    pub stats: OptimizationStats,
    /// Whether the value came from native code
    pub used_jit: bool,
}

/// Owns one interpreter, optimizer and JIT and runs expressions through them.
///
/// Every method takes `&self`; the interpreter and optimizer are each
/// behind a lock and the JIT is internally synchronized.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    vm: Mutex<Vm>,
    optimizer: Mutex<BytecodeOptimizer>,
    jit: JitCompiler,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Engine with its JIT already initialized
    pub fn new(config: EngineConfig) -> Self {
        let jit = JitCompiler::new();
        jit.initialize(config.jit.clone());
        Self {
            vm: Mutex::new(Vm::with_config(config.vm.clone())),
            optimizer: Mutex::new(BytecodeOptimizer::new()),
            jit,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The engine's JIT, for cache and profiling access
    pub fn jit(&self) -> &JitCompiler {
        &self.jit
    }

    /// Bind `name` for `CALL_NATIVE`, replacing any previous binding
    pub fn register_native<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.vm.lock().register_native(name, callback);
    }

    /// Remove a binding; returns whether it existed
    pub fn unregister_native(&self, name: &str) -> bool {
        self.vm.lock().unregister_native(name)
    }

    /// Is `name` bound
    pub fn has_native(&self, name: &str) -> bool {
        self.vm.lock().has_native(name)
    }

    /// Compile an expression to unoptimized bytecode
    pub fn compile(&self, source: &str) -> EngineResult<Vec<u8>> {
        Ok(compile(source)?)
    }

    /// Optimize at the configured level
    pub fn optimize(&self, bytecode: &[u8]) -> Vec<u8> {
        self.optimize_at(bytecode, self.config.optimization_level)
    }

    /// Optimize at an explicit level
    pub fn optimize_at(&self, bytecode: &[u8], level: OptimizationLevel) -> Vec<u8> {
        self.optimizer.lock().optimize(bytecode, level)
    }

    /// Counters from the most recent optimization
    pub fn last_stats(&self) -> OptimizationStats {
        self.optimizer.lock().last_stats().clone()
    }

    /// Compile, optimize and run `source`.
    ///
    /// With `use_jit` the optimized bytecode is tried natively first; code
    /// that needs host services, or that the JIT cannot translate, runs on
    /// the interpreter instead.
    pub fn eval(&self, source: &str) -> EngineResult<EvalReport> {
        let bytecode = self.compile(source)?;
        let (optimized, stats) = {
            let mut optimizer = self.optimizer.lock();
            let optimized = optimizer.optimize(&bytecode, self.config.optimization_level);
            (optimized, optimizer.last_stats().clone())
        };
        let report = |value, used_jit| EvalReport {
            value,
            bytecode_size: bytecode.len(),
            optimized_size: optimized.len(),
            stats: stats.clone(),
            used_jit,
        };

        if self.config.use_jit {
            match self.native_eval(&optimized, "") {
                Ok(value) => return Ok(report(Some(value), true)),
                Err(
                    error @ EngineError::Native(
                        ExecError::Fault | ExecError::Panicked | ExecError::IntegrityCheckFailed,
                    ),
                ) => return Err(error),
                Err(error) => debug!(%error, "falling back to the interpreter"),
            }
        }

        let outcome = self.vm.lock().execute(&optimized)?;
        Ok(report(outcome.final_stack.last().copied(), false))
    }

    /// Evaluate `source`, reporting only success
    pub fn run_script(&self, source: &str) -> bool {
        match self.eval(source) {
            Ok(_) => true,
            Err(error) => {
                warn!(%error, "script execution failed");
                false
            }
        }
    }

    /// Compile `source` to native code, cache it under `name` and run it
    pub fn jit_eval(&self, source: &str, name: &str) -> EngineResult<i32> {
        let bytecode = self.compile(source)?;
        self.native_eval(&bytecode, name)
    }

    fn native_eval(&self, bytecode: &[u8], name: &str) -> EngineResult<i32> {
        if let Some(opcode) = host_dependent_opcode(bytecode) {
            return Err(EngineError::NotJittable(opcode.name().to_string()));
        }
        let result = self.jit.compile(bytecode, name);
        if !result.success {
            return Err(EngineError::jit(result.error_message.unwrap_or_default()));
        }
        Ok(self.jit.try_execute(&result, ptr::null_mut(), ptr::null_mut())?)
    }
}

/// First opcode the JIT only emits a placeholder for
fn host_dependent_opcode(bytecode: &[u8]) -> Option<Opcode> {
    decode(bytecode)
        .ok()?
        .into_iter()
        .map(|instruction| instruction.opcode)
        .find(|&opcode| !is_natively_supported(opcode))
}
