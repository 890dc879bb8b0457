//! JIT compiler: bytecode passes, translation, loading, caching and execution

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use sable_bytecode::decode;
use sable_optimizer::{OptimizeResult, PassOutcome};
use sable_optimizer::passes::{
    eliminate_dead_code, fold_constants, optimize_jumps, optimize_stack_operations, peephole,
    remove_nops,
};

use crate::cache::CodeCache;
use crate::codegen::translate;
use crate::depth::analyze_stack_depths;
use crate::error::{ExecError, JitError};
use crate::memory::{ExecutableMemoryArena, ExecutableRegion, SystemArena, load_code};
use crate::security::{CODE_MASK_KEY, checksum, masked};
use crate::settings::{JitSettings, MAX_OPTIMIZATION_LEVEL};

/// Outcome of one compilation.
///
/// Clones share the executable region, which is unmapped when the last
/// clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct JitCompilationResult {
    /// Whether native code was produced and loaded
    pub success: bool,
    /// Stored copy of the machine code, XOR-masked when `encrypted`
    pub native_code: Vec<u8>,
    /// Machine code length in bytes
    pub code_size: usize,
    /// Loaded, executable copy of the code
    pub executable_memory: Option<Arc<ExecutableRegion>>,
    /// Failure reason when `success` is false
    pub error_message: Option<String>,
    /// Input bytecode length
    pub original_bytecode_size: usize,
    /// Wall time spent compiling
    pub compilation_time_ms: f64,
    /// Level the bytecode passes ran at
    pub optimization_level: u8,
    /// Checksum of the plain machine code
    pub checksum: u32,
    /// Whether `native_code` is masked
    pub encrypted: bool,
}

impl JitCompilationResult {
    fn failure(error: &JitError, original_bytecode_size: usize, optimization_level: u8) -> Self {
        Self {
            success: false,
            error_message: Some(error.to_string()),
            original_bytecode_size,
            optimization_level,
            ..Self::default()
        }
    }

    /// Unmasked machine code
    pub fn plain_code(&self) -> Vec<u8> {
        if self.encrypted {
            masked(&self.native_code, CODE_MASK_KEY)
        } else {
            self.native_code.clone()
        }
    }

    /// Whether there is loaded code to run
    pub fn is_executable(&self) -> bool {
        self.success && self.executable_memory.is_some()
    }
}

/// Native code generated and loaded, before result bookkeeping
struct LoadedCode {
    code: Vec<u8>,
    region: ExecutableRegion,
}

/// Compiles Sable bytecode to x86-64 and runs it.
///
/// Safe to share between threads: settings, cache and profiling counters
/// are each behind their own lock.
#[derive(Debug)]
pub struct JitCompiler {
    settings: RwLock<Option<JitSettings>>,
    cache: Mutex<CodeCache>,
    profiling: Mutex<BTreeMap<String, f64>>,
    arena: Arc<dyn ExecutableMemoryArena>,
}

impl Default for JitCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl JitCompiler {
    /// Uninitialized compiler using the operating system arena
    pub fn new() -> Self {
        Self::with_arena(Arc::new(SystemArena))
    }

    /// Uninitialized compiler allocating through `arena`
    pub fn with_arena(arena: Arc<dyn ExecutableMemoryArena>) -> Self {
        Self {
            settings: RwLock::new(None),
            cache: Mutex::new(CodeCache::new(JitSettings::default().max_code_cache_size)),
            profiling: Mutex::new(BTreeMap::new()),
            arena,
        }
    }

    /// Apply `settings`. Always succeeds; an out-of-range optimization level
    /// is clamped.
    pub fn initialize(&self, settings: JitSettings) -> bool {
        if settings.optimization_level > MAX_OPTIMIZATION_LEVEL {
            warn!(
                requested = settings.optimization_level,
                max = MAX_OPTIMIZATION_LEVEL,
                "JIT optimization level out of range, clamping"
            );
        }
        let settings = settings.clamped();
        self.cache.lock().set_max_bytes(settings.max_code_cache_size);

        let mut current = self.settings.write();
        if current.is_some() {
            debug!("JIT compiler re-initialized");
        } else {
            info!(level = settings.optimization_level, "JIT compiler initialized");
        }
        *current = Some(settings);
        true
    }

    /// Whether [`Self::initialize`] has been called
    pub fn is_initialized(&self) -> bool {
        self.settings.read().is_some()
    }

    /// Current settings
    pub fn settings(&self) -> Option<JitSettings> {
        self.settings.read().clone()
    }

    /// Drop the settings and the cache
    pub fn shutdown(&self) {
        *self.settings.write() = None;
        self.cache.lock().clear();
        self.profiling.lock().clear();
    }

    /// Turn profiling on or off
    pub fn enable_profiling(&self, enabled: bool) {
        if let Some(settings) = self.settings.write().as_mut() {
            settings.enable_profiling = enabled;
        }
    }

    /// Turn masking of stored code on or off for later compilations
    pub fn enable_code_encryption(&self, enabled: bool) {
        if let Some(settings) = self.settings.write().as_mut() {
            settings.enable_code_encryption = enabled;
        }
    }

    /// Compile `bytecode`. Never fails outward: problems are reported in
    /// the result. A non-empty `name` also stores the result in the cache.
    pub fn compile(&self, bytecode: &[u8], name: &str) -> JitCompilationResult {
        let started = Instant::now();
        let Some(settings) = self.settings() else {
            return JitCompilationResult::failure(&JitError::NotInitialized, bytecode.len(), 0);
        };
        let level = settings.optimization_level;

        let outcome = if bytecode.is_empty() {
            Err(JitError::EmptyBytecode)
        } else if settings.enable_optimizations {
            check_input(bytecode).and_then(|()| self.generate(&run_passes(bytecode, level)))
        } else {
            self.generate(bytecode)
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let result = match outcome {
            Ok(LoadedCode { code, region }) => {
                let checksum = checksum(&code);
                let (native_code, encrypted) = if settings.enable_code_encryption {
                    (masked(&code, CODE_MASK_KEY), true)
                } else {
                    (code, false)
                };
                JitCompilationResult {
                    success: true,
                    code_size: native_code.len(),
                    native_code,
                    executable_memory: Some(Arc::new(region)),
                    error_message: None,
                    original_bytecode_size: bytecode.len(),
                    compilation_time_ms: elapsed_ms,
                    optimization_level: level,
                    checksum,
                    encrypted,
                }
            }
            Err(error) => {
                debug!(name, %error, "JIT compilation failed");
                let mut failed = JitCompilationResult::failure(&error, bytecode.len(), level);
                failed.compilation_time_ms = elapsed_ms;
                failed
            }
        };

        if result.success {
            debug!(name, code_size = result.code_size, "JIT compiled");
            if !name.is_empty() {
                self.cache_insert(name, result.clone());
            }
        }
        if settings.enable_profiling {
            self.record_compilation(name, &result);
        }
        result
    }

    fn generate(&self, bytecode: &[u8]) -> Result<LoadedCode, JitError> {
        let instructions = decode(bytecode)?;
        let len = u32::try_from(bytecode.len()).map_err(|_| JitError::CodeTooLarge(bytecode.len()))?;
        let depths = analyze_stack_depths(&instructions, len)?;
        let code = translate(&instructions, len, &depths)?;
        let region = load_code(self.arena.as_ref(), &code)?;
        Ok(LoadedCode { code, region })
    }

    fn record_compilation(&self, name: &str, result: &JitCompilationResult) {
        let mut data = self.profiling.lock();
        let label = if name.is_empty() { "<anonymous>" } else { name };
        data.insert(format!("compile_time_ms:{label}"), result.compilation_time_ms);
        *data.entry("total_compile_time_ms".to_string()).or_default() += result.compilation_time_ms;
        let counter = if result.success { "compilations" } else { "failed_compilations" };
        *data.entry(counter.to_string()).or_default() += 1.0;
        *data.entry("native_code_bytes".to_string()).or_default() += result.code_size as f64;
    }

    fn bump(&self, counter: &str) {
        if self.settings.read().as_ref().is_some_and(|s| s.enable_profiling) {
            *self.profiling.lock().entry(counter.to_string()).or_default() += 1.0;
        }
    }

    /// Run compiled code, returning its value or a negative sentinel:
    /// -1 not compiled, -2 integrity failure, -3 fault, -4 unsupported target.
    ///
    /// `context` and `args` are handed to the native entry point in the
    /// first two argument registers. Generated code never dereferences them,
    /// so null is always acceptable.
    pub fn execute(
        &self,
        result: &JitCompilationResult,
        context: *mut c_void,
        args: *mut c_void,
    ) -> i32 {
        self.try_execute(result, context, args).unwrap_or_else(ExecError::code)
    }

    /// Run compiled code, reporting why it could not run
    pub fn try_execute(
        &self,
        result: &JitCompilationResult,
        context: *mut c_void,
        args: *mut c_void,
    ) -> Result<i32, ExecError> {
        let Some(region) = result.executable_memory.as_deref().filter(|_| result.success) else {
            return Err(ExecError::NotCompiled);
        };

        let checks = self
            .settings
            .read()
            .as_ref()
            .is_none_or(|s| s.enable_security_checks);
        if checks && !self.verify_code_integrity(result) {
            warn!(checksum = result.checksum, "refusing to run code that failed its integrity check");
            self.bump("integrity_failures");
            return Err(ExecError::IntegrityCheckFailed);
        }

        self.bump("executions");
        std::panic::catch_unwind(AssertUnwindSafe(|| run_native(region, context, args)))
            .unwrap_or(Err(ExecError::Panicked))
    }

    /// Whether the stored code, its checksum and the loaded region agree
    pub fn verify_code_integrity(&self, result: &JitCompilationResult) -> bool {
        let Some(region) = result.executable_memory.as_deref().filter(|_| result.success) else {
            return false;
        };
        let plain = result.plain_code();
        checksum(&plain) == result.checksum && region.as_slice() == plain.as_slice()
    }

    /// Store `result` under `name`
    pub fn cache_insert(&self, name: &str, result: JitCompilationResult) {
        self.cache.lock().insert(name, result);
    }

    /// Cached result for `name`
    pub fn cache_get(&self, name: &str) -> Option<JitCompilationResult> {
        self.cache.lock().get(name).cloned()
    }

    /// Drop every cached result
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Summed code size of cached results
    pub fn get_cache_size_bytes(&self) -> usize {
        self.cache.lock().size_bytes()
    }

    /// Cached names in sorted order
    pub fn cached_names(&self) -> Vec<String> {
        self.cache.lock().names()
    }

    /// Snapshot of profiling counters and timings
    pub fn profiling_data(&self) -> BTreeMap<String, f64> {
        self.profiling.lock().clone()
    }

    /// Clear profiling counters and timings
    pub fn reset_profiling_data(&self) {
        self.profiling.lock().clear();
    }
}

/// Reject input the translator would reject before any pass rewrites it
fn check_input(bytecode: &[u8]) -> Result<(), JitError> {
    let instructions = decode(bytecode)?;
    let len = u32::try_from(bytecode.len()).map_err(|_| JitError::CodeTooLarge(bytecode.len()))?;
    analyze_stack_depths(&instructions, len)?;
    Ok(())
}

/// Bytecode passes by JIT level. A failing pass is skipped.
fn run_passes(bytecode: &[u8], level: u8) -> Vec<u8> {
    type Pass = fn(&[u8]) -> OptimizeResult<PassOutcome>;
    let mut passes: Vec<(&str, Pass)> = Vec::new();
    if level >= 1 {
        passes.push(("dead code elimination", eliminate_dead_code));
    }
    if level >= 2 {
        passes.push(("constant propagation", fold_constants));
        passes.push(("nop removal", remove_nops));
        passes.push(("stack cleanup", optimize_stack_operations));
    }
    if level >= 3 {
        passes.push(("instruction combining", peephole));
        passes.push(("jump optimization", optimize_jumps));
    }

    let mut current = bytecode.to_vec();
    for (name, pass) in passes {
        match pass(&current) {
            Ok(outcome) => current = outcome.bytecode,
            Err(error) => debug!(pass = name, %error, "skipping failed JIT pass"),
        }
    }
    current
}

/// Native entry point: host context, argument block, fault flag
#[cfg(target_arch = "x86_64")]
type NativeEntry = extern "sysv64" fn(*mut c_void, *mut c_void, *mut u32) -> i32;

#[cfg(target_arch = "x86_64")]
fn run_native(
    region: &ExecutableRegion,
    context: *mut c_void,
    args: *mut c_void,
) -> Result<i32, ExecError> {
    use crate::memory::Protection;

    if region.protection() != Protection::ReadExecute {
        return Err(ExecError::NotCompiled);
    }
    let mut fault = 0u32;
    let entry: NativeEntry = unsafe {
        // SAFETY: the region holds code from `translate`, which follows the
        // `NativeEntry` signature, and stays mapped for the duration of the
        // call. The code only writes through the fault pointer.
        std::mem::transmute::<*const u8, NativeEntry>(region.as_ptr())
    };
    let value = entry(context, args, &mut fault);
    if fault != 0 { Err(ExecError::Fault) } else { Ok(value) }
}

#[cfg(not(target_arch = "x86_64"))]
fn run_native(
    _region: &ExecutableRegion,
    _context: *mut c_void,
    _args: *mut c_void,
) -> Result<i32, ExecError> {
    Err(ExecError::UnsupportedTarget)
}
