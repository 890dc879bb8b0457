//! Engine configuration and environment toggles

use serde::{Deserialize, Serialize};

use sable_jit::JitSettings;
use sable_optimizer::OptimizationLevel;
use sable_vm::VmConfig;

/// Forces the JIT on or off
pub const JIT_ENV_VAR: &str = "SABLE_JIT";
/// Turns on JIT profiling counters
pub const JIT_STATS_ENV_VAR: &str = "SABLE_JIT_STATS";

/// Settings for every stage an [`crate::Engine`] owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interpreter limits and permissions
    pub vm: VmConfig,
    /// JIT settings
    pub jit: JitSettings,
    /// Level used by [`crate::Engine::eval`]
    pub optimization_level: OptimizationLevel,
    /// Try native code before interpreting
    pub use_jit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vm: VmConfig::default(),
            jit: JitSettings::default(),
            optimization_level: OptimizationLevel::Basic,
            use_jit: false,
        }
    }
}

impl EngineConfig {
    /// Apply `SABLE_JIT` and `SABLE_JIT_STATS` from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply toggles read through `lookup`
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(enabled) = lookup(JIT_ENV_VAR).as_deref().and_then(parse_env_flag) {
            tracing::debug!(enabled, "JIT toggled from environment");
            self.use_jit = enabled;
        }
        if let Some(enabled) = lookup(JIT_STATS_ENV_VAR).as_deref().and_then(parse_env_flag) {
            self.jit.enable_profiling = enabled;
        }
        self
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive; anything else is unset
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if ["1", "true", "yes", "on"].iter().any(|v| value.eq_ignore_ascii_case(v)) {
        Some(true)
    } else if ["0", "false", "no", "off"].iter().any(|v| value.eq_ignore_ascii_case(v)) {
        Some(false)
    } else {
        None
    }
}
