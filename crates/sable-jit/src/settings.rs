//! JIT configuration

use serde::{Deserialize, Serialize};

/// Highest supported optimization level
pub const MAX_OPTIMIZATION_LEVEL: u8 = 3;

/// Default code cache budget (64 MiB)
pub const DEFAULT_CODE_CACHE_SIZE: usize = 64 * 1024 * 1024;

/// Settings applied by [`crate::JitCompiler::initialize`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitSettings {
    /// Run bytecode passes before translation
    pub enable_optimizations: bool,
    /// Verify checksums before executing cached code
    pub enable_security_checks: bool,
    /// Record compile timings and counters
    pub enable_profiling: bool,
    /// 0 (no passes) to 3 (all passes)
    pub optimization_level: u8,
    /// Upper bound on the summed size of cached native code, in bytes
    pub max_code_cache_size: usize,
    /// Keep the stored copy of native code XOR-masked
    pub enable_code_encryption: bool,
}

impl Default for JitSettings {
    fn default() -> Self {
        Self {
            enable_optimizations: true,
            enable_security_checks: true,
            enable_profiling: false,
            optimization_level: 2,
            max_code_cache_size: DEFAULT_CODE_CACHE_SIZE,
            enable_code_encryption: true,
        }
    }
}

impl JitSettings {
    /// Copy with the optimization level clamped to the supported range
    pub fn clamped(&self) -> Self {
        Self {
            optimization_level: self.optimization_level.min(MAX_OPTIMIZATION_LEVEL),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = JitSettings::default();
        assert!(settings.enable_optimizations);
        assert!(settings.enable_security_checks);
        assert!(!settings.enable_profiling);
        assert_eq!(settings.optimization_level, 2);
        assert_eq!(settings.max_code_cache_size, 64 * 1024 * 1024);
        assert!(settings.enable_code_encryption);
    }

    #[test]
    fn test_clamp() {
        let settings = JitSettings {
            optimization_level: 9,
            ..JitSettings::default()
        };
        assert_eq!(settings.clamped().optimization_level, 3);
    }
}
