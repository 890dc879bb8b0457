//! Interpreter limits and permissions

use serde::{Deserialize, Serialize};

/// Default stack budget (1 MiB)
pub const DEFAULT_MAX_STACK_BYTES: usize = 1024 * 1024;
/// Default instruction budget per run
pub const DEFAULT_MAX_INSTRUCTIONS: u64 = 10_000_000;
/// Default VM memory size in 32-bit words
pub const DEFAULT_MEMORY_WORDS: usize = 1024;

/// VM configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Upper bound on stack size in bytes
    pub max_stack_bytes: usize,
    /// Upper bound on instructions dispatched in one run
    pub max_instructions: u64,
    /// Words of addressable memory for `LOAD_MEM`/`STORE_MEM`
    pub memory_words: usize,
    /// Permit `CALL_NATIVE` at all
    pub allow_native_calls: bool,
    /// When non-empty, only these natives may be called
    pub native_allowlist: Vec<String>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_bytes: DEFAULT_MAX_STACK_BYTES,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            memory_words: DEFAULT_MEMORY_WORDS,
            allow_native_calls: true,
            native_allowlist: Vec::new(),
        }
    }
}

impl VmConfig {
    /// Whether the configuration lets `name` be called
    pub fn permits_native(&self, name: &str) -> bool {
        self.allow_native_calls
            && (self.native_allowlist.is_empty() || self.native_allowlist.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.max_stack_bytes, 1024 * 1024);
        assert!(config.permits_native("anything"));
    }

    #[test]
    fn test_allowlist() {
        let config = VmConfig {
            native_allowlist: vec!["print".into()],
            ..VmConfig::default()
        };
        assert!(config.permits_native("print"));
        assert!(!config.permits_native("exit"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: VmConfig = serde_json::from_str(r#"{"allow_native_calls": false}"#).unwrap();
        assert!(!config.allow_native_calls);
        assert_eq!(config.memory_words, DEFAULT_MEMORY_WORDS);
    }
}
