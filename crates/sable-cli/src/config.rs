//! Configuration file parsing for sable.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use sable_engine::EngineConfig;
use sable_jit::JitSettings;
use sable_optimizer::OptimizationLevel;
use sable_vm::VmConfig;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Interpreter limits and native permissions
    #[serde(default)]
    pub vm: VmConfig,

    /// JIT settings
    #[serde(default)]
    pub jit: JitSettings,

    /// Optimizer settings
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

/// Optimizer configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Level applied before running
    pub level: OptimizationLevel,

    /// Try native code before interpreting
    pub use_jit: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::Basic,
            use_jit: false,
        }
    }
}

impl Config {
    /// Engine configuration described by this file
    pub fn into_engine_config(self) -> EngineConfig {
        EngineConfig {
            vm: self.vm,
            jit: self.jit,
            optimization_level: self.optimizer.level,
            use_jit: self.optimizer.use_jit,
        }
    }
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path
        && !path.exists()
    {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_ancestors(&cwd)
}

fn find_config_in_ancestors(start: &Path) -> Option<PathBuf> {
    const CONFIG_NAMES: &[&str] = &["sable.toml", ".sablerc.toml"];

    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}
