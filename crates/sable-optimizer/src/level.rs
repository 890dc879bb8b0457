//! Optimization levels

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How much work the optimizer does. Each level includes every lower one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Return the input unchanged
    None,
    /// Dead code, constant folding, stack operations
    #[default]
    Basic,
    /// Adds jump and peephole optimization
    Medium,
    /// Adds constant branch folding and iterates to a fixpoint
    Aggressive,
}

impl OptimizationLevel {
    /// All levels in increasing order
    pub const ALL: [OptimizationLevel; 4] = [Self::None, Self::Basic, Self::Medium, Self::Aggressive];

    /// Lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Medium => "medium",
            Self::Aggressive => "aggressive",
        }
    }

    /// Level for a numeric setting (0-3, higher values saturate)
    pub const fn from_number(level: u32) -> Self {
        match level {
            0 => Self::None,
            1 => Self::Basic,
            2 => Self::Medium,
            _ => Self::Aggressive,
        }
    }
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(Self::None),
            "basic" | "1" => Ok(Self::Basic),
            "medium" | "2" => Ok(Self::Medium),
            "aggressive" | "3" => Ok(Self::Aggressive),
            other => Err(format!("unknown optimization level '{other}'")),
        }
    }
}
