//! # Sable Engine
//!
//! One object that owns a compiler pipeline, an interpreter and a JIT, so a
//! host can hand in expression text plus native bindings and get back a
//! value or a failure. Replaces process-wide singletons: two engines share
//! nothing.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;

pub use config::{EngineConfig, JIT_ENV_VAR, JIT_STATS_ENV_VAR, parse_env_flag};
pub use engine::{Engine, EvalReport};
pub use error::{EngineError, EngineResult};
