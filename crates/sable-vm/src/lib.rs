//! # Sable VM
//!
//! Stack interpreter for Sable bytecode.
//!
//! The VM keeps a byte-addressed stack of 4-byte slots and walks the bytecode
//! with a bounds-checked cursor. `CALL_NATIVE` dispatches to host callbacks
//! registered on the VM instance; every runtime failure ends the run with a
//! [`VmError`] and [`Vm::run`] reports it as `false`.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod interpreter;
pub mod native;
pub mod stack;

pub use config::VmConfig;
pub use error::{VmError, VmResult};
pub use interpreter::{Completion, ExecutionOutcome, Vm};
pub use native::{NativeFn, NativeRegistry};
pub use stack::ValueStack;
