//! Core types for the Replay toolchain.
//!
//! This crate defines the data structures shared by the checkpointed
//! machine cache and the execution-run orchestrator: the [`Machine`]
//! capability, step results, cache configuration and the error type.
//! It contains no stepping or scheduling logic.

pub mod config;
pub mod error;
pub mod machine;
pub mod step;

pub use config::{MachineCacheConfig, StepRange, DEFAULT_ADVANCE_CHUNK};
pub use error::{Error, MachineError, Result};
pub use machine::Machine;
pub use step::{Bytes32, MachineStatus, MachineStepResult, LAST_STEP};
