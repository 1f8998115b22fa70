//! Query orchestration for the Replay toolchain.
//!
//! This crate provides:
//!
//! - [`Promise`]: a single-assignment result slot with an attachable cancel hook
//! - [`ExecutionRun`]: dispatches step and proof queries against a
//!   [`replay_cache::MachineCache`], one task per query, all scoped to one
//!   cancellation token

mod promise;
mod run;

pub use promise::Promise;
pub use run::ExecutionRun;
