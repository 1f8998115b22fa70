//! Deterministic reference machine for the Replay toolchain.
//!
//! `Vm` is a small stack machine implementing [`replay_core::Machine`].
//! It gives the cache and the execution run a concrete, cheaply clonable
//! machine to step in tests and from the CLI.

pub mod meter;
pub mod program;
pub mod proof;
pub mod vm;

pub use meter::StepMeter;
pub use program::{Instruction, Program};
pub use proof::StepProof;
pub use vm::{Vm, VmGlobalState};
