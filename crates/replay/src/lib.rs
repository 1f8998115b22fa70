//! Replay: checkpointed random-access queries over deterministic replay machines.
//!
//! This is the main entry point for applications. It re-exports the core
//! types, the checkpointed cache and the execution-run orchestrator.

pub use replay_cache as cache;
pub use replay_core as core;
pub use replay_runtime as runtime;

#[cfg(feature = "vm")]
pub use replay_vm as vm;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        Bytes32, Error, Machine, MachineCacheConfig, MachineError, MachineStatus,
        MachineStepResult, Result, StepRange, LAST_STEP,
    };

    pub use crate::cache::{machine_getter, InitialMachineGetter, MachineCache};
    pub use crate::runtime::{ExecutionRun, Promise};

    #[cfg(feature = "vm")]
    pub use crate::vm::{Instruction, Program, StepMeter, Vm};
}
