//! The capability every replayable machine exposes to the cache.

use serde::Serialize;
use std::fmt::Debug;

use crate::error::MachineError;
use crate::step::{Bytes32, MachineStatus, MachineStepResult};

/// A deterministic, strictly sequential replay machine.
///
/// Implementations must be cheap to clone: the cache snapshots the live
/// machine at every checkpoint boundary. Two machines built from the same
/// program and advanced to the same step must report identical hashes and
/// global states regardless of how they got there.
pub trait Machine: Clone + Send + Sync + 'static {
    /// Opaque comparable value describing the machine's externally visible state.
    type GlobalState: Clone + Debug + PartialEq + Eq + Serialize + Send + Sync + 'static;

    /// Number of steps executed since genesis.
    fn step_count(&self) -> u64;

    fn status(&self) -> MachineStatus;

    fn is_running(&self) -> bool {
        self.status().is_running()
    }

    fn global_state(&self) -> Self::GlobalState;

    /// Content-addressed digest of the full machine state.
    fn hash(&self) -> Bytes32;

    /// Produce the witness proving the transition from the current step to the next.
    fn prove_next_step(&self) -> Result<Vec<u8>, MachineError>;

    /// Execute up to `steps` steps, stopping early if the machine halts.
    fn advance(&mut self, steps: u64) -> Result<(), MachineError>;

    /// Read the step result at the machine's current position.
    fn step_result(&self) -> MachineStepResult<Self::GlobalState> {
        MachineStepResult {
            position: self.step_count(),
            status: self.status(),
            global_state: self.global_state(),
            hash: self.hash(),
        }
    }
}
