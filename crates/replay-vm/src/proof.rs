//! One-step proofs for the reference machine.

use replay_core::{Bytes32, Machine};
use serde::{Deserialize, Serialize};

use crate::program::Instruction;
use crate::vm::Vm;

/// Witness for the transition from step `step` to `step + 1`.
///
/// `post_hash` is `None` when the machine is not running or the next step
/// faults, i.e. when no transition exists to prove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProof {
    pub step: u64,
    pub pre_hash: Bytes32,
    pub pc: u64,
    pub instruction: Option<Instruction>,
    /// Up to two values from the top of the stack, top last.
    pub stack_window: Vec<u64>,
    pub post_hash: Option<Bytes32>,
}

impl StepProof {
    pub fn for_machine(vm: &Vm) -> Self {
        let post_hash = if vm.is_running() {
            let mut next = vm.clone();
            next.advance(1).ok().map(|_| next.hash())
        } else {
            None
        };
        let window_start = vm.stack().len().saturating_sub(2);
        Self {
            step: vm.step_count(),
            pre_hash: vm.hash(),
            pc: vm.pc(),
            instruction: vm.current_instruction(),
            stack_window: vm.stack()[window_start..].to_vec(),
            post_hash,
        }
    }

    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    #[test]
    fn proof_links_consecutive_hashes() {
        let mut vm = Vm::new(Program::countdown(4));
        vm.advance(6).unwrap();
        let proof = StepProof::from_bytes(&vm.prove_next_step().unwrap()).unwrap();

        let pre = vm.hash();
        vm.advance(1).unwrap();
        assert_eq!(proof.step, 6);
        assert_eq!(proof.pre_hash, pre);
        assert_eq!(proof.post_hash, Some(vm.hash()));
        assert!(proof.instruction.is_some());
    }

    #[test]
    fn halted_machine_has_no_post_state() {
        let mut vm = Vm::new(Program::nops(1));
        vm.advance(1).unwrap();
        let proof = StepProof::for_machine(&vm);
        assert_eq!(proof.post_hash, None);
        assert_eq!(proof.instruction, None);
    }

    #[test]
    fn encoded_proof_decodes_to_the_same_witness() {
        let mut vm = Vm::new(Program::countdown(2));
        vm.advance(3).unwrap();
        let proof = StepProof::for_machine(&vm);
        let bytes = proof.to_bytes().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(StepProof::from_bytes(&bytes), Some(proof));
        assert_eq!(vm.prove_next_step(), Ok(bytes));
    }
}
