//! The reference stack machine.

use std::sync::Arc;

use replay_core::{Bytes32, Machine, MachineError, MachineStatus};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::meter::StepMeter;
use crate::program::{Instruction, Program};
use crate::proof::StepProof;

/// Externally visible state of a [`Vm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmGlobalState {
    pub pc: u64,
    pub stack_top: Option<u64>,
    pub program_digest: Bytes32,
}

/// Deterministic stack machine over `u64` with wrapping arithmetic.
///
/// Reaching the end of the program finishes the machine. `Fail` halts it in
/// the errored state. Stack underflow and jumps past the end are faults:
/// `advance` returns an error and the machine stays at the faulting step.
#[derive(Debug, Clone)]
pub struct Vm {
    program: Arc<Program>,
    program_digest: Bytes32,
    pc: u64,
    steps: u64,
    stack: Vec<u64>,
    status: MachineStatus,
    meter: Option<StepMeter>,
}

impl Vm {
    pub fn new(program: Program) -> Self {
        let status = if program.is_empty() {
            MachineStatus::Finished
        } else {
            MachineStatus::Running
        };
        Self {
            program_digest: program.digest(),
            program: Arc::new(program),
            pc: 0,
            steps: 0,
            stack: Vec::new(),
            status,
            meter: None,
        }
    }

    /// Count every executed step on `meter`, including steps taken by clones.
    pub fn with_meter(mut self, meter: StepMeter) -> Self {
        self.meter = Some(meter);
        self
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn stack(&self) -> &[u64] {
        &self.stack
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn current_instruction(&self) -> Option<Instruction> {
        self.program.get(self.pc)
    }

    fn pop(&mut self) -> Result<u64, MachineError> {
        self.stack
            .pop()
            .ok_or_else(|| MachineError::new(self.steps, format!("stack underflow at pc {}", self.pc)))
    }

    fn jump_target(&self, target: u64) -> Result<u64, MachineError> {
        if target >= self.program.len() as u64 {
            return Err(MachineError::new(
                self.steps,
                format!("jump to {} outside program of length {}", target, self.program.len()),
            ));
        }
        Ok(target)
    }

    /// Execute one instruction. On error the machine is left untouched.
    fn step(&mut self) -> Result<(), MachineError> {
        let Some(instruction) = self.current_instruction() else {
            self.status = MachineStatus::Finished;
            return Ok(());
        };

        let saved_stack = self.stack.clone();
        let mut next_pc = self.pc + 1;
        let outcome = match instruction {
            Instruction::Push(v) => {
                self.stack.push(v);
                Ok(())
            }
            Instruction::Pop => self.pop().map(|_| ()),
            Instruction::Dup => self.pop().map(|v| {
                self.stack.push(v);
                self.stack.push(v);
            }),
            Instruction::Swap => self.pop().and_then(|b| {
                let a = self.pop()?;
                self.stack.push(b);
                self.stack.push(a);
                Ok(())
            }),
            Instruction::Add => self.binary(u64::wrapping_add),
            Instruction::Sub => self.binary(u64::wrapping_sub),
            Instruction::Mul => self.binary(u64::wrapping_mul),
            Instruction::Jump(target) => self.jump_target(target).map(|t| next_pc = t),
            Instruction::JumpIfZero(target) => self.pop().and_then(|v| {
                if v == 0 {
                    next_pc = self.jump_target(target)?;
                }
                Ok(())
            }),
            Instruction::Nop => Ok(()),
            Instruction::Halt => {
                self.status = MachineStatus::Finished;
                Ok(())
            }
            Instruction::Fail => {
                self.status = MachineStatus::Errored;
                Ok(())
            }
        };

        if let Err(e) = outcome {
            self.stack = saved_stack;
            return Err(e);
        }

        self.steps += 1;
        self.pc = next_pc;
        if self.status.is_running() && self.pc >= self.program.len() as u64 {
            self.status = MachineStatus::Finished;
        }
        Ok(())
    }

    fn binary(&mut self, op: fn(u64, u64) -> u64) -> Result<(), MachineError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.stack.push(op(a, b));
        Ok(())
    }
}

impl Machine for Vm {
    type GlobalState = VmGlobalState;

    fn step_count(&self) -> u64 {
        self.steps
    }

    fn status(&self) -> MachineStatus {
        self.status
    }

    fn global_state(&self) -> VmGlobalState {
        VmGlobalState {
            pc: self.pc,
            stack_top: self.stack.last().copied(),
            program_digest: self.program_digest,
        }
    }

    fn hash(&self) -> Bytes32 {
        let status = match self.status {
            MachineStatus::Running => 0u8,
            MachineStatus::Finished => 1,
            MachineStatus::Errored => 2,
        };
        let mut hasher = Sha256::new();
        hasher.update(self.program_digest.as_bytes());
        hasher.update(self.pc.to_le_bytes());
        hasher.update(self.steps.to_le_bytes());
        hasher.update([status]);
        hasher.update((self.stack.len() as u64).to_le_bytes());
        for value in &self.stack {
            hasher.update(value.to_le_bytes());
        }
        Bytes32(hasher.finalize().into())
    }

    fn prove_next_step(&self) -> Result<Vec<u8>, MachineError> {
        StepProof::for_machine(self)
            .to_bytes()
            .map_err(|e| MachineError::new(self.steps, format!("failed to encode proof: {e}")))
    }

    fn advance(&mut self, steps: u64) -> Result<(), MachineError> {
        let mut executed = 0;
        let mut result = Ok(());
        while executed < steps && self.status.is_running() {
            let before = self.steps;
            if let Err(e) = self.step() {
                result = Err(e);
                break;
            }
            executed += self.steps - before;
        }
        if let Some(meter) = &self.meter {
            meter.record(executed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Instruction::*;

    #[test]
    fn nops_finish_after_exact_step_count() {
        let mut vm = Vm::new(Program::nops(10));
        vm.advance(9).unwrap();
        assert_eq!(vm.step_count(), 9);
        assert!(vm.is_running());

        vm.advance(5).unwrap();
        assert_eq!(vm.step_count(), 10);
        assert_eq!(vm.status(), MachineStatus::Finished);
    }

    #[test]
    fn countdown_halts_after_expected_steps() {
        let mut vm = Vm::new(Program::countdown(3));
        vm.advance(u64::MAX).unwrap();
        assert_eq!(vm.step_count(), 5 * 3 + 4);
        assert_eq!(vm.status(), MachineStatus::Finished);
        assert_eq!(vm.stack(), &[0]);
    }

    #[test]
    fn fail_instruction_errors_the_machine() {
        let mut vm = Vm::new(Program::new(vec![Push(1), Fail, Nop]));
        vm.advance(10).unwrap();
        assert_eq!(vm.step_count(), 2);
        assert_eq!(vm.status(), MachineStatus::Errored);
    }

    #[test]
    fn underflow_is_a_fault_and_leaves_state_intact() {
        let mut vm = Vm::new(Program::new(vec![Push(1), Add]));
        let err = vm.advance(5).unwrap_err();
        assert_eq!(err.step, 1);
        assert_eq!(vm.step_count(), 1);
        assert_eq!(vm.stack(), &[1]);
        assert!(vm.is_running());
    }

    #[test]
    fn advancing_a_halted_machine_is_a_noop() {
        let mut vm = Vm::new(Program::nops(2));
        vm.advance(2).unwrap();
        let hash = vm.hash();
        vm.advance(100).unwrap();
        assert_eq!(vm.step_count(), 2);
        assert_eq!(vm.hash(), hash);
    }

    #[test]
    fn hash_is_path_independent() {
        let mut stepped = Vm::new(Program::countdown(20));
        for _ in 0..57 {
            stepped.advance(1).unwrap();
        }

        let mut jumped = Vm::new(Program::countdown(20));
        jumped.advance(30).unwrap();
        let mut restored = jumped.clone();
        restored.advance(27).unwrap();

        assert_eq!(stepped.step_count(), restored.step_count());
        assert_eq!(stepped.hash(), restored.hash());
        assert_eq!(stepped.global_state(), restored.global_state());
    }

    #[test]
    fn meter_is_shared_across_clones() {
        let meter = StepMeter::new();
        let mut vm = Vm::new(Program::nops(100)).with_meter(meter.clone());
        vm.advance(10).unwrap();
        let mut fork = vm.clone();
        fork.advance(15).unwrap();
        assert_eq!(meter.total(), 25);
    }

    #[test]
    fn empty_program_starts_finished() {
        let vm = Vm::new(Program::new(Vec::new()));
        assert_eq!(vm.status(), MachineStatus::Finished);
        assert_eq!(vm.step_count(), 0);
    }
}
