//! Programs for the reference machine.

use replay_core::Bytes32;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single machine instruction. Every instruction costs one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Instruction {
    Push(u64),
    Pop,
    Dup,
    Swap,
    Add,
    Sub,
    Mul,
    Jump(u64),
    /// Pop the top value and jump if it is zero.
    JumpIfZero(u64),
    Nop,
    Halt,
    /// Halt in the errored state.
    Fail,
}

impl Instruction {
    /// Stable byte encoding used for hashing.
    pub fn encode(&self) -> [u8; 9] {
        let (opcode, arg) = match *self {
            Instruction::Push(v) => (0x01, v),
            Instruction::Pop => (0x02, 0),
            Instruction::Dup => (0x03, 0),
            Instruction::Swap => (0x04, 0),
            Instruction::Add => (0x05, 0),
            Instruction::Sub => (0x06, 0),
            Instruction::Mul => (0x07, 0),
            Instruction::Jump(t) => (0x08, t),
            Instruction::JumpIfZero(t) => (0x09, t),
            Instruction::Nop => (0x0a, 0),
            Instruction::Halt => (0x0b, 0),
            Instruction::Fail => (0x0c, 0),
        };
        let mut out = [0u8; 9];
        out[0] = opcode;
        out[1..].copy_from_slice(&arg.to_le_bytes());
        out
    }
}

/// An immutable instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub code: Vec<Instruction>,
}

impl Program {
    pub fn new(code: Vec<Instruction>) -> Self {
        Self { code }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// `n` no-ops; the machine finishes after exactly `n` steps.
    pub fn nops(n: usize) -> Self {
        Self::new(vec![Instruction::Nop; n])
    }

    /// Count down from `n` to zero in a loop; halts after `5 * n + 4` steps.
    pub fn countdown(n: u64) -> Self {
        use Instruction::*;
        Self::new(vec![
            Push(n),
            Dup,
            JumpIfZero(6),
            Push(1),
            Sub,
            Jump(1),
            Halt,
        ])
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get(&self, pc: u64) -> Option<Instruction> {
        usize::try_from(pc).ok().and_then(|i| self.code.get(i)).copied()
    }

    pub fn digest(&self) -> Bytes32 {
        let mut hasher = Sha256::new();
        hasher.update((self.code.len() as u64).to_le_bytes());
        for instruction in &self.code {
            hasher.update(instruction.encode());
        }
        Bytes32(hasher.finalize().into())
    }
}
