//! Step results and the values they are built from.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Position sentinel meaning "run until the machine halts".
pub const LAST_STEP: u64 = u64::MAX;

/// Execution status of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Running,
    Finished,
    Errored,
}

impl MachineStatus {
    pub fn is_running(self) -> bool {
        self == MachineStatus::Running
    }
}

/// A 32-byte digest of machine state.
///
/// Serialises as a `0x`-prefixed hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Bytes32(pub [u8; 32]);

impl Bytes32 {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build a digest from a slice, returning `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);
        let bytes = hex::decode(digits).map_err(serde::de::Error::custom)?;
        Bytes32::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom(format!("expected 32 bytes, got {}", bytes.len())))
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Snapshot of a machine at a served position.
///
/// `position` is authoritative: it equals the requested position, or the
/// position the machine halted at when it stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStepResult<G> {
    pub position: u64,
    pub status: MachineStatus,
    pub global_state: G,
    pub hash: Bytes32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes32_displays_as_prefixed_hex() {
        let mut raw = [0u8; 32];
        raw[0] = 0xab;
        raw[31] = 0x01;
        let digest = Bytes32(raw);
        let shown = digest.to_string();
        assert!(shown.starts_with("0xab00"));
        assert!(shown.ends_with("01"));
        assert_eq!(shown.len(), 2 + 64);
    }

    #[test]
    fn bytes32_from_slice_requires_exact_length() {
        assert!(Bytes32::from_slice(&[1u8; 31]).is_none());
        assert_eq!(Bytes32::from_slice(&[1u8; 32]), Some(Bytes32([1u8; 32])));
    }

    #[test]
    fn bytes32_serde_uses_hex_string() {
        let digest = Bytes32([0x11; 32]);
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "11".repeat(32)));
        let back: Bytes32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
        assert!(serde_json::from_str::<Bytes32>("\"0x1234\"").is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&MachineStatus::Finished).unwrap();
        assert_eq!(json, "\"finished\"");
        assert!(MachineStatus::Running.is_running());
        assert!(!MachineStatus::Errored.is_running());
    }
}
