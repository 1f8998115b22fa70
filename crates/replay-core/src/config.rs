//! Cache configuration and step ranges.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::step::LAST_STEP;

/// Default number of steps executed between two cancellation checks.
pub const DEFAULT_ADVANCE_CHUNK: u64 = 1 << 16;

/// Tuning for a checkpointed machine cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MachineCacheConfig {
    /// Step distance between two recorded checkpoints.
    pub checkpoint_interval: u64,

    /// Maximum number of checkpoints retained at once.
    pub max_checkpoints: usize,

    /// Largest number of steps executed between two cancellation checks.
    pub advance_chunk: u64,

    /// First position the root cache may serve.
    pub range_start: u64,

    /// Exclusive upper bound on served positions (`None` = unbounded).
    pub range_end: Option<u64>,
}

impl Default for MachineCacheConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 100_000,
            max_checkpoints: 10,
            advance_chunk: DEFAULT_ADVANCE_CHUNK,
            range_start: 0,
            range_end: None,
        }
    }
}

impl MachineCacheConfig {
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max;
        self
    }

    pub fn with_advance_chunk(mut self, chunk: u64) -> Self {
        self.advance_chunk = chunk;
        self
    }

    pub fn with_range(mut self, start: u64, end: Option<u64>) -> Self {
        self.range_start = start;
        self.range_end = end;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(Error::InvalidConfig(
                "checkpoint-interval must be greater than zero".into(),
            ));
        }
        if self.advance_chunk == 0 {
            return Err(Error::InvalidConfig(
                "advance-chunk must be greater than zero".into(),
            ));
        }
        self.range()?;
        Ok(())
    }

    /// The step range configured for the root cache.
    pub fn range(&self) -> Result<StepRange> {
        StepRange::new(self.range_start, self.range_end.unwrap_or(LAST_STEP))
    }
}

/// Half-open interval `[start, end)` of positions a cache may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl StepRange {
    pub const UNBOUNDED: StepRange = StepRange {
        start: 0,
        end: None,
    };

    /// Build a range, treating `end == LAST_STEP` as unbounded.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        let end = if end == LAST_STEP { None } else { Some(end) };
        Ok(Self { start, end })
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && self.end.is_none_or(|end| position < end)
    }

    /// Reject explicit positions the range does not cover.
    pub fn check(&self, position: u64) -> Result<()> {
        if self.contains(position) {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                position,
                start: self.start,
                end: self.end,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MachineCacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.range().unwrap(), StepRange::UNBOUNDED);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = MachineCacheConfig::default().with_checkpoint_interval(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_advance_chunk_is_rejected() {
        let config = MachineCacheConfig::default().with_advance_chunk(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config: MachineCacheConfig = serde_json::from_str(r#"{"advance-chunk": 1}"#).unwrap();
        assert_eq!(config.advance_chunk, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_parses_kebab_case_with_defaults() {
        let config: MachineCacheConfig =
            serde_json::from_str(r#"{"checkpoint-interval": 100, "range-end": 500}"#).unwrap();
        assert_eq!(config.checkpoint_interval, 100);
        assert_eq!(config.max_checkpoints, 10);
        assert_eq!(config.advance_chunk, DEFAULT_ADVANCE_CHUNK);
        assert_eq!(config.range_end, Some(500));
    }

    #[test]
    fn range_is_half_open() {
        let range = StepRange::new(50, 150).unwrap();
        assert!(!range.contains(49));
        assert!(range.contains(50));
        assert!(range.contains(149));
        assert!(!range.contains(150));
        assert_eq!(
            range.check(200),
            Err(Error::OutOfRange {
                position: 200,
                start: 50,
                end: Some(150)
            })
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(
            StepRange::new(10, 5),
            Err(Error::InvalidRange { start: 10, end: 5 })
        );
    }

    #[test]
    fn sentinel_end_means_unbounded() {
        let range = StepRange::new(7, LAST_STEP).unwrap();
        assert_eq!(range.end, None);
        assert!(range.contains(u64::MAX - 1));
    }
}
