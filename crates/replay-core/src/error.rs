use thiserror::Error;

/// A fault raised by a machine while it was being advanced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("machine fault at step {step}: {message}")]
pub struct MachineError {
    pub step: u64,
    pub message: String,
}

impl MachineError {
    pub fn new(step: u64, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the cache and the execution run.
///
/// The type is `Clone` because a settled promise hands the same terminal
/// value to every consumer that awaits it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("failed to build initial machine: {0}")]
    Factory(String),

    #[error("machine is in wrong position want: {requested}, got: {actual}")]
    PositionConsistency { requested: u64, actual: u64 },

    #[error(transparent)]
    StepExecution(#[from] MachineError),

    #[error("invalid step range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("position {position} is outside cache range [{start}, {})", fmt_end(.end))]
    OutOfRange {
        position: u64,
        start: u64,
        end: Option<u64>,
    },

    #[error("query cancelled")]
    Cancelled,

    #[error("execution run is closed")]
    Closed,

    #[error("promise was already resolved")]
    AlreadyResolved,

    #[error("invalid cache config: {0}")]
    InvalidConfig(String),

    #[error("stepping task failed: {0}")]
    Task(String),
}

impl Error {
    /// Whether this error is the expected outcome of an abandoned query.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

fn fmt_end(end: &Option<u64>) -> String {
    match end {
        Some(end) => end.to_string(),
        None => "inf".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_display_handles_unbounded_end() {
        let bounded = Error::OutOfRange {
            position: 200,
            start: 50,
            end: Some(150),
        };
        assert_eq!(
            bounded.to_string(),
            "position 200 is outside cache range [50, 150)"
        );

        let unbounded = Error::OutOfRange {
            position: 3,
            start: 10,
            end: None,
        };
        assert_eq!(
            unbounded.to_string(),
            "position 3 is outside cache range [10, inf)"
        );
    }

    #[test]
    fn machine_error_converts_verbatim() {
        let fault = MachineError::new(7, "stack underflow");
        let err: Error = fault.clone().into();
        assert_eq!(err, Error::StepExecution(fault));
        assert_eq!(err.to_string(), "machine fault at step 7: stack underflow");
    }
}
