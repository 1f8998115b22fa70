use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared counter of executed steps.
///
/// Clones of a metered machine share the same meter, so the total covers
/// every checkpoint restored from it as well.
#[derive(Debug, Clone, Default)]
pub struct StepMeter(Arc<AtomicU64>);

impl StepMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, steps: u64) {
        self.0.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
