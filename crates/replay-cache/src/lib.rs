//! Checkpointed machine cache.
//!
//! A [`MachineCache`] owns one live replay machine and a bounded set of
//! checkpoints cloned from it. Requests for the machine at step `N` restore
//! the nearest checkpoint at or before `N` and step forward, so a bisection
//! protocol can probe arbitrary positions of a very long trace without
//! replaying it from genesis every time.

mod cache;
mod checkpoint;

pub use cache::{machine_getter, InitialMachineGetter, MachineCache};
pub use checkpoint::validate_position;
