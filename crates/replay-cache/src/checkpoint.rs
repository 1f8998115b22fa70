//! Checkpoint bookkeeping and the stepping walk.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use replay_core::{Error, Machine, MachineCacheConfig, Result, LAST_STEP};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Check that `machine` is a valid answer for a request at `requested`.
///
/// A machine past the requested position, or one that is still running
/// short of it, means the stepping logic is broken. On success the
/// machine's own step count is the authoritative position: it equals
/// `requested`, or the position where the machine halted.
pub fn validate_position<M: Machine>(requested: u64, machine: &M) -> Result<u64> {
    let actual = machine.step_count();
    if actual > requested || (machine.is_running() && actual != requested) {
        return Err(Error::PositionConsistency { requested, actual });
    }
    Ok(actual)
}

/// Mutable half of a cache. Only ever touched under the cache lock.
pub(crate) struct CacheState<M> {
    checkpoints: BTreeMap<u64, M>,
    live: Option<M>,
    final_machine: Option<M>,
}

impl<M: Machine> CacheState<M> {
    pub(crate) fn new() -> Self {
        Self {
            checkpoints: BTreeMap::new(),
            live: None,
            final_machine: None,
        }
    }

    pub(crate) fn checkpoint_positions(&self) -> Vec<u64> {
        self.checkpoints.keys().copied().collect()
    }

    /// Bring the live machine to `target` (or to its halt, for [`LAST_STEP`]).
    ///
    /// Checkpoints recorded along the way survive cancellation and machine
    /// faults; the live machine is only discarded when it fails validation.
    pub(crate) fn seek(
        &mut self,
        initial: &M,
        target: u64,
        cancel: &CancellationToken,
        config: &MachineCacheConfig,
    ) -> Result<&M> {
        let mut machine = self.restore(initial, target);
        let base = initial.step_count();

        while machine.is_running() && machine.step_count() < target {
            if cancel.is_cancelled() {
                self.live = Some(machine);
                return Err(Error::Cancelled);
            }

            let pos = machine.step_count();
            let boundary = next_boundary(base, config.checkpoint_interval, pos);
            let stop = target
                .min(boundary)
                .min(pos.saturating_add(config.advance_chunk));

            if let Err(fault) = machine.advance(stop - pos) {
                self.live = Some(machine);
                return Err(fault.into());
            }

            let reached = machine.step_count();
            if reached <= pos || reached > stop {
                // no progress or overshoot; validation reports it
                break;
            }
            if reached == boundary && machine.is_running() {
                self.record_checkpoint(&machine, target, config.max_checkpoints);
            }
        }

        if let Err(e) = validate_position(target, &machine) {
            error!(error = %e, "stepping produced an inconsistent machine, discarding it");
            return Err(e);
        }

        if !machine.is_running() && self.final_machine.is_none() {
            debug!(position = machine.step_count(), status = ?machine.status(), "machine halted");
            self.final_machine = Some(machine.clone());
        }
        Ok(self.live.insert(machine))
    }

    /// Pick the closest known machine at or before `target`.
    fn restore(&mut self, initial: &M, target: u64) -> M {
        if target == LAST_STEP {
            if let Some(done) = &self.final_machine {
                return done.clone();
            }
        }

        let checkpoint = self.checkpoints.range(..=target).next_back().map(|(&p, _)| p);
        let live = self
            .live
            .as_ref()
            .map(|m| m.step_count())
            .filter(|&p| p <= target);

        let use_live = match (live, checkpoint) {
            (Some(live), Some(cp)) => live >= cp,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if use_live {
            if let Some(machine) = self.live.take() {
                return machine;
            }
        }
        if let Some(snapshot) = checkpoint.and_then(|cp| self.checkpoints.get(&cp)) {
            debug!(checkpoint = snapshot.step_count(), target, "restoring checkpoint");
            return snapshot.clone();
        }
        initial.clone()
    }

    fn record_checkpoint(&mut self, machine: &M, focus: u64, max_checkpoints: usize) {
        if max_checkpoints == 0 {
            return;
        }
        let position = machine.step_count();
        self.checkpoints.insert(position, machine.clone());
        debug!(position, "recorded checkpoint");

        while self.checkpoints.len() > max_checkpoints {
            let Some(victim) = self
                .checkpoints
                .keys()
                .copied()
                .max_by_key(|&p| (p.abs_diff(focus), Reverse(p)))
            else {
                break;
            };
            self.checkpoints.remove(&victim);
            debug!(position = victim, focus, "evicted checkpoint");
        }
    }
}

/// Step `machine` forward to `target` without recording anything.
///
/// Runs in pieces of at most `chunk` steps and gives up with
/// [`Error::Cancelled`] as soon as `cancel` fires between two pieces.
pub(crate) fn advance_to<M: Machine>(
    machine: &mut M,
    target: u64,
    cancel: &CancellationToken,
    chunk: u64,
) -> Result<()> {
    while machine.is_running() && machine.step_count() < target {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let pos = machine.step_count();
        machine.advance(target.min(pos.saturating_add(chunk)) - pos)?;
        if machine.step_count() <= pos {
            break;
        }
    }
    Ok(())
}

/// First checkpoint boundary strictly after `pos`.
fn next_boundary(base: u64, interval: u64, pos: u64) -> u64 {
    let k = pos.saturating_sub(base) / interval + 1;
    base.saturating_add(k.saturating_mul(interval))
}
