//! The asynchronous cache front-end.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use replay_core::{
    Error, Machine, MachineCacheConfig, MachineStepResult, Result, StepRange, LAST_STEP,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::checkpoint::{advance_to, CacheState};

/// Factory for a cache's genesis machine.
///
/// Receives the cache's scope token so a slow factory can stop early when
/// the owning run is closed.
pub type InitialMachineGetter<M> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<M>> + Send + Sync>;

type InitialMachine<M> = Shared<BoxFuture<'static, Result<M>>>;

/// Wrap an async closure as an [`InitialMachineGetter`].
pub fn machine_getter<M, F, Fut>(f: F) -> InitialMachineGetter<M>
where
    M: Machine,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<M>> + Send + 'static,
{
    Arc::new(move |token| f(token).boxed())
}

/// Random-access view over one replay machine.
///
/// All stepping happens on the blocking pool while holding the cache's
/// exclusive lock, so concurrent queries against one cache are serialised.
/// Caches produced by [`MachineCache::spawn_with_range`] share nothing with
/// their parent.
pub struct MachineCache<M: Machine> {
    scope: CancellationToken,
    getter: Option<InitialMachineGetter<M>>,
    initial: StdMutex<Option<InitialMachine<M>>>,
    range: StepRange,
    config: MachineCacheConfig,
    state: Arc<Mutex<CacheState<M>>>,
}

impl<M: Machine> MachineCache<M> {
    /// Create a root cache. The getter is not called until the first query.
    pub fn new(
        scope: CancellationToken,
        getter: InitialMachineGetter<M>,
        config: MachineCacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scope,
            getter: Some(getter),
            initial: StdMutex::new(None),
            range: config.range()?,
            config,
            state: Arc::new(Mutex::new(CacheState::new())),
        })
    }

    /// Create a cache whose initial machine is already materialised.
    pub fn with_initial_machine(
        scope: CancellationToken,
        machine: M,
        range: StepRange,
        config: MachineCacheConfig,
    ) -> Result<Self> {
        let config = config.with_range(range.start, range.end);
        config.validate()?;
        let ready: BoxFuture<'static, Result<M>> = futures::future::ready(Ok(machine)).boxed();
        Ok(Self {
            scope,
            getter: None,
            initial: StdMutex::new(Some(ready.shared())),
            range,
            config,
            state: Arc::new(Mutex::new(CacheState::new())),
        })
    }

    pub fn range(&self) -> StepRange {
        self.range
    }

    pub fn config(&self) -> &MachineCacheConfig {
        &self.config
    }

    /// Positions of the checkpoints currently retained, ascending.
    pub async fn checkpoint_positions(&self) -> Vec<u64> {
        self.state.lock().await.checkpoint_positions()
    }

    /// The machine at `position`, or at its halt if it stopped earlier.
    ///
    /// [`LAST_STEP`] runs the machine to completion.
    pub async fn machine_at(&self, cancel: &CancellationToken, position: u64) -> Result<M> {
        self.with_machine_at(cancel, position, M::clone).await
    }

    pub async fn final_machine(&self, cancel: &CancellationToken) -> Result<M> {
        self.machine_at(cancel, LAST_STEP).await
    }

    pub async fn step_at(
        &self,
        cancel: &CancellationToken,
        position: u64,
    ) -> Result<MachineStepResult<M::GlobalState>> {
        self.with_machine_at(cancel, position, |m| m.step_result())
            .await
    }

    pub async fn proof_at(&self, cancel: &CancellationToken, position: u64) -> Result<Vec<u8>> {
        let proof = self
            .with_machine_at(cancel, position, |m| m.prove_next_step())
            .await?;
        Ok(proof?)
    }

    /// Build an independent cache restricted to `[start, end)`.
    ///
    /// `end == LAST_STEP` leaves the new cache unbounded above.
    pub async fn spawn_with_range(
        &self,
        cancel: &CancellationToken,
        start: u64,
        end: u64,
    ) -> Result<Self> {
        let range = StepRange::new(start, end)?;
        let machine = self.machine_at(cancel, start).await?;
        debug!(start, end = ?range.end, initial = machine.step_count(), "spawned range cache");
        Self::with_initial_machine(self.scope.clone(), machine, range, self.config.clone())
    }

    async fn with_machine_at<R, F>(
        &self,
        cancel: &CancellationToken,
        position: u64,
        read: F,
    ) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&M) -> R + Send + 'static,
    {
        if position != LAST_STEP {
            self.range.check(position)?;
        }
        let initial = self.initial_machine().await?;
        let mut state = self.state.clone().lock_owned().await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let cancel = cancel.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let machine = state.seek(&initial, position, &cancel, &config)?;
            Ok(read(machine))
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Resolve the genesis machine, invoking the getter at most once.
    async fn initial_machine(&self) -> Result<M> {
        let pending = {
            let mut slot = self
                .initial
                .lock()
                .map_err(|_| Error::Task("initial machine slot poisoned".into()))?;
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.load_initial().shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn load_initial(&self) -> BoxFuture<'static, Result<M>> {
        Self::build_initial(
            self.getter.clone(),
            self.scope.clone(),
            self.range.start,
            self.config.advance_chunk,
        )
        .boxed()
    }

    async fn build_initial(
        getter: Option<InitialMachineGetter<M>>,
        scope: CancellationToken,
        start: u64,
        chunk: u64,
    ) -> Result<M> {
        let getter = getter.ok_or_else(|| Error::Factory("no initial machine getter".into()))?;
        let mut machine = getter(scope.clone()).await.map_err(|e| match e {
            Error::Cancelled | Error::Factory(_) => e,
            other => Error::Factory(other.to_string()),
        })?;

        let steps = machine.step_count();
        if steps < start {
            debug!(from = steps, to = start, "advancing initial machine to range start");
            machine = tokio::task::spawn_blocking(move || {
                advance_to(&mut machine, start, &scope, chunk).map(|_| machine)
            })
            .await
            .map_err(|e| Error::Task(e.to_string()))??;
        }
        Ok(machine)
    }
}
