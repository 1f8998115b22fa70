//! Execution runs: query dispatch over a replaceable cache.

use std::future::Future;
use std::sync::{Arc, RwLock};

use replay_cache::{InitialMachineGetter, MachineCache};
use replay_core::{
    Error, Machine, MachineCacheConfig, MachineStepResult, Result, StepRange, LAST_STEP,
};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::promise::Promise;

/// Serves step and proof queries for one machine.
///
/// Every query runs as its own task under a child of the run's
/// cancellation scope. [`ExecutionRun::close`] cancels the scope; every
/// promise handed out before or after that settles.
pub struct ExecutionRun<M: Machine> {
    scope: CancellationToken,
    cache: RwLock<Arc<MachineCache<M>>>,
    ranging: Mutex<()>,
    runtime: Handle,
}

impl<M: Machine> ExecutionRun<M> {
    /// Open a run under `parent`. Must be called from within a tokio runtime.
    pub fn new(
        parent: &CancellationToken,
        initial_machine_getter: InitialMachineGetter<M>,
        config: MachineCacheConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Task(e.to_string()))?;
        let scope = parent.child_token();
        let cache = MachineCache::new(scope.clone(), initial_machine_getter, config)?;
        debug!("execution run opened");
        Ok(Self {
            scope,
            cache: RwLock::new(Arc::new(cache)),
            ranging: Mutex::new(()),
            runtime,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn close(&self) {
        if !self.scope.is_cancelled() {
            info!("closing execution run");
            self.scope.cancel();
        }
    }

    /// Step range served by the active cache generation.
    pub fn range(&self) -> Result<StepRange> {
        Ok(self.active_cache()?.range())
    }

    /// Replace the active cache with one restricted to `[start, end)`.
    ///
    /// Queries already dispatched keep the cache they started on. Calls are
    /// applied one after another, each narrowing the previous generation.
    pub async fn prepare_range(&self, start: u64, end: u64) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        StepRange::new(start, end)?;

        let _ranging = self.ranging.lock().await;
        let current = self.active_cache()?;
        let next = tokio::select! {
            biased;
            _ = self.scope.cancelled() => return Err(Error::Closed),
            next = current.spawn_with_range(&self.scope, start, end) => next?,
        };
        if self.is_closed() {
            return Err(Error::Closed);
        }
        *self
            .cache
            .write()
            .map_err(|_| Error::Task("cache lock poisoned".into()))? = Arc::new(next);
        info!(start, end, "prepared step range");
        Ok(())
    }

    pub fn step_at(&self, position: u64) -> Promise<MachineStepResult<M::GlobalState>> {
        self.launch(move |cache, token| async move { cache.step_at(&token, position).await })
    }

    /// The step result once the machine halts.
    pub fn last_step(&self) -> Promise<MachineStepResult<M::GlobalState>> {
        self.step_at(LAST_STEP)
    }

    /// Proof of the transition from `position` to `position + 1`.
    pub fn proof_at(&self, position: u64) -> Promise<Vec<u8>> {
        self.launch(move |cache, token| async move { cache.proof_at(&token, position).await })
    }

    fn active_cache(&self) -> Result<Arc<MachineCache<M>>> {
        self.cache
            .read()
            .map(|cache| cache.clone())
            .map_err(|_| Error::Task("cache lock poisoned".into()))
    }

    fn launch<T, F, Fut>(&self, query: F) -> Promise<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Arc<MachineCache<M>>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let promise = Promise::new();
        if self.is_closed() {
            let _ = promise.produce_error(Error::Closed);
            return promise;
        }
        let cache = match self.active_cache() {
            Ok(cache) => cache,
            Err(e) => {
                let _ = promise.produce_error(e);
                return promise;
            }
        };

        let token = self.scope.child_token();
        promise.set_cancel(token.clone());
        let work = query(cache, token.clone());
        let producer = promise.clone();
        self.runtime.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = work => result,
            };
            if let Err(e) = &result {
                debug!(error = %e, "query failed");
            }
            let _ = producer.produce_result(result);
        });
        promise
    }
}

impl<M: Machine> Drop for ExecutionRun<M> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
