//! Single-assignment asynchronous results.

use std::sync::{Arc, OnceLock};

use replay_core::{Error, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

struct Inner<T> {
    slot: watch::Sender<Option<Result<T>>>,
    cancel: OnceLock<CancellationToken>,
}

/// A result that is produced exactly once and may be awaited many times.
///
/// Clones share the same slot. The producer settles it with
/// [`Promise::produce`] or [`Promise::produce_error`]; any later production
/// is rejected with [`Error::AlreadyResolved`] and leaves the first outcome
/// in place.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                slot,
                cancel: OnceLock::new(),
            }),
        }
    }

    pub fn produce(&self, value: T) -> Result<()> {
        self.produce_result(Ok(value))
    }

    pub fn produce_error(&self, err: Error) -> Result<()> {
        self.produce_result(Err(err))
    }

    pub fn produce_result(&self, result: Result<T>) -> Result<()> {
        let mut accepted = false;
        self.inner.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            accepted = true;
            true
        });
        if accepted {
            Ok(())
        } else {
            warn!("ignoring second resolution of a settled promise");
            Err(Error::AlreadyResolved)
        }
    }

    /// Attach the token that stops the work behind this promise.
    ///
    /// Only the first call takes effect; it returns `false` afterwards.
    pub fn set_cancel(&self, token: CancellationToken) -> bool {
        self.inner.cancel.set(token).is_ok()
    }

    /// Fire the attached cancel hook, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.inner.cancel.get() {
            token.cancel();
        }
    }

    pub fn is_settled(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }

    /// The terminal outcome, if the promise has settled.
    pub fn try_result(&self) -> Option<Result<T>> {
        self.inner.slot.borrow().clone()
    }

    /// Wait for the outcome.
    ///
    /// If `ctx` is cancelled first, the attached hook is fired and
    /// [`Error::Cancelled`] is returned. An already settled promise always
    /// returns its outcome.
    pub async fn wait(&self, ctx: &CancellationToken) -> Result<T> {
        let mut rx = self.inner.slot.subscribe();
        let settled = async {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|slot| slot.clone())
                .unwrap_or(Err(Error::Cancelled))
        };

        tokio::select! {
            biased;
            result = settled => result,
            _ = ctx.cancelled() => {
                self.cancel();
                Err(Error::Cancelled)
            }
        }
    }

    pub async fn wait_uncancellable(&self) -> Result<T> {
        self.wait(&CancellationToken::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const BOUND: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn awaiting_twice_returns_the_same_value() {
        let promise = Promise::new();
        promise.produce(42u64).unwrap();

        let ctx = CancellationToken::new();
        assert_eq!(promise.wait(&ctx).await, Ok(42));
        assert_eq!(promise.wait(&ctx).await, Ok(42));
        assert_eq!(promise.try_result(), Some(Ok(42)));
    }

    #[tokio::test]
    async fn second_production_is_rejected() {
        let promise = Promise::new();
        promise.produce_error(Error::Factory("boom".into())).unwrap();

        assert_eq!(promise.produce(1u64), Err(Error::AlreadyResolved));
        assert_eq!(
            promise.wait_uncancellable().await,
            Err(Error::Factory("boom".into()))
        );
    }

    #[tokio::test]
    async fn cancelled_wait_fires_hook_and_returns_promptly() {
        let promise: Promise<u64> = Promise::new();
        let hook = CancellationToken::new();
        assert!(promise.set_cancel(hook.clone()));

        let ctx = CancellationToken::new();
        let waiter = {
            let promise = promise.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { promise.wait(&ctx).await })
        };
        ctx.cancel();

        let result = tokio::time::timeout(BOUND, waiter).await.unwrap().unwrap();
        assert_eq!(result, Err(Error::Cancelled));
        assert!(hook.is_cancelled());
        assert!(!promise.is_settled());
    }

    #[tokio::test]
    async fn settled_value_wins_over_cancelled_context() {
        let promise = Promise::new();
        promise.produce("done".to_string()).unwrap();
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert_eq!(promise.wait(&ctx).await, Ok("done".to_string()));
    }

    #[test]
    fn cancel_hook_attaches_once() {
        let promise: Promise<()> = Promise::new();
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        assert!(promise.set_cancel(first.clone()));
        assert!(!promise.set_cancel(second.clone()));

        promise.cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn all_waiters_observe_the_single_production() {
        let promise: Promise<Vec<u8>> = Promise::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let promise = promise.clone();
                tokio::spawn(async move { promise.wait_uncancellable().await })
            })
            .collect();

        promise.produce(vec![1, 2, 3]).unwrap();
        for waiter in waiters {
            let result = tokio::time::timeout(BOUND, waiter).await.unwrap().unwrap();
            assert_eq!(result, Ok(vec![1, 2, 3]));
        }
    }
}
