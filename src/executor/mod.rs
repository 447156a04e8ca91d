//! Transactional executor
//!
//! Runs a unit of work inside a fresh write transaction and retries it when the
//! store reports a retryable failure:
//! - **Unavailable** (connection lost, session expired): retried immediately
//! - **WriteConflict** (deadlock): retried after an exponential backoff with jitter
//! - anything else: returned to the caller on the first occurrence
//!
//! Every attempt opens its own transaction. The work is committed when it
//! returns `Ok` and rolled back otherwise.

pub mod retry;

pub use retry::{RetryPolicy, RetryState};

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::neo4j::{GraphStore, GraphTxn, StoreError};

/// A unit of work that can run (possibly several times) inside a transaction.
#[async_trait]
pub trait TransactionWork: Send + Sync {
    type Output: Send + 'static;

    async fn run(&self, txn: &mut dyn GraphTxn) -> Result<Self::Output, StoreError>;
}

/// Work backed by a closure. Built with [`from_fn`].
pub struct FnWork<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

/// Adapt a closure into [`TransactionWork`].
///
/// ```ignore
/// let work = from_fn(|txn| Box::pin(async move { txn.count_scoped_concepts(&scope).await }));
/// ```
pub fn from_fn<F, T>(f: F) -> FnWork<F, T>
where
    F: for<'t> Fn(&'t mut dyn GraphTxn) -> BoxFuture<'t, Result<T, StoreError>> + Send + Sync,
    T: Send + 'static,
{
    FnWork {
        f,
        _output: PhantomData,
    }
}

#[async_trait]
impl<F, T> TransactionWork for FnWork<F, T>
where
    F: for<'t> Fn(&'t mut dyn GraphTxn) -> BoxFuture<'t, Result<T, StoreError>> + Send + Sync,
    T: Send + 'static,
{
    type Output = T;

    async fn run(&self, txn: &mut dyn GraphTxn) -> Result<T, StoreError> {
        (self.f)(txn).await
    }
}

/// Wraps work in retried write transactions.
#[derive(Clone)]
pub struct TransactionalExecutor {
    store: Arc<dyn GraphStore>,
    policy: RetryPolicy,
}

impl TransactionalExecutor {
    pub fn new(store: Arc<dyn GraphStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` until it commits, fails with a non-retryable error, or
    /// `max_attempts` is exhausted. The last error is returned on failure.
    pub async fn execute<W>(&self, work: &W) -> Result<W::Output, StoreError>
    where
        W: TransactionWork + ?Sized,
    {
        let mut state = RetryState::default();
        loop {
            state.attempt += 1;
            let err = match self.attempt(work).await {
                Ok(output) => {
                    if state.attempt > 1 {
                        tracing::debug!(attempts = state.attempt, "Transaction committed after retry");
                    }
                    return Ok(output);
                }
                Err(err) => err,
            };

            let class = err.class();
            state.last_class = Some(class);
            let Some(delay) = self.policy.delay_for(class, state.attempt) else {
                if class.is_retryable() {
                    tracing::error!(
                        attempts = state.attempt,
                        class = %class,
                        error = %err,
                        "Transaction retries exhausted"
                    );
                }
                return Err(err);
            };
            state.next_delay = delay;

            tracing::warn!(
                attempt = state.attempt,
                max_attempts = self.policy.max_attempts,
                class = %class,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying transaction"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn attempt<W>(&self, work: &W) -> Result<W::Output, StoreError>
    where
        W: TransactionWork + ?Sized,
    {
        let mut txn = self.store.begin().await?;
        match work.run(txn.as_mut()).await {
            Ok(output) => {
                txn.commit().await?;
                Ok(output)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::debug!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}
