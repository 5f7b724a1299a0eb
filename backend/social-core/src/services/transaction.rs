//! Atomic units of work over the shared pool.
//!
//! `run_atomic` / `run_read_only` hand the body a transaction handle. Every
//! exit path ends the transaction exactly once:
//!
//! | body result         | action                 | caller sees                    |
//! |---------------------|------------------------|--------------------------------|
//! | `Ok(v)`             | commit                 | `Ok(v)` (or the commit error)  |
//! | `Err(e)`            | rollback               | `e`, or `RollbackFailed{e, ..}`|
//! | deadline elapsed    | rollback               | `Timeout`                      |
//! | panic               | rollback, then unwind  | the original panic             |
//!
//! Postgres transactions carry the caller's remaining budget as
//! `statement_timeout` and `lock_timeout`, so a statement stuck on a lock is
//! cancelled by the server instead of holding the connection past the
//! deadline. A rollback that still stalls is abandoned after
//! `ROLLBACK_GRACE` and its connection is dropped rather than reused.

use crate::error::{SocialError, SocialResult};
use async_trait::async_trait;
use db_pool::{record_transaction, TxOutcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use resilience::{with_deadline, Deadline};
use sqlx::{PgPool, Postgres, Transaction};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Metrics label for transactions issued by this crate
pub const SERVICE_NAME: &str = "social-core";

/// Longest wait for a rollback before the handle is abandoned
pub const ROLLBACK_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadWrite,
    /// Non-mutating snapshot; writes fail at the store
    ReadOnly,
}

impl TxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxMode::ReadWrite => "read_write",
            TxMode::ReadOnly => "read_only",
        }
    }
}

/// Store that can open, commit and roll back transactions
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Handle: Send;

    /// Statements issued through the handle must not outlive `deadline`
    async fn begin(&self, mode: TxMode, deadline: Deadline) -> Result<Self::Handle, sqlx::Error>;

    async fn commit(&self, handle: Self::Handle) -> Result<(), sqlx::Error>;

    async fn rollback(&self, handle: Self::Handle) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl TransactionalStore for PgPool {
    type Handle = Transaction<'static, Postgres>;

    async fn begin(&self, mode: TxMode, deadline: Deadline) -> Result<Self::Handle, sqlx::Error> {
        let mut tx = sqlx::Pool::begin(self).await?;
        if mode == TxMode::ReadOnly {
            // Snapshot isolation so multi-statement reads (page + counts) agree.
            // Must precede every other statement in the transaction.
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                .execute(&mut *tx)
                .await?;
        }

        // 0 disables both timeouts in Postgres, so never go below 1ms
        let budget_ms = deadline.remaining().as_millis().max(1).to_string();
        sqlx::query(
            "SELECT set_config('statement_timeout', $1, true), set_config('lock_timeout', $1, true)",
        )
        .bind(&budget_ms)
        .execute(&mut *tx)
        .await?;

        Ok(tx)
    }

    async fn commit(&self, handle: Self::Handle) -> Result<(), sqlx::Error> {
        handle.commit().await
    }

    async fn rollback(&self, handle: Self::Handle) -> Result<(), sqlx::Error> {
        handle.rollback().await
    }
}

/// Runs bodies inside transactions with guaranteed cleanup
#[derive(Clone)]
pub struct TransactionCoordinator<S = PgPool> {
    store: S,
}

impl<S: TransactionalStore> TransactionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// All statements issued through the handle commit together or not at all
    pub async fn run_atomic<T, F>(
        &self,
        deadline: Deadline,
        operation: &'static str,
        body: F,
    ) -> SocialResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, SocialResult<T>> + Send,
    {
        self.run(TxMode::ReadWrite, deadline, operation, body).await
    }

    /// Like `run_atomic`, but the store rejects any write issued by `body`
    pub async fn run_read_only<T, F>(
        &self,
        deadline: Deadline,
        operation: &'static str,
        body: F,
    ) -> SocialResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, SocialResult<T>> + Send,
    {
        self.run(TxMode::ReadOnly, deadline, operation, body).await
    }

    async fn run<T, F>(
        &self,
        mode: TxMode,
        deadline: Deadline,
        operation: &'static str,
        body: F,
    ) -> SocialResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, SocialResult<T>> + Send,
    {
        let mut handle =
            with_deadline(deadline, operation, self.store.begin(mode, deadline)).await??;
        debug!(operation, mode = mode.as_str(), "transaction started");

        let outcome = AssertUnwindSafe(with_deadline(deadline, operation, body(&mut handle)))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Ok(value))) => {
                if deadline.is_expired() {
                    // Caller has given up; do not publish writes it will never observe
                    return self
                        .abort(
                            handle,
                            mode,
                            operation,
                            SocialError::Timeout { operation },
                            TxOutcome::TimedOut,
                        )
                        .await;
                }
                match self.store.commit(handle).await {
                    Ok(()) => {
                        record_transaction(SERVICE_NAME, mode.as_str(), TxOutcome::Committed);
                        debug!(operation, "transaction committed");
                        Ok(value)
                    }
                    Err(e) => {
                        // A failed COMMIT leaves nothing applied
                        record_transaction(SERVICE_NAME, mode.as_str(), TxOutcome::RolledBack);
                        warn!(operation, error = %e, "transaction commit failed");
                        Err(SocialError::from(e))
                    }
                }
            }
            Ok(Ok(Err(err))) => {
                self.abort(handle, mode, operation, err, TxOutcome::RolledBack)
                    .await
            }
            Ok(Err(elapsed)) => {
                self.abort(handle, mode, operation, elapsed.into(), TxOutcome::TimedOut)
                    .await
            }
            Err(panic) => {
                error!(operation, "transaction body panicked, rolling back");
                if let Err(rollback_error) = self.rollback_within_grace(handle).await {
                    error!(operation, error = %rollback_error, "rollback after panic failed");
                }
                record_transaction(SERVICE_NAME, mode.as_str(), TxOutcome::Panicked);
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn abort<T>(
        &self,
        handle: S::Handle,
        mode: TxMode,
        operation: &'static str,
        cause: SocialError,
        outcome: TxOutcome,
    ) -> SocialResult<T> {
        match self.rollback_within_grace(handle).await {
            Ok(()) => {
                record_transaction(SERVICE_NAME, mode.as_str(), outcome);
                debug!(operation, cause = %cause, "transaction rolled back");
                Err(cause)
            }
            Err(rollback_error) => {
                record_transaction(SERVICE_NAME, mode.as_str(), TxOutcome::RollbackFailed);
                error!(
                    operation,
                    cause = %cause,
                    rollback_error = %rollback_error,
                    "transaction rollback failed"
                );
                Err(SocialError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback_error,
                })
            }
        }
    }

    /// Dropping the pending rollback drops the handle, which detaches its connection
    async fn rollback_within_grace(&self, handle: S::Handle) -> Result<(), sqlx::Error> {
        match tokio::time::timeout(ROLLBACK_GRACE, self.store.rollback(handle)).await {
            Ok(result) => result,
            Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "rollback did not finish within the grace period",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records the transaction lifecycle instead of talking to a database
    #[derive(Clone, Default)]
    struct FakeStore {
        events: Arc<Mutex<Vec<String>>>,
        committed_rows: Arc<Mutex<Vec<&'static str>>>,
        fail_rollback: bool,
        stall_rollback: bool,
    }

    struct FakeTx {
        mode: TxMode,
        pending_rows: Vec<&'static str>,
    }

    impl FakeTx {
        fn insert(&mut self, row: &'static str) -> SocialResult<()> {
            if self.mode == TxMode::ReadOnly {
                return Err(SocialError::ReadOnlyViolation {
                    message: format!("cannot insert {} in a read-only transaction", row),
                });
            }
            self.pending_rows.push(row);
            Ok(())
        }
    }

    impl FakeStore {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn committed_rows(&self) -> Vec<&'static str> {
            self.committed_rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransactionalStore for FakeStore {
        type Handle = FakeTx;

        async fn begin(&self, mode: TxMode, _deadline: Deadline) -> Result<FakeTx, sqlx::Error> {
            self.events
                .lock()
                .unwrap()
                .push(format!("begin:{}", mode.as_str()));
            Ok(FakeTx {
                mode,
                pending_rows: Vec::new(),
            })
        }

        async fn commit(&self, handle: FakeTx) -> Result<(), sqlx::Error> {
            self.events.lock().unwrap().push("commit".to_string());
            self.committed_rows
                .lock()
                .unwrap()
                .extend(handle.pending_rows);
            Ok(())
        }

        async fn rollback(&self, _handle: FakeTx) -> Result<(), sqlx::Error> {
            self.events.lock().unwrap().push("rollback".to_string());
            if self.stall_rollback {
                // Connection still waiting on a statement that never returns
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_rollback {
                return Err(sqlx::Error::PoolClosed);
            }
            Ok(())
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_successful_body_commits_every_step() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());

        let result = coordinator
            .run_atomic(deadline(), "create_band", |tx| {
                Box::pin(async move {
                    tx.insert("band")?;
                    tx.insert("band_member:admin")?;
                    Ok::<_, SocialError>(7)
                })
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(store.events(), vec!["begin:read_write", "commit"]);
        assert_eq!(store.committed_rows(), vec!["band", "band_member:admin"]);
    }

    #[tokio::test]
    async fn test_failing_step_leaves_no_rows() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());

        let result: SocialResult<()> = coordinator
            .run_atomic(deadline(), "create_band", |tx| {
                Box::pin(async move {
                    tx.insert("band")?;
                    Err::<(), _>(SocialError::not_found("user", uuid::Uuid::nil()))
                })
            })
            .await;

        assert!(matches!(result, Err(SocialError::NotFound { resource: "user", .. })));
        assert_eq!(store.events(), vec!["begin:read_write", "rollback"]);
        assert!(store.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_failure_reports_both_errors() {
        let store = FakeStore {
            fail_rollback: true,
            ..FakeStore::default()
        };
        let coordinator = TransactionCoordinator::new(store.clone());

        let result: SocialResult<()> = coordinator
            .run_atomic(deadline(), "leave_band", |_tx| {
                Box::pin(async move {
                    Err::<(), _>(SocialError::BusinessRule("not a member".into()))
                })
            })
            .await;

        match result {
            Err(SocialError::RollbackFailed {
                cause,
                rollback_error,
            }) => {
                assert!(matches!(*cause, SocialError::BusinessRule(_)));
                assert!(matches!(rollback_error, sqlx::Error::PoolClosed));
            }
            other => panic!("expected RollbackFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_rollback_gives_up_after_grace() {
        let store = FakeStore {
            stall_rollback: true,
            ..FakeStore::default()
        };
        let coordinator = TransactionCoordinator::new(store.clone());
        let started = std::time::Instant::now();

        let result: SocialResult<()> = coordinator
            .run_atomic(Deadline::after(Duration::from_millis(50)), "delete_post", |_tx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<(), SocialError>(())
                })
            })
            .await;

        assert!(started.elapsed() < ROLLBACK_GRACE + Duration::from_secs(1));
        match result {
            Err(err @ SocialError::RollbackFailed { .. }) => {
                assert!(matches!(
                    err.root_cause(),
                    SocialError::Timeout { operation: "delete_post" }
                ));
                assert_eq!(err.kind(), crate::error::ErrorKind::Infrastructure);
            }
            other => panic!("expected RollbackFailed, got {:?}", other),
        }
        assert_eq!(store.events(), vec!["begin:read_write", "rollback"]);
    }

    #[tokio::test]
    async fn test_panic_rolls_back_then_propagates() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());

        let joined = tokio::spawn(async move {
            coordinator
                .run_atomic(deadline(), "explode", |tx| {
                    Box::pin(async move {
                        tx.insert("band")?;
                        let explode = true;
                        if explode {
                            panic!("boom");
                        }
                        Ok::<(), SocialError>(())
                    })
                })
                .await
        })
        .await;

        let join_error = joined.expect_err("panic must propagate");
        assert!(join_error.is_panic());
        assert_eq!(store.events(), vec!["begin:read_write", "rollback"]);
        assert!(store.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_expiry_rolls_back() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());

        let result: SocialResult<()> = coordinator
            .run_atomic(Deadline::after(Duration::from_millis(20)), "slow_unit", |tx| {
                Box::pin(async move {
                    tx.insert("band")?;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok::<(), SocialError>(())
                })
            })
            .await;

        assert!(matches!(result, Err(SocialError::Timeout { operation: "slow_unit" })));
        assert_eq!(store.events(), vec!["begin:read_write", "rollback"]);
        assert!(store.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());

        let result: SocialResult<()> = coordinator
            .run_read_only(deadline(), "snapshot", |tx| {
                Box::pin(async move { tx.insert("like") })
            })
            .await;

        assert!(matches!(result, Err(SocialError::ReadOnlyViolation { .. })));
        assert_eq!(store.events(), vec!["begin:read_only", "rollback"]);
    }

    #[tokio::test]
    async fn test_read_only_success_commits() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());

        let value = coordinator
            .run_read_only(deadline(), "snapshot", |_tx| {
                Box::pin(async move { Ok::<_, SocialError>("page") })
            })
            .await
            .unwrap();

        assert_eq!(value, "page");
        assert_eq!(store.events(), vec!["begin:read_only", "commit"]);
    }

    #[tokio::test]
    async fn test_expired_deadline_never_begins() {
        let store = FakeStore::default();
        let coordinator = TransactionCoordinator::new(store.clone());
        let expired = Deadline::at(tokio::time::Instant::now() - Duration::from_millis(1));

        let result: SocialResult<()> = coordinator
            .run_atomic(expired, "late", |_tx| {
                Box::pin(async move { Ok::<(), SocialError>(()) })
            })
            .await;

        assert!(matches!(result, Err(SocialError::Timeout { .. })));
        assert!(store.events().is_empty());
    }
}
