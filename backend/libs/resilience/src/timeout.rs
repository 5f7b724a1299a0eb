/// Deadline-bounded execution for async operations
///
/// A `Deadline` is an absolute point in time that travels with a logical
/// operation. Every suspension point (store call, transaction step) is run
/// through `with_deadline`, so the whole operation shares one time budget
/// instead of each call getting a fresh timeout.
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Default budget for a single logical operation (database config preset)
pub const DEFAULT_OPERATION_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::after(DEFAULT_OPERATION_BUDGET)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    #[error("{operation} exceeded its deadline")]
    Elapsed { operation: &'static str },
}

impl TimeoutError {
    pub fn operation(&self) -> &'static str {
        match self {
            TimeoutError::Elapsed { operation } => operation,
        }
    }
}

/// Execute a future, failing with `TimeoutError::Elapsed` once `deadline` passes.
///
/// An already-expired deadline fails without polling `future`, so no store
/// call is issued on behalf of an operation whose caller has given up.
pub async fn with_deadline<F, T>(
    deadline: Deadline,
    operation: &'static str,
    future: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    if deadline.is_expired() {
        tracing::debug!(operation, "deadline already expired, skipping call");
        return Err(TimeoutError::Elapsed { operation });
    }

    timeout_at(deadline.instant(), future).await.map_err(|_| {
        tracing::warn!(operation, "operation exceeded deadline");
        TimeoutError::Elapsed { operation }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deadline_success() {
        let result = with_deadline(Deadline::after(Duration::from_secs(1)), "noop", async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_deadline_elapsed() {
        let result = with_deadline(Deadline::after(Duration::from_millis(10)), "slow", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        match result {
            Err(err) => assert_eq!(err.operation(), "slow"),
            Ok(_) => panic!("expected deadline to elapse"),
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_never_polls_future() {
        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(1));

        let result = with_deadline(deadline, "store_call", async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(result.is_err());
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shared_deadline_budget_shrinks() {
        let deadline = Deadline::after(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(deadline.remaining() < Duration::from_millis(200));
        assert!(!deadline.is_expired());
    }
}
