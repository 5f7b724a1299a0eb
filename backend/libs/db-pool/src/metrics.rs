//! Prometheus metrics for the shared database pool
//!
//! Tracks pool occupancy and transaction outcomes.

use prometheus::{register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec};
use sqlx::PgPool;

lazy_static::lazy_static! {
    /// Database connection pool size by state (idle/active/max)
    static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Transactions finished, by mode (read_write/read_only) and outcome
    static ref DB_TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_transactions_total",
        "Transactions finished by mode and outcome",
        &["service", "mode", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// How an atomic unit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    RolledBack,
    RollbackFailed,
    Panicked,
    TimedOut,
}

impl TxOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxOutcome::Committed => "committed",
            TxOutcome::RolledBack => "rolled_back",
            TxOutcome::RollbackFailed => "rollback_failed",
            TxOutcome::Panicked => "panicked",
            TxOutcome::TimedOut => "timed_out",
        }
    }
}

/// Update connection pool gauges (called periodically)
pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let size = pool.size() as i64;
    let idle = pool.num_idle() as i64;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set(size - idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(pool.options().get_max_connections() as i64);
}

/// Count a finished transaction
pub fn record_transaction(service: &str, mode: &str, outcome: TxOutcome) {
    DB_TRANSACTIONS_TOTAL
        .with_label_values(&[service, mode, outcome.as_str()])
        .inc();
}
