//! Error types for the social core
//!
//! Every failure carries one of the five `ErrorKind`s the request layer maps
//! onto its own status codes. Store errors are classified on conversion, so
//! `?` on a `sqlx::Error` already yields the right kind.
use resilience::TimeoutError;
use thiserror::Error;
use uuid::Uuid;

/// Postgres SQLSTATE codes the core reacts to
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const READ_ONLY_SQL_TRANSACTION: &str = "25006";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
}

/// Coarse failure classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailed,
    Infrastructure,
    BusinessRuleViolation,
}

#[derive(Error, Debug)]
pub enum SocialError {
    #[error("{resource} not found")]
    NotFound {
        resource: &'static str,
        id: Option<Uuid>,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Business rule violated: {0}")]
    BusinessRule(String),

    #[error("Write rejected by read-only transaction: {message}")]
    ReadOnlyViolation { message: String },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Rollback failed ({rollback_error}) after: {cause}")]
    RollbackFailed {
        #[source]
        cause: Box<SocialError>,
        rollback_error: sqlx::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SocialError {
    pub fn not_found(resource: &'static str, id: Uuid) -> Self {
        Self::NotFound {
            resource,
            id: Some(id),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::BusinessRule(_) | Self::ReadOnlyViolation { .. } => {
                ErrorKind::BusinessRuleViolation
            }
            Self::Database(_)
            | Self::Timeout { .. }
            | Self::RollbackFailed { .. }
            | Self::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }

    /// The failure that started it all; a rollback failure points at its trigger
    pub fn root_cause(&self) -> &SocialError {
        match self {
            Self::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Log error with a level matching its kind
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::ValidationFailed | ErrorKind::Conflict => {
                tracing::debug!(error = %self, "Client error");
            }
            ErrorKind::BusinessRuleViolation => {
                tracing::info!(error = %self, "Business rule violation");
            }
            ErrorKind::Infrastructure => match self {
                Self::RollbackFailed { cause, rollback_error } => {
                    tracing::error!(
                        root_cause = %cause.root_cause(),
                        rollback_error = %rollback_error,
                        "Rollback failed; data consistency at risk"
                    );
                }
                Self::Timeout { operation } => {
                    tracing::warn!(operation, "Deadline exceeded");
                }
                _ => tracing::error!(error = %self, "Server error"),
            },
        }
    }
}

fn resource_for_constraint(constraint: &str) -> &'static str {
    match constraint {
        c if c.ends_with("post_id_fkey") => "post",
        c if c.ends_with("band_id_fkey") => "band",
        c if c.ends_with("user_id_fkey") || c.ends_with("follower_id_fkey") => "user",
        _ => "entity",
    }
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_username_key" => "username already taken".to_string(),
        "users_email_key" => "email already registered".to_string(),
        other => format!("duplicate record ({})", other),
    }
}

/// Server-side cancellation from `statement_timeout` or `lock_timeout`
fn is_server_timeout(code: &str) -> bool {
    matches!(code, sqlstate::QUERY_CANCELED | sqlstate::LOCK_NOT_AVAILABLE)
}

impl From<sqlx::Error> for SocialError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return Self::NotFound {
                resource: "row",
                id: None,
            };
        }

        let classified = err.as_database_error().and_then(|db_err| {
            let constraint = db_err.constraint().unwrap_or_default();
            match db_err.code().as_deref() {
                Some(sqlstate::UNIQUE_VIOLATION) => Some(Self::Conflict {
                    message: conflict_message(constraint),
                }),
                Some(sqlstate::FOREIGN_KEY_VIOLATION) => Some(Self::NotFound {
                    resource: resource_for_constraint(constraint),
                    id: None,
                }),
                Some(sqlstate::CHECK_VIOLATION) => Some(Self::Validation(format!(
                    "constraint {} rejected the value",
                    constraint
                ))),
                Some(sqlstate::READ_ONLY_SQL_TRANSACTION) => Some(Self::ReadOnlyViolation {
                    message: db_err.message().to_string(),
                }),
                Some(code) if is_server_timeout(code) => Some(Self::Timeout {
                    operation: "statement",
                }),
                _ => None,
            }
        });

        classified.unwrap_or(Self::Database(err))
    }
}

impl From<TimeoutError> for SocialError {
    fn from(err: TimeoutError) -> Self {
        Self::Timeout {
            operation: err.operation(),
        }
    }
}

impl From<validator::ValidationErrors> for SocialError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// Result type alias for core operations
pub type SocialResult<T> = Result<T, SocialError>;
