//! # Error Handling
//!
//! Unified error taxonomy for the replication pipeline. Errors are classified
//! at the point they occur so the retry controller can decide between backoff
//! and immediate failure, and so validation failures route to the dead-letter
//! sink instead of failing a sync unit.

use thiserror::Error;

/// Classified error raised by source reads and destination writes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncError {
    #[serde(flatten)]
    pub kind: SyncErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Authentication/authorization failure against source or destination
    Unauthorized,
    /// Rate limited with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Transient/retryable error (network timeout, connection drop)
    Transient,
    /// Permanent/non-retryable error (malformed query, schema incompatibility)
    Permanent,
}

impl SyncError {
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Unauthorized,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: SyncErrorKind::RateLimited { retry_after_secs },
            message: None,
            details: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Transient,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Permanent,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether the retry controller should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SyncErrorKind::Transient | SyncErrorKind::RateLimited { .. }
        )
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SyncErrorKind::Unauthorized => {
                write!(f, "Unauthorized")?;
            }
            SyncErrorKind::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
            }
            SyncErrorKind::Transient => {
                write!(f, "Transient error")?;
            }
            SyncErrorKind::Permanent => {
                write!(f, "Permanent error")?;
            }
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

/// Validation failure produced by the schema mapper.
///
/// These are never retried; the caller routes the offending record to the
/// dead-letter sink and continues with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("record is missing its natural key")]
    MissingNaturalKey,
    #[error("record {natural_key} is missing its modification timestamp")]
    MissingTimestamp { natural_key: String },
    #[error("record {natural_key}: {reason}")]
    InvalidField { natural_key: String, reason: String },
}

impl MapError {
    /// Natural key of the offending record, when the record carried one.
    pub fn natural_key(&self) -> Option<&str> {
        match self {
            MapError::MissingNaturalKey => None,
            MapError::MissingTimestamp { natural_key }
            | MapError::InvalidField { natural_key, .. } => Some(natural_key),
        }
    }
}

/// Detect a unique-constraint violation across the backends SeaORM can hit.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

/// Classify a database error into the sync taxonomy.
///
/// Connection-level failures are transient; constraint violations and
/// type/serialization mismatches are permanent for the statement that raised
/// them.
pub fn classify_db_err(error: &sea_orm::DbErr) -> SyncError {
    use sea_orm::DbErr;

    match error {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
            SyncError::transient(format!("database connection error: {}", error))
        }
        DbErr::Query(_) | DbErr::Exec(_) => {
            if is_unique_violation(error) {
                SyncError::permanent(format!("unique constraint violation: {}", error))
            } else {
                SyncError::transient(format!("database statement failed: {}", error))
            }
        }
        DbErr::Json(_) | DbErr::Type(_) | DbErr::TryIntoErr { .. } => {
            SyncError::permanent(format!("type conversion failed: {}", error))
        }
        other => SyncError::permanent(other.to_string()),
    }
}
