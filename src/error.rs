//! Error taxonomy for the migration pipeline.
//!
//! Three classes matter to callers:
//! - transient infrastructure errors, retried at chunk granularity
//!   ([`StoreError::Transient`], [`SourceError::Transient`]);
//! - record-level errors ([`RecordError`]), which drop one record and
//!   never leave their stage;
//! - fatal errors ([`MigrationError`]), which abort the run.

use crate::types::EntityType;
use thiserror::Error;

/// Errors raised by the target store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Busy/locked database, dropped connection, timeout.
    #[error("transient store error: {0}")]
    Transient(String),

    /// The store rejected the data (constraint, type mismatch).
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy)
            | Some(ErrorCode::DatabaseLocked)
            | Some(ErrorCode::SystemIoFailure) => StoreError::Transient(err.to_string()),
            Some(ErrorCode::ConstraintViolation) | Some(ErrorCode::TypeMismatch) => {
                StoreError::Constraint(err.to_string())
            }
            _ => StoreError::Other(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<rusqlite::Error>() {
            Ok(sql) => sql.into(),
            Err(err) => StoreError::Other(err.to_string()),
        }
    }
}

/// Errors raised by the source platform client.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network, TLS, timeout, 429 or 5xx.
    #[error("transient source error: {0}")]
    Transient(String),

    #[error("source API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("could not decode source response: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            SourceError::Transient(err.to_string())
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Api {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SourceError::Transient(err.to_string())
        }
    }
}

/// A single record could not be turned into a row.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("record {source_id} could not be decoded: {reason}")]
    Decode { source_id: String, reason: String },

    #[error("record {source_id} is missing required field {field}")]
    MissingField {
        source_id: String,
        field: &'static str,
    },

    #[error("record {source_id}: {field} references unmigrated {entity} {reference}")]
    MissingReference {
        source_id: String,
        field: &'static str,
        entity: EntityType,
        reference: String,
    },
}

/// Fatal errors. Anything of this type aborts the run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("cannot fetch candidates for stage {stage}: {source}")]
    Source {
        stage: String,
        #[source]
        source: SourceError,
    },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error(
        "mapping conflict for {entity}: source {source_id} -> {target_id} collides with an existing mapping ({existing})"
    )]
    MappingConflict {
        entity: EntityType,
        source_id: String,
        target_id: i64,
        existing: String,
    },

    #[error("invalid stage plan: {0}")]
    InvalidPlan(String),
}

pub type Result<T, E = MigrationError> = std::result::Result<T, E>;
