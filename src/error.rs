use serde_json::json;
use thiserror::Error;

/// Failures of repository, search, import and report operations.
///
/// `Validation`, `DuplicateKey` and `NotFound` are raised before any write;
/// `Transaction` always means the whole unit was rolled back.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} {key} already exists")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("referential integrity violation: {0}")]
    Integrity(String),

    #[error("{operation} failed and was rolled back: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook read error: {0}")]
    WorkbookRead(#[from] calamine::Error),

    #[error("workbook write error: {0}")]
    WorkbookWrite(#[from] rust_xlsxwriter::XlsxError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_failed",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::NotFound { .. } => "not_found",
            Self::Integrity(_) => "integrity_violation",
            Self::Transaction { source, .. } if is_foreign_key_violation(source) => {
                "integrity_violation"
            }
            Self::Transaction { .. } => "db_tx_failed",
            Self::Db(_) => "db_query_failed",
            Self::Io(_) | Self::WorkbookRead(_) | Self::WorkbookWrite(_) => "io_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, .. } => Some(json!({ "field": field })),
            Self::DuplicateKey { entity, key } | Self::NotFound { entity, key } => {
                Some(json!({ "entity": entity, "key": key }))
            }
            Self::Transaction { operation, .. } => Some(json!({ "operation": operation })),
            _ => None,
        }
    }
}

pub fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}
