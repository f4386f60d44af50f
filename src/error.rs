use crate::spreadsheet::SpreadsheetError;
use thiserror::Error;

/// Main error type for the reconciliation crate.
/// Aggregates ingestion, schema, and persistence failures behind the kinds a caller can act on.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Uploaded bytes are not a readable spreadsheet
    #[error("Parse spreadsheet failed: {0}")]
    ParseError(#[from] SpreadsheetError),

    /// Table or column name fails the `[a-zA-Z0-9_]+` whitelist
    #[error("Invalid identifier '{0}': only letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    /// Declared column type is outside the supported enumeration
    #[error("Invalid column type '{0}': expected one of TEXT, INTEGER, DECIMAL, BOOLEAN, DATE, TIMESTAMP")]
    InvalidColumnType(String),

    /// Attempt to remove `id`, `created_at` or `FK`
    #[error("Column '{0}' is a system column and cannot be removed")]
    ProtectedColumn(String),

    /// An update matched zero rows
    #[error("No matching record found in table '{0}'")]
    RecordNotFound(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// Underlying store failure, carrying the store's own message
    #[error("Database error: {0}")]
    PersistenceError(#[from] duckdb::Error),

    #[error("No template data loaded")]
    NoTemplate,

    #[error("No working data loaded")]
    NoWorkingData,

    #[error("Row {0} is out of range")]
    RowOutOfRange(usize),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SpreadsheetError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SpreadsheetError::WithContextError(format!("{}: {}", message, e)))
    }
}
