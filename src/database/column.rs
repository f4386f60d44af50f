use crate::error::ReconcileError;
use serde::Serialize;
use std::fmt::Display;

/// Declared types a column can be added with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// Variable-length strings, the type every ingested column starts with
    Text,
    /// 64-bit signed integers
    Integer,
    /// Fixed-point numbers with six fractional digits
    Decimal,
    /// Boolean values (true/false)
    Boolean,
    /// Date without time component
    Date,
    /// Date and time with microsecond precision
    Timestamp,
}

/// A table column and its declared type, when the store reports one this crate knows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<ColumnType>,
}

impl ColumnType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// The DuckDB type used in DDL.
    pub const fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR",
            ColumnType::Integer => "BIGINT",
            ColumnType::Decimal => "DECIMAL(18,6)",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Parses a column type name, ignoring case.
    /// Supports various aliases for each type.
    pub fn parse(name: &str) -> Result<Self, ReconcileError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TEXT" | "STRING" | "VARCHAR" => Ok(Self::Text),
            "INT" | "BIGINT" | "INTEGER" => Ok(Self::Integer),
            "DECIMAL" | "NUMERIC" | "FLOAT" | "DOUBLE" => Ok(Self::Decimal),
            "BOOL" | "BOOLEAN" => Ok(Self::Boolean),
            "DATE" => Ok(Self::Date),
            "DATETIME" | "TIMESTAMP" => Ok(Self::Timestamp),
            _ => Err(ReconcileError::InvalidColumnType(name.to_string())),
        }
    }

    /// Maps a `data_type` reported by `information_schema.columns`.
    pub fn from_declared(data_type: &str) -> Option<Self> {
        let data_type = data_type.to_ascii_uppercase();
        match data_type.as_str() {
            "VARCHAR" | "TEXT" | "STRING" => Some(Self::Text),
            "BIGINT" | "INTEGER" | "SMALLINT" | "TINYINT" | "HUGEINT" | "UBIGINT" | "UINTEGER" => Some(Self::Integer),
            "DOUBLE" | "FLOAT" | "REAL" => Some(Self::Decimal),
            "BOOLEAN" => Some(Self::Boolean),
            "DATE" => Some(Self::Date),
            _ if data_type.starts_with("DECIMAL") || data_type.starts_with("NUMERIC") => Some(Self::Decimal),
            _ if data_type.starts_with("TIMESTAMP") => Some(Self::Timestamp),
            _ => None,
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
