//! SQL statement builders.
//!
//! Identifiers are validated and quoted here; values only ever travel as
//! bound parameters.

use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::identifier::is_system;
use crate::database::identifier::quote;
use crate::database::identifier::validate;
use crate::error::ReconcileError;
use crate::value::Record;
use crate::value::Value;
use crate::working::CREATED_AT;
use crate::working::ROW_ID;

/// Tables of the current database and schema
pub(crate) const LIST_TABLES: &str = "SELECT table_name FROM information_schema.tables \
    WHERE table_catalog = current_database() AND table_schema = current_schema() AND table_type = 'BASE TABLE' \
    ORDER BY table_name";

/// Stored name of a table, matched ignoring case
pub(crate) const FIND_TABLE: &str = "SELECT table_name FROM information_schema.tables \
    WHERE table_catalog = current_database() AND table_schema = current_schema() AND lower(table_name) = lower(?)";

/// Column names and declared types in table order
pub(crate) const TABLE_COLUMNS: &str = "SELECT column_name, data_type FROM information_schema.columns \
    WHERE table_catalog = current_database() AND table_schema = current_schema() AND lower(table_name) = lower(?) \
    ORDER BY ordinal_position";

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn ddl(sql: String) -> Self {
        Statement { sql, params: Vec::new() }
    }

    fn sequence_name(table: &str) -> Result<String, ReconcileError> {
        Ok(format!("{}_id_seq", validate(table)?))
    }

    pub fn create_sequence(table: &str) -> Result<Self, ReconcileError> {
        let sequence = Self::sequence_name(table)?;
        Ok(Self::ddl(format!("CREATE SEQUENCE IF NOT EXISTS \"{sequence}\" START 1")))
    }

    pub fn drop_sequence(table: &str) -> Result<Self, ReconcileError> {
        let sequence = Self::sequence_name(table)?;
        Ok(Self::ddl(format!("DROP SEQUENCE IF EXISTS \"{sequence}\"")))
    }

    /// `id` first, the data columns as TEXT, then `created_at`.
    /// System columns among `columns` are skipped.
    pub fn create_table<S: AsRef<str>>(table: &str, columns: &[S]) -> Result<Self, ReconcileError> {
        let sequence = Self::sequence_name(table)?;
        let mut definitions = vec![format!("{} BIGINT NOT NULL DEFAULT nextval('{sequence}')", quote(ROW_ID)?)];
        for column in columns.iter().map(AsRef::as_ref).filter(|column| !is_system(column)) {
            definitions.push(format!("{} {}", quote(column)?, ColumnType::Text.sql_type()));
        }
        definitions.push(format!("{} TIMESTAMP DEFAULT CAST(now() AS TIMESTAMP)", quote(CREATED_AT)?));
        Ok(Self::ddl(format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(table)?, definitions.join(", "))))
    }

    pub fn add_column(table: &str, column: &str, kind: ColumnType) -> Result<Self, ReconcileError> {
        Ok(Self::ddl(format!("ALTER TABLE {} ADD COLUMN {} {}", quote(table)?, quote(column)?, kind.sql_type())))
    }

    pub fn drop_column(table: &str, column: &str) -> Result<Self, ReconcileError> {
        Ok(Self::ddl(format!("ALTER TABLE {} DROP COLUMN {}", quote(table)?, quote(column)?)))
    }

    pub fn drop_table(table: &str) -> Result<Self, ReconcileError> {
        Ok(Self::ddl(format!("DROP TABLE IF EXISTS {}", quote(table)?)))
    }

    /// Inserts the record's data fields; the store fills `id` and `created_at`.
    pub fn insert(table: &str, record: &Record) -> Result<Self, ReconcileError> {
        let table = quote(table)?;
        let mut columns = Vec::<String>::with_capacity(record.len());
        let mut params = Vec::<Value>::with_capacity(record.len());
        for (column, value) in record.iter().filter(|(column, _)| !is_system(column)) {
            columns.push(quote(column)?);
            params.push(value.clone());
        }
        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!("INSERT INTO {table} ({}) VALUES ({placeholders})", columns.join(", "))
        };
        Ok(Statement { sql, params })
    }

    pub fn insert_returning_id(table: &str, record: &Record) -> Result<Self, ReconcileError> {
        let mut statement = Self::insert(table, record)?;
        statement.sql.push_str(&format!(" RETURNING {}", quote(ROW_ID)?));
        Ok(statement)
    }

    pub fn update_by_id(table: &str, column: &str, value: &Value, id: i64) -> Result<Self, ReconcileError> {
        Ok(Statement {
            sql: format!("UPDATE {} SET {} = ? WHERE {} = ?", quote(table)?, quote(column)?, quote(ROW_ID)?),
            params: vec![value.clone(), Value::from(id)],
        })
    }

    /// Updates every row whose fields all equal the given ones, nulls included.
    pub fn update_by_fields(table: &str, column: &str, value: &Value, fields: &Record) -> Result<Self, ReconcileError> {
        let mut predicates = Vec::<String>::with_capacity(fields.len());
        let mut params = vec![value.clone()];
        for (name, field) in fields.iter() {
            predicates.push(format!("{} IS NOT DISTINCT FROM ?", quote(name)?));
            params.push(field.clone());
        }
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {}",
            quote(table)?,
            quote(column)?,
            predicates.join(" AND ")
        );
        Ok(Statement { sql, params })
    }

    /// Reads every row, projecting each column to the shape it is decoded as.
    pub fn select_all(table: &str, columns: &[Column]) -> Result<Self, ReconcileError> {
        let mut projections = Vec::<String>::with_capacity(columns.len());
        for column in columns {
            let name = quote(&column.name)?;
            projections.push(match column.kind {
                Some(ColumnType::Integer) => format!("CAST({name} AS BIGINT)"),
                Some(ColumnType::Decimal) => format!("CAST({name} AS DOUBLE)"),
                Some(ColumnType::Boolean) => name,
                _ => format!("CAST({name} AS VARCHAR)"),
            });
        }
        let order = if columns.iter().any(|column| column.name == ROW_ID) {
            format!(" ORDER BY {}", quote(ROW_ID)?)
        } else {
            String::new()
        };
        Ok(Self::ddl(format!("SELECT {} FROM {}{order}", projections.join(", "), quote(table)?)))
    }
}
