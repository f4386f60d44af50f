//! Table creation and column changes on live tables.

use crate::coercion::Coercer;
use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::identifier::is_protected;
use crate::database::identifier::validate;
use crate::database::statement::Statement;
use crate::database::store::Store;
use crate::error::ReconcileError;
use crate::value::Record;
use log::info;
use log::warn;
use serde::Serialize;

/// Outcome of a batch insert: `inserted <= total`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub total: usize,
}

impl InsertSummary {
    pub fn failed(&self) -> usize {
        self.total - self.inserted
    }
}

/// The only component that changes table shape. Values bound for the store
/// pass through the coercer on insert.
pub struct SchemaEngine<'a> {
    store: &'a Store,
    coercer: &'a Coercer,
}

impl<'a> SchemaEngine<'a> {
    pub fn new(store: &'a Store, coercer: &'a Coercer) -> Self {
        SchemaEngine { store, coercer }
    }

    /// Creates the table with `id`, the given columns as TEXT, and `created_at`.
    /// An existing table is left as it is, even when its columns differ.
    /// Returns whether the table was created.
    pub fn ensure_table<S: AsRef<str>>(&self, table: &str, columns: &[S]) -> Result<bool, ReconcileError> {
        validate(table)?;
        for column in columns {
            validate(column.as_ref())?;
        }
        if self.store.table_exists(table)? {
            return Ok(false);
        }
        self.store.execute_ddl(&Statement::create_sequence(table)?)?;
        self.store.execute_ddl(&Statement::create_table(table, columns)?)?;
        info!("Created table '{}' with {} data columns", table, columns.len());
        Ok(true)
    }

    /// Appends a nullable column of a declared type.
    pub fn add_column(&self, table: &str, column: &str, kind: &str) -> Result<ColumnType, ReconcileError> {
        validate(table)?;
        validate(column)?;
        let kind = ColumnType::parse(kind)?;
        self.require_table(table)?;
        self.store.execute_ddl(&Statement::add_column(table, column, kind)?)?;
        info!("Added column '{}' {} to '{}'", column, kind, table);
        Ok(kind)
    }

    /// Removes a column. `id`, `created_at` and `FK` are refused.
    pub fn drop_column(&self, table: &str, column: &str) -> Result<(), ReconcileError> {
        if is_protected(column) {
            return Err(ReconcileError::ProtectedColumn(column.to_owned()));
        }
        validate(table)?;
        validate(column)?;
        self.require_table(table)?;
        self.store.execute_ddl(&Statement::drop_column(table, column)?)?;
        info!("Dropped column '{}' from '{}'", column, table);
        Ok(())
    }

    /// Inserts each record on its own. A row the store rejects is logged and
    /// skipped; the rest of the batch still goes in.
    pub fn insert_rows(&self, table: &str, records: &[Record]) -> Result<InsertSummary, ReconcileError> {
        validate(table)?;
        let mut summary = InsertSummary { inserted: 0, total: records.len() };
        for (index, record) in records.iter().enumerate() {
            let statement = Statement::insert(table, &self.coercer.normalize_record(record))?;
            match self.store.execute(&statement) {
                Ok(_) => summary.inserted += 1,
                Err(error) => warn!("Row {} of {} not inserted into '{}': {}", index + 1, summary.total, table, error),
            }
        }
        info!("Inserted {} of {} rows into '{}'", summary.inserted, summary.total, table);
        Ok(summary)
    }

    /// Inserts one record and returns the id the store assigned.
    pub fn insert_row(&self, table: &str, record: &Record) -> Result<i64, ReconcileError> {
        self.require_table(table)?;
        let statement = Statement::insert_returning_id(table, &self.coercer.normalize_record(record))?;
        self.store.execute_returning_id(&statement)
    }

    /// Every row ordered by `id`, with the table's columns.
    pub fn load_table(&self, table: &str) -> Result<(Vec<Column>, Vec<Record>), ReconcileError> {
        validate(table)?;
        let columns = self.store.table_columns(table)?;
        if columns.is_empty() {
            return Err(ReconcileError::TableNotFound(table.to_owned()));
        }
        let records = self.store.query_records(&Statement::select_all(table, &columns)?, &columns)?;
        Ok((columns, records))
    }

    pub fn drop_table(&self, table: &str) -> Result<(), ReconcileError> {
        validate(table)?;
        let table = self.require_table(table)?;
        self.store.execute_ddl(&Statement::drop_table(&table)?)?;
        self.store.execute_ddl(&Statement::drop_sequence(&table)?)?;
        info!("Dropped table '{}'", table);
        Ok(())
    }

    /// Drops every table and returns their names.
    pub fn reset_all(&self) -> Result<Vec<String>, ReconcileError> {
        let tables = self.store.list_tables()?;
        for table in &tables {
            self.drop_table(table)?;
        }
        Ok(tables)
    }

    fn require_table(&self, table: &str) -> Result<String, ReconcileError> {
        self.store
            .find_table(table)?
            .ok_or_else(|| ReconcileError::TableNotFound(table.to_owned()))
    }
}
