use crate::config::DatabaseConfig;
use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::statement::Statement;
use crate::database::statement::FIND_TABLE;
use crate::database::statement::LIST_TABLES;
use crate::database::statement::TABLE_COLUMNS;
use crate::error::ReconcileError;
use crate::value::Record;
use crate::value::Value;
use duckdb::params;
use duckdb::params_from_iter;
use duckdb::Config;
use duckdb::Connection;
use log::debug;
use log::info;

/// Owns the DuckDB connection every statement runs on.
pub struct Store {
    connection: Connection,
}

impl Store {
    /// Opens the configured database file, or an in-memory database without a path.
    pub fn open(config: &DatabaseConfig) -> Result<Self, ReconcileError> {
        let mut flags = Config::default();
        if let Some(threads) = config.threads {
            flags = flags.threads(threads as i64)?;
        }
        let connection = match &config.path {
            Some(path) => {
                info!("Opening database '{}'", path.display());
                Connection::open_with_flags(path, flags)?
            }
            None => {
                info!("Opening in-memory database");
                Connection::open_in_memory_with_flags(flags)?
            }
        };
        Ok(Store { connection })
    }

    pub fn open_in_memory() -> Result<Self, ReconcileError> {
        Self::open(&DatabaseConfig::default())
    }

    /// Runs a schema statement.
    pub fn execute_ddl(&self, statement: &Statement) -> Result<(), ReconcileError> {
        debug!("{}", statement.sql);
        self.connection.execute_batch(&statement.sql)?;
        Ok(())
    }

    /// Runs a data statement and returns the number of rows it changed.
    pub fn execute(&self, statement: &Statement) -> Result<usize, ReconcileError> {
        let count = self.connection.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        Ok(count)
    }

    /// Runs a statement ending in `RETURNING "id"`.
    pub fn execute_returning_id(&self, statement: &Statement) -> Result<i64, ReconcileError> {
        let id = self.connection.query_row(&statement.sql, params_from_iter(statement.params.iter()), |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(id)
    }

    /// The stored name of a table, matched ignoring case.
    pub fn find_table(&self, name: &str) -> Result<Option<String>, ReconcileError> {
        match self.connection.query_row(FIND_TABLE, params![name], |row| row.get::<_, String>(0)) {
            Ok(table) => Ok(Some(table)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, ReconcileError> {
        Ok(self.find_table(name)?.is_some())
    }

    pub fn list_tables(&self) -> Result<Vec<String>, ReconcileError> {
        let mut statement = self.connection.prepare(LIST_TABLES)?;
        let tables = statement
            .query_map(params![], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    /// Columns with their declared types, in table order. Empty when the table does not exist.
    pub fn table_columns(&self, name: &str) -> Result<Vec<Column>, ReconcileError> {
        let mut statement = self.connection.prepare(TABLE_COLUMNS)?;
        let columns = statement
            .query_map(params![name], |row| {
                let name = row.get::<_, String>(0)?;
                let data_type = row.get::<_, String>(1)?;
                Ok(Column { name, kind: ColumnType::from_declared(&data_type) })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Runs a `Statement::select_all` query, decoding each column by its declared type.
    pub fn query_records(&self, statement: &Statement, columns: &[Column]) -> Result<Vec<Record>, ReconcileError> {
        let mut prepared = self.connection.prepare(&statement.sql)?;
        let mut rows = prepared.query(params_from_iter(statement.params.iter()))?;
        let mut records = Vec::<Record>::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let value = match column.kind {
                    Some(ColumnType::Integer) => Value::from(row.get::<_, Option<i64>>(index)?),
                    Some(ColumnType::Decimal) => Value::from(row.get::<_, Option<f64>>(index)?),
                    Some(ColumnType::Boolean) => Value::from(row.get::<_, Option<bool>>(index)?),
                    _ => Value::from(row.get::<_, Option<String>>(index)?),
                };
                record.insert(column.name.to_owned(), value);
            }
            records.push(record);
        }
        Ok(records)
    }
}
