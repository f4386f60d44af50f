//! Locating a persisted row from a record and applying one targeted update.
//!
//! A record that carries `id` is updated by that id alone. A record without
//! one falls back to matching every non-system field, which can hit zero rows
//! (stale copy) or several (duplicate data). Fallback use is logged and
//! reported in [`UpdateOutcome::resolution`].

use crate::database::identifier::is_system;
use crate::database::statement::Statement;
use crate::database::store::Store;
use crate::error::ReconcileError;
use crate::value::Record;
use crate::value::Value;
use crate::working::FOREIGN_KEY;
use crate::working::ROW_ID;
use log::debug;
use log::warn;
use serde::Serialize;

/// How a row is found in its table.
#[derive(Clone, Debug, PartialEq)]
pub enum RowIdentity {
    /// The store-assigned `id`
    Id(i64),
    /// Equality on every listed field
    Fields(Record),
}

impl RowIdentity {
    /// Uses `id` when the record has one, otherwise every field except the
    /// system columns and, when `exclude_foreign_key` is set, `FK`.
    pub fn from_record(record: &Record, exclude_foreign_key: bool) -> Self {
        if let Some(id) = record.get(ROW_ID).and_then(Value::as_i64) {
            return RowIdentity::Id(id);
        }
        let fields = record
            .iter()
            .filter(|(column, _)| !is_system(column))
            .filter(|(column, _)| !(exclude_foreign_key && column.eq_ignore_ascii_case(FOREIGN_KEY)))
            .map(|(column, value)| (column, value.clone()))
            .collect();
        RowIdentity::Fields(fields)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    ById,
    ByFieldMatch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    /// Rows changed; more than one is possible on the field-match path
    pub rows_affected: usize,
    pub resolution: Resolution,
}

pub struct RowResolver<'a> {
    store: &'a Store,
}

impl<'a> RowResolver<'a> {
    pub fn new(store: &'a Store) -> Self {
        RowResolver { store }
    }

    /// Sets `FK` on the identified rows. `FK` itself is not part of a field-match identity.
    pub fn update_foreign_key(&self, table: &str, identity: &RowIdentity, pk: &Value) -> Result<UpdateOutcome, ReconcileError> {
        let identity = match identity {
            RowIdentity::Fields(fields) => {
                let fields = fields
                    .iter()
                    .filter(|(column, _)| !column.eq_ignore_ascii_case(FOREIGN_KEY))
                    .map(|(column, value)| (column, value.clone()))
                    .collect();
                RowIdentity::Fields(fields)
            }
            identity => identity.clone(),
        };
        self.update(table, &identity, FOREIGN_KEY, pk)
    }

    /// Sets one column on the identified rows.
    pub fn update_cell(&self, table: &str, identity: &RowIdentity, column: &str, value: &Value) -> Result<UpdateOutcome, ReconcileError> {
        if is_system(column) {
            return Err(ReconcileError::ProtectedColumn(column.to_owned()));
        }
        self.update(table, identity, column, value)
    }

    fn update(&self, table: &str, identity: &RowIdentity, column: &str, value: &Value) -> Result<UpdateOutcome, ReconcileError> {
        let (statement, resolution) = match identity {
            RowIdentity::Id(id) => (Statement::update_by_id(table, column, value, *id)?, Resolution::ById),
            RowIdentity::Fields(fields) => {
                if fields.is_empty() {
                    warn!("Record without id or fields cannot be located in '{}'", table);
                    return Err(ReconcileError::RecordNotFound(table.to_owned()));
                }
                warn!("Record without id in '{}': matching on {} fields", table, fields.len());
                (Statement::update_by_fields(table, column, value, fields)?, Resolution::ByFieldMatch)
            }
        };
        let rows_affected = self.store.execute(&statement)?;
        match rows_affected {
            0 => Err(ReconcileError::RecordNotFound(table.to_owned())),
            1 => {
                debug!("Updated '{}' in '{}' ({:?})", column, table, resolution);
                Ok(UpdateOutcome { rows_affected, resolution })
            }
            _ => {
                warn!("Updated '{}' on {} rows of '{}' matching the same fields", column, rows_affected, table);
                Ok(UpdateOutcome { rows_affected, resolution })
            }
        }
    }
}
