//! One operator's reconciliation state and the operations the outer layer calls.
//!
//! A session owns its store connection, the template index and the working
//! dataset. Nothing is shared between sessions; callers serialize access to a
//! session themselves.

use crate::coercion::Coercer;
use crate::config::Config;
use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::identifier::is_protected;
use crate::database::identifier::is_system;
use crate::database::identifier::sanitize_all;
use crate::database::identifier::validate;
use crate::database::resolver::RowIdentity;
use crate::database::resolver::RowResolver;
use crate::database::resolver::UpdateOutcome;
use crate::database::schema::InsertSummary;
use crate::database::schema::SchemaEngine;
use crate::database::store::Store;
use crate::error::ReconcileError;
use crate::export::merge;
use crate::export::Match;
use crate::spreadsheet::ingest;
use crate::template::TemplateEntry;
use crate::template::TemplateIndex;
use crate::value::Record;
use crate::value::Value;
use crate::working::SortOrder;
use crate::working::WorkingDataset;
use crate::working::WorkingRecord;
use crate::working::FOREIGN_KEY;
use log::debug;
use log::info;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub columns: Vec<String>,
    pub row_count: usize,
}

pub struct ReconcileSession {
    store: Store,
    coercer: Coercer,
    config: Config,
    working: Option<WorkingDataset>,
    template: Option<TemplateIndex>,
}

impl ReconcileSession {
    pub fn new(config: Config) -> Result<Self, ReconcileError> {
        let store = Store::open(&config.database)?;
        let coercer = config.coercion.coercer();
        Ok(ReconcileSession { store, coercer, config, working: None, template: None })
    }

    pub fn in_memory() -> Result<Self, ReconcileError> {
        Self::new(Config::default())
    }

    /// Replaces the coercer built from configuration.
    pub fn with_coercer(mut self, coercer: Coercer) -> Self {
        self.coercer = coercer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn working(&self) -> Option<&WorkingDataset> {
        self.working.as_ref()
    }

    pub fn template(&self) -> Option<&TemplateIndex> {
        self.template.as_ref()
    }

    fn schema(&self) -> SchemaEngine<'_> {
        SchemaEngine::new(&self.store, &self.coercer)
    }

    fn resolver(&self) -> RowResolver<'_> {
        RowResolver::new(&self.store)
    }

    fn working_dataset(&self) -> Result<&WorkingDataset, ReconcileError> {
        self.working.as_ref().ok_or(ReconcileError::NoWorkingData)
    }

    fn template_index(&self) -> Result<&TemplateIndex, ReconcileError> {
        self.template.as_ref().ok_or(ReconcileError::NoTemplate)
    }

    /// The working dataset when it is bound to `table`.
    fn bound_to(&mut self, table: &str) -> Option<&mut WorkingDataset> {
        self.working
            .as_mut()
            .filter(|working| working.table().is_some_and(|bound| bound.eq_ignore_ascii_case(table)))
    }

    // Ingestion

    /// Replaces the working dataset with the first sheet of a workbook.
    pub fn ingest_working_data(&mut self, bytes: &[u8]) -> Result<usize, ReconcileError> {
        let dataset = ingest(bytes, &self.config.ingestion)?;
        let working = WorkingDataset::from_ingested(&dataset.columns, dataset.records);
        info!("Loaded {} working records", working.len());
        let count = working.len();
        self.working = Some(working);
        Ok(count)
    }

    /// Replaces the template with the first sheet of a workbook.
    pub fn ingest_template(&mut self, bytes: &[u8]) -> Result<usize, ReconcileError> {
        let dataset = ingest(bytes, &self.config.ingestion)?;
        let template = TemplateIndex::load(dataset.records);
        info!("Loaded {} template records", template.len());
        let count = template.len();
        self.template = Some(template);
        Ok(count)
    }

    // Template

    pub fn search_template(&self, query: &str) -> Result<Vec<&TemplateEntry>, ReconcileError> {
        Ok(self.template_index()?.search(query))
    }

    pub fn template_info(&self) -> Result<TemplateInfo, ReconcileError> {
        let template = self.template_index()?;
        Ok(TemplateInfo {
            columns: template.columns().to_vec(),
            row_count: template.len(),
        })
    }

    pub fn template_rows(&self) -> Result<Vec<&Record>, ReconcileError> {
        Ok(self.template_index()?.records().collect())
    }

    pub fn template_json(&self) -> Result<String, ReconcileError> {
        Ok(serde_json::to_string_pretty(&self.template_rows()?)?)
    }

    // Working dataset

    pub fn working_rows(&self) -> Result<Vec<&Record>, ReconcileError> {
        Ok(self.working_dataset()?.records().collect())
    }

    pub fn working_json(&self) -> Result<String, ReconcileError> {
        Ok(serde_json::to_string_pretty(&self.working_rows()?)?)
    }

    /// Working records ordered by one column. Ordinals are unchanged.
    pub fn sorted_working(&self, column: &str, order: SortOrder) -> Result<Vec<&WorkingRecord>, ReconcileError> {
        Ok(self.working_dataset()?.sorted(column, order))
    }

    pub fn current_matches(&self) -> Result<Vec<Match>, ReconcileError> {
        Ok(self
            .working_dataset()?
            .current_matches()
            .into_iter()
            .map(|(ordinal, matched)| Match::new(ordinal, matched))
            .collect())
    }

    /// Matches a working record to a template entry, or clears its match.
    ///
    /// When the working dataset is bound to a table the new `FK` is written
    /// there first, adding the `FK` column if the table lacks one.
    pub fn match_row(&mut self, ordinal: usize, template_position: Option<usize>) -> Result<Option<UpdateOutcome>, ReconcileError> {
        let matched = match template_position {
            Some(position) => {
                let entry = self
                    .template_index()?
                    .get(position)
                    .ok_or(ReconcileError::RowOutOfRange(position))?;
                Some((position, entry.pk().clone()))
            }
            None => None,
        };
        let pk = matched.as_ref().map(|(_, pk)| pk.clone()).unwrap_or(Value::Null);

        let working = self.working_dataset()?;
        let entry = working.get(ordinal).ok_or(ReconcileError::RowOutOfRange(ordinal))?;
        let outcome = match working.table() {
            Some(table) => {
                let has_foreign_key = self
                    .store
                    .table_columns(table)?
                    .iter()
                    .any(|column| column.name.eq_ignore_ascii_case(FOREIGN_KEY));
                if !has_foreign_key {
                    self.schema().add_column(table, FOREIGN_KEY, ColumnType::Text.as_str())?;
                }
                Some(self.resolver().update_foreign_key(table, &entry.identity(true), &pk)?)
            }
            None => None,
        };

        let working = self.working.as_mut().ok_or(ReconcileError::NoWorkingData)?;
        working.add_column(FOREIGN_KEY);
        working.set_match(ordinal, matched);
        debug!("Working row {} matched to {:?}", ordinal, template_position);
        Ok(outcome)
    }

    /// Edits one working cell, writing through to the bound table.
    ///
    /// `FK` follows the row's match, so it changes only through [`match_row`](Self::match_row).
    pub fn edit_cell(&mut self, ordinal: usize, column: &str, value: impl Into<Value>) -> Result<Option<UpdateOutcome>, ReconcileError> {
        if is_protected(column) {
            return Err(ReconcileError::ProtectedColumn(column.to_owned()));
        }
        let value = value.into();
        let working = self.working_dataset()?;
        let entry = working.get(ordinal).ok_or(ReconcileError::RowOutOfRange(ordinal))?;
        let outcome = match working.table() {
            Some(table) => Some(self.resolver().update_cell(table, &entry.identity(false), column, &value)?),
            None => None,
        };
        let working = self.working.as_mut().ok_or(ReconcileError::NoWorkingData)?;
        working.set_cell(ordinal, column, value);
        Ok(outcome)
    }

    /// Persists the working dataset into `table` and rebinds it to the stored rows.
    ///
    /// Headers become valid identifiers first. Matches survive when the table
    /// was created here and every row went in, since ordinals then line up.
    pub fn persist_working(&mut self, table: &str) -> Result<InsertSummary, ReconcileError> {
        validate(table)?;
        let working = self.working_dataset()?;
        // Ids and timestamps of a loaded table are reassigned by the target
        let columns: Vec<String> = working
            .columns()
            .iter()
            .filter(|column| working.table().is_none() || !is_system(column))
            .cloned()
            .collect();
        let names = sanitize_all(&columns);
        let records: Vec<Record> = working
            .records()
            .map(|record| rename_columns(record, &columns, &names))
            .collect();
        let matches = working.current_matches();

        let schema = self.schema();
        let created = schema.ensure_table(table, &names)?;
        let summary = schema.insert_rows(table, &records)?;
        let stored = self
            .store
            .find_table(table)?
            .ok_or_else(|| ReconcileError::TableNotFound(table.to_owned()))?;
        let (columns, rows) = schema.load_table(&stored)?;

        let mut reloaded = WorkingDataset::from_table(&stored, column_names(&columns), rows);
        if created && summary.failed() == 0 {
            reloaded.restore_matches(&matches);
        }
        self.working = Some(reloaded);
        Ok(summary)
    }

    // Tables

    pub fn list_tables(&self) -> Result<Vec<String>, ReconcileError> {
        self.store.list_tables()
    }

    pub fn table_columns(&self, table: &str) -> Result<Vec<Column>, ReconcileError> {
        validate(table)?;
        let columns = self.store.table_columns(table)?;
        if columns.is_empty() {
            return Err(ReconcileError::TableNotFound(table.to_owned()));
        }
        Ok(columns)
    }

    /// Reads a table and makes it the working dataset.
    pub fn load_table(&mut self, table: &str) -> Result<Vec<Record>, ReconcileError> {
        validate(table)?;
        let stored = self
            .store
            .find_table(table)?
            .ok_or_else(|| ReconcileError::TableNotFound(table.to_owned()))?;
        let (columns, records) = self.schema().load_table(&stored)?;
        info!("Loaded {} rows from '{}'", records.len(), stored);
        self.working = Some(WorkingDataset::from_table(&stored, column_names(&columns), records.clone()));
        Ok(records)
    }

    /// Creates `table` from the union of the records' columns, then inserts them.
    pub fn create_table_and_insert(&self, table: &str, records: &[Record]) -> Result<InsertSummary, ReconcileError> {
        let mut columns = Vec::<&str>::new();
        for column in records.iter().flat_map(Record::keys) {
            if !is_system(column) && !columns.iter().any(|known| known.eq_ignore_ascii_case(column)) {
                columns.push(column);
            }
        }
        let schema = self.schema();
        schema.ensure_table(table, &columns)?;
        schema.insert_rows(table, records)
    }

    pub fn add_column(&mut self, table: &str, column: &str, kind: &str) -> Result<ColumnType, ReconcileError> {
        let kind = self.schema().add_column(table, column, kind)?;
        if let Some(working) = self.bound_to(table) {
            working.add_column(column);
        }
        Ok(kind)
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<(), ReconcileError> {
        self.schema().drop_column(table, column)?;
        if let Some(working) = self.bound_to(table) {
            working.drop_column(column);
        }
        Ok(())
    }

    pub fn update_cell(&self, table: &str, identity: &RowIdentity, column: &str, value: &Value) -> Result<UpdateOutcome, ReconcileError> {
        self.resolver().update_cell(table, identity, column, value)
    }

    pub fn update_foreign_key(&self, table: &str, identity: &RowIdentity, pk: &Value) -> Result<UpdateOutcome, ReconcileError> {
        self.resolver().update_foreign_key(table, identity, pk)
    }

    /// Inserts one row and returns its new id.
    pub fn add_row(&self, table: &str, record: &Record) -> Result<i64, ReconcileError> {
        self.schema().insert_row(table, record)
    }

    pub fn drop_table(&mut self, table: &str) -> Result<(), ReconcileError> {
        self.schema().drop_table(table)?;
        if let Some(working) = self.bound_to(table) {
            working.detach();
        }
        Ok(())
    }

    /// Drops every table; the working dataset stays in memory, unbound.
    pub fn reset_all(&mut self) -> Result<Vec<String>, ReconcileError> {
        let dropped = self.schema().reset_all()?;
        if let Some(working) = self.working.as_mut() {
            working.detach();
        }
        info!("Reset dropped {} tables", dropped.len());
        Ok(dropped)
    }

    // Export

    /// Working records merged with the template entries named in `matches`.
    pub fn export_reconciled(&self, matches: &[Match]) -> Result<Vec<Record>, ReconcileError> {
        let working = self.working_dataset()?;
        let template = self.template_index()?;
        Ok(merge(working.records(), template, matches, &self.config.export.template_prefix))
    }

    /// Export using the matches made through [`Self::match_row`].
    pub fn export_current(&self) -> Result<Vec<Record>, ReconcileError> {
        self.export_reconciled(&self.current_matches()?)
    }
}

fn column_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|column| column.name.to_owned()).collect()
}

fn rename_columns(record: &Record, from: &[String], to: &[String]) -> Record {
    record
        .iter()
        .map(|(column, value)| {
            let name = from
                .iter()
                .position(|original| original == column)
                .and_then(|index| to.get(index))
                .map(String::as_str)
                .unwrap_or(column);
            (name, value.clone())
        })
        .collect()
}
