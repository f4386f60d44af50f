//! The messy dataset being reconciled.
//!
//! Row ordinal and match state live beside each record, never inside it, so
//! nothing but user columns reaches search, export or the store.

use crate::database::resolver::RowIdentity;
use crate::value::Record;
use crate::value::Value;
use serde::Deserialize;
use serde::Serialize;

/// Foreign key to a template entry's `PK`
pub const FOREIGN_KEY: &str = "FK";
/// Stable row identifier assigned by the store
pub const ROW_ID: &str = "id";
/// Insertion timestamp assigned by the store
pub const CREATED_AT: &str = "created_at";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkingRecord {
    ordinal: usize,
    /// Template position of the current match
    matched: Option<usize>,
    record: Record,
}

impl WorkingRecord {
    /// Position in load order
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn matched(&self) -> Option<usize> {
        self.matched
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The store-assigned id once the record is persisted.
    pub fn id(&self) -> Option<i64> {
        self.record.get(ROW_ID).and_then(Value::as_i64)
    }

    /// How the store should locate this row.
    pub fn identity(&self, exclude_foreign_key: bool) -> RowIdentity {
        RowIdentity::from_record(&self.record, exclude_foreign_key)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkingDataset {
    records: Vec<WorkingRecord>,
    columns: Vec<String>,
    /// Table the records were persisted to or loaded from
    table: Option<String>,
}

impl WorkingDataset {
    /// Wraps freshly ingested records with a null `FK` on each. A sheet's own
    /// `FK` values are discarded since no row is matched yet.
    pub fn from_ingested(columns: &[String], records: Vec<Record>) -> Self {
        let mut columns = columns.to_vec();
        if !columns.iter().any(|column| column == FOREIGN_KEY) {
            columns.push(FOREIGN_KEY.to_owned());
        }
        let records = records
            .into_iter()
            .enumerate()
            .map(|(ordinal, mut record)| {
                record.insert(FOREIGN_KEY, Value::Null);
                WorkingRecord { ordinal, matched: None, record }
            })
            .collect();
        WorkingDataset { records, columns, table: None }
    }

    /// Wraps rows read back from a persisted table.
    pub fn from_table(table: &str, columns: Vec<String>, records: Vec<Record>) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(ordinal, record)| WorkingRecord { ordinal, matched: None, record })
            .collect();
        WorkingDataset { records, columns, table: Some(table.to_owned()) }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&WorkingRecord> {
        self.records.get(ordinal)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().map(WorkingRecord::record)
    }

    pub fn working_records(&self) -> &[WorkingRecord] {
        &self.records
    }

    /// Records the match and sets `FK`. `None` clears both.
    pub fn set_match(&mut self, ordinal: usize, matched: Option<(usize, Value)>) -> Option<&WorkingRecord> {
        let entry = self.records.get_mut(ordinal)?;
        match matched {
            Some((position, pk)) => {
                entry.matched = Some(position);
                entry.record.insert(FOREIGN_KEY, pk);
            }
            None => {
                entry.matched = None;
                entry.record.insert(FOREIGN_KEY, Value::Null);
            }
        }
        Some(&*entry)
    }

    pub fn set_cell(&mut self, ordinal: usize, column: &str, value: Value) -> Option<&WorkingRecord> {
        let entry = self.records.get_mut(ordinal)?;
        entry.record.insert(column, value);
        if !self.columns.iter().any(|name| name == column) {
            self.columns.push(column.to_owned());
        }
        Some(&*entry)
    }

    /// Adds a column holding null in every record.
    pub fn add_column(&mut self, column: &str) {
        if self.columns.iter().any(|name| name == column) {
            return;
        }
        self.columns.push(column.to_owned());
        for entry in &mut self.records {
            entry.record.insert(column, Value::Null);
        }
    }

    pub fn drop_column(&mut self, column: &str) {
        self.columns.retain(|name| name != column);
        for entry in &mut self.records {
            entry.record.remove(column);
        }
    }

    /// Forgets the backing table; later edits stay in memory.
    pub fn detach(&mut self) {
        self.table = None;
    }

    /// Reapplies template positions from an earlier `current_matches`.
    pub fn restore_matches(&mut self, matches: &[(usize, Option<usize>)]) {
        for (ordinal, matched) in matches {
            if let Some(entry) = self.records.get_mut(*ordinal) {
                entry.matched = *matched;
            }
        }
    }

    /// A view sorted by one column: numbers numerically, text ignoring case,
    /// blanks last in either direction. Ties keep load order.
    pub fn sorted(&self, column: &str, order: SortOrder) -> Vec<&WorkingRecord> {
        let mut view: Vec<&WorkingRecord> = self.records.iter().collect();
        view.sort_by(|left, right| {
            let left = left.record.get(column).unwrap_or(&Value::Null);
            let right = right.record.get(column).unwrap_or(&Value::Null);
            match (order, left.is_blank() || right.is_blank()) {
                (SortOrder::Desc, false) => right.sort_cmp(left),
                _ => left.sort_cmp(right),
            }
        });
        view
    }

    /// Current `(ordinal, template position)` pairs, one per record.
    pub fn current_matches(&self) -> Vec<(usize, Option<usize>)> {
        self.records.iter().map(|entry| (entry.ordinal, entry.matched)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn dataset() -> WorkingDataset {
        WorkingDataset::from_ingested(
            &["name".to_owned(), "qty".to_owned()],
            vec![
                record! { "name" => "beta", "qty" => 10i64 },
                record! { "name" => "Alpha", "qty" => "" },
                record! { "name" => "gamma", "qty" => 2i64 },
            ],
        )
    }

    #[test]
    fn ingested_records_get_null_foreign_key() {
        let dataset = dataset();
        assert_eq!(dataset.columns(), ["name", "qty", "FK"]);
        for record in dataset.records() {
            assert_eq!(record.get(FOREIGN_KEY), Some(&Value::Null));
            assert!(!record.contains("_rowIndex"));
        }
        assert_eq!(dataset.get(1).map(WorkingRecord::id), Some(None));
    }

    #[test]
    fn sheet_foreign_keys_are_cleared_on_ingest() {
        let dataset = WorkingDataset::from_ingested(
            &["FK".to_owned(), "name".to_owned()],
            vec![record! { "FK" => 42i64, "name" => "beta" }, record! { "name" => "Alpha" }],
        );
        assert_eq!(dataset.columns(), ["FK", "name"]);
        for record in dataset.records() {
            assert_eq!(record.get(FOREIGN_KEY), Some(&Value::Null));
        }
        assert_eq!(dataset.current_matches(), vec![(0, None), (1, None)]);
    }

    #[test]
    fn match_and_unmatch() {
        let mut dataset = dataset();
        dataset.set_match(2, Some((0, Value::from(1i64))));
        assert_eq!(dataset.get(2).and_then(|entry| entry.record().get(FOREIGN_KEY)), Some(&Value::from(1i64)));
        assert_eq!(dataset.current_matches(), vec![(0, None), (1, None), (2, Some(0))]);

        dataset.set_match(2, None);
        assert_eq!(dataset.get(2).and_then(|entry| entry.record().get(FOREIGN_KEY)), Some(&Value::Null));
        assert!(dataset.set_match(9, None).is_none());
    }

    #[test]
    fn sorted_view_keeps_ordinals() {
        let dataset = dataset();
        let ordinals = |column: &str, order: SortOrder| dataset
            .sorted(column, order)
            .iter()
            .map(|entry| entry.ordinal())
            .collect::<Vec<_>>();
        assert_eq!(ordinals("name", SortOrder::Asc), vec![1, 0, 2]);
        assert_eq!(ordinals("name", SortOrder::Desc), vec![2, 0, 1]);
        assert_eq!(ordinals("qty", SortOrder::Asc), vec![2, 0, 1]);
        assert_eq!(ordinals("qty", SortOrder::Desc), vec![0, 2, 1]);
        assert_eq!(dataset.get(0).map(WorkingRecord::ordinal), Some(0));
    }

    #[test]
    fn persisted_records_expose_id() {
        let dataset = WorkingDataset::from_table(
            "people",
            vec!["id".to_owned(), "name".to_owned()],
            vec![record! { "id" => 7i64, "name" => "A" }],
        );
        assert_eq!(dataset.table(), Some("people"));
        assert_eq!(dataset.get(0).and_then(WorkingRecord::id), Some(7));
    }

    #[test]
    fn column_changes_keep_matches() {
        let mut dataset = dataset();
        dataset.set_match(0, Some((4, Value::from(5i64))));
        dataset.add_column("notes");
        dataset.drop_column("qty");
        assert_eq!(dataset.columns(), ["name", "FK", "notes"]);
        assert_eq!(
            dataset.get(0).map(|entry| entry.record().keys().collect::<Vec<_>>()),
            Some(vec!["name", "FK", "notes"])
        );
        assert_eq!(dataset.get(0).and_then(WorkingRecord::matched), Some(4));

        let mut reloaded = WorkingDataset::from_table("items", dataset.columns().to_vec(), dataset.records().cloned().collect());
        reloaded.restore_matches(&dataset.current_matches());
        assert_eq!(reloaded.current_matches(), dataset.current_matches());
        reloaded.detach();
        assert_eq!(reloaded.table(), None);
    }
}
