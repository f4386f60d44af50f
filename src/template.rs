//! The canonical dataset working records are matched against.

use crate::value::Record;
use crate::value::Value;
use log::debug;

/// Name of the key column every template entry carries
pub const PRIMARY_KEY: &str = "PK";

/// A template record and its load position. The record always holds `PK`.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateEntry {
    position: usize,
    record: Record,
}

impl TemplateEntry {
    /// Zero-based position in load order
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn pk(&self) -> &Value {
        self.record.get(PRIMARY_KEY).unwrap_or(&Value::Null)
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// True when the string form of any field contains `needle`, which must be lowercase.
    fn matches(&self, needle: &str) -> bool {
        self.record
            .values()
            .any(|value| value.as_text().to_lowercase().contains(needle))
    }
}

/// Template entries in load order with a linear substring search.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateIndex {
    entries: Vec<TemplateEntry>,
    columns: Vec<String>,
}

impl TemplateIndex {
    /// Assigns each record its key: a `PK` column is kept verbatim, duplicates
    /// included; otherwise `PK` is appended as the 1-based row position.
    pub fn load(records: Vec<Record>) -> Self {
        let entries: Vec<TemplateEntry> = records
            .into_iter()
            .enumerate()
            .map(|(position, mut record)| {
                if !record.contains(PRIMARY_KEY) {
                    record.insert(PRIMARY_KEY, (position + 1) as i64);
                }
                TemplateEntry { position, record }
            })
            .collect();
        let columns = entries
            .first()
            .map(|entry| entry.record.keys().map(str::to_owned).collect())
            .unwrap_or_default();
        debug!("Loaded template index with {} entries", entries.len());
        TemplateIndex { entries, columns }
    }

    /// Entries where some field contains `query`, ignoring case, in load order.
    /// An empty query returns every entry.
    pub fn search(&self, query: &str) -> Vec<&TemplateEntry> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return self.entries.iter().collect();
        }
        self.entries.iter().filter(|entry| entry.matches(&needle)).collect()
    }

    pub fn get(&self, position: usize) -> Option<&TemplateEntry> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Column names of the first entry, `PK` included
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(TemplateEntry::record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use proptest::prelude::*;

    fn cities() -> TemplateIndex {
        TemplateIndex::load(vec![
            record! { "name" => "Oslo", "country" => "Norway" },
            record! { "name" => "Bergen", "country" => "Norway" },
            record! { "name" => "Stockholm", "country" => "Sweden" },
        ])
    }

    #[test]
    fn assigns_positional_keys() {
        let index = cities();
        let keys: Vec<&Value> = index.entries().iter().map(TemplateEntry::pk).collect();
        assert_eq!(keys, vec![&Value::from(1i64), &Value::from(2i64), &Value::from(3i64)]);
        assert_eq!(index.columns(), ["name", "country", "PK"]);
    }

    #[test]
    fn keeps_explicit_keys_verbatim() {
        let index = TemplateIndex::load(vec![
            record! { "PK" => "A-1", "name" => "Alpha" },
            record! { "PK" => "A-1", "name" => "Beta" },
        ]);
        assert_eq!(index.get(0).map(TemplateEntry::pk), Some(&Value::from("A-1")));
        assert_eq!(index.get(1).map(TemplateEntry::pk), Some(&Value::from("A-1")));
        assert_eq!(index.columns(), ["PK", "name"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let index = cities();
        let names = |query: &str| index
            .search(query)
            .iter()
            .map(|entry| entry.record().get("name").map(|value| value.to_string()).unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(names("NOR"), vec!["Oslo", "Bergen"]);
        assert_eq!(names("holm"), vec!["Stockholm"]);
        assert_eq!(names("3"), vec!["Stockholm"]);
        assert_eq!(names(""), vec!["Oslo", "Bergen", "Stockholm"]);
        assert!(names("Denmark").is_empty());
    }

    proptest! {
        #[test]
        fn search_results_are_an_ordered_subset(
            rows in prop::collection::vec(("[a-zA-Z ]{0,8}", "[a-z0-9]{0,4}"), 0..12),
            query in "[a-zA-Z0-9]{0,3}",
        ) {
            let index = TemplateIndex::load(
                rows.into_iter().map(|(name, code)| record! { "name" => name, "code" => code }).collect()
            );
            let all: Vec<usize> = index.search("").iter().map(|entry| entry.position()).collect();
            prop_assert_eq!(all.clone(), (0..index.len()).collect::<Vec<_>>());

            let found: Vec<usize> = index.search(&query).iter().map(|entry| entry.position()).collect();
            prop_assert!(found.windows(2).all(|pair| pair[0] < pair[1]));
            for entry in index.search(&query) {
                prop_assert!(all.contains(&entry.position()));
                prop_assert!(entry.record().values().any(|value| value.as_text().to_lowercase().contains(&query.to_lowercase())));
            }
        }
    }
}
