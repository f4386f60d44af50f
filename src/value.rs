//! Scalar cell values and ordered records.
//!
//! A [`Record`] keeps its fields in insertion order: the column order of an
//! ingested sheet is established by its header row and is preserved through
//! search, export, and persistence.

use duckdb::types::ToSqlOutput;
use duckdb::ToSql;
use serde::de::MapAccess;
use serde::de::Visitor;
use serde::ser::SerializeMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Display;

/// A single field value: string, number, boolean, or null.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for null and for the empty string a missing cell defaults to.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// String form used for substring search, statement binding and display.
    /// Null renders as the empty string.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Text(text) => Cow::Borrowed(text),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Interprets the value as a whole number, accepting numeric text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(number) if number.fract() == 0.0 => Some(*number as i64),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Ordering used when sorting a dataset by one column: numbers compare
    /// numerically, everything else case-insensitively by text, blanks last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_blank(), other.is_blank()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => (),
        }
        match (self, other) {
            (Value::Number(left), Value::Number(right)) => left.total_cmp(right),
            (left, right) => left.as_text().to_lowercase().cmp(&right.as_text().to_lowercase()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Number(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => number.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(text) => Value::Text(text),
            nested => Value::Text(nested.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(value) if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 => {
                serializer.serialize_i64(*value as i64)
            }
            Value::Number(value) => serializer.serialize_f64(*value),
            Value::Text(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Non-null values are bound in their string form and the store casts them to
/// the column's declared type, so a value that does not fit fails its statement.
impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(duckdb::types::Value::Null),
            other => ToSqlOutput::Owned(duckdb::types::Value::Text(other.as_text().into_owned())),
        })
    }
}

/// An ordered mapping from column name to value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Record {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the value in place when the column exists, appends otherwise.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object of scalar fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            record.insert(key, value);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Builds a [`Record`] from `key => value` pairs, keeping their order.
#[macro_export]
macro_rules! record {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut record = $crate::value::Record::new();
        $(record.insert($key, $value);)*
        record
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_like_spreadsheet_text() {
        assert_eq!(Value::Number(44197.0).to_string(), "44197");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Null.as_text(), "");
    }

    #[test]
    fn insert_keeps_column_order_and_replaces_in_place() {
        let mut record = record! { "name" => "A", "FK" => Value::Null, "city" => "Oslo" };
        record.insert("FK", 3i64);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["name", "FK", "city"]);
        assert_eq!(record.get("FK"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn record_json_preserves_order() {
        let record = record! { "zeta" => 1i64, "alpha" => "x", "FK" => Value::Null };
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"zeta":1,"alpha":"x","FK":null}"#);

        let parsed: Record = serde_json::from_str(r#"{"b":true,"a":2.5}"#).expect("deserialize");
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(parsed.get("a"), Some(&Value::Number(2.5)));
    }

    #[test]
    fn sort_cmp_puts_blanks_last() {
        let mut values = vec![Value::from(""), Value::from(10i64), Value::from(2i64), Value::Null];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values[0], Value::Number(2.0));
        assert_eq!(values[1], Value::Number(10.0));
        assert!(values[2].is_blank() && values[3].is_blank());
    }
}
