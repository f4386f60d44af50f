//! Flattening matched working records with their template entries.

use crate::template::TemplateIndex;
use crate::template::PRIMARY_KEY;
use crate::value::Record;
use crate::value::Value;
use crate::working::FOREIGN_KEY;
use log::debug;
use serde::Deserialize;
use serde::Serialize;

/// Prefix put on template fields copied into an exported record
pub const DEFAULT_TEMPLATE_PREFIX: &str = "template_";

/// A working-record ordinal and the template position it matched, if any.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub old_index: usize,
    #[serde(default)]
    pub template_index: Option<usize>,
}

impl Match {
    pub fn new(old_index: usize, template_index: Option<usize>) -> Self {
        Match { old_index, template_index }
    }
}

/// Merges each working record with its matched template entry.
///
/// The first match listed for an ordinal wins. A matched record gets `FK` set
/// to the entry's `PK` and every other template field under `prefix`; an
/// unmatched one, or one whose template position is out of range, gets a null
/// `FK`. Output keeps working-record order.
pub fn merge<'a, I>(working: I, template: &TemplateIndex, matches: &[Match], prefix: &str) -> Vec<Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let merged: Vec<Record> = working
        .into_iter()
        .enumerate()
        .map(|(ordinal, record)| {
            let entry = matches
                .iter()
                .find(|candidate| candidate.old_index == ordinal)
                .and_then(|candidate| candidate.template_index)
                .and_then(|position| template.get(position));
            let mut merged = record.clone();
            match entry {
                Some(entry) => {
                    merged.insert(FOREIGN_KEY, entry.pk().clone());
                    for (column, value) in entry.record().iter().filter(|(column, _)| *column != PRIMARY_KEY) {
                        merged.insert(format!("{prefix}{column}"), value.clone());
                    }
                }
                None => merged.insert(FOREIGN_KEY, Value::Null),
            }
            merged
        })
        .collect();
    debug!("Merged {} records against {} matches", merged.len(), matches.len());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn matched_record_gains_prefixed_template_fields() {
        let working = vec![record! { "name" => "A" }];
        let template = TemplateIndex::load(vec![record! { "PK" => 1i64, "name" => "Alpha" }]);
        let matches: Vec<Match> = serde_json::from_str(r#"[{"oldIndex":0,"templateIndex":0}]"#).expect("matches");

        let merged = merge(&working, &template, &matches, DEFAULT_TEMPLATE_PREFIX);
        assert_eq!(merged, vec![record! { "name" => "A", "FK" => 1i64, "template_name" => "Alpha" }]);
        assert_eq!(
            serde_json::to_string(&merged).expect("json"),
            r#"[{"name":"A","FK":1,"template_name":"Alpha"}]"#
        );
    }

    #[test]
    fn unmatched_and_out_of_range_get_null_foreign_key() {
        let working = vec![
            record! { "name" => "A", "FK" => 9i64 },
            record! { "name" => "B" },
            record! { "name" => "C" },
        ];
        let template = TemplateIndex::load(vec![record! { "name" => "Alpha" }, record! { "name" => "Beta" }]);
        let matches = vec![Match::new(0, None), Match::new(1, Some(7)), Match::new(2, Some(1)), Match::new(2, Some(0))];

        let merged = merge(&working, &template, &matches, "t_");
        assert_eq!(merged[0], record! { "name" => "A", "FK" => Value::Null });
        assert_eq!(merged[1], record! { "name" => "B", "FK" => Value::Null });
        assert_eq!(merged[2], record! { "name" => "C", "FK" => 2i64, "t_name" => "Beta" });
    }

    #[test]
    fn null_template_index_deserializes() {
        let matches: Vec<Match> =
            serde_json::from_str(r#"[{"oldIndex":3,"templateIndex":null},{"oldIndex":4}]"#).expect("matches");
        assert_eq!(matches, vec![Match::new(3, None), Match::new(4, None)]);
    }
}
