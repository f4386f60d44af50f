//! Table and column identifier rules.
//!
//! Every identifier interpolated into a statement passes [`validate`] first;
//! values never are, they are bound as parameters.

use crate::error::ReconcileError;
use crate::working::CREATED_AT;
use crate::working::FOREIGN_KEY;
use crate::working::ROW_ID;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("identifier pattern"));

/// Columns that cannot be dropped
pub const PROTECTED_COLUMNS: [&str; 3] = [ROW_ID, CREATED_AT, FOREIGN_KEY];

/// Columns the store maintains itself
pub const SYSTEM_COLUMNS: [&str; 2] = [ROW_ID, CREATED_AT];

pub fn validate(name: &str) -> Result<&str, ReconcileError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(ReconcileError::InvalidIdentifier(name.to_owned()))
    }
}

/// Validates and double-quotes an identifier so digit-leading names and
/// keywords stay usable.
pub fn quote(name: &str) -> Result<String, ReconcileError> {
    validate(name).map(|name| format!("\"{name}\""))
}

pub fn is_protected(name: &str) -> bool {
    PROTECTED_COLUMNS.iter().any(|column| column.eq_ignore_ascii_case(name))
}

pub fn is_system(name: &str) -> bool {
    SYSTEM_COLUMNS.iter().any(|column| column.eq_ignore_ascii_case(name))
}

/// Rewrites spreadsheet headers into valid, unique identifiers: characters
/// outside `[a-zA-Z0-9_]` become `_`, empty names become `column_<n>`, and
/// names that collide ignoring case get a numeric suffix. The store's own
/// columns count as taken, so an `ID` header becomes `ID_2`.
pub fn sanitize_all<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = SYSTEM_COLUMNS.iter().map(|column| column.to_ascii_lowercase()).collect();
    names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let cleaned: String = name
                .as_ref()
                .trim()
                .chars()
                .map(|char| if char.is_ascii_alphanumeric() || char == '_' { char } else { '_' })
                .collect();
            let base = if cleaned.is_empty() { format!("column_{}", index + 1) } else { cleaned };
            let mut candidate = base.to_owned();
            let mut suffix = 1usize;
            while !seen.insert(candidate.to_ascii_lowercase()) {
                suffix += 1;
                candidate = format!("{base}_{suffix}");
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist() {
        assert!(validate("customer_2024").is_ok());
        assert!(validate("2024").is_ok());
        for name in ["", "drop table", "name;--", "naïve", "a-b", "\"x\""] {
            assert!(matches!(validate(name), Err(ReconcileError::InvalidIdentifier(_))), "{name}");
        }
        assert_eq!(quote("FK").ok().as_deref(), Some("\"FK\""));
    }

    #[test]
    fn protected_columns() {
        assert!(is_protected("id"));
        assert!(is_protected("FK"));
        assert!(is_protected("Created_At"));
        assert!(!is_protected("name"));
        assert!(is_system("ID"));
        assert!(!is_system("FK"));
    }

    #[test]
    fn sanitize_headers() {
        let names = sanitize_all(&["Customer Name", "", "e-mail", "Customer_Name", "__EMPTY", "FK"]);
        assert_eq!(names, vec!["Customer_Name", "column_2", "e_mail", "Customer_Name_2", "__EMPTY", "FK"]);
        for name in &names {
            assert!(validate(name).is_ok());
        }
    }

    #[test]
    fn sanitize_keeps_system_names_free() {
        let names = sanitize_all(&["ID", "name", "Created_At", "id_2", "created at"]);
        assert_eq!(names, vec!["ID_2", "name", "Created_At_2", "id_2_2", "created_at_3"]);
        assert!(names.iter().all(|name| !is_system(name)));
    }
}
