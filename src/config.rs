//! Runtime configuration, read from TOML with every field defaulted.
//!
//! ```toml
//! [database]
//! path = "reconcile.duckdb"
//! threads = 2
//!
//! [ingestion]
//! header_mode = "strict"
//! skip_empty_rows = false
//!
//! [coercion]
//! date_column_keywords = ["date", "time", "dob"]
//!
//! [export]
//! template_prefix = "tpl_"
//! ```

use crate::coercion::Coercer;
use crate::coercion::DEFAULT_DATE_KEYWORDS;
use crate::database::identifier::validate;
use crate::error::ReconcileError;
use crate::export::DEFAULT_TEMPLATE_PREFIX;
use crate::spreadsheet::IngestOptions;
use anyhow::Context;
use log::debug;
use serde::Deserialize;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

/// Path of a TOML file to load
pub const CONFIG_ENV: &str = "RECONCILE_CONFIG";
/// Database path overriding the file setting, `:memory:` for none
pub const DATABASE_ENV: &str = "RECONCILE_DATABASE";

const IN_MEMORY: &str = ":memory:";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingestion: IngestOptions,
    pub coercion: CoercionConfig,
    pub export: ExportConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; in-memory when absent
    pub path: Option<PathBuf>,
    pub threads: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoercionConfig {
    /// Column-name fragments that mark a column as holding dates
    pub date_column_keywords: Vec<String>,
}

impl Default for CoercionConfig {
    fn default() -> Self {
        CoercionConfig {
            date_column_keywords: DEFAULT_DATE_KEYWORDS.iter().map(|keyword| keyword.to_string()).collect(),
        }
    }
}

impl CoercionConfig {
    pub fn coercer(&self) -> Coercer {
        Coercer::new(&self.date_column_keywords)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub template_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            template_prefix: DEFAULT_TEMPLATE_PREFIX.to_owned(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ReconcileError> {
        debug!("Loading config from {}", path.display());
        Self::read(path)
            .map_err(|error| ReconcileError::ConfigError(format!("{error:#}")))
            .and_then(Config::validated)
    }

    /// Defaults, overlaid by the file named in `RECONCILE_CONFIG` and then by
    /// `RECONCILE_DATABASE`.
    pub fn from_env() -> Result<Self, ReconcileError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ReconcileError> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Config::default(),
        };
        if let Some(database) = lookup(DATABASE_ENV) {
            config.database.path = match database.trim() {
                "" | IN_MEMORY => None,
                path => Some(PathBuf::from(path)),
            };
        }
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config = toml::from_str(&content).with_context(|| format!("Cannot parse config file {}", path.display()))?;
        Ok(config)
    }

    fn validated(self) -> Result<Self, ReconcileError> {
        if self.database.threads == Some(0) {
            return Err(ReconcileError::ConfigError("database.threads must be at least 1".to_owned()));
        }
        if self.coercion.date_column_keywords.iter().any(|keyword| keyword.trim().is_empty()) {
            return Err(ReconcileError::ConfigError("coercion.date_column_keywords contains an empty keyword".to_owned()));
        }
        validate(&self.export.template_prefix).map_err(|_| {
            ReconcileError::ConfigError(format!(
                "export.template_prefix '{}' must only contain letters, digits and '_'",
                self.export.template_prefix
            ))
        })?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::HeaderMode;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write(directory: &TempDir, content: &str) -> PathBuf {
        let path = directory.path().join("reconcile.toml");
        fs::write(&path, content).expect("write config");
        path
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, None);
        assert!(config.ingestion.skip_empty_rows);
        assert_eq!(config.coercion.date_column_keywords, vec!["date", "time", "created", "updated"]);
        assert_eq!(config.export.template_prefix, "template_");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let directory = TempDir::new().expect("tempdir");
        let path = write(
            &directory,
            "[ingestion]\nheader_mode = \"strict\"\n\n[coercion]\ndate_column_keywords = [\"dob\"]\n",
        );
        let config = Config::load(&path).expect("load");
        assert_eq!(config.ingestion.header_mode, HeaderMode::Strict);
        assert!(config.ingestion.skip_empty_rows);
        assert!(config.coercion.coercer().is_date_column("Customer_DOB"));
        assert!(!config.coercion.coercer().is_date_column("created_at"));
        assert_eq!(config.export.template_prefix, "template_");
    }

    #[test]
    fn invalid_files_are_config_errors() {
        let directory = TempDir::new().expect("tempdir");
        for content in ["[database\n", "[database]\nthreads = 0\n", "[export]\ntemplate_prefix = \"t-\"\n"] {
            let path = write(&directory, content);
            assert!(matches!(Config::load(&path), Err(ReconcileError::ConfigError(_))), "{content}");
        }
        let missing = directory.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ReconcileError::ConfigError(message)) if message.contains("missing.toml")));
    }

    #[test]
    fn environment_overrides_file() {
        let directory = TempDir::new().expect("tempdir");
        let path = write(&directory, "[database]\npath = \"from_file.duckdb\"\nthreads = 2\n");
        let vars = HashMap::from([
            (CONFIG_ENV, path.display().to_string()),
            (DATABASE_ENV, "override.duckdb".to_owned()),
        ]);
        let config = Config::from_lookup(|name| vars.get(name).cloned()).expect("config");
        assert_eq!(config.database.path, Some(PathBuf::from("override.duckdb")));
        assert_eq!(config.database.threads, Some(2));

        let vars = HashMap::from([(DATABASE_ENV, IN_MEMORY.to_owned())]);
        let config = Config::from_lookup(|name| vars.get(name).cloned()).expect("config");
        assert_eq!(config.database.path, None);
    }
}
