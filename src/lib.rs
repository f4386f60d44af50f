//! # Spreadsheet reconciliation
//!
//! Matches a messy spreadsheet against a canonical template and keeps the
//! result in DuckDB, with tables created and altered on demand.
//!
//! ## Features
//!
//! - **Workbook ingestion**: first sheet of `.xlsx`/`.xlsm`, `.xls` and `.ods` files,
//!   keyed by the header row, format detected from the package contents
//! - **Template search**: case-insensitive substring search over every field,
//!   with `PK` taken from the sheet or assigned by position
//! - **Write-through matching**: matches and cell edits on a persisted working
//!   dataset are committed by row `id`, falling back to whole-row equality
//! - **Schema evolution**: TEXT tables created from headers, typed columns
//!   added later, system columns protected
//! - **Date coercion**: spreadsheet serials, `H:MM.S` times and calendar
//!   strings normalized on insert for date-like columns
//! - **Export**: working records flattened with their matched template fields
//!
//! ## Usage
//!
//! ```no_run
//! use sheet_reconcile::{Config, ReconcileSession};
//!
//! # fn main() -> Result<(), sheet_reconcile::ReconcileError> {
//! sheet_reconcile::init_logging();
//! let mut session = ReconcileSession::new(Config::from_env()?)?;
//! session.ingest_working_data(&std::fs::read("customers.xlsx").unwrap_or_default())?;
//! session.ingest_template(&std::fs::read("accounts.ods").unwrap_or_default())?;
//! let position = session.search_template("acme")?.first().map(|entry| entry.position());
//! session.match_row(0, position)?;
//! let reconciled = session.export_current()?;
//! println!("{}", serde_json::to_string_pretty(&reconciled)?);
//! # Ok(())
//! # }
//! ```

pub mod coercion;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub(crate) mod helpers;
pub mod session;
pub mod spreadsheet;
pub mod template;
pub mod value;
pub mod working;

pub use crate::config::Config;
pub use crate::database::resolver::Resolution;
pub use crate::database::resolver::RowIdentity;
pub use crate::database::resolver::UpdateOutcome;
pub use crate::database::schema::InsertSummary;
pub use crate::error::ReconcileError;
pub use crate::export::Match;
pub use crate::session::ReconcileSession;
pub use crate::session::TemplateInfo;
pub use crate::value::Record;
pub use crate::value::Value;
pub use crate::working::SortOrder;

use log::LevelFilter;
use std::env;
use std::sync::OnceLock;

static LOGGER: OnceLock<()> = OnceLock::new();

/// Installs the `env_logger` backend once. Without `RUST_LOG` this crate logs at `info`.
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_reconcile", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}
