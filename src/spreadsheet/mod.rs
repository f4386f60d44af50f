//! # Tabular ingestion
//!
//! Reads the first worksheet of an Office Open XML (.xlsx, .xlsm), legacy
//! Excel (.xls) or OpenDocument (.ods) workbook from raw bytes and turns it
//! into records keyed by the header row. The format is detected from the
//! package contents, not from a file name.

pub(crate) mod cell;
pub(crate) mod excel;
pub(crate) mod ods;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

#[cfg(test)]
pub(crate) mod fixture;

use crate::error::ResultMessage;
use crate::helpers::biff8::Biff8Error;
use crate::helpers::cfb;
use crate::helpers::cfb::Cfb;
use crate::helpers::cfb::CfbError;
use crate::helpers::xml::XmlError;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsError;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use crate::value::Record;
use crate::value::Value;
use log::debug;
use log::info;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Cursor;
use thiserror::Error;
use zip::ZipArchive;

/// Errors raised while reading a workbook.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("{0}")]
    WithContextError(String),

    #[error("Unrecognized spreadsheet format: expected an xlsx, xlsm, xls or ods workbook")]
    FormatError,

    #[error("Workbook contains no sheets")]
    EmptyWorkbookError,

    #[error("Workbook is password protected")]
    PasswordProtectedError,

    #[error("Missing workbook part '{0}'")]
    FileError(String),

    #[error("Invalid OpenDocument MIME type")]
    MimeTypeError,

    #[error("Invalid cell value at {0}: '{1}'")]
    CellValueError(String, String),

    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XmlHelperError(#[from] XmlError),

    #[error("{0}")]
    CompoundFileError(#[from] CfbError),

    #[error("{0}")]
    BinaryRecordError(#[from] Biff8Error),

    #[error("{0}")]
    LegacyWorkbookError(#[from] XlsError),
}

/// How the header row is read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// The first non-empty row spans the used columns; blank header cells are
    /// named `__EMPTY`, `__EMPTY_1`, and so on.
    #[default]
    Inferred,
    /// Headers are read from column A of the first row until the first empty cell.
    Strict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub header_mode: HeaderMode,
    /// Drop data rows whose cells are all empty
    pub skip_empty_rows: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            header_mode: HeaderMode::default(),
            skip_empty_rows: true,
        }
    }
}

/// The records of an ingested sheet and their column order.
/// Every record holds exactly `columns`, in that order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A workbook format reader.
pub(crate) trait Spreadsheet {
    /// Reads the first worksheet; the others are ignored.
    fn read_first_sheet(&mut self) -> Result<Sheet, SpreadsheetError>;
}

/// Opens a workbook from its bytes, detecting the format from the package members.
pub(crate) fn open_spreadsheet(bytes: &[u8]) -> Result<Box<dyn Spreadsheet + '_>, SpreadsheetError> {
    if bytes.starts_with(&cfb::SIGNATURE) {
        let cfb = Cfb::new(bytes)?;
        if excel::is_password_protected(&cfb) {
            Err(SpreadsheetError::PasswordProtectedError)?
        }
        return Ok(Box::new(XlsSpreadsheet::open(&cfb)?));
    }
    let zip = ZipArchive::new(Cursor::new(bytes)).map_err(|_| SpreadsheetError::FormatError)?;
    if zip.contains("xl/workbook.xml") {
        Ok(Box::new(XlsxSpreadsheet::open(zip)?))
    } else if zip.contains("mimetype") || zip.contains("content.xml") {
        Ok(Box::new(OdsSpreadsheet::open(zip)?))
    } else {
        Err(SpreadsheetError::FormatError)
    }
}

/// Parses spreadsheet bytes into records keyed by the header row.
///
/// Rows are padded or truncated to the header columns, with absent cells set
/// to the empty string, so every record has the same key set. A sheet without
/// cells yields an empty dataset.
pub fn ingest(bytes: &[u8], options: &IngestOptions) -> Result<Dataset, SpreadsheetError> {
    let mut spreadsheet = open_spreadsheet(bytes)?;
    let sheet = spreadsheet.read_first_sheet().with_prefix("Read first worksheet")?;
    let dataset = sheet_to_dataset(&sheet, options);
    info!(
        "Ingested sheet '{}': {} rows x {} columns",
        sheet.name,
        dataset.records.len(),
        dataset.columns.len()
    );
    Ok(dataset)
}

fn sheet_to_dataset(sheet: &Sheet, options: &IngestOptions) -> Dataset {
    let (Some(header_row), Some(col_lower), Some(col_upper)) =
        (sheet.row_lower_bound, sheet.col_lower_bound, sheet.col_upper_bound)
    else {
        debug!("Sheet '{}' has no cells", sheet.name);
        return Dataset::default();
    };

    let (col_lower, col_upper) = match options.header_mode {
        HeaderMode::Inferred => (col_lower, col_upper),
        HeaderMode::Strict => {
            let width = strict_header_width(sheet, header_row);
            if width == 0 {
                debug!("Sheet '{}' has no header in column A", sheet.name);
                return Dataset::default();
            }
            (0, width - 1)
        }
    };

    let table = sheet.table(header_row, col_lower, col_upper);
    let Some((header, rows)) = table.split_first() else {
        return Dataset::default();
    };
    let columns = header_names(header);
    let records = rows
        .iter()
        .filter(|row| !options.skip_empty_rows || row.iter().any(|cell| !is_blank(*cell)))
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| {
                    let value = cell.map(Cell::to_value).unwrap_or_else(|| Value::Text(String::new()));
                    (name.to_owned(), value)
                })
                .collect::<Record>()
        })
        .collect();
    Dataset { columns, records }
}

fn is_blank(cell: Option<&Cell>) -> bool {
    cell.map(|cell| cell.value.trim().is_empty()).unwrap_or(true)
}

/// Counts the consecutive non-empty header cells starting at column A.
fn strict_header_width(sheet: &Sheet, header_row: usize) -> usize {
    let mut width = 0usize;
    for cell in sheet.cells.iter().filter(|cell| cell.row == header_row) {
        if cell.col != width || cell.value.trim().is_empty() {
            break;
        }
        width += 1;
    }
    width
}

/// Names header cells, filling blanks and suffixing duplicates so keys stay unique.
fn header_names(header: &[Option<&Cell>]) -> Vec<String> {
    let mut seen = HashSet::<String>::new();
    let mut names = Vec::<String>::with_capacity(header.len());
    for cell in header {
        let text = cell.map(|cell| cell.to_value().to_string()).unwrap_or_default();
        let base = if text.trim().is_empty() { "__EMPTY".to_owned() } else { text };
        let mut name = base.to_owned();
        let mut suffix = 0usize;
        while seen.contains(&name) {
            suffix += 1;
            name = format!("{base}_{suffix}");
        }
        seen.insert(name.to_owned());
        names.push(name);
    }
    names
}
