use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

/// ODS file MIME type identifier
const MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";
/// XML element name for table (sheet)
const TABLE: QName = QName(b"table:table");
/// XML element name for table row
const TABLE_ROW: QName = QName(b"table:table-row");
/// XML element name for table cell
const TABLE_CELL: QName = QName(b"table:table-cell");
/// XML element name for covered table cell (merged cells)
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// XML element name for annotations (comments)
const ANNOTATION: QName = QName(b"office:annotation");
/// XML element name for paragraph text
const PARAGRAPH: QName = QName(b"text:p");
/// XML element name for string (space) text
const STRING: QName = QName(b"text:s");

/// Repeated trailing rows and columns are written with counts in the millions
/// to pad a sheet out to its full size. One repeated cell expands to at most
/// this many cells across both directions; past that it only pads.
const MAX_REPEAT: usize = 1 << 14;

/// An OpenDocument spreadsheet (.ods)
pub(crate) struct OdsSpreadsheet<RS: Read + Seek> {
    zip: ZipArchive<RS>,
}

impl<RS: Read + Seek> OdsSpreadsheet<RS> {
    /// Validates the package MIME type and encryption state.
    pub(crate) fn open(mut zip: ZipArchive<RS>) -> Result<Self, SpreadsheetError> {
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::PasswordProtectedError)?;
        }
        Ok(OdsSpreadsheet { zip })
    }
}

impl<RS: Read + Seek> Spreadsheet for OdsSpreadsheet<RS> {
    fn read_first_sheet(&mut self) -> Result<Sheet, SpreadsheetError> {
        let mut reader = self.zip
            .xml_reader("content.xml")?
            .ok_or_else(|| SpreadsheetError::FileError("content.xml".to_string()))?;

        let mut sheet_name = None::<String>;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TABLE => {
                let table_name = event.get_attribute_value("table:name")?.unwrap_or_default();
                sheet_name = Some(table_name.to_string());
                break;
            }
        });
        let Some(sheet_name) = sheet_name else {
            return Err(SpreadsheetError::EmptyWorkbookError);
        };
        let mut sheet = Sheet::new(&sheet_name);

        // Cell state
        let mut row = 0usize;
        let mut col = 0usize;
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        // Context state
        let mut element_context = false; // reading text children
        let mut comment_context = false; // inside an annotation
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TABLE => break,
            Event::Start(event) if event.name() == TABLE_ROW => {
                row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                col = 0;
            }
            Event::End(event) if event.name() == TABLE_ROW => {
                row += row_count;
            }
            Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                value.clear();
                col_count = event.parse_attribute_value::<usize>("table:number-columns-repeated")?.unwrap_or(1);
                let value_type = event.get_attribute_value("office:value-type")?;
                kind = match value_type.as_deref() {
                    Some("boolean") => CellType::Boolean,
                    Some("date") => CellType::IsoDateTime,
                    Some("time") => CellType::IsoDuration,
                    Some("string") => {
                        if event.get_attribute_value("calcext:value-type")?.map(|cow| cow == "error").unwrap_or(false) {
                            CellType::Error
                        } else {
                            CellType::String
                        }
                    }
                    Some(_) => CellType::Number,
                    None => CellType::Empty,
                };
                match value_type.as_deref() {
                    Some("string") => element_context = true,
                    Some("boolean") => {
                        let truthy = event.get_attribute_value("office:boolean-value")?
                            .map(|cow| cow != "false" && cow != "0")
                            .unwrap_or(false);
                        value.push_str(if truthy { "1" } else { "0" });
                    }
                    Some("date") => if let Some(data) = event.get_attribute_value("office:date-value")? {
                        value.push_str(&data);
                    },
                    Some("time") => if let Some(data) = event.get_attribute_value("office:time-value")? {
                        value.push_str(&data);
                    },
                    Some(_) => if let Some(data) = event.get_attribute_value("office:value")? {
                        value.push_str(&data);
                    },
                    None => (),
                }
            }
            Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    let cols = col_count.min(MAX_REPEAT);
                    let rows = row_count.min(MAX_REPEAT / cols.max(1));
                    for row_offset in 0..rows {
                        for col_offset in 0..cols {
                            sheet.push(Cell {
                                row: row + row_offset,
                                col: col + col_offset,
                                kind,
                                value: value.to_owned(),
                            });
                        }
                    }
                }
                col += col_count;
                element_context = false;
                comment_context = false;
            }
            // String content
            Event::Start(event) if element_context && event.name() == ANNOTATION => comment_context = true,
            Event::End(event) if element_context && comment_context && event.name() == ANNOTATION => comment_context = false,
            Event::Start(event) if element_context && !comment_context && event.name() == PARAGRAPH => {
                if !value.is_empty() {
                    value.push('\n');
                }
            }
            Event::Start(event) if element_context && !comment_context && event.name() == STRING => {
                let count = event.parse_attribute_value("text:c")?.unwrap_or(1);
                for _ in 0..count {
                    value.push(' ');
                }
            }
            Event::Text(event) if element_context && !comment_context => value.push_bytes_text(&event)?,
            Event::GeneralRef(event) if element_context && !comment_context => value.push_bytes_ref(&event)?,
        });
        sheet.finish();
        Ok(sheet)
    }
}

/// Validates the `mimetype` member when the package carries one.
fn check_mime<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(), SpreadsheetError> {
    if let Some(file) = &mut zip.file("mimetype")? {
        let mut buffer = Vec::with_capacity(MIME_TYPE.len());
        file.read_to_end(&mut buffer)?;
        if buffer.trim_ascii() != MIME_TYPE {
            Err(SpreadsheetError::MimeTypeError)?;
        }
    }
    Ok(())
}

/// Checks the manifest for encryption data. A package without a manifest is not encrypted.
fn is_password_protected<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<bool, SpreadsheetError> {
    let mut reader = match zip.xml_reader("META-INF/manifest.xml")? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = true,
        Event::End(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == QName(b"manifest:encryption-data") => {
            return Ok(true);
        }
    });
    Ok(false)
}
