//! Legacy Excel 97-2003 workbooks: BIFF8 records in the `Workbook` stream of
//! a compound file.

use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6;        // Cell formula and its cached result
const EOF: u16 = 10;           // End of a substream
const FILE_PASS: u16 = 47;     // Workbook is encrypted
const CODE_PAGE: u16 = 66;     // Code page of 8-bit strings
const BOUND_SHEET8: u16 = 133; // Sheet name, type and stream position
const MUL_RK: u16 = 189;       // Run of RK numbers in one row
const SST: u16 = 252;          // Shared string table
const LABEL_SST: u16 = 253;    // Cell referencing the shared string table
const NUMBER: u16 = 515;       // Floating point cell
const LABEL: u16 = 516;        // Inline string cell
const BOOL_ERR: u16 = 517;     // Boolean or error cell
const STRING: u16 = 519;       // String result of the preceding formula
const RK: u16 = 638;           // Compressed number cell
const BOF: u16 = 2057;         // Beginning of a substream

/// BOUNDSHEET8 `dt` value for worksheets; charts and macro sheets are skipped
const WORKSHEET: u8 = 0;

#[derive(Error, Debug)]
pub(crate) enum XlsError {
    #[error("Invalid code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid formula value '{0:#018x}'")]
    FormulaValueError(u64),
}

pub(crate) struct XlsSpreadsheet {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Worksheet names with the stream offset of their BOF record
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Reads the workbook globals: code page, shared strings and sheet list.
    pub(crate) fn open(cfb: &Cfb) -> Result<Self, SpreadsheetError> {
        let stream = match cfb.read("Workbook")? {
            Some(stream) => stream,
            None => cfb.read("Book")?.ok_or(SpreadsheetError::FormatError)?,
        };
        let mut reader = Biff8Reader::new(stream);
        let mut shared_strings = Vec::new();
        let mut sheets = Vec::<(String, usize)>::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => return Err(SpreadsheetError::PasswordProtectedError),
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(1)?;
                let kind = reader.read_u8()?;
                let name = reader.read_short_xl_unicode_string()?;
                if kind == WORKSHEET {
                    sheets.push((name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            return Err(SpreadsheetError::EmptyWorkbookError);
        }
        debug!("Opened xls workbook with {} worksheets and {} shared strings", sheets.len(), shared_strings.len());
        Ok(XlsSpreadsheet { reader, shared_strings, sheets })
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn read_first_sheet(&mut self) -> Result<Sheet, SpreadsheetError> {
        let (sheet_name, pointer) = self.sheets[0].to_owned();
        let mut sheet = Sheet::new(&sheet_name);
        self.reader.goto(pointer);
        if self.reader.next()? != Some(BOF) {
            return Err(SpreadsheetError::FileError(sheet_name));
        }
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_first = self.reader.read_u16()? as usize;
                    let col_last = self.reader.get_u16_back(2)? as usize;
                    for col in col_first..=col_last {
                        self.reader.skip(2)?; // XF index
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell { row, col, kind: CellType::Number, value });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (kind, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => {
                            self.reader.skip(2)?;
                            (CellType::Number, self.reader.read_f64()?.to_string())
                        }
                        RK => {
                            self.reader.skip(2)?;
                            (CellType::Number, self.reader.read_rk_number()?)
                        }
                        LABEL_SST => {
                            self.reader.skip(2)?;
                            let index = self.reader.read_usize()?;
                            let value = self.shared_strings.get(index).cloned().ok_or_else(|| {
                                SpreadsheetError::CellValueError(index_to_reference(row, col), index.to_string())
                            })?;
                            (CellType::String, value)
                        }
                        LABEL => {
                            self.reader.skip(2)?;
                            (CellType::String, self.reader.read_xl_unicode_string()?)
                        }
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        sheet.finish();
        Ok(sheet)
    }
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SpreadsheetError> {
    reader.skip(4)?; // Total references
    let count = reader.read_usize()?;
    let mut shared_strings = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(CellType, String), SpreadsheetError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (CellType::Error, to_error_value(value).to_owned())
    } else {
        (CellType::Boolean, value.to_string())
    })
}

/// Reads the cached result of a formula. A string result is stored in the
/// STRING record that follows.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(CellType, String), SpreadsheetError> {
    reader.skip(2)?;
    let formula = reader.read_u64()?;
    if formula & 0xFFFF_0000_0000_0000 != 0xFFFF_0000_0000_0000 {
        return Ok((CellType::Number, f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => match reader.next()? {
            Some(STRING) => Ok((CellType::String, reader.read_xl_unicode_string()?)),
            _ => Err(XlsError::FormulaValueError(formula).into()),
        },
        1 => Ok((CellType::Boolean, if formula & 0xFF_0000 != 0 { "1" } else { "0" }.to_owned())),
        2 => Ok((CellType::Error, to_error_value(((formula >> 16) & 0xFF) as u8).to_owned())),
        3 => Ok((CellType::String, String::new())),
        _ => Err(XlsError::FormulaValueError(formula).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::fixture;
    use crate::spreadsheet::fixture::biff_record;
    use crate::value::Value;

    fn cell_header(row: u16, col: u16) -> Vec<u8> {
        [row.to_le_bytes(), col.to_le_bytes(), 0u16.to_le_bytes()].concat()
    }

    fn formula(row: u16, col: u16, value: [u8; 8]) -> Vec<u8> {
        biff_record(FORMULA, &[cell_header(row, col), value.to_vec(), vec![0; 8]].concat())
    }

    fn first_sheet(bytes: &[u8]) -> Result<Sheet, SpreadsheetError> {
        let cfb = Cfb::new(bytes)?;
        XlsSpreadsheet::open(&cfb)?.read_first_sheet()
    }

    #[test]
    fn shared_strings_numbers_and_booleans() {
        let bytes = fixture::xls(&[&["name", "qty", "ok"], &["Åsa", "3.5", "TRUE"], &["東京", "", "FALSE"]]);
        let sheet = first_sheet(&bytes).expect("sheet");

        assert_eq!(sheet.name, "Sheet1");
        let values: Vec<(usize, usize, Value)> = sheet.cells.iter().map(|cell| (cell.row, cell.col, cell.to_value())).collect();
        assert_eq!(values, vec![
            (0, 0, Value::from("name")),
            (0, 1, Value::from("qty")),
            (0, 2, Value::from("ok")),
            (1, 0, Value::from("Åsa")),
            (1, 1, Value::Number(3.5)),
            (1, 2, Value::Bool(true)),
            (2, 0, Value::from("東京")),
            (2, 2, Value::Bool(false)),
        ]);
    }

    #[test]
    fn rk_runs_and_formula_results() {
        let mut mul_rk = [1u16.to_le_bytes(), 0u16.to_le_bytes()].concat();
        for rk in [(42u32 << 2) | 0x02, ((1.5f64.to_bits() >> 34) as u32) << 2] {
            mul_rk.extend(0u16.to_le_bytes());
            mul_rk.extend(rk.to_le_bytes());
        }
        mul_rk.extend(1u16.to_le_bytes());

        let cells = [
            biff_record(MUL_RK, &mul_rk),
            formula(2, 0, [0, 0, 0, 0, 0, 0, 0xFF, 0xFF]),
            biff_record(STRING, &[5, 0, 0, b'A', b'l', b'p', b'h', b'a']),
            formula(2, 1, [1, 0, 1, 0, 0, 0, 0xFF, 0xFF]),
            formula(2, 2, [2, 0, 0x2A, 0, 0, 0, 0xFF, 0xFF]),
            formula(2, 3, 2.5f64.to_le_bytes()),
            formula(2, 4, [3, 0, 0, 0, 0, 0, 0xFF, 0xFF]),
        ]
        .concat();
        let bytes = fixture::cfb(&[("Workbook", fixture::workbook_stream(&[], &[], &cells).as_slice())]);
        let sheet = first_sheet(&bytes).expect("sheet");

        let values: Vec<(usize, usize, String)> = sheet.cells.iter().map(|cell| (cell.row, cell.col, cell.to_string())).collect();
        assert_eq!(values, vec![
            (1, 0, "42".to_owned()),
            (1, 1, "1.5".to_owned()),
            (2, 0, "Alpha".to_owned()),
            (2, 1, "true".to_owned()),
            (2, 2, "#N/A".to_owned()),
            (2, 3, "2.5".to_owned()),
        ]);
    }

    #[test]
    fn encrypted_and_empty_workbooks() {
        let encrypted = fixture::cfb(&[("Workbook", fixture::workbook_stream(&biff_record(FILE_PASS, &[1, 0]), &[], &[]).as_slice())]);
        assert!(matches!(first_sheet(&encrypted), Err(SpreadsheetError::PasswordProtectedError)));

        let no_workbook = fixture::cfb(&[("Other", &b"data"[..])]);
        assert!(matches!(first_sheet(&no_workbook), Err(SpreadsheetError::FormatError)));
    }

    #[test]
    fn dangling_shared_string_index() {
        let cells = biff_record(LABEL_SST, &[cell_header(0, 0), 9u32.to_le_bytes().to_vec()].concat());
        let bytes = fixture::cfb(&[("Workbook", fixture::workbook_stream(&[], &["only"], &cells).as_slice())]);
        assert!(matches!(
            first_sheet(&bytes),
            Err(SpreadsheetError::CellValueError(reference, index)) if reference == "A1" && index == "9"
        ));
    }
}
