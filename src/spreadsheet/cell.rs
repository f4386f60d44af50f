use crate::value::Value;
use iso8601_duration::Duration as IsoDuration;
use std::fmt::Display;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as `1` / `0`
    Boolean,
    /// Numeric values, including unformatted date serials
    Number,
    /// Inline or shared string, already resolved to its text
    String,
    /// ISO 8601 date/time strings (OpenDocument `date` cells)
    IsoDateTime,
    /// ISO 8601 duration strings (OpenDocument `time` cells)
    IsoDuration,
    /// Formula error values such as `#N/A`
    Error,
}

/// Maps the `t` attribute of an xlsx `<c>` element to a cell type.
pub(crate) fn parse_xlsx_type(t: Option<&str>) -> CellType {
    match t {
        Some("inlineStr" | "str" | "s") => CellType::String,
        Some("d") => CellType::IsoDateTime,
        Some("b") => CellType::Boolean,
        Some("e") => CellType::Error,
        _ => CellType::Number,
    }
}

/// Maps a binary error code to its display text.
pub(crate) fn to_error_value(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single non-empty cell with its position, type, and raw value.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// Converts the raw cell into a record value. Numbers stay numeric, so a
    /// date-formatted cell surfaces as its day serial, not as formatted text.
    pub(crate) fn to_value(&self) -> Value {
        match self.kind {
            CellType::Empty => Value::Text(String::new()),
            CellType::Boolean => Value::Bool(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => self.value
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::Text(self.value.to_owned())),
            _ => Value::Text(self.to_string()),
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self.kind {
            CellType::Boolean => if self.value == "1" { "true" } else { "false" }.to_owned(),
            CellType::IsoDateTime => self.value.replace('T', " "),
            CellType::IsoDuration => duration_to_time(&self.value),
            _ => self.value.to_owned(),
        };
        write!(f, "{}", value)
    }
}

/// Renders an OpenDocument time value such as `PT09H45M30S` as `09:45:30`.
/// Days fold into the hours, so `P1DT02H30M00S` is `26:30:00`.
fn duration_to_time(value: &str) -> String {
    let (sign, body) = match value.trim().strip_prefix('-') {
        Some(body) => ("-", body),
        None => ("", value.trim()),
    };
    let Ok(duration) = body.parse::<IsoDuration>() else {
        return value.to_owned();
    };
    let hours = duration.day as f64 * 24.0 + duration.hour as f64;
    let seconds = ((hours * 60.0 + duration.minute as f64) * 60.0 + duration.second as f64).round() as u64;
    format!("{sign}{:02}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}
