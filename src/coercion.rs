//! Date-like value normalization applied on the way into the store.
//!
//! Coercion is a table of rules tried in order. A rule either applies to every
//! column or only to columns whose name looks date-related (contains one of
//! the configured keywords). The first rule that parses a value wins and the
//! value is rewritten to [`CANONICAL_FORMAT`]; anything no rule accepts passes
//! through unchanged.

use crate::value::Record;
use crate::value::Value;
use chrono::DateTime;
use chrono::Datelike;
use chrono::Duration;
use chrono::Local;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Canonical timestamp rendering, `YYYY-MM-DD HH:MM:SS`
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column-name keywords that mark a column as date-like
pub const DEFAULT_DATE_KEYWORDS: [&str; 4] = ["date", "time", "created", "updated"];

/// Serials above this are treated as plain numbers
const MAX_SERIAL: f64 = 100_000.0;

static TIME_SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})\.(\d{1,2})$").expect("time shorthand pattern"));

static SERIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("serial pattern"));

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parses a trimmed cell string into a timestamp. `today` anchors time-only shapes.
pub type ParseFn = fn(&str, NaiveDate) -> Option<NaiveDateTime>;

#[derive(Clone, Copy, Debug)]
pub struct CoercionRule {
    pub name: &'static str,
    /// Only applies to date-like columns
    pub gated: bool,
    pub parse: ParseFn,
}

impl CoercionRule {
    /// `H:MM.S` or `HH:MM.S` time of day on the current date
    pub const TIME_SHORTHAND: CoercionRule = CoercionRule { name: "time-shorthand", gated: true, parse: parse_time_shorthand };

    /// Spreadsheet day serial counted from 1899-12-30
    pub const SERIAL: CoercionRule = CoercionRule { name: "serial", gated: true, parse: parse_serial };

    /// Common calendar date and date-time spellings
    pub const CALENDAR: CoercionRule = CoercionRule { name: "calendar", gated: true, parse: parse_calendar };
}

/// Applies the coercion rule table to values on their way into the store.
#[derive(Clone, Debug)]
pub struct Coercer {
    keywords: Vec<String>,
    rules: Vec<CoercionRule>,
    today: Option<NaiveDate>,
}

impl Default for Coercer {
    fn default() -> Self {
        Coercer::new(DEFAULT_DATE_KEYWORDS)
    }
}

impl Coercer {
    /// Builds a coercer with the default rules and the given column-name keywords.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Coercer {
            keywords: keywords.into_iter().map(|keyword| keyword.as_ref().to_lowercase()).collect(),
            rules: vec![CoercionRule::TIME_SHORTHAND, CoercionRule::SERIAL, CoercionRule::CALENDAR],
            today: None,
        }
    }

    /// Appends a rule, tried after the existing ones.
    pub fn with_rule(mut self, rule: CoercionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Pins the date that time-only values are anchored to.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn rules(&self) -> &[CoercionRule] {
        &self.rules
    }

    /// True when the column name contains a date keyword, ignoring case.
    pub fn is_date_column(&self, column: &str) -> bool {
        let column = column.to_lowercase();
        self.keywords.iter().any(|keyword| column.contains(keyword.as_str()))
    }

    /// Rewrites a recognized date-like value to the canonical string.
    pub fn normalize(&self, value: &Value, column: &str) -> Value {
        let date_column = self.is_date_column(column);
        let text = match value {
            Value::Text(text) => Cow::Borrowed(text.trim()),
            Value::Number(_) if date_column => Cow::Owned(value.to_string()),
            _ => return value.clone(),
        };
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        self.rules
            .iter()
            .filter(|rule| date_column || !rule.gated)
            .find_map(|rule| (rule.parse)(&text, today))
            .map(|datetime| Value::Text(datetime.format(CANONICAL_FORMAT).to_string()))
            .unwrap_or_else(|| value.clone())
    }

    /// Normalizes every field of a record by its column name.
    pub fn normalize_record(&self, record: &Record) -> Record {
        record
            .iter()
            .map(|(column, value)| (column, self.normalize(value, column)))
            .collect()
    }
}

fn parse_time_shorthand(text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let captures = TIME_SHORTHAND.captures(text)?;
    let hours = captures[1].parse::<u32>().ok()?;
    let minutes = captures[2].parse::<u32>().ok()?;
    let fraction = &captures[3];
    let mut seconds = fraction.parse::<u32>().ok()?;
    if fraction.len() == 1 {
        seconds *= 10;
    }
    let time = NaiveTime::from_hms_opt(hours, minutes, seconds.min(59))?;
    Some(today.and_time(time))
}

fn parse_serial(text: &str, _today: NaiveDate) -> Option<NaiveDateTime> {
    if !SERIAL.is_match(text) {
        return None;
    }
    let days = text.parse::<f64>().ok()?;
    if days > MAX_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let datetime = epoch + Duration::seconds((days * 86_400.0).round() as i64);
    (1900..=2100).contains(&datetime.year()).then_some(datetime)
}

fn parse_calendar(text: &str, _today: NaiveDate) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|datetime| datetime.naive_local()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .filter(|datetime| (1900..2100).contains(&datetime.year()))
}
