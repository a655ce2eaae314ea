use crate::column::ColumnSpec;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::fmt;

//==============================================================================
// Cell Values
//==============================================================================

/// A single cell value as seen by the rule engine.
///
/// Every value coming from a spreadsheet backend is canonicalized into this
/// enum once, at the boundary. The matching logic never sees raw backend types.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date (days since 1899-12-30)
    DateTime(f64),
}

impl CellValue {
    /// Canonical form used on every read and write.
    ///
    /// Not-a-number becomes the empty string.
    pub fn canonical(self) -> Self {
        match self {
            CellValue::Number(n) | CellValue::DateTime(n) if n.is_nan() => {
                CellValue::String(String::new())
            }
            other => other,
        }
    }

    /// True for missing cells, empty strings and the NaN sentinel
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.is_empty(),
            CellValue::Number(n) | CellValue::DateTime(n) => n.is_nan(),
            CellValue::Bool(_) => false,
        }
    }

    /// Textual representation used for regex matching.
    ///
    /// Returns `None` for empty cells so callers can skip them.
    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(match self {
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::DateTime(serial) => {
                format_serial_date(*serial).unwrap_or_else(|| format_number(*serial))
            }
            CellValue::Empty => String::new(),
        })
    }

    /// Header-row form: stringified and trimmed, missing cells become ""
    pub fn header_text(&self) -> String {
        self.as_text()
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

impl From<&calamine::Data> for CellValue {
    fn from(data: &calamine::Data) -> Self {
        use calamine::Data;

        let value = match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::String(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::String(e.to_string()),
        };
        value.canonical()
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n).canonical()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text().unwrap_or_default())
    }
}

/// Format a number for matching, dropping the fractional part of whole numbers
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Render an Excel serial date as `YYYY-MM-DD HH:MM:SS`
fn format_serial_date(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let datetime = epoch.checked_add_signed(Duration::try_milliseconds(millis)?)?;
    Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}

//==============================================================================
// Sheet Selection
//==============================================================================

/// Which sheet of a workbook a rule group reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetSpec {
    /// 0-based position
    Index(usize),
    /// Exact sheet name
    Name(String),
}

impl Default for SheetSpec {
    fn default() -> Self {
        SheetSpec::Index(0)
    }
}

impl SheetSpec {
    /// Normalize a rules-table cell into a sheet spec.
    ///
    /// Blank → first sheet, whole numbers and digit strings → index,
    /// anything else → sheet name.
    pub fn from_cell(cell: &CellValue) -> Self {
        match cell {
            CellValue::Number(n) if n.fract() == 0.0 && *n >= 0.0 => SheetSpec::Index(*n as usize),
            _ => match cell.as_text() {
                None => SheetSpec::Index(0),
                Some(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        SheetSpec::Index(0)
                    } else if trimmed.chars().all(|c| c.is_ascii_digit()) {
                        trimmed
                            .parse()
                            .map(SheetSpec::Index)
                            .unwrap_or_else(|_| SheetSpec::Name(trimmed.to_string()))
                    } else {
                        SheetSpec::Name(trimmed.to_string())
                    }
                }
            },
        }
    }
}

impl fmt::Display for SheetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSpec::Index(i) => write!(f, "#{i}"),
            SheetSpec::Name(name) => write!(f, "'{name}'"),
        }
    }
}

//==============================================================================
// Rules
//==============================================================================

/// One regex-triggered rewrite: when the trigger column matches `pattern`,
/// every `(column, value)` change is written to the row.
#[derive(Debug, Clone)]
pub struct Rule {
    pub trigger_column: ColumnSpec,
    pub pattern: Regex,
    pub changes: Vec<(ColumnSpec, CellValue)>,
    /// 1-based row of the rules table this rule came from (for diagnostics)
    pub source_row: usize,
}

impl Rule {
    pub fn pattern_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// All rules bound to one input sheet → output sheet mapping
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub input_file: String,
    pub input_sheet: SheetSpec,
    pub output_file: String,
    pub output_sheet: SheetSpec,
    /// Rules in table order (first match wins)
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    pub fn new(
        input_file: String,
        input_sheet: SheetSpec,
        output_file: String,
        output_sheet: SheetSpec,
    ) -> Self {
        Self {
            input_file,
            input_sheet,
            output_file,
            output_sheet,
            rules: Vec::new(),
        }
    }

    /// Regexes of all rules, for error context
    pub fn patterns(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::pattern_str).collect()
    }
}
