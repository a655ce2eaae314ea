//! Column specifications: numeric index, Excel letter code, or header name

use crate::error::{RulesError, RulesResult};
use crate::types::CellValue;
use serde::Serialize;
use std::fmt;

/// Widest grid any supported format can address (`XFD` in OOXML)
pub const MAX_COLUMNS: usize = 16_384;

/// A column reference as written in a rules table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnSpec {
    /// 0-based column index
    Index(usize),
    /// Excel-style code, upper-cased ("A" = 0, "AA" = 26)
    Letter(String),
    /// Exact (trimmed) header-row entry
    HeaderName(String),
}

impl ColumnSpec {
    /// Parse a rules-table cell into a column spec.
    ///
    /// Whole non-negative numbers and digit strings are indexes. Strings of
    /// one to three ASCII letters addressing a real column are letter codes.
    /// Anything else is looked up by header name at resolution time.
    pub fn from_cell(cell: &CellValue) -> RulesResult<Self> {
        match cell {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && *n >= 0.0 && *n < MAX_COLUMNS as f64 {
                    Ok(ColumnSpec::Index(*n as usize))
                } else {
                    Err(RulesError::MalformedColumnSpec {
                        spec: cell.to_string(),
                        reason: "column index must be a non-negative whole number".to_string(),
                    })
                }
            }
            _ => {
                let text = cell.as_text().unwrap_or_default();
                Self::parse(&text)
            }
        }
    }

    /// Parse a textual column spec (CLI flags, digit strings, letters, names)
    pub fn parse(text: &str) -> RulesResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RulesError::MalformedColumnSpec {
                spec: text.to_string(),
                reason: "empty column spec".to_string(),
            });
        }

        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return match trimmed.parse::<usize>() {
                Ok(index) if index < MAX_COLUMNS => Ok(ColumnSpec::Index(index)),
                _ => Err(RulesError::MalformedColumnSpec {
                    spec: trimmed.to_string(),
                    reason: format!("column index exceeds {}", MAX_COLUMNS - 1),
                }),
            };
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.len() <= 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Ok(index) = letter_to_index(&upper) {
                if index < MAX_COLUMNS {
                    return Ok(ColumnSpec::Letter(upper));
                }
            }
        }

        Ok(ColumnSpec::HeaderName(trimmed.to_string()))
    }

    /// Resolve to a 0-based column index against a sheet's header row.
    ///
    /// `header` entries are expected to be trimmed already.
    pub fn resolve(&self, header: &[String]) -> RulesResult<usize> {
        match self {
            ColumnSpec::Index(index) => Ok(*index),
            ColumnSpec::Letter(code) => letter_to_index(code),
            ColumnSpec::HeaderName(name) => header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| RulesError::ColumnNotFound(name.clone())),
        }
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSpec::Index(i) => write!(f, "{i}"),
            ColumnSpec::Letter(code) => f.write_str(code),
            ColumnSpec::HeaderName(name) => write!(f, "'{name}'"),
        }
    }
}

/// Convert Excel column letters to a 0-based index (A→0, Z→25, AA→26)
pub fn letter_to_index(code: &str) -> RulesResult<usize> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RulesError::MalformedColumnSpec {
            spec: code.to_string(),
            reason: "empty column letters".to_string(),
        });
    }

    let mut num: usize = 0;
    for ch in code.chars() {
        let upper = ch.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return Err(RulesError::MalformedColumnSpec {
                spec: code.to_string(),
                reason: format!("invalid column letter '{ch}'"),
            });
        }
        num = num
            .checked_mul(26)
            .and_then(|n| n.checked_add((upper as u8 - b'A') as usize + 1))
            .ok_or_else(|| RulesError::MalformedColumnSpec {
                spec: code.to_string(),
                reason: "column letters too long".to_string(),
            })?;
    }
    Ok(num - 1)
}

/// Convert column index to Excel column letter (0→A, 1→B, 25→Z, 26→AA, etc.)
pub fn index_to_letter(n: usize) -> String {
    let mut result = String::new();
    let mut num = n;

    loop {
        let remainder = num % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if num < 26 {
            break;
        }
        num = num / 26 - 1;
    }

    result
}
