//! Rules workbook reader

use crate::error::{RulesError, RulesResult};
use crate::types::CellValue;
use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use tracing::debug;

/// Columns every rules table must carry
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "Input_File",
    "Input_Sheet",
    "Regex",
    "Output_File",
    "Output_Sheet",
];

/// Column naming the trigger column of a rule (optional)
pub const REGEX_COLUMN: &str = "Regex_Column";

/// The first sheet of a rules workbook: a header plus data rows padded or
/// truncated to the header width
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulesTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RulesTable {
    /// Read the first sheet of any workbook calamine understands
    /// (`.xls`, `.xlsx`, `.xlsb`, `.ods`)
    pub fn read(path: &Path) -> RulesResult<Self> {
        let open_error = |reason: String| RulesError::WorkbookOpen {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(open_error("rules file not found".to_string()));
        }

        let mut workbook = open_workbook_auto(path).map_err(|e| open_error(e.to_string()))?;
        let first = workbook
            .sheet_names()
            .into_iter()
            .next()
            .ok_or_else(|| RulesError::RulesTable("rules workbook has no sheets".to_string()))?;
        let range = workbook
            .worksheet_range(&first)
            .map_err(|e| open_error(format!("sheet '{}': {}", first, e)))?;

        let mut grid: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect();

        // Ranges start at the first used cell; re-anchor so row 0 is the header
        if let Some((row0, col0)) = range.start() {
            if col0 > 0 {
                for row in &mut grid {
                    row.splice(0..0, std::iter::repeat(CellValue::Empty).take(col0 as usize));
                }
            }
            if row0 > 0 {
                debug!(path = %path.display(), skipped = row0, "rules header is not on the first row");
            }
        }

        let table = Self::from_grid(grid);
        debug!(
            path = %path.display(),
            columns = table.columns.len(),
            rows = table.rows.len(),
            "read rules table"
        );
        Ok(table)
    }

    /// Build a table from raw rows; the first row is the header
    pub fn from_grid(grid: Vec<Vec<CellValue>>) -> Self {
        let mut grid = grid.into_iter();
        let columns: Vec<String> = match grid.next() {
            Some(header) => header.iter().map(CellValue::header_text).collect(),
            None => return Self::default(),
        };

        let width = columns.len();
        let rows = grid
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// Fail with the list of absent required columns
    pub fn check_required(&self) -> RulesResult<()> {
        if self.columns.is_empty() {
            return Err(RulesError::RulesTable("rules table is empty".to_string()));
        }

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| !self.has_column(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RulesError::RulesTable(format!(
                "missing required columns: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell of `row` under column `name`, `Empty` when the column is absent
    pub fn cell<'a>(&self, row: &'a [CellValue], name: &str) -> &'a CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.column_index(name)
            .and_then(|i| row.get(i))
            .unwrap_or(&EMPTY)
    }
}
