//! Format-neutral sheet grid shared by both workbook adapters

use crate::types::CellValue;
use calamine::{Data, Range};
use std::collections::BTreeMap;

static EMPTY: CellValue = CellValue::Empty;

/// A worksheet held in memory with absolute coordinates
/// (row 0 is the first spreadsheet row, column 0 is `A`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<CellValue>>,
    /// Cell formulas keyed by (row, col), without the leading '='
    formulas: BTreeMap<(usize, usize), String>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            formulas: BTreeMap::new(),
        }
    }

    /// Build a sheet from row vectors (row 0 is the header)
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
            formulas: BTreeMap::new(),
        }
    }

    /// Build a sheet from a calamine value range
    pub fn from_range(name: &str, range: &Range<Data>) -> Self {
        let mut sheet = Sheet::new(name);
        let (row0, col0) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        for (row, col, data) in range.used_cells() {
            sheet.set(row0 + row, col0 + col, CellValue::from(data));
        }
        sheet
    }

    /// Attach formulas from a calamine formula range
    pub fn attach_formulas(&mut self, range: &Range<String>) {
        let (row0, col0) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        for (row, col, formula) in range.used_cells() {
            let formula = formula.trim_start_matches('=');
            if !formula.is_empty() {
                self.formulas
                    .insert((row0 + row, col0 + col), formula.to_string());
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Number of rows, including the header
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Write a value, growing the grid as needed. Drops any formula at that cell.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = value.canonical();
        self.formulas.remove(&(row, col));
    }

    /// Row 0, stringified and trimmed
    pub fn header_row(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|cells| cells.iter().map(CellValue::header_text).collect())
            .unwrap_or_default()
    }

    /// Non-empty cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &CellValue)> {
        self.rows.iter().enumerate().flat_map(|(r, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_empty())
                .map(move |(c, value)| (r, c, value))
        })
    }

    pub fn formula(&self, row: usize, col: usize) -> Option<&str> {
        self.formulas.get(&(row, col)).map(String::as_str)
    }

    pub fn formulas(&self) -> impl Iterator<Item = ((usize, usize), &str)> {
        self.formulas.iter().map(|(pos, f)| (*pos, f.as_str()))
    }

    /// True when writing `value` at (row, col) would change nothing
    pub fn holds(&self, row: usize, col: usize, value: &CellValue) -> bool {
        let current = self.get(row, col);
        self.formula(row, col).is_none()
            && ((current.is_empty() && value.is_empty())
                || *current == value.clone().canonical())
    }

    /// Same cells and formulas, whatever the names
    pub fn same_contents(&self, other: &Sheet) -> bool {
        self.formulas == other.formulas && self.cells().eq(other.cells())
    }

    /// Replace all cells and formulas with those of `other`, keeping this sheet's name
    pub fn replace_contents(&mut self, other: Sheet) {
        self.rows = other.rows;
        self.formulas = other.formulas;
    }
}
