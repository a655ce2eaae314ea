//! ArchiveBased adapter (`.xlsx`)
//!
//! calamine supplies the cell view the rules read. Every write also lands in
//! the umya-spreadsheet document loaded from the same file, so saving leaves
//! untouched cells exactly as they were: styles, number formats, formulas and
//! cached formula results.

use super::{
    check_bounds, check_sheet_name, check_signature, place_sheet, unchanged_placement,
    FormatAdapter, RowHandle, Sheet, SheetId, WorkbookFormat,
};
use crate::column::index_to_letter;
use crate::error::{RulesError, RulesResult};
use crate::types::{CellValue, SheetSpec};
use calamine::{open_workbook, Reader, Xlsx};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;
use umya_spreadsheet::{Cell, Spreadsheet, Worksheet};

/// Number format given to date cells that carry none
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

pub struct XlsxWorkbook {
    path: PathBuf,
    sheets: Vec<Sheet>,
    /// Document as read from disk. Workbooks built from sheets have none
    /// until they are saved.
    book: Option<Spreadsheet>,
    modified: bool,
}

impl XlsxWorkbook {
    /// Open an `.xlsx` workbook and load every sheet with its formulas
    pub fn open(path: &Path) -> RulesResult<Self> {
        check_signature(path, WorkbookFormat::ArchiveBased)?;

        let open_error = |reason: String| RulesError::WorkbookOpen {
            path: path.to_path_buf(),
            reason,
        };

        let mut workbook: Xlsx<BufReader<File>> =
            open_workbook(path).map_err(|e| open_error(format!("{}", e)))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| open_error(format!("sheet '{}': {}", name, e)))?;
            let mut sheet = Sheet::from_range(&name, &range);

            // Formula ranges are optional; a sheet without formulas is still usable
            if let Ok(formulas) = workbook.worksheet_formula(&name) {
                sheet.attach_formulas(&formulas);
            }
            sheets.push(sheet);
        }

        let book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| open_error(format!("{}", e)))?;

        debug!(path = %path.display(), sheets = sheets.len(), "opened xlsx workbook");

        Ok(Self {
            path: path.to_path_buf(),
            sheets,
            book: Some(book),
            modified: false,
        })
    }

    pub fn from_sheets(path: &Path, sheets: Vec<Sheet>) -> Self {
        Self {
            path: path.to_path_buf(),
            sheets,
            book: None,
            modified: true,
        }
    }
}

impl FormatAdapter for XlsxWorkbook {
    fn format(&self) -> WorkbookFormat {
        WorkbookFormat::ArchiveBased
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    fn set_cell_value(
        &mut self,
        sheet: SheetId,
        row: RowHandle,
        col: usize,
        value: CellValue,
    ) -> RulesResult<()> {
        check_bounds(WorkbookFormat::ArchiveBased, row.index(), col)?;
        let count = self.sheets.len();
        let target = self
            .sheets
            .get_mut(sheet.0)
            .ok_or_else(|| RulesError::SheetIndexOutOfRange {
                index: sheet.0,
                count,
                path: self.path.clone(),
            })?;
        if target.holds(row.index(), col, &value) {
            return Ok(());
        }

        target.set(row.index(), col, value);
        if let Some(book) = self.book.as_mut() {
            let worksheet = worksheet_mut(book, target.name(), &self.path)?;
            write_cell(
                worksheet.get_cell_mut(cell_ref(row.index(), col)),
                target.get(row.index(), col),
                None,
            );
        }
        self.modified = true;
        Ok(())
    }

    fn put_sheet(&mut self, spec: &SheetSpec, sheet: Sheet) -> RulesResult<SheetId> {
        if let Some(id) = unchanged_placement(&self.sheets, spec, &sheet) {
            return Ok(id);
        }
        let previous = match spec {
            SheetSpec::Index(index) => self.sheets.get(*index),
            SheetSpec::Name(name) => self.sheets.iter().find(|s| s.name() == name),
        }
        .cloned();

        let id = place_sheet(&mut self.sheets, spec, sheet, &self.path)?;
        if let Some(book) = self.book.as_mut() {
            sync_sheet(book, previous.as_ref(), &self.sheets[id.0], &self.path)?;
        }
        self.modified = true;
        Ok(id)
    }

    fn into_sheets(self: Box<Self>) -> Vec<Sheet> {
        self.sheets
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn save(&mut self, path: &Path) -> RulesResult<()> {
        for sheet in &self.sheets {
            check_sheet_name(sheet.name(), path)?;
        }

        let built;
        let book = match &self.book {
            Some(book) => book,
            None => {
                built = build_book(&self.sheets, path)?;
                &built
            }
        };

        let save_error = |reason: String| RulesError::Save {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::create(path).map_err(|e| save_error(e.to_string()))?;
        umya_spreadsheet::writer::xlsx::write_writer(book, file)
            .map_err(|e| save_error(format!("{}", e)))?;

        debug!(path = %path.display(), sheets = self.sheets.len(), "wrote xlsx workbook");
        Ok(())
    }
}

/// `A1`-style reference for a zero-based (row, col)
fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", index_to_letter(col), row + 1)
}

fn worksheet_mut<'a>(
    book: &'a mut Spreadsheet,
    name: &str,
    path: &Path,
) -> RulesResult<&'a mut Worksheet> {
    book.get_sheet_by_name_mut(name)
        .ok_or_else(|| RulesError::SheetNotFound {
            name: name.to_string(),
            path: path.to_path_buf(),
        })
}

/// Store a value (and formula) in a cell, keeping the cell's style
fn write_cell(cell: &mut Cell, value: &CellValue, formula: Option<&str>) {
    match value {
        CellValue::String(s) => {
            cell.set_value_string(s.as_str());
        }
        CellValue::Number(n) => {
            cell.set_value_number(*n);
        }
        CellValue::Bool(b) => {
            cell.set_value_bool(*b);
        }
        CellValue::DateTime(serial) => {
            if cell.get_style().get_number_format().is_none() {
                cell.get_style_mut()
                    .get_number_format_mut()
                    .set_format_code(DATETIME_FORMAT);
            }
            cell.set_value_number(*serial);
        }
        CellValue::Empty => {
            cell.set_blank();
        }
    }
    // The value set above stays as the formula's cached result
    if let Some(formula) = formula {
        cell.set_formula(formula);
    }
}

/// Bring the document's sheet named like `after` from `before` to `after`,
/// touching only the cells that differ. A missing sheet is appended.
fn sync_sheet(
    book: &mut Spreadsheet,
    before: Option<&Sheet>,
    after: &Sheet,
    path: &Path,
) -> RulesResult<()> {
    let name = after.name();
    if book.get_sheet_by_name(name).is_none() {
        check_sheet_name(name, path)?;
        book.new_sheet(name).map_err(|e| RulesError::Save {
            path: path.to_path_buf(),
            reason: format!("sheet '{}': {}", name, e),
        })?;
    }
    let worksheet = worksheet_mut(book, name, path)?;

    let empty = Sheet::default();
    let before = before.unwrap_or(&empty);

    let mut positions = BTreeSet::new();
    for sheet in [before, after] {
        positions.extend(sheet.cells().map(|(row, col, _)| (row, col)));
        positions.extend(sheet.formulas().map(|(position, _)| position));
    }

    let mut written = 0;
    for (row, col) in positions {
        let value = after.get(row, col);
        let formula = after.formula(row, col);
        if before.get(row, col) == value && before.formula(row, col) == formula {
            continue;
        }
        write_cell(worksheet.get_cell_mut(cell_ref(row, col)), value, formula);
        written += 1;
    }

    debug!(sheet = name, cells = written, "synced xlsx sheet");
    Ok(())
}

/// Fresh document holding `sheets`; an empty list gets a single `Sheet1`
fn build_book(sheets: &[Sheet], path: &Path) -> RulesResult<Spreadsheet> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    if sheets.is_empty() {
        sync_sheet(&mut book, None, &Sheet::new("Sheet1"), path)?;
    }
    for sheet in sheets {
        sync_sheet(&mut book, None, sheet, path)?;
    }
    Ok(book)
}
