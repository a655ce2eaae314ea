//! LegacyBinary adapter (`.xls`)
//!
//! The loaded workbook is read-only. The first write produces a writable copy
//! and every later read and the final save go through that copy.

use super::{
    biff, check_bounds, check_signature, place_sheet, unchanged_placement, FormatAdapter,
    RowHandle, Sheet, SheetId, WorkbookFormat,
};
use crate::error::{RulesError, RulesResult};
use crate::types::{CellValue, SheetSpec};
use calamine::{open_workbook, Reader, Xls};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct XlsWorkbook {
    path: PathBuf,
    source: Vec<Sheet>,
    copy: Option<Vec<Sheet>>,
}

impl XlsWorkbook {
    /// Open an `.xls` workbook and load every sheet
    pub fn open(path: &Path) -> RulesResult<Self> {
        check_signature(path, WorkbookFormat::LegacyBinary)?;

        let open_error = |reason: String| RulesError::WorkbookOpen {
            path: path.to_path_buf(),
            reason,
        };

        let mut workbook: Xls<BufReader<File>> =
            open_workbook(path).map_err(|e| open_error(format!("{}", e)))?;

        let mut source = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| open_error(format!("sheet '{}': {}", name, e)))?;
            source.push(Sheet::from_range(&name, &range));
        }

        debug!(path = %path.display(), sheets = source.len(), "opened xls workbook");

        Ok(Self {
            path: path.to_path_buf(),
            source,
            copy: None,
        })
    }

    /// A new workbook that has never been on disk is writable from the start
    pub fn from_sheets(path: &Path, sheets: Vec<Sheet>) -> Self {
        Self {
            path: path.to_path_buf(),
            source: Vec::new(),
            copy: Some(sheets),
        }
    }

    fn writable(&mut self) -> &mut Vec<Sheet> {
        self.copy.get_or_insert_with(|| self.source.clone())
    }
}

impl FormatAdapter for XlsWorkbook {
    fn format(&self) -> WorkbookFormat {
        WorkbookFormat::LegacyBinary
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn sheets(&self) -> &[Sheet] {
        self.copy.as_deref().unwrap_or(&self.source)
    }

    fn set_cell_value(
        &mut self,
        sheet: SheetId,
        row: RowHandle,
        col: usize,
        value: CellValue,
    ) -> RulesResult<()> {
        check_bounds(WorkbookFormat::LegacyBinary, row.index(), col)?;
        if self
            .sheets()
            .get(sheet.0)
            .is_some_and(|s| s.holds(row.index(), col, &value))
        {
            return Ok(());
        }
        let path = self.path.clone();
        let target = self
            .writable()
            .get_mut(sheet.0)
            .ok_or_else(|| RulesError::SheetIndexOutOfRange {
                index: sheet.0,
                count: 0,
                path,
            })?;
        target.set(row.index(), col, value);
        Ok(())
    }

    fn put_sheet(&mut self, spec: &SheetSpec, sheet: Sheet) -> RulesResult<SheetId> {
        if let Some(id) = unchanged_placement(self.sheets(), spec, &sheet) {
            return Ok(id);
        }
        let path = self.path.clone();
        place_sheet(self.writable(), spec, sheet, &path)
    }

    fn into_sheets(self: Box<Self>) -> Vec<Sheet> {
        let this = *self;
        this.copy.unwrap_or(this.source)
    }

    /// A writable copy only exists once something changed
    fn is_modified(&self) -> bool {
        self.copy.is_some()
    }

    fn save(&mut self, path: &Path) -> RulesResult<()> {
        biff::write_workbook(path, self.sheets())
    }
}
