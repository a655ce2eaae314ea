//! Workbook adapters for the two supported container formats
//!
//! - LegacyBinary: BIFF8 `.xls` inside an OLE compound file
//! - ArchiveBased: OOXML `.xlsx` ZIP archive
//!
//! Both are loaded with calamine into [`Sheet`] grids and exposed through the
//! [`FormatAdapter`] trait, so the rule engine never branches on format.

pub mod biff;
mod sheet;
pub mod xls;
pub mod xlsx;

pub use sheet::Sheet;
pub use xls::XlsWorkbook;
pub use xlsx::XlsxWorkbook;

use crate::error::{RulesError, RulesResult};
use crate::types::{CellValue, SheetSpec};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

//==============================================================================
// Format Detection
//==============================================================================

/// Spreadsheet container format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkbookFormat {
    /// `.xls` (BIFF8 in an OLE compound file)
    LegacyBinary,
    /// `.xlsx` (OOXML ZIP archive)
    ArchiveBased,
}

impl WorkbookFormat {
    pub fn from_path(path: &Path) -> RulesResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "xls" => Ok(WorkbookFormat::LegacyBinary),
            "xlsx" => Ok(WorkbookFormat::ArchiveBased),
            _ => Err(RulesError::UnsupportedFormat {
                extension,
                path: path.to_path_buf(),
            }),
        }
    }

    /// Extension including the dot, as the saving backends expect it
    pub fn extension(self) -> &'static str {
        match self {
            WorkbookFormat::LegacyBinary => ".xls",
            WorkbookFormat::ArchiveBased => ".xlsx",
        }
    }

    /// Container magic bytes
    fn signature(self) -> &'static [u8] {
        match self {
            WorkbookFormat::LegacyBinary => &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
            WorkbookFormat::ArchiveBased => b"PK\x03\x04",
        }
    }

    /// Grid limits as (rows, columns)
    pub fn limits(self) -> (usize, usize) {
        match self {
            WorkbookFormat::LegacyBinary => (biff::MAX_ROWS, biff::MAX_COLS),
            WorkbookFormat::ArchiveBased => (1_048_576, 16_384),
        }
    }

    /// Open an existing workbook of this format
    pub fn open(self, path: &Path) -> RulesResult<Box<dyn FormatAdapter>> {
        Ok(match self {
            WorkbookFormat::LegacyBinary => Box::new(XlsWorkbook::open(path)?),
            WorkbookFormat::ArchiveBased => Box::new(XlsxWorkbook::open(path)?),
        })
    }

    /// Build a new workbook of this format that will be saved to `path`
    pub fn from_sheets(self, path: &Path, sheets: Vec<Sheet>) -> Box<dyn FormatAdapter> {
        match self {
            WorkbookFormat::LegacyBinary => Box::new(XlsWorkbook::from_sheets(path, sheets)),
            WorkbookFormat::ArchiveBased => Box::new(XlsxWorkbook::from_sheets(path, sheets)),
        }
    }
}

impl fmt::Display for WorkbookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkbookFormat::LegacyBinary => f.write_str("xls"),
            WorkbookFormat::ArchiveBased => f.write_str("xlsx"),
        }
    }
}

/// Open a workbook, picking the adapter from the file extension
pub fn open_workbook(path: &Path) -> RulesResult<Box<dyn FormatAdapter>> {
    WorkbookFormat::from_path(path)?.open(path)
}

/// Fail early when the file is missing or its magic bytes belong to another container
pub(crate) fn check_signature(path: &Path, format: WorkbookFormat) -> RulesResult<()> {
    let open_error = |reason: String| RulesError::WorkbookOpen {
        path: path.to_path_buf(),
        reason,
    };

    let mut file = File::open(path).map_err(|e| open_error(e.to_string()))?;
    let expected = format.signature();
    let mut magic = vec![0u8; expected.len()];
    file.read_exact(&mut magic)
        .map_err(|_| open_error("file too short to be a workbook".to_string()))?;

    if magic != expected {
        return Err(open_error(format!(
            "container signature does not match {} format",
            format
        )));
    }
    Ok(())
}

//==============================================================================
// Handles
//==============================================================================

/// Position of a sheet inside its workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetId(pub usize);

/// A data row (index ≥ 1) of a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(usize);

impl RowHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Forward-only iterator over the data rows of a sheet, starting after the header.
///
/// It does not borrow the workbook, so cells can be written while iterating.
#[derive(Debug, Clone)]
pub struct DataRows {
    next: usize,
    end: usize,
}

impl DataRows {
    fn new(height: usize) -> Self {
        Self { next: 1, end: height }
    }
}

impl Iterator for DataRows {
    type Item = RowHandle;

    fn next(&mut self) -> Option<RowHandle> {
        if self.next >= self.end {
            return None;
        }
        let row = RowHandle(self.next);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

//==============================================================================
// Adapter Capability
//==============================================================================

/// Uniform access to an opened workbook, whatever its container format
pub trait FormatAdapter {
    fn format(&self) -> WorkbookFormat;

    /// File this workbook was opened from or will be saved to
    fn path(&self) -> &Path;

    /// Current view of all sheets (including unsaved edits)
    fn sheets(&self) -> &[Sheet];

    fn set_cell_value(
        &mut self,
        sheet: SheetId,
        row: RowHandle,
        col: usize,
        value: CellValue,
    ) -> RulesResult<()>;

    /// Replace (or append) the sheet selected by `spec` with `sheet`'s cells
    fn put_sheet(&mut self, spec: &SheetSpec, sheet: Sheet) -> RulesResult<SheetId>;

    fn into_sheets(self: Box<Self>) -> Vec<Sheet>;

    /// False while the workbook still matches the file it was opened from
    fn is_modified(&self) -> bool;

    fn save(&mut self, path: &Path) -> RulesResult<()>;

    fn sheet_names(&self) -> Vec<String> {
        self.sheets().iter().map(|s| s.name().to_string()).collect()
    }

    fn resolve_sheet(&self, spec: &SheetSpec) -> RulesResult<SheetId> {
        resolve_sheet_in(self.sheets(), spec, self.path())
    }

    fn header_row(&self, sheet: SheetId) -> Vec<String> {
        self.sheets()
            .get(sheet.0)
            .map(Sheet::header_row)
            .unwrap_or_default()
    }

    fn data_rows(&self, sheet: SheetId) -> DataRows {
        DataRows::new(self.sheets().get(sheet.0).map_or(0, Sheet::height))
    }

    fn cell_value(&self, sheet: SheetId, row: RowHandle, col: usize) -> CellValue {
        self.sheets()
            .get(sheet.0)
            .map(|s| s.get(row.index(), col).clone())
            .unwrap_or_default()
    }

    /// Copy of one sheet, for placing into another workbook
    fn take_sheet(&self, sheet: SheetId) -> Sheet {
        self.sheets().get(sheet.0).cloned().unwrap_or_default()
    }
}

pub(crate) fn resolve_sheet_in(
    sheets: &[Sheet],
    spec: &SheetSpec,
    path: &Path,
) -> RulesResult<SheetId> {
    match spec {
        SheetSpec::Index(index) => {
            if *index < sheets.len() {
                Ok(SheetId(*index))
            } else {
                Err(RulesError::SheetIndexOutOfRange {
                    index: *index,
                    count: sheets.len(),
                    path: path.to_path_buf(),
                })
            }
        }
        SheetSpec::Name(name) => sheets
            .iter()
            .position(|s| s.name() == name)
            .map(SheetId)
            .ok_or_else(|| RulesError::SheetNotFound {
                name: name.clone(),
                path: path.to_path_buf(),
            }),
    }
}

/// Shared `put_sheet` logic: replace by position or name, append when missing
pub(crate) fn place_sheet(
    sheets: &mut Vec<Sheet>,
    spec: &SheetSpec,
    sheet: Sheet,
    path: &Path,
) -> RulesResult<SheetId> {
    match spec {
        SheetSpec::Index(index) if *index == sheets.len() => {
            let mut sheet = sheet;
            if sheet.name().is_empty() || sheets.iter().any(|s| s.name() == sheet.name()) {
                sheet.set_name(format!("Sheet{}", index + 1));
            }
            sheets.push(sheet);
            Ok(SheetId(*index))
        }
        SheetSpec::Index(_) => {
            let id = resolve_sheet_in(sheets, spec, path)?;
            sheets[id.0].replace_contents(sheet);
            Ok(id)
        }
        SheetSpec::Name(name) => match sheets.iter().position(|s| s.name() == name) {
            Some(index) => {
                sheets[index].replace_contents(sheet);
                Ok(SheetId(index))
            }
            None => {
                let mut sheet = sheet;
                sheet.set_name(name.clone());
                sheets.push(sheet);
                Ok(SheetId(sheets.len() - 1))
            }
        },
    }
}

/// Target of a placement when it already holds exactly `sheet`'s cells
pub(crate) fn unchanged_placement(
    sheets: &[Sheet],
    spec: &SheetSpec,
    sheet: &Sheet,
) -> Option<SheetId> {
    let index = match spec {
        SheetSpec::Index(index) => *index,
        SheetSpec::Name(name) => sheets.iter().position(|s| s.name() == name)?,
    };
    sheets
        .get(index)
        .filter(|target| target.same_contents(sheet))
        .map(|_| SheetId(index))
}

pub const MAX_SHEET_NAME: usize = 31;

/// Sheet names both containers accept: 1 to 31 UTF-16 units, none of `[]:*?/\`
pub(crate) fn check_sheet_name(name: &str, path: &Path) -> RulesResult<()> {
    let reason = if name.is_empty() {
        "empty sheet name".to_string()
    } else if name.encode_utf16().count() > MAX_SHEET_NAME {
        format!(
            "sheet name '{}' is longer than {} characters",
            name, MAX_SHEET_NAME
        )
    } else if let Some(c) = name.chars().find(|c| "[]:*?/\\".contains(*c)) {
        format!("sheet name '{}' contains '{}'", name, c)
    } else {
        return Ok(());
    };
    Err(RulesError::Save {
        path: path.to_path_buf(),
        reason,
    })
}

/// Reject writes outside the format's grid
pub(crate) fn check_bounds(format: WorkbookFormat, row: usize, col: usize) -> RulesResult<()> {
    let (max_rows, max_cols) = format.limits();
    if row >= max_rows || col >= max_cols {
        return Err(RulesError::CellOutOfBounds {
            row,
            col,
            format: match format {
                WorkbookFormat::LegacyBinary => "xls",
                WorkbookFormat::ArchiveBased => "xlsx",
            },
        });
    }
    Ok(())
}
