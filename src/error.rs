use std::path::PathBuf;
use thiserror::Error;

pub type RulesResult<T> = Result<T, RulesError>;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed column spec '{spec}': {reason}")]
    MalformedColumnSpec { spec: String, reason: String },

    #[error("Column '{0}' not found in header row")]
    ColumnNotFound(String),

    #[error("Sheet '{name}' not found in {}", path.display())]
    SheetNotFound { name: String, path: PathBuf },

    #[error("Sheet index {index} out of range in {} ({count} sheets)", path.display())]
    SheetIndexOutOfRange {
        index: usize,
        count: usize,
        path: PathBuf,
    },

    #[error("Failed to open workbook {}: {reason}", path.display())]
    WorkbookOpen { path: PathBuf, reason: String },

    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to save workbook {}: {reason}", path.display())]
    Save { path: PathBuf, reason: String },

    #[error("Unsupported workbook format '{extension}' for {}", path.display())]
    UnsupportedFormat { extension: String, path: PathBuf },

    #[error("Cell (row {row}, column {col}) is outside the {format} grid")]
    CellOutOfBounds {
        row: usize,
        col: usize,
        format: &'static str,
    },

    #[error("Rules table error: {0}")]
    RulesTable(String),
}
