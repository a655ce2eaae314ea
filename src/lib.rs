//! xlrules - regex-triggered cell rewrites for `.xls` and `.xlsx` workbooks
//!
//! A rules workbook lists, per row, an input file and sheet, a regex tested
//! against a trigger column, an output file and sheet, and any number of
//! `ChangeN_Column` / `ChangeN_Value` pairs. Every data row whose trigger
//! cell matches gets those values written; the first matching rule wins.
//!
//! # Features
//!
//! - Column specs by letter (`H`, `AA`), 0-based index, or header name
//! - Legacy BIFF8 `.xls` and OOXML `.xlsx`, behind one adapter trait
//! - Output to another sheet or workbook, keeping co-resident sheets
//! - Atomic replacement when output and input are the same file
//!
//! # Example
//!
//! ```no_run
//! use xlrules::config::RunConfig;
//! use xlrules::engine::TracingReporter;
//! use std::path::PathBuf;
//!
//! let config = RunConfig::new(PathBuf::from("rules.xlsx"), PathBuf::from("."));
//! let summary = xlrules::runner::run(&config, &TracingReporter)?;
//!
//! println!("Groups: {}", summary.groups.len());
//! println!("Cells written: {}", summary.cells_written());
//! # Ok::<(), xlrules::error::RulesError>(())
//! ```

pub mod cli;
pub mod column;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod replace;
pub mod rules;
pub mod runner;
pub mod types;
pub mod workbook;

// Re-export commonly used types
pub use column::ColumnSpec;
pub use engine::{Reporter, ScanReport, TracingReporter};
pub use error::{RulesError, RulesResult};
pub use types::{CellValue, Rule, RuleGroup, SheetSpec};
pub use workbook::{FormatAdapter, Sheet, WorkbookFormat};
