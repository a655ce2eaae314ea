use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use xlrules::cli;
use xlrules::config::{RunConfig, DEFAULT_TRIGGER_COLUMN};
use xlrules::logging;

#[derive(Parser)]
#[command(name = "xlrules")]
#[command(about = "Apply regex-triggered cell rewrite rules to .xls and .xlsx workbooks")]
#[command(long_about = "xlrules - Regex-triggered workbook rewrites

Reads a rules workbook (rules.xls or rules.xlsx next to the executable by
default). Each row names an input file and sheet, a regex tested against a
trigger column, an output file and sheet, and any number of
ChangeN_Column / ChangeN_Value pairs written to every matching row.

RULES COLUMNS:
  Input_File, Input_Sheet, Regex, Regex_Column (optional),
  Output_File, Output_Sheet, Change1_Column, Change1_Value, ...

  Sheets: blank = first sheet, number = 0-based index, text = sheet name
  Columns: letter code (H, AA), 0-based index, or header name

When Output_File is the input file, the workbook is replaced atomically.

EXAMPLES:
  xlrules                               # rules.xls/.xlsx beside the binary
  xlrules -r rules.xlsx -b ./data       # explicit rules file and base dir
  xlrules --dry-run --json              # report matches, write nothing")]
#[command(version)]
struct Cli {
    /// Rules workbook (default: rules.xls, then rules.xlsx in the base directory)
    #[arg(short, long, env = "XLRULES_RULES")]
    rules: Option<PathBuf>,

    /// Directory that Input_File and Output_File are relative to
    /// (default: directory of the executable)
    #[arg(short, long, env = "XLRULES_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Trigger column for rules whose Regex_Column is blank or absent
    #[arg(short, long, env = "XLRULES_TRIGGER_COLUMN", default_value = DEFAULT_TRIGGER_COLUMN)]
    trigger_column: String,

    /// Scan and report without writing any workbook
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Debug-level logging and extra summary detail
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    logging::init(args.verbose);

    let config = RunConfig::resolve(
        args.rules,
        args.base_dir,
        &args.trigger_column,
        args.dry_run,
    )
    .context("Failed to resolve configuration")?;

    cli::run(&config, args.json, args.verbose)
        .with_context(|| format!("Failed to apply rules from {}", config.rules_path.display()))?;

    Ok(())
}
