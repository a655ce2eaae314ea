//! Processes every rule group of a rules table
//!
//! Each group runs to completion (open, scan, place sheet, save) before the
//! next one starts. A failing group is reported and skipped; only an
//! unreadable rules table stops the run.

use crate::config::RunConfig;
use crate::engine::{apply_rules, Reporter, ScanReport};
use crate::error::{RulesError, RulesResult};
use crate::replace::{replace_atomically, same_file};
use crate::rules::{GroupPlan, RuleSetBuilder, RulesTable};
use crate::types::SheetSpec;
use crate::workbook::{FormatAdapter, WorkbookFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};

//==============================================================================
// Summary
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Output written to a separate file
    Saved,
    /// Input file atomically replaced
    Replaced,
    /// Output already held the result; nothing written
    Unchanged,
    /// Scanned, nothing written
    DryRun,
    /// No usable rules in the group
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub input: PathBuf,
    pub input_sheet: SheetSpec,
    pub output: PathBuf,
    pub output_sheet: SheetSpec,
    pub rules: usize,
    pub status: GroupStatus,
    pub report: ScanReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rules_file: PathBuf,
    pub dry_run: bool,
    pub groups: Vec<GroupOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.status == GroupStatus::Failed)
            .count()
    }

    pub fn rows_matched(&self) -> usize {
        self.groups.iter().map(|g| g.report.rows_matched).sum()
    }

    pub fn cells_written(&self) -> usize {
        self.groups.iter().map(|g| g.report.cells_written).sum()
    }
}

//==============================================================================
// Run
//==============================================================================

/// Read the rules table and process every group.
///
/// Fails only when the rules table cannot be read or lacks required columns.
pub fn run(config: &RunConfig, reporter: &dyn Reporter) -> RulesResult<RunSummary> {
    reporter.info(&format!("reading rules from {}", config.rules_path.display()));

    let table = RulesTable::read(&config.rules_path)?;
    table.check_required()?;

    let builder = RuleSetBuilder::new(&table, config.trigger_column.clone());
    let plans = builder.plan();
    reporter.debug(&format!(
        "{} rule rows in {} groups, {} change pairs",
        table.rows.len(),
        plans.len(),
        builder.pairs().len()
    ));

    let mut summary = RunSummary {
        rules_file: config.rules_path.clone(),
        dry_run: config.dry_run,
        groups: Vec::with_capacity(plans.len()),
    };

    for plan in &plans {
        let input = config.resolve_path(&plan.input_file);
        let output = config.resolve_path(&plan.output_file);

        let mut outcome = GroupOutcome {
            input: input.clone(),
            input_sheet: plan.input_sheet.clone(),
            output: output.clone(),
            output_sheet: plan.output_sheet.clone(),
            rules: 0,
            status: GroupStatus::Failed,
            report: ScanReport::default(),
            error: None,
        };

        match process_group(config, &builder, plan, &input, &output, &mut outcome, reporter) {
            Ok(status) => {
                outcome.status = status;
                report_group(&outcome, reporter);
            }
            Err(e) => {
                reporter.error(&format!(
                    "failed processing {} sheet {} (regex: {}): {}",
                    input.display(),
                    plan.input_sheet,
                    plan.patterns(&table).join(" | "),
                    e
                ));
                outcome.error = Some(e.to_string());
            }
        }
        summary.groups.push(outcome);
    }

    reporter.info(&format!(
        "all rules processed: {} groups, {} failed",
        summary.groups.len(),
        summary.failed()
    ));
    Ok(summary)
}

fn report_group(outcome: &GroupOutcome, reporter: &dyn Reporter) {
    let what = match outcome.status {
        GroupStatus::Saved => "saved",
        GroupStatus::Replaced => "replaced",
        GroupStatus::Unchanged => "unchanged, not written",
        GroupStatus::DryRun => "dry run, not written",
        GroupStatus::Skipped => "skipped, no usable rules",
        GroupStatus::Failed => "failed",
    };
    reporter.info(&format!(
        "{} sheet {} -> {} sheet {}: {} of {} rows matched, {} cells written ({})",
        outcome.input.display(),
        outcome.input_sheet,
        outcome.output.display(),
        outcome.output_sheet,
        outcome.report.rows_matched,
        outcome.report.rows_scanned,
        outcome.report.cells_written,
        what
    ));
}

fn process_group(
    config: &RunConfig,
    builder: &RuleSetBuilder<'_>,
    plan: &GroupPlan,
    input: &Path,
    output: &Path,
    outcome: &mut GroupOutcome,
    reporter: &dyn Reporter,
) -> RulesResult<GroupStatus> {
    if plan.input_file.is_empty() || !input.is_file() {
        return Err(RulesError::WorkbookOpen {
            path: input.to_path_buf(),
            reason: "input file not found".to_string(),
        });
    }
    let input_format = WorkbookFormat::from_path(input)?;
    let output_format = WorkbookFormat::from_path(output)?;

    let group = builder.build_group(plan, reporter)?;
    outcome.rules = group.rules.len();
    if group.rules.is_empty() {
        return Ok(GroupStatus::Skipped);
    }

    let mut source = input_format.open(input)?;
    let sheet = source.resolve_sheet(&group.input_sheet)?;
    let original = source.take_sheet(sheet);

    outcome.report = apply_rules(source.as_mut(), sheet, &group.rules, reporter)?;

    if config.dry_run {
        return Ok(GroupStatus::DryRun);
    }

    let same = same_file(input, output);
    let mutated = source.take_sheet(sheet);

    if !same && output.exists() {
        let mut dest = output_format.open(output)?;
        dest.put_sheet(&group.output_sheet, mutated)?;
        return save(dest.as_mut(), input, output, same, input_format);
    }

    // The input workbook itself becomes the output
    let mut dest: Box<dyn FormatAdapter> = if output_format == input_format {
        source
    } else {
        output_format.from_sheets(output, source.into_sheets())
    };
    let placed = dest.put_sheet(&group.output_sheet, mutated)?;
    if placed != sheet {
        // Writing to another sheet leaves the input sheet as it was
        dest.put_sheet(&SheetSpec::Index(sheet.0), original)?;
    }
    save(dest.as_mut(), input, output, same, input_format)
}

fn save(
    dest: &mut dyn FormatAdapter,
    input: &Path,
    output: &Path,
    same: bool,
    format: WorkbookFormat,
) -> RulesResult<GroupStatus> {
    // Opened from the output file and still identical to it
    if !dest.is_modified() && same_file(dest.path(), output) {
        return Ok(GroupStatus::Unchanged);
    }
    if same {
        replace_atomically(input, format, |tmp| dest.save(tmp))?;
        Ok(GroupStatus::Replaced)
    } else {
        dest.save(output)?;
        Ok(GroupStatus::Saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::RecordingReporter;
    use crate::types::CellValue;
    use crate::workbook::{open_workbook, Sheet};
    use std::fs;
    use tempfile::TempDir;

    fn s(v: &str) -> CellValue {
        CellValue::from(v)
    }

    const RULE_HEADER: [&str; 8] = [
        "Input_File",
        "Input_Sheet",
        "Regex",
        "Regex_Column",
        "Output_File",
        "Output_Sheet",
        "Change1_Column",
        "Change1_Value",
    ];

    fn write_rules(dir: &Path, rows: &[[&str; 8]]) -> PathBuf {
        let mut sheet = Sheet::new("Rules");
        for (col, name) in RULE_HEADER.iter().enumerate() {
            sheet.set(0, col, s(name));
        }
        for (r, row) in rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.set(r + 1, col, s(value));
                }
            }
        }
        let path = dir.join("rules.xlsx");
        WorkbookFormat::ArchiveBased
            .from_sheets(&path, vec![sheet])
            .save(&path)
            .unwrap();
        path
    }

    fn write_data(path: &Path, sheets: &[&str]) {
        let mut all = Vec::new();
        for name in sheets {
            let mut sheet = Sheet::new(*name);
            sheet.set(0, 0, s("Id"));
            sheet.set(0, 1, s("Status"));
            sheet.set(0, 7, s("Code"));
            sheet.set(1, 0, CellValue::Number(1.0));
            sheet.set(1, 1, s("open"));
            sheet.set(1, 7, s("foobar"));
            sheet.set(2, 0, CellValue::Number(2.0));
            sheet.set(2, 1, s("open"));
            sheet.set(2, 7, s("bar"));
            all.push(sheet);
        }
        WorkbookFormat::from_path(path)
            .unwrap()
            .from_sheets(path, all)
            .save(path)
            .unwrap();
    }

    fn config(dir: &Path, rules: PathBuf) -> RunConfig {
        RunConfig::new(rules, dir.to_path_buf())
    }

    #[test]
    fn test_same_file_replace_both_formats() {
        for name in ["data.xls", "data.xlsx"] {
            let dir = TempDir::new().unwrap();
            write_data(&dir.path().join(name), &["Data"]);
            let rules = write_rules(dir.path(), &[[name, "0", "^foo", "H", name, "0", "B", "matched"]]);
            let reporter = RecordingReporter::default();

            let summary = run(&config(dir.path(), rules), &reporter).unwrap();

            assert_eq!(summary.groups.len(), 1);
            assert_eq!(summary.groups[0].status, GroupStatus::Replaced);
            assert_eq!(summary.cells_written(), 1);

            let book = open_workbook(&dir.path().join(name)).unwrap();
            let sheet = &book.sheets()[0];
            assert_eq!(sheet.get(1, 1), &s("matched"));
            assert_eq!(sheet.get(2, 1), &s("open"));
            assert_eq!(sheet.get(1, 7), &s("foobar"));
            assert!(reporter.errors().is_empty());
        }
    }

    #[test]
    fn test_existing_output_keeps_co_resident_sheets() {
        let dir = TempDir::new().unwrap();
        write_data(&dir.path().join("in.xlsx"), &["Data"]);
        write_data(&dir.path().join("out.xls"), &["Keep", "Target"]);
        let rules = write_rules(
            dir.path(),
            &[["in.xlsx", "", "^foo", "Code", "out.xls", "Target", "Status", "done"]],
        );

        let summary = run(&config(dir.path(), rules), &RecordingReporter::default()).unwrap();
        assert_eq!(summary.groups[0].status, GroupStatus::Saved);

        let out = open_workbook(&dir.path().join("out.xls")).unwrap();
        assert_eq!(out.sheet_names(), vec!["Keep", "Target"]);
        assert_eq!(out.sheets()[0].get(1, 1), &s("open"));
        assert_eq!(out.sheets()[1].get(1, 1), &s("done"));

        // Input untouched
        let input = open_workbook(&dir.path().join("in.xlsx")).unwrap();
        assert_eq!(input.sheets()[0].get(1, 1), &s("open"));
    }

    #[test]
    fn test_existing_output_left_alone_when_already_current() {
        let dir = TempDir::new().unwrap();
        write_data(&dir.path().join("in.xlsx"), &["Data"]);
        write_data(&dir.path().join("out.xls"), &["Target"]);
        let rules = write_rules(
            dir.path(),
            &[["in.xlsx", "", "^foo", "H", "out.xls", "Target", "B", "done"]],
        );

        let first = run(&config(dir.path(), rules.clone()), &RecordingReporter::default()).unwrap();
        assert_eq!(first.groups[0].status, GroupStatus::Saved);
        let written = fs::read(dir.path().join("out.xls")).unwrap();

        let second = run(&config(dir.path(), rules), &RecordingReporter::default()).unwrap();
        assert_eq!(second.groups[0].status, GroupStatus::Unchanged);
        assert_eq!(fs::read(dir.path().join("out.xls")).unwrap(), written);
    }

    #[test]
    fn test_new_output_converts_format() {
        let dir = TempDir::new().unwrap();
        write_data(&dir.path().join("in.xls"), &["Data", "Other"]);
        let rules = write_rules(dir.path(), &[["in.xls", "Data", "foo", "", "new.xlsx", "Result", "B", "x"]]);

        run(&config(dir.path(), rules), &RecordingReporter::default()).unwrap();

        let out = open_workbook(&dir.path().join("new.xlsx")).unwrap();
        assert_eq!(out.sheet_names(), vec!["Data", "Other", "Result"]);
        assert_eq!(out.sheets()[0].get(1, 1), &s("open"));
        assert_eq!(out.sheets()[2].get(1, 1), &s("x"));
    }

    #[test]
    fn test_failing_group_does_not_stop_run() {
        let dir = TempDir::new().unwrap();
        write_data(&dir.path().join("ok.xlsx"), &["Data"]);
        let rules = write_rules(
            dir.path(),
            &[
                ["missing.xlsx", "0", "foo", "H", "missing.xlsx", "0", "B", "x"],
                ["ok.xlsx", "0", "([", "H", "ok.xlsx", "0", "B", "x"],
                ["ok.xlsx", "0", "foo", "H", "ok.xlsx", "1", "B", "x"],
                ["ok.xlsx", "0", "foo", "H", "ok.xlsx", "Copy", "B", "x"],
            ],
        );
        let reporter = RecordingReporter::default();

        let summary = run(&config(dir.path(), rules), &reporter).unwrap();

        let statuses: Vec<GroupStatus> = summary.groups.iter().map(|g| g.status).collect();
        assert_eq!(
            statuses,
            vec![
                GroupStatus::Failed,
                GroupStatus::Failed,
                GroupStatus::Replaced,
                GroupStatus::Replaced
            ]
        );
        assert_eq!(reporter.errors().len(), 2);
        assert!(reporter.errors()[0].contains("missing.xlsx"));
        assert!(reporter.errors()[1].contains("(["));

        let book = open_workbook(&dir.path().join("ok.xlsx")).unwrap();
        assert_eq!(book.sheet_names(), vec!["Data", "Sheet2", "Copy"]);
        assert_eq!(book.sheets()[0].get(1, 1), &s("open"));
        assert_eq!(book.sheets()[1].get(1, 1), &s("x"));
        assert_eq!(book.sheets()[2].get(1, 1), &s("x"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data.xlsx");
        write_data(&data, &["Data"]);
        let before = fs::read(&data).unwrap();
        let rules = write_rules(dir.path(), &[["data.xlsx", "0", "foo", "H", "data.xlsx", "0", "B", "x"]]);

        let summary = run(
            &config(dir.path(), rules).with_dry_run(true),
            &RecordingReporter::default(),
        )
        .unwrap();

        assert_eq!(summary.groups[0].status, GroupStatus::DryRun);
        assert_eq!(summary.rows_matched(), 1);
        assert_eq!(fs::read(&data).unwrap(), before);
    }

    #[test]
    fn test_missing_required_columns_fails_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.xlsx");
        let mut sheet = Sheet::new("Rules");
        sheet.set(0, 0, s("Input_File"));
        WorkbookFormat::ArchiveBased
            .from_sheets(&path, vec![sheet])
            .save(&path)
            .unwrap();

        assert!(matches!(
            run(&config(dir.path(), path), &RecordingReporter::default()),
            Err(RulesError::RulesTable(_))
        ));
    }
}
