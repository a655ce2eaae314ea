//! CLI Integration Tests
//!
//! Runs the xlrules binary against workbooks in a temp directory.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;
use xlrules::workbook::open_workbook;
use xlrules::{CellValue, FormatAdapter, Sheet, WorkbookFormat};

fn save(path: &Path, sheets: Vec<Sheet>) {
    WorkbookFormat::from_path(path)
        .unwrap()
        .from_sheets(path, sheets)
        .save(path)
        .unwrap();
}

/// rules.xlsx with one rule per `(input, output)` pair: `^foo` on H sets B
fn setup(dir: &Path, groups: &[(&str, &str)]) {
    let header = [
        "Input_File",
        "Input_Sheet",
        "Regex",
        "Output_File",
        "Output_Sheet",
        "Change1_Column",
        "Change1_Value",
    ];
    let mut rules = Sheet::new("Rules");
    for (col, name) in header.iter().enumerate() {
        rules.set(0, col, CellValue::from(*name));
    }
    for (i, (input, output)) in groups.iter().enumerate() {
        let row = [*input, "", "^foo", *output, "", "B", "matched"];
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                rules.set(i + 1, col, CellValue::from(*value));
            }
        }
    }
    save(&dir.join("rules.xlsx"), vec![rules]);

    let mut data = Sheet::new("Data");
    data.set(0, 1, CellValue::from("Status"));
    data.set(0, 7, CellValue::from("Code"));
    data.set(1, 1, CellValue::from("open"));
    data.set(1, 7, CellValue::from("foobar"));
    data.set(2, 1, CellValue::from("open"));
    data.set(2, 7, CellValue::from("other"));
    save(&dir.join("data.xlsx"), vec![data]);
}

fn status_column(path: &Path) -> Vec<CellValue> {
    let book = open_workbook(path).unwrap();
    let sheet = &book.sheets()[0];
    (1..sheet.height()).map(|r| sheet.get(r, 1).clone()).collect()
}

fn xlrules() -> Command {
    let mut cmd = Command::cargo_bin("xlrules").unwrap();
    cmd.env_remove("XLRULES_RULES")
        .env_remove("XLRULES_BASE_DIR")
        .env_remove("XLRULES_TRIGGER_COLUMN")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    xlrules()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Regex_Column"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_cli_version() {
    xlrules()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xlrules"));
}

// ═══════════════════════════════════════════════════════════════════════════
// RUNS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_applies_rules() {
    let dir = TempDir::new().unwrap();
    setup(dir.path(), &[("data.xlsx", "data.xlsx")]);

    xlrules()
        .arg("--base-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Done"))
        .stdout(predicate::str::contains("1 cells written"));

    assert_eq!(
        status_column(&dir.path().join("data.xlsx")),
        vec![CellValue::from("matched"), CellValue::from("open")]
    );
}

#[test]
fn test_cli_second_run_reports_unchanged() {
    let dir = TempDir::new().unwrap();
    setup(dir.path(), &[("data.xlsx", "data.xlsx")]);

    xlrules().arg("-b").arg(dir.path()).assert().success();
    let first = std::fs::read(dir.path().join("data.xlsx")).unwrap();

    xlrules()
        .arg("-b")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[unchanged]"));

    assert_eq!(std::fs::read(dir.path().join("data.xlsx")).unwrap(), first);
}

#[test]
fn test_cli_base_dir_from_env() {
    let dir = TempDir::new().unwrap();
    setup(dir.path(), &[("data.xlsx", "out.xlsx")]);

    xlrules()
        .env("XLRULES_BASE_DIR", dir.path())
        .assert()
        .success();

    assert!(dir.path().join("out.xlsx").exists());
    assert_eq!(
        status_column(&dir.path().join("data.xlsx")),
        vec![CellValue::from("open"), CellValue::from("open")]
    );
}

#[test]
fn test_cli_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    setup(dir.path(), &[("data.xlsx", "data.xlsx")]);
    let before = std::fs::read(dir.path().join("data.xlsx")).unwrap();

    xlrules()
        .arg("-b")
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"));

    assert_eq!(std::fs::read(dir.path().join("data.xlsx")).unwrap(), before);
}

#[test]
fn test_cli_json_summary() {
    let dir = TempDir::new().unwrap();
    setup(dir.path(), &[("data.xlsx", "data.xlsx")]);

    let output = xlrules()
        .arg("-b")
        .arg(dir.path())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["dry_run"], false);
    assert_eq!(summary["groups"][0]["status"], "replaced");
    assert_eq!(summary["groups"][0]["report"]["rows_matched"], 1);
    assert_eq!(summary["groups"][0]["report"]["cells_written"], 1);
}

#[test]
fn test_cli_failed_group_still_exits_zero() {
    let dir = TempDir::new().unwrap();
    setup(
        dir.path(),
        &[("absent.xlsx", "absent.xlsx"), ("data.xlsx", "data.xlsx")],
    );

    xlrules()
        .arg("-b")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 failed"))
        .stderr(predicate::str::contains("absent.xlsx"));

    assert_eq!(
        status_column(&dir.path().join("data.xlsx")),
        vec![CellValue::from("matched"), CellValue::from("open")]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_no_rules_file_found() {
    let dir = TempDir::new().unwrap();

    xlrules()
        .arg("-b")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to resolve configuration"));
}

#[test]
fn test_cli_explicit_rules_file_missing() {
    let dir = TempDir::new().unwrap();

    xlrules()
        .arg("-b")
        .arg(dir.path())
        .arg("-r")
        .arg(dir.path().join("nope.xlsx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to apply rules"));
}

#[test]
fn test_cli_rules_missing_required_column() {
    let dir = TempDir::new().unwrap();
    let mut rules = Sheet::new("Rules");
    rules.set(0, 0, CellValue::from("Input_File"));
    rules.set(0, 1, CellValue::from("Regex"));
    save(&dir.path().join("rules.xlsx"), vec![rules]);

    xlrules()
        .arg("-b")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Output_File"));
}
