//! Row scan and mutation
//!
//! Rules are first bound to a concrete sheet (column specs resolved against
//! its header row), then every data row is tested against the rules in table
//! order. The first rule whose regex matches the trigger cell has all of its
//! changes written; later rules are not tried for that row.

use crate::error::{RulesError, RulesResult};
use crate::types::{CellValue, Rule};
use crate::workbook::{check_bounds, FormatAdapter, SheetId};
use serde::Serialize;

//==============================================================================
// Reporting
//==============================================================================

/// Receives diagnostics from rule building, scanning and the runner
pub trait Reporter {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, _message: &str) {}
}

/// Forwards every message to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }
}

/// Counters of one sheet scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub rows_scanned: usize,
    pub rows_matched: usize,
    pub cells_written: usize,
    pub changes_dropped: usize,
}

//==============================================================================
// Binding
//==============================================================================

/// A rule with its columns resolved against one sheet
#[derive(Debug)]
pub struct BoundRule<'r> {
    pub rule: &'r Rule,
    pub trigger: usize,
    /// Unique target columns, in first-seen order
    pub changes: Vec<(usize, &'r CellValue)>,
}

/// Resolve every rule's trigger and change columns against `header`.
///
/// A trigger column that cannot be resolved fails the whole binding. Change
/// columns that cannot be resolved, or that lie outside the format's grid,
/// are dropped with a warning; the count is returned alongside the rules.
pub fn bind_rules<'r>(
    rules: &'r [Rule],
    header: &[String],
    adapter: &dyn FormatAdapter,
    reporter: &dyn Reporter,
) -> RulesResult<(Vec<BoundRule<'r>>, usize)> {
    let mut bound = Vec::with_capacity(rules.len());
    let mut dropped = 0;

    for rule in rules {
        let trigger = rule.trigger_column.resolve(header)?;

        let mut changes: Vec<(usize, &CellValue)> = Vec::with_capacity(rule.changes.len());
        for (spec, value) in &rule.changes {
            let col = match spec
                .resolve(header)
                .and_then(|col| check_bounds(adapter.format(), 0, col).map(|_| col))
            {
                Ok(col) => col,
                Err(e) => {
                    reporter.warn(&format!(
                        "rules row {}: change to column {} dropped: {}",
                        rule.source_row, spec, e
                    ));
                    dropped += 1;
                    continue;
                }
            };

            match changes.iter_mut().find(|slot| slot.0 == col) {
                Some(slot) => {
                    reporter.warn(&format!(
                        "rules row {}: column {} targeted more than once, keeping last value",
                        rule.source_row, spec
                    ));
                    slot.1 = value;
                }
                None => changes.push((col, value)),
            }
        }

        bound.push(BoundRule {
            rule,
            trigger,
            changes,
        });
    }

    Ok((bound, dropped))
}

//==============================================================================
// Scanning
//==============================================================================

/// Apply `rules` to every data row of `sheet`, first match wins
pub fn apply_rules(
    adapter: &mut dyn FormatAdapter,
    sheet: SheetId,
    rules: &[Rule],
    reporter: &dyn Reporter,
) -> RulesResult<ScanReport> {
    let header = adapter.header_row(sheet);
    let (bound, dropped) = bind_rules(rules, &header, &*adapter, reporter)?;

    let mut report = ScanReport {
        changes_dropped: dropped,
        ..ScanReport::default()
    };

    for row in adapter.data_rows(sheet) {
        report.rows_scanned += 1;

        let matched = bound.iter().find(|b| {
            adapter
                .cell_value(sheet, row, b.trigger)
                .as_text()
                .is_some_and(|text| b.rule.pattern.is_match(&text))
        });

        let Some(rule) = matched else {
            continue;
        };

        report.rows_matched += 1;
        reporter.debug(&format!(
            "row {} matched '{}' (rules row {})",
            row.index() + 1,
            rule.rule.pattern_str(),
            rule.rule.source_row
        ));

        for (col, value) in &rule.changes {
            match adapter.set_cell_value(sheet, row, *col, (*value).clone()) {
                Ok(()) => report.cells_written += 1,
                Err(e @ RulesError::CellOutOfBounds { .. }) => {
                    reporter.warn(&format!("row {}: {}", row.index() + 1, e));
                    report.changes_dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(report)
}
