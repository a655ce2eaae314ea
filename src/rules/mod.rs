//! Rule construction from a rules table
//!
//! A rules table row names an input sheet, a trigger regex and any number of
//! `ChangeN_Column` / `ChangeN_Value` pairs. Rows sharing the same
//! input/output binding form one [`RuleGroup`].

pub mod table;

pub use table::{RulesTable, REGEX_COLUMN, REQUIRED_COLUMNS};

use crate::column::ColumnSpec;
use crate::engine::Reporter;
use crate::error::{RulesError, RulesResult};
use crate::types::{CellValue, Rule, RuleGroup, SheetSpec};
use regex::Regex;

const CHANGE_PREFIX: &str = "change";
const COLUMN_MARKER: &str = "_column";
const VALUE_MARKER: &str = "_Value";

//==============================================================================
// Change Pair Discovery
//==============================================================================

/// A `ChangeN_Column` field and its paired `ChangeN_Value` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePair {
    pub column_field: String,
    pub value_field: String,
    pub column_index: usize,
    pub value_index: usize,
}

/// Discover change pairs from the table's column names, in column order.
///
/// A name qualifies when it starts with `change` and contains `_column`
/// (both case-insensitive). The value field is the same name with the marker
/// replaced by `_Value`, looked up case-insensitively. Names without a
/// matching value field are ignored.
pub fn change_pairs(columns: &[String]) -> Vec<ChangePair> {
    let mut pairs = Vec::new();

    for (column_index, name) in columns.iter().enumerate() {
        let lower = name.to_ascii_lowercase();
        if !lower.starts_with(CHANGE_PREFIX) {
            continue;
        }
        let Some(marker) = lower.find(COLUMN_MARKER) else {
            continue;
        };

        let value_name = format!("{}{}", &name[..marker], VALUE_MARKER);
        let found = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.eq_ignore_ascii_case(&value_name));

        if let Some((value_index, value_field)) = found {
            pairs.push(ChangePair {
                column_field: name.clone(),
                value_field: value_field.clone(),
                column_index,
                value_index,
            });
        }
    }

    pairs
}

//==============================================================================
// Grouping
//==============================================================================

/// Rows of the rules table that share one input/output binding
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlan {
    pub input_file: String,
    pub input_sheet: SheetSpec,
    pub output_file: String,
    pub output_sheet: SheetSpec,
    /// Indexes into `RulesTable::rows`, in table order
    pub rows: Vec<usize>,
}

impl GroupPlan {
    /// Raw regex text of every row, for error context
    pub fn patterns(&self, table: &RulesTable) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|&i| table.rows.get(i))
            .filter_map(|row| table.cell(row, "Regex").as_text())
            .collect()
    }
}

/// Builds rules and rule groups from one rules table
pub struct RuleSetBuilder<'a> {
    table: &'a RulesTable,
    pairs: Vec<ChangePair>,
    default_trigger: ColumnSpec,
}

impl<'a> RuleSetBuilder<'a> {
    pub fn new(table: &'a RulesTable, default_trigger: ColumnSpec) -> Self {
        Self {
            table,
            pairs: change_pairs(&table.columns),
            default_trigger,
        }
    }

    pub fn pairs(&self) -> &[ChangePair] {
        &self.pairs
    }

    /// Group rows by (Input_File, Input_Sheet, Output_File, Output_Sheet)
    /// in order of first appearance. Entirely blank rows are ignored.
    pub fn plan(&self) -> Vec<GroupPlan> {
        let mut plans: Vec<GroupPlan> = Vec::new();

        for (index, row) in self.table.rows.iter().enumerate() {
            if row.iter().all(CellValue::is_empty) {
                continue;
            }

            let input_file = self.text(row, "Input_File");
            let input_sheet = SheetSpec::from_cell(self.table.cell(row, "Input_Sheet"));
            let output_file = self.text(row, "Output_File");
            let output_sheet = SheetSpec::from_cell(self.table.cell(row, "Output_Sheet"));

            let existing = plans.iter_mut().find(|p| {
                p.input_file == input_file
                    && p.input_sheet == input_sheet
                    && p.output_file == output_file
                    && p.output_sheet == output_sheet
            });

            match existing {
                Some(plan) => plan.rows.push(index),
                None => plans.push(GroupPlan {
                    input_file,
                    input_sheet,
                    output_file,
                    output_sheet,
                    rows: vec![index],
                }),
            }
        }

        plans
    }

    /// Build every rule of a planned group.
    ///
    /// An invalid regex or trigger column fails the whole group; rows with an
    /// empty regex are skipped with a warning.
    pub fn build_group(&self, plan: &GroupPlan, reporter: &dyn Reporter) -> RulesResult<RuleGroup> {
        let mut group = RuleGroup::new(
            plan.input_file.clone(),
            plan.input_sheet.clone(),
            plan.output_file.clone(),
            plan.output_sheet.clone(),
        );

        for &index in &plan.rows {
            if let Some(rule) = self.build_rule(index, reporter)? {
                group.rules.push(rule);
            }
        }

        Ok(group)
    }

    /// Build the rule of one table row (0-based index into `rows`)
    pub fn build_rule(&self, index: usize, reporter: &dyn Reporter) -> RulesResult<Option<Rule>> {
        let Some(row) = self.table.rows.get(index) else {
            return Ok(None);
        };
        // Header is spreadsheet row 1
        let source_row = index + 2;

        let pattern = match self.table.cell(row, "Regex").as_text() {
            Some(p) if !p.trim().is_empty() => p,
            _ => {
                reporter.warn(&format!("rules row {source_row}: empty regex, rule skipped"));
                return Ok(None);
            }
        };
        let pattern = Regex::new(&pattern).map_err(|source| RulesError::InvalidRegex {
            pattern: pattern.clone(),
            source,
        })?;

        let trigger_cell = self.table.cell(row, REGEX_COLUMN);
        let trigger_column = if trigger_cell.is_empty()
            || trigger_cell.as_text().is_some_and(|t| t.trim().is_empty())
        {
            self.default_trigger.clone()
        } else {
            ColumnSpec::from_cell(trigger_cell)?
        };

        let mut changes = Vec::with_capacity(self.pairs.len());
        for pair in &self.pairs {
            let spec_cell = &row[pair.column_index];
            let value_cell = &row[pair.value_index];
            if spec_cell.is_empty() || value_cell.is_empty() {
                continue;
            }

            match ColumnSpec::from_cell(spec_cell) {
                Ok(spec) => changes.push((spec, rule_value(value_cell))),
                Err(e) => reporter.warn(&format!(
                    "rules row {source_row}: {} dropped: {e}",
                    pair.column_field
                )),
            }
        }

        Ok(Some(Rule {
            trigger_column,
            pattern,
            changes,
            source_row,
        }))
    }

    fn text(&self, row: &[CellValue], name: &str) -> String {
        self.table
            .cell(row, name)
            .as_text()
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

/// Values written by rules are plain strings, numbers or booleans
fn rule_value(cell: &CellValue) -> CellValue {
    match cell {
        CellValue::DateTime(serial) => CellValue::Number(*serial),
        other => other.clone().canonical(),
    }
}
