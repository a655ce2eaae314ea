use crate::config::RunConfig;
use crate::engine::TracingReporter;
use crate::error::RulesResult;
use crate::runner::{self, GroupOutcome, GroupStatus, RunSummary};
use colored::Colorize;

/// Execute the rules and print a human-readable summary (or JSON)
pub fn run(config: &RunConfig, json: bool, verbose: bool) -> RulesResult<RunSummary> {
    if !json {
        println!("{}", "🔧 xlrules - Applying workbook rules".bold().green());
        println!("   Rules: {}", config.rules_path.display());
        if verbose {
            println!("   Base directory: {}", config.base_dir.display());
            println!("   Default trigger column: {}", config.trigger_column);
        }
        println!();

        if config.dry_run {
            println!(
                "{}",
                "📋 DRY RUN MODE - No changes will be written\n".yellow()
            );
        }
    }

    let summary = runner::run(config, &TracingReporter)?;

    if json {
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(std::io::Error::other)?;
        println!("{rendered}");
    } else {
        print_summary(&summary, verbose);
    }

    Ok(summary)
}

fn print_summary(summary: &RunSummary, verbose: bool) {
    println!("{}", "📊 Rule groups:".bold().cyan());
    for group in &summary.groups {
        print_group(group, verbose);
    }
    println!();

    let totals = format!(
        "{} groups, {} rows matched, {} cells written",
        summary.groups.len(),
        summary.rows_matched(),
        summary.cells_written()
    );

    if summary.failed() == 0 {
        println!("{} {}", "✅ Done:".bold().green(), totals);
    } else {
        println!(
            "{} {} ({} failed)",
            "⚠️  Done with errors:".bold().yellow(),
            totals,
            summary.failed().to_string().red().bold()
        );
    }
}

fn print_group(group: &GroupOutcome, verbose: bool) {
    let status = match group.status {
        GroupStatus::Saved => "saved".green(),
        GroupStatus::Replaced => "replaced".green(),
        GroupStatus::Unchanged => "unchanged".normal(),
        GroupStatus::DryRun => "dry run".yellow(),
        GroupStatus::Skipped => "skipped".yellow(),
        GroupStatus::Failed => "failed".red().bold(),
    };

    println!(
        "   {} {} → {} [{}]",
        group.input.display().to_string().bright_blue(),
        group.input_sheet,
        group.output.display().to_string().bright_blue(),
        status
    );

    if let Some(error) = &group.error {
        println!("      {}", error.red());
    } else {
        println!(
            "      {} of {} rows matched, {} cells written",
            group.report.rows_matched.to_string().bold(),
            group.report.rows_scanned,
            group.report.cells_written
        );
        if verbose && group.report.changes_dropped > 0 {
            println!(
                "      {}",
                format!("{} changes dropped", group.report.changes_dropped).yellow()
            );
        }
    }
}
