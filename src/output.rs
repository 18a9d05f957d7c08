//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored
//! output, progress tracking, and formatted result summaries. Keeping every
//! print here makes it easy to change formatting globally.

use crate::duplicates::DuplicateStats;
use crate::model::{format_bytes, DuplicateGroup, OperationResult, UndoEntry};
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for operations
/// - Result and duplicate summaries
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates and returns a progress bar for file operations.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Prints the planned relocations of a dry run, one line per file.
    pub fn print_plan(entries: &[UndoEntry]) {
        Self::header("PLAN");
        for entry in entries {
            println!(
                "  {} {} {}",
                entry.original.display(),
                "->".dimmed(),
                entry.new.display()
            );
        }
    }

    /// Prints a summary of one organization run.
    pub fn print_result(result: &OperationResult) {
        Self::header("SUMMARY");
        println!("  Scanned:            {}", result.scanned);
        println!("  Categorized:        {}", result.categorized);
        let relocated = result.relocated.to_string().green();
        match result.operation_mode {
            crate::model::OperationMode::Move => println!("  Moved:              {}", relocated),
            crate::model::OperationMode::Copy => println!("  Copied:             {}", relocated),
        }
        if result.duplicate_files > 0 {
            println!("  Duplicates found:   {}", result.duplicate_files);
        }
        if result.skipped_duplicates > 0 {
            println!(
                "  Duplicates skipped: {}",
                result.skipped_duplicates.to_string().yellow()
            );
        }
        println!("  Elapsed:            {} ms", result.duration_ms);

        if result.has_errors() {
            Self::header("ERRORS");
            for error in &result.errors {
                Self::error(&format!("{}: {}", error.path.display(), error.reason));
            }
        }

        if result.cancelled {
            Self::warning("Operation cancelled; the counts above are partial.");
        }
    }

    /// Prints each duplicate group with its designated original, then the
    /// aggregate statistics.
    pub fn print_duplicates(groups: &[DuplicateGroup], stats: &DuplicateStats) {
        if groups.is_empty() {
            Self::success("No duplicate files found.");
            return;
        }

        for group in groups {
            Self::header(&format!(
                "{} ({}, {})",
                group.digest,
                group.algorithm,
                format_bytes(group.original().size)
            ));
            println!("  {} {}", "original:".green(), group.original().path.display());
            for duplicate in group.duplicates() {
                println!("  duplicate: {}", duplicate.path.display());
            }
        }

        Self::header("SUMMARY");
        println!("  Groups:           {}", stats.total_groups);
        println!("  Duplicate files:  {}", stats.total_duplicate_files);
        println!(
            "  Reclaimable:      {}",
            format_bytes(stats.wasted_bytes).yellow()
        );
    }

    /// Prints the outcome of an undo run.
    pub fn print_undo_report(report: &UndoReport) {
        Self::header("UNDO");
        println!("  Restored:  {}", report.restored.to_string().green());
        if report.skipped_missing > 0 {
            println!("  Skipped:   {} (no longer present)", report.skipped_missing);
        }
        if report.conflicts_backed_up > 0 {
            println!(
                "  Conflicts: {} (existing files renamed aside)",
                report.conflicts_backed_up
            );
        }
        if !report.errors.is_empty() {
            Self::header("ERRORS");
            for error in &report.errors {
                Self::error(&format!("{}: {}", error.path.display(), error.reason));
            }
        }
        if report.cancelled {
            Self::warning("Undo cancelled before completion.");
        }
    }
}
