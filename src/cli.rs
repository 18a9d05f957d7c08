//! Command-line interface for dirsort.
//!
//! Parses arguments with clap, builds an `OrganizationTask` from them, runs
//! the organizer and renders the result. All printing goes through
//! `OutputFormatter`; the library layer below never prints.

use crate::config::FilterConfig;
use crate::duplicates::DuplicateDetector;
use crate::model::{
    CancelFlag, HashAlgorithm, OperationMode, OrganizationMode, OrganizationTask,
};
use crate::organizer::{Organizer, Stage};
use crate::output::OutputFormatter;
use crate::path_guard::PathGuard;
use crate::scanner::Scanner;
use crate::undo::UndoManager;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dirsort",
    version,
    about = "Organize a directory tree into categorized folders, with duplicate detection and undo."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML filter configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Layout {
    /// dest/Category/file
    Category,
    /// dest/<year>/file
    Year,
    /// dest/Category/<year>/file
    CategoryYear,
}

impl From<Layout> for OrganizationMode {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Category => OrganizationMode::Category,
            Layout::Year => OrganizationMode::Year,
            Layout::CategoryYear => OrganizationMode::CategoryYear,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and relocate its files into a categorized layout.
    Organize {
        /// Directory to organize.
        source: PathBuf,

        /// Where the organized layout is created.
        #[arg(long, value_name = "DIR")]
        dest: PathBuf,

        /// Copy files instead of moving them.
        #[arg(long)]
        copy: bool,

        /// Destination layout.
        #[arg(long, value_enum, default_value_t = Layout::Category)]
        by: Layout,

        /// Show the plan without touching any file.
        #[arg(long)]
        dry_run: bool,

        /// Hash files and report duplicate groups.
        #[arg(long)]
        detect_duplicates: bool,

        /// Leave duplicate copies in place; relocate only one file per group.
        #[arg(long)]
        skip_duplicates: bool,

        /// Copy each file into a backup directory before relocating it.
        #[arg(long)]
        backup: bool,

        /// Use SHA-256 instead of MD5 for duplicate hashing.
        #[arg(long)]
        sha256: bool,

        /// Extra exclusion patterns (repeatable), merged with the config.
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,

        /// Limit recursion depth; 1 means the source directory only.
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,
    },

    /// Revert the last organization recorded in a destination directory.
    Undo {
        /// Destination directory holding the history file.
        dest: PathBuf,
    },

    /// Find duplicate files under a directory without moving anything.
    Duplicates {
        /// Directory to search.
        source: PathBuf,

        /// Use SHA-256 instead of MD5.
        #[arg(long)]
        sha256: bool,

        /// Ignore groups whose files are smaller than this many bytes.
        #[arg(long, value_name = "BYTES", default_value_t = 0)]
        min_size: u64,

        /// Only report files with one of these extensions (repeatable).
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,
    },
}

/// Parses the process arguments and runs the selected command. Returns the
/// process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(clean) => {
            if clean {
                0
            } else {
                1
            }
        }
        Err(message) => {
            OutputFormatter::error(&message);
            1
        }
    }
}

/// Ok(true) means the command completed without per-file errors.
fn dispatch(cli: Cli) -> Result<bool, String> {
    let config = FilterConfig::load(cli.config.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;

    match cli.command {
        Command::Organize {
            source,
            dest,
            copy,
            by,
            dry_run,
            detect_duplicates,
            skip_duplicates,
            backup,
            sha256,
            exclude,
            max_depth,
        } => {
            let mut task = OrganizationTask::new(source, dest);
            task.operation_mode = if copy {
                OperationMode::Copy
            } else {
                OperationMode::Move
            };
            task.organization_mode = by.into();
            task.dry_run = dry_run;
            task.detect_duplicates = detect_duplicates;
            task.skip_duplicates = skip_duplicates;
            task.create_backup = backup;
            task.hash_algorithm = if sha256 {
                HashAlgorithm::Sha256
            } else {
                HashAlgorithm::Md5
            };
            task.exclude = exclude;
            task.max_depth = max_depth;
            run_organize(config, task)
        }
        Command::Undo { dest } => run_undo(&dest),
        Command::Duplicates {
            source,
            sha256,
            min_size,
            extensions,
        } => {
            let algorithm = if sha256 {
                HashAlgorithm::Sha256
            } else {
                HashAlgorithm::Md5
            };
            run_duplicates(config, &source, algorithm, min_size, &extensions)
        }
    }
}

fn run_organize(config: FilterConfig, task: OrganizationTask) -> Result<bool, String> {
    if task.dry_run {
        OutputFormatter::dry_run_notice(&format!(
            "Analyzing {} (no files will be modified)",
            task.source.display()
        ));
    } else {
        OutputFormatter::info(&format!(
            "Organizing {} into {}",
            task.source.display(),
            task.destination.display()
        ));
    }

    let organizer = Organizer::new(config).map_err(|e| e.to_string())?;
    let cancel = CancelFlag::new();

    let bar = OutputFormatter::create_progress_bar(0);
    let progress = |stage: Stage, done: usize, total: usize| {
        if stage == Stage::Executing && total > 0 {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        }
    };
    let result = organizer
        .organize_with_progress(&task, &cancel, &progress)
        .map_err(|e| e.to_string())?;
    bar.finish_and_clear();

    if result.dry_run {
        OutputFormatter::print_plan(&result.undo_log);
        OutputFormatter::print_result(&result);
        OutputFormatter::success("Dry run complete. No files were modified.");
        return Ok(!result.has_errors());
    }

    if let Err(e) = UndoManager::save_history(&result) {
        OutputFormatter::warning(&format!(
            "Could not save history; undo will not be available: {}",
            e
        ));
    }

    OutputFormatter::print_result(&result);
    if result.success && !result.has_errors() {
        OutputFormatter::success("Organization complete!");
        OutputFormatter::plain(&format!(
            "Run 'dirsort undo {}' to revert.",
            result.destination.display()
        ));
    } else if result.has_errors() {
        OutputFormatter::warning("Some files could not be organized. Review the errors above.");
    }

    Ok(result.success && !result.has_errors())
}

fn run_undo(dest: &std::path::Path) -> Result<bool, String> {
    OutputFormatter::info("Undoing previous organization...");
    let report = UndoManager::undo(dest, &CancelFlag::new()).map_err(|e| e.to_string())?;
    OutputFormatter::print_undo_report(&report);
    if report.fully_restored() {
        OutputFormatter::success("Undo complete!");
    } else {
        OutputFormatter::warning("Undo finished with problems; the history file was kept.");
    }
    Ok(report.fully_restored())
}

fn run_duplicates(
    config: FilterConfig,
    source: &std::path::Path,
    algorithm: HashAlgorithm,
    min_size: u64,
    extensions: &[String],
) -> Result<bool, String> {
    let root = PathGuard::normalize(source)
        .map_err(|e| e.to_string())?
        .into_path_buf();
    PathGuard::ensure_readable(&root).map_err(|e| e.to_string())?;

    let filters = config
        .compile()
        .map_err(|e| format!("Error compiling filters: {}", e))?;

    OutputFormatter::info(&format!(
        "Scanning {} for duplicates ({})",
        root.display(),
        algorithm
    ));

    let cancel = CancelFlag::new();
    let scan = Scanner::scan(&root, &filters, None, &cancel);
    for error in &scan.errors {
        OutputFormatter::warning(&format!("{}: {}", error.path.display(), error.reason));
    }

    let detected = DuplicateDetector::detect(
        &scan.records,
        algorithm,
        Default::default(),
        &cancel,
    );
    for error in &detected.errors {
        OutputFormatter::warning(&format!("{}: {}", error.path.display(), error.reason));
    }

    let mut groups = detected.groups;
    if min_size > 0 {
        groups = DuplicateDetector::filter_by_size(groups, min_size, None);
    }
    if !extensions.is_empty() {
        groups = DuplicateDetector::filter_by_extension(groups, extensions);
    }

    let stats = DuplicateDetector::statistics(&groups);
    OutputFormatter::print_duplicates(&groups, &stats);

    Ok(scan.errors.is_empty() && detected.errors.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_organize_flags() {
        let cli = Cli::parse_from([
            "dirsort",
            "organize",
            "/tmp/in",
            "--dest",
            "/tmp/out",
            "--copy",
            "--by",
            "category-year",
            "--skip-duplicates",
            "--sha256",
            "--exclude",
            "*.tmp",
            "--exclude",
            "node_modules",
            "--max-depth",
            "3",
        ]);
        match cli.command {
            Command::Organize {
                source,
                dest,
                copy,
                by,
                skip_duplicates,
                sha256,
                exclude,
                max_depth,
                ..
            } => {
                assert_eq!(source, PathBuf::from("/tmp/in"));
                assert_eq!(dest, PathBuf::from("/tmp/out"));
                assert!(copy);
                assert!(matches!(by, Layout::CategoryYear));
                assert!(skip_duplicates);
                assert!(sha256);
                assert_eq!(exclude, vec!["*.tmp", "node_modules"]);
                assert_eq!(max_depth, Some(3));
            }
            _ => panic!("expected organize command"),
        }
    }

    #[test]
    fn test_cli_parses_undo() {
        let cli = Cli::parse_from(["dirsort", "undo", "/tmp/out"]);
        assert!(matches!(cli.command, Command::Undo { .. }));
    }

    #[test]
    fn test_cli_parses_duplicates_filters() {
        let cli = Cli::parse_from([
            "dirsort",
            "duplicates",
            "/tmp/in",
            "--min-size",
            "1024",
            "--ext",
            "jpg",
            "--ext",
            "png",
        ]);
        match cli.command {
            Command::Duplicates {
                min_size,
                extensions,
                sha256,
                ..
            } => {
                assert_eq!(min_size, 1024);
                assert_eq!(extensions, vec!["jpg", "png"]);
                assert!(!sha256);
            }
            _ => panic!("expected duplicates command"),
        }
    }

    #[test]
    fn test_cli_requires_dest_for_organize() {
        assert!(Cli::try_parse_from(["dirsort", "organize", "/tmp/in"]).is_err());
    }
}
