//! The organize workflow: validate, scan, categorize, detect duplicates,
//! plan, execute.
//!
//! One call to `Organizer::organize` runs the full state machine over one
//! task. Validation failures abort before any I/O; everything after that is
//! per-file isolated — a single file's failure lands in the result's error
//! list and the batch continues.

use crate::categorizer::Categorizer;
use crate::config::{CompiledFilters, ConfigError, FilterConfig};
use crate::duplicates::DuplicateDetector;
use crate::model::{
    CancelFlag, Category, FileError, FileRecord, OperationMode, OperationResult,
    OrganizationMode, OrganizationTask, UndoEntry,
};
use crate::path_guard::{GuardError, PathGuard};
use crate::scanner::Scanner;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Directory under the destination root that holds pre-execution backups.
pub const BACKUP_DIR_NAME: &str = ".dirsort_backup";

/// Stages of one task execution, in order. `Failed` is reachable from any
/// stage on an unrecoverable error; `Cancelled` when the flag is observed
/// between stages or items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Scanning,
    Categorizing,
    DetectingDuplicates,
    Planning,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Scanning => "scanning",
            Stage::Categorizing => "categorizing",
            Stage::DetectingDuplicates => "detecting duplicates",
            Stage::Planning => "planning",
            Stage::Executing => "executing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Errors that abort a run before (or instead of) producing a result.
/// Per-file failures never surface here; they go into the result's error
/// list.
#[derive(Debug)]
pub enum OrganizeError {
    /// Task fields are inconsistent; checked before any I/O.
    Validation { reason: String },
    /// Path validation failed on one of the declared roots.
    Guard(GuardError),
    /// Filter configuration failed to compile.
    Config(ConfigError),
}

impl std::fmt::Display for OrganizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { reason } => write!(f, "Invalid task: {}", reason),
            Self::Guard(e) => write!(f, "{}", e),
            Self::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for OrganizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Guard(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Validation { .. } => None,
        }
    }
}

impl From<GuardError> for OrganizeError {
    fn from(e: GuardError) -> Self {
        Self::Guard(e)
    }
}

impl From<ConfigError> for OrganizeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// One planned relocation.
#[derive(Debug, Clone)]
struct PlannedItem {
    source: PathBuf,
    destination: PathBuf,
    category: Option<Category>,
}

/// Progress reporting hook: stage, items done, items total. Total is zero
/// while unknown (e.g. during scanning).
pub type ProgressFn<'a> = &'a dyn Fn(Stage, usize, usize);

/// Orchestrates one organization run from an immutable configuration.
///
/// The configuration (filters and custom rules) is fixed at construction, so
/// concurrent runs never share mutable rule state. Presentation layers call
/// `organize` and render the returned `OperationResult`; they never talk to
/// the scanner, categorizer or detector directly.
pub struct Organizer {
    config: FilterConfig,
    categorizer: Categorizer,
}

impl Organizer {
    pub fn new(config: FilterConfig) -> OrganizeResult<Self> {
        let categorizer = Categorizer::with_rules(&config.rules)
            .map_err(|e| OrganizeError::Validation {
                reason: e.to_string(),
            })?;
        Ok(Self {
            config,
            categorizer,
        })
    }

    /// An organizer with default filters and the built-in category table.
    pub fn with_defaults() -> Self {
        Self::new(FilterConfig::default()).expect("default configuration is valid")
    }

    /// Runs the task to completion (or cancellation).
    ///
    /// Returns `Err` only for validation failures, which happen before any
    /// side effect; every later problem is reported inside the result.
    pub fn organize(
        &self,
        task: &OrganizationTask,
        cancel: &CancelFlag,
    ) -> OrganizeResult<OperationResult> {
        self.organize_with_progress(task, cancel, &|_, _, _| {})
    }

    /// Like `organize`, reporting stage transitions and per-item progress
    /// through `progress`.
    pub fn organize_with_progress(
        &self,
        task: &OrganizationTask,
        cancel: &CancelFlag,
        progress: ProgressFn<'_>,
    ) -> OrganizeResult<OperationResult> {
        let started = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        // Validating: fail fast, before any I/O on the tree.
        progress(Stage::Validating, 0, 0);
        let (source, destination) = match validate_task(task) {
            Ok(roots) => roots,
            Err(e) => {
                progress(Stage::Failed, 0, 0);
                return Err(e);
            }
        };
        log::info!(
            "organizing {} -> {} ({}, dry_run={})",
            source.display(),
            destination.display(),
            task.operation_mode,
            task.dry_run
        );

        let mut result = OperationResult {
            success: false,
            cancelled: false,
            dry_run: task.dry_run,
            operation_mode: task.operation_mode,
            source: source.clone(),
            destination: destination.clone(),
            scanned: 0,
            categorized: 0,
            relocated: 0,
            duplicate_files: 0,
            skipped_duplicates: 0,
            errors: Vec::new(),
            undo_log: Vec::new(),
            started_at,
            duration_ms: 0,
        };

        let filters = match self.compile_filters(task) {
            Ok(filters) => filters,
            Err(e) => {
                progress(Stage::Failed, 0, 0);
                return Err(e);
            }
        };

        // Scanning.
        progress(Stage::Scanning, 0, 0);
        let scan = Scanner::scan(&source, &filters, task.max_depth, cancel);
        result.scanned = scan.records.len();
        result.errors.extend(scan.errors);
        if scan.cancelled {
            return Ok(finish(result, Stage::Cancelled, started, progress));
        }
        let mut records = scan.records;

        // Categorizing. The batch observes the flag itself; a cancellation
        // mid-batch leaves a partial map and is caught right after.
        progress(Stage::Categorizing, 0, records.len());
        let categories = self.categorizer.categorize_batch(&records, cancel);
        for record in &mut records {
            record.category = categories.get(&record.path).cloned();
        }
        result.categorized = categories.len();
        if cancel.is_cancelled() {
            return Ok(finish(result, Stage::Cancelled, started, progress));
        }

        // DetectingDuplicates: only when the task asks for it.
        let mut skip_set: HashSet<PathBuf> = HashSet::new();
        if task.wants_duplicate_handling() {
            progress(Stage::DetectingDuplicates, 0, records.len());
            let detected = DuplicateDetector::detect(
                &records,
                task.hash_algorithm,
                task.original_pick,
                cancel,
            );
            let stats = DuplicateDetector::statistics(&detected.groups);
            result.duplicate_files = stats.total_duplicate_files;
            result.errors.extend(detected.errors);
            if detected.cancelled {
                return Ok(finish(result, Stage::Cancelled, started, progress));
            }
            if task.skip_duplicates {
                for group in &detected.groups {
                    for duplicate in group.duplicates() {
                        skip_set.insert(duplicate.path.clone());
                    }
                }
            }
        }

        // Planning: compute every destination up front so collisions are
        // resolved against both the disk and the plan itself.
        progress(Stage::Planning, 0, records.len());
        let mut plan: Vec<PlannedItem> = Vec::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        for record in &records {
            if skip_set.contains(&record.path) {
                result.skipped_duplicates += 1;
                continue;
            }
            let target_dir = layout_dir(&destination, record, task.organization_mode);
            let candidate = target_dir.join(record.file_name());
            let destination_path = unique_destination(candidate, &mut claimed);
            plan.push(PlannedItem {
                source: record.path.clone(),
                destination: destination_path,
                category: record.category.clone(),
            });
        }
        if cancel.is_cancelled() {
            return Ok(finish(result, Stage::Cancelled, started, progress));
        }

        // Executing. Dry run returns the plan itself as the result, with
        // zero filesystem mutation.
        progress(Stage::Executing, 0, plan.len());
        if task.dry_run {
            for item in &plan {
                result.undo_log.push(UndoEntry {
                    original: item.source.clone(),
                    new: item.destination.clone(),
                    category: item.category.clone(),
                });
            }
            result.relocated = plan.len();
            return Ok(finish(result, Stage::Completed, started, progress));
        }

        let backup_root = task
            .create_backup
            .then(|| destination.join(BACKUP_DIR_NAME).join(run_stamp()));

        let total = plan.len();
        for (idx, item) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(finish(result, Stage::Cancelled, started, progress));
            }

            if let Some(backup_root) = &backup_root {
                if let Err(reason) = back_up(&item.source, &source, backup_root) {
                    result.errors.push(FileError::new(&item.source, reason));
                    continue;
                }
            }

            match relocate(&item.source, &item.destination, task.operation_mode) {
                Ok(()) => {
                    result.undo_log.push(UndoEntry {
                        original: item.source.clone(),
                        new: item.destination.clone(),
                        category: item.category.clone(),
                    });
                    result.relocated += 1;
                }
                Err(reason) => {
                    log::warn!(
                        "failed to {} {}: {}",
                        task.operation_mode,
                        item.source.display(),
                        reason
                    );
                    result.errors.push(FileError::new(&item.source, reason));
                }
            }
            progress(Stage::Executing, idx + 1, total);
        }

        Ok(finish(result, Stage::Completed, started, progress))
    }

    fn compile_filters(&self, task: &OrganizationTask) -> OrganizeResult<CompiledFilters> {
        let mut config = self.config.clone();
        config.add_exclude_patterns(task.exclude.iter().cloned());
        Ok(config.compile()?)
    }
}

/// Normalizes and checks the declared roots. The source must exist and be
/// readable; the destination must be writable (or creatable) and must not be
/// nested inside the source, or the run would re-scan its own output.
fn validate_task(task: &OrganizationTask) -> OrganizeResult<(PathBuf, PathBuf)> {
    if task.source.as_os_str().is_empty() {
        return Err(OrganizeError::Validation {
            reason: "source path is empty".to_string(),
        });
    }
    if task.destination.as_os_str().is_empty() {
        return Err(OrganizeError::Validation {
            reason: "destination path is empty".to_string(),
        });
    }

    let source = PathGuard::normalize(&task.source)?.into_path_buf();
    if !source.is_dir() {
        return Err(OrganizeError::Validation {
            reason: format!("source is not a directory: {}", source.display()),
        });
    }
    PathGuard::ensure_readable(&source)?;

    let destination = PathGuard::normalize(&task.destination)?.into_path_buf();
    if destination.starts_with(&source) {
        return Err(OrganizeError::Validation {
            reason: format!(
                "destination {} is nested inside source {}",
                destination.display(),
                source.display()
            ),
        });
    }
    PathGuard::ensure_writable(&destination)?;

    Ok((source, destination))
}

/// Destination directory for one record under the task's layout mode.
fn layout_dir(destination: &Path, record: &FileRecord, mode: OrganizationMode) -> PathBuf {
    let category = record
        .category
        .clone()
        .unwrap_or_else(Category::others);
    match mode {
        OrganizationMode::Category => destination.join(category.name()),
        OrganizationMode::Year => destination.join(record.year()),
        OrganizationMode::CategoryYear => destination.join(category.name()).join(record.year()),
    }
}

/// Resolves name collisions by appending `_1`, `_2`, … before the extension.
/// Checks both the filesystem and destinations already claimed by this plan,
/// so no two planned items can collide with each other.
fn unique_destination(candidate: PathBuf, claimed: &mut HashSet<PathBuf>) -> PathBuf {
    if !candidate.exists() && !claimed.contains(&candidate) {
        claimed.insert(candidate.clone());
        return candidate;
    }

    let parent = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let next = parent.join(name);
        if !next.exists() && !claimed.contains(&next) {
            claimed.insert(next.clone());
            return next;
        }
        counter += 1;
    }
}

/// Copies `file` into the backup tree, mirroring its path relative to the
/// scanned source root.
fn back_up(file: &Path, source_root: &Path, backup_root: &Path) -> Result<(), String> {
    let relative = file.strip_prefix(source_root).unwrap_or(file);
    let backup_path = backup_root.join(relative);
    if let Some(parent) = backup_path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("cannot create backup dir: {}", e))?;
    }
    fs::copy(file, &backup_path).map_err(|e| format!("backup failed: {}", e))?;
    Ok(())
}

/// Applies one move or copy. Creates the destination directory on demand;
/// move falls back to copy+remove when rename crosses a filesystem boundary.
fn relocate(source: &Path, destination: &Path, mode: OperationMode) -> Result<(), String> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }

    match mode {
        OperationMode::Copy => {
            fs::copy(source, destination)
                .map(|_| ())
                .map_err(|e| format!("copy failed: {}", e))
        }
        OperationMode::Move => match fs::rename(source, destination) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Cross-device rename; copy then remove the source.
                fs::copy(source, destination)
                    .map_err(|e| format!("move failed: {}", e))?;
                fs::remove_file(source).map_err(|e| {
                    format!("moved copy left behind, source removal failed: {}", e)
                })
            }
        },
    }
}

fn run_stamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

fn finish(
    mut result: OperationResult,
    stage: Stage,
    started: Instant,
    progress: ProgressFn<'_>,
) -> OperationResult {
    result.duration_ms = started.elapsed().as_millis() as u64;
    result.cancelled = stage == Stage::Cancelled;
    result.success = stage == Stage::Completed;
    progress(stage, 0, 0);
    log::info!(
        "run {}: {} relocated, {} skipped as duplicates, {} errors in {} ms",
        stage,
        result.relocated,
        result.skipped_duplicates,
        result.errors.len(),
        result.duration_ms
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn task(source: &Path, dest: &Path) -> OrganizationTask {
        OrganizationTask::new(source, dest)
    }

    fn run(task: &OrganizationTask) -> OperationResult {
        Organizer::with_defaults()
            .organize(task, &CancelFlag::new())
            .expect("task should validate")
    }

    #[test]
    fn test_validation_rejects_empty_source() {
        let temp = TempDir::new().unwrap();
        let t = task(Path::new(""), temp.path());
        let result = Organizer::with_defaults().organize(&t, &CancelFlag::new());
        assert!(matches!(result, Err(OrganizeError::Validation { .. })));
    }

    #[test]
    fn test_validation_rejects_nested_destination() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("organized");
        let t = task(temp.path(), &nested);
        let result = Organizer::with_defaults().organize(&t, &CancelFlag::new());
        assert!(matches!(result, Err(OrganizeError::Validation { .. })));
    }

    #[test]
    fn test_validation_rejects_missing_source() {
        let temp = TempDir::new().unwrap();
        let t = task(&temp.path().join("missing"), temp.path());
        let result = Organizer::with_defaults().organize(&t, &CancelFlag::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_move_by_category() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("photo.jpg"), b"img").unwrap();
        fs::write(source.join("notes.txt"), b"txt").unwrap();

        let result = run(&task(&source, &dest));

        assert!(result.success);
        assert_eq!(result.relocated, 2);
        assert!(dest.join("Images/photo.jpg").exists());
        assert!(dest.join("Documents/notes.txt").exists());
        assert!(!source.join("photo.jpg").exists());
    }

    #[test]
    fn test_copy_leaves_source_in_place() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("photo.jpg"), b"img").unwrap();

        let mut t = task(&source, &dest);
        t.operation_mode = OperationMode::Copy;
        let result = run(&t);

        assert_eq!(result.relocated, 1);
        assert!(source.join("photo.jpg").exists());
        assert!(dest.join("Images/photo.jpg").exists());
    }

    #[test]
    fn test_category_year_layout() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        let file = source.join("photo.jpg");
        fs::write(&file, b"img").unwrap();

        let mut t = task(&source, &dest);
        t.organization_mode = OrganizationMode::CategoryYear;
        let result = run(&t);

        assert_eq!(result.relocated, 1);
        let year = result.undo_log[0]
            .new
            .parent()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(year.parse::<i32>().is_ok());
        assert!(dest.join("Images").join(&year).join("photo.jpg").exists());
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::create_dir_all(dest.join("Images")).unwrap();
        // Already present at the destination.
        fs::write(dest.join("Images/photo.jpg"), b"existing").unwrap();
        // Two more with the same name from different source dirs.
        fs::write(source.join("photo.jpg"), b"one").unwrap();
        fs::write(source.join("sub/photo.jpg"), b"two-").unwrap();

        let result = run(&task(&source, &dest));

        assert_eq!(result.relocated, 2);
        assert!(dest.join("Images/photo.jpg").exists());
        assert!(dest.join("Images/photo_1.jpg").exists());
        assert!(dest.join("Images/photo_2.jpg").exists());
        // The pre-existing file was never overwritten.
        assert_eq!(fs::read(dest.join("Images/photo.jpg")).unwrap(), b"existing");
    }

    #[test]
    fn test_dry_run_mutates_nothing() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("photo.jpg"), b"img").unwrap();

        let mut t = task(&source, &dest);
        t.dry_run = true;
        let result = run(&t);

        assert!(result.success);
        assert!(result.dry_run);
        assert_eq!(result.relocated, 1);
        assert_eq!(result.undo_log.len(), 1);
        assert!(source.join("photo.jpg").exists());
        assert!(!dest.exists() || fs::read_dir(&dest).unwrap().next().is_none());
    }

    #[test]
    fn test_skip_duplicates_leaves_copies_in_place() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.jpg"), b"same-bytes").unwrap();
        fs::write(source.join("b.jpg"), b"same-bytes").unwrap();

        let mut t = task(&source, &dest);
        t.skip_duplicates = true;
        let result = run(&t);

        assert_eq!(result.relocated, 1);
        assert_eq!(result.skipped_duplicates, 1);
        assert_eq!(result.duplicate_files, 1);
        // Exactly one stayed behind, exactly one moved.
        let remaining = fs::read_dir(&source).unwrap().count();
        assert_eq!(remaining, 1);
        assert_eq!(fs::read_dir(dest.join("Images")).unwrap().count(), 1);
    }

    #[test]
    fn test_backup_created_before_move() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("notes.txt"), b"precious").unwrap();

        let mut t = task(&source, &dest);
        t.create_backup = true;
        let result = run(&t);

        assert_eq!(result.relocated, 1);
        let backup_root = dest.join(BACKUP_DIR_NAME);
        assert!(backup_root.exists());
        // One timestamped run directory containing the mirrored file.
        let run_dir = fs::read_dir(&backup_root).unwrap().next().unwrap().unwrap();
        assert!(run_dir.path().join("notes.txt").exists());
        assert_eq!(
            fs::read(run_dir.path().join("notes.txt")).unwrap(),
            b"precious"
        );
    }

    #[test]
    fn test_cancellation_before_execution() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.txt"), b"x").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = Organizer::with_defaults()
            .organize(&task(&source, &dest), &cancel)
            .unwrap();

        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.relocated, 0);
        assert!(source.join("a.txt").exists());
    }

    #[test]
    fn test_cancellation_mid_execution_keeps_partial_undo_log() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.txt"), b"a").unwrap();
        fs::write(source.join("b.txt"), b"b").unwrap();
        fs::write(source.join("c.txt"), b"c").unwrap();

        // Cancel from the progress hook after the first relocation; the
        // in-flight item completes, the rest are never started.
        let cancel = CancelFlag::new();
        let on_progress = |stage: Stage, done: usize, _total: usize| {
            if stage == Stage::Executing && done == 1 {
                cancel.cancel();
            }
        };
        let result = Organizer::with_defaults()
            .organize_with_progress(&task(&source, &dest), &cancel, &on_progress)
            .unwrap();

        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.relocated, 1);
        assert_eq!(result.undo_log.len(), 1);
        // Two of the three files were left untouched in the source.
        assert_eq!(fs::read_dir(&source).unwrap().count(), 2);
    }

    #[test]
    fn test_year_layout() {
        let outer = TempDir::new().unwrap();
        let source = outer.path().join("src");
        let dest = outer.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("clip.mp4"), b"vid").unwrap();

        let mut t = task(&source, &dest);
        t.organization_mode = OrganizationMode::Year;
        let result = run(&t);

        assert_eq!(result.relocated, 1);
        let moved = &result.undo_log[0].new;
        // dest/<year>/clip.mp4 — no category segment.
        assert_eq!(moved.parent().unwrap().parent().unwrap(), dest);
    }
}
