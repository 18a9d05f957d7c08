//! Undo support: persist an operation's result next to its output, replay
//! the undo log in reverse to put files back.
//!
//! Persistence is the caller's choice; the organizer itself never writes a
//! history file. The CLI saves one after each real run and consumes it on
//! `undo`.

use crate::model::{CancelFlag, FileError, OperationMode, OperationResult};
use crate::path_guard::PathGuard;
use std::fs;
use std::path::{Path, PathBuf};

/// History file written into the destination root after a real run.
pub const HISTORY_FILE_NAME: &str = ".dirsort_history.json";

#[derive(Debug)]
pub enum UndoError {
    HistoryNotFound { path: PathBuf },
    HistoryRead { path: PathBuf, reason: String },
    HistoryWrite { path: PathBuf, reason: String },
    InvalidHistoryFormat { reason: String },
    NothingToUndo,
}

impl std::fmt::Display for UndoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HistoryNotFound { path } => {
                write!(f, "No history file at '{}'", path.display())
            }
            Self::HistoryRead { path, reason } => {
                write!(f, "Failed to read history '{}': {}", path.display(), reason)
            }
            Self::HistoryWrite { path, reason } => {
                write!(f, "Failed to write history '{}': {}", path.display(), reason)
            }
            Self::InvalidHistoryFormat { reason } => {
                write!(f, "History file is not valid: {}", reason)
            }
            Self::NothingToUndo => write!(f, "The recorded operation has nothing to undo"),
        }
    }
}

impl std::error::Error for UndoError {}

pub type UndoResult<T> = Result<T, UndoError>;

/// Outcome of replaying one undo log.
#[derive(Debug, Clone, Default)]
pub struct UndoReport {
    pub restored: usize,
    /// Relocated files that no longer exist at their recorded destination.
    pub skipped_missing: usize,
    /// Originals that were occupied; the occupant was renamed aside first.
    pub conflicts_backed_up: usize,
    pub errors: Vec<FileError>,
    pub cancelled: bool,
}

impl UndoReport {
    /// True when every entry was either restored or the run never touched it.
    pub fn fully_restored(&self) -> bool {
        !self.cancelled && self.errors.is_empty()
    }
}

/// Replays undo logs and manages the on-disk history file.
pub struct UndoManager;

impl UndoManager {
    fn history_path(destination: &Path) -> PathBuf {
        destination.join(HISTORY_FILE_NAME)
    }

    /// Persists the result into its destination root. Dry runs and runs that
    /// relocated nothing are not worth a history file.
    pub fn save_history(result: &OperationResult) -> UndoResult<()> {
        if result.dry_run || result.undo_log.is_empty() {
            return Ok(());
        }
        let path = Self::history_path(&result.destination);
        let json = serde_json::to_string_pretty(result).map_err(|e| UndoError::HistoryWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| UndoError::HistoryWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        log::debug!("history saved to {}", path.display());
        Ok(())
    }

    /// Loads the most recent result from a destination root.
    pub fn load_history(destination: &Path) -> UndoResult<OperationResult> {
        let path = Self::history_path(destination);
        if !path.exists() {
            return Err(UndoError::HistoryNotFound { path });
        }
        let content = fs::read_to_string(&path).map_err(|e| UndoError::HistoryRead {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| UndoError::InvalidHistoryFormat {
            reason: e.to_string(),
        })
    }

    /// Loads the history of `destination`, replays it, and removes the
    /// history file when every entry was undone.
    pub fn undo(destination: &Path, cancel: &CancelFlag) -> UndoResult<UndoReport> {
        let result = Self::load_history(destination)?;
        if result.undo_log.is_empty() {
            return Err(UndoError::NothingToUndo);
        }
        let report = Self::undo_result(&result, cancel);
        if report.fully_restored() {
            let path = Self::history_path(destination);
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("could not remove {}: {}", path.display(), e);
            }
        }
        Ok(report)
    }

    /// Replays the result's undo log in reverse order.
    ///
    /// Move runs are undone by moving each file back to its original path; a
    /// copy run is undone by deleting the copies. A file missing from its
    /// recorded destination is counted as skipped, not failed. If something
    /// now occupies an original path, the occupant is renamed aside with a
    /// timestamped `.bak` suffix before the restore.
    ///
    /// The log is untrusted input (a JSON file on disk): entries may only
    /// remove files inside the recorded destination and only restore to
    /// paths inside the recorded source. Anything else becomes an error
    /// entry without touching the filesystem.
    pub fn undo_result(result: &OperationResult, cancel: &CancelFlag) -> UndoReport {
        let mut report = UndoReport::default();

        for entry in result.undo_log.iter().rev() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if !entry.new.exists() {
                log::debug!("skipping {}: no longer present", entry.new.display());
                report.skipped_missing += 1;
                continue;
            }

            if let Err(e) = PathGuard::confine(&entry.new, &result.destination) {
                report.errors.push(FileError::new(&entry.new, e.to_string()));
                continue;
            }

            if result.operation_mode == OperationMode::Copy {
                match fs::remove_file(&entry.new) {
                    Ok(()) => report.restored += 1,
                    Err(e) => report
                        .errors
                        .push(FileError::new(&entry.new, format!("remove failed: {}", e))),
                }
                continue;
            }

            // The restore target is as attacker-controlled as the source of
            // the restore; it must sit inside the recorded source root.
            if let Err(e) = PathGuard::confine(&entry.original, &result.source) {
                report.errors.push(FileError::new(&entry.original, e.to_string()));
                continue;
            }

            if entry.original.exists() {
                match back_up_conflict(&entry.original) {
                    Ok(aside) => {
                        log::warn!(
                            "{} was occupied; existing file moved to {}",
                            entry.original.display(),
                            aside.display()
                        );
                        report.conflicts_backed_up += 1;
                    }
                    Err(reason) => {
                        report.errors.push(FileError::new(&entry.original, reason));
                        continue;
                    }
                }
            }

            match restore(&entry.new, &entry.original) {
                Ok(()) => report.restored += 1,
                Err(reason) => report.errors.push(FileError::new(&entry.new, reason)),
            }
        }

        log::info!(
            "undo: {} restored, {} skipped, {} conflicts, {} errors",
            report.restored,
            report.skipped_missing,
            report.conflicts_backed_up,
            report.errors.len()
        );
        report
    }
}

/// Moves an occupying file aside as `name.<stamp>.bak` in the same directory.
fn back_up_conflict(original: &Path) -> Result<PathBuf, String> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let aside = original.with_file_name(format!("{}.{}.bak", name, stamp));
    fs::rename(original, &aside).map_err(|e| format!("conflict backup failed: {}", e))?;
    Ok(aside)
}

/// Moves a file back to its original location, recreating parent directories
/// and falling back to copy+remove across filesystem boundaries.
fn restore(from: &Path, to: &Path) -> Result<(), String> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to).map_err(|e| format!("restore failed: {}", e))?;
            fs::remove_file(from).map_err(|e| format!("restored copy left behind: {}", e))
        }
    }
}
