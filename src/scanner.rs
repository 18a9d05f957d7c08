//! Recursive directory scanning.
//!
//! Walks a tree, prunes excluded directories without entering them, and
//! yields one `FileRecord` per regular file that passes the filters. A single
//! unreadable entry never aborts the scan; failures are collected into the
//! outcome instead. Symbolic links are not followed.

use crate::config::CompiledFilters;
use crate::model::{CancelFlag, FileError, FileRecord};
use std::path::Path;
use walkdir::WalkDir;

/// Everything one scan produced, including the partial state of a cancelled
/// scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<FileRecord>,
    pub errors: Vec<FileError>,
    pub cancelled: bool,
}

/// Stateless tree walker.
pub struct Scanner;

impl Scanner {
    /// Scans `root` recursively, applying `filters` to every entry.
    ///
    /// Directories matching an exclusion rule are pruned whole: the walker
    /// never descends into them, so neither records nor errors are produced
    /// for their contents. `max_depth` is a safety valve for pathological
    /// trees; `None` leaves depth unbounded. The cancellation flag is checked
    /// between entries; on cancellation the partial outcome collected so far
    /// is returned with `cancelled` set.
    pub fn scan(
        root: &Path,
        filters: &CompiledFilters,
        max_depth: Option<usize>,
        cancel: &CancelFlag,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        let mut walker = WalkDir::new(root).follow_links(false);
        if let Some(depth) = max_depth {
            walker = walker.max_depth(depth);
        }

        let entries = walker.into_iter().filter_entry(|entry| {
            // The root itself is never pruned; everything below it is
            // subject to the directory rules.
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !filters.should_prune_dir(entry.path())
        });

        for entry in entries {
            if cancel.is_cancelled() {
                log::info!("scan cancelled at {} records", outcome.records.len());
                outcome.cancelled = true;
                return outcome;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    log::warn!("cannot access {}: {}", path.display(), e);
                    outcome.errors.push(FileError::new(path, e.to_string()));
                    continue;
                }
            };

            // Symlinks are reported as their own file type when not followed
            // and are skipped along with directories and other specials.
            if !entry.file_type().is_file() {
                continue;
            }

            if !filters.should_include(entry.path()) {
                continue;
            }

            // Single stat per file; size and mtime come from the same call.
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("cannot stat {}: {}", entry.path().display(), e);
                    outcome
                        .errors
                        .push(FileError::new(entry.path(), e.to_string()));
                    continue;
                }
            };

            if !filters.size_in_bounds(metadata.len()) {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    outcome
                        .errors
                        .push(FileError::new(entry.path(), e.to_string()));
                    continue;
                }
            };

            outcome.records.push(FileRecord::new(
                entry.path().to_path_buf(),
                metadata.len(),
                modified,
            ));
        }

        log::debug!(
            "scan of {} finished: {} records, {} errors",
            root.display(),
            outcome.records.len(),
            outcome.errors.len()
        );
        outcome
    }
}
