//! Content-hash duplicate detection and grouping.
//!
//! Files are hashed in fixed-size chunks so memory stays bounded regardless
//! of file size, with a size pre-bucketing pass so unique-sized files are
//! never read at all. Hashing runs on a rayon pool; grouping is a
//! single-threaded reduction afterwards, since group contents do not depend
//! on hashing order.

use crate::model::{
    CancelFlag, DuplicateGroup, FileError, FileRecord, HashAlgorithm, OriginalPick,
};
use md5::Md5;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read granularity for hashing.
const HASH_CHUNK_BYTES: usize = 8 * 1024;

/// Result of one detection pass.
#[derive(Debug, Default)]
pub struct DetectOutcome {
    /// Groups of ≥2 identical files, sorted by their original's path.
    pub groups: Vec<DuplicateGroup>,
    /// Files that could not be hashed; excluded from grouping rather than
    /// treated as duplicates of one another.
    pub errors: Vec<FileError>,
    pub cancelled: bool,
}

/// Aggregate numbers over a group list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateStats {
    pub total_groups: usize,
    /// Non-original members across all groups.
    pub total_duplicate_files: usize,
    /// Bytes reclaimable by removing every non-original member.
    pub wasted_bytes: u64,
}

/// Stateless duplicate detection over a record set.
pub struct DuplicateDetector;

impl DuplicateDetector {
    /// Hashes `records` and groups identical digests.
    ///
    /// Only regular-file records are ever passed in (the scanner yields no
    /// directories). Files whose size is unique in the set are skipped
    /// without reading them. The original of each group is chosen per `pick`
    /// and is deterministic across runs.
    pub fn detect(
        records: &[FileRecord],
        algorithm: HashAlgorithm,
        pick: OriginalPick,
        cancel: &CancelFlag,
    ) -> DetectOutcome {
        let mut outcome = DetectOutcome::default();

        // Size bucketing: a file with a unique size cannot have a duplicate.
        let mut size_counts: HashMap<u64, usize> = HashMap::new();
        for record in records {
            *size_counts.entry(record.size).or_insert(0) += 1;
        }
        let candidates: Vec<&FileRecord> = records
            .iter()
            .filter(|r| size_counts[&r.size] >= 2)
            .collect();

        log::debug!(
            "hashing {} of {} records with {}",
            candidates.len(),
            records.len(),
            algorithm
        );

        // Parallel hashing; each worker checks the flag before starting a
        // file so cancellation never begins new reads.
        let hashed: Vec<(usize, Result<String, String>)> = candidates
            .par_iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((
                    idx,
                    Self::hash_file(&record.path, algorithm).map_err(|e| e.to_string()),
                ))
            })
            .collect();

        if cancel.is_cancelled() {
            outcome.cancelled = true;
        }

        // Single-threaded reduction; insertion order does not affect the
        // final groups.
        let mut by_digest: HashMap<String, Vec<FileRecord>> = HashMap::new();
        for (idx, result) in hashed {
            let record = candidates[idx];
            match result {
                Ok(digest) => {
                    let mut record = record.clone();
                    record.digest = Some(digest.clone());
                    by_digest.entry(digest).or_default().push(record);
                }
                Err(reason) => {
                    log::warn!("cannot hash {}: {}", record.path.display(), reason);
                    outcome.errors.push(FileError::new(&record.path, reason));
                }
            }
        }

        for (digest, mut members) in by_digest {
            if members.len() < 2 {
                continue;
            }
            sort_for_original(&mut members, pick);
            outcome.groups.push(DuplicateGroup {
                digest,
                algorithm,
                members,
            });
        }
        outcome
            .groups
            .sort_by(|a, b| a.original().path.cmp(&b.original().path));

        outcome
    }

    /// Chunked digest of one file, as a lowercase hex string.
    pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
        let mut file = File::open(path)?;
        match algorithm {
            HashAlgorithm::Md5 => hash_reader::<Md5>(&mut file),
            HashAlgorithm::Sha256 => hash_reader::<Sha256>(&mut file),
        }
    }

    /// Sums up a group list without re-hashing anything.
    pub fn statistics(groups: &[DuplicateGroup]) -> DuplicateStats {
        DuplicateStats {
            total_groups: groups.len(),
            total_duplicate_files: groups.iter().map(|g| g.duplicates().len()).sum(),
            wasted_bytes: groups.iter().map(DuplicateGroup::wasted_bytes).sum(),
        }
    }

    /// Keeps groups whose member size falls inside the given bounds.
    pub fn filter_by_size(
        groups: Vec<DuplicateGroup>,
        min_size: u64,
        max_size: Option<u64>,
    ) -> Vec<DuplicateGroup> {
        groups
            .into_iter()
            .filter(|group| {
                let size = group.original().size;
                size >= min_size && max_size.is_none_or(|max| size <= max)
            })
            .collect()
    }

    /// Keeps groups in which any member carries one of the extensions.
    pub fn filter_by_extension<S: AsRef<str>>(
        groups: Vec<DuplicateGroup>,
        extensions: &[S],
    ) -> Vec<DuplicateGroup> {
        let wanted: Vec<String> = extensions
            .iter()
            .map(|e| crate::model::normalize_extension(e.as_ref()))
            .collect();
        groups
            .into_iter()
            .filter(|group| {
                group.members.iter().any(|member| {
                    member
                        .extension()
                        .map(|ext| wanted.contains(&ext))
                        .unwrap_or(false)
                })
            })
            .collect()
    }
}

/// Orders members so the designated original ends up at index 0. Both
/// strategies are total orders over (mtime, path) or path alone, so the
/// result never depends on hashing order.
fn sort_for_original(members: &mut [FileRecord], pick: OriginalPick) {
    match pick {
        OriginalPick::OldestThenPath => {
            members.sort_by(|a, b| {
                a.modified
                    .cmp(&b.modified)
                    .then_with(|| a.path.cmp(&b.path))
            });
        }
        OriginalPick::PathOnly => {
            members.sort_by(|a, b| a.path.cmp(&b.path));
        }
    }
}

fn hash_reader<D: Digest>(reader: &mut impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; HASH_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn record_for(path: PathBuf) -> FileRecord {
        let meta = fs::metadata(&path).unwrap();
        FileRecord::new(path, meta.len(), meta.modified().unwrap_or(UNIX_EPOCH))
    }

    fn write_record(dir: &TempDir, name: &str, content: &[u8]) -> FileRecord {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        record_for(path)
    }

    #[test]
    fn test_known_md5_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let digest = DuplicateDetector::hash_file(&path, HashAlgorithm::Md5).unwrap();
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_known_sha256_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let digest = DuplicateDetector::hash_file(&path, HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_identical_files_grouped() {
        let temp = TempDir::new().unwrap();
        let records = vec![
            write_record(&temp, "a.bin", b"same content"),
            write_record(&temp, "b.bin", b"same content"),
            write_record(&temp, "c.bin", b"same content"),
        ];

        let outcome = DuplicateDetector::detect(
            &records,
            HashAlgorithm::Md5,
            OriginalPick::default(),
            &CancelFlag::new(),
        );

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].members.len(), 3);
    }

    #[test]
    fn test_one_byte_difference_separates() {
        let temp = TempDir::new().unwrap();
        let records = vec![
            write_record(&temp, "a.bin", b"content-A"),
            write_record(&temp, "b.bin", b"content-B"),
        ];

        let outcome = DuplicateDetector::detect(
            &records,
            HashAlgorithm::Md5,
            OriginalPick::default(),
            &CancelFlag::new(),
        );

        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_unique_size_skips_hashing() {
        let temp = TempDir::new().unwrap();
        let records = vec![
            write_record(&temp, "small.bin", b"x"),
            write_record(&temp, "large.bin", b"aaaaaaaaaaaaaaaa"),
        ];

        let outcome = DuplicateDetector::detect(
            &records,
            HashAlgorithm::Md5,
            OriginalPick::default(),
            &CancelFlag::new(),
        );

        assert!(outcome.groups.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_original_is_oldest_then_smallest_path() {
        let temp = TempDir::new().unwrap();
        let newer = write_record(&temp, "newer.bin", b"dup");
        let older = write_record(&temp, "older.bin", b"dup");
        let past = UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs::File::options()
            .write(true)
            .open(&older.path)
            .unwrap()
            .set_modified(past)
            .unwrap();
        let older = record_for(older.path.clone());

        let outcome = DuplicateDetector::detect(
            &[newer, older.clone()],
            HashAlgorithm::Md5,
            OriginalPick::OldestThenPath,
            &CancelFlag::new(),
        );

        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].original().path, older.path);
    }

    #[test]
    fn test_original_path_only_strategy() {
        let temp = TempDir::new().unwrap();
        let records = vec![
            write_record(&temp, "zzz.bin", b"dup"),
            write_record(&temp, "aaa.bin", b"dup"),
        ];

        let outcome = DuplicateDetector::detect(
            &records,
            HashAlgorithm::Md5,
            OriginalPick::PathOnly,
            &CancelFlag::new(),
        );

        assert_eq!(outcome.groups[0].original().file_name(), "aaa.bin");
    }

    #[test]
    fn test_missing_file_lands_in_errors_not_groups() {
        let temp = TempDir::new().unwrap();
        let a = write_record(&temp, "a.bin", b"dup");
        let b = write_record(&temp, "b.bin", b"dup");
        let mut ghost = a.clone();
        ghost.path = temp.path().join("ghost.bin");

        let outcome = DuplicateDetector::detect(
            &[a, b, ghost],
            HashAlgorithm::Md5,
            OriginalPick::default(),
            &CancelFlag::new(),
        );

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].members.len(), 2);
    }

    #[test]
    fn test_statistics_wasted_bytes() {
        let temp = TempDir::new().unwrap();
        let records = vec![
            write_record(&temp, "a.bin", b"0123456789"),
            write_record(&temp, "b.bin", b"0123456789"),
            write_record(&temp, "c.bin", b"0123456789"),
        ];

        let outcome = DuplicateDetector::detect(
            &records,
            HashAlgorithm::Md5,
            OriginalPick::default(),
            &CancelFlag::new(),
        );
        let stats = DuplicateDetector::statistics(&outcome.groups);

        assert_eq!(stats.total_groups, 1);
        assert_eq!(stats.total_duplicate_files, 2);
        assert_eq!(stats.wasted_bytes, 20);
    }

    #[test]
    fn test_filters_operate_without_rehashing() {
        let temp = TempDir::new().unwrap();
        let records = vec![
            write_record(&temp, "a.jpg", b"0123456789"),
            write_record(&temp, "b.jpg", b"0123456789"),
            write_record(&temp, "c.txt", b"xy"),
            write_record(&temp, "d.txt", b"xy"),
        ];

        let outcome = DuplicateDetector::detect(
            &records,
            HashAlgorithm::Md5,
            OriginalPick::default(),
            &CancelFlag::new(),
        );
        assert_eq!(outcome.groups.len(), 2);

        let by_size = DuplicateDetector::filter_by_size(outcome.groups.clone(), 5, None);
        assert_eq!(by_size.len(), 1);
        assert_eq!(by_size[0].original().extension().as_deref(), Some("jpg"));

        let by_ext = DuplicateDetector::filter_by_extension(outcome.groups, &["txt"]);
        assert_eq!(by_ext.len(), 1);
        assert_eq!(by_ext[0].original().extension().as_deref(), Some("txt"));
    }
}
