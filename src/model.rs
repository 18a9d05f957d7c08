//! Shared data model for the organization pipeline.
//!
//! Every stage (scanning, categorization, duplicate detection, execution)
//! works on the types defined here. Records are owned by the single run that
//! created them; only `OperationResult` is serializable and may outlive the
//! process (for later undo).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

/// What to do with each planned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Relocate the file, removing it from the source.
    Move,
    /// Duplicate the file, leaving the source in place.
    Copy,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Move => write!(f, "move"),
            OperationMode::Copy => write!(f, "copy"),
        }
    }
}

/// Destination layout strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationMode {
    /// `dest/Category/file`
    Category,
    /// `dest/2024/file`
    Year,
    /// `dest/Category/2024/file`
    CategoryYear,
}

/// Hash algorithm used for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Fast, fine for duplicate grouping. The default.
    Md5,
    /// Stronger guarantees at roughly double the cost.
    Sha256,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Strategy for designating the "original" inside a duplicate group.
///
/// The choice must be deterministic across runs; both strategies fall back to
/// lexical path order so ties cannot flip between executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginalPick {
    /// Earliest modification time wins, ties broken by smaller path.
    #[default]
    OldestThenPath,
    /// Lexicographically smallest path wins, ignoring timestamps.
    PathOnly,
}

/// Cooperative cancellation signal, shared between a caller and a running
/// organization. Checked between scan entries, batch items and execute steps;
/// never interrupts an in-flight filesystem operation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Irrevocable for the run observing this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A classification label such as "Images" or "Documents".
///
/// Categories compare and hash case-insensitively but preserve the casing
/// they were created with for display and directory names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Category(String);

impl TryFrom<String> for Category {
    type Error = String;

    /// Deserialization goes through the same validation as `Category::new`,
    /// so persisted data cannot smuggle in an empty label.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Category::new(&value).ok_or_else(|| format!("invalid category label: {:?}", value))
    }
}

/// Categories always known to the categorizer.
pub const BUILTIN_CATEGORIES: [&str; 11] = [
    "Documents",
    "Images",
    "Videos",
    "Audio",
    "Code",
    "Archives",
    "Executables",
    "Spreadsheets",
    "Presentations",
    "Fonts",
    "Others",
];

impl Category {
    /// Creates a category from a non-empty label. Returns `None` for labels
    /// that are empty after trimming.
    pub fn new(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Category(trimmed.to_string()))
        }
    }

    /// The fixed fallback category for unmatched files.
    pub fn others() -> Self {
        Category("Others".to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_builtin(&self) -> bool {
        BUILTIN_CATEGORIES
            .iter()
            .any(|b| b.eq_ignore_ascii_case(&self.0))
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Category {}

impl std::hash::Hash for Category {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discovered file.
///
/// Created by the scanner; `digest` and `category` are filled in later by the
/// duplicate detector and categorizer. Path, size and modification time never
/// change after creation.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub digest: Option<String>,
    pub category: Option<Category>,
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            digest: None,
            category: None,
        }
    }

    /// File name component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercased extension without the leading dot, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Year of the modification time (UTC), used for year-based layouts.
    pub fn year(&self) -> String {
        use chrono::{DateTime, Datelike, Utc};
        DateTime::<Utc>::from(self.modified).year().to_string()
    }
}

/// Files sharing identical content, with one member designated the original.
///
/// Rebuilt on every detection pass; never persisted.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub digest: String,
    pub algorithm: HashAlgorithm,
    /// At least two members; index 0 is the designated original.
    pub members: Vec<FileRecord>,
}

impl DuplicateGroup {
    pub fn original(&self) -> &FileRecord {
        &self.members[0]
    }

    /// Members other than the original.
    pub fn duplicates(&self) -> &[FileRecord] {
        &self.members[1..]
    }

    /// Bytes that would be reclaimed by removing every non-original member.
    pub fn wasted_bytes(&self) -> u64 {
        self.duplicates().iter().map(|r| r.size).sum()
    }
}

/// The user's declared intent for one organization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub operation_mode: OperationMode,
    pub organization_mode: OrganizationMode,
    /// Extra exclusion patterns, merged with the filter configuration.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Whether to hash files and group duplicates at all.
    #[serde(default)]
    pub detect_duplicates: bool,
    /// Leave every non-original duplicate in place instead of relocating it.
    /// Implies `detect_duplicates`.
    #[serde(default)]
    pub skip_duplicates: bool,
    /// Plan only; no filesystem mutation.
    #[serde(default)]
    pub dry_run: bool,
    /// Copy each source file into a backup directory before relocating it.
    #[serde(default)]
    pub create_backup: bool,
    #[serde(default = "default_algorithm")]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default)]
    pub original_pick: OriginalPick,
    /// Safety valve for pathological trees. `None` means unbounded.
    #[serde(default)]
    pub max_depth: Option<usize>,
}

fn default_algorithm() -> HashAlgorithm {
    HashAlgorithm::Md5
}

impl OrganizationTask {
    /// A move-by-category task with everything else at its default.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            operation_mode: OperationMode::Move,
            organization_mode: OrganizationMode::Category,
            exclude: Vec::new(),
            detect_duplicates: false,
            skip_duplicates: false,
            dry_run: false,
            create_backup: false,
            hash_algorithm: HashAlgorithm::Md5,
            original_pick: OriginalPick::default(),
            max_depth: None,
        }
    }

    pub fn wants_duplicate_handling(&self) -> bool {
        self.detect_duplicates || self.skip_duplicates
    }
}

/// A per-file failure recorded into the result instead of aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub path: PathBuf,
    pub reason: String,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// One applied (or, in a dry run, planned) relocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntry {
    pub original: PathBuf,
    pub new: PathBuf,
    pub category: Option<Category>,
}

/// Outcome of one organization run. Immutable after the organizer returns it,
/// and plain data throughout so callers can persist it for later undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub cancelled: bool,
    pub dry_run: bool,
    pub operation_mode: OperationMode,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub scanned: usize,
    pub categorized: usize,
    pub relocated: usize,
    pub duplicate_files: usize,
    pub skipped_duplicates: usize,
    pub errors: Vec<FileError>,
    /// original → new mapping, in execution order.
    pub undo_log: Vec<UndoEntry>,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    pub duration_ms: u64,
}

impl OperationResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Human-readable byte count, e.g. "1.50 MB".
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ];
    for (unit, divisor) in UNITS {
        if bytes >= divisor || unit == "B" {
            let value = bytes as f64 / divisor as f64;
            return if unit == "B" {
                format!("{} B", bytes)
            } else {
                format!("{:.2} {}", value, unit)
            };
        }
    }
    format!("{} B", bytes)
}

/// Extension helper shared by categorizer and filters: lowercased, without a
/// leading dot.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_category_case_insensitive_equality() {
        let a = Category::new("Images").unwrap();
        let b = Category::new("images").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name(), "Images");
    }

    #[test]
    fn test_category_rejects_empty() {
        assert!(Category::new("").is_none());
        assert!(Category::new("   ").is_none());
    }

    #[test]
    fn test_category_deserialization_rejects_empty_label() {
        assert!(serde_json::from_str::<Category>("\"\"").is_err());
        assert!(serde_json::from_str::<Category>("\"   \"").is_err());
        let valid: Category = serde_json::from_str("\"Images\"").unwrap();
        assert_eq!(valid.name(), "Images");
    }

    #[test]
    fn test_category_serialization_round_trip() {
        let category = Category::new("Ebooks").unwrap();
        let json = serde_json::to_string(&category).unwrap();
        assert_eq!(json, "\"Ebooks\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, category);
    }

    #[test]
    fn test_category_builtin_detection() {
        assert!(Category::new("documents").unwrap().is_builtin());
        assert!(!Category::new("Ebooks").unwrap().is_builtin());
    }

    #[test]
    fn test_record_year_from_mtime() {
        // 2021-01-01T00:00:00Z
        let mtime = UNIX_EPOCH + Duration::from_secs(1_609_459_200);
        let record = FileRecord::new(PathBuf::from("/tmp/a.txt"), 10, mtime);
        assert_eq!(record.year(), "2021");
    }

    #[test]
    fn test_record_extension_lowercased() {
        let record = FileRecord::new(PathBuf::from("/tmp/photo.JPG"), 1, UNIX_EPOCH);
        assert_eq!(record.extension().as_deref(), Some("jpg"));
    }

    #[test]
    fn test_cancel_flag_propagates() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_group_wasted_bytes() {
        let mtime = UNIX_EPOCH;
        let group = DuplicateGroup {
            digest: "abc".to_string(),
            algorithm: HashAlgorithm::Md5,
            members: vec![
                FileRecord::new(PathBuf::from("/a"), 100, mtime),
                FileRecord::new(PathBuf::from("/b"), 100, mtime),
                FileRecord::new(PathBuf::from("/c"), 100, mtime),
            ],
        };
        assert_eq!(group.wasted_bytes(), 200);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".PDF"), "pdf");
        assert_eq!(normalize_extension("Txt"), "txt");
    }
}
