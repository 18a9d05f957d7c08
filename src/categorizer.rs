//! Rule-based file classification.
//!
//! Resolution order, first match wins:
//! 1. User-registered custom rule (extension → category)
//! 2. Content-signature sniffing on the first 64 bytes
//! 3. Built-in extension table
//! 4. The "Others" default
//!
//! Batch categorization is a pure map from path to category with no side
//! effects, so it parallelizes without synchronization.

use crate::config::CustomRule;
use crate::model::{BUILTIN_CATEGORIES, CancelFlag, Category, FileRecord, normalize_extension};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bytes read for content-signature detection. Enough for every magic prefix
/// in the table; never more, regardless of file size.
const SNIFF_BYTES: usize = 64;

/// Errors raised while mutating the rule table.
#[derive(Debug, Clone)]
pub enum CategorizerError {
    /// A rule referenced a category that is neither built-in nor registered.
    CategoryNotFound { name: String },
    /// A rule carried an empty category label or no extensions.
    InvalidRule { reason: String },
}

impl std::fmt::Display for CategorizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CategoryNotFound { name } => write!(f, "Unknown category: {}", name),
            Self::InvalidRule { reason } => write!(f, "Invalid rule: {}", reason),
        }
    }
}

impl std::error::Error for CategorizerError {}

/// Assigns categories to file records.
///
/// The rule tables are explicit data loaded at construction; `add_rule` and
/// `remove_rule` mutate the custom table at runtime and take effect on the
/// next categorize call. Already-classified records are never re-tagged.
#[derive(Debug, Clone)]
pub struct Categorizer {
    custom_rules: HashMap<String, Category>,
    extension_map: HashMap<String, Category>,
    known_categories: HashSet<Category>,
}

impl Categorizer {
    /// A categorizer with the built-in extension table and no custom rules.
    pub fn new() -> Self {
        let mut categorizer = Self {
            custom_rules: HashMap::new(),
            extension_map: HashMap::new(),
            known_categories: BUILTIN_CATEGORIES
                .iter()
                .filter_map(|name| Category::new(name))
                .collect(),
        };
        categorizer.populate_builtin_extensions();
        categorizer
    }

    /// A categorizer preloaded with custom rules from configuration.
    ///
    /// Rule categories are registered as they appear, so a configuration can
    /// introduce categories beyond the built-in set.
    pub fn with_rules(rules: &[CustomRule]) -> Result<Self, CategorizerError> {
        let mut categorizer = Self::new();
        for rule in rules {
            categorizer.register_category(&rule.category)?;
            categorizer.add_rule(&rule.extensions, &rule.category)?;
        }
        Ok(categorizer)
    }

    fn populate_builtin_extensions(&mut self) {
        const TABLE: [(&str, &[&str]); 10] = [
            (
                "Documents",
                &["pdf", "txt", "doc", "docx", "odt", "rtf", "md", "html", "htm", "epub"],
            ),
            (
                "Images",
                &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "tiff", "ico", "heic"],
            ),
            (
                "Videos",
                &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "m4v", "3gp", "mpeg"],
            ),
            (
                "Audio",
                &["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "aiff", "opus"],
            ),
            (
                "Code",
                &[
                    "py", "js", "ts", "java", "c", "cpp", "h", "hpp", "go", "rs", "rb", "sh",
                    "sql", "json", "xml", "yaml", "yml", "toml", "css",
                ],
            ),
            (
                "Archives",
                &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso"],
            ),
            (
                "Executables",
                &["exe", "msi", "bat", "app", "dmg", "apk", "deb", "rpm", "appimage"],
            ),
            ("Spreadsheets", &["csv", "tsv", "xls", "xlsx", "ods"]),
            ("Presentations", &["ppt", "pptx", "odp", "key"]),
            ("Fonts", &["ttf", "otf", "woff", "woff2"]),
        ];

        for (category, extensions) in TABLE {
            let category = Category::new(category).expect("builtin names are non-empty");
            for ext in extensions {
                self.extension_map.insert((*ext).to_string(), category.clone());
            }
        }
    }

    /// Makes a category name usable in custom rules.
    pub fn register_category(&mut self, name: &str) -> Result<Category, CategorizerError> {
        let category = Category::new(name).ok_or_else(|| CategorizerError::InvalidRule {
            reason: "category label must be non-empty".to_string(),
        })?;
        self.known_categories.insert(category.clone());
        Ok(category)
    }

    /// Maps an extension set onto a category. Takes effect on the next
    /// categorize call; never re-tags already-classified records.
    pub fn add_rule<S: AsRef<str>>(
        &mut self,
        extensions: &[S],
        category: &str,
    ) -> Result<(), CategorizerError> {
        let category = Category::new(category).ok_or_else(|| CategorizerError::InvalidRule {
            reason: "category label must be non-empty".to_string(),
        })?;
        if !self.known_categories.contains(&category) {
            return Err(CategorizerError::CategoryNotFound {
                name: category.name().to_string(),
            });
        }
        if extensions.is_empty() {
            return Err(CategorizerError::InvalidRule {
                reason: "rule needs at least one extension".to_string(),
            });
        }
        for ext in extensions {
            self.custom_rules
                .insert(normalize_extension(ext.as_ref()), category.clone());
        }
        Ok(())
    }

    /// Removes custom rules for the given extensions. Unknown extensions are
    /// ignored.
    pub fn remove_rule<S: AsRef<str>>(&mut self, extensions: &[S]) {
        for ext in extensions {
            self.custom_rules.remove(&normalize_extension(ext.as_ref()));
        }
    }

    /// Resolves the category for one record.
    pub fn categorize(&self, record: &FileRecord) -> Category {
        let extension = record.extension();

        if let Some(ext) = &extension {
            if let Some(category) = self.custom_rules.get(ext) {
                return category.clone();
            }
        }

        if let Some(category) = self.sniff_signature(&record.path, extension.as_deref()) {
            return category;
        }

        if let Some(ext) = &extension {
            if let Some(category) = self.extension_map.get(ext) {
                return category.clone();
            }
        }

        Category::others()
    }

    /// Pure, order-independent batch classification.
    ///
    /// The cancellation flag is checked before each item; once set, remaining
    /// records are skipped and the partial map is returned.
    pub fn categorize_batch(
        &self,
        records: &[FileRecord],
        cancel: &CancelFlag,
    ) -> HashMap<PathBuf, Category> {
        records
            .par_iter()
            .filter_map(|record| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((record.path.clone(), self.categorize(record)))
            })
            .collect()
    }

    /// Magic-byte detection on a bounded prefix read. Unreadable files simply
    /// fall through to extension lookup.
    fn sniff_signature(&self, path: &Path, extension: Option<&str>) -> Option<Category> {
        let mut buf = [0u8; SNIFF_BYTES];
        let mut file = File::open(path).ok()?;
        let read = file.read(&mut buf).ok()?;
        if read == 0 {
            return None;
        }

        let kind = infer::get(&buf[..read])?;
        let mime = kind.mime_type();

        // Zip is a generic container (docx, xlsx, jar all sniff as zip on a
        // short prefix); when the extension already maps somewhere, it knows
        // better than the container signature does.
        if mime == "application/zip" {
            if let Some(ext) = extension {
                if self.extension_map.contains_key(ext) {
                    return None;
                }
            }
        }

        mime_to_category(mime)
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a sniffed MIME type onto a built-in category.
fn mime_to_category(mime: &str) -> Option<Category> {
    let name = if mime.starts_with("image/") {
        "Images"
    } else if mime.starts_with("video/") {
        "Videos"
    } else if mime.starts_with("audio/") {
        "Audio"
    } else if mime.starts_with("font/") {
        "Fonts"
    } else {
        match mime {
            "application/pdf" | "application/epub+zip" | "application/rtf" => "Documents",
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                "Documents"
            }
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "Spreadsheets",
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                "Presentations"
            }
            "application/zip"
            | "application/vnd.rar"
            | "application/x-rar-compressed"
            | "application/x-7z-compressed"
            | "application/x-tar"
            | "application/gzip"
            | "application/x-bzip2"
            | "application/x-xz" => "Archives",
            "application/vnd.microsoft.portable-executable"
            | "application/x-executable"
            | "application/x-mach-binary"
            | "application/vnd.debian.binary-package"
            | "application/x-msdownload" => "Executables",
            _ => return None,
        }
    };
    Category::new(name)
}
