//! Filtering and categorization rule configuration.
//!
//! Rules are loaded from a TOML file and compiled once per run into
//! `CompiledFilters`; nothing mutates them while an organization is running.
//! Supported exclusion strategies:
//! - Exact filename matching
//! - Glob pattern matching (against the name and the full path)
//! - File extension matching
//! - Absolute-path prefix matching
//! - Regex matching (against the file name)
//! - Include (whitelist) globs that override exclude rules
//!
//! # Configuration File Format
//!
//! ```toml
//! [filters]
//! enable_hidden_files = false
//! min_size = 0            # optional, bytes
//! # max_size = 104857600  # optional, bytes
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules"]
//! extensions = ["bak", "tmp"]
//! prefixes = ["/mnt/archive"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [[rules]]
//! category = "Ebooks"
//! extensions = ["epub", "mobi"]
//! ```

use crate::model::normalize_extension;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error while reading configuration.
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::InvalidGlobPattern(pattern) => {
                write!(f, "Invalid glob pattern '{}'", pattern)
            }
            ConfigError::InvalidRegexPattern { pattern, reason } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, reason)
            }
            ConfigError::IoError(msg) => write!(f, "IO error reading configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level configuration: filter rules plus custom category rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub filters: FilterRules,

    /// Custom extension-set → category rules, applied before every other
    /// categorization source.
    #[serde(default)]
    pub rules: Vec<CustomRule>,
}

/// A user-defined categorization rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRule {
    pub category: String,
    pub extensions: Vec<String>,
}

/// Root-level filter rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Minimum file size in bytes. Smaller files are skipped.
    #[serde(default)]
    pub min_size: u64,

    /// Maximum file size in bytes. `None` means no upper bound.
    #[serde(default)]
    pub max_size: Option<u64>,

    #[serde(default)]
    pub exclude: ExcludeRules,

    #[serde(default)]
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            min_size: 0,
            max_size: None,
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files and directories from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact names to exclude (e.g., ".DS_Store", "node_modules").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns, matched against the entry name and the full path.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Absolute path prefixes; anything under them is excluded.
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Regex patterns matched against file names (for advanced users).
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Whitelist globs that override exclude rules for files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl FilterConfig {
    /// Load configuration, with fallback to defaults.
    ///
    /// Resolution order:
    /// 1. `config_path`, if provided
    /// 2. `.dirsortrc.toml` in the current directory
    /// 3. `~/.config/dirsort/config.toml`
    /// 4. Defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".dirsortrc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dirsort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Merge extra exclusion patterns supplied at call time (e.g. from a
    /// task) into the exclude set before compilation.
    pub fn add_exclude_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            self.filters.exclude.patterns.push(pattern.into());
        }
    }

    /// Compile into optimized filter structures for matching.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Compiled, immutable filter structures shared by one run.
///
/// All patterns are validated and pre-parsed here so per-entry matching never
/// reparses anything.
pub struct CompiledFilters {
    enable_hidden_files: bool,
    min_size: u64,
    max_size: Option<u64>,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_prefixes: Vec<PathBuf>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| -> Result<Vec<Pattern>, ConfigError> {
            patterns
                .iter()
                .map(|p| Pattern::new(p).map_err(|_| ConfigError::InvalidGlobPattern(p.clone())))
                .collect()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            min_size: rules.min_size,
            max_size: rules.max_size,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_prefixes: rules.exclude.prefixes.iter().map(PathBuf::from).collect(),
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Filters with default rules only.
    pub fn default_rules() -> Self {
        Self::new(&FilterRules::default()).expect("default rules always compile")
    }

    /// Whether a directory entry should be pruned. The walker never descends
    /// into a pruned directory, so exclusion cost stays proportional to the
    /// pruned subtree.
    pub fn should_prune_dir(&self, dir_path: &Path) -> bool {
        let name = dir_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.enable_hidden_files && name.starts_with('.') {
            return true;
        }
        if self.exclude_filenames.contains(name.as_ref()) {
            return true;
        }
        if self.matches_exclude_patterns(dir_path, &name) {
            return true;
        }
        self.matches_exclude_prefix(dir_path)
    }

    /// Check if a file should be included in organization (not excluded).
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter
    /// 3. Exact filename match
    /// 4. File extension match
    /// 5. Glob pattern match
    /// 6. Absolute-path prefix match
    /// 7. Regex pattern match
    /// 8. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_include_patterns(file_path) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_exclude_patterns(file_path, &file_name) {
            return false;
        }

        if self.matches_exclude_prefix(file_path) {
            return false;
        }

        if self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
        {
            return false;
        }

        true
    }

    /// Size bounds applied to scanned records, separate from name matching
    /// since they need stat data.
    pub fn size_in_bounds(&self, size: u64) -> bool {
        if size < self.min_size {
            return false;
        }
        match self.max_size {
            Some(max) => size <= max,
            None => true,
        }
    }

    fn matches_include_patterns(&self, file_path: &Path) -> bool {
        self.include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_patterns(&self, path: &Path, name: &str) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.matches(name) || pattern.matches_path(path))
    }

    fn matches_exclude_prefix(&self, path: &Path) -> bool {
        self.exclude_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_exclude(exclude: ExcludeRules) -> FilterConfig {
        FilterConfig {
            filters: FilterRules {
                enable_hidden_files: true,
                exclude,
                ..Default::default()
            },
            rules: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_hides_hidden_files() {
        let config = FilterConfig::default();
        assert!(!config.filters.enable_hidden_files);
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let compiled = FilterConfig::default().compile().unwrap();
        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new(".gitignore")));
    }

    #[test]
    fn test_hidden_dir_pruned_by_default() {
        let compiled = FilterConfig::default().compile().unwrap();
        assert!(compiled.should_prune_dir(Path::new("/src/.git")));
        assert!(!compiled.should_prune_dir(Path::new("/src/app")));
    }

    #[test]
    fn test_exclude_exact_filename() {
        let compiled = config_with_exclude(ExcludeRules {
            filenames: vec!["Thumbs.db".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn test_exclude_extensions_case_insensitive() {
        let compiled = config_with_exclude(ExcludeRules {
            extensions: vec!["bak".to_string(), ".TMP".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("file.bak")));
        assert!(!compiled.should_include(Path::new("file.BAK")));
        assert!(!compiled.should_include(Path::new("file.tmp")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_bare_name_pattern_prunes_directory() {
        let compiled = config_with_exclude(ExcludeRules {
            patterns: vec!["node_modules".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(compiled.should_prune_dir(Path::new("/project/node_modules")));
        assert!(!compiled.should_prune_dir(Path::new("/project/my_node_modules")));
    }

    #[test]
    fn test_exclude_glob_patterns() {
        let compiled = config_with_exclude(ExcludeRules {
            patterns: vec!["*.cache".to_string(), "**/logs/**".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("file.cache")));
        assert!(!compiled.should_include(Path::new("app/logs/debug.log")));
        assert!(compiled.should_include(Path::new("app/my_logs/debug.log")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_exclude_prefix() {
        let compiled = config_with_exclude(ExcludeRules {
            prefixes: vec!["/mnt/archive".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("/mnt/archive/old.txt")));
        assert!(compiled.should_prune_dir(Path::new("/mnt/archive/2019")));
        assert!(compiled.should_include(Path::new("/mnt/data/new.txt")));
        // Prefix matching is component-wise, not string-wise.
        assert!(compiled.should_include(Path::new("/mnt/archives/new.txt")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = config_with_exclude(ExcludeRules {
            regex: vec![r"^~\$.*".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("~$report.docx")));
        assert!(compiled.should_include(Path::new("report.docx")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let config = FilterConfig {
            filters: FilterRules {
                enable_hidden_files: false,
                include: IncludeRules {
                    patterns: vec![".important".to_string()],
                },
                ..Default::default()
            },
            rules: Vec::new(),
        };
        let compiled = config.compile().unwrap();

        assert!(compiled.should_include(Path::new(".important")));
        assert!(!compiled.should_include(Path::new(".other")));
    }

    #[test]
    fn test_size_bounds() {
        let config = FilterConfig {
            filters: FilterRules {
                min_size: 10,
                max_size: Some(100),
                ..Default::default()
            },
            rules: Vec::new(),
        };
        let compiled = config.compile().unwrap();

        assert!(!compiled.size_in_bounds(5));
        assert!(compiled.size_in_bounds(10));
        assert!(compiled.size_in_bounds(100));
        assert!(!compiled.size_in_bounds(101));
    }

    #[test]
    fn test_add_exclude_patterns_merges() {
        let mut config = FilterConfig::default();
        config.add_exclude_patterns(["*.iso", "node_modules"]);
        let compiled = config.compile().unwrap();

        assert!(!compiled.should_include(Path::new("disc.iso")));
        assert!(compiled.should_prune_dir(Path::new("/p/node_modules")));
    }

    #[test]
    fn test_invalid_glob_pattern_returns_error() {
        let config = config_with_exclude(ExcludeRules {
            patterns: vec!["[invalid".to_string()],
            ..Default::default()
        });
        assert!(config.compile().is_err());
    }

    #[test]
    fn test_invalid_regex_returns_error() {
        let config = config_with_exclude(ExcludeRules {
            regex: vec!["[invalid(".to_string()],
            ..Default::default()
        });
        assert!(config.compile().is_err());
    }

    #[test]
    fn test_custom_rules_parse_from_toml() {
        let parsed: FilterConfig = toml::from_str(
            r#"
            [filters]
            enable_hidden_files = true

            [[rules]]
            category = "Ebooks"
            extensions = ["epub", "mobi"]
            "#,
        )
        .unwrap();

        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].category, "Ebooks");
        assert_eq!(parsed.rules[0].extensions, vec!["epub", "mobi"]);
    }
}
