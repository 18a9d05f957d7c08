//! dirsort - organize directory trees into a structured layout
//!
//! This library scans a directory, classifies every file by content and
//! extension, groups byte-identical duplicates, and relocates files into a
//! category (and optionally year) based layout. Runs can be simulated with a
//! dry run and reverted with the recorded undo log. Filtering rules and
//! custom categories are configured via TOML.

pub mod categorizer;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod model;
pub mod organizer;
pub mod output;
pub mod path_guard;
pub mod scanner;
pub mod undo;

pub use categorizer::Categorizer;
pub use config::{CompiledFilters, ConfigError, FilterConfig};
pub use duplicates::{DuplicateDetector, DuplicateStats};
pub use model::{
    CancelFlag, Category, DuplicateGroup, FileRecord, HashAlgorithm, OperationMode,
    OperationResult, OrganizationMode, OrganizationTask, OriginalPick,
};
pub use organizer::{Organizer, OrganizeError, Stage};
pub use path_guard::PathGuard;
pub use scanner::Scanner;
pub use undo::{UndoManager, UndoReport};
