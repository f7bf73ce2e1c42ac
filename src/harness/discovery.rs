//! Scenario file discovery and execution order.
//!
//! Each suite kind owns one subtree of the data root. Discovery walks it
//! recursively, keeps `*.json` files (optionally only those named in an
//! allow-list), digests them, and sorts them by [`alphanumeric_cmp`].

#![allow(missing_docs)]

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::errors::{IshError, Result};

// ──────────────────── suite kinds ────────────────────

/// The three scenario suites, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum SuiteKind {
    Search,
    SearchRules,
    Duplicates,
}

impl SuiteKind {
    pub const ALL: [Self; 3] = [Self::Search, Self::SearchRules, Self::Duplicates];

    /// Subdirectory of the data root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SearchRules => "searchRules",
            Self::Duplicates => "duplicates",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SearchRules => "search-rules",
            Self::Duplicates => "duplicates",
        }
    }

    /// Whether per-attribute `searchType` overrides the key default.
    #[must_use]
    pub const fn honors_search_type(self) -> bool {
        matches!(self, Self::SearchRules)
    }

    #[must_use]
    pub fn root(self, data_root: &Path) -> PathBuf {
        data_root.join(self.dir_name())
    }
}

impl std::fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ──────────────────── ordering ────────────────────

/// Numeric sort key of a name: every character except ASCII digits and dots
/// is removed and the rest parsed as a number; 0 when nothing parses.
///
/// `"12 - search.json"` → 12, `"1.2.json"` → 0 (`"1.2."` does not parse).
#[must_use]
pub fn numeric_key(name: &str) -> f64 {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    kept.parse::<f64>().unwrap_or(0.0)
}

/// Numeric key first, then plain lexicographic order.
#[must_use]
pub fn alphanumeric_cmp(a: &str, b: &str) -> Ordering {
    numeric_key(a).total_cmp(&numeric_key(b)).then_with(|| a.cmp(b))
}

// ──────────────────── discovery ────────────────────

/// One scenario file selected for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioFile {
    pub path: PathBuf,
    pub file_name: String,
    /// SHA-256 of the file bytes, lowercase hex.
    pub digest: String,
}

impl ScenarioFile {
    fn read(path: PathBuf) -> Result<Self> {
        let bytes = fs::read(&path).map_err(|source| IshError::io(&path, source))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            digest: format!("{:x}", hasher.finalize()),
            file_name,
            path,
        })
    }
}

/// List the scenario files of `suite` under `data_root` in execution order.
///
/// A non-empty `allow_list` keeps only files whose name it contains.
pub fn discover(data_root: &Path, suite: SuiteKind, allow_list: &[String]) -> Result<Vec<ScenarioFile>> {
    let root = suite.root(data_root);
    if !root.is_dir() {
        return Err(IshError::MissingScenarioDir { path: root });
    }
    let mut paths = Vec::new();
    walk_json(&root, &mut paths)?;

    let mut files = paths
        .into_iter()
        .filter(|path| {
            allow_list.is_empty()
                || path
                    .file_name()
                    .is_some_and(|n| allow_list.iter().any(|a| n.to_string_lossy() == a.as_str()))
        })
        .map(ScenarioFile::read)
        .collect::<Result<Vec<_>>>()?;

    files.sort_by(|a, b| {
        alphanumeric_cmp(&a.file_name, &b.file_name).then_with(|| a.path.cmp(&b.path))
    });
    Ok(files)
}

fn walk_json(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|source| IshError::io(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| IshError::io(dir, source))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|source| IshError::io(&path, source))?;
        if file_type.is_dir() {
            walk_json(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}
