//! Glob Expansion
//!
//! Expands doublestar patterns against the spokfile directory: `*` matches
//! within a single path segment, `**` matches zero or more segments.
//! Directories whose basename begins with '.' are never descended into.
//! Results are absolute paths in a stable traversal order: within each
//! directory, files sorted by name come first, then subdirectories are
//! visited in sorted order.

use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GlobError {
    #[error("Invalid glob pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Could not read {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Expand `pattern` relative to `root`, returning matching files as
/// absolute paths.
pub fn expand(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, GlobError> {
    let trimmed = pattern.strip_prefix("./").unwrap_or(pattern);
    let bad_pattern = |source| GlobError::BadPattern {
        pattern: pattern.to_string(),
        source,
    };

    let mut matchers = vec![Pattern::new(trimmed).map_err(bad_pattern)?];
    // a leading `**/` also matches zero segments
    if let Some(rest) = trimmed.strip_prefix("**/") {
        matchers.push(Pattern::new(rest).map_err(bad_pattern)?);
    }

    // literal separators give `*` single-segment and `**` multi-segment
    // semantics
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::default()
    };
    let mut matches = Vec::new();
    walk(root, root, &matchers, options, &mut matches)?;
    Ok(matches)
}

fn walk(
    root: &Path,
    dir: &Path,
    matchers: &[Pattern],
    options: MatchOptions,
    matches: &mut Vec<PathBuf>,
) -> Result<(), GlobError> {
    let entries = read_sorted(dir)?;

    for path in entries.iter().filter(|p| !p.is_dir()) {
        let rel = path.strip_prefix(root).unwrap_or(path);
        if matchers.iter().any(|m| m.matches_path_with(rel, options)) {
            matches.push(path.clone());
        }
    }
    for path in entries.iter().filter(|p| p.is_dir()) {
        if is_hidden(path) {
            continue;
        }
        walk(root, path, matchers, options, matches)?;
    }
    Ok(())
}

fn read_sorted(dir: &Path) -> Result<Vec<PathBuf>, GlobError> {
    let iter = std::fs::read_dir(dir).map_err(|source| GlobError::Walk {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for entry in iter {
        let entry = entry.map_err(|source| GlobError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
