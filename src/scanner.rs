//! Repository scanner: walks a source tree and turns eligible files into chunks.
//!
//! Filters are applied in this order, and a file is rejected by the first one
//! that matches:
//!
//! 1. a path segment is an excluded directory (VCS, build output, IDE, caches, generated code);
//! 2. the path follows a test-file convention ([`is_test_path`]);
//! 3. the extension is not in the language table ([`language_for`]);
//! 4. the relative path starts with none of the configured include prefixes;
//! 5. the file cannot be read, or has a NUL byte in its first 4096 bytes.
//!
//! Surviving files are decoded lossily and chunked with one id counter shared
//! across the whole scan.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::chunk::{chunk_lines, ChunkParams};
use crate::models::{Chunk, ChunkId};

/// Directory names that are never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "build",
    ".idea",
    ".vscode",
    ".gradle",
    ".mvn",
    "node_modules",
    "__pycache__",
    "generated",
];

/// File-name suffixes marking test sources. Matched case-sensitively so that
/// e.g. `Audit.java` is not mistaken for an `IT.java` integration test.
const TEST_FILE_SUFFIXES: &[&str] = &[
    "Test.java",
    "Tests.java",
    "IT.java",
    "Test.kt",
    "Tests.kt",
    "_test.py",
];

/// Supported extensions and the language tag recorded on their chunks.
const LANGUAGES: &[(&str, &str)] = &[
    ("java", "java"),
    ("kt", "kotlin"),
    ("py", "python"),
    ("yml", "yaml"),
    ("yaml", "yaml"),
    ("properties", "properties"),
    ("xml", "xml"),
    ("json", "json"),
    ("md", "markdown"),
    ("sql", "sql"),
    ("tf", "terraform"),
    ("tpl", "helm"),
];

/// Bytes inspected for the NUL-byte binary heuristic.
const BINARY_SNIFF_LEN: usize = 4096;

/// Language tag for a path's extension, if the extension is supported.
pub fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
}

/// Whether a repository path looks like test code: a `test` directory
/// segment, or a file name with a recognised test suffix.
pub fn is_test_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    if normalized
        .split('/')
        .any(|seg| seg.eq_ignore_ascii_case("test"))
    {
        return true;
    }
    let file_name = normalized.rsplit('/').next().unwrap_or("");
    TEST_FILE_SUFFIXES.iter().any(|s| file_name.ends_with(s))
        || (file_name.starts_with("test_") && file_name.ends_with(".py"))
}

fn matches_prefixes(rel_path: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| rel_path.starts_with(p.as_str()))
}

/// Repository-relative path with `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

/// Lazily yield candidate files under `root`: excluded directories are
/// pruned, test files and unsupported extensions are dropped. Prefix and
/// content checks happen in [`scan_repository`].
pub fn iter_repo_files(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e))
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(move |path| !is_test_path(&relative_path(root, path)))
        .filter(|path| language_for(path).is_some())
}

/// Summary of one repository scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Chunks of every indexed file, ids strictly increasing.
    pub chunks: Vec<Chunk>,
    /// Candidate files that passed the directory, test, and extension filters.
    pub files_seen: usize,
    pub files_indexed: usize,
    /// Candidates rejected by the prefix filter, read errors, or the binary check.
    pub files_skipped: usize,
}

/// Walk `root` and chunk every eligible file.
///
/// Unreadable and binary files are skipped; only a missing root is fatal.
pub fn scan_repository(
    root: &Path,
    include_prefixes: &[String],
    params: ChunkParams,
) -> Result<ScanReport> {
    if !root.is_dir() {
        bail!("Repository root does not exist: {}", root.display());
    }

    let mut report = ScanReport::default();
    let mut next_id: ChunkId = 1;

    for path in iter_repo_files(root) {
        report.files_seen += 1;
        let rel = relative_path(root, &path);

        if !matches_prefixes(&rel, include_prefixes) {
            report.files_skipped += 1;
            continue;
        }

        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(file = %rel, error = %e, "skipping unreadable file");
                report.files_skipped += 1;
                continue;
            }
        };

        if raw[..raw.len().min(BINARY_SNIFF_LEN)].contains(&0) {
            tracing::debug!(file = %rel, "skipping binary file");
            report.files_skipped += 1;
            continue;
        }

        let text = String::from_utf8_lossy(&raw);
        let language = language_for(&path).unwrap_or("text");
        let file_chunks = chunk_lines(&text, &rel, language, next_id, params);
        next_id += file_chunks.len() as ChunkId;

        report.files_indexed += 1;
        report.chunks.extend(file_chunks);
    }

    Ok(report)
}
