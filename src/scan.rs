//! Markdown discovery for import and duplicate analysis.
//!
//! Walks a directory, applies include/exclude globs against the relative
//! path, and reads files. A file that cannot be read is logged and reported
//! as skipped; it never aborts the batch.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ImportConfig;

#[derive(Debug, Clone)]
pub struct MarkdownFile {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    pub size: u64,
}

impl MarkdownFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub file: MarkdownFile,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub relative_path: String,
    pub reason: String,
}

/// Matching files under `root`, sorted by relative path.
pub fn scan_markdown(root: &Path, import: &ImportConfig) -> Result<Vec<MarkdownFile>> {
    if !root.is_dir() {
        bail!("import root is not a directory: {}", root.display());
    }

    let include_set = build_globset(&import.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(import.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(import.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(MarkdownFile {
            path: path.to_path_buf(),
            relative_path: rel_str,
            size,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Read every file as UTF-8, separating failures out.
pub fn read_all(files: Vec<MarkdownFile>) -> (Vec<LoadedFile>, Vec<SkippedFile>) {
    let mut loaded = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();

    for file in files {
        match std::fs::read_to_string(&file.path) {
            Ok(content) => loaded.push(LoadedFile { file, content }),
            Err(e) => {
                tracing::warn!(file = %file.relative_path, error = %e, "skipping unreadable file");
                skipped.push(SkippedFile {
                    relative_path: file.relative_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    (loaded, skipped)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
