//! Import pipeline.
//!
//! Two entry points share the same shape (scan → read → extract → upsert →
//! relink):
//!
//! - [`Importer::import_repository`]: a topic-category knowledge repository
//!   into the **patterns** collection (files under `min_file_bytes` are noise).
//! - [`Importer::import_library`]: a library's documentation into
//!   **reference**, gated by the duplicate analyzer.
//!
//! Wiki-link relations are rebuilt after the whole batch is written, so links
//! to documents later in the same batch resolve.

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::duplicates::{DuplicateAnalyzer, DuplicateOf, DuplicateReport, ImportRecommendation};
use crate::metadata::{
    classify_doc_type, generate_summary, slugify, topic_tags, MetadataExtractor,
};
use crate::models::{word_count, Collection, PatternRecord, ReferenceRecord, TagSet};
use crate::progress::{ImportProgressEvent, ImportProgressReporter};
use crate::scan::{read_all, scan_markdown, LoadedFile};
use crate::store::KnowledgeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    PartialSuccess,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "success",
            ImportStatus::PartialSuccess => "partial_success",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub target: String,
    pub collection: Collection,
    pub scanned: usize,
    pub imported: usize,
    pub skipped_small: Vec<String>,
    pub skipped_duplicates: Vec<String>,
    pub unreadable: Vec<String>,
    pub relations: usize,
    pub status: ImportStatus,
}

impl ImportSummary {
    fn new(target: &str, collection: Collection) -> Self {
        Self {
            target: target.to_string(),
            collection,
            scanned: 0,
            imported: 0,
            skipped_small: Vec::new(),
            skipped_duplicates: Vec::new(),
            unreadable: Vec::new(),
            relations: 0,
            status: ImportStatus::Success,
        }
    }

    fn finish(mut self) -> Self {
        if !self.unreadable.is_empty() {
            self.status = ImportStatus::PartialSuccess;
        }
        self
    }

    pub fn print(&self) {
        println!("import {} -> {}", self.target, self.collection);
        println!("  scanned: {} files", self.scanned);
        println!("  upserted documents: {}", self.imported);
        if !self.skipped_small.is_empty() {
            println!("  skipped (too small): {}", self.skipped_small.len());
        }
        if !self.skipped_duplicates.is_empty() {
            println!("  skipped (duplicates): {}", self.skipped_duplicates.len());
        }
        for file in &self.unreadable {
            println!("  unreadable: {}", file);
        }
        println!("  relations: {}", self.relations);
        println!("status: {}", self.status.as_str());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryImportOptions {
    /// Bypass the duplicate analyzer entirely.
    pub skip_check: bool,
    /// Proceed even when uniqueness is in the confirmation band.
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LibraryImportOutcome {
    Imported {
        summary: ImportSummary,
        analysis: Option<DuplicateReport>,
    },
    NeedsConfirmation {
        analysis: DuplicateReport,
    },
    PathNotFound {
        path: PathBuf,
    },
}

pub struct Importer<'a> {
    config: &'a Config,
    store: &'a KnowledgeStore,
    progress: &'a dyn ImportProgressReporter,
    extractor: MetadataExtractor,
}

impl<'a> Importer<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a KnowledgeStore,
        progress: &'a dyn ImportProgressReporter,
    ) -> Result<Self> {
        Ok(Self {
            config,
            store,
            progress,
            extractor: MetadataExtractor::new()?,
        })
    }

    // ============ Knowledge repository → patterns ============

    pub async fn import_repository(&self, root: &Path) -> Result<ImportSummary> {
        let target = root.display().to_string();
        let mut summary = ImportSummary::new(&target, Collection::Patterns);

        self.progress.report(ImportProgressEvent::Discovering {
            target: target.clone(),
        });
        let files = scan_markdown(root, &self.config.import)?;
        summary.scanned = files.len();

        let min_bytes = self.config.import.min_file_bytes;
        let (large, small): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.size >= min_bytes);
        summary.skipped_small = small.into_iter().map(|f| f.relative_path).collect();

        let (loaded, unreadable) = read_all(large);
        summary.unreadable = unreadable.into_iter().map(|s| s.relative_path).collect();

        let total = loaded.len() as u64;
        let mut written = Vec::with_capacity(loaded.len());
        for (i, file) in loaded.iter().enumerate() {
            let record = self.pattern_from_file(file);
            self.store.upsert_pattern(&record).await?;
            written.push((record.id, file.content.clone()));
            self.progress.report(ImportProgressEvent::Importing {
                target: target.clone(),
                n: i as u64 + 1,
                total,
            });
        }
        summary.imported = written.len();
        summary.relations = self.rebuild_relations(Collection::Patterns, &written).await?;

        tracing::info!(root = %target, imported = summary.imported, "repository import complete");
        Ok(summary.finish())
    }

    /// Whole-collection update: clear patterns, then reimport the repository.
    pub async fn update_repository(&self, root: &Path) -> Result<(u64, ImportSummary)> {
        // Scan first so a bad root fails before anything is cleared.
        scan_markdown(root, &self.config.import)?;
        let removed = self.store.clear_patterns().await?;
        tracing::info!(removed, "patterns collection cleared");
        let summary = self.import_repository(root).await?;
        Ok((removed, summary))
    }

    fn pattern_from_file(&self, file: &LoadedFile) -> PatternRecord {
        let meta = self.extractor.extract(&file.content, &file.file.file_name());
        let id = file
            .file
            .relative_path
            .strip_suffix(".md")
            .unwrap_or(&file.file.relative_path)
            .to_string();

        PatternRecord {
            id,
            summary: generate_summary(&meta.title, &file.content),
            title: meta.title,
            content: file.content.clone(),
            folder: meta.category,
            library: None,
            pattern_type: None,
            source_path: Some(file.file.relative_path.clone()),
            tags: meta.tags,
            word_count: word_count(&file.content),
            created_at: 0,
            updated_at: 0,
        }
    }

    // ============ Library documentation → reference ============

    pub async fn import_library(
        &self,
        dir: &Path,
        library: &str,
        options: LibraryImportOptions,
    ) -> Result<LibraryImportOutcome> {
        if !dir.is_dir() {
            return Ok(LibraryImportOutcome::PathNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut summary = ImportSummary::new(library, Collection::Reference);
        self.progress.report(ImportProgressEvent::Discovering {
            target: library.to_string(),
        });

        let files = scan_markdown(dir, &self.config.import)?;
        summary.scanned = files.len();
        let (loaded, unreadable) = read_all(files);
        summary.unreadable = unreadable.into_iter().map(|s| s.relative_path).collect();

        let analysis = if options.skip_check {
            None
        } else {
            let analyzer = DuplicateAnalyzer::new(self.store, &self.config.duplicates)?;
            Some(analyzer.analyze_files(&loaded, library).await?)
        };

        if let Some(report) = &analysis {
            let needs_confirmation =
                report.uniqueness.recommendation == ImportRecommendation::ConfirmRequired;
            if needs_confirmation && report.total_files > 0 && !options.confirmed {
                return Ok(LibraryImportOutcome::NeedsConfirmation {
                    analysis: report.clone(),
                });
            }
        }

        let skip: Vec<String> = analysis
            .as_ref()
            .map(|report| {
                report
                    .exact_duplicates
                    .iter()
                    .filter(|dup| match &dup.matches {
                        DuplicateOf::Batch { .. } => true,
                        DuplicateOf::Existing { id, .. } => {
                            *id != reference_id(library, &dup.file)
                        }
                    })
                    .map(|dup| dup.file.clone())
                    .collect()
            })
            .unwrap_or_default();

        let to_import: Vec<&LoadedFile> = loaded
            .iter()
            .filter(|f| !skip.contains(&f.file.relative_path))
            .collect();
        summary.skipped_duplicates = skip;

        let total = to_import.len() as u64;
        let mut written = Vec::with_capacity(to_import.len());
        for (i, file) in to_import.into_iter().enumerate() {
            let record = self.reference_from_file(file, library);
            self.store.upsert_reference(&record).await?;
            written.push((record.id, file.content.clone()));
            self.progress.report(ImportProgressEvent::Importing {
                target: library.to_string(),
                n: i as u64 + 1,
                total,
            });
        }
        summary.imported = written.len();
        summary.relations = self.rebuild_relations(Collection::Reference, &written).await?;

        tracing::info!(library, imported = summary.imported, "library import complete");
        Ok(LibraryImportOutcome::Imported {
            summary: summary.finish(),
            analysis,
        })
    }

    fn reference_from_file(&self, file: &LoadedFile, library: &str) -> ReferenceRecord {
        let meta = self.extractor.extract(&file.content, &file.file.file_name());
        let folder_path = folder_path_of(&file.file.relative_path);
        let doc_type = classify_doc_type(&folder_path, &file.content);

        let mut tags: TagSet = [library.to_lowercase(), doc_type.as_str().to_string()]
            .into_iter()
            .collect();
        tags.extend(topic_tags(&file.content));
        tags.extend(meta.tags);

        ReferenceRecord {
            id: reference_id(library, &file.file.relative_path),
            summary: generate_summary(&meta.title, &file.content),
            title: meta.title,
            content: file.content.clone(),
            folder_path,
            doc_type,
            library: library.to_string(),
            file_path: file.file.relative_path.clone(),
            word_count: word_count(&file.content),
            tags,
            created_at: 0,
            updated_at: 0,
        }
    }

    // ============ Relations ============

    async fn rebuild_relations(
        &self,
        collection: Collection,
        written: &[(String, String)],
    ) -> Result<usize> {
        let mut total = 0;
        for (id, content) in written {
            let mut targets = Vec::new();
            for link in self.extractor.wiki_links(content) {
                match self.store.find_id_by_title(collection, &link, id).await? {
                    Some(target) if !targets.contains(&target) => targets.push(target),
                    Some(_) => {}
                    None => tracing::debug!(source = %id, link = %link, "unresolved wiki link"),
                }
            }
            total += self.store.replace_relations(id, &targets).await?;
        }
        Ok(total)
    }
}

/// `{library}_{stem}_{8 hex}`; stable across reimports.
///
/// The hash covers the raw library name and the relative path, so libraries
/// whose names slugify alike still get distinct ids.
pub fn reference_id(library: &str, relative_path: &str) -> String {
    let stem = Path::new(relative_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(library.as_bytes());
    hasher.update([0u8]);
    hasher.update(relative_path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}_{}_{}", slugify(library), slugify(&stem), &digest[..8])
}

/// Parent directory of a relative path, or `root`.
pub fn folder_path_of(relative_path: &str) -> String {
    match relative_path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => "root".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_id_is_stable_and_path_scoped() {
        let a = reference_id("SQLiteData", "Articles/Fetching.md");
        assert_eq!(a, reference_id("SQLiteData", "Articles/Fetching.md"));
        assert!(a.starts_with("sqlitedata_fetching_"));
        assert_ne!(a, reference_id("SQLiteData", "Extensions/Fetching.md"));
    }

    #[test]
    fn test_reference_id_distinguishes_libraries_with_same_slug() {
        let spaced = reference_id("Swift Sharing", "intro.md");
        let dashed = reference_id("swift-sharing", "intro.md");
        assert!(spaced.starts_with("swift-sharing_intro_"));
        assert!(dashed.starts_with("swift-sharing_intro_"));
        assert_ne!(spaced, dashed);
    }

    #[test]
    fn test_folder_path_of() {
        assert_eq!(folder_path_of("Articles/Basics/intro.md"), "Articles/Basics");
        assert_eq!(folder_path_of("intro.md"), "root");
    }
}
