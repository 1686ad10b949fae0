//! Duplicate and uniqueness analysis of a candidate import batch.
//!
//! Four independent passes over the batch, unioned into one
//! [`DuplicateReport`]:
//!
//! | Pass | Rule |
//! |------|------|
//! | exact duplicates | whitespace-normalized content hash equals an existing reference record or an earlier file in the batch |
//! | topic overlap | `0.4 × tag overlap + 0.6 × content-word overlap` against a sample of each existing library |
//! | version conflicts | same kind of title, strictly higher `major.minor` than an existing title of the target library |
//! | library conflicts | the candidate scores highest against a different library than the declared one |
//!
//! The uniqueness percentage drives an [`ImportRecommendation`] band.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::{DuplicateConfig, ImportConfig};
use crate::metadata::{topic_tags, MetadataExtractor};
use crate::models::{ReferenceRecord, TagSet};
use crate::scan::{read_all, scan_markdown, LoadedFile};
use crate::store::KnowledgeStore;

const TAG_WEIGHT: f64 = 0.4;
const CONTENT_WEIGHT: f64 = 0.6;
const MIN_SIGNIFICANT_WORD: usize = 4;

// ============ Result types ============

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DuplicateCheck {
    PathNotFound { path: PathBuf },
    Analyzed(DuplicateReport),
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub library: String,
    pub total_files: usize,
    pub unreadable_files: Vec<String>,
    pub exact_duplicates: Vec<ExactDuplicate>,
    pub topic_overlaps: Vec<TopicOverlap>,
    pub version_conflicts: Vec<VersionConflict>,
    pub library_conflicts: Vec<LibraryConflict>,
    pub uniqueness: UniquenessReport,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExactDuplicate {
    pub file: String,
    pub content_hash: String,
    pub matches: DuplicateOf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateOf {
    Existing {
        id: String,
        title: String,
        library: String,
    },
    Batch {
        file: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicOverlap {
    pub file: String,
    pub library: String,
    pub score: f64,
    pub common_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionConflict {
    pub file: String,
    pub new_title: String,
    pub new_version: String,
    pub existing_id: String,
    pub existing_title: String,
    pub existing_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryConflict {
    pub file: String,
    pub declared_library: String,
    pub declared_score: f64,
    pub suggested_library: String,
    pub suggested_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UniquenessReport {
    pub total_files: usize,
    pub unique_files: usize,
    pub uniqueness_percentage: f64,
    pub recommendation: ImportRecommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportRecommendation {
    /// Below 30%: warn and require explicit confirmation.
    ConfirmRequired,
    /// 30% to 80%: import, with a note about overlap.
    ImportWithNote,
    /// Above 80%.
    StronglyRecommended,
}

impl ImportRecommendation {
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage < 30.0 {
            ImportRecommendation::ConfirmRequired
        } else if percentage <= 80.0 {
            ImportRecommendation::ImportWithNote
        } else {
            ImportRecommendation::StronglyRecommended
        }
    }
}

impl ImportRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportRecommendation::ConfirmRequired => "confirm_required",
            ImportRecommendation::ImportWithNote => "import_with_note",
            ImportRecommendation::StronglyRecommended => "strongly_recommended",
        }
    }
}

impl DuplicateReport {
    pub fn print(&self) {
        println!("duplicate check {}", self.library);
        println!("  files: {}", self.total_files);
        for file in &self.unreadable_files {
            println!("  unreadable: {}", file);
        }

        println!("  exact duplicates: {}", self.exact_duplicates.len());
        for dup in &self.exact_duplicates {
            match &dup.matches {
                DuplicateOf::Existing { id, library, .. } => {
                    println!("    {} == {} ({})", dup.file, id, library)
                }
                DuplicateOf::Batch { file } => {
                    println!("    {} == {} (same batch)", dup.file, file)
                }
            }
        }

        println!("  topic overlaps: {}", self.topic_overlaps.len());
        for overlap in &self.topic_overlaps {
            println!(
                "    {} ~ {} ({:.2}) [{}]",
                overlap.file,
                overlap.library,
                overlap.score,
                overlap.common_tags.join(", ")
            );
        }

        println!("  version conflicts: {}", self.version_conflicts.len());
        for conflict in &self.version_conflicts {
            println!(
                "    {} {} > {} {}",
                conflict.file, conflict.new_version, conflict.existing_id, conflict.existing_version
            );
        }

        println!("  library conflicts: {}", self.library_conflicts.len());
        for conflict in &self.library_conflicts {
            println!(
                "    {} looks like {} ({:.2}) rather than {} ({:.2})",
                conflict.file,
                conflict.suggested_library,
                conflict.suggested_score,
                conflict.declared_library,
                conflict.declared_score
            );
        }

        println!(
            "  uniqueness: {} / {} files ({:.1}%)",
            self.uniqueness.unique_files,
            self.uniqueness.total_files,
            self.uniqueness.uniqueness_percentage
        );
        println!("  recommendation: {}", self.uniqueness.recommendation.as_str());
        for rec in &self.recommendations {
            println!("  - {}", rec);
        }
    }
}

impl UniquenessReport {
    pub fn new(total_files: usize, redundant_files: usize) -> Self {
        let unique_files = total_files.saturating_sub(redundant_files);
        let uniqueness_percentage = if total_files == 0 {
            0.0
        } else {
            unique_files as f64 / total_files as f64 * 100.0
        };
        Self {
            total_files,
            unique_files,
            uniqueness_percentage,
            recommendation: ImportRecommendation::for_percentage(uniqueness_percentage),
        }
    }
}

// ============ Candidates and samples ============

#[derive(Debug, Clone)]
struct Candidate {
    file: String,
    title: String,
    tags: TagSet,
    words: HashSet<String>,
    hash: String,
}

/// Tags and per-document word sets sampled from one existing library.
#[derive(Debug, Clone)]
pub struct LibrarySample {
    pub library: String,
    pub tags: TagSet,
    pub documents: Vec<HashSet<String>>,
}

impl LibrarySample {
    pub fn from_records(library: &str, records: &[ReferenceRecord]) -> Self {
        Self {
            library: library.to_string(),
            tags: records.iter().flat_map(|r| r.tags.iter().cloned()).collect(),
            documents: records
                .iter()
                .map(|r| significant_words(&r.content))
                .collect(),
        }
    }
}

/// Collapse whitespace runs, trim, and hash. First 16 hex chars of SHA-256.
pub fn content_hash(content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

pub fn significant_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() >= MIN_SIGNIFICANT_WORD)
        .map(str::to_string)
        .collect()
}

/// Weighted tag + content overlap against one library sample, in `[0, 1]`.
pub fn overlap_score(
    tags: &TagSet,
    words: &HashSet<String>,
    sample: &LibrarySample,
) -> (f64, Vec<String>) {
    let common_tags: Vec<String> = tags.intersection(&sample.tags).cloned().collect();
    let tag_fraction = if tags.is_empty() {
        0.0
    } else {
        common_tags.len() as f64 / tags.len() as f64
    };

    let content_fraction = if words.is_empty() || sample.documents.is_empty() {
        0.0
    } else {
        let total: f64 = sample
            .documents
            .iter()
            .map(|doc| words.intersection(doc).count() as f64 / words.len() as f64)
            .sum();
        total / sample.documents.len() as f64
    };

    (
        TAG_WEIGHT * tag_fraction + CONTENT_WEIGHT * content_fraction,
        common_tags,
    )
}

/// Two titles describe the same kind of document.
pub fn same_content_type(a: &str, b: &str) -> bool {
    let words = |t: &str| -> HashSet<String> {
        t.to_lowercase()
            .replace('-', " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    };
    let wa = words(a);
    let wb = words(b);
    let common = wa.intersection(&wb).count();
    let shorter = wa.len().min(wb.len());
    common >= 3 || (shorter > 0 && common as f64 / shorter as f64 > 0.5)
}

// ============ Analyzer ============

pub struct DuplicateAnalyzer<'a> {
    store: &'a KnowledgeStore,
    config: &'a DuplicateConfig,
    extractor: MetadataExtractor,
    version: Regex,
}

impl<'a> DuplicateAnalyzer<'a> {
    pub fn new(store: &'a KnowledgeStore, config: &'a DuplicateConfig) -> Result<Self> {
        Ok(Self {
            store,
            config,
            extractor: MetadataExtractor::new()?,
            version: Regex::new(r"\b(\d+)\.(\d+)\b")?,
        })
    }

    /// Analyze a directory. A missing directory is a result, not an error.
    pub async fn analyze_dir(
        &self,
        dir: &Path,
        library: &str,
        import: &ImportConfig,
    ) -> Result<DuplicateCheck> {
        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "duplicate check: path not found");
            return Ok(DuplicateCheck::PathNotFound {
                path: dir.to_path_buf(),
            });
        }

        let files = scan_markdown(dir, import)?;
        let (loaded, skipped) = read_all(files);
        let mut report = self.analyze_files(&loaded, library).await?;
        report.unreadable_files = skipped.into_iter().map(|s| s.relative_path).collect();
        Ok(DuplicateCheck::Analyzed(report))
    }

    pub async fn analyze_files(&self, files: &[LoadedFile], library: &str) -> Result<DuplicateReport> {
        let candidates: Vec<Candidate> = files
            .iter()
            .map(|f| {
                let meta = self.extractor.extract(&f.content, &f.file.file_name());
                Candidate {
                    file: f.file.relative_path.clone(),
                    title: meta.title,
                    tags: topic_tags(&f.content),
                    words: significant_words(&f.content),
                    hash: content_hash(&f.content),
                }
            })
            .collect();

        let existing = self.store.all_reference().await?;
        let exact_duplicates = find_exact_duplicates(&candidates, &existing);

        let mut samples = Vec::new();
        for lib in self.store.reference_libraries().await? {
            let records = self
                .store
                .sample_reference(&lib, self.config.sample_size)
                .await?;
            samples.push(LibrarySample::from_records(&lib, &records));
        }

        let mut topic_overlaps = Vec::new();
        let mut library_conflicts = Vec::new();
        let mut redundant: BTreeSet<String> = exact_duplicates.iter().map(|d| d.file.clone()).collect();

        for candidate in &candidates {
            let scores: Vec<(String, f64, Vec<String>)> = samples
                .iter()
                .map(|s| {
                    let (score, common) = overlap_score(&candidate.tags, &candidate.words, s);
                    (s.library.clone(), score, common)
                })
                .collect();

            for (lib, score, common) in &scores {
                if *score > self.config.report_threshold {
                    topic_overlaps.push(TopicOverlap {
                        file: candidate.file.clone(),
                        library: lib.clone(),
                        score: *score,
                        common_tags: common.clone(),
                    });
                }
            }

            let best = scores
                .iter()
                .map(|(_, score, _)| *score)
                .fold(0.0_f64, f64::max);
            if best > self.config.redundant_threshold {
                redundant.insert(candidate.file.clone());
            }

            if let Some(conflict) = library_conflict(
                &candidate.file,
                library,
                &scores,
                self.config.library_conflict_threshold,
            ) {
                library_conflicts.push(conflict);
            }
        }

        let existing_titles = self.store.reference_titles_like(library).await?;
        let version_conflicts = self.find_version_conflicts(&candidates, &existing_titles);

        let uniqueness = UniquenessReport::new(candidates.len(), redundant.len());
        let recommendations = recommendations(
            &uniqueness,
            exact_duplicates.len(),
            topic_overlaps.len(),
            version_conflicts.len(),
            library_conflicts.len(),
        );

        tracing::info!(
            library,
            total = candidates.len(),
            unique = uniqueness.unique_files,
            "duplicate analysis complete"
        );

        Ok(DuplicateReport {
            library: library.to_string(),
            total_files: candidates.len(),
            unreadable_files: Vec::new(),
            exact_duplicates,
            topic_overlaps,
            version_conflicts,
            library_conflicts,
            uniqueness,
            recommendations,
        })
    }

    fn version_of(&self, title: &str) -> Option<(u32, u32, String)> {
        let caps = self.version.captures(title)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        Some((major, minor, caps.get(0)?.as_str().to_string()))
    }

    fn find_version_conflicts(
        &self,
        candidates: &[Candidate],
        existing_titles: &[(String, String)],
    ) -> Vec<VersionConflict> {
        let mut conflicts = Vec::new();
        for candidate in candidates {
            let Some((new_major, new_minor, new_version)) = self.version_of(&candidate.title)
            else {
                continue;
            };
            for (id, title) in existing_titles {
                let Some((old_major, old_minor, old_version)) = self.version_of(title) else {
                    continue;
                };
                if same_content_type(&candidate.title, title)
                    && (new_major, new_minor) > (old_major, old_minor)
                {
                    conflicts.push(VersionConflict {
                        file: candidate.file.clone(),
                        new_title: candidate.title.clone(),
                        new_version: new_version.clone(),
                        existing_id: id.clone(),
                        existing_title: title.clone(),
                        existing_version: old_version,
                    });
                }
            }
        }
        conflicts
    }
}

fn find_exact_duplicates(candidates: &[Candidate], existing: &[ReferenceRecord]) -> Vec<ExactDuplicate> {
    let mut existing_by_hash: HashMap<String, &ReferenceRecord> = HashMap::new();
    for record in existing {
        existing_by_hash
            .entry(content_hash(&record.content))
            .or_insert(record);
    }

    let mut seen_in_batch: HashMap<&str, &str> = HashMap::new();
    let mut duplicates = Vec::new();

    for candidate in candidates {
        if let Some(record) = existing_by_hash.get(&candidate.hash) {
            duplicates.push(ExactDuplicate {
                file: candidate.file.clone(),
                content_hash: candidate.hash.clone(),
                matches: DuplicateOf::Existing {
                    id: record.id.clone(),
                    title: record.title.clone(),
                    library: record.library.clone(),
                },
            });
        } else if let Some(first) = seen_in_batch.get(candidate.hash.as_str()) {
            duplicates.push(ExactDuplicate {
                file: candidate.file.clone(),
                content_hash: candidate.hash.clone(),
                matches: DuplicateOf::Batch {
                    file: first.to_string(),
                },
            });
        } else {
            seen_in_batch.insert(&candidate.hash, &candidate.file);
        }
    }

    duplicates
}

/// Flag a candidate whose best-scoring library is not the declared one.
fn library_conflict(
    file: &str,
    declared: &str,
    scores: &[(String, f64, Vec<String>)],
    threshold: f64,
) -> Option<LibraryConflict> {
    let declared_score = scores
        .iter()
        .find(|(lib, _, _)| lib == declared)
        .map(|(_, score, _)| *score)
        .unwrap_or(0.0);

    let (best_lib, best_score, _) = scores
        .iter()
        .filter(|(lib, _, _)| lib != declared)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    if *best_score > threshold && *best_score > declared_score {
        Some(LibraryConflict {
            file: file.to_string(),
            declared_library: declared.to_string(),
            declared_score,
            suggested_library: best_lib.clone(),
            suggested_score: *best_score,
        })
    } else {
        None
    }
}

fn recommendations(
    uniqueness: &UniquenessReport,
    exact: usize,
    overlaps: usize,
    versions: usize,
    conflicts: usize,
) -> Vec<String> {
    let mut out = Vec::new();
    if exact > 0 {
        out.push(format!(
            "{} file(s) duplicate content already present and will be skipped on import",
            exact
        ));
    }
    if overlaps > 0 {
        out.push(format!(
            "{} topic overlap(s) with existing libraries; review before importing",
            overlaps
        ));
    }
    if versions > 0 {
        out.push(format!(
            "{} file(s) look like newer versions of existing documents; consider retiring the older ones",
            versions
        ));
    }
    if conflicts > 0 {
        out.push(format!(
            "{} file(s) read as if they belong to another library",
            conflicts
        ));
    }

    let pct = uniqueness.uniqueness_percentage;
    out.push(match uniqueness.recommendation {
        ImportRecommendation::ConfirmRequired => format!(
            "Low uniqueness ({:.1}%): most of this batch is already covered; explicit confirmation required",
            pct
        ),
        ImportRecommendation::ImportWithNote => format!(
            "Moderate uniqueness ({:.1}%): import recommended, expect some overlap",
            pct
        ),
        ImportRecommendation::StronglyRecommended => format!(
            "High uniqueness ({:.1}%): import strongly recommended",
            pct
        ),
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> TagSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn candidate(file: &str, content: &str) -> Candidate {
        Candidate {
            file: file.to_string(),
            title: file.to_string(),
            tags: topic_tags(content),
            words: significant_words(content),
            hash: content_hash(content),
        }
    }

    #[test]
    fn test_hash_ignores_whitespace_layout() {
        let a = "# Title\n\nSome   body text.\n";
        let b = "  # Title\nSome body text.   \n\n\n";
        assert_eq!(content_hash(a), content_hash(b));
        assert_ne!(content_hash(a), content_hash("# Title\nOther body."));
        assert_eq!(content_hash(a).len(), 16);
    }

    #[test]
    fn test_batch_duplicates_pair_first_occurrence() {
        let batch = vec![
            candidate("a.md", "same text here"),
            candidate("b.md", "same   text\nhere\n"),
            candidate("c.md", "unique sqlite text"),
        ];
        let dups = find_exact_duplicates(&batch, &[]);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].file, "b.md");
        assert_eq!(
            dups[0].matches,
            DuplicateOf::Batch {
                file: "a.md".to_string()
            }
        );
    }

    #[test]
    fn test_uniqueness_bounds() {
        let empty = UniquenessReport::new(0, 0);
        assert_eq!(empty.uniqueness_percentage, 0.0);
        assert_eq!(empty.recommendation, ImportRecommendation::ConfirmRequired);

        let report = UniquenessReport::new(3, 1);
        assert_eq!(report.unique_files, 2);
        assert!((report.uniqueness_percentage - 66.666).abs() < 0.01);
        assert_eq!(report.recommendation, ImportRecommendation::ImportWithNote);

        let clamped = UniquenessReport::new(2, 5);
        assert_eq!(clamped.unique_files, 0);
        assert!(clamped.uniqueness_percentage >= 0.0);
    }

    #[test]
    fn test_recommendation_bands() {
        assert_eq!(
            ImportRecommendation::for_percentage(29.9),
            ImportRecommendation::ConfirmRequired
        );
        assert_eq!(
            ImportRecommendation::for_percentage(30.0),
            ImportRecommendation::ImportWithNote
        );
        assert_eq!(
            ImportRecommendation::for_percentage(80.0),
            ImportRecommendation::ImportWithNote
        );
        assert_eq!(
            ImportRecommendation::for_percentage(80.1),
            ImportRecommendation::StronglyRecommended
        );
    }

    #[test]
    fn test_overlap_score_weights() {
        let sample = LibrarySample {
            library: "Lib".to_string(),
            tags: tags(&["sqlite", "swift"]),
            documents: vec![significant_words("query rows from table")],
        };
        let words = significant_words("query rows");
        let (score, common) = overlap_score(&tags(&["sqlite", "grdb"]), &words, &sample);
        // 0.4 * 1/2 + 0.6 * 2/2
        assert!((score - 0.8).abs() < 1e-9);
        assert_eq!(common, vec!["sqlite".to_string()]);
    }

    #[test]
    fn test_overlap_score_empty_inputs() {
        let sample = LibrarySample {
            library: "Lib".to_string(),
            tags: TagSet::new(),
            documents: Vec::new(),
        };
        let (score, _) = overlap_score(&TagSet::new(), &HashSet::new(), &sample);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_same_content_type() {
        assert!(same_content_type(
            "Migrating to 1.5",
            "Migrating to 1.4"
        ));
        assert!(same_content_type(
            "SQLite data sync guide v2.0",
            "sqlite-data sync guide v1.0 extras more words"
        ));
        assert!(!same_content_type("Migrating to 1.5", "Testing reducers"));
    }

    #[test]
    fn test_library_conflict_needs_better_other_library() {
        let scores = vec![
            ("Declared".to_string(), 0.2, vec![]),
            ("Other".to_string(), 0.65, vec![]),
        ];
        let conflict = library_conflict("x.md", "Declared", &scores, 0.5).unwrap();
        assert_eq!(conflict.suggested_library, "Other");

        let weaker = vec![
            ("Declared".to_string(), 0.9, vec![]),
            ("Other".to_string(), 0.65, vec![]),
        ];
        assert!(library_conflict("x.md", "Declared", &weaker, 0.5).is_none());
        assert!(library_conflict("x.md", "Declared", &[], 0.5).is_none());
    }
}
