//! Pattern synthesis: reference documents → problem/solution pattern records.
//!
//! One synthesizer serves every library; what differs per library lives in a
//! [`LibraryProfile`] (marker tokens, type prefixes, concept labels). Dispatch
//! is by the document's folder path:
//!
//! | Folder contains | Strategies |
//! |-----------------|------------|
//! | `MigrationGuides` | migration |
//! | `Articles` | conceptual, plus migration / anti-pattern when the title or body calls for it |
//! | `Extensions` | API usage, one pattern per qualifying code block |
//! | anything else | implementation (API usage variant) per qualifying code block |
//!
//! A document yielding nothing is skipped; synthesis never aborts the batch
//! because of one document.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use crate::metadata::{ellipsize, slugify};
use crate::models::{word_count, PatternRecord, ReferenceRecord, TagSet};
use crate::store::KnowledgeStore;

const EXCERPT_CHARS: usize = 1500;
const MAX_ITEMS: usize = 5;

const ADVISORY_WORDS: &[&str] = &["should", "recommend", "principle", "pattern", "approach"];
const BREAKING_WORDS: &[&str] = &["breaking", "deprecated", "removed", "changed"];
const STEP_WORDS: &[&str] = &["fix", "replace", "update", "use", "solution", "instead"];
const CAUTION_WORDS: &[&str] = &["avoid", "warning", "danger", "mistake", "incorrect"];

// ============ Library profiles ============

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConceptRule {
    pub keyword: String,
    pub label: String,
}

/// Per-library synthesis configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LibraryProfile {
    pub library: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub display_name: String,
    /// Tokens a code block must contain to count as library usage. Empty: any block.
    #[serde(default)]
    pub markers: Vec<String>,
    /// Type-like identifiers are `(prefix)\w*`. Empty: capitalized identifiers.
    #[serde(default)]
    pub type_prefixes: Vec<String>,
    /// Ordered title keyword → concept label table.
    #[serde(default)]
    pub concepts: Vec<ConceptRule>,
    /// Article titles that qualify for a conceptual pattern. Empty: every article.
    #[serde(default)]
    pub conceptual_title_keywords: Vec<String>,
    #[serde(default = "default_anti_pattern_keywords")]
    pub anti_pattern_title_keywords: Vec<String>,
}

fn default_anti_pattern_keywords() -> Vec<String> {
    strings(&["gotcha", "pitfall", "mistake", "dynamic"])
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn concepts(items: &[(&str, &str)]) -> Vec<ConceptRule> {
    items
        .iter()
        .map(|(keyword, label)| ConceptRule {
            keyword: keyword.to_string(),
            label: label.to_string(),
        })
        .collect()
}

impl LibraryProfile {
    /// Profile with no library-specific knowledge.
    pub fn generic(library: &str) -> Self {
        Self {
            library: library.to_string(),
            slug: slugify(library),
            display_name: library.to_string(),
            markers: Vec::new(),
            type_prefixes: Vec::new(),
            concepts: Vec::new(),
            conceptual_title_keywords: Vec::new(),
            anti_pattern_title_keywords: default_anti_pattern_keywords(),
        }
    }

    pub fn builtin(library: &str) -> Option<Self> {
        let profile = match library {
            "ComposableArchitecture" => Self {
                library: library.to_string(),
                slug: "tca".to_string(),
                display_name: "TCA".to_string(),
                markers: strings(&["@Reducer", "Reducer", "Store", "Effect"]),
                type_prefixes: strings(&[
                    "Store", "ViewStore", "Reducer", "Effect", "State", "Action", "Scope",
                    "Binding",
                ]),
                concepts: concepts(&[
                    ("state", "State Management"),
                    ("composition", "Feature Composition"),
                    ("testing", "Testing Strategy"),
                    ("navigation", "Navigation Pattern"),
                    ("side effects", "Side Effects"),
                ]),
                conceptual_title_keywords: strings(&[
                    "state",
                    "composition",
                    "testing",
                    "side effects",
                    "navigation",
                    "performance",
                ]),
                anti_pattern_title_keywords: default_anti_pattern_keywords(),
            },
            "SwiftSharing" => Self {
                library: library.to_string(),
                slug: "swift-sharing".to_string(),
                display_name: "Swift Sharing".to_string(),
                markers: strings(&["@Shared", "@SharedReader", "SharedKey", "SharedReaderKey"]),
                type_prefixes: strings(&[
                    "@Shared",
                    "@SharedReader",
                    "SharedKey",
                    "SharedReaderKey",
                    "InMemoryKey",
                    "AppStorageKey",
                ]),
                concepts: concepts(&[
                    ("observing", "Observing Changes"),
                    ("mutating", "Mutating Shared State"),
                    ("initialization", "Initialization"),
                    ("persistence", "Persistence Strategies"),
                ]),
                conceptual_title_keywords: strings(&[
                    "observing",
                    "mutating",
                    "initialization",
                    "persistence",
                ]),
                anti_pattern_title_keywords: strings(&["gotchas", "dynamic", "pitfall"]),
            },
            "SQLiteData" => Self {
                library: library.to_string(),
                slug: "sqlite-data".to_string(),
                display_name: "SQLiteData".to_string(),
                markers: strings(&["@Table", "@FetchAll", "@FetchOne", "@Fetch", "defaultDatabase"]),
                type_prefixes: strings(&[
                    "@Table",
                    "@FetchAll",
                    "@FetchOne",
                    "@Fetch",
                    "Database",
                    "SyncEngine",
                ]),
                concepts: concepts(&[
                    ("fetch", "Fetching Data"),
                    ("observ", "Observing Queries"),
                    ("migration", "Schema Migration"),
                    ("sync", "CloudKit Synchronization"),
                    ("test", "Testing Strategy"),
                ]),
                conceptual_title_keywords: Vec::new(),
                anti_pattern_title_keywords: default_anti_pattern_keywords(),
            },
            _ => return None,
        };
        Some(profile)
    }

    /// Fill derived fields left empty in configuration.
    pub fn normalized(mut self) -> Self {
        if self.slug.trim().is_empty() {
            self.slug = slugify(&self.library);
        }
        if self.display_name.trim().is_empty() {
            self.display_name = self.library.clone();
        }
        self
    }

    fn folder_root(&self) -> String {
        self.display_name.replace(' ', "")
    }
}

// ============ Synthesized patterns ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Conceptual,
    Migration,
    AntiPattern,
    ApiUsage,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Conceptual => "conceptual",
            PatternKind::Migration => "migration",
            PatternKind::AntiPattern => "anti_pattern",
            PatternKind::ApiUsage => "api_usage",
        }
    }
}

/// Subtype-specific fields.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternDetails {
    Conceptual {
        concept: String,
        key_concepts: Vec<String>,
    },
    Migration {
        version: String,
        breaking_changes: Vec<String>,
        migration_steps: Vec<String>,
    },
    AntiPattern {
        warnings: Vec<String>,
    },
    ApiUsage {
        implementation: bool,
        types: Vec<String>,
        functions: Vec<String>,
        code: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedPattern {
    pub id: String,
    pub title: String,
    pub problem: String,
    pub solution: String,
    pub kind: PatternKind,
    pub folder: String,
    pub tags: Vec<String>,
    pub source_id: String,
    pub source_title: String,
    pub source_location: String,
    pub excerpt: String,
    pub details: PatternDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    pub library: String,
    pub documents_scanned: usize,
    pub documents_with_patterns: usize,
    pub by_kind: BTreeMap<PatternKind, usize>,
    pub patterns: Vec<PatternRecord>,
}

impl SynthesisReport {
    pub fn print(&self) {
        println!("synthesize {}", self.library);
        println!("  documents scanned: {}", self.documents_scanned);
        println!("  documents with patterns: {}", self.documents_with_patterns);
        println!("  patterns created: {}", self.patterns.len());
        for (kind, count) in &self.by_kind {
            println!("    {:<14} {}", kind.as_str(), count);
        }
        println!("ok");
    }
}

// ============ Synthesizer ============

pub struct PatternSynthesizer {
    profile: LibraryProfile,
    type_regex: Regex,
    function_regex: Regex,
    migration_version: Regex,
    any_version: Regex,
}

impl PatternSynthesizer {
    pub fn new(profile: LibraryProfile) -> Result<Self> {
        let profile = profile.normalized();
        let type_pattern = if profile.type_prefixes.is_empty() {
            r"\b([A-Z][A-Za-z0-9_]+)\b".to_string()
        } else {
            let alternatives: Vec<String> =
                profile.type_prefixes.iter().map(|p| regex::escape(p)).collect();
            format!(r"((?:{})\w*)", alternatives.join("|"))
        };

        Ok(Self {
            profile,
            type_regex: Regex::new(&type_pattern)?,
            function_regex: Regex::new(r"\b(?:func|fn|function|def)\s+(\w+)")?,
            migration_version: Regex::new(r"(?i)Migrating\s+to\s+(\d+(?:\.\d+)*)")?,
            any_version: Regex::new(r"\b(\d+\.\d+(?:\.\d+)?)\b")?,
        })
    }

    pub fn profile(&self) -> &LibraryProfile {
        &self.profile
    }

    /// Synthesize and persist patterns for the profile's library.
    pub async fn synthesize(&self, store: &KnowledgeStore) -> Result<SynthesisReport> {
        let documents = store.reference_for_library(&self.profile.library).await?;
        let mut report = SynthesisReport {
            library: self.profile.library.clone(),
            documents_scanned: documents.len(),
            documents_with_patterns: 0,
            by_kind: BTreeMap::new(),
            patterns: Vec::new(),
        };

        for doc in &documents {
            let patterns = self.extract(doc);
            if patterns.is_empty() {
                tracing::debug!(doc = %doc.id, "no patterns in document");
                continue;
            }
            report.documents_with_patterns += 1;
            for pattern in patterns {
                let record = self.to_record(&pattern);
                store.upsert_pattern(&record).await?;
                *report.by_kind.entry(pattern.kind).or_insert(0) += 1;
                report.patterns.push(record);
            }
        }

        tracing::info!(
            library = %self.profile.library,
            patterns = report.patterns.len(),
            "synthesis complete"
        );
        Ok(report)
    }

    /// Patterns for one reference document, dispatched by folder path.
    pub fn extract(&self, doc: &ReferenceRecord) -> Vec<SynthesizedPattern> {
        let folder = doc.folder_path.as_str();
        let title = doc.title.to_lowercase();
        let mut out = Vec::new();

        if folder.contains("MigrationGuides") {
            out.extend(self.migration(doc));
        } else if folder.contains("Articles") {
            let keywords = &self.profile.conceptual_title_keywords;
            if keywords.is_empty() || keywords.iter().any(|k| title.contains(k.as_str())) {
                out.extend(self.conceptual(doc));
            }
            if title.contains("migrat") {
                out.extend(self.migration(doc));
            }
            let title_flags = self
                .profile
                .anti_pattern_title_keywords
                .iter()
                .any(|k| title.contains(k.as_str()));
            if title_flags || cautionary_lines(&doc.content).len() >= 2 {
                out.extend(self.anti_pattern(doc));
            }
        } else if folder.contains("Extensions") {
            out.extend(self.api_usage(doc, false));
        } else {
            out.extend(self.api_usage(doc, true));
        }

        out
    }

    fn conceptual(&self, doc: &ReferenceRecord) -> Option<SynthesizedPattern> {
        let key_concepts = matching_lines(&doc.content, ADVISORY_WORDS, 20, 150, false);
        if key_concepts.is_empty() {
            return None;
        }

        let title_lower = doc.title.to_lowercase();
        let display = &self.profile.display_name;
        let concept = self
            .profile
            .concepts
            .iter()
            .find(|rule| title_lower.contains(&rule.keyword.to_lowercase()))
            .map(|rule| rule.label.clone())
            .unwrap_or_else(|| format!("{} Concept", display));

        let title = format!("{} Concept: {}", display, doc.title);
        Some(SynthesizedPattern {
            id: self.pattern_id("concept", &title),
            problem: format!("Understanding {} in {}", concept, display),
            solution: format!("Apply the principles described in {}", doc.title),
            kind: PatternKind::Conceptual,
            folder: format!("{}/{}", self.profile.folder_root(), concept.replace(' ', "")),
            tags: vec![
                self.profile.slug.clone(),
                "concept".to_string(),
                slugify(&concept),
            ],
            source_id: doc.id.clone(),
            source_title: doc.title.clone(),
            source_location: doc.folder_path.clone(),
            excerpt: doc.content.clone(),
            details: PatternDetails::Conceptual {
                concept,
                key_concepts,
            },
            title,
        })
    }

    fn migration(&self, doc: &ReferenceRecord) -> Option<SynthesizedPattern> {
        let breaking_changes = matching_lines(&doc.content, BREAKING_WORDS, 0, usize::MAX, true);
        let breaking: HashSet<&String> = breaking_changes.iter().collect();
        let migration_steps: Vec<String> =
            matching_lines_unbounded(&doc.content, STEP_WORDS, true)
                .into_iter()
                .filter(|line| !breaking.contains(line))
                .take(MAX_ITEMS)
                .collect();
        if breaking_changes.is_empty() && migration_steps.is_empty() {
            return None;
        }

        let version = self
            .migration_version
            .captures(&doc.title)
            .or_else(|| self.any_version.captures(&doc.title))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let display = &self.profile.display_name;
        let title = format!("{} Migration: {}", display, doc.title);
        Some(SynthesizedPattern {
            id: self.pattern_id("migration", &title),
            problem: format!("Upgrading {} code to version {}", display, version),
            solution: "Work through the breaking changes and migration steps below".to_string(),
            kind: PatternKind::Migration,
            folder: format!("{}/Migration", self.profile.folder_root()),
            tags: vec![
                self.profile.slug.clone(),
                "migration".to_string(),
                format!("version-{}", version.to_lowercase()),
            ],
            source_id: doc.id.clone(),
            source_title: doc.title.clone(),
            source_location: doc.folder_path.clone(),
            excerpt: doc.content.clone(),
            details: PatternDetails::Migration {
                version,
                breaking_changes,
                migration_steps,
            },
            title,
        })
    }

    fn anti_pattern(&self, doc: &ReferenceRecord) -> Option<SynthesizedPattern> {
        let warnings = cautionary_lines(&doc.content);
        if warnings.is_empty() {
            return None;
        }

        let display = &self.profile.display_name;
        let title = format!("{} Pitfalls: {}", display, doc.title);
        Some(SynthesizedPattern {
            id: self.pattern_id("anti-pattern", &title),
            problem: format!("Common pitfalls and mistakes when using {}", display),
            solution: "Recognize and avoid these anti-patterns".to_string(),
            kind: PatternKind::AntiPattern,
            folder: format!("{}/AntiPatterns", self.profile.folder_root()),
            tags: vec![
                self.profile.slug.clone(),
                "anti-pattern".to_string(),
                "pitfalls".to_string(),
            ],
            source_id: doc.id.clone(),
            source_title: doc.title.clone(),
            source_location: doc.folder_path.clone(),
            excerpt: doc.content.clone(),
            details: PatternDetails::AntiPattern { warnings },
            title,
        })
    }

    fn api_usage(&self, doc: &ReferenceRecord, implementation: bool) -> Vec<SynthesizedPattern> {
        let display = &self.profile.display_name;
        let (label, subtype, folder) = if implementation {
            ("Implementation", "implementation", "Implementation")
        } else {
            ("API", "api", "API")
        };

        code_blocks(&doc.content)
            .into_iter()
            .filter(|block| {
                self.profile.markers.is_empty()
                    || self.profile.markers.iter().any(|m| block.contains(m.as_str()))
            })
            .enumerate()
            .map(|(i, code)| {
                let types = unique_captures(&self.type_regex, &code);
                let functions = unique_captures(&self.function_regex, &code);

                let mut title = format!("{} {}: {}", display, label, doc.title);
                if i > 0 {
                    title = format!("{} (example {})", title, i + 1);
                }

                let mut tags = vec![self.profile.slug.clone(), subtype.to_string()];
                tags.extend(
                    types
                        .iter()
                        .take(3)
                        .map(|t| t.trim_start_matches('@').to_lowercase()),
                );

                let (problem, solution) = if implementation {
                    (
                        format!("Need a working {} implementation reference", display),
                        "Use this implementation as a reference".to_string(),
                    )
                } else {
                    (
                        format!("Need to use {} correctly with {}", doc.title, display),
                        format!("Follow the {} usage pattern shown below", doc.title),
                    )
                };

                SynthesizedPattern {
                    id: self.pattern_id(subtype, &title),
                    problem,
                    solution,
                    kind: PatternKind::ApiUsage,
                    folder: format!("{}/{}", self.profile.folder_root(), folder),
                    tags,
                    source_id: doc.id.clone(),
                    source_title: doc.title.clone(),
                    source_location: doc.folder_path.clone(),
                    excerpt: code.clone(),
                    details: PatternDetails::ApiUsage {
                        implementation,
                        types,
                        functions,
                        code,
                    },
                    title,
                }
            })
            .collect()
    }

    /// `{slug}-{subtype}-{8 hex of sha256(title)}`.
    fn pattern_id(&self, subtype: &str, title: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{}-{}-{}", self.profile.slug, subtype, &digest[..8])
    }

    pub fn to_record(&self, pattern: &SynthesizedPattern) -> PatternRecord {
        let content = format_pattern_content(&self.profile.library, pattern);
        PatternRecord {
            id: pattern.id.clone(),
            title: pattern.title.clone(),
            word_count: word_count(&content),
            content,
            folder: pattern.folder.clone(),
            library: Some(self.profile.library.clone()),
            pattern_type: Some(pattern.kind.as_str().to_string()),
            source_path: Some(pattern.source_id.clone()),
            tags: pattern.tags.iter().cloned().collect::<TagSet>(),
            summary: format!("{}: {}", pattern.problem, pattern.solution),
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Canonical markdown body of a synthesized pattern.
pub fn format_pattern_content(library: &str, pattern: &SynthesizedPattern) -> String {
    let mut out = format!(
        "# {}\n\n## Problem\n{}\n\n## Solution\n{}\n\n## Pattern Type\n{}\n\n## Library\n{}\n\n## Tags\n{}\n\n## Source Document\n{} (Location: {})\n",
        pattern.title,
        pattern.problem,
        pattern.solution,
        pattern.kind.as_str(),
        library,
        pattern.tags.join(", "),
        pattern.source_title,
        pattern.source_location,
    );

    let bullets = |heading: &str, items: &[String]| -> String {
        if items.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = items.iter().map(|i| format!("- {}", i)).collect();
            format!("\n## {}\n{}\n", heading, lines.join("\n"))
        }
    };

    match &pattern.details {
        PatternDetails::Conceptual {
            concept,
            key_concepts,
        } => {
            out.push_str(&format!("\n## Concept\n{}\n", concept));
            out.push_str(&bullets("Key Concepts", key_concepts));
        }
        PatternDetails::Migration {
            version,
            breaking_changes,
            migration_steps,
        } => {
            out.push_str(&format!("\n## Target Version\n{}\n", version));
            out.push_str(&bullets("Breaking Changes", breaking_changes));
            out.push_str(&bullets("Migration Steps", migration_steps));
        }
        PatternDetails::AntiPattern { warnings } => {
            out.push_str(&bullets("Warnings and Pitfalls", warnings));
        }
        PatternDetails::ApiUsage {
            types,
            functions,
            code,
            ..
        } => {
            out.push_str(&bullets("Types Used", types));
            out.push_str(&bullets("Functions Used", functions));
            out.push_str(&format!("\n## Code Example\n```\n{}\n```\n", code));
        }
    }

    out.push_str(&format!(
        "\n## Original Content\n{}\n",
        ellipsize(&pattern.excerpt, EXCERPT_CHARS)
    ));
    out
}

// ============ Text helpers ============

/// Fenced code blocks (```), trimmed, non-empty.
pub fn code_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(lines) => {
                    let block = lines.join("\n").trim().to_string();
                    if !block.is_empty() {
                        blocks.push(block);
                    }
                }
                None => current = Some(Vec::new()),
            }
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }

    blocks
}

/// Prose lines (outside code, not headings) for keyword harvesting.
fn prose_lines(content: &str) -> Vec<&str> {
    let mut in_code = false;
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                in_code = !in_code;
                return None;
            }
            if in_code || trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            Some(trimmed)
        })
        .collect()
}

fn has_keyword(line: &str, keywords: &[&str], whole_word: bool) -> bool {
    let lower = line.to_lowercase();
    if whole_word {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| keywords.contains(&w))
    } else {
        keywords.iter().any(|k| lower.contains(k))
    }
}

/// Up to five prose lines mentioning a keyword, with length strictly inside `(min, max)`.
fn matching_lines(
    content: &str,
    keywords: &[&str],
    min: usize,
    max: usize,
    whole_word: bool,
) -> Vec<String> {
    prose_lines(content)
        .into_iter()
        .filter(|line| {
            let len = line.chars().count();
            len > min && len < max && has_keyword(line, keywords, whole_word)
        })
        .map(|line| line.trim_start_matches(&['-', '*', ' '][..]).to_string())
        .take(MAX_ITEMS)
        .collect()
}

fn matching_lines_unbounded(content: &str, keywords: &[&str], whole_word: bool) -> Vec<String> {
    prose_lines(content)
        .into_iter()
        .filter(|line| has_keyword(line, keywords, whole_word))
        .map(|line| line.trim_start_matches(&['-', '*', ' '][..]).to_string())
        .collect()
}

fn cautionary_lines(content: &str) -> Vec<String> {
    matching_lines(content, CAUTION_WORDS, 15, 200, false)
}

fn unique_captures(regex: &Regex, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    fn doc(folder: &str, title: &str, content: &str) -> ReferenceRecord {
        ReferenceRecord {
            id: format!("lib_{}", slugify(title)),
            title: title.to_string(),
            content: content.to_string(),
            folder_path: folder.to_string(),
            doc_type: DocType::Documentation,
            library: "SwiftSharing".to_string(),
            file_path: format!("{}/{}.md", folder, slugify(title)),
            word_count: word_count(content),
            summary: String::new(),
            tags: TagSet::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn sharing() -> PatternSynthesizer {
        PatternSynthesizer::new(LibraryProfile::builtin("SwiftSharing").unwrap()).unwrap()
    }

    #[test]
    fn test_code_blocks_extraction() {
        let content = "text\n```swift\n@Shared var count = 0\n```\nmore\n```\n\n```\n```\nunterminated";
        assert_eq!(code_blocks(content), vec!["@Shared var count = 0".to_string()]);
    }

    #[test]
    fn test_extension_code_blocks_become_api_patterns() {
        let content = "# Shared keys\n\n```swift\n@Shared(.appStorage(\"count\")) var count = 0\nfunc increment() {}\n```\n\n```swift\nlet x = 1\n```\n";
        let patterns = sharing().extract(&doc("Extensions", "AppStorageKey", content));
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.kind, PatternKind::ApiUsage);
        assert!(p.id.starts_with("swift-sharing-api-"));
        assert_eq!(p.folder, "SwiftSharing/API");
        match &p.details {
            PatternDetails::ApiUsage {
                types,
                functions,
                implementation,
                ..
            } => {
                assert_eq!(types, &vec!["@Shared".to_string()]);
                assert_eq!(functions, &vec!["increment".to_string()]);
                assert!(!implementation);
            }
            other => panic!("unexpected details: {:?}", other),
        }
        assert!(p.tags.contains(&"shared".to_string()));
    }

    #[test]
    fn test_each_qualifying_block_gets_its_own_id() {
        let content = "```\n@Shared var a = 1\n```\n```\n@Shared var b = 2\n```\n";
        let patterns = sharing().extract(&doc("Sources", "Two blocks", content));
        assert_eq!(patterns.len(), 2);
        assert_ne!(patterns[0].id, patterns[1].id);
        assert!(patterns[0].id.starts_with("swift-sharing-implementation-"));
    }

    #[test]
    fn test_migration_guide_harvest() {
        let content = "# Migrating to 2.1\n\n- The old initializer was removed in this release.\n- Replace `load` calls with the new `fetch` API.\nUnrelated prose line.\n";
        let patterns = sharing().extract(&doc("MigrationGuides", "Migrating to 2.1", content));
        assert_eq!(patterns.len(), 1);
        match &patterns[0].details {
            PatternDetails::Migration {
                version,
                breaking_changes,
                migration_steps,
            } => {
                assert_eq!(version, "2.1");
                assert_eq!(breaking_changes.len(), 1);
                assert!(breaking_changes[0].starts_with("The old initializer"));
                assert_eq!(migration_steps.len(), 1);
                assert!(migration_steps[0].starts_with("Replace"));
            }
            other => panic!("unexpected details: {:?}", other),
        }
        assert!(patterns[0].tags.contains(&"version-2.1".to_string()));
    }

    #[test]
    fn test_migration_without_harvest_is_skipped() {
        let patterns = sharing().extract(&doc("MigrationGuides", "Migrating to 3.0", "Nothing here."));
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_article_conceptual_and_anti_pattern() {
        let content = "# Persistence gotchas\n\nYou should prefer file storage for large values.\nAvoid writing to shared state from many tasks at once.\nA warning: the default key is not thread safe.\n";
        let patterns = sharing().extract(&doc("Articles", "Persistence gotchas", content));
        let kinds: Vec<PatternKind> = patterns.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PatternKind::Conceptual, PatternKind::AntiPattern]);

        match &patterns[0].details {
            PatternDetails::Conceptual { concept, .. } => {
                assert_eq!(concept, "Persistence Strategies")
            }
            other => panic!("unexpected details: {:?}", other),
        }
        match &patterns[1].details {
            PatternDetails::AntiPattern { warnings } => assert_eq!(warnings.len(), 2),
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_pattern_ids_are_deterministic() {
        let d = doc("Articles", "Observing changes", "You should observe with the publisher approach.");
        let a = sharing().extract(&d);
        let b = sharing().extract(&d);
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn test_generic_profile_accepts_any_block() {
        let synth = PatternSynthesizer::new(LibraryProfile::generic("Tokio")).unwrap();
        let patterns = synth.extract(&doc("root", "Spawning", "```rust\nfn main() { Runtime::new(); }\n```"));
        assert_eq!(patterns.len(), 1);
        match &patterns[0].details {
            PatternDetails::ApiUsage { types, functions, .. } => {
                assert_eq!(types, &vec!["Runtime".to_string()]);
                assert_eq!(functions, &vec!["main".to_string()]);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_formatted_content_sections() {
        let synth = sharing();
        let long = format!("```\n@Shared var a = 1\n{}\n```", "x".repeat(2000));
        let patterns = synth.extract(&doc("Extensions", "Long", &long));
        let record = synth.to_record(&patterns[0]);
        for heading in ["## Problem", "## Solution", "## Pattern Type", "## Tags", "## Source Document", "## Original Content"] {
            assert!(record.content.contains(heading), "missing {}", heading);
        }
        assert!(record.content.trim_end().ends_with("..."));
        assert_eq!(record.library.as_deref(), Some("SwiftSharing"));
        assert_eq!(record.pattern_type.as_deref(), Some("api_usage"));
        assert!(record.summary.contains(": "));
    }
}
