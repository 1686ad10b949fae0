//! Hybrid search: curated patterns first, reference documentation second.
//!
//! One query walks `patterns → reference → nothing`. The first hit of the
//! first stage that returns anything wins; there is no score threshold. The
//! answer text is shaped by a [`DetailLevel`] so callers can bound response
//! size without changing which record is chosen.
//!
//! A [`HybridSearcher`] is a session: it owns the FIFO result cache and the
//! running statistics. Cache hits return the stored outcome unchanged,
//! including its original latency.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use std::time::Instant;

use crate::cache::{cache_key, QueryCache};
use crate::config::SearchConfig;
use crate::fts::{self, FtsHit};
use crate::metadata::ellipsize;
use crate::models::{Collection, PatternRecord, ReferenceRecord, StoredRecord};
use crate::store::KnowledgeStore;
use crate::synthesis::code_blocks;

const MAX_KEY_POINTS: usize = 5;
const KEY_POINT_CHARS: usize = 80;
const KEY_POINT_SCAN_LINES: usize = 20;
const MAX_CODE_EXAMPLES: usize = 3;
const LONG_CODE_CHARS: usize = 200;
const PREVIEW_CHARS: usize = 150;
const MAX_TOPICS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Summary,
    #[default]
    Details,
    Full,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Summary => "summary",
            DetailLevel::Details => "details",
            DetailLevel::Full => "full",
        }
    }
}

/// Section selector for `kb expand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExpandSection {
    KeyPoints,
    Code,
    Full,
}

/// Terminal state of one hybrid query.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    PatternFound {
        id: String,
        source: String,
        answer: String,
        snippet: String,
        tags: Vec<String>,
        reasoning: String,
        latency_ms: f64,
    },
    ReferenceFound {
        id: String,
        source: String,
        library: String,
        answer: String,
        snippet: String,
        tags: Vec<String>,
        reasoning: String,
        latency_ms: f64,
    },
    NoKnowledgeFound {
        reasoning: String,
        latency_ms: f64,
    },
}

impl SearchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            SearchOutcome::PatternFound { .. } => "pattern_found",
            SearchOutcome::ReferenceFound { .. } => "reference_found",
            SearchOutcome::NoKnowledgeFound { .. } => "no_knowledge_found",
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            SearchOutcome::PatternFound { source, .. }
            | SearchOutcome::ReferenceFound { source, .. } => Some(source),
            SearchOutcome::NoKnowledgeFound { .. } => None,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            SearchOutcome::PatternFound { answer, .. }
            | SearchOutcome::ReferenceFound { answer, .. } => Some(answer),
            SearchOutcome::NoKnowledgeFound { .. } => None,
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            SearchOutcome::PatternFound { reasoning, .. }
            | SearchOutcome::ReferenceFound { reasoning, .. }
            | SearchOutcome::NoKnowledgeFound { reasoning, .. } => reasoning,
        }
    }

    pub fn latency_ms(&self) -> f64 {
        match self {
            SearchOutcome::PatternFound { latency_ms, .. }
            | SearchOutcome::ReferenceFound { latency_ms, .. }
            | SearchOutcome::NoKnowledgeFound { latency_ms, .. } => *latency_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub detail: DetailLevel,
    pub cached: bool,
    #[serde(flatten)]
    pub outcome: SearchOutcome,
}

impl SearchResponse {
    pub fn print(&self) {
        let cached = if self.cached { " (cached)" } else { "" };
        println!("query: {}", self.query);
        println!("status: {}{}", self.outcome.status(), cached);
        if let Some(source) = self.outcome.source() {
            println!("source: {}", source);
        }
        if let SearchOutcome::PatternFound { id, .. } | SearchOutcome::ReferenceFound { id, .. } =
            &self.outcome
        {
            println!("id: {}", id);
        }
        println!("reasoning: {}", self.outcome.reasoning());
        println!("latency: {:.2} ms", self.outcome.latency_ms());
        if let Some(answer) = self.outcome.answer() {
            println!();
            println!("{}", answer);
        }
        println!();
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub total_queries: u64,
    pub pattern_hits: u64,
    pub reference_hits: u64,
    pub misses: u64,
    pub cache_hits: u64,
    pub live_latency_ms_total: f64,
}

impl SearchStats {
    pub fn live_queries(&self) -> u64 {
        self.total_queries - self.cache_hits
    }

    pub fn average_latency_ms(&self) -> f64 {
        match self.live_queries() {
            0 => 0.0,
            n => self.live_latency_ms_total / n as f64,
        }
    }

    pub fn print(&self) {
        println!("search statistics");
        println!("  queries:        {}", self.total_queries);
        println!("  pattern hits:   {}", self.pattern_hits);
        println!("  reference hits: {}", self.reference_hits);
        println!("  misses:         {}", self.misses);
        println!("  cache hits:     {}", self.cache_hits);
        println!("  avg latency:    {:.2} ms", self.average_latency_ms());
    }
}

pub struct HybridSearcher {
    store: KnowledgeStore,
    config: SearchConfig,
    cache: QueryCache<SearchOutcome>,
    stats: SearchStats,
}

impl HybridSearcher {
    pub fn new(store: KnowledgeStore, config: &SearchConfig) -> Self {
        Self {
            store,
            cache: QueryCache::new(config.cache_capacity),
            config: config.clone(),
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Run one query through the cache and both search stages.
    pub async fn search(&mut self, query: &str, detail: DetailLevel) -> Result<SearchResponse> {
        self.stats.total_queries += 1;
        let key = cache_key(detail.as_str(), query);

        if let Some(outcome) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            tracing::debug!(query, "search cache hit");
            return Ok(SearchResponse {
                query: query.to_string(),
                detail,
                cached: true,
                outcome,
            });
        }

        let outcome = self.search_live(query, detail).await?;
        match &outcome {
            SearchOutcome::PatternFound { .. } => self.stats.pattern_hits += 1,
            SearchOutcome::ReferenceFound { .. } => self.stats.reference_hits += 1,
            SearchOutcome::NoKnowledgeFound { .. } => self.stats.misses += 1,
        }
        self.stats.live_latency_ms_total += outcome.latency_ms();
        self.cache.insert(key, outcome.clone());

        Ok(SearchResponse {
            query: query.to_string(),
            detail,
            cached: false,
            outcome,
        })
    }

    async fn search_live(&self, query: &str, detail: DetailLevel) -> Result<SearchOutcome> {
        let started = Instant::now();

        let patterns = fts::search(
            &self.store,
            Collection::Patterns,
            query,
            self.config.pattern_limit,
            self.config.snippet_tokens,
        )
        .await?;
        if let Some(FtsHit {
            record: StoredRecord::Pattern(pattern),
            snippet,
            ..
        }) = patterns.first().cloned()
        {
            return Ok(SearchOutcome::PatternFound {
                reasoning: format!(
                    "Curated pattern matched ({} candidate{}); patterns take precedence over reference documentation",
                    patterns.len(),
                    plural(patterns.len())
                ),
                answer: format_pattern_answer(&pattern, detail),
                source: pattern.title.clone(),
                tags: pattern.tags.iter().cloned().collect(),
                id: pattern.id,
                snippet,
                latency_ms: elapsed_ms(started),
            });
        }

        let references = fts::search(
            &self.store,
            Collection::Reference,
            query,
            self.config.reference_limit,
            self.config.snippet_tokens,
        )
        .await?;
        if let Some(FtsHit {
            record: StoredRecord::Reference(reference),
            snippet,
            ..
        }) = references.first().cloned()
        {
            return Ok(SearchOutcome::ReferenceFound {
                reasoning: format!(
                    "No curated pattern matched; answered from {} reference documentation ({} candidate{})",
                    reference.library,
                    references.len(),
                    plural(references.len())
                ),
                answer: format_reference_answer(&reference, detail),
                source: reference.title.clone(),
                library: reference.library.clone(),
                tags: reference.tags.iter().cloned().collect(),
                id: reference.id,
                snippet,
                latency_ms: elapsed_ms(started),
            });
        }

        Ok(SearchOutcome::NoKnowledgeFound {
            reasoning: "Neither the patterns nor the reference collection matched the query"
                .to_string(),
            latency_ms: elapsed_ms(started),
        })
    }

    /// One section of a stored record, or `None` for an unknown id.
    pub async fn expand(&self, id: &str, section: ExpandSection) -> Result<Option<String>> {
        let Some(record) = self.store.find(id).await? else {
            return Ok(None);
        };
        let content = record.content();

        let text = match section {
            ExpandSection::KeyPoints => {
                let points = key_points(content);
                if points.is_empty() {
                    "No key points found.".to_string()
                } else {
                    bullet_list(&points)
                }
            }
            ExpandSection::Code => {
                let blocks = code_blocks(content);
                if blocks.is_empty() {
                    "No code examples found.".to_string()
                } else {
                    blocks
                        .iter()
                        .map(|b| format!("```\n{}\n```", b))
                        .collect::<Vec<_>>()
                        .join("\n\n")
                }
            }
            ExpandSection::Full => content.to_string(),
        };

        Ok(Some(format!("# {}\n\n{}", record.title(), text)))
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// ============ Answer formatting ============

pub fn format_pattern_answer(pattern: &PatternRecord, detail: DetailLevel) -> String {
    let mut out = format!("{}\n{}", pattern.title, pattern.summary);
    if detail == DetailLevel::Summary {
        return out;
    }

    if let Some(problem) = markdown_section(&pattern.content, "Problem") {
        out.push_str(&format!("\n\nProblem: {}", problem));
    }
    if let Some(solution) = markdown_section(&pattern.content, "Solution") {
        out.push_str(&format!("\nSolution: {}", solution));
    }
    let points = key_points(&pattern.content);
    if !points.is_empty() {
        out.push_str(&format!("\n\nKey points:\n{}", bullet_list(&points)));
    }
    if detail == DetailLevel::Details {
        return out;
    }

    let examples = code_examples(&pattern.content);
    if !examples.is_empty() {
        out.push_str("\n\nCode examples:");
        for example in examples {
            out.push_str(&format!("\n```\n{}\n```", example));
        }
    }
    out.push_str(&format!("\n\n---\n{}", pattern.content));
    out
}

pub fn format_reference_answer(reference: &ReferenceRecord, detail: DetailLevel) -> String {
    let mut out = format!("{}\n{}", reference.title, reference.summary);
    if detail == DetailLevel::Summary {
        return out;
    }

    out.push_str(&format!(
        "\n\nSource: {} Documentation ({})\nLocation: {}",
        reference.library,
        reference.doc_type.label(),
        reference.folder_path
    ));
    if !reference.tags.is_empty() {
        let topics: Vec<&str> = reference
            .tags
            .iter()
            .take(MAX_TOPICS)
            .map(String::as_str)
            .collect();
        out.push_str(&format!("\nTopics: {}", topics.join(", ")));
    }
    if detail == DetailLevel::Details {
        return out;
    }

    out.push_str(&format!("\n\nPreview: {}", content_preview(&reference.content)));
    out.push_str(&format!("\n\n---\n{}", reference.content));
    out
}

/// Body of a `## {heading}` section up to the next `## ` heading, trimmed.
pub fn markdown_section(content: &str, heading: &str) -> Option<String> {
    let marker = format!("## {}", heading);
    let mut lines = content.lines().skip_while(|l| l.trim() != marker);
    lines.next()?;
    let body: Vec<&str> = lines.take_while(|l| !l.starts_with("## ")).collect();
    let text = body.join("\n").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// List items from the opening lines of the Problem and Solution sections,
/// or of the whole body when neither section exists.
pub fn key_points(content: &str) -> Vec<String> {
    let sections: Vec<String> = ["Problem", "Solution"]
        .iter()
        .filter_map(|h| markdown_section(content, h))
        .collect();
    let source = if sections.is_empty() {
        content.to_string()
    } else {
        sections.join("\n")
    };

    source
        .lines()
        .take(KEY_POINT_SCAN_LINES)
        .filter_map(|line| list_item(line.trim()))
        .map(|item| ellipsize(item, KEY_POINT_CHARS))
        .take(MAX_KEY_POINTS)
        .collect()
}

fn list_item(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim()).filter(|s| !s.is_empty());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(". ") {
            return Some(rest.trim()).filter(|s| !s.is_empty());
        }
    }
    None
}

/// Up to three code blocks; long ones cut to their first three lines.
pub fn code_examples(content: &str) -> Vec<String> {
    code_blocks(content)
        .into_iter()
        .take(MAX_CODE_EXAMPLES)
        .map(|block| {
            if block.chars().count() > LONG_CODE_CHARS {
                let head: Vec<&str> = block.lines().take(3).collect();
                format!("{}\n...", head.join("\n"))
            } else {
                block
            }
        })
        .collect()
}

/// First prose paragraph with code and heading markers removed.
pub fn content_preview(content: &str) -> String {
    let mut in_code = false;
    let mut paragraph: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        let text = trimmed.trim_start_matches('#').trim();
        if text.is_empty() || trimmed.starts_with('#') {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        paragraph.push(text.to_string());
    }

    ellipsize(&paragraph.join(" "), PREVIEW_CHARS)
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, TagSet};

    const PATTERN_BODY: &str = "# Shared counter\n\n## Problem\nState drifts between features.\n- Two screens mutate one value\n- Updates arrive out of order\n\n## Solution\nUse a single shared key.\n1. Declare the key once\n\n## Code Example\n```swift\n@Shared(.count) var count = 0\n```\n";

    fn pattern() -> PatternRecord {
        PatternRecord {
            id: "p1".to_string(),
            title: "Shared counter".to_string(),
            content: PATTERN_BODY.to_string(),
            folder: "swift".to_string(),
            library: None,
            pattern_type: None,
            source_path: None,
            tags: TagSet::new(),
            summary: "Keep one source of truth".to_string(),
            word_count: 10,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn reference() -> ReferenceRecord {
        ReferenceRecord {
            id: "r1".to_string(),
            title: "Fetching".to_string(),
            content: "# Fetching\n\n```swift\nlet x = 1\n```\nFirst paragraph line one.\nLine two.\n\nSecond paragraph.".to_string(),
            folder_path: "Articles".to_string(),
            doc_type: DocType::Article,
            library: "SQLiteData".to_string(),
            file_path: "Articles/Fetching.md".to_string(),
            word_count: 8,
            summary: "Fetching: First paragraph line one.".to_string(),
            tags: ["sqlitedata", "article", "fetching"].iter().map(|s| s.to_string()).collect(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_markdown_section() {
        assert_eq!(
            markdown_section(PATTERN_BODY, "Solution").as_deref(),
            Some("Use a single shared key.\n1. Declare the key once")
        );
        assert!(markdown_section(PATTERN_BODY, "Missing").is_none());
    }

    #[test]
    fn test_key_points_from_problem_and_solution() {
        assert_eq!(
            key_points(PATTERN_BODY),
            vec![
                "Two screens mutate one value".to_string(),
                "Updates arrive out of order".to_string(),
                "Declare the key once".to_string(),
            ]
        );
    }

    #[test]
    fn test_key_points_are_truncated() {
        let body = format!("- {}", "a".repeat(100));
        let points = key_points(&body);
        assert_eq!(points[0].chars().count(), KEY_POINT_CHARS + 3);
    }

    #[test]
    fn test_long_code_examples_are_shortened() {
        let long = format!("```\nl1\nl2\nl3\nl4 {}\n```", "x".repeat(250));
        assert_eq!(code_examples(&long), vec!["l1\nl2\nl3\n...".to_string()]);
    }

    #[test]
    fn test_content_preview_skips_code_and_headings() {
        assert_eq!(
            content_preview(&reference().content),
            "First paragraph line one. Line two."
        );
    }

    #[test]
    fn test_pattern_answer_levels_grow() {
        let p = pattern();
        let summary = format_pattern_answer(&p, DetailLevel::Summary);
        let details = format_pattern_answer(&p, DetailLevel::Details);
        let full = format_pattern_answer(&p, DetailLevel::Full);

        assert_eq!(summary, "Shared counter\nKeep one source of truth");
        assert!(details.contains("Problem: State drifts"));
        assert!(details.contains("Key points:\n- Two screens"));
        assert!(!details.contains("```"));
        assert!(full.contains("Code examples:"));
        assert!(full.ends_with(PATTERN_BODY));
    }

    #[test]
    fn test_reference_answer_levels() {
        let r = reference();
        let details = format_reference_answer(&r, DetailLevel::Details);
        assert!(details.contains("Source: SQLiteData Documentation (Article)"));
        assert!(details.contains("Location: Articles"));
        assert!(details.contains("Topics: article, fetching, sqlitedata"));
        assert!(!details.contains("Preview:"));

        let full = format_reference_answer(&r, DetailLevel::Full);
        assert!(full.contains("Preview: First paragraph line one. Line two."));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = SearchOutcome::NoKnowledgeFound {
            reasoning: "none".to_string(),
            latency_ms: 1.0,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "no_knowledge_found");
        assert_eq!(outcome.status(), "no_knowledge_found");
        assert!(outcome.source().is_none());
    }

    #[test]
    fn test_response_json_has_single_query_key() {
        let response = SearchResponse {
            query: "nothing here".to_string(),
            detail: DetailLevel::Details,
            cached: false,
            outcome: SearchOutcome::NoKnowledgeFound {
                reasoning: "none".to_string(),
                latency_ms: 1.0,
            },
        };
        let text = serde_json::to_string(&response).unwrap();
        assert_eq!(text.matches("\"query\"").count(), 1);

        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["query"], "nothing here");
        assert_eq!(json["status"], "no_knowledge_found");
    }

    #[test]
    fn test_stats_average_ignores_cache_hits() {
        let stats = SearchStats {
            total_queries: 3,
            cache_hits: 1,
            live_latency_ms_total: 10.0,
            ..Default::default()
        };
        assert!((stats.average_latency_ms() - 5.0).abs() < 1e-9);
    }
}
