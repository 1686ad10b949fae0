//! Library validation and store health checks.
//!
//! `kb validate <library>` scores a library on five axes and passes when the
//! average reaches [`PASS_THRESHOLD`]:
//!
//! | Score | Meaning |
//! |-------|---------|
//! | integrity | share of reference documents with usable content and title |
//! | search | share of probe queries that return a hit |
//! | pattern | share of synthesized patterns that are not thin (0 when none exist) |
//! | health | share of reference documents carrying tags |
//! | scripts | share of configured external scripts that succeed (1 when none) |
//!
//! `kb health` checks the store itself: SQLite integrity, FTS row alignment,
//! and a probe search.

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;

use crate::config::Config;
use crate::external::{run_script, ScriptOutcome};
use crate::fts;
use crate::models::{Collection, ReferenceRecord};
use crate::store::KnowledgeStore;

pub const PASS_THRESHOLD: f64 = 0.7;

const MAX_PROBES: usize = 5;
const PROBE_DOCUMENTS: usize = 3;
const GENERIC_PROBES: &[&str] = &["example", "usage", "overview", "guide", "api"];
const MIN_CONTENT_CHARS: usize = 50;
const MIN_TITLE_CHARS: usize = 3;
const MIN_PATTERN_WORDS: i64 = 20;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidationScores {
    pub integrity: f64,
    pub search: f64,
    pub pattern: f64,
    pub health: f64,
    pub scripts: f64,
}

impl ValidationScores {
    pub fn average(&self) -> f64 {
        (self.integrity + self.search + self.pattern + self.health + self.scripts) / 5.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub query: String,
    pub hits: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ScriptOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub library: String,
    pub documents: usize,
    pub patterns: usize,
    pub scores: ValidationScores,
    pub average: f64,
    pub passed: bool,
    pub issues: Vec<String>,
    pub probes: Vec<ProbeResult>,
    pub scripts: Vec<ScriptResult>,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn print(&self) {
        println!("validate {}", self.library);
        println!("  documents: {}", self.documents);
        println!("  patterns:  {}", self.patterns);
        println!();
        println!("  integrity  {:.2}", self.scores.integrity);
        println!("  search     {:.2}", self.scores.search);
        println!("  pattern    {:.2}", self.scores.pattern);
        println!("  health     {:.2}", self.scores.health);
        println!("  scripts    {:.2}", self.scores.scripts);
        println!("  average    {:.2}", self.average);

        if !self.probes.is_empty() {
            println!();
            println!("  probes:");
            for probe in &self.probes {
                println!("    {:<32} {} hit(s)", probe.query, probe.hits);
            }
        }
        if !self.scripts.is_empty() {
            println!();
            println!("  scripts:");
            for script in &self.scripts {
                println!("    {:<24} {}", script.name, script.outcome.describe());
            }
        }
        if !self.issues.is_empty() {
            println!();
            println!("  issues:");
            for issue in &self.issues {
                println!("    - {}", issue);
            }
        }
        println!();
        println!("  recommendations:");
        for rec in &self.recommendations {
            println!("    - {}", rec);
        }
        println!();
        println!("status: {}", if self.passed { "passed" } else { "failed" });
    }
}

pub async fn validate_library(
    config: &Config,
    store: &KnowledgeStore,
    library: &str,
) -> Result<ValidationReport> {
    let documents = store.reference_for_library(library).await?;
    let patterns = store.patterns_for_library(library).await?;
    let mut issues = Vec::new();

    // Integrity
    let broken = documents
        .iter()
        .filter(|d| {
            d.content.trim().chars().count() < MIN_CONTENT_CHARS
                || d.title.trim().chars().count() < MIN_TITLE_CHARS
        })
        .count();
    if broken > 0 {
        issues.push(format!("{} document(s) with short content or title", broken));
    }
    let integrity = ratio_ok(broken, documents.len());

    // Search probes
    let mut probes = Vec::new();
    for query in probe_queries(&documents) {
        let hits = fts::search(store, Collection::Reference, &query, 3, 8).await?;
        probes.push(ProbeResult {
            query,
            hits: hits.len(),
        });
    }
    let probe_hits = probes.iter().filter(|p| p.hits > 0).count();
    let search = if probes.is_empty() {
        0.0
    } else {
        probe_hits as f64 / probes.len() as f64
    };
    if probe_hits < probes.len() {
        issues.push(format!(
            "{} of {} probe queries returned nothing",
            probes.len() - probe_hits,
            probes.len()
        ));
    }

    // Patterns
    let poor = patterns
        .iter()
        .filter(|p| p.word_count < MIN_PATTERN_WORDS || p.tags.is_empty())
        .count();
    if patterns.is_empty() {
        issues.push("no synthesized patterns".to_string());
    } else if poor > 0 {
        issues.push(format!("{} thin or untagged pattern(s)", poor));
    }
    let pattern = ratio_ok(poor, patterns.len());

    // Tag health
    let untagged = documents.iter().filter(|d| d.tags.is_empty()).count();
    if untagged > 0 {
        issues.push(format!("{} untagged document(s)", untagged));
    }
    let health = ratio_ok(untagged, documents.len());

    // External scripts
    let timeout = Duration::from_secs(config.validation.timeout_secs);
    let mut scripts = Vec::new();
    for script in &config.validation.scripts {
        let mut args = script.args.clone();
        args.push(library.to_string());
        let outcome = run_script(&script.command, &args, timeout).await;
        scripts.push(ScriptResult {
            name: script.name.clone(),
            outcome,
        });
    }
    let scripts_score = if scripts.is_empty() {
        1.0
    } else {
        scripts.iter().filter(|s| s.outcome.succeeded()).count() as f64 / scripts.len() as f64
    };

    if documents.is_empty() {
        issues.push(format!("no reference documents for library {}", library));
    }

    let scores = ValidationScores {
        integrity,
        search,
        pattern,
        health,
        scripts: scripts_score,
    };
    let average = scores.average();

    tracing::info!(library, average, "validation complete");

    Ok(ValidationReport {
        library: library.to_string(),
        documents: documents.len(),
        patterns: patterns.len(),
        recommendations: recommendations(library, &scores),
        passed: average >= PASS_THRESHOLD,
        average,
        scores,
        issues,
        probes,
        scripts,
    })
}

/// `1 - bad/total`, or 0 for an empty population.
fn ratio_ok(bad: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        1.0 - bad as f64 / total as f64
    }
}

/// Title words and tags of the first documents, padded with generic terms.
pub fn probe_queries(documents: &[ReferenceRecord]) -> Vec<String> {
    if documents.is_empty() {
        return Vec::new();
    }

    fn push(probes: &mut Vec<String>, query: String) {
        if !query.trim().is_empty() && !probes.contains(&query) && probes.len() < MAX_PROBES {
            probes.push(query);
        }
    }

    let mut probes: Vec<String> = Vec::new();

    for doc in documents.iter().take(PROBE_DOCUMENTS) {
        let words: Vec<&str> = doc.title.split_whitespace().take(3).collect();
        push(&mut probes, words.join(" "));
    }
    if let Some(tag) = documents[0].tags.iter().next() {
        push(&mut probes, tag.clone());
    }
    for generic in GENERIC_PROBES {
        push(&mut probes, generic.to_string());
    }

    probes
}

pub fn recommendations(library: &str, scores: &ValidationScores) -> Vec<String> {
    let mut out = Vec::new();
    if scores.integrity < 0.9 {
        out.push("Review documents with very short content or missing titles".to_string());
    }
    if scores.search < 0.8 {
        out.push("Search probes are missing documents; run `kb health` and re-import the library".to_string());
    }
    if scores.pattern < 0.7 {
        out.push(format!("Run `kb synthesize {}` to generate or refresh patterns", library));
    }
    if scores.health < 0.8 {
        out.push("Improve tag coverage by adding front matter tags or hashtags".to_string());
    }
    if scores.scripts < 1.0 {
        out.push("Fix the failing validation scripts listed above".to_string());
    }
    if out.is_empty() {
        out.push(format!("{} looks healthy; no action needed", library));
    }
    out
}

// ============ Store health ============

#[derive(Debug, Clone, Serialize)]
pub struct FtsAlignment {
    pub table: String,
    pub rows: i64,
    pub fts_rows: i64,
}

impl FtsAlignment {
    pub fn aligned(&self) -> bool {
        self.rows == self.fts_rows
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub patterns: i64,
    pub reference: i64,
    pub relations: i64,
    pub integrity_check: String,
    pub fts: Vec<FtsAlignment>,
    pub probe: Option<ProbeResult>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.integrity_check == "ok"
            && self.fts.iter().all(FtsAlignment::aligned)
            && self.probe.as_ref().map_or(true, |p| p.hits > 0)
    }

    pub fn print(&self) {
        println!("health");
        println!("  patterns:        {}", self.patterns);
        println!("  reference:       {}", self.reference);
        println!("  relations:       {}", self.relations);
        println!("  integrity_check: {}", self.integrity_check);
        for fts in &self.fts {
            println!(
                "  {:<16} {} rows / {} indexed{}",
                format!("{}:", fts.table),
                fts.rows,
                fts.fts_rows,
                if fts.aligned() { "" } else { "  MISALIGNED" }
            );
        }
        match &self.probe {
            Some(probe) => println!("  probe:           \"{}\" -> {} hit(s)", probe.query, probe.hits),
            None => println!("  probe:           skipped (empty store)"),
        }
        println!();
        println!("status: {}", if self.healthy() { "healthy" } else { "unhealthy" });
    }
}

pub async fn check_health(store: &KnowledgeStore) -> Result<HealthReport> {
    let pool = store.pool();
    let integrity_check: String = sqlx::query_scalar("PRAGMA integrity_check")
        .fetch_one(pool)
        .await?;

    let mut fts = Vec::new();
    for collection in [Collection::Patterns, Collection::Reference] {
        let fts_rows: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", collection.fts_table()))
                .fetch_one(pool)
                .await?;
        fts.push(FtsAlignment {
            table: collection.table().to_string(),
            rows: store.count(collection).await?,
            fts_rows,
        });
    }

    let first_title: Option<String> = sqlx::query_scalar(
        r#"
        SELECT title FROM (
            SELECT title, id FROM patterns
            UNION ALL
            SELECT title, id FROM reference
        )
        WHERE trim(title) != ''
        ORDER BY id
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let mut probe = None;
    if let Some(title) = first_title {
        let query: String = title.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
        let mut hits = fts::search(store, Collection::Patterns, &query, 1, 8).await?.len();
        if hits == 0 {
            hits = fts::search(store, Collection::Reference, &query, 1, 8).await?.len();
        }
        probe = Some(ProbeResult { query, hits });
    }

    Ok(HealthReport {
        patterns: store.count(Collection::Patterns).await?,
        reference: store.count(Collection::Reference).await?,
        relations: store.count_relations().await?,
        integrity_check,
        fts,
        probe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, TagSet};

    fn doc(title: &str, tags: &[&str]) -> ReferenceRecord {
        ReferenceRecord {
            id: title.to_string(),
            title: title.to_string(),
            content: String::new(),
            folder_path: "root".to_string(),
            doc_type: DocType::Documentation,
            library: "Lib".to_string(),
            file_path: format!("{}.md", title),
            word_count: 0,
            summary: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect::<TagSet>(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_probe_queries_mix_titles_tags_and_generic_terms() {
        let docs = vec![doc("Fetching rows from tables", &["lib"]), doc("Sync", &[])];
        assert_eq!(
            probe_queries(&docs),
            vec!["Fetching rows from", "Sync", "lib", "example", "usage"]
        );
        assert!(probe_queries(&[]).is_empty());
    }

    #[test]
    fn test_average_and_threshold() {
        let scores = ValidationScores {
            integrity: 1.0,
            search: 1.0,
            pattern: 0.0,
            health: 1.0,
            scripts: 1.0,
        };
        assert!((scores.average() - 0.8).abs() < 1e-9);
        let recs = recommendations("Lib", &scores);
        assert_eq!(recs, vec!["Run `kb synthesize Lib` to generate or refresh patterns".to_string()]);
    }

    #[test]
    fn test_healthy_library_recommendation() {
        let scores = ValidationScores {
            integrity: 1.0,
            search: 1.0,
            pattern: 1.0,
            health: 1.0,
            scripts: 1.0,
        };
        assert_eq!(recommendations("Lib", &scores), vec!["Lib looks healthy; no action needed".to_string()]);
    }

    #[test]
    fn test_ratio_ok_of_empty_population_is_zero() {
        assert_eq!(ratio_ok(0, 0), 0.0);
        assert_eq!(ratio_ok(1, 4), 0.75);
    }
}
