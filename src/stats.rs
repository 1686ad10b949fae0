//! Per-library statistics for `kb report`.
//!
//! Counts reference documents, words, tag coverage, doc-type breakdown and
//! synthesized patterns per library, plus collection totals and the database
//! file size. The validation layer reads the same numbers.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::Collection;
use crate::store::KnowledgeStore;

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub library: String,
    pub documents: i64,
    pub words: i64,
    pub tagged_documents: i64,
    pub doc_types: BTreeMap<String, i64>,
    pub patterns: i64,
}

impl LibraryStats {
    /// Percentage of reference documents carrying at least one tag.
    pub fn tag_coverage(&self) -> f64 {
        if self.documents == 0 {
            0.0
        } else {
            self.tagged_documents as f64 * 100.0 / self.documents as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeReport {
    pub patterns: i64,
    pub curated_patterns: i64,
    pub reference: i64,
    pub relations: i64,
    pub db_bytes: u64,
    pub libraries: Vec<LibraryStats>,
}

pub async fn library_stats(store: &KnowledgeStore, library: &str) -> Result<LibraryStats> {
    let pool = store.pool();

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS documents,
               COALESCE(SUM(word_count), 0) AS words,
               COALESCE(SUM(CASE WHEN tags != '[]' THEN 1 ELSE 0 END), 0) AS tagged
        FROM reference
        WHERE library = ?
        "#,
    )
    .bind(library)
    .fetch_one(pool)
    .await?;

    let doc_types = sqlx::query(
        "SELECT doc_type, COUNT(*) AS n FROM reference WHERE library = ? GROUP BY doc_type ORDER BY doc_type",
    )
    .bind(library)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| (r.get::<String, _>("doc_type"), r.get::<i64, _>("n")))
    .collect();

    let patterns: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patterns WHERE library = ?")
        .bind(library)
        .fetch_one(pool)
        .await?;

    Ok(LibraryStats {
        library: library.to_string(),
        documents: row.get("documents"),
        words: row.get("words"),
        tagged_documents: row.get("tagged"),
        doc_types,
        patterns,
    })
}

/// Report over one library, or every library present in either collection.
pub async fn collect_report(
    config: &Config,
    store: &KnowledgeStore,
    library: Option<&str>,
) -> Result<KnowledgeReport> {
    let libraries: Vec<String> = match library {
        Some(lib) => vec![lib.to_string()],
        None => {
            sqlx::query_scalar(
                r#"
                SELECT library FROM reference
                UNION
                SELECT library FROM patterns WHERE library IS NOT NULL
                ORDER BY 1
                "#,
            )
            .fetch_all(store.pool())
            .await?
        }
    };

    let mut per_library = Vec::with_capacity(libraries.len());
    for lib in &libraries {
        per_library.push(library_stats(store, lib).await?);
    }

    let curated_patterns: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM patterns WHERE library IS NULL")
            .fetch_one(store.pool())
            .await?;

    Ok(KnowledgeReport {
        patterns: store.count(Collection::Patterns).await?,
        curated_patterns,
        reference: store.count(Collection::Reference).await?,
        relations: store.count_relations().await?,
        db_bytes: std::fs::metadata(&config.db.path)
            .map(|m| m.len())
            .unwrap_or(0),
        libraries: per_library,
    })
}

pub async fn run_report(config: &Config, library: Option<&str>) -> Result<()> {
    let store = KnowledgeStore::open(config).await?;
    let report = collect_report(config, &store, library).await?;
    store.close().await;

    println!("Knowledge Base Report");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(report.db_bytes));
    println!();
    println!(
        "  Patterns:    {} ({} curated)",
        report.patterns, report.curated_patterns
    );
    println!("  Reference:   {}", report.reference);
    println!("  Relations:   {}", report.relations);

    if !report.libraries.is_empty() {
        println!();
        println!("  By library:");
        println!(
            "  {:<24} {:>6} {:>9} {:>8} {:>9}",
            "LIBRARY", "DOCS", "WORDS", "TAGGED", "PATTERNS"
        );
        println!("  {}", "-".repeat(60));
        for lib in &report.libraries {
            println!(
                "  {:<24} {:>6} {:>9} {:>7.0}% {:>9}",
                lib.library,
                lib.documents,
                lib.words,
                lib.tag_coverage(),
                lib.patterns
            );
            if !lib.doc_types.is_empty() {
                let breakdown: Vec<String> = lib
                    .doc_types
                    .iter()
                    .map(|(t, n)| format!("{} {}", t, n))
                    .collect();
                println!("  {:<24} {}", "", breakdown.join(", "));
            }
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_tag_coverage_of_empty_library() {
        let stats = LibraryStats {
            library: "None".to_string(),
            documents: 0,
            words: 0,
            tagged_documents: 0,
            doc_types: BTreeMap::new(),
            patterns: 0,
        };
        assert_eq!(stats.tag_coverage(), 0.0);
    }
}
