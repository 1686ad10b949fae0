//! Full-text search over the FTS5 shadow tables.
//!
//! Queries are sanitized into quoted terms before reaching `MATCH`, so
//! operator characters (`@`, `:`, parentheses, periods, quotes, ...) can
//! never produce a parse error. A missing table yields no hits.

use anyhow::Result;
use sqlx::Row;

use crate::models::{Collection, StoredRecord};
use crate::store::{pattern_from_row, reference_from_row, KnowledgeStore};

/// One ranked hit. `score` is the negated bm25 rank, higher is better.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub record: StoredRecord,
    pub snippet: String,
    pub score: f64,
}

/// Turn free text into an FTS5 expression of quoted terms (implicit AND).
///
/// Returns `None` when nothing searchable is left.
pub fn sanitize_query(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Ranked search over one collection, best match first.
pub async fn search(
    store: &KnowledgeStore,
    collection: Collection,
    query: &str,
    limit: i64,
    snippet_tokens: i64,
) -> Result<Vec<FtsHit>> {
    let Some(expr) = sanitize_query(query) else {
        return Ok(Vec::new());
    };

    let sql = match collection {
        Collection::Patterns => {
            r#"
            SELECT p.id AS id, p.title AS title, p.content AS content, p.folder AS folder,
                   p.library AS library, p.pattern_type AS pattern_type, p.source_path AS source_path,
                   p.tags AS tags, p.summary AS summary, p.word_count AS word_count,
                   p.created_at AS created_at, p.updated_at AS updated_at,
                   bm25(patterns_fts, 1.0, 0.75, 0.25, 0.5) AS bm25_rank,
                   snippet(patterns_fts, 0, '>>>', '<<<', '...', ?) AS snippet
            FROM patterns_fts
            JOIN patterns p ON p.rowid = patterns_fts.rowid
            WHERE patterns_fts MATCH ?
            ORDER BY bm25_rank, p.id
            LIMIT ?
            "#
        }
        Collection::Reference => {
            r#"
            SELECT r.id AS id, r.title AS title, r.content AS content, r.folder_path AS folder_path,
                   r.doc_type AS doc_type, r.library AS library, r.file_path AS file_path,
                   r.word_count AS word_count, r.summary AS summary, r.tags AS tags,
                   r.created_at AS created_at, r.updated_at AS updated_at,
                   bm25(reference_fts, 1.0, 0.75, 0.25, 0.25, 0.5, 0.5) AS bm25_rank,
                   snippet(reference_fts, 0, '>>>', '<<<', '...', ?) AS snippet
            FROM reference_fts
            JOIN reference r ON r.rowid = reference_fts.rowid
            WHERE reference_fts MATCH ?
            ORDER BY bm25_rank, r.id
            LIMIT ?
            "#
        }
    };

    let result = sqlx::query(sql)
        .bind(snippet_tokens)
        .bind(&expr)
        .bind(limit)
        .fetch_all(store.pool())
        .await;

    let rows = match result {
        Ok(rows) => rows,
        Err(sqlx::Error::Database(e)) if e.message().contains("no such table") => {
            tracing::debug!(collection = %collection, "index not created yet, no results");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("bm25_rank");
            let record = match collection {
                Collection::Patterns => StoredRecord::Pattern(pattern_from_row(row)),
                Collection::Reference => StoredRecord::Reference(reference_from_row(row)),
            };
            FtsHit {
                record,
                snippet: row.get("snippet"),
                score: -rank,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_query_syntax() {
        assert_eq!(
            sanitize_query("@Dependency(\\.client)").as_deref(),
            Some("\"Dependency\" \"client\"")
        );
    }

    #[test]
    fn test_sanitize_neutralizes_operators() {
        assert_eq!(
            sanitize_query("title:foo AND \"bar\" NOT baz*").as_deref(),
            Some("\"title\" \"foo\" \"AND\" \"bar\" \"NOT\" \"baz\"")
        );
    }

    #[test]
    fn test_sanitize_empty_and_punctuation_only() {
        assert_eq!(sanitize_query(""), None);
        assert_eq!(sanitize_query("  @:().  "), None);
    }

    #[test]
    fn test_sanitize_keeps_underscores_and_unicode() {
        assert_eq!(
            sanitize_query("snake_case café").as_deref(),
            Some("\"snake_case\" \"café\"")
        );
    }
}
