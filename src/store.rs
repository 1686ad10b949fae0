//! Content store over SQLite.
//!
//! [`KnowledgeStore`] owns the connection pool for one session. Every write
//! refreshes the matching FTS5 row inside the same transaction, so an index
//! row always follows its record row 1:1 (same rowid).

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{
    tags_from_json, tags_to_json, Collection, DocType, PatternRecord, ReferenceRecord, Relation,
    StoredRecord, TagSet,
};

pub const WIKI_LINK: &str = "wiki_link";

const PATTERN_COLUMNS: &str = "id, title, content, folder, library, pattern_type, source_path, tags, summary, word_count, created_at, updated_at";
const REFERENCE_COLUMNS: &str = "id, title, content, folder_path, doc_type, library, file_path, word_count, summary, tags, created_at, updated_at";

#[derive(Clone)]
pub struct KnowledgeStore {
    pool: SqlitePool,
}

impl KnowledgeStore {
    /// Connect and lazily create the schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool without touching the schema.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ============ Writes ============

    pub async fn upsert_pattern(&self, record: &PatternRecord) -> Result<()> {
        let now = Utc::now().timestamp();
        let tags_json = tags_to_json(&record.tags);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO patterns (id, title, content, folder, library, pattern_type, source_path, tags, summary, word_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                folder = excluded.folder,
                library = excluded.library,
                pattern_type = excluded.pattern_type,
                source_path = excluded.source_path,
                tags = excluded.tags,
                summary = excluded.summary,
                word_count = excluded.word_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.folder)
        .bind(&record.library)
        .bind(&record.pattern_type)
        .bind(&record.source_path)
        .bind(&tags_json)
        .bind(&record.summary)
        .bind(record.word_count)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let rowid: i64 = sqlx::query_scalar("SELECT rowid FROM patterns WHERE id = ?")
            .bind(&record.id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM patterns_fts WHERE rowid = ?")
            .bind(rowid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO patterns_fts (rowid, content, title, folder, tags) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(rowid)
        .bind(&record.content)
        .bind(&record.title)
        .bind(&record.folder)
        .bind(index_tags(&record.tags))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_reference(&self, record: &ReferenceRecord) -> Result<()> {
        let now = Utc::now().timestamp();
        let tags_json = tags_to_json(&record.tags);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO reference (id, title, content, folder_path, doc_type, library, file_path, word_count, summary, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                folder_path = excluded.folder_path,
                doc_type = excluded.doc_type,
                library = excluded.library,
                file_path = excluded.file_path,
                word_count = excluded.word_count,
                summary = excluded.summary,
                tags = excluded.tags,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.folder_path)
        .bind(record.doc_type.as_str())
        .bind(&record.library)
        .bind(&record.file_path)
        .bind(record.word_count)
        .bind(&record.summary)
        .bind(&tags_json)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let rowid: i64 = sqlx::query_scalar("SELECT rowid FROM reference WHERE id = ?")
            .bind(&record.id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM reference_fts WHERE rowid = ?")
            .bind(rowid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO reference_fts (rowid, content, title, folder_path, library, tags, summary) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rowid)
        .bind(&record.content)
        .bind(&record.title)
        .bind(&record.folder_path)
        .bind(&record.library)
        .bind(index_tags(&record.tags))
        .bind(&record.summary)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace every outbound relation of `source_id` (delete, then insert).
    pub async fn replace_relations(&self, source_id: &str, targets: &[String]) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM relations WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        for target in targets {
            if target == source_id {
                continue;
            }
            let result = sqlx::query(
                "INSERT OR IGNORE INTO relations (source_id, target_id, relation_type, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(source_id)
            .bind(target)
            .bind(WIKI_LINK)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Clear the patterns collection: records, index rows and their relations.
    pub async fn clear_patterns(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM relations WHERE source_id IN (SELECT id FROM patterns)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM patterns_fts")
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM patterns")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed)
    }

    // ============ Reads ============

    pub async fn get_by_id(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>> {
        Ok(match collection {
            Collection::Patterns => self.get_pattern(id).await?.map(StoredRecord::Pattern),
            Collection::Reference => self.get_reference(id).await?.map(StoredRecord::Reference),
        })
    }

    /// Look an id up in patterns first, then reference.
    pub async fn find(&self, id: &str) -> Result<Option<StoredRecord>> {
        if let Some(record) = self.get_by_id(Collection::Patterns, id).await? {
            return Ok(Some(record));
        }
        self.get_by_id(Collection::Reference, id).await
    }

    pub async fn get_pattern(&self, id: &str) -> Result<Option<PatternRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM patterns WHERE id = ?", PATTERN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(pattern_from_row))
    }

    pub async fn get_reference(&self, id: &str) -> Result<Option<ReferenceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reference WHERE id = ?",
            REFERENCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(reference_from_row))
    }

    pub async fn list_by_library(
        &self,
        collection: Collection,
        library: &str,
    ) -> Result<Vec<StoredRecord>> {
        Ok(match collection {
            Collection::Patterns => self
                .patterns_for_library(library)
                .await?
                .into_iter()
                .map(StoredRecord::Pattern)
                .collect(),
            Collection::Reference => self
                .reference_for_library(library)
                .await?
                .into_iter()
                .map(StoredRecord::Reference)
                .collect(),
        })
    }

    pub async fn patterns_for_library(&self, library: &str) -> Result<Vec<PatternRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM patterns WHERE library = ? ORDER BY id",
            PATTERN_COLUMNS
        ))
        .bind(library)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(pattern_from_row).collect())
    }

    pub async fn reference_for_library(&self, library: &str) -> Result<Vec<ReferenceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reference WHERE library = ? ORDER BY id",
            REFERENCE_COLUMNS
        ))
        .bind(library)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(reference_from_row).collect())
    }

    /// First `limit` reference records of a library, ordered by id.
    pub async fn sample_reference(&self, library: &str, limit: i64) -> Result<Vec<ReferenceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reference WHERE library = ? ORDER BY id LIMIT ?",
            REFERENCE_COLUMNS
        ))
        .bind(library)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(reference_from_row).collect())
    }

    /// Every reference record, for whole-store comparisons.
    pub async fn all_reference(&self) -> Result<Vec<ReferenceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reference ORDER BY id",
            REFERENCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(reference_from_row).collect())
    }

    /// Reference titles of a library, matched exactly or by substring.
    pub async fn reference_titles_like(&self, library: &str) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT id, title FROM reference WHERE library = ? OR library LIKE ? ESCAPE '\\' ORDER BY id",
        )
        .bind(library)
        .bind(format!("%{}%", escape_like(library)))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("title")))
            .collect())
    }

    pub async fn reference_libraries(&self) -> Result<Vec<String>> {
        let libraries: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT library FROM reference ORDER BY library")
                .fetch_all(&self.pool)
                .await?;
        Ok(libraries)
    }

    /// First record (by insertion order) whose title contains `fragment`.
    pub async fn find_id_by_title(
        &self,
        collection: Collection,
        fragment: &str,
        exclude_id: &str,
    ) -> Result<Option<String>> {
        let sql = format!(
            "SELECT id FROM {} WHERE title LIKE ? ESCAPE '\\' AND id != ? ORDER BY rowid LIMIT 1",
            collection.table()
        );
        let id: Option<String> = sqlx::query_scalar(&sql)
            .bind(format!("%{}%", escape_like(fragment)))
            .bind(exclude_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn relations_from(&self, source_id: &str) -> Result<Vec<Relation>> {
        let rows = sqlx::query(
            "SELECT source_id, target_id, relation_type, created_at FROM relations WHERE source_id = ? ORDER BY target_id",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| Relation {
                source_id: row.get("source_id"),
                target_id: row.get("target_id"),
                relation_type: row.get("relation_type"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn count(&self, collection: Collection) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", collection.table()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_relations(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM relations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Tags as whitespace-separated terms for the FTS tokenizer.
fn index_tags(tags: &TagSet) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(" ")
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub(crate) fn pattern_from_row(row: &SqliteRow) -> PatternRecord {
    let tags: String = row.get("tags");
    PatternRecord {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        folder: row.get("folder"),
        library: row.get("library"),
        pattern_type: row.get("pattern_type"),
        source_path: row.get("source_path"),
        tags: tags_from_json(&tags),
        summary: row.get("summary"),
        word_count: row.get("word_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) fn reference_from_row(row: &SqliteRow) -> ReferenceRecord {
    let tags: String = row.get("tags");
    let doc_type: String = row.get("doc_type");
    ReferenceRecord {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        folder_path: row.get("folder_path"),
        doc_type: DocType::from_stored(&doc_type),
        library: row.get("library"),
        file_path: row.get("file_path"),
        word_count: row.get("word_count"),
        summary: row.get("summary"),
        tags: tags_from_json(&tags),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_index_tags_space_joined() {
        let tags: TagSet = ["tca", "reducer"].iter().map(|s| s.to_string()).collect();
        assert_eq!(index_tags(&tags), "reducer tca");
    }
}
