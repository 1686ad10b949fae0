//! Schema creation.
//!
//! Tables and indexes are created if absent and never dropped. FTS5 shadow
//! tables are standalone (not external-content); their rowid is kept equal
//! to the owning record's rowid by [`crate::store`].

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `kb init`: create the database file and the full schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            folder TEXT NOT NULL DEFAULT 'general',
            library TEXT,
            pattern_type TEXT,
            source_path TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            summary TEXT NOT NULL DEFAULT '',
            word_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reference (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            folder_path TEXT NOT NULL DEFAULT 'root',
            doc_type TEXT NOT NULL DEFAULT 'documentation',
            library TEXT NOT NULL,
            file_path TEXT NOT NULL,
            word_count INTEGER NOT NULL DEFAULT 0,
            summary TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(library, file_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relations (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            relation_type TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (source_id, target_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 has no IF NOT EXISTS guarantee across SQLite builds, so check first
    if !table_exists(pool, "patterns_fts").await? {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE patterns_fts USING fts5(
                content,
                title,
                folder,
                tags
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    if !table_exists(pool, "reference_fts").await? {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE reference_fts USING fts5(
                content,
                title,
                folder_path,
                library,
                tags,
                summary
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patterns_library ON patterns(library)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patterns_folder ON patterns(folder)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reference_library ON reference(library)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}
