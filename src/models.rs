//! Record types stored in the knowledge base.
//!
//! Patterns are curated problem/solution documents, reference records are
//! raw imported documentation. Both carry a [`TagSet`] persisted as a JSON
//! array.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Unordered, deduplicated tag set. Serialized as a sorted JSON array.
pub type TagSet = BTreeSet<String>;

/// Which document collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Patterns,
    Reference,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Patterns => "patterns",
            Collection::Reference => "reference",
        }
    }

    pub fn fts_table(&self) -> &'static str {
        match self {
            Collection::Patterns => "patterns_fts",
            Collection::Reference => "reference_fts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Classification of a reference document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Api,
    Article,
    Extension,
    Tutorial,
    Documentation,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Api => "api",
            DocType::Article => "article",
            DocType::Extension => "extension",
            DocType::Tutorial => "tutorial",
            DocType::Documentation => "documentation",
        }
    }

    /// Human label, e.g. `API`, `Article`.
    pub fn label(&self) -> &'static str {
        match self {
            DocType::Api => "API",
            DocType::Article => "Article",
            DocType::Extension => "Extension",
            DocType::Tutorial => "Tutorial",
            DocType::Documentation => "Documentation",
        }
    }

    /// Parse a stored value. Unknown values read back as documentation.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "api" => DocType::Api,
            "article" => DocType::Article,
            "extension" => DocType::Extension,
            "tutorial" => DocType::Tutorial,
            _ => DocType::Documentation,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub folder: String,
    pub library: Option<String>,
    /// Synthesized subtype, `None` for curated repository documents.
    pub pattern_type: Option<String>,
    pub source_path: Option<String>,
    pub tags: TagSet,
    pub summary: String,
    pub word_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub folder_path: String,
    pub doc_type: DocType,
    pub library: String,
    pub file_path: String,
    pub word_count: i64,
    pub summary: String,
    pub tags: TagSet,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Directed cross-reference discovered from `[[wiki link]]` syntax.
#[derive(Debug, Clone, Serialize)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub created_at: i64,
}

/// A record from either collection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "collection", rename_all = "snake_case")]
pub enum StoredRecord {
    Pattern(PatternRecord),
    Reference(ReferenceRecord),
}

impl StoredRecord {
    pub fn collection(&self) -> Collection {
        match self {
            StoredRecord::Pattern(_) => Collection::Patterns,
            StoredRecord::Reference(_) => Collection::Reference,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            StoredRecord::Pattern(p) => &p.id,
            StoredRecord::Reference(r) => &r.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            StoredRecord::Pattern(p) => &p.title,
            StoredRecord::Reference(r) => &r.title,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            StoredRecord::Pattern(p) => &p.content,
            StoredRecord::Reference(r) => &r.content,
        }
    }

    pub fn tags(&self) -> &TagSet {
        match self {
            StoredRecord::Pattern(p) => &p.tags,
            StoredRecord::Reference(r) => &r.tags,
        }
    }
}

pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

pub fn tags_to_json(tags: &TagSet) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a stored tag array. Malformed values yield an empty set.
pub fn tags_from_json(raw: &str) -> TagSet {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags.into_iter().collect(),
        Err(e) => {
            tracing::warn!(error = %e, "malformed tag array in store, treating as empty");
            TagSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_json_is_sorted_and_deduplicated() {
        let tags: TagSet = ["swift", "sqlite", "swift"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tags_to_json(&tags), r#"["sqlite","swift"]"#);
    }

    #[test]
    fn test_malformed_tags_read_as_empty() {
        assert!(tags_from_json("not json").is_empty());
        assert!(tags_from_json("[]").is_empty());
        assert_eq!(tags_from_json(r#"["a","b"]"#).len(), 2);
    }

    #[test]
    fn test_unknown_doc_type_reads_as_documentation() {
        assert_eq!(DocType::from_stored("api"), DocType::Api);
        assert_eq!(DocType::from_stored("weird"), DocType::Documentation);
    }
}
