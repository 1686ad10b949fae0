//! Metadata extraction from raw markdown.
//!
//! Front matter wins over inference. Category, doc-type and topic-tag
//! classification are ordered rule tables: the first matching row wins, so
//! priority is data rather than control flow.

use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;

use crate::models::{DocType, TagSet};

/// Category rules, checked in order against the lowercase file name and body.
pub const CATEGORY_RULES: &[(&str, &[&str])] = &[
    ("tca", &["tca", "reducer", "state", "scope", "pointfree"]),
    ("swiftui", &["swiftui", "stateobject", "observedobject", "@state"]),
    ("visionos", &["visionos", "spatial", "realitykit", "shareplay", "arkit"]),
    ("smith", &["smith", "agent", "maxwell", "skill"]),
    ("errors", &["error", "compilation", "debug", "fix"]),
    ("architecture", &["architecture", "pattern", "design", "module"]),
    ("platform-specific", &["ios", "macos", "ipados", "platform"]),
];

pub const DEFAULT_CATEGORY: &str = "general";

/// Hashtag markers recognised in document bodies.
pub const HASHTAG_TAGS: &[&str] = &[
    "swiftui",
    "tca",
    "ios",
    "macos",
    "visionos",
    "ipados",
    "stateobject",
    "observedobject",
    "shared",
    "reducer",
    "compilation",
    "error",
    "fix",
    "solution",
    "pattern",
    "architecture",
    "performance",
    "memory",
    "debugging",
    "swift",
    "xcode",
    "testing",
    "navigation",
    "state",
];

/// Doc-type rules over the lowercase folder path.
pub const DOC_TYPE_RULES: &[(&str, DocType)] = &[
    ("article", DocType::Article),
    ("extension", DocType::Extension),
    ("api", DocType::Api),
    ("reference", DocType::Api),
    ("tutorial", DocType::Tutorial),
    ("guide", DocType::Tutorial),
];

const API_BODY_HINTS: &[&str] = &["method", "function", "property", "class"];

/// Topic tags: a tag applies when any keyword appears as a word (or phrase).
pub const TOPIC_TAG_RULES: &[(&str, &[&str])] = &[
    ("sqlite", &["sqlite"]),
    ("swift", &["swift"]),
    ("swiftui", &["swiftui"]),
    ("uikit", &["uikit"]),
    ("tca", &["tca", "composable architecture"]),
    ("visionos", &["visionos"]),
    ("arkit", &["arkit"]),
    ("realitykit", &["realitykit"]),
    ("coredata", &["coredata", "core data"]),
    ("cloudkit", &["cloudkit"]),
    ("shareplay", &["shareplay"]),
    ("grdb", &["grdb"]),
    ("database", &["database", "databases"]),
    ("querying", &["query", "queries", "querying"]),
    ("migration", &["migration", "migrations", "migrating"]),
    ("synchronization", &["sync", "synchronization", "synchronize"]),
    ("deletion", &["delete", "deleting", "deletion"]),
    ("insertion", &["insert", "inserting", "insertion"]),
    ("update", &["update", "updating"]),
    ("fetching", &["fetch", "fetching", "select"]),
    ("testing", &["test", "tests", "testing"]),
    ("navigation", &["navigation", "navigate"]),
    ("performance", &["performance", "optimize", "optimization"]),
    ("concurrency", &["async", "await", "concurrency", "actor"]),
];

/// Parsed `---` header block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Byte offset where the body starts.
    pub body_start: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub title: String,
    pub category: String,
    pub tags: TagSet,
}

pub struct MetadataExtractor {
    wiki_link: Regex,
    hashtag: Regex,
}

impl MetadataExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            wiki_link: Regex::new(r"\[\[([^\]]+)\]\]")?,
            hashtag: Regex::new(r"#([A-Za-z][A-Za-z0-9_]*)")?,
        })
    }

    /// Derive (title, category, tags). Never fails; every field has a default.
    pub fn extract(&self, content: &str, file_name: &str) -> DocumentMetadata {
        let front = parse_front_matter(content).unwrap_or_default();
        let body = &content[front.body_start..];

        let title = front
            .title
            .filter(|t| !t.is_empty())
            .or_else(|| heading_title(body))
            .unwrap_or_else(|| humanize_file_name(file_name));

        let category = front
            .category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| classify_category(file_name, body).to_string());

        let tags: TagSet = if front.tags.is_empty() {
            self.hashtag_tags(body)
        } else {
            front.tags.into_iter().collect()
        };

        DocumentMetadata {
            title,
            category,
            tags,
        }
    }

    /// Known hashtag markers present in the text, case-insensitive.
    pub fn hashtag_tags(&self, content: &str) -> TagSet {
        self.hashtag
            .captures_iter(content)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().to_lowercase())
            .filter(|tag| HASHTAG_TAGS.contains(&tag.as_str()))
            .collect()
    }

    /// `[[Target]]` link texts, deduplicated, in order of appearance.
    pub fn wiki_links(&self, content: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.wiki_link
            .captures_iter(content)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|link| !link.is_empty() && seen.insert(link.clone()))
            .collect()
    }
}

pub fn parse_front_matter(content: &str) -> Option<FrontMatter> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let header_start = content.len() - rest.len();

    let mut front = FrontMatter::default();
    let mut offset = header_start;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            front.body_start = offset;
            return Some(front);
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "title" => front.title = Some(strip_quotes(value).to_string()),
            "category" => front.category = Some(strip_quotes(value).to_string()),
            "tags" => front.tags = parse_tag_list(value),
            _ => {}
        }
    }

    // Unterminated header: treat the whole document as body.
    None
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

fn parse_tag_list(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    inner
        .split(',')
        .map(|t| strip_quotes(t).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// First single-`#` heading within the first ten lines.
pub fn heading_title(body: &str) -> Option<String> {
    body.lines()
        .take(10)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `swift-ui_basics.md` → `Swift Ui Basics`.
pub fn humanize_file_name(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());

    let words: Vec<String> = stem
        .split(|c| c == '-' || c == '_' || c == ' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        "Untitled".to_string()
    } else {
        words.join(" ")
    }
}

pub fn classify_category(file_name: &str, content: &str) -> &'static str {
    let name = file_name.to_lowercase();
    let body = content.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|kw| name.contains(kw) || body.contains(kw))
        })
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

pub fn classify_doc_type(folder_path: &str, content: &str) -> DocType {
    let folder = folder_path.to_lowercase();
    if let Some((_, doc_type)) = DOC_TYPE_RULES.iter().find(|(kw, _)| folder.contains(kw)) {
        return *doc_type;
    }

    if content.starts_with('#') {
        let head = truncate_chars(content, 200).to_lowercase();
        if API_BODY_HINTS.iter().any(|hint| head.contains(hint)) {
            return DocType::Api;
        }
    }

    DocType::Documentation
}

/// `"{title}: {first prose line}"`, with title-only and body fallbacks.
pub fn generate_summary(title: &str, content: &str) -> String {
    let content = parse_front_matter(content)
        .map(|front| &content[front.body_start..])
        .unwrap_or(content);
    let mut in_code = false;
    let first_line = content.lines().map(str::trim).find(|line| {
        if line.starts_with("```") {
            in_code = !in_code;
            return false;
        }
        !in_code && !line.starts_with('#') && line != &"---" && line.chars().count() > 20
    });

    match (first_line, title.trim().is_empty()) {
        (Some(line), false) => format!("{}: {}", title, ellipsize(line, 100)),
        (Some(line), true) => ellipsize(line, 100),
        (None, false) => title.to_string(),
        (None, true) => truncate_chars(content.trim(), 80),
    }
}

pub fn topic_tags(content: &str) -> TagSet {
    let lower = content.to_lowercase();
    let words: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();

    TOPIC_TAG_RULES
        .iter()
        .filter(|(_, keywords)| {
            keywords.iter().any(|kw| {
                if kw.contains(' ') {
                    lower.contains(kw)
                } else {
                    words.contains(kw)
                }
            })
        })
        .map(|(tag, _)| tag.to_string())
        .collect()
}

/// Lowercase, ASCII-alphanumeric runs joined by `-`: `Swift Sharing` → `swift-sharing`.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// At most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Truncate to `max` characters and append `...` when something was cut.
pub fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max))
    } else {
        text.to_string()
    }
}
