//! # Knowledge Harness
//!
//! A local knowledge base for programming documentation and solved-problem
//! patterns, stored in SQLite with FTS5 indexes.
//!
//! Markdown is imported into two collections: **patterns** (curated
//! problem/solution records) and **reference** (raw library documentation).
//! Library imports are gated by a duplicate analyzer, reference documents
//! feed a pattern synthesizer, and queries go through a hybrid search that
//! prefers patterns and falls back to reference.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ Markdown │──▶│  Metadata  │──▶│ Duplicates │──▶│    SQLite    │
//! │  files   │   │ extractor  │   │  analyzer  │   │ patterns/ref │
//! └──────────┘   └────────────┘   └────────────┘   │  + FTS5      │
//!                                                  └──────┬───────┘
//!                        ┌─────────────┐                  │
//!                        │ Synthesizer │◀── reference ────┤
//!                        └──────┬──────┘                  │
//!                               └──── patterns ──────────▶│
//!                                                         ▼
//!                                                  ┌──────────────┐
//!                                                  │ Hybrid search│
//!                                                  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb init
//! kb import ./docs/SQLiteData --library SQLiteData --synthesize
//! kb search "@FetchAll observation" --detail summary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`models`] | Record types |
//! | [`store`] | Content store: upserts, lookups, relations |
//! | [`fts`] | Full-text search with query sanitization |
//! | [`metadata`] | Title, category, tag and summary extraction |
//! | [`scan`] | Markdown discovery |
//! | [`ingest`] | Repository and library import |
//! | [`duplicates`] | Duplicate and uniqueness analysis |
//! | [`synthesis`] | Pattern synthesis driven by library profiles |
//! | [`cache`] | FIFO query cache |
//! | [`search`] | Hybrid search, detail levels, statistics |
//! | [`stats`] | Per-library statistics |
//! | [`validate`] | Library validation and store health |
//! | [`external`] | Bounded external commands |
//! | [`get`] | Record retrieval |
//! | [`progress`] | Import progress on stderr |

pub mod cache;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod external;
pub mod fts;
pub mod get;
pub mod ingest;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod scan;
pub mod search;
pub mod stats;
pub mod store;
pub mod synthesis;
pub mod validate;
