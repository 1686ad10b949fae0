//! Record retrieval by id.
//!
//! Looks in patterns first, then reference, and attaches the record's
//! outbound relations.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::models::{Relation, StoredRecord};
use crate::store::KnowledgeStore;

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    #[serde(flatten)]
    pub record: StoredRecord,
    pub relations: Vec<Relation>,
}

pub async fn get_record(store: &KnowledgeStore, id: &str) -> Result<RecordResponse> {
    let Some(record) = store.find(id).await? else {
        bail!("record not found: {}", id);
    };
    let relations = store.relations_from(id).await?;
    Ok(RecordResponse { record, relations })
}

/// CLI entry point. A missing id exits with status 1.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = KnowledgeStore::open(config).await?;
    let response = get_record(&store, id).await;
    store.close().await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let record = &response.record;
    println!("--- Record ---");
    println!("id:           {}", record.id());
    println!("collection:   {}", record.collection());
    println!("title:        {}", record.title());
    match record {
        StoredRecord::Pattern(p) => {
            println!("folder:       {}", p.folder);
            if let Some(ref lib) = p.library {
                println!("library:      {}", lib);
            }
            if let Some(ref kind) = p.pattern_type {
                println!("pattern_type: {}", kind);
            }
            if let Some(ref src) = p.source_path {
                println!("source:       {}", src);
            }
            println!("summary:      {}", p.summary);
            println!("words:        {}", p.word_count);
            println!("updated_at:   {}", format_ts_iso(p.updated_at));
        }
        StoredRecord::Reference(r) => {
            println!("library:      {}", r.library);
            println!("doc_type:     {}", r.doc_type);
            println!("folder_path:  {}", r.folder_path);
            println!("file_path:    {}", r.file_path);
            println!("summary:      {}", r.summary);
            println!("words:        {}", r.word_count);
            println!("updated_at:   {}", format_ts_iso(r.updated_at));
        }
    }
    let tags: Vec<&str> = record.tags().iter().map(String::as_str).collect();
    println!("tags:         {}", tags.join(", "));
    println!();

    println!("--- Relations ({}) ---", response.relations.len());
    for rel in &response.relations {
        println!("{} -> {}", rel.relation_type, rel.target_id);
    }
    println!();

    println!("--- Content ---");
    println!("{}", record.content());
    println!();

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
