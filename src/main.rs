//! # Knowledge Harness CLI (`kb`)
//!
//! The `kb` binary imports markdown documentation into a local SQLite
//! knowledge base, checks batches for duplicates, synthesizes patterns, and
//! answers queries with hybrid (patterns first, then reference) search.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the database and schema |
//! | `kb import-repo <dir>` | Import a knowledge repository into patterns |
//! | `kb update <dir>` | Clear patterns and re-import the repository |
//! | `kb import <dir> --library <name>` | Import library docs into reference |
//! | `kb check-duplicates <dir> --library <name>` | Analyze a batch without importing |
//! | `kb synthesize <library>` | Derive patterns from a library's reference docs |
//! | `kb validate <library>` | Score a library and run validation scripts |
//! | `kb report [library]` | Per-library statistics |
//! | `kb health` | Store integrity, FTS alignment, probe search |
//! | `kb search <query>...` | Hybrid search |
//! | `kb expand <id>` | One section of a record |
//! | `kb get <id>` | Full record with relations |

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use knowledge_harness::config::{self, Config};
use knowledge_harness::duplicates::{DuplicateAnalyzer, DuplicateCheck};
use knowledge_harness::get;
use knowledge_harness::ingest::{ImportStatus, Importer, LibraryImportOptions, LibraryImportOutcome};
use knowledge_harness::migrate;
use knowledge_harness::progress::ProgressMode;
use knowledge_harness::search::{DetailLevel, ExpandSection, HybridSearcher};
use knowledge_harness::stats;
use knowledge_harness::store::KnowledgeStore;
use knowledge_harness::synthesis::PatternSynthesizer;
use knowledge_harness::validate;

/// Knowledge Harness: a local markdown knowledge base with hybrid search.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knowledge Harness: import, deduplicate, synthesize and search markdown documentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Import progress on stderr: auto (human on a terminal), human, json, or off.
    #[arg(long, global = true, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema. Idempotent.
    Init,

    /// Import a topic-category knowledge repository into the patterns collection.
    ImportRepo {
        /// Repository root.
        dir: PathBuf,
    },

    /// Clear the patterns collection and re-import the repository.
    Update {
        /// Repository root.
        dir: PathBuf,
    },

    /// Import a library's markdown documentation into the reference collection.
    Import {
        /// Documentation directory.
        dir: PathBuf,

        /// Library name stored on every record.
        #[arg(long)]
        library: String,

        /// Import even when the batch is mostly redundant.
        #[arg(long)]
        yes: bool,

        /// Skip the duplicate analysis.
        #[arg(long)]
        skip_check: bool,

        /// Synthesize patterns after importing.
        #[arg(long)]
        synthesize: bool,

        /// Validate the library after importing.
        #[arg(long)]
        validate: bool,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Analyze a directory for duplicates against the store without importing.
    CheckDuplicates {
        dir: PathBuf,

        #[arg(long)]
        library: String,

        #[arg(long)]
        json: bool,
    },

    /// Synthesize pattern records from a library's reference documents.
    Synthesize {
        library: String,

        #[arg(long)]
        json: bool,
    },

    /// Score a library and run configured validation scripts.
    Validate {
        library: String,

        #[arg(long)]
        json: bool,
    },

    /// Print per-library statistics.
    Report {
        /// Limit the report to one library.
        library: Option<String>,
    },

    /// Check store integrity and index alignment.
    Health {
        #[arg(long)]
        json: bool,
    },

    /// Hybrid search: curated patterns first, then reference documentation.
    ///
    /// Several queries can be given; they share one session cache.
    Search {
        #[arg(required = true)]
        queries: Vec<String>,

        /// How much of the answer to include.
        #[arg(long, value_enum, default_value_t = DetailLevel::Details)]
        detail: DetailLevel,

        /// Print session statistics after the results.
        #[arg(long)]
        stats: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print one section of a record.
    Expand {
        id: String,

        #[arg(long, value_enum, default_value_t = ExpandSection::Full)]
        section: ExpandSection,
    },

    /// Print a record with its relations.
    Get { id: String },
}

fn init_logging(verbosity: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized: {}", cfg.db.path.display());
        }

        Commands::ImportRepo { dir } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let reporter = cli.progress.reporter();
            let summary = Importer::new(&cfg, &store, reporter.as_ref())?
                .import_repository(&dir)
                .await?;
            store.close().await;
            summary.print();
        }

        Commands::Update { dir } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let reporter = cli.progress.reporter();
            let (removed, summary) = Importer::new(&cfg, &store, reporter.as_ref())?
                .update_repository(&dir)
                .await?;
            store.close().await;
            println!("cleared {} pattern(s)", removed);
            summary.print();
        }

        Commands::Import {
            dir,
            library,
            yes,
            skip_check,
            synthesize,
            validate: run_validation,
            json,
        } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let progress = if json && cli.progress == ProgressMode::Auto {
                ProgressMode::Off
            } else {
                cli.progress
            };
            let reporter = progress.reporter();
            let options = LibraryImportOptions {
                skip_check,
                confirmed: yes,
            };
            let outcome = Importer::new(&cfg, &store, reporter.as_ref())?
                .import_library(&dir, &library, options)
                .await?;

            let code = match outcome {
                LibraryImportOutcome::PathNotFound { path } => {
                    store.close().await;
                    eprintln!("Error: path not found: {}", path.display());
                    return Ok(ExitCode::FAILURE);
                }
                LibraryImportOutcome::NeedsConfirmation { analysis } => {
                    store.close().await;
                    if json {
                        print_json(&json!({ "outcome": "needs_confirmation", "analysis": analysis }))?;
                    } else {
                        analysis.print();
                    }
                    eprintln!(
                        "uniqueness {:.1}% is below 30%; re-run with --yes to import anyway",
                        analysis.uniqueness.uniqueness_percentage
                    );
                    return Ok(ExitCode::FAILURE);
                }
                LibraryImportOutcome::Imported {
                    mut summary,
                    analysis,
                } => {
                    let synthesis = if synthesize {
                        let synthesizer =
                            PatternSynthesizer::new(cfg.synthesis.profile_for(&library))?;
                        Some(synthesizer.synthesize(&store).await?)
                    } else {
                        None
                    };
                    let validation = if run_validation {
                        Some(validate::validate_library(&cfg, &store, &library).await?)
                    } else {
                        None
                    };
                    store.close().await;

                    if validation.as_ref().is_some_and(|v| !v.passed) {
                        summary.status = ImportStatus::PartialSuccess;
                    }

                    if json {
                        print_json(&json!({
                            "outcome": "imported",
                            "summary": summary,
                            "analysis": analysis,
                            "synthesis": synthesis,
                            "validation": validation,
                        }))?;
                    } else {
                        if let Some(report) = &analysis {
                            report.print();
                            println!();
                        }
                        if let Some(report) = &synthesis {
                            report.print();
                            println!();
                        }
                        if let Some(report) = &validation {
                            report.print();
                            println!();
                        }
                        summary.print();
                    }
                    ExitCode::SUCCESS
                }
            };
            return Ok(code);
        }

        Commands::CheckDuplicates { dir, library, json } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let check = DuplicateAnalyzer::new(&store, &cfg.duplicates)?
                .analyze_dir(&dir, &library, &cfg.import)
                .await?;
            store.close().await;

            if json {
                print_json(&check)?;
            }
            match check {
                DuplicateCheck::PathNotFound { path } => {
                    eprintln!("Error: path not found: {}", path.display());
                    return Ok(ExitCode::FAILURE);
                }
                DuplicateCheck::Analyzed(report) => {
                    if !json {
                        report.print();
                    }
                }
            }
        }

        Commands::Synthesize { library, json } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let synthesizer = PatternSynthesizer::new(cfg.synthesis.profile_for(&library))?;
            let report = synthesizer.synthesize(&store).await?;
            store.close().await;
            if json {
                print_json(&report)?;
            } else {
                report.print();
            }
        }

        Commands::Validate { library, json } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let report = validate::validate_library(&cfg, &store, &library).await?;
            store.close().await;
            if json {
                print_json(&report)?;
            } else {
                report.print();
            }
            if !report.passed {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Report { library } => {
            stats::run_report(&cfg, library.as_deref()).await?;
        }

        Commands::Health { json } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let report = validate::check_health(&store).await?;
            store.close().await;
            if json {
                print_json(&json!({ "healthy": report.healthy(), "report": report }))?;
            } else {
                report.print();
            }
            if !report.healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Search {
            queries,
            detail,
            stats: show_stats,
            json,
        } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let mut searcher = HybridSearcher::new(store.clone(), &cfg.search);
            let mut responses = Vec::with_capacity(queries.len());
            for query in &queries {
                responses.push(searcher.search(query, detail).await?);
            }
            store.close().await;

            if json {
                let stats = show_stats.then(|| searcher.stats().clone());
                print_json(&json!({ "results": responses, "stats": stats }))?;
            } else {
                for response in &responses {
                    response.print();
                }
                if show_stats {
                    searcher.stats().print();
                }
            }
        }

        Commands::Expand { id, section } => {
            let store = KnowledgeStore::open(&cfg).await?;
            let searcher = HybridSearcher::new(store.clone(), &cfg.search);
            let text = searcher.expand(&id, section).await?;
            store.close().await;
            match text {
                Some(text) => println!("{}", text),
                None => {
                    eprintln!("Error: record not found: {}", id);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
