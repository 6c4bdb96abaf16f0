//! # wikidex CLI
//!
//! The `wikidex` binary is the primary interface. It provides commands for
//! database initialization, wiki extraction, question answering, semantic
//! search, status inspection, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! wikidex --config ./config/wikidex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wikidex init` | Create both SQLite databases and their schemas |
//! | `wikidex extract <url>` | Wipe and rebuild the knowledge base from a wiki |
//! | `wikidex ask "<question>"` | Answer a question with hybrid retrieval |
//! | `wikidex search "<query>"` | Semantic search over indexed fragments |
//! | `wikidex status` | Show document/chunk counts |
//! | `wikidex documents` | List all indexed documents |
//! | `wikidex serve` | Start the HTTP server |

mod answer;
mod chunk;
mod config;
mod db;
mod embedding;
mod index;
mod ingest;
mod migrate;
mod models;
mod qa;
mod retrieval;
mod server;
mod status;
mod wiki;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::answer::ExtractiveSynthesizer;
use crate::index::VectorIndex;

/// wikidex — wiki knowledge-base QA over hybrid retrieval.
#[derive(Parser)]
#[command(
    name = "wikidex",
    about = "Wiki knowledge-base QA — ingest MediaWiki content, index it, and answer questions over it",
    version,
    long_about = "wikidex ingests pages from a MediaWiki source, splits them into overlapping \
    fragments, embeds and indexes them, and answers natural-language questions by combining \
    keyword-anchored document recovery with semantic vector search."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wikidex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both database schemas.
    ///
    /// Creates the relational store (documents, chunks) and the vector
    /// index. Idempotent — running it multiple times is safe.
    Init,

    /// Extract and index all content from a wiki.
    ///
    /// Wipes the current knowledge base, enumerates every page of the wiki,
    /// cleans and chunks each page, and indexes the fragments.
    Extract {
        /// Base URL of the MediaWiki installation (e.g. https://wiki.example.com).
        url: String,
    },

    /// Answer a question from the knowledge base.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Semantic search over indexed fragments.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show document and chunk counts.
    Status,

    /// List all indexed documents.
    Documents,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikidex=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Extract { url } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::create_relational_schema(&pool).await?;
            let index = VectorIndex::open(&cfg).await?;

            match ingest::run_extract(&cfg, &pool, &index, &url).await {
                Ok(report) => {
                    println!("extract {}", url);
                    println!("  pages found: {}", report.total_pages_found);
                    println!("  documents processed: {}", report.documents_processed);
                    println!("  chunks created: {}", report.total_chunks_created);
                    println!("ok");
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }

            pool.close().await;
            index.close().await;
        }
        Commands::Ask { question } => {
            let pool = db::connect(&cfg.db.path).await?;
            let index = VectorIndex::open(&cfg).await?;

            let outcome =
                qa::answer_question(&cfg, &pool, &index, &ExtractiveSynthesizer, &question).await?;

            println!("Q: {}", outcome.question);
            println!();
            println!("{}", outcome.answer);
            println!();
            println!("confidence: {:.2}", outcome.confidence);
            println!("context chunks used: {}", outcome.context_chunks_used);
            if !outcome.sources.is_empty() {
                println!("sources:");
                for source in &outcome.sources {
                    println!("  - {} ({})", source.title, source.url);
                }
            }

            pool.close().await;
            index.close().await;
        }
        Commands::Search { query, limit } => {
            let index = VectorIndex::open(&cfg).await?;
            let limit = limit.unwrap_or(cfg.retrieval.search_limit);

            let results =
                retrieval::retrieve(&index, &query, limit, None, cfg.retrieval.candidate_pool)
                    .await;

            if results.is_empty() {
                println!("No results.");
            } else {
                for (i, result) in results.iter().enumerate() {
                    println!(
                        "{}. [{:.2}] {} (chunk {})",
                        i + 1,
                        result.similarity_score,
                        result.title,
                        result.chunk_index
                    );
                    let excerpt: String = result.content.chars().take(160).collect();
                    println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
                    println!();
                }
            }

            index.close().await;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Documents => {
            status::run_documents(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
