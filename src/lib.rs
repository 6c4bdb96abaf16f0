//! # wikidex
//!
//! Wiki knowledge-base QA: ingest pages from a MediaWiki source, split them
//! into overlapping fragments, embed and index those fragments, and answer
//! natural-language questions with hybrid retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │ MediaWiki │──▶│   Pipeline   │──▶│ SQLite (docs) │
//! │  api.php  │   │ Chunk+Embed  │   │ + vector index│
//! └──────────┘   └──────────────┘   └──────┬────────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │ (wikidex)│       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Retrieval
//!
//! Questions carrying a numeric code (3+ digits) take the keyword-anchored
//! path: the code locates one canonical document and the whole document
//! comes back in reading order. Everything else takes the semantic path:
//! vector similarity re-ranked with per-keyword containment bonuses.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`wiki`] | MediaWiki client + wikitext cleaning |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index over SQLite |
//! | [`retrieval`] | Hybrid keyword/semantic retrieval |
//! | [`answer`] | Answer synthesis, sources, confidence |
//! | [`qa`] | Question-answering orchestration |
//! | [`ingest`] | Extraction pipeline |
//! | [`status`] | Counts and document listing |
//! | [`server`] | HTTP server |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod qa;
pub mod retrieval;
pub mod server;
pub mod status;
pub mod wiki;
