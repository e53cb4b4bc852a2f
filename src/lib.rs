//! # Inklake
//!
//! A local-first file-to-vault ingestion daemon with content-addressed
//! dedup.
//!
//! Inklake watches directories for documents, deduplicates them by the
//! hash of their extracted text, normalizes the text through an
//! OpenAI-compatible language-model endpoint, and writes the structured
//! result as a markdown note into a note vault, tracking progress in a
//! local SQLite metadata store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐
//! │ Watcher  │  │  Rescan  │
//! └────┬─────┘  └────┬─────┘
//!      └──────┬──────┘
//!             ▼
//!       ┌──────────┐   ┌────────┐   ┌───────────────────────────┐
//!       │ Debounce │──▶│ Worker │──▶│  Pipeline                  │
//!       └──────────┘   └────────┘   │ extract→hash→dedup→        │
//!                                   │ normalize→render→write     │
//!                                   └─────┬───────────────┬─────┘
//!                                         ▼               ▼
//!                                   ┌──────────┐    ┌──────────┐
//!                                   │  SQLite  │    │  Vault   │
//!                                   │ metadata │    │ markdown │
//!                                   └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ink backfill                  # one-shot scan and ingest
//! ink run                       # continuous watch mode
//! ink status                    # processed-source count
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scanner`] | Root walking and exclusion rules |
//! | [`extract`] | Text extraction (plain text, PDF, DOCX) |
//! | [`normalizer`] | LLM normalization client |
//! | [`render`] | Markdown note rendering |
//! | [`vault`] | Idempotent atomic note writes |
//! | [`pipeline`] | Per-path ingestion state machine |
//! | [`store`] | SQLite metadata store + event log |
//! | [`watcher`] | Filesystem events + periodic rescan |
//! | [`debounce`] | Change-burst coalescing |
//! | [`worker`] | Single-consumer processing queue |
//! | [`runner`] | Watch / backfill / status orchestration |

pub mod config;
pub mod db;
pub mod debounce;
pub mod extract;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod runner;
pub mod scanner;
pub mod store;
pub mod vault;
pub mod watcher;
pub mod worker;
