//! # Evidence Harness
//!
//! A source-spanning evidence aggregation engine for cannabinoid and
//! terpene research questions.
//!
//! Evidence Harness fans a structured query out to a set of source
//! adapters (biomedical literature, clinical-trial registries, regulatory
//! databases, product directories, chemical databases, and a curated
//! terpene knowledge base), normalizes every result to a common record,
//! scores each record for credibility and relevance, and returns a ranked
//! set backed by a two-tier cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │   Adapters   │──▶│  Aggregator   │──▶│  Ranked    │
//! │ PubMed/FDA/… │   │ score + rank │   │  records   │
//! └──────────────┘   └──────┬───────┘   └───────────┘
//!                           │
//!                    ┌──────┴───────┐
//!                    │  Two-tier     │
//!                    │ cache (SQLite)│
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use evidence_harness::aggregator::EvidenceAggregator;
//! use evidence_harness::config::Config;
//! use evidence_harness::models::{Intent, Query};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let engine = EvidenceAggregator::new(&config).await?;
//!
//! let query = Query::new("does CBD help with sleep quality", Intent::Sleep);
//! let result = engine.fetch(query).await?;
//! for record in &result.records {
//!     println!("{:.1} {}", record.credibility_score, record.title);
//! }
//! engine.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`classify`] | Query classification and compound extraction |
//! | [`traits`] | Source adapter trait and registry |
//! | [`source_pubmed`] | Biomedical literature adapter |
//! | [`source_europe_pmc`] | European literature adapter with citation counts |
//! | [`source_trials`] | Clinical-trial registry adapter |
//! | [`source_fda`] | Regulatory database adapter |
//! | [`source_strains`] | Strain directory adapter |
//! | [`source_pubchem`] | Chemical compound adapter |
//! | [`source_terpenes`] | Curated terpene knowledge base |
//! | [`credibility`] | Credibility scoring |
//! | [`relevance`] | Relevance matching |
//! | [`cache`] | Two-tier evidence cache |
//! | [`aggregator`] | Fan-out engine |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregator;
pub mod cache;
pub mod classify;
pub mod config;
pub mod credibility;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod relevance;
pub mod source_europe_pmc;
pub mod source_fda;
pub mod source_pubchem;
pub mod source_pubmed;
pub mod source_strains;
pub mod source_terpenes;
pub mod source_trials;
pub mod traits;
