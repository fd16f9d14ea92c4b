//! Source adapter trait and registry.
//!
//! Every knowledge source the engine can consult implements
//! [`SourceAdapter`]: it accepts a normalized [`Query`], performs its own
//! query construction and payload normalization, and returns canonical
//! [`EvidenceRecord`]s. The [`SourceRegistry`] holds the configured adapter
//! set and answers "which adapters should this query hit".
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use evidence_harness::error::SourceError;
//! use evidence_harness::models::{EvidenceRecord, Query};
//! use evidence_harness::traits::{SourceAdapter, SourceRegistry};
//! use std::sync::Arc;
//!
//! pub struct InstitutionalRepository;
//!
//! #[async_trait]
//! impl SourceAdapter for InstitutionalRepository {
//!     fn name(&self) -> &'static str { "institutional" }
//!     fn description(&self) -> &'static str { "In-house study repository" }
//!
//!     async fn search(&self, _query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
//!         Ok(vec![])
//!     }
//! }
//!
//! let mut registry = SourceRegistry::new();
//! registry.register(Arc::new(InstitutionalRepository));
//! assert!(registry.find("institutional").is_some());
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::classify::{sources_for, QueryCategory};
use crate::config::Config;
use crate::error::SourceError;
use crate::models::{EvidenceRecord, Query};

/// A searchable evidence source.
///
/// Implementations own their HTTP client and concurrency gate; `search` is
/// expected to be cancel-safe and to classify every failure into a
/// [`SourceError`] rather than panicking.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable adapter name, used for record `source_name` fields, adapter
    /// selection, and log context.
    fn name(&self) -> &'static str;

    /// One-line description of what this source covers.
    fn description(&self) -> &'static str;

    /// Execute a search against the source.
    ///
    /// Records come back sanitized and normalized but unscored; the
    /// aggregator applies credibility and relevance scoring afterwards.
    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError>;
}

/// Acquire a permit from an adapter's concurrency gate.
///
/// Acquisition only fails when the semaphore is closed, which happens during
/// shutdown; the adapter reports that as [`SourceError::GateClosed`].
pub(crate) async fn acquire_gate<'a>(
    gate: &'a Semaphore,
    source: &str,
) -> Result<SemaphorePermit<'a>, SourceError> {
    gate.acquire().await.map_err(|_| SourceError::GateClosed {
        source: source.to_string(),
    })
}

/// Registry of configured source adapters.
///
/// Use [`SourceRegistry::from_config`] to build the standard adapter set,
/// then optionally [`register`](SourceRegistry::register) custom ones.
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Create a registry holding every enabled built-in adapter.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::source_europe_pmc::EuropePmcAdapter;
        use crate::source_fda::FdaAdapter;
        use crate::source_pubchem::PubchemAdapter;
        use crate::source_pubmed::PubmedAdapter;
        use crate::source_strains::StrainAdapter;
        use crate::source_terpenes::TerpeneAdapter;
        use crate::source_trials::TrialsAdapter;

        let mut registry = Self::new();

        if config.sources.pubmed.enabled {
            registry.register(Arc::new(PubmedAdapter::new(&config.sources.pubmed)?));
        }
        if config.sources.europe_pmc.enabled {
            registry.register(Arc::new(EuropePmcAdapter::new(&config.sources.europe_pmc)?));
        }
        if config.sources.clinical_trials.enabled {
            registry.register(Arc::new(TrialsAdapter::new(&config.sources.clinical_trials)?));
        }
        if config.sources.fda.enabled {
            registry.register(Arc::new(FdaAdapter::new(&config.sources.fda)?));
        }
        if config.sources.strains.enabled {
            registry.register(Arc::new(StrainAdapter::new(&config.sources.strains)?));
        }
        if config.sources.pubchem.enabled {
            registry.register(Arc::new(PubchemAdapter::new(&config.sources.pubchem)?));
        }
        if config.sources.terpenes.enabled {
            registry.register(Arc::new(TerpeneAdapter::new()));
        }

        Ok(registry)
    }

    /// Register an adapter.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    /// All registered adapters.
    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Find an adapter by name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    /// Adapters to consult for a query category, in preference order.
    /// Unregistered names are skipped.
    pub fn select(&self, category: QueryCategory) -> Vec<Arc<dyn SourceAdapter>> {
        sources_for(category)
            .iter()
            .filter_map(|name| self.find(name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
