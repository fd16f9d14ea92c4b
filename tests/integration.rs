//! End-to-end aggregation flows against fixture adapters and a scratch
//! SQLite cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use evidence_harness::aggregator::EvidenceAggregator;
use evidence_harness::cache::EvidenceCache;
use evidence_harness::config::{CacheConfig, RankingConfig};
use evidence_harness::error::SourceError;
use evidence_harness::models::{EvidenceRecord, ExternalIds, Intent, Query, StudyType};
use evidence_harness::traits::{SourceAdapter, SourceRegistry};

struct FixtureAdapter {
    name: &'static str,
    records: Vec<EvidenceRecord>,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl FixtureAdapter {
    fn new(name: &'static str, records: Vec<EvidenceRecord>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(Self {
            name,
            records,
            calls: calls.clone(),
            fail: false,
        });
        (adapter, calls)
    }

    fn failing(name: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(Self {
            name,
            records: Vec::new(),
            calls: calls.clone(),
            fail: true,
        });
        (adapter, calls)
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "fixture"
    }

    async fn search(&self, _query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Unavailable {
                source: self.name.to_string(),
                reason: "fixture outage".to_string(),
            });
        }
        Ok(self.records.clone())
    }
}

fn record(
    id: &str,
    source: &str,
    title: &str,
    abstract_text: &str,
    journal: &str,
    year: i32,
    study_type: StudyType,
) -> EvidenceRecord {
    EvidenceRecord {
        id: id.to_string(),
        title: title.to_string(),
        authors: vec!["Smith, Jane".to_string(), "Doe, John".to_string()],
        year,
        journal: journal.to_string(),
        source_name: source.to_string(),
        study_type,
        abstract_text: abstract_text.to_string(),
        external_ids: ExternalIds {
            doi: None,
            registry_id: Some(id.to_string()),
            url: Some(format!("https://example.org/{}", id)),
        },
        citation_count: 25,
        credibility_score: 0.0,
        relevance_score: 0.0,
    }
}

fn sleep_paper(id: &str, year: i32, study_type: StudyType) -> EvidenceRecord {
    record(
        id,
        "pubmed",
        "Cannabidiol improves sleep quality in adults with insomnia",
        "Participants receiving CBD reported improved sleep quality and reduced \
         trouble sleeping compared with placebo. Sleep onset latency decreased \
         significantly in the treatment group.",
        "Journal of Clinical Sleep Medicine",
        year,
        study_type,
    )
}

fn off_topic_paper(id: &str) -> EvidenceRecord {
    record(
        id,
        "pubmed",
        "Industrial hemp fiber processing methods",
        "A survey of mechanical decortication techniques for hemp bast fiber.",
        "Textile Research Journal",
        1998,
        StudyType::ResearchArticle,
    )
}

async fn engine_with(
    tmp: &TempDir,
    adapters: Vec<Arc<dyn SourceAdapter>>,
) -> EvidenceAggregator {
    let cache_config = CacheConfig {
        path: tmp.path().join("cache.db"),
        ttl_hours: 24,
        max_memory_entries: 100,
    };
    let cache = EvidenceCache::open(&cache_config).await.unwrap();
    let mut registry = SourceRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    EvidenceAggregator::from_parts(registry, cache, RankingConfig::default())
}

#[tokio::test]
async fn sleep_query_ranks_relevant_evidence_first() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, _) = FixtureAdapter::new(
        "pubmed",
        vec![
            off_topic_paper("pubmed:1"),
            sleep_paper("pubmed:2", 2024, StudyType::MetaAnalysis),
            sleep_paper("pubmed:3", 2019, StudyType::CaseReport),
        ],
    );
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("does CBD help with trouble sleeping", Intent::Sleep);
    let result = engine.fetch(query).await.unwrap();

    assert_eq!(result.total_found, 3);
    assert!(!result.cached);
    assert_eq!(result.records[0].id, "pubmed:2");
    assert_eq!(result.records.last().unwrap().id, "pubmed:1");
    // Scores were written by the pipeline.
    assert!(result.records[0].credibility_score > result.records[2].credibility_score);
    assert!(result.records[0].relevance_score > result.records[2].relevance_score);
    assert!(result.summary.total_records == 3);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn second_fetch_is_served_from_cache_without_adapter_calls() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, calls) = FixtureAdapter::new(
        "pubmed",
        vec![sleep_paper("pubmed:1", 2023, StudyType::ClinicalTrial)],
    );
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("CBD and sleep", Intent::Sleep);
    let first = engine.fetch(query.clone()).await.unwrap();
    assert!(!first.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second = engine.fetch(query).await.unwrap();
    assert!(second.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let first_ids: Vec<_> = first.records.iter().map(|r| r.id.clone()).collect();
    let second_ids: Vec<_> = second.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
    // Cached records keep their stored scores.
    assert_eq!(
        first.records[0].credibility_score,
        second.records[0].credibility_score
    );
    engine.close().await.unwrap();
}

#[tokio::test]
async fn failing_source_degrades_instead_of_aborting() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, pubmed_calls) = FixtureAdapter::failing("pubmed");
    let (trials, _) = FixtureAdapter::new(
        "clinical-trials",
        vec![record(
            "trial:NCT100",
            "clinical-trials",
            "Cannabidiol for chronic insomnia",
            "A phase 2 trial of nightly CBD for sleep maintenance.",
            "ClinicalTrials.gov",
            2022,
            StudyType::Phase2Trial,
        )],
    );
    let engine = engine_with(&tmp, vec![pubmed, trials]).await;

    let query = Query::new("CBD insomnia treatment", Intent::Sleep);
    let result = engine.fetch(query).await.unwrap();

    assert_eq!(pubmed_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.total_found, 1);
    assert_eq!(result.records[0].id, "trial:NCT100");
    engine.close().await.unwrap();
}

#[tokio::test]
async fn empty_results_are_not_cached() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, calls) = FixtureAdapter::failing("pubmed");
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("CBD sleep evidence", Intent::Sleep);
    let first = engine.fetch(query.clone()).await.unwrap();
    assert!(first.records.is_empty());
    assert!(!first.cached);

    // A transient all-sources failure is retried, not negative-cached.
    let second = engine.fetch(query).await.unwrap();
    assert!(!second.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn results_truncate_to_max_results_but_report_total_found() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, _) = FixtureAdapter::new(
        "pubmed",
        vec![
            sleep_paper("pubmed:1", 2024, StudyType::MetaAnalysis),
            sleep_paper("pubmed:2", 2023, StudyType::RandomizedControlledTrial),
            sleep_paper("pubmed:3", 2020, StudyType::CaseReport),
        ],
    );
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("CBD sleep studies", Intent::Sleep).with_max_results(2);
    let result = engine.fetch(query).await.unwrap();

    assert_eq!(result.total_found, 3);
    assert_eq!(result.records.len(), 2);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn cached_hits_report_the_pre_truncation_total() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, _) = FixtureAdapter::new(
        "pubmed",
        vec![
            sleep_paper("pubmed:1", 2024, StudyType::MetaAnalysis),
            sleep_paper("pubmed:2", 2023, StudyType::RandomizedControlledTrial),
            sleep_paper("pubmed:3", 2020, StudyType::CaseReport),
        ],
    );
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("CBD sleep studies", Intent::Sleep).with_max_results(2);
    let first = engine.fetch(query.clone()).await.unwrap();
    assert_eq!(first.total_found, 3);
    assert_eq!(first.records.len(), 2);

    let second = engine.fetch(query).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.records.len(), 2);
    assert_eq!(second.total_found, 3);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn zero_max_results_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, calls) = FixtureAdapter::new("pubmed", Vec::new());
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("CBD sleep", Intent::Sleep).with_max_results(0);
    let err = engine.fetch(query).await.unwrap_err();
    assert!(err.to_string().contains("max_results"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn cache_stats_and_cleanup_are_exposed() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, _) = FixtureAdapter::new(
        "pubmed",
        vec![sleep_paper("pubmed:1", 2023, StudyType::ClinicalTrial)],
    );
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("CBD for sleep onset", Intent::Sleep);
    engine.fetch(query.clone()).await.unwrap();
    engine.fetch(query).await.unwrap();

    let stats = engine.cache_stats().await.unwrap();
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.total_misses, 1);
    assert!(stats.disk_records >= 1);

    // Nothing is expired yet.
    assert_eq!(engine.cleanup_expired().await.unwrap(), 0);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn relevance_summary_reports_query_coverage() {
    let tmp = TempDir::new().unwrap();
    let (pubmed, _) = FixtureAdapter::new(
        "pubmed",
        vec![
            sleep_paper("pubmed:1", 2024, StudyType::MetaAnalysis),
            off_topic_paper("pubmed:2"),
        ],
    );
    let engine = engine_with(&tmp, vec![pubmed]).await;

    let query = Query::new("does CBD help with trouble sleeping", Intent::Sleep);
    let result = engine.fetch(query.clone()).await.unwrap();

    let normalized = evidence_harness::classify::normalize_query(query);
    let summary = engine.relevance_summary(&result.records, &normalized);
    assert_eq!(summary.total_records, 2);
    assert!(summary.coverage.compounds_covered.contains(&"CBD".to_string()));
    assert!(summary
        .coverage
        .study_types_present
        .contains(&StudyType::MetaAnalysis));

    let quality = engine.score_batch(&result.records);
    assert_eq!(quality.total_records, 2);
    assert!(quality.average_credibility > 0.0);
    engine.close().await.unwrap();
}
