//! Root fan-out engine: classify, fetch, score, rank, cache.
//!
//! One public entry point, [`EvidenceAggregator::fetch`]. The cache is an
//! optimization only: a cache read or write failure is logged and treated
//! as a miss, never surfaced to the caller.

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, EvidenceCache};
use crate::classify;
use crate::config::{Config, RankingConfig};
use crate::credibility;
use crate::models::{
    AggregationResult, EvidenceRecord, QualitySummary, Query, RelevanceSummary,
};
use crate::relevance;
use crate::traits::SourceRegistry;

pub struct EvidenceAggregator {
    registry: SourceRegistry,
    cache: EvidenceCache,
    ranking: RankingConfig,
}

impl EvidenceAggregator {
    /// Builds the full engine from configuration: one adapter per enabled
    /// source and an open cache.
    pub async fn new(config: &Config) -> Result<Self> {
        let registry = SourceRegistry::from_config(config)?;
        let cache = EvidenceCache::open(&config.cache).await?;
        Ok(Self {
            registry,
            cache,
            ranking: config.ranking.clone(),
        })
    }

    /// Assembles an engine from pre-built parts. Tests use this to inject
    /// fixture adapters.
    pub fn from_parts(registry: SourceRegistry, cache: EvidenceCache, ranking: RankingConfig) -> Self {
        Self {
            registry,
            cache,
            ranking,
        }
    }

    /// Runs the full aggregation pipeline for one query.
    ///
    /// Cache hits return the stored ranked set without touching any
    /// adapter or rescoring. On a miss the query is classified, the
    /// matching adapter subset is fanned out concurrently, and every
    /// failure short of total degrades to an empty contribution.
    pub async fn fetch(&self, query: Query) -> Result<AggregationResult> {
        if query.max_results == 0 {
            bail!("max_results must be at least 1");
        }

        let query = classify::normalize_query(query);

        match self.cache.get(&query).await {
            Ok(Some(cached)) => {
                info!(query = %query.text, records = cached.records.len(), "serving cached results");
                let summary = credibility::summarize(&cached.records);
                return Ok(AggregationResult {
                    total_found: cached.total_found,
                    records: cached.records,
                    summary,
                    cached: true,
                    fetched_at: Utc::now(),
                });
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "cache read failed, fetching fresh"),
        }

        let category = classify::classify(&query);
        let adapters = self.registry.select(category);
        debug!(
            query = %query.text,
            ?category,
            sources = adapters.len(),
            "fanning out to sources"
        );

        let mut tasks = JoinSet::new();
        for adapter in adapters {
            let task_query = query.clone();
            tasks.spawn(async move {
                let name = adapter.name();
                (name, adapter.search(&task_query).await)
            });
        }

        let mut merged: Vec<EvidenceRecord> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(records))) => {
                    debug!(source = name, records = records.len(), "source responded");
                    merged.extend(records);
                }
                Ok((name, Err(err))) => {
                    warn!(source = name, %err, "source fetch failed, skipping");
                }
                Err(err) => warn!(%err, "source task panicked, skipping"),
            }
        }

        let total_found = merged.len();

        for record in &mut merged {
            record.credibility_score = credibility::score(record);
            record.relevance_score = relevance::score(record, &query);
        }

        rank(&mut merged, &self.ranking);
        merged.truncate(query.max_results);

        if !merged.is_empty() {
            if let Err(err) = self.cache.put(&query, &merged, total_found).await {
                warn!(%err, "cache write failed, returning uncached result");
            }
        }

        let summary = credibility::summarize(&merged);
        Ok(AggregationResult {
            records: merged,
            total_found,
            summary,
            cached: false,
            fetched_at: Utc::now(),
        })
    }

    /// Aggregate quality statistics for an already-scored record set.
    pub fn score_batch(&self, records: &[EvidenceRecord]) -> QualitySummary {
        credibility::summarize(records)
    }

    /// Aggregate relevance statistics, including query coverage.
    pub fn relevance_summary(&self, records: &[EvidenceRecord], query: &Query) -> RelevanceSummary {
        relevance::summarize(records, query)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats().await
    }

    /// Removes expired rows from both cache tiers, returning the count.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.cache.cleanup_expired().await
    }

    /// Flushes expired entries and closes the cache pool.
    pub async fn close(&self) -> Result<()> {
        self.cache.close().await
    }
}

/// Sorts descending by the blended rank score, breaking ties by
/// credibility and then by recency.
fn rank(records: &mut [EvidenceRecord], weights: &RankingConfig) {
    let blended = |r: &EvidenceRecord| {
        weights.relevance_weight * r.relevance_score
            + weights.credibility_weight * (r.credibility_score / 10.0)
    };
    records.sort_by(|a, b| {
        blended(b)
            .total_cmp(&blended(a))
            .then(b.credibility_score.total_cmp(&a.credibility_score))
            .then(b.year.cmp(&a.year))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalIds, Intent, StudyType};

    fn record(id: &str, relevance: f64, credibility: f64, year: i32) -> EvidenceRecord {
        EvidenceRecord {
            id: id.to_string(),
            title: "t".to_string(),
            authors: vec!["a".to_string()],
            year,
            journal: "j".to_string(),
            source_name: "pubmed".to_string(),
            study_type: StudyType::ResearchArticle,
            abstract_text: String::new(),
            external_ids: ExternalIds {
                url: Some("https://example.org".to_string()),
                ..Default::default()
            },
            citation_count: 0,
            credibility_score: credibility,
            relevance_score: relevance,
        }
    }

    #[test]
    fn ranking_blends_relevance_and_credibility() {
        let mut records = vec![
            record("low", 0.2, 5.0, 2020),
            record("high", 0.9, 6.0, 2020),
            record("mid", 0.5, 9.0, 2020),
        ];
        rank(&mut records, &RankingConfig::default());
        // high: 0.6*0.9 + 0.4*0.6 = 0.78; mid: 0.66; low: 0.32
        let order: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn ties_break_by_credibility_then_year() {
        // Relevance-only weights make the blended scores exactly equal, so
        // the tie-breakers decide the order.
        let weights = RankingConfig {
            relevance_weight: 1.0,
            credibility_weight: 0.0,
        };
        let mut records = vec![
            record("older", 0.5, 5.0, 2018),
            record("newer", 0.5, 5.0, 2023),
            record("stronger", 0.5, 7.5, 2018),
        ];
        rank(&mut records, &weights);
        assert_eq!(records[0].id, "stronger");
        assert_eq!(records[1].id, "newer");
        assert_eq!(records[2].id, "older");
    }

    #[test]
    fn normalized_query_is_used_for_classification() {
        let query = classify::normalize_query(Query::new("cannabidiol for sleep", Intent::Sleep));
        assert!(query.compounds.iter().any(|c| c == "CBD"));
    }
}
