//! Two-tier evidence cache.
//!
//! Hot query results live in an in-process map guarded by a `Mutex`; every
//! cached result is also persisted to SQLite so it survives restarts. The
//! read path is memory -> disk -> miss, hydrating the memory tier on a disk
//! hit. Entries carry an absolute expiry; the memory tier additionally
//! evicts its least-recently-used tenth when full.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::db;
use crate::migrate;
use crate::models::{EvidenceRecord, Query};

/// Cache performance counters and size figures.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub hit_rate_percent: f64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub memory_entries: usize,
    pub disk_records: u64,
    pub disk_queries: u64,
    pub max_memory_entries: usize,
}

/// A cached ranked set together with the pre-truncation match count it was
/// computed from.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub records: Vec<EvidenceRecord>,
    pub total_found: usize,
}

struct MemoryEntry {
    records: Vec<EvidenceRecord>,
    total_found: usize,
    expires_at: i64,
    last_access: u64,
}

#[derive(Default)]
struct MemoryTier {
    entries: HashMap<String, MemoryEntry>,
    // Monotonic access tick; orders entries for LRU eviction.
    tick: u64,
}

impl MemoryTier {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    memory_hits: u64,
    disk_hits: u64,
}

pub struct EvidenceCache {
    pool: SqlitePool,
    ttl_secs: i64,
    max_memory_entries: usize,
    memory: Mutex<MemoryTier>,
    counters: Mutex<Counters>,
}

impl EvidenceCache {
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        let pool = db::connect(&config.path).await?;
        migrate::run_migrations(&pool).await?;
        info!(path = %config.path.display(), "evidence cache ready");

        Ok(Self {
            pool,
            ttl_secs: config.ttl_hours as i64 * 3600,
            max_memory_entries: config.max_memory_entries,
            memory: Mutex::new(MemoryTier::default()),
            counters: Mutex::new(Counters::default()),
        })
    }

    /// Deterministic key for a normalized query. Compound order does not
    /// matter; `min_year` is a source-side filter and is deliberately not a
    /// cache dimension.
    pub fn query_hash(query: &Query) -> String {
        let mut compounds = query.compounds.clone();
        compounds.sort();
        let key = format!(
            "{}|{}|{}|{}",
            query.text,
            query.intent,
            compounds.join(","),
            query.max_results
        );
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Content hash keying a record row, so an identical record cached under
    /// two queries is stored once.
    fn record_hash(record: &EvidenceRecord) -> String {
        let key = format!(
            "{}|{}|{}|{}",
            record.title,
            record.journal,
            record.year,
            record.external_ids.doi.as_deref().unwrap_or("")
        );
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Look up cached results for a query. `Ok(None)` is a miss; errors mean
    /// the persistent tier is unavailable and the caller should compute
    /// fresh results.
    pub async fn get(&self, query: &Query) -> Result<Option<CachedResult>> {
        let query_hash = Self::query_hash(query);
        let now = Utc::now().timestamp();

        {
            let mut memory = lock_poisoned_ok(&self.memory);
            let tick = memory.touch();
            match memory.entries.get_mut(&query_hash) {
                Some(entry) if entry.expires_at > now => {
                    entry.last_access = tick;
                    let cached = CachedResult {
                        records: entry.records.clone(),
                        total_found: entry.total_found,
                    };
                    drop(memory);
                    self.count(|c| {
                        c.hits += 1;
                        c.memory_hits += 1;
                    });
                    debug!(%query_hash, "memory cache hit");
                    return Ok(Some(cached));
                }
                Some(_) => {
                    memory.entries.remove(&query_hash);
                }
                None => {}
            }
        }

        let row = sqlx::query(
            "SELECT record_ids_json, total_found, expires_at FROM query_results \
             WHERE query_hash = ? AND expires_at > ?",
        )
        .bind(&query_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            self.count(|c| c.misses += 1);
            debug!(%query_hash, "cache miss");
            return Ok(None);
        };

        sqlx::query(
            "UPDATE query_results \
             SET access_count = access_count + 1, last_accessed = ? \
             WHERE query_hash = ?",
        )
        .bind(now)
        .bind(&query_hash)
        .execute(&self.pool)
        .await?;

        let record_ids: Vec<String> = serde_json::from_str(row.get("record_ids_json"))?;
        let total_found: i64 = row.get("total_found");
        let total_found = total_found.max(0) as usize;
        let expires_at: i64 = row.get("expires_at");

        let mut records = Vec::with_capacity(record_ids.len());
        for record_id in &record_ids {
            let record_row = sqlx::query(
                "SELECT record_json FROM evidence_records WHERE id = ? AND expires_at > ?",
            )
            .bind(record_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(record_row) = record_row {
                let record: EvidenceRecord =
                    serde_json::from_str(record_row.get("record_json"))?;
                records.push(record);
            }
        }

        if records.is_empty() {
            self.count(|c| c.misses += 1);
            return Ok(None);
        }

        self.count(|c| {
            c.hits += 1;
            c.disk_hits += 1;
        });
        debug!(%query_hash, records = records.len(), "disk cache hit");
        self.insert_memory(query_hash, records.clone(), total_found, expires_at);
        Ok(Some(CachedResult {
            records,
            total_found,
        }))
    }

    /// Persist results for a query, together with the pre-truncation match
    /// count. Empty result sets are never cached, so a transient total
    /// failure does not shadow later successful fetches.
    pub async fn put(
        &self,
        query: &Query,
        records: &[EvidenceRecord],
        total_found: usize,
    ) -> Result<()> {
        let expires_at = Utc::now().timestamp() + self.ttl_secs;
        self.put_until(query, records, total_found, expires_at).await
    }

    async fn put_until(
        &self,
        query: &Query,
        records: &[EvidenceRecord],
        total_found: usize,
        expires_at: i64,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let query_hash = Self::query_hash(query);
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        let mut record_ids = Vec::with_capacity(records.len());
        for record in records {
            let record_id = Self::record_hash(record);
            sqlx::query(
                "INSERT OR REPLACE INTO evidence_records \
                 (id, query_hash, record_json, created_at, expires_at, access_count, last_accessed) \
                 VALUES (?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(&record_id)
            .bind(&query_hash)
            .bind(serde_json::to_string(record)?)
            .bind(now)
            .bind(expires_at)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            record_ids.push(record_id);
        }

        sqlx::query(
            "INSERT OR REPLACE INTO query_results \
             (query_hash, query_json, record_ids_json, total_found, created_at, expires_at, access_count, last_accessed) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&query_hash)
        .bind(serde_json::to_string(query)?)
        .bind(serde_json::to_string(&record_ids)?)
        .bind(total_found as i64)
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.insert_memory(query_hash, records.to_vec(), total_found, expires_at);
        info!(records = records.len(), "cached query results");
        Ok(())
    }

    fn insert_memory(
        &self,
        query_hash: String,
        records: Vec<EvidenceRecord>,
        total_found: usize,
        expires_at: i64,
    ) {
        let mut memory = lock_poisoned_ok(&self.memory);
        if memory.entries.len() >= self.max_memory_entries
            && !memory.entries.contains_key(&query_hash)
        {
            evict_lru(&mut memory, self.max_memory_entries);
        }
        let tick = memory.touch();
        memory.entries.insert(
            query_hash,
            MemoryEntry {
                records,
                total_found,
                expires_at,
                last_access: tick,
            },
        );
    }

    /// Delete rows past their expiry in both tables, returning how many were
    /// removed.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let now = Utc::now().timestamp();

        let records = sqlx::query("DELETE FROM evidence_records WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        let queries = sqlx::query("DELETE FROM query_results WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let mut memory = lock_poisoned_ok(&self.memory);
        memory.entries.retain(|_, e| e.expires_at > now);
        drop(memory);

        let total = records + queries;
        if total > 0 {
            info!(expired = total, "cleaned up expired cache entries");
        }
        Ok(total)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let disk_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evidence_records")
            .fetch_one(&self.pool)
            .await?;
        let disk_queries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_results")
            .fetch_one(&self.pool)
            .await?;

        let memory_entries = lock_poisoned_ok(&self.memory).entries.len();
        let counters = lock_poisoned_ok(&self.counters);
        let total = counters.hits + counters.misses;
        let hit_rate = if total > 0 {
            counters.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(CacheStats {
            hit_rate_percent: (hit_rate * 100.0).round() / 100.0,
            total_hits: counters.hits,
            total_misses: counters.misses,
            memory_hits: counters.memory_hits,
            disk_hits: counters.disk_hits,
            memory_entries,
            disk_records: disk_records as u64,
            disk_queries: disk_queries as u64,
            max_memory_entries: self.max_memory_entries,
        })
    }

    /// Clean shutdown: drop expired rows and close the pool.
    pub async fn close(&self) -> Result<()> {
        self.cleanup_expired().await?;
        self.pool.close().await;
        Ok(())
    }

    fn count(&self, f: impl FnOnce(&mut Counters)) {
        f(&mut lock_poisoned_ok(&self.counters));
    }
}

/// Evict the least-recently-used ~10% of entries (at least one).
fn evict_lru(memory: &mut MemoryTier, max_entries: usize) {
    let evict_count = (max_entries / 10).max(1);
    let mut by_access: Vec<(String, u64)> = memory
        .entries
        .iter()
        .map(|(k, e)| (k.clone(), e.last_access))
        .collect();
    by_access.sort_by_key(|(_, access)| *access);
    for (key, _) in by_access.into_iter().take(evict_count) {
        memory.entries.remove(&key);
    }
}

// Counter state is plain data; a panic mid-update cannot corrupt it enough
// to matter, so a poisoned lock is recovered rather than propagated.
fn lock_poisoned_ok<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalIds, Intent, StudyType};

    fn record(n: usize) -> EvidenceRecord {
        EvidenceRecord {
            id: format!("test:{}", n),
            title: format!("Record {}", n),
            authors: vec!["Doe, J".to_string()],
            year: 2024,
            journal: "Test Journal".to_string(),
            source_name: "pubmed".to_string(),
            study_type: StudyType::ResearchArticle,
            abstract_text: "abstract".to_string(),
            external_ids: ExternalIds {
                doi: Some(format!("10.1000/{}", n)),
                ..Default::default()
            },
            citation_count: 5,
            credibility_score: 6.0,
            relevance_score: 0.5,
        }
    }

    fn config(dir: &std::path::Path, max_memory: usize) -> CacheConfig {
        CacheConfig {
            path: dir.join("cache.db"),
            ttl_hours: 24,
            max_memory_entries: max_memory,
        }
    }

    #[test]
    fn query_hash_ignores_compound_order() {
        let a = Query::new("cbd sleep", Intent::Sleep).with_compounds(["CBD", "CBN"]);
        let b = Query::new("cbd sleep", Intent::Sleep).with_compounds(["CBN", "CBD"]);
        assert_eq!(EvidenceCache::query_hash(&a), EvidenceCache::query_hash(&b));
    }

    #[test]
    fn query_hash_varies_with_inputs() {
        let base = Query::new("cbd sleep", Intent::Sleep);
        let other_text = Query::new("cbd anxiety", Intent::Sleep);
        let other_intent = Query::new("cbd sleep", Intent::Anxiety);
        let other_limit = Query::new("cbd sleep", Intent::Sleep).with_max_results(5);

        let h = EvidenceCache::query_hash(&base);
        assert_ne!(h, EvidenceCache::query_hash(&other_text));
        assert_ne!(h, EvidenceCache::query_hash(&other_intent));
        assert_ne!(h, EvidenceCache::query_hash(&other_limit));
    }

    #[tokio::test]
    async fn round_trip_through_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();

        let query = Query::new("cbd sleep", Intent::Sleep);
        assert!(cache.get(&query).await.unwrap().is_none());

        cache.put(&query, &[record(1), record(2)], 2).await.unwrap();
        let got = cache.get(&query).await.unwrap().unwrap();
        assert_eq!(got.records.len(), 2);
        assert_eq!(got.total_found, 2);
        assert_eq!(got.records[0].title, "Record 1");

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.total_misses, 1);
    }

    #[tokio::test]
    async fn disk_hit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let query = Query::new("cbd sleep", Intent::Sleep);

        {
            let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();
            cache.put(&query, &[record(1)], 4).await.unwrap();
            cache.close().await.unwrap();
        }

        let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();
        let got = cache.get(&query).await.unwrap().unwrap();
        assert_eq!(got.records.len(), 1);
        // The pre-truncation total survives the disk round trip.
        assert_eq!(got.total_found, 4);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.disk_hits, 1);
        // Disk hit hydrated the memory tier.
        assert_eq!(stats.memory_entries, 1);

        let again = cache.get(&query).await.unwrap().unwrap();
        assert_eq!(again.records.len(), 1);
        assert_eq!(again.total_found, 4);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.memory_hits, 1);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();

        let query = Query::new("cbd sleep", Intent::Sleep);
        cache.put(&query, &[], 0).await.unwrap();
        assert!(cache.get(&query).await.unwrap().is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.disk_queries, 0);
    }

    #[tokio::test]
    async fn expired_entries_miss_and_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();

        let query = Query::new("cbd sleep", Intent::Sleep);
        let past = Utc::now().timestamp() - 10;
        cache.put_until(&query, &[record(1)], 1, past).await.unwrap();

        assert!(cache.get(&query).await.unwrap().is_none());

        let removed = cache.cleanup_expired().await.unwrap();
        assert_eq!(removed, 2); // one record row + one query row

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.disk_records, 0);
        assert_eq!(stats.disk_queries, 0);
    }

    #[tokio::test]
    async fn identical_records_share_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();

        let a = Query::new("cbd sleep", Intent::Sleep);
        let b = Query::new("cbd for rest", Intent::Sleep);
        cache.put(&a, &[record(1)], 1).await.unwrap();
        cache.put(&b, &[record(1)], 1).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.disk_records, 1);
        assert_eq!(stats.disk_queries, 2);
    }

    #[tokio::test]
    async fn memory_tier_evicts_lru_but_disk_retains() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EvidenceCache::open(&config(dir.path(), 10)).await.unwrap();

        let queries: Vec<Query> = (0..11)
            .map(|i| Query::new(format!("query {}", i), Intent::General))
            .collect();
        for (i, q) in queries.iter().enumerate().take(10) {
            cache.put(q, &[record(i)], 1).await.unwrap();
        }

        // The 11th insert evicts the least-recently-used entry (10% of 10).
        cache.put(&queries[10], &[record(10)], 1).await.unwrap();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.memory_entries, 10);

        // Evicted from memory, but still served from disk.
        let got = cache.get(&queries[0]).await.unwrap().unwrap();
        assert_eq!(got.records.len(), 1);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.disk_hits, 1);
    }
}
