use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            sources: SourcesConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_max_memory_entries")]
    pub max_memory_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_hours: default_ttl_hours(),
            max_memory_entries: default_max_memory_entries(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("evidence_cache.db")
}
fn default_ttl_hours() -> u64 {
    24
}
fn default_max_memory_entries() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub pubmed: SourceConfig,
    #[serde(default)]
    pub europe_pmc: SourceConfig,
    #[serde(default)]
    pub clinical_trials: SourceConfig,
    #[serde(default)]
    pub fda: SourceConfig,
    #[serde(default)]
    pub strains: SourceConfig,
    #[serde(default)]
    pub pubchem: SourceConfig,
    #[serde(default)]
    pub terpenes: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the adapter's built-in endpoint; tests point this at a
    /// local server.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// API key for sources that accept one (NCBI raises rate limits).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            api_key: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    #[serde(default = "default_credibility_weight")]
    pub credibility_weight: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            credibility_weight: default_credibility_weight(),
        }
    }
}

fn default_relevance_weight() -> f64 {
    0.6
}
fn default_credibility_weight() -> f64 {
    0.4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.cache.ttl_hours == 0 {
        anyhow::bail!("cache.ttl_hours must be > 0");
    }

    if config.cache.max_memory_entries == 0 {
        anyhow::bail!("cache.max_memory_entries must be > 0");
    }

    let w = config.ranking.relevance_weight + config.ranking.credibility_weight;
    if (w - 1.0).abs() > 1e-6 {
        anyhow::bail!("ranking weights must sum to 1.0, got {}", w);
    }

    if !(0.0..=1.0).contains(&config.ranking.relevance_weight) {
        anyhow::bail!("ranking.relevance_weight must be in [0.0, 1.0]");
    }

    for (name, source) in [
        ("pubmed", &config.sources.pubmed),
        ("europe_pmc", &config.sources.europe_pmc),
        ("clinical_trials", &config.sources.clinical_trials),
        ("fda", &config.sources.fda),
        ("strains", &config.sources.strains),
        ("pubchem", &config.sources.pubchem),
        ("terpenes", &config.sources.terpenes),
    ] {
        if source.timeout_secs == 0 {
            anyhow::bail!("sources.{}.timeout_secs must be > 0", name);
        }
        if source.max_concurrency == 0 {
            anyhow::bail!("sources.{}.max_concurrency must be > 0", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn load_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[cache]
path = "cache.db"
ttl_hours = 12

[sources.pubmed]
timeout_secs = 5
"#
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.cache.ttl_hours, 12);
        assert_eq!(config.cache.max_memory_entries, 100);
        assert_eq!(config.sources.pubmed.timeout_secs, 5);
        assert_eq!(config.sources.fda.timeout_secs, 10);
    }

    #[test]
    fn rejects_zero_ttl() {
        let mut config = Config::default();
        config.cache.ttl_hours = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unbalanced_ranking_weights() {
        let mut config = Config::default();
        config.ranking.relevance_weight = 0.9;
        assert!(validate(&config).is_err());
    }
}
