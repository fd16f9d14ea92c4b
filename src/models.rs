//! Core data models used throughout the evidence engine.
//!
//! These types represent the queries, normalized evidence records, and
//! result summaries that flow through the aggregation pipeline. `Query` and
//! `EvidenceRecord` are plain value objects and are freely cloned; ranked
//! result sets are returned to callers as immutable snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Abstracts are truncated to this many characters to bound memory and
/// cache-row size.
pub const ABSTRACT_MAX_CHARS: usize = 1000;

/// Sentinel author used when a source provides no author information.
pub const UNKNOWN_AUTHOR: &str = "[unattributed]";

/// Default publication-year floor for queries.
pub const DEFAULT_MIN_YEAR: i32 = 2015;

/// Default result cap for queries.
pub const DEFAULT_MAX_RESULTS: usize = 15;

/// Primary intent behind a research query.
///
/// Unknown intent strings parse to [`Intent::General`] rather than erroring;
/// only the listed intents carry curated keyword tables for relevance
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Sleep,
    Anxiety,
    Pain,
    Epilepsy,
    Dosage,
    Safety,
    #[default]
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Sleep => "sleep",
            Intent::Anxiety => "anxiety",
            Intent::Pain => "pain",
            Intent::Epilepsy => "epilepsy",
            Intent::Dosage => "dosage",
            Intent::Safety => "safety",
            Intent::General => "general",
        }
    }
}

impl FromStr for Intent {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "sleep" => Intent::Sleep,
            "anxiety" => Intent::Anxiety,
            "pain" => Intent::Pain,
            "epilepsy" => Intent::Epilepsy,
            "dosage" => Intent::Dosage,
            "safety" => Intent::Safety,
            _ => Intent::General,
        })
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Study methodology tag carried by every evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StudyType {
    MetaAnalysis,
    SystematicReview,
    RandomizedControlledTrial,
    ClinicalTrial,
    #[serde(rename = "phase-1-trial")]
    Phase1Trial,
    #[serde(rename = "phase-2-trial")]
    Phase2Trial,
    #[serde(rename = "phase-3-trial")]
    Phase3Trial,
    CohortStudy,
    CaseControlStudy,
    CaseReport,
    ObservationalStudy,
    Review,
    ResearchArticle,
    StrainProfile,
    CompoundProfile,
    RegulatoryLabel,
    RegulatoryEnforcement,
    AdverseEventReport,
}

impl StudyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::MetaAnalysis => "meta-analysis",
            StudyType::SystematicReview => "systematic-review",
            StudyType::RandomizedControlledTrial => "randomized-controlled-trial",
            StudyType::ClinicalTrial => "clinical-trial",
            StudyType::Phase1Trial => "phase-1-trial",
            StudyType::Phase2Trial => "phase-2-trial",
            StudyType::Phase3Trial => "phase-3-trial",
            StudyType::CohortStudy => "cohort-study",
            StudyType::CaseControlStudy => "case-control-study",
            StudyType::CaseReport => "case-report",
            StudyType::ObservationalStudy => "observational-study",
            StudyType::Review => "review",
            StudyType::ResearchArticle => "research-article",
            StudyType::StrainProfile => "strain-profile",
            StudyType::CompoundProfile => "compound-profile",
            StudyType::RegulatoryLabel => "regulatory-label",
            StudyType::RegulatoryEnforcement => "regulatory-enforcement",
            StudyType::AdverseEventReport => "adverse-event-report",
        }
    }

    /// Fixed 0-10 hierarchy score used by the credibility scorer.
    /// Meta-analyses sit at the top, profile records at the bottom.
    pub fn hierarchy_score(&self) -> f64 {
        match self {
            StudyType::MetaAnalysis => 10.0,
            StudyType::SystematicReview => 9.0,
            StudyType::RandomizedControlledTrial => 8.0,
            StudyType::Phase3Trial => 8.0,
            StudyType::ClinicalTrial => 7.0,
            StudyType::Phase2Trial => 7.0,
            StudyType::RegulatoryLabel => 7.0,
            StudyType::CohortStudy => 6.0,
            StudyType::Review => 6.0,
            StudyType::AdverseEventReport => 6.0,
            StudyType::RegulatoryEnforcement => 6.0,
            StudyType::CaseControlStudy => 5.0,
            StudyType::Phase1Trial => 5.0,
            StudyType::ResearchArticle => 5.0,
            StudyType::CaseReport => 4.0,
            StudyType::ObservationalStudy => 4.0,
            StudyType::StrainProfile => 3.0,
            StudyType::CompoundProfile => 3.0,
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured research query.
///
/// Construct with [`Query::new`] and the `with_*` helpers, then let the
/// aggregator normalize it (compound canonicalization and inference live in
/// [`crate::classify`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub intent: Intent,
    /// Compound names of interest. May be empty, in which case they are
    /// inferred from `text` during normalization.
    #[serde(default)]
    pub compounds: Vec<String>,
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Optional preferred study types, forwarded to adapters that can filter.
    #[serde(default)]
    pub source_type_preferences: Vec<StudyType>,
}

fn default_min_year() -> i32 {
    DEFAULT_MIN_YEAR
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl Query {
    pub fn new(text: impl Into<String>, intent: Intent) -> Self {
        Self {
            text: text.into(),
            intent,
            compounds: Vec::new(),
            min_year: DEFAULT_MIN_YEAR,
            max_results: DEFAULT_MAX_RESULTS,
            source_type_preferences: Vec::new(),
        }
    }

    pub fn with_compounds<I, S>(mut self, compounds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compounds = compounds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_year(mut self, min_year: i32) -> Self {
        self.min_year = min_year;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// External identifiers attached to an evidence record. At least one field
/// is populated on every normalized record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.doi.is_none() && self.registry_id.is_none() && self.url.is_none()
    }

    /// Best resolvable link for the record: DOI link first, then the
    /// explicit URL.
    pub fn resolve_url(&self) -> Option<String> {
        if let Some(doi) = &self.doi {
            return Some(format!("https://doi.org/{}", doi));
        }
        self.url.clone()
    }
}

/// Canonical evidence record produced by source adapters.
///
/// `credibility_score` and `relevance_score` start at 0.0; only the two
/// scorer components write them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Stable adapter-prefixed id, e.g. `pubmed:34567890`.
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub journal: String,
    /// Name of the adapter that produced this record.
    pub source_name: String,
    pub study_type: StudyType,
    pub abstract_text: String,
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub citation_count: u32,
    #[serde(default)]
    pub credibility_score: f64,
    #[serde(default)]
    pub relevance_score: f64,
}

impl EvidenceRecord {
    /// Enforce record invariants: bounded abstract, non-empty author list.
    ///
    /// Every adapter calls this before returning a record.
    pub fn sanitized(mut self) -> Self {
        if self.abstract_text.chars().count() > ABSTRACT_MAX_CHARS {
            self.abstract_text = self.abstract_text.chars().take(ABSTRACT_MAX_CHARS).collect();
        }
        self.authors.retain(|a| !a.trim().is_empty());
        if self.authors.is_empty() {
            self.authors.push(UNKNOWN_AUTHOR.to_string());
        }
        self
    }
}

/// Presentation band derived from a credibility score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredibilityBadge {
    Excellent,
    Good,
    Fair,
    Limited,
    Low,
}

impl CredibilityBadge {
    pub fn label(&self) -> &'static str {
        match self {
            CredibilityBadge::Excellent => "Excellent",
            CredibilityBadge::Good => "Good",
            CredibilityBadge::Fair => "Fair",
            CredibilityBadge::Limited => "Limited",
            CredibilityBadge::Low => "Low",
        }
    }
}

/// Weighted sub-scores behind a credibility score. Derived, never persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredibilityBreakdown {
    pub source: f64,
    pub study_type: f64,
    pub journal: f64,
    pub recency: f64,
    pub citations: f64,
    pub authority: f64,
}

impl CredibilityBreakdown {
    pub fn total(&self) -> f64 {
        (self.source + self.study_type + self.journal + self.recency + self.citations
            + self.authority)
            .clamp(0.0, 10.0)
    }
}

/// Weighted sub-scores behind a relevance score. Derived, never persisted.
/// Each sub-score is bounded to [0, 1] before weighting.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceBreakdown {
    pub direct_match: f64,
    pub intent_match: f64,
    pub compound_match: f64,
    pub study_type_fit: f64,
    pub title_bonus: f64,
    pub penalty: f64,
}

impl RelevanceBreakdown {
    pub fn total(&self) -> f64 {
        (self.direct_match * 0.30
            + self.intent_match * 0.25
            + self.compound_match * 0.20
            + self.study_type_fit * 0.15
            + self.title_bonus * 0.10
            - self.penalty)
            .clamp(0.0, 1.0)
    }
}

/// Aggregate quality statistics for a set of scored records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_records: usize,
    pub average_credibility: f64,
    /// Records scoring >= 7.0.
    pub high_quality_count: usize,
    /// Records scoring >= 8.5.
    pub excellent_count: usize,
    pub quality_percentage: f64,
    pub source_distribution: BTreeMap<String, usize>,
    pub study_type_distribution: BTreeMap<String, usize>,
    /// Min and max publication year across records with a known year.
    pub year_range: Option<(i32, i32)>,
    /// Sources contributing the most records, highest first.
    pub top_sources: Vec<String>,
    pub recommendation: String,
}

/// Which parts of the query the result set actually covered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryCoverage {
    pub compounds_covered: Vec<String>,
    pub intent_covered: bool,
    pub study_types_present: Vec<StudyType>,
}

/// Aggregate relevance statistics for a set of scored records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelevanceSummary {
    pub total_records: usize,
    pub average_relevance: f64,
    /// Records scoring >= 0.7.
    pub high_relevance_count: usize,
    /// Records scoring in [0.4, 0.7).
    pub moderate_relevance_count: usize,
    pub low_relevance_count: usize,
    pub coverage: QueryCoverage,
    pub recommendation: String,
}

/// Ranked result of one aggregation fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Records sorted descending by the blended rank score.
    pub records: Vec<EvidenceRecord>,
    /// Number of records found across the successful sources, before
    /// truncation to `max_results`.
    pub total_found: usize,
    pub summary: QualitySummary,
    /// True when the result was served from cache without adapter calls.
    pub cached: bool,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EvidenceRecord {
        EvidenceRecord {
            id: "test:1".to_string(),
            title: "title".to_string(),
            authors: vec![],
            year: 2024,
            journal: String::new(),
            source_name: "test".to_string(),
            study_type: StudyType::ResearchArticle,
            abstract_text: "a".repeat(5000),
            external_ids: ExternalIds {
                url: Some("https://example.org".to_string()),
                ..Default::default()
            },
            citation_count: 0,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
    }

    #[test]
    fn sanitized_truncates_abstract() {
        let r = record().sanitized();
        assert_eq!(r.abstract_text.chars().count(), ABSTRACT_MAX_CHARS);
    }

    #[test]
    fn sanitized_inserts_sentinel_author() {
        let r = record().sanitized();
        assert_eq!(r.authors, vec![UNKNOWN_AUTHOR.to_string()]);
    }

    #[test]
    fn sanitized_drops_blank_authors() {
        let mut r = record();
        r.authors = vec!["  ".to_string(), "Smith, Jane".to_string()];
        let r = r.sanitized();
        assert_eq!(r.authors, vec!["Smith, Jane".to_string()]);
    }

    #[test]
    fn intent_parses_unknown_to_general() {
        assert_eq!("mechanism".parse::<Intent>().unwrap(), Intent::General);
        assert_eq!("Sleep".parse::<Intent>().unwrap(), Intent::Sleep);
    }

    #[test]
    fn study_type_serde_round_trip() {
        let json = serde_json::to_string(&StudyType::Phase3Trial).unwrap();
        assert_eq!(json, "\"phase-3-trial\"");
        let back: StudyType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StudyType::Phase3Trial);

        let json = serde_json::to_string(&StudyType::MetaAnalysis).unwrap();
        assert_eq!(json, "\"meta-analysis\"");
    }

    #[test]
    fn external_ids_prefer_doi_link() {
        let ids = ExternalIds {
            doi: Some("10.1000/xyz".to_string()),
            url: Some("https://example.org/paper".to_string()),
            registry_id: None,
        };
        assert_eq!(ids.resolve_url().unwrap(), "https://doi.org/10.1000/xyz");
    }

    #[test]
    fn breakdown_totals_are_clamped() {
        let b = CredibilityBreakdown {
            source: 4.5,
            study_type: 3.0,
            journal: 1.5,
            recency: 1.0,
            citations: 1.0,
            authority: 1.0,
        };
        assert!((b.total() - 10.0).abs() < 1e-9);

        let r = RelevanceBreakdown {
            direct_match: 1.0,
            intent_match: 1.0,
            compound_match: 1.0,
            study_type_fit: 1.0,
            title_bonus: 1.0,
            penalty: 0.0,
        };
        assert!((r.total() - 1.0).abs() < 1e-9);
    }
}
