//! Credibility scoring.
//!
//! Pure functions from an [`EvidenceRecord`] to a 0-10 credibility score,
//! built from six additive components: source base score, study-type
//! hierarchy, journal reputation, recency, citations, and author authority.
//! Missing data bottoms out at the worst band for its component; nothing
//! here errors.

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};

use crate::models::{CredibilityBadge, CredibilityBreakdown, EvidenceRecord, QualitySummary};

/// High-impact venues in the field. Substring match, lowercased.
const HIGH_IMPACT_JOURNALS: &[&str] = &[
    "nature",
    "science",
    "cell",
    "lancet",
    "new england journal of medicine",
    "jama",
    "british medical journal",
    "journal of clinical investigation",
    "proceedings of the national academy of sciences",
    "nature medicine",
    "neuropsychopharmacology",
    "journal of cannabis research",
    "cannabis and cannabinoid research",
    "european journal of pain",
    "journal of pain",
    "epilepsia",
    "seizure",
    "sleep medicine",
    "clinical therapeutics",
    "pharmacology & therapeutics",
];

const GOVERNMENT_JOURNAL_INDICATORS: &[&str] =
    &["fda", "nih", "cdc", "who", "clinical trials", "cochrane"];

const DOMAIN_JOURNAL_INDICATORS: &[&str] = &["cannabis", "cannabinoid", "hemp"];

const MEDICAL_JOURNAL_INDICATORS: &[&str] =
    &["journal", "medicine", "medical", "clinical", "therapeutics"];

/// Sources counted as government-backed for the authority bonus.
const GOVERNMENT_SOURCES: &[&str] = &["fda", "clinical-trials"];

/// Score a single record. Deterministic for a fixed `now_year`; callers use
/// [`score`] which pins it to the current year.
fn score_at(record: &EvidenceRecord, now_year: i32) -> CredibilityBreakdown {
    CredibilityBreakdown {
        source: base_source_score(&record.source_name),
        study_type: record.study_type.hierarchy_score() / 10.0 * 3.0 * 0.8,
        journal: journal_score(&record.journal),
        recency: recency_score(record.year, now_year),
        citations: citation_score(record.citation_count),
        authority: authority_score(record),
    }
}

/// Full component breakdown for one record.
pub fn breakdown(record: &EvidenceRecord) -> CredibilityBreakdown {
    score_at(record, Utc::now().year())
}

/// Credibility score in [0, 10].
pub fn score(record: &EvidenceRecord) -> f64 {
    breakdown(record).total()
}

fn base_source_score(source: &str) -> f64 {
    match source {
        "pubmed" => 4.0,
        "europe-pmc" => 3.5,
        "clinical-trials" => 3.5,
        "fda" => 4.0,
        "terpenes" => 3.0,
        "pubchem" => 3.0,
        "strains" => 2.0,
        _ => 2.0,
    }
}

fn journal_score(journal: &str) -> f64 {
    if journal.is_empty() {
        return 0.0;
    }
    let lower = journal.to_lowercase();

    if HIGH_IMPACT_JOURNALS.iter().any(|j| lower.contains(j)) {
        1.5
    } else if GOVERNMENT_JOURNAL_INDICATORS.iter().any(|j| lower.contains(j)) {
        1.0
    } else if DOMAIN_JOURNAL_INDICATORS.iter().any(|j| lower.contains(j)) {
        0.8
    } else if MEDICAL_JOURNAL_INDICATORS.iter().any(|j| lower.contains(j)) {
        0.5
    } else {
        0.0
    }
}

fn recency_score(year: i32, now_year: i32) -> f64 {
    let age = now_year.saturating_sub(year);
    if age <= 2 {
        1.0
    } else if age <= 5 {
        0.8
    } else if age <= 10 {
        0.5
    } else if age <= 15 {
        0.3
    } else {
        0.1
    }
}

fn citation_score(citations: u32) -> f64 {
    match citations {
        0 => 0.0,
        1..=9 => 0.2,
        10..=49 => 0.5,
        50..=99 => 0.8,
        _ => 1.0,
    }
}

fn authority_score(record: &EvidenceRecord) -> f64 {
    let mut score: f64 = 0.0;

    if GOVERNMENT_SOURCES.contains(&record.source_name.as_str()) {
        score += 0.5;
    }

    for author in &record.authors {
        let lower = author.to_lowercase();
        if ["fda", "nih", "cdc", "who"].iter().any(|i| lower.contains(i)) {
            score += 0.3;
            break;
        }
        if ["university", "college", "institute", "medical center", "hospital"]
            .iter()
            .any(|i| lower.contains(i))
        {
            score += 0.2;
            break;
        }
    }

    if record.authors.len() >= 5 {
        score += 0.2;
    } else if record.authors.len() >= 3 {
        score += 0.1;
    }

    score.min(1.0)
}

/// Presentation band for a score.
pub fn badge(score: f64) -> CredibilityBadge {
    if score >= 8.5 {
        CredibilityBadge::Excellent
    } else if score >= 7.0 {
        CredibilityBadge::Good
    } else if score >= 5.0 {
        CredibilityBadge::Fair
    } else if score >= 3.0 {
        CredibilityBadge::Limited
    } else {
        CredibilityBadge::Low
    }
}

/// Aggregate quality statistics over already-scored records.
pub fn summarize(records: &[EvidenceRecord]) -> QualitySummary {
    if records.is_empty() {
        return QualitySummary::default();
    }

    let total = records.len();
    let sum: f64 = records.iter().map(|r| r.credibility_score).sum();
    let avg = sum / total as f64;
    let high_quality = records.iter().filter(|r| r.credibility_score >= 7.0).count();
    let excellent = records.iter().filter(|r| r.credibility_score >= 8.5).count();

    let mut source_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut study_type_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut min_year = i32::MAX;
    let mut max_year = i32::MIN;
    for record in records {
        *source_distribution.entry(record.source_name.clone()).or_default() += 1;
        *study_type_distribution
            .entry(record.study_type.as_str().to_string())
            .or_default() += 1;
        if record.year > 0 {
            min_year = min_year.min(record.year);
            max_year = max_year.max(record.year);
        }
    }

    let mut by_count: Vec<(&String, &usize)> = source_distribution.iter().collect();
    by_count.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let top_sources: Vec<String> = by_count.into_iter().take(3).map(|(s, _)| s.clone()).collect();

    QualitySummary {
        total_records: total,
        average_credibility: (avg * 100.0).round() / 100.0,
        high_quality_count: high_quality,
        excellent_count: excellent,
        quality_percentage: (high_quality as f64 / total as f64 * 1000.0).round() / 10.0,
        source_distribution,
        study_type_distribution,
        year_range: (min_year <= max_year).then_some((min_year, max_year)),
        top_sources,
        recommendation: recommendation(avg, high_quality, total),
    }
}

fn recommendation(avg: f64, high_quality: usize, total: usize) -> String {
    let quality_ratio = if total > 0 {
        high_quality as f64 / total as f64
    } else {
        0.0
    };

    if avg >= 7.5 && quality_ratio >= 0.6 {
        "Excellent evidence base with multiple high-quality sources"
    } else if avg >= 6.0 && quality_ratio >= 0.4 {
        "Good evidence base with reliable sources"
    } else if avg >= 4.5 {
        "Moderate evidence base; consider additional verification"
    } else {
        "Limited evidence base; seek additional authoritative sources"
    }
    .to_string()
}
