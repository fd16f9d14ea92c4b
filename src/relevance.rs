//! Relevance matching.
//!
//! Pure functions scoring how well an [`EvidenceRecord`] answers a [`Query`],
//! on a 0-1 scale. Five weighted positive components (direct text match,
//! intent keywords, compound mentions, study-type fit, title bonus) minus a
//! capped penalty for negative indicators.

use crate::models::{
    EvidenceRecord, Intent, Query, QueryCoverage, RelevanceBreakdown, RelevanceSummary, StudyType,
};

struct IntentKeywords {
    primary: &'static [&'static str],
    secondary: &'static [&'static str],
    avoid: &'static [&'static str],
}

fn intent_keywords(intent: Intent) -> Option<IntentKeywords> {
    let kw = match intent {
        Intent::Sleep => IntentKeywords {
            primary: &["sleep", "insomnia", "sleep quality", "sleep disorder", "sleep latency"],
            secondary: &["sedating", "hypnotic", "drowsiness", "bedtime", "rest"],
            avoid: &["stimulating", "energizing", "alertness"],
        },
        Intent::Anxiety => IntentKeywords {
            primary: &["anxiety", "anxiolytic", "stress", "worry", "panic"],
            secondary: &["calming", "relaxing", "soothing", "tension"],
            avoid: &["stimulating", "paranoia", "psychoactive"],
        },
        Intent::Pain => IntentKeywords {
            primary: &["pain", "analgesia", "analgesic", "chronic pain", "neuropathic"],
            secondary: &["inflammation", "arthritis", "fibromyalgia", "migraine"],
            avoid: &["no effect", "ineffective"],
        },
        Intent::Epilepsy => IntentKeywords {
            primary: &["epilepsy", "seizure", "anticonvulsant", "dravet", "lennox-gastaut"],
            secondary: &["convulsion", "spasm", "neurological"],
            avoid: &["pro-convulsant", "seizure-inducing"],
        },
        Intent::Dosage => IntentKeywords {
            primary: &["dose", "dosage", "mg", "milligram", "administration"],
            secondary: &["titration", "start low", "dose-response", "pharmacokinetics"],
            avoid: &[],
        },
        Intent::Safety => IntentKeywords {
            primary: &["safety", "adverse", "side effect", "toxicity", "interaction"],
            secondary: &["contraindication", "warning", "precaution", "tolerance"],
            avoid: &[],
        },
        Intent::General => return None,
    };
    Some(kw)
}

/// Long-form synonyms consulted when the exact compound token is absent.
fn compound_synonyms(compound: &str) -> &'static [&'static str] {
    match compound {
        "cbd" => &["cannabidiol", "cbd"],
        "thc" => &["tetrahydrocannabinol", "thc", "delta-9-thc"],
        "cbn" => &["cannabinol", "cbn"],
        "cbg" => &["cannabigerol", "cbg"],
        "cbc" => &["cannabichromene", "cbc"],
        _ => &[],
    }
}

const STOP_WORDS: &[&str] = &[
    "i", "can", "cant", "cannot", "need", "want", "help", "with", "for", "and", "or", "the",
    "a", "an",
];

/// Full component breakdown for one record against a query.
pub fn breakdown(record: &EvidenceRecord, query: &Query) -> RelevanceBreakdown {
    let title = record.title.to_lowercase();
    let combined = format!("{} {}", title, record.abstract_text.to_lowercase());
    let query_text = query.text.to_lowercase();
    let compounds: Vec<String> = query.compounds.iter().map(|c| c.to_lowercase()).collect();

    RelevanceBreakdown {
        direct_match: query_match(&combined, &query_text),
        intent_match: intent_match(&combined, query.intent),
        compound_match: compound_match(&combined, &compounds),
        study_type_fit: study_type_fit(record.study_type, query.intent),
        title_bonus: title_bonus(&title, &query_text, query.intent),
        penalty: negative_indicators(&combined, query.intent),
    }
}

/// Relevance score in [0, 1].
pub fn score(record: &EvidenceRecord, query: &Query) -> f64 {
    breakdown(record, query).total()
}

/// Fraction of meaningful query words that appear in the text, with a bonus
/// doubling for an exact phrase match.
fn query_match(text: &str, query: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }

    let words: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .collect();
    if words.is_empty() {
        return 0.0;
    }

    let mut matches = words.iter().filter(|w| text.contains(*w)).count();
    if text.contains(query) {
        matches += words.len();
    }

    (matches as f64 / words.len() as f64).min(1.0)
}

fn intent_match(text: &str, intent: Intent) -> f64 {
    let Some(kw) = intent_keywords(intent) else {
        return 0.0;
    };

    let primary_hits = kw.primary.iter().filter(|k| text.contains(*k)).count();
    let secondary_hits = kw.secondary.iter().filter(|k| text.contains(*k)).count();

    let mut score = 0.0;
    if !kw.primary.is_empty() {
        score += primary_hits as f64 / kw.primary.len() as f64 * 0.7;
    }
    if !kw.secondary.is_empty() {
        score += secondary_hits as f64 / kw.secondary.len() as f64 * 0.3;
    }
    score.min(1.0)
}

fn compound_match(text: &str, compounds: &[String]) -> f64 {
    if compounds.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    for compound in compounds {
        let mut score = 0.0;

        if text.contains(compound.as_str()) {
            score += 0.8;
        }

        if compound_synonyms(compound)
            .iter()
            .any(|s| text.contains(s))
        {
            score += 0.6;
        }

        let mentions = text.matches(compound.as_str()).count();
        if mentions > 1 {
            score += (mentions as f64 * 0.05).min(0.2);
        }

        total += score.min(1.0);
    }

    (total / compounds.len() as f64).min(1.0)
}

fn study_type_fit(study_type: StudyType, intent: Intent) -> f64 {
    use StudyType::*;

    let preferred: &[StudyType] = match intent {
        Intent::Sleep => &[ClinicalTrial, RandomizedControlledTrial, SystematicReview],
        Intent::Anxiety => &[ClinicalTrial, RandomizedControlledTrial, MetaAnalysis],
        Intent::Pain => &[SystematicReview, MetaAnalysis, ClinicalTrial],
        Intent::Epilepsy => &[ClinicalTrial, RandomizedControlledTrial, CaseReport],
        Intent::Dosage => &[ClinicalTrial, Phase1Trial, Phase2Trial],
        Intent::Safety => &[AdverseEventReport, ClinicalTrial, SystematicReview],
        Intent::General => {
            return if matches!(
                study_type,
                MetaAnalysis | SystematicReview | RandomizedControlledTrial
            ) {
                0.8
            } else {
                0.4
            };
        }
    };

    if preferred.contains(&study_type) {
        1.0
    } else if matches!(study_type, ClinicalTrial | SystematicReview | MetaAnalysis) {
        0.7
    } else {
        0.3
    }
}

fn title_bonus(title: &str, query: &str, intent: Intent) -> f64 {
    let mut score: f64 = 0.0;

    if !query.is_empty() && title.contains(query) {
        score += 0.8;
    }

    if let Some(kw) = intent_keywords(intent) {
        if kw.primary.iter().any(|k| title.contains(k)) {
            score += 0.6;
        }
    }

    let comprehensive = ["systematic review", "meta-analysis", "clinical trial", "effects of"];
    if comprehensive.iter().any(|i| title.contains(i)) {
        score += 0.4;
    }

    score.min(1.0)
}

fn negative_indicators(text: &str, intent: Intent) -> f64 {
    let mut penalty = 0.0;

    for indicator in ["no effect", "ineffective", "failed", "negative results"] {
        if text.contains(indicator) {
            penalty += 0.2;
        }
    }

    if let Some(kw) = intent_keywords(intent) {
        for term in kw.avoid {
            if text.contains(term) {
                penalty += 0.3;
            }
        }
    }

    let animal_hits = ["animal", "rat", "mouse", "mice", "rodent", "in vitro"]
        .iter()
        .filter(|i| text.contains(*i))
        .count();
    if animal_hits > 0 {
        penalty += (animal_hits as f64 * 0.1).min(0.3);
    }

    penalty.min(0.5)
}

/// Aggregate relevance statistics over already-scored records.
pub fn summarize(records: &[EvidenceRecord], query: &Query) -> RelevanceSummary {
    if records.is_empty() {
        return RelevanceSummary::default();
    }

    let total = records.len();
    let avg: f64 = records.iter().map(|r| r.relevance_score).sum::<f64>() / total as f64;
    let high = records.iter().filter(|r| r.relevance_score >= 0.7).count();
    let moderate = records
        .iter()
        .filter(|r| r.relevance_score >= 0.4 && r.relevance_score < 0.7)
        .count();

    RelevanceSummary {
        total_records: total,
        average_relevance: (avg * 1000.0).round() / 1000.0,
        high_relevance_count: high,
        moderate_relevance_count: moderate,
        low_relevance_count: total - high - moderate,
        coverage: coverage(records, query),
        recommendation: recommendation(avg, high),
    }
}

fn coverage(records: &[EvidenceRecord], query: &Query) -> QueryCoverage {
    let combined: String = records
        .iter()
        .map(|r| format!("{} {}", r.title, r.abstract_text))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let compounds_covered = query
        .compounds
        .iter()
        .filter(|c| combined.contains(&c.to_lowercase()))
        .cloned()
        .collect();

    let intent_covered = intent_keywords(query.intent)
        .map(|kw| kw.primary.iter().any(|k| combined.contains(k)))
        .unwrap_or(false);

    let mut study_types_present: Vec<StudyType> =
        records.iter().map(|r| r.study_type).collect();
    study_types_present.sort();
    study_types_present.dedup();

    QueryCoverage {
        compounds_covered,
        intent_covered,
        study_types_present,
    }
}

fn recommendation(avg: f64, high: usize) -> String {
    if avg >= 0.7 && high >= 3 {
        "Excellent query match with highly relevant research"
    } else if avg >= 0.5 && high >= 2 {
        "Good query match with relevant studies found"
    } else if avg >= 0.3 {
        "Moderate relevance; may need broader search terms"
    } else {
        "Limited relevance; consider refining search query"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExternalIds;

    fn record(title: &str, abstract_text: &str, study_type: StudyType) -> EvidenceRecord {
        EvidenceRecord {
            id: "test:1".to_string(),
            title: title.to_string(),
            authors: vec!["Doe, J".to_string()],
            year: 2024,
            journal: "Sleep Medicine".to_string(),
            source_name: "pubmed".to_string(),
            study_type,
            abstract_text: abstract_text.to_string(),
            external_ids: ExternalIds {
                url: Some("https://example.org".to_string()),
                ..Default::default()
            },
            citation_count: 10,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
    }

    #[test]
    fn on_topic_record_scores_high() {
        let r = record(
            "Effects of CBN on sleep quality: a randomized controlled trial",
            "Cannabinol (CBN) improved sleep latency and insomnia symptoms in \
             adults with trouble sleeping. Participants reported less daytime \
             drowsiness and easier bedtime routines. CBN and cbd were well \
             tolerated.",
            StudyType::RandomizedControlledTrial,
        );
        let q = Query::new("trouble sleeping", Intent::Sleep)
            .with_compounds(["cbn", "cbd"]);
        let s = score(&r, &q);
        assert!(s >= 0.5, "scored {}", s);
        assert!(s <= 1.0);
    }

    #[test]
    fn off_topic_record_scores_low() {
        let r = record(
            "Soil nitrogen cycles in temperate forests",
            "We measured nitrogen fixation rates across forest plots.",
            StudyType::ResearchArticle,
        );
        let q = Query::new("cbd for anxiety", Intent::Anxiety).with_compounds(["cbd"]);
        assert!(score(&r, &q) < 0.3);
    }

    #[test]
    fn empty_query_text_uses_other_components() {
        let r = record(
            "CBD anxiety study",
            "cbd reduced anxiety and panic in a clinical trial",
            StudyType::ClinicalTrial,
        );
        let q = Query::new("", Intent::Anxiety).with_compounds(["cbd"]);
        let s = score(&r, &q);
        assert!(s > 0.0);
        assert!(s <= 1.0);
    }

    #[test]
    fn animal_study_is_penalized() {
        let base = "cbd improved sleep quality and reduced insomnia";
        let human = record("CBD and sleep", base, StudyType::ClinicalTrial);
        let animal = record(
            "CBD and sleep",
            &format!("{} in a rat model; rodent subjects; in vitro assays", base),
            StudyType::ClinicalTrial,
        );
        let q = Query::new("cbd sleep", Intent::Sleep).with_compounds(["cbd"]);
        assert!(score(&animal, &q) < score(&human, &q));
    }

    #[test]
    fn avoid_terms_reduce_score() {
        let neutral = record(
            "CBN sleep aid trial",
            "cbn improved sleep outcomes",
            StudyType::ClinicalTrial,
        );
        let contrary = record(
            "CBN sleep aid trial",
            "cbn improved sleep outcomes but was stimulating and increased alertness",
            StudyType::ClinicalTrial,
        );
        let q = Query::new("cbn sleep", Intent::Sleep).with_compounds(["cbn"]);
        assert!(score(&contrary, &q) < score(&neutral, &q));
    }

    #[test]
    fn study_type_fit_bands() {
        assert_eq!(study_type_fit(StudyType::ClinicalTrial, Intent::Sleep), 1.0);
        assert_eq!(study_type_fit(StudyType::MetaAnalysis, Intent::Sleep), 0.7);
        assert_eq!(study_type_fit(StudyType::StrainProfile, Intent::Sleep), 0.3);
        assert_eq!(study_type_fit(StudyType::MetaAnalysis, Intent::General), 0.8);
        assert_eq!(study_type_fit(StudyType::CaseReport, Intent::General), 0.4);
    }

    #[test]
    fn penalty_is_capped() {
        let text = "no effect ineffective failed negative results stimulating \
                    energizing alertness rat mouse mice animal in vitro";
        assert_eq!(negative_indicators(text, Intent::Sleep), 0.5);
    }

    #[test]
    fn summary_and_coverage() {
        let mut a = record(
            "CBN for insomnia",
            "cbn helped sleep",
            StudyType::ClinicalTrial,
        );
        a.relevance_score = 0.8;
        let mut b = record(
            "Terpene overview",
            "myrcene aroma profile",
            StudyType::CompoundProfile,
        );
        b.relevance_score = 0.2;

        let q = Query::new("cbn sleep", Intent::Sleep).with_compounds(["CBN", "CBD"]);
        let summary = summarize(&[a, b], &q);
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.high_relevance_count, 1);
        assert_eq!(summary.low_relevance_count, 1);
        assert_eq!(summary.coverage.compounds_covered, vec!["CBN".to_string()]);
        assert!(summary.coverage.intent_covered);
        assert_eq!(summary.coverage.study_types_present.len(), 2);
    }
}
