//! Curated terpene knowledge base.
//!
//! The only adapter with no network dependency: eight well-characterized
//! terpenes with effects, aroma, and therapeutic data compiled from the
//! published literature. Queries select profiles three ways, in order:
//! terpenes named directly in the query text, terpenes whose effect or
//! condition tables match the query intent, or the five major terpenes for
//! generic terpene questions.

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::error::SourceError;
use crate::models::{EvidenceRecord, ExternalIds, Intent, Query, StudyType};
use crate::traits::SourceAdapter;

const SOURCE_NAME: &str = "terpenes";
const MAJOR_TERPENES: &[&str] = &["myrcene", "limonene", "pinene", "linalool", "caryophyllene"];
const GENERIC_TERMS: &[&str] = &["terpene", "terpenes", "aroma", "entourage"];

struct TerpeneProfile {
    key: &'static str,
    name: &'static str,
    chemical_name: &'static str,
    formula: &'static str,
    molecular_weight: f64,
    boiling_point_c: u32,
    primary_effects: &'static [&'static str],
    secondary_effects: &'static [&'static str],
    synergy: &'static str,
    aroma_primary: &'static str,
    aroma_secondary: &'static [&'static str],
    conditions: &'static [&'static str],
    mechanisms: &'static [&'static str],
    natural_sources: &'static [&'static str],
}

static TERPENES: &[TerpeneProfile] = &[
    TerpeneProfile {
        key: "myrcene",
        name: "Myrcene",
        chemical_name: "β-Myrcene",
        formula: "C10H16",
        molecular_weight: 136.23,
        boiling_point_c: 167,
        primary_effects: &["sedating", "relaxing", "muscle-relaxant"],
        secondary_effects: &["couch-lock", "sleepy", "calm"],
        synergy: "enhances THC absorption",
        aroma_primary: "earthy",
        aroma_secondary: &["musky", "clove-like", "herbal"],
        conditions: &["insomnia", "pain", "inflammation", "muscle-spasms"],
        mechanisms: &["GABA enhancement", "muscle relaxation", "anti-inflammatory"],
        natural_sources: &["mangoes", "hops", "lemongrass", "cannabis"],
    },
    TerpeneProfile {
        key: "limonene",
        name: "Limonene",
        chemical_name: "D-Limonene",
        formula: "C10H16",
        molecular_weight: 136.23,
        boiling_point_c: 176,
        primary_effects: &["uplifting", "stress-relief", "mood-enhancement"],
        secondary_effects: &["energizing", "focus", "anti-anxiety"],
        synergy: "enhances serotonin and dopamine",
        aroma_primary: "citrus",
        aroma_secondary: &["lemon", "orange", "fresh"],
        conditions: &["depression", "anxiety", "stress", "acid-reflux", "gallstones"],
        mechanisms: &["serotonin uptake", "gastric protection", "anti-tumor"],
        natural_sources: &["citrus-peels", "juniper", "peppermint", "cannabis"],
    },
    TerpeneProfile {
        key: "pinene",
        name: "Pinene",
        chemical_name: "α-Pinene",
        formula: "C10H16",
        molecular_weight: 136.23,
        boiling_point_c: 156,
        primary_effects: &["alertness", "memory-retention", "focus"],
        secondary_effects: &["counteracts-thc-memory-loss", "bronchodilator", "anti-inflammatory"],
        synergy: "balances THC effects",
        aroma_primary: "pine",
        aroma_secondary: &["rosemary", "basil", "woody"],
        conditions: &["asthma", "pain", "ulcers", "anxiety", "cancer"],
        mechanisms: &["acetylcholinesterase inhibition", "bronchodilation", "anti-microbial"],
        natural_sources: &["pine-needles", "rosemary", "basil", "dill", "cannabis"],
    },
    TerpeneProfile {
        key: "linalool",
        name: "Linalool",
        chemical_name: "Linalool",
        formula: "C10H18O",
        molecular_weight: 154.25,
        boiling_point_c: 198,
        primary_effects: &["calming", "sedating", "anti-anxiety"],
        secondary_effects: &["anti-convulsant", "analgesic", "anti-depressant"],
        synergy: "enhances CBD effects",
        aroma_primary: "floral",
        aroma_secondary: &["lavender", "spicy", "woody"],
        conditions: &["anxiety", "depression", "insomnia", "pain", "seizures"],
        mechanisms: &[
            "GABA modulation",
            "serotonin receptor activation",
            "voltage-gated sodium channels",
        ],
        natural_sources: &["lavender", "coriander", "mint", "cinnamon", "cannabis"],
    },
    TerpeneProfile {
        key: "caryophyllene",
        name: "Caryophyllene",
        chemical_name: "β-Caryophyllene",
        formula: "C15H24",
        molecular_weight: 204.35,
        boiling_point_c: 266,
        primary_effects: &["anti-inflammatory", "analgesic", "neuroprotective"],
        secondary_effects: &["gastroprotective", "anti-oxidant", "anti-anxiety"],
        synergy: "CB2 receptor activation (only terpene to do this)",
        aroma_primary: "spicy",
        aroma_secondary: &["woody", "clove", "pepper"],
        conditions: &["chronic-pain", "anxiety", "depression", "ulcers", "arthritis"],
        mechanisms: &[
            "CB2 receptor agonist",
            "anti-inflammatory pathways",
            "neuroprotection",
        ],
        natural_sources: &["black-pepper", "cloves", "hops", "oregano", "cannabis"],
    },
    TerpeneProfile {
        key: "humulene",
        name: "Humulene",
        chemical_name: "α-Humulene",
        formula: "C15H24",
        molecular_weight: 204.35,
        boiling_point_c: 198,
        primary_effects: &["appetite-suppressant", "anti-inflammatory", "antibacterial"],
        secondary_effects: &["energizing", "focus", "anti-tumor"],
        synergy: "works well with caryophyllene",
        aroma_primary: "woody",
        aroma_secondary: &["earthy", "spicy", "herbal"],
        conditions: &["inflammation", "bacterial-infections", "appetite-control"],
        mechanisms: &["cyclooxygenase inhibition", "antimicrobial activity"],
        natural_sources: &["hops", "coriander", "cloves", "basil", "cannabis"],
    },
    TerpeneProfile {
        key: "terpinolene",
        name: "Terpinolene",
        chemical_name: "Terpinolene",
        formula: "C10H16",
        molecular_weight: 136.23,
        boiling_point_c: 185,
        primary_effects: &["uplifting", "energetic", "creative"],
        secondary_effects: &["anti-oxidant", "sedating-in-large-doses", "anti-bacterial"],
        synergy: "complex biphasic effects",
        aroma_primary: "fresh",
        aroma_secondary: &["piney", "floral", "citrus"],
        conditions: &["oxidative-stress", "bacterial-infections", "insomnia-in-large-doses"],
        mechanisms: &["antioxidant activity", "antimicrobial", "CNS depressant"],
        natural_sources: &["nutmeg", "tea-tree", "conifers", "apples", "cannabis"],
    },
    TerpeneProfile {
        key: "ocimene",
        name: "Ocimene",
        chemical_name: "β-Ocimene",
        formula: "C10H16",
        molecular_weight: 136.23,
        boiling_point_c: 185,
        primary_effects: &["uplifting", "energizing", "decongestant"],
        secondary_effects: &["anti-viral", "anti-fungal", "anti-bacterial"],
        synergy: "enhances other terpene absorption",
        aroma_primary: "sweet",
        aroma_secondary: &["citrus", "floral", "woody"],
        conditions: &["congestion", "viral-infections", "fungal-infections"],
        mechanisms: &["antimicrobial activity", "decongestant properties"],
        natural_sources: &["mint", "parsley", "pepper", "basil", "orchids", "cannabis"],
    },
];

/// Terms matched against the effect and condition tables when selecting
/// profiles for an intent.
fn intent_terms(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Sleep => &["sedating", "sleep", "insomnia", "relaxing"],
        Intent::Anxiety => &["anxiety", "calming", "stress"],
        Intent::Pain => &["analgesic", "anti-inflammatory", "pain"],
        Intent::Epilepsy => &["anti-convulsant", "seizures"],
        Intent::Dosage | Intent::Safety | Intent::General => &[],
    }
}

fn lookup(name: &str) -> Option<&'static TerpeneProfile> {
    let key = name.to_lowercase();
    TERPENES.iter().find(|t| t.key == key)
}

fn match_count(profile: &TerpeneProfile, terms: &[&str]) -> usize {
    terms
        .iter()
        .filter(|term| {
            profile
                .primary_effects
                .iter()
                .chain(profile.secondary_effects)
                .chain(profile.conditions)
                .any(|entry| entry.contains(*term) || term.contains(entry))
        })
        .count()
}

fn profile_record(profile: &TerpeneProfile) -> EvidenceRecord {
    let chem_info = format!(
        "Chemical Formula: {}, Molecular Weight: {} g/mol, Boiling Point: {}°C",
        profile.formula, profile.molecular_weight, profile.boiling_point_c
    );
    let effects_info = format!(
        "Primary Effects: {}. Mechanisms of Action: {}. Synergy: {}",
        profile.primary_effects.join(", "),
        profile.mechanisms.join(", "),
        profile.synergy
    );
    let therapeutic_info = format!(
        "Therapeutic Applications: {}",
        profile.conditions.join(", ")
    );
    let sensory_info = format!(
        "Aroma Profile: {} with {} notes. Natural Sources: {}",
        profile.aroma_primary,
        profile.aroma_secondary.join(", "),
        profile.natural_sources.join(", ")
    );

    EvidenceRecord {
        id: format!("terpene:{}", profile.key),
        title: format!(
            "Terpene Profile: {} ({}) - Chemical Properties and Therapeutic Applications",
            profile.name, profile.chemical_name
        ),
        authors: vec!["Terpene Research Compendium".to_string()],
        year: Utc::now().year(),
        journal: "Cannabis Terpene Research Compendium".to_string(),
        source_name: SOURCE_NAME.to_string(),
        study_type: StudyType::CompoundProfile,
        abstract_text: [chem_info, effects_info, therapeutic_info, sensory_info].join(". "),
        external_ids: ExternalIds {
            doi: None,
            registry_id: Some(profile.key.to_string()),
            url: None,
        },
        citation_count: 0,
        credibility_score: 0.0,
        relevance_score: 0.0,
    }
    .sanitized()
}

#[derive(Default)]
pub struct TerpeneAdapter;

impl TerpeneAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceAdapter for TerpeneAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Curated terpene effect and therapeutic knowledge base"
    }

    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        let text = query.text.to_lowercase();

        // Terpenes named directly win over everything else. The compound
        // extractor canonicalizes terpene names, so check both places.
        let mut mentioned: Vec<&TerpeneProfile> = TERPENES
            .iter()
            .filter(|t| {
                text.contains(t.key)
                    || query.compounds.iter().any(|c| c.eq_ignore_ascii_case(t.key))
            })
            .collect();
        if !mentioned.is_empty() {
            return Ok(mentioned.drain(..).map(profile_record).collect());
        }

        let terms = intent_terms(query.intent);
        if !terms.is_empty() {
            let mut scored: Vec<(usize, &TerpeneProfile)> = TERPENES
                .iter()
                .map(|t| (match_count(t, terms), t))
                .filter(|(hits, _)| *hits > 0)
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            return Ok(scored
                .into_iter()
                .take(3)
                .map(|(_, t)| profile_record(t))
                .collect());
        }

        if GENERIC_TERMS.iter().any(|term| text.contains(term)) {
            return Ok(MAJOR_TERPENES
                .iter()
                .filter_map(|name| lookup(name))
                .map(profile_record)
                .collect());
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Query;

    #[tokio::test]
    async fn named_terpene_returns_its_profile() {
        let adapter = TerpeneAdapter::new();
        let query = Query::new("what does myrcene do", Intent::General);
        let records = adapter.search(&query).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "terpene:myrcene");
        assert!(records[0].abstract_text.contains("Chemical Formula: C10H16"));
        assert!(records[0].abstract_text.contains("GABA enhancement"));
        assert_eq!(records[0].study_type, StudyType::CompoundProfile);
    }

    #[tokio::test]
    async fn sleep_intent_selects_sedating_terpenes() {
        let adapter = TerpeneAdapter::new();
        let query = Query::new("help falling asleep", Intent::Sleep);
        let records = adapter.search(&query).await.unwrap();
        assert!(!records.is_empty());
        assert!(records.len() <= 3);
        // Myrcene hits sedating, sleepy, insomnia, and relaxing.
        assert_eq!(records[0].id, "terpene:myrcene");
    }

    #[tokio::test]
    async fn generic_terpene_query_returns_major_profiles() {
        let adapter = TerpeneAdapter::new();
        let query = Query::new("overview of cannabis terpenes", Intent::General);
        let records = adapter.search(&query).await.unwrap();
        assert_eq!(records.len(), MAJOR_TERPENES.len());
    }

    #[tokio::test]
    async fn unrelated_query_returns_nothing() {
        let adapter = TerpeneAdapter::new();
        let query = Query::new("latest dosage guidelines", Intent::Dosage);
        let records = adapter.search(&query).await.unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn catalog_covers_eight_terpenes() {
        assert_eq!(TERPENES.len(), 8);
        assert!(lookup("Linalool").is_some());
        assert!(lookup("geraniol").is_none());
    }
}
