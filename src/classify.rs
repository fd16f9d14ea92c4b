//! Query classification and compound extraction.
//!
//! Pure string heuristics: which category a query falls into (and therefore
//! which source adapters are worth calling), and which compounds it mentions
//! or implies.

use crate::models::{Intent, Query};

/// Broad query category driving adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCategory {
    Medical,
    Product,
    Chemical,
    Safety,
    General,
}

const SAFETY_TERMS: &[&str] = &[
    "safety",
    "safe",
    "side effect",
    "adverse",
    "interaction",
    "contraindication",
    "warning",
    "recall",
    "overdose",
    "toxicity",
    "fda",
    "regulation",
    "legal",
];

const PRODUCT_TERMS: &[&str] = &[
    "strain",
    "indica",
    "sativa",
    "hybrid",
    "flower",
    "cultivar",
    "dispensary",
    "product",
    "gummy",
    "gummies",
    "edible",
    "tincture",
    "vape",
];

const CHEMICAL_TERMS: &[&str] = &[
    "terpene",
    "molecular",
    "molecule",
    "chemistry",
    "chemical",
    "structure",
    "synthesis",
    "receptor",
    "pharmacology",
    "binding",
    "metabolite",
];

const MEDICAL_TERMS: &[&str] = &[
    "treatment",
    "therapy",
    "clinical",
    "trial",
    "patient",
    "symptom",
    "diagnosis",
    "efficacy",
    "dose",
    "dosage",
    "insomnia",
    "epilepsy",
    "seizure",
    "chronic",
    "disorder",
];

/// Classify a query into a category.
///
/// Order matters: safety concerns trump everything, then product/chemical
/// vocabularies, then the broad medical bucket. Queries matching nothing go
/// to `General`.
pub fn classify(query: &Query) -> QueryCategory {
    let text = query.text.to_lowercase();

    if query.intent == Intent::Safety || contains_any(&text, SAFETY_TERMS) {
        return QueryCategory::Safety;
    }
    if contains_any(&text, PRODUCT_TERMS) {
        return QueryCategory::Product;
    }
    if contains_any(&text, CHEMICAL_TERMS) {
        return QueryCategory::Chemical;
    }
    if contains_any(&text, MEDICAL_TERMS)
        || matches!(
            query.intent,
            Intent::Sleep | Intent::Anxiety | Intent::Pain | Intent::Epilepsy | Intent::Dosage
        )
    {
        return QueryCategory::Medical;
    }
    QueryCategory::General
}

/// Adapter names to invoke for a category, in preference order. Names match
/// `SourceAdapter::name`.
pub fn sources_for(category: QueryCategory) -> &'static [&'static str] {
    match category {
        QueryCategory::Medical => &["pubmed", "europe-pmc", "clinical-trials", "terpenes"],
        QueryCategory::Product => &["strains", "terpenes", "pubchem"],
        QueryCategory::Chemical => &["pubchem", "terpenes", "pubmed"],
        QueryCategory::Safety => &["fda", "pubmed", "clinical-trials"],
        QueryCategory::General => &["pubmed", "clinical-trials", "strains", "terpenes"],
    }
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

/// Canonical compound name plus the surface patterns that map to it.
const COMPOUND_PATTERNS: &[(&str, &[&str])] = &[
    ("CBD", &["cbd", "cannabidiol"]),
    ("CBN", &["cbn", "cannabinol"]),
    ("CBG", &["cbg", "cannabigerol"]),
    ("CBC", &["cbc", "cannabichromene"]),
    (
        "THC",
        &["thc", "tetrahydrocannabinol", "delta-9", "delta 9", "d9", "delta9"],
    ),
    ("THCA", &["thca", "thc-a", "tetrahydrocannabinolic acid", "raw thc"]),
    ("Delta-8", &["delta-8", "delta 8", "d8", "delta8", "delta-8-thc"]),
    ("Delta-10", &["delta-10", "delta 10", "d10", "delta10", "delta-10-thc"]),
    ("HHC", &["hhc", "hexahydrocannabinol"]),
    ("THCP", &["thcp", "thc-p", "tetrahydrocannabiphorol"]),
    ("THCV", &["thcv", "thc-v", "tetrahydrocannabivarin"]),
    ("CBDV", &["cbdv", "cbd-v", "cannabidivarin"]),
    ("CBL", &["cbl", "cannabicyclol"]),
    ("CBGA", &["cbga", "cannabigerolic acid"]),
    ("CBDA", &["cbda", "cannabidiolic acid"]),
];

/// Effect and slang vocabulary mapped to the compounds usually behind it.
/// Only consulted when no compound is mentioned directly.
const EFFECT_COMPOUNDS: &[(&str, &[&str])] = &[
    ("high", &["THC", "THCA", "Delta-8", "Delta-10", "HHC"]),
    ("stoned", &["THC", "THCA", "CBN"]),
    ("euphoria", &["THC", "Delta-8", "HHC", "THCP"]),
    ("buzz", &["Delta-8", "HHC", "Delta-10"]),
    ("legal high", &["Delta-8", "HHC", "THCA", "Delta-10"]),
    ("party", &["Delta-8", "THCV", "Delta-10"]),
    ("microdose", &["THC", "Delta-8"]),
    ("creative", &["THCV", "Delta-10", "CBG"]),
    ("focus", &["THCV", "CBG", "Delta-10"]),
    ("energy", &["THCV", "CBG", "Delta-10"]),
    ("appetite", &["THCV"]),
    ("weight", &["THCV"]),
    ("sleep", &["CBN", "THC", "Delta-8"]),
    ("pain", &["THC", "CBD", "CBC"]),
    ("anxiety", &["CBD", "Delta-8"]),
    ("inflammation", &["CBD", "CBC", "CBG"]),
];

/// Map a user-supplied compound name to its canonical form, if recognized.
pub fn canonical_compound(name: &str) -> Option<&'static str> {
    let lower = name.trim().to_lowercase();
    COMPOUND_PATTERNS
        .iter()
        .find(|(canonical, patterns)| {
            canonical.eq_ignore_ascii_case(&lower) || patterns.contains(&lower.as_str())
        })
        .map(|(canonical, _)| *canonical)
}

/// Extract compound names from free text.
///
/// Direct mentions win; if none are found, effect/slang vocabulary implies a
/// set (first matching effect only); if still nothing, fall back to the two
/// compounds every source covers.
pub fn extract_compounds(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();

    let mut compounds: Vec<String> = COMPOUND_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(canonical, _)| canonical.to_string())
        .collect();

    if compounds.is_empty() {
        for (effect, implied) in EFFECT_COMPOUNDS {
            if lower.contains(effect) {
                compounds.extend(implied.iter().map(|c| c.to_string()));
                break;
            }
        }
    }

    if compounds.is_empty() {
        compounds = vec!["CBD".to_string(), "THC".to_string()];
    }

    compounds.sort();
    compounds.dedup();
    compounds
}

/// Canonical form of a query: compounds canonicalized (unrecognized names
/// kept verbatim), de-duplicated and sorted; an empty compound set inferred
/// from the text.
pub fn normalize_query(mut query: Query) -> Query {
    if query.compounds.is_empty() {
        query.compounds = extract_compounds(&query.text);
    } else {
        query.compounds = query
            .compounds
            .iter()
            .map(|c| {
                canonical_compound(c)
                    .map(str::to_string)
                    .unwrap_or_else(|| c.trim().to_string())
            })
            .filter(|c| !c.is_empty())
            .collect();
        query.compounds.sort();
        query.compounds.dedup();
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_compound_mentions() {
        let got = extract_compounds("does cannabidiol interact with delta-8?");
        assert_eq!(got, vec!["CBD".to_string(), "Delta-8".to_string()]);
    }

    #[test]
    fn effect_inference_when_no_direct_mention() {
        let got = extract_compounds("what helps with sleep?");
        assert!(got.contains(&"CBN".to_string()));
        assert!(got.contains(&"THC".to_string()));
    }

    #[test]
    fn fallback_compounds() {
        assert_eq!(
            extract_compounds("tell me about research"),
            vec!["CBD".to_string(), "THC".to_string()]
        );
    }

    #[test]
    fn canonicalization() {
        assert_eq!(canonical_compound("Cannabidiol"), Some("CBD"));
        assert_eq!(canonical_compound("thc-v"), Some("THCV"));
        assert_eq!(canonical_compound("unknownium"), None);
    }

    #[test]
    fn normalize_dedups_and_sorts() {
        let q = Query::new("test", Intent::General)
            .with_compounds(["cannabidiol", "CBD", "thc"]);
        let q = normalize_query(q);
        assert_eq!(q.compounds, vec!["CBD".to_string(), "THC".to_string()]);
    }

    #[test]
    fn safety_intent_wins() {
        let q = Query::new("strain recommendations", Intent::Safety);
        assert_eq!(classify(&q), QueryCategory::Safety);
    }

    #[test]
    fn product_terms_classify_product() {
        let q = Query::new("best indica strain for evenings", Intent::General);
        assert_eq!(classify(&q), QueryCategory::Product);
        assert_eq!(sources_for(QueryCategory::Product)[0], "strains");
    }

    #[test]
    fn medical_intent_without_keywords() {
        let q = Query::new("cbn research", Intent::Sleep);
        assert_eq!(classify(&q), QueryCategory::Medical);
    }

    #[test]
    fn unmatched_is_general() {
        let q = Query::new("history of hemp farming", Intent::General);
        assert_eq!(classify(&q), QueryCategory::General);
    }
}
