//! European biomedical literature adapter (Europe PMC REST).
//!
//! Single-step search: the `search` endpoint with `resultType=core` returns
//! full article metadata in one JSON payload, including `citedByCount` —
//! the only literature source here that reports real citation counts, which
//! feed the credibility scorer's citation component.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{EvidenceRecord, ExternalIds, Query, StudyType};
use crate::traits::{acquire_gate, SourceAdapter};

const SOURCE_NAME: &str = "europe-pmc";
const DEFAULT_BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
// Hard API limit on pageSize.
const MAX_PAGE_SIZE: usize = 100;
const MAX_AUTHORS: usize = 10;

pub struct EuropePmcAdapter {
    client: Client,
    gate: Semaphore,
    base_url: String,
    timeout_secs: u64,
}

impl EuropePmcAdapter {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            gate: Semaphore::new(config.max_concurrency),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl SourceAdapter for EuropePmcAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Peer-reviewed literature from Europe PMC, with citation counts"
    }

    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        let _permit = acquire_gate(&self.gate, SOURCE_NAME).await?;

        let term = build_search_query(query);
        debug!(%term, "europe pmc search");

        let page_size = query.max_results.clamp(1, MAX_PAGE_SIZE);
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", term.as_str()),
                ("format", "json"),
                ("resultType", "core"),
                ("pageSize", &page_size.to_string()),
                ("cursorMark", "*"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                source: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
        parse_search_response(&body, query.max_results)
    }
}

/// Build an Europe PMC query string: compound synonym groups, intent terms,
/// remaining free text, then date, language, full-text, and source filters.
fn build_search_query(query: &Query) -> String {
    let mut clauses = Vec::new();

    let compound_terms: Vec<String> = query
        .compounds
        .iter()
        .map(|compound| match compound.to_uppercase().as_str() {
            "CBD" => "(cannabidiol OR CBD)".to_string(),
            "CBN" => "(cannabinol OR CBN)".to_string(),
            "CBG" => "(cannabigerol OR CBG)".to_string(),
            "CBC" => "(cannabichromene OR CBC)".to_string(),
            "THC" => "(tetrahydrocannabinol OR THC)".to_string(),
            other => format!("\"{}\"", other),
        })
        .collect();
    if !compound_terms.is_empty() {
        clauses.push(format!("({})", compound_terms.join(" OR ")));
    }

    let intent_terms = match query.intent.as_str() {
        "sleep" => "sleep OR insomnia OR \"sleep disorder\" OR \"sleep quality\"",
        "anxiety" => "anxiety OR \"anxiety disorder\" OR anxiolytic OR stress",
        "pain" => "pain OR \"chronic pain\" OR analgesic OR analgesia OR inflammation",
        "epilepsy" => "epilepsy OR seizure OR anticonvulsant OR \"Dravet syndrome\"",
        "dosage" => "dose OR dosage OR \"dose response\" OR \"therapeutic dose\"",
        "safety" => "safety OR \"adverse effects\" OR toxicity OR \"side effects\"",
        _ => "",
    };
    if !intent_terms.is_empty() {
        clauses.push(format!("({})", intent_terms));
    }

    // Free text only adds signal when it isn't just restating the compounds.
    let text_lower = query.text.to_lowercase();
    let duplicates_compounds = query
        .compounds
        .iter()
        .any(|c| text_lower.contains(&c.to_lowercase()));
    if !query.text.is_empty() && !duplicates_compounds {
        let clean: String = query
            .text
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();
        if !clean.trim().is_empty() {
            clauses.push(format!("\"{}\"", clean.trim()));
        }
    }

    let mut term = clauses.join(" AND ");
    term.push_str(&format!(" AND PUB_YEAR:[{} TO 3000]", query.min_year));
    term.push_str(" AND LANG:\"eng\"");
    term.push_str(" AND HAS_PDF:\"Y\"");
    term.push_str(" AND (SRC:\"MED\" OR SRC:\"PMC\" OR SRC:\"AGR\" OR SRC:\"CBA\")");
    term
}

fn parse_search_response(body: &str, limit: usize) -> Result<Vec<EvidenceRecord>, SourceError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(SOURCE_NAME, e.to_string()))?;

    Ok(response
        .result_list
        .result
        .into_iter()
        .take(limit)
        .filter_map(normalize_result)
        .collect())
}

fn normalize_result(result: PmcResult) -> Option<EvidenceRecord> {
    let title = result.title.unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let registry_id = result.pmid.clone().or_else(|| result.pmcid.clone());
    let key = registry_id.clone().or_else(|| result.doi.clone())?;

    let authors = result
        .author_list
        .map(|list| {
            list.author
                .into_iter()
                .take(MAX_AUTHORS)
                .filter_map(|a| a.full_name)
                .collect()
        })
        .unwrap_or_default();

    let journal = result
        .journal_info
        .and_then(|info| info.journal)
        .and_then(|j| j.title)
        .unwrap_or_default();

    let year = result
        .pub_year
        .and_then(|y| y.parse().ok())
        .unwrap_or_else(|| Utc::now().year());

    let abstract_text = result.abstract_text.unwrap_or_default();

    let pub_types: Vec<String> = result
        .pub_type_list
        .map(|list| list.pub_type.into_iter().map(|t| t.to_lowercase()).collect())
        .unwrap_or_default();
    let study_type = categorize_study_type(&pub_types, &title, &abstract_text);

    let url = result
        .pmid
        .as_ref()
        .map(|pmid| format!("https://europepmc.org/article/MED/{}", pmid))
        .or_else(|| {
            result
                .pmcid
                .as_ref()
                .map(|pmcid| format!("https://europepmc.org/article/PMC/{}", pmcid))
        });

    Some(
        EvidenceRecord {
            id: format!("{}:{}", SOURCE_NAME, key),
            title,
            authors,
            year,
            journal,
            source_name: SOURCE_NAME.to_string(),
            study_type,
            abstract_text,
            external_ids: ExternalIds {
                doi: result.doi.filter(|d| !d.is_empty()),
                registry_id,
                url,
            },
            citation_count: result.cited_by_count.unwrap_or(0),
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
        .sanitized(),
    )
}

/// Publication types decide first; title/abstract indicators break the tie
/// for records tagged only as generic journal articles.
fn categorize_study_type(pub_types: &[String], title: &str, abstract_text: &str) -> StudyType {
    let has = |needle: &str| pub_types.iter().any(|t| t.contains(needle));

    if has("randomized controlled trial") {
        return StudyType::RandomizedControlledTrial;
    }
    if has("clinical trial") {
        return StudyType::ClinicalTrial;
    }
    if has("meta-analysis") {
        return StudyType::MetaAnalysis;
    }
    if has("systematic review") {
        return StudyType::SystematicReview;
    }
    if has("review") {
        return StudyType::Review;
    }
    if has("case report") || has("case study") {
        return StudyType::CaseReport;
    }

    let combined = format!("{} {}", title.to_lowercase(), abstract_text.to_lowercase());
    if ["randomized", "randomised", "rct"].iter().any(|t| combined.contains(t)) {
        StudyType::RandomizedControlledTrial
    } else if ["clinical trial", "phase i", "phase ii", "phase iii"]
        .iter()
        .any(|t| combined.contains(t))
    {
        StudyType::ClinicalTrial
    } else if combined.contains("meta-analysis") || combined.contains("metaanalysis") {
        StudyType::MetaAnalysis
    } else if combined.contains("systematic review") {
        StudyType::SystematicReview
    } else if combined.contains("case report") {
        StudyType::CaseReport
    } else {
        StudyType::ResearchArticle
    }
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultList", default)]
    result_list: ResultList,
}

#[derive(Debug, Deserialize, Default)]
struct ResultList {
    #[serde(default)]
    result: Vec<PmcResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PmcResult {
    #[serde(default)]
    pmid: Option<String>,
    #[serde(default)]
    pmcid: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_list: Option<PmcAuthorList>,
    #[serde(default)]
    journal_info: Option<JournalInfo>,
    #[serde(default)]
    pub_year: Option<String>,
    #[serde(default)]
    abstract_text: Option<String>,
    #[serde(default)]
    pub_type_list: Option<PubTypeList>,
    #[serde(default)]
    cited_by_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PmcAuthorList {
    #[serde(default)]
    author: Vec<PmcAuthor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PmcAuthor {
    #[serde(default)]
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalInfo {
    #[serde(default)]
    journal: Option<PmcJournal>,
}

#[derive(Debug, Deserialize)]
struct PmcJournal {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PubTypeList {
    #[serde(rename = "pubType", default)]
    pub_type: Vec<String>,
}
