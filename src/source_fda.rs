//! Regulatory and safety database adapter (openFDA).
//!
//! Consults three openFDA databases: drug labels, adverse-event reports,
//! and food enforcement actions. Labels map to individual records;
//! adverse events and enforcement actions are summarized into one record
//! per compound or term, since the raw rows are too granular to rank.
//!
//! openFDA payloads are loosely shaped, so normalization works over
//! `serde_json::Value` rather than fixed wire structs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{EvidenceRecord, ExternalIds, Query, StudyType};
use crate::traits::{acquire_gate, SourceAdapter};

const SOURCE_NAME: &str = "fda";
const DEFAULT_BASE_URL: &str = "https://api.fda.gov";
const PAGE_LIMIT: usize = 20;

pub struct FdaAdapter {
    client: Client,
    gate: Semaphore,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl FdaAdapter {
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
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn search_database(&self, db_path: &str, search: &str) -> Result<Vec<Value>, SourceError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.base_url, db_path))
            .query(&[("search", search), ("limit", &PAGE_LIMIT.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;

        // openFDA answers 404 for zero matches; that is an empty result, not
        // a failure.
        if response.status().as_u16() == 404 {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            return Err(SourceError::Status {
                source: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn search_drug_labels(&self, compounds: &[String]) -> Vec<EvidenceRecord> {
        let mut records = Vec::new();
        for compound in compounds {
            for term in fda_search_terms(compound) {
                let search = format!(
                    "openfda.generic_name:\"{t}\" OR openfda.brand_name:\"{t}\" OR description:\"{t}\"",
                    t = term
                );
                match self.search_database("drug/label.json", &search).await {
                    Ok(results) => {
                        records.extend(
                            results
                                .iter()
                                .filter_map(|label| normalize_drug_label(label, compound)),
                        );
                    }
                    Err(err) => warn!(%err, term, "drug label search failed"),
                }
            }
        }
        records
    }

    async fn search_adverse_events(&self, compounds: &[String]) -> Vec<EvidenceRecord> {
        let mut records = Vec::new();
        for compound in compounds {
            let mut events = Vec::new();
            for term in fda_search_terms(compound) {
                let search = format!(
                    "patient.drug.medicinalproduct:\"{t}\" OR patient.drug.openfda.generic_name:\"{t}\"",
                    t = term
                );
                match self.search_database("drug/event.json", &search).await {
                    Ok(results) => events.extend(results),
                    Err(err) => warn!(%err, term, "adverse event search failed"),
                }
            }
            if let Some(record) = summarize_adverse_events(&events, compound) {
                records.push(record);
            }
        }
        records
    }

    async fn search_enforcement(&self) -> Vec<EvidenceRecord> {
        let mut records = Vec::new();
        for term in ["CBD", "cannabidiol", "hemp"] {
            let search = format!(
                "product_description:\"{t}\" OR reason_for_recall:\"{t}\"",
                t = term
            );
            match self.search_database("food/enforcement.json", &search).await {
                Ok(results) => {
                    if let Some(record) = summarize_enforcement(&results, term) {
                        records.push(record);
                    }
                }
                Err(err) => warn!(%err, term, "enforcement search failed"),
            }
        }
        records
    }
}

#[async_trait]
impl SourceAdapter for FdaAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Regulatory labels, adverse events, and enforcement actions from openFDA"
    }

    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        let _permit = acquire_gate(&self.gate, SOURCE_NAME).await?;

        debug!(compounds = ?query.compounds, "fda search");

        let mut records = self.search_drug_labels(&query.compounds).await;
        records.extend(self.search_adverse_events(&query.compounds).await);
        records.extend(self.search_enforcement().await);
        Ok(records)
    }
}

fn fda_search_terms(compound: &str) -> Vec<String> {
    match compound.to_uppercase().as_str() {
        "CBD" => vec!["cannabidiol".to_string(), "CBD".to_string()],
        "CBN" => vec!["cannabinol".to_string(), "CBN".to_string()],
        "CBG" => vec!["cannabigerol".to_string(), "CBG".to_string()],
        "THC" => vec![
            "tetrahydrocannabinol".to_string(),
            "THC".to_string(),
            "delta-9-THC".to_string(),
        ],
        _ => vec![compound.to_string()],
    }
}

fn first_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(Value::as_str)
}

fn normalize_drug_label(label: &Value, compound: &str) -> Option<EvidenceRecord> {
    let openfda = label.get("openfda").cloned().unwrap_or(Value::Null);

    let product = first_str(&openfda, "brand_name")
        .or_else(|| first_str(&openfda, "generic_name"))
        .unwrap_or(compound);
    let title = format!("FDA Drug Label: {}", product);

    let description = first_str(label, "description").unwrap_or_default();
    let warnings = first_str(label, "warnings").unwrap_or_default();
    let abstract_text = format!(
        "Drug Label Information: {}\n\nWarnings: {}",
        description, warnings
    );

    let manufacturer = first_str(&openfda, "manufacturer_name")
        .unwrap_or("FDA")
        .to_string();

    let set_id = label.get("set_id").and_then(Value::as_str).unwrap_or_default();
    let url = if set_id.is_empty() {
        "https://www.fda.gov/".to_string()
    } else {
        format!("https://dailymed.nlm.nih.gov/dailymed/drugInfo.cfm?setid={}", set_id)
    };

    Some(
        EvidenceRecord {
            id: if set_id.is_empty() {
                format!("fda-label:{}", compound.to_lowercase())
            } else {
                format!("fda-label:{}", set_id)
            },
            title,
            authors: vec![manufacturer],
            // Labels describe the product as currently approved.
            year: Utc::now().year(),
            journal: "FDA Drug Labels".to_string(),
            source_name: SOURCE_NAME.to_string(),
            study_type: StudyType::RegulatoryLabel,
            abstract_text,
            external_ids: ExternalIds {
                doi: None,
                registry_id: (!set_id.is_empty()).then(|| set_id.to_string()),
                url: Some(url),
            },
            citation_count: 0,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
        .sanitized(),
    )
}

/// Collapse a batch of adverse-event rows into one summary record listing
/// the most frequently reported reactions.
fn summarize_adverse_events(events: &[Value], compound: &str) -> Option<EvidenceRecord> {
    if events.is_empty() {
        return None;
    }

    let mut reaction_counts: HashMap<String, usize> = HashMap::new();
    for event in events {
        let reactions = event
            .get("patient")
            .and_then(|p| p.get("reaction"))
            .and_then(Value::as_array);
        if let Some(reactions) = reactions {
            for reaction in reactions {
                if let Some(term) = reaction.get("reactionmeddrapt").and_then(Value::as_str) {
                    *reaction_counts.entry(term.to_lowercase()).or_default() += 1;
                }
            }
        }
    }

    let mut top: Vec<(String, usize)> = reaction_counts.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut abstract_text = format!(
        "FDA Adverse Event Analysis for {}: {} reported events.",
        compound,
        events.len()
    );
    if !top.is_empty() {
        let listed: Vec<String> = top
            .iter()
            .take(5)
            .map(|(term, count)| format!("{} ({})", term, count))
            .collect();
        abstract_text.push_str(&format!(" Most common reactions: {}.", listed.join(", ")));
    }

    Some(
        EvidenceRecord {
            id: format!("fda-events:{}", compound.to_lowercase()),
            title: format!("FDA Adverse Event Reports: {}", compound),
            authors: vec!["FDA FAERS Database".to_string()],
            year: Utc::now().year(),
            journal: "FDA Adverse Event Reporting System (FAERS)".to_string(),
            source_name: SOURCE_NAME.to_string(),
            study_type: StudyType::AdverseEventReport,
            abstract_text,
            external_ids: ExternalIds {
                doi: None,
                registry_id: None,
                url: Some(
                    "https://www.fda.gov/drugs/surveillance/fda-adverse-event-reporting-system-faers"
                        .to_string(),
                ),
            },
            citation_count: 0,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
        .sanitized(),
    )
}

fn summarize_enforcement(actions: &[Value], term: &str) -> Option<EvidenceRecord> {
    if actions.is_empty() {
        return None;
    }

    let mut reasons: Vec<&str> = actions
        .iter()
        .filter_map(|a| a.get("reason_for_recall").and_then(Value::as_str))
        .collect();
    reasons.sort();
    reasons.dedup();

    let mut abstract_text = format!(
        "FDA Enforcement Actions related to {}: {} actions recorded.",
        term,
        actions.len()
    );
    if !reasons.is_empty() {
        abstract_text.push_str(&format!(
            " Common reasons: {}",
            reasons.iter().take(5).cloned().collect::<Vec<_>>().join("; ")
        ));
    }

    Some(
        EvidenceRecord {
            id: format!("fda-enforcement:{}", term.to_lowercase()),
            title: format!("FDA Food Enforcement Actions: {}", term),
            authors: vec!["FDA Center for Food Safety and Applied Nutrition".to_string()],
            year: Utc::now().year(),
            journal: "FDA Enforcement Reports".to_string(),
            source_name: SOURCE_NAME.to_string(),
            study_type: StudyType::RegulatoryEnforcement,
            abstract_text,
            external_ids: ExternalIds {
                doi: None,
                registry_id: None,
                url: Some(
                    "https://www.fda.gov/safety/recalls-market-withdrawals-safety-alerts"
                        .to_string(),
                ),
            },
            citation_count: 0,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
        .sanitized(),
    )
}
