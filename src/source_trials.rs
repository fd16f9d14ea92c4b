//! Clinical-trial registry adapter (ClinicalTrials.gov API v2).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{EvidenceRecord, ExternalIds, Query, StudyType, ABSTRACT_MAX_CHARS};
use crate::traits::{acquire_gate, SourceAdapter};

const SOURCE_NAME: &str = "clinical-trials";
const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2";
const MAX_QUERY_TERMS: usize = 10;
const MAX_AUTHORS: usize = 5;

pub struct TrialsAdapter {
    client: Client,
    gate: Semaphore,
    base_url: String,
    timeout_secs: u64,
}

impl TrialsAdapter {
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
impl SourceAdapter for TrialsAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Registered clinical trials from ClinicalTrials.gov"
    }

    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        let _permit = acquire_gate(&self.gate, SOURCE_NAME).await?;

        let condition = build_condition_query(query);
        debug!(%condition, "clinical trials search");

        let response = self
            .client
            .get(format!("{}/studies", self.base_url))
            .query(&[
                ("format", "json"),
                ("countTotal", "true"),
                ("pageSize", &query.max_results.max(1).to_string()),
                ("query.cond", &condition),
                ("query.intr", "cannabidiol OR CBD OR hemp OR cannabis"),
                (
                    "filter.advanced",
                    &format!(
                        "AREA[StudyFirstPostDate]RANGE[{}-01-01,MAX]",
                        query.min_year
                    ),
                ),
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

        let body: StudiesResponse = response
            .json()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;

        Ok(body
            .studies
            .into_iter()
            .filter_map(normalize_study)
            .collect())
    }
}

/// Condition query: compound synonyms, intent terms, then the cleaned free
/// text, OR-joined and capped to keep the query tractable.
fn build_condition_query(query: &Query) -> String {
    let mut terms: Vec<String> = Vec::new();

    for compound in &query.compounds {
        match compound.to_uppercase().as_str() {
            "CBD" => terms.extend(["cannabidiol".to_string(), "CBD".to_string()]),
            "CBN" => terms.extend(["cannabinol".to_string(), "CBN".to_string()]),
            "CBG" => terms.extend(["cannabigerol".to_string(), "CBG".to_string()]),
            "CBC" => terms.extend(["cannabichromene".to_string(), "CBC".to_string()]),
            _ => terms.push(compound.clone()),
        }
    }

    let intent_terms: &[&str] = match query.intent.as_str() {
        "sleep" => &["insomnia", "sleep disorder", "sleep quality"],
        "anxiety" => &["anxiety", "anxiety disorder", "stress"],
        "pain" => &["pain", "chronic pain", "analgesia"],
        "epilepsy" => &["epilepsy", "seizure", "Dravet syndrome", "Lennox-Gastaut"],
        "safety" => &["safety", "adverse effects", "toxicity"],
        _ => &[],
    };
    terms.extend(intent_terms.iter().map(|t| t.to_string()));

    let clean: String = query
        .text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    if !clean.trim().is_empty() {
        terms.push(clean.trim().to_string());
    }

    terms.truncate(MAX_QUERY_TERMS);
    terms.join(" OR ")
}

fn normalize_study(study: Study) -> Option<EvidenceRecord> {
    let protocol = study.protocol_section?;
    let identification = protocol.identification_module?;

    let nct_id = identification.nct_id?;
    let title = identification
        .official_title
        .or(identification.brief_title)
        .unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let mut authors = Vec::new();
    if let Some(contacts) = &protocol.contacts_locations_module {
        for contact in &contacts.central_contacts {
            if let Some(name) = &contact.name {
                authors.push(name.clone());
            }
        }
        for official in &contacts.overall_officials {
            if let Some(name) = &official.name {
                if !authors.contains(name) {
                    authors.push(name.clone());
                }
            }
        }
    }
    if authors.is_empty() {
        authors.push("Clinical Trial Investigators".to_string());
    }
    authors.truncate(MAX_AUTHORS);

    let abstract_text = protocol
        .description_module
        .map(|d| {
            let brief = d.brief_summary.unwrap_or_default();
            let detailed = d.detailed_description.unwrap_or_default();
            let mut text = format!("{}\n\n{}", brief, detailed).trim().to_string();
            if text.chars().count() > ABSTRACT_MAX_CHARS {
                text = text.chars().take(ABSTRACT_MAX_CHARS).collect();
            }
            text
        })
        .unwrap_or_default();

    let year = protocol
        .status_module
        .and_then(|s| s.study_first_submit_date)
        .and_then(|d| extract_year(&d))
        .unwrap_or_else(|| Utc::now().year());

    let (study_type, phases) = protocol
        .design_module
        .map(|d| (d.study_type.unwrap_or_default(), d.phases))
        .unwrap_or_default();

    Some(
        EvidenceRecord {
            id: format!("trial:{}", nct_id),
            title,
            authors,
            year,
            journal: "ClinicalTrials.gov".to_string(),
            source_name: SOURCE_NAME.to_string(),
            study_type: categorize_trial(&study_type, &phases),
            abstract_text,
            external_ids: ExternalIds {
                doi: None,
                registry_id: Some(nct_id.clone()),
                url: Some(format!("https://clinicaltrials.gov/study/{}", nct_id)),
            },
            citation_count: 0,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
        .sanitized(),
    )
}

fn extract_year(date: &str) -> Option<i32> {
    // Dates arrive as YYYY-MM-DD or YYYY-MM; the year is always the first
    // four-digit run.
    let digits: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        return digits.parse().ok();
    }
    date.split(|c: char| !c.is_ascii_digit())
        .find(|s| s.len() == 4)
        .and_then(|s| s.parse().ok())
}

fn categorize_trial(study_type: &str, phases: &[String]) -> StudyType {
    if study_type.eq_ignore_ascii_case("observational") {
        return StudyType::ObservationalStudy;
    }

    let phase_str = phases.join(", ").to_lowercase();
    if phase_str.contains("phase1") || phase_str.contains("phase 1") {
        StudyType::Phase1Trial
    } else if phase_str.contains("phase2") || phase_str.contains("phase 2") {
        StudyType::Phase2Trial
    } else if phase_str.contains("phase3") || phase_str.contains("phase 3") {
        StudyType::Phase3Trial
    } else {
        StudyType::ClinicalTrial
    }
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Study>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
    protocol_section: Option<ProtocolSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolSection {
    identification_module: Option<IdentificationModule>,
    description_module: Option<DescriptionModule>,
    status_module: Option<StatusModule>,
    design_module: Option<DesignModule>,
    contacts_locations_module: Option<ContactsLocationsModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentificationModule {
    nct_id: Option<String>,
    brief_title: Option<String>,
    official_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionModule {
    brief_summary: Option<String>,
    detailed_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusModule {
    study_first_submit_date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DesignModule {
    study_type: Option<String>,
    #[serde(default)]
    phases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactsLocationsModule {
    #[serde(default)]
    central_contacts: Vec<NamedPerson>,
    #[serde(default)]
    overall_officials: Vec<NamedPerson>,
}

#[derive(Debug, Deserialize)]
struct NamedPerson {
    name: Option<String>,
}
