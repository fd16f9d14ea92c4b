//! Chemical compound database adapter (PubChem PUG REST).
//!
//! For each queried compound: resolve the name to a compound id (a table of
//! well-known cannabinoid and terpene CIDs short-circuits the lookup), then
//! fetch properties and a description, and collapse everything into one
//! compound-profile record. Cannabinoid queries additionally pull a few
//! common terpenes, since they dominate the entourage literature.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{EvidenceRecord, ExternalIds, Query, StudyType};
use crate::traits::{acquire_gate, SourceAdapter};

const SOURCE_NAME: &str = "pubchem";
const DEFAULT_BASE_URL: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
const ENRICHMENT_TERPENES: &[&str] = &["myrcene", "limonene", "pinene"];

/// Well-known compound ids, checked before any network lookup.
const KNOWN_CIDS: &[(&str, u64)] = &[
    ("cannabidiol", 644019),
    ("cbd", 644019),
    ("tetrahydrocannabinol", 16078),
    ("thc", 16078),
    ("cannabinol", 5284592),
    ("cbn", 5284592),
    ("cannabigerol", 5315659),
    ("cbg", 5315659),
    ("cannabichromene", 2940),
    ("cbc", 2940),
    ("myrcene", 31253),
    ("limonene", 440917),
    ("pinene", 6654),
    ("linalool", 6549),
    ("caryophyllene", 5281515),
    ("humulene", 5281520),
    ("terpinolene", 11463),
    ("ocimene", 5281553),
];

const PROPERTY_LIST: &str = "MolecularFormula,MolecularWeight,IUPACName,XLogP,TPSA,\
                             HBondDonorCount,HBondAcceptorCount";

pub struct PubchemAdapter {
    client: Client,
    gate: Semaphore,
    base_url: String,
    timeout_secs: u64,
}

impl PubchemAdapter {
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

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, SourceError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;

        // PubChem answers 404 for unknown names and missing sections.
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SourceError::Status {
                source: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .json()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
        Ok(Some(body))
    }

    async fn resolve_cid(&self, name: &str) -> Result<Option<u64>, SourceError> {
        let lower = name.to_lowercase();
        if let Some((_, cid)) = KNOWN_CIDS.iter().find(|(known, _)| *known == lower) {
            return Ok(Some(*cid));
        }

        let body: Option<CidResponse> = self
            .get_json(&format!("compound/name/{}/cids/JSON", name))
            .await?;
        Ok(body.and_then(|b| b.identifier_list.cid.into_iter().next()))
    }

    async fn fetch_profile(&self, name: &str) -> Result<Option<EvidenceRecord>, SourceError> {
        let Some(cid) = self.resolve_cid(name).await? else {
            return Ok(None);
        };

        let properties: Option<PropertyResponse> = self
            .get_json(&format!(
                "compound/cid/{}/property/{}/JSON",
                cid, PROPERTY_LIST
            ))
            .await?;
        let properties = properties
            .and_then(|p| p.property_table.properties.into_iter().next())
            .unwrap_or_default();

        let description: Option<DescriptionResponse> = self
            .get_json(&format!("compound/cid/{}/description/JSON", cid))
            .await?;
        let description = description
            .and_then(|d| {
                d.information_list
                    .information
                    .into_iter()
                    .find_map(|i| i.description)
            })
            .unwrap_or_default();

        Ok(Some(compound_record(cid, name, &properties, &description)))
    }
}

#[async_trait]
impl SourceAdapter for PubchemAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Chemical compound profiles from the PubChem database"
    }

    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        let _permit = acquire_gate(&self.gate, SOURCE_NAME).await?;

        let mut records = Vec::new();
        for compound in &query.compounds {
            match self.fetch_profile(compound).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(compound, "no compound profile found"),
                Err(err) => warn!(%err, compound, "compound lookup failed"),
            }
        }

        let has_cannabinoid = query.compounds.iter().any(|c| {
            matches!(
                c.to_uppercase().as_str(),
                "CBD" | "THC" | "CBG" | "CBN" | "CBC"
            )
        });
        if has_cannabinoid {
            for terpene in ENRICHMENT_TERPENES {
                match self.fetch_profile(terpene).await {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(err) => warn!(%err, terpene, "terpene lookup failed"),
                }
            }
        }

        Ok(records)
    }
}

fn compound_record(
    cid: u64,
    name: &str,
    properties: &CompoundProperties,
    description: &str,
) -> EvidenceRecord {
    let mut parts = Vec::new();

    if !description.is_empty() {
        let lead: String = description.chars().take(400).collect();
        parts.push(lead);
    }

    if let Some(formula) = &properties.molecular_formula {
        let mut info = format!("Molecular Formula: {}", formula);
        if let Some(weight) = properties.molecular_weight_value() {
            info.push_str(&format!(", Molecular Weight: {:.2} g/mol", weight));
        }
        parts.push(info);
    }

    if let Some(iupac) = &properties.iupac_name {
        if !iupac.eq_ignore_ascii_case(name) {
            parts.push(format!("IUPAC Name: {}", iupac));
        }
    }

    let mut chem_props = Vec::new();
    if let Some(xlogp) = properties.xlogp {
        chem_props.push(format!("XLogP: {}", xlogp));
    }
    if let Some(tpsa) = properties.tpsa {
        chem_props.push(format!("TPSA: {} Å²", tpsa));
    }
    if !chem_props.is_empty() {
        parts.push(format!("Chemical Properties: {}", chem_props.join(", ")));
    }

    let mut bonding = Vec::new();
    if let Some(donors) = properties.h_bond_donor_count {
        bonding.push(format!("{} H-bond donors", donors));
    }
    if let Some(acceptors) = properties.h_bond_acceptor_count {
        bonding.push(format!("{} H-bond acceptors", acceptors));
    }
    if !bonding.is_empty() {
        parts.push(format!("Hydrogen Bonding: {}", bonding.join(", ")));
    }

    let title_name = titlecase(name);

    EvidenceRecord {
        id: format!("pubchem:{}", cid),
        title: format!("Chemical Compound Profile: {}", title_name),
        authors: vec!["PubChem Database, NCBI".to_string()],
        year: Utc::now().year(),
        journal: "PubChem Compound Database".to_string(),
        source_name: SOURCE_NAME.to_string(),
        study_type: StudyType::CompoundProfile,
        abstract_text: parts.join(". "),
        external_ids: ExternalIds {
            doi: None,
            registry_id: Some(cid.to_string()),
            url: Some(format!("https://pubchem.ncbi.nlm.nih.gov/compound/{}", cid)),
        },
        citation_count: 0,
        credibility_score: 0.0,
        relevance_score: 0.0,
    }
    .sanitized()
}

fn titlecase(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CidResponse {
    #[serde(rename = "IdentifierList")]
    identifier_list: IdentifierList,
}

#[derive(Debug, Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID", default)]
    cid: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    property_table: PropertyTable,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<CompoundProperties>,
}

/// PubChem serializes MolecularWeight as a string in recent API versions.
#[derive(Debug, Deserialize, Default)]
struct CompoundProperties {
    #[serde(rename = "MolecularFormula")]
    molecular_formula: Option<String>,
    #[serde(rename = "MolecularWeight")]
    molecular_weight: Option<serde_json::Value>,
    #[serde(rename = "IUPACName")]
    iupac_name: Option<String>,
    #[serde(rename = "XLogP")]
    xlogp: Option<f64>,
    #[serde(rename = "TPSA")]
    tpsa: Option<f64>,
    #[serde(rename = "HBondDonorCount")]
    h_bond_donor_count: Option<u32>,
    #[serde(rename = "HBondAcceptorCount")]
    h_bond_acceptor_count: Option<u32>,
}

impl CompoundProperties {
    fn molecular_weight_value(&self) -> Option<f64> {
        match &self.molecular_weight {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DescriptionResponse {
    #[serde(rename = "InformationList")]
    information_list: InformationList,
}

#[derive(Debug, Deserialize)]
struct InformationList {
    #[serde(rename = "Information", default)]
    information: Vec<Information>,
}

#[derive(Debug, Deserialize)]
struct Information {
    #[serde(rename = "Description")]
    description: Option<String>,
}
