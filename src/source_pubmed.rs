//! Biomedical literature adapter (NCBI E-utilities).
//!
//! Two-step search: ESearch returns matching article ids, EFetch returns the
//! article set as XML. Query construction uses PubMed field tags and filters
//! the results to human, English-language studies of the publication types
//! the credibility scorer understands.

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

const SOURCE_NAME: &str = "pubmed";
const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const EFETCH_BATCH_SIZE: usize = 20;

pub struct PubmedAdapter {
    client: Client,
    gate: Semaphore,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl PubmedAdapter {
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

    async fn esearch(&self, term: &str, retmax: usize) -> Result<Vec<String>, SourceError> {
        let mut request = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&[
                ("db", "pubmed"),
                ("term", term),
                ("retmax", &retmax.to_string()),
                ("retmode", "json"),
            ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                source: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: EsearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
        Ok(body.esearchresult.idlist)
    }

    async fn efetch(&self, ids: &[String]) -> Result<Vec<EvidenceRecord>, SourceError> {
        let mut records = Vec::new();
        for batch in ids.chunks(EFETCH_BATCH_SIZE) {
            let mut request = self
                .client
                .get(format!("{}/efetch.fcgi", self.base_url))
                .query(&[
                    ("db", "pubmed"),
                    ("id", &batch.join(",")),
                    ("rettype", "abstract"),
                    ("retmode", "xml"),
                ]);
            if let Some(key) = &self.api_key {
                request = request.query(&[("api_key", key.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
            if !response.status().is_success() {
                return Err(SourceError::Status {
                    source: SOURCE_NAME.to_string(),
                    status: response.status().as_u16(),
                });
            }

            let xml = response
                .text()
                .await
                .map_err(|e| SourceError::from_http(SOURCE_NAME, self.timeout_secs, e))?;
            records.extend(parse_article_set(&xml)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for PubmedAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn description(&self) -> &'static str {
        "Peer-reviewed biomedical literature from PubMed"
    }

    async fn search(&self, query: &Query) -> Result<Vec<EvidenceRecord>, SourceError> {
        let _permit = acquire_gate(&self.gate, SOURCE_NAME).await?;

        let term = build_search_query(query);
        debug!(%term, "pubmed search");

        let ids = self.esearch(&term, query.max_results.max(1)).await?;
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.efetch(&ids).await
    }
}

/// Build an ESearch term in PubMed field-tag syntax: compound synonym
/// groups, intent terms, remaining free text, then publication-type, date,
/// language, and species filters.
fn build_search_query(query: &Query) -> String {
    let mut clauses = Vec::new();

    let compound_terms: Vec<String> = query
        .compounds
        .iter()
        .map(|compound| match compound.to_uppercase().as_str() {
            "CBD" => "(cannabidiol[Title/Abstract] OR CBD[Title/Abstract])".to_string(),
            "CBN" => "(cannabinol[Title/Abstract] OR CBN[Title/Abstract])".to_string(),
            "CBG" => "(cannabigerol[Title/Abstract] OR CBG[Title/Abstract])".to_string(),
            "CBC" => "(cannabichromene[Title/Abstract] OR CBC[Title/Abstract])".to_string(),
            other => format!("{}[Title/Abstract]", other),
        })
        .collect();
    if !compound_terms.is_empty() {
        clauses.push(format!("({})", compound_terms.join(" OR ")));
    }

    let intent_terms = match query.intent.as_str() {
        "sleep" => {
            "sleep[Title/Abstract] OR insomnia[Title/Abstract] OR \
             \"sleep quality\"[Title/Abstract] OR \"sleep disorders\"[Title/Abstract]"
        }
        "anxiety" => {
            "anxiety[Title/Abstract] OR \"anxiety disorder\"[Title/Abstract] OR \
             anxiolytic[Title/Abstract] OR stress[Title/Abstract]"
        }
        "pain" => {
            "pain[Title/Abstract] OR \"chronic pain\"[Title/Abstract] OR \
             analgesic[Title/Abstract] OR inflammation[Title/Abstract]"
        }
        "epilepsy" => {
            "epilepsy[Title/Abstract] OR seizure[Title/Abstract] OR \
             anticonvulsant[Title/Abstract]"
        }
        "dosage" => {
            "dose[Title/Abstract] OR dosage[Title/Abstract] OR \
             \"dose response\"[Title/Abstract]"
        }
        "safety" => {
            "safety[Title/Abstract] OR \"adverse effects\"[Title/Abstract] OR \
             toxicity[Title/Abstract]"
        }
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
            clauses.push(format!("({}[Title/Abstract])", clean.trim()));
        }
    }

    let mut term = clauses.join(" AND ");
    term.push_str(
        " AND (Clinical Trial[Publication Type] OR \
         Randomized Controlled Trial[Publication Type] OR \
         Review[Publication Type] OR Meta-Analysis[Publication Type] OR \
         Systematic Review[Publication Type] OR Case Reports[Publication Type])",
    );
    term.push_str(&format!(" AND {}:3000[Publication Date]", query.min_year));
    term.push_str(" AND English[Language]");
    term.push_str(" AND humans[MeSH Terms]");
    term
}

fn parse_article_set(xml: &str) -> Result<Vec<EvidenceRecord>, SourceError> {
    let set: PubmedArticleSet = quick_xml::de::from_str(xml)
        .map_err(|e| SourceError::malformed(SOURCE_NAME, e.to_string()))?;

    Ok(set
        .articles
        .into_iter()
        .filter_map(normalize_article)
        .collect())
}

fn normalize_article(article: PubmedArticle) -> Option<EvidenceRecord> {
    let pmid = article.citation.pmid.value?;
    let detail = article.citation.article;

    let title = detail.title.and_then(|t| t.value).unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let authors = detail
        .author_list
        .map(|list| {
            list.authors
                .into_iter()
                .filter_map(|a| match (a.last_name, a.fore_name) {
                    (Some(last), Some(fore)) => Some(format!("{}, {}", last, fore)),
                    (Some(last), None) => Some(last),
                    _ => a.collective_name,
                })
                .collect()
        })
        .unwrap_or_default();

    let journal = detail
        .journal
        .as_ref()
        .and_then(|j| j.title.as_ref())
        .and_then(|t| t.value.clone())
        .unwrap_or_default();

    let year = detail
        .journal
        .as_ref()
        .and_then(|j| j.issue.as_ref())
        .and_then(|i| i.pub_date.as_ref())
        .and_then(|d| d.year.as_ref())
        .and_then(|y| y.value.as_ref())
        .and_then(|y| y.parse().ok())
        .unwrap_or_else(|| Utc::now().year());

    // Structured abstracts keep their section labels.
    let abstract_text = detail
        .abstract_block
        .map(|block| {
            block
                .sections
                .into_iter()
                .filter_map(|s| {
                    let text = s.text?;
                    Some(match s.label {
                        Some(label) => format!("{}: {}", label, text),
                        None => text,
                    })
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let pub_types: Vec<String> = detail
        .publication_types
        .map(|list| {
            list.types
                .into_iter()
                .filter_map(|t| t.value)
                .map(|t| t.to_lowercase())
                .collect()
        })
        .unwrap_or_default();

    let doi = article
        .data
        .and_then(|d| d.ids)
        .and_then(|ids| {
            ids.ids
                .into_iter()
                .find(|id| id.id_type == "doi")
                .and_then(|id| id.value)
        })
        .filter(|d| !d.is_empty());

    Some(
        EvidenceRecord {
            id: format!("pubmed:{}", pmid),
            title,
            authors,
            year,
            journal,
            source_name: SOURCE_NAME.to_string(),
            study_type: categorize_study_type(&pub_types),
            abstract_text,
            external_ids: ExternalIds {
                doi,
                registry_id: Some(pmid.clone()),
                url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)),
            },
            citation_count: 0,
            credibility_score: 0.0,
            relevance_score: 0.0,
        }
        .sanitized(),
    )
}

fn categorize_study_type(pub_types: &[String]) -> StudyType {
    let has = |needle: &str| pub_types.iter().any(|t| t.contains(needle));

    if has("randomized controlled trial") {
        StudyType::RandomizedControlledTrial
    } else if has("clinical trial") {
        StudyType::ClinicalTrial
    } else if has("meta-analysis") {
        StudyType::MetaAnalysis
    } else if has("systematic review") {
        StudyType::SystematicReview
    } else if has("review") {
        StudyType::Review
    } else if has("case report") {
        StudyType::CaseReport
    } else {
        StudyType::ResearchArticle
    }
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// Text content of an element that may also carry attributes.
#[derive(Debug, Deserialize)]
struct TextValue {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
struct PubmedArticle {
    #[serde(rename = "MedlineCitation")]
    citation: MedlineCitation,
    #[serde(rename = "PubmedData")]
    data: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
struct MedlineCitation {
    #[serde(rename = "PMID")]
    pmid: TextValue,
    #[serde(rename = "Article")]
    article: ArticleDetail,
}

#[derive(Debug, Deserialize)]
struct ArticleDetail {
    #[serde(rename = "Journal")]
    journal: Option<Journal>,
    #[serde(rename = "ArticleTitle")]
    title: Option<TextValue>,
    #[serde(rename = "Abstract")]
    abstract_block: Option<AbstractBlock>,
    #[serde(rename = "AuthorList")]
    author_list: Option<AuthorList>,
    #[serde(rename = "PublicationTypeList")]
    publication_types: Option<PublicationTypeList>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    #[serde(rename = "Title")]
    title: Option<TextValue>,
    #[serde(rename = "JournalIssue")]
    issue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
struct JournalIssue {
    #[serde(rename = "PubDate")]
    pub_date: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
struct PubDate {
    #[serde(rename = "Year")]
    year: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct AbstractBlock {
    #[serde(rename = "AbstractText", default)]
    sections: Vec<AbstractSection>,
}

#[derive(Debug, Deserialize)]
struct AbstractSection {
    #[serde(rename = "@Label")]
    label: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(rename = "LastName")]
    last_name: Option<String>,
    #[serde(rename = "ForeName")]
    fore_name: Option<String>,
    #[serde(rename = "CollectiveName")]
    collective_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicationTypeList {
    #[serde(rename = "PublicationType", default)]
    types: Vec<TextValue>,
}

#[derive(Debug, Deserialize)]
struct PubmedData {
    #[serde(rename = "ArticleIdList")]
    ids: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType")]
    id_type: String,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Intent;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE">
      <PMID Version="1">34567890</PMID>
      <Article PubModel="Print">
        <Journal>
          <Title>Sleep Medicine</Title>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2023</Year><Month>Mar</Month></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Cannabinol for chronic insomnia</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Insomnia is common.</AbstractText>
          <AbstractText Label="RESULTS">CBN improved sleep latency.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Smith</LastName><ForeName>Jane</ForeName></Author>
          <Author ValidYN="Y"><LastName>Jones</LastName></Author>
        </AuthorList>
        <PublicationTypeList>
          <PublicationType UI="D016449">Randomized Controlled Trial</PublicationType>
        </PublicationTypeList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">34567890</ArticleId>
        <ArticleId IdType="doi">10.1016/j.sleep.2023.01.001</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_article_set() {
        let records = parse_article_set(FIXTURE).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.id, "pubmed:34567890");
        assert_eq!(r.title, "Cannabinol for chronic insomnia");
        assert_eq!(r.year, 2023);
        assert_eq!(r.journal, "Sleep Medicine");
        assert_eq!(r.study_type, StudyType::RandomizedControlledTrial);
        assert_eq!(r.authors, vec!["Smith, Jane".to_string(), "Jones".to_string()]);
        assert_eq!(
            r.abstract_text,
            "BACKGROUND: Insomnia is common. RESULTS: CBN improved sleep latency."
        );
        assert_eq!(
            r.external_ids.doi.as_deref(),
            Some("10.1016/j.sleep.2023.01.001")
        );
        assert_eq!(
            r.external_ids.resolve_url().unwrap(),
            "https://doi.org/10.1016/j.sleep.2023.01.001"
        );
    }

    #[test]
    fn malformed_xml_is_reported() {
        let err = parse_article_set("<PubmedArticleSet><oops>").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn search_query_includes_filters() {
        let q = Query::new("trouble staying asleep", Intent::Sleep)
            .with_compounds(["CBN", "CBD"])
            .with_min_year(2018);
        let term = build_search_query(&q);

        assert!(term.contains("cannabinol[Title/Abstract] OR CBN[Title/Abstract]"));
        assert!(term.contains("cannabidiol[Title/Abstract] OR CBD[Title/Abstract]"));
        assert!(term.contains("insomnia[Title/Abstract]"));
        assert!(term.contains("2018:3000[Publication Date]"));
        assert!(term.contains("English[Language]"));
        assert!(term.contains("humans[MeSH Terms]"));
        assert!(term.contains("trouble staying asleep"));
    }

    #[test]
    fn free_text_skipped_when_it_restates_compounds() {
        let q = Query::new("cbd dosing", Intent::Dosage).with_compounds(["CBD"]);
        let term = build_search_query(&q);
        assert!(!term.contains("cbd dosing[Title/Abstract]"));
    }

    #[test]
    fn study_type_mapping() {
        let t = |types: &[&str]| {
            categorize_study_type(&types.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        };
        assert_eq!(t(&["randomized controlled trial"]), StudyType::RandomizedControlledTrial);
        assert_eq!(t(&["clinical trial, phase ii"]), StudyType::ClinicalTrial);
        assert_eq!(t(&["meta-analysis"]), StudyType::MetaAnalysis);
        assert_eq!(t(&["systematic review"]), StudyType::SystematicReview);
        assert_eq!(t(&["review"]), StudyType::Review);
        assert_eq!(t(&["case reports"]), StudyType::CaseReport);
        assert_eq!(t(&["journal article"]), StudyType::ResearchArticle);
    }
}
