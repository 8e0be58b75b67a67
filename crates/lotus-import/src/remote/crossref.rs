//! CrossRef works lookups used to complete reference metadata

use chrono::NaiveDate;
use lotus_common::types::Reference;
use lotus_common::{LotusError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::reconcile::client::{ApiRequest, RemoteApiClient};

pub const DEFAULT_CROSSREF_URL: &str = "https://api.crossref.org";

/// Metadata CrossRef holds about one DOI
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkMetadata {
    pub title: Option<String>,
    pub journal: Option<String>,
    pub published: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct WorkEnvelope {
    message: Work,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(default)]
    title: Vec<String>,
    #[serde(default, rename = "container-title")]
    container_title: Vec<String>,
    #[serde(default)]
    issued: Option<PartialDate>,
}

#[derive(Debug, Deserialize)]
struct PartialDate {
    #[serde(default, rename = "date-parts")]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl PartialDate {
    /// Missing month or day default to 1
    fn to_date(&self) -> Option<NaiveDate> {
        let parts = self.date_parts.first()?;
        let year = (*parts.first()?)?;
        let month = parts.get(1).copied().flatten().unwrap_or(1);
        let day = parts.get(2).copied().flatten().unwrap_or(1);
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    }
}

pub struct CrossrefClient {
    client: Arc<RemoteApiClient>,
    base_url: String,
}

impl CrossrefClient {
    pub fn new(client: Arc<RemoteApiClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Look up `doi`; `None` when CrossRef does not know it
    pub async fn work(&self, doi: &str) -> Result<Option<WorkMetadata>> {
        let url = format!("{}/works/{}", self.base_url, doi);
        let response = match self.client.call(&ApiRequest::get(&url)).await {
            Ok(response) => response,
            Err(LotusError::NotFound(_)) => {
                debug!(doi = %doi, "DOI unknown to CrossRef");
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let envelope: WorkEnvelope = response
            .json()
            .map_err(|e| LotusError::parse(format!("Malformed CrossRef work {}: {}", doi, e)))?;
        let work = envelope.message;
        Ok(Some(WorkMetadata {
            title: first_non_blank(work.title),
            journal: first_non_blank(work.container_title),
            published: work.issued.as_ref().and_then(PartialDate::to_date),
        }))
    }

    /// Fill the title, journal, and publication date `reference` is missing.
    ///
    /// Returns the reference unchanged when CrossRef has nothing to add.
    pub async fn enrich(&self, reference: &Reference) -> Result<Reference> {
        let mut enriched = reference.clone();
        let Some(work) = self.work(&reference.doi).await? else {
            return Ok(enriched);
        };

        if enriched.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
            enriched.title = work.title;
        }
        if enriched.journal.is_none() {
            enriched.journal = work.journal;
        }
        if enriched.publication_date.is_none() {
            enriched.publication_date = work.published;
        }
        Ok(enriched)
    }
}

fn first_non_blank(values: Vec<String>) -> Option<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
