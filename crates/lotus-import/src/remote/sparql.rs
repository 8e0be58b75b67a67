//! SPARQL endpoint access and the Wikibase lookup dialect

use async_trait::async_trait;
use lotus_common::types::RemoteEntityId;
use lotus_common::{LotusError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{QuerySolution, QueryStore};
use crate::reconcile::client::{ApiRequest, RemoteApiClient};
use crate::reconcile::resolver::LookupDialect;

/// Media type of the SPARQL 1.1 JSON results format
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Default prefix of entity URIs on Wikidata
pub const DEFAULT_ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    #[serde(default)]
    results: Option<SparqlResults>,
    #[serde(default)]
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

/// [`QueryStore`] over a SPARQL endpoint
pub struct SparqlQueryStore {
    client: Arc<RemoteApiClient>,
    endpoint: String,
}

impl SparqlQueryStore {
    pub fn new(client: Arc<RemoteApiClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute(&self, query: &str) -> Result<SparqlResponse> {
        let request = ApiRequest::post(&self.endpoint)
            .header("Accept", SPARQL_RESULTS_JSON)
            .form("query", query);
        let response = self.client.call(&request).await?;
        response
            .json::<SparqlResponse>()
            .map_err(|e| LotusError::parse(format!("Malformed SPARQL results from {}: {}", self.endpoint, e)))
    }
}

#[async_trait]
impl QueryStore for SparqlQueryStore {
    async fn select(&self, query: &str) -> Result<Vec<QuerySolution>> {
        let response = self.execute(query).await?;
        let results = response
            .results
            .ok_or_else(|| LotusError::parse("SELECT response without results"))?;

        let solutions: Vec<QuerySolution> = results
            .bindings
            .into_iter()
            .map(|binding| binding.into_iter().map(|(var, term)| (var, term.value)).collect())
            .collect();
        debug!(endpoint = %self.endpoint, solutions = solutions.len(), "SELECT finished");
        Ok(solutions)
    }

    async fn ask(&self, query: &str) -> Result<bool> {
        self.execute(query)
            .await?
            .boolean
            .ok_or_else(|| LotusError::parse("ASK response without boolean"))
    }
}

/// Escape a string for use inside a double-quoted SPARQL literal
pub fn escape_literal(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Batch lookups against a Wikibase query service (`wdt:` direct claims)
#[derive(Debug, Clone)]
pub struct WikibaseDialect {
    entity_prefix: String,
}

impl WikibaseDialect {
    pub fn new(entity_prefix: impl Into<String>) -> Self {
        Self {
            entity_prefix: entity_prefix.into(),
        }
    }

    /// Turn an entity URI into a bare id (`.../entity/Q42` -> `Q42`)
    pub fn entity_id(&self, uri: &str) -> RemoteEntityId {
        RemoteEntityId::from(uri.strip_prefix(self.entity_prefix.as_str()).unwrap_or(uri))
    }
}

impl Default for WikibaseDialect {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY_PREFIX)
    }
}

impl LookupDialect for WikibaseDialect {
    fn batch_lookup_query(&self, property: &str, values: &[String]) -> String {
        let literals = values
            .iter()
            .map(|v| format!("\"{}\"", escape_literal(v)))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "SELECT ?value ?item WHERE {{ VALUES ?value {{ {} }} ?item wdt:{} ?value . }}",
            literals, property
        )
    }

    fn extract(&self, solution: &QuerySolution) -> Option<(String, RemoteEntityId)> {
        let value = solution.get("value")?;
        let item = solution.get("item")?;
        Some((value.clone(), self.entity_id(item)))
    }
}
