//! In-memory remote store for tests
//!
//! [`InMemoryStore`] answers batch lookups from `(property, value, entity)`
//! triples and doubles as the [`Publisher`]: every published document adds
//! its string-valued statements as triples, so a second run over the same
//! input finds what the first one created.

use async_trait::async_trait;
use lotus_common::types::RemoteEntityId;
use lotus_common::{LotusError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::publish::document::{Document, StatementValue};
use crate::publish::Publisher;
use crate::reconcile::resolver::LookupDialect;
use crate::remote::{QuerySolution, QueryStore};

/// Query format understood by [`InMemoryStore`]
#[derive(Debug, Serialize, Deserialize)]
struct Lookup {
    property: String,
    values: Vec<String>,
}

/// [`LookupDialect`] producing queries for [`InMemoryStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryDialect;

impl LookupDialect for InMemoryDialect {
    fn batch_lookup_query(&self, property: &str, values: &[String]) -> String {
        serde_json::json!({ "property": property, "values": values }).to_string()
    }

    fn extract(&self, solution: &QuerySolution) -> Option<(String, RemoteEntityId)> {
        Some((
            solution.get("value")?.clone(),
            RemoteEntityId::new(solution.get("item")?.as_str()),
        ))
    }
}

#[derive(Default)]
struct State {
    triples: Vec<(String, String, RemoteEntityId)>,
    published: Vec<(RemoteEntityId, Document)>,
    properties: Vec<String>,
    connected: bool,
}

pub struct InMemoryStore {
    state: Mutex<State>,
    queries: AtomicUsize,
    /// Queries answered before every further one fails
    query_budget: AtomicUsize,
    /// Publish calls that fail with a network error before one succeeds
    publish_failures: AtomicUsize,
    next_id: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            queries: AtomicUsize::new(0),
            query_budget: AtomicUsize::new(usize::MAX),
            publish_failures: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn dialect(&self) -> Arc<dyn LookupDialect> {
        Arc::new(InMemoryDialect)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach `value` under `property` to `entity`
    pub fn insert(&self, property: &str, value: &str, entity: &str) {
        self.state()
            .triples
            .push((property.to_string(), value.to_string(), RemoteEntityId::from(entity)));
    }

    pub fn queries_issued(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Answer `n` more queries, then fail every further one with a network error
    pub fn fail_queries_after(&self, n: usize) {
        self.query_budget
            .store(self.queries_issued().saturating_add(n), Ordering::SeqCst);
    }

    /// Fail the next `n` publish calls with a network error
    pub fn fail_next_publishes(&self, n: usize) {
        self.publish_failures.store(n, Ordering::SeqCst);
    }

    /// Documents created so far, in publish order
    pub fn published(&self) -> Vec<(RemoteEntityId, Document)> {
        self.state().published.clone()
    }

    pub fn publish_calls(&self) -> usize {
        self.state().published.len()
    }

    pub fn properties(&self) -> Vec<String> {
        self.state().properties.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn count_query(&self) -> Result<()> {
        let issued = self.queries.fetch_add(1, Ordering::SeqCst);
        if issued >= self.query_budget.load(Ordering::SeqCst) {
            return Err(LotusError::network("in-memory store unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryStore for InMemoryStore {
    async fn select(&self, query: &str) -> Result<Vec<QuerySolution>> {
        self.count_query()?;
        let lookup: Lookup = serde_json::from_str(query)?;
        let state = self.state();

        Ok(state
            .triples
            .iter()
            .filter(|(property, value, _)| *property == lookup.property && lookup.values.contains(value))
            .map(|(_, value, entity)| {
                [
                    ("value".to_string(), value.clone()),
                    ("item".to_string(), entity.as_str().to_string()),
                ]
                .into_iter()
                .collect()
            })
            .collect())
    }

    async fn ask(&self, query: &str) -> Result<bool> {
        Ok(!self.select(query).await?.is_empty())
    }
}

#[async_trait]
impl Publisher for InMemoryStore {
    async fn connect(&self) -> Result<()> {
        self.state().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state().connected = false;
        Ok(())
    }

    async fn new_property(&self, name: &str, _description: &str) -> Result<String> {
        let mut state = self.state();
        state.properties.push(name.to_string());
        Ok(format!("P{}", 90_000 + state.properties.len()))
    }

    async fn publish(&self, document: &Document, _summary: &str) -> Result<RemoteEntityId> {
        let pending = self.publish_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.publish_failures.store(pending - 1, Ordering::SeqCst);
            return Err(LotusError::network("in-memory publish failed"));
        }

        let id = RemoteEntityId::new(format!("Q{}", 100_000 + self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        let mut state = self.state();
        for statement in &document.statements {
            if let StatementValue::String(value) | StatementValue::ExternalId(value) = &statement.value {
                state
                    .triples
                    .push((statement.property.clone(), value.clone(), id.clone()));
            }
        }
        state.published.push((id.clone(), document.clone()));
        Ok(id)
    }
}
