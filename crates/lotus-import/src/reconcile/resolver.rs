//! Chunked batch lookup of natural keys against the remote store
//!
//! Instead of asking the remote store about one key at a time, the resolver
//! sends one query per chunk of keys: "which entities carry one of these
//! values under this property?". A key may come back with several remote
//! entities when the store already holds duplicates; all of them are kept.

use futures::stream::{self, StreamExt};
use lotus_common::types::{NaturalKey, RemoteEntityId};
use lotus_common::{LotusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::normalize::KeyNormalization;
use crate::remote::{QuerySolution, QueryStore};

/// Default number of keys per batch query
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default upper bound on the summed byte length of the values of one chunk
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Default number of chunk queries in flight
pub const DEFAULT_RESOLVER_CONCURRENCY: usize = 1;

/// Builds batch lookup queries in the remote store's query language
pub trait LookupDialect: Send + Sync {
    /// A query returning one solution per (value, entity) pair for `values`
    /// under `property`
    fn batch_lookup_query(&self, property: &str, values: &[String]) -> String;

    /// Pull the matched value and entity id out of one solution
    fn extract(&self, solution: &QuerySolution) -> Option<(String, RemoteEntityId)>;
}

/// A natural-key property of the remote store and how its values compare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProperty {
    pub property: String,
    pub normalization: KeyNormalization,
}

impl KeyProperty {
    pub fn new(property: impl Into<String>, normalization: KeyNormalization) -> Self {
        Self {
            property: property.into(),
            normalization,
        }
    }

    /// DOI (P356)
    pub fn doi() -> Self {
        Self::new("P356", KeyNormalization::Doi)
    }

    /// Taxon name (P225)
    pub fn taxon_name() -> Self {
        Self::new("P225", KeyNormalization::TaxonName)
    }

    /// InChIKey (P235)
    pub fn inchikey() -> Self {
        Self::new("P235", KeyNormalization::InChIKey)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub chunk_size: usize,
    pub max_chunk_bytes: usize,
    pub concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            concurrency: DEFAULT_RESOLVER_CONCURRENCY,
        }
    }
}

/// Progress report handed to the per-chunk callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Chunks finished so far, this one included
    pub completed: usize,
    pub total: usize,
    /// Values queried in this chunk
    pub values: usize,
    /// (value, entity) pairs returned for this chunk
    pub matches: usize,
}

/// What the remote store says about one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus<'a> {
    /// Eligible for creation
    Unmatched,
    Unique(&'a RemoteEntityId),
    /// Pre-existing duplicates in the remote store
    Ambiguous(&'a [RemoteEntityId]),
}

/// Natural key -> remote entities carrying it.
///
/// Keys without any match are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchLookupResult {
    matches: HashMap<NaturalKey, Vec<RemoteEntityId>>,
}

impl BatchLookupResult {
    pub fn get(&self, key: &NaturalKey) -> Option<&[RemoteEntityId]> {
        self.matches.get(key).map(Vec::as_slice)
    }

    pub fn status(&self, key: &NaturalKey) -> MatchStatus<'_> {
        match self.matches.get(key).map(Vec::as_slice) {
            None | Some([]) => MatchStatus::Unmatched,
            Some([single]) => MatchStatus::Unique(single),
            Some(many) => MatchStatus::Ambiguous(many),
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaturalKey, &[RemoteEntityId])> {
        self.matches.iter().map(|(k, v)| (k, v.as_slice()))
    }

    fn insert(&mut self, key: NaturalKey, entity: RemoteEntityId) {
        let entities = self.matches.entry(key).or_default();
        if !entities.contains(&entity) {
            entities.push(entity);
        }
    }
}

impl From<HashMap<NaturalKey, Vec<RemoteEntityId>>> for BatchLookupResult {
    fn from(matches: HashMap<NaturalKey, Vec<RemoteEntityId>>) -> Self {
        Self { matches }
    }
}

/// Resolves natural keys to existing remote entities, one query per chunk
pub struct BatchResolver {
    store: Arc<dyn QueryStore>,
    dialect: Arc<dyn LookupDialect>,
    config: ResolverConfig,
}

impl BatchResolver {
    pub fn new(store: Arc<dyn QueryStore>, dialect: Arc<dyn LookupDialect>) -> Self {
        Self {
            store,
            dialect,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Look up `keys` under `property`, `chunk_size` values per query.
    ///
    /// `on_chunk_done` runs once per finished chunk. The first failing chunk
    /// aborts the whole call with `ResolutionFailed`; chunks still in flight
    /// are dropped and no partial result is returned.
    pub async fn resolve_by_property<F>(
        &self,
        property: &KeyProperty,
        keys: &[NaturalKey],
        chunk_size: usize,
        mut on_chunk_done: F,
    ) -> Result<BatchLookupResult>
    where
        F: FnMut(&ChunkProgress),
    {
        let mut result = BatchLookupResult::default();
        let (values, owners) = normalize_keys(keys, property.normalization);
        if values.is_empty() {
            return Ok(result);
        }

        let chunks = partition(&values, chunk_size, self.config.max_chunk_bytes);
        let total = chunks.len();
        info!(
            property = %property.property,
            keys = keys.len(),
            values = values.len(),
            chunks = total,
            "Resolving natural keys"
        );

        let store = &self.store;
        let dialect = &self.dialect;
        let mut in_flight = stream::iter(chunks)
            .map(|chunk| async move {
                let query = dialect.batch_lookup_query(&property.property, chunk);
                store.select(&query).await.map(|solutions| (chunk.len(), solutions))
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut completed = 0;
        while let Some(outcome) = in_flight.next().await {
            let (chunk_values, solutions) =
                outcome.map_err(|err| LotusError::resolution_failed(&property.property, err))?;

            let mut matches = 0;
            for (value, entity) in solutions.iter().filter_map(|s| dialect.extract(s)) {
                let normalized = property.normalization.apply(&value);
                let Some(originals) = owners.get(&normalized) else {
                    debug!(property = %property.property, value = %value, "Ignoring unrequested value");
                    continue;
                };
                for key in originals {
                    result.insert(key.clone(), entity.clone());
                }
                matches += 1;
            }

            completed += 1;
            let progress = ChunkProgress {
                completed,
                total,
                values: chunk_values,
                matches,
            };
            debug!(
                property = %property.property,
                chunk = completed,
                total = total,
                matches = matches,
                "Chunk resolved"
            );
            on_chunk_done(&progress);
        }

        info!(
            property = %property.property,
            matched = result.len(),
            unmatched = keys.len().saturating_sub(result.len()),
            "Resolution finished"
        );
        Ok(result)
    }
}

/// Distinct normalized values in input order, and the original keys behind each
fn normalize_keys(
    keys: &[NaturalKey],
    normalization: KeyNormalization,
) -> (Vec<String>, HashMap<String, Vec<NaturalKey>>) {
    let mut values = Vec::new();
    let mut owners: HashMap<String, Vec<NaturalKey>> = HashMap::new();

    for key in keys {
        let normalized = normalization.apply(key.as_str());
        if normalized.trim().is_empty() {
            continue;
        }
        let entry = owners.entry(normalized.clone()).or_default();
        if entry.is_empty() {
            values.push(normalized);
        }
        if !entry.contains(key) {
            entry.push(key.clone());
        }
    }

    (values, owners)
}

/// Consecutive chunks of at most `chunk_size` values and `max_bytes` bytes.
/// A single oversized value still gets a chunk of its own.
fn partition(values: &[String], chunk_size: usize, max_bytes: usize) -> Vec<&[String]> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut bytes = 0;

    for (index, value) in values.iter().enumerate() {
        let count = index - start;
        let full = count >= chunk_size || (count > 0 && bytes + value.len() > max_bytes);
        if full {
            chunks.push(&values[start..index]);
            start = index;
            bytes = 0;
        }
        bytes += value.len();
    }
    if start < values.len() {
        chunks.push(&values[start..]);
    }

    chunks
}
