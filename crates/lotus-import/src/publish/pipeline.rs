//! Reconcile-then-publish orchestration
//!
//! Each entity kind is handled as one batch sharing one natural-key
//! property. Per candidate:
//!
//! ```text
//! Unresolved -> Resolving -> MatchedExisting -> Published (reused)
//!                         -> Ambiguous       -> reported, nothing created
//!                         -> NeedsCreate     -> Published (created)
//! ```
//!
//! Kinds run in dependency order (references, organisms, compounds) since
//! compound documents point at the remote ids of their organisms and
//! references.

use chrono::{NaiveDate, Utc};
use futures::future;
use lotus_common::types::{EntityKind, Indexed, Keyed, NaturalKey, Quad, Reference, RemoteEntityId, SurrogateId};
use lotus_common::{ErrorKind, LotusError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::document::Document;
use super::report::ImportSummary;
use super::Publisher;
use crate::ingest::Dataset;
use crate::reconcile::resolver::{BatchLookupResult, BatchResolver, ChunkProgress, KeyProperty, MatchStatus};
use crate::reconcile::retry::RetryPolicy;
use crate::remote::crossref::CrossrefClient;

/// Default edit summary attached to created items
pub const DEFAULT_EDIT_SUMMARY: &str = "LOTUS import";

/// Called once per resolved chunk
pub type ProgressHook = Box<dyn Fn(EntityKind, &ChunkProgress) + Send + Sync>;

/// Remote ids of local entities, by surrogate id
pub type RemoteIds = HashMap<SurrogateId, RemoteEntityId>;

#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Applied to every publish call
    pub retry: RetryPolicy,
    pub edit_summary: String,
    /// Date recorded as `retrieved` in provenance
    pub retrieved: NaiveDate,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default().recovering([ErrorKind::Network, ErrorKind::RateLimitExceeded]),
            edit_summary: DEFAULT_EDIT_SUMMARY.to_string(),
            retrieved: Utc::now().date_naive(),
        }
    }
}

/// What the remote store says about one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    MatchedExisting(RemoteEntityId),
    Ambiguous(Vec<RemoteEntityId>),
    NeedsCreate,
}

impl Resolution {
    pub fn of(lookup: &BatchLookupResult, key: &NaturalKey) -> Self {
        match lookup.status(key) {
            MatchStatus::Unmatched => Self::NeedsCreate,
            MatchStatus::Unique(id) => Self::MatchedExisting(id.clone()),
            MatchStatus::Ambiguous(ids) => Self::Ambiguous(ids.to_vec()),
        }
    }
}

enum Outcome {
    Reused(RemoteEntityId),
    Created(RemoteEntityId),
}

pub struct PublishPipeline {
    resolver: BatchResolver,
    publisher: Arc<dyn Publisher>,
    crossref: Option<CrossrefClient>,
    config: PublishConfig,
    progress: Option<ProgressHook>,
}

impl PublishPipeline {
    pub fn new(resolver: BatchResolver, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            resolver,
            publisher,
            crossref: None,
            config: PublishConfig::default(),
            progress: None,
        }
    }

    pub fn with_config(mut self, config: PublishConfig) -> Self {
        self.config = config;
        self
    }

    /// Complete references lacking a title or publication date before
    /// they are validated
    pub fn with_crossref(mut self, crossref: CrossrefClient) -> Self {
        self.crossref = Some(crossref);
        self
    }

    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Publish `dataset`.
    ///
    /// Validation failures and ambiguous matches are recorded in the summary
    /// and the run continues. Any other failure ends the run.
    pub async fn run(&self, dataset: &Dataset) -> Result<ImportSummary> {
        info!(
            references = dataset.references.len(),
            organisms = dataset.organisms.len(),
            compounds = dataset.compounds.len(),
            quads = dataset.quads.len(),
            "Starting publish run"
        );

        self.publisher.connect().await?;
        let outcome = self.publish_all(dataset).await;
        let disconnected = self.publisher.disconnect().await;

        let summary = outcome?;
        disconnected?;

        let totals = summary.totals();
        info!(
            processed = totals.processed,
            validated = totals.validated,
            inserted = totals.inserted,
            reused = totals.reused,
            ambiguous = totals.ambiguous,
            failed = totals.failed,
            "Publish run finished"
        );
        Ok(summary)
    }

    async fn publish_all(&self, dataset: &Dataset) -> Result<ImportSummary> {
        let mut summary = ImportSummary::new();

        let references = self
            .publish_batch(&KeyProperty::doi(), &dataset.references, &mut summary, |reference| async move {
                let reference = self.complete_reference(&reference).await?;
                Document::for_reference(&reference)
            })
            .await?;

        let organisms = self
            .publish_batch(&KeyProperty::taxon_name(), &dataset.organisms, &mut summary, |organism| {
                future::ready(Document::for_organism(&organism))
            })
            .await?;

        let quads = dataset.quads_by_compound();
        let retrieved = self.config.retrieved;
        self.publish_batch(&KeyProperty::inchikey(), &dataset.compounds, &mut summary, |compound| {
            let occurrences = compound
                .id
                .and_then(|id| quads.get(&id))
                .map(|quads| occurrences(quads, &organisms, &references))
                .unwrap_or_default();
            future::ready(Document::for_compound(&compound, &occurrences, retrieved))
        })
        .await?;

        Ok(summary)
    }

    /// Resolve all `candidates` under `property`, reuse unique matches and
    /// create documents for the unmatched ones with `build`.
    async fn publish_batch<E, F, Fut>(
        &self,
        property: &KeyProperty,
        candidates: &[Arc<E>],
        summary: &mut ImportSummary,
        build: F,
    ) -> Result<RemoteIds>
    where
        E: Keyed + Indexed,
        F: Fn(Arc<E>) -> Fut,
        Fut: Future<Output = Result<Document>>,
    {
        let mut ids = RemoteIds::new();
        let Some(kind) = candidates.first().map(|c| c.kind()) else {
            return Ok(ids);
        };

        let keys: Vec<NaturalKey> = candidates.iter().map(|c| c.natural_key()).collect();
        let lookup = self
            .resolver
            .resolve_by_property(property, &keys, self.resolver.config().chunk_size, |progress| {
                if let Some(hook) = &self.progress {
                    hook(kind, progress);
                }
            })
            .await?;

        for (candidate, key) in candidates.iter().zip(keys) {
            summary.kind_mut(kind).processed += 1;

            let outcome = match Resolution::of(&lookup, &key) {
                Resolution::MatchedExisting(id) => {
                    debug!(kind = %kind, key = %key, id = %id, "Reusing existing item");
                    Ok(Outcome::Reused(id))
                },
                Resolution::Ambiguous(found) => Err(LotusError::AmbiguousMatch {
                    key: key.to_string(),
                    candidates: found.iter().map(|id| id.to_string()).collect(),
                }),
                Resolution::NeedsCreate => match build(Arc::clone(candidate)).await {
                    Ok(document) => {
                        summary.kind_mut(kind).validated += 1;
                        self.create(kind, &key, &document).await.map(Outcome::Created)
                    },
                    Err(e) => Err(e),
                },
            };

            let id = match outcome {
                Ok(Outcome::Reused(id)) => {
                    summary.kind_mut(kind).reused += 1;
                    id
                },
                Ok(Outcome::Created(id)) => {
                    summary.kind_mut(kind).inserted += 1;
                    id
                },
                Err(e) if e.is_record_level() => {
                    if e.kind() == ErrorKind::AmbiguousMatch {
                        summary.kind_mut(kind).ambiguous += 1;
                    }
                    warn!(kind = %kind, key = %key, error = %e, "Candidate not published");
                    summary.record_failure(kind, key, &e);
                    continue;
                },
                Err(e) => return Err(e),
            };

            if let Some(local) = candidate.surrogate_id() {
                ids.insert(local, id);
            }
        }

        let counts = summary.kind(kind);
        info!(
            kind = %kind,
            processed = counts.processed,
            inserted = counts.inserted,
            reused = counts.reused,
            ambiguous = counts.ambiguous,
            failed = counts.failed,
            "Batch published"
        );
        Ok(ids)
    }

    async fn create(&self, kind: EntityKind, key: &NaturalKey, document: &Document) -> Result<RemoteEntityId> {
        let label = format!("publish {} {}", kind, key);
        let id = self
            .config
            .retry
            .run(&label, || self.publisher.publish(document, &self.config.edit_summary))
            .await?;
        info!(kind = %kind, key = %key, id = %id, "Created item");
        Ok(id)
    }

    /// Fill in missing reference metadata from CrossRef.
    ///
    /// A rejected lookup leaves the reference as it is; validation decides
    /// what happens next.
    async fn complete_reference(&self, reference: &Reference) -> Result<Reference> {
        let Some(crossref) = &self.crossref else {
            return Ok(reference.clone());
        };
        if reference.is_complete() {
            return Ok(reference.clone());
        }

        match crossref.enrich(reference).await {
            Ok(enriched) => Ok(enriched),
            Err(e) if e.kind() == ErrorKind::Remote => {
                warn!(doi = %reference.doi, error = %e, "CrossRef rejected lookup");
                Ok(reference.clone())
            },
            Err(e) => Err(e),
        }
    }
}

/// Distinct (organism, reference) remote id pairs of one compound's quads
fn occurrences(quads: &[Quad], organisms: &RemoteIds, references: &RemoteIds) -> Vec<(RemoteEntityId, RemoteEntityId)> {
    let mut found = Vec::new();
    for quad in quads {
        let (Some(organism), Some(reference)) = (organisms.get(&quad.organism), references.get(&quad.reference))
        else {
            continue;
        };
        let pair = (organism.clone(), reference.clone());
        if !found.contains(&pair) {
            found.push(pair);
        }
    }
    found
}
