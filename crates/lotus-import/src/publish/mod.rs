//! Publish pipeline
//!
//! - **document**: items, statements and provenance handed to the publisher
//! - **pipeline**: resolve, decide reuse or creation, publish
//! - **report**: per-kind run summary and the failure list

pub mod document;
pub mod pipeline;
pub mod report;

use async_trait::async_trait;
use lotus_common::types::RemoteEntityId;
use lotus_common::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub use document::{Document, Provenance, Statement, StatementValue};
pub use pipeline::{PublishConfig, PublishPipeline};
pub use report::{FailureRecord, ImportSummary, KindSummary};

/// Write access to the remote store.
///
/// `publish` always creates a new item. Deciding that no match exists is the
/// pipeline's job, and so is retrying a failed `publish`.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Create a property and return its id
    async fn new_property(&self, name: &str, description: &str) -> Result<String>;

    async fn publish(&self, document: &Document, summary: &str) -> Result<RemoteEntityId>;
}

/// Logs documents instead of sending them and hands out `L1`, `L2`, ...
/// for items and `P1`, `P2`, ... for properties
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    items: AtomicU64,
    properties: AtomicU64,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents "published" so far
    pub fn published(&self) -> u64 {
        self.items.load(Ordering::SeqCst)
    }

    fn next_id(prefix: char, counter: &AtomicU64) -> String {
        format!("{}{}", prefix, counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn connect(&self) -> Result<()> {
        info!("Dry run: nothing will be written");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn new_property(&self, name: &str, _description: &str) -> Result<String> {
        let id = Self::next_id('P', &self.properties);
        info!(property = %id, name = %name, "Dry run: would create property");
        Ok(id)
    }

    async fn publish(&self, document: &Document, summary: &str) -> Result<RemoteEntityId> {
        let id = Self::next_id('L', &self.items);
        info!(
            id = %id,
            label = %document.label,
            statements = document.statements.len(),
            summary = %summary,
            "Dry run: would create item"
        );
        Ok(RemoteEntityId::new(id))
    }
}
