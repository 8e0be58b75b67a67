//! LOTUS Import Library
//!
//! Reconciles natural-product occurrence records (a compound found in an
//! organism, per a reference) against a Wikibase knowledge graph and
//! publishes what is missing, without creating duplicates and without
//! exceeding the remote services' rate limits.
//!
//! # Modules
//!
//! - **reconcile**: identity cache, retries, rate limiting, batch resolution
//! - **remote**: SPARQL store, Wikibase publisher, CrossRef lookups
//! - **ingest**: TSV records into deduplicated entities and quads
//! - **publish**: the reconcile-then-publish pipeline and its run summary
//! - **export**: the four TSV export streams
//! - **config**: environment-driven configuration
//!
//! # Example
//!
//! ```no_run
//! use lotus_import::config::ApiConfig;
//! use lotus_import::ingest::{DatasetBuilder, TsvRecordSource};
//! use lotus_import::publish::{DryRunPublisher, PublishPipeline};
//! use lotus_import::reconcile::{BatchResolver, HttpTransport};
//! use lotus_import::remote::sparql::{SparqlQueryStore, WikibaseDialect};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut builder = DatasetBuilder::new();
//!     builder.ingest(&TsvRecordSource::open("lotus.tsv")?, None)?;
//!     let dataset = builder.finish();
//!
//!     let transport = HttpTransport::new("lotus-import/0.1", Duration::from_secs(60))?;
//!     let client = ApiConfig::new(100).client("sparql", Arc::new(transport));
//!     let store = SparqlQueryStore::new(Arc::new(client), "https://query.wikidata.org/sparql");
//!     let resolver = BatchResolver::new(Arc::new(store), Arc::new(WikibaseDialect::default()));
//!     let summary = PublishPipeline::new(resolver, Arc::new(DryRunPublisher::new()))
//!         .run(&dataset)
//!         .await?;
//!     println!("{}", summary.summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod export;
pub mod ingest;
pub mod publish;
pub mod reconcile;
pub mod remote;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
