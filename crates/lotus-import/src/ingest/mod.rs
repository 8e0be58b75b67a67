//! Ingestion of raw observation records
//!
//! - **source**: restartable record sources (TSV files)
//! - **builder**: local deduplication into entities and quads

pub mod builder;
pub mod source;

pub use builder::{Dataset, DatasetBuilder, IngestStats};
pub use source::{RawRecord, RawRecordSource, RecordIter, TsvRecordSource};
