//! Local deduplication of raw records into entities and quads

use lotus_common::types::{Compound, Database, Organism, Quad, Reference, SurrogateId};
use lotus_common::types::{Indexed, NaturalKey};
use lotus_common::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::source::{RawRecord, RawRecordSource};
use crate::reconcile::cache::IdentityCache;
use crate::reconcile::normalize::KeyNormalization;

/// Entities and quads of one import run
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub databases: Vec<Arc<Database>>,
    pub organisms: Vec<Arc<Organism>>,
    pub compounds: Vec<Arc<Compound>>,
    pub references: Vec<Arc<Reference>>,
    pub quads: Vec<Quad>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Quads grouped by compound surrogate id
    pub fn quads_by_compound(&self) -> HashMap<SurrogateId, Vec<Quad>> {
        let mut grouped: HashMap<SurrogateId, Vec<Quad>> = HashMap::new();
        for quad in &self.quads {
            grouped.entry(quad.compound).or_default().push(*quad);
        }
        grouped
    }
}

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Rows read, malformed ones included
    pub records: usize,
    /// Rows missing an organism, InChIKey or DOI
    pub skipped: usize,
    /// Rows that could not be parsed
    pub malformed: usize,
    /// Rows repeating an already seen quad
    pub duplicates: usize,
}

/// Turns raw records into deduplicated entities.
///
/// Natural keys are normalized on the way in, so `10.1/abc` and
/// `https://doi.org/10.1/ABC` become one reference.
pub struct DatasetBuilder {
    databases: IdentityCache<String, Database>,
    organisms: IdentityCache<NaturalKey, Organism>,
    compounds: IdentityCache<NaturalKey, Compound>,
    references: IdentityCache<NaturalKey, Reference>,
    quads: Vec<Quad>,
    seen: HashSet<Quad>,
    stats: IngestStats,
}

const UNKNOWN_DATABASE: &str = "unknown";

impl DatasetBuilder {
    pub fn new() -> Self {
        Self {
            databases: IdentityCache::new(),
            organisms: IdentityCache::new(),
            compounds: IdentityCache::new(),
            references: IdentityCache::new(),
            quads: Vec::new(),
            seen: HashSet::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Read up to `limit` records from `source`.
    ///
    /// Malformed rows and rows without mandatory keys are counted and
    /// skipped; only failing to open the source is an error.
    pub fn ingest(&mut self, source: &dyn RawRecordSource, limit: Option<usize>) -> Result<IngestStats> {
        let records = source.records()?;
        let records: Box<dyn Iterator<Item = Result<RawRecord>> + Send + '_> = match limit {
            Some(limit) => Box::new(records.take(limit)),
            None => records,
        };

        for row in records {
            self.stats.records += 1;
            match row {
                Ok(record) => {
                    self.add_record(&record);
                },
                Err(e) => {
                    warn!(error = %e, "Skipping malformed record");
                    self.stats.malformed += 1;
                },
            }
        }

        info!(
            records = self.stats.records,
            quads = self.quads.len(),
            organisms = self.organisms.len(),
            compounds = self.compounds.len(),
            references = self.references.len(),
            skipped = self.stats.skipped,
            malformed = self.stats.malformed,
            "Ingestion finished"
        );
        Ok(self.stats)
    }

    /// Add one record; returns its quad unless the row lacks a mandatory key
    pub fn add_record(&mut self, record: &RawRecord) -> Option<Quad> {
        let organism = normalized(record.organism.as_deref(), KeyNormalization::TaxonName);
        let inchikey = normalized(record.inchikey.as_deref(), KeyNormalization::InChIKey);
        let doi = normalized(record.doi.as_deref(), KeyNormalization::Doi);

        let (Some(organism), Some(inchikey), Some(doi)) = (organism, inchikey, doi) else {
            warn!(
                organism = ?record.organism,
                inchikey = ?record.inchikey,
                doi = ?record.doi,
                "Skipping record without organism, InChIKey or DOI"
            );
            self.stats.skipped += 1;
            return None;
        };

        let database_name = record
            .database
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DATABASE)
            .to_string();
        let database = self
            .databases
            .get_or_new(database_name.clone(), || Database::new(database_name));

        let organism = self
            .organisms
            .get_or_new(NaturalKey::new(organism.as_str()), || Organism::new(organism));

        let compound = self.compounds.get_or_new(NaturalKey::new(inchikey.as_str()), || {
            let mut compound = Compound::new(inchikey);
            compound.smiles = non_blank(record.smiles.as_deref());
            compound.inchi = non_blank(record.inchi.as_deref());
            compound
        });

        let reference = self.references.get_or_new(NaturalKey::new(doi.as_str()), || {
            let mut reference = Reference::new(doi);
            reference.title = non_blank(record.title.as_deref());
            reference.pmid = non_blank(record.pmid.as_deref());
            reference.publication_date = record.publication_date();
            reference
        });

        let quad = Quad {
            database: database.surrogate_id()?,
            organism: organism.surrogate_id()?,
            compound: compound.surrogate_id()?,
            reference: reference.surrogate_id()?,
        };

        if self.seen.insert(quad) {
            self.quads.push(quad);
        } else {
            debug!(?quad, "Duplicate quad");
            self.stats.duplicates += 1;
        }
        Some(quad)
    }

    pub fn finish(self) -> Dataset {
        Dataset {
            databases: self.databases.entities(),
            organisms: self.organisms.entities(),
            compounds: self.compounds.entities(),
            references: self.references.entities(),
            quads: self.quads,
        }
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn normalized(value: Option<&str>, normalization: KeyNormalization) -> Option<String> {
    non_blank(value).map(|v| normalization.apply(&v)).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(organism: &str, inchikey: &str, doi: &str) -> RawRecord {
        RawRecord {
            database: Some("knapsack".to_string()),
            organism: Some(organism.to_string()),
            inchikey: Some(inchikey.to_string()),
            doi: Some(doi.to_string()),
            ..RawRecord::default()
        }
    }

    #[test]
    fn test_entities_are_deduplicated() {
        let records = vec![
            record("Ginkgo biloba", "AAAA", "10.1/a"),
            record("Ginkgo  biloba", "aaaa", "https://doi.org/10.1/A"),
            record("Ginkgo biloba", "BBBB", "10.1/a"),
        ];
        let mut builder = DatasetBuilder::new();
        let stats = builder.ingest(&records, None).unwrap();
        let dataset = builder.finish();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(dataset.organisms.len(), 1);
        assert_eq!(dataset.compounds.len(), 2);
        assert_eq!(dataset.references.len(), 1);
        assert_eq!(dataset.quads.len(), 2);
        assert_eq!(dataset.references[0].doi, "10.1/A");
    }

    #[test]
    fn test_rows_without_keys_are_skipped() {
        let mut incomplete = record("Ginkgo biloba", "AAAA", "10.1/a");
        incomplete.doi = Some("   ".to_string());

        let mut builder = DatasetBuilder::new();
        assert!(builder.add_record(&incomplete).is_none());
        assert!(builder.add_record(&record("Ginkgo biloba", "AAAA", "10.1/a")).is_some());
        assert_eq!(builder.stats().skipped, 1);
        assert_eq!(builder.finish().quads.len(), 1);
    }

    #[test]
    fn test_first_row_defines_entity_fields() {
        let mut first = record("Ginkgo biloba", "AAAA", "10.1/a");
        first.title = Some("First title".to_string());
        let mut second = record("Ginkgo biloba", "CCCC", "10.1/a");
        second.title = Some("Second title".to_string());

        let mut builder = DatasetBuilder::new();
        builder.ingest(&vec![first, second], None).unwrap();
        let dataset = builder.finish();

        assert_eq!(dataset.references[0].title.as_deref(), Some("First title"));
    }

    #[test]
    fn test_limit_stops_early() {
        let records: Vec<RawRecord> = (0..10)
            .map(|i| record("Ginkgo biloba", &format!("KEY{}", i), "10.1/a"))
            .collect();
        let mut builder = DatasetBuilder::new();
        let stats = builder.ingest(&records, Some(4)).unwrap();

        assert_eq!(stats.records, 4);
        assert_eq!(builder.finish().compounds.len(), 4);
    }

    #[test]
    fn test_surrogate_ids_follow_first_sight() {
        let mut builder = DatasetBuilder::new();
        builder.add_record(&record("A", "K1", "10.1/a"));
        builder.add_record(&record("B", "K2", "10.1/a"));
        let dataset = builder.finish();

        let ids: Vec<u64> = dataset
            .organisms
            .iter()
            .map(|o| o.id.unwrap().get())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(dataset.quads_by_compound().len(), 2);
    }
}
