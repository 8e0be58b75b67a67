//! Export of the published LOTUS data as four TSV files
//!
//! The streams share one read-only [`QueryStore`] and each owns its output
//! file, so they run concurrently without coordination. Any failing stream
//! fails the export.

use lotus_common::{LotusError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::remote::{fold_select, QueryStore};

/// One query and the file its solutions go to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportStream {
    pub name: &'static str,
    pub file_name: &'static str,
    /// Solution variables, in column order
    pub columns: &'static [&'static str],
    pub query: &'static str,
}

pub const COMPOUNDS: ExportStream = ExportStream {
    name: "compounds",
    file_name: "compounds.tsv",
    columns: &["compound", "inchikey", "inchi", "smiles"],
    query: "SELECT DISTINCT ?compound ?inchikey ?inchi ?smiles WHERE { \
            ?compound wdt:P235 ?inchikey ; wdt:P703 [] . \
            OPTIONAL { ?compound wdt:P234 ?inchi . } \
            OPTIONAL { ?compound wdt:P233 ?smiles . } }",
};

pub const REFERENCES: ExportStream = ExportStream {
    name: "references",
    file_name: "references.tsv",
    columns: &["reference", "doi", "title"],
    query: "SELECT DISTINCT ?reference ?doi ?title WHERE { \
            ?compound wdt:P235 [] ; p:P703/prov:wasDerivedFrom/pr:P248 ?reference . \
            ?reference wdt:P356 ?doi . \
            OPTIONAL { ?reference wdt:P1476 ?title . } }",
};

pub const TAXA: ExportStream = ExportStream {
    name: "taxa",
    file_name: "taxa.tsv",
    columns: &["taxon", "taxon_name"],
    query: "SELECT DISTINCT ?taxon ?taxon_name WHERE { \
            ?compound wdt:P235 [] ; wdt:P703 ?taxon . \
            ?taxon wdt:P225 ?taxon_name . }",
};

pub const COMPOUND_REFERENCE_TAXON: ExportStream = ExportStream {
    name: "compound_reference_taxon",
    file_name: "compound_reference_taxon.tsv",
    columns: &["compound", "reference", "taxon"],
    query: "SELECT DISTINCT ?compound ?reference ?taxon WHERE { \
            ?compound wdt:P235 [] ; p:P703 ?statement . \
            ?statement ps:P703 ?taxon ; prov:wasDerivedFrom/pr:P248 ?reference . }",
};

/// Rows written per stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub compounds: usize,
    pub references: usize,
    pub taxa: usize,
    pub compound_reference_taxon: usize,
}

/// Writes the export streams into one directory
pub struct Exporter<'a> {
    store: &'a dyn QueryStore,
    output: PathBuf,
    entity_prefix: String,
}

impl<'a> Exporter<'a> {
    /// Fails with `AccessDenied` when `output` cannot be created or written
    pub fn new(store: &'a dyn QueryStore, output: impl Into<PathBuf>, entity_prefix: impl Into<String>) -> Result<Self> {
        let output = output.into();
        ensure_writable(&output)?;
        Ok(Self {
            store,
            output,
            entity_prefix: entity_prefix.into(),
        })
    }

    pub async fn run(&self) -> Result<ExportSummary> {
        let (compounds, references, taxa, compound_reference_taxon) = tokio::try_join!(
            self.export(&COMPOUNDS),
            self.export(&REFERENCES),
            self.export(&TAXA),
            self.export(&COMPOUND_REFERENCE_TAXON),
        )?;

        let summary = ExportSummary {
            compounds,
            references,
            taxa,
            compound_reference_taxon,
        };
        info!(
            output = %self.output.display(),
            compounds = summary.compounds,
            references = summary.references,
            taxa = summary.taxa,
            compound_reference_taxon = summary.compound_reference_taxon,
            "Export finished"
        );
        Ok(summary)
    }

    /// Run one stream and return its row count
    pub async fn export(&self, stream: &ExportStream) -> Result<usize> {
        let path = self.output.join(stream.file_name);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_path(&path)
            .map_err(|e| LotusError::access_denied(&path, e.to_string()))?;
        writer.write_record(stream.columns)?;

        let prefix = self.entity_prefix.as_str();
        let rows = fold_select(self.store, stream.query, Ok::<usize, LotusError>(0), |written, solution| {
            let written = written?;
            let row = stream.columns.iter().map(|column| {
                solution
                    .get(*column)
                    .map(|value| value.strip_prefix(prefix).unwrap_or(value.as_str()))
                    .unwrap_or_default()
            });
            writer.write_record(row)?;
            Ok(written + 1)
        })
        .await??;
        writer.flush()?;

        info!(stream = stream.name, rows = rows, path = %path.display(), "Stream written");
        Ok(rows)
    }
}

/// Create `dir` if needed and check a file can be written into it
pub fn ensure_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| LotusError::access_denied(dir, e.to_string()))?;
    let probe = dir.join(".lotus-write-check");
    fs::write(&probe, b"").map_err(|e| LotusError::access_denied(dir, e.to_string()))?;
    fs::remove_file(&probe).map_err(|e| LotusError::access_denied(dir, e.to_string()))?;
    Ok(())
}
