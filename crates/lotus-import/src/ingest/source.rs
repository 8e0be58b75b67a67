//! Raw record sources

use chrono::NaiveDate;
use lotus_common::{LotusError, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One observation row: a compound found in an organism per a reference,
/// as listed by a database.
///
/// Every column is optional at this stage; the builder decides which rows
/// are usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub database: Option<String>,
    pub organism: Option<String>,
    pub inchikey: Option<String>,
    pub smiles: Option<String>,
    pub inchi: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub pmid: Option<String>,
    pub publication_date: Option<String>,
}

impl RawRecord {
    /// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`; missing parts default to 1
    pub fn publication_date(&self) -> Option<NaiveDate> {
        let raw = self.publication_date.as_deref()?.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(date);
        }
        let mut parts = raw.split('-');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next().map_or(Some(1), |m| m.parse().ok())?;
        NaiveDate::from_ymd_opt(year, month, 1)
    }
}

/// Lazily produced records; each item is one row or that row's parse error
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<RawRecord>> + Send + 'a>;

/// A finite, restartable sequence of raw records
pub trait RawRecordSource {
    /// Start reading from the beginning
    fn records(&self) -> Result<RecordIter<'_>>;
}

impl RawRecordSource for Vec<RawRecord> {
    fn records(&self) -> Result<RecordIter<'_>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

/// Tab-separated file with a header row
#[derive(Debug, Clone)]
pub struct TsvRecordSource {
    path: PathBuf,
}

impl TsvRecordSource {
    /// Fails with `AccessDenied` when `path` cannot be opened for reading
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        File::open(&path).map_err(|e| LotusError::access_denied(&path, e.to_string()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawRecordSource for TsvRecordSource {
    fn records(&self) -> Result<RecordIter<'_>> {
        let file = File::open(&self.path).map_err(|e| LotusError::access_denied(&self.path, e.to_string()))?;
        debug!(path = %self.path.display(), "Reading records");

        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .from_reader(file);

        let rows = reader.into_deserialize::<RawRecord>().map(|row| {
            row.map_err(|e| {
                let line = e.position().map_or(0, |p| p.line());
                LotusError::parse(format!("line {}: {}", line, e))
            })
        });
        Ok(Box::new(rows))
    }
}
