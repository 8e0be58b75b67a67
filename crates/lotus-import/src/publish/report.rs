//! Run summary and failure list

use lotus_common::types::{EntityKind, NaturalKey};
use lotus_common::{ErrorKind, LotusError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Counts for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Candidates looked at
    pub processed: usize,
    /// Candidates whose document passed validation
    pub validated: usize,
    /// New items created
    pub inserted: usize,
    /// Candidates matched to exactly one existing item
    pub reused: usize,
    /// Candidates matched to several existing items
    pub ambiguous: usize,
    /// Candidates that failed validation or publishing
    pub failed: usize,
}

/// One candidate that did not make it, with enough context to retry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub kind: EntityKind,
    pub key: NaturalKey,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl FailureRecord {
    pub fn new(kind: EntityKind, key: NaturalKey, error: &LotusError) -> Self {
        Self {
            kind,
            key,
            error_kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one publish run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    kinds: BTreeMap<&'static str, KindSummary>,
    failures: Vec<FailureRecord>,
}

impl ImportSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self, kind: EntityKind) -> KindSummary {
        self.kinds.get(kind.as_str()).copied().unwrap_or_default()
    }

    pub(crate) fn kind_mut(&mut self, kind: EntityKind) -> &mut KindSummary {
        self.kinds.entry(kind.as_str()).or_default()
    }

    pub(crate) fn record_failure(&mut self, kind: EntityKind, key: NaturalKey, error: &LotusError) {
        self.kind_mut(kind).failed += 1;
        self.failures.push(FailureRecord::new(kind, key, error));
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Sum over all kinds
    pub fn totals(&self) -> KindSummary {
        self.kinds.values().fold(KindSummary::default(), |acc, k| KindSummary {
            processed: acc.processed + k.processed,
            validated: acc.validated + k.validated,
            inserted: acc.inserted + k.inserted,
            reused: acc.reused + k.reused,
            ambiguous: acc.ambiguous + k.ambiguous,
            failed: acc.failed + k.failed,
        })
    }

    /// One line per entity kind plus a total
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .kinds
            .iter()
            .map(|(kind, k)| format_line(kind, k))
            .collect();
        lines.push(format_line("total", &self.totals()));
        lines.join("\n")
    }

    /// Write the failures as TSV: kind, key, error kind, message
    pub fn write_failures(&self, path: &Path) -> Result<usize> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(|e| LotusError::access_denied(path, e.to_string()))?;

        writer.write_record(["kind", "key", "error_kind", "message"])?;
        for failure in &self.failures {
            writer.write_record([
                failure.kind.as_str(),
                failure.key.as_str(),
                failure.error_kind.as_str(),
                failure.message.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(self.failures.len())
    }
}

fn format_line(label: &str, k: &KindSummary) -> String {
    format!(
        "{:<10} processed={} validated={} inserted={} reused={} ambiguous={} failed={}",
        label, k.processed, k.validated, k.inserted, k.reused, k.ambiguous, k.failed
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_add_up() {
        let mut summary = ImportSummary::new();
        summary.kind_mut(EntityKind::Reference).processed = 3;
        summary.kind_mut(EntityKind::Reference).inserted = 2;
        summary.kind_mut(EntityKind::Organism).processed = 1;
        summary.record_failure(
            EntityKind::Organism,
            NaturalKey::from(" "),
            &LotusError::validation(" ", "organism has no name"),
        );

        let totals = summary.totals();
        assert_eq!(totals.processed, 4);
        assert_eq!(totals.inserted, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(summary.kind(EntityKind::Compound), KindSummary::default());
        assert!(summary.summary().contains("total"));
    }

    #[test]
    fn test_write_failures_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.tsv");

        let mut summary = ImportSummary::new();
        summary.record_failure(
            EntityKind::Reference,
            NaturalKey::from("10.1/A"),
            &LotusError::validation("10.1/A", "reference has no title"),
        );
        summary.record_failure(
            EntityKind::Compound,
            NaturalKey::from("XXXX"),
            &LotusError::AmbiguousMatch {
                key: "XXXX".to_string(),
                candidates: vec!["Q1".to_string(), "Q2".to_string()],
            },
        );

        assert_eq!(summary.write_failures(&path).unwrap(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "kind\tkey\terror_kind\tmessage");
        assert!(lines[1].starts_with("reference\t10.1/A\tvalidation\t"));
        assert!(lines[2].starts_with("compound\tXXXX\tambiguous_match\t"));
    }
}
