//! Natural-key normalization applied before matching against the remote store

use serde::{Deserialize, Serialize};

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// How local keys and remote values are made comparable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNormalization {
    /// Byte-for-byte comparison
    #[default]
    Exact,
    /// Lower-cased comparison
    CaseInsensitive,
    /// DOIs: URL/`doi:` prefixes stripped, upper-cased like the remote store keeps them
    Doi,
    /// InChIKeys: trimmed and upper-cased
    InChIKey,
    /// Scientific names: trimmed, internal whitespace collapsed
    TaxonName,
}

impl KeyNormalization {
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Self::Exact => raw.to_string(),
            Self::CaseInsensitive => raw.trim().to_lowercase(),
            Self::Doi => {
                let trimmed = raw.trim();
                let lowered = trimmed.to_ascii_lowercase();
                let stripped = DOI_PREFIXES
                    .iter()
                    .find(|prefix| lowered.starts_with(*prefix))
                    .map_or(trimmed, |prefix| &trimmed[prefix.len()..]);
                stripped.trim().to_uppercase()
            },
            Self::InChIKey => raw.trim().to_ascii_uppercase(),
            Self::TaxonName => raw.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_keeps_everything() {
        assert_eq!(KeyNormalization::Exact.apply(" 10.1/a "), " 10.1/a ");
    }

    #[test]
    fn test_doi_normalization() {
        let doi = KeyNormalization::Doi;
        assert_eq!(doi.apply("10.1021/np0497301"), "10.1021/NP0497301");
        assert_eq!(doi.apply("https://doi.org/10.1021/np0497301"), "10.1021/NP0497301");
        assert_eq!(doi.apply("DOI:10.1021/NP0497301 "), "10.1021/NP0497301");
        assert_eq!(doi.apply("http://dx.doi.org/10.1/a"), "10.1/A");
    }

    #[test]
    fn test_inchikey_and_taxon() {
        assert_eq!(
            KeyNormalization::InChIKey.apply(" bsynrymutxbxsq-uhfffaoysa-n"),
            "BSYNRYMUTXBXSQ-UHFFFAOYSA-N"
        );
        assert_eq!(KeyNormalization::TaxonName.apply("  Ginkgo   biloba "), "Ginkgo biloba");
        assert_eq!(KeyNormalization::CaseInsensitive.apply("Ginkgo Biloba"), "ginkgo biloba");
    }
}
