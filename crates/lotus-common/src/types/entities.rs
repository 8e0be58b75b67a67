//! Entities built from raw import records

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Indexed, Keyed, NaturalKey, SurrogateId};

/// The kinds of entity the importer reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Database,
    Organism,
    Compound,
    Reference,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Organism => "organism",
            Self::Compound => "compound",
            Self::Reference => "reference",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The database a record was extracted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub id: Option<SurrogateId>,
    pub name: String,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// An organism, keyed by its scientific name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organism {
    pub id: Option<SurrogateId>,
    pub name: String,
}

impl Organism {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// A chemical compound, keyed by its InChIKey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compound {
    pub id: Option<SurrogateId>,
    pub inchikey: String,
    pub smiles: Option<String>,
    pub inchi: Option<String>,
}

impl Compound {
    pub fn new(inchikey: impl Into<String>) -> Self {
        Self {
            id: None,
            inchikey: inchikey.into(),
            smiles: None,
            inchi: None,
        }
    }

    pub fn with_smiles(mut self, smiles: impl Into<String>) -> Self {
        self.smiles = Some(smiles.into());
        self
    }

    pub fn with_inchi(mut self, inchi: impl Into<String>) -> Self {
        self.inchi = Some(inchi.into());
        self
    }
}

/// A bibliographic reference, keyed by its DOI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Option<SurrogateId>,
    pub doi: String,
    pub title: Option<String>,
    pub pmid: Option<String>,
    pub journal: Option<String>,
    pub publication_date: Option<NaiveDate>,
}

impl Reference {
    pub fn new(doi: impl Into<String>) -> Self {
        Self {
            id: None,
            doi: doi.into(),
            title: None,
            pmid: None,
            journal: None,
            publication_date: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_publication_date(mut self, date: NaiveDate) -> Self {
        self.publication_date = Some(date);
        self
    }

    /// Title and publication date are both needed to describe the work
    pub fn is_complete(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
            && self.publication_date.is_some()
    }
}

impl Indexed for Database {
    fn surrogate_id(&self) -> Option<SurrogateId> {
        self.id
    }

    fn set_surrogate_id(&mut self, id: SurrogateId) {
        self.id = Some(id);
    }
}

impl Indexed for Organism {
    fn surrogate_id(&self) -> Option<SurrogateId> {
        self.id
    }

    fn set_surrogate_id(&mut self, id: SurrogateId) {
        self.id = Some(id);
    }
}

impl Indexed for Compound {
    fn surrogate_id(&self) -> Option<SurrogateId> {
        self.id
    }

    fn set_surrogate_id(&mut self, id: SurrogateId) {
        self.id = Some(id);
    }
}

impl Indexed for Reference {
    fn surrogate_id(&self) -> Option<SurrogateId> {
        self.id
    }

    fn set_surrogate_id(&mut self, id: SurrogateId) {
        self.id = Some(id);
    }
}

impl Keyed for Organism {
    fn kind(&self) -> EntityKind {
        EntityKind::Organism
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.name.as_str())
    }
}

impl Keyed for Compound {
    fn kind(&self) -> EntityKind {
        EntityKind::Compound
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.inchikey.as_str())
    }
}

impl Keyed for Reference {
    fn kind(&self) -> EntityKind {
        EntityKind::Reference
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.doi.as_str())
    }
}

/// One observation: this compound was found in this organism, per this
/// reference, per this database.
///
/// Entities are referred to by surrogate id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub database: SurrogateId,
    pub organism: SurrogateId,
    pub compound: SurrogateId,
    pub reference: SurrogateId,
}
