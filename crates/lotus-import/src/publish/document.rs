//! Documents handed to the publisher
//!
//! A [`Document`] is the remote-store-neutral description of one new item:
//! a label, an optional description, and its statements with provenance.
//! [`Document::to_wikibase_json`] renders it in the `data` format of the
//! Wikibase `wbeditentity` action.

use chrono::NaiveDate;
use lotus_common::types::{Compound, Organism, Reference, RemoteEntityId};
use lotus_common::{LotusError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::reconcile::normalize::KeyNormalization;

/// Wikidata properties used by the importer
pub mod props {
    pub const INSTANCE_OF: &str = "P31";
    pub const STATED_IN: &str = "P248";
    pub const RETRIEVED: &str = "P813";
    pub const DOI: &str = "P356";
    pub const TITLE: &str = "P1476";
    pub const PUBLICATION_DATE: &str = "P577";
    pub const PUBMED_ID: &str = "P698";
    pub const TAXON_NAME: &str = "P225";
    pub const INCHIKEY: &str = "P235";
    pub const CANONICAL_SMILES: &str = "P233";
    pub const INCHI: &str = "P234";
    pub const FOUND_IN_TAXON: &str = "P703";
}

/// Wikidata classes used by the importer
pub mod classes {
    pub const SCHOLARLY_ARTICLE: &str = "Q13442814";
    pub const TAXON: &str = "Q16521";
    pub const CHEMICAL_COMPOUND: &str = "Q11173";
}

const LANGUAGE: &str = "en";
const GREGORIAN: &str = "http://www.wikidata.org/entity/Q1985727";
const DAY_PRECISION: u8 = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StatementValue {
    Item(RemoteEntityId),
    String(String),
    ExternalId(String),
    Time(NaiveDate),
    MonolingualText { text: String, language: String },
}

impl StatementValue {
    pub fn item(id: impl Into<String>) -> Self {
        Self::Item(RemoteEntityId::new(id))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::MonolingualText {
            text: text.into(),
            language: LANGUAGE.to_string(),
        }
    }

    fn datavalue(&self) -> Value {
        match self {
            Self::Item(id) => json!({
                "type": "wikibase-entityid",
                "value": { "entity-type": "item", "id": id.as_str() },
            }),
            Self::String(s) | Self::ExternalId(s) => json!({ "type": "string", "value": s }),
            Self::Time(date) => json!({
                "type": "time",
                "value": {
                    "time": date.format("+%Y-%m-%dT00:00:00Z").to_string(),
                    "timezone": 0,
                    "before": 0,
                    "after": 0,
                    "precision": DAY_PRECISION,
                    "calendarmodel": GREGORIAN,
                },
            }),
            Self::MonolingualText { text, language } => json!({
                "type": "monolingualtext",
                "value": { "text": text, "language": language },
            }),
        }
    }
}

/// Where a statement comes from: `stated in` and `retrieved`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub stated_in: RemoteEntityId,
    pub retrieved: Option<NaiveDate>,
}

impl Provenance {
    pub fn new(stated_in: RemoteEntityId) -> Self {
        Self {
            stated_in,
            retrieved: None,
        }
    }

    pub fn retrieved_on(mut self, date: NaiveDate) -> Self {
        self.retrieved = Some(date);
        self
    }

    fn to_json(&self) -> Value {
        let mut snaks = serde_json::Map::new();
        snaks.insert(
            props::STATED_IN.to_string(),
            json!([snak(props::STATED_IN, &StatementValue::Item(self.stated_in.clone()))]),
        );
        if let Some(date) = self.retrieved {
            snaks.insert(
                props::RETRIEVED.to_string(),
                json!([snak(props::RETRIEVED, &StatementValue::Time(date))]),
            );
        }
        json!({ "snaks": snaks })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub property: String,
    pub value: StatementValue,
    pub references: Vec<Provenance>,
}

impl Statement {
    pub fn new(property: impl Into<String>, value: StatementValue) -> Self {
        Self {
            property: property.into(),
            value,
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, provenance: Provenance) -> Self {
        self.references.push(provenance);
        self
    }

    fn to_json(&self) -> Value {
        json!({
            "type": "statement",
            "rank": "normal",
            "mainsnak": snak(&self.property, &self.value),
            "references": self.references.iter().map(Provenance::to_json).collect::<Vec<_>>(),
        })
    }
}

fn snak(property: &str, value: &StatementValue) -> Value {
    json!({
        "snaktype": "value",
        "property": property,
        "datavalue": value.datavalue(),
    })
}

/// One new item for the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub label: String,
    pub description: Option<String>,
    pub statements: Vec<Statement>,
}

impl Document {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
            statements: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Statements carrying `property`
    pub fn claims<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a Statement> + 'a {
        self.statements.iter().filter(move |s| s.property == property)
    }

    /// The `data` payload of `wbeditentity`
    pub fn to_wikibase_json(&self) -> Value {
        let mut data = json!({
            "labels": { LANGUAGE: { "language": LANGUAGE, "value": self.label } },
            "claims": self.statements.iter().map(Statement::to_json).collect::<Vec<_>>(),
        });
        if let Some(description) = &self.description {
            data["descriptions"] = json!({ LANGUAGE: { "language": LANGUAGE, "value": description } });
        }
        data
    }

    /// Scholarly article for `reference`. Title and publication date are mandatory.
    ///
    /// Natural keys are written in their normalized spelling so later runs
    /// find the item again.
    pub fn for_reference(reference: &Reference) -> Result<Self> {
        let title = reference
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LotusError::validation(&reference.doi, "reference has no title"))?;
        let published = reference
            .publication_date
            .ok_or_else(|| LotusError::validation(&reference.doi, "reference has no publication date"))?;

        let mut document = Self::new(title)
            .with_description("scholarly article")
            .with_statement(Statement::new(props::INSTANCE_OF, StatementValue::item(classes::SCHOLARLY_ARTICLE)))
            .with_statement(Statement::new(
                props::DOI,
                StatementValue::ExternalId(KeyNormalization::Doi.apply(&reference.doi)),
            ))
            .with_statement(Statement::new(props::TITLE, StatementValue::text(title)))
            .with_statement(Statement::new(props::PUBLICATION_DATE, StatementValue::Time(published)));
        if let Some(pmid) = reference.pmid.as_deref().filter(|p| !p.trim().is_empty()) {
            document = document.with_statement(Statement::new(props::PUBMED_ID, StatementValue::ExternalId(pmid.to_string())));
        }
        Ok(document)
    }

    /// Taxon for `organism`
    pub fn for_organism(organism: &Organism) -> Result<Self> {
        let name = KeyNormalization::TaxonName.apply(&organism.name);
        if name.is_empty() {
            return Err(LotusError::validation(&organism.name, "organism has no name"));
        }
        Ok(Self::new(name.as_str())
            .with_description("taxon")
            .with_statement(Statement::new(props::INSTANCE_OF, StatementValue::item(classes::TAXON)))
            .with_statement(Statement::new(props::TAXON_NAME, StatementValue::String(name))))
    }

    /// Chemical compound for `compound`, with one `found in taxon` statement
    /// per (organism, reference) occurrence.
    pub fn for_compound(
        compound: &Compound,
        occurrences: &[(RemoteEntityId, RemoteEntityId)],
        retrieved: NaiveDate,
    ) -> Result<Self> {
        let inchikey = KeyNormalization::InChIKey.apply(&compound.inchikey);
        if inchikey.is_empty() {
            return Err(LotusError::validation(&compound.inchikey, "compound has no InChIKey"));
        }
        if occurrences.is_empty() {
            return Err(LotusError::validation(
                &compound.inchikey,
                "compound has no occurrence with a published organism and reference",
            ));
        }

        let mut document = Self::new(inchikey.as_str())
            .with_description("chemical compound")
            .with_statement(Statement::new(props::INSTANCE_OF, StatementValue::item(classes::CHEMICAL_COMPOUND)))
            .with_statement(Statement::new(props::INCHIKEY, StatementValue::ExternalId(inchikey)));
        if let Some(smiles) = compound.smiles.as_deref().filter(|s| !s.is_empty()) {
            document = document.with_statement(Statement::new(
                props::CANONICAL_SMILES,
                StatementValue::ExternalId(smiles.to_string()),
            ));
        }
        if let Some(inchi) = compound.inchi.as_deref().filter(|s| !s.is_empty()) {
            document = document.with_statement(Statement::new(props::INCHI, StatementValue::ExternalId(inchi.to_string())));
        }
        for (organism, reference) in occurrences {
            document = document.with_statement(
                Statement::new(props::FOUND_IN_TAXON, StatementValue::Item(organism.clone()))
                    .with_reference(Provenance::new(reference.clone()).retrieved_on(retrieved)),
            );
        }
        Ok(document)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lotus_common::ErrorKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_requires_title_and_date() {
        let bare = Reference::new("10.1/A");
        assert_eq!(Document::for_reference(&bare).unwrap_err().kind(), ErrorKind::Validation);

        let untitled = Reference::new("10.1/A").with_publication_date(date(2004, 1, 1));
        assert_eq!(Document::for_reference(&untitled).unwrap_err().kind(), ErrorKind::Validation);

        let undated = Reference::new("10.1/A").with_title("Alkaloids");
        assert_eq!(Document::for_reference(&undated).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_reference_document() {
        let reference = Reference::new("10.1021/NP0497301")
            .with_title("Alkaloids of Ginkgo")
            .with_publication_date(date(2004, 6, 1));
        let document = Document::for_reference(&reference).unwrap();

        assert_eq!(document.label, "Alkaloids of Ginkgo");
        assert_eq!(document.claims(props::DOI).count(), 1);
        assert_eq!(
            document.claims(props::PUBLICATION_DATE).next().unwrap().value,
            StatementValue::Time(date(2004, 6, 1))
        );
    }

    #[test]
    fn test_compound_needs_occurrences() {
        let compound = Compound::new("BSYNRYMUTXBXSQ-UHFFFAOYSA-N");
        let err = Document::for_compound(&compound, &[], date(2024, 1, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_compound_found_in_taxon_carries_provenance() {
        let compound = Compound::new("BSYNRYMUTXBXSQ-UHFFFAOYSA-N").with_smiles("CC(=O)OC1=CC=CC=C1C(=O)O");
        let occurrences = vec![(RemoteEntityId::from("Q1"), RemoteEntityId::from("Q2"))];
        let document = Document::for_compound(&compound, &occurrences, date(2024, 3, 9)).unwrap();

        let found: Vec<_> = document.claims(props::FOUND_IN_TAXON).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, StatementValue::item("Q1"));
        assert_eq!(
            found[0].references,
            vec![Provenance::new(RemoteEntityId::from("Q2")).retrieved_on(date(2024, 3, 9))]
        );
        assert_eq!(document.claims(props::CANONICAL_SMILES).count(), 1);
        assert_eq!(document.claims(props::INCHI).count(), 0);
    }

    #[test]
    fn test_wikibase_json_layout() {
        let document = Document::for_organism(&Organism::new("Ginkgo biloba")).unwrap();
        let data = document.to_wikibase_json();

        assert_eq!(data["labels"]["en"]["value"], "Ginkgo biloba");
        assert_eq!(data["descriptions"]["en"]["value"], "taxon");
        assert_eq!(data["claims"][0]["mainsnak"]["property"], "P31");
        assert_eq!(data["claims"][0]["mainsnak"]["datavalue"]["value"]["id"], "Q16521");
        assert_eq!(data["claims"][1]["mainsnak"]["datavalue"]["value"], "Ginkgo biloba");
    }

    #[test]
    fn test_time_and_provenance_json() {
        let statement = Statement::new(props::FOUND_IN_TAXON, StatementValue::item("Q1"))
            .with_reference(Provenance::new(RemoteEntityId::from("Q2")).retrieved_on(date(2024, 3, 9)));
        let value = statement.to_json();

        let snaks = &value["references"][0]["snaks"];
        assert_eq!(snaks["P248"][0]["datavalue"]["value"]["id"], "Q2");
        assert_eq!(snaks["P813"][0]["datavalue"]["value"]["time"], "+2024-03-09T00:00:00Z");
        assert_eq!(snaks["P813"][0]["datavalue"]["value"]["precision"], 11);
    }

    #[test]
    fn test_keys_are_written_normalized() {
        let reference = Reference::new("https://doi.org/10.1021/np0497301")
            .with_title("Alkaloids")
            .with_publication_date(date(2004, 6, 1));
        let document = Document::for_reference(&reference).unwrap();
        assert_eq!(
            document.claims(props::DOI).next().unwrap().value,
            StatementValue::ExternalId("10.1021/NP0497301".to_string())
        );

        let organism = Document::for_organism(&Organism::new(" Ginkgo  biloba")).unwrap();
        assert_eq!(organism.label, "Ginkgo biloba");
    }

    #[test]
    fn test_blank_organism_fails_validation() {
        let err = Document::for_organism(&Organism::new("  ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
