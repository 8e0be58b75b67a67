//! Common types used across LOTUS import

use serde::{Deserialize, Serialize};

mod entities;

pub use entities::{Compound, Database, EntityKind, Organism, Quad, Reference};

// ============================================================================
// Identifiers
// ============================================================================

/// Externally meaningful identifier of an entity (DOI, InChIKey, taxon name).
///
/// Compared byte for byte. Normalization, when wanted, happens explicitly
/// before keys are matched against the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for NaturalKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NaturalKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-local sequence number assigned the first time a natural key is seen.
///
/// Unrelated to the identifiers of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateId(u64);

impl SurrogateId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier issued by the remote knowledge store (e.g. `Q26778522`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteEntityId(String);

impl RemoteEntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RemoteEntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RemoteEntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// An entity that carries a surrogate id slot.
///
/// The identity cache fills the slot exactly once, before the entity is
/// shared; afterwards the entity is read-only.
pub trait Indexed {
    fn surrogate_id(&self) -> Option<SurrogateId>;

    fn set_surrogate_id(&mut self, id: SurrogateId);
}

/// An entity that can be matched against the remote store by a natural key.
pub trait Keyed {
    fn kind(&self) -> EntityKind;

    fn natural_key(&self) -> NaturalKey;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_is_exact() {
        assert_ne!(NaturalKey::from("10.1/ABC"), NaturalKey::from("10.1/abc"));
        assert!(NaturalKey::from("   ").is_blank());
        assert!(!NaturalKey::from("Ginkgo biloba").is_blank());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&RemoteEntityId::from("Q42")).unwrap();
        assert_eq!(json, "\"Q42\"");
        let json = serde_json::to_string(&SurrogateId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
