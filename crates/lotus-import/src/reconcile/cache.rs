//! Identity cache
//!
//! Deduplicates entities observed during one import run and hands out
//! surrogate ids. Entries live until the cache is dropped; there is no
//! eviction.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lotus_common::types::{Indexed, SurrogateId};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maps a natural key to the entity first built for it.
///
/// The first insertion of a key assigns the next surrogate id, starting at 1.
/// Concurrent callers racing on the same unseen key serialize on the map
/// shard: exactly one constructor runs and every caller gets its entity.
pub struct IdentityCache<K, E> {
    entries: DashMap<K, Arc<E>>,
    counter: AtomicU64,
}

impl<K, E> IdentityCache<K, E>
where
    K: Eq + Hash,
    E: Indexed,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Return the entity cached for `key`, building it with `constructor` on
    /// first sight. The constructor is not called for known keys.
    pub fn get_or_new<F>(&self, key: K, constructor: F) -> Arc<E>
    where
        F: FnOnce() -> E,
    {
        match self.try_get_or_new(key, || Ok::<E, std::convert::Infallible>(constructor())) {
            Ok(entity) => entity,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_new`](Self::get_or_new) for constructors that can fail.
    ///
    /// A failed construction stores nothing and consumes no surrogate id.
    pub fn try_get_or_new<F, Err>(&self, key: K, constructor: F) -> Result<Arc<E>, Err>
    where
        F: FnOnce() -> Result<E, Err>,
    {
        if let Some(existing) = self.entries.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        match self.entries.entry(key) {
            Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                let mut entity = constructor()?;
                entity.set_surrogate_id(self.next_id());
                let entity = Arc::new(entity);
                vacant.insert(Arc::clone(&entity));
                Ok(entity)
            },
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<E>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all cached entities ordered by surrogate id
    pub fn entities(&self) -> Vec<Arc<E>> {
        let mut all: Vec<Arc<E>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by_key(|entity| entity.surrogate_id());
        all
    }

    fn next_id(&self) -> SurrogateId {
        SurrogateId::new(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl<K, E> Default for IdentityCache<K, E>
where
    K: Eq + Hash,
    E: Indexed,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lotus_common::types::Organism;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_repeat_lookup_returns_cached_entity() {
        let cache: IdentityCache<String, Organism> = IdentityCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_new("Ginkgo biloba".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Organism::new("Ginkgo biloba")
        });
        let second = cache.get_or_new("Ginkgo biloba".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Organism::new("something else")
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.id, Some(SurrogateId::new(1)));
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Ginkgo biloba");
    }

    #[test]
    fn test_ids_increase_from_one() {
        let cache: IdentityCache<&str, Organism> = IdentityCache::new();
        let ids: Vec<u64> = ["a", "b", "a", "c"]
            .iter()
            .map(|name| cache.get_or_new(*name, || Organism::new(*name)).id.unwrap().get())
            .collect();

        assert_eq!(ids, vec![1, 2, 1, 3]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_failed_construction_consumes_nothing() {
        let cache: IdentityCache<&str, Organism> = IdentityCache::new();
        let failed: Result<_, &str> = cache.try_get_or_new("bad", || Err("no name"));
        assert!(failed.is_err());
        assert!(cache.get(&"bad").is_none());

        let ok = cache.get_or_new("good", || Organism::new("good"));
        assert_eq!(ok.id, Some(SurrogateId::new(1)));
    }

    #[test]
    fn test_entities_sorted_by_id() {
        let cache: IdentityCache<&str, Organism> = IdentityCache::new();
        for name in ["c", "a", "b"] {
            cache.get_or_new(name, || Organism::new(name));
        }
        let names: Vec<String> = cache.entities().iter().map(|o| o.name.clone()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_concurrent_same_key_assigns_one_id() {
        let cache: Arc<IdentityCache<String, Organism>> = Arc::new(IdentityCache::new());
        let constructions = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let constructions = Arc::clone(&constructions);
                std::thread::spawn(move || {
                    cache
                        .get_or_new("Taxus baccata".to_string(), || {
                            constructions.fetch_add(1, Ordering::SeqCst);
                            Organism::new("Taxus baccata")
                        })
                        .id
                })
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| *id == Some(SurrogateId::new(1))));
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_same_key_same_id(keys in proptest::collection::vec("[a-z]{1,4}", 1..40)) {
            let cache: IdentityCache<String, Organism> = IdentityCache::new();
            let first: Vec<_> = keys
                .iter()
                .map(|k| cache.get_or_new(k.clone(), || Organism::new(k.as_str())).id)
                .collect();
            let second: Vec<_> = keys
                .iter()
                .map(|k| cache.get_or_new(k.clone(), || Organism::new("rebuilt")).id)
                .collect();

            prop_assert_eq!(&first, &second);

            let distinct: std::collections::HashSet<_> = keys.iter().collect();
            let max_id = first.iter().flatten().map(|id| id.get()).max().unwrap_or(0);
            prop_assert_eq!(max_id as usize, distinct.len());
        }
    }
}
