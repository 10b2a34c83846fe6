use ahash::AHashMap as HashMap;
use kube::{runtime::reflector::ObjectRef, Resource};
use parking_lot::RwLock;
use std::{collections::HashSet, sync::Arc};

/// The latest known state of each watched object.
///
/// Only the reflector's watch task writes to the cache; any number of readers
/// may take snapshots concurrently. Objects are stored behind `Arc`s and never
/// mutated in place, so a snapshot is unaffected by later writes.
pub struct Cache<K: Resource<DynamicType = ()>> {
    objects: Arc<RwLock<HashMap<ObjectRef<K>, Arc<K>>>>,
}

// === impl Cache ===

impl<K: Resource<DynamicType = ()>> Cache<K> {
    pub(crate) fn new() -> Self {
        Self {
            objects: Default::default(),
        }
    }

    /// Returns a point-in-time snapshot of every cached object.
    pub fn list(&self) -> Vec<Arc<K>> {
        self.objects.read().values().cloned().collect()
    }

    pub fn get(&self, key: &ObjectRef<K>) -> Option<Arc<K>> {
        self.objects.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub(crate) fn keys(&self) -> Vec<ObjectRef<K>> {
        self.objects.read().keys().cloned().collect()
    }

    /// Stores `obj`, returning true if it replaced an existing entry.
    pub(crate) fn put(&self, key: ObjectRef<K>, obj: K) -> bool {
        self.objects.write().insert(key, Arc::new(obj)).is_some()
    }

    pub(crate) fn delete(&self, key: &ObjectRef<K>) -> Option<Arc<K>> {
        self.objects.write().remove(key)
    }

    /// Replaces the entire contents of the cache, returning the keys that were
    /// cached before the reset.
    pub(crate) fn reset(
        &self,
        objs: impl IntoIterator<Item = (ObjectRef<K>, K)>,
    ) -> HashSet<ObjectRef<K>> {
        let objects = objs
            .into_iter()
            .map(|(key, obj)| (key, Arc::new(obj)))
            .collect::<HashMap<_, _>>();
        let prior = std::mem::replace(&mut *self.objects.write(), objects);
        prior.into_iter().map(|(key, _)| key).collect()
    }
}

impl<K: Resource<DynamicType = ()>> Clone for Cache<K> {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
        }
    }
}

impl<K: Resource<DynamicType = ()>> std::fmt::Debug for Cache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("len", &self.len()).finish()
    }
}
