//! Instance registry: composite keys to shared instances.

use std::collections::HashMap;
use std::sync::Arc;

/// Registered instances of one factory, in registration order.
///
/// Entries are never removed, so every instance keeps its address for the
/// registry's lifetime and the address doubles as the instance tag.
pub(crate) struct InstanceRegistry<T> {
    entries: Vec<(String, Arc<T>)>,
    by_key: HashMap<String, usize>,
    /// Instance address to entry position
    tags: HashMap<usize, usize>,
}

impl<T> InstanceRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_key: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: &str) -> Option<&Arc<T>> {
        self.by_key.get(key).map(|&at| &self.entries[at].1)
    }

    /// Registers `instance` under `key`.
    ///
    /// Callers check `get` first under the same lock; a key is never
    /// registered twice.
    pub(crate) fn insert(&mut self, key: String, instance: Arc<T>) {
        debug_assert!(!self.by_key.contains_key(&key), "duplicate key {}", key);
        let at = self.entries.len();
        self.tags.insert(tag_of(&instance), at);
        self.by_key.insert(key.clone(), at);
        self.entries.push((key, instance));
    }

    /// Key of the instance at `addr`, if it was produced by this registry's factory.
    #[inline]
    pub(crate) fn key_of(&self, addr: usize) -> Option<&str> {
        self.tags.get(&addr).map(|&at| self.entries[at].0.as_str())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

/// Address of the instance, matching `Value::identity` for natives.
#[inline]
pub(crate) fn tag_of<T>(instance: &Arc<T>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_tags() {
        let mut registry = InstanceRegistry::new();
        let first = Arc::new(1);
        let second = Arc::new(2);

        registry.insert("a".to_string(), first.clone());
        registry.insert("b".to_string(), second.clone());

        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(registry.get("a").unwrap(), &first));
        assert!(registry.get("c").is_none());
        assert_eq!(registry.key_of(tag_of(&second)), Some("b"));
        assert_eq!(registry.key_of(tag_of(&Arc::new(2))), None);
        assert_eq!(registry.keys().collect::<Vec<_>>(), ["a", "b"]);
    }
}
