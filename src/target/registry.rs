//! Target registry with atomic whole-set replacement.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::target::Target;

/// Reasons a target set is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate target key '{0}'")]
    DuplicateKey(String),

    #[error("invalid target '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// An immutable, validated set of targets keyed by target key.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Arc<Target>>,
}

impl TargetRegistry {
    /// Build a registry. The whole set is rejected if any record is invalid.
    pub fn new(targets: Vec<Target>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for target in targets {
            target.check_invariants().map_err(|reason| RegistryError::Invalid {
                key: target.key.clone(),
                reason,
            })?;
            if map.contains_key(&target.key) {
                return Err(RegistryError::DuplicateKey(target.key));
            }
            map.insert(target.key.clone(), Arc::new(target));
        }
        Ok(Self { targets: map })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Target>> {
        self.targets.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.targets.contains_key(key)
    }

    /// Targets in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.targets.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.targets.keys()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Compare `self` (the running set) against `next`.
    pub fn diff(&self, next: &TargetRegistry) -> RegistryDiff {
        let mut diff = RegistryDiff::default();
        for (key, target) in &next.targets {
            match self.targets.get(key) {
                None => diff.added.push(target.clone()),
                Some(current) if current != target => diff.changed.push(target.clone()),
                Some(_) => diff.unchanged.push(key.clone()),
            }
        }
        diff.removed = self
            .targets
            .keys()
            .filter(|k| !next.targets.contains_key(*k))
            .cloned()
            .collect();
        diff
    }
}

/// Result of comparing two registries.
#[derive(Debug, Default)]
pub struct RegistryDiff {
    pub added: Vec<Arc<Target>>,
    pub changed: Vec<Arc<Target>>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Handle to the active registry shared by every component.
///
/// Readers always observe a complete set; `swap` replaces it in one step.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<ArcSwap<TargetRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: TargetRegistry) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(registry)),
        }
    }

    /// Current registry snapshot.
    pub fn load(&self) -> Arc<TargetRegistry> {
        self.inner.load_full()
    }

    /// Install `next` and return the previous registry.
    pub fn swap(&self, next: TargetRegistry) -> Arc<TargetRegistry> {
        self.inner.swap(Arc::new(next))
    }

    /// Validate `targets` and install them. On error the active registry
    /// is left untouched.
    pub fn replace(&self, targets: Vec<Target>) -> Result<Arc<TargetRegistry>, RegistryError> {
        let next = TargetRegistry::new(targets)?;
        self.swap(next);
        Ok(self.load())
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(TargetRegistry::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{CheckSpec, Thresholds};
    use std::time::Duration;

    fn tcp(key: &str, port: u16) -> Target {
        Target::new(
            key,
            CheckSpec::Tcp { address: format!("127.0.0.1:{}", port) },
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = TargetRegistry::new(vec![tcp("a", 1), tcp("a", 2)]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey("a".into()));
    }

    #[test]
    fn test_diff() {
        let current = TargetRegistry::new(vec![tcp("a", 1), tcp("b", 2), tcp("c", 3)]).unwrap();
        let next = TargetRegistry::new(vec![tcp("a", 1), tcp("b", 20), tcp("d", 4)]).unwrap();

        let diff = current.diff(&next);
        assert_eq!(diff.unchanged, vec!["a".to_string()]);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].key, "b");
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].key, "d");
        assert_eq!(diff.removed, vec!["c".to_string()]);
        assert!(current.diff(&current).is_empty());
    }

    #[test]
    fn test_failed_replace_keeps_previous() {
        let shared = SharedRegistry::new(TargetRegistry::new(vec![tcp("a", 1)]).unwrap());

        let bad = tcp("b", 2).with_thresholds(Thresholds {
            recovery_threshold: 0,
            ..Thresholds::default()
        });
        assert!(shared.replace(vec![tcp("z", 9), bad]).is_err());

        let active = shared.load();
        assert_eq!(active.len(), 1);
        assert!(active.contains("a"));
        assert!(!active.contains("z"));

        shared.replace(vec![tcp("b", 2)]).unwrap();
        assert_eq!(shared.load().keys().cloned().collect::<Vec<_>>(), vec!["b".to_string()]);
    }
}
