//! Persistent variable-binding maps.
//!
//! Bindings grow monotonically along a path from the network root to a
//! leaf. Tokens share ancestor binding maps structurally, so cloning a
//! `Bindings` is O(1).

use std::hash::{Hash, Hasher};

use crate::intern::{Interner, SymbolId};
use crate::value::Value;

/// A persistent map from variable to value.
///
/// Hashing is order-independent so a binding map projected onto a join
/// key set can index node memories directly.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    map: im::HashMap<SymbolId, Value>,
}

impl Bindings {
    /// Creates an empty binding map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no variables are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Gets the value bound to a variable.
    #[must_use]
    pub fn get(&self, var: SymbolId) -> Option<&Value> {
        self.map.get(&var)
    }

    /// Returns true if the variable is bound.
    #[must_use]
    pub fn contains(&self, var: SymbolId) -> bool {
        self.map.contains_key(&var)
    }

    /// Returns a new map with the variable bound, replacing any prior
    /// binding.
    #[must_use]
    pub fn bind(&self, var: SymbolId, value: Value) -> Self {
        Self {
            map: self.map.update(var, value),
        }
    }

    /// Merges two binding maps, failing on conflicting values.
    ///
    /// Returns `None` when any variable is bound to different values in
    /// the two maps. Bindings that agree merge without duplication.
    #[must_use]
    pub fn merge_consistent(&self, other: &Self) -> Option<Self> {
        // Walk the smaller side.
        let (base, addition) = if self.len() >= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut merged = base.map.clone();
        for (var, value) in &addition.map {
            if let Some(existing) = merged.get(var) {
                if existing != value {
                    return None;
                }
            } else {
                merged.insert(*var, value.clone());
            }
        }
        Some(Self { map: merged })
    }

    /// Projects the map onto a set of join keys.
    #[must_use]
    pub fn project(&self, keys: &[SymbolId]) -> Self {
        let mut map = im::HashMap::new();
        for key in keys {
            if let Some(value) = self.map.get(key) {
                map.insert(*key, value.clone());
            }
        }
        Self { map }
    }

    /// Returns true if every key in the slice is bound.
    #[must_use]
    pub fn binds_all(&self, keys: &[SymbolId]) -> bool {
        keys.iter().all(|key| self.map.contains_key(key))
    }

    /// Returns a copy with internally-generated variables removed.
    #[must_use]
    pub fn retain_named(&self, interner: &Interner) -> Self {
        let mut map = self.map.clone();
        for (var, _) in &self.map {
            if interner.is_generated(*var) {
                map.remove(var);
            }
        }
        Self { map }
    }

    /// Iterates the bound (variable, value) pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Value)> {
        self.map.iter().map(|(var, value)| (*var, value))
    }
}

impl Hash for Bindings {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: combine per-pair hashes commutatively.
        let mut acc: u64 = 0;
        for (var, value) in &self.map {
            let mut pair = std::collections::hash_map::DefaultHasher::new();
            var.hash(&mut pair);
            value.hash(&mut pair);
            acc = acc.wrapping_add(pair.finish());
        }
        self.map.len().hash(state);
        acc.hash(state);
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.map.iter().map(|(k, v)| (k.index(), v)))
            .finish()
    }
}

impl FromIterator<(SymbolId, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (SymbolId, Value)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}
