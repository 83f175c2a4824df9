//! Fact routing into the alpha network.
//!
//! Facts are grouped by the caller's type function; each type routes to
//! the union of alpha nodes keyed on the type and on its ancestors. The
//! union is memoized per type for the lifetime of the rulebase unless
//! caching is disabled. This is the only place in the engine that
//! consults type information.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use millrace_foundation::{Fact, KeywordId, NodeId};
use millrace_network::Rulebase;

/// Maps a fact to its type tag.
pub type FactTypeFn = Arc<dyn Fn(&Fact) -> KeywordId + Send + Sync>;

/// Maps a type tag to its ordered ancestor tags.
pub type AncestorsFn = Arc<dyn Fn(KeywordId) -> Vec<KeywordId> + Send + Sync>;

/// Routes facts to alpha nodes.
pub struct Routing {
    fact_type_fn: FactTypeFn,
    ancestors_fn: AncestorsFn,
    cache: Option<RwLock<HashMap<KeywordId, Arc<Vec<NodeId>>>>>,
}

impl Routing {
    /// Creates a routing layer. `cache = false` disables memoization.
    #[must_use]
    pub fn new(fact_type_fn: FactTypeFn, ancestors_fn: AncestorsFn, cache: bool) -> Self {
        Self {
            fact_type_fn,
            ancestors_fn,
            cache: cache.then(|| RwLock::new(HashMap::new())),
        }
    }

    /// The type tag of a fact.
    #[must_use]
    pub fn fact_type(&self, fact: &Fact) -> KeywordId {
        (self.fact_type_fn)(fact)
    }

    /// Alpha nodes activated by facts of the given type, ancestors
    /// included.
    ///
    /// # Panics
    ///
    /// Panics if the route cache lock was poisoned.
    #[must_use]
    pub fn alphas_for(&self, rulebase: &Rulebase, fact_type: KeywordId) -> Arc<Vec<NodeId>> {
        if let Some(cache) = &self.cache {
            if let Some(routes) = cache.read().expect("route cache poisoned").get(&fact_type) {
                return routes.clone();
            }
        }
        let routes = Arc::new(self.compute(rulebase, fact_type));
        if let Some(cache) = &self.cache {
            cache
                .write()
                .expect("route cache poisoned")
                .insert(fact_type, routes.clone());
        }
        routes
    }

    fn compute(&self, rulebase: &Rulebase, fact_type: KeywordId) -> Vec<NodeId> {
        let mut routes: Vec<NodeId> = rulebase.alpha_roots_for(fact_type).to_vec();
        for ancestor in (self.ancestors_fn)(fact_type) {
            for &id in rulebase.alpha_roots_for(ancestor) {
                if !routes.contains(&id) {
                    routes.push(id);
                }
            }
        }
        routes
    }
}

impl std::fmt::Debug for Routing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routing")
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
