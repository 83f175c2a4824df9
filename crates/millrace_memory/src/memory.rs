//! Working memory: per-node indexed stores.
//!
//! The persistent form is an immutable snapshot with O(1) clone via
//! structural sharing. A public API call thaws it into the transient
//! form, mutates in place, and freezes back; sessions holding the old
//! snapshot never observe the mutations.
//!
//! Element and token stores are multisets: duplicate facts produce
//! duplicate rows, and removal takes one occurrence per requested row.

use std::sync::Arc;

use millrace_foundation::{Bindings, Element, Fact, NodeId, Token, Value};

use crate::queue::ActivationQueue;

/// Key of a node's per-join-binding store.
pub type MemKey = (NodeId, Bindings);

/// Immutable working-memory snapshot.
#[derive(Clone, Debug, Default)]
pub struct PersistentMemory {
    alpha: im::HashMap<MemKey, im::Vector<Element>>,
    beta: im::HashMap<MemKey, im::Vector<Token>>,
    accum: im::HashMap<MemKey, im::HashMap<Bindings, Value>>,
    candidates: im::HashMap<MemKey, im::HashMap<Bindings, im::Vector<Arc<Fact>>>>,
    production: im::HashMap<NodeId, im::Vector<Token>>,
    fired: im::HashSet<(NodeId, Token)>,
    support: im::HashMap<(NodeId, Token), im::Vector<Arc<Fact>>>,
    queue: ActivationQueue,
}

impl PersistentMemory {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Thaws the snapshot into an exclusive mutable form.
    #[must_use]
    pub fn to_transient(self) -> TransientMemory {
        TransientMemory { inner: self }
    }

    /// Tokens stored for a node under the given key.
    #[must_use]
    pub fn tokens(&self, node: NodeId, key: &Bindings) -> im::Vector<Token> {
        self.beta
            .get(&(node, key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// All tokens stored for a node across keys.
    #[must_use]
    pub fn all_tokens(&self, node: NodeId) -> Vec<Token> {
        self.beta
            .iter()
            .filter(|((id, _), _)| *id == node)
            .flat_map(|(_, tokens)| tokens.iter().cloned())
            .collect()
    }

    /// Tokens registered at a production node.
    #[must_use]
    pub fn production_tokens(&self, node: NodeId) -> im::Vector<Token> {
        self.production.get(&node).cloned().unwrap_or_default()
    }

    /// Number of pending activations.
    #[must_use]
    pub fn pending_activations(&self) -> usize {
        self.queue.len()
    }
}

/// Exclusive mutable working memory for one API call.
#[derive(Debug)]
pub struct TransientMemory {
    inner: PersistentMemory,
}

impl TransientMemory {
    /// Freezes back into an immutable snapshot.
    #[must_use]
    pub fn to_persistent(self) -> PersistentMemory {
        self.inner
    }

    // =========================================================================
    // Alpha memory
    // =========================================================================

    /// Elements stored for an alpha-fed node under the given key.
    #[must_use]
    pub fn elements(&self, node: NodeId, key: &Bindings) -> im::Vector<Element> {
        self.inner
            .alpha
            .get(&(node, key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Stores elements under a key.
    pub fn add_elements(&mut self, node: NodeId, key: &Bindings, elements: &[Element]) {
        if elements.is_empty() {
            return;
        }
        let entry = self
            .inner
            .alpha
            .entry((node, key.clone()))
            .or_default();
        for element in elements {
            entry.push_back(element.clone());
        }
    }

    /// Removes one occurrence per requested element, returning those
    /// actually present.
    pub fn remove_elements(
        &mut self,
        node: NodeId,
        key: &Bindings,
        elements: &[Element],
    ) -> Vec<Element> {
        let map_key = (node, key.clone());
        let Some(stored) = self.inner.alpha.get_mut(&map_key) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        for element in elements {
            if let Some(idx) = stored.iter().position(|candidate| candidate == element) {
                stored.remove(idx);
                removed.push(element.clone());
            }
        }
        if stored.is_empty() {
            self.inner.alpha.remove(&map_key);
        }
        removed
    }

    // =========================================================================
    // Beta memory
    // =========================================================================

    /// Tokens stored for a node under the given key.
    #[must_use]
    pub fn tokens(&self, node: NodeId, key: &Bindings) -> im::Vector<Token> {
        self.inner.tokens(node, key)
    }

    /// Stores tokens under a key.
    pub fn add_tokens(&mut self, node: NodeId, key: &Bindings, tokens: &[Token]) {
        if tokens.is_empty() {
            return;
        }
        let entry = self.inner.beta.entry((node, key.clone())).or_default();
        for token in tokens {
            entry.push_back(token.clone());
        }
    }

    /// Removes one occurrence per requested token, returning those
    /// actually present.
    pub fn remove_tokens(&mut self, node: NodeId, key: &Bindings, tokens: &[Token]) -> Vec<Token> {
        let map_key = (node, key.clone());
        let Some(stored) = self.inner.beta.get_mut(&map_key) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        for token in tokens {
            if let Some(idx) = stored.iter().position(|candidate| candidate == token) {
                stored.remove(idx);
                removed.push(token.clone());
            }
        }
        if stored.is_empty() {
            self.inner.beta.remove(&map_key);
        }
        removed
    }

    // =========================================================================
    // Accumulator memory
    // =========================================================================

    /// Reduced values per fact-binding group for a node and key.
    #[must_use]
    pub fn accum_groups(&self, node: NodeId, key: &Bindings) -> im::HashMap<Bindings, Value> {
        self.inner
            .accum
            .get(&(node, key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// The reduced value for one group, if any.
    #[must_use]
    pub fn accum_get(&self, node: NodeId, key: &Bindings, group: &Bindings) -> Option<Value> {
        self.inner
            .accum
            .get(&(node, key.clone()))
            .and_then(|groups| groups.get(group))
            .cloned()
    }

    /// Stores the reduced value for a group.
    pub fn accum_set(&mut self, node: NodeId, key: &Bindings, group: &Bindings, value: Value) {
        self.inner
            .accum
            .entry((node, key.clone()))
            .or_default()
            .insert(group.clone(), value);
    }

    /// Drops a group's reduced value.
    pub fn accum_remove(&mut self, node: NodeId, key: &Bindings, group: &Bindings) {
        let map_key = (node, key.clone());
        if let Some(groups) = self.inner.accum.get_mut(&map_key) {
            groups.remove(group);
            if groups.is_empty() {
                self.inner.accum.remove(&map_key);
            }
        }
    }

    // =========================================================================
    // Filtered-accumulator candidates
    // =========================================================================

    /// Raw candidate lists per group for a filtered accumulator.
    #[must_use]
    pub fn candidate_groups(
        &self,
        node: NodeId,
        key: &Bindings,
    ) -> im::HashMap<Bindings, im::Vector<Arc<Fact>>> {
        self.inner
            .candidates
            .get(&(node, key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Appends a candidate fact to a group.
    pub fn add_candidate(&mut self, node: NodeId, key: &Bindings, group: &Bindings, fact: Arc<Fact>) {
        self.inner
            .candidates
            .entry((node, key.clone()))
            .or_default()
            .entry(group.clone())
            .or_default()
            .push_back(fact);
    }

    /// Removes one occurrence of a candidate from a group.
    ///
    /// Returns true if the fact was present.
    pub fn remove_candidate(
        &mut self,
        node: NodeId,
        key: &Bindings,
        group: &Bindings,
        fact: &Arc<Fact>,
    ) -> bool {
        let map_key = (node, key.clone());
        let Some(groups) = self.inner.candidates.get_mut(&map_key) else {
            return false;
        };
        let Some(list) = groups.get_mut(group) else {
            return false;
        };
        let Some(idx) = list.iter().position(|candidate| candidate == fact) else {
            return false;
        };
        list.remove(idx);
        if list.is_empty() {
            groups.remove(group);
        }
        if groups.is_empty() {
            self.inner.candidates.remove(&map_key);
        }
        true
    }

    // =========================================================================
    // Production memory
    // =========================================================================

    /// Tokens registered at a production node.
    #[must_use]
    pub fn production_tokens(&self, node: NodeId) -> im::Vector<Token> {
        self.inner.production_tokens(node)
    }

    /// Registers tokens at a production node.
    pub fn add_production_tokens(&mut self, node: NodeId, tokens: &[Token]) {
        if tokens.is_empty() {
            return;
        }
        let entry = self.inner.production.entry(node).or_default();
        for token in tokens {
            entry.push_back(token.clone());
        }
    }

    /// Evicts one occurrence per requested token, returning those
    /// actually present.
    pub fn remove_production_tokens(&mut self, node: NodeId, tokens: &[Token]) -> Vec<Token> {
        let Some(stored) = self.inner.production.get_mut(&node) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        for token in tokens {
            if let Some(idx) = stored.iter().position(|candidate| candidate == token) {
                stored.remove(idx);
                removed.push(token.clone());
            }
        }
        if stored.is_empty() {
            self.inner.production.remove(&node);
        }
        removed
    }

    // =========================================================================
    // Fired tracking
    // =========================================================================

    /// True if the production already fired on this token and the token
    /// has not been retracted since.
    #[must_use]
    pub fn is_fired(&self, node: NodeId, token: &Token) -> bool {
        self.inner.fired.contains(&(node, token.clone()))
    }

    /// Marks a (production, token) pair as fired.
    pub fn mark_fired(&mut self, node: NodeId, token: &Token) {
        self.inner.fired.insert((node, token.clone()));
    }

    /// Clears the fired mark so a re-produced token can fire again.
    pub fn unmark_fired(&mut self, node: NodeId, token: &Token) {
        self.inner.fired.remove(&(node, token.clone()));
    }

    // =========================================================================
    // Logical-insertion support
    // =========================================================================

    /// Records facts logically inserted under a firing token.
    pub fn add_support(&mut self, node: NodeId, token: &Token, facts: &[Arc<Fact>]) {
        if facts.is_empty() {
            return;
        }
        let entry = self
            .inner
            .support
            .entry((node, token.clone()))
            .or_default();
        for fact in facts {
            entry.push_back(fact.clone());
        }
    }

    /// Takes (and clears) the support record for a token.
    #[must_use]
    pub fn take_support(&mut self, node: NodeId, token: &Token) -> Vec<Arc<Fact>> {
        self.inner
            .support
            .remove(&(node, token.clone()))
            .map(|facts| facts.iter().cloned().collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Activation queue
    // =========================================================================

    /// The pending-activation queue.
    #[must_use]
    pub fn queue(&self) -> &ActivationQueue {
        &self.inner.queue
    }

    /// Mutable access to the pending-activation queue.
    pub fn queue_mut(&mut self) -> &mut ActivationQueue {
        &mut self.inner.queue
    }
}
