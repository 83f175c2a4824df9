//! Network node identity, elements, and tokens.
//!
//! These are the units of propagation in the discrimination network:
//! an [`Element`] is a fact paired with the bindings its alpha node
//! extracted; a [`Token`] is the partial match built along one path of
//! the beta network.

use std::fmt;
use std::sync::Arc;

use crate::bindings::Bindings;
use crate::value::{Fact, Value};

/// Stable identifier of a network node, assigned at construction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the raw index of this node.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// A fact plus the bindings its alpha condition extracted from it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Element {
    /// The matched fact.
    pub fact: Arc<Fact>,
    /// Bindings extracted by the alpha condition.
    pub bindings: Bindings,
}

impl Element {
    /// Creates an element.
    #[must_use]
    pub fn new(fact: Arc<Fact>, bindings: Bindings) -> Self {
        Self { fact, bindings }
    }
}

/// One entry of a token's match list.
///
/// The value is usually a fact; accumulator nodes contribute their
/// converted result instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Match {
    /// The matched value.
    pub value: Value,
    /// The node that produced this match.
    pub node: NodeId,
}

/// A partial match along one path of the beta network.
///
/// `matches` is ordered root-to-leaf; `bindings` is the union of all
/// ancestor bindings plus any introduced along the way. Tokens share
/// structure, so cloning is O(1).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Token {
    /// Ordered (value, originating node) pairs.
    pub matches: im::Vector<Match>,
    /// Accumulated bindings.
    pub bindings: Bindings,
}

impl Token {
    /// The empty token held implicitly by the beta roots.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a child token extending this one with a match.
    #[must_use]
    pub fn extend(&self, value: Value, node: NodeId, bindings: Bindings) -> Self {
        let mut matches = self.matches.clone();
        matches.push_back(Match { value, node });
        Self { matches, bindings }
    }

    /// Iterates the matched facts (skipping non-fact matches).
    pub fn facts(&self) -> impl Iterator<Item = &Arc<Fact>> {
        self.matches.iter().filter_map(|m| m.value.as_fact())
    }
}
