//! Network nodes and the compiled rulebase.
//!
//! Nodes live in a single arena and reference each other by [`NodeId`]
//! only; parents hold child id lists and children hold nothing, so the
//! network is a forward-only DAG.

use std::collections::HashMap;
use std::sync::Arc;

use millrace_foundation::{Bindings, Interner, KeywordId, NodeId, SymbolId};

use crate::condition::{AccumulatorDef, FactCondition, TestCondition};
use crate::production::{RhsAction, RuleProperties};

/// An alpha node: evaluates one condition against one fact.
#[derive(Clone, Debug)]
pub struct AlphaNode {
    /// This node's id.
    pub id: NodeId,
    /// The single-fact condition.
    pub condition: FactCondition,
    /// External values threaded into condition evaluation.
    pub env: Bindings,
    /// Beta nodes receiving this node's elements right-wise.
    pub children: Vec<NodeId>,
}

/// A compiled rule carried by its production nodes.
pub struct CompiledRule {
    /// The rule's fully qualified name.
    pub name: KeywordId,
    /// Salience, no-loop, group.
    pub properties: RuleProperties,
    /// The right-hand-side action.
    pub action: RhsAction,
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRule")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// The beta root for one first condition. Holds the empty token
/// implicitly and turns elements into tokens.
#[derive(Clone, Debug)]
pub struct RootJoinNode {
    /// This node's id.
    pub id: NodeId,
    /// Downstream beta nodes.
    pub children: Vec<NodeId>,
}

/// An inner join over binding equality.
#[derive(Clone, Debug)]
pub struct JoinNode {
    /// This node's id.
    pub id: NodeId,
    /// Variables both sides must agree on.
    pub join_keys: Vec<SymbolId>,
    /// Downstream beta nodes.
    pub children: Vec<NodeId>,
}

/// Propagates left tokens only while no right elements exist.
#[derive(Clone, Debug)]
pub struct NegationNode {
    /// This node's id.
    pub id: NodeId,
    /// Variables both sides must agree on.
    pub join_keys: Vec<SymbolId>,
    /// Downstream beta nodes.
    pub children: Vec<NodeId>,
}

/// Filters tokens by a pure predicate over bindings.
#[derive(Clone, Debug)]
pub struct TestNode {
    /// This node's id.
    pub id: NodeId,
    /// The predicate.
    pub test: TestCondition,
    /// External values threaded into predicate evaluation.
    pub env: Bindings,
    /// Downstream beta nodes.
    pub children: Vec<NodeId>,
}

/// Accumulates elements into a reduced value per binding group.
#[derive(Clone, Debug)]
pub struct AccumulateNode {
    /// This node's id.
    pub id: NodeId,
    /// Variables both sides must agree on.
    pub join_keys: Vec<SymbolId>,
    /// The fold descriptor.
    pub accumulator: AccumulatorDef,
    /// Variable bound to the converted result, if any.
    pub result: Option<SymbolId>,
    /// Downstream beta nodes.
    pub children: Vec<NodeId>,
}

/// Accumulates with a filter that depends on the joining token.
///
/// Cannot pre-reduce; memory holds raw candidate lists per group.
#[derive(Clone, Debug)]
pub struct AccumulateFilterNode {
    /// This node's id.
    pub id: NodeId,
    /// Variables both sides must agree on.
    pub join_keys: Vec<SymbolId>,
    /// The fold descriptor.
    pub accumulator: AccumulatorDef,
    /// Filter over (token bindings, candidate fact).
    pub join_filter: crate::expr::Expr,
    /// External values threaded into filter evaluation.
    pub env: Bindings,
    /// Variable bound to the converted result, if any.
    pub result: Option<SymbolId>,
    /// Downstream beta nodes.
    pub children: Vec<NodeId>,
}

/// A terminal node bound to a rule.
#[derive(Clone, Debug)]
pub struct ProductionNode {
    /// This node's id.
    pub id: NodeId,
    /// The rule this node activates.
    pub rule: Arc<CompiledRule>,
}

/// A terminal node bound to a query.
#[derive(Clone, Debug)]
pub struct QueryNode {
    /// This node's id.
    pub id: NodeId,
    /// The query's fully qualified name.
    pub name: KeywordId,
    /// Parameter variables, a subset of the node's bindings.
    pub params: Vec<SymbolId>,
}

/// A beta network node.
#[derive(Clone, Debug)]
pub enum BetaNode {
    /// Beta root for one first condition.
    RootJoin(RootJoinNode),
    /// Inner join.
    Join(JoinNode),
    /// Negation.
    Negation(NegationNode),
    /// Pure predicate filter.
    Test(TestNode),
    /// Accumulator without cross-condition filter.
    Accumulate(AccumulateNode),
    /// Accumulator with a token-dependent filter.
    AccumulateFilter(AccumulateFilterNode),
    /// Rule terminal.
    Production(ProductionNode),
    /// Query terminal.
    Query(QueryNode),
}

impl BetaNode {
    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::RootJoin(n) => n.id,
            Self::Join(n) => n.id,
            Self::Negation(n) => n.id,
            Self::Test(n) => n.id,
            Self::Accumulate(n) => n.id,
            Self::AccumulateFilter(n) => n.id,
            Self::Production(n) => n.id,
            Self::Query(n) => n.id,
        }
    }

    /// Downstream beta nodes receiving tokens from this node.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match self {
            Self::RootJoin(n) => &n.children,
            Self::Join(n) => &n.children,
            Self::Negation(n) => &n.children,
            Self::Test(n) => &n.children,
            Self::Accumulate(n) => &n.children,
            Self::AccumulateFilter(n) => &n.children,
            Self::Production(_) | Self::Query(_) => &[],
        }
    }

    /// The join keys incoming activations are grouped by.
    ///
    /// Terminals and tests take tokens ungrouped.
    #[must_use]
    pub fn join_keys(&self) -> &[SymbolId] {
        match self {
            Self::Join(n) => &n.join_keys,
            Self::Negation(n) => &n.join_keys,
            Self::Accumulate(n) => &n.join_keys,
            Self::AccumulateFilter(n) => &n.join_keys,
            Self::RootJoin(_) | Self::Test(_) | Self::Production(_) | Self::Query(_) => &[],
        }
    }

    /// A short human-readable description for listeners and errors.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::RootJoin(n) => format!("root-join#{}", n.id.0),
            Self::Join(n) => format!("join#{}[{}]", n.id.0, n.join_keys.len()),
            Self::Negation(n) => format!("negation#{}[{}]", n.id.0, n.join_keys.len()),
            Self::Test(n) => format!("test#{}", n.id.0),
            Self::Accumulate(n) => format!("accumulate#{}", n.id.0),
            Self::AccumulateFilter(n) => format!("accumulate-filter#{}", n.id.0),
            Self::Production(n) => format!("production#{}", n.id.0),
            Self::Query(n) => format!("query#{}", n.id.0),
        }
    }
}

/// One node of the arena.
#[derive(Clone, Debug)]
pub enum Node {
    /// Alpha network node.
    Alpha(AlphaNode),
    /// Beta network node.
    Beta(BetaNode),
}

/// The compiled, read-only discrimination network.
///
/// Shared by every session created from it; all lookups go through id
/// maps rather than pointer graphs.
#[derive(Clone, Debug)]
pub struct Rulebase {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    alpha_roots: HashMap<KeywordId, Vec<NodeId>>,
    productions: HashMap<KeywordId, Vec<NodeId>>,
    queries: HashMap<KeywordId, Vec<NodeId>>,
    interner: Arc<Interner>,
}

impl Rulebase {
    pub(crate) fn new(
        nodes: Vec<Node>,
        roots: Vec<NodeId>,
        alpha_roots: HashMap<KeywordId, Vec<NodeId>>,
        productions: HashMap<KeywordId, Vec<NodeId>>,
        queries: HashMap<KeywordId, Vec<NodeId>>,
        interner: Interner,
    ) -> Self {
        Self {
            nodes,
            roots,
            alpha_roots,
            productions,
            queries,
            interner: Arc::new(interner),
        }
    }

    /// Beta nodes with no beta parent. Each receives the single empty
    /// token when a session's working memory is initialized.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Total number of nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Looks up a beta node by id.
    #[must_use]
    pub fn beta(&self, id: NodeId) -> Option<&BetaNode> {
        match self.nodes.get(id.index()) {
            Some(Node::Beta(beta)) => Some(beta),
            _ => None,
        }
    }

    /// Looks up an alpha node by id.
    #[must_use]
    pub fn alpha(&self, id: NodeId) -> Option<&AlphaNode> {
        match self.nodes.get(id.index()) {
            Some(Node::Alpha(alpha)) => Some(alpha),
            _ => None,
        }
    }

    /// Alpha nodes keyed directly on the given type (no ancestors).
    #[must_use]
    pub fn alpha_roots_for(&self, fact_type: KeywordId) -> &[NodeId] {
        self.alpha_roots
            .get(&fact_type)
            .map_or(&[], Vec::as_slice)
    }

    /// Production node ids for a rule name, one per variant.
    #[must_use]
    pub fn production_nodes(&self, name: KeywordId) -> &[NodeId] {
        self.productions.get(&name).map_or(&[], Vec::as_slice)
    }

    /// Query node ids for a query name, one per variant.
    #[must_use]
    pub fn query_nodes(&self, name: KeywordId) -> &[NodeId] {
        self.queries.get(&name).map_or(&[], Vec::as_slice)
    }

    /// Resolves a query by its fully qualified name.
    #[must_use]
    pub fn query_nodes_by_name(&self, name: &str) -> Option<&[NodeId]> {
        let id = self.interner.lookup_keyword(name)?;
        let nodes = self.query_nodes(id);
        if nodes.is_empty() {
            None
        } else {
            Some(nodes)
        }
    }

    /// Every beta node in id order.
    pub fn beta_nodes(&self) -> impl Iterator<Item = &BetaNode> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Beta(beta) => Some(beta),
            Node::Alpha(_) => None,
        })
    }

    /// The frozen interner used to resolve names.
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }
}
