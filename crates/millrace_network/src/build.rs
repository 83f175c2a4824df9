//! Network construction.
//!
//! The builder turns productions into the compiled [`Rulebase`]: each
//! left-hand side is rewritten to DNF, every variant becomes a chain of
//! beta nodes hanging off per-condition alpha nodes, and structurally
//! identical prefixes are shared between variants and productions.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use millrace_foundation::{
    Bindings, Error, Interner, KeywordId, NodeId, Result, SymbolId,
};

use crate::condition::{AccumulateCondition, FactCondition, TestCondition};
use crate::dnf::{to_dnf, FlatCondition};
use crate::expr::Expr;
use crate::node::{
    AccumulateFilterNode, AccumulateNode, AlphaNode, BetaNode, CompiledRule, JoinNode,
    NegationNode, Node, ProductionNode, QueryNode, RootJoinNode, Rulebase, TestNode,
};
use crate::production::{Production, QueryDef, QueryHandle, RuleDef};

/// Key identifying a shareable alpha node.
#[derive(PartialEq, Eq, Hash)]
struct AlphaKey {
    condition: FactCondition,
    env: Bindings,
}

/// Key identifying a shareable beta node.
#[derive(PartialEq, Eq, Hash)]
enum BetaKey {
    RootJoin {
        alpha: NodeId,
    },
    Join {
        parent: NodeId,
        alpha: NodeId,
        join_keys: Vec<SymbolId>,
    },
    Negation {
        parent: Option<NodeId>,
        alpha: NodeId,
        join_keys: Vec<SymbolId>,
    },
    Test {
        parent: Option<NodeId>,
        predicate: Expr,
    },
}

/// Builds a [`Rulebase`] from productions.
///
/// The builder owns the interner used to name rules, queries, types,
/// fields, and variables; it is frozen into the rulebase at build time.
#[derive(Default)]
pub struct NetworkBuilder {
    interner: Interner,
    productions: Vec<Production>,
}

impl NetworkBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The interner, for naming things while authoring productions.
    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    /// Adds a rule.
    pub fn add_rule(&mut self, rule: RuleDef) {
        self.productions.push(Production::Rule(rule));
    }

    /// Adds a query, returning a handle usable with `query`.
    pub fn add_query(&mut self, query: QueryDef) -> QueryHandle {
        let handle = QueryHandle::new(query.name);
        self.productions.push(Production::Query(query));
        handle
    }

    /// Adds a production of either kind.
    pub fn add_production(&mut self, production: Production) {
        self.productions.push(production);
    }

    /// Builds the rulebase.
    ///
    /// # Errors
    ///
    /// Returns invalid-rule when a rule lacks an action, has no
    /// conditions, or references a variable with no binding source;
    /// invalid-accumulator-usage when an accumulator's join filter
    /// cannot be resolved.
    pub fn build(self) -> Result<Rulebase> {
        let mut state = BuildState {
            interner: self.interner,
            nodes: Vec::new(),
            roots: Vec::new(),
            alpha_roots: HashMap::new(),
            alpha_index: HashMap::new(),
            beta_index: HashMap::new(),
            productions: HashMap::new(),
            queries: HashMap::new(),
        };

        for production in &self.productions {
            state.add_production(production)?;
        }

        Ok(Rulebase::new(
            state.nodes,
            state.roots,
            state.alpha_roots,
            state.productions,
            state.queries,
            state.interner,
        ))
    }
}

struct BuildState {
    interner: Interner,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    alpha_roots: HashMap<KeywordId, Vec<NodeId>>,
    alpha_index: HashMap<AlphaKey, NodeId>,
    beta_index: HashMap<BetaKey, NodeId>,
    productions: HashMap<KeywordId, Vec<NodeId>>,
    queries: HashMap<KeywordId, Vec<NodeId>>,
}

impl BuildState {
    fn add_production(&mut self, production: &Production) -> Result<()> {
        let name = self.display_name(production.name());
        match production {
            Production::Rule(rule) => {
                let action = rule.action.clone().ok_or_else(|| {
                    Error::invalid_rule(&name, "rule has no right-hand-side action")
                })?;
                let compiled = Arc::new(CompiledRule {
                    name: rule.name,
                    properties: rule.properties.clone(),
                    action,
                });
                let variants = to_dnf(&name, &rule.lhs)?;
                for variant in &variants {
                    let tail = self.add_variant(&name, variant, &rule.env)?;
                    let id = self.next_id();
                    self.push_beta(BetaNode::Production(ProductionNode {
                        id,
                        rule: compiled.clone(),
                    }));
                    self.attach(tail, id);
                    self.productions.entry(rule.name).or_default().push(id);
                }
            }
            Production::Query(query) => {
                let variants = to_dnf(&name, &query.lhs)?;
                for variant in &variants {
                    let tail = self.add_variant(&name, variant, &query.env)?;
                    let bound = self.variant_bound(variant);
                    for param in &query.params {
                        if !bound.contains(param) {
                            return Err(Error::invalid_rule(
                                &name,
                                format!(
                                    "query parameter {} is not bound by the left-hand side",
                                    self.variable_name(*param)
                                ),
                            ));
                        }
                    }
                    let id = self.next_id();
                    self.push_beta(BetaNode::Query(QueryNode {
                        id,
                        name: query.name,
                        params: query.params.clone(),
                    }));
                    self.attach(tail, id);
                    self.queries.entry(query.name).or_default().push(id);
                }
            }
        }
        Ok(())
    }

    /// Builds the beta chain for one variant, returning its tail node.
    fn add_variant(
        &mut self,
        name: &str,
        variant: &[FlatCondition],
        env: &Bindings,
    ) -> Result<NodeId> {
        if variant.is_empty() {
            return Err(Error::invalid_rule(name, "left-hand side has no conditions"));
        }

        let mut parent: Option<NodeId> = None;
        let mut bound: BTreeSet<SymbolId> = BTreeSet::new();

        for condition in variant {
            parent = Some(match condition {
                FlatCondition::Fact(fact) => {
                    self.validate_fact_condition(name, fact, env)?;
                    let alpha = self.alpha_node(fact, env);
                    let cond_bound: BTreeSet<SymbolId> =
                        fact.bound_variables().into_iter().collect();
                    let node = match parent {
                        None => self.root_join_node(alpha),
                        Some(parent) => {
                            let join_keys = intersect(&bound, &cond_bound);
                            self.join_node(parent, alpha, join_keys)
                        }
                    };
                    bound.extend(cond_bound);
                    node
                }
                FlatCondition::Negation(fact) => {
                    self.validate_fact_condition(name, fact, env)?;
                    let alpha = self.alpha_node(fact, env);
                    let cond_bound: BTreeSet<SymbolId> =
                        fact.bound_variables().into_iter().collect();
                    let join_keys = intersect(&bound, &cond_bound);
                    // Negations introduce no bindings downstream.
                    self.negation_node(parent, alpha, join_keys)
                }
                FlatCondition::Test(test) => {
                    self.validate_test(name, test, env, &bound)?;
                    self.test_node(parent, test, env)
                }
                FlatCondition::Accumulate(accum) => {
                    self.validate_fact_condition(name, &accum.from, env)?;
                    self.validate_join_filter(name, accum, env, &bound)?;
                    let alpha = self.alpha_node(&accum.from, env);
                    let inner_bound: BTreeSet<SymbolId> =
                        accum.from.bound_variables().into_iter().collect();
                    let join_keys = intersect(&bound, &inner_bound);
                    let node = self.accumulate_node(parent, alpha, accum, join_keys, env);
                    bound.extend(inner_bound);
                    if let Some(result) = accum.result {
                        bound.insert(result);
                    }
                    node
                }
            });
        }

        parent.ok_or_else(|| Error::internal("variant produced no nodes"))
    }

    /// Variables bound in token bindings after the whole variant, for
    /// query-parameter validation. Env values never enter bindings.
    fn variant_bound(&self, variant: &[FlatCondition]) -> BTreeSet<SymbolId> {
        let mut bound: BTreeSet<SymbolId> = BTreeSet::new();
        for condition in variant {
            match condition {
                FlatCondition::Fact(fact) => bound.extend(fact.bound_variables()),
                FlatCondition::Negation(_) | FlatCondition::Test(_) => {}
                FlatCondition::Accumulate(accum) => {
                    bound.extend(accum.from.bound_variables());
                    if let Some(result) = accum.result {
                        bound.insert(result);
                    }
                }
            }
        }
        bound
    }

    /// Checks that a condition's constraints can be evaluated against a
    /// lone fact: every referenced variable must be bound within the
    /// condition itself or supplied by the env.
    fn validate_fact_condition(
        &self,
        name: &str,
        condition: &FactCondition,
        env: &Bindings,
    ) -> Result<()> {
        let mut local: Vec<SymbolId> = Vec::new();
        for constraint in &condition.constraints {
            if let Some((var, source)) = constraint.binding_target() {
                if !local.contains(&var) && env.get(var).is_none() {
                    let mut vars = Vec::new();
                    source.variables(&mut vars);
                    self.check_resolvable(name, &vars, &local, env)?;
                    local.push(var);
                    continue;
                }
            }
            let mut vars = Vec::new();
            constraint.variables(&mut vars);
            self.check_resolvable(name, &vars, &local, env)?;
        }
        Ok(())
    }

    fn check_resolvable(
        &self,
        name: &str,
        vars: &[SymbolId],
        local: &[SymbolId],
        env: &Bindings,
    ) -> Result<()> {
        for var in vars {
            if !local.contains(var) && env.get(*var).is_none() {
                return Err(Error::invalid_rule(
                    name,
                    format!(
                        "constraint references {} with no binding source in its own \
                         condition (cross-condition predicates belong in a test)",
                        self.variable_name(*var)
                    ),
                ));
            }
        }
        Ok(())
    }

    fn validate_test(
        &self,
        name: &str,
        test: &TestCondition,
        env: &Bindings,
        bound: &BTreeSet<SymbolId>,
    ) -> Result<()> {
        let mut vars = Vec::new();
        test.predicate.variables(&mut vars);
        for var in vars {
            if !bound.contains(&var) && env.get(var).is_none() {
                return Err(Error::invalid_rule(
                    name,
                    format!(
                        "test references {} with no binding source",
                        self.variable_name(var)
                    ),
                ));
            }
        }
        Ok(())
    }

    fn validate_join_filter(
        &self,
        name: &str,
        accum: &AccumulateCondition,
        env: &Bindings,
        bound: &BTreeSet<SymbolId>,
    ) -> Result<()> {
        let Some(filter) = &accum.join_filter else {
            return Ok(());
        };
        let inner: BTreeSet<SymbolId> = accum.from.bound_variables().into_iter().collect();
        let mut vars = Vec::new();
        filter.variables(&mut vars);
        for var in vars {
            if !bound.contains(&var) && !inner.contains(&var) && env.get(var).is_none() {
                return Err(Error::invalid_accumulator(
                    name,
                    format!(
                        "join filter references {} which is bound by neither the \
                         preceding conditions nor the accumulated condition",
                        self.variable_name(var)
                    ),
                ));
            }
        }
        Ok(())
    }

    // --- node creation -----------------------------------------------------

    fn next_id(&self) -> NodeId {
        NodeId(u32::try_from(self.nodes.len()).expect("too many nodes"))
    }

    fn push_beta(&mut self, node: BetaNode) {
        self.nodes.push(Node::Beta(node));
    }

    fn alpha_node(&mut self, condition: &FactCondition, env: &Bindings) -> NodeId {
        let key = AlphaKey {
            condition: condition.clone(),
            env: env.clone(),
        };
        if let Some(&id) = self.alpha_index.get(&key) {
            return id;
        }
        let id = self.next_id();
        self.nodes.push(Node::Alpha(AlphaNode {
            id,
            condition: condition.clone(),
            env: env.clone(),
            children: Vec::new(),
        }));
        self.alpha_roots
            .entry(condition.fact_type)
            .or_default()
            .push(id);
        self.alpha_index.insert(key, id);
        id
    }

    fn root_join_node(&mut self, alpha: NodeId) -> NodeId {
        let key = BetaKey::RootJoin { alpha };
        if let Some(&id) = self.beta_index.get(&key) {
            return id;
        }
        let id = self.next_id();
        self.push_beta(BetaNode::RootJoin(RootJoinNode {
            id,
            children: Vec::new(),
        }));
        self.roots.push(id);
        self.link_alpha(alpha, id);
        self.beta_index.insert(key, id);
        id
    }

    fn join_node(&mut self, parent: NodeId, alpha: NodeId, join_keys: Vec<SymbolId>) -> NodeId {
        let key = BetaKey::Join {
            parent,
            alpha,
            join_keys: join_keys.clone(),
        };
        if let Some(&id) = self.beta_index.get(&key) {
            return id;
        }
        let id = self.next_id();
        self.push_beta(BetaNode::Join(JoinNode {
            id,
            join_keys,
            children: Vec::new(),
        }));
        self.attach(parent, id);
        self.link_alpha(alpha, id);
        self.beta_index.insert(key, id);
        id
    }

    fn negation_node(
        &mut self,
        parent: Option<NodeId>,
        alpha: NodeId,
        join_keys: Vec<SymbolId>,
    ) -> NodeId {
        let key = BetaKey::Negation {
            parent,
            alpha,
            join_keys: join_keys.clone(),
        };
        if let Some(&id) = self.beta_index.get(&key) {
            return id;
        }
        let id = self.next_id();
        self.push_beta(BetaNode::Negation(NegationNode {
            id,
            join_keys,
            children: Vec::new(),
        }));
        match parent {
            Some(parent) => self.attach(parent, id),
            None => self.roots.push(id),
        }
        self.link_alpha(alpha, id);
        self.beta_index.insert(key, id);
        id
    }

    fn test_node(&mut self, parent: Option<NodeId>, test: &TestCondition, env: &Bindings) -> NodeId {
        let key = BetaKey::Test {
            parent,
            predicate: test.predicate.clone(),
        };
        if let Some(&id) = self.beta_index.get(&key) {
            return id;
        }
        let id = self.next_id();
        self.push_beta(BetaNode::Test(TestNode {
            id,
            test: test.clone(),
            env: env.clone(),
            children: Vec::new(),
        }));
        match parent {
            Some(parent) => self.attach(parent, id),
            None => self.roots.push(id),
        }
        self.beta_index.insert(key, id);
        id
    }

    fn accumulate_node(
        &mut self,
        parent: Option<NodeId>,
        alpha: NodeId,
        accum: &AccumulateCondition,
        join_keys: Vec<SymbolId>,
        env: &Bindings,
    ) -> NodeId {
        let id = self.next_id();
        let node = match &accum.join_filter {
            None => BetaNode::Accumulate(AccumulateNode {
                id,
                join_keys,
                accumulator: accum.accumulator.clone(),
                result: accum.result,
                children: Vec::new(),
            }),
            Some(filter) => BetaNode::AccumulateFilter(AccumulateFilterNode {
                id,
                join_keys,
                accumulator: accum.accumulator.clone(),
                join_filter: filter.clone(),
                env: env.clone(),
                result: accum.result,
                children: Vec::new(),
            }),
        };
        self.push_beta(node);
        match parent {
            Some(parent) => self.attach(parent, id),
            None => self.roots.push(id),
        }
        self.link_alpha(alpha, id);
        id
    }

    /// Adds `child` to a beta node's child list.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(Node::Beta(beta)) = self.nodes.get_mut(parent.index()) {
            let children = match beta {
                BetaNode::RootJoin(n) => &mut n.children,
                BetaNode::Join(n) => &mut n.children,
                BetaNode::Negation(n) => &mut n.children,
                BetaNode::Test(n) => &mut n.children,
                BetaNode::Accumulate(n) => &mut n.children,
                BetaNode::AccumulateFilter(n) => &mut n.children,
                BetaNode::Production(_) | BetaNode::Query(_) => return,
            };
            if !children.contains(&child) {
                children.push(child);
            }
        }
    }

    /// Adds `child` to an alpha node's child list.
    fn link_alpha(&mut self, alpha: NodeId, child: NodeId) {
        if let Some(Node::Alpha(node)) = self.nodes.get_mut(alpha.index()) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
    }

    fn display_name(&self, name: KeywordId) -> String {
        self.interner
            .keyword_name(name)
            .unwrap_or("<unnamed>")
            .to_string()
    }

    fn variable_name(&self, var: SymbolId) -> String {
        self.interner
            .symbol_name(var)
            .unwrap_or("<unknown-variable>")
            .to_string()
    }
}

fn intersect(bound: &BTreeSet<SymbolId>, cond_bound: &BTreeSet<SymbolId>) -> Vec<SymbolId> {
    bound.intersection(cond_bound).copied().collect()
}
