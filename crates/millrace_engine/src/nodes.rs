//! Node behaviors: activation and retraction through the network.
//!
//! The engine owns the transient working memory and listeners for the
//! duration of one public API call and walks the rulebase's DAG by id.
//! Retractions reconstruct exactly the tokens their insertions emitted,
//! so cancellation is symmetric; removal helpers report what was
//! actually present, which makes downstream layers idempotent to
//! spurious retractions.

use std::collections::HashMap;
use std::sync::Arc;

use millrace_foundation::{Bindings, Element, Fact, NodeId, SymbolId, Token, Value};
use millrace_memory::{Activation, EventListener, TransientMemory};
use millrace_network::{
    AccumulateFilterNode, AccumulateNode, AccumulatorDef, AlphaNode, BetaNode, JoinNode,
    NegationNode, ProductionNode, QueryNode, RootJoinNode, Rulebase, TestNode,
};

use crate::routing::Routing;
use crate::session::{ActivationGroupFn, ActivationGroupSortFn};

/// Mutable engine state for one public API call.
pub(crate) struct Engine<'a> {
    rulebase: &'a Rulebase,
    routing: &'a Routing,
    pub(crate) memory: TransientMemory,
    listeners: Vec<Box<dyn EventListener>>,
    group_fn: ActivationGroupFn,
    group_cmp: ActivationGroupSortFn,
    /// The production currently firing, for no-loop checks during
    /// flushes of its own insertions.
    pub(crate) current_production: Option<NodeId>,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(
        rulebase: &'a Rulebase,
        routing: &'a Routing,
        memory: TransientMemory,
        listeners: Vec<Box<dyn EventListener>>,
        group_fn: ActivationGroupFn,
        group_cmp: ActivationGroupSortFn,
    ) -> Self {
        Self {
            rulebase,
            routing,
            memory,
            listeners,
            group_fn,
            group_cmp,
            current_production: None,
        }
    }

    pub(crate) fn into_parts(self) -> (TransientMemory, Vec<Box<dyn EventListener>>) {
        (self.memory, self.listeners)
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn EventListener)) {
        for listener in &mut self.listeners {
            f(listener.as_mut());
        }
    }

    /// Left-activates every beta root with the single empty token.
    pub(crate) fn seed_roots(&mut self) {
        let rulebase = self.rulebase;
        for &root in rulebase.roots() {
            self.left_activate(root, Bindings::new(), vec![Token::empty()]);
        }
    }

    // =========================================================================
    // Fact entry points
    // =========================================================================

    /// Inserts facts, recording support when the insertion is logical.
    pub(crate) fn insert_facts(&mut self, facts: &[Arc<Fact>], support: Option<(NodeId, &Token)>) {
        if facts.is_empty() {
            return;
        }
        match support {
            Some((node, token)) => {
                self.memory.add_support(node, token, facts);
                self.notify(|l| l.insert_facts_logical(node, token, facts));
            }
            None => self.notify(|l| l.insert_facts(facts)),
        }
        self.route(facts, false);
    }

    /// Retracts one instance of each fact.
    pub(crate) fn retract_facts(&mut self, facts: &[Arc<Fact>]) {
        if facts.is_empty() {
            return;
        }
        self.notify(|l| l.retract_facts(facts));
        self.route(facts, true);
    }

    fn route(&mut self, facts: &[Arc<Fact>], retract: bool) {
        let rulebase = self.rulebase;
        let mut by_type: HashMap<_, Vec<Arc<Fact>>> = HashMap::new();
        for fact in facts {
            by_type
                .entry(self.routing.fact_type(fact))
                .or_default()
                .push(fact.clone());
        }
        for (fact_type, batch) in by_type {
            let alphas = self.routing.alphas_for(rulebase, fact_type);
            for &alpha in alphas.iter() {
                if retract {
                    self.alpha_retract(alpha, &batch);
                } else {
                    self.alpha_activate(alpha, &batch);
                }
            }
        }
    }

    // =========================================================================
    // Alpha network
    // =========================================================================

    fn alpha_activate(&mut self, id: NodeId, facts: &[Arc<Fact>]) {
        let rulebase = self.rulebase;
        let Some(alpha) = rulebase.alpha(id) else {
            return;
        };
        let elements = match_elements(alpha, facts);
        if !elements.is_empty() {
            self.send_right(&alpha.children, &elements, false);
        }
    }

    fn alpha_retract(&mut self, id: NodeId, facts: &[Arc<Fact>]) {
        let rulebase = self.rulebase;
        let Some(alpha) = rulebase.alpha(id) else {
            return;
        };
        let elements = match_elements(alpha, facts);
        if !elements.is_empty() {
            self.send_right(&alpha.children, &elements, true);
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn send_right(&mut self, children: &'a [NodeId], elements: &[Element], retract: bool) {
        let rulebase = self.rulebase;
        for &child in children {
            let keys = rulebase.beta(child).map_or(&[][..], BetaNode::join_keys);
            for (key, batch) in group_elements(keys, elements) {
                if retract {
                    self.right_retract(child, key, batch);
                } else {
                    self.right_activate(child, key, batch);
                }
            }
        }
    }

    fn send_left(&mut self, children: &'a [NodeId], tokens: &[Token], retract: bool) {
        if tokens.is_empty() {
            return;
        }
        let rulebase = self.rulebase;
        for &child in children {
            let keys = rulebase.beta(child).map_or(&[][..], BetaNode::join_keys);
            for (key, batch) in group_tokens(keys, tokens) {
                if retract {
                    self.left_retract(child, key, batch);
                } else {
                    self.left_activate(child, key, batch);
                }
            }
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub(crate) fn left_activate(&mut self, id: NodeId, key: Bindings, tokens: Vec<Token>) {
        let rulebase = self.rulebase;
        let Some(node) = rulebase.beta(id) else {
            return;
        };
        self.notify(|l| l.left_activate(id, &tokens));
        match node {
            // The empty token is constant; roots ignore left activity.
            BetaNode::RootJoin(_) => {}
            BetaNode::Join(n) => self.join_left_activate(n, &key, &tokens),
            BetaNode::Negation(n) => self.negation_left_activate(n, &key, &tokens),
            BetaNode::Test(n) => self.test_left_activate(n, &tokens),
            BetaNode::Accumulate(n) => self.accumulate_left_activate(n, &key, &tokens),
            BetaNode::AccumulateFilter(n) => self.accumfilter_left_activate(n, &key, &tokens),
            BetaNode::Production(n) => self.production_left_activate(n, tokens),
            BetaNode::Query(n) => self.query_left_activate(n, tokens),
        }
    }

    fn left_retract(&mut self, id: NodeId, key: Bindings, tokens: Vec<Token>) {
        let rulebase = self.rulebase;
        let Some(node) = rulebase.beta(id) else {
            return;
        };
        self.notify(|l| l.left_retract(id, &tokens));
        match node {
            BetaNode::RootJoin(_) => {}
            BetaNode::Join(n) => self.join_left_retract(n, &key, &tokens),
            BetaNode::Negation(n) => self.negation_left_retract(n, &key, &tokens),
            BetaNode::Test(n) => self.test_left_retract(n, &tokens),
            BetaNode::Accumulate(n) => self.accumulate_left_retract(n, &key, &tokens),
            BetaNode::AccumulateFilter(n) => self.accumfilter_left_retract(n, &key, &tokens),
            BetaNode::Production(n) => self.production_left_retract(n, &tokens),
            BetaNode::Query(n) => self.query_left_retract(n, tokens),
        }
    }

    fn right_activate(&mut self, id: NodeId, key: Bindings, elements: Vec<Element>) {
        let rulebase = self.rulebase;
        let Some(node) = rulebase.beta(id) else {
            return;
        };
        self.notify(|l| l.right_activate(id, &elements));
        match node {
            BetaNode::RootJoin(n) => self.root_join_right_activate(n, &key, &elements),
            BetaNode::Join(n) => self.join_right_activate(n, &key, &elements),
            BetaNode::Negation(n) => self.negation_right_activate(n, &key, &elements),
            BetaNode::Accumulate(n) => self.accumulate_right_activate(n, &key, &elements),
            BetaNode::AccumulateFilter(n) => self.accumfilter_right_activate(n, &key, &elements),
            // No right input.
            BetaNode::Test(_) | BetaNode::Production(_) | BetaNode::Query(_) => {}
        }
    }

    fn right_retract(&mut self, id: NodeId, key: Bindings, elements: Vec<Element>) {
        let rulebase = self.rulebase;
        let Some(node) = rulebase.beta(id) else {
            return;
        };
        self.notify(|l| l.right_retract(id, &elements));
        match node {
            BetaNode::RootJoin(n) => self.root_join_right_retract(n, &key, &elements),
            BetaNode::Join(n) => self.join_right_retract(n, &key, &elements),
            BetaNode::Negation(n) => self.negation_right_retract(n, &key, &elements),
            BetaNode::Accumulate(n) => self.accumulate_right_retract(n, &key, &elements),
            BetaNode::AccumulateFilter(n) => self.accumfilter_right_retract(n, &key, &elements),
            BetaNode::Test(_) | BetaNode::Production(_) | BetaNode::Query(_) => {}
        }
    }

    // =========================================================================
    // Root-join
    // =========================================================================

    fn root_join_right_activate(&mut self, n: &'a RootJoinNode, key: &Bindings, elements: &[Element]) {
        self.memory.add_elements(n.id, key, elements);
        let tokens: Vec<Token> = elements.iter().map(|e| root_token(n.id, e)).collect();
        self.send_left(&n.children, &tokens, false);
    }

    fn root_join_right_retract(&mut self, n: &'a RootJoinNode, key: &Bindings, elements: &[Element]) {
        let removed = self.memory.remove_elements(n.id, key, elements);
        let tokens: Vec<Token> = removed.iter().map(|e| root_token(n.id, e)).collect();
        self.send_left(&n.children, &tokens, true);
    }

    // =========================================================================
    // Join
    // =========================================================================

    fn join_left_activate(&mut self, n: &'a JoinNode, key: &Bindings, tokens: &[Token]) {
        self.memory.add_tokens(n.id, key, tokens);
        let elements = self.memory.elements(n.id, key);
        let elements: Vec<Element> = elements.into_iter().collect();
        let out = join_product(n.id, tokens, &elements);
        self.send_left(&n.children, &out, false);
    }

    fn join_left_retract(&mut self, n: &'a JoinNode, key: &Bindings, tokens: &[Token]) {
        let removed = self.memory.remove_tokens(n.id, key, tokens);
        let elements = self.memory.elements(n.id, key);
        let elements: Vec<Element> = elements.into_iter().collect();
        let out = join_product(n.id, &removed, &elements);
        self.send_left(&n.children, &out, true);
    }

    fn join_right_activate(&mut self, n: &'a JoinNode, key: &Bindings, elements: &[Element]) {
        self.memory.add_elements(n.id, key, elements);
        let tokens = self.memory.tokens(n.id, key);
        let stored: Vec<Token> = tokens.iter().cloned().collect();
        let out = join_product(n.id, &stored, &elements);
        self.send_left(&n.children, &out, false);
    }

    fn join_right_retract(&mut self, n: &'a JoinNode, key: &Bindings, elements: &[Element]) {
        let removed = self.memory.remove_elements(n.id, key, elements);
        let tokens = self.memory.tokens(n.id, key);
        let stored: Vec<Token> = tokens.iter().cloned().collect();
        let out = join_product(n.id, &stored, &removed);
        self.send_left(&n.children, &out, true);
    }

    // =========================================================================
    // Negation
    // =========================================================================

    fn negation_left_activate(&mut self, n: &'a NegationNode, key: &Bindings, tokens: &[Token]) {
        self.memory.add_tokens(n.id, key, tokens);
        if self.memory.elements(n.id, key).is_empty() {
            let tokens = tokens.to_vec();
            self.send_left(&n.children, &tokens, false);
        }
    }

    fn negation_left_retract(&mut self, n: &'a NegationNode, key: &Bindings, tokens: &[Token]) {
        let removed = self.memory.remove_tokens(n.id, key, tokens);
        if self.memory.elements(n.id, key).is_empty() {
            self.send_left(&n.children, &removed, true);
        }
    }

    fn negation_right_activate(&mut self, n: &'a NegationNode, key: &Bindings, elements: &[Element]) {
        let was_empty = self.memory.elements(n.id, key).is_empty();
        self.memory.add_elements(n.id, key, elements);
        if was_empty {
            // The stored tokens are now negated.
            let tokens: Vec<Token> = self.memory.tokens(n.id, key).iter().cloned().collect();
            self.send_left(&n.children, &tokens, true);
        }
    }

    fn negation_right_retract(&mut self, n: &'a NegationNode, key: &Bindings, elements: &[Element]) {
        let removed = self.memory.remove_elements(n.id, key, elements);
        if !removed.is_empty() && self.memory.elements(n.id, key).is_empty() {
            let tokens: Vec<Token> = self.memory.tokens(n.id, key).iter().cloned().collect();
            self.send_left(&n.children, &tokens, false);
        }
    }

    // =========================================================================
    // Test
    // =========================================================================

    fn test_left_activate(&mut self, n: &'a TestNode, tokens: &[Token]) {
        let passing: Vec<Token> = tokens
            .iter()
            .filter(|token| n.test.predicate.test(None, &token.bindings, &n.env))
            .cloned()
            .collect();
        self.send_left(&n.children, &passing, false);
    }

    fn test_left_retract(&mut self, n: &'a TestNode, tokens: &[Token]) {
        // Forward unconditionally; downstream removal is idempotent to
        // retractions of tokens that never passed the test.
        let tokens = tokens.to_vec();
        self.send_left(&n.children, &tokens, true);
    }

    // =========================================================================
    // Accumulate (pre-reduced)
    // =========================================================================

    fn accumulate_left_activate(&mut self, n: &'a AccumulateNode, key: &Bindings, tokens: &[Token]) {
        self.memory.add_tokens(n.id, key, tokens);
        let groups = self.memory.accum_groups(n.id, key);
        let mut out = Vec::new();
        if groups.is_empty() {
            for token in tokens {
                if token.bindings.binds_all(&n.join_keys) {
                    out.extend(accum_initial_token(n.id, &n.accumulator, n.result, token));
                }
            }
        } else {
            for token in tokens {
                for (group, value) in &groups {
                    out.extend(accum_token(n.id, &n.accumulator, n.result, token, group, value));
                }
            }
        }
        self.send_left(&n.children, &out, false);
    }

    fn accumulate_left_retract(&mut self, n: &'a AccumulateNode, key: &Bindings, tokens: &[Token]) {
        let removed = self.memory.remove_tokens(n.id, key, tokens);
        if removed.is_empty() {
            return;
        }
        let groups = self.memory.accum_groups(n.id, key);
        let mut out = Vec::new();
        if groups.is_empty() {
            for token in &removed {
                if token.bindings.binds_all(&n.join_keys) {
                    out.extend(accum_initial_token(n.id, &n.accumulator, n.result, token));
                }
            }
        } else {
            for token in &removed {
                for (group, value) in &groups {
                    out.extend(accum_token(n.id, &n.accumulator, n.result, token, group, value));
                }
            }
        }
        self.send_left(&n.children, &out, true);
    }

    fn accumulate_right_activate(&mut self, n: &'a AccumulateNode, key: &Bindings, elements: &[Element]) {
        let reduced = pre_reduce(&n.accumulator, elements);
        self.accumulate_right_activate_reduced(n, key, reduced);
    }

    /// Applies batch-reduced (group, value) pairs, combining with any
    /// prior reduction and replacing previously emitted tokens.
    fn accumulate_right_activate_reduced(
        &mut self,
        n: &'a AccumulateNode,
        key: &Bindings,
        reduced: Vec<(Bindings, Value)>,
    ) {
        for (group, value) in reduced {
            let left: Vec<Token> = self.memory.tokens(n.id, key).iter().cloned().collect();
            let old = self.memory.accum_get(n.id, key, &group);
            let mut retracts = Vec::new();
            match &old {
                Some(old_value) => {
                    for token in &left {
                        retracts.extend(accum_token(
                            n.id,
                            &n.accumulator,
                            n.result,
                            token,
                            &group,
                            old_value,
                        ));
                    }
                }
                None => {
                    // The first group displaces any initial-value tokens.
                    if self.memory.accum_groups(n.id, key).is_empty() {
                        for token in &left {
                            if token.bindings.binds_all(&n.join_keys) {
                                retracts.extend(accum_initial_token(
                                    n.id,
                                    &n.accumulator,
                                    n.result,
                                    token,
                                ));
                            }
                        }
                    }
                }
            }
            self.send_left(&n.children, &retracts, true);

            let new_value = match old {
                Some(old_value) => (n.accumulator.combine)(old_value, &value),
                None => value,
            };
            self.memory.accum_set(n.id, key, &group, new_value.clone());
            self.notify(|l| l.add_accum_reduced(n.id, &group, &new_value));

            let mut emits = Vec::new();
            for token in &left {
                emits.extend(accum_token(
                    n.id,
                    &n.accumulator,
                    n.result,
                    token,
                    &group,
                    &new_value,
                ));
            }
            self.send_left(&n.children, &emits, false);
        }
    }

    fn accumulate_right_retract(&mut self, n: &'a AccumulateNode, key: &Bindings, elements: &[Element]) {
        for element in elements {
            let group = element.bindings.clone();
            let Some(old) = self.memory.accum_get(n.id, key, &group) else {
                continue;
            };
            let left: Vec<Token> = self.memory.tokens(n.id, key).iter().cloned().collect();
            let mut retracts = Vec::new();
            for token in &left {
                retracts.extend(accum_token(n.id, &n.accumulator, n.result, token, &group, &old));
            }
            self.send_left(&n.children, &retracts, true);

            let new_value = (n.accumulator.retract)(old, &Value::Fact(element.fact.clone()));
            let mut emits = Vec::new();
            if new_value.is_nil() {
                self.memory.accum_remove(n.id, key, &group);
                if self.memory.accum_groups(n.id, key).is_empty() {
                    for token in &left {
                        if token.bindings.binds_all(&n.join_keys) {
                            emits.extend(accum_initial_token(n.id, &n.accumulator, n.result, token));
                        }
                    }
                }
            } else {
                self.memory.accum_set(n.id, key, &group, new_value.clone());
                self.notify(|l| l.add_accum_reduced(n.id, &group, &new_value));
                for token in &left {
                    emits.extend(accum_token(
                        n.id,
                        &n.accumulator,
                        n.result,
                        token,
                        &group,
                        &new_value,
                    ));
                }
            }
            self.send_left(&n.children, &emits, false);
        }
    }

    // =========================================================================
    // Accumulate with join filter
    // =========================================================================

    fn accumfilter_left_activate(
        &mut self,
        n: &'a AccumulateFilterNode,
        key: &Bindings,
        tokens: &[Token],
    ) {
        self.memory.add_tokens(n.id, key, tokens);
        let groups = self.memory.candidate_groups(n.id, key);
        let mut out = Vec::new();
        for token in tokens {
            for (group, candidates) in &groups {
                out.extend(filtered_token(n, token, group, candidates));
            }
        }
        self.send_left(&n.children, &out, false);
    }

    fn accumfilter_left_retract(
        &mut self,
        n: &'a AccumulateFilterNode,
        key: &Bindings,
        tokens: &[Token],
    ) {
        let removed = self.memory.remove_tokens(n.id, key, tokens);
        if removed.is_empty() {
            return;
        }
        let groups = self.memory.candidate_groups(n.id, key);
        let mut out = Vec::new();
        for token in &removed {
            for (group, candidates) in &groups {
                out.extend(filtered_token(n, token, group, candidates));
            }
        }
        self.send_left(&n.children, &out, true);
    }

    fn accumfilter_right_activate(
        &mut self,
        n: &'a AccumulateFilterNode,
        key: &Bindings,
        elements: &[Element],
    ) {
        for element in elements {
            let group = element.bindings.clone();
            let left: Vec<Token> = self.memory.tokens(n.id, key).iter().cloned().collect();
            let before = self
                .memory
                .candidate_groups(n.id, key)
                .get(&group)
                .cloned()
                .unwrap_or_default();

            let mut retracts = Vec::new();
            for token in &left {
                retracts.extend(filtered_token(n, token, &group, &before));
            }
            self.send_left(&n.children, &retracts, true);

            self.memory.add_candidate(n.id, key, &group, element.fact.clone());
            let after = self
                .memory
                .candidate_groups(n.id, key)
                .get(&group)
                .cloned()
                .unwrap_or_default();

            let mut emits = Vec::new();
            for token in &left {
                emits.extend(filtered_token(n, token, &group, &after));
            }
            self.send_left(&n.children, &emits, false);
        }
    }

    fn accumfilter_right_retract(
        &mut self,
        n: &'a AccumulateFilterNode,
        key: &Bindings,
        elements: &[Element],
    ) {
        for element in elements {
            let group = element.bindings.clone();
            let before = self
                .memory
                .candidate_groups(n.id, key)
                .get(&group)
                .cloned()
                .unwrap_or_default();
            if !before.iter().any(|fact| fact == &element.fact) {
                continue;
            }
            let left: Vec<Token> = self.memory.tokens(n.id, key).iter().cloned().collect();

            let mut retracts = Vec::new();
            for token in &left {
                retracts.extend(filtered_token(n, token, &group, &before));
            }
            self.send_left(&n.children, &retracts, true);

            self.memory.remove_candidate(n.id, key, &group, &element.fact);
            let after = self
                .memory
                .candidate_groups(n.id, key)
                .get(&group)
                .cloned()
                .unwrap_or_default();

            let mut emits = Vec::new();
            for token in &left {
                emits.extend(filtered_token(n, token, &group, &after));
            }
            self.send_left(&n.children, &emits, false);
        }
    }

    // =========================================================================
    // Production
    // =========================================================================

    fn production_left_activate(&mut self, n: &'a ProductionNode, tokens: Vec<Token>) {
        self.memory.add_production_tokens(n.id, &tokens);
        // A no-loop rule does not re-activate itself through facts it
        // inserted while firing.
        if n.rule.properties.no_loop && self.current_production == Some(n.id) {
            return;
        }
        let eligible: Vec<Token> = tokens
            .into_iter()
            .filter(|token| !self.memory.is_fired(n.id, token))
            .collect();
        if eligible.is_empty() {
            return;
        }
        let group = (self.group_fn)(&n.rule.properties);
        let cmp = self.group_cmp.clone();
        for token in &eligible {
            self.memory.queue_mut().push(
                group.clone(),
                Activation {
                    node: n.id,
                    token: token.clone(),
                },
                &*cmp,
            );
        }
        self.notify(|l| l.add_activations(n.id, &eligible));
    }

    fn production_left_retract(&mut self, n: &'a ProductionNode, tokens: &[Token]) {
        let removed = self.memory.remove_production_tokens(n.id, tokens);
        if removed.is_empty() {
            return;
        }
        let removed_pending = self.memory.queue_mut().remove(n.id, &removed);
        if !removed_pending.is_empty() {
            let pending_tokens: Vec<Token> =
                removed_pending.into_iter().map(|a| a.token).collect();
            self.notify(|l| l.remove_activations(n.id, &pending_tokens));
        }
        // Truth maintenance: retracting the producing token retracts the
        // facts its firing logically inserted, recursively.
        for token in &removed {
            self.memory.unmark_fired(n.id, token);
            let supported = self.memory.take_support(n.id, token);
            if !supported.is_empty() {
                self.retract_facts(&supported);
            }
        }
    }

    // =========================================================================
    // Query
    // =========================================================================

    fn query_left_activate(&mut self, n: &'a QueryNode, tokens: Vec<Token>) {
        for token in tokens {
            let key = token.bindings.project(&n.params);
            self.memory.add_tokens(n.id, &key, &[token]);
        }
    }

    fn query_left_retract(&mut self, n: &'a QueryNode, tokens: Vec<Token>) {
        for token in tokens {
            let key = token.bindings.project(&n.params);
            self.memory.remove_tokens(n.id, &key, &[token]);
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn match_elements(alpha: &AlphaNode, facts: &[Arc<Fact>]) -> Vec<Element> {
    facts
        .iter()
        .filter_map(|fact| {
            alpha
                .condition
                .match_fact(fact, &alpha.env)
                .map(|bindings| Element::new(fact.clone(), bindings))
        })
        .collect()
}

fn root_token(node: NodeId, element: &Element) -> Token {
    Token::empty().extend(
        Value::Fact(element.fact.clone()),
        node,
        element.bindings.clone(),
    )
}

fn group_elements(keys: &[SymbolId], elements: &[Element]) -> Vec<(Bindings, Vec<Element>)> {
    let mut grouped: Vec<(Bindings, Vec<Element>)> = Vec::new();
    for element in elements {
        let key = element.bindings.project(keys);
        match grouped.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, batch)) => batch.push(element.clone()),
            None => grouped.push((key, vec![element.clone()])),
        }
    }
    grouped
}

fn group_tokens(keys: &[SymbolId], tokens: &[Token]) -> Vec<(Bindings, Vec<Token>)> {
    let mut grouped: Vec<(Bindings, Vec<Token>)> = Vec::new();
    for token in tokens {
        let key = token.bindings.project(keys);
        match grouped.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, batch)) => batch.push(token.clone()),
            None => grouped.push((key, vec![token.clone()])),
        }
    }
    grouped
}

/// Cartesian product of tokens and elements under one join key,
/// restricted to consistent bindings.
fn join_product(node: NodeId, tokens: &[Token], elements: &[Element]) -> Vec<Token> {
    let mut out = Vec::new();
    for token in tokens {
        for element in elements {
            if let Some(bindings) = token.bindings.merge_consistent(&element.bindings) {
                out.push(token.extend(Value::Fact(element.fact.clone()), node, bindings));
            }
        }
    }
    out
}

/// Reduces a batch of elements to one value per fact-binding group,
/// independent of tokens, so `combine` stays associative across batches.
fn pre_reduce(accumulator: &AccumulatorDef, elements: &[Element]) -> Vec<(Bindings, Value)> {
    let mut groups: Vec<(Bindings, Value)> = Vec::new();
    for element in elements {
        let candidate = Value::Fact(element.fact.clone());
        match groups
            .iter_mut()
            .find(|(group, _)| *group == element.bindings)
        {
            Some((_, value)) => {
                let previous = std::mem::replace(value, Value::Nil);
                *value = (accumulator.reduce)(previous, &candidate);
            }
            None => {
                let start = accumulator.initial.clone().unwrap_or(Value::Nil);
                groups.push((
                    element.bindings.clone(),
                    (accumulator.reduce)(start, &candidate),
                ));
            }
        }
    }
    groups
}

/// The downstream token for a reduced group value.
fn accum_token(
    node: NodeId,
    accumulator: &AccumulatorDef,
    result: Option<SymbolId>,
    token: &Token,
    group: &Bindings,
    value: &Value,
) -> Option<Token> {
    let converted = (accumulator.convert)(value.clone());
    let mut bindings = token.bindings.merge_consistent(group)?;
    if let Some(var) = result {
        bindings = bindings.bind(var, converted.clone());
    }
    Some(token.extend(converted, node, bindings))
}

/// The downstream token carrying the converted initial value, emitted
/// when no facts match.
fn accum_initial_token(
    node: NodeId,
    accumulator: &AccumulatorDef,
    result: Option<SymbolId>,
    token: &Token,
) -> Option<Token> {
    let initial = accumulator.initial.clone()?;
    let converted = (accumulator.convert)(initial);
    let mut bindings = token.bindings.clone();
    if let Some(var) = result {
        bindings = bindings.bind(var, converted.clone());
    }
    Some(token.extend(converted, node, bindings))
}

/// Accumulates a group's candidates under a token-dependent filter.
///
/// Returns the downstream token, or `None` when the converted value is
/// nil or the bindings cannot merge.
fn filtered_token(
    node: &AccumulateFilterNode,
    token: &Token,
    group: &Bindings,
    candidates: &im::Vector<Arc<Fact>>,
) -> Option<Token> {
    let merged = token.bindings.merge_consistent(group)?;
    let mut acc = node.accumulator.initial.clone().unwrap_or(Value::Nil);
    for fact in candidates {
        if node.join_filter.test(Some(fact), &merged, &node.env) {
            acc = (node.accumulator.reduce)(acc, &Value::Fact(fact.clone()));
        }
    }
    let converted = (node.accumulator.convert)(acc);
    if converted.is_nil() {
        return None;
    }
    let mut bindings = merged;
    if let Some(var) = node.result {
        bindings = bindings.bind(var, converted.clone());
    }
    Some(token.extend(converted, node.id, bindings))
}
