//! Sessions: the public face of the engine.
//!
//! A session is an immutable handle over the rulebase and a
//! working-memory snapshot. Each mutating call thaws the snapshot into
//! its transient form, applies the change, freezes it back, and returns
//! a new session; callers may keep and reuse any prior handle.

use std::cmp::Ordering;
use std::sync::Arc;

use millrace_foundation::{Bindings, Error, Fact, NodeId, Result, Token, Value};
use millrace_memory::{EventListener, PersistentMemory, SessionListener};
use millrace_network::{
    BetaNode, QueryHandle, RhsCommand, RhsContext, RuleProperties, Rulebase,
};

use crate::nodes::Engine;
use crate::routing::{AncestorsFn, FactTypeFn, Routing};

/// Maps rule properties to an activation group value.
pub type ActivationGroupFn = Arc<dyn Fn(&RuleProperties) -> Value + Send + Sync>;

/// Orders activation group values, best first.
pub type ActivationGroupSortFn = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Options supplied at session construction.
#[derive(Clone)]
pub struct SessionOptions {
    /// Maps a fact to its type tag. Default: the fact's own type.
    pub fact_type_fn: FactTypeFn,
    /// Maps a type tag to its ordered ancestors. Default: none.
    pub ancestors_fn: AncestorsFn,
    /// Maps rule properties to a group value. Default: the salience.
    pub activation_group_fn: ActivationGroupFn,
    /// Orders group values. Default: numeric, greater first.
    pub activation_group_sort_fn: ActivationGroupSortFn,
    /// Listeners observing network events.
    pub listeners: Vec<Arc<dyn SessionListener>>,
    /// Disables route memoization when false.
    pub cache: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fact_type_fn: Arc::new(Fact::fact_type),
            ancestors_fn: Arc::new(|_| Vec::new()),
            activation_group_fn: Arc::new(|props| Value::Int(props.salience)),
            activation_group_sort_fn: Arc::new(|a, b| a.compare(b).unwrap_or(Ordering::Equal)),
            listeners: Vec::new(),
            cache: true,
        }
    }
}

impl SessionOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fact-type function.
    #[must_use]
    pub fn with_fact_type_fn(mut self, f: FactTypeFn) -> Self {
        self.fact_type_fn = f;
        self
    }

    /// Sets the ancestors function.
    #[must_use]
    pub fn with_ancestors_fn(mut self, f: AncestorsFn) -> Self {
        self.ancestors_fn = f;
        self
    }

    /// Sets the activation-group function.
    #[must_use]
    pub fn with_activation_group_fn(mut self, f: ActivationGroupFn) -> Self {
        self.activation_group_fn = f;
        self
    }

    /// Sets the activation-group comparator.
    #[must_use]
    pub fn with_activation_group_sort_fn(mut self, f: ActivationGroupSortFn) -> Self {
        self.activation_group_sort_fn = f;
        self
    }

    /// Adds a listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Enables or disables route memoization.
    #[must_use]
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

/// Reference to a query, by handle or fully qualified name.
#[derive(Clone, Copy, Debug)]
pub enum QueryRef<'a> {
    /// The query's fully qualified name.
    Name(&'a str),
    /// The handle returned at build time.
    Handle(QueryHandle),
}

impl<'a> From<&'a str> for QueryRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl From<QueryHandle> for QueryRef<'_> {
    fn from(handle: QueryHandle) -> Self {
        Self::Handle(handle)
    }
}

/// Introspection view over a session's parts.
pub struct SessionComponents<'a> {
    /// The compiled network.
    pub rulebase: &'a Rulebase,
    /// The working-memory snapshot.
    pub memory: &'a PersistentMemory,
    /// The session's listeners.
    pub listeners: &'a [Arc<dyn SessionListener>],
    /// The fact-routing layer.
    pub routing: &'a Routing,
}

/// An immutable rule session.
///
/// Clone is O(1); every mutating operation returns a new session and
/// leaves this one untouched.
#[derive(Clone)]
pub struct Session {
    rulebase: Arc<Rulebase>,
    memory: PersistentMemory,
    listeners: Vec<Arc<dyn SessionListener>>,
    routing: Arc<Routing>,
    group_fn: ActivationGroupFn,
    group_cmp: ActivationGroupSortFn,
}

impl Session {
    /// Creates a session over a rulebase, seeding the beta roots with
    /// the empty token.
    #[must_use]
    pub fn new(rulebase: Rulebase, options: SessionOptions) -> Self {
        let routing = Arc::new(Routing::new(
            options.fact_type_fn.clone(),
            options.ancestors_fn.clone(),
            options.cache,
        ));
        let session = Self {
            rulebase: Arc::new(rulebase),
            memory: PersistentMemory::new(),
            listeners: options.listeners,
            routing,
            group_fn: options.activation_group_fn,
            group_cmp: options.activation_group_sort_fn,
        };
        let mut engine = session.thaw();
        engine.seed_roots();
        session.freeze(engine)
    }

    fn thaw(&self) -> Engine<'_> {
        let listeners: Vec<Box<dyn EventListener>> = self
            .listeners
            .iter()
            .map(|listener| listener.to_transient())
            .collect();
        Engine::new(
            &self.rulebase,
            &self.routing,
            self.memory.clone().to_transient(),
            listeners,
            self.group_fn.clone(),
            self.group_cmp.clone(),
        )
    }

    fn freeze(&self, engine: Engine<'_>) -> Session {
        let (memory, listeners) = engine.into_parts();
        Session {
            rulebase: self.rulebase.clone(),
            memory: memory.to_persistent(),
            listeners: listeners
                .into_iter()
                .map(|listener| listener.to_persistent())
                .collect(),
            routing: self.routing.clone(),
            group_fn: self.group_fn.clone(),
            group_cmp: self.group_cmp.clone(),
        }
    }

    /// Inserts facts, alpha-activating the network.
    #[must_use]
    pub fn insert(&self, facts: impl IntoIterator<Item = Fact>) -> Session {
        let facts: Vec<Arc<Fact>> = facts.into_iter().map(Arc::new).collect();
        let mut engine = self.thaw();
        engine.insert_facts(&facts, None);
        self.freeze(engine)
    }

    /// Retracts one instance of each fact equal to an argument.
    ///
    /// Retracting a fact that is not present is a no-op.
    #[must_use]
    pub fn retract(&self, facts: impl IntoIterator<Item = Fact>) -> Session {
        let facts: Vec<Arc<Fact>> = facts.into_iter().map(Arc::new).collect();
        let mut engine = self.thaw();
        engine.retract_facts(&facts);
        self.freeze(engine)
    }

    /// Fires pending activations until quiescence (see the firing-loop
    /// ordering guarantees) and returns the resulting session.
    ///
    /// # Errors
    ///
    /// Propagates right-hand-side failures wrapped with the rule and
    /// token; the session state after such an error is unspecified and
    /// the handle should be discarded.
    pub fn fire_rules(&self) -> Result<Session> {
        let mut engine = self.thaw();
        fire_loop(&mut engine, &self.rulebase)?;
        Ok(self.freeze(engine))
    }

    /// Runs a query with the given parameter values, returning the
    /// bindings of every stored token whose parameters match.
    ///
    /// Internally-generated variables are stripped from the results.
    ///
    /// # Errors
    ///
    /// Returns invalid-query when the query is unknown or a declared
    /// parameter is missing from `params`.
    pub fn query<'q>(
        &self,
        query: impl Into<QueryRef<'q>>,
        params: &Bindings,
    ) -> Result<Vec<Bindings>> {
        let interner = self.rulebase.interner();
        let nodes: Vec<NodeId> = match query.into() {
            QueryRef::Name(name) => self
                .rulebase
                .query_nodes_by_name(name)
                .ok_or_else(|| Error::invalid_query(name))?
                .to_vec(),
            QueryRef::Handle(handle) => {
                let nodes = self.rulebase.query_nodes(handle.name());
                if nodes.is_empty() {
                    let name = interner.keyword_name(handle.name()).unwrap_or("<unknown>");
                    return Err(Error::invalid_query(name));
                }
                nodes.to_vec()
            }
        };

        let mut results = Vec::new();
        for id in nodes {
            let Some(BetaNode::Query(node)) = self.rulebase.beta(id) else {
                continue;
            };
            for param in &node.params {
                if !params.contains(*param) {
                    let name = interner.symbol_name(*param).unwrap_or("<unknown>");
                    return Err(Error::invalid_query(format!(
                        "{}: missing parameter {name}",
                        interner.keyword_name(node.name).unwrap_or("<unknown>"),
                    )));
                }
            }
            let key = params.project(&node.params);
            for token in self.memory.tokens(id, &key) {
                results.push(token.bindings.retain_named(interner));
            }
        }
        Ok(results)
    }

    /// Introspection over the session's parts.
    #[must_use]
    pub fn components(&self) -> SessionComponents<'_> {
        SessionComponents {
            rulebase: &self.rulebase,
            memory: &self.memory,
            listeners: &self.listeners,
            routing: &self.routing,
        }
    }

    /// Number of activations awaiting `fire_rules`.
    #[must_use]
    pub fn pending_activations(&self) -> usize {
        self.memory.pending_activations()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.rulebase.node_count())
            .field("pending_activations", &self.memory.pending_activations())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Firing loop
// =============================================================================

enum PendingUpdate {
    Logical {
        node: NodeId,
        token: Token,
        facts: Vec<Arc<Fact>>,
    },
    Unconditional {
        facts: Vec<Arc<Fact>>,
    },
    Retract {
        facts: Vec<Arc<Fact>>,
    },
}

/// Drains the activation queue by descending group order.
///
/// Pending right-hand-side facts are flushed at group boundaries,
/// immediately after a no-loop rule fires, and when the queue drains;
/// the post-empty flush is re-checked until a flush yields no new
/// activations.
fn fire_loop(engine: &mut Engine<'_>, rulebase: &Rulebase) -> Result<()> {
    let mut pending: Vec<PendingUpdate> = Vec::new();
    let mut current_group: Option<Value> = None;
    loop {
        if !pending.is_empty() {
            let boundary = match (engine.memory.queue().peek_group(), &current_group) {
                (None, _) => true,
                (Some(next), Some(current)) => next != current,
                (Some(_), None) => false,
            };
            if boundary {
                flush(engine, &mut pending);
                current_group = None;
                continue;
            }
        }
        let Some((group, activation)) = engine.memory.queue_mut().pop() else {
            break;
        };
        current_group = Some(group);
        fire_activation(engine, rulebase, activation.node, activation.token, &mut pending)?;
    }
    Ok(())
}

fn fire_activation(
    engine: &mut Engine<'_>,
    rulebase: &Rulebase,
    node_id: NodeId,
    token: Token,
    pending: &mut Vec<PendingUpdate>,
) -> Result<()> {
    let Some(BetaNode::Production(node)) = rulebase.beta(node_id) else {
        return Ok(());
    };
    // A value-identical token fires at most once until retracted.
    if engine.memory.is_fired(node.id, &token) {
        return Ok(());
    }
    engine.memory.mark_fired(node.id, &token);

    let mut ctx = RhsContext::new(&token);
    (node.rule.action)(&mut ctx, &token.bindings).map_err(|err| {
        let rule = rulebase
            .interner()
            .keyword_name(node.rule.name)
            .unwrap_or("<unnamed>");
        Error::rhs(rule, format!("{:?}", token.matches), format!("{err}"))
    })?;

    for command in ctx.into_commands() {
        pending.push(match command {
            RhsCommand::Insert(facts) => PendingUpdate::Logical {
                node: node.id,
                token: token.clone(),
                facts: facts.into_iter().map(Arc::new).collect(),
            },
            RhsCommand::InsertUnconditional(facts) => PendingUpdate::Unconditional {
                facts: facts.into_iter().map(Arc::new).collect(),
            },
            RhsCommand::Retract(facts) => PendingUpdate::Retract {
                facts: facts.into_iter().map(Arc::new).collect(),
            },
        });
    }

    if node.rule.properties.no_loop {
        // Flush while the firing context is visible so the production
        // skips re-activating itself.
        engine.current_production = Some(node.id);
        flush(engine, pending);
        engine.current_production = None;
    }
    Ok(())
}

fn flush(engine: &mut Engine<'_>, pending: &mut Vec<PendingUpdate>) {
    for update in pending.drain(..) {
        match update {
            PendingUpdate::Logical { node, token, facts } => {
                engine.insert_facts(&facts, Some((node, &token)));
            }
            PendingUpdate::Unconditional { facts } => engine.insert_facts(&facts, None),
            PendingUpdate::Retract { facts } => engine.retract_facts(&facts),
        }
    }
}
