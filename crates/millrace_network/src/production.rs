//! Rule and query definitions.
//!
//! These are the inputs to network construction: a rule is a condition
//! tree plus a right-hand-side action and properties; a query is a
//! condition tree plus declared parameter names. Right-hand sides
//! communicate with the engine through an explicit [`RhsContext`]
//! rather than ambient state.

use std::fmt;
use std::sync::Arc;

use millrace_foundation::{Bindings, Fact, KeywordId, Result, SymbolId, Token, Value};

use crate::condition::Condition;

/// Properties attached to a rule.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleProperties {
    /// Priority; higher fires first under the default grouping.
    pub salience: i64,
    /// Prevents the rule from triggering itself through facts it
    /// inserted while it is firing.
    pub no_loop: bool,
    /// Explicit activation group, consulted by custom group functions.
    pub group: Option<Value>,
}

impl Default for RuleProperties {
    fn default() -> Self {
        Self {
            salience: 0,
            no_loop: false,
            group: None,
        }
    }
}

/// A command buffered by a right-hand side.
#[derive(Clone, Debug)]
pub enum RhsCommand {
    /// Logical insertion, supported by the firing token.
    Insert(Vec<Fact>),
    /// Insertion that persists regardless of the firing token.
    InsertUnconditional(Vec<Fact>),
    /// Immediate, non-truth-maintained retraction.
    Retract(Vec<Fact>),
}

/// The context passed to a firing right-hand side.
///
/// Insertions and retractions are buffered as commands; the engine
/// flushes them to the alpha network at the scheduling points of the
/// firing loop.
pub struct RhsContext<'a> {
    token: &'a Token,
    commands: Vec<RhsCommand>,
}

impl<'a> RhsContext<'a> {
    /// Creates a context for one firing.
    #[must_use]
    pub fn new(token: &'a Token) -> Self {
        Self {
            token,
            commands: Vec::new(),
        }
    }

    /// The token that satisfied the rule's left-hand side.
    #[must_use]
    pub fn token(&self) -> &Token {
        self.token
    }

    /// Logically inserts a fact, supported by the firing token.
    pub fn insert(&mut self, fact: Fact) {
        self.commands.push(RhsCommand::Insert(vec![fact]));
    }

    /// Logically inserts every fact in the sequence.
    pub fn insert_all(&mut self, facts: impl IntoIterator<Item = Fact>) {
        self.commands
            .push(RhsCommand::Insert(facts.into_iter().collect()));
    }

    /// Inserts a fact that persists regardless of the firing token.
    pub fn insert_unconditional(&mut self, fact: Fact) {
        self.commands.push(RhsCommand::InsertUnconditional(vec![fact]));
    }

    /// Unconditionally inserts every fact in the sequence.
    pub fn insert_all_unconditional(&mut self, facts: impl IntoIterator<Item = Fact>) {
        self.commands
            .push(RhsCommand::InsertUnconditional(facts.into_iter().collect()));
    }

    /// Retracts a fact. Not truth-maintained.
    pub fn retract(&mut self, fact: Fact) {
        self.commands.push(RhsCommand::Retract(vec![fact]));
    }

    /// Consumes the context, yielding the buffered commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<RhsCommand> {
        self.commands
    }
}

/// Signature of a rule's right-hand-side action.
pub type RhsAction = Arc<dyn Fn(&mut RhsContext<'_>, &Bindings) -> Result<()> + Send + Sync>;

/// A rule definition: left-hand side, action, properties.
#[derive(Clone)]
pub struct RuleDef {
    /// The rule's fully qualified name.
    pub name: KeywordId,
    /// The condition tree.
    pub lhs: Condition,
    /// The action run when the rule fires. Missing actions are an
    /// invalid-rule error at network construction.
    pub action: Option<RhsAction>,
    /// Salience, no-loop, group.
    pub properties: RuleProperties,
    /// External values visible to this rule's conditions.
    pub env: Bindings,
}

impl fmt::Debug for RuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDef")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// A lightweight handle identifying a registered query.
///
/// Returned by the network builder; usable anywhere the query's fully
/// qualified name is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle {
    name: KeywordId,
}

impl QueryHandle {
    /// Creates a handle from a query name.
    #[must_use]
    pub const fn new(name: KeywordId) -> Self {
        Self { name }
    }

    /// The query's interned name.
    #[must_use]
    pub const fn name(self) -> KeywordId {
        self.name
    }
}

/// A query definition: left-hand side plus declared parameters.
#[derive(Clone, Debug)]
pub struct QueryDef {
    /// The query's fully qualified name.
    pub name: KeywordId,
    /// The condition tree.
    pub lhs: Condition,
    /// Parameter variables callers supply values for.
    pub params: Vec<SymbolId>,
    /// External values visible to this query's conditions.
    pub env: Bindings,
}

/// A production fed to the network builder.
#[derive(Clone, Debug)]
pub enum Production {
    /// A rule with a right-hand side.
    Rule(RuleDef),
    /// A query with declared parameters.
    Query(QueryDef),
}

impl Production {
    /// The production's name.
    #[must_use]
    pub fn name(&self) -> KeywordId {
        match self {
            Self::Rule(rule) => rule.name,
            Self::Query(query) => query.name,
        }
    }
}

/// Builder for rule definitions.
pub struct RuleBuilder {
    name: KeywordId,
    conditions: Vec<Condition>,
    action: Option<RhsAction>,
    properties: RuleProperties,
    env: Bindings,
}

impl RuleBuilder {
    /// Starts a rule with the given name.
    #[must_use]
    pub fn new(name: KeywordId) -> Self {
        Self {
            name,
            conditions: Vec::new(),
            action: None,
            properties: RuleProperties::default(),
            env: Bindings::new(),
        }
    }

    /// Appends a condition; multiple conditions are conjoined.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the right-hand-side action.
    #[must_use]
    pub fn then(
        mut self,
        action: impl Fn(&mut RhsContext<'_>, &Bindings) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    /// Sets the salience.
    #[must_use]
    pub fn with_salience(mut self, salience: i64) -> Self {
        self.properties.salience = salience;
        self
    }

    /// Sets the no-loop flag.
    #[must_use]
    pub fn with_no_loop(mut self, no_loop: bool) -> Self {
        self.properties.no_loop = no_loop;
        self
    }

    /// Sets the activation group value.
    #[must_use]
    pub fn with_group(mut self, group: Value) -> Self {
        self.properties.group = Some(group);
        self
    }

    /// Binds an external value visible to the rule's conditions.
    #[must_use]
    pub fn with_env(mut self, var: SymbolId, value: Value) -> Self {
        self.env = self.env.bind(var, value);
        self
    }

    /// Finishes the definition.
    #[must_use]
    pub fn build(self) -> RuleDef {
        RuleDef {
            name: self.name,
            lhs: conjoin(self.conditions),
            action: self.action,
            properties: self.properties,
            env: self.env,
        }
    }
}

/// Builder for query definitions.
pub struct QueryBuilder {
    name: KeywordId,
    conditions: Vec<Condition>,
    params: Vec<SymbolId>,
    env: Bindings,
}

impl QueryBuilder {
    /// Starts a query with the given name.
    #[must_use]
    pub fn new(name: KeywordId) -> Self {
        Self {
            name,
            conditions: Vec::new(),
            params: Vec::new(),
            env: Bindings::new(),
        }
    }

    /// Appends a condition; multiple conditions are conjoined.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Declares a parameter callers supply a value for.
    #[must_use]
    pub fn with_param(mut self, param: SymbolId) -> Self {
        self.params.push(param);
        self
    }

    /// Binds an external value visible to the query's conditions.
    #[must_use]
    pub fn with_env(mut self, var: SymbolId, value: Value) -> Self {
        self.env = self.env.bind(var, value);
        self
    }

    /// Finishes the definition.
    #[must_use]
    pub fn build(self) -> QueryDef {
        QueryDef {
            name: self.name,
            lhs: conjoin(self.conditions),
            params: self.params,
            env: self.env,
        }
    }
}

fn conjoin(mut conditions: Vec<Condition>) -> Condition {
    if conditions.len() == 1 {
        conditions.pop().expect("len checked")
    } else {
        Condition::And(conditions)
    }
}
