//! Condition AST and accumulator descriptors.
//!
//! A rule or query left-hand side is a boolean composition of leaf
//! conditions: fact conditions, negations, tests, and accumulators.
//! Composition is normalized away before network construction (see
//! [`crate::dnf`]).

use std::fmt;
use std::sync::Arc;

use millrace_foundation::{Bindings, Fact, KeywordId, SymbolId, Value};

use crate::expr::Expr;

/// A single-fact condition: a type tag plus constraints.
///
/// Constraints are evaluated in order against the candidate fact with
/// the bindings accumulated so far within this condition. An equality
/// constraint with an unbound variable on one side introduces a
/// binding; all other constraints are boolean tests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FactCondition {
    /// The fact type this condition matches (including subtypes via the
    /// session's ancestors function).
    pub fact_type: KeywordId,
    /// Constraint expressions, evaluated in order.
    pub constraints: Vec<Expr>,
}

impl FactCondition {
    /// Creates a condition on a fact type with no constraints.
    #[must_use]
    pub fn new(fact_type: KeywordId) -> Self {
        Self {
            fact_type,
            constraints: Vec::new(),
        }
    }

    /// Adds a constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Expr) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Evaluates the condition against one fact.
    ///
    /// Returns the bindings this condition extracts when every
    /// constraint holds, or `None` when any fails.
    #[must_use]
    pub fn match_fact(&self, fact: &Fact, env: &Bindings) -> Option<Bindings> {
        let mut local = Bindings::new();
        for constraint in &self.constraints {
            if let Some((var, source)) = constraint.binding_target() {
                if !local.contains(var) && env.get(var).is_none() {
                    // Unbound target: this constraint introduces the binding.
                    let value = source.eval(Some(fact), &local, env)?;
                    local = local.bind(var, value);
                    continue;
                }
            }
            if !constraint.test(Some(fact), &local, env) {
                return None;
            }
        }
        Some(local)
    }

    /// Variables this condition introduces.
    #[must_use]
    pub fn bound_variables(&self) -> Vec<SymbolId> {
        let mut bound = Vec::new();
        for constraint in &self.constraints {
            if let Some((var, _)) = constraint.binding_target() {
                if !bound.contains(&var) {
                    bound.push(var);
                }
            }
        }
        bound
    }

    /// Every variable the condition's constraints mention.
    #[must_use]
    pub fn referenced_variables(&self) -> Vec<SymbolId> {
        let mut vars = Vec::new();
        for constraint in &self.constraints {
            constraint.variables(&mut vars);
        }
        vars
    }
}

/// A pure predicate over the current bindings; matches no fact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestCondition {
    /// The predicate expression (no field accesses).
    pub predicate: Expr,
}

/// Signature of accumulator reduce and combine functions.
///
/// `reduce` receives the accumulated value and a candidate (wrapped as
/// [`Value::Fact`]); `combine` receives two accumulated values. Sharing
/// the signature lets `combine` default to `reduce`.
pub type AccumStepFn = dyn Fn(Value, &Value) -> Value + Send + Sync;

/// Signature of the accumulator conversion function.
pub type AccumConvertFn = dyn Fn(Value) -> Value + Send + Sync;

/// An accumulator descriptor: how to fold matching facts into a value.
///
/// Defaults mirror common usage: `combine` defaults to `reduce`,
/// `retract` defaults to a no-op returning the accumulated value (only
/// safe for accumulators that are insensitive to retraction), and
/// `convert` defaults to identity.
#[derive(Clone)]
pub struct AccumulatorDef {
    /// Starting value for a fold; also emitted downstream when no facts
    /// match and every join variable is already bound.
    pub initial: Option<Value>,
    /// Folds one candidate into the accumulated value.
    pub reduce: Arc<AccumStepFn>,
    /// Merges two accumulated values (associative across batches).
    pub combine: Arc<AccumStepFn>,
    /// Removes one candidate from the accumulated value.
    pub retract: Arc<AccumStepFn>,
    /// Converts the accumulated value to the result carried downstream.
    pub convert: Arc<AccumConvertFn>,
}

impl AccumulatorDef {
    /// Creates a descriptor from a reduce function, applying defaults.
    #[must_use]
    pub fn new(reduce: impl Fn(Value, &Value) -> Value + Send + Sync + 'static) -> Self {
        let reduce: Arc<AccumStepFn> = Arc::new(reduce);
        Self {
            initial: None,
            combine: reduce.clone(),
            retract: Arc::new(|acc, _| acc),
            convert: Arc::new(|acc| acc),
            reduce,
        }
    }

    /// Sets the initial value.
    #[must_use]
    pub fn with_initial(mut self, initial: Value) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Sets the combine function.
    #[must_use]
    pub fn with_combine(
        mut self,
        combine: impl Fn(Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.combine = Arc::new(combine);
        self
    }

    /// Sets the retract function.
    #[must_use]
    pub fn with_retract(
        mut self,
        retract: impl Fn(Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.retract = Arc::new(retract);
        self
    }

    /// Sets the conversion function.
    #[must_use]
    pub fn with_convert(mut self, convert: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.convert = Arc::new(convert);
        self
    }
}

impl fmt::Debug for AccumulatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorDef")
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

/// An accumulator condition: fold facts matching `from` into a value.
#[derive(Clone, Debug)]
pub struct AccumulateCondition {
    /// The fold descriptor.
    pub accumulator: AccumulatorDef,
    /// The inner condition selecting candidate facts.
    pub from: FactCondition,
    /// Variable bound to the converted result, if any.
    pub result: Option<SymbolId>,
    /// Optional filter over (token bindings, candidate fact). When set
    /// the accumulation depends on the joining token and cannot be
    /// pre-reduced.
    pub join_filter: Option<Expr>,
}

impl AccumulateCondition {
    /// Creates an accumulator condition.
    #[must_use]
    pub fn new(accumulator: AccumulatorDef, from: FactCondition) -> Self {
        Self {
            accumulator,
            from,
            result: None,
            join_filter: None,
        }
    }

    /// Binds the converted result to a variable.
    #[must_use]
    pub fn with_result(mut self, var: SymbolId) -> Self {
        self.result = Some(var);
        self
    }

    /// Sets a join filter evaluated per (token, candidate fact).
    #[must_use]
    pub fn with_join_filter(mut self, filter: Expr) -> Self {
        self.join_filter = Some(filter);
        self
    }
}

/// A left-hand-side condition tree.
#[derive(Clone, Debug)]
pub enum Condition {
    /// Match one fact.
    Fact(FactCondition),
    /// A pure predicate over bindings.
    Test(TestCondition),
    /// Fold matching facts into a value.
    Accumulate(AccumulateCondition),
    /// All children must match.
    And(Vec<Condition>),
    /// At least one child must match.
    Or(Vec<Condition>),
    /// The child must have no matches.
    Not(Box<Condition>),
}

impl Condition {
    /// Wraps a condition in a negation.
    #[must_use]
    pub fn negate(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }
}
