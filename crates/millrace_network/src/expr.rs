//! Constraint expressions.
//!
//! A constraint is a small evaluable expression over a candidate fact
//! and the current bindings. Equality constraints with an unbound
//! variable on one side introduce bindings; everything else is a
//! boolean test.

use std::cmp::Ordering;

use millrace_foundation::{Bindings, Fact, SymbolId, Value};

/// Comparison operators usable in constraints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// Structural equality.
    Eq,
    /// Structural inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CmpOp {
    fn check(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Lt, Some(Ordering::Less))
            | (Self::Gt, Some(Ordering::Greater))
            | (Self::Le, Some(Ordering::Less | Ordering::Equal))
            | (Self::Ge, Some(Ordering::Greater | Ordering::Equal)) => true,
            _ => false,
        }
    }
}

/// An evaluable constraint expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    /// A literal value.
    Lit(Value),
    /// A variable reference, resolved from bindings then env.
    Var(SymbolId),
    /// A field access on the candidate fact.
    Field(millrace_foundation::KeywordId),
    /// A comparison between two sub-expressions.
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// All sub-expressions must hold.
    All(Vec<Expr>),
    /// At least one sub-expression must hold.
    Any(Vec<Expr>),
    /// The sub-expression must not hold.
    Not(Box<Expr>),
}

impl Expr {
    /// Shorthand for an equality comparison.
    #[must_use]
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::Cmp(CmpOp::Eq, Box::new(lhs), Box::new(rhs))
    }

    /// Shorthand for a comparison.
    #[must_use]
    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Cmp(op, Box::new(lhs), Box::new(rhs))
    }

    /// Evaluates the expression to a value.
    ///
    /// Returns `None` when a referenced variable is unbound or a field
    /// is absent; a constraint that cannot be evaluated does not match.
    #[must_use]
    pub fn eval(&self, fact: Option<&Fact>, bindings: &Bindings, env: &Bindings) -> Option<Value> {
        match self {
            Self::Lit(value) => Some(value.clone()),
            Self::Var(var) => bindings
                .get(*var)
                .or_else(|| env.get(*var))
                .cloned(),
            Self::Field(field) => fact.and_then(|f| f.get(*field)).cloned(),
            Self::Cmp(op, lhs, rhs) => {
                let lhs = lhs.eval(fact, bindings, env)?;
                let rhs = rhs.eval(fact, bindings, env)?;
                let holds = match op {
                    CmpOp::Eq => lhs == rhs,
                    CmpOp::Ne => lhs != rhs,
                    _ => op.check(lhs.compare(&rhs)),
                };
                Some(Value::Bool(holds))
            }
            Self::All(parts) => {
                for part in parts {
                    if !part.eval(fact, bindings, env)?.is_truthy() {
                        return Some(Value::Bool(false));
                    }
                }
                Some(Value::Bool(true))
            }
            Self::Any(parts) => {
                for part in parts {
                    if part.eval(fact, bindings, env)?.is_truthy() {
                        return Some(Value::Bool(true));
                    }
                }
                Some(Value::Bool(false))
            }
            Self::Not(inner) => Some(Value::Bool(!inner.eval(fact, bindings, env)?.is_truthy())),
        }
    }

    /// Evaluates the expression as a boolean test.
    ///
    /// An expression that cannot be evaluated fails the test.
    #[must_use]
    pub fn test(&self, fact: Option<&Fact>, bindings: &Bindings, env: &Bindings) -> bool {
        self.eval(fact, bindings, env)
            .is_some_and(|value| value.is_truthy())
    }

    /// If this is an equality with a bare variable on one side, returns
    /// the variable and the expression that computes its value.
    #[must_use]
    pub fn binding_target(&self) -> Option<(SymbolId, &Expr)> {
        if let Self::Cmp(CmpOp::Eq, lhs, rhs) = self {
            if let Self::Var(var) = **lhs {
                return Some((var, rhs));
            }
            if let Self::Var(var) = **rhs {
                return Some((var, lhs));
            }
        }
        None
    }

    /// Collects every variable referenced by the expression.
    pub fn variables(&self, out: &mut Vec<SymbolId>) {
        match self {
            Self::Lit(_) | Self::Field(_) => {}
            Self::Var(var) => {
                if !out.contains(var) {
                    out.push(*var);
                }
            }
            Self::Cmp(_, lhs, rhs) => {
                lhs.variables(out);
                rhs.variables(out);
            }
            Self::All(parts) | Self::Any(parts) => {
                for part in parts {
                    part.variables(out);
                }
            }
            Self::Not(inner) => inner.variables(out),
        }
    }
}
