//! Disjunctive-normal-form rewriting of condition trees.
//!
//! Before network construction every left-hand side is flattened into
//! one or more variants, each a flat sequence of leaf conditions. `not`
//! is pushed inward by De Morgan's laws (preserving leaf structure),
//! nested `and`s are flattened, `and` distributes over `or`, and
//! single-child composites unwrap.

use millrace_foundation::{Error, Result};

use crate::condition::{AccumulateCondition, Condition, FactCondition, TestCondition};
use crate::expr::Expr;

/// A leaf condition after normalization.
#[derive(Clone, Debug)]
pub enum FlatCondition {
    /// Match one fact.
    Fact(FactCondition),
    /// The inner condition must have no matches.
    Negation(FactCondition),
    /// A pure predicate over bindings.
    Test(TestCondition),
    /// Fold matching facts into a value.
    Accumulate(AccumulateCondition),
}

/// Rewrites a condition tree to disjunctive normal form.
///
/// Returns one flat condition sequence per production variant. The
/// `name` is used in error messages only.
///
/// # Errors
///
/// Returns invalid-rule when a `not` wraps an accumulator (negated
/// accumulations have no network representation).
pub fn to_dnf(name: &str, condition: &Condition) -> Result<Vec<Vec<FlatCondition>>> {
    match condition {
        Condition::Fact(fact) => Ok(vec![vec![FlatCondition::Fact(fact.clone())]]),
        Condition::Test(test) => Ok(vec![vec![FlatCondition::Test(test.clone())]]),
        Condition::Accumulate(accum) => Ok(vec![vec![FlatCondition::Accumulate(accum.clone())]]),
        Condition::Not(inner) => negate(name, inner),
        Condition::And(children) => {
            // Cartesian product of the children's disjuncts.
            let mut variants: Vec<Vec<FlatCondition>> = vec![Vec::new()];
            for child in children {
                let child_variants = to_dnf(name, child)?;
                let mut next = Vec::with_capacity(variants.len() * child_variants.len());
                for prefix in &variants {
                    for suffix in &child_variants {
                        let mut variant = prefix.clone();
                        variant.extend(suffix.iter().cloned());
                        next.push(variant);
                    }
                }
                variants = next;
            }
            Ok(variants)
        }
        Condition::Or(children) => {
            let mut variants = Vec::new();
            for child in children {
                variants.extend(to_dnf(name, child)?);
            }
            Ok(variants)
        }
    }
}

/// Pushes a negation inward across one level.
fn negate(name: &str, condition: &Condition) -> Result<Vec<Vec<FlatCondition>>> {
    match condition {
        // not(fact) is the negation leaf.
        Condition::Fact(fact) => Ok(vec![vec![FlatCondition::Negation(fact.clone())]]),
        // not(test) negates the predicate.
        Condition::Test(test) => Ok(vec![vec![FlatCondition::Test(TestCondition {
            predicate: Expr::Not(Box::new(test.predicate.clone())),
        })]]),
        Condition::Accumulate(_) => Err(Error::invalid_rule(
            name,
            "an accumulator condition cannot be negated",
        )),
        // Double negation unwraps, preserving the inner structure.
        Condition::Not(inner) => to_dnf(name, inner),
        // De Morgan.
        Condition::And(children) => {
            let negated = children.iter().cloned().map(Condition::negate).collect();
            to_dnf(name, &Condition::Or(negated))
        }
        Condition::Or(children) => {
            let negated = children.iter().cloned().map(Condition::negate).collect();
            to_dnf(name, &Condition::And(negated))
        }
    }
}
