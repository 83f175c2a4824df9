//! Compiled discrimination network for Millrace.
//!
//! This crate provides:
//! - [`Expr`] - Constraint expressions over facts and bindings
//! - [`Condition`] - Left-hand-side condition trees
//! - [`dnf`] - Disjunctive-normal-form rewriting
//! - [`Rulebase`], [`NetworkBuilder`] - The node arena and its builder
//! - [`RuleBuilder`], [`QueryBuilder`] - Production definition

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow large error types - the foundation Error carries rich context
#![allow(clippy::result_large_err)]
#![allow(clippy::missing_errors_doc)]

pub mod build;
pub mod condition;
pub mod dnf;
pub mod expr;
pub mod node;
pub mod production;

pub use build::NetworkBuilder;
pub use condition::{
    AccumulateCondition, AccumulatorDef, Condition, FactCondition, TestCondition,
};
pub use dnf::{to_dnf, FlatCondition};
pub use expr::{CmpOp, Expr};
pub use node::{
    AccumulateFilterNode, AccumulateNode, AlphaNode, BetaNode, CompiledRule, JoinNode,
    NegationNode, Node, ProductionNode, QueryNode, RootJoinNode, Rulebase, TestNode,
};
pub use production::{
    Production, QueryBuilder, QueryDef, QueryHandle, RhsAction, RhsCommand, RhsContext,
    RuleBuilder, RuleDef, RuleProperties,
};
