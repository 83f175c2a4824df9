//! The activation queue.
//!
//! Activations are grouped by the caller's activation-group function
//! and popped in the order of the caller's group comparator; within a
//! group pops are FIFO over insertion. Removal by activation identity
//! is supported for token retraction.

use std::cmp::Ordering;

use millrace_foundation::{NodeId, Token, Value};

/// A queued (production node, token) pair awaiting firing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    /// The production node whose rule will fire.
    pub node: NodeId,
    /// The token that satisfied the rule's left-hand side.
    pub token: Token,
}

/// Comparator over activation group values.
pub type GroupCmp<'a> = &'a dyn Fn(&Value, &Value) -> Ordering;

/// Priority-grouped activation queue.
///
/// Groups are kept sorted best-first under the comparator supplied at
/// each push; equal-group activations drain FIFO.
#[derive(Clone, Debug, Default)]
pub struct ActivationQueue {
    /// (group value, FIFO of activations), best group first.
    groups: im::Vector<(Value, im::Vector<Activation>)>,
}

impl ActivationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no activations are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of pending activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, queue)| queue.len()).sum()
    }

    /// Pushes an activation under its group value.
    ///
    /// `cmp` orders group values best-first; it must be consistent
    /// across every push into one queue.
    pub fn push(&mut self, group: Value, activation: Activation, cmp: GroupCmp<'_>) {
        let mut slot = None;
        for (idx, (existing, _)) in self.groups.iter().enumerate() {
            match cmp(&group, existing) {
                Ordering::Equal => {
                    slot = Some((idx, true));
                    break;
                }
                // Strictly better than this group: insert before it.
                Ordering::Greater => {
                    slot = Some((idx, false));
                    break;
                }
                Ordering::Less => {}
            }
        }
        match slot {
            Some((idx, true)) => {
                let (existing, mut queue) = self.groups[idx].clone();
                queue.push_back(activation);
                self.groups.set(idx, (existing, queue));
            }
            Some((idx, false)) => {
                let mut fifo = im::Vector::new();
                fifo.push_back(activation);
                self.groups.insert(idx, (group, fifo));
            }
            None => {
                let mut fifo = im::Vector::new();
                fifo.push_back(activation);
                self.groups.push_back((group, fifo));
            }
        }
    }

    /// The group value of the next activation to pop.
    #[must_use]
    pub fn peek_group(&self) -> Option<&Value> {
        self.groups.front().map(|(group, _)| group)
    }

    /// Pops the next activation (best group, FIFO within it).
    pub fn pop(&mut self) -> Option<(Value, Activation)> {
        let (group, queue) = self.groups.front()?.clone();
        let mut queue = queue;
        let activation = queue.pop_front()?;
        if queue.is_empty() {
            self.groups.remove(0);
        } else {
            self.groups.set(0, (group.clone(), queue));
        }
        Some((group, activation))
    }

    /// Removes pending activations for the given node and tokens.
    ///
    /// Each token removes at most one matching activation.
    pub fn remove(&mut self, node: NodeId, tokens: &[Token]) -> Vec<Activation> {
        let mut removed = Vec::new();
        let mut remaining: Vec<&Token> = tokens.iter().collect();
        let mut rebuilt = im::Vector::new();
        for (group, queue) in &self.groups {
            let mut kept = im::Vector::new();
            for activation in queue {
                let mut matched = false;
                if activation.node == node {
                    if let Some(idx) = remaining
                        .iter()
                        .position(|token| **token == activation.token)
                    {
                        remaining.swap_remove(idx);
                        matched = true;
                    }
                }
                if matched {
                    removed.push(activation.clone());
                } else {
                    kept.push_back(activation.clone());
                }
            }
            if !kept.is_empty() {
                rebuilt.push_back((group.clone(), kept));
            }
        }
        self.groups = rebuilt;
        removed
    }
}
