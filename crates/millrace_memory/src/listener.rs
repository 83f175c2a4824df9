//! Session listeners.
//!
//! Listeners observe network events. They mirror working memory's
//! persistent/transient split: a [`SessionListener`] is the frozen form
//! held by a session; each public API call thaws every listener into an
//! [`EventListener`], feeds it events synchronously, and freezes it
//! back into the session that is returned. Listeners must not mutate
//! the session.

use std::sync::{Arc, RwLock};

use millrace_foundation::{Bindings, Element, Fact, NodeId, Token, Value};

/// Frozen listener held by a session.
pub trait SessionListener: Send + Sync {
    /// Thaws into the mutable form used during one API call.
    fn to_transient(&self) -> Box<dyn EventListener>;
}

/// Mutable listener receiving events during one API call.
///
/// All callbacks default to no-ops so implementations override only
/// what they observe.
#[allow(unused_variables)]
pub trait EventListener {
    /// Facts entered working memory.
    fn insert_facts(&mut self, facts: &[Arc<Fact>]) {}

    /// Facts were logically inserted under a firing token.
    fn insert_facts_logical(&mut self, node: NodeId, token: &Token, facts: &[Arc<Fact>]) {}

    /// Facts left working memory.
    fn retract_facts(&mut self, facts: &[Arc<Fact>]) {}

    /// Tokens arrived at a beta node.
    fn left_activate(&mut self, node: NodeId, tokens: &[Token]) {}

    /// Tokens were retracted from a beta node.
    fn left_retract(&mut self, node: NodeId, tokens: &[Token]) {}

    /// Elements arrived at a beta node's right side.
    fn right_activate(&mut self, node: NodeId, elements: &[Element]) {}

    /// Elements were retracted from a beta node's right side.
    fn right_retract(&mut self, node: NodeId, elements: &[Element]) {}

    /// Activations were queued for a production.
    fn add_activations(&mut self, node: NodeId, tokens: &[Token]) {}

    /// Pending activations were removed for a production.
    fn remove_activations(&mut self, node: NodeId, tokens: &[Token]) {}

    /// An accumulator stored a new reduced value.
    fn add_accum_reduced(&mut self, node: NodeId, group: &Bindings, value: &Value) {}

    /// Freezes back into the session-held form.
    fn to_persistent(self: Box<Self>) -> Arc<dyn SessionListener>;
}

/// A listener that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl SessionListener for NoopListener {
    fn to_transient(&self) -> Box<dyn EventListener> {
        Box::new(NoopListener)
    }
}

impl EventListener for NoopListener {
    fn to_persistent(self: Box<Self>) -> Arc<dyn SessionListener> {
        Arc::new(NoopListener)
    }
}

/// One recorded network event.
#[derive(Clone, Debug)]
pub enum TraceEvent {
    /// Facts entered working memory.
    InsertFacts {
        /// The inserted facts.
        facts: Vec<Arc<Fact>>,
    },
    /// Facts were logically inserted under a firing token.
    InsertFactsLogical {
        /// The production node whose firing inserted them.
        node: NodeId,
        /// The inserted facts.
        facts: Vec<Arc<Fact>>,
    },
    /// Facts left working memory.
    RetractFacts {
        /// The retracted facts.
        facts: Vec<Arc<Fact>>,
    },
    /// Tokens arrived at a beta node.
    LeftActivate {
        /// The receiving node.
        node: NodeId,
        /// How many tokens arrived.
        count: usize,
    },
    /// Tokens were retracted from a beta node.
    LeftRetract {
        /// The node retracted from.
        node: NodeId,
        /// How many tokens were retracted.
        count: usize,
    },
    /// Elements arrived at a beta node's right side.
    RightActivate {
        /// The receiving node.
        node: NodeId,
        /// How many elements arrived.
        count: usize,
    },
    /// Elements were retracted from a beta node's right side.
    RightRetract {
        /// The node retracted from.
        node: NodeId,
        /// How many elements were retracted.
        count: usize,
    },
    /// Activations were queued for a production.
    AddActivations {
        /// The production node.
        node: NodeId,
        /// How many activations were queued.
        count: usize,
    },
    /// Pending activations were removed for a production.
    RemoveActivations {
        /// The production node.
        node: NodeId,
        /// How many activations were removed.
        count: usize,
    },
    /// An accumulator stored a new reduced value.
    AccumReduced {
        /// The accumulator node.
        node: NodeId,
        /// The reduced value.
        value: Value,
    },
}

/// A listener recording every event into a shared log.
///
/// The transient form buffers events locally and publishes them to the
/// log only when frozen back, so a failed call leaves no partial trace.
#[derive(Clone, Debug, Default)]
pub struct TraceListener {
    log: Arc<RwLock<Vec<TraceEvent>>>,
}

impl TraceListener {
    /// Creates a listener with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the recorded events.
    ///
    /// # Panics
    ///
    /// Panics if the log lock was poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.log.read().expect("trace log poisoned").clone()
    }

    /// Clears the recorded events.
    ///
    /// # Panics
    ///
    /// Panics if the log lock was poisoned.
    pub fn clear(&self) {
        self.log.write().expect("trace log poisoned").clear();
    }
}

impl SessionListener for TraceListener {
    fn to_transient(&self) -> Box<dyn EventListener> {
        Box::new(TransientTraceListener {
            log: self.log.clone(),
            buffer: Vec::new(),
        })
    }
}

struct TransientTraceListener {
    log: Arc<RwLock<Vec<TraceEvent>>>,
    buffer: Vec<TraceEvent>,
}

impl EventListener for TransientTraceListener {
    fn insert_facts(&mut self, facts: &[Arc<Fact>]) {
        self.buffer.push(TraceEvent::InsertFacts {
            facts: facts.to_vec(),
        });
    }

    fn insert_facts_logical(&mut self, node: NodeId, _token: &Token, facts: &[Arc<Fact>]) {
        self.buffer.push(TraceEvent::InsertFactsLogical {
            node,
            facts: facts.to_vec(),
        });
    }

    fn retract_facts(&mut self, facts: &[Arc<Fact>]) {
        self.buffer.push(TraceEvent::RetractFacts {
            facts: facts.to_vec(),
        });
    }

    fn left_activate(&mut self, node: NodeId, tokens: &[Token]) {
        self.buffer.push(TraceEvent::LeftActivate {
            node,
            count: tokens.len(),
        });
    }

    fn left_retract(&mut self, node: NodeId, tokens: &[Token]) {
        self.buffer.push(TraceEvent::LeftRetract {
            node,
            count: tokens.len(),
        });
    }

    fn right_activate(&mut self, node: NodeId, elements: &[Element]) {
        self.buffer.push(TraceEvent::RightActivate {
            node,
            count: elements.len(),
        });
    }

    fn right_retract(&mut self, node: NodeId, elements: &[Element]) {
        self.buffer.push(TraceEvent::RightRetract {
            node,
            count: elements.len(),
        });
    }

    fn add_activations(&mut self, node: NodeId, tokens: &[Token]) {
        self.buffer.push(TraceEvent::AddActivations {
            node,
            count: tokens.len(),
        });
    }

    fn remove_activations(&mut self, node: NodeId, tokens: &[Token]) {
        self.buffer.push(TraceEvent::RemoveActivations {
            node,
            count: tokens.len(),
        });
    }

    fn add_accum_reduced(&mut self, node: NodeId, _group: &Bindings, value: &Value) {
        self.buffer.push(TraceEvent::AccumReduced {
            node,
            value: value.clone(),
        });
    }

    fn to_persistent(self: Box<Self>) -> Arc<dyn SessionListener> {
        let listener = TraceListener {
            log: self.log.clone(),
        };
        listener
            .log
            .write()
            .expect("trace log poisoned")
            .extend(self.buffer);
        Arc::new(listener)
    }
}
