//! Integration tests for the Millrace engine
//!
//! End-to-end scenarios through the public session API: alpha filtering,
//! joins, negation, accumulators, truth maintenance, and scheduling.

mod basic;
mod negation;
mod queries;
mod scheduling;
mod support;
mod truth_maintenance;
