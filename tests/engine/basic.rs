//! Single-condition rules, joins, and insertion/retraction symmetry.

use std::sync::{Arc, Mutex};

use millrace_engine::{Session, SessionOptions};
use millrace_foundation::{Bindings, Fact, Value};
use millrace_network::{Condition, Expr, FactCondition, NetworkBuilder, QueryBuilder, RuleBuilder};

use crate::support::{self, Vocab};

/// `[Temperature t<20] => capture t` fires on
/// `Temperature(10, "MCI")` and the captured token matches that fact.
#[test]
fn single_condition_rule_captures_matching_fact() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let rule_name = builder.interner_mut().intern_keyword("weather/cold-alert");

    let captured: Arc<Mutex<Vec<Fact>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(support::temperature_below(&v, 20))
            .then(move |ctx, _| {
                for fact in ctx.token().facts() {
                    sink.lock().unwrap().push(fact.as_ref().clone());
                }
                Ok(())
            })
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    session.fire_rules().unwrap();

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0], support::temperature(&v, 10, "MCI"));
}

/// `[Temperature t=?t][WindSpeed w=?t] => capture ?t`
/// with `Temperature(10)` and `WindSpeed(10)` captures 10.
#[test]
fn join_unifies_shared_variable() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let rule_name = builder.interner_mut().intern_keyword("weather/same-value");

    let captured: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let t = v.t;
    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(Condition::Fact(
                FactCondition::new(v.temperature_ty)
                    .with_constraint(Expr::eq(Expr::Var(t), Expr::Field(v.temperature))),
            ))
            .when(Condition::Fact(
                FactCondition::new(v.windspeed_ty)
                    .with_constraint(Expr::eq(Expr::Var(t), Expr::Field(v.windspeed))),
            ))
            .then(move |_, bindings| {
                if let Some(value) = bindings.get(t) {
                    sink.lock().unwrap().push(value.clone());
                }
                Ok(())
            })
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([
        support::temperature(&v, 10, "MCI"),
        support::windspeed(&v, 10, "MCI"),
    ]);
    session.fire_rules().unwrap();

    assert_eq!(*captured.lock().unwrap(), vec![Value::Int(10)]);
}

/// A join produces no activation when the shared variable disagrees.
#[test]
fn join_rejects_inconsistent_bindings() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let rule_name = builder.interner_mut().intern_keyword("weather/same-value");

    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(Condition::Fact(
                FactCondition::new(v.temperature_ty)
                    .with_constraint(Expr::eq(Expr::Var(v.t), Expr::Field(v.temperature))),
            ))
            .when(Condition::Fact(
                FactCondition::new(v.windspeed_ty)
                    .with_constraint(Expr::eq(Expr::Var(v.t), Expr::Field(v.windspeed))),
            ))
            .then(|_, _| Ok(()))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([
        support::temperature(&v, 10, "MCI"),
        support::windspeed(&v, 25, "MCI"),
    ]);
    assert_eq!(session.pending_activations(), 0);
}

/// Inserting a fact twice then retracting it once leaves
/// one copy, and the activations derived from the remaining copy stay.
#[test]
fn duplicate_facts_are_tracked_by_multiplicity() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/cold-temps");
    let rule_name = builder.interner_mut().intern_keyword("weather/cold-alert");

    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(support::temperature_below(&v, 20))
            .then(|_, _| Ok(()))
            .build(),
    );
    builder.add_query(
        QueryBuilder::new(query_name)
            .when(support::temperature_below(&v, 20))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let fact = support::temperature(&v, 10, "MCI");
    let session = session.insert([fact.clone(), fact.clone()]);
    assert_eq!(session.pending_activations(), 2);
    assert_eq!(
        session.query("weather/cold-temps", &Bindings::new()).unwrap().len(),
        2
    );

    let session = session.retract([fact.clone()]);
    assert_eq!(session.pending_activations(), 1);
    assert_eq!(
        session.query("weather/cold-temps", &Bindings::new()).unwrap().len(),
        1
    );

    let session = session.retract([fact]);
    assert_eq!(session.pending_activations(), 0);
    assert!(session
        .query("weather/cold-temps", &Bindings::new())
        .unwrap()
        .is_empty());
}

/// `retract(insert(S, F), F)` is query-equivalent to `S`.
#[test]
fn insertion_retraction_symmetry() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/all-cold");

    builder.add_query(
        QueryBuilder::new(query_name)
            .when(support::temperature_below(&v, 20))
            .build(),
    );

    let base = Session::new(builder.build().unwrap(), SessionOptions::default());
    let base = base.insert([support::temperature(&v, 5, "ORD")]);

    let facts: Vec<Fact> = vec![
        support::temperature(&v, 10, "MCI"),
        support::temperature(&v, 15, "MCI"),
        support::temperature(&v, 30, "MCI"),
    ];
    let round_trip = base.insert(facts.clone()).retract(facts);

    let before = base.query("weather/all-cold", &Bindings::new()).unwrap();
    let after = round_trip.query("weather/all-cold", &Bindings::new()).unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(before.len(), 1);
}

/// Quantified form of the symmetry property: for arbitrary fact lists,
/// inserting then retracting them leaves query results unchanged.
#[test]
fn insertion_retraction_symmetry_holds_for_arbitrary_streams() {
    use proptest::prelude::*;

    proptest!(ProptestConfig::with_cases(32), |(
        baseline in proptest::collection::vec(-50i64..50, 0..6),
        stream in proptest::collection::vec(-50i64..50, 0..10),
    )| {
        let mut builder = NetworkBuilder::new();
        let v = Vocab::new(builder.interner_mut());
        let query_name = builder.interner_mut().intern_keyword("weather/all-cold");

        builder.add_query(
            QueryBuilder::new(query_name)
                .when(support::temperature_below(&v, 20))
                .build(),
        );

        let mut base = Session::new(builder.build().unwrap(), SessionOptions::default());
        base = base.insert(
            baseline
                .iter()
                .map(|n| support::temperature(&v, *n, "MCI")),
        );

        let facts: Vec<Fact> = stream
            .iter()
            .map(|n| support::temperature(&v, *n, "MCI"))
            .collect();
        let round_trip = base.insert(facts.clone()).retract(facts);

        let before = base.query("weather/all-cold", &Bindings::new()).unwrap();
        let after = round_trip.query("weather/all-cold", &Bindings::new()).unwrap();
        prop_assert_eq!(before.len(), after.len());
    });
}

/// Retracting a fact that is not present is a no-op, not an error.
#[test]
fn retracting_absent_fact_is_a_noop() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/all-cold");

    builder.add_query(
        QueryBuilder::new(query_name)
            .when(support::temperature_below(&v, 20))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.retract([support::temperature(&v, 11, "MCI")]);

    assert_eq!(
        session.query("weather/all-cold", &Bindings::new()).unwrap().len(),
        1
    );
}
