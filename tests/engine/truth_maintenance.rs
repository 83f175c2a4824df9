//! Logical insertions, support tracking, and recursive retraction.

use millrace_engine::{Session, SessionOptions};
use millrace_foundation::{Bindings, Value};
use millrace_network::{Condition, Expr, FactCondition, NetworkBuilder, QueryBuilder, RuleBuilder};

use crate::support::{self, Vocab};

/// Builds `[Temperature t<20] => insert!(Cold t)`
/// plus a query over Cold facts.
fn cold_session() -> (Session, Vocab) {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let rule_name = builder.interner_mut().intern_keyword("weather/derive-cold");
    let query_name = builder.interner_mut().intern_keyword("weather/cold-facts");

    let cold_ty = v.cold_ty;
    let temp_f = v.temperature;
    let t = v.t;
    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(support::temperature_below(&v, 20))
            .then(move |ctx, bindings| {
                if let Some(Value::Int(n)) = bindings.get(t) {
                    ctx.insert(millrace_foundation::Fact::new(cold_ty).with(temp_f, *n));
                }
                Ok(())
            })
            .build(),
    );
    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::Fact(
                FactCondition::new(v.cold_ty)
                    .with_constraint(Expr::eq(Expr::Var(v.t), Expr::Field(v.temperature))),
            ))
            .build(),
    );

    (
        Session::new(builder.build().unwrap(), SessionOptions::default()),
        v,
    )
}

/// The derived Cold fact appears after firing and
/// disappears when its supporting Temperature is retracted.
#[test]
fn logical_insertion_is_retracted_with_its_support() {
    let (session, v) = cold_session();

    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();
    let results = session.query("weather/cold-facts", &Bindings::new()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get(v.t), Some(&Value::Int(10)));

    let session = session.retract([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();
    assert!(session
        .query("weather/cold-facts", &Bindings::new())
        .unwrap()
        .is_empty());
}

/// Chains of rules A => B => C remove C when A's
/// triggering fact is retracted.
#[test]
fn truth_maintenance_is_transitive() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let i = builder.interner_mut();
    let advisory_ty = i.intern_keyword("Advisory");
    let severity = i.intern_keyword("severity");
    let derive_cold = i.intern_keyword("weather/derive-cold");
    let derive_advisory = i.intern_keyword("weather/derive-advisory");
    let query_name = i.intern_keyword("weather/advisories");

    let cold_ty = v.cold_ty;
    let temp_f = v.temperature;
    let t = v.t;
    builder.add_rule(
        RuleBuilder::new(derive_cold)
            .when(support::temperature_below(&v, 20))
            .then(move |ctx, bindings| {
                if let Some(Value::Int(n)) = bindings.get(t) {
                    ctx.insert(millrace_foundation::Fact::new(cold_ty).with(temp_f, *n));
                }
                Ok(())
            })
            .build(),
    );
    builder.add_rule(
        RuleBuilder::new(derive_advisory)
            .when(Condition::Fact(FactCondition::new(cold_ty)))
            .then(move |ctx, _| {
                ctx.insert(millrace_foundation::Fact::new(advisory_ty).with(severity, 1i64));
                Ok(())
            })
            .build(),
    );
    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::Fact(FactCondition::new(advisory_ty)))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();
    assert_eq!(
        session.query("weather/advisories", &Bindings::new()).unwrap().len(),
        1
    );

    // Retracting the root fact unwinds the whole chain.
    let session = session.retract([support::temperature(&v, 10, "MCI")]);
    assert!(session
        .query("weather/advisories", &Bindings::new())
        .unwrap()
        .is_empty());
}

/// Unconditional insertions survive the retraction of the firing token.
#[test]
fn unconditional_insertion_has_no_support() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let rule_name = builder.interner_mut().intern_keyword("weather/record-cold");
    let query_name = builder.interner_mut().intern_keyword("weather/cold-facts");

    let cold_ty = v.cold_ty;
    let temp_f = v.temperature;
    let t = v.t;
    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(support::temperature_below(&v, 20))
            .then(move |ctx, bindings| {
                if let Some(Value::Int(n)) = bindings.get(t) {
                    ctx.insert_unconditional(
                        millrace_foundation::Fact::new(cold_ty).with(temp_f, *n),
                    );
                }
                Ok(())
            })
            .build(),
    );
    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::Fact(FactCondition::new(v.cold_ty)))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();
    let session = session.retract([support::temperature(&v, 10, "MCI")]);

    assert_eq!(
        session.query("weather/cold-facts", &Bindings::new()).unwrap().len(),
        1
    );
}

/// An RHS retraction takes effect at the next flush and is not itself
/// truth-maintained.
#[test]
fn rhs_retraction_is_immediate_and_unmaintained() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let i = builder.interner_mut();
    let stale_ty = i.intern_keyword("StaleReading");
    let rule_name = i.intern_keyword("weather/drop-stale");
    let query_name = i.intern_keyword("weather/stale");

    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(support::temperature_below(&v, 20))
            .then(move |ctx, _| {
                ctx.retract(millrace_foundation::Fact::new(stale_ty));
                Ok(())
            })
            .build(),
    );
    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::Fact(FactCondition::new(stale_ty)))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([millrace_foundation::Fact::new(stale_ty)]);
    assert_eq!(session.query("weather/stale", &Bindings::new()).unwrap().len(), 1);

    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();
    assert!(session.query("weather/stale", &Bindings::new()).unwrap().is_empty());

    // Retracting the trigger does not resurrect the retracted fact.
    let session = session.retract([support::temperature(&v, 10, "MCI")]);
    assert!(session.query("weather/stale", &Bindings::new()).unwrap().is_empty());
}

/// A retracted-then-reinserted fact re-fires the rule and re-derives
/// its conclusions.
#[test]
fn resupported_token_fires_again() {
    let (session, v) = cold_session();

    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();
    let session = session.retract([support::temperature(&v, 10, "MCI")]);
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();

    let results = session.query("weather/cold-facts", &Bindings::new()).unwrap();
    assert_eq!(results.len(), 1);
}
