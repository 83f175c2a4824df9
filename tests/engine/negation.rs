//! Negation nodes and DNF-expanded boolean composition.

use millrace_engine::{Session, SessionOptions};
use millrace_foundation::Bindings;
use millrace_network::{Condition, Expr, FactCondition, NetworkBuilder, QueryBuilder};

use crate::support::{self, Vocab};

/// `[:not [Temperature t<20]]` starts with one match;
/// inserting a violating fact removes it; retracting restores it.
#[test]
fn negation_round_trip() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/not-cold");

    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::negate(support::temperature_below(&v, 20)))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    assert_eq!(
        session.query("weather/not-cold", &Bindings::new()).unwrap().len(),
        1
    );

    let violating = support::temperature(&v, 10, "MCI");
    let session = session.insert([violating.clone()]);
    assert!(session
        .query("weather/not-cold", &Bindings::new())
        .unwrap()
        .is_empty());

    let session = session.retract([violating]);
    assert_eq!(
        session.query("weather/not-cold", &Bindings::new()).unwrap().len(),
        1
    );
}

/// `[:not [:or [WindSpeed>30] [Temperature<20]]]`
/// normalizes to two conjoined negations.
#[test]
fn negated_disjunction_via_dnf() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/calm");

    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::negate(Condition::Or(vec![
                support::windspeed_above(&v, 30),
                support::temperature_below(&v, 20),
            ])))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    assert_eq!(session.query("weather/calm", &Bindings::new()).unwrap().len(), 1);

    let windy = support::windspeed(&v, 40, "MCI");
    let session = session.insert([windy.clone()]);
    assert!(session.query("weather/calm", &Bindings::new()).unwrap().is_empty());

    let session = session.retract([windy]);
    assert_eq!(session.query("weather/calm", &Bindings::new()).unwrap().len(), 1);
}

/// A negation after a positive condition restricts per join bindings:
/// only locations without wind readings match.
#[test]
fn negation_is_scoped_by_join_bindings() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/windless");

    let temperature_at = Condition::Fact(
        FactCondition::new(v.temperature_ty)
            .with_constraint(Expr::eq(Expr::Var(v.loc), Expr::Field(v.location))),
    );
    let wind_at = Condition::Fact(
        FactCondition::new(v.windspeed_ty)
            .with_constraint(Expr::eq(Expr::Var(v.loc), Expr::Field(v.location))),
    );

    builder.add_query(
        QueryBuilder::new(query_name)
            .when(temperature_at)
            .when(Condition::negate(wind_at))
            .with_param(v.loc)
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([
        support::temperature(&v, 10, "MCI"),
        support::temperature(&v, 12, "ORD"),
        support::windspeed(&v, 40, "ORD"),
    ]);

    let mci = Bindings::new().bind(v.loc, "MCI".into());
    let ord = Bindings::new().bind(v.loc, "ORD".into());
    assert_eq!(session.query("weather/windless", &mci).unwrap().len(), 1);
    assert!(session.query("weather/windless", &ord).unwrap().is_empty());

    // Retracting ORD's wind restores its match.
    let session = session.retract([support::windspeed(&v, 40, "ORD")]);
    assert_eq!(session.query("weather/windless", &ord).unwrap().len(), 1);
}
