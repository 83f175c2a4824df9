//! Query nodes: parameters, handles, and result hygiene.

use millrace_engine::{Session, SessionOptions};
use millrace_foundation::{Bindings, ErrorKind, Value, GENERATED_PREFIX};
use millrace_network::{Condition, Expr, FactCondition, NetworkBuilder, QueryBuilder, QueryHandle};

use crate::support::{self, Vocab};

fn location_query() -> (Session, Vocab, QueryHandle) {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let query_name = builder.interner_mut().intern_keyword("weather/temps-at");

    let handle = builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::Fact(
                FactCondition::new(v.temperature_ty)
                    .with_constraint(Expr::eq(Expr::Var(v.t), Expr::Field(v.temperature)))
                    .with_constraint(Expr::eq(Expr::Var(v.loc), Expr::Field(v.location))),
            ))
            .with_param(v.loc)
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([
        support::temperature(&v, 10, "MCI"),
        support::temperature(&v, 15, "MCI"),
        support::temperature(&v, 22, "ORD"),
    ]);
    (session, v, handle)
}

#[test]
fn parameters_select_matching_tokens() {
    let (session, v, _) = location_query();

    let mci = Bindings::new().bind(v.loc, "MCI".into());
    let results = session.query("weather/temps-at", &mci).unwrap();
    assert_eq!(results.len(), 2);
    for row in &results {
        assert_eq!(row.get(v.loc), Some(&Value::from("MCI")));
        assert!(row.get(v.t).is_some());
    }

    let ord = Bindings::new().bind(v.loc, "ORD".into());
    assert_eq!(session.query("weather/temps-at", &ord).unwrap().len(), 1);

    let sfo = Bindings::new().bind(v.loc, "SFO".into());
    assert!(session.query("weather/temps-at", &sfo).unwrap().is_empty());
}

#[test]
fn query_by_handle_matches_query_by_name() {
    let (session, v, handle) = location_query();

    let mci = Bindings::new().bind(v.loc, "MCI".into());
    let by_name = session.query("weather/temps-at", &mci).unwrap();
    let by_handle = session.query(handle, &mci).unwrap();
    assert_eq!(by_name.len(), by_handle.len());
}

#[test]
fn missing_parameter_is_invalid_query() {
    let (session, _, _) = location_query();

    let err = session.query("weather/temps-at", &Bindings::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidQuery { .. }));
}

#[test]
fn unknown_query_name_is_invalid_query() {
    let (session, _, _) = location_query();

    let err = session.query("weather/no-such-query", &Bindings::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidQuery { .. }));
}

/// Variables under the reserved internal prefix are stripped from
/// query results.
#[test]
fn generated_variables_are_stripped_from_results() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let hidden = builder
        .interner_mut()
        .intern_symbol(&format!("{GENERATED_PREFIX}scratch"));
    let query_name = builder.interner_mut().intern_keyword("weather/visible");

    builder.add_query(
        QueryBuilder::new(query_name)
            .when(Condition::Fact(
                FactCondition::new(v.temperature_ty)
                    .with_constraint(Expr::eq(Expr::Var(v.t), Expr::Field(v.temperature)))
                    .with_constraint(Expr::eq(Expr::Var(hidden), Expr::Field(v.location))),
            ))
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([support::temperature(&v, 10, "MCI")]);

    let results = session.query("weather/visible", &Bindings::new()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get(v.t), Some(&Value::Int(10)));
    assert!(results[0].get(hidden).is_none());
}

/// Query results always reflect the queried session handle, not later
/// derivatives.
#[test]
fn queries_are_snapshot_scoped() {
    let (session, v, _) = location_query();

    let mci = Bindings::new().bind(v.loc, "MCI".into());
    let later = session.insert([support::temperature(&v, 18, "MCI")]);

    assert_eq!(session.query("weather/temps-at", &mci).unwrap().len(), 2);
    assert_eq!(later.query("weather/temps-at", &mci).unwrap().len(), 3);
}
