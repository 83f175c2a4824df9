//! Salience grouping, flush boundaries, and no-loop semantics.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use millrace_engine::{Session, SessionOptions};
use millrace_foundation::{Fact, Value};
use millrace_network::{Condition, FactCondition, NetworkBuilder, RuleBuilder};

use crate::support::{self, Vocab};

/// Three rules with salience 100, 50, 0 on one
/// triggering fact fire in descending salience order, under any
/// definition order.
#[test]
fn salience_orders_firing() {
    for permutation in [
        [100i64, 50, 0],
        [0, 100, 50],
        [50, 0, 100],
    ] {
        let mut builder = NetworkBuilder::new();
        let v = Vocab::new(builder.interner_mut());
        let log: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

        for salience in permutation {
            let name = builder
                .interner_mut()
                .intern_keyword(&format!("weather/at-{salience}"));
            let sink = log.clone();
            builder.add_rule(
                RuleBuilder::new(name)
                    .when(support::temperature_below(&v, 20))
                    .with_salience(salience)
                    .then(move |_, _| {
                        sink.lock().unwrap().push(salience);
                        Ok(())
                    })
                    .build(),
            );
        }

        let session = Session::new(builder.build().unwrap(), SessionOptions::default());
        let session = session.insert([support::temperature(&v, 10, "MCI")]);
        session.fire_rules().unwrap();

        assert_eq!(*log.lock().unwrap(), vec![100, 50, 0]);
    }
}

/// Facts inserted by a higher group are visible to lower groups: the
/// pending batch flushes at the group boundary.
#[test]
fn lower_groups_see_higher_group_insertions() {
    let mut builder = NetworkBuilder::new();
    let i = builder.interner_mut();
    let seed_ty = i.intern_keyword("Seed");
    let derived_ty = i.intern_keyword("Derived");
    let first = i.intern_keyword("order/first");
    let second = i.intern_keyword("order/second");

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = log.clone();
    builder.add_rule(
        RuleBuilder::new(first)
            .when(Condition::Fact(FactCondition::new(seed_ty)))
            .with_salience(10)
            .then(move |ctx, _| {
                sink.lock().unwrap().push("first");
                ctx.insert(Fact::new(derived_ty));
                Ok(())
            })
            .build(),
    );
    let sink = log.clone();
    builder.add_rule(
        RuleBuilder::new(second)
            .when(Condition::Fact(FactCondition::new(derived_ty)))
            .with_salience(0)
            .then(move |_, _| {
                sink.lock().unwrap().push("second");
                Ok(())
            })
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([Fact::new(seed_ty)]);
    session.fire_rules().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

/// A no-loop rule whose RHS re-satisfies its own LHS
/// does not fire again for the inserted facts.
#[test]
fn no_loop_prevents_self_triggering() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let rule_name = builder.interner_mut().intern_keyword("weather/chill-further");

    let fired: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let counter = fired.clone();
    let t = v.t;
    let temp_ty = v.temperature_ty;
    let temp_f = v.temperature;
    let loc_f = v.location;
    builder.add_rule(
        RuleBuilder::new(rule_name)
            .when(support::temperature_below(&v, 20))
            .with_no_loop(true)
            .then(move |ctx, bindings| {
                *counter.lock().unwrap() += 1;
                if let Some(Value::Int(n)) = bindings.get(t) {
                    ctx.insert(Fact::new(temp_ty).with(temp_f, n - 1).with(loc_f, "MCI"));
                }
                Ok(())
            })
            .build(),
    );

    let session = Session::new(builder.build().unwrap(), SessionOptions::default());
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    let session = session.fire_rules().unwrap();

    assert_eq!(*fired.lock().unwrap(), 1);
    assert_eq!(session.pending_activations(), 0);
}

/// A custom group function and comparator replace the salience default.
#[test]
fn custom_activation_grouping() {
    let mut builder = NetworkBuilder::new();
    let v = Vocab::new(builder.interner_mut());
    let low = builder.interner_mut().intern_keyword("order/low");
    let high = builder.interner_mut().intern_keyword("order/high");

    let log: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    for (name, salience) in [(low, 0i64), (high, 100)] {
        let sink = log.clone();
        builder.add_rule(
            RuleBuilder::new(name)
                .when(support::temperature_below(&v, 20))
                .with_salience(salience)
                .then(move |_, _| {
                    sink.lock().unwrap().push(salience);
                    Ok(())
                })
                .build(),
        );
    }

    // Reverse the default order: numerically smaller groups fire first.
    let options = SessionOptions::default().with_activation_group_sort_fn(Arc::new(|a, b| {
        b.compare(a).unwrap_or(Ordering::Equal)
    }));
    let session = Session::new(builder.build().unwrap(), options);
    let session = session.insert([support::temperature(&v, 10, "MCI")]);
    session.fire_rules().unwrap();

    assert_eq!(*log.lock().unwrap(), vec![0, 100]);
}
