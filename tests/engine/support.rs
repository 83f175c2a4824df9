//! Shared vocabulary and fact constructors for the engine tests.

use millrace_foundation::{Fact, Interner, KeywordId, SymbolId};
use millrace_network::{CmpOp, Condition, Expr, FactCondition};

/// Interned names for the weather-domain test vocabulary.
pub struct Vocab {
    pub temperature_ty: KeywordId,
    pub temperature: KeywordId,
    pub windspeed_ty: KeywordId,
    pub windspeed: KeywordId,
    pub cold_ty: KeywordId,
    pub location: KeywordId,
    pub t: SymbolId,
    pub w: SymbolId,
    pub loc: SymbolId,
}

impl Vocab {
    pub fn new(interner: &mut Interner) -> Self {
        Self {
            temperature_ty: interner.intern_keyword("Temperature"),
            temperature: interner.intern_keyword("temperature"),
            windspeed_ty: interner.intern_keyword("WindSpeed"),
            windspeed: interner.intern_keyword("windspeed"),
            cold_ty: interner.intern_keyword("Cold"),
            location: interner.intern_keyword("location"),
            t: interner.intern_symbol("?t"),
            w: interner.intern_symbol("?w"),
            loc: interner.intern_symbol("?loc"),
        }
    }
}

pub fn temperature(v: &Vocab, value: i64, location: &str) -> Fact {
    Fact::new(v.temperature_ty)
        .with(v.temperature, value)
        .with(v.location, location)
}

pub fn windspeed(v: &Vocab, value: i64, location: &str) -> Fact {
    Fact::new(v.windspeed_ty)
        .with(v.windspeed, value)
        .with(v.location, location)
}

/// `[Temperature (= ?t temperature) (< temperature limit)]`
pub fn temperature_below(v: &Vocab, limit: i64) -> Condition {
    Condition::Fact(
        FactCondition::new(v.temperature_ty)
            .with_constraint(Expr::eq(Expr::Var(v.t), Expr::Field(v.temperature)))
            .with_constraint(Expr::cmp(
                CmpOp::Lt,
                Expr::Field(v.temperature),
                Expr::Lit(millrace_foundation::Value::Int(limit)),
            )),
    )
}

/// `[WindSpeed (= ?w windspeed) (> windspeed limit)]`
pub fn windspeed_above(v: &Vocab, limit: i64) -> Condition {
    Condition::Fact(
        FactCondition::new(v.windspeed_ty)
            .with_constraint(Expr::eq(Expr::Var(v.w), Expr::Field(v.windspeed)))
            .with_constraint(Expr::cmp(
                CmpOp::Gt,
                Expr::Field(v.windspeed),
                Expr::Lit(millrace_foundation::Value::Int(limit)),
            )),
    )
}
