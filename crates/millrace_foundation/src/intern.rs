//! String interning for variables and keywords.
//!
//! Variable names (`?t`) and keywords (fact types, field names, rule and
//! query names) are interned so the hot paths of the engine compare and
//! hash small integer ids instead of strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Prefix reserved for variables introduced internally (normalization,
/// accumulator result slots). Bindings under this prefix are stripped
/// from query results.
pub const GENERATED_PREFIX: &str = "?__";

/// Interned variable identifier.
///
/// Variables are written with a leading `?`, like `?t` or `?location`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    /// Returns the raw index of this symbol.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

/// Interned keyword identifier.
///
/// Keywords name fact types, fact fields, rules, and queries.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeywordId(pub(crate) u32);

impl KeywordId {
    /// Returns the raw index of this keyword.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for KeywordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeywordId({})", self.0)
    }
}

/// Interner for variables and keywords.
///
/// Not thread-safe; the network builder owns one while constructing a
/// rulebase, after which it is frozen behind an `Arc` for lookups.
#[derive(Clone, Debug, Default)]
pub struct Interner {
    /// Variable name storage, indexed by `SymbolId`.
    symbols: Vec<Arc<str>>,
    /// Map from variable name to id.
    symbol_map: HashMap<Arc<str>, SymbolId>,
    /// Keyword storage, indexed by `KeywordId`.
    keywords: Vec<Arc<str>>,
    /// Map from keyword text to id.
    keyword_map: HashMap<Arc<str>, KeywordId>,
    /// Counter for generated variable names.
    gensym_counter: u32,
}

impl Interner {
    /// Creates a new empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a variable name, returning its [`SymbolId`].
    ///
    /// # Panics
    ///
    /// Panics if the number of interned variables exceeds `u32::MAX`.
    pub fn intern_symbol(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.symbol_map.get(name) {
            return id;
        }
        let id = SymbolId(u32::try_from(self.symbols.len()).expect("too many symbols"));
        let arc: Arc<str> = name.into();
        self.symbols.push(arc.clone());
        self.symbol_map.insert(arc, id);
        id
    }

    /// Interns a keyword, returning its [`KeywordId`].
    ///
    /// # Panics
    ///
    /// Panics if the number of interned keywords exceeds `u32::MAX`.
    pub fn intern_keyword(&mut self, name: &str) -> KeywordId {
        if let Some(&id) = self.keyword_map.get(name) {
            return id;
        }
        let id = KeywordId(u32::try_from(self.keywords.len()).expect("too many keywords"));
        let arc: Arc<str> = name.into();
        self.keywords.push(arc.clone());
        self.keyword_map.insert(arc, id);
        id
    }

    /// Creates a fresh internally-generated variable.
    pub fn gensym(&mut self) -> SymbolId {
        let name = format!("{GENERATED_PREFIX}g{}", self.gensym_counter);
        self.gensym_counter += 1;
        self.intern_symbol(&name)
    }

    /// Gets the name of a variable.
    #[must_use]
    pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get(id.0 as usize).map(AsRef::as_ref)
    }

    /// Gets the text of a keyword.
    #[must_use]
    pub fn keyword_name(&self, id: KeywordId) -> Option<&str> {
        self.keywords.get(id.0 as usize).map(AsRef::as_ref)
    }

    /// Looks up an already-interned variable without inserting.
    #[must_use]
    pub fn lookup_symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbol_map.get(name).copied()
    }

    /// Looks up an already-interned keyword without inserting.
    #[must_use]
    pub fn lookup_keyword(&self, name: &str) -> Option<KeywordId> {
        self.keyword_map.get(name).copied()
    }

    /// Returns true if the variable was introduced internally.
    #[must_use]
    pub fn is_generated(&self, id: SymbolId) -> bool {
        self.symbol_name(id)
            .is_some_and(|name| name.starts_with(GENERATED_PREFIX))
    }
}
