use std::fmt::Debug;

use itertools::Itertools;

use crate::math::Bijection;

/// Dense integer id of an alphabet symbol.
pub type SymbolId = u32;

/// Classification attached to a sample string.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Label {
    Accept,
    Reject,
    Unknown,
}

impl Label {
    /// Returns `Some(true)` for [`Label::Accept`], `Some(false)` for [`Label::Reject`] and
    /// `None` for [`Label::Unknown`].
    pub fn classification(self) -> Option<bool> {
        match self {
            Label::Accept => Some(true),
            Label::Reject => Some(false),
            Label::Unknown => None,
        }
    }
}

impl From<bool> for Label {
    fn from(value: bool) -> Self {
        if value {
            Label::Accept
        } else {
            Label::Reject
        }
    }
}

/// A labeled example string over interned symbols.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sample {
    pub label: Label,
    pub symbols: Vec<SymbolId>,
}

impl Sample {
    pub fn new<I: IntoIterator<Item = SymbolId>>(label: Label, symbols: I) -> Self {
        Self {
            label,
            symbols: symbols.into_iter().collect(),
        }
    }

    /// Shorthand for an accepted sample.
    pub fn accept<I: IntoIterator<Item = SymbolId>>(symbols: I) -> Self {
        Self::new(Label::Accept, symbols)
    }

    /// Shorthand for a rejected sample.
    pub fn reject<I: IntoIterator<Item = SymbolId>>(symbols: I) -> Self {
        Self::new(Label::Reject, symbols)
    }

    /// Interns every token in `tokens` and builds a sample from the resulting ids.
    pub fn from_tokens<S: AsRef<str>, I: IntoIterator<Item = S>>(
        label: Label,
        tokens: I,
        table: &mut SymbolTable,
    ) -> Self {
        Self::new(label, tokens.into_iter().map(|t| table.intern(t.as_ref())))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = match self.label {
            Label::Accept => '+',
            Label::Reject => '-',
            Label::Unknown => '?',
        };
        write!(f, "{sign}[{}]", self.symbols.iter().join(" "))
    }
}

/// Interns raw tokens to dense symbol ids. The number of interned tokens is the alphabet size.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Bijection<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from the given tokens, in order. Duplicates are interned once.
    pub fn from_tokens<S: AsRef<str>, I: IntoIterator<Item = S>>(tokens: I) -> Self {
        let mut table = Self::new();
        for token in tokens {
            table.intern(token.as_ref());
        }
        table
    }

    /// Returns the id of `token`, assigning the next free id if it was not seen before.
    pub fn intern(&mut self, token: &str) -> SymbolId {
        if let Some(id) = self.symbols.get_by_left(token) {
            return *id;
        }
        let id = self.symbols.len() as SymbolId;
        self.symbols.insert(token.to_string(), id);
        id
    }

    pub fn id(&self, token: &str) -> Option<SymbolId> {
        self.symbols.get_by_left(token).copied()
    }

    pub fn token(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get_by_right(&id).map(|s| s.as_str())
    }

    /// Number of distinct symbols, i.e. the alphabet size.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Interns each character of `word` as its own token.
    pub fn intern_chars(&mut self, word: &str) -> Vec<SymbolId> {
        let mut buf = [0u8; 4];
        word.chars()
            .map(|c| self.intern(c.encode_utf8(&mut buf)))
            .collect()
    }
}
