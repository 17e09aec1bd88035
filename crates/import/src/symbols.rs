use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_SYMBOL_LEN: usize = 8;

/// Description → symbol lookup, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolMapping {
    entries: BTreeMap<String, String>,
}

fn normalize(description: &str) -> String {
    description.trim().to_lowercase()
}

impl SymbolMapping {
    /// Adds an entry unless the description is already mapped. Returns
    /// whether the entry was added.
    pub fn insert(&mut self, description: &str, symbol: &str) -> bool {
        match self.entries.entry(normalize(description)) {
            Entry::Vacant(slot) => {
                slot.insert(symbol.trim().to_string());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn lookup(&self, description: &str) -> Option<&str> {
        self.entries.get(&normalize(description)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for SymbolMapping {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut mapping = SymbolMapping::default();
        for (description, symbol) in iter {
            mapping.insert(description, symbol);
        }
        mapping
    }
}

/// Builds a ticker-like code from a security description: the first
/// alphanumeric character of every whitespace token that contains a letter,
/// uppercased. Purely numeric or punctuation tokens (`500`, `4.25%`, `&`)
/// contribute nothing. When no token qualifies, the leading alphanumeric
/// characters are used instead. Returns `None` if the description has no
/// alphanumeric character at all.
pub fn synthetic_symbol(description: &str, max_len: usize) -> Option<String> {
    let acronym: String = description
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphabetic))
        .filter_map(|token| token.chars().find(|c| c.is_alphanumeric()))
        .flat_map(char::to_uppercase)
        .take(max_len)
        .collect();
    if !acronym.is_empty() {
        return Some(acronym);
    }

    let sentinel: String = description
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .take(max_len)
        .collect();
    (!sentinel.is_empty()).then_some(sentinel)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolSource {
    Mapped,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub symbol: String,
    pub source: SymbolSource,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No symbol can be derived from description '{0}'")]
    NoSymbol(String),
}

/// Two different descriptions that produced the same synthetic symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolCollision {
    pub symbol: String,
    pub first: String,
    pub other: String,
}

pub struct SymbolResolver<'m> {
    mapping: Option<&'m SymbolMapping>,
    max_len: usize,
    /// Synthetic symbol → first description that produced it.
    generated: BTreeMap<String, String>,
    collisions: Vec<SymbolCollision>,
}

impl<'m> SymbolResolver<'m> {
    pub fn new(mapping: Option<&'m SymbolMapping>, max_len: usize) -> Self {
        Self {
            mapping,
            max_len,
            generated: BTreeMap::new(),
            collisions: Vec::new(),
        }
    }

    pub fn resolve(&mut self, description: &str) -> Result<Resolution, ResolveError> {
        if let Some(symbol) = self.mapping.and_then(|m| m.lookup(description)) {
            return Ok(Resolution {
                symbol: symbol.to_string(),
                source: SymbolSource::Mapped,
            });
        }

        let symbol = synthetic_symbol(description, self.max_len)
            .ok_or_else(|| ResolveError::NoSymbol(description.to_string()))?;
        self.record_generated(&symbol, description);
        Ok(Resolution {
            symbol,
            source: SymbolSource::Synthetic,
        })
    }

    fn record_generated(&mut self, symbol: &str, description: &str) {
        let first = match self.generated.entry(symbol.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(description.to_string());
                return;
            }
            Entry::Occupied(slot) => slot.get().clone(),
        };
        if normalize(&first) == normalize(description)
            || self
                .collisions
                .iter()
                .any(|c| c.symbol == symbol && normalize(&c.other) == normalize(description))
        {
            return;
        }
        warn!(symbol, first = %first, other = description, "synthetic symbol collision");
        self.collisions.push(SymbolCollision {
            symbol: symbol.to_string(),
            first,
            other: description.to_string(),
        });
    }

    pub fn collisions(&self) -> &[SymbolCollision] {
        &self.collisions
    }

    pub fn into_collisions(self) -> Vec<SymbolCollision> {
        self.collisions
    }
}
