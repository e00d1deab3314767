use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::languages::Lang;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
}

impl SymbolKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            "class" => Some(Self::Class),
            "struct" => Some(Self::Struct),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted definition with its exact source span.
///
/// Field order matches the `symbols.jsonl` record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    /// Relative to the indexed root, `/`-separated.
    pub file_path: String,
    pub kind: SymbolKind,
    /// Empty for anonymous constructs.
    pub name: String,
    pub signature: String,
    /// Zero-indexed, inclusive.
    pub start_line: usize,
    /// Zero-indexed, inclusive.
    pub end_line: usize,
    pub content: String,
    pub language: Lang,
}

impl Symbol {
    #[must_use]
    pub fn summary(&self) -> SymbolSummary {
        SymbolSummary {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            start_line: self.start_line,
        }
    }
}

/// Lightweight entry of the repository map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub id: String,
    pub kind: SymbolKind,
    pub name: String,
    pub start_line: usize,
}

/// `{relative_path}:{name}:{occurrence_index}`.
#[must_use]
pub fn symbol_id(relative_path: &str, name: &str, occurrence: usize) -> String {
    format!("{relative_path}:{name}:{occurrence}")
}

/// Per-file occurrence counter keyed by name.
///
/// Feeding the same sequence of names always yields the same ids, and two
/// symbols with the same name in one file get distinct indices.
#[derive(Debug, Default)]
pub struct OccurrenceCounter {
    seen: HashMap<String, usize>,
}

impl OccurrenceCounter {
    pub fn next_id(&mut self, relative_path: &str, name: &str) -> String {
        let slot = self.seen.entry(name.to_owned()).or_insert(0);
        let id = symbol_id(relative_path, name, *slot);
        *slot += 1;
        id
    }
}
