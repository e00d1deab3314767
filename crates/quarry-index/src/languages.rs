//! Language detection and tree-sitter grammar registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported language with its tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    C,
    Cpp,
}

impl Lang {
    /// Identifier used in `symbols.jsonl` and query filters.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::C => "c",
            Self::Cpp => "cpp",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "python" => Some(Self::Python),
            "c" => Some(Self::C),
            "cpp" => Some(Self::Cpp),
            _ => None,
        }
    }

    /// Get the tree-sitter grammar. Returns `None` if the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-c")]
            Self::C => Some(tree_sitter_c::LANGUAGE.into()),
            #[cfg(feature = "lang-cpp")]
            Self::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Node kinds that define a function.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn function_kinds(self) -> &'static [&'static str] {
        &["function_definition"]
    }

    /// Node kinds that define a class or struct (only emitted with a body).
    #[must_use]
    pub fn type_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["class_definition"],
            Self::C => &["struct_specifier"],
            Self::Cpp => &["class_specifier", "struct_specifier"],
        }
    }

    /// Type kinds whose bodies turn nested functions into methods.
    #[must_use]
    pub fn method_container_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["class_definition"],
            Self::C => &[],
            Self::Cpp => &["class_specifier", "struct_specifier"],
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "py" => Some(Lang::Python),
        "c" | "h" => Some(Lang::C),
        "cpp" | "hpp" | "cc" | "cxx" => Some(Lang::Cpp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_language_py() {
        assert_eq!(detect_language(Path::new("pkg/mod.py")), Some(Lang::Python));
    }

    #[test]
    fn detect_language_c_and_header() {
        assert_eq!(detect_language(Path::new("src/main.c")), Some(Lang::C));
        assert_eq!(detect_language(Path::new("include/point.h")), Some(Lang::C));
    }

    #[test]
    fn detect_language_cpp_variants() {
        for name in ["a.cpp", "a.hpp", "a.cc", "a.cxx"] {
            assert_eq!(detect_language(Path::new(name)), Some(Lang::Cpp), "{name}");
        }
    }

    #[test]
    fn detect_language_is_case_sensitive() {
        assert_eq!(detect_language(Path::new("A.PY")), None);
        assert_eq!(detect_language(Path::new("main.C")), None);
    }

    #[test]
    fn detect_language_unknown() {
        assert_eq!(detect_language(Path::new("lib.rs")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
        assert_eq!(detect_language(Path::new("script.pyi")), None);
    }

    #[test]
    fn id_roundtrips_through_from_id() {
        for lang in [Lang::Python, Lang::C, Lang::Cpp] {
            assert_eq!(Lang::from_id(lang.id()), Some(lang));
        }
        assert_eq!(Lang::from_id("rust"), None);
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Lang::Cpp).unwrap(), "\"cpp\"");
    }

    #[cfg(all(feature = "lang-python", feature = "lang-c", feature = "lang-cpp"))]
    #[test]
    fn all_grammars_available() {
        assert!(Lang::Python.grammar().is_some());
        assert!(Lang::C.grammar().is_some());
        assert!(Lang::Cpp.grammar().is_some());
    }
}
