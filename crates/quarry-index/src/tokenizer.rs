//! Identifier-aware tokenization shared by indexing and querying.
//!
//! Text is split into alphanumeric/underscore words, lowercased. Compound
//! identifiers also contribute their `snake_case` and `camelCase` parts, so
//! `parseHttpRequest` yields `parsehttprequest`, `parse`, `http`, `request`.

use std::collections::HashSet;

/// All tokens of `text` in order, duplicates kept (term frequencies).
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let parts: Vec<&str> = word
            .split('_')
            .filter(|p| !p.is_empty())
            .flat_map(split_camel)
            .collect();

        let whole = word.trim_matches('_');
        if !whole.is_empty() {
            out.push(whole.to_lowercase());
        }
        if parts.len() > 1 {
            out.extend(parts.into_iter().map(str::to_lowercase));
        }
    }
    out
}

/// Query tokens: same splitting as [`tokenize`], deduplicated in
/// first-occurrence order.
#[must_use]
pub fn query_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Split on lower→upper transitions and before the last capital of an
/// acronym run (`HTTPServer` → `HTTP`, `Server`).
fn split_camel(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in 1..chars.len() {
        let (idx, c) = chars[i];
        let prev = chars[i - 1].1;
        let next_lower = chars.get(i + 1).is_some_and(|(_, n)| n.is_lowercase());
        let boundary = c.is_uppercase()
            && (prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_lower));
        if boundary {
            parts.push(&word[start..idx]);
            start = idx;
        }
    }
    parts.push(&word[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn plain_words_lowercased() {
        assert_eq!(tokenize("Addition Function"), vec!["addition", "function"]);
    }

    #[test]
    fn punctuation_splits() {
        assert_eq!(
            tokenize("def add(a, b): return a + b"),
            vec!["def", "add", "a", "b", "return", "a", "b"]
        );
    }

    #[test]
    fn snake_case_expands() {
        assert_eq!(
            tokenize("parse_config"),
            vec!["parse_config", "parse", "config"]
        );
    }

    #[test]
    fn camel_case_expands() {
        assert_eq!(
            tokenize("parseHttpRequest"),
            vec!["parsehttprequest", "parse", "http", "request"]
        );
        assert_eq!(tokenize("HTTPServer"), vec!["httpserver", "http", "server"]);
    }

    #[test]
    fn leading_underscores_trimmed() {
        assert_eq!(tokenize("__init__"), vec!["init"]);
    }

    #[test]
    fn query_tokens_dedup_in_order() {
        assert_eq!(
            query_tokens("add Add numbers add"),
            vec!["add", "numbers"]
        );
    }

    #[test]
    fn blank_text_has_no_tokens() {
        assert!(tokenize("  \n\t ").is_empty());
        assert!(tokenize("+-*/").is_empty());
    }

    proptest! {
        #[test]
        fn tokens_are_lowercase_and_nonempty(text in "[a-zA-Z0-9_ .()]{0,64}") {
            for token in tokenize(&text) {
                prop_assert!(!token.is_empty());
                prop_assert_eq!(token.to_lowercase(), token.clone());
            }
        }
    }
}
