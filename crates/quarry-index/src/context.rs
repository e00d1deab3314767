//! Text built around symbols: embedding input and packed prompt context.

use std::fmt::Write;

use crate::retriever::RetrievalResult;
use crate::store::Index;
use crate::symbol::Symbol;

/// Upper bound on the characters sent per symbol.
pub const MAX_EMBEDDING_CHARS: usize = 8_000;

/// Default character budget of [`pack_context`].
pub const DEFAULT_CONTEXT_CHARS: usize = 80_000;

/// Prefix the symbol's code with its location and declaration so that the
/// vector carries file and signature context.
#[must_use]
pub fn contextualize_for_embedding(symbol: &Symbol) -> String {
    let mut text = format!("# {}\n# Language: {}\n", symbol.file_path, symbol.language);
    if !symbol.signature.is_empty() {
        text.push_str("# Signature: ");
        text.push_str(&symbol.signature);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(&symbol.content);
    let keep = char_prefix(&text, MAX_EMBEDDING_CHARS).len();
    text.truncate(keep);
    text
}

/// Pack the repository map and the retrieved symbols into one context of at
/// most `max_chars` characters.
///
/// The map gets at most half the budget. Symbols follow in rank order, each
/// under a `=== path:start-end (score=..) ===` header with 1-based lines.
/// Packing stops at the first symbol that no longer fits.
#[must_use]
pub fn pack_context(
    repo_map: &str,
    index: &Index,
    results: &[RetrievalResult],
    max_chars: usize,
) -> String {
    let mut out = String::new();
    let mut used = 0;

    let map = repo_map.trim();
    if !map.is_empty() {
        let map = char_prefix(map, max_chars / 2);
        out.push_str(map);
        out.push_str("\n\n");
        used += map.chars().count() + 2;
    }

    for result in results {
        let Some(symbol) = index.symbol(&result.symbol_id) else {
            continue;
        };
        let mut block = String::new();
        let _ = write!(
            block,
            "=== {}:{}-{} (score={:.3}) ===\n{}\n\n",
            symbol.file_path,
            symbol.start_line + 1,
            symbol.end_line + 1,
            result.score,
            symbol.content.trim()
        );
        let len = block.chars().count();
        if used + len > max_chars {
            break;
        }
        out.push_str(&block);
        used += len;
    }

    out.trim().to_owned()
}

fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
