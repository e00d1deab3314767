//! Symbol extraction from a single source file via tree-sitter.

use tree_sitter::{Node, Parser};

use crate::error::{IndexError, Result};
use crate::languages::Lang;
use crate::symbol::SymbolKind;

/// A definition found in one file, before an id and path are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub signature: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

/// Nearest enclosing definition while walking the tree.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Enclosing {
    None,
    Function,
    MethodContainer,
    OtherType,
}

struct ExtractCtx<'a> {
    source: &'a str,
    lang: Lang,
}

/// Parse `source` and return every function, method, class and struct
/// definition in document order.
///
/// Local `ERROR` and `MISSING` nodes are tolerated: macro invocations and
/// other constructs a grammar cannot follow still leave the surrounding
/// definitions intact. With `strict` set, input the grammar rejects outright
/// (an `ERROR` root, or error nodes spanning most of the file) is refused.
/// Otherwise whatever partial tree comes back is used.
///
/// # Errors
///
/// Returns [`IndexError::Parse`] if no grammar is compiled in for `lang`, the
/// parser produces no tree, or `strict` is set and the input is unparseable.
pub fn extract(source: &str, lang: Lang, strict: bool) -> Result<Vec<ExtractedSymbol>> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| IndexError::Parse(format!("no grammar for {}", lang.id())))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse("parser returned no tree".into()))?;

    let root = tree.root_node();
    if strict && root.has_error() && is_rejected(&root, source) {
        let line = first_error_line(&root).unwrap_or(0);
        return Err(IndexError::Parse(format!(
            "unparseable input, first syntax error near line {}",
            line + 1
        )));
    }

    let ctx = ExtractCtx { source, lang };
    let mut out = Vec::new();
    visit(&ctx, &root, Enclosing::None, &mut out);
    Ok(out)
}

fn visit(ctx: &ExtractCtx<'_>, node: &Node, enclosing: Enclosing, out: &mut Vec<ExtractedSymbol>) {
    let kind = node.kind();
    let mut inner = enclosing;

    if ctx.lang.function_kinds().contains(&kind) {
        let symbol_kind = if enclosing == Enclosing::MethodContainer {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let name = function_name(node, ctx.source).unwrap_or_default();
        out.push(make_symbol(ctx, node, symbol_kind, name));
        inner = Enclosing::Function;
    } else if ctx.lang.type_kinds().contains(&kind) && node.child_by_field_name("body").is_some()
    {
        let symbol_kind = if kind == "struct_specifier" {
            SymbolKind::Struct
        } else {
            SymbolKind::Class
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, ctx.source).to_owned())
            .unwrap_or_default();
        out.push(make_symbol(ctx, node, symbol_kind, name));
        inner = if ctx.lang.method_container_kinds().contains(&kind) {
            Enclosing::MethodContainer
        } else {
            Enclosing::OtherType
        };
    }

    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        visit(ctx, &child, inner, out);
    }
}

fn make_symbol(ctx: &ExtractCtx<'_>, node: &Node, kind: SymbolKind, name: String) -> ExtractedSymbol {
    let content = node_text(node, ctx.source);
    let start_line = node.start_position().row;
    let end = node.end_position();
    let end_line = if end.column == 0 && end.row > start_line {
        end.row - 1
    } else {
        end.row
    };

    ExtractedSymbol {
        kind,
        name,
        signature: signature(node, ctx.source),
        start_line,
        end_line,
        content: content.to_owned(),
    }
}

/// Declaration text up to the body, collapsed onto one line.
fn signature(node: &Node, source: &str) -> String {
    let head = match node.child_by_field_name("body") {
        Some(body) => source.get(node.start_byte()..body.start_byte()).unwrap_or(""),
        None => node_text(node, source).lines().next().unwrap_or(""),
    };
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(':').trim_end().to_owned()
}

/// Python carries a `name` field; C/C++ bury the identifier in a declarator chain
/// (`pointer_declarator` → `function_declarator` → `identifier`).
fn function_name(node: &Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(&name, source).to_owned());
    }

    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
            | "operator_name" | "template_function" => {
                return Some(node_text(&current, source).to_owned());
            }
            _ => {
                current = current
                    .child_by_field_name("declarator")
                    .or_else(|| current.named_child(0))?;
            }
        }
    }
}

/// The grammar made no sense of the input: the root itself is an error, or
/// error nodes cover more than half of the non-whitespace bytes.
fn is_rejected(root: &Node, source: &str) -> bool {
    if root.is_error() {
        return true;
    }
    let significant = source.bytes().filter(|b| !b.is_ascii_whitespace()).count();
    significant > 0 && error_bytes(root) * 2 > significant
}

/// Bytes covered by outermost `ERROR` nodes.
fn error_bytes(node: &Node) -> usize {
    if node.is_error() {
        return node.end_byte() - node.start_byte();
    }
    if !node.has_error() {
        return 0;
    }
    let child_count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
    (0..child_count)
        .filter_map(|i| node.child(i))
        .map(|child| error_bytes(&child))
        .sum()
}

fn first_error_line(node: &Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row);
    }
    let child_count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.child(i) else {
            continue;
        };
        if child.has_error()
            && let Some(line) = first_error_line(&child)
        {
            return Some(line);
        }
    }
    None
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(symbols: &[ExtractedSymbol]) -> Vec<(&str, SymbolKind)> {
        symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect()
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_function_one_liner() {
        let src = "def add(a, b): return a + b\n";
        let symbols = extract(src, Lang::Python, true).unwrap();
        assert_eq!(symbols.len(), 1);
        let add = &symbols[0];
        assert_eq!(add.name, "add");
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(add.signature, "def add(a, b)");
        assert_eq!(add.start_line, 0);
        assert_eq!(add.end_line, 0);
        assert_eq!(add.content.trim_end(), "def add(a, b): return a + b");
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_class_methods_are_flat() {
        let src = "\
class Greeter:
    def hello(self):
        def inner():
            pass
        return inner

def top():
    pass
";
        let symbols = extract(src, Lang::Python, true).unwrap();
        assert_eq!(
            names(&symbols),
            vec![
                ("Greeter", SymbolKind::Class),
                ("hello", SymbolKind::Method),
                ("inner", SymbolKind::Function),
                ("top", SymbolKind::Function),
            ]
        );
        assert_eq!(symbols[0].start_line, 0);
        assert_eq!(symbols[0].end_line, 4);
        assert_eq!(symbols[0].signature, "class Greeter");
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_decorated_method_still_method() {
        let src = "class A:\n    @staticmethod\n    def make():\n        pass\n";
        let symbols = extract(src, Lang::Python, true).unwrap();
        assert_eq!(
            names(&symbols),
            vec![("A", SymbolKind::Class), ("make", SymbolKind::Method)]
        );
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn content_is_byte_faithful() {
        let src = "def f(x):\n    # odd   spacing\n    return  x\n";
        let symbols = extract(src, Lang::Python, true).unwrap();
        let f = &symbols[0];
        assert!(f.content.starts_with("def f(x):\n    # odd   spacing\n    return  x"));
        assert!(src.starts_with(&f.content));
        assert_eq!((f.start_line, f.end_line), (0, 2));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn strict_rejects_unparseable_input() {
        let src = ")))) ]]]] }}}} ;;;; :::: ))))\n";
        let err = extract(src, Lang::Python, true).unwrap_err();
        assert!(matches!(err, IndexError::Parse(_)));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn lenient_keeps_partial_tree() {
        let src = "def ok():\n    pass\n\ndef broken(:\n    pass\n";
        let symbols = extract(src, Lang::Python, false).unwrap();
        assert!(symbols.iter().any(|s| s.name == "ok"));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn empty_source_has_no_symbols() {
        assert!(extract("", Lang::Python, true).unwrap().is_empty());
    }

    #[cfg(feature = "lang-c")]
    #[test]
    fn c_struct_and_functions() {
        let src = "\
struct Point { int x; int y; };

static int *make(void) { return 0; }

int main(void) {
    struct Point p;
    return 0;
}
";
        let symbols = extract(src, Lang::C, true).unwrap();
        assert_eq!(
            names(&symbols),
            vec![
                ("Point", SymbolKind::Struct),
                ("make", SymbolKind::Function),
                ("main", SymbolKind::Function),
            ]
        );
        assert_eq!(symbols[0].signature, "struct Point");
        assert_eq!(symbols[2].signature, "int main(void)");
        assert_eq!(symbols[2].start_line, 4);
        assert_eq!(symbols[2].end_line, 7);
    }

    #[cfg(feature = "lang-c")]
    #[test]
    fn c_macro_loop_keeps_surrounding_definitions() {
        let src = "\
struct item {
    int v;
    struct item *next;
};

int sum(struct item *head) {
    int total = 0;
    struct item *pos;
    list_for_each_entry(pos, head, node) {
        total += pos->v;
    }
    return total;
}
";
        let symbols = extract(src, Lang::C, true).unwrap();
        assert_eq!(
            names(&symbols),
            vec![("item", SymbolKind::Struct), ("sum", SymbolKind::Function)]
        );
        assert_eq!(symbols[1].start_line, 5);
    }

    #[cfg(feature = "lang-c")]
    #[test]
    fn c_anonymous_struct_keeps_empty_name() {
        let src = "struct { int a; } anon;\n";
        let symbols = extract(src, Lang::C, true).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].kind, SymbolKind::Struct);
        assert_eq!(symbols[0].name, "");
    }

    #[cfg(feature = "lang-cpp")]
    #[test]
    fn cpp_class_methods_and_out_of_line_definition() {
        let src = "\
class Shape {
public:
    double area() const { return 0.0; }
};

double Shape_total(Shape s) { return s.area(); }

void Shape::reset() {}
";
        let symbols = extract(src, Lang::Cpp, true).unwrap();
        assert_eq!(
            names(&symbols),
            vec![
                ("Shape", SymbolKind::Class),
                ("area", SymbolKind::Method),
                ("Shape_total", SymbolKind::Function),
                ("Shape::reset", SymbolKind::Function),
            ]
        );
    }

    #[cfg(feature = "lang-cpp")]
    #[test]
    fn cpp_struct_methods() {
        let src = "struct Counter {\n    int n;\n    void bump() { n++; }\n};\n";
        let symbols = extract(src, Lang::Cpp, true).unwrap();
        assert_eq!(
            names(&symbols),
            vec![("Counter", SymbolKind::Struct), ("bump", SymbolKind::Method)]
        );
    }
}
