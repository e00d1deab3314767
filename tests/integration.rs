use std::path::Path;
use std::process::{Command, Output};

struct Workspace {
    repo: tempfile::TempDir,
    state: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            repo: tempfile::tempdir().unwrap(),
            state: tempfile::tempdir().unwrap(),
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.repo.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn quarry(&self, args: &[&str]) -> Output {
        self.quarry_with_stdin(args, None)
    }

    fn quarry_with_stdin(&self, args: &[&str], stdin: Option<&str>) -> Output {
        use std::io::Write;
        use std::process::Stdio;

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_quarry"));
        cmd.arg("--config")
            .arg(self.state.path().join("quarry.toml"))
            .args(args)
            .env("QUARRY_INDEX_DIR", self.index_dir())
            .env("QUARRY_EMBEDDING_PROVIDER", "hash")
            .env("RUST_LOG", "warn")
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().unwrap();
        if let Some(input) = stdin {
            child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
        }
        child.wait_with_output().unwrap()
    }

    fn index_dir(&self) -> std::path::PathBuf {
        self.state.path().join("index")
    }

    fn root(&self) -> &str {
        self.repo.path().to_str().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn fixture() -> Workspace {
    let ws = Workspace::new();
    ws.write("a.py", "def add(a, b): return a + b\n");
    ws.write("b.c", "struct Point { int x; int y; };\n");
    ws
}

#[test]
fn build_then_ask_ranks_add_first() {
    let ws = fixture();
    let build = ws.quarry(&["build", ws.root()]);
    assert!(build.status.success(), "{}", String::from_utf8_lossy(&build.stderr));
    assert!(stdout(&build).contains("2 symbols"));
    assert!(Path::new(&ws.index_dir()).join("meta.json").exists());

    let ask = ws.quarry(&["ask", "addition", "function"]);
    assert!(ask.status.success());
    let out = stdout(&ask);
    let first = out.lines().next().unwrap();
    assert!(first.contains("a.py:1-1"), "{out}");
    assert!(first.contains("function add"), "{out}");
}

#[test]
fn ask_context_packs_map_and_code_within_budget() {
    let ws = fixture();
    assert!(ws.quarry(&["build", ws.root()]).status.success());

    let ask = ws.quarry(&["ask", "addition", "function", "--context"]);
    assert!(ask.status.success());
    let out = stdout(&ask);
    let (map, hits) = out.split_once("=== ").unwrap();
    assert!(map.contains("function add (line 1)"), "{out}");
    assert!(hits.starts_with("a.py:1-1 (score="), "{out}");
    assert!(hits.contains("def add(a, b): return a + b"), "{out}");

    let tight = ws.quarry(&["ask", "addition", "function", "--context", "--max-chars", "40"]);
    assert!(tight.status.success());
    let out = stdout(&tight);
    assert!(!out.contains("==="), "{out}");
    assert!(out.trim_end().chars().count() <= 20, "{out}");
}

#[test]
fn ask_with_kind_filter() {
    let ws = fixture();
    assert!(ws.quarry(&["build", ws.root()]).status.success());

    let ask = ws.quarry(&["ask", "point", "--kind", "struct", "--json"]);
    assert!(ask.status.success());
    let results: serde_json::Value = serde_json::from_slice(&ask.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "b.c:Point:0");
    assert_eq!(results[0]["kind"], "struct");
}

#[test]
fn empty_repository_prints_no_results() {
    let ws = Workspace::new();
    assert!(ws.quarry(&["build", ws.root()]).status.success());

    let ask = ws.quarry(&["ask", "anything"]);
    assert!(ask.status.success());
    assert_eq!(stdout(&ask).trim(), "no results");
}

#[test]
fn ask_without_index_fails() {
    let ws = fixture();
    let ask = ws.quarry(&["ask", "add"]);
    assert!(!ask.status.success());
    assert!(String::from_utf8_lossy(&ask.stderr).contains("index"));
}

#[test]
fn build_reports_skipped_files() {
    let ws = fixture();
    ws.write("broken.py", ")))) ]]]] }}}} ;;;; :::: ))))\n");
    let build = ws.quarry(&["build", ws.root()]);
    assert!(build.status.success());
    let out = stdout(&build);
    assert!(out.contains("skipped 1 files"), "{out}");
    assert!(out.contains("broken.py [parse_error]"), "{out}");
}

#[test]
fn incremental_build_reports_changes() {
    let ws = fixture();
    assert!(ws.quarry(&["build", ws.root()]).status.success());
    ws.write("c.py", "def mul(a, b):\n    return a * b\n");

    let build = ws.quarry(&["build", ws.root(), "--incremental"]);
    assert!(build.status.success());
    let out = stdout(&build);
    assert!(out.contains("1 added, 0 updated, 0 removed, 2 unchanged"), "{out}");
    assert!(out.contains("3 symbols"), "{out}");
}

#[test]
fn tool_call_from_stdin() {
    let ws = fixture();
    assert!(ws.quarry(&["build", ws.root()]).status.success());

    let out = ws.quarry_with_stdin(
        &["tool"],
        Some(r#"{"tool_id": "search_codebase", "params": {"query": "add numbers", "n_results": 1}}"#),
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).starts_with("--- Result 1 (a.py:1-1) ---\nKind: function, Name: add\n"));
}

#[test]
fn tool_list_prints_schema() {
    let ws = fixture();
    assert!(ws.quarry(&["build", ws.root()]).status.success());

    let out = ws.quarry(&["tool", "--list"]);
    assert!(out.status.success());
    let defs: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(defs[0]["name"], "search_codebase");
    assert_eq!(defs[0]["parameters"]["properties"]["query"]["type"], "string");
}

#[test]
fn map_lists_files_and_symbols() {
    let ws = fixture();
    assert!(ws.quarry(&["build", ws.root()]).status.success());

    let out = stdout(&ws.quarry(&["map"]));
    assert!(out.contains("a.py\n  function add (line 1)"), "{out}");
    assert!(out.contains("b.c\n  struct Point (line 1)"), "{out}");
}
