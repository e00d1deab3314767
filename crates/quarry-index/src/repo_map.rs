//! Repository walk, per-file extraction and the condensed repository map.
//!
//! Files are parsed on blocking worker tasks bounded by
//! [`ScanConfig::parse_workers`], but results are consumed strictly in
//! lexicographic path order, which keeps occurrence indices and therefore
//! symbol ids reproducible.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::path::{Path, PathBuf};

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Result;
use crate::extractor::{ExtractedSymbol, extract};
use crate::languages::{Lang, detect_language};
use crate::symbol::{OccurrenceCounter, Symbol, SymbolSummary};

/// Directory names never descended into, at any depth.
pub const EXCLUDED_DIRS: &[&str] = &["build", "dist", "venv", "__pycache__"];

/// Walk and parse settings for one build.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound on files parsed concurrently.
    pub parse_workers: usize,
    /// Skip files the grammar rejects outright instead of indexing whatever
    /// partial tree it produced. Local syntax errors never skip a file.
    pub strict_parse: bool,
    /// Also honour `.gitignore` inside git repositories. Off by default, so
    /// only [`EXCLUDED_DIRS`] and dot-entries are left out.
    pub respect_gitignore: bool,
    /// Additional directory names excluded like [`EXCLUDED_DIRS`].
    pub extra_excluded_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parse_workers: std::thread::available_parallelism().map_or(4, usize::from),
            strict_parse: true,
            respect_gitignore: false,
            extra_excluded_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Encoding,
    ParseError,
    Io,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Encoding => "encoding",
            Self::ParseError => "parse_error",
            Self::Io => "io",
        })
    }
}

/// A file left out of the index. Diagnostic only, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_path: String,
    pub reason: SkipReason,
    pub detail: String,
}

/// Emitted after every processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    pub files_processed: usize,
    pub files_total: usize,
    pub symbols_emitted: usize,
}

/// A source file selected by the walk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub lang: Lang,
}

/// Symbols of an unchanged file carried over from a previous index.
#[derive(Debug, Clone)]
pub struct ReusedFile {
    pub content_hash: String,
    pub symbols: Vec<Symbol>,
}

/// All symbols of one file, ids assigned.
#[derive(Debug, Clone)]
pub struct FileSymbols {
    pub file_path: String,
    pub content_hash: String,
    pub symbols: Vec<Symbol>,
    pub reused: bool,
}

/// File path → symbol summaries in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoMap {
    files: BTreeMap<String, Vec<SymbolSummary>>,
}

impl RepoMap {
    pub fn insert(&mut self, file_path: String, summaries: Vec<SymbolSummary>) {
        self.files.insert(file_path, summaries);
    }

    #[must_use]
    pub fn files(&self) -> &BTreeMap<String, Vec<SymbolSummary>> {
        &self.files
    }

    #[must_use]
    pub fn get(&self, file_path: &str) -> Option<&[SymbolSummary]> {
        self.files.get(file_path).map(Vec::as_slice)
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Human-readable overview: files with the most symbols first (ties by
    /// path), symbols in line order, 1-based line numbers.
    #[must_use]
    pub fn render(&self, max_files: usize, max_symbols_per_file: usize) -> String {
        let mut entries: Vec<(&String, &Vec<SymbolSummary>)> =
            self.files.iter().filter(|(_, s)| !s.is_empty()).collect();
        entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        let mut out = String::new();
        for (idx, (path, summaries)) in entries.iter().enumerate() {
            if idx >= max_files {
                let remaining = entries.len() - idx;
                let _ = writeln!(out, "... and {remaining} more files");
                break;
            }

            let _ = writeln!(out, "{path}");
            let mut ordered: Vec<&SymbolSummary> = summaries.iter().collect();
            ordered.sort_by_key(|s| s.start_line);
            for summary in ordered.iter().take(max_symbols_per_file) {
                let name = if summary.name.is_empty() {
                    "(anonymous)"
                } else {
                    summary.name.as_str()
                };
                let _ = writeln!(
                    out,
                    "  {} {name} (line {})",
                    summary.kind,
                    summary.start_line + 1
                );
            }
            if ordered.len() > max_symbols_per_file {
                let _ = writeln!(out, "  ... {} more", ordered.len() - max_symbols_per_file);
            }
        }
        out
    }
}

/// Walks a repository and turns it into a stream of per-file symbols.
pub struct RepoMapBuilder {
    config: ScanConfig,
    progress: Option<UnboundedSender<BuildProgress>>,
}

impl RepoMapBuilder {
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, tx: UnboundedSender<BuildProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// List indexable files under `root`, sorted by relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be read.
    pub fn scan(&self, root: &Path) -> Result<Vec<SourceFile>> {
        std::fs::read_dir(root)?;

        let extra = self.config.extra_excluded_dirs.clone();
        let walker = ignore::WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_global(false)
            .git_ignore(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let lossy = entry.file_name().to_string_lossy();
                let name: &str = &lossy;
                if name.starts_with('.') {
                    return false;
                }
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir && (EXCLUDED_DIRS.contains(&name) || extra.iter().any(|e| e == name)))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("walk error: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Some(lang) = detect_language(entry.path()) else {
                continue;
            };
            if lang.grammar().is_none() {
                continue;
            }
            files.push(SourceFile {
                rel_path: relative_path(root, entry.path()),
                abs_path: entry.path().to_path_buf(),
                lang,
            });
        }

        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        tracing::debug!(files = files.len(), root = %root.display(), "scan complete");
        Ok(files)
    }

    /// Start a full build: every file is parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be read.
    pub fn build(&self, root: &Path) -> Result<SymbolStream> {
        self.build_with_reuse(root, HashMap::new())
    }

    /// Start a build where files present in `reuse` skip parsing and keep
    /// the given symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be read.
    pub fn build_with_reuse(
        &self,
        root: &Path,
        mut reuse: HashMap<String, ReusedFile>,
    ) -> Result<SymbolStream> {
        let files = self.scan(root)?;
        let files_total = files.len();
        tracing::info!(files = files_total, "scan started");

        let strict = self.config.strict_parse;
        let jobs: Vec<Job> = files
            .into_iter()
            .map(|file| match reuse.remove(&file.rel_path) {
                Some(reused) => Job::Reuse(file.rel_path, reused),
                None => Job::Parse(file),
            })
            .collect();

        let inner = stream::iter(jobs)
            .map(move |job| run_job(job, strict))
            .buffered(self.config.parse_workers.max(1))
            .boxed();

        Ok(SymbolStream {
            inner,
            map: RepoMap::default(),
            skipped: Vec::new(),
            progress: self.progress.clone(),
            files_total,
            files_processed: 0,
            symbols_emitted: 0,
        })
    }

    /// Drain a full build into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be read.
    pub async fn collect(&self, root: &Path) -> Result<CollectedBuild> {
        let mut stream = self.build(root)?;
        let mut symbols = Vec::new();
        while let Some(file) = stream.next_file().await {
            symbols.extend(file.symbols);
        }
        let (map, skipped) = stream.finish();
        Ok(CollectedBuild {
            map,
            symbols,
            skipped,
        })
    }

    /// blake3 hash of every indexable file, keyed by relative path.
    /// Unreadable files are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be read.
    pub async fn hash_files(&self, root: &Path) -> Result<BTreeMap<String, String>> {
        let files = self.scan(root)?;
        let hashes: Vec<Option<(String, String)>> = stream::iter(files)
            .map(|file| async move {
                let rel = file.rel_path;
                let abs = file.abs_path;
                tokio::task::spawn_blocking(move || {
                    std::fs::read(&abs).ok().map(|bytes| (rel, blake3_hex(&bytes)))
                })
                .await
                .ok()
                .flatten()
            })
            .buffered(self.config.parse_workers.max(1))
            .collect()
            .await;
        Ok(hashes.into_iter().flatten().collect())
    }
}

/// Result of [`RepoMapBuilder::collect`].
#[derive(Debug)]
pub struct CollectedBuild {
    pub map: RepoMap,
    pub symbols: Vec<Symbol>,
    pub skipped: Vec<SkippedFile>,
}

enum Job {
    Parse(SourceFile),
    Reuse(String, ReusedFile),
}

enum JobOutcome {
    Parsed {
        rel_path: String,
        lang: Lang,
        content_hash: String,
        extracted: Vec<ExtractedSymbol>,
    },
    Reused(String, ReusedFile),
    Skipped(SkippedFile),
}

async fn run_job(job: Job, strict: bool) -> JobOutcome {
    match job {
        Job::Reuse(rel_path, reused) => JobOutcome::Reused(rel_path, reused),
        Job::Parse(file) => {
            let rel_path = file.rel_path.clone();
            tokio::task::spawn_blocking(move || parse_file(file, strict))
                .await
                .unwrap_or_else(|e| {
                    JobOutcome::Skipped(SkippedFile {
                        file_path: rel_path,
                        reason: SkipReason::ParseError,
                        detail: format!("parser task failed: {e}"),
                    })
                })
        }
    }
}

fn parse_file(file: SourceFile, strict: bool) -> JobOutcome {
    let skip = |reason, detail: String| {
        JobOutcome::Skipped(SkippedFile {
            file_path: file.rel_path.clone(),
            reason,
            detail,
        })
    };

    let bytes = match std::fs::read(&file.abs_path) {
        Ok(bytes) => bytes,
        Err(e) => return skip(SkipReason::Io, e.to_string()),
    };
    let content_hash = blake3_hex(&bytes);
    let source = match String::from_utf8(bytes) {
        Ok(source) => source,
        Err(e) => return skip(SkipReason::Encoding, e.to_string()),
    };

    match extract(&source, file.lang, strict) {
        Ok(extracted) => JobOutcome::Parsed {
            rel_path: file.rel_path.clone(),
            lang: file.lang,
            content_hash,
            extracted,
        },
        Err(e) => skip(SkipReason::ParseError, e.to_string()),
    }
}

/// Ordered, lazily parsed per-file symbols of one build.
///
/// Accumulates the [`RepoMap`] and skipped-file diagnostics as it is drained;
/// call [`SymbolStream::finish`] once [`SymbolStream::next_file`] returns `None`.
pub struct SymbolStream {
    inner: BoxStream<'static, JobOutcome>,
    map: RepoMap,
    skipped: Vec<SkippedFile>,
    progress: Option<UnboundedSender<BuildProgress>>,
    files_total: usize,
    files_processed: usize,
    symbols_emitted: usize,
}

impl SymbolStream {
    #[must_use]
    pub fn files_total(&self) -> usize {
        self.files_total
    }

    pub async fn next_file(&mut self) -> Option<FileSymbols> {
        loop {
            let outcome = self.inner.next().await?;
            self.files_processed += 1;

            let file = match outcome {
                JobOutcome::Parsed {
                    rel_path,
                    lang,
                    content_hash,
                    extracted,
                } => FileSymbols {
                    symbols: assign_ids(&rel_path, lang, extracted),
                    file_path: rel_path,
                    content_hash,
                    reused: false,
                },
                JobOutcome::Reused(rel_path, reused) => FileSymbols {
                    file_path: rel_path,
                    content_hash: reused.content_hash,
                    symbols: reused.symbols,
                    reused: true,
                },
                JobOutcome::Skipped(skipped) => {
                    tracing::warn!(
                        file = %skipped.file_path,
                        reason = %skipped.reason,
                        "skipping file: {}",
                        skipped.detail
                    );
                    self.skipped.push(skipped);
                    self.report_progress();
                    continue;
                }
            };

            self.symbols_emitted += file.symbols.len();
            self.map.insert(
                file.file_path.clone(),
                file.symbols.iter().map(Symbol::summary).collect(),
            );
            tracing::debug!(
                file = %file.file_path,
                progress = format_args!("{}/{}", self.files_processed, self.files_total),
                symbols = file.symbols.len(),
                reused = file.reused,
            );
            self.report_progress();
            return Some(file);
        }
    }

    /// The repository map and skipped files observed so far.
    #[must_use]
    pub fn finish(self) -> (RepoMap, Vec<SkippedFile>) {
        (self.map, self.skipped)
    }

    fn report_progress(&self) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(BuildProgress {
                files_processed: self.files_processed,
                files_total: self.files_total,
                symbols_emitted: self.symbols_emitted,
            });
        }
    }
}

fn assign_ids(rel_path: &str, lang: Lang, extracted: Vec<ExtractedSymbol>) -> Vec<Symbol> {
    let mut counter = OccurrenceCounter::default();
    extracted
        .into_iter()
        .map(|s| Symbol {
            id: counter.next_id(rel_path, &s.name),
            file_path: rel_path.to_owned(),
            kind: s.kind,
            name: s.name,
            signature: s.signature,
            start_line: s.start_line,
            end_line: s.end_line,
            content: s.content,
            language: lang,
        })
        .collect()
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::symbol::SymbolKind;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn builder() -> RepoMapBuilder {
        RepoMapBuilder::new(ScanConfig {
            parse_workers: 4,
            ..ScanConfig::default()
        })
    }

    #[test]
    fn scan_excludes_dot_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/keep.py", b"x = 1\n");
        write(root, "src/.hidden/skip.py", b"x = 1\n");
        write(root, ".venv/skip.py", b"x = 1\n");
        write(root, "build/skip.c", b"int x;\n");
        write(root, "pkg/dist/skip.c", b"int x;\n");
        write(root, "venv/skip.py", b"x = 1\n");
        write(root, "a/__pycache__/skip.py", b"x = 1\n");
        write(root, "Build/keep.c", b"int x;\n");
        write(root, "notes.txt", b"hello");
        write(root, ".dotfile.py", b"x = 1\n");

        let files = builder().scan(root).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["Build/keep.c", "src/keep.py"]);
    }

    #[test]
    fn scan_honours_extra_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vendor/lib.c", b"int x;\n");
        write(dir.path(), "main.c", b"int x;\n");

        let builder = RepoMapBuilder::new(ScanConfig {
            extra_excluded_dirs: vec!["vendor".into()],
            ..ScanConfig::default()
        });
        let files = builder.scan(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "main.c");
    }

    #[test]
    fn scan_keeps_gitignored_sources_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        write(dir.path(), ".gitignore", b"generated.py\n");
        write(dir.path(), "generated.py", b"def gen():\n    pass\n");
        write(dir.path(), "main.py", b"def main():\n    pass\n");

        let paths = |builder: RepoMapBuilder| -> Vec<String> {
            builder
                .scan(dir.path())
                .unwrap()
                .into_iter()
                .map(|f| f.rel_path)
                .collect()
        };
        assert_eq!(paths(builder()), vec!["generated.py", "main.py"]);

        let honouring = RepoMapBuilder::new(ScanConfig {
            respect_gitignore: true,
            ..ScanConfig::default()
        });
        assert_eq!(paths(honouring), vec!["main.py"]);
    }

    #[tokio::test]
    async fn collect_keeps_c_file_with_macro_loop() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "list.c",
            b"struct item { int v; };\n\nint sum(struct item *head) {\n    int total = 0;\n    struct item *pos;\n    list_for_each_entry(pos, head, node) {\n        total += pos->v;\n    }\n    return total;\n}\n",
        );

        let build = builder().collect(dir.path()).await.unwrap();
        assert!(build.skipped.is_empty(), "{:?}", build.skipped);
        let ids: Vec<&str> = build.symbols.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["list.c:item:0", "list.c:sum:0"]);
    }

    #[test]
    fn scan_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(builder().scan(&dir.path().join("nope")).is_err());
    }

    #[tokio::test]
    async fn collect_assigns_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "dup.py",
            b"def f():\n    pass\n\ndef f():\n    pass\n",
        );

        let build = builder().collect(dir.path()).await.unwrap();
        let ids: Vec<&str> = build.symbols.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["dup.py:f:0", "dup.py:f:1"]);
    }

    #[tokio::test]
    async fn collect_skips_bad_encoding() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.py", b"def ok():\n    pass\n");
        write(dir.path(), "bad.py", &[0x64, 0x65, 0x66, 0xff, 0xfe, 0x0a]);

        let build = builder().collect(dir.path()).await.unwrap();
        assert_eq!(build.symbols.len(), 1);
        assert_eq!(build.skipped.len(), 1);
        assert_eq!(build.skipped[0].file_path, "bad.py");
        assert_eq!(build.skipped[0].reason, SkipReason::Encoding);
        assert!(build.map.get("bad.py").is_none());
    }

    #[tokio::test]
    async fn collect_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"def a():\n    pass\n\nclass A:\n    def a(self):\n        pass\n");
        write(dir.path(), "sub/b.c", b"struct S { int v; };\nint a(void) { return 0; }\n");

        let first = builder().collect(dir.path()).await.unwrap();
        let second = builder().collect(dir.path()).await.unwrap();
        let ids = |b: &CollectedBuild| -> HashSet<String> {
            b.symbols.iter().map(|s| s.id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.map, second.map);
        assert!(ids(&first).contains("sub/b.c:S:0"));
        assert!(ids(&first).contains("a.py:a:1"));
    }

    #[tokio::test]
    async fn progress_reported_per_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"def a():\n    pass\n");
        write(dir.path(), "b.py", b")))) ]]]] }}}} ;;;;\n");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let build = builder().with_progress(tx).collect(dir.path()).await.unwrap();
        assert_eq!(build.skipped.len(), 1);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            BuildProgress {
                files_processed: 2,
                files_total: 2,
                symbols_emitted: 1
            }
        );
    }

    #[tokio::test]
    async fn reuse_skips_parsing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"def a():\n    pass\n");

        let cached = Symbol {
            id: "a.py:cached:0".into(),
            file_path: "a.py".into(),
            kind: SymbolKind::Function,
            name: "cached".into(),
            signature: "def cached()".into(),
            start_line: 0,
            end_line: 1,
            content: "def cached():\n    pass".into(),
            language: Lang::Python,
        };
        let reuse = HashMap::from([(
            "a.py".to_string(),
            ReusedFile {
                content_hash: "h".into(),
                symbols: vec![cached.clone()],
            },
        )]);

        let mut stream = builder().build_with_reuse(dir.path(), reuse).unwrap();
        let file = stream.next_file().await.unwrap();
        assert!(file.reused);
        assert_eq!(file.symbols, vec![cached]);
        assert!(stream.next_file().await.is_none());
    }

    #[test]
    fn render_orders_and_truncates() {
        let summary = |id: &str, name: &str, line| SymbolSummary {
            id: id.into(),
            kind: SymbolKind::Function,
            name: name.into(),
            start_line: line,
        };
        let mut map = RepoMap::default();
        map.insert("b.py".into(), vec![summary("b.py:x:0", "x", 0)]);
        map.insert(
            "a.py".into(),
            vec![summary("a.py:g:0", "g", 5), summary("a.py::0", "", 1)],
        );
        map.insert("c.py".into(), vec![summary("c.py:y:0", "y", 2)]);
        map.insert("empty.py".into(), vec![]);

        let rendered = map.render(2, 10);
        assert_eq!(
            rendered,
            "a.py\n  function (anonymous) (line 2)\n  function g (line 6)\nb.py\n  function x (line 1)\n... and 1 more files\n"
        );

        let limited = map.render(10, 1);
        assert!(limited.contains("  ... 1 more\n"));
        assert!(!limited.contains("empty.py"));
    }
}
