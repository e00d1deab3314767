//! On-disk index: `symbols.jsonl`, `retrieval.bin`, `meta.json`.
//!
//! A commit writes every artifact to `<name>.tmp` and renames it into place,
//! `meta.json` last, after removing the previous `meta.json`. A directory
//! without `meta.json` is therefore never mistaken for a complete index.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use quarry_llm::{AnyEmbedder, EmbeddingFunction};
use rkyv::util::AlignedVec;
use serde::{Deserialize, Serialize};

use crate::context::contextualize_for_embedding;
use crate::error::{IndexError, Result};
use crate::repo_map::{RepoMap, SkippedFile, SymbolStream};
use crate::symbol::Symbol;
use crate::tokenizer::tokenize;

pub const SCHEMA_VERSION: u32 = 1;

pub const SYMBOLS_FILE: &str = "symbols.jsonl";
pub const RETRIEVAL_FILE: &str = "retrieval.bin";
pub const META_FILE: &str = "meta.json";
pub const REPO_MAP_FILE: &str = "repo_map.txt";
const LOCK_FILE: &str = ".lock";

const MAGIC: &[u8; 8] = b"QRRYIDX\0";
const EMBED_CONCURRENCY: usize = 8;
const REPO_MAP_MAX_FILES: usize = 1_000;
const REPO_MAP_MAX_SYMBOLS: usize = 50;

/// Provider, model and schema identity of a persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub schema_version: u32,
}

impl Fingerprint {
    /// Fingerprint of an index built without embeddings.
    #[must_use]
    pub fn none() -> Self {
        Self {
            embedding_provider: "none".into(),
            embedding_model: String::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    #[must_use]
    pub fn of(embedder: Option<&AnyEmbedder>) -> Self {
        match embedder {
            Some(e) => Self {
                embedding_provider: e.provider_name().to_owned(),
                embedding_model: e.model_name().to_owned(),
                schema_version: SCHEMA_VERSION,
            },
            None => Self::none(),
        }
    }

    #[must_use]
    pub fn has_embeddings(&self) -> bool {
        self.embedding_provider != "none"
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::none()
    }
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub schema_version: u32,
    pub symbol_count: usize,
    #[serde(default)]
    pub built_at: String,
    /// blake3 hash per indexed file, for incremental rebuilds.
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub skipped_files: Vec<SkippedFile>,
}

impl IndexMeta {
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            embedding_provider: self.embedding_provider.clone(),
            embedding_model: self.embedding_model.clone(),
            schema_version: self.schema_version,
        }
    }

    fn new(fingerprint: Fingerprint) -> Self {
        Self {
            embedding_provider: fingerprint.embedding_provider,
            embedding_model: fingerprint.embedding_model,
            schema_version: fingerprint.schema_version,
            symbol_count: 0,
            built_at: String::new(),
            file_hashes: BTreeMap::new(),
            skipped_files: Vec::new(),
        }
    }
}

/// Payload of `retrieval.bin`, stored as an `rkyv` archive after [`MAGIC`].
#[derive(Debug, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct RetrievalBlob {
    schema_version: u32,
    doc_ids: Vec<String>,
    doc_lengths: Vec<u32>,
    postings: BTreeMap<String, Vec<(u32, u32)>>,
    dense: Option<DenseVectors>,
}

/// One embedding per symbol, aligned with the symbol order.
#[derive(Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct DenseVectors {
    pub dimension: u32,
    pub vectors: Vec<Vec<f32>>,
}

/// Usability of the dense structure for the current embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenseStatus {
    Present,
    /// Built with a different provider or model (`STALE_EMBEDDING`).
    Stale,
    Absent,
}

/// Summary of one build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_reused: usize,
    pub symbols: usize,
    pub vectors_embedded: usize,
    pub vectors_reused: usize,
    pub skipped: Vec<SkippedFile>,
    pub duration_ms: u64,
}

/// Incrementally built postings table, one document per symbol.
#[derive(Debug, Default)]
struct PostingsBuilder {
    postings: BTreeMap<String, Vec<(u32, u32)>>,
    doc_lengths: Vec<u32>,
}

impl PostingsBuilder {
    fn add(&mut self, content: &str) {
        let ordinal = to_u32(self.doc_lengths.len());
        let tokens = tokenize(content);
        let mut tf: BTreeMap<String, u32> = BTreeMap::new();
        for token in &tokens {
            *tf.entry(token.clone()).or_insert(0) += 1;
        }
        for (token, count) in tf {
            self.postings.entry(token).or_default().push((ordinal, count));
        }
        self.doc_lengths.push(to_u32(tokens.len()));
    }
}

/// Loaded, immutable index snapshot.
#[derive(Debug, Clone)]
pub struct Index {
    symbols: Vec<Symbol>,
    by_id: HashMap<String, usize>,
    postings: BTreeMap<String, Vec<(u32, u32)>>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f64,
    dense: Option<DenseVectors>,
    dense_status: DenseStatus,
    meta: IndexMeta,
}

impl Index {
    /// An index over zero symbols.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_symbols(Vec::new(), None, Fingerprint::none())
    }

    /// Build an in-memory index, deriving postings from symbol content.
    ///
    /// Dense vectors, when given, must be aligned with `symbols`.
    #[must_use]
    pub fn from_symbols(
        symbols: Vec<Symbol>,
        dense: Option<DenseVectors>,
        fingerprint: Fingerprint,
    ) -> Self {
        let mut postings = PostingsBuilder::default();
        for symbol in &symbols {
            postings.add(&symbol.content);
        }
        let mut meta = IndexMeta::new(fingerprint);
        meta.symbol_count = symbols.len();
        let status = if dense.is_some() {
            DenseStatus::Present
        } else {
            DenseStatus::Absent
        };
        Self::assemble(symbols, postings, dense, status, meta)
    }

    fn assemble(
        symbols: Vec<Symbol>,
        postings: PostingsBuilder,
        dense: Option<DenseVectors>,
        dense_status: DenseStatus,
        meta: IndexMeta,
    ) -> Self {
        let by_id = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let total: u64 = postings.doc_lengths.iter().map(|&l| u64::from(l)).sum();
        #[allow(clippy::cast_precision_loss)]
        let avg_doc_length = if postings.doc_lengths.is_empty() {
            0.0
        } else {
            total as f64 / postings.doc_lengths.len() as f64
        };
        Self {
            symbols,
            by_id,
            postings: postings.postings,
            doc_lengths: postings.doc_lengths,
            avg_doc_length,
            dense,
            dense_status,
            meta,
        }
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[must_use]
    pub fn symbol(&self, id: &str) -> Option<&Symbol> {
        self.by_id.get(id).map(|&i| &self.symbols[i])
    }

    #[must_use]
    pub fn symbol_at(&self, ordinal: usize) -> Option<&Symbol> {
        self.symbols.get(ordinal)
    }

    /// `(doc_ordinal, term_frequency)` pairs for `token`.
    #[must_use]
    pub fn postings(&self, token: &str) -> &[(u32, u32)] {
        self.postings.get(token).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn doc_length(&self, ordinal: usize) -> u32 {
        self.doc_lengths.get(ordinal).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    /// Dense vectors, only when usable with the current embedder.
    #[must_use]
    pub fn dense(&self) -> Option<&DenseVectors> {
        match self.dense_status {
            DenseStatus::Present => self.dense.as_ref(),
            DenseStatus::Stale | DenseStatus::Absent => None,
        }
    }

    #[must_use]
    pub fn dense_status(&self) -> DenseStatus {
        self.dense_status
    }

    #[must_use]
    pub fn vector_for(&self, id: &str) -> Option<&[f32]> {
        let dense = self.dense()?;
        let ordinal = *self.by_id.get(id)?;
        dense.vectors.get(ordinal).map(Vec::as_slice)
    }

    #[must_use]
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.meta.fingerprint()
    }

    /// Reconstruct the repository map from the stored symbols.
    #[must_use]
    pub fn repo_map(&self) -> RepoMap {
        let mut files: BTreeMap<String, Vec<_>> = self
            .meta
            .file_hashes
            .keys()
            .map(|path| (path.clone(), Vec::new()))
            .collect();
        for symbol in &self.symbols {
            files
                .entry(symbol.file_path.clone())
                .or_default()
                .push(symbol.summary());
        }
        let mut map = RepoMap::default();
        for (path, summaries) in files {
            map.insert(path, summaries);
        }
        map
    }
}

/// Owns one index directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

/// Exclusive advisory lock on `<index_dir>/.lock`, released on drop.
struct BuildLock {
    _file: File,
}

impl IndexStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.dir.join(META_FILE).is_file()
    }

    fn lock(&self) -> Result<BuildLock> {
        use fs2::FileExt;

        std::fs::create_dir_all(&self.dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;
        file.try_lock_exclusive()
            .map_err(|_| IndexError::Locked(self.dir.clone()))?;
        Ok(BuildLock { _file: file })
    }

    /// Drain `stream` into a fresh index, replacing whatever the directory held.
    ///
    /// Symbols of reused files take their vectors from `previous` when it has
    /// usable ones; everything else is embedded with `embedder`. An embedding
    /// failure drops the dense structure for this build with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Locked`] if another build holds the directory, or
    /// an I/O error if an artifact cannot be written.
    pub async fn commit(
        &self,
        mut stream: SymbolStream,
        embedder: Option<&AnyEmbedder>,
        previous: Option<&Index>,
    ) -> Result<(Index, BuildReport)> {
        let start = Instant::now();
        let _lock = self.lock()?;

        let fingerprint = Fingerprint::of(embedder);
        let mut report = BuildReport {
            files_scanned: stream.files_total(),
            ..BuildReport::default()
        };

        let symbols_tmp = tmp_path(&self.dir, SYMBOLS_FILE);
        let mut writer = BufWriter::new(File::create(&symbols_tmp)?);
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut postings = PostingsBuilder::default();
        let mut file_hashes = BTreeMap::new();
        let mut dense = embedder.map(|_| DenseAccumulator::default());

        while let Some(file) = stream.next_file().await {
            if file.reused {
                report.files_reused += 1;
            } else {
                report.files_indexed += 1;
            }

            for symbol in &file.symbols {
                serde_json::to_writer(&mut writer, symbol)?;
                writer.write_all(b"\n")?;
                postings.add(&symbol.content);
            }

            let failure = match (dense.as_mut(), embedder) {
                (Some(acc), Some(embedder)) => {
                    let reusable = if file.reused { previous } else { None };
                    acc.extend(embedder, &file.symbols, reusable, &mut report)
                        .await
                        .err()
                }
                _ => None,
            };
            if let Some(e) = failure {
                tracing::warn!("embedding failed, index will have no dense vectors: {e}");
                dense = None;
            }

            file_hashes.insert(file.file_path, file.content_hash);
            symbols.extend(file.symbols);
        }
        writer.flush()?;
        drop(writer);

        let (map, skipped) = stream.finish();
        report.symbols = symbols.len();
        report.skipped = skipped.clone();

        let dense = dense.and_then(DenseAccumulator::finish);
        let blob = RetrievalBlob {
            schema_version: SCHEMA_VERSION,
            doc_ids: symbols.iter().map(|s| s.id.clone()).collect(),
            doc_lengths: postings.doc_lengths.clone(),
            postings: postings.postings.clone(),
            dense: dense.clone(),
        };
        let retrieval_tmp = tmp_path(&self.dir, RETRIEVAL_FILE);
        {
            let mut out = BufWriter::new(File::create(&retrieval_tmp)?);
            let archive =
                rkyv::to_bytes::<rkyv::rancor::Error>(&blob).map_err(std::io::Error::other)?;
            out.write_all(MAGIC)?;
            out.write_all(&archive)?;
            out.flush()?;
        }

        let map_tmp = tmp_path(&self.dir, REPO_MAP_FILE);
        std::fs::write(
            &map_tmp,
            map.render(REPO_MAP_MAX_FILES, REPO_MAP_MAX_SYMBOLS),
        )?;

        let mut meta = IndexMeta::new(fingerprint);
        meta.symbol_count = symbols.len();
        meta.built_at = chrono::Utc::now().to_rfc3339();
        meta.file_hashes = file_hashes;
        meta.skipped_files = skipped;
        let meta_tmp = tmp_path(&self.dir, META_FILE);
        std::fs::write(&meta_tmp, serde_json::to_vec_pretty(&meta)?)?;

        let meta_path = self.dir.join(META_FILE);
        if meta_path.exists() {
            std::fs::remove_file(&meta_path)?;
        }
        std::fs::rename(symbols_tmp, self.dir.join(SYMBOLS_FILE))?;
        std::fs::rename(retrieval_tmp, self.dir.join(RETRIEVAL_FILE))?;
        std::fs::rename(map_tmp, self.dir.join(REPO_MAP_FILE))?;
        std::fs::rename(meta_tmp, meta_path)?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            dir = %self.dir.display(),
            files = report.files_indexed + report.files_reused,
            symbols = report.symbols,
            skipped = report.skipped.len(),
            dense = dense.is_some(),
            "index committed"
        );

        let status = if dense.is_some() {
            DenseStatus::Present
        } else {
            DenseStatus::Absent
        };
        let index = Index::assemble(symbols, postings, dense, status, meta);
        Ok((index, report))
    }

    /// Rendered `repo_map.txt`, or an empty string when it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file exists but cannot be read.
    pub fn read_repo_map(&self) -> Result<String> {
        match std::fs::read_to_string(self.dir.join(REPO_MAP_FILE)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read `meta.json` only.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IndexMissing`] or [`IndexError::IndexCorrupt`].
    pub fn read_meta(&self) -> Result<IndexMeta> {
        let path = self.require(META_FILE)?;
        let bytes = std::fs::read(path)?;
        let meta: IndexMeta = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::corrupt(META_FILE, e.to_string()))?;
        if meta.schema_version != SCHEMA_VERSION {
            return Err(IndexError::corrupt(
                META_FILE,
                format!(
                    "schema version {} (expected {SCHEMA_VERSION})",
                    meta.schema_version
                ),
            ));
        }
        Ok(meta)
    }

    /// Load the index. When `expected` is given and differs from the stored
    /// fingerprint, dense vectors are marked [`DenseStatus::Stale`] and the
    /// rest of the index stays usable.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IndexMissing`] if an artifact is absent and
    /// [`IndexError::IndexCorrupt`] if any artifact fails to decode or the
    /// artifacts disagree with each other.
    pub fn load(&self, expected: Option<&Fingerprint>) -> Result<Index> {
        let symbols_path = self.require(SYMBOLS_FILE)?;
        let retrieval_path = self.require(RETRIEVAL_FILE)?;
        let meta = self.read_meta()?;

        let symbols = read_symbols(&symbols_path)?;
        let blob = read_blob(&retrieval_path)?;
        validate(&meta, &symbols, &blob)?;

        let stored = meta.fingerprint();
        let dense_status = match (&blob.dense, expected) {
            (None, _) => DenseStatus::Absent,
            (Some(_), Some(expected)) if *expected != stored => {
                tracing::warn!(
                    stored_provider = %stored.embedding_provider,
                    stored_model = %stored.embedding_model,
                    provider = %expected.embedding_provider,
                    model = %expected.embedding_model,
                    "STALE_EMBEDDING: index was built with a different embedder, vector search disabled"
                );
                DenseStatus::Stale
            }
            (Some(_), _) => DenseStatus::Present,
        };

        tracing::info!(
            dir = %self.dir.display(),
            symbols = symbols.len(),
            dense = ?dense_status,
            "index loaded"
        );

        let postings = PostingsBuilder {
            postings: blob.postings,
            doc_lengths: blob.doc_lengths,
        };
        Ok(Index::assemble(symbols, postings, blob.dense, dense_status, meta))
    }

    fn require(&self, artifact: &str) -> Result<PathBuf> {
        let path = self.dir.join(artifact);
        if path.is_file() {
            Ok(path)
        } else {
            Err(IndexError::IndexMissing {
                dir: self.dir.clone(),
                artifact: artifact.to_owned(),
            })
        }
    }
}

#[derive(Default)]
struct DenseAccumulator {
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

impl DenseAccumulator {
    async fn extend(
        &mut self,
        embedder: &AnyEmbedder,
        symbols: &[Symbol],
        previous: Option<&Index>,
        report: &mut BuildReport,
    ) -> std::result::Result<(), String> {
        let mut fresh: Vec<(usize, String)> = Vec::new();
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(symbols.len());

        for (i, symbol) in symbols.iter().enumerate() {
            match previous.and_then(|p| p.vector_for(&symbol.id)) {
                Some(v) => {
                    report.vectors_reused += 1;
                    slots.push(Some(v.to_vec()));
                }
                None => {
                    fresh.push((i, contextualize_for_embedding(symbol)));
                    slots.push(None);
                }
            }
        }

        let embedded: Vec<(usize, std::result::Result<Vec<f32>, quarry_llm::LlmError>)> =
            stream::iter(fresh)
                .map(|(i, text)| async move { (i, embedder.embed(&text).await) })
                .buffered(EMBED_CONCURRENCY)
                .collect()
                .await;

        for (i, result) in embedded {
            let vector = result.map_err(|e| e.to_string())?;
            report.vectors_embedded += 1;
            slots[i] = Some(vector);
        }

        for vector in slots.into_iter().flatten() {
            match self.dimension {
                None => self.dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(format!(
                        "embedding dimension changed from {d} to {}",
                        vector.len()
                    ));
                }
                Some(_) => {}
            }
            self.vectors.push(vector);
        }
        Ok(())
    }

    fn finish(self) -> Option<DenseVectors> {
        Some(DenseVectors {
            dimension: to_u32(self.dimension.unwrap_or(0)),
            vectors: self.vectors,
        })
    }
}

fn read_symbols(path: &Path) -> Result<Vec<Symbol>> {
    let reader = BufReader::new(File::open(path)?);
    let mut symbols = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let symbol: Symbol = serde_json::from_str(&line)
            .map_err(|e| IndexError::corrupt(SYMBOLS_FILE, format!("line {}: {e}", n + 1)))?;
        symbols.push(symbol);
    }
    Ok(symbols)
}

fn read_blob(path: &Path) -> Result<RetrievalBlob> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < MAGIC.len() {
        return Err(IndexError::corrupt(RETRIEVAL_FILE, "truncated header"));
    }
    let Some(payload) = bytes.strip_prefix(&MAGIC[..]) else {
        return Err(IndexError::corrupt(RETRIEVAL_FILE, "bad magic"));
    };
    // Archives must be read from a buffer aligned for their widest field.
    let mut aligned = AlignedVec::<16>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);
    rkyv::from_bytes::<RetrievalBlob, rkyv::rancor::Error>(&aligned)
        .map_err(|e| IndexError::corrupt(RETRIEVAL_FILE, e.to_string()))
}

fn validate(meta: &IndexMeta, symbols: &[Symbol], blob: &RetrievalBlob) -> Result<()> {
    let n = symbols.len();
    if blob.schema_version != SCHEMA_VERSION {
        return Err(IndexError::corrupt(
            RETRIEVAL_FILE,
            format!("schema version {}", blob.schema_version),
        ));
    }
    if meta.symbol_count != n {
        return Err(IndexError::corrupt(
            META_FILE,
            format!("symbol_count {} but {n} records", meta.symbol_count),
        ));
    }
    if blob.doc_ids.len() != n
        || blob.doc_ids.iter().zip(symbols).any(|(id, s)| *id != s.id)
    {
        return Err(IndexError::corrupt(
            RETRIEVAL_FILE,
            "document ids do not match symbol records",
        ));
    }
    if blob.doc_lengths.len() != n {
        return Err(IndexError::corrupt(RETRIEVAL_FILE, "document length table size"));
    }
    let out_of_range = blob
        .postings
        .values()
        .flatten()
        .any(|&(ordinal, _)| ordinal as usize >= n);
    if out_of_range {
        return Err(IndexError::corrupt(RETRIEVAL_FILE, "posting references unknown document"));
    }
    if let Some(dense) = &blob.dense {
        let dim = dense.dimension as usize;
        if dense.vectors.len() != n || dense.vectors.iter().any(|v| v.len() != dim) {
            return Err(IndexError::corrupt(RETRIEVAL_FILE, "dense vector table shape"));
        }
    }
    Ok(())
}

fn tmp_path(dir: &Path, artifact: &str) -> PathBuf {
    dir.join(format!("{artifact}.tmp"))
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
