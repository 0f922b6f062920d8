//! Disk-backed, content-addressed artifact cache with a JSON index and LRU
//! eviction.
//!
//! Each entry is a payload file named `<sha256>.<ext>` plus a record in
//! `index.json`. An entry exists only when both are present. Payloads are
//! written to a temporary file and renamed into place before the index is
//! rewritten, so a reader following the index never sees a partial payload.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::{
    ascii_art::{ArtBounds, render_ascii_art},
    error::MediaCacheError,
};

const INDEX_FILE: &str = "index.json";
const TMP_SUFFIX: &str = ".tmp";

/// Kind of artifact derived from source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The source bytes stored as-is.
    Raw,
    /// ASCII-art rendering of image bytes.
    Art,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Raw => "bin",
            Self::Art => "txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Bytes(Vec<u8>),
    Art(String),
}

impl Artifact {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Art(text) => text.as_bytes(),
        }
    }

    pub fn as_art(&self) -> Option<&str> {
        match self {
            Self::Art(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }
}

/// Result of [`ContentCache::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub key: String,
    pub artifact: Artifact,
    /// Served from disk without derivation.
    pub hit: bool,
    /// The artifact is stored in the cache after this call.
    pub cached: bool,
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub derivations: u64,
    pub evictions: u64,
    /// Contained disk failures (unreadable payloads, failed writes).
    pub io_errors: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    kind: ArtifactKind,
    path: String,
    size: u64,
    created_ms: u64,
    last_access_ms: u64,
    /// Monotonic access order; breaks `last_access_ms` ties.
    #[serde(default)]
    access_seq: u64,
}

#[derive(Debug)]
pub struct ContentCache {
    root: PathBuf,
    index_path: PathBuf,
    budget_bytes: u64,
    art_bounds: ArtBounds,
    index: CacheIndex,
    access_seq: u64,
    stats: CacheStats,
}

impl ContentCache {
    /// Open (or create) a cache rooted at `root`.
    ///
    /// A missing or unreadable index is treated as an empty cache.
    pub fn open(
        root: impl Into<PathBuf>,
        budget_bytes: u64,
        art_bounds: ArtBounds,
    ) -> Result<Self, MediaCacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| MediaCacheError::io(&root, err))?;
        let index_path = root.join(INDEX_FILE);
        let index = load_index(&index_path).unwrap_or_default();
        let access_seq = index
            .entries
            .values()
            .map(|entry| entry.access_seq)
            .max()
            .unwrap_or(0);

        let mut cache = Self {
            root,
            index_path,
            budget_bytes: budget_bytes.max(1),
            art_bounds,
            index,
            access_seq,
            stats: CacheStats::default(),
        };
        cache.prune_missing_files();
        cache.ensure_space(0);
        cache.persist_index();
        debug!(
            root = %cache.root.display(),
            entries = cache.index.entries.len(),
            total_size = cache.total_size(),
            budget = cache.budget_bytes,
            "media cache opened"
        );
        Ok(cache)
    }

    /// Content key for `raw`.
    pub fn key_for(raw: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw);
        format!("{:x}", hasher.finalize())
    }

    /// Return the `kind` artifact for `raw`, deriving and storing it on a
    /// miss.
    ///
    /// Disk failures are contained: an unreadable payload is a miss, and a
    /// failed write returns the derived artifact uncached. Only a failed
    /// derivation is reported as an error.
    pub fn get(&mut self, raw: &[u8], kind: ArtifactKind) -> Result<CacheLookup, MediaCacheError> {
        let key = Self::key_for(raw);
        let name = entry_name(&key, kind);

        if let Some(artifact) = self.read_entry(&name, kind) {
            self.stats.hits += 1;
            self.touch(&name);
            self.persist_index();
            trace!(%key, ?kind, "media cache hit");
            return Ok(CacheLookup {
                key,
                artifact,
                hit: true,
                cached: true,
            });
        }

        self.stats.misses += 1;
        let artifact = match kind {
            ArtifactKind::Raw => Artifact::Bytes(raw.to_vec()),
            ArtifactKind::Art => Artifact::Art(render_ascii_art(raw, self.art_bounds)?),
        };
        self.stats.derivations += 1;

        let cached = self.store(&key, &name, kind, artifact.as_bytes());
        trace!(%key, ?kind, cached, "media cache miss");
        Ok(CacheLookup {
            key,
            artifact,
            hit: false,
            cached,
        })
    }

    /// Evict least recently used entries until `needed_bytes` more fit in the
    /// budget. Returns `false` when that is impossible.
    pub fn ensure_space(&mut self, needed_bytes: u64) -> bool {
        if needed_bytes > self.budget_bytes {
            return false;
        }
        let mut evicted = false;
        while self.total_size() + needed_bytes > self.budget_bytes {
            let Some(victim) = self
                .index
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.last_access_ms, entry.access_seq))
                .map(|(name, _)| name.clone())
            else {
                return false;
            };
            self.evict(&victim);
            evicted = true;
        }
        if evicted {
            self.persist_index();
        }
        true
    }

    pub fn total_size(&self) -> u64 {
        self.index.entries.values().map(|entry| entry.size).sum()
    }

    pub fn len(&self) -> usize {
        self.index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.entries.is_empty()
    }

    pub fn contains(&self, raw: &[u8], kind: ArtifactKind) -> bool {
        self.index
            .entries
            .contains_key(&entry_name(&Self::key_for(raw), kind))
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_entry(&mut self, name: &str, kind: ArtifactKind) -> Option<Artifact> {
        let entry = self.index.entries.get(name)?;
        let path = self.root.join(&entry.path);
        let expected = entry.size;

        let artifact = match fs::read(&path) {
            Ok(bytes) if bytes.len() as u64 == expected => match kind {
                ArtifactKind::Raw => Some(Artifact::Bytes(bytes)),
                ArtifactKind::Art => String::from_utf8(bytes).ok().map(Artifact::Art),
            },
            Ok(_) => None,
            Err(err) => {
                warn!(fault = "cache_io", path = %path.display(), error = %err, "cache payload unreadable");
                None
            }
        };
        if artifact.is_none() {
            self.stats.io_errors += 1;
            self.drop_entry(name);
            self.persist_index();
        }
        artifact
    }

    fn store(&mut self, key: &str, name: &str, kind: ArtifactKind, payload: &[u8]) -> bool {
        let size = payload.len() as u64;
        if !self.ensure_space(size) {
            debug!(%key, size, budget = self.budget_bytes, "artifact exceeds cache budget; not cached");
            return false;
        }

        let path = self.root.join(name);
        if let Err(err) = write_atomic(&path, payload) {
            self.stats.io_errors += 1;
            warn!(fault = "cache_io", path = %path.display(), error = %err, "cache payload write failed");
            return false;
        }

        let now = now_millis();
        self.access_seq += 1;
        self.index.entries.insert(
            name.to_owned(),
            CacheEntry {
                key: key.to_owned(),
                kind,
                path: name.to_owned(),
                size,
                created_ms: now,
                last_access_ms: now,
                access_seq: self.access_seq,
            },
        );
        self.persist_index();
        true
    }

    fn touch(&mut self, name: &str) {
        self.access_seq += 1;
        if let Some(entry) = self.index.entries.get_mut(name) {
            entry.last_access_ms = now_millis();
            entry.access_seq = self.access_seq;
        }
    }

    fn evict(&mut self, name: &str) {
        if self.drop_entry(name) {
            self.stats.evictions += 1;
            debug!(entry = name, "evicted cache entry");
        }
    }

    fn drop_entry(&mut self, name: &str) -> bool {
        let Some(entry) = self.index.entries.remove(name) else {
            return false;
        };
        let path = self.root.join(entry.path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                self.stats.io_errors += 1;
                warn!(fault = "cache_io", path = %path.display(), error = %err, "failed to remove cache payload");
            }
        }
        true
    }

    fn prune_missing_files(&mut self) {
        self.index
            .entries
            .retain(|_, entry| self.root.join(&entry.path).is_file());
    }

    fn persist_index(&mut self) {
        let result = serde_json::to_vec_pretty(&self.index)
            .map_err(|err| io::Error::other(err.to_string()))
            .and_then(|encoded| write_atomic(&self.index_path, &encoded));
        if let Err(err) = result {
            self.stats.io_errors += 1;
            warn!(fault = "cache_io", path = %self.index_path.display(), error = %err, "cache index write failed");
        }
    }
}

fn entry_name(key: &str, kind: ArtifactKind) -> String {
    format!("{key}.{}", kind.extension())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

fn load_index(path: &Path) -> Option<CacheIndex> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice::<CacheIndex>(&bytes).ok()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
