//! LRU cache of state files parsed from disk.
//!
//! Files reached through `include` that are not open in the editor are read
//! and parsed lazily, then kept here keyed by path.
//!
//! # Invalidation
//!
//! ```text
//! lookup(path)
//!     ↓
//! stat file → FileMarker (mtime, length)
//!     ├─ marker unchanged → Fresh(document)
//!     └─ marker changed   → Stale(old content hash)
//!         ↓
//!         re-read file, blake3 hash
//!         ├─ same hash → reuse old parse under the new marker
//!         └─ new hash  → parse again
//! ```
//!
//! Watcher events remove entries outright. The cache is guarded by a
//! `parking_lot::RwLock`; all operations are short and never hold the lock
//! across I/O.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use blake3::Hash as Blake3Hash;
use lru::LruCache;
use parking_lot::RwLock;

use crate::lsp::models::SlsDocument;

pub const DEFAULT_CAPACITY: usize = 256;

/// Content hash used to decide whether a re-read file needs reparsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(Blake3Hash);

impl ContentHash {
    pub fn from_str(content: &str) -> Self {
        Self(blake3::hash(content.as_bytes()))
    }
}

/// Cheap freshness check taken from file metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMarker {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl FileMarker {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

#[derive(Debug)]
struct CacheEntry {
    document: Arc<SlsDocument>,
    marker: FileMarker,
}

#[derive(Debug)]
pub enum Lookup {
    Fresh(Arc<SlsDocument>),
    /// Cached under an older marker; the caller re-reads the file and may
    /// reuse `document` if the content hash still matches.
    Stale(Arc<SlsDocument>),
    Miss,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_queries: u64,
    pub hits: u64,
    pub misses: u64,
    /// Re-reads whose content hash matched, so the old parse was reused.
    pub reused: u64,
    pub evictions: u64,
    pub current_size: usize,
    pub max_capacity: usize,
}

impl CacheStats {
    /// Cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_queries as f64
        }
    }
}

#[derive(Debug)]
pub struct FileCache {
    cache: RwLock<LruCache<PathBuf, CacheEntry>>,
    stats: RwLock<CacheStats>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            stats: RwLock::new(CacheStats {
                max_capacity: capacity.get(),
                ..Default::default()
            }),
        }
    }

    pub fn lookup(&self, path: &Path, marker: FileMarker) -> Lookup {
        let result = {
            let mut cache = self.cache.write();
            match cache.get(path) {
                Some(entry) if entry.marker == marker => Lookup::Fresh(entry.document.clone()),
                Some(entry) => Lookup::Stale(entry.document.clone()),
                None => Lookup::Miss,
            }
        };

        let mut stats = self.stats.write();
        stats.total_queries += 1;
        match result {
            Lookup::Fresh(_) => stats.hits += 1,
            _ => stats.misses += 1,
        }
        result
    }

    pub fn insert(&self, path: PathBuf, marker: FileMarker, document: Arc<SlsDocument>) {
        let entry = CacheEntry { document, marker };
        let mut cache = self.cache.write();
        let mut stats = self.stats.write();
        // push returns the displaced entry, which is the old value when the
        // key was already present
        if let Some((evicted, _)) = cache.push(path.clone(), entry) {
            if evicted != path {
                stats.evictions += 1;
            }
        }
        stats.current_size = cache.len();
    }

    /// Stores a re-read whose content hash matched the cached parse.
    pub fn refresh(&self, path: PathBuf, marker: FileMarker, document: Arc<SlsDocument>) {
        self.stats.write().reused += 1;
        self.insert(path, marker, document);
    }

    pub fn remove(&self, path: &Path) -> bool {
        let mut cache = self.cache.write();
        let removed = cache.pop(path).is_some();
        self.stats.write().current_size = cache.len();
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}
