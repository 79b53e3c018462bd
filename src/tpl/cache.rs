use crate::error::CompileError;
use crate::tpl::codegen::{Artifact, CompileOptions, compile};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 128;

/// Digest of a template source plus the names of its custom helpers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Helper names are sorted and de-duplicated first, so their order does not matter.
    pub fn derive<S: AsRef<str>>(source: &str, helper_names: &[S]) -> Self {
        let mut names: Vec<&str> = helper_names.iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names.dedup();

        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        names.hash(&mut hasher);
        CacheKey(hasher.finish())
    }

    pub fn entry_point(&self) -> String {
        format!("render_{self}")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Bounded LRU cache of compiled artifacts.
///
/// `get` refreshes recency and `insert` evicts, each under a single lock.
/// Two concurrent misses on the same key both compile; the later insert wins.
pub struct ArtifactCache {
    entries: Mutex<LruCache<CacheKey, Arc<Artifact>>>,
}

impl ArtifactCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Artifact>> {
        self.entries.lock().get(key).cloned()
    }

    /// Inserts `artifact` under its own key and returns the evicted key, if any.
    pub fn insert(&self, artifact: Arc<Artifact>) -> Option<CacheKey> {
        let key = artifact.key;
        let evicted = self.entries.lock().push(key, artifact);
        match evicted {
            Some((old, _)) if old != key => {
                debug!("artifact cache evicted {}", old);
                Some(old)
            }
            _ => None,
        }
    }

    /// Membership test that leaves recency untouched.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Arc<Artifact>> {
        self.entries.lock().pop(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the cached artifact for `source`, compiling and inserting it on a miss.
    pub fn get_or_compile(
        &self,
        source: &str,
        custom_helpers: &[String],
    ) -> Result<Arc<Artifact>, CompileError> {
        let key = CacheKey::derive(source, custom_helpers);
        if let Some(artifact) = self.get(&key) {
            debug!("artifact cache hit: key={}", key);
            return Ok(artifact);
        }

        let start = Instant::now();
        let options = CompileOptions {
            custom_helpers: custom_helpers.to_vec(),
        };
        let artifact = Arc::new(compile(source, &options)?);
        debug!(
            "artifact cache miss: key={}, ops={}, elapsed_us={}",
            key,
            artifact.program.ops.len(),
            start.elapsed().as_micros()
        );
        self.insert(artifact.clone());
        Ok(artifact)
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
