//! LRU cache of compiled glob patterns
//!
//! Statements are re-resolved per call, but their patterns repeat, so each
//! distinct sanitized glob is compiled once and shared.

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::LazyLock;

/// Capacity of the process-wide cache
pub const GLOB_CACHE_CAPACITY: usize = 4096;

static GLOBAL: LazyLock<GlobCache> = LazyLock::new(|| GlobCache::new(GLOB_CACHE_CAPACITY));

/// Compiled regexes keyed by their sanitized glob
pub struct GlobCache {
    cache: Mutex<LruCache<String, Regex>>,
}

impl GlobCache {
    /// Create a cache holding at most `capacity` patterns (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        GlobCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn global() -> &'static GlobCache {
        &GLOBAL
    }

    /// Cached regex for `glob`, compiling it with `compile` on a miss
    ///
    /// Compilation errors are returned and not cached.
    pub fn get_or_compile<E>(
        &self,
        glob: &str,
        compile: impl FnOnce() -> std::result::Result<Regex, E>,
    ) -> std::result::Result<Regex, E> {
        if let Some(regex) = self.cache.lock().get(glob) {
            return Ok(regex.clone());
        }
        let regex = compile()?;
        self.cache.lock().put(glob.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl std::fmt::Debug for GlobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobCache").field("len", &self.len()).finish()
    }
}
