use crate::TtlCache;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const IDENTITY_CACHE_CAPACITY: usize = 256;

/// Identity rarely changes within a session, but resolving it means spawning
/// a version-control subprocess, so entries live for minutes rather than
/// seconds.
pub const IDENTITY_CACHE_TTL: Duration = Duration::from_secs(300);

/// TTL-bounded map from a resolved filesystem path to a previously computed
/// stable project identifier.
///
/// Purely an optimization: the identity must always be re-derivable from
/// scratch, this cache is never the source of truth.
pub struct IdentityCache {
    inner: TtlCache<PathBuf, String>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::with_config(IDENTITY_CACHE_CAPACITY, IDENTITY_CACHE_TTL)
    }

    pub fn with_config(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(capacity, ttl),
        }
    }

    pub fn get(&mut self, resolved_path: &Path) -> Option<String> {
        self.inner.get(&resolved_path.to_path_buf()).cloned()
    }

    pub fn set(&mut self, resolved_path: PathBuf, identity: String) {
        self.inner.set(resolved_path, identity);
    }

    pub fn invalidate(&mut self, resolved_path: &Path) {
        self.inner.invalidate(&resolved_path.to_path_buf());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}
