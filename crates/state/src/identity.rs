use recall_cache::IdentityCache;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// 16-hex-char prefix of the sha256 digest of `bytes`.
pub fn hash16(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)[..16].to_string()
}

/// Derives a stable project identifier from a working directory.
///
/// Priority: git remote URL (same id across machines), then git repository
/// root (stable for subdirectories), then the resolved absolute path.
/// Both git invocations run with a short timeout and fail closed to the
/// path-hash fallback, so resolution never blocks indefinitely and never
/// fails the caller. Results are cached in a TTL-LRU [`IdentityCache`].
pub struct IdentityResolver {
    cache: Mutex<IdentityCache>,
    git_timeout: Duration,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(IdentityCache::new()),
            git_timeout: GIT_TIMEOUT,
        }
    }

    pub async fn resolve(&self, working_dir: &Path) -> String {
        let resolved = resolve_path(working_dir);

        if let Some(cached) = self.cache_get(&resolved) {
            return cached;
        }

        let identity = self.derive(&resolved).await;
        self.cache_set(resolved, identity.clone());
        identity
    }

    pub fn invalidate(&self, working_dir: &Path) {
        let resolved = resolve_path(working_dir);
        match self.cache.lock() {
            Ok(mut cache) => cache.invalidate(&resolved),
            Err(poisoned) => poisoned.into_inner().invalidate(&resolved),
        }
    }

    async fn derive(&self, resolved: &Path) -> String {
        if let Some(remote) = self.git_output(resolved, &["remote", "get-url", "origin"]).await {
            return hash16(remote.as_bytes());
        }
        if let Some(root) = self.git_output(resolved, &["rev-parse", "--show-toplevel"]).await {
            return hash16(root.as_bytes());
        }
        hash16(resolved.to_string_lossy().as_bytes())
    }

    async fn git_output(&self, dir: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .output();

        match tokio::time::timeout(self.git_timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Ok(Ok(_)) | Ok(Err(_)) => None,
            Err(_) => {
                log::warn!("git {:?} timed out for {}", args, dir.display());
                None
            }
        }
    }

    fn cache_get(&self, resolved: &Path) -> Option<String> {
        match self.cache.lock() {
            Ok(mut cache) => cache.get(resolved),
            Err(poisoned) => poisoned.into_inner().get(resolved),
        }
    }

    fn cache_set(&self, resolved: PathBuf, identity: String) {
        match self.cache.lock() {
            Ok(mut cache) => cache.set(resolved, identity),
            Err(poisoned) => poisoned.into_inner().set(resolved, identity),
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
