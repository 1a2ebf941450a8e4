//! # Recall Cache
//!
//! Bounded caching primitives shared by the state and memory layers.
//!
//! ## Components
//!
//! ```text
//! BoundedCache<K, V>      fixed-capacity LRU
//!     │
//!     ├──> TtlCache<K, V>      LRU + per-entry expiry
//!     │        └─> IdentityCache   resolved path -> project id
//!     │
//!     └──> PathLocks           async mutual exclusion per path
//! ```
//!
//! All caches are designed for cooperative single-scheduler use; callers
//! that share one across tasks wrap it in a mutex, since concurrent
//! mutation of the recency order is unsafe.

mod bounded;
mod identity_cache;
mod path_lock;

pub use bounded::{BoundedCache, TtlCache};
pub use identity_cache::{IdentityCache, IDENTITY_CACHE_CAPACITY, IDENTITY_CACHE_TTL};
pub use path_lock::{PathGuard, PathLocks};
