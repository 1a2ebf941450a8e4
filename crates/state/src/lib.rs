//! # Recall State
//!
//! Per-project work state with debounced, crash-safe persistence.
//!
//! ## Pipeline
//!
//! ```text
//! working dir
//!     │
//!     ├──> IdentityResolver (git remote / git root / path hash)
//!     │      └─> 16-char project id
//!     │
//!     └──> ProjectStateStore
//!            ├─> BoundedCache (read-through)
//!            ├─> debounced writer (single-flight timer, PathLocks)
//!            └─> state.json + enforcement-state.json per project
//! ```
//!
//! The enforcement file is a minimal projection re-written on every durable
//! state write; an external pre-action policy gate reads it directly and
//! tolerates it lagging the in-memory state while writes are debounced.

mod error;
mod identity;
mod model;
mod store;

pub use error::{Result, StateError};
pub use identity::{hash16, IdentityResolver};
pub use model::{unix_ms_now, Alert, EnforcementState, ProjectState, ProjectSummary};
pub use store::{ProjectStateStore, StateStoreConfig};
