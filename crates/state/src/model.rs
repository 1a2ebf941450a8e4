use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub msg: String,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub ack: bool,
}

/// Durable per-project work state.
///
/// Created on first access for a project, mutated whenever scope, phase or
/// alerts change, never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: String,
    pub project_name: String,
    pub project_path: PathBuf,
    pub created_at_ms: u64,
    pub phase: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    /// Free-form progress fields owned by the caller.
    #[serde(default)]
    pub progress: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub schema_checked_at_ms: Option<u64>,
    #[serde(default)]
    pub verification_runs: u32,
    #[serde(default)]
    pub last_activity_ms: u64,
}

impl ProjectState {
    pub fn new(project_id: String, project_name: String, project_path: PathBuf) -> Self {
        let now = unix_ms_now();
        Self {
            project_id,
            project_name,
            project_path,
            created_at_ms: now,
            phase: "discovery".to_string(),
            scope: None,
            alerts: Vec::new(),
            progress: serde_json::Map::new(),
            schema_checked_at_ms: None,
            verification_runs: 0,
            last_activity_ms: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_ms = unix_ms_now();
    }

    /// Messages of alerts that are blocking and not yet acknowledged.
    pub fn blocking_alerts(&self) -> Vec<String> {
        self.alerts
            .iter()
            .filter(|alert| alert.blocking && !alert.ack)
            .map(|alert| alert.msg.clone())
            .collect()
    }
}

/// Minimal read-optimized projection of [`ProjectState`], re-written on every
/// durable state write and consumed exclusively by the external pre-action
/// policy gate. Never cached in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementState {
    pub project_id: String,
    pub has_scope: bool,
    #[serde(default)]
    pub schema_checked_at_ms: Option<u64>,
    pub verification_runs: u32,
    pub blocking_alerts: Vec<String>,
    pub phase: String,
    pub updated_at_ms: u64,
}

impl From<&ProjectState> for EnforcementState {
    fn from(state: &ProjectState) -> Self {
        Self {
            project_id: state.project_id.clone(),
            has_scope: state.scope.is_some(),
            schema_checked_at_ms: state.schema_checked_at_ms,
            verification_runs: state.verification_runs,
            blocking_alerts: state.blocking_alerts(),
            phase: state.phase.clone(),
            updated_at_ms: unix_ms_now(),
        }
    }
}

/// Entry returned by `ProjectStateStore::list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub phase: String,
    pub last_activity_ms: u64,
}
