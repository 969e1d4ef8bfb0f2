use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::demuxer::CachePhase;
use super::event::{ReloadReason, WatchdogEvent};
use crate::host::KeepOpen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl SessionState {
    pub fn can_transition_to(self, target: SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Active)
                | (SessionState::Active, SessionState::Stopping)
                | (SessionState::Stopping, SessionState::Stopped)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub enabled: bool,
    pub phase: CachePhase,
    pub time_in_phase_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cache_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseStatus {
    pub enabled: bool,
    pub active: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadSummary {
    pub timestamp: DateTime<Utc>,
    pub reason: ReloadReason,
    pub path: String,
}

/// Point-in-time view of a session, published after every handled tick or event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub cache: CacheStatus,
    pub pause: PauseStatus,
    pub reload_eof_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eof_baseline: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_open_override: Option<KeepOpen>,
    pub reload_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reload: Option<ReloadSummary>,
    pub events: Vec<WatchdogEvent>,
}
