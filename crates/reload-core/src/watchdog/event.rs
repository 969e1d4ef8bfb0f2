use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CacheStale,
    CacheStuck,
    CacheRecovered,
    PausedForCache,
    Resumed,
    Reloaded,
    ReloadFailed,
    PlaybackEnded,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheStale => "cache_stale",
            Self::CacheStuck => "cache_stuck",
            Self::CacheRecovered => "cache_recovered",
            Self::PausedForCache => "paused_for_cache",
            Self::Resumed => "resumed",
            Self::Reloaded => "reloaded",
            Self::ReloadFailed => "reload_failed",
            Self::PlaybackEnded => "playback_ended",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheStale => write!(f, "STALE"),
            Self::CacheStuck => write!(f, "STUCK"),
            Self::CacheRecovered => write!(f, "RECOVERED"),
            Self::PausedForCache => write!(f, "BUFFERING"),
            Self::Resumed => write!(f, "RESUMED"),
            Self::Reloaded => write!(f, "RELOAD"),
            Self::ReloadFailed => write!(f, "RELOAD-FAIL"),
            Self::PlaybackEnded => write!(f, "ENDED"),
        }
    }
}

/// Why a reload was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadReason {
    /// Paused for cache while the demuxer cache was already stuck.
    CacheStuck,
    /// Paused for cache longer than the timeout.
    PauseTimeout,
    /// End of file reached with progress since the last attempt.
    EndOfFile,
    /// Key binding or API request.
    Manual,
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheStuck => write!(f, "cache_stuck"),
            Self::PauseTimeout => write!(f, "pause_timeout"),
            Self::EndOfFile => write!(f, "end_of_file"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReloadReason>,
    pub details: String,
}

impl WatchdogEvent {
    pub fn new(kind: EventKind, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            reason: None,
            details: details.into(),
        }
    }

    pub fn with_reason(mut self, reason: ReloadReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Fixed-capacity circular buffer for recent events. O(1) insert, evicts oldest when full.
#[derive(Debug, Clone)]
pub struct EventRing {
    buffer: VecDeque<WatchdogEvent>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: WatchdogEvent) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Newest first.
    pub fn list(&self) -> Vec<WatchdogEvent> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
