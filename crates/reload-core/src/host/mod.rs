#[cfg(unix)]
mod ipc;

#[cfg(unix)]
pub use ipc::{MpvIpc, RELOAD_MESSAGE};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("IPC transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("Host rejected {command}: {message}")]
    Rejected { command: String, message: String },
    #[error("Timed out waiting for reply to {command}")]
    Timeout { command: String },
    #[error("Malformed reply for {command}: {message}")]
    Malformed { command: String, message: String },
    #[error("Host connection closed")]
    Disconnected,
}

/// How `loadfile` treats the current playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Stop the current item and clear the playlist.
    Replace,
    /// Add to the end of the playlist.
    Append,
}

impl LoadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

/// The host's end-of-playback policy (mpv `keep-open`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepOpen {
    No,
    Yes,
    Always,
}

impl fmt::Display for KeepOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Yes => write!(f, "yes"),
            Self::Always => write!(f, "always"),
        }
    }
}

impl FromStr for KeepOpen {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" | "false" => Ok(Self::No),
            "yes" | "true" => Ok(Self::Yes),
            "always" => Ok(Self::Always),
            other => Err(format!("unknown keep-open value '{}'", other)),
        }
    }
}

/// Playlist contents with the index of the playing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    pub entries: Vec<String>,
    pub current: Option<usize>,
}

/// Property changes and notifications pushed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PausedForCache(bool),
    EofReached(bool),
    VideoConfigured(bool),
    FileLoaded,
    ReloadRequested,
    Shutdown,
}

/// The media engine the watchdog observes and commands.
///
/// Getters return `Ok(None)` when the host has no value for the property
/// (nothing loaded, live stream without duration, ...). The trait is
/// object-safe and Send + Sync so a session can hold it as `Arc<dyn PlaybackHost>`.
#[async_trait]
pub trait PlaybackHost: Send + Sync {
    /// Cumulative `demuxer-cache-time` in seconds.
    async fn cache_time(&self) -> Result<Option<f64>, HostError>;
    async fn paused_for_cache(&self) -> Result<bool, HostError>;
    async fn eof_reached(&self) -> Result<bool, HostError>;
    async fn time_pos(&self) -> Result<Option<f64>, HostError>;
    async fn duration(&self) -> Result<Option<f64>, HostError>;
    async fn path(&self) -> Result<Option<String>, HostError>;
    async fn playlist(&self) -> Result<Playlist, HostError>;
    async fn keep_open(&self) -> Result<Option<KeepOpen>, HostError>;

    async fn load_file(
        &self,
        path: &str,
        mode: LoadMode,
        start: Option<f64>,
    ) -> Result<(), HostError>;

    /// Move entry `from` so that it takes the place of entry `to`.
    /// `to` may equal the playlist length to move to the end.
    async fn playlist_move(&self, from: usize, to: usize) -> Result<(), HostError>;

    async fn set_keep_open(&self, policy: KeepOpen) -> Result<(), HostError>;
    async fn set_keep_open_pause(&self, enabled: bool) -> Result<(), HostError>;
    async fn set_pause(&self, paused: bool) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_open_round_trips_through_strings() {
        for policy in [KeepOpen::No, KeepOpen::Yes, KeepOpen::Always] {
            assert_eq!(policy.to_string().parse::<KeepOpen>(), Ok(policy));
        }
    }

    #[test]
    fn keep_open_accepts_flag_spelling() {
        assert_eq!("false".parse::<KeepOpen>(), Ok(KeepOpen::No));
        assert_eq!("true".parse::<KeepOpen>(), Ok(KeepOpen::Yes));
        assert!("sometimes".parse::<KeepOpen>().is_err());
    }

    #[test]
    fn load_mode_strings() {
        assert_eq!(LoadMode::Replace.as_str(), "replace");
        assert_eq!(LoadMode::Append.as_str(), "append");
    }
}
