use serde::Serialize;
use tracing::{debug, info};

use crate::host::{HostError, LoadMode, PlaybackHost, Playlist};

/// Host state read right before a reload.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub path: Option<String>,
    pub time_pos: Option<f64>,
    pub duration: Option<f64>,
    pub playlist: Playlist,
}

impl PlaybackSnapshot {
    /// Read a fresh snapshot. `fallback_path` is used when the host reports
    /// no path (it was captured when video output came up).
    pub async fn read(
        host: &dyn PlaybackHost,
        fallback_path: Option<&str>,
    ) -> Result<Self, HostError> {
        let path = host.path().await?.or_else(|| fallback_path.map(str::to_owned));
        Ok(Self {
            path,
            time_pos: host.time_pos().await?,
            duration: host.duration().await?,
            playlist: host.playlist().await?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Fixed, known duration. Resume at the same position.
    OnDemand,
    /// No fixed start. Resume at the live edge.
    Live,
}

impl ContentKind {
    pub fn classify(duration: Option<f64>) -> Self {
        match duration {
            Some(d) if d > 0.0 => Self::OnDemand,
            _ => Self::Live,
        }
    }
}

/// The commands that recreate the stream and rebuild the playlist around it.
///
/// `loadfile replace` clears the playlist, so the entries before the current
/// one are appended after it, the reloaded entry is moved back behind them,
/// and the entries after it are appended last.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadPlan {
    pub path: String,
    pub kind: ContentKind,
    pub start: Option<f64>,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

impl ReloadPlan {
    /// `None` when the host has no path to reload.
    pub fn from_snapshot(snapshot: &PlaybackSnapshot) -> Option<Self> {
        let path = snapshot.path.clone()?;
        let kind = ContentKind::classify(snapshot.duration);
        let start = match kind {
            ContentKind::OnDemand => snapshot.time_pos,
            ContentKind::Live => None,
        };

        let entries = &snapshot.playlist.entries;
        let (before, after) = match snapshot.playlist.current {
            Some(pos) if pos < entries.len() => {
                (entries[..pos].to_vec(), entries[pos + 1..].to_vec())
            }
            _ => (Vec::new(), Vec::new()),
        };

        Some(Self {
            path,
            kind,
            start,
            before,
            after,
        })
    }

    /// Index the reloaded entry ends up at.
    pub fn position(&self) -> usize {
        self.before.len()
    }

    pub async fn execute(&self, host: &dyn PlaybackHost) -> Result<(), HostError> {
        match self.kind {
            ContentKind::OnDemand => {
                info!(path = %self.path, start = ?self.start, "Reloading video");
            }
            ContentKind::Live => info!(path = %self.path, "Reloading stream"),
        }
        host.load_file(&self.path, LoadMode::Replace, self.start)
            .await?;

        let total = self.before.len() + 1 + self.after.len();
        debug!(position = self.position() + 1, total, "Restoring playlist");

        for entry in &self.before {
            host.load_file(entry, LoadMode::Append, None).await?;
        }
        if !self.before.is_empty() {
            host.playlist_move(0, self.position() + 1).await?;
        }
        for entry in &self.after {
            host.load_file(entry, LoadMode::Append, None).await?;
        }
        Ok(())
    }
}
