//! mpv JSON IPC client.
//!
//! Talks newline-delimited JSON over the unix socket mpv opens with
//! `--input-ipc-server`. Replies are matched to callers by `request_id`;
//! everything else arriving on the socket is an unsolicited event and is
//! translated into a [`HostEvent`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{HostError, HostEvent, KeepOpen, LoadMode, PlaybackHost, Playlist};
use crate::config::WatchdogConfig;

/// First argument of the `script-message` sent by the reload key binding.
pub const RELOAD_MESSAGE: &str = "mpv-reload";

const OBS_PAUSED_FOR_CACHE: u64 = 1;
const OBS_EOF_REACHED: u64 = 2;
const OBS_VO_CONFIGURED: u64 = 3;

type Reply = Result<Value, String>;
type Pending = Arc<DashMap<u64, oneshot::Sender<Reply>>>;

pub struct MpvIpc {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl MpvIpc {
    /// Connect to a running mpv, subscribe to the watched properties and
    /// bind the manual reload key if one is configured.
    pub async fn connect(
        socket: impl AsRef<Path>,
        config: &WatchdogConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HostEvent>), HostError> {
        let stream = UnixStream::connect(socket.as_ref()).await?;
        debug!(socket = %socket.as_ref().display(), "Connected to mpv IPC socket");

        let (ipc, events) = Self::from_stream(stream, config.request_timeout);
        ipc.observe(OBS_PAUSED_FOR_CACHE, "paused-for-cache").await?;
        ipc.observe(OBS_EOF_REACHED, "eof-reached").await?;
        ipc.observe(OBS_VO_CONFIGURED, "vo-configured").await?;
        if let Some(binding) = &config.reload_key_binding {
            ipc.bind_reload_key(binding).await?;
        }
        Ok((ipc, events))
    }

    /// Wrap an already connected stream. No properties are observed yet.
    pub fn from_stream(
        stream: UnixStream,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (read, write) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(DashMap::new());
        let reader = tokio::spawn(read_loop(read, Arc::clone(&pending), tx));

        let ipc = Self {
            writer: Mutex::new(write),
            pending,
            next_id: AtomicU64::new(1),
            timeout,
            reader,
        };
        (ipc, rx)
    }

    async fn observe(&self, id: u64, property: &str) -> Result<(), HostError> {
        self.request(json!(["observe_property", id, property])).await?;
        Ok(())
    }

    async fn bind_reload_key(&self, binding: &str) -> Result<(), HostError> {
        let command = format!("script-message {} reload", RELOAD_MESSAGE);
        self.request(json!(["keybind", binding, command])).await?;
        debug!(binding, "Bound manual reload key");
        Ok(())
    }

    async fn request(&self, command: Value) -> Result<Value, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = command_name(&command);
        let mut line = serde_json::to_vec(&json!({ "command": command, "request_id": id }))
            .map_err(|e| HostError::Malformed {
                command: name.clone(),
                message: e.to_string(),
            })?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(&line).await {
                self.pending.remove(&id);
                return Err(e.into());
            }
        }
        trace!(request_id = id, command = %name, "Sent IPC request");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(message))) => Err(HostError::Rejected {
                command: name,
                message,
            }),
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => {
                self.pending.remove(&id);
                Err(HostError::Timeout { command: name })
            }
        }
    }

    async fn get_property(&self, property: &str) -> Result<Option<Value>, HostError> {
        match self.request(json!(["get_property", property])).await {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(HostError::Rejected { message, .. }) if message == "property unavailable" => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_f64(&self, property: &str) -> Result<Option<f64>, HostError> {
        Ok(self.get_property(property).await?.and_then(|v| v.as_f64()))
    }

    async fn get_bool(&self, property: &str) -> Result<bool, HostError> {
        Ok(self
            .get_property(property)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn set_property(&self, property: &str, value: Value) -> Result<(), HostError> {
        self.request(json!(["set_property", property, value])).await?;
        Ok(())
    }
}

impl Drop for MpvIpc {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PlaybackHost for MpvIpc {
    async fn cache_time(&self) -> Result<Option<f64>, HostError> {
        self.get_f64("demuxer-cache-time").await
    }

    async fn paused_for_cache(&self) -> Result<bool, HostError> {
        self.get_bool("paused-for-cache").await
    }

    async fn eof_reached(&self) -> Result<bool, HostError> {
        self.get_bool("eof-reached").await
    }

    async fn time_pos(&self) -> Result<Option<f64>, HostError> {
        self.get_f64("time-pos").await
    }

    async fn duration(&self) -> Result<Option<f64>, HostError> {
        self.get_f64("duration").await
    }

    async fn path(&self) -> Result<Option<String>, HostError> {
        Ok(self
            .get_property("path")
            .await?
            .and_then(|v| v.as_str().map(str::to_owned)))
    }

    async fn playlist(&self) -> Result<Playlist, HostError> {
        let entries: Vec<String> = match self.get_property("playlist").await? {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.get("filename").and_then(Value::as_str))
                .map(str::to_owned)
                .collect(),
            Some(other) => {
                return Err(HostError::Malformed {
                    command: "get_property playlist".into(),
                    message: format!("expected array, got {}", other),
                })
            }
            None => Vec::new(),
        };
        let current = self
            .get_property("playlist-pos")
            .await?
            .and_then(|v| v.as_i64())
            .and_then(|pos| usize::try_from(pos).ok())
            .filter(|pos| *pos < entries.len());
        Ok(Playlist { entries, current })
    }

    async fn keep_open(&self) -> Result<Option<KeepOpen>, HostError> {
        let value = self.get_property("keep-open").await?;
        Ok(match value {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Bool(true)) => Some(KeepOpen::Yes),
            Some(Value::Bool(false)) => Some(KeepOpen::No),
            _ => None,
        })
    }

    async fn load_file(
        &self,
        path: &str,
        mode: LoadMode,
        start: Option<f64>,
    ) -> Result<(), HostError> {
        let mut command = json!({
            "name": "loadfile",
            "url": path,
            "flags": mode.as_str(),
        });
        if let Some(start) = start {
            command["options"] = Value::String(format!("start=+{}", start));
        }
        self.request(command).await?;
        Ok(())
    }

    async fn playlist_move(&self, from: usize, to: usize) -> Result<(), HostError> {
        self.request(json!(["playlist-move", from, to])).await?;
        Ok(())
    }

    async fn set_keep_open(&self, policy: KeepOpen) -> Result<(), HostError> {
        self.set_property("keep-open", Value::String(policy.to_string()))
            .await
    }

    async fn set_keep_open_pause(&self, enabled: bool) -> Result<(), HostError> {
        self.set_property("keep-open-pause", Value::Bool(enabled))
            .await
    }

    async fn set_pause(&self, paused: bool) -> Result<(), HostError> {
        self.set_property("pause", Value::Bool(paused)).await
    }
}

async fn read_loop(
    read: OwnedReadHalf,
    pending: Pending,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("mpv IPC socket closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "mpv IPC read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, line = %line, "Ignoring malformed IPC message");
                continue;
            }
        };

        if message.get("event").is_none() {
            if let Some(id) = message.get("request_id").and_then(Value::as_u64) {
                if let Some((_, tx)) = pending.remove(&id) {
                    let _ = tx.send(parse_reply(&message));
                }
            }
            continue;
        }

        if let Some(event) = parse_event(&message) {
            trace!(?event, "mpv event");
            if events.send(event).is_err() {
                break;
            }
        }
    }

    // Dropping the senders wakes every waiting caller with `Disconnected`.
    pending.clear();
    let _ = events.send(HostEvent::Shutdown);
}

fn parse_reply(message: &Value) -> Reply {
    match message.get("error").and_then(Value::as_str) {
        Some("success") => Ok(message.get("data").cloned().unwrap_or(Value::Null)),
        Some(error) => Err(error.to_string()),
        None => Err("reply without error field".to_string()),
    }
}

fn parse_event(message: &Value) -> Option<HostEvent> {
    match message.get("event")?.as_str()? {
        "property-change" => {
            let flag = message.get("data").and_then(Value::as_bool).unwrap_or(false);
            match message.get("id")?.as_u64()? {
                OBS_PAUSED_FOR_CACHE => Some(HostEvent::PausedForCache(flag)),
                OBS_EOF_REACHED => Some(HostEvent::EofReached(flag)),
                OBS_VO_CONFIGURED => Some(HostEvent::VideoConfigured(flag)),
                _ => None,
            }
        }
        "client-message" => {
            let args = message.get("args")?.as_array()?;
            (args.first()?.as_str()? == RELOAD_MESSAGE).then_some(HostEvent::ReloadRequested)
        }
        "file-loaded" => Some(HostEvent::FileLoaded),
        "shutdown" => Some(HostEvent::Shutdown),
        _ => None,
    }
}

fn command_name(command: &Value) -> String {
    let name = match command {
        Value::Array(parts) => parts.first().and_then(Value::as_str),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    };
    name.unwrap_or("command").to_string()
}
