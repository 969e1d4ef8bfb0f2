#![forbid(unsafe_code)]

pub mod config;
pub mod host;
pub mod watchdog;
pub mod webhook;

pub use config::{WatchdogConfig, MIN_TIMER_INTERVAL};
#[cfg(unix)]
pub use host::MpvIpc;
pub use host::{HostError, HostEvent, KeepOpen, LoadMode, PlaybackHost, Playlist};
pub use watchdog::{
    CachePhase, EventKind, ReloadReason, SessionCommand, SessionHandle, SessionState,
    SessionStatus, WatchdogError, WatchdogEvent, WatchdogSession,
};
pub use webhook::{notification_channel, Notification, WebhookConfig, WebhookDispatcher, WebhookPayload};
