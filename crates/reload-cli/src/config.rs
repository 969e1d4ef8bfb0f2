//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:8787"
//! log_format = "json"
//!
//! [mpv]
//! socket = "/tmp/mpv.sock"
//!
//! [watchdog]
//! paused_for_cache_timer_timeout = 15.0
//! demuxer_cache_timer_interval = 2.0
//! demuxer_cache_timer_timeout = 30.0
//! reload_eof = true
//! reload_key_binding = "Ctrl+r"
//!
//! [[webhook]]
//! url = "https://hooks.example.com/mpv"
//! events = ["reloaded", "reload_failed", "playback_ended"]
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use reload_core::{WatchdogConfig, WebhookConfig, MIN_TIMER_INTERVAL};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub mpv: MpvConfig,

    #[serde(default)]
    pub watchdog: WatchdogSection,

    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP API address. No API is served when unset.
    #[serde(default)]
    pub listen: Option<SocketAddr>,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: None,
            log_format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MpvConfig {
    /// Path of mpv's `--input-ipc-server` socket.
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

/// Watchdog options. Times are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    #[serde(default = "enabled")]
    pub paused_for_cache_timer: bool,

    #[serde(default = "default_pause_interval")]
    pub paused_for_cache_timer_interval: f64,

    #[serde(default = "default_pause_timeout")]
    pub paused_for_cache_timer_timeout: f64,

    #[serde(default = "enabled")]
    pub demuxer_cache_timer: bool,

    #[serde(default = "default_cache_interval")]
    pub demuxer_cache_timer_interval: f64,

    #[serde(default = "default_cache_timeout")]
    pub demuxer_cache_timer_timeout: f64,

    #[serde(default)]
    pub reload_eof: bool,

    /// Empty string disables the binding.
    #[serde(default = "default_key_binding")]
    pub reload_key_binding: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    #[serde(default = "default_event_limit")]
    pub event_limit: usize,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            paused_for_cache_timer: true,
            paused_for_cache_timer_interval: default_pause_interval(),
            paused_for_cache_timer_timeout: default_pause_timeout(),
            demuxer_cache_timer: true,
            demuxer_cache_timer_interval: default_cache_interval(),
            demuxer_cache_timer_timeout: default_cache_timeout(),
            reload_eof: false,
            reload_key_binding: default_key_binding(),
            request_timeout: default_request_timeout(),
            event_limit: default_event_limit(),
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_pause_interval() -> f64 {
    1.0
}

fn default_pause_timeout() -> f64 {
    10.0
}

fn default_cache_interval() -> f64 {
    2.0
}

fn default_cache_timeout() -> f64 {
    20.0
}

fn default_key_binding() -> String {
    "Ctrl+r".into()
}

fn default_request_timeout() -> f64 {
    5.0
}

fn default_event_limit() -> usize {
    100
}

impl WatchdogSection {
    /// Only valid after [`AppConfig::validate`] accepted the values.
    pub fn to_watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig::default()
            .with_paused_for_cache_timer(self.paused_for_cache_timer)
            .with_paused_for_cache_timer_interval(secs(self.paused_for_cache_timer_interval))
            .with_paused_for_cache_timer_timeout(secs(self.paused_for_cache_timer_timeout))
            .with_demuxer_cache_timer(self.demuxer_cache_timer)
            .with_demuxer_cache_timer_interval(secs(self.demuxer_cache_timer_interval))
            .with_demuxer_cache_timer_timeout(secs(self.demuxer_cache_timer_timeout))
            .with_reload_eof(self.reload_eof)
            .with_reload_key_binding(self.reload_key_binding.clone())
            .with_request_timeout(secs(self.request_timeout))
            .with_event_limit(self.event_limit)
    }

    fn validate(&self) -> Result<(), String> {
        let min = MIN_TIMER_INTERVAL.as_secs_f64();
        let max = MAX_SECONDS.as_secs_f64();
        for (name, value) in [
            ("paused_for_cache_timer_interval", self.paused_for_cache_timer_interval),
            ("demuxer_cache_timer_interval", self.demuxer_cache_timer_interval),
        ] {
            if !value.is_finite() || value < min {
                return Err(format!(
                    "Invalid {}: {} (must be at least {}s)",
                    name, value, min
                ));
            }
        }

        for (name, value) in [
            ("paused_for_cache_timer_timeout", self.paused_for_cache_timer_timeout),
            ("demuxer_cache_timer_timeout", self.demuxer_cache_timer_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("Invalid {}: {} (must be positive)", name, value));
            }
        }

        for (name, value) in [
            ("paused_for_cache_timer_interval", self.paused_for_cache_timer_interval),
            ("paused_for_cache_timer_timeout", self.paused_for_cache_timer_timeout),
            ("demuxer_cache_timer_interval", self.demuxer_cache_timer_interval),
            ("demuxer_cache_timer_timeout", self.demuxer_cache_timer_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value > max {
                return Err(format!(
                    "Invalid {}: {} (must be at most {}s)",
                    name, value, max
                ));
            }
        }

        if self.event_limit == 0 {
            return Err("Invalid event_limit: must be at least 1".into());
        }
        Ok(())
    }
}

/// Upper bound for every configured time. Keeps `Instant` arithmetic in the
/// timers far from overflow.
const MAX_SECONDS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_SECONDS.as_secs_f64()))
        .unwrap_or(MAX_SECONDS)
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.watchdog.validate()?;

        for (i, wh) in self.webhook.iter().enumerate() {
            let parsed = url::Url::parse(&wh.url)
                .map_err(|e| format!("Invalid webhook URL at index {}: {} ({})", i, wh.url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!(
                    "Webhook URL must use http or https at index {}: {}",
                    i, wh.url
                ));
            }
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}
