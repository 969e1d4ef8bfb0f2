use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest timer interval the watchdogs accept.
pub const MIN_TIMER_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a watchdog session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Whether the paused-for-cache watchdog is enabled.
    pub paused_for_cache_timer_enabled: bool,
    /// Tick interval of the paused-for-cache timer (default: 1s).
    pub paused_for_cache_timer_interval: Duration,
    /// Paused time after which playback is reloaded (default: 10s).
    pub paused_for_cache_timer_timeout: Duration,
    /// Whether the demuxer cache watchdog is enabled.
    pub demuxer_cache_timer_enabled: bool,
    /// Polling interval of `demuxer-cache-time` (default: 2s).
    pub demuxer_cache_timer_interval: Duration,
    /// Time without cache progress before the cache counts as stuck (default: 20s).
    pub demuxer_cache_timer_timeout: Duration,
    /// Whether reaching end-of-file triggers a reload attempt.
    pub reload_eof_enabled: bool,
    /// Key binding for a manual reload. `None` disables it.
    pub reload_key_binding: Option<String>,
    /// Upper bound for a single host command round trip.
    pub request_timeout: Duration,
    /// Maximum number of events to retain (ring buffer capacity).
    pub event_limit: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            paused_for_cache_timer_enabled: true,
            paused_for_cache_timer_interval: Duration::from_secs(1),
            paused_for_cache_timer_timeout: Duration::from_secs(10),
            demuxer_cache_timer_enabled: true,
            demuxer_cache_timer_interval: Duration::from_secs(2),
            demuxer_cache_timer_timeout: Duration::from_secs(20),
            reload_eof_enabled: false,
            reload_key_binding: Some("Ctrl+r".to_string()),
            request_timeout: Duration::from_secs(5),
            event_limit: 100,
        }
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_TIMER_INTERVAL)
}

impl WatchdogConfig {
    pub fn with_paused_for_cache_timer(mut self, enabled: bool) -> Self {
        self.paused_for_cache_timer_enabled = enabled;
        self
    }

    pub fn with_paused_for_cache_timer_interval(mut self, interval: Duration) -> Self {
        self.paused_for_cache_timer_interval = clamp_interval(interval);
        self
    }

    pub fn with_paused_for_cache_timer_timeout(mut self, timeout: Duration) -> Self {
        self.paused_for_cache_timer_timeout = timeout;
        self
    }

    pub fn with_demuxer_cache_timer(mut self, enabled: bool) -> Self {
        self.demuxer_cache_timer_enabled = enabled;
        self
    }

    pub fn with_demuxer_cache_timer_interval(mut self, interval: Duration) -> Self {
        self.demuxer_cache_timer_interval = clamp_interval(interval);
        self
    }

    pub fn with_demuxer_cache_timer_timeout(mut self, timeout: Duration) -> Self {
        self.demuxer_cache_timer_timeout = timeout;
        self
    }

    pub fn with_reload_eof(mut self, enabled: bool) -> Self {
        self.reload_eof_enabled = enabled;
        self
    }

    /// An empty binding disables the manual trigger.
    pub fn with_reload_key_binding(mut self, binding: impl Into<String>) -> Self {
        let binding = binding.into();
        self.reload_key_binding = if binding.trim().is_empty() {
            None
        } else {
            Some(binding)
        };
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = WatchdogConfig::default();
        assert!(c.paused_for_cache_timer_enabled);
        assert_eq!(c.paused_for_cache_timer_interval, Duration::from_secs(1));
        assert_eq!(c.paused_for_cache_timer_timeout, Duration::from_secs(10));
        assert!(c.demuxer_cache_timer_enabled);
        assert_eq!(c.demuxer_cache_timer_interval, Duration::from_secs(2));
        assert_eq!(c.demuxer_cache_timer_timeout, Duration::from_secs(20));
        assert!(!c.reload_eof_enabled);
        assert_eq!(c.reload_key_binding.as_deref(), Some("Ctrl+r"));
    }

    #[test]
    fn intervals_are_clamped_to_floor() {
        let c = WatchdogConfig::default()
            .with_demuxer_cache_timer_interval(Duration::from_millis(10))
            .with_paused_for_cache_timer_interval(Duration::ZERO);
        assert_eq!(c.demuxer_cache_timer_interval, MIN_TIMER_INTERVAL);
        assert_eq!(c.paused_for_cache_timer_interval, MIN_TIMER_INTERVAL);
    }

    #[test]
    fn interval_at_floor_is_kept() {
        let c = WatchdogConfig::default()
            .with_demuxer_cache_timer_interval(Duration::from_millis(50));
        assert_eq!(c.demuxer_cache_timer_interval, Duration::from_millis(50));
    }

    #[test]
    fn empty_key_binding_disables_trigger() {
        let c = WatchdogConfig::default().with_reload_key_binding("  ");
        assert!(c.reload_key_binding.is_none());

        let c = WatchdogConfig::default().with_reload_key_binding("F5");
        assert_eq!(c.reload_key_binding.as_deref(), Some("F5"));
    }

    #[test]
    fn event_limit_never_zero() {
        let c = WatchdogConfig::default().with_event_limit(0);
        assert_eq!(c.event_limit, 1);
    }
}
