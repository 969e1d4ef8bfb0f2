use std::time::Duration;

use tracing::debug;

use super::demuxer::DemuxerCacheWatchdog;

/// What the session should do after playback paused for cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseEntry {
    /// The cache was already stuck: reload now, no timer.
    ReloadNow,
    /// The timer was armed.
    TimerStarted,
    /// The timer was already running.
    AlreadyRunning,
}

/// Reloads playback that stays paused waiting for cache for too long.
///
/// `active == false` always implies `elapsed == 0`.
#[derive(Debug, Clone)]
pub struct PauseWatchdog {
    interval: Duration,
    timeout: Duration,
    active: bool,
    elapsed: Duration,
}

impl PauseWatchdog {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            active: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Playback became paused for cache.
    pub fn enter(&mut self, demuxer: &DemuxerCacheWatchdog) -> PauseEntry {
        if demuxer.is_stuck() {
            self.stop();
            return PauseEntry::ReloadNow;
        }
        if self.active {
            return PauseEntry::AlreadyRunning;
        }
        self.active = true;
        self.elapsed = Duration::ZERO;
        debug!(interval_ms = self.interval.as_millis() as u64, "Paused-for-cache timer started");
        PauseEntry::TimerStarted
    }

    /// One timer tick. Returns `true` when the timeout was reached; the
    /// timer is stopped in that case.
    pub fn tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.elapsed += self.interval;
        debug!(elapsed_ms = self.elapsed.as_millis() as u64, "Paused-for-cache tick");
        if self.elapsed >= self.timeout {
            self.stop();
            return true;
        }
        false
    }

    /// Playback resumed on its own.
    pub fn leave(&mut self) {
        self.stop();
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        if self.active {
            debug!(elapsed_ms = self.elapsed.as_millis() as u64, "Paused-for-cache timer stopped");
        }
        self.active = false;
        self.elapsed = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pause() -> PauseWatchdog {
        PauseWatchdog::new(Duration::from_secs(1), Duration::from_secs(3))
    }

    fn stuck_demuxer() -> DemuxerCacheWatchdog {
        let mut wd = DemuxerCacheWatchdog::new(Duration::ZERO);
        for _ in 0..3 {
            wd.tick(Some(1.0), Duration::from_secs(1));
        }
        assert!(wd.is_stuck());
        wd
    }

    #[test]
    fn stuck_cache_reloads_without_timer() {
        let mut p = pause();
        assert_eq!(p.enter(&stuck_demuxer()), PauseEntry::ReloadNow);
        assert!(!p.is_active());
        assert_eq!(p.elapsed(), Duration::ZERO);
    }

    #[test]
    fn stuck_cache_clears_running_timer() {
        let mut p = pause();
        p.enter(&DemuxerCacheWatchdog::new(Duration::from_secs(20)));
        p.tick();
        p.tick();

        assert_eq!(p.enter(&stuck_demuxer()), PauseEntry::ReloadNow);
        assert!(!p.is_active());
        assert_eq!(p.elapsed(), Duration::ZERO);
        assert!(!p.tick());
    }

    #[test]
    fn timeout_fires_once_and_resets() {
        let mut p = pause();
        let demuxer = DemuxerCacheWatchdog::new(Duration::from_secs(20));
        assert_eq!(p.enter(&demuxer), PauseEntry::TimerStarted);

        assert!(!p.tick());
        assert!(!p.tick());
        assert!(p.tick());
        assert!(!p.is_active());
        assert_eq!(p.elapsed(), Duration::ZERO);

        assert!(!p.tick());
    }

    #[test]
    fn leaving_before_timeout_resets() {
        let mut p = pause();
        p.enter(&DemuxerCacheWatchdog::new(Duration::from_secs(20)));
        p.tick();
        p.tick();
        assert_eq!(p.elapsed(), Duration::from_secs(2));

        p.leave();
        assert!(!p.is_active());
        assert_eq!(p.elapsed(), Duration::ZERO);
    }

    #[test]
    fn reentering_keeps_running_timer() {
        let mut p = pause();
        let demuxer = DemuxerCacheWatchdog::new(Duration::from_secs(20));
        p.enter(&demuxer);
        p.tick();
        assert_eq!(p.enter(&demuxer), PauseEntry::AlreadyRunning);
        assert_eq!(p.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut p = pause();
        p.stop();
        p.stop();
        assert!(!p.is_active());
        assert_eq!(p.elapsed(), Duration::ZERO);
    }
}
