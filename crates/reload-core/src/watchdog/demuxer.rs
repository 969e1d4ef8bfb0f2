//! Demuxer cache watchdog.
//!
//! Polls `demuxer-cache-time` and classifies fetch progress:
//!
//! ```text
//!    +---------------------------------+
//!    v                                 |
//! +----------+     +-------+     +-------+
//! | Fetching |<--->| Stale |---->| Stuck |
//! +----------+     +-------+     +-------+
//! ```
//!
//! Every state also has a self-transition that accumulates time in phase.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::error::WatchdogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePhase {
    Fetching,
    Stale,
    Stuck,
}

impl fmt::Display for CachePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching => write!(f, "fetching"),
            Self::Stale => write!(f, "stale"),
            Self::Stuck => write!(f, "stuck"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ContinueFetching,
    ContinueStale,
    ContinueStuck,
    FetchingToStale,
    StaleToFetching,
    StaleToStuck,
    StuckToFetching,
}

impl Transition {
    pub fn from(self) -> CachePhase {
        match self {
            Self::ContinueFetching | Self::FetchingToStale => CachePhase::Fetching,
            Self::ContinueStale | Self::StaleToFetching | Self::StaleToStuck => CachePhase::Stale,
            Self::ContinueStuck | Self::StuckToFetching => CachePhase::Stuck,
        }
    }

    pub fn to(self) -> CachePhase {
        match self {
            Self::ContinueFetching | Self::StaleToFetching | Self::StuckToFetching => {
                CachePhase::Fetching
            }
            Self::ContinueStale | Self::FetchingToStale => CachePhase::Stale,
            Self::ContinueStuck | Self::StaleToStuck => CachePhase::Stuck,
        }
    }

    pub fn is_self_transition(self) -> bool {
        self.from() == self.to()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from(), self.to())
    }
}

/// Snapshot of the watchdog's state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemuxerCacheState {
    pub phase: CachePhase,
    pub last_cache_time: Option<f64>,
    pub time_in_phase: Duration,
}

impl Default for DemuxerCacheState {
    fn default() -> Self {
        Self {
            phase: CachePhase::Fetching,
            last_cache_time: Some(0.0),
            time_in_phase: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DemuxerCacheWatchdog {
    state: DemuxerCacheState,
    timeout: Duration,
}

impl DemuxerCacheWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: DemuxerCacheState::default(),
            timeout,
        }
    }

    pub fn state(&self) -> &DemuxerCacheState {
        &self.state
    }

    pub fn phase(&self) -> CachePhase {
        self.state.phase
    }

    pub fn is_stuck(&self) -> bool {
        self.state.phase == CachePhase::Stuck
    }

    /// Back to `Fetching` with zero elapsed time.
    pub fn reset(&mut self) {
        debug!(phase = %self.state.phase, "Resetting demuxer cache watchdog");
        self.state = DemuxerCacheState::default();
    }

    /// Any change of the cache time counts as progress, including a drop.
    pub fn has_progress_since(&self, cache_time: Option<f64>) -> bool {
        self.state.last_cache_time != cache_time
    }

    /// Pick the transition for the current phase.
    pub fn classify(&self, progressed: bool) -> Transition {
        match (self.state.phase, progressed) {
            (CachePhase::Fetching, true) => Transition::ContinueFetching,
            (CachePhase::Fetching, false) => Transition::FetchingToStale,
            (CachePhase::Stale, true) => Transition::StaleToFetching,
            (CachePhase::Stale, false) if self.state.time_in_phase < self.timeout => {
                Transition::ContinueStale
            }
            (CachePhase::Stale, false) => Transition::StaleToStuck,
            (CachePhase::Stuck, true) => Transition::StuckToFetching,
            (CachePhase::Stuck, false) => Transition::ContinueStuck,
        }
    }

    /// Apply `transition`. Fails without touching the state if the
    /// transition does not start from the current phase.
    pub fn apply(
        &mut self,
        transition: Transition,
        cache_time: Option<f64>,
        interval: Duration,
    ) -> Result<CachePhase, WatchdogError> {
        if transition.from() != self.state.phase {
            return Err(WatchdogError::IllegalTransition {
                transition: transition.to_string(),
                phase: self.state.phase,
            });
        }

        self.state.last_cache_time = cache_time;
        if transition.is_self_transition() {
            self.state.time_in_phase += interval;
        } else {
            self.state.time_in_phase = Duration::ZERO;
        }
        self.state.phase = transition.to();

        debug!(
            %transition,
            cache_time = ?cache_time,
            time_in_phase_ms = self.state.time_in_phase.as_millis() as u64,
            "Demuxer cache transition"
        );
        Ok(self.state.phase)
    }

    /// One poll of the cache time. Returns the transition taken, or `None`
    /// if the transition was illegal (logged, state unchanged).
    pub fn tick(&mut self, cache_time: Option<f64>, interval: Duration) -> Option<Transition> {
        let transition = self.classify(self.has_progress_since(cache_time));
        match self.apply(transition, cache_time, interval) {
            Ok(_) => Some(transition),
            Err(e) => {
                error!(error = %e, "Demuxer cache watchdog");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(2);

    fn watchdog(timeout_secs: u64) -> DemuxerCacheWatchdog {
        DemuxerCacheWatchdog::new(Duration::from_secs(timeout_secs))
    }

    fn run(wd: &mut DemuxerCacheWatchdog, times: &[f64]) -> Vec<(CachePhase, u64)> {
        times
            .iter()
            .map(|t| {
                wd.tick(Some(*t), INTERVAL);
                (wd.phase(), wd.state().time_in_phase.as_secs())
            })
            .collect()
    }

    #[test]
    fn starts_fetching_with_zero_elapsed() {
        let wd = watchdog(6);
        assert_eq!(wd.phase(), CachePhase::Fetching);
        assert_eq!(wd.state().time_in_phase, Duration::ZERO);
    }

    #[test]
    fn plateau_reaches_stuck_at_exact_timeout() {
        let mut wd = watchdog(6);
        let phases = run(&mut wd, &[5.0, 5.0, 5.0, 5.0, 5.0, 5.0]);
        assert_eq!(
            phases,
            vec![
                (CachePhase::Fetching, 2),
                (CachePhase::Stale, 0),
                (CachePhase::Stale, 2),
                (CachePhase::Stale, 4),
                (CachePhase::Stale, 6),
                (CachePhase::Stuck, 0),
            ]
        );
    }

    #[test]
    fn stays_stale_below_timeout() {
        let mut wd = watchdog(7);
        run(&mut wd, &[5.0, 5.0, 5.0, 5.0, 5.0]);
        assert_eq!(wd.phase(), CachePhase::Stale);
        assert_eq!(wd.state().time_in_phase, Duration::from_secs(6));

        wd.tick(Some(5.0), INTERVAL);
        assert_eq!(wd.phase(), CachePhase::Stale);
        wd.tick(Some(5.0), INTERVAL);
        assert_eq!(wd.phase(), CachePhase::Stuck);
    }

    #[test]
    fn progress_recovers_from_stale_and_stuck() {
        let mut wd = watchdog(2);
        run(&mut wd, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(wd.phase(), CachePhase::Stuck);

        assert_eq!(wd.tick(Some(3.0), INTERVAL), Some(Transition::StuckToFetching));
        assert_eq!(wd.phase(), CachePhase::Fetching);
        assert_eq!(wd.state().time_in_phase, Duration::ZERO);

        wd.tick(Some(3.0), INTERVAL);
        assert_eq!(wd.tick(Some(4.0), INTERVAL), Some(Transition::StaleToFetching));
    }

    #[test]
    fn cache_drop_counts_as_progress() {
        let mut wd = watchdog(6);
        run(&mut wd, &[10.0, 10.0]);
        assert_eq!(wd.phase(), CachePhase::Stale);
        assert_eq!(wd.tick(Some(4.0), INTERVAL), Some(Transition::StaleToFetching));
    }

    #[test]
    fn missing_cache_time_is_a_value_change() {
        let mut wd = watchdog(6);
        assert_eq!(wd.tick(None, INTERVAL), Some(Transition::ContinueFetching));
        assert_eq!(wd.tick(None, INTERVAL), Some(Transition::FetchingToStale));
    }

    #[test]
    fn stuck_accumulates_time() {
        let mut wd = watchdog(0);
        run(&mut wd, &[1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(wd.phase(), CachePhase::Stuck);
        assert_eq!(wd.state().time_in_phase, Duration::from_secs(4));
    }

    #[test]
    fn time_resets_only_on_phase_change() {
        let mut wd = watchdog(4);
        let times = [1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 3.0, 4.0, 4.0];
        let mut prev = wd.phase();
        let mut prev_time = wd.state().time_in_phase;
        for t in times {
            wd.tick(Some(t), INTERVAL);
            let now = wd.state().time_in_phase;
            if wd.phase() != prev {
                assert_eq!(now, Duration::ZERO);
            } else {
                assert_eq!(now, prev_time + INTERVAL);
            }
            prev = wd.phase();
            prev_time = now;
        }
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let mut wd = watchdog(6);
        let before = *wd.state();
        let err = wd
            .apply(Transition::StaleToStuck, Some(9.0), INTERVAL)
            .unwrap_err();
        assert!(matches!(
            err,
            WatchdogError::IllegalTransition { phase: CachePhase::Fetching, .. }
        ));
        assert_eq!(*wd.state(), before);
    }

    #[test]
    fn reset_returns_to_fetching() {
        let mut wd = watchdog(0);
        run(&mut wd, &[1.0, 1.0, 1.0]);
        assert!(wd.is_stuck());
        wd.reset();
        assert_eq!(*wd.state(), DemuxerCacheState::default());
    }

    #[test]
    fn transition_endpoints() {
        assert_eq!(Transition::FetchingToStale.from(), CachePhase::Fetching);
        assert_eq!(Transition::FetchingToStale.to(), CachePhase::Stale);
        assert!(Transition::ContinueStuck.is_self_transition());
        assert!(!Transition::StaleToStuck.is_self_transition());
        assert_eq!(Transition::StaleToStuck.to_string(), "stale->stuck");
    }
}
