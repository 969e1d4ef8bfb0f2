use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::WatchdogConfig;
use crate::host::{HostError, HostEvent, KeepOpen, PlaybackHost};
use crate::watchdog::demuxer::{DemuxerCacheWatchdog, Transition};
use crate::watchdog::eof::{EofDecision, EofDetector};
use crate::watchdog::error::WatchdogError;
use crate::watchdog::event::{EventKind, EventRing, ReloadReason, WatchdogEvent};
use crate::watchdog::pause::{PauseEntry, PauseWatchdog};
use crate::watchdog::reload::{PlaybackSnapshot, ReloadPlan};
use crate::watchdog::state::*;
use crate::webhook::Notification;

/// Requests from outside the session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Reload,
    Stop,
}

/// Cloneable handle for controlling and observing a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Queue a manual reload.
    pub async fn reload(&self) -> Result<(), WatchdogError> {
        self.commands
            .send(SessionCommand::Reload)
            .await
            .map_err(|_| WatchdogError::SessionClosed)
    }

    pub async fn stop(&self) -> Result<(), WatchdogError> {
        self.commands
            .send(SessionCommand::Stop)
            .await
            .map_err(|_| WatchdogError::SessionClosed)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

/// All watchdog state for one playback session.
///
/// Every handler takes `&mut self` and the session runs inside a single task,
/// so ticks and host events never interleave mid-decision.
pub struct WatchdogSession {
    id: Uuid,
    config: WatchdogConfig,
    host: Arc<dyn PlaybackHost>,
    state: SessionState,
    started_at: DateTime<Utc>,
    demuxer: DemuxerCacheWatchdog,
    pause: PauseWatchdog,
    eof: EofDetector,
    path: Option<String>,
    keep_open: Option<KeepOpen>,
    keep_open_overridden: bool,
    events: EventRing,
    reload_count: u64,
    last_reload: Option<ReloadSummary>,
    notification_tx: Option<UnboundedSender<Notification>>,
    status_tx: watch::Sender<SessionStatus>,
    commands_tx: mpsc::Sender<SessionCommand>,
    commands_rx: Option<mpsc::Receiver<SessionCommand>>,
}

impl WatchdogSession {
    pub fn new(
        config: WatchdogConfig,
        host: Arc<dyn PlaybackHost>,
        notification_tx: Option<UnboundedSender<Notification>>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let demuxer = DemuxerCacheWatchdog::new(config.demuxer_cache_timer_timeout);
        let pause = PauseWatchdog::new(
            config.paused_for_cache_timer_interval,
            config.paused_for_cache_timer_timeout,
        );
        let events = EventRing::new(config.event_limit);

        let mut session = Self {
            id: Uuid::new_v4(),
            config,
            host,
            state: SessionState::Idle,
            started_at: Utc::now(),
            demuxer,
            pause,
            eof: EofDetector::new(),
            path: None,
            keep_open: None,
            keep_open_overridden: false,
            events,
            reload_count: 0,
            last_reload: None,
            notification_tx,
            status_tx: watch::channel(placeholder_status()).0,
            commands_tx,
            commands_rx: Some(commands_rx),
        };
        session.publish();
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    pub fn demuxer(&self) -> &DemuxerCacheWatchdog {
        &self.demuxer
    }

    pub fn pause(&self) -> &PauseWatchdog {
        &self.pause
    }

    pub fn eof(&self) -> &EofDetector {
        &self.eof
    }

    pub fn reload_count(&self) -> u64 {
        self.reload_count
    }

    pub fn events(&self) -> Vec<WatchdogEvent> {
        self.events.list()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.to_string(),
            state: self.state,
            started_at: self.started_at,
            path: self.path.clone(),
            cache: CacheStatus {
                enabled: self.config.demuxer_cache_timer_enabled,
                phase: self.demuxer.phase(),
                time_in_phase_secs: self.demuxer.state().time_in_phase.as_secs_f64(),
                last_cache_time: self.demuxer.state().last_cache_time,
            },
            pause: PauseStatus {
                enabled: self.config.paused_for_cache_timer_enabled,
                active: self.pause.is_active(),
                elapsed_secs: self.pause.elapsed().as_secs_f64(),
            },
            reload_eof_enabled: self.config.reload_eof_enabled,
            eof_baseline: self.eof.last_time_pos(),
            keep_open_override: self.keep_open_overridden.then_some(KeepOpen::Yes),
            reload_count: self.reload_count,
            last_reload: self.last_reload.clone(),
            events: self.events.list(),
        }
    }

    /// Drive the session until the host goes away, a `Stop` command arrives
    /// or `shutdown` resolves.
    pub async fn run(
        mut self,
        mut events: UnboundedReceiver<HostEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        let Some(mut commands) = self.commands_rx.take() else {
            warn!(session_id = %self.id, "Session already ran");
            return;
        };

        self.set_state(SessionState::Active);
        info!(
            session_id = %self.id,
            demuxer_cache_timer = self.config.demuxer_cache_timer_enabled,
            paused_for_cache_timer = self.config.paused_for_cache_timer_enabled,
            reload_eof = self.config.reload_eof_enabled,
            "Starting watchdog session"
        );
        self.publish();

        let mut cache_timer = self
            .config
            .demuxer_cache_timer_enabled
            .then(|| periodic(self.config.demuxer_cache_timer_interval));
        let mut pause_timer: Option<Interval> = None;
        let mut host_alive = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = next_tick(&mut cache_timer) => self.on_cache_tick().await,
                _ = next_tick(&mut pause_timer) => self.on_pause_tick().await,
                event = events.recv() => match event {
                    Some(HostEvent::Shutdown) | None => {
                        info!(session_id = %self.id, "Host shut down");
                        host_alive = false;
                        break;
                    }
                    Some(event) => self.on_host_event(event).await,
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Reload) => {
                        self.reload(ReloadReason::Manual).await;
                    }
                    Some(SessionCommand::Stop) | None => break,
                },
                _ = &mut shutdown => break,
            }

            match (self.pause.is_active(), pause_timer.is_some()) {
                (true, false) => pause_timer = Some(periodic(self.pause.interval())),
                (false, true) => pause_timer = None,
                _ => {}
            }
        }

        self.stop(host_alive).await;
    }

    /// Stop timers and restore the end-of-playback policy.
    pub async fn shutdown(&mut self) {
        self.stop(true).await;
    }

    async fn stop(&mut self, restore_policy: bool) {
        self.set_state(SessionState::Stopping);
        self.pause.stop();
        if restore_policy {
            self.restore_keep_open().await;
        }
        self.set_state(SessionState::Stopped);
        info!(session_id = %self.id, reloads = self.reload_count, "Watchdog session stopped");
        self.publish();
    }

    pub async fn on_cache_tick(&mut self) {
        let cache_time = match self.host.cache_time().await {
            Ok(t) => t,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Skipping demuxer cache tick");
                return;
            }
        };

        let interval = self.config.demuxer_cache_timer_interval;
        match self.demuxer.tick(cache_time, interval) {
            Some(Transition::StaleToStuck) => {
                let timeout = self.config.demuxer_cache_timer_timeout;
                self.record(
                    WatchdogEvent::new(
                        EventKind::CacheStuck,
                        format!("No cache progress for {:.1}s", timeout.as_secs_f64()),
                    ),
                );
            }
            Some(Transition::FetchingToStale) => {
                self.record(WatchdogEvent::new(
                    EventKind::CacheStale,
                    format!("No cache progress past {}", seconds(cache_time)),
                ));
            }
            Some(Transition::StuckToFetching) => {
                self.record(WatchdogEvent::new(
                    EventKind::CacheRecovered,
                    format!("Cache advancing again at {}", seconds(cache_time)),
                ));
            }
            Some(transition) => trace!(%transition, "Demuxer cache tick"),
            None => {}
        }
        self.publish();
    }

    pub async fn on_pause_tick(&mut self) {
        if self.pause.tick() {
            info!(
                session_id = %self.id,
                timeout_secs = self.config.paused_for_cache_timer_timeout.as_secs_f64(),
                "Paused for cache too long"
            );
            self.try_reload(ReloadReason::PauseTimeout).await;
        }
        self.publish();
    }

    pub async fn on_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::PausedForCache(paused) if self.config.paused_for_cache_timer_enabled => {
                self.on_paused_for_cache(paused).await
            }
            HostEvent::EofReached(true) if self.config.reload_eof_enabled => self.on_eof().await,
            HostEvent::VideoConfigured(true) if self.config.reload_eof_enabled => {
                self.on_video_configured().await
            }
            HostEvent::FileLoaded => self.on_file_loaded().await,
            HostEvent::ReloadRequested => {
                self.try_reload(ReloadReason::Manual).await;
            }
            other => trace!(?other, "Ignoring host event"),
        }
        self.publish();
    }

    async fn on_paused_for_cache(&mut self, paused: bool) {
        if !paused {
            if self.pause.is_active() {
                self.record(WatchdogEvent::new(
                    EventKind::Resumed,
                    format!(
                        "Playback resumed after {:.1}s",
                        self.pause.elapsed().as_secs_f64()
                    ),
                ));
            }
            self.pause.leave();
            return;
        }

        self.record(WatchdogEvent::new(
            EventKind::PausedForCache,
            format!("Cache phase {}", self.demuxer.phase()),
        ));
        match self.pause.enter(&self.demuxer) {
            PauseEntry::ReloadNow => {
                info!(session_id = %self.id, "Demuxer cache has no progress");
                self.try_reload(ReloadReason::CacheStuck).await;
            }
            PauseEntry::TimerStarted | PauseEntry::AlreadyRunning => {}
        }
    }

    async fn on_eof(&mut self) {
        let position = self.host.time_pos().await;
        let duration = self.host.duration().await;
        let (time_pos, duration) = match (position, duration) {
            (Ok(p), Ok(d)) => (p, d),
            (Err(e), _) | (_, Err(e)) => {
                warn!(session_id = %self.id, error = %e, "Skipping EOF check");
                return;
            }
        };

        match self.eof.evaluate(time_pos, duration) {
            EofDecision::MissingTelemetry => {
                debug!(?time_pos, ?duration, "EOF without position or duration");
            }
            EofDecision::NotAtEnd => debug!(?time_pos, ?duration, "EOF before end of content"),
            EofDecision::Ended => {
                info!(session_id = %self.id, "EOF reached, playback ended");
                self.restore_keep_open().await;
                self.record(WatchdogEvent::new(
                    EventKind::PlaybackEnded,
                    format!("No progress past {}", seconds(self.eof.last_time_pos())),
                ));
            }
            EofDecision::Retry { position } => {
                info!(session_id = %self.id, position, "EOF reached, checking if more data available");
                self.try_reload(ReloadReason::EndOfFile).await;
                if let Err(e) = self.host.set_pause(false).await {
                    warn!(session_id = %self.id, error = %e, "Failed to unpause after reload");
                }
                self.eof.record(position);
            }
        }
    }

    async fn on_video_configured(&mut self) {
        match self.host.path().await {
            Ok(Some(path)) => self.path = Some(path),
            Ok(None) => {}
            Err(e) => warn!(session_id = %self.id, error = %e, "Failed to read path"),
        }

        if !self.keep_open_overridden {
            match self.host.keep_open().await {
                Ok(policy) => self.keep_open = policy,
                Err(e) => {
                    warn!(session_id = %self.id, error = %e, "Failed to read keep-open, not overriding");
                    return;
                }
            }
        }

        match self.override_keep_open().await {
            Ok(()) => {
                self.keep_open_overridden = true;
                debug!(previous = ?self.keep_open, "Overrode keep-open");
            }
            Err(e) => warn!(session_id = %self.id, error = %e, "Failed to override keep-open"),
        }
    }

    async fn override_keep_open(&self) -> Result<(), HostError> {
        self.host.set_keep_open(KeepOpen::Yes).await?;
        self.host.set_keep_open_pause(false).await
    }

    async fn on_file_loaded(&mut self) {
        let path = match self.host.path().await {
            Ok(Some(path)) => path,
            Ok(None) => return,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to read path");
                return;
            }
        };
        if self.path.as_deref().is_some_and(|current| current != path) {
            debug!(%path, "New file, forgetting EOF baseline");
            self.eof.reset();
        }
        self.path = Some(path);
    }

    /// Recreate the stream at the current position, keeping the playlist.
    ///
    /// Returns `true` when every command was accepted. The demuxer cache
    /// watchdog is reset either way so stale state from the old connection
    /// cannot trigger a second reload.
    pub async fn reload(&mut self, reason: ReloadReason) -> bool {
        let reloaded = self.try_reload(reason).await;
        self.publish();
        reloaded
    }

    async fn try_reload(&mut self, reason: ReloadReason) -> bool {
        self.demuxer.reset();

        let snapshot = match PlaybackSnapshot::read(self.host.as_ref(), self.path.as_deref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(session_id = %self.id, %reason, error = %e, "Failed to read playback state");
                self.record(
                    WatchdogEvent::new(EventKind::ReloadFailed, e.to_string()).with_reason(reason),
                );
                return false;
            }
        };

        let Some(plan) = ReloadPlan::from_snapshot(&snapshot) else {
            let e = WatchdogError::MissingTelemetry { property: "path" };
            info!(session_id = %self.id, %reason, error = %e, "Nothing to reload");
            return false;
        };

        match plan.execute(self.host.as_ref()).await {
            Ok(()) => {
                self.reload_count += 1;
                self.path = Some(plan.path.clone());
                self.last_reload = Some(ReloadSummary {
                    timestamp: Utc::now(),
                    reason,
                    path: plan.path.clone(),
                });
                let details = match plan.start {
                    Some(start) => format!("{} from {:.1}s", plan.path, start),
                    None => plan.path.clone(),
                };
                self.record(WatchdogEvent::new(EventKind::Reloaded, details).with_reason(reason));
                true
            }
            Err(e) => {
                warn!(session_id = %self.id, %reason, path = %plan.path, error = %e, "Reload failed");
                self.record(
                    WatchdogEvent::new(EventKind::ReloadFailed, e.to_string()).with_reason(reason),
                );
                false
            }
        }
    }

    async fn restore_keep_open(&mut self) {
        if !self.keep_open_overridden {
            return;
        }
        let policy = self.keep_open.unwrap_or(KeepOpen::No);
        match self.host.set_keep_open(policy).await {
            Ok(()) => {
                self.keep_open_overridden = false;
                debug!(%policy, "Restored keep-open");
            }
            Err(e) => warn!(session_id = %self.id, error = %e, "Failed to restore keep-open"),
        }
    }

    fn set_state(&mut self, target: SessionState) {
        if self.state.can_transition_to(target) {
            self.state = target;
        } else {
            debug!(from = %self.state, to = %target, "Ignoring session state change");
        }
    }

    fn record(&mut self, event: WatchdogEvent) {
        if let Some(tx) = &self.notification_tx {
            let _ = tx.send(Notification {
                session_id: self.id.to_string(),
                event: event.clone(),
            });
        }
        self.events.push(event);
    }

    fn publish(&mut self) {
        self.status_tx.send_replace(self.status());
    }
}

fn placeholder_status() -> SessionStatus {
    SessionStatus {
        session_id: String::new(),
        state: SessionState::Idle,
        started_at: Utc::now(),
        path: None,
        cache: CacheStatus {
            enabled: false,
            phase: crate::watchdog::demuxer::CachePhase::Fetching,
            time_in_phase_secs: 0.0,
            last_cache_time: None,
        },
        pause: PauseStatus {
            enabled: false,
            active: false,
            elapsed_secs: 0.0,
        },
        reload_eof_enabled: false,
        eof_baseline: None,
        keep_open_override: None,
        reload_count: 0,
        last_reload: None,
        events: Vec::new(),
    }
}

/// Human-readable position for event details.
fn seconds<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "unknown position".into(), |v| format!("{}s", v))
}

/// First tick one period after arming, like a host periodic timer.
fn periodic(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
