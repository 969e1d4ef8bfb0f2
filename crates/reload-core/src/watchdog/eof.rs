use tracing::debug;

/// Outcome of an `eof-reached` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofDecision {
    /// Position or duration unknown.
    MissingTelemetry,
    /// Position is not at the end; a stray event.
    NotAtEnd,
    /// No progress since the last EOF-triggered reload. Playback is over.
    Ended,
    /// Reload and record `position` as the new baseline.
    Retry { position: i64 },
}

/// Tells "content ended" apart from "stalled at the edge, more may come".
///
/// Each distinct end position gets exactly one reload attempt.
#[derive(Debug, Clone, Default)]
pub struct EofDetector {
    last_time_pos: Option<i64>,
}

impl EofDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_time_pos(&self) -> Option<i64> {
        self.last_time_pos
    }

    pub fn evaluate(&self, time_pos: Option<f64>, duration: Option<f64>) -> EofDecision {
        let (Some(time_pos), Some(duration)) = (time_pos, duration) else {
            return EofDecision::MissingTelemetry;
        };
        let position = whole_seconds(time_pos);
        if position != whole_seconds(duration) {
            return EofDecision::NotAtEnd;
        }

        debug!(position, baseline = ?self.last_time_pos, "EOF at end of content");
        if self.last_time_pos == Some(position) {
            EofDecision::Ended
        } else {
            EofDecision::Retry { position }
        }
    }

    pub fn record(&mut self, position: i64) {
        self.last_time_pos = Some(position);
    }

    /// Forget the baseline, e.g. when a different file starts.
    pub fn reset(&mut self) {
        self.last_time_pos = None;
    }
}

fn whole_seconds(seconds: f64) -> i64 {
    seconds.trunc() as i64
}
