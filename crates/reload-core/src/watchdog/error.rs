use thiserror::Error;

use super::demuxer::CachePhase;
use crate::host::HostError;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("Illegal transition {transition} from state {phase}")]
    IllegalTransition {
        transition: String,
        phase: CachePhase,
    },
    #[error("Missing telemetry: {property} unavailable")]
    MissingTelemetry { property: &'static str },
    #[error("Watchdog session is no longer running")]
    SessionClosed,
    #[error(transparent)]
    Host(#[from] HostError),
}
