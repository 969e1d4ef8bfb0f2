pub mod demuxer;
pub mod engine;
pub mod eof;
pub mod error;
pub mod event;
pub mod pause;
pub mod reload;
pub mod state;

pub use demuxer::{CachePhase, DemuxerCacheState, DemuxerCacheWatchdog, Transition};
pub use engine::{SessionCommand, SessionHandle, WatchdogSession};
pub use eof::{EofDecision, EofDetector};
pub use error::WatchdogError;
pub use event::{EventKind, EventRing, ReloadReason, WatchdogEvent};
pub use pause::{PauseEntry, PauseWatchdog};
pub use reload::{ContentKind, PlaybackSnapshot, ReloadPlan};
pub use state::{CacheStatus, PauseStatus, ReloadSummary, SessionState, SessionStatus};
