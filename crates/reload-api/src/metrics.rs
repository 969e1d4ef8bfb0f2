use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use reload_core::{CachePhase, SessionState, SessionStatus};

use crate::state::AppState;

const CACHE_PHASES: [CachePhase; 3] = [CachePhase::Fetching, CachePhase::Stale, CachePhase::Stuck];
const SESSION_STATES: [SessionState; 4] = [
    SessionState::Idle,
    SessionState::Active,
    SessionState::Stopping,
    SessionState::Stopped,
];

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(2048);

    if let Some(status) = state.status() {
        render(&mut out, &status);
    }
    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}

fn render(out: &mut String, s: &SessionStatus) {
    let id = &s.session_id;

    writeln!(out, "# TYPE mpv_reload_session info").unwrap();
    writeln!(out, "# HELP mpv_reload_session Information about the watchdog session").unwrap();
    writeln!(
        out,
        "mpv_reload_session_info{{session_id=\"{}\",started=\"{}\"}} 1",
        id,
        s.started_at.to_rfc3339()
    )
    .unwrap();

    writeln!(out, "# TYPE mpv_reload_session_state stateset").unwrap();
    writeln!(out, "# HELP mpv_reload_session_state Current state of the watchdog session").unwrap();
    for variant in SESSION_STATES {
        writeln!(
            out,
            "mpv_reload_session_state{{session_id=\"{}\",state=\"{}\"}} {}",
            id,
            variant,
            u8::from(s.state == variant)
        )
        .unwrap();
    }

    writeln!(out, "# TYPE mpv_reload_reloads counter").unwrap();
    writeln!(out, "# HELP mpv_reload_reloads Successful reloads since the session started").unwrap();
    writeln!(out, "mpv_reload_reloads_total{{session_id=\"{}\"}} {}", id, s.reload_count).unwrap();

    if let Some(last) = &s.last_reload {
        writeln!(out, "# TYPE mpv_reload_last_reload_timestamp_seconds gauge").unwrap();
        writeln!(
            out,
            "# HELP mpv_reload_last_reload_timestamp_seconds Unix timestamp of the last reload"
        )
        .unwrap();
        let secs = last.timestamp.timestamp() as f64
            + (last.timestamp.timestamp_subsec_millis() as f64 / 1000.0);
        writeln!(
            out,
            "mpv_reload_last_reload_timestamp_seconds{{session_id=\"{}\",reason=\"{}\"}} {:.3}",
            id, last.reason, secs
        )
        .unwrap();
    }

    if s.cache.enabled {
        writeln!(out, "# TYPE mpv_reload_cache_phase stateset").unwrap();
        writeln!(out, "# HELP mpv_reload_cache_phase Demuxer cache watchdog phase").unwrap();
        for phase in CACHE_PHASES {
            writeln!(
                out,
                "mpv_reload_cache_phase{{session_id=\"{}\",phase=\"{}\"}} {}",
                id,
                phase,
                u8::from(s.cache.phase == phase)
            )
            .unwrap();
        }

        writeln!(out, "# TYPE mpv_reload_cache_time_in_phase_seconds gauge").unwrap();
        writeln!(
            out,
            "# HELP mpv_reload_cache_time_in_phase_seconds Time spent in the current cache phase"
        )
        .unwrap();
        writeln!(
            out,
            "mpv_reload_cache_time_in_phase_seconds{{session_id=\"{}\"}} {:.3}",
            id, s.cache.time_in_phase_secs
        )
        .unwrap();
    }

    if s.pause.enabled {
        writeln!(out, "# TYPE mpv_reload_pause_elapsed_seconds gauge").unwrap();
        writeln!(
            out,
            "# HELP mpv_reload_pause_elapsed_seconds Time spent paused for cache"
        )
        .unwrap();
        writeln!(
            out,
            "mpv_reload_pause_elapsed_seconds{{session_id=\"{}\"}} {:.3}",
            id, s.pause.elapsed_secs
        )
        .unwrap();
    }

    writeln!(out, "# TYPE mpv_reload_uptime_seconds gauge").unwrap();
    writeln!(out, "# HELP mpv_reload_uptime_seconds Time since the session was created").unwrap();
    let uptime = (chrono::Utc::now() - s.started_at).num_milliseconds() as f64 / 1000.0;
    writeln!(out, "mpv_reload_uptime_seconds{{session_id=\"{}\"}} {:.3}", id, uptime).unwrap();
}
