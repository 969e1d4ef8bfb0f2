pub mod session;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(session::get_status))
        .route("/events", get(session::get_events))
        .route("/reload", post(session::request_reload))
}
