use reload_core::{SessionHandle, SessionStatus};

use crate::error::ApiError;

#[derive(Clone, Default)]
pub struct AppState {
    pub session: Option<SessionHandle>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, handle: SessionHandle) -> Self {
        self.session = Some(handle);
        self
    }

    pub fn session(&self) -> Result<&SessionHandle, ApiError> {
        self.session
            .as_ref()
            .ok_or_else(|| ApiError::ServiceUnavailable("No watchdog session attached".into()))
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(SessionHandle::status)
    }
}
