//! Inbound response hook: end the session when the server refuses it

use crate::error::Result;
use crate::session::SessionActions;
use tracing::warn;

/// Logs the user out on 401/403 without swallowing the error
#[derive(Clone)]
pub struct ResponseGate {
    session: SessionActions,
}

impl ResponseGate {
    pub fn new(session: SessionActions) -> Self {
        Self { session }
    }

    /// Pass `result` through, triggering logout first if it is a 401 or 403
    pub fn inspect<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result
            && error.is_unauthorized()
        {
            warn!(status = ?error.status(), "Session rejected by server, logging out");
            self.session.logout(None);
        }
        result
    }
}
