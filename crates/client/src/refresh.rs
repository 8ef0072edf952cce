//! Single-flight access-token refresh
//!
//! However many requests notice an expired token at once, the coordinator
//! issues one refresh call and parks everyone else until it settles.
//!
//! # States
//!
//! - **Idle**: `in_flight == false`, no waiters.
//! - **Refreshing**: `in_flight == true`; the refresh task is running and new
//!   subscribers are queued behind it.
//!
//! On success every waiter is released in the order it subscribed. On
//! failure the session is logged out first, then every waiter is released
//! with [`ClientError::RefreshFailed`]. Either way the queue is empty and the
//! coordinator is idle again afterwards.
//!
//! The refresh runs on its own tokio task, so dropping a parked request never
//! cancels the refresh the other requests are waiting for. Without a
//! configured timeout, a refresh endpoint that never answers keeps every
//! parked request waiting.

use crate::error::{ClientError, Result};
use crate::session::SessionActions;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Issues the refresh call. The response body is irrelevant; the new token
/// arrives as a cookie.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn post(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    Failed,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

struct Inner {
    endpoint: String,
    transport: Arc<dyn RefreshTransport>,
    session: SessionActions,
    timeout: Option<Duration>,
    state: Mutex<RefreshState>,
}

/// A caller parked until the in-flight refresh settles
#[derive(Debug)]
pub struct RefreshWaiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshWaiter {
    /// Wait for the refresh this waiter is queued behind
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(RefreshOutcome::Refreshed) => Ok(()),
            // A dropped sender means the refresh task died with the runtime
            Ok(RefreshOutcome::Failed) | Err(_) => Err(ClientError::RefreshFailed),
        }
    }
}

/// Owner of the refresh state for one client instance.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn RefreshTransport>,
        session: SessionActions,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: endpoint.into(),
                transport,
                session,
                timeout,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Whether a refresh call is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().in_flight
    }

    /// Number of callers parked on the in-flight refresh
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Queue behind the in-flight refresh, starting one if idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> RefreshWaiter {
        let (tx, rx) = oneshot::channel();
        let start = Self::enqueue(&mut self.inner.lock(), tx);
        self.start_if(start);
        RefreshWaiter { rx }
    }

    /// Like [`subscribe`](Self::subscribe), but only if `needs_refresh`
    /// returns true.
    ///
    /// `needs_refresh` runs under the state lock, so it cannot observe the
    /// cookie from before a refresh and then queue after that refresh has
    /// settled. It must not call back into the coordinator.
    pub fn subscribe_if(&self, needs_refresh: impl FnOnce() -> bool) -> Option<RefreshWaiter> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.inner.lock();
            if !needs_refresh() {
                return None;
            }
            Self::enqueue(&mut state, tx)
        };
        self.start_if(start);
        Some(RefreshWaiter { rx })
    }

    /// Returns whether the caller must start the refresh task
    fn enqueue(state: &mut RefreshState, tx: oneshot::Sender<RefreshOutcome>) -> bool {
        state.waiters.push_back(tx);
        if state.in_flight {
            debug!(waiters = state.waiters.len(), "Refresh in flight, queueing");
            false
        } else {
            state.in_flight = true;
            true
        }
    }

    fn start_if(&self, start: bool) {
        if start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let result = inner.perform().await;
                inner.settle(result);
            });
        }
    }

    /// Refresh the access token, or wait for the refresh already running.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RefreshFailed`] after the session has been
    /// logged out
    pub async fn request_access_token(&self) -> Result<()> {
        self.subscribe().wait().await
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn perform(&self) -> Result<()> {
        info!(endpoint = %self.endpoint, "Refreshing access token");
        let call = self.transport.post(&self.endpoint);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                warn!(timeout = ?limit, "Access token refresh timed out");
                Err(ClientError::RefreshFailed)
            }),
            None => call.await,
        }
    }

    fn settle(&self, result: Result<()>) {
        let outcome = match result {
            Ok(()) => RefreshOutcome::Refreshed,
            Err(error) => {
                warn!(%error, "Access token refresh failed, logging out");
                self.session.logout(None);
                RefreshOutcome::Failed
            }
        };

        let waiters = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        if outcome == RefreshOutcome::Refreshed {
            info!(released = waiters.len(), "Access token refreshed");
        }

        for waiter in waiters {
            // The receiver is gone if its request was dropped while parked
            let _ = waiter.send(outcome);
        }
    }
}
