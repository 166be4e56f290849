//! Context passed to push handlers.
//!
//! Lets a handler answer a push by talking back to the session it arrived
//! on:
//!
//! ```ignore
//! async fn on_invite(invite: Invite, ctx: PushContext) -> Result<()> {
//!     ctx.notify("room.roomHandler.accept", &invite.room).await
//! }
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, RoutewireError};
use crate::session::SessionHandle;

/// Context for one push delivery.
#[derive(Clone)]
pub struct PushContext {
    route: String,
    session: Option<SessionHandle>,
}

impl PushContext {
    /// Context with no session attached (for testing handlers).
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            session: None,
        }
    }

    pub(crate) fn with_session(route: impl Into<String>, session: SessionHandle) -> Self {
        Self {
            route: route.into(),
            session: Some(session),
        }
    }

    /// Push route this delivery arrived on.
    #[inline]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Send a request on the same session and wait for the reply.
    pub async fn request<T: Serialize>(&self, route: &str, payload: &T) -> Result<Value> {
        self.session()?.request(route, payload).await
    }

    /// Send a notify on the same session.
    pub async fn notify<T: Serialize>(&self, route: &str, payload: &T) -> Result<()> {
        self.session()?.notify(route, payload).await
    }

    fn session(&self) -> Result<&SessionHandle> {
        self.session.as_ref().ok_or(RoutewireError::NotConnected)
    }
}
