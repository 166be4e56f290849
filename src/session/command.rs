//! Commands into a running session and the handle that sends them.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use super::pending::ReplyCallback;
use super::state::SessionState;
use crate::error::{Result, RoutewireError};

pub(crate) enum Command {
    Request {
        route: String,
        body: Value,
        callback: ReplyCallback,
    },
    Notify {
        route: String,
        body: Value,
        done: oneshot::Sender<Result<()>>,
    },
    Disconnect,
}

/// Cloneable handle to one session.
///
/// Every call fails with `NotConnected` once the session has ended.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, state: watch::Receiver<SessionState>) -> Self {
        Self { commands, state }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Send a request and wait for the decoded reply.
    ///
    /// # Errors
    ///
    /// Encoding errors, `NotConnected`, `RequestTimeout` if a request timeout
    /// is configured, `ConnectionClosed` if the session ends first.
    pub async fn request<T: Serialize>(&self, route: &str, payload: &T) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.request_with(route, payload, move |result| {
            let _ = tx.send(result);
        })
        .await?;
        rx.await.map_err(|_| RoutewireError::ConnectionClosed)?
    }

    /// Like [`request`](Self::request), deserializing the reply into `R`.
    pub async fn request_as<T: Serialize, R: DeserializeOwned>(
        &self,
        route: &str,
        payload: &T,
    ) -> Result<R> {
        let reply = self.request(route, payload).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Send a request; `callback` runs on the session task with the reply.
    ///
    /// The callback is invoked at most once. It is dropped uninvoked if the
    /// session ends before a reply arrives.
    pub async fn request_with<T, F>(&self, route: &str, payload: &T, callback: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        check_route(route)?;
        let body = serde_json::to_value(payload)?;
        self.send(Command::Request {
            route: route.to_string(),
            body,
            callback: Box::new(callback),
        })
        .await
    }

    /// Fire-and-forget message (id 0, no reply).
    pub async fn notify<T: Serialize>(&self, route: &str, payload: &T) -> Result<()> {
        check_route(route)?;
        let body = serde_json::to_value(payload)?;
        let (done, rx) = oneshot::channel();
        self.send(Command::Notify {
            route: route.to_string(),
            body,
            done,
        })
        .await?;
        rx.await.map_err(|_| RoutewireError::ConnectionClosed)?
    }

    pub(crate) async fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect).await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RoutewireError::NotConnected)
    }
}

fn check_route(route: &str) -> Result<()> {
    if route.is_empty() {
        return Err(RoutewireError::Protocol("Route must not be empty".to_string()));
    }
    Ok(())
}
