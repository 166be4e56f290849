//! Client builder and session lifecycle.
//!
//! The [`ClientBuilder`] provides a fluent API for configuration and push
//! handlers. The [`Client`] owns at most one session at a time:
//! 1. `init` tears down any previous session (timers, writer, transport)
//! 2. Opens the transport and spawns a new session task
//! 3. Resolves once the handshake is acknowledged
//!
//! # Example
//!
//! ```ignore
//! use routewire_client::{ClientBuilder, ClientEvent, ConnectParams};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, mut events) = ClientBuilder::new()
//!         .user(json!({ "token": "secret" }))
//!         .on_push("onChat", |msg: Value, _ctx| async move {
//!             println!("chat: {msg}");
//!             Ok(())
//!         })
//!         .build();
//!
//!     client.init(ConnectParams::new("127.0.0.1", 3010)).await?;
//!     let reply = client.request("connector.entryHandler.enter", &json!({ "uid": 7 })).await?;
//!     println!("{reply}");
//!
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Disconnect(reason) = event {
//!             println!("disconnected: {reason:?}");
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::{ClientConfig, ConnectParams, HandshakeFailurePolicy};
use crate::error::{HandshakeError, Result, RoutewireError};
use crate::event::EventReceiver;
use crate::handler::{HandlerResult, PushContext, PushRegistry};
use crate::session::{spawn_session, SessionHandle, SessionParts, SessionShared, SessionState};
use crate::transport::{Connector, TcpConnector};

/// Builder for configuring and creating a client.
pub struct ClientBuilder {
    config: ClientConfig,
    pushes: PushRegistry,
    connector: Arc<dyn Connector>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            pushes: PushRegistry::new(),
            connector: Arc::new(TcpConnector),
        }
    }

    /// Start from an explicit configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    /// Register a push handler for a route.
    ///
    /// Pushes on routes without a handler arrive as
    /// [`ClientEvent::Push`](crate::ClientEvent::Push).
    pub fn on_push<F, T, Fut>(mut self, route: &str, handler: F) -> Self
    where
        F: Fn(T, PushContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.pushes.register(route, handler);
        self
    }

    /// `user` object sent in the handshake.
    pub fn user(mut self, user: Value) -> Self {
        self.config.user = user;
        self
    }

    /// Client type and version announced in the handshake.
    pub fn client_info(mut self, client_type: &str, version: &str) -> Self {
        self.config.client_type = Some(client_type.to_string());
        self.config.client_version = Some(version.to_string());
        self
    }

    /// Schema version already held by the client.
    ///
    /// Default: 0
    pub fn proto_version(mut self, version: u64) -> Self {
        self.config.proto_version = version;
        self
    }

    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Default: [`HandshakeFailurePolicy::Acknowledge`]
    pub fn handshake_failure_policy(mut self, policy: HandshakeFailurePolicy) -> Self {
        self.config.handshake_failure_policy = policy;
        self
    }

    /// Extra time allowed past the heartbeat timeout window.
    ///
    /// Default: 500 ms
    pub fn heartbeat_grace(mut self, grace: Duration) -> Self {
        self.config.heartbeat_grace = grace;
        self
    }

    /// Fail requests whose reply does not arrive in time.
    ///
    /// Default: none
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Time a local disconnect waits for queued packets to flush before the
    /// transport is dropped.
    ///
    /// Default: 1 second
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrently running push handlers.
    ///
    /// Pushes on one route always run one at a time, in arrival order; further
    /// pushes wait for a free slot.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Queued outbound packets before sends fail.
    ///
    /// Default: 1024
    pub fn max_pending_packets(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_packets = limit;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Largest inbound packet body accepted.
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Default: 16 KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Capacity of the channel carrying requests into the session.
    ///
    /// Default: 256
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.config.command_capacity = capacity;
        self
    }

    /// Replace the transport connector used by [`Client::init`].
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Build the client and its event stream.
    pub fn build(self) -> (Client, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared::new(self.config, self.pushes, events_tx));

        let client = Client {
            inner: Arc::new(ClientInner {
                shared,
                connector: self.connector,
                active: Mutex::new(None),
            }),
        };
        (client, events_rx)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ActiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

struct ClientInner {
    shared: Arc<SessionShared>,
    connector: Arc<dyn Connector>,
    active: Mutex<Option<ActiveSession>>,
}

/// Handle to a client. Cheap to clone; all clones share one session.
///
/// Dropping every clone ends the session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect and handshake, replacing any existing session.
    ///
    /// Resolves once the handshake is acknowledged.
    ///
    /// # Errors
    ///
    /// Transport errors from the connector, `Handshake(OldClient)` on status
    /// 501, `Handshake(Rejected)` under [`HandshakeFailurePolicy::Reject`],
    /// `Handshake(Timeout)` if the peer does not answer in time.
    pub async fn init(&self, params: ConnectParams) -> Result<()> {
        let mut active = self.inner.active.lock().await;
        Self::shutdown(&mut active).await;

        if params.encrypt {
            warn!("Encryption is not implemented, connecting in plaintext");
        }

        self.inner.shared.set_state(SessionState::Connecting);
        let stream = match self.inner.connector.connect(&params).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        self.start(&mut active, stream).await
    }

    /// Like [`init`](Self::init) over an already open stream.
    pub async fn init_with_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut active = self.inner.active.lock().await;
        Self::shutdown(&mut active).await;

        self.inner.shared.set_state(SessionState::Connecting);
        self.start(&mut active, stream).await
    }

    async fn start<S>(&self, active: &mut Option<ActiveSession>, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let SessionParts {
            handle,
            task,
            ready,
        } = spawn_session(stream, self.inner.shared.clone());
        *active = Some(ActiveSession { handle, task });

        let timeout = self.inner.shared.config.handshake_timeout;
        match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RoutewireError::ConnectionClosed),
            Err(_) => {
                warn!(?timeout, "Handshake timed out");
                Self::shutdown(active).await;
                Err(HandshakeError::Timeout.into())
            }
        }
    }

    /// Tear the current session down and wait until it is fully closed.
    pub async fn disconnect(&self) {
        let mut active = self.inner.active.lock().await;
        Self::shutdown(&mut active).await;
    }

    async fn shutdown(active: &mut Option<ActiveSession>) {
        let Some(session) = active.take() else {
            return;
        };
        session.handle.disconnect().await;
        drop(session.handle);
        if let Err(e) = session.task.await {
            error!("Session task failed: {}", e);
        }
        debug!("Previous session torn down");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.shared.state()
    }

    /// Handle to the current session, for use outside the client.
    pub async fn session(&self) -> Result<SessionHandle> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| active.handle.clone())
            .ok_or(RoutewireError::NotConnected)
    }

    /// Send a request and wait for the decoded reply.
    pub async fn request<T: Serialize>(&self, route: &str, payload: &T) -> Result<Value> {
        self.session().await?.request(route, payload).await
    }

    /// Send a request, deserializing the reply into `R`.
    pub async fn request_as<T: Serialize, R: DeserializeOwned>(
        &self,
        route: &str,
        payload: &T,
    ) -> Result<R> {
        self.session().await?.request_as(route, payload).await
    }

    /// Send a request; `callback` receives the reply at most once.
    pub async fn request_with<T, F>(&self, route: &str, payload: &T, callback: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.session()
            .await?
            .request_with(route, payload, callback)
            .await
    }

    /// Fire-and-forget message.
    pub async fn notify<T: Serialize>(&self, route: &str, payload: &T) -> Result<()> {
        self.session().await?.notify(route, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .user(json!({ "token": "t" }))
            .client_info("rust", "1.0")
            .proto_version(3)
            .handshake_timeout(Duration::from_secs(2))
            .handshake_failure_policy(HandshakeFailurePolicy::Reject)
            .heartbeat_grace(Duration::from_millis(100))
            .request_timeout(Duration::from_secs(1))
            .close_timeout(Duration::from_millis(250))
            .max_concurrent_handlers(8)
            .max_pending_packets(16)
            .channel_capacity(32)
            .max_body_size(1024);

        let config = &builder.config;
        assert_eq!(config.user["token"], "t");
        assert_eq!(config.client_type.as_deref(), Some("rust"));
        assert_eq!(config.proto_version, 3);
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
        assert_eq!(config.handshake_failure_policy, HandshakeFailurePolicy::Reject);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.close_timeout, Duration::from_millis(250));
        assert_eq!(config.max_concurrent_handlers, 8);
        assert_eq!(config.writer.max_pending_packets, 16);
        assert_eq!(config.writer.channel_capacity, 32);
        assert_eq!(config.max_body_size, 1024);
    }

    #[test]
    fn test_builder_registers_push_handlers() {
        let builder = Client::builder()
            .on_push("onChat", |_: Value, _ctx| async { Ok(()) })
            .on_push("onKickOut", |_: Value, _ctx| async { Ok(()) });

        assert!(builder.pushes.contains("onChat"));
        assert_eq!(builder.pushes.len(), 2);
    }

    #[tokio::test]
    async fn test_calls_before_init_are_not_connected() {
        let (client, _events) = ClientBuilder::new().build();

        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(matches!(
            client.request("foo.bar", &json!({})).await,
            Err(RoutewireError::NotConnected)
        ));
        assert!(matches!(
            client.notify("foo.bar", &json!({})).await,
            Err(RoutewireError::NotConnected)
        ));
        client.disconnect().await;
    }
}
