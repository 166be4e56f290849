//! Session state machine.
//!
//! One [`Session`] owns one connection: its writer, route dictionary, schema
//! registry, pending requests and heartbeat monitor. It is driven by a
//! single task (see `driver`) that feeds it inbound packets, commands and
//! timer wakeups one at a time, so none of its state is shared or locked.
//!
//! Inbound packets are gated by state: HANDSHAKE is handled only while
//! awaiting the handshake answer; HEARTBEAT, DATA and KICK only once
//! connected. Anything else is ignored. A handshake that fails without being
//! acknowledged stops the session.

mod command;
mod dictionary;
mod driver;
mod heartbeat;
mod pending;
mod push;
mod state;

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub use command::SessionHandle;
pub use dictionary::RouteDictionary;
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use pending::{PendingRequest, PendingRequests, ReplyCallback};
pub use state::SessionState;

pub(crate) use command::Command;
pub(crate) use driver::{spawn_session, SessionParts};

use crate::codec::{JsonCodec, SchemaRegistry};
use crate::config::{ClientConfig, HandshakeFailurePolicy};
use crate::error::{HandshakeError, Result, RoutewireError};
use crate::event::{ClientEvent, DisconnectReason, EventSender};
use crate::handler::PushRegistry;
use crate::protocol::{
    ClientInfo, HandshakeRequest, HandshakeResponse, Message, Packet, PacketType, Route,
};
use crate::writer::{OutboundPacket, WriterHandle};

use self::push::PushQueues;

/// State shared by every session a client opens.
pub(crate) struct SessionShared {
    pub config: ClientConfig,
    pub pushes: PushRegistry,
    pub handler_permits: Arc<Semaphore>,
    pub events: EventSender,
    pub state: watch::Sender<SessionState>,
}

impl SessionShared {
    pub fn new(config: ClientConfig, pushes: PushRegistry, events: EventSender) -> Self {
        let handler_permits = Arc::new(Semaphore::new(config.max_concurrent_handlers));
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            pushes,
            handler_permits,
            events,
            state,
        }
    }

    pub fn emit(&self, event: ClientEvent) {
        // Receiver dropped means nobody is listening
        let _ = self.events.send(event);
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }
}

/// Outcome of handling one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop(DisconnectReason),
}

pub(crate) struct Session {
    shared: Arc<SessionShared>,
    state: SessionState,
    writer: WriterHandle,
    ready: Option<oneshot::Sender<Result<()>>>,
    dictionary: RouteDictionary,
    schemas: SchemaRegistry,
    pending: PendingRequests,
    heartbeat: Option<HeartbeatMonitor>,
    push_queues: PushQueues,
}

impl Session {
    pub fn new(
        shared: Arc<SessionShared>,
        writer: WriterHandle,
        commands: mpsc::WeakSender<Command>,
        ready: oneshot::Sender<Result<()>>,
    ) -> Self {
        Self {
            push_queues: PushQueues::new(shared.clone(), commands),
            shared,
            state: SessionState::Connecting,
            writer,
            ready: Some(ready),
            dictionary: RouteDictionary::new(),
            schemas: SchemaRegistry::empty(),
            pending: PendingRequests::new(),
            heartbeat: None,
        }
    }

    /// Transport is open: send the handshake.
    pub fn start(&mut self) -> Flow {
        let config = &self.shared.config;
        let request = HandshakeRequest {
            sys: ClientInfo {
                client_type: config.client_type.clone(),
                version: config.client_version.clone(),
                proto_version: config.proto_version,
            },
            user: config.user.clone(),
        };

        match request.to_body() {
            Ok(body) => {
                self.send(Packet::new(PacketType::Handshake, body));
                self.set_state(SessionState::AwaitingHandshakeAck);
                debug!("Handshake sent");
                Flow::Continue
            }
            Err(e) => {
                error!("Failed to encode handshake: {}", e);
                self.resolve_ready(Err(e));
                Flow::Stop(DisconnectReason::Local)
            }
        }
    }

    pub fn handle_packets(&mut self, packets: Vec<Packet>, now: Instant) -> Flow {
        for packet in packets {
            if let Flow::Stop(reason) = self.handle_packet(packet, now) {
                return Flow::Stop(reason);
            }
        }
        Flow::Continue
    }

    pub fn handle_packet(&mut self, packet: Packet, now: Instant) -> Flow {
        match (self.state, packet.packet_type) {
            (SessionState::AwaitingHandshakeAck, PacketType::Handshake) => {
                return self.on_handshake(&packet.body, now);
            }
            (SessionState::Connected, PacketType::Heartbeat) => {
                if let Some(heartbeat) = self.heartbeat.as_mut() {
                    heartbeat.on_heartbeat(now);
                }
            }
            (SessionState::Connected, PacketType::Data) => self.on_data(packet.body),
            (SessionState::Connected, PacketType::Kick) => self.on_kick(&packet.body),
            (state, packet_type) => {
                debug!(?state, ?packet_type, "Ignoring packet");
            }
        }
        Flow::Continue
    }

    pub fn handle_command(&mut self, command: Command, now: Instant) -> Flow {
        match command {
            Command::Request {
                route,
                body,
                callback,
            } => {
                self.request(route, body, callback, now);
                Flow::Continue
            }
            Command::Notify { route, body, done } => {
                let _ = done.send(self.notify(&route, &body));
                Flow::Continue
            }
            Command::Disconnect => Flow::Stop(DisconnectReason::Local),
        }
    }

    /// Run whatever deadlines are due at `now`.
    pub fn on_timer(&mut self, now: Instant) -> Flow {
        for (id, request) in self.pending.expire(now) {
            debug!(id, route = %request.route, "Request timed out");
            request.complete(Err(RoutewireError::RequestTimeout));
        }

        match self.heartbeat.as_mut().and_then(|h| h.poll(now)) {
            Some(HeartbeatAction::Send) => {
                self.send(Packet::empty(PacketType::Heartbeat));
                Flow::Continue
            }
            Some(HeartbeatAction::TimedOut) => {
                warn!("Heartbeat timed out");
                self.shared.emit(ClientEvent::HeartbeatTimeout);
                Flow::Stop(DisconnectReason::HeartbeatTimeout)
            }
            None => Flow::Continue,
        }
    }

    /// Earliest instant at which [`on_timer`](Self::on_timer) has work.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let heartbeat = self.heartbeat.as_ref().and_then(HeartbeatMonitor::next_wakeup);
        match (heartbeat, self.pending.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Surface an error without ending the session.
    pub fn report(&self, event: ClientEvent) {
        self.shared.emit(event);
    }

    /// Cancel timers and drop pending requests. Consumes the session so the
    /// writer channel closes; the caller then waits for the writer to drain.
    pub fn close(mut self) -> Arc<SessionShared> {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.cancel();
        }
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!(dropped, "Dropping pending requests");
        }
        self.resolve_ready(Err(RoutewireError::ConnectionClosed));
        self.set_state(SessionState::Disconnected);
        self.shared
    }

    fn on_handshake(&mut self, body: &[u8], now: Instant) -> Flow {
        let response = match HandshakeResponse::parse(body) {
            Ok(response) => response,
            Err(e) => return self.fail_handshake(e),
        };

        if let Err(e) = response.check() {
            let acknowledge = matches!(e, HandshakeError::Rejected(_))
                && self.shared.config.handshake_failure_policy == HandshakeFailurePolicy::Acknowledge;
            if !acknowledge {
                return self.fail_handshake(e);
            }
            warn!("Handshake failed with status {}, continuing", response.code);
            self.shared.emit(ClientEvent::Error(e.into()));
        }

        let schemas = match &response.sys.protos {
            Some(protos) => {
                match SchemaRegistry::from_protos(protos.proto_version, &protos.client, &protos.server) {
                    Ok(schemas) => schemas,
                    Err(e) => {
                        return self.fail_handshake(HandshakeError::InvalidResponse(e.to_string()))
                    }
                }
            }
            None => SchemaRegistry::empty(),
        };
        let dictionary = response
            .sys
            .dict
            .as_ref()
            .map(RouteDictionary::from_table)
            .unwrap_or_default();

        self.schemas = schemas;
        self.dictionary = dictionary;
        self.heartbeat = response.heartbeat_interval().map(|interval| {
            let mut monitor = HeartbeatMonitor::new(interval, self.shared.config.heartbeat_grace);
            monitor.on_heartbeat(now);
            monitor
        });

        self.send(Packet::empty(PacketType::HandshakeAck));
        self.set_state(SessionState::Connected);
        debug!(
            routes = self.dictionary.len(),
            proto_version = self.schemas.version(),
            heartbeat = ?self.heartbeat.as_ref().map(HeartbeatMonitor::interval),
            "Handshake complete"
        );
        self.resolve_ready(Ok(()));
        Flow::Continue
    }

    fn fail_handshake(&mut self, e: HandshakeError) -> Flow {
        error!("Handshake failed: {}", e);
        self.shared.emit(ClientEvent::Error(e.clone().into()));
        self.resolve_ready(Err(e.into()));
        Flow::Stop(DisconnectReason::Protocol)
    }

    fn on_data(&mut self, body: Bytes) {
        let message = match Message::decode(&body) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                self.shared.emit(ClientEvent::Error(e));
                return;
            }
        };

        let route = match message.route {
            Some(Route::Code(code)) => match self.dictionary.route(code) {
                Some(route) => Some(route.to_string()),
                None => {
                    warn!(code, "No dictionary entry for route code, dropping message");
                    return;
                }
            },
            Some(Route::Name(name)) => Some(name),
            None => None,
        };

        if message.id != 0 {
            let Some(request) = self.pending.take(message.id) else {
                debug!(id = message.id, "Reply for unknown request");
                return;
            };
            let result = self.schemas.decode_body(&request.route, &message.body);
            request.complete(result);
            return;
        }

        let Some(route) = route else {
            warn!(message_type = ?message.message_type, "Message with neither id nor route");
            return;
        };
        match self.schemas.decode_body(&route, &message.body) {
            Ok(body) => self.dispatch_push(route, body),
            Err(e) => {
                warn!(%route, "Failed to decode push: {}", e);
                self.shared.emit(ClientEvent::Error(e));
            }
        }
    }

    fn dispatch_push(&mut self, route: String, body: Value) {
        if self.shared.pushes.contains(&route) {
            self.push_queues.push(route, body);
        } else {
            self.shared.emit(ClientEvent::Push { route, body });
        }
    }

    fn on_kick(&self, body: &[u8]) {
        let reason = JsonCodec::decode_body(body).unwrap_or_else(|e| {
            warn!("Undecodable kick body: {}", e);
            Value::Null
        });
        warn!(?reason, "Kicked by peer");
        self.shared.emit(ClientEvent::Kick(reason));
    }

    fn request(&mut self, route: String, body: Value, callback: ReplyCallback, now: Instant) {
        if !self.state.is_connected() {
            callback(Err(RoutewireError::NotConnected));
            return;
        }

        let id = self.pending.next_id();
        let packet = match self.encode(id, &route, &body) {
            Ok(packet) => packet,
            Err(e) => return callback(Err(e)),
        };

        let deadline = self.shared.config.request_timeout.map(|t| now + t);
        self.pending
            .insert(id, PendingRequest::new(route, deadline, callback));

        if let Err(e) = self.try_send(packet) {
            if let Some(request) = self.pending.take(id) {
                request.complete(Err(e));
            }
        }
    }

    fn notify(&mut self, route: &str, body: &Value) -> Result<()> {
        if !self.state.is_connected() {
            return Err(RoutewireError::NotConnected);
        }
        let packet = self.encode(0, route, body)?;
        self.try_send(packet)
    }

    /// Encode the body, compress the route, wrap as message then packet.
    fn encode(&self, id: u32, route: &str, body: &Value) -> Result<Packet> {
        let payload = self.schemas.encode_body(route, body)?;
        let wire_route = match self.dictionary.code(route) {
            Some(code) => Route::Code(code),
            None => Route::Name(route.to_string()),
        };
        let message = if id == 0 {
            Message::notify(wire_route, payload)
        } else {
            Message::request(id, wire_route, payload)
        };
        Ok(Packet::new(PacketType::Data, message.encode()?))
    }

    /// Queue a packet; failures become `IoError` events.
    fn send(&self, packet: Packet) {
        let _ = self.try_send(packet);
    }

    fn try_send(&self, packet: Packet) -> Result<()> {
        let result = OutboundPacket::new(packet).and_then(|p| self.writer.try_send(p));
        if let Err(e) = &result {
            warn!("Failed to queue packet: {}", e);
            self.shared.emit(ClientEvent::IoError(e.to_string()));
        }
        result
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.shared.set_state(state);
    }

    fn resolve_ready(&mut self, result: Result<()>) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(result);
        }
    }
}
