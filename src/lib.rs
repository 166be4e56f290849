//! # routewire-client
//!
//! Client for route-based RPC over a persistent duplex connection.
//!
//! A client opens one session at a time. Each session handshakes with the
//! server, receives a route dictionary and optional message schemas, then
//! carries requests (correlated by id), notifications and server pushes
//! while a heartbeat watchdog keeps it honest.
//!
//! ## Layers
//!
//! - **Packets**: 1-byte type + 3-byte big-endian length ([`protocol`])
//! - **Messages**: flag byte, varint id, compressed or literal route ([`protocol`])
//! - **Payloads**: schema-driven binary codec with JSON fallback ([`codec`])
//! - **Session**: state machine, correlation table, heartbeat ([`session`])
//!
//! ## Example
//!
//! ```ignore
//! use routewire_client::{ClientBuilder, ConnectParams};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> routewire_client::Result<()> {
//!     let (client, _events) = ClientBuilder::new()
//!         .on_push("onChat", |msg: Value, _ctx| async move {
//!             println!("{msg}");
//!             Ok(())
//!         })
//!         .build();
//!
//!     client.init(ConnectParams::new("127.0.0.1", 3010)).await?;
//!     let reply = client.request("chat.chatHandler.send", &json!({ "text": "hi" })).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod transport;

mod client;
mod writer;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ConnectParams, HandshakeFailurePolicy};
pub use error::{CodecError, HandshakeError, Result, RoutewireError};
pub use event::{ClientEvent, DisconnectReason, EventReceiver};
pub use handler::PushContext;
pub use session::{SessionHandle, SessionState};
pub use writer::WriterConfig;
