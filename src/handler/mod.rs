//! Handler module - push dispatch.
//!
//! Provides:
//! - [`PushRegistry`] - maps push routes to handlers
//! - [`PushContext`] - lets handlers reply on the session a push came from
//!
//! Pushes on routes with no handler are delivered as
//! [`ClientEvent::Push`](crate::ClientEvent::Push) instead.

mod context;
mod registry;

pub use context::PushContext;
pub use registry::{BoxFuture, HandlerResult, PushHandler, PushRegistry, TypedHandler};
