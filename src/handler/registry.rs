//! Push handler registry.
//!
//! Maps push routes to typed async handlers. The decoded push body is
//! deserialized into the handler's argument type before the call.
//!
//! # Example
//!
//! ```
//! use routewire_client::handler::PushRegistry;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Chat {
//!     from: String,
//!     text: String,
//! }
//!
//! let mut registry = PushRegistry::new();
//! registry.register("onChat", |chat: Chat, _ctx| async move {
//!     println!("{}: {}", chat.from, chat.text);
//!     Ok(())
//! });
//! assert!(registry.contains("onChat"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::PushContext;
use crate::error::{Result, RoutewireError};

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for push handlers.
pub trait PushHandler: Send + Sync + 'static {
    /// Handle a push with its decoded body.
    fn call(&self, body: Value, ctx: PushContext) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that deserializes the body before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, PushContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, PushContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> PushHandler for TypedHandler<F, T, Fut>
where
    F: Fn(T, PushContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, body: Value, ctx: PushContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match serde_json::from_value(body) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        Box::pin((self.handler)(parsed, ctx))
    }
}

/// Registry mapping push routes to handlers.
#[derive(Default)]
pub struct PushRegistry {
    handlers: HashMap<String, Box<dyn PushHandler>>,
}

impl PushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a push route, replacing any previous one.
    pub fn register<F, T, Fut>(&mut self, route: &str, handler: F)
    where
        F: Fn(T, PushContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers
            .insert(route.to_string(), Box::new(TypedHandler::new(handler)));
    }

    pub fn contains(&self, route: &str) -> bool {
        self.handlers.contains_key(route)
    }

    /// Registered routes, in no particular order.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler registered for `ctx.route()`.
    pub async fn dispatch(&self, body: Value, ctx: PushContext) -> Result<()> {
        let handler = self.handlers.get(ctx.route()).ok_or_else(|| {
            RoutewireError::Protocol(format!("No handler for push route {}", ctx.route()))
        })?;

        handler.call(body, ctx).await
    }
}
