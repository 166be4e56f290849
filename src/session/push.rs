//! Per-route push delivery.
//!
//! Each route with a registered handler gets one worker task fed by an
//! unbounded FIFO queue, so pushes on a route reach their handler one at a
//! time and in arrival order. Workers of different routes run concurrently,
//! bounded by the shared handler semaphore; a worker waits for a permit
//! rather than dropping the push.
//!
//! Handler failures (including a body that does not deserialize into the
//! handler's type) are reported as [`ClientEvent::Error`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::command::{Command, SessionHandle};
use super::SessionShared;
use crate::event::ClientEvent;
use crate::handler::PushContext;

pub(crate) struct PushQueues {
    shared: Arc<SessionShared>,
    commands: mpsc::WeakSender<Command>,
    queues: HashMap<String, mpsc::UnboundedSender<Value>>,
}

impl PushQueues {
    pub fn new(shared: Arc<SessionShared>, commands: mpsc::WeakSender<Command>) -> Self {
        Self {
            shared,
            commands,
            queues: HashMap::new(),
        }
    }

    /// Queue `body` for the handler of `route`.
    pub fn push(&mut self, route: String, body: Value) {
        let body = match self.queues.get(&route) {
            Some(queue) => match queue.send(body) {
                Ok(()) => return,
                // Worker is gone; start a fresh one below
                Err(mpsc::error::SendError(body)) => body,
            },
            None => body,
        };

        let queue = self.spawn_worker(route.clone());
        if queue.send(body).is_err() {
            warn!(%route, "Push worker exited before delivery");
            return;
        }
        self.queues.insert(route, queue);
    }

    fn spawn_worker(&self, route: String) -> mpsc::UnboundedSender<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(%route, "Starting push worker");
        tokio::spawn(run_worker(
            route,
            rx,
            self.shared.clone(),
            self.commands.clone(),
        ));
        tx
    }
}

async fn run_worker(
    route: String,
    mut queue: mpsc::UnboundedReceiver<Value>,
    shared: Arc<SessionShared>,
    commands: mpsc::WeakSender<Command>,
) {
    while let Some(body) = queue.recv().await {
        let Ok(permit) = shared.handler_permits.clone().acquire_owned().await else {
            error!(%route, "Handler semaphore closed");
            return;
        };

        let ctx = match commands.upgrade() {
            Some(commands) => {
                let handle = SessionHandle::new(commands, shared.state.subscribe());
                PushContext::with_session(route.clone(), handle)
            }
            None => PushContext::new(route.clone()),
        };

        // Own task so a panicking handler does not take the queue with it
        let call = {
            let shared = shared.clone();
            tokio::spawn(async move {
                let _permit = permit;
                shared.pushes.dispatch(body, ctx).await
            })
        };

        match call.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%route, "Push handler error: {}", e);
                shared.emit(ClientEvent::Error(e));
            }
            Err(e) => error!(%route, "Push handler panicked: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::RoutewireError;
    use crate::handler::PushRegistry;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::Semaphore;

    fn shared(
        pushes: PushRegistry,
        max_concurrent_handlers: usize,
    ) -> (Arc<SessionShared>, mpsc::UnboundedReceiver<ClientEvent>) {
        let config = ClientConfig {
            max_concurrent_handlers,
            ..ClientConfig::default()
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Arc::new(SessionShared::new(config, pushes, events_tx)), events_rx)
    }

    fn detached() -> mpsc::WeakSender<Command> {
        let (tx, _rx) = mpsc::channel(1);
        tx.downgrade()
    }

    #[tokio::test]
    async fn test_route_order_with_single_permit() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));

        let mut pushes = PushRegistry::new();
        let handler_gate = gate.clone();
        pushes.register("onTick", move |n: u32, _ctx| {
            let seen_tx = seen_tx.clone();
            let gate = handler_gate.clone();
            async move {
                seen_tx.send(n).unwrap();
                gate.acquire().await.unwrap().forget();
                Ok(())
            }
        });
        let (shared, _events) = shared(pushes, 1);
        let mut queues = PushQueues::new(shared, detached());

        for n in 0..3 {
            queues.push("onTick".to_string(), json!(n));
        }

        assert_eq!(seen_rx.recv().await, Some(0));
        tokio::task::yield_now().await;
        assert!(seen_rx.try_recv().is_err());

        gate.add_permits(3);
        assert_eq!(seen_rx.recv().await, Some(1));
        assert_eq!(seen_rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_handler_error_is_an_event() {
        #[derive(Deserialize)]
        struct Move {
            #[allow(dead_code)]
            x: i32,
        }

        let mut pushes = PushRegistry::new();
        pushes.register("onMove", |_: Move, _ctx| async { Ok(()) });
        let (shared, mut events) = shared(pushes, 4);
        let mut queues = PushQueues::new(shared, detached());

        queues.push("onMove".to_string(), json!({ "x": "left" }));

        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Error(RoutewireError::Json(_)))
        ));
    }

    #[tokio::test]
    async fn test_detached_context_after_session_end() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let mut pushes = PushRegistry::new();
        pushes.register("onChat", move |_: Value, ctx: PushContext| {
            let seen_tx = seen_tx.clone();
            async move {
                let result = ctx.notify("chat.ack", &1).await;
                seen_tx.send(matches!(result, Err(RoutewireError::NotConnected))).unwrap();
                Ok(())
            }
        });
        let (shared, _events) = shared(pushes, 4);
        let mut queues = PushQueues::new(shared, detached());

        queues.push("onChat".to_string(), json!({}));
        assert_eq!(seen_rx.recv().await, Some(true));
    }
}
