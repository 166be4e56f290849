//! Request correlation table.
//!
//! Maps the id of every outstanding request to its route and reply callback.
//! An entry leaves the table exactly once: through [`PendingRequests::take`]
//! when its reply arrives, through [`PendingRequests::expire`] when its
//! deadline passes, or through [`PendingRequests::clear`] at teardown (the
//! callback is dropped uninvoked).

use std::collections::HashMap;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::Result;

/// Invoked at most once with the decoded reply.
pub type ReplyCallback = Box<dyn FnOnce(Result<Value>) + Send + 'static>;

/// One outstanding request.
pub struct PendingRequest {
    /// Route the request was sent on; the reply is decoded against it.
    pub route: String,
    pub deadline: Option<Instant>,
    callback: ReplyCallback,
}

impl PendingRequest {
    pub fn new(route: String, deadline: Option<Instant>, callback: ReplyCallback) -> Self {
        Self {
            route,
            deadline,
            callback,
        }
    }

    /// Consume the entry, delivering `result` to the caller.
    pub fn complete(self, result: Result<Value>) {
        (self.callback)(result);
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("route", &self.route)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Outstanding requests of one connection.
#[derive(Debug)]
pub struct PendingRequests {
    next_id: u32,
    entries: HashMap<u32, PendingRequest>,
}

impl PendingRequests {
    /// Ids start at 1; 0 means "no reply expected".
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Allocate the next request id.
    ///
    /// Wraps past `u32::MAX` back to 1, skipping 0 and ids still pending.
    pub fn next_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = match self.next_id.wrapping_add(1) {
                0 => 1,
                n => n,
            };
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, id: u32, request: PendingRequest) {
        self.entries.insert(id, request);
    }

    /// Remove the entry for a reply id.
    pub fn take(&mut self, id: u32) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Remove every entry whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<(u32, PendingRequest)> {
        let expired: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, req)| req.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|req| (id, req)))
            .collect()
    }

    /// Earliest deadline among pending entries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().filter_map(|req| req.deadline).min()
    }

    /// Drop every entry without invoking callbacks.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
