//! Heartbeat monitor.
//!
//! Two deadlines, driven by the session loop:
//! - `send_at`: armed when a peer heartbeat arrives and nothing is armed yet;
//!   when reached, the client sends a heartbeat and arms the watchdog.
//! - `watchdog`: cleared by any peer heartbeat; when reached, the connection
//!   is considered dead.
//!
//! The monitor holds no timers itself. The session sleeps until
//! [`HeartbeatMonitor::next_wakeup`] and then calls [`HeartbeatMonitor::poll`].

use std::time::Duration;

use tokio::time::Instant;

/// What the session must do after polling the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a heartbeat packet now.
    Send,
    /// No peer heartbeat within the window.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    /// Negotiated timeout plus grace.
    watchdog_window: Duration,
    send_at: Option<Instant>,
    watchdog: Option<Instant>,
}

impl HeartbeatMonitor {
    /// `interval` is the negotiated heartbeat interval; the timeout window
    /// is twice that, extended by `grace`.
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            interval,
            watchdog_window: interval * 2 + grace,
            send_at: None,
            watchdog: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A heartbeat arrived from the peer (or the session just connected).
    pub fn on_heartbeat(&mut self, now: Instant) {
        self.watchdog = None;
        if self.send_at.is_none() {
            self.send_at = Some(now + self.interval);
        }
    }

    /// Advance to `now`, returning the action that is due, if any.
    pub fn poll(&mut self, now: Instant) -> Option<HeartbeatAction> {
        if self.watchdog.is_some_and(|at| at <= now) {
            self.cancel();
            return Some(HeartbeatAction::TimedOut);
        }
        if self.send_at.is_some_and(|at| at <= now) {
            self.send_at = None;
            self.watchdog = Some(now + self.watchdog_window);
            return Some(HeartbeatAction::Send);
        }
        None
    }

    /// Earliest armed deadline.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match (self.send_at, self.watchdog) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Disarm both deadlines.
    pub fn cancel(&mut self) {
        self.send_at = None;
        self.watchdog = None;
    }

    pub fn is_armed(&self) -> bool {
        self.send_at.is_some() || self.watchdog.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(5);
    const GRACE: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn test_send_then_timeout() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(INTERVAL, GRACE);
        monitor.on_heartbeat(start);

        assert_eq!(monitor.poll(start + Duration::from_secs(4)), None);
        assert_eq!(monitor.next_wakeup(), Some(start + INTERVAL));

        let sent_at = start + INTERVAL;
        assert_eq!(monitor.poll(sent_at), Some(HeartbeatAction::Send));

        let deadline = sent_at + INTERVAL * 2 + GRACE;
        assert_eq!(monitor.next_wakeup(), Some(deadline));
        assert_eq!(monitor.poll(deadline - Duration::from_millis(1)), None);
        assert_eq!(monitor.poll(deadline), Some(HeartbeatAction::TimedOut));
        assert!(!monitor.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_heartbeat_clears_watchdog() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(INTERVAL, GRACE);
        monitor.on_heartbeat(start);
        assert_eq!(monitor.poll(start + INTERVAL), Some(HeartbeatAction::Send));

        let reply = start + INTERVAL + Duration::from_secs(1);
        monitor.on_heartbeat(reply);
        assert_eq!(monitor.next_wakeup(), Some(reply + INTERVAL));
        assert_eq!(monitor.poll(start + INTERVAL * 4), Some(HeartbeatAction::Send));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_heartbeats_coalesce() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(INTERVAL, GRACE);
        monitor.on_heartbeat(start);
        monitor.on_heartbeat(start + Duration::from_secs(2));

        assert_eq!(monitor.next_wakeup(), Some(start + INTERVAL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(INTERVAL, GRACE);
        monitor.on_heartbeat(start);
        monitor.cancel();

        assert_eq!(monitor.next_wakeup(), None);
        assert_eq!(monitor.poll(start + INTERVAL * 10), None);
    }
}
