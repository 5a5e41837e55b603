//! Idle keep-alive against the client.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// What the keep-alive driver should do now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    Idle,
    SendPing,
    /// A ping went unanswered for the whole timeout.
    Expired,
}

#[derive(Debug)]
struct State {
    last_activity: Instant,
    ping_sent: Option<Instant>,
}

/// Tracks inbound traffic and decides when to ping and when to give up.
#[derive(Debug)]
pub struct KeepAlive {
    interval: Duration,
    timeout: Duration,
    state: Mutex<State>,
}

impl KeepAlive {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            state: Mutex::new(State {
                last_activity: Instant::now(),
                ping_sent: None,
            }),
        }
    }

    /// Record inbound traffic. Answers any outstanding ping.
    pub fn record_activity(&self) {
        self.record_activity_at(Instant::now());
    }

    pub fn record_activity_at(&self, now: Instant) {
        let mut state = self.state.lock();
        state.last_activity = now;
        state.ping_sent = None;
    }

    pub fn poll(&self) -> KeepAliveAction {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&self, now: Instant) -> KeepAliveAction {
        let mut state = self.state.lock();
        match state.ping_sent {
            Some(sent) if now.saturating_duration_since(sent) >= self.timeout => KeepAliveAction::Expired,
            Some(_) => KeepAliveAction::Idle,
            None if now.saturating_duration_since(state.last_activity) >= self.interval => {
                state.ping_sent = Some(now);
                KeepAliveAction::SendPing
            }
            None => KeepAliveAction::Idle,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_ping_after_idle_interval() {
        let start = Instant::now();
        let keepalive = KeepAlive::new(10 * SECOND, 5 * SECOND);
        keepalive.record_activity_at(start);

        assert_eq!(keepalive.poll_at(start + 9 * SECOND), KeepAliveAction::Idle);
        assert_eq!(keepalive.poll_at(start + 10 * SECOND), KeepAliveAction::SendPing);
        // Only one ping per idle period.
        assert_eq!(keepalive.poll_at(start + 11 * SECOND), KeepAliveAction::Idle);
    }

    #[test]
    fn test_expires_without_pong() {
        let start = Instant::now();
        let keepalive = KeepAlive::new(10 * SECOND, 5 * SECOND);
        keepalive.record_activity_at(start);

        assert_eq!(keepalive.poll_at(start + 10 * SECOND), KeepAliveAction::SendPing);
        assert_eq!(keepalive.poll_at(start + 14 * SECOND), KeepAliveAction::Idle);
        assert_eq!(keepalive.poll_at(start + 15 * SECOND), KeepAliveAction::Expired);
    }

    #[test]
    fn test_pong_resets() {
        let start = Instant::now();
        let keepalive = KeepAlive::new(10 * SECOND, 5 * SECOND);
        keepalive.record_activity_at(start);

        assert_eq!(keepalive.poll_at(start + 10 * SECOND), KeepAliveAction::SendPing);
        keepalive.record_activity_at(start + 12 * SECOND);
        assert_eq!(keepalive.poll_at(start + 16 * SECOND), KeepAliveAction::Idle);
        assert_eq!(keepalive.poll_at(start + 22 * SECOND), KeepAliveAction::SendPing);
    }
}
