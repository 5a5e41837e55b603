/// Tuning knobs for the engine.

use std::time::Duration;

/// Options for an [`crate::Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of this host instance, sent in the hello notification.
    pub host_name: String,
    /// Upper bound on a single wait in the idle loop and in outgoing request waits.
    pub poll_interval: Duration,
    /// Idle time after which a keep-alive ping is sent.
    pub keepalive_interval: Duration,
    /// Time after a ping without inbound traffic after which the client is
    /// considered gone.
    pub keepalive_timeout: Duration,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            host_name: "evalhost".to_string(),
            poll_interval: Duration::from_millis(50),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(60),
        }
    }

    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = name.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive_interval = interval;
        self.keepalive_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
