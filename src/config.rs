//! Debug endpoint configuration.

use std::time::Duration;

/// Reconnect policy for the debug transport.
///
/// Delays grow exponentially from `base_delay` up to `max_delay`; after
/// `max_attempts` failed attempts the transport stays disconnected for the
/// rest of the instance's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given zero-based attempt, without jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(24) as i32);
        self.base_delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Configuration of the debug session layer.
///
/// Disabled by default: a production build never dials out unless the
/// endpoint is explicitly enabled.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Whether the runtime connects to a debug server at all.
    pub enabled: bool,
    /// Debug server host.
    pub host: String,
    /// Debug server port.
    pub port: u16,
    /// Pretty-print frames in diagnostic logs. Never affects the wire.
    pub pretty_print: bool,
    /// Timeout applied to the connection handshake only; steady-state
    /// operation has no timeouts.
    pub handshake_timeout: Duration,
    /// Capacity of the per-session snapshot send queue; on overflow the
    /// oldest pending snapshot is dropped.
    pub snapshot_queue_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8080,
            pretty_print: false,
            handshake_timeout: Duration::from_secs(3),
            snapshot_queue_capacity: 32,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl DebugConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_snapshot_queue_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_queue_capacity = capacity;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// WebSocket URL of the configured endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }
}
