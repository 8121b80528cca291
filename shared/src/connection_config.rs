use std::time::Duration;

/// Settings governing an individual connection's liveness.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// A connection that stays silent this long is dropped.
    pub disconnection_timeout: Duration,
    /// How often an otherwise idle connection is sent a keepalive.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            disconnection_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(3),
        }
    }
}
