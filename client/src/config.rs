use wirecast_shared::{ConnectionConfig, MessageSide};

/// Contains Config properties which will be used by the Client
#[derive(Clone)]
pub struct ClientConfig {
    /// Port to connect to; `None` uses the driver's default.
    pub port: Option<u16>,
    /// true dials over IPv4 loopback conventions, false IPv6.
    pub use_ipv4: bool,
    /// Dispatcher side used by the handler registration filter.
    pub side: MessageSide,
    /// Connection liveness settings.
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: None,
            use_ipv4: true,
            side: MessageSide::CLIENT,
            connection: ConnectionConfig::default(),
        }
    }
}
