use wirecast_shared::{ConnectionConfig, MessageSide};

/// Contains Config properties which will be used by the Server
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind; `None` uses each driver's default (7777 for UDP,
    /// 7778 for websocket).
    pub port: Option<u16>,
    /// true binds IPv4, false IPv6.
    pub use_ipv4: bool,
    /// Hard cap on concurrent connections; must be greater than zero.
    pub max_players: usize,
    /// Abort start when any driver fails to bind; otherwise start with
    /// whichever drivers bound successfully.
    pub stop_on_bind_failure: bool,
    /// Dispatcher side used by the handler registration filter.
    pub side: MessageSide,
    /// Per-connection liveness settings.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            use_ipv4: true,
            max_players: 16,
            stop_on_bind_failure: false,
            side: MessageSide::SERVER,
            connection: ConnectionConfig::default(),
        }
    }
}
