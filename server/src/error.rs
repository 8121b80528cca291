use thiserror::Error;

use wirecast_shared::transport::TransportError;

/// Errors raised by server start/stop. Start failures release every
/// resource allocated up to that point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("E01: server is already started")]
    AlreadyStarted,

    #[error("E02: max_players must be greater than zero")]
    ZeroMaxPlayers,

    #[error("E03: transport driver count {count} out of range [1, {max}]")]
    DriverCountOutOfRange { count: usize, max: usize },

    #[error("E04: no transport drivers could be bound")]
    NoDriversBound,

    #[error("E05: server is not started")]
    NotStarted,

    #[error("E06: transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ServerError {
    /// Stable numeric code for log triage.
    pub fn code(&self) -> u8 {
        match self {
            ServerError::AlreadyStarted => 1,
            ServerError::ZeroMaxPlayers => 2,
            ServerError::DriverCountOutOfRange { .. } => 3,
            ServerError::NoDriversBound => 4,
            ServerError::NotStarted => 5,
            ServerError::Transport(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_messages() {
        assert_eq!(ServerError::AlreadyStarted.code(), 1);
        assert!(ServerError::AlreadyStarted.to_string().starts_with("E01"));
        let error = ServerError::DriverCountOutOfRange { count: 9, max: 4 };
        assert_eq!(error.code(), 3);
        assert!(error.to_string().contains("9"));
    }
}
