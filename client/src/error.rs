use thiserror::Error;

use wirecast_shared::transport::TransportError;

/// Errors raised by client connect/disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("E10: client is already connected")]
    AlreadyConnected,

    #[error("E11: client is not connected")]
    NotConnected,

    #[error("E12: transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Stable numeric code for log triage.
    pub fn code(&self) -> u8 {
        match self {
            ClientError::AlreadyConnected => 10,
            ClientError::NotConnected => 11,
            ClientError::Transport(_) => 12,
        }
    }
}
