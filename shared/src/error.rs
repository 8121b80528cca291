use std::fmt;

use thiserror::Error;

/// Errors surfaced when installing a handler. Each failure rejects only
/// the registration at hand; other registrations are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A reflective handler declared a payload parameter with no
    /// deserializer in the codec registry.
    #[error("E20: no deserializer registered for handler parameter type `{type_name}`")]
    MissingDeserializer { type_name: &'static str },

    /// Control keys must fit the low four bits of the key field.
    #[error("E21: control key {key} out of range, must be within [0,15]")]
    ControlKeyOutOfRange { key: u16 },
}

impl RegistrationError {
    pub fn code(&self) -> u8 {
        match self {
            RegistrationError::MissingDeserializer { .. } => 20,
            RegistrationError::ControlKeyOutOfRange { .. } => 21,
        }
    }
}

/// Stable numeric codes attached to warning- and info-level log lines so
/// operators can triage from logs without matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    MalformedFrame = 1,
    UnknownKey = 2,
    UnknownConnection = 3,
    PermissionDenied = 4,
    ControlLengthMismatch = 5,
    HandlerPanicked = 6,
    ConnectionCapExceeded = 7,
    StaleSendHandle = 8,
    ConnectionTimedOut = 9,
    BindFailed = 10,
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{:02}", *self as u8)
    }
}
