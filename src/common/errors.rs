use thiserror::Error;

/// Failure taxonomy shared by every subsystem.
///
/// None of these are fatal once the show is running: protocol errors drop a
/// message, timeouts resolve to an empty result, connection errors feed the
/// reconnect loop and validation errors reject input before any mutation.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Malformed inbound message. Logged and dropped; the connection stays up.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No reply within the request deadline.
    #[error("request {request_type} timed out after {timeout_ms}ms")]
    Timeout {
        request_type: String,
        timeout_ms: u64,
    },

    /// Socket closed, errored, or a send attempted while disconnected.
    #[error("connection error: {0}")]
    Connection(String),

    /// Externally supplied data has the wrong shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ControlError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
