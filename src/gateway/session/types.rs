use std::{fmt, sync::Arc};

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::pending::PendingRequests;
use crate::common::errors::ControlError;

/// Observable lifecycle of one integration's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    /// Socket is open and the Hello has been answered with an Identify.
    Authenticating,
    /// Identified; requests are accepted.
    Ready,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
        })
    }
}

/// Everything tied to one socket. Built fresh on every connection attempt
/// and dropped wholesale when that socket goes away.
pub(crate) struct ConnectionState {
    pub tx: UnboundedSender<Message>,
    pub pending: Arc<PendingRequests>,
    pub identified: bool,
}

impl ConnectionState {
    pub fn new(tx: UnboundedSender<Message>) -> Self {
        Self {
            tx,
            pending: Arc::new(PendingRequests::new()),
            identified: false,
        }
    }
}

impl Drop for ConnectionState {
    fn drop(&mut self) {
        self.pending.clear();
    }
}

/// Outcome of a single WS session, telling the outer loop what to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Socket dropped or closed; wait the fixed delay and connect again.
    Reconnect,
    /// Client was shut down.
    Shutdown,
}

pub fn map_ws_err(e: tokio_tungstenite::tungstenite::Error) -> ControlError {
    ControlError::connection(e.to_string())
}
