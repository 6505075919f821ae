use std::fmt;

use elk_schemas::ClientMessage;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone; nothing more can be sent on it.
    Closed,
    /// Could not establish the connection.
    Connect(String),
    /// Write failed on an open connection.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Connect(msg) => write!(f, "connect failed: {msg}"),
            TransportError::Io(msg) => write!(f, "transport io error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Outbound half of a coordinator connection.
///
/// Inbound `ServerMessage`s are delivered by the concrete transport through
/// whatever channel it hands out at connect time; sessions and list views are
/// fed from there by the application.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, msg: ClientMessage) -> Result<(), TransportError>;
}
