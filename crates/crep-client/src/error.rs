use crep_protocol::ProtocolError;
use crep_weave::WeaveError;

/// Errors from client operations.
///
/// A missing acknowledgement is not an error: unacknowledged atoms are
/// simply re-sent on the next reconnect.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection is offline and the operation does not wait for it.
    #[error("not connected")]
    NotConnected,

    /// The connection's event stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// An event could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding shared client state was poisoned.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// The local weave is inconsistent.
    #[error("weave error: {0}")]
    Weave(#[from] WeaveError),
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
