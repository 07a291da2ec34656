//! Error types for channels, handles and exposed objects.

use std::io;

use thiserror::Error;

use farcall_protocol::{ErrorCode, ProtocolError, ProxyId, ThrownError};

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error (socket, pipe, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// The transport cannot move transferable resources.
    #[error("transport does not support transferable resources")]
    TransferUnsupported,

    /// Socket path already in use.
    #[error("socket path already in use: {path}")]
    SocketInUse { path: String },

    /// Socket path parent directory does not exist.
    #[error("socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },
}

impl TransportError {
    /// Creates a socket in use error.
    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    /// Creates a socket path invalid error.
    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    /// Returns true when the receive loop cannot continue after this error.
    ///
    /// A frame that was read completely but failed to decode leaves the
    /// stream aligned, so later frames are still readable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Protocol(ProtocolError::Serialization(_) | ProtocolError::Malformed(_))
        )
    }
}

/// Errors surfaced by remote handles, the bridge and exposed objects.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The handle does not support this operation.
    #[error("unsupported operation on remote handle: {operation}")]
    Unsupported { operation: &'static str },

    /// The handle was released and can no longer be used.
    #[error("remote handle {proxy_id} has been released")]
    Released { proxy_id: ProxyId },

    /// The peer answered with a thrown error.
    #[error("remote call failed: {0}")]
    Thrown(ThrownError),

    /// Raised by an exposed object's own logic.
    #[error("{0}")]
    Failed(String),

    /// A member was used as something it is not.
    #[error("type error: {0}")]
    Type(String),

    /// The value cannot cross the boundary as marked.
    #[error("cannot pass value across the boundary: {0}")]
    Bridge(String),

    /// The structured codec failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Protocol error (framing, malformed message, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A service with this name is already exposed on the channel.
    #[error("service already exposed on this channel: {name}")]
    ServiceInUse { name: String },

    /// The channel went away while the operation was in flight.
    #[error("channel closed")]
    ChannelClosed,
}

impl RemoteError {
    /// Creates an error raised by exposed-object logic.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Creates a bridge error.
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge(message.into())
    }

    /// Converts this error into the payload of a `throw` value.
    pub fn to_thrown(&self) -> ThrownError {
        match self {
            Self::Thrown(error) => error.clone(),
            Self::Failed(message) => ThrownError::new(ErrorCode::Remote, message.clone()),
            Self::Type(message) => ThrownError::new(ErrorCode::TypeError, message.clone()),
            Self::Unsupported { .. } => ThrownError::not_implemented(self.to_string()),
            Self::Released { .. } | Self::ChannelClosed => {
                ThrownError::unavailable(self.to_string())
            }
            Self::Protocol(_) => ThrownError::new(ErrorCode::InvalidRequest, self.to_string()),
            Self::Bridge(_)
            | Self::Codec(_)
            | Self::Transport(_)
            | Self::ServiceInUse { .. } => ThrownError::new(ErrorCode::Internal, self.to_string()),
        }
    }

    /// Returns true for errors that never touched the wire.
    pub fn is_local_usage(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::Released { .. })
    }
}
