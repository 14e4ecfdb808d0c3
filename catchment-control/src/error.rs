//! Error types for control operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O error communicating with the control socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Protocol error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A frame announced more bytes than either side accepts
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(u32),

    /// The peer speaks a different protocol version
    #[error("Incompatible protocol version: server={server}, client={client}")]
    IncompatibleVersion { server: u32, client: u32 },

    /// Server returned an error
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid socket path: {0}")]
    InvalidSocketPath(String),

    /// The control socket belongs to another running instance
    #[error("Socket already in use by running instance: {0}")]
    SocketInUse(String),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
