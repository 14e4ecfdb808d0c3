//! Error types shared across the catchment crates.
//!
//! Per-message failures never surface through these types; they are turned
//! into SMTP replies inside the session. What remains here is configuration,
//! connection lifecycle and server lifecycle.

use std::io;

use thiserror::Error;

/// Errors found while validating configuration, before anything binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration field is missing or empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// No job dispatcher was configured.
    #[error("No job dispatcher configured, refusing to accept mail")]
    MissingDispatcher,

    /// The configuration file could not be read or parsed.
    #[error("Unable to load configuration from {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Errors that end a single SMTP session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Protocol error occurred during session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The session was closed through the connection registry.
    #[error("Session closed")]
    Closed,

    /// Session timed out.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the session was ended by the server rather than the client.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout(_))
    }
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),
}

/// Errors that can occur in the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A listener error occurred.
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    /// Shutdown timed out waiting for sessions to complete.
    #[error("Shutdown timeout after {0} seconds")]
    ShutdownTimeout(u64),
}
