//! Management interface for a running catchment instance.
//!
//! A Unix domain socket carries length-prefixed `bincode` frames. Each
//! connection carries exactly one [`Request`] and one [`Response`]:
//! - list the live SMTP connections, or force one closed
//! - ping the server and query its status

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    ConnectionCommand, PROTOCOL_VERSION, Request, RequestCommand, Response, ResponseData,
    ResponsePayload, SystemCommand, SystemStatus,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/catchment.sock";

/// Largest frame either side accepts
pub(crate) const MAX_FRAME_SIZE: u32 = 10_000_000;
