//! Errors raised by the control listener and client.

use std::io;

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Failures on a control connection.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Socket failure, including oversized frames.
    #[error("control I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be serialised.
    #[error("failed to encode control message: {0}")]
    Encode(#[from] EncodeError),

    /// A frame did not contain a valid message.
    #[error("failed to decode control message: {0}")]
    Decode(#[from] DecodeError),

    /// The peer closed the connection before answering.
    #[error("control connection closed")]
    Closed,

    /// The agent answered with a failure.
    #[error("agent reported failure: {0}")]
    Remote(String),

    /// The agent answered with a response of the wrong kind.
    #[error("unexpected control response: expected {expected}, got {got}")]
    UnexpectedResponse {
        /// Response kind the request calls for.
        expected: &'static str,
        /// Response kind received.
        got: &'static str,
    },
}
