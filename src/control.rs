//! Remote control of the capture session.
//!
//! A coordinator connects over TCP and exchanges length-prefixed frames
//! (four-byte big-endian length) whose payloads are `bincode`-encoded
//! [`ControlRequest`] and [`ControlResponse`] values. Each request receives
//! exactly one response on the same connection, in order.

mod client;
mod error;
mod protocol;
mod server;

pub use client::ControlClient;
pub use error::ControlError;
pub use protocol::{
    ControlRequest,
    ControlResponse,
    HarvestEntry,
    HarvestReport,
    MAX_FRAME_LEN,
    StatusReport,
    decode,
    encode,
    frame_codec,
};
pub use server::ControlServer;
