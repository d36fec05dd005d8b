//! Incremental decoding of memcached binary protocol frames.
//!
//! Captured TCP payloads split frames at arbitrary points. [`Command`] holds
//! the partial state of one frame between packets and yields a [`Frame`]
//! once the header and every declared body byte have been consumed.

mod command;
pub mod error;
mod header;

pub use command::{Command, DecodeState, Frame, Progress};
pub use error::{FrameError, Recovery};
pub use header::{FrameHeader, HEADER_LEN, Opcode, REQUEST_MAGIC, RESPONSE_MAGIC, Role};
