//! Errors raised while decoding a frame.

use thiserror::Error;

/// What a stream should do after a decode error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Discard the current frame; alignment is still trusted.
    DropFrame,
    /// Byte alignment for the flow is lost; ignore the flow until reset.
    Desync,
}

/// Decode failures for a single frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The first header byte is neither request nor response magic.
    #[error("invalid magic byte: {magic:#04x}")]
    BadMagic {
        /// Byte found where the magic was expected.
        magic: u8,
    },

    /// Declared body length cannot hold the declared key and extras.
    #[error(
        "total body length {total_body_len} smaller than key {key_len} plus extras {extras_len}"
    )]
    BodyUnderflow {
        /// Declared total body length.
        total_body_len: u32,
        /// Declared key length.
        key_len: u16,
        /// Declared extras length.
        extras_len: u8,
    },

    /// Bytes were fed to a command that already finished decoding.
    #[error("command already complete")]
    AlreadyComplete,
}

impl FrameError {
    /// Returns the recovery the stream applies for this error.
    ///
    /// Header corruption means the next frame boundary is unknown, so the
    /// flow is abandoned. Feeding a finished command is a caller mistake and
    /// leaves the byte stream untouched.
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::BadMagic { .. } | Self::BodyUnderflow { .. } => Recovery::Desync,
            Self::AlreadyComplete => Recovery::DropFrame,
        }
    }
}
