//! Resumable decoder for a single frame.
//!
//! A [`Command`] accepts the bytes of one frame in arbitrarily sized
//! fragments. Header bytes are buffered until all 24 have arrived; extras and
//! value bytes are counted and skipped; key bytes are kept for reporting.
//! Decoding the same bytes in one call or in many yields equal results.

use bytes::Bytes;

use super::{
    error::FrameError,
    header::{FrameHeader, HEADER_LEN, Opcode, Role},
};
use crate::timestamp::Timestamp;

/// Position of a [`Command`] within its frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeState {
    /// Accumulating the fixed header.
    Header,
    /// Skipping extras.
    Extras,
    /// Collecting the key.
    Key,
    /// Skipping the value.
    Value,
    /// Frame fully consumed.
    Complete,
}

/// Outcome of feeding a fragment to a [`Command`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The whole fragment was consumed and the frame is still open.
    NeedMoreData,
    /// The frame finished after `consumed` bytes of the fragment. Any bytes
    /// past that point belong to the next frame.
    Complete {
        /// Bytes of the fragment used by this frame.
        consumed: usize,
    },
}

/// In-progress decode of one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    state: DecodeState,
    captured_at: Timestamp,
    header_buf: [u8; HEADER_LEN],
    header_filled: usize,
    header: Option<FrameHeader>,
    remaining: usize,
    key: Vec<u8>,
}

impl Command {
    /// Start decoding a frame first seen at `captured_at`.
    #[must_use]
    pub fn new(captured_at: Timestamp) -> Self {
        Self {
            state: DecodeState::Header,
            captured_at,
            header_buf: [0; HEADER_LEN],
            header_filled: 0,
            header: None,
            remaining: 0,
            key: Vec::new(),
        }
    }

    /// Current decode state.
    #[must_use]
    pub fn state(&self) -> DecodeState { self.state }

    /// Returns true once every byte of the frame has been consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.state == DecodeState::Complete }

    /// The parsed header, once 24 header bytes have been seen.
    #[must_use]
    pub fn header(&self) -> Option<&FrameHeader> { self.header.as_ref() }

    /// Header bytes buffered so far.
    #[must_use]
    pub fn header_bytes_buffered(&self) -> usize { self.header_filled }

    /// Feed the next fragment of the frame.
    ///
    /// # Errors
    ///
    /// Returns the header error when the header is malformed, or
    /// [`FrameError::AlreadyComplete`] when called after the frame finished.
    pub fn consume(&mut self, fragment: &[u8]) -> Result<Progress, FrameError> {
        if self.is_complete() {
            return Err(FrameError::AlreadyComplete);
        }

        let mut input = fragment;
        loop {
            match self.state {
                DecodeState::Header => {
                    let take = (HEADER_LEN - self.header_filled).min(input.len());
                    let (head, rest) = input.split_at(take);
                    self.header_buf[self.header_filled..self.header_filled + take]
                        .copy_from_slice(head);
                    self.header_filled += take;
                    input = rest;
                    if self.header_filled < HEADER_LEN {
                        return Ok(Progress::NeedMoreData);
                    }
                    let header = FrameHeader::parse(&self.header_buf)?;
                    self.key.reserve(usize::from(header.key_len));
                    self.header = Some(header);
                    self.advance_from(DecodeState::Header);
                }
                DecodeState::Extras | DecodeState::Key | DecodeState::Value => {
                    let take = self.remaining.min(input.len());
                    let (head, rest) = input.split_at(take);
                    if self.state == DecodeState::Key {
                        self.key.extend_from_slice(head);
                    }
                    self.remaining -= take;
                    input = rest;
                    if self.remaining > 0 {
                        return Ok(Progress::NeedMoreData);
                    }
                    self.advance_from(self.state);
                }
                DecodeState::Complete => {
                    return Ok(Progress::Complete {
                        consumed: fragment.len() - input.len(),
                    });
                }
            }
        }
    }

    /// Move to the first non-empty section after `current`.
    fn advance_from(&mut self, current: DecodeState) {
        let Some(header) = self.header else {
            return;
        };
        let sections = [
            (DecodeState::Extras, usize::from(header.extras_len)),
            (DecodeState::Key, usize::from(header.key_len)),
            (
                DecodeState::Value,
                usize::try_from(header.value_len).unwrap_or(usize::MAX),
            ),
        ];
        let start = match current {
            DecodeState::Header => 0,
            DecodeState::Extras => 1,
            DecodeState::Key => 2,
            DecodeState::Value | DecodeState::Complete => sections.len(),
        };
        let next = sections[start..].iter().find(|(_, len)| *len > 0);
        match next {
            Some(&(state, len)) => {
                self.state = state;
                self.remaining = len;
            }
            None => {
                self.state = DecodeState::Complete;
                self.remaining = 0;
            }
        }
    }

    /// Convert a finished command into a [`Frame`].
    ///
    /// Returns `None` if decoding has not completed.
    #[must_use]
    pub fn into_frame(self) -> Option<Frame> {
        if !self.is_complete() {
            return None;
        }
        let header = self.header?;
        Some(Frame {
            role: header.role,
            opcode: header.opcode,
            opaque: header.opaque,
            key_len: header.key_len,
            extras_len: header.extras_len,
            value_len: header.value_len,
            key: Bytes::from(self.key),
            captured_at: self.captured_at,
        })
    }
}

/// A fully decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Request or response.
    pub role: Role,
    /// Measured operation or [`Opcode::Ignored`].
    pub opcode: Opcode,
    /// Correlation identifier.
    pub opaque: u32,
    /// Declared key length.
    pub key_len: u16,
    /// Declared extras length.
    pub extras_len: u8,
    /// Derived value length.
    pub value_len: u32,
    /// Key bytes.
    pub key: Bytes,
    /// When decoding of this frame began.
    pub captured_at: Timestamp,
}

impl Frame {
    /// Declared body length, equal to key + extras + value.
    #[must_use]
    pub fn total_body_len(&self) -> u32 {
        self.value_len + u32::from(self.key_len) + u32::from(self.extras_len)
    }

    /// Bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + usize::try_from(self.total_body_len()).unwrap_or(usize::MAX)
    }
}
