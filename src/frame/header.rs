//! Fixed 24-byte memcached binary header.
//!
//! Layout, all multi-byte fields in network byte order:
//!
//! ```text
//! magic(1) opcode(1) key_len(2) extras_len(1) data_type(1)
//! status_or_vbucket(2) total_body_len(4) opaque(4) cas(8)
//! ```

use bytes::Buf;

use super::error::FrameError;

/// Size of the fixed header preceding every frame body.
pub const HEADER_LEN: usize = 24;

/// Magic byte carried by requests.
pub const REQUEST_MAGIC: u8 = 0x80;
/// Magic byte carried by responses.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Direction of a frame, derived from its magic byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client to server (`0x80`).
    Request,
    /// Server to client (`0x81`).
    Response,
}

impl Role {
    /// Map a magic byte to a role.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadMagic`] for any byte other than `0x80` or
    /// `0x81`.
    pub fn from_magic(magic: u8) -> Result<Self, FrameError> {
        match magic {
            REQUEST_MAGIC => Ok(Self::Request),
            RESPONSE_MAGIC => Ok(Self::Response),
            other => Err(FrameError::BadMagic { magic: other }),
        }
    }

    /// Returns the role as a static label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

/// Operations the agent measures. Everything else is parsed but ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Opcode {
    /// `0x00`
    Get,
    /// `0x01`
    Set,
    /// Any opcode outside the measured set.
    #[default]
    Ignored,
}

/// Opcode byte to operation lookup. Every byte has an entry.
static OPCODE_TABLE: [Opcode; 256] = {
    let mut table = [Opcode::Ignored; 256];
    table[0x00] = Opcode::Get;
    table[0x01] = Opcode::Set;
    table
};

impl Opcode {
    /// Look up the operation for a raw opcode byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self { OPCODE_TABLE[usize::from(byte)] }

    /// Returns true for opcodes excluded from correlation.
    #[must_use]
    pub const fn is_ignored(self) -> bool { matches!(self, Self::Ignored) }

    /// Returns the operation name as a static label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Ignored => "ignored",
        }
    }
}

/// Decoded fixed header with the derived value length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Request or response.
    pub role: Role,
    /// Measured operation, or [`Opcode::Ignored`].
    pub opcode: Opcode,
    /// Length of the key section.
    pub key_len: u16,
    /// Length of the extras section.
    pub extras_len: u8,
    /// Declared length of everything following the header.
    pub total_body_len: u32,
    /// Correlation identifier chosen by the client.
    pub opaque: u32,
    /// `total_body_len - key_len - extras_len`.
    pub value_len: u32,
}

impl FrameHeader {
    /// Parse a complete header.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadMagic`] for an unknown magic byte and
    /// [`FrameError::BodyUnderflow`] when the declared body is shorter than
    /// the key and extras it must contain.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, FrameError> {
        let mut buf = &bytes[..];
        let role = Role::from_magic(buf.get_u8())?;
        let opcode = Opcode::from_byte(buf.get_u8());
        let key_len = buf.get_u16();
        let extras_len = buf.get_u8();
        buf.advance(1); // data type
        buf.advance(2); // status or vbucket
        let total_body_len = buf.get_u32();
        let opaque = buf.get_u32();
        buf.advance(8); // cas
        debug_assert!(!buf.has_remaining());

        let value_len = total_body_len
            .checked_sub(u32::from(key_len))
            .and_then(|rest| rest.checked_sub(u32::from(extras_len)))
            .ok_or(FrameError::BodyUnderflow {
                total_body_len,
                key_len,
                extras_len,
            })?;

        Ok(Self {
            role,
            opcode,
            key_len,
            extras_len,
            total_body_len,
            opaque,
            value_len,
        })
    }
}
