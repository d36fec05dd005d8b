#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers for building memcached binary frames and driving a
//! [`SessionController`].

use std::{net::SocketAddr, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    frame::{HEADER_LEN, REQUEST_MAGIC, RESPONSE_MAGIC},
    session::{SessionController, SessionStatus},
    source::{CapturedPacket, TcpEndpoints},
    timestamp::Timestamp,
};

/// Opcode byte for GET.
pub const OP_GET: u8 = 0x00;
/// Opcode byte for SET.
pub const OP_SET: u8 = 0x01;
/// Opcode byte for NOOP, which the agent ignores.
pub const OP_NOOP: u8 = 0x0a;

/// Builder for a single wire frame.
#[derive(Clone, Debug)]
pub struct FrameSpec {
    magic: u8,
    opcode: u8,
    opaque: u32,
    extras: Vec<u8>,
    key: Vec<u8>,
    value: Vec<u8>,
    total_body_override: Option<u32>,
}

impl FrameSpec {
    /// Request frame with the given opcode and opaque.
    #[must_use]
    pub fn request(opcode: u8, opaque: u32) -> Self {
        Self::with_magic(REQUEST_MAGIC, opcode, opaque)
    }

    /// Response frame with the given opcode and opaque.
    #[must_use]
    pub fn response(opcode: u8, opaque: u32) -> Self {
        Self::with_magic(RESPONSE_MAGIC, opcode, opaque)
    }

    /// Frame with an arbitrary magic byte.
    #[must_use]
    pub fn with_magic(magic: u8, opcode: u8, opaque: u32) -> Self {
        Self {
            magic,
            opcode,
            opaque,
            extras: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
            total_body_override: None,
        }
    }

    /// Set the extras section.
    #[must_use]
    pub fn extras(mut self, extras: &[u8]) -> Self {
        self.extras = extras.to_vec();
        self
    }

    /// Set the key section.
    #[must_use]
    pub fn key(mut self, key: &[u8]) -> Self {
        self.key = key.to_vec();
        self
    }

    /// Set the value section.
    #[must_use]
    pub fn value(mut self, value: &[u8]) -> Self {
        self.value = value.to_vec();
        self
    }

    /// Declare a total body length that disagrees with the sections.
    #[must_use]
    pub fn total_body_len(mut self, total: u32) -> Self {
        self.total_body_override = Some(total);
        self
    }

    /// Encode the frame.
    ///
    /// # Panics
    ///
    /// Panics if a section exceeds its length field.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let key_len = u16::try_from(self.key.len()).expect("key fits in u16");
        let extras_len = u8::try_from(self.extras.len()).expect("extras fit in u8");
        let body_len = self.extras.len() + self.key.len() + self.value.len();
        let total = self
            .total_body_override
            .unwrap_or_else(|| u32::try_from(body_len).expect("body fits in u32"));

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body_len);
        buf.put_u8(self.magic);
        buf.put_u8(self.opcode);
        buf.put_u16(key_len);
        buf.put_u8(extras_len);
        buf.put_u8(0); // data type
        buf.put_u16(0); // status or vbucket
        buf.put_u32(total);
        buf.put_u32(self.opaque);
        buf.put_u64(0xdead_beef_cafe_f00d);
        buf.put_slice(&self.extras);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
        buf.freeze()
    }
}

/// Client side of the default test connection.
#[must_use]
pub fn client_addr() -> SocketAddr { SocketAddr::from(([10, 0, 0, 1], 40_000)) }

/// Server side of the default test connection.
#[must_use]
pub fn server_addr() -> SocketAddr { SocketAddr::from(([10, 0, 0, 2], 11_210)) }

/// Packet from the client to the server.
#[must_use]
pub fn client_packet(payload: impl Into<Bytes>, nanos: u64) -> CapturedPacket {
    CapturedPacket::new(
        TcpEndpoints::new(client_addr(), server_addr()),
        payload.into(),
        Timestamp::from_nanos(nanos),
    )
}

/// Packet from the server to the client.
#[must_use]
pub fn server_packet(payload: impl Into<Bytes>, nanos: u64) -> CapturedPacket {
    CapturedPacket::new(
        TcpEndpoints::new(server_addr(), client_addr()),
        payload.into(),
        Timestamp::from_nanos(nanos),
    )
}

/// Poll `controller` until `done` accepts its status.
///
/// # Panics
///
/// Panics if `done` has not accepted a status after five seconds.
pub async fn wait_for_status(
    controller: &SessionController,
    done: impl Fn(&SessionStatus) -> bool,
) -> SessionStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = controller.status().await;
            if done(&status) {
                return status;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("controller did not reach the expected status")
}

/// Wait until the capture worker has returned on its own.
///
/// # Panics
///
/// Panics if the worker is still running after five seconds.
pub async fn wait_for_idle(controller: &SessionController) -> SessionStatus {
    wait_for_status(controller, |status| !status.running).await
}

/// Wait until the running worker has decoded at least `frames` frames.
///
/// # Panics
///
/// Panics if the count is not reached within five seconds.
pub async fn wait_for_frames(controller: &SessionController, frames: u64) -> SessionStatus {
    wait_for_status(controller, |status| status.stats.frames_decoded >= frames).await
}
