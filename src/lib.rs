//! Public API for the `tricorder` library.
//!
//! `tricorder` passively observes memcached binary protocol traffic,
//! reassembles request and response frames from captured TCP segments, and
//! records the latency of every matched request/response pair. A
//! [`SessionController`] drives capture sessions; the [`control`] module
//! exposes it to a remote coordinator.

pub mod config;
pub mod control;
pub mod demux;
pub mod flow;
pub mod frame;
pub mod metrics;
pub mod session;
pub mod source;
pub mod stream;
pub mod timestamp;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{AgentConfig, ConfigError};
pub use control::{ControlClient, ControlError, ControlServer};
pub use demux::FlowTable;
pub use flow::FlowIdentity;
pub use frame::{Command, Frame, FrameError, Opcode, Role};
pub use session::{SessionController, SessionError, SessionStatus};
pub use source::{BackendFactory, CapturedPacket, PacketSource, SourceError, SourceFactory};
pub use stream::{LatencyRecord, RecordKey, Stream, StreamStats};
pub use timestamp::Timestamp;
