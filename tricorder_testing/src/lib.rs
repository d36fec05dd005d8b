//! Test utilities for the `tricorder` agent.
//!
//! Builds memcached frames, Ethernet segments, and capture files, captures
//! log output, and runs control listeners on ephemeral ports.
//!
//! ```rust
//! use tricorder_testing::{FrameSpec, OP_GET, Trace};
//!
//! let trace = Trace::new()
//!     .client(FrameSpec::request(OP_GET, 1).key(b"k").encode(), 1_000)
//!     .server(FrameSpec::response(OP_GET, 1).encode(), 2_000);
//! assert_eq!(trace.len(), 2);
//! ```

pub mod agent;
pub mod capture;
pub mod logging;

pub use agent::RunningAgent;
pub use capture::{Trace, ethernet_frame};
pub use logging::{LoggerHandle, logger};
pub use tricorder::test_helpers::{
    FrameSpec,
    OP_GET,
    OP_NOOP,
    OP_SET,
    client_addr,
    client_packet,
    server_addr,
    server_packet,
    wait_for_frames,
    wait_for_idle,
    wait_for_status,
};
