//! Metric helpers for `tricorder`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled every helper compiles to a no-op.

use crate::frame::Role;

/// Counter of frames decoded, labelled by `role`.
pub const FRAMES_DECODED: &str = "tricorder_frames_decoded_total";
/// Counter of frames rejected as malformed.
pub const FRAMES_MALFORMED: &str = "tricorder_frames_malformed_total";
/// Counter of latency records produced.
pub const LATENCY_RECORDS: &str = "tricorder_latency_records_total";
/// Counter of frames dropped without a counterpart, labelled by `kind`.
pub const ORPHANS: &str = "tricorder_orphans_total";
/// Gauge of flows in the active session.
pub const FLOWS_ACTIVE: &str = "tricorder_flows_active";

/// Why a frame left the pending tables without producing a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrphanKind {
    /// Response with no pending request.
    Response,
    /// Request replaced by a newer request with the same opaque.
    OverwrittenRequest,
}

impl OrphanKind {
    fn as_str(self) -> &'static str {
        match self {
            OrphanKind::Response => "response",
            OrphanKind::OverwrittenRequest => "overwritten_request",
        }
    }
}

/// Record a decoded frame.
pub fn inc_frames(role: Role) {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAMES_DECODED, "role" => role.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = role;
}

/// Record a malformed frame.
pub fn inc_malformed() {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAMES_MALFORMED).increment(1);
}

/// Record a produced latency record.
pub fn inc_records() {
    #[cfg(feature = "metrics")]
    metrics::counter!(LATENCY_RECORDS).increment(1);
}

/// Record an orphaned frame.
pub fn inc_orphans(kind: OrphanKind) {
    #[cfg(feature = "metrics")]
    metrics::counter!(ORPHANS, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind.as_str();
}

/// Set the number of live flows.
pub fn set_flows(count: usize) {
    #[cfg(feature = "metrics")]
    #[expect(
        clippy::cast_precision_loss,
        reason = "flow counts stay far below f64 precision limits"
    )]
    metrics::gauge!(FLOWS_ACTIVE).set(count as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}
