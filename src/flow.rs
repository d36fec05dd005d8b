//! Direction-independent identity for TCP connections.

use std::{fmt, net::SocketAddr};

/// Canonical identity of one TCP connection.
///
/// The two socket endpoints are stored lowest first, so packets travelling
/// in either direction of a connection resolve to the same identity.
///
/// # Examples
///
/// ```
/// use std::net::SocketAddr;
///
/// use tricorder::flow::FlowIdentity;
///
/// let client: SocketAddr = "10.0.0.1:40000".parse().expect("valid address");
/// let server: SocketAddr = "10.0.0.2:11210".parse().expect("valid address");
/// assert_eq!(
///     FlowIdentity::new(client, server),
///     FlowIdentity::new(server, client)
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowIdentity {
    low: SocketAddr,
    high: SocketAddr,
}

impl FlowIdentity {
    /// Identity of the connection between `a` and `b`, in either order.
    #[must_use]
    pub fn new(a: SocketAddr, b: SocketAddr) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// The endpoint that sorts first.
    #[must_use]
    pub fn low(&self) -> SocketAddr { self.low }

    /// The endpoint that sorts second.
    #[must_use]
    pub fn high(&self) -> SocketAddr { self.high }
}

impl fmt::Display for FlowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rstest::rstest;

    use super::FlowIdentity;

    fn addr(s: &str) -> SocketAddr { s.parse().expect("valid socket address") }

    #[rstest]
    #[case("10.0.0.1:40000", "10.0.0.2:11210")]
    #[case("10.0.0.2:11210", "10.0.0.1:40000")]
    #[case("127.0.0.1:11210", "127.0.0.1:11211")]
    #[case("[::1]:5000", "[::1]:11210")]
    #[case("10.0.0.1:11210", "[fe80::1]:11210")]
    fn identity_ignores_direction(#[case] a: &str, #[case] b: &str) {
        assert_eq!(
            FlowIdentity::new(addr(a), addr(b)),
            FlowIdentity::new(addr(b), addr(a))
        );
    }

    #[test]
    fn distinct_connections_differ() {
        let server = addr("10.0.0.2:11210");
        assert_ne!(
            FlowIdentity::new(addr("10.0.0.1:40000"), server),
            FlowIdentity::new(addr("10.0.0.1:40001"), server)
        );
    }

    #[test]
    fn display_is_canonical() {
        let id = FlowIdentity::new(addr("10.0.0.2:11210"), addr("10.0.0.1:40000"));
        assert_eq!(id.to_string(), "10.0.0.1:40000<->10.0.0.2:11210");
    }
}
