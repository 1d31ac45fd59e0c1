use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// A peer's network address, as a string.
///
/// Endpoints are compared lexicographically on the underlying string; this
/// order is the sole deterministic tie-breaker used by the election engine,
/// so `Endpoint` derives `Ord` rather than comparing by parsed `SocketAddr`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint(pub String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Endpoint(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Endpoint(addr.to_string())
    }
}

/// Total, deterministic tie-break between two candidate endpoints.
/// Defined once here so the comparison is never scattered across modules.
pub fn endpoint_less(a: &Endpoint, b: &Endpoint) -> bool {
    a < b
}

pub type PeerId = String;
pub type Epoch = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicographic_order() {
        let a = Endpoint::new("10.0.0.1:9000");
        let b = Endpoint::new("10.0.0.2:9000");
        assert!(endpoint_less(&a, &b));
        assert!(!endpoint_less(&b, &a));
    }
}
