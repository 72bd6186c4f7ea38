//! Node addressing
//!
//! Every node on the mesh is identified by a 4-byte address carried in
//! network byte order on the wire. The all-ones address is the link-level
//! broadcast destination.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 4-byte node address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddr([u8; 4]);

impl NodeAddr {
    /// Broadcast address (all 0xFF)
    pub const BROADCAST: NodeAddr = NodeAddr([0xFF, 0xFF, 0xFF, 0xFF]);

    /// Unknown/unset address (all 0x00)
    pub const UNKNOWN: NodeAddr = NodeAddr([0x00, 0x00, 0x00, 0x00]);

    /// Create a new address from 4 bytes
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        NodeAddr(bytes)
    }

    /// Create an address from a u32
    pub const fn from_u32(value: u32) -> Self {
        NodeAddr(value.to_be_bytes())
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeAddr({}.{}.{}.{})",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_round_trip() {
        let addr = NodeAddr::from_u32(0x0A00_0001);
        assert_eq!(addr.as_bytes(), &[0x0A, 0x00, 0x00, 0x01]);
        assert_eq!(addr.to_u32(), 0x0A00_0001);
    }

    #[test]
    fn test_broadcast() {
        assert!(NodeAddr::BROADCAST.is_broadcast());
        assert!(!NodeAddr::from_u32(1).is_broadcast());
    }

    #[test]
    fn test_ordering_follows_numeric_value() {
        let a = NodeAddr::from_u32(0x0A00_0001);
        let b = NodeAddr::from_u32(0x0A00_0002);
        assert!(a < b);
    }

    #[test]
    fn test_display() {
        let addr = NodeAddr::from_bytes([10, 0, 0, 7]);
        assert_eq!(addr.to_string(), "10.0.0.7");
    }
}
