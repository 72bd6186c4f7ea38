//! Wire formats
//!
//! Two codecs live here: the 10-byte MAC frame header that fronts every
//! PSDU, and the routing message format (topology beacons and flooded data)
//! carried inside MAC payloads.

pub mod mac;
pub mod message;
