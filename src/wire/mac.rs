//! MAC frame header codec
//!
//! ```text
//! ┌───────────────┬───────────┬───────────────┬───────────────┬─────────┐
//! │ Frame control │ Sequence  │ Destination   │ Source        │ Payload │
//! │ (1B)          │ (1B)      │ (4B)          │ (4B)          │ (0-117B)│
//! └───────────────┴───────────┴───────────────┴───────────────┴─────────┘
//!
//! Frame control:
//!   bits 7-5  frame type (0=UNICAST, 1=BROADCAST, 2=ACK, 3=RESERVED)
//!   bit 4     ack-requested
//!   bits 3-0  reserved
//! ```
//!
//! Addresses are network byte order.

use crate::addr::NodeAddr;
use crate::error::WireError;
use crate::phy::MPDU_OVERHEAD;
use serde::{Deserialize, Serialize};

const TYPE_SHIFT: u8 = 5;
const TYPE_MASK: u8 = 0b1110_0000;
const ACK_REQUEST_BIT: u8 = 1 << 4;

/// MAC frame type, carried in bits 7-5 of the frame control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Unicast = 0,
    Broadcast = 1,
    Ack = 2,
    Reserved = 3,
}

impl FrameType {
    fn from_bits(bits: u8) -> FrameType {
        match bits {
            0 => FrameType::Unicast,
            1 => FrameType::Broadcast,
            2 => FrameType::Ack,
            _ => FrameType::Reserved,
        }
    }
}

/// Decoded MAC frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacHeader {
    pub frame_type: FrameType,
    pub ack_request: bool,
    pub seq: u8,
    pub dst: NodeAddr,
    pub src: NodeAddr,
}

impl MacHeader {
    pub fn encode(&self) -> [u8; MPDU_OVERHEAD] {
        let mut bytes = [0u8; MPDU_OVERHEAD];
        let mut control = (self.frame_type as u8) << TYPE_SHIFT;
        if self.ack_request {
            control |= ACK_REQUEST_BIT;
        }
        bytes[0] = control;
        bytes[1] = self.seq;
        bytes[2..6].copy_from_slice(self.dst.as_bytes());
        bytes[6..10].copy_from_slice(self.src.as_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<MacHeader, WireError> {
        if bytes.len() < MPDU_OVERHEAD {
            return Err(WireError::Truncated {
                needed: MPDU_OVERHEAD,
                have: bytes.len(),
            });
        }
        let control = bytes[0];
        Ok(MacHeader {
            frame_type: FrameType::from_bits((control & TYPE_MASK) >> TYPE_SHIFT),
            ack_request: control & ACK_REQUEST_BIT != 0,
            seq: bytes[1],
            dst: NodeAddr::from_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            src: NodeAddr::from_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        })
    }
}

/// A full MAC frame: header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: MacHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build an acknowledgment for the given sequence number.
    ///
    /// ACK frames never themselves request acknowledgment.
    pub fn ack(src: NodeAddr, dst: NodeAddr, seq: u8) -> Frame {
        Frame {
            header: MacHeader {
                frame_type: FrameType::Ack,
                ack_request: false,
                seq,
                dst,
                src,
            },
            payload: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MPDU_OVERHEAD + self.payload.len());
        bytes.extend_from_slice(&self.header.encode());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, WireError> {
        let header = MacHeader::decode(bytes)?;
        Ok(Frame {
            header,
            payload: bytes[MPDU_OVERHEAD..].to_vec(),
        })
    }
}
