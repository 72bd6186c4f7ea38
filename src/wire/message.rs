//! Routing message codec
//!
//! Every routing message starts with a 6-byte header:
//!
//! ```text
//! ┌──────────┬─────────────┬────────────┬──────────────────┐
//! │ Type (1B)│ Source (4B) │ Length (1B)│ Type-specific body│
//! └──────────┴─────────────┴────────────┴──────────────────┘
//! ```
//!
//! `Length` covers header plus body. Two message types exist: NODEINFO
//! topology beacons carrying the sender's one-hop link list, and AUDIODATA
//! flooded payloads carrying origin, sequence, payload size and the elected
//! forwarder set. AUDIODATA frames append `payload_size` filler bytes after
//! the encoded message, standing in for the audio body; the decoder ignores
//! trailing bytes.

use crate::addr::NodeAddr;
use crate::error::WireError;
use serde::{Deserialize, Serialize};

pub const MESSAGE_HEADER_SIZE: usize = 6;

const TYPE_NODEINFO: u8 = 1;
const TYPE_AUDIODATA: u8 = 2;

/// Coarse link classification, carried in beacons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkStatus {
    None = 0,
    Unstable = 1,
    Stable = 2,
}

impl LinkStatus {
    pub fn from_byte(byte: u8) -> Result<LinkStatus, WireError> {
        match byte {
            0 => Ok(LinkStatus::None),
            1 => Ok(LinkStatus::Unstable),
            2 => Ok(LinkStatus::Stable),
            other => Err(WireError::UnknownLinkStatus(other)),
        }
    }
}

/// One link in a beacon: a neighbor address and the sender's view of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub status: LinkStatus,
    pub addr: NodeAddr,
}

/// Topology beacon body: the sender's full one-hop link list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    pub links: Vec<LinkEntry>,
}

impl NodeInfo {
    fn body_len(&self) -> usize {
        1 + self.links.len() * 5
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.push(self.links.len() as u8);
        for link in &self.links {
            out.push(link.status as u8);
            out.extend_from_slice(link.addr.as_bytes());
        }
    }

    fn decode_body(bytes: &[u8]) -> Result<NodeInfo, WireError> {
        let count = *bytes.first().ok_or(WireError::Truncated { needed: 1, have: 0 })? as usize;
        let needed = 1 + count * 5;
        if bytes.len() < needed {
            return Err(WireError::Truncated {
                needed,
                have: bytes.len(),
            });
        }
        let mut links = Vec::with_capacity(count);
        for i in 0..count {
            let at = 1 + i * 5;
            links.push(LinkEntry {
                status: LinkStatus::from_byte(bytes[at])?,
                addr: NodeAddr::from_bytes([
                    bytes[at + 1],
                    bytes[at + 2],
                    bytes[at + 3],
                    bytes[at + 4],
                ]),
            });
        }
        Ok(NodeInfo { links })
    }
}

/// Flooded data body.
///
/// The forwarder set is recomputed at every hop; a relayed copy carries the
/// same origin/sequence/size but never the set it arrived with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioData {
    pub origin: NodeAddr,
    pub seq: u8,
    pub payload_size: u8,
    pub forwarders: Vec<NodeAddr>,
}

impl AudioData {
    fn body_len(&self) -> usize {
        7 + self.forwarders.len() * 4
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.origin.as_bytes());
        out.push(self.seq);
        out.push(self.payload_size);
        out.push(self.forwarders.len() as u8);
        for addr in &self.forwarders {
            out.extend_from_slice(addr.as_bytes());
        }
    }

    fn decode_body(bytes: &[u8]) -> Result<AudioData, WireError> {
        if bytes.len() < 7 {
            return Err(WireError::Truncated {
                needed: 7,
                have: bytes.len(),
            });
        }
        let count = bytes[6] as usize;
        let needed = 7 + count * 4;
        if bytes.len() < needed {
            return Err(WireError::Truncated {
                needed,
                have: bytes.len(),
            });
        }
        let mut forwarders = Vec::with_capacity(count);
        for i in 0..count {
            let at = 7 + i * 4;
            forwarders.push(NodeAddr::from_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ]));
        }
        Ok(AudioData {
            origin: NodeAddr::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            seq: bytes[4],
            payload_size: bytes[5],
            forwarders,
        })
    }

    pub fn is_assigned_forwarder(&self, addr: NodeAddr) -> bool {
        self.forwarders.contains(&addr)
    }
}

/// Message body variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    NodeInfo(NodeInfo),
    AudioData(AudioData),
}

/// A routing message: common header plus body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub src: NodeAddr,
    pub body: MessageBody,
}

impl Message {
    pub fn node_info(src: NodeAddr, links: Vec<LinkEntry>) -> Message {
        Message {
            src,
            body: MessageBody::NodeInfo(NodeInfo { links }),
        }
    }

    pub fn audio_data(src: NodeAddr, data: AudioData) -> Message {
        Message {
            src,
            body: MessageBody::AudioData(data),
        }
    }

    /// Encoded size, header included.
    pub fn encoded_len(&self) -> usize {
        MESSAGE_HEADER_SIZE
            + match &self.body {
                MessageBody::NodeInfo(info) => info.body_len(),
                MessageBody::AudioData(data) => data.body_len(),
            }
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        debug_assert!(
            len <= u8::MAX as usize,
            "encoded message ({len} bytes) exceeds the length field"
        );
        let mut out = Vec::with_capacity(len);
        out.push(match &self.body {
            MessageBody::NodeInfo(_) => TYPE_NODEINFO,
            MessageBody::AudioData(_) => TYPE_AUDIODATA,
        });
        out.extend_from_slice(self.src.as_bytes());
        out.push(len as u8);
        match &self.body {
            MessageBody::NodeInfo(info) => info.encode_body(&mut out),
            MessageBody::AudioData(data) => data.encode_body(&mut out),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
        if bytes.len() < MESSAGE_HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: MESSAGE_HEADER_SIZE,
                have: bytes.len(),
            });
        }
        let msg_type = bytes[0];
        let src = NodeAddr::from_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let length = bytes[5] as usize;
        if length < MESSAGE_HEADER_SIZE || bytes.len() < length {
            return Err(WireError::LengthMismatch {
                field: length,
                actual: bytes.len(),
            });
        }
        let body_bytes = &bytes[MESSAGE_HEADER_SIZE..length];
        let body = match msg_type {
            TYPE_NODEINFO => MessageBody::NodeInfo(NodeInfo::decode_body(body_bytes)?),
            TYPE_AUDIODATA => MessageBody::AudioData(AudioData::decode_body(body_bytes)?),
            other => return Err(WireError::UnknownMessageType(other)),
        };
        Ok(Message { src, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> NodeAddr {
        NodeAddr::from_u32(n)
    }

    #[test]
    fn test_node_info_round_trip() {
        let msg = Message::node_info(
            addr(10),
            vec![
                LinkEntry {
                    status: LinkStatus::Stable,
                    addr: addr(11),
                },
                LinkEntry {
                    status: LinkStatus::Unstable,
                    addr: addr(12),
                },
            ],
        );
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 6 + 1 + 2 * 5);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[5] as usize, bytes.len());
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_audio_data_round_trip() {
        let msg = Message::audio_data(
            addr(20),
            AudioData {
                origin: addr(10),
                seq: 7,
                payload_size: 64,
                forwarders: vec![addr(21), addr(22)],
            },
        );
        let bytes = msg.encode();
        assert_eq!(bytes[0], 2);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_trailing_filler_ignored() {
        let msg = Message::audio_data(
            addr(1),
            AudioData {
                origin: addr(1),
                seq: 1,
                payload_size: 32,
                forwarders: vec![],
            },
        );
        let mut bytes = msg.encode();
        bytes.extend_from_slice(&[0u8; 32]);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    #[should_panic(expected = "exceeds the length field")]
    fn test_oversized_message_encode_panics() {
        // 64 forwarders push the encoded size past the one-byte length
        // field; such a message can never be formed on the protocol path.
        let msg = Message::audio_data(
            addr(1),
            AudioData {
                origin: addr(1),
                seq: 1,
                payload_size: 0,
                forwarders: vec![addr(2); 64],
            },
        );
        let _ = msg.encode();
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = Message::node_info(addr(1), vec![]).encode();
        bytes[0] = 9;
        assert!(matches!(
            Message::decode(&bytes),
            Err(WireError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let bytes = Message::node_info(
            addr(1),
            vec![LinkEntry {
                status: LinkStatus::Stable,
                addr: addr(2),
            }],
        )
        .encode();
        assert!(Message::decode(&bytes[..8]).is_err());
    }
}
