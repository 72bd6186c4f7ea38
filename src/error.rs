//! Status codes and error types

use serde::{Deserialize, Serialize};

/// Outcome of a MAC data request, reported through the confirm event.
///
/// These are protocol status codes, not programming errors: every one of
/// them except `Success` means the frame was dropped after the condition
/// was detected, and no further delivery attempt will be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacStatus {
    /// Frame handed to the PHY and transmitted.
    Success,
    /// Payload exceeds the maximum MPDU size minus header overhead.
    FrameTooLong,
    /// Transmit queue was at capacity.
    TransactionOverflow,
    /// Backoff budget exhausted without finding a clear channel.
    ChannelAccessFailure,
    /// The PHY reported a failure after transmission was attempted.
    TransmissionFailure,
}

impl MacStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MacStatus::Success)
    }
}

impl std::fmt::Display for MacStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacStatus::Success => write!(f, "success"),
            MacStatus::FrameTooLong => write!(f, "frame too long"),
            MacStatus::TransactionOverflow => write!(f, "transaction overflow"),
            MacStatus::ChannelAccessFailure => write!(f, "channel access failure"),
            MacStatus::TransmissionFailure => write!(f, "transmission failure"),
        }
    }
}

/// Errors raised while decoding frames or routing messages off the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("message length field {field} disagrees with body ({actual} bytes)")]
    LengthMismatch { field: usize, actual: usize },
    #[error("unknown link status {0}")]
    UnknownLinkStatus(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(
            MacStatus::ChannelAccessFailure.to_string(),
            "channel access failure"
        );
        assert!(MacStatus::Success.is_success());
        assert!(!MacStatus::FrameTooLong.is_success());
    }

    #[test]
    fn test_wire_error_display() {
        let err = WireError::Truncated { needed: 10, have: 4 };
        assert!(err.to_string().contains("truncated"));
    }
}
