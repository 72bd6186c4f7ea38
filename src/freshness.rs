//! Flood duplicate suppression
//!
//! One record per origin ever heard from: the last accepted sequence
//! number and when it was accepted. A flooded message is delivered and
//! relayed at most once per (origin, sequence) within the freshness
//! window; sequence numbers a short forward distance ahead are accepted
//! early so a burst from the same origin is not throttled.

use crate::addr::NodeAddr;
use crate::time::Timestamp;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Forward modular distance from `last` to `new` on the 8-bit sequence
/// circle. A repeat of the same value counts as a full cycle, never zero,
/// so exact duplicates are always stale.
fn seq_distance(new: u8, last: u8) -> u16 {
    if new > last {
        (new - last) as u16
    } else {
        256 - (last - new) as u16
    }
}

#[derive(Debug, Clone, Copy)]
struct SeqRecord {
    seq: u8,
    accepted_at: Timestamp,
}

/// Per-origin freshness tracker.
pub struct FreshnessTracker {
    local: NodeAddr,
    window: Duration,
    forgiveness: u8,
    records: BTreeMap<NodeAddr, SeqRecord>,
    /// Next sequence number for locally originated traffic.
    next_seq: u8,
}

impl FreshnessTracker {
    pub fn new(local: NodeAddr, window: Duration, forgiveness: u8) -> Self {
        Self {
            local,
            window,
            forgiveness,
            records: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Allocate the sequence number for a locally originated message.
    /// Zero is never handed out: it reads as "unset" in traces.
    pub fn next_origin_seq(&mut self) -> u8 {
        if self.next_seq == 0 {
            self.next_seq = 1;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    /// Decide whether a flooded (origin, sequence) is new. Accepting
    /// updates the record, so asking twice for the same pair within the
    /// window answers `true` then `false`.
    pub fn is_new(&mut self, origin: NodeAddr, seq: u8, now: Timestamp) -> bool {
        if origin == self.local {
            // A node never re-accepts its own originated traffic.
            return false;
        }
        match self.records.get_mut(&origin) {
            None => {
                self.records.insert(
                    origin,
                    SeqRecord {
                        seq,
                        accepted_at: now,
                    },
                );
                true
            }
            Some(record) => {
                let aged = now.since(record.accepted_at) >= self.window;
                let near = seq_distance(seq, record.seq) < self.forgiveness as u16;
                if aged || near {
                    record.seq = seq;
                    record.accepted_at = now;
                    true
                } else {
                    trace!(%origin, seq, "stale flood message");
                    false
                }
            }
        }
    }

    pub fn known_origins(&self) -> usize {
        self.records.len()
    }
}
