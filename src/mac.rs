//! Medium-access engine
//!
//! Unslotted CSMA/CA over a half-duplex radio, with a bounded transmit
//! queue, per-frame retransmission, link-level acknowledgments and a
//! recent-receive cache for idempotent delivery.
//!
//! ## State machine
//!
//! ```text
//!          queue tick            CCA idle
//!   IDLE ────────────▶ CSMA ──────────────▶ CHANNEL_IDLE ──▶ SENDING
//!    ▲                  │                                       │
//!    │                  │ CCA busy × (NB > max)                 │ tx confirm
//!    │                  ▼                                       │
//!    ├──── CHANNEL_ACCESS_FAILURE                               │
//!    └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is sans-IO: it drives the radio through an injected
//! [`PhyPort`], takes PHY confirmations through `on_*` entry points, keeps
//! its delays in an internal timer queue fired by [`MacEngine::poll`], and
//! reports upward through an event outbox drained with
//! [`MacEngine::take_events`]. Exactly one frame is in flight at any time;
//! it is held outside the queue while the contention round runs so that
//! acknowledgment processing and front-of-queue ACK insertion can never
//! touch it.

use crate::addr::NodeAddr;
use crate::config::MacConfig;
use crate::error::MacStatus;
use crate::phy::{
    CcaStatus, PhyPort, PhyTxStatus, TrxState, TrxStateConfirm, MAX_MAC_PAYLOAD,
    UNIT_BACKOFF_PERIOD,
};
use crate::time::{TimerHandle, TimerQueue, Timestamp};
use crate::wire::mac::{Frame, FrameType, MacHeader};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// MAC engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Idle,
    /// Contention round in progress.
    Csma,
    /// Frame handed to the PHY, waiting for the transmit confirmation.
    Sending,
    /// Transient: CCA reported idle, transmitter being enabled.
    ChannelIdle,
    /// Transient: backoff budget exhausted.
    ChannelAccessFailure,
}

/// Upward events produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacEvent {
    /// Outcome of a `submit` call, by handle. A reliable frame confirms
    /// once per physical attempt on success and exactly once on failure.
    Confirm { handle: u8, status: MacStatus },
    /// A frame addressed to this node (or broadcast) was received.
    Indication {
        src: NodeAddr,
        dst: NodeAddr,
        seq: u8,
        link_quality: u8,
        payload: Vec<u8>,
    },
}

/// Internal timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MacTimer {
    QueueTick,
    SetState(MacState),
    RequestCca,
}

struct TxEntry {
    frame: Frame,
    handle: u8,
    retries: u8,
    /// End of the last transmission attempt; retried copies wait out the
    /// resend interval from here, leaving room for an ACK to arrive.
    last_tx: Option<Timestamp>,
}

impl TxEntry {
    fn is_ack(&self) -> bool {
        self.frame.header.frame_type == FrameType::Ack
    }
}

/// CSMA/CA medium-access engine over an injected PHY.
pub struct MacEngine<P: PhyPort> {
    addr: NodeAddr,
    config: MacConfig,
    phy: P,
    state: MacState,
    queue: VecDeque<TxEntry>,
    /// The one frame in flight, held out of the queue.
    current: Option<TxEntry>,
    timers: TimerQueue<MacTimer>,
    pending_set_state: Option<TimerHandle>,
    /// Backoff attempt count (NB) and exponent (BE).
    nb: u8,
    be: u8,
    cca_waiting: bool,
    dsn: u8,
    next_handle: u8,
    recent: VecDeque<(FrameType, NodeAddr, u8)>,
    events: Vec<MacEvent>,
    rng: SmallRng,
}

impl<P: PhyPort> MacEngine<P> {
    pub fn new(addr: NodeAddr, config: MacConfig, mut phy: P) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let dsn = rng.gen();
        phy.request_trx_state(TrxState::RxOn);
        let mut timers = TimerQueue::new();
        timers.schedule(Timestamp::ZERO + config.queue_tick, MacTimer::QueueTick);
        Self {
            addr,
            config,
            phy,
            state: MacState::Idle,
            queue: VecDeque::new(),
            current: None,
            timers,
            pending_set_state: None,
            nb: 0,
            be: 0,
            cca_waiting: false,
            dsn,
            next_handle: 0,
            recent: VecDeque::new(),
            events: Vec::new(),
            rng,
        }
    }

    pub fn address(&self) -> NodeAddr {
        self.addr
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drain accumulated upward events.
    pub fn take_events(&mut self) -> Vec<MacEvent> {
        std::mem::take(&mut self.events)
    }

    /// Earliest pending internal deadline.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    /// Queue a payload for transmission. Returns the MSDU handle echoed in
    /// the matching confirm events.
    pub fn submit(
        &mut self,
        dst: NodeAddr,
        payload: Vec<u8>,
        ack_requested: bool,
        broadcast: bool,
    ) -> u8 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);

        if payload.len() > MAX_MAC_PAYLOAD {
            warn!(len = payload.len(), "payload exceeds frame budget");
            self.events.push(MacEvent::Confirm {
                handle,
                status: MacStatus::FrameTooLong,
            });
            return handle;
        }

        let seq = self.dsn;
        self.dsn = self.dsn.wrapping_add(1);
        let frame = Frame {
            header: MacHeader {
                frame_type: if broadcast {
                    FrameType::Broadcast
                } else {
                    FrameType::Unicast
                },
                ack_request: ack_requested,
                seq,
                dst,
                src: self.addr,
            },
            payload,
        };
        // Frames that cannot be acknowledged get no retransmissions; the
        // retry counter starts exhausted.
        let retries = if ack_requested {
            0
        } else {
            self.config.max_retries
        };
        self.enqueue(TxEntry {
            frame,
            handle,
            retries,
            last_tx: None,
        });
        handle
    }

    /// PHY receive notification with the raw PSDU and its link quality.
    pub fn on_frame(&mut self, psdu: &[u8], link_quality: u8, now: Timestamp) {
        if self.state == MacState::Sending {
            // Half-duplex: the radio was not listening.
            trace!(state = ?self.state, "frame arrived while transmitting, dropped");
            return;
        }
        let frame = match Frame::decode(psdu) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "undecodable frame dropped");
                return;
            }
        };
        let header = frame.header;

        let key = (header.frame_type, header.src, header.seq);
        if self.recent.contains(&key) {
            trace!(src = %header.src, seq = header.seq, "duplicate frame suppressed");
            return;
        }
        self.recent.push_back(key);
        if self.recent.len() > self.config.recent_cache_capacity {
            self.recent.pop_front();
        }

        if header.frame_type == FrameType::Ack && header.dst == self.addr {
            // Acknowledged: the retried copy waiting in the queue is done.
            if let Some(pos) = self
                .queue
                .iter()
                .position(|e| !e.is_ack() && e.frame.header.seq == header.seq)
            {
                trace!(seq = header.seq, "ack received, queue entry retired");
                self.queue.remove(pos);
            }
            return;
        }

        if header.frame_type == FrameType::Broadcast || header.dst == self.addr {
            self.events.push(MacEvent::Indication {
                src: header.src,
                dst: header.dst,
                seq: header.seq,
                link_quality,
                payload: frame.payload,
            });
            if header.ack_request && header.dst == self.addr {
                self.queue_ack(header.src, header.seq, now);
            }
        } else {
            trace!(src = %header.src, dst = %header.dst, "frame not for us");
        }
    }

    /// PHY confirmation of a transceiver state request.
    pub fn on_trx_state_confirm(&mut self, confirm: TrxStateConfirm, now: Timestamp) {
        let trx = confirm.state();
        match (self.state, trx) {
            (MacState::Sending, TrxState::TxOn) => {
                let entry = self
                    .current
                    .as_ref()
                    .unwrap_or_else(|| panic!("transmitter enabled with no frame in flight"));
                self.phy.transmit(entry.frame.encode());
            }
            (MacState::Csma, TrxState::RxOn) => self.csma_start(now),
            (MacState::Idle, TrxState::RxOn) => {}
            (state, trx) => {
                panic!("inconsistent transceiver confirmation {trx:?} in MAC state {state:?}")
            }
        }
    }

    /// PHY confirmation of a clear-channel assessment.
    pub fn on_cca_confirm(&mut self, status: CcaStatus, now: Timestamp) {
        // A stale confirmation can still arrive after the contention round
        // ended; react only if one is actually outstanding.
        if !self.cca_waiting {
            return;
        }
        self.cca_waiting = false;
        match status {
            CcaStatus::Idle => {
                self.schedule_set_state(MacState::ChannelIdle, now);
            }
            CcaStatus::Busy => {
                self.be = (self.be + 1).min(self.config.max_be);
                self.nb += 1;
                if self.nb > self.config.max_csma_backoffs {
                    debug!(nb = self.nb, "backoff budget exhausted");
                    self.set_state(MacState::ChannelAccessFailure);
                } else {
                    trace!(nb = self.nb, be = self.be, "channel busy, backing off");
                    self.schedule_backoff(now);
                }
            }
        }
    }

    /// PHY confirmation of a transmit request.
    pub fn on_tx_confirm(&mut self, status: PhyTxStatus, now: Timestamp) {
        if self.state != MacState::Sending {
            panic!("transmit confirmation in MAC state {:?}", self.state);
        }
        let entry = self
            .current
            .take()
            .unwrap_or_else(|| panic!("transmit confirmation with no frame in flight"));
        match status {
            PhyTxStatus::Success => {
                if entry.is_ack() {
                    trace!(seq = entry.frame.header.seq, "ack sent");
                } else {
                    self.events.push(MacEvent::Confirm {
                        handle: entry.handle,
                        status: MacStatus::Success,
                    });
                    if entry.frame.header.ack_request && entry.retries < self.config.max_retries {
                        self.enqueue(TxEntry {
                            frame: entry.frame,
                            handle: entry.handle,
                            retries: entry.retries + 1,
                            last_tx: Some(now),
                        });
                    }
                }
            }
            PhyTxStatus::Failure => {
                if entry.is_ack() {
                    warn!("unable to send ack");
                } else {
                    debug!(handle = entry.handle, "transmission failed, frame dropped");
                    self.events.push(MacEvent::Confirm {
                        handle: entry.handle,
                        status: MacStatus::TransmissionFailure,
                    });
                }
            }
        }
        if let Some(handle) = self.pending_set_state.take() {
            self.timers.cancel(handle);
        }
        self.schedule_set_state(MacState::Idle, now);
    }

    /// Fire all internal timers due at `now`.
    pub fn poll(&mut self, now: Timestamp) {
        while let Some(timer) = self.timers.pop_due(now) {
            match timer {
                MacTimer::QueueTick => {
                    self.check_queue(now);
                    self.timers
                        .schedule(now + self.config.queue_tick, MacTimer::QueueTick);
                }
                MacTimer::SetState(state) => {
                    self.pending_set_state = None;
                    self.set_state(state);
                }
                MacTimer::RequestCca => {
                    self.cca_waiting = true;
                    self.phy.request_cca();
                }
            }
        }
    }

    fn enqueue(&mut self, entry: TxEntry) {
        if self.queue.len() >= self.config.queue_capacity {
            debug!(handle = entry.handle, "transmit queue full, frame dropped");
            self.events.push(MacEvent::Confirm {
                handle: entry.handle,
                status: MacStatus::TransactionOverflow,
            });
            return;
        }
        self.queue.push_back(entry);
    }

    /// ACKs jump the regular queue: inserted at the front, sent through the
    /// same contention path as any other frame.
    fn queue_ack(&mut self, dst: NodeAddr, seq: u8, _now: Timestamp) {
        if self.queue.len() >= self.config.queue_capacity {
            debug!(%dst, seq, "transmit queue full, ack dropped");
            return;
        }
        self.queue.push_front(TxEntry {
            frame: Frame::ack(self.addr, dst, seq),
            handle: 0,
            retries: self.config.max_retries,
            last_tx: None,
        });
    }

    fn check_queue(&mut self, now: Timestamp) {
        if self.state != MacState::Idle
            || self.pending_set_state.is_some()
            || self.current.is_some()
        {
            return;
        }
        let Some(front) = self.queue.front() else {
            return;
        };
        if let Some(last_tx) = front.last_tx {
            if now.since(last_tx) < self.config.resend_interval {
                return;
            }
        }
        self.current = self.queue.pop_front();
        self.schedule_set_state(MacState::Csma, now);
    }

    fn schedule_set_state(&mut self, state: MacState, now: Timestamp) {
        let handle = self.timers.schedule(now, MacTimer::SetState(state));
        self.pending_set_state = Some(handle);
    }

    fn set_state(&mut self, state: MacState) {
        trace!(from = ?self.state, to = ?state, "mac state change");
        match state {
            MacState::Idle => {
                self.state = MacState::Idle;
                self.phy.request_trx_state(TrxState::RxOn);
            }
            MacState::Csma => {
                assert_eq!(self.state, MacState::Idle, "CSMA entered from {:?}", self.state);
                self.state = MacState::Csma;
                self.phy.request_trx_state(TrxState::RxOn);
            }
            MacState::ChannelIdle => {
                assert_eq!(self.state, MacState::Csma);
                self.state = MacState::Sending;
                self.phy.request_trx_state(TrxState::TxOn);
            }
            MacState::ChannelAccessFailure => {
                let entry = self
                    .current
                    .take()
                    .unwrap_or_else(|| panic!("channel access failure with no frame in flight"));
                if !entry.is_ack() {
                    self.events.push(MacEvent::Confirm {
                        handle: entry.handle,
                        status: MacStatus::ChannelAccessFailure,
                    });
                }
                self.state = MacState::Idle;
                self.phy.request_trx_state(TrxState::RxOn);
            }
            MacState::Sending => {
                // Entered only through ChannelIdle.
                panic!("SENDING is not a schedulable target state");
            }
        }
    }

    fn csma_start(&mut self, now: Timestamp) {
        self.nb = 0;
        self.be = self.config.min_be;
        self.schedule_backoff(now);
    }

    /// Draw a random backoff in `[0, 2^BE - 1]` units and schedule the CCA
    /// after it.
    fn schedule_backoff(&mut self, now: Timestamp) {
        let upper = (1u64 << self.be) - 1;
        let periods = self.rng.gen_range(0..=upper);
        let micros = periods * UNIT_BACKOFF_PERIOD * 1_000_000 / self.phy.symbol_rate();
        trace!(periods, micros, "backoff scheduled");
        self.timers
            .schedule(now + Duration::from_micros(micros), MacTimer::RequestCca);
    }
}
