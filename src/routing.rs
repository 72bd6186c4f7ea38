//! Routing/flooding orchestrator
//!
//! Owns the MAC engine, the topology table and the freshness tracker, and
//! runs the periodic machinery: topology beacons (with the neighbor
//! refresh on the same tick), and a short drain timer that flushes the
//! outbound message queue into the MAC so protocol messages produced in
//! one tick are dispatched together. Flooded payloads are originated here,
//! checked for freshness on reception, and relayed with a freshly elected
//! forwarder set when this node was assigned.

use crate::addr::NodeAddr;
use crate::config::{MacConfig, RoutingConfig};
use crate::error::MacStatus;
use crate::freshness::FreshnessTracker;
use crate::mac::{MacEngine, MacEvent};
use crate::neighbor::NeighborTable;
use crate::phy::{CcaStatus, PhyPort, PhyTxStatus, TrxStateConfirm};
use crate::time::{TimerQueue, Timestamp};
use crate::wire::message::{AudioData, Message, MessageBody};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Upward events for the application and statistics tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEvent {
    /// A fresh flooded payload reached this node.
    Delivered {
        origin: NodeAddr,
        seq: u8,
        payload_size: u8,
        previous_hop: NodeAddr,
    },
    /// This node was an assigned forwarder and queued a relayed copy.
    Forwarded {
        origin: NodeAddr,
        seq: u8,
        forwarders: Vec<NodeAddr>,
    },
    /// Link-level outcome of a locally originated message, one event per
    /// MAC confirm.
    SendStatus { seq: u8, status: MacStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoutingTimer {
    Beacon,
    Drain,
}

/// Flooding protocol instance for one node.
pub struct RoutingProtocol<P: PhyPort> {
    addr: NodeAddr,
    config: RoutingConfig,
    mac: MacEngine<P>,
    neighbors: NeighborTable,
    freshness: FreshnessTracker,
    queued: Vec<Message>,
    timers: TimerQueue<RoutingTimer>,
    /// MAC handles of in-flight originated audio, for status reporting.
    outstanding: VecDeque<(u8, u8)>,
    events: Vec<RoutingEvent>,
}

const OUTSTANDING_LIMIT: usize = 16;

impl<P: PhyPort> RoutingProtocol<P> {
    pub fn new(addr: NodeAddr, mac_config: MacConfig, config: RoutingConfig, phy: P) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let mut timers = TimerQueue::new();
        // Startup jitter desynchronizes nodes powered on together.
        let beacon_jitter = rng.gen_range(0..config.beacon_interval.as_micros() as u64);
        let drain_jitter = rng.gen_range(0..=config.drain_interval.as_micros() as u64);
        timers.schedule(
            Timestamp::ZERO + Duration::from_micros(beacon_jitter),
            RoutingTimer::Beacon,
        );
        timers.schedule(
            Timestamp::ZERO + Duration::from_micros(drain_jitter),
            RoutingTimer::Drain,
        );
        let neighbors = NeighborTable::new(addr, config.beacon_interval, config.history_capacity);
        let freshness = FreshnessTracker::new(addr, config.freshness_window, config.forgiveness_distance);
        Self {
            addr,
            config,
            mac: MacEngine::new(addr, mac_config, phy),
            neighbors,
            freshness,
            queued: Vec::new(),
            timers,
            outstanding: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> NodeAddr {
        self.addr
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Drain accumulated upward events.
    pub fn take_events(&mut self) -> Vec<RoutingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Earliest deadline across the routing timers and the MAC.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        match (self.timers.next_deadline(), self.mac.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Originate a flooded payload of `payload_size` bytes. Returns the
    /// allocated sequence number.
    pub fn originate(&mut self, payload_size: u8, _now: Timestamp) -> u8 {
        let seq = self.freshness.next_origin_seq();
        let forwarders = self.neighbors.elect_source_forwarders();
        debug!(seq, ?forwarders, "originating flood message");
        self.queued.push(Message::audio_data(
            self.addr,
            AudioData {
                origin: self.addr,
                seq,
                payload_size,
                forwarders,
            },
        ));
        seq
    }

    /// PHY receive notification, forwarded through the MAC.
    pub fn on_frame(&mut self, psdu: &[u8], link_quality: u8, now: Timestamp) {
        self.mac.on_frame(psdu, link_quality, now);
        self.pump(now);
    }

    /// PHY transceiver state confirmation.
    pub fn on_trx_state_confirm(&mut self, confirm: TrxStateConfirm, now: Timestamp) {
        self.mac.on_trx_state_confirm(confirm, now);
        self.pump(now);
    }

    /// PHY clear-channel assessment confirmation.
    pub fn on_cca_confirm(&mut self, status: CcaStatus, now: Timestamp) {
        self.mac.on_cca_confirm(status, now);
        self.pump(now);
    }

    /// PHY transmit confirmation.
    pub fn on_tx_confirm(&mut self, status: PhyTxStatus, now: Timestamp) {
        self.mac.on_tx_confirm(status, now);
        self.pump(now);
    }

    /// Fire all timers due at `now`, MAC included.
    pub fn poll(&mut self, now: Timestamp) {
        while let Some(timer) = self.timers.pop_due(now) {
            match timer {
                RoutingTimer::Beacon => {
                    self.neighbors.refresh(now);
                    self.queue_beacon();
                    self.timers
                        .schedule(now + self.config.beacon_interval, RoutingTimer::Beacon);
                }
                RoutingTimer::Drain => {
                    self.drain_queue(now);
                    self.timers
                        .schedule(now + self.config.drain_interval, RoutingTimer::Drain);
                }
            }
        }
        self.mac.poll(now);
        self.pump(now);
    }

    fn queue_beacon(&mut self) {
        let links = self.neighbors.one_hop_links();
        trace!(links = links.len(), "queueing topology beacon");
        self.queued.push(Message::node_info(self.addr, links));
    }

    /// Flush the outbound message queue into the MAC.
    fn drain_queue(&mut self, _now: Timestamp) {
        for message in std::mem::take(&mut self.queued) {
            let mut payload = message.encode();
            match &message.body {
                MessageBody::NodeInfo(_) => {
                    let handle = self.mac.submit(NodeAddr::BROADCAST, payload, false, true);
                    self.retire_handle(handle);
                }
                MessageBody::AudioData(data) => {
                    // Filler bytes stand in for the audio body.
                    payload.extend(std::iter::repeat(0).take(data.payload_size as usize));
                    let originated = data.origin == self.addr;
                    // One representative neighbor acknowledges a local
                    // origination as a weak signal of link-level success.
                    let representative = if originated {
                        self.neighbors.representative()
                    } else {
                        None
                    };
                    let handle = match representative {
                        Some(rep) => self.mac.submit(rep, payload, true, true),
                        None => self.mac.submit(NodeAddr::BROADCAST, payload, false, true),
                    };
                    self.retire_handle(handle);
                    if originated {
                        self.outstanding.push_back((handle, data.seq));
                        if self.outstanding.len() > OUTSTANDING_LIMIT {
                            self.outstanding.pop_front();
                        }
                    }
                }
            }
        }
    }

    /// MAC handles wrap; an entry still tracking a handle that a new
    /// submission just received is stale and must not report against it.
    fn retire_handle(&mut self, handle: u8) {
        self.outstanding.retain(|&(h, _)| h != handle);
    }

    /// Move MAC events upward: confirms to status events, indications into
    /// the message handlers.
    fn pump(&mut self, now: Timestamp) {
        for event in self.mac.take_events() {
            match event {
                MacEvent::Confirm { handle, status } => {
                    if let Some(pos) =
                        self.outstanding.iter().position(|&(h, _)| h == handle)
                    {
                        let seq = self.outstanding[pos].1;
                        self.events.push(RoutingEvent::SendStatus { seq, status });
                        // A failure is terminal: no further attempts follow.
                        if !status.is_success() {
                            self.outstanding.remove(pos);
                        }
                    }
                }
                MacEvent::Indication { src, payload, .. } => {
                    self.handle_indication(src, &payload, now);
                }
            }
        }
    }

    fn handle_indication(&mut self, previous_hop: NodeAddr, payload: &[u8], now: Timestamp) {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, from = %previous_hop, "undecodable routing message");
                return;
            }
        };
        match message.body {
            MessageBody::NodeInfo(info) => {
                trace!(from = %message.src, links = info.links.len(), "topology beacon");
                self.neighbors.update(message.src, &info.links, now);
            }
            MessageBody::AudioData(data) => {
                if !self.freshness.is_new(data.origin, data.seq, now) {
                    return;
                }
                debug!(origin = %data.origin, seq = data.seq, "flood message delivered");
                self.events.push(RoutingEvent::Delivered {
                    origin: data.origin,
                    seq: data.seq,
                    payload_size: data.payload_size,
                    previous_hop,
                });
                if data.is_assigned_forwarder(self.addr) {
                    let forwarders = self.neighbors.elect_relay_forwarders(previous_hop);
                    debug!(origin = %data.origin, seq = data.seq, ?forwarders, "relaying");
                    self.events.push(RoutingEvent::Forwarded {
                        origin: data.origin,
                        seq: data.seq,
                        forwarders: forwarders.clone(),
                    });
                    self.queued.push(Message::audio_data(
                        self.addr,
                        AudioData {
                            origin: data.origin,
                            seq: data.seq,
                            payload_size: data.payload_size,
                            forwarders,
                        },
                    ));
                }
            }
        }
    }
}
