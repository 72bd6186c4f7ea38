//! Multi-node simulation harness
//!
//! An in-memory radio medium plus a discrete-event loop over the shared
//! virtual clock, used by the integration tests to run whole-network
//! scenarios deterministically. The medium models a half-duplex broadcast
//! channel with a static adjacency map: a frame reaches every linked node
//! that was not itself transmitting, unless a second audible transmission
//! overlapped it (collision), in which case both are lost at that
//! receiver. PHY requests are confirmed immediately; transmissions occupy
//! the channel for their airtime.

use crate::addr::NodeAddr;
use crate::config::{MacConfig, RoutingConfig};
use crate::phy::{CcaStatus, PhyPort, PhyTxStatus, TrxState, TrxStateConfirm};
use crate::routing::{RoutingEvent, RoutingProtocol};
use crate::time::{TimerQueue, Timestamp};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

/// Channel symbol rate in symbols per second.
const SYMBOL_RATE: u64 = 62_500;
/// Symbols per PSDU byte.
const SYMBOLS_PER_BYTE: u64 = 2;

/// Requests a node's PHY port has queued for the harness.
#[derive(Debug, Clone)]
enum PhyOp {
    Trx { node: usize, state: TrxState },
    Cca { node: usize },
    Tx { node: usize, psdu: Vec<u8> },
}

/// PHY port backed by the shared medium.
pub struct SimPhy {
    node: usize,
    ops: Rc<RefCell<Vec<PhyOp>>>,
}

impl PhyPort for SimPhy {
    fn request_trx_state(&mut self, state: TrxState) {
        self.ops.borrow_mut().push(PhyOp::Trx {
            node: self.node,
            state,
        });
    }

    fn request_cca(&mut self) {
        self.ops.borrow_mut().push(PhyOp::Cca { node: self.node });
    }

    fn transmit(&mut self, psdu: Vec<u8>) {
        self.ops.borrow_mut().push(PhyOp::Tx {
            node: self.node,
            psdu,
        });
    }

    fn symbol_rate(&self) -> u64 {
        SYMBOL_RATE
    }
}

#[derive(Debug, Clone)]
struct Transmission {
    from: usize,
    psdu: Vec<u8>,
    start: Timestamp,
    end: Timestamp,
}

#[derive(Debug, Clone, Copy)]
enum SimEvent {
    /// A transmission finished: confirm the sender, deliver to receivers.
    TxEnd { record: usize },
}

/// Deterministic multi-node simulation.
pub struct Simulation {
    nodes: Vec<RoutingProtocol<SimPhy>>,
    links: Vec<(usize, usize)>,
    ops: Rc<RefCell<Vec<PhyOp>>>,
    records: Vec<Transmission>,
    events: TimerQueue<SimEvent>,
    now: Timestamp,
    collected: Vec<Vec<RoutingEvent>>,
}

impl Simulation {
    /// Build `count` nodes with addresses 10.0.0.1.., connected by the
    /// given undirected links. `seed` makes the whole run reproducible.
    pub fn new(count: usize, links: &[(usize, usize)], seed: u64) -> Self {
        let ops: Rc<RefCell<Vec<PhyOp>>> = Rc::new(RefCell::new(Vec::new()));
        let mut nodes = Vec::with_capacity(count);
        for i in 0..count {
            let phy = SimPhy {
                node: i,
                ops: ops.clone(),
            };
            let addr = NodeAddr::from_bytes([10, 0, 0, i as u8 + 1]);
            let mac_config = MacConfig::default().with_seed(seed ^ (i as u64 * 2 + 1));
            let routing_config = RoutingConfig::default().with_seed(seed ^ (i as u64 * 2 + 2));
            nodes.push(RoutingProtocol::new(addr, mac_config, routing_config, phy));
        }
        let mut sim = Self {
            nodes,
            links: links.to_vec(),
            ops,
            records: Vec::new(),
            events: TimerQueue::new(),
            now: Timestamp::ZERO,
            collected: vec![Vec::new(); count],
        };
        // Initial receiver-on requests issued at construction.
        sim.flush();
        sim
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn address_of(&self, node: usize) -> NodeAddr {
        self.nodes[node].address()
    }

    pub fn node(&self, node: usize) -> &RoutingProtocol<SimPhy> {
        &self.nodes[node]
    }

    /// Routing events a node has produced so far.
    pub fn events_for(&self, node: usize) -> &[RoutingEvent] {
        &self.collected[node]
    }

    /// Originate a flooded payload at `node`. Returns the sequence number.
    pub fn originate(&mut self, node: usize, payload_size: u8) -> u8 {
        let seq = self.nodes[node].originate(payload_size, self.now);
        self.flush();
        seq
    }

    /// Advance virtual time, firing everything due, until `deadline`.
    pub fn run_until(&mut self, deadline: Timestamp) {
        loop {
            let mut next = self.events.next_deadline();
            for node in &mut self.nodes {
                next = match (next, node.next_deadline()) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
            let Some(next) = next else { break };
            if next > deadline {
                break;
            }
            self.now = next;
            while let Some(event) = self.events.pop_due(self.now) {
                self.dispatch(event);
                self.flush();
            }
            for i in 0..self.nodes.len() {
                self.nodes[i].poll(self.now);
                self.flush();
            }
            self.collect();
            self.prune();
        }
        self.now = deadline;
        self.collect();
    }

    fn linked(&self, a: usize, b: usize) -> bool {
        self.links
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// Handle queued PHY requests until the network is quiescent.
    fn flush(&mut self) {
        loop {
            let batch: Vec<PhyOp> = self.ops.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for op in batch {
                match op {
                    PhyOp::Trx { node, state } => {
                        self.nodes[node].on_trx_state_confirm(
                            TrxStateConfirm::Set(state),
                            self.now,
                        );
                    }
                    PhyOp::Cca { node } => {
                        let busy = self.records.iter().any(|r| {
                            r.start <= self.now
                                && self.now < r.end
                                && (r.from == node || self.linked(r.from, node))
                        });
                        let status = if busy { CcaStatus::Busy } else { CcaStatus::Idle };
                        self.nodes[node].on_cca_confirm(status, self.now);
                    }
                    PhyOp::Tx { node, psdu } => {
                        let airtime = Duration::from_micros(
                            psdu.len() as u64 * SYMBOLS_PER_BYTE * 1_000_000 / SYMBOL_RATE,
                        );
                        trace!(node, bytes = psdu.len(), ?airtime, "transmission started");
                        self.records.push(Transmission {
                            from: node,
                            psdu,
                            start: self.now,
                            end: self.now + airtime,
                        });
                        self.events.schedule(
                            self.now + airtime,
                            SimEvent::TxEnd {
                                record: self.records.len() - 1,
                            },
                        );
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, event: SimEvent) {
        match event {
            SimEvent::TxEnd { record } => {
                let tx = self.records[record].clone();
                self.nodes[tx.from].on_tx_confirm(PhyTxStatus::Success, self.now);
                for j in 0..self.nodes.len() {
                    if j == tx.from || !self.linked(tx.from, j) {
                        continue;
                    }
                    let collided = self.records.iter().enumerate().any(|(k, o)| {
                        k != record
                            && o.start < tx.end
                            && tx.start < o.end
                            && (o.from == j || self.linked(o.from, j))
                    });
                    if collided {
                        trace!(from = tx.from, to = j, "frame lost to collision");
                        continue;
                    }
                    self.nodes[j].on_frame(&tx.psdu, 200, self.now);
                }
            }
        }
    }

    fn collect(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            self.collected[i].extend(node.take_events());
        }
    }

    /// Drop transmission records old enough that nothing can still overlap
    /// them. Indices into `records` only live inside pending `TxEnd`
    /// events, which fire exactly at `end`, so records are removed well
    /// after their last use.
    fn prune(&mut self) {
        if self.records.len() > 512 {
            let horizon = self.now - Duration::from_secs(1);
            let before = self.records.len();
            // Rebuild only when everything old can go at once; pending
            // events hold indices, so compaction must not reorder.
            if self.records.iter().all(|r| r.end < horizon) {
                self.records.clear();
                trace!(dropped = before, "transmission history pruned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_linked_nodes_learn_each_other() {
        let mut sim = Simulation::new(2, &[(0, 1)], 11);
        sim.run_until(Timestamp::from_secs(5));
        assert_eq!(sim.node(0).neighbors().len(), 1);
        assert_eq!(sim.node(1).neighbors().len(), 1);
        let b = sim.address_of(1);
        assert!(sim.node(0).neighbors().status_of(b).is_some());
    }

    #[test]
    fn test_unlinked_nodes_stay_strangers() {
        let mut sim = Simulation::new(2, &[], 11);
        sim.run_until(Timestamp::from_secs(5));
        assert!(sim.node(0).neighbors().is_empty());
        assert!(sim.node(1).neighbors().is_empty());
    }

    #[test]
    fn test_clock_advances_to_deadline() {
        let mut sim = Simulation::new(1, &[], 1);
        sim.run_until(Timestamp::from_secs(2));
        assert_eq!(sim.now(), Timestamp::from_secs(2));
    }
}
