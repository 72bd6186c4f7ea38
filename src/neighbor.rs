//! Topology table and forwarder election
//!
//! Each beacon received refreshes a per-neighbor record: reception history
//! (scored by [`LinkHistory`]), a coarse status derived from the score, and
//! the neighbor's self-reported one-hop link list, which gives this node
//! its two-hop view. Forwarder election walks that two-hop view and picks
//! the smallest set of one-hop neighbors whose rebroadcast covers every
//! two-hop node the transmission itself cannot reach.

use crate::addr::NodeAddr;
use crate::lqi::LinkHistory;
use crate::time::Timestamp;
use crate::wire::message::{LinkEntry, LinkStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, trace};

/// Status thresholds applied to the link-quality score.
const STABLE_THRESHOLD: u8 = 170;
const UNSTABLE_THRESHOLD: u8 = 75;

/// Quality of a two-hop path, ordered best first: the pair of the one-hop
/// neighbor's own status and the status it reports for the far link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkClass {
    StableStable,
    StableUnstable,
    UnstableStable,
    UnstableUnstable,
    Invalid,
}

impl LinkClass {
    fn judge(one_hop: LinkStatus, two_hop: LinkStatus) -> LinkClass {
        match (one_hop, two_hop) {
            (LinkStatus::Stable, LinkStatus::Stable) => LinkClass::StableStable,
            (LinkStatus::Stable, LinkStatus::Unstable) => LinkClass::StableUnstable,
            (LinkStatus::Unstable, LinkStatus::Stable) => LinkClass::UnstableStable,
            (LinkStatus::Unstable, LinkStatus::Unstable) => LinkClass::UnstableUnstable,
            _ => LinkClass::Invalid,
        }
    }
}

#[derive(Debug, Clone)]
struct NeighborEntry {
    addr: NodeAddr,
    status: LinkStatus,
    lqi: u8,
    refresh_time: Timestamp,
    history: LinkHistory,
    two_hop: Vec<LinkEntry>,
}

/// Per-neighbor topology table.
pub struct NeighborTable {
    local: NodeAddr,
    refresh_interval: Duration,
    history_capacity: usize,
    entries: Vec<NeighborEntry>,
}

impl NeighborTable {
    pub fn new(local: NodeAddr, refresh_interval: Duration, history_capacity: usize) -> Self {
        Self {
            local,
            refresh_interval,
            history_capacity,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status_of(&self, addr: NodeAddr) -> Option<LinkStatus> {
        self.entries.iter().find(|e| e.addr == addr).map(|e| e.status)
    }

    pub fn lqi_of(&self, addr: NodeAddr) -> Option<u8> {
        self.entries.iter().find(|e| e.addr == addr).map(|e| e.lqi)
    }

    /// Absorb a topology beacon from `src`.
    pub fn update(&mut self, src: NodeAddr, links: &[LinkEntry], now: Timestamp) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == src) {
            entry.refresh_time = now;
            entry.two_hop = links.to_vec();
        } else {
            trace!(neighbor = %src, "new neighbor");
            self.entries.push(NeighborEntry {
                addr: src,
                status: LinkStatus::None,
                lqi: 255,
                refresh_time: now,
                history: LinkHistory::new(self.history_capacity),
                two_hop: links.to_vec(),
            });
        }
    }

    /// Periodic refresh: fold "did a beacon arrive this interval" into each
    /// neighbor's history, rescore, reclassify, and evict dead entries.
    pub fn refresh(&mut self, now: Timestamp) {
        let interval = self.refresh_interval;
        self.entries.retain_mut(|entry| {
            let seen = now.since(entry.refresh_time) <= interval;
            entry.history.insert(seen);
            entry.lqi = entry.history.score();
            entry.status = if entry.lqi > STABLE_THRESHOLD {
                LinkStatus::Stable
            } else if entry.lqi > UNSTABLE_THRESHOLD {
                LinkStatus::Unstable
            } else {
                LinkStatus::None
            };
            if entry.lqi == 0 {
                debug!(neighbor = %entry.addr, "neighbor evicted");
                false
            } else {
                true
            }
        });
    }

    /// The full one-hop list, as carried in this node's own beacons.
    pub fn one_hop_links(&self) -> Vec<LinkEntry> {
        self.entries
            .iter()
            .map(|e| LinkEntry {
                status: e.status,
                addr: e.addr,
            })
            .collect()
    }

    /// Deterministic representative neighbor: best status first, then
    /// lowest address. Used as the single acknowledging destination of a
    /// flood origination.
    pub fn representative(&self) -> Option<NodeAddr> {
        self.entries
            .iter()
            .map(|e| (std::cmp::Reverse(e.status), e.addr))
            .min()
            .map(|(_, addr)| addr)
    }

    /// Forwarder election for a locally originated message.
    pub fn elect_source_forwarders(&self) -> Vec<NodeAddr> {
        self.elect(None)
    }

    /// Forwarder election for a message arriving from `previous_hop` that
    /// this node must relay.
    pub fn elect_relay_forwarders(&self, previous_hop: NodeAddr) -> Vec<NodeAddr> {
        self.elect(Some(previous_hop))
    }

    /// Shared election. Hidden nodes need no forwarding: the local node,
    /// every one-hop neighbor this transmission reaches directly, and, when
    /// relaying, the previous hop plus everything it already reaches. The
    /// hidden set filters two-hop *targets* only; any one-hop neighbor may
    /// still serve as a forwarder toward a non-hidden target.
    fn elect(&self, previous_hop: Option<NodeAddr>) -> Vec<NodeAddr> {
        let mut hidden: BTreeSet<NodeAddr> = BTreeSet::new();
        hidden.insert(self.local);
        for entry in &self.entries {
            if Some(entry.addr) == previous_hop {
                hidden.insert(entry.addr);
                for link in &entry.two_hop {
                    hidden.insert(link.addr);
                }
            } else if entry.status == LinkStatus::Stable || entry.status == LinkStatus::Unstable {
                hidden.insert(entry.addr);
            }
        }

        // target -> candidate forwarders, keyed deterministically.
        let mut reachable: BTreeMap<NodeAddr, Vec<(LinkClass, NodeAddr)>> = BTreeMap::new();
        for entry in &self.entries {
            for link in &entry.two_hop {
                if hidden.contains(&link.addr) {
                    continue;
                }
                reachable
                    .entry(link.addr)
                    .or_default()
                    .push((LinkClass::judge(entry.status, link.status), entry.addr));
            }
        }

        let mut forwarders: BTreeSet<NodeAddr> = BTreeSet::new();
        // Targets with a single path: that forwarder is mandatory.
        for candidates in reachable.values() {
            if let [(_, one_hop)] = candidates[..] {
                forwarders.insert(one_hop);
            }
        }
        // Remaining targets: skip if an already-elected forwarder covers
        // them, otherwise take the best link class, ties to the lowest
        // address.
        for candidates in reachable.values() {
            if candidates.len() < 2 {
                continue;
            }
            if candidates.iter().any(|(_, a)| forwarders.contains(a)) {
                continue;
            }
            if let Some((_, winner)) = candidates.iter().min() {
                forwarders.insert(*winner);
            }
        }

        trace!(count = forwarders.len(), "forwarders elected");
        forwarders.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> NodeAddr {
        NodeAddr::from_u32(n)
    }

    fn link(status: LinkStatus, n: u32) -> LinkEntry {
        LinkEntry {
            status,
            addr: addr(n),
        }
    }

    fn table() -> NeighborTable {
        NeighborTable::new(addr(1), Duration::from_secs(1), 8)
    }

    /// Insert a fully formed neighbor, bypassing the beacon/refresh ramp.
    fn seed(table: &mut NeighborTable, n: u32, status: LinkStatus, two_hop: Vec<LinkEntry>) {
        table.entries.push(NeighborEntry {
            addr: addr(n),
            status,
            lqi: 255,
            refresh_time: Timestamp::ZERO,
            history: LinkHistory::new(8),
            two_hop,
        });
    }

    #[test]
    fn test_new_neighbor_starts_none() {
        let mut t = table();
        t.update(addr(2), &[], Timestamp::ZERO);
        assert_eq!(t.status_of(addr(2)), Some(LinkStatus::None));
        assert_eq!(t.lqi_of(addr(2)), Some(255));
    }

    #[test]
    fn test_status_ramps_up_with_beacons() {
        let mut t = table();
        let mut now = Timestamp::ZERO;
        t.update(addr(2), &[], now);
        for round in 1..=8 {
            now = now + Duration::from_secs(1);
            t.update(addr(2), &[], now);
            t.refresh(now);
            let lqi = t.lqi_of(addr(2)).unwrap();
            match round {
                1..=2 => assert_eq!(t.status_of(addr(2)), Some(LinkStatus::None)),
                3..=5 => assert_eq!(t.status_of(addr(2)), Some(LinkStatus::Unstable)),
                _ => assert_eq!(t.status_of(addr(2)), Some(LinkStatus::Stable)),
            }
            assert!(lqi > 0);
        }
        assert_eq!(t.lqi_of(addr(2)), Some(255));
    }

    /// Drive one neighbor through a fixed seen/missed beacon pattern, one
    /// sample per refresh interval (beacons land mid-interval).
    fn run_beacon_pattern(t: &mut NeighborTable, pattern: &[bool]) {
        t.update(addr(2), &[], Timestamp::ZERO);
        for (i, &seen) in pattern.iter().enumerate() {
            let tick = Timestamp::from_millis((i as u64 + 1) * 1000);
            if seen {
                t.update(addr(2), &[], tick - Duration::from_millis(500));
            }
            t.refresh(tick);
        }
    }

    #[test]
    fn test_status_thresholds_at_boundaries() {
        // A lone two-miss run lands exactly on the stable threshold and
        // stays UNSTABLE; the same two misses spread out cross it.
        let mut t = table();
        run_beacon_pattern(&mut t, &[true, true, false, false, true, true, true, true]);
        assert_eq!(t.lqi_of(addr(2)), Some(170));
        assert_eq!(t.status_of(addr(2)), Some(LinkStatus::Unstable));

        let mut t = table();
        run_beacon_pattern(&mut t, &[true, false, true, true, false, true, true, true]);
        assert_eq!(t.lqi_of(addr(2)), Some(191));
        assert_eq!(t.status_of(addr(2)), Some(LinkStatus::Stable));

        // Two seen samples sit below the unstable threshold, a third
        // crosses it.
        let mut t = table();
        run_beacon_pattern(&mut t, &[true, true]);
        assert_eq!(t.lqi_of(addr(2)), Some(64));
        assert_eq!(t.status_of(addr(2)), Some(LinkStatus::None));

        let mut t = table();
        run_beacon_pattern(&mut t, &[true, true, true]);
        assert_eq!(t.lqi_of(addr(2)), Some(96));
        assert_eq!(t.status_of(addr(2)), Some(LinkStatus::Unstable));
    }

    #[test]
    fn test_silent_neighbor_decays_and_evicts() {
        let mut t = table();
        let mut now = Timestamp::ZERO;
        t.update(addr(2), &[], now);
        for _ in 0..8 {
            now = now + Duration::from_secs(1);
            t.update(addr(2), &[], now);
            t.refresh(now);
        }
        assert_eq!(t.status_of(addr(2)), Some(LinkStatus::Stable));

        // Beacons stop; the score decays to zero and the entry goes away.
        let mut rounds = 0;
        while !t.is_empty() {
            now = now + Duration::from_secs(2);
            t.refresh(now);
            rounds += 1;
            assert!(rounds <= 16, "entry never evicted");
        }
    }

    #[test]
    fn test_one_hop_links_reflect_table() {
        let mut t = table();
        seed(&mut t, 2, LinkStatus::Stable, vec![]);
        seed(&mut t, 3, LinkStatus::Unstable, vec![]);
        let links = t.one_hop_links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0], link(LinkStatus::Stable, 2));
        assert_eq!(links[1], link(LinkStatus::Unstable, 3));
    }

    #[test]
    fn test_representative_prefers_status_then_address() {
        let mut t = table();
        seed(&mut t, 5, LinkStatus::Unstable, vec![]);
        seed(&mut t, 4, LinkStatus::Stable, vec![]);
        seed(&mut t, 3, LinkStatus::Stable, vec![]);
        assert_eq!(t.representative(), Some(addr(3)));
        assert_eq!(table().representative(), None);
    }

    #[test]
    fn test_single_path_target_mandates_forwarder() {
        // 1 -- 2 -- 9: only neighbor 2 reaches 9.
        let mut t = table();
        seed(
            &mut t,
            2,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 1), link(LinkStatus::Stable, 9)],
        );
        assert_eq!(t.elect_source_forwarders(), vec![addr(2)]);
    }

    #[test]
    fn test_direct_neighbors_need_no_forwarding() {
        // Both neighbors hear the source directly, and neither reports a
        // node outside the hidden set.
        let mut t = table();
        seed(
            &mut t,
            2,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 1), link(LinkStatus::Stable, 3)],
        );
        seed(
            &mut t,
            3,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 1), link(LinkStatus::Stable, 2)],
        );
        assert!(t.elect_source_forwarders().is_empty());
    }

    #[test]
    fn test_best_link_class_wins() {
        // Target 9 reachable via unstable 2 or stable 3: 3 wins.
        let mut t = table();
        seed(
            &mut t,
            2,
            LinkStatus::Unstable,
            vec![link(LinkStatus::Stable, 9)],
        );
        seed(
            &mut t,
            3,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 9)],
        );
        assert_eq!(t.elect_source_forwarders(), vec![addr(3)]);
    }

    #[test]
    fn test_equal_class_tie_breaks_to_lowest_address() {
        let mut t = table();
        seed(
            &mut t,
            4,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 9)],
        );
        seed(
            &mut t,
            3,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 9)],
        );
        assert_eq!(t.elect_source_forwarders(), vec![addr(3)]);
    }

    #[test]
    fn test_covered_target_adds_no_extra_forwarder() {
        // 2 is mandatory for 8; 9 is reachable via 2 or 3, so 2 covers it.
        let mut t = table();
        seed(
            &mut t,
            2,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 8), link(LinkStatus::Stable, 9)],
        );
        seed(
            &mut t,
            3,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 9)],
        );
        assert_eq!(t.elect_source_forwarders(), vec![addr(2)]);
    }

    #[test]
    fn test_relay_variant_skips_previous_hop_coverage() {
        // Relaying a message from 2: everything 2 reaches is hidden, so
        // only 9 (via 3) still needs a forwarder.
        let mut t = table();
        seed(
            &mut t,
            2,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 1), link(LinkStatus::Stable, 7)],
        );
        seed(
            &mut t,
            3,
            LinkStatus::Stable,
            vec![link(LinkStatus::Stable, 7), link(LinkStatus::Stable, 9)],
        );
        assert_eq!(t.elect_relay_forwarders(addr(2)), vec![addr(3)]);
    }

    #[test]
    fn test_none_status_neighbor_can_still_forward() {
        // A neighbor with status NONE is not hidden, so a target only it
        // reports gets it as (invalid-class) forwarder.
        let mut t = table();
        seed(
            &mut t,
            2,
            LinkStatus::None,
            vec![link(LinkStatus::Stable, 9)],
        );
        assert_eq!(t.elect_source_forwarders(), vec![addr(2)]);
    }
}
