//! Link layer and flooding routing for a low-power wireless mesh.
//!
//! The stack is sans-IO and fully deterministic: every component runs
//! against a virtual clock, takes PHY confirmations through explicit
//! entry points, and reports upward through drained event outboxes. A
//! node embeds one [`RoutingProtocol`], which owns the MAC engine, the
//! neighbor table and the duplicate tracker:
//!
//! ```text
//!   application
//!        │ originate / events
//!   ┌────┴────────────────────────────────┐
//!   │ routing    beacons, forwarder       │
//!   │            election, freshness      │
//!   ├─────────────────────────────────────┤
//!   │ mac        CSMA/CA, retries, acks   │
//!   ├─────────────────────────────────────┤
//!   │ PhyPort    injected radio driver    │
//!   └─────────────────────────────────────┘
//! ```
//!
//! Flooded payloads are constrained: rather than rebroadcasting blindly,
//! each sender elects a minimal forwarder set from its two-hop topology
//! view and names it in the message, so only the elected nodes relay.
//! Topology is learned from periodic beacons scored by a link-quality
//! tracker over each neighbor's recent beacon history.
//!
//! [`sim`] provides a multi-node in-memory medium for whole-network
//! tests.

pub mod addr;
pub mod config;
pub mod error;
pub mod freshness;
pub mod lqi;
pub mod mac;
pub mod neighbor;
pub mod phy;
pub mod routing;
pub mod sim;
pub mod time;
pub mod wire;

pub use addr::NodeAddr;
pub use config::{MacConfig, RoutingConfig};
pub use error::{MacStatus, WireError};
pub use freshness::FreshnessTracker;
pub use lqi::LinkHistory;
pub use mac::{MacEngine, MacEvent, MacState};
pub use neighbor::{LinkClass, NeighborTable};
pub use phy::{CcaStatus, PhyPort, PhyTxStatus, TrxState, TrxStateConfirm};
pub use routing::{RoutingEvent, RoutingProtocol};
pub use time::{TimerHandle, TimerQueue, Timestamp};
