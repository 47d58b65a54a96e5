//! L3 forwarding-table orchestration.
//!
//! Maintains the routing state of a hardware switch (virtual routers,
//! router interfaces, neighbors, next-hops, ECMP groups and routes) and
//! keeps it consistent with the forwarding pipeline behind an
//! [`L3Backend`](l3_hal::L3Backend).
//!
//! ```text
//! control plane ──> [L3Orch] ──> VrOrch → RifOrch → NeighOrch
//!                      ↑                 → NextHopOrch → NhgOrch → RouteOrch
//! hw events ──> [EventQueue]                                 │
//!                                                            ↓
//!                                                      [L3Backend]
//! ```
//!
//! # Key Components
//!
//! - [`L3Orch`]: thread-safe facade with one lock per object class
//! - [`vr`], [`rif`]: virtual router and router interface registries
//! - [`neigh`]: neighbor (ARP/ND) bindings
//! - [`nexthop`]: deduplicated next-hops resolved from neighbors
//! - [`nhg`]: ECMP and weighted-ECMP groups with make-before-break updates
//! - [`route`]: prefix to next-hop or group bindings
//! - [`events`]: coalesced asynchronous hardware events
//!
//! Every object lives in an [`ObjectTable`](l3_orch_common::ObjectTable)
//! that tracks its liveness and references, so nothing still in use can be
//! deleted and a failed backend call leaves no trace.

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod list;
pub mod neigh;
pub mod nexthop;
pub mod nhg;
pub mod orch;
pub mod rif;
pub mod route;
pub mod vr;

pub use config::{ConfigError, L3OrchConfig};
pub use error::{ErrorKind, L3Error, L3Result};
pub use events::{spawn_event_pump, EventKey, HwEvent, ProcessedEvents};
pub use list::ListResult;
pub use neigh::{Neighbor, NeighborRequest, NeighborState};
pub use nexthop::{NextHop, NextHopKey};
pub use nhg::{GroupRequest, GroupState, NextHopGroup};
pub use orch::{L3Orch, L3OrchStats};
pub use rif::RifEntry;
pub use route::{Route, RouteRequest};
