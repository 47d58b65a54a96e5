//! Neighbor/ARP manager.
//!
//! Tracks `(VR, IP) -> (MAC, egress, VLAN)` bindings. Next-hops resolve
//! through these bindings, so a neighbor cannot be deleted or lose its MAC
//! while a next-hop depends on it, and a MAC move is pushed to dependent
//! next-hops in place.

mod orch;
mod types;

pub use orch::{NeighOrch, NeighOrchStats};
pub use types::{Neighbor, NeighborRequest, NeighborState};
