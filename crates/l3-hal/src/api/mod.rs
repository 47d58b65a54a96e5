//! Attribute types for each hardware object class.
//!
//! - [`router`]: virtual routers and router interfaces
//! - [`neighbor`]: neighbor (ARP/ND) entries
//! - [`next_hop`]: next-hops and next-hop groups
//! - [`route`]: route entries

pub mod neighbor;
pub mod next_hop;
pub mod route;
pub mod router;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use neighbor::{Egress, NeighborAttribute, NeighborAttributes, NeighborEntry};
pub use next_hop::{
    GroupMember, GroupType, NextHopAttribute, NextHopAttributes, NextHopGroupAttributes,
};
pub use route::{RouteAttribute, RouteAttributes, RouteEntry, RouteFlags, RouteTarget};
pub use router::{
    RifAttachment, RifAttribute, RifAttributes, RifType, VrAttribute, VrAttributes, MIN_RIF_MTU,
};

/// What the pipeline does with a packet matching an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketAction {
    Drop,
    /// Punt to the CPU without forwarding.
    Trap,
    #[default]
    Forward,
    /// Forward and copy to the CPU.
    TrapForward,
}

impl fmt::Display for PacketAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketAction::Drop => "drop",
            PacketAction::Trap => "trap",
            PacketAction::Forward => "forward",
            PacketAction::TrapForward => "trap_forward",
        };
        f.write_str(s)
    }
}
