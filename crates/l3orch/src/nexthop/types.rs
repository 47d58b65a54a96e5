//! Next-hop types.

use l3_hal::{NeighborEntry, RouterInterfaceOid, VirtualRouterOid};
use l3_types::{IpAddress, MacAddress};
use std::fmt;

/// The identity of a next-hop. At most one next-hop exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NextHopKey {
    pub vr: VirtualRouterOid,
    pub rif: RouterInterfaceOid,
    pub ip: IpAddress,
}

impl NextHopKey {
    pub fn new(vr: VirtualRouterOid, rif: RouterInterfaceOid, ip: IpAddress) -> Self {
        Self { vr, rif, ip }
    }

    /// The neighbor this next-hop resolves through.
    pub fn neighbor(&self) -> NeighborEntry {
        NeighborEntry::new(self.vr, self.ip)
    }
}

impl fmt::Display for NextHopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.ip, self.vr, self.rif)
    }
}

/// A programmed next-hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub key: NextHopKey,
    pub mac: MacAddress,
    /// `create_next_hop` calls not yet matched by `delete_next_hop`.
    pub owners: u32,
    /// Set while the RIF's port is down.
    pub if_down: bool,
}
