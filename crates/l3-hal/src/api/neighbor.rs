//! Neighbor (ARP/ND) entry attributes.

use super::PacketAction;
use crate::types::{LagOid, PortOid, RouterInterfaceOid, VirtualRouterOid};
use l3_types::{IpAddress, MacAddress, VlanId};
use std::fmt;

/// Hardware key of a neighbor entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeighborEntry {
    pub vr: VirtualRouterOid,
    pub ip: IpAddress,
}

impl NeighborEntry {
    pub fn new(vr: VirtualRouterOid, ip: IpAddress) -> Self {
        Self { vr, ip }
    }
}

impl fmt::Display for NeighborEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vr, self.ip)
    }
}

/// Physical egress of a neighbor: a single port or a LAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Egress {
    Port(PortOid),
    Lag(LagOid),
}

/// What the backend programs for a resolved neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAttributes {
    pub rif: RouterInterfaceOid,
    pub mac: MacAddress,
    pub egress: Option<Egress>,
    pub vlan: Option<VlanId>,
    pub action: PacketAction,
}

impl NeighborAttributes {
    pub fn apply(&mut self, attr: NeighborAttribute) {
        match attr {
            NeighborAttribute::Mac(mac) => self.mac = mac,
            NeighborAttribute::Egress(egress) => self.egress = egress,
            NeighborAttribute::Vlan(vlan) => self.vlan = vlan,
            NeighborAttribute::Action(action) => self.action = action,
        }
    }

    /// Attribute writes that turn `self` into `target`, in write order.
    pub fn diff(&self, target: &NeighborAttributes) -> Vec<NeighborAttribute> {
        let mut writes = Vec::new();
        if self.egress != target.egress {
            writes.push(NeighborAttribute::Egress(target.egress));
        }
        if self.vlan != target.vlan {
            writes.push(NeighborAttribute::Vlan(target.vlan));
        }
        if self.mac != target.mac {
            writes.push(NeighborAttribute::Mac(target.mac));
        }
        if self.action != target.action {
            writes.push(NeighborAttribute::Action(target.action));
        }
        writes
    }
}

/// A single neighbor attribute write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborAttribute {
    Mac(MacAddress),
    Egress(Option<Egress>),
    Vlan(Option<VlanId>),
    Action(PacketAction),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_diff_orders_mac_after_egress() {
        let rif = RouterInterfaceOid::from_raw(5).unwrap();
        let port = PortOid::from_raw(9).unwrap();
        let old = NeighborAttributes {
            rif,
            mac: MacAddress::new([2, 0, 0, 0, 0, 1]),
            egress: None,
            vlan: None,
            action: PacketAction::Forward,
        };
        let mut new = old.clone();
        new.mac = MacAddress::new([2, 0, 0, 0, 0, 2]);
        new.egress = Some(Egress::Port(port));

        let writes = old.diff(&new);
        assert_eq!(
            writes,
            vec![
                NeighborAttribute::Egress(Some(Egress::Port(port))),
                NeighborAttribute::Mac(MacAddress::new([2, 0, 0, 0, 0, 2])),
            ]
        );

        let mut replayed = old.clone();
        for write in writes {
            replayed.apply(write);
        }
        assert_eq!(replayed, new);
        assert!(new.diff(&new).is_empty());
    }
}
