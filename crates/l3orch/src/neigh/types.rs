//! Neighbor (ARP/ND) types.

use l3_hal::{
    Egress, NeighborAttributes, NeighborEntry, PacketAction, RouterInterfaceOid, VirtualRouterOid,
};
use l3_types::{IpAddress, MacAddress, VlanId};
use serde::Serialize;

/// Host-route programming mode of a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborState {
    /// Programmed into the host table once the MAC is known.
    #[default]
    Normal,
    /// Never programmed into the host table, but next-hops still resolve
    /// through it. Used for IPv6 link-local neighbors.
    NoHostRoute,
}

/// A neighbor binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub rif: RouterInterfaceOid,
    /// `None` while resolution is incomplete.
    pub mac: Option<MacAddress>,
    pub egress: Option<Egress>,
    pub vlan: Option<VlanId>,
    pub state: NeighborState,
    pub action: PacketAction,
}

impl Neighbor {
    /// Attributes to program, or `None` if the neighbor stays out of the
    /// host table.
    pub fn hw_attributes(&self) -> Option<NeighborAttributes> {
        if self.state != NeighborState::Normal {
            return None;
        }
        self.mac.map(|mac| NeighborAttributes {
            rif: self.rif,
            mac,
            egress: self.egress,
            vlan: self.vlan,
            action: self.action,
        })
    }

    pub fn is_programmed(&self) -> bool {
        self.state == NeighborState::Normal && self.mac.is_some()
    }
}

/// Request to add or update a neighbor.
///
/// ```
/// use l3orch::NeighborRequest;
/// use l3_hal::{RouterInterfaceOid, VirtualRouterOid};
///
/// let vr = VirtualRouterOid::from_raw(1).unwrap();
/// let rif = RouterInterfaceOid::from_raw(2).unwrap();
/// let req = NeighborRequest::new(vr, rif, "10.0.0.1".parse().unwrap())
///     .with_mac("00:11:22:33:44:55".parse().unwrap());
/// assert!(req.mac.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborRequest {
    pub vr: VirtualRouterOid,
    pub ip: IpAddress,
    pub rif: RouterInterfaceOid,
    pub mac: Option<MacAddress>,
    pub egress: Option<Egress>,
    pub vlan: Option<VlanId>,
    pub state: NeighborState,
    pub action: PacketAction,
}

impl NeighborRequest {
    pub fn new(vr: VirtualRouterOid, rif: RouterInterfaceOid, ip: IpAddress) -> Self {
        Self {
            vr,
            ip,
            rif,
            mac: None,
            egress: None,
            vlan: None,
            state: NeighborState::Normal,
            action: PacketAction::Forward,
        }
    }

    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn with_egress(mut self, egress: Egress) -> Self {
        self.egress = Some(egress);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn with_state(mut self, state: NeighborState) -> Self {
        self.state = state;
        self
    }

    pub fn with_action(mut self, action: PacketAction) -> Self {
        self.action = action;
        self
    }

    pub fn entry(&self) -> NeighborEntry {
        NeighborEntry::new(self.vr, self.ip)
    }

    pub(crate) fn to_neighbor(&self) -> Neighbor {
        Neighbor {
            rif: self.rif,
            mac: self.mac,
            egress: self.egress,
            vlan: self.vlan,
            state: self.state,
            action: self.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> NeighborRequest {
        NeighborRequest::new(
            VirtualRouterOid::from_raw(1).unwrap(),
            RouterInterfaceOid::from_raw(2).unwrap(),
            IpAddress::v4(10, 0, 0, 1),
        )
    }

    #[test]
    fn test_incomplete_neighbor_not_programmed() {
        let neighbor = request().to_neighbor();
        assert!(!neighbor.is_programmed());
        assert_eq!(neighbor.hw_attributes(), None);
    }

    #[test]
    fn test_no_host_route_not_programmed() {
        let mac: MacAddress = "00:aa:bb:cc:dd:ee".parse().unwrap();
        let neighbor = request()
            .with_mac(mac)
            .with_state(NeighborState::NoHostRoute)
            .to_neighbor();
        assert!(!neighbor.is_programmed());

        let neighbor = request().with_mac(mac).to_neighbor();
        let attrs = neighbor.hw_attributes().unwrap();
        assert_eq!(attrs.mac, mac);
        assert_eq!(attrs.action, PacketAction::Forward);
    }
}
