//! The synchronous backend contract.

use crate::api::{
    GroupMember, NeighborAttribute, NeighborAttributes, NeighborEntry, NextHopAttribute,
    NextHopAttributes, NextHopGroupAttributes, RifAttribute, RifAttributes, RouteAttribute,
    RouteAttributes, RouteEntry, VrAttribute, VrAttributes,
};
use crate::error::HalResult;
use crate::types::{NextHopGroupOid, NextHopOid, RouterInterfaceOid, VirtualRouterOid};

/// Limits and optional features a backend reports at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Next-hop group slots.
    pub max_groups: u32,
    /// Member slots per group.
    pub max_group_members: u32,
    /// The backend can swap a group's whole member list in one call.
    pub atomic_group_replace: bool,
    pub resilient_hash: bool,
}

/// Programs forwarding objects into hardware.
///
/// Every call is blocking and bounded. A call that returns an error must not
/// have changed hardware state. Removing an object that does not exist
/// returns [`HalError::NotFound`](crate::HalError::NotFound).
pub trait L3Backend: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    fn create_virtual_router(&self, attrs: &VrAttributes) -> HalResult<VirtualRouterOid>;
    fn remove_virtual_router(&self, vr: VirtualRouterOid) -> HalResult<()>;
    fn set_virtual_router_attribute(&self, vr: VirtualRouterOid, attr: VrAttribute)
        -> HalResult<()>;

    fn create_router_interface(&self, attrs: &RifAttributes) -> HalResult<RouterInterfaceOid>;
    fn remove_router_interface(&self, rif: RouterInterfaceOid) -> HalResult<()>;
    fn set_router_interface_attribute(
        &self,
        rif: RouterInterfaceOid,
        attr: RifAttribute,
    ) -> HalResult<()>;

    fn create_neighbor(&self, entry: &NeighborEntry, attrs: &NeighborAttributes)
        -> HalResult<()>;
    fn remove_neighbor(&self, entry: &NeighborEntry) -> HalResult<()>;
    fn set_neighbor_attribute(&self, entry: &NeighborEntry, attr: NeighborAttribute)
        -> HalResult<()>;

    fn create_next_hop(&self, attrs: &NextHopAttributes) -> HalResult<NextHopOid>;
    fn remove_next_hop(&self, nh: NextHopOid) -> HalResult<()>;
    fn set_next_hop_attribute(&self, nh: NextHopOid, attr: NextHopAttribute) -> HalResult<()>;

    /// Creates a group with its full member list in one call.
    fn create_next_hop_group(&self, attrs: &NextHopGroupAttributes)
        -> HalResult<NextHopGroupOid>;
    fn remove_next_hop_group(&self, group: NextHopGroupOid) -> HalResult<()>;
    /// Swaps the whole member list atomically. Only valid when
    /// [`BackendCapabilities::atomic_group_replace`] is set.
    fn replace_group_members(
        &self,
        group: NextHopGroupOid,
        members: &[GroupMember],
    ) -> HalResult<()>;
    fn add_group_members(&self, group: NextHopGroupOid, members: &[GroupMember])
        -> HalResult<()>;
    fn remove_group_members(&self, group: NextHopGroupOid, members: &[NextHopOid])
        -> HalResult<()>;
    fn set_group_member_weight(
        &self,
        group: NextHopGroupOid,
        next_hop: NextHopOid,
        weight: u32,
    ) -> HalResult<()>;
    fn set_group_resilient_hash(&self, group: NextHopGroupOid, enabled: bool) -> HalResult<()>;
    fn get_group_members(&self, group: NextHopGroupOid) -> HalResult<Vec<GroupMember>>;

    fn create_route(&self, entry: &RouteEntry, attrs: &RouteAttributes) -> HalResult<()>;
    fn remove_route(&self, entry: &RouteEntry) -> HalResult<()>;
    fn set_route_attribute(&self, entry: &RouteEntry, attr: RouteAttribute) -> HalResult<()>;
}
