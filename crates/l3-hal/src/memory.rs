//! In-memory backend.
//!
//! `MemoryBackend` keeps every programmed object in plain maps, enforces the
//! same referential checks a switch SDK would, records the order of calls and
//! can be told to fail specific operations. It backs the unit and
//! integration tests of the orchestration layer.

use crate::api::{
    GroupMember, NeighborAttribute, NeighborAttributes, NeighborEntry, NextHopAttribute,
    NextHopAttributes, NextHopGroupAttributes, RifAttribute, RifAttributes, RouteAttribute,
    RouteAttributes, RouteEntry, RouteTarget, VrAttribute, VrAttributes,
};
use crate::backend::{BackendCapabilities, L3Backend};
use crate::error::{HalError, HalResult};
use crate::types::{
    NextHopGroupOid, NextHopOid, ObjectId, ObjectKind, RouterInterfaceOid, VirtualRouterOid,
};
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// One backend entry point, used for call recording and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    CreateVirtualRouter,
    RemoveVirtualRouter,
    SetVirtualRouterAttribute,
    CreateRouterInterface,
    RemoveRouterInterface,
    SetRouterInterfaceAttribute,
    CreateNeighbor,
    RemoveNeighbor,
    SetNeighborAttribute,
    CreateNextHop,
    RemoveNextHop,
    SetNextHopAttribute,
    CreateNextHopGroup,
    RemoveNextHopGroup,
    ReplaceGroupMembers,
    AddGroupMembers,
    RemoveGroupMembers,
    SetGroupMemberWeight,
    SetGroupResilientHash,
    CreateRoute,
    RemoveRoute,
    SetRouteAttribute,
}

#[derive(Debug)]
struct Fault {
    error: HalError,
    /// `None` fails every call.
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    last_oid: u64,
    vrs: HashMap<VirtualRouterOid, VrAttributes>,
    rifs: HashMap<RouterInterfaceOid, RifAttributes>,
    neighbors: HashMap<NeighborEntry, NeighborAttributes>,
    next_hops: HashMap<NextHopOid, NextHopAttributes>,
    groups: HashMap<NextHopGroupOid, NextHopGroupAttributes>,
    routes: HashMap<RouteEntry, RouteAttributes>,
    faults: HashMap<BackendOp, Fault>,
    calls: Vec<BackendOp>,
}

impl State {
    fn enter(&mut self, op: BackendOp) -> HalResult<()> {
        self.calls.push(op);
        let Some(fault) = self.faults.get_mut(&op) else {
            return Ok(());
        };
        let error = fault.error.clone();
        let exhausted = match fault.remaining.as_mut() {
            None => false,
            Some(n) => {
                *n -= 1;
                *n == 0
            }
        };
        if exhausted {
            self.faults.remove(&op);
        }
        debug!("MemoryBackend: injected failure for {:?}: {}", op, error);
        Err(error)
    }

    fn allocate<K: ObjectKind>(&mut self) -> HalResult<ObjectId<K>> {
        self.last_oid += 1;
        ObjectId::from_raw(self.last_oid)
            .ok_or_else(|| HalError::table_full("object id space exhausted"))
    }

    fn target_exists(&self, target: &RouteTarget) -> bool {
        match target {
            RouteTarget::NextHop(nh) => self.next_hops.contains_key(nh),
            RouteTarget::Group(group) => self.groups.contains_key(group),
        }
    }

    fn check_members(&self, members: &[GroupMember]) -> HalResult<()> {
        let mut seen = HashSet::new();
        for member in members {
            if !self.next_hops.contains_key(&member.next_hop) {
                return Err(HalError::invalid_parameter(format!(
                    "unknown next-hop {}",
                    member.next_hop
                )));
            }
            if !seen.insert(member.next_hop) {
                return Err(HalError::invalid_parameter(format!(
                    "duplicate member {}",
                    member.next_hop
                )));
            }
        }
        Ok(())
    }
}

/// Backend that programs into memory.
#[derive(Debug)]
pub struct MemoryBackend {
    caps: BackendCapabilities,
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub const DEFAULT_CAPABILITIES: BackendCapabilities = BackendCapabilities {
        max_groups: 512,
        max_group_members: 64,
        atomic_group_replace: true,
        resilient_hash: true,
    };

    pub fn new() -> Self {
        Self::with_capabilities(Self::DEFAULT_CAPABILITIES)
    }

    pub fn with_capabilities(caps: BackendCapabilities) -> Self {
        Self {
            caps,
            state: Mutex::new(State::default()),
        }
    }

    /// Fails the next call to `op` with `error`.
    pub fn fail_next(&self, op: BackendOp, error: HalError) {
        self.fail_times(op, 1, error);
    }

    /// Fails the next `times` calls to `op`.
    pub fn fail_times(&self, op: BackendOp, times: u32, error: HalError) {
        if times == 0 {
            return;
        }
        self.state.lock().faults.insert(
            op,
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Fails every call to `op` until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, op: BackendOp, error: HalError) {
        self.state.lock().faults.insert(
            op,
            Fault {
                error,
                remaining: None,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Every call made so far, including failed ones, in order.
    pub fn calls(&self) -> Vec<BackendOp> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn vr(&self, vr: VirtualRouterOid) -> Option<VrAttributes> {
        self.state.lock().vrs.get(&vr).cloned()
    }

    pub fn rif(&self, rif: RouterInterfaceOid) -> Option<RifAttributes> {
        self.state.lock().rifs.get(&rif).cloned()
    }

    pub fn neighbor(&self, entry: &NeighborEntry) -> Option<NeighborAttributes> {
        self.state.lock().neighbors.get(entry).cloned()
    }

    pub fn next_hop(&self, nh: NextHopOid) -> Option<NextHopAttributes> {
        self.state.lock().next_hops.get(&nh).cloned()
    }

    pub fn group(&self, group: NextHopGroupOid) -> Option<NextHopGroupAttributes> {
        self.state.lock().groups.get(&group).cloned()
    }

    pub fn route(&self, entry: &RouteEntry) -> Option<RouteAttributes> {
        self.state.lock().routes.get(entry).cloned()
    }

    pub fn vr_count(&self) -> usize {
        self.state.lock().vrs.len()
    }

    pub fn rif_count(&self) -> usize {
        self.state.lock().rifs.len()
    }

    pub fn neighbor_count(&self) -> usize {
        self.state.lock().neighbors.len()
    }

    pub fn next_hop_count(&self) -> usize {
        self.state.lock().next_hops.len()
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().routes.len()
    }
}

impl L3Backend for MemoryBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.caps
    }

    fn create_virtual_router(&self, attrs: &VrAttributes) -> HalResult<VirtualRouterOid> {
        let mut state = self.state.lock();
        state.enter(BackendOp::CreateVirtualRouter)?;
        let vr = state.allocate()?;
        state.vrs.insert(vr, attrs.clone());
        Ok(vr)
    }

    fn remove_virtual_router(&self, vr: VirtualRouterOid) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveVirtualRouter)?;
        if !state.vrs.contains_key(&vr) {
            return Err(HalError::not_found(format!("virtual router {}", vr)));
        }
        let in_use = state.rifs.values().any(|rif| rif.vr == vr)
            || state.routes.keys().any(|route| route.vr == vr);
        if in_use {
            return Err(HalError::object_in_use(format!("virtual router {}", vr)));
        }
        state.vrs.remove(&vr);
        Ok(())
    }

    fn set_virtual_router_attribute(
        &self,
        vr: VirtualRouterOid,
        attr: VrAttribute,
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetVirtualRouterAttribute)?;
        let attrs = state
            .vrs
            .get_mut(&vr)
            .ok_or_else(|| HalError::not_found(format!("virtual router {}", vr)))?;
        attrs.apply(attr);
        Ok(())
    }

    fn create_router_interface(&self, attrs: &RifAttributes) -> HalResult<RouterInterfaceOid> {
        let mut state = self.state.lock();
        state.enter(BackendOp::CreateRouterInterface)?;
        if !state.vrs.contains_key(&attrs.vr) {
            return Err(HalError::invalid_parameter(format!(
                "unknown virtual router {}",
                attrs.vr
            )));
        }
        let rif = state.allocate()?;
        state.rifs.insert(rif, attrs.clone());
        Ok(rif)
    }

    fn remove_router_interface(&self, rif: RouterInterfaceOid) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveRouterInterface)?;
        if !state.rifs.contains_key(&rif) {
            return Err(HalError::not_found(format!("router interface {}", rif)));
        }
        let in_use = state.next_hops.values().any(|nh| nh.rif == rif)
            || state.neighbors.values().any(|neigh| neigh.rif == rif);
        if in_use {
            return Err(HalError::object_in_use(format!("router interface {}", rif)));
        }
        state.rifs.remove(&rif);
        Ok(())
    }

    fn set_router_interface_attribute(
        &self,
        rif: RouterInterfaceOid,
        attr: RifAttribute,
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetRouterInterfaceAttribute)?;
        let attrs = state
            .rifs
            .get_mut(&rif)
            .ok_or_else(|| HalError::not_found(format!("router interface {}", rif)))?;
        attrs.apply(attr);
        Ok(())
    }

    fn create_neighbor(
        &self,
        entry: &NeighborEntry,
        attrs: &NeighborAttributes,
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::CreateNeighbor)?;
        if state.neighbors.contains_key(entry) {
            return Err(HalError::already_exists(format!("neighbor {}", entry)));
        }
        if !state.rifs.contains_key(&attrs.rif) {
            return Err(HalError::invalid_parameter(format!(
                "unknown router interface {}",
                attrs.rif
            )));
        }
        state.neighbors.insert(*entry, attrs.clone());
        Ok(())
    }

    fn remove_neighbor(&self, entry: &NeighborEntry) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveNeighbor)?;
        state
            .neighbors
            .remove(entry)
            .map(|_| ())
            .ok_or_else(|| HalError::not_found(format!("neighbor {}", entry)))
    }

    fn set_neighbor_attribute(
        &self,
        entry: &NeighborEntry,
        attr: NeighborAttribute,
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetNeighborAttribute)?;
        let attrs = state
            .neighbors
            .get_mut(entry)
            .ok_or_else(|| HalError::not_found(format!("neighbor {}", entry)))?;
        attrs.apply(attr);
        Ok(())
    }

    fn create_next_hop(&self, attrs: &NextHopAttributes) -> HalResult<NextHopOid> {
        let mut state = self.state.lock();
        state.enter(BackendOp::CreateNextHop)?;
        if !state.rifs.contains_key(&attrs.rif) {
            return Err(HalError::invalid_parameter(format!(
                "unknown router interface {}",
                attrs.rif
            )));
        }
        let nh = state.allocate()?;
        state.next_hops.insert(nh, attrs.clone());
        Ok(nh)
    }

    fn remove_next_hop(&self, nh: NextHopOid) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveNextHop)?;
        if !state.next_hops.contains_key(&nh) {
            return Err(HalError::not_found(format!("next-hop {}", nh)));
        }
        let in_use = state
            .groups
            .values()
            .any(|group| group.members.iter().any(|m| m.next_hop == nh))
            || state
                .routes
                .values()
                .any(|route| route.target == RouteTarget::NextHop(nh));
        if in_use {
            return Err(HalError::object_in_use(format!("next-hop {}", nh)));
        }
        state.next_hops.remove(&nh);
        Ok(())
    }

    fn set_next_hop_attribute(&self, nh: NextHopOid, attr: NextHopAttribute) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetNextHopAttribute)?;
        let attrs = state
            .next_hops
            .get_mut(&nh)
            .ok_or_else(|| HalError::not_found(format!("next-hop {}", nh)))?;
        match attr {
            NextHopAttribute::DestinationMac(mac) => attrs.mac = mac,
        }
        Ok(())
    }

    fn create_next_hop_group(
        &self,
        attrs: &NextHopGroupAttributes,
    ) -> HalResult<NextHopGroupOid> {
        let mut state = self.state.lock();
        state.enter(BackendOp::CreateNextHopGroup)?;
        if state.groups.len() >= self.caps.max_groups as usize {
            return Err(HalError::table_full("next-hop group"));
        }
        if attrs.members.len() > self.caps.max_group_members as usize {
            return Err(HalError::table_full("next-hop group member"));
        }
        if attrs.resilient_hash && !self.caps.resilient_hash {
            return Err(HalError::not_supported("resilient hash"));
        }
        state.check_members(&attrs.members)?;
        let group = state.allocate()?;
        state.groups.insert(group, attrs.clone());
        Ok(group)
    }

    fn remove_next_hop_group(&self, group: NextHopGroupOid) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveNextHopGroup)?;
        if !state.groups.contains_key(&group) {
            return Err(HalError::not_found(format!("next-hop group {}", group)));
        }
        if state
            .routes
            .values()
            .any(|route| route.target == RouteTarget::Group(group))
        {
            return Err(HalError::object_in_use(format!("next-hop group {}", group)));
        }
        state.groups.remove(&group);
        Ok(())
    }

    fn replace_group_members(
        &self,
        group: NextHopGroupOid,
        members: &[GroupMember],
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::ReplaceGroupMembers)?;
        if !self.caps.atomic_group_replace {
            return Err(HalError::not_supported("atomic member replace"));
        }
        if members.len() > self.caps.max_group_members as usize {
            return Err(HalError::table_full("next-hop group member"));
        }
        state.check_members(members)?;
        let attrs = state
            .groups
            .get_mut(&group)
            .ok_or_else(|| HalError::not_found(format!("next-hop group {}", group)))?;
        attrs.members = members.to_vec();
        Ok(())
    }

    fn add_group_members(
        &self,
        group: NextHopGroupOid,
        members: &[GroupMember],
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::AddGroupMembers)?;
        state.check_members(members)?;
        let max = self.caps.max_group_members as usize;
        let attrs = state
            .groups
            .get_mut(&group)
            .ok_or_else(|| HalError::not_found(format!("next-hop group {}", group)))?;
        if attrs.members.len() + members.len() > max {
            return Err(HalError::table_full("next-hop group member"));
        }
        if let Some(dup) = members
            .iter()
            .find(|m| attrs.members.iter().any(|e| e.next_hop == m.next_hop))
        {
            return Err(HalError::already_exists(format!(
                "member {} of group {}",
                dup.next_hop, group
            )));
        }
        attrs.members.extend_from_slice(members);
        Ok(())
    }

    fn remove_group_members(
        &self,
        group: NextHopGroupOid,
        members: &[NextHopOid],
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveGroupMembers)?;
        let attrs = state
            .groups
            .get_mut(&group)
            .ok_or_else(|| HalError::not_found(format!("next-hop group {}", group)))?;
        if let Some(missing) = members
            .iter()
            .find(|nh| !attrs.members.iter().any(|m| m.next_hop == **nh))
        {
            return Err(HalError::not_found(format!(
                "member {} of group {}",
                missing, group
            )));
        }
        attrs.members.retain(|m| !members.contains(&m.next_hop));
        Ok(())
    }

    fn set_group_member_weight(
        &self,
        group: NextHopGroupOid,
        next_hop: NextHopOid,
        weight: u32,
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetGroupMemberWeight)?;
        let member = state
            .groups
            .get_mut(&group)
            .and_then(|attrs| attrs.members.iter_mut().find(|m| m.next_hop == next_hop))
            .ok_or_else(|| {
                HalError::not_found(format!("member {} of group {}", next_hop, group))
            })?;
        member.weight = weight;
        Ok(())
    }

    fn set_group_resilient_hash(&self, group: NextHopGroupOid, enabled: bool) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetGroupResilientHash)?;
        if enabled && !self.caps.resilient_hash {
            return Err(HalError::not_supported("resilient hash"));
        }
        let attrs = state
            .groups
            .get_mut(&group)
            .ok_or_else(|| HalError::not_found(format!("next-hop group {}", group)))?;
        attrs.resilient_hash = enabled;
        Ok(())
    }

    fn get_group_members(&self, group: NextHopGroupOid) -> HalResult<Vec<GroupMember>> {
        self.state
            .lock()
            .groups
            .get(&group)
            .map(|attrs| attrs.members.clone())
            .ok_or_else(|| HalError::not_found(format!("next-hop group {}", group)))
    }

    fn create_route(&self, entry: &RouteEntry, attrs: &RouteAttributes) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::CreateRoute)?;
        if state.routes.contains_key(entry) {
            return Err(HalError::already_exists(format!("route {}", entry)));
        }
        if !state.vrs.contains_key(&entry.vr) {
            return Err(HalError::invalid_parameter(format!(
                "unknown virtual router {}",
                entry.vr
            )));
        }
        if !state.target_exists(&attrs.target) {
            return Err(HalError::invalid_parameter(format!(
                "unknown route target {}",
                attrs.target
            )));
        }
        state.routes.insert(*entry, attrs.clone());
        Ok(())
    }

    fn remove_route(&self, entry: &RouteEntry) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::RemoveRoute)?;
        state
            .routes
            .remove(entry)
            .map(|_| ())
            .ok_or_else(|| HalError::not_found(format!("route {}", entry)))
    }

    fn set_route_attribute(&self, entry: &RouteEntry, attr: RouteAttribute) -> HalResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::SetRouteAttribute)?;
        if let RouteAttribute::Target(target) = &attr {
            if !state.target_exists(target) {
                return Err(HalError::invalid_parameter(format!(
                    "unknown route target {}",
                    target
                )));
            }
        }
        let attrs = state
            .routes
            .get_mut(entry)
            .ok_or_else(|| HalError::not_found(format!("route {}", entry)))?;
        attrs.apply(attr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GroupType, PacketAction, RifAttachment, RouteFlags};
    use crate::types::PortOid;
    use l3_types::{IpAddress, MacAddress};
    use pretty_assertions::assert_eq;

    fn with_next_hops(backend: &MemoryBackend, count: u8) -> Vec<NextHopOid> {
        let vr = backend
            .create_virtual_router(&VrAttributes::default())
            .unwrap();
        let port = PortOid::from_raw(0x100).unwrap();
        let rif = backend
            .create_router_interface(&RifAttributes::new(vr, RifAttachment::Port(port)))
            .unwrap();
        (1..=count)
            .map(|i| {
                backend
                    .create_next_hop(&NextHopAttributes {
                        rif,
                        ip: IpAddress::v4(10, 0, 0, i),
                        mac: MacAddress::new([2, 0, 0, 0, 0, i]),
                    })
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_injected_failure_is_one_shot_and_recorded() {
        let backend = MemoryBackend::new();
        backend.fail_next(BackendOp::CreateVirtualRouter, HalError::table_full("vr"));

        assert!(backend.create_virtual_router(&VrAttributes::default()).is_err());
        assert_eq!(backend.vr_count(), 0);
        assert!(backend.create_virtual_router(&VrAttributes::default()).is_ok());
        assert_eq!(
            backend.calls(),
            vec![BackendOp::CreateVirtualRouter, BackendOp::CreateVirtualRouter]
        );
    }

    #[test]
    fn test_fail_always_until_cleared() {
        let backend = MemoryBackend::new();
        backend.fail_always(BackendOp::CreateVirtualRouter, HalError::timeout("create"));
        for _ in 0..3 {
            assert!(backend.create_virtual_router(&VrAttributes::default()).is_err());
        }
        backend.clear_faults();
        assert!(backend.create_virtual_router(&VrAttributes::default()).is_ok());
    }

    #[test]
    fn test_group_limits() {
        let backend = MemoryBackend::with_capabilities(BackendCapabilities {
            max_groups: 1,
            max_group_members: 2,
            atomic_group_replace: false,
            resilient_hash: false,
        });
        let nhs = with_next_hops(&backend, 3);
        let members: Vec<GroupMember> = nhs.iter().map(|nh| GroupMember::equal(*nh)).collect();

        let too_many = NextHopGroupAttributes {
            group_type: GroupType::Ecmp,
            resilient_hash: false,
            members: members.clone(),
        };
        assert!(matches!(
            backend.create_next_hop_group(&too_many),
            Err(HalError::TableFull { .. })
        ));

        let resilient = NextHopGroupAttributes {
            resilient_hash: true,
            members: members[..1].to_vec(),
            ..too_many.clone()
        };
        assert!(matches!(
            backend.create_next_hop_group(&resilient),
            Err(HalError::NotSupported { .. })
        ));

        let ok = NextHopGroupAttributes {
            members: members[..2].to_vec(),
            ..too_many
        };
        let group = backend.create_next_hop_group(&ok).unwrap();
        assert!(matches!(
            backend.create_next_hop_group(&ok),
            Err(HalError::TableFull { .. })
        ));
        assert!(matches!(
            backend.replace_group_members(group, &members[..1]),
            Err(HalError::NotSupported { .. })
        ));
    }

    #[test]
    fn test_incremental_member_updates() {
        let backend = MemoryBackend::new();
        let nhs = with_next_hops(&backend, 3);
        let group = backend
            .create_next_hop_group(&NextHopGroupAttributes {
                group_type: GroupType::WeightedEcmp,
                resilient_hash: false,
                members: vec![GroupMember::new(nhs[0], 1)],
            })
            .unwrap();

        backend
            .add_group_members(group, &[GroupMember::new(nhs[1], 3)])
            .unwrap();
        assert!(backend
            .add_group_members(group, &[GroupMember::new(nhs[1], 3)])
            .is_err());
        backend.set_group_member_weight(group, nhs[0], 2).unwrap();
        backend.remove_group_members(group, &[nhs[1]]).unwrap();
        assert!(backend.remove_group_members(group, &[nhs[2]]).is_err());

        assert_eq!(
            backend.get_group_members(group).unwrap(),
            vec![GroupMember::new(nhs[0], 2)]
        );
    }

    #[test]
    fn test_retarget_refreshes_route_flags() {
        let backend = MemoryBackend::new();
        let nhs = with_next_hops(&backend, 1);
        let vr = backend.rif(backend.next_hop(nhs[0]).unwrap().rif).unwrap().vr;
        let group = backend
            .create_next_hop_group(&NextHopGroupAttributes {
                group_type: GroupType::Ecmp,
                resilient_hash: false,
                members: vec![GroupMember::equal(nhs[0])],
            })
            .unwrap();
        let entry = RouteEntry::new(vr, "0.0.0.0/0".parse().unwrap());
        backend
            .create_route(
                &entry,
                &RouteAttributes {
                    target: RouteTarget::NextHop(nhs[0]),
                    action: PacketAction::Forward,
                    trap_priority: None,
                    priority: 0,
                    mpls_label: None,
                    lookup_class: None,
                    flags: RouteFlags::DEFAULT | RouteFlags::NEXT_HOP_ID,
                },
            )
            .unwrap();

        backend
            .set_route_attribute(&entry, RouteAttribute::Target(RouteTarget::Group(group)))
            .unwrap();
        assert_eq!(
            backend.route(&entry).unwrap().flags,
            RouteFlags::DEFAULT | RouteFlags::ECMP
        );
    }

    #[test]
    fn test_referenced_objects_cannot_be_removed() {
        let backend = MemoryBackend::new();
        let nhs = with_next_hops(&backend, 1);
        let vr = backend.rif(backend.next_hop(nhs[0]).unwrap().rif).unwrap().vr;
        let entry = RouteEntry::new(vr, "10.1.0.0/16".parse().unwrap());
        backend
            .create_route(
                &entry,
                &RouteAttributes {
                    target: RouteTarget::NextHop(nhs[0]),
                    action: PacketAction::Forward,
                    trap_priority: None,
                    priority: 0,
                    mpls_label: None,
                    lookup_class: None,
                    flags: RouteFlags::NEXT_HOP_ID,
                },
            )
            .unwrap();

        assert!(matches!(
            backend.remove_next_hop(nhs[0]),
            Err(HalError::ObjectInUse { .. })
        ));
        assert!(matches!(
            backend.remove_virtual_router(vr),
            Err(HalError::ObjectInUse { .. })
        ));
        backend.remove_route(&entry).unwrap();
        assert!(backend.remove_route(&entry).unwrap_err().is_not_found());
        backend.remove_next_hop(nhs[0]).unwrap();
        assert!(backend.remove_next_hop(nhs[0]).unwrap_err().is_not_found());
    }
}
