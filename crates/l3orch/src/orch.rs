//! The `L3Orch` facade.
//!
//! Owns one manager per object class, each behind its own lock. Operations
//! that span classes take the locks in the fixed order
//! VR → RIF → Neighbor → NextHop → Group → Route. The event queue has a
//! separate lock that is never held together with a class lock.

use std::sync::Arc;

use l3_hal::{
    AttachmentRegistry, BackendCapabilities, Egress, GroupMember, L3Backend, NeighborEntry,
    NextHopGroupOid, NextHopOid, RifAttribute, RifAttributes, RouteAttribute, RouteEntry,
    RouterInterfaceOid, VirtualRouterOid, VrAttribute, VrAttributes,
};
use l3_orch_common::EventQueue;
use l3_types::{IpAddress, MacAddress};
use log::{debug, info};
use parking_lot::Mutex;

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::L3OrchConfig;
use crate::error::{L3Error, L3Result};
use crate::events::{HwEvent, ProcessedEvents};
use crate::list::ListResult;
use crate::neigh::{NeighOrch, NeighOrchStats, Neighbor, NeighborRequest, NeighborState};
use crate::nexthop::{NextHop, NextHopOrch, NextHopOrchStats};
use crate::nhg::{GroupRequest, NextHopGroup, NhgOrch, NhgOrchStats};
use crate::rif::{RifEntry, RifOrch, RifOrchStats};
use crate::route::{Route, RouteOrch, RouteOrchStats, RouteRequest};
use crate::vr::{VrOrch, VrOrchStats};

/// Counters from every manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L3OrchStats {
    pub vr: VrOrchStats,
    pub rif: RifOrchStats,
    pub neighbor: NeighOrchStats,
    pub next_hop: NextHopOrchStats,
    pub group: NhgOrchStats,
    pub route: RouteOrchStats,
}

/// Thread-safe entry point to the L3 forwarding state.
pub struct L3Orch {
    config: L3OrchConfig,
    vrs: Mutex<VrOrch>,
    rifs: Mutex<RifOrch>,
    neighbors: Mutex<NeighOrch>,
    next_hops: Mutex<NextHopOrch>,
    groups: Mutex<NhgOrch>,
    routes: Mutex<RouteOrch>,
    events: Mutex<EventQueue<HwEvent>>,
}

impl std::fmt::Debug for L3Orch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L3Orch")
            .field("config", &self.config)
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

impl L3Orch {
    pub fn new(
        backend: Arc<dyn L3Backend>,
        registry: Arc<dyn AttachmentRegistry>,
        config: L3OrchConfig,
    ) -> L3Result<Self> {
        config
            .validate()
            .map_err(|e| L3Error::invalid(e.to_string()))?;

        let orch = Self {
            vrs: Mutex::new(VrOrch::new(backend.clone())),
            rifs: Mutex::new(RifOrch::new(backend.clone(), registry.clone())),
            neighbors: Mutex::new(NeighOrch::new(backend.clone(), registry)),
            next_hops: Mutex::new(NextHopOrch::new(backend.clone())),
            groups: Mutex::new(NhgOrch::new(backend.clone(), &config)),
            routes: Mutex::new(RouteOrch::new(backend, &config)),
            events: Mutex::new(EventQueue::new()),
            config,
        };

        let caps = orch.capabilities();
        info!("L3Orch: initialized");
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "L3Orch", "initialize")
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "max_groups": caps.max_groups,
                    "max_group_members": caps.max_group_members,
                    "atomic_group_replace": caps.atomic_group_replace,
                    "resilient_hash": caps.resilient_hash,
                    "normalize_weights": orch.config.normalize_weights,
                }))
        );
        Ok(orch)
    }

    pub fn config(&self) -> &L3OrchConfig {
        &self.config
    }

    /// Effective group limits and features.
    pub fn capabilities(&self) -> BackendCapabilities {
        self.groups.lock().capabilities()
    }

    pub fn stats(&self) -> L3OrchStats {
        L3OrchStats {
            vr: self.vrs.lock().stats().clone(),
            rif: self.rifs.lock().stats().clone(),
            neighbor: self.neighbors.lock().stats().clone(),
            next_hop: self.next_hops.lock().stats().clone(),
            group: self.groups.lock().stats().clone(),
            route: self.routes.lock().stats().clone(),
        }
    }

    // Virtual routers

    pub fn create_vr(&self, attrs: VrAttributes) -> L3Result<VirtualRouterOid> {
        self.vrs.lock().create_vr(attrs)
    }

    pub fn delete_vr(&self, vr: VirtualRouterOid) -> L3Result<()> {
        self.vrs.lock().delete_vr(vr)
    }

    pub fn set_vr_attribute(&self, vr: VirtualRouterOid, attr: VrAttribute) -> L3Result<()> {
        self.vrs.lock().set_vr_attribute(vr, attr)
    }

    pub fn get_vr(&self, vr: VirtualRouterOid) -> L3Result<VrAttributes> {
        self.vrs.lock().get_vr(vr)
    }

    // Router interfaces

    pub fn create_rif(&self, attrs: RifAttributes) -> L3Result<RouterInterfaceOid> {
        let mut vrs = self.vrs.lock();
        let mut rifs = self.rifs.lock();
        rifs.create_rif(&mut vrs, attrs)
    }

    pub fn delete_rif(&self, rif: RouterInterfaceOid) -> L3Result<()> {
        let mut vrs = self.vrs.lock();
        let mut rifs = self.rifs.lock();
        rifs.delete_rif(&mut vrs, rif)
    }

    pub fn set_rif_attribute(&self, rif: RouterInterfaceOid, attr: RifAttribute) -> L3Result<()> {
        self.rifs.lock().set_rif_attribute(rif, attr)
    }

    pub fn get_rif(&self, rif: RouterInterfaceOid) -> L3Result<RifEntry> {
        self.rifs.lock().get_rif(rif)
    }

    // Neighbors

    pub fn add_neighbor(&self, req: NeighborRequest) -> L3Result<()> {
        let vrs = self.vrs.lock();
        let mut rifs = self.rifs.lock();
        let mut neighbors = self.neighbors.lock();
        neighbors.add_neighbor(&vrs, &mut rifs, req)
    }

    pub fn update_neighbor(&self, req: NeighborRequest) -> L3Result<()> {
        let mut neighbors = self.neighbors.lock();
        let mut next_hops = self.next_hops.lock();
        neighbors.update_neighbor(&mut next_hops, req)
    }

    pub fn delete_neighbor(&self, entry: &NeighborEntry) -> L3Result<()> {
        let mut rifs = self.rifs.lock();
        let mut neighbors = self.neighbors.lock();
        neighbors.delete_neighbor(&mut rifs, entry)
    }

    pub fn get_neighbor(&self, entry: &NeighborEntry) -> L3Result<Neighbor> {
        self.neighbors.lock().get_neighbor(entry)
    }

    pub fn list_neighbors(
        &self,
        vr: Option<VirtualRouterOid>,
        buf: &mut [NeighborEntry],
    ) -> ListResult {
        self.neighbors.lock().list_neighbors(vr, buf)
    }

    // Next-hops

    pub fn create_next_hop(
        &self,
        vr: VirtualRouterOid,
        rif: RouterInterfaceOid,
        ip: IpAddress,
    ) -> L3Result<NextHopOid> {
        let vrs = self.vrs.lock();
        let mut rifs = self.rifs.lock();
        let mut neighbors = self.neighbors.lock();
        let mut next_hops = self.next_hops.lock();
        next_hops.create_next_hop(&vrs, &mut rifs, &mut neighbors, vr, rif, ip)
    }

    pub fn delete_next_hop(&self, nh: NextHopOid) -> L3Result<()> {
        let mut rifs = self.rifs.lock();
        let mut neighbors = self.neighbors.lock();
        let mut next_hops = self.next_hops.lock();
        next_hops.delete_next_hop(&mut rifs, &mut neighbors, nh)
    }

    pub fn force_delete_next_hop(&self, nh: NextHopOid) -> L3Result<()> {
        let mut rifs = self.rifs.lock();
        let mut neighbors = self.neighbors.lock();
        let mut next_hops = self.next_hops.lock();
        next_hops.force_delete_next_hop(&mut rifs, &mut neighbors, nh)
    }

    pub fn get_next_hop(&self, nh: NextHopOid) -> L3Result<NextHop> {
        self.next_hops.lock().get_next_hop(nh)
    }

    /// Owners plus group and route references. Zero once deleted.
    pub fn next_hop_ref_count(&self, nh: NextHopOid) -> u32 {
        self.next_hops.lock().ref_count(nh)
    }

    // Next-hop groups

    pub fn create_group(&self, req: GroupRequest) -> L3Result<NextHopGroupOid> {
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        groups.create_group(&mut next_hops, req)
    }

    pub fn replace_members(
        &self,
        group: NextHopGroupOid,
        members: Vec<GroupMember>,
    ) -> L3Result<()> {
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        groups.replace_members(&mut next_hops, group, members)
    }

    pub fn add_members(&self, group: NextHopGroupOid, members: Vec<GroupMember>) -> L3Result<()> {
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        groups.add_members(&mut next_hops, group, members)
    }

    pub fn remove_members(&self, group: NextHopGroupOid, members: &[NextHopOid]) -> L3Result<()> {
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        groups.remove_members(&mut next_hops, group, members)
    }

    pub fn delete_group(&self, group: NextHopGroupOid) -> L3Result<()> {
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        groups.delete_group(&mut next_hops, group)
    }

    pub fn set_group_resilient_hash(&self, group: NextHopGroupOid, enabled: bool) -> L3Result<()> {
        self.groups.lock().set_group_resilient_hash(group, enabled)
    }

    pub fn get_group(&self, group: NextHopGroupOid) -> L3Result<NextHopGroup> {
        self.groups.lock().get_group(group)
    }

    pub fn group_members(
        &self,
        group: NextHopGroupOid,
        buf: &mut [GroupMember],
    ) -> L3Result<ListResult> {
        self.groups.lock().group_members(group, buf)
    }

    // Routes

    pub fn add_route(&self, req: RouteRequest) -> L3Result<()> {
        let mut vrs = self.vrs.lock();
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        let mut routes = self.routes.lock();
        routes.add_route(&mut vrs, &mut next_hops, &mut groups, req)
    }

    pub fn delete_route(&self, entry: &RouteEntry) -> L3Result<()> {
        let mut vrs = self.vrs.lock();
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        let mut routes = self.routes.lock();
        routes.delete_route(&mut vrs, &mut next_hops, &mut groups, entry)
    }

    pub fn set_route_attribute(&self, entry: &RouteEntry, attr: RouteAttribute) -> L3Result<()> {
        let mut next_hops = self.next_hops.lock();
        let mut groups = self.groups.lock();
        let mut routes = self.routes.lock();
        routes.set_route_attribute(&mut next_hops, &mut groups, entry, attr)
    }

    pub fn get_route(&self, entry: &RouteEntry) -> L3Result<Route> {
        self.routes.lock().get_route(entry)
    }

    pub fn list_routes(&self, vr: Option<VirtualRouterOid>, buf: &mut [RouteEntry]) -> ListResult {
        self.routes.lock().list_routes(vr, buf)
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().route_count()
    }

    pub fn take_route_hit(&self, entry: &RouteEntry) -> L3Result<bool> {
        self.routes.lock().take_route_hit(entry)
    }

    // Hardware events

    /// Queues a hardware event. It takes effect on the next
    /// [`process_events`](Self::process_events).
    pub fn notify(&self, event: HwEvent) {
        self.events.lock().push(event);
    }

    pub fn pending_events(&self) -> usize {
        self.events.lock().len()
    }

    /// Applies up to `event_queue_batch` queued events.
    pub fn process_events(&self) -> ProcessedEvents {
        let batch = self.events.lock().pop_batch(self.config.event_queue_batch);
        let mut processed = ProcessedEvents::default();
        for event in batch {
            let result = self.apply_event(&event);
            let record = AuditRecord::new(AuditCategory::HardwareEvent, "L3Orch", event.kind())
                .with_object_id(event.subject());
            match result {
                Ok(()) => {
                    audit_log!(record.with_outcome(AuditOutcome::Success));
                    processed.applied += 1;
                }
                Err(e) => {
                    audit_log!(record.with_error(e.to_string()));
                    processed.failed.push((event, e));
                }
            }
        }
        processed
    }

    fn apply_event(&self, event: &HwEvent) -> L3Result<()> {
        match *event {
            HwEvent::NeighborLearned {
                vr,
                ip,
                rif,
                mac,
                egress,
            }
            | HwEvent::NeighborMoved {
                vr,
                ip,
                rif,
                mac,
                egress,
            } => self.learn_neighbor(vr, ip, rif, mac, egress),
            HwEvent::NeighborAged { vr, ip } => {
                let mut rifs = self.rifs.lock();
                let mut neighbors = self.neighbors.lock();
                let entry = NeighborEntry::new(vr, ip);
                if !neighbors.contains(&entry) {
                    debug!("L3Orch: aged neighbor {} already gone", entry);
                    return Ok(());
                }
                neighbors.delete_neighbor(&mut rifs, &entry)
            }
            HwEvent::LinkState { port, up } => {
                let mut rifs = self.rifs.lock();
                let mut next_hops = self.next_hops.lock();
                let affected = rifs.set_oper_state_for_port(port, up);
                let changed = next_hops.set_if_down_for_rifs(&affected, !up);
                info!(
                    "L3Orch: port {} {}, {} RIF(s) and {} next-hop(s) affected",
                    port,
                    if up { "up" } else { "down" },
                    affected.len(),
                    changed.len()
                );
                Ok(())
            }
            HwEvent::RouteHit { vr, prefix } => {
                let entry = RouteEntry::new(vr, prefix);
                if !self.routes.lock().mark_hit(&entry) {
                    debug!("L3Orch: hit on unknown route {}", entry);
                }
                Ok(())
            }
        }
    }

    /// Adds the neighbor, or updates it in place if it is already known.
    fn learn_neighbor(
        &self,
        vr: VirtualRouterOid,
        ip: IpAddress,
        rif: RouterInterfaceOid,
        mac: MacAddress,
        egress: Option<Egress>,
    ) -> L3Result<()> {
        let vrs = self.vrs.lock();
        let mut rifs = self.rifs.lock();
        let mut neighbors = self.neighbors.lock();
        let mut next_hops = self.next_hops.lock();

        let entry = NeighborEntry::new(vr, ip);
        match neighbors.get_neighbor(&entry) {
            Ok(existing) => {
                let mut req = NeighborRequest::new(vr, rif, ip)
                    .with_mac(mac)
                    .with_state(existing.state)
                    .with_action(existing.action);
                req.egress = egress;
                req.vlan = existing.vlan;
                neighbors.update_neighbor(&mut next_hops, req)
            }
            Err(_) => {
                let state = if ip.is_ipv6() && ip.is_link_local() {
                    NeighborState::NoHostRoute
                } else {
                    NeighborState::Normal
                };
                let mut req = NeighborRequest::new(vr, rif, ip)
                    .with_mac(mac)
                    .with_state(state);
                req.egress = egress;
                neighbors.add_neighbor(&vrs, &mut rifs, req)
            }
        }
    }
}
