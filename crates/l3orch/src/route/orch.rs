//! RouteOrch implementation.
//!
//! Binds `(vr, prefix)` keys to a single next-hop or a next-hop group. A
//! route holds a reference on its target and on its VR for as long as it is
//! installed, so neither can be deleted out from under it.

use std::sync::Arc;

use l3_hal::{
    L3Backend, PacketAction, RouteAttribute, RouteAttributes, RouteEntry, RouteFlags, RouteTarget,
    VirtualRouterOid,
};
use l3_orch_common::ObjectTable;
use log::{debug, info, warn};

use super::types::{check_mpls_label, derive_flags, Route, RouteRequest};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::L3OrchConfig;
use crate::error::{L3Error, L3Result};
use crate::list::{fill, ListResult};
use crate::nexthop::NextHopOrch;
use crate::nhg::NhgOrch;
use crate::vr::VrOrch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOrchStats {
    pub routes_added: u64,
    pub routes_removed: u64,
    pub routes_updated: u64,
    pub retargets: u64,
}

pub struct RouteOrch {
    backend: Arc<dyn L3Backend>,
    default_action: PacketAction,
    table: ObjectTable<RouteEntry, Route>,
    stats: RouteOrchStats,
}

impl std::fmt::Debug for RouteOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteOrch")
            .field("route_count", &self.table.len())
            .field("default_action", &self.default_action)
            .field("stats", &self.stats)
            .finish()
    }
}

fn retain_target(
    next_hops: &mut NextHopOrch,
    groups: &mut NhgOrch,
    target: RouteTarget,
) -> L3Result<()> {
    match target {
        RouteTarget::NextHop(nh) => next_hops.retain(nh),
        RouteTarget::Group(group) => groups.retain(group),
    }
}

fn release_target(
    next_hops: &mut NextHopOrch,
    groups: &mut NhgOrch,
    target: RouteTarget,
) -> L3Result<()> {
    match target {
        RouteTarget::NextHop(nh) => next_hops.release(nh),
        RouteTarget::Group(group) => groups.release(group),
    }
}

impl RouteOrch {
    pub fn new(backend: Arc<dyn L3Backend>, config: &L3OrchConfig) -> Self {
        Self {
            backend,
            default_action: config.default_route_action,
            table: ObjectTable::new("route"),
            stats: RouteOrchStats::default(),
        }
    }

    pub fn stats(&self) -> &RouteOrchStats {
        &self.stats
    }

    pub fn route_count(&self) -> usize {
        self.table.len()
    }

    pub fn has_route(&self, entry: &RouteEntry) -> bool {
        self.table.is_live(entry)
    }

    pub fn get_route(&self, entry: &RouteEntry) -> L3Result<Route> {
        self.table
            .get(entry)
            .cloned()
            .ok_or_else(|| L3Error::not_found(format!("route {}", entry)))
    }

    /// Lists route keys in key order, optionally within one VR.
    pub fn list_routes(&self, vr: Option<VirtualRouterOid>, buf: &mut [RouteEntry]) -> ListResult {
        fill(
            buf,
            self.table
                .iter()
                .map(|(entry, _)| *entry)
                .filter(|entry| vr.map_or(true, |vr| entry.vr == vr)),
        )
    }

    pub fn add_route(
        &mut self,
        vrs: &mut VrOrch,
        next_hops: &mut NextHopOrch,
        groups: &mut NhgOrch,
        req: RouteRequest,
    ) -> L3Result<()> {
        let entry = req.entry();
        let result = self.try_add_route(vrs, next_hops, groups, &req);
        match &result {
            Ok(attrs) => {
                self.stats.routes_added += 1;
                info!("RouteOrch: added route {} -> {}", entry, attrs.target);
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceCreate, "RouteOrch", "add_route")
                        .with_outcome(AuditOutcome::Success)
                        .with_object_id(entry.to_string())
                        .with_object_type("route")
                        .with_details(serde_json::json!({
                            "target": attrs.target.to_string(),
                            "action": attrs.action.to_string(),
                            "flags": attrs.flags.bits(),
                        }))
                );
            }
            Err(e) => {
                warn!("RouteOrch: add_route {} failed: {}", entry, e);
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceCreate, "RouteOrch", "add_route")
                        .with_object_id(entry.to_string())
                        .with_object_type("route")
                        .with_error(e.to_string())
                );
            }
        }
        result.map(|_| ())
    }

    fn try_add_route(
        &mut self,
        vrs: &mut VrOrch,
        next_hops: &mut NextHopOrch,
        groups: &mut NhgOrch,
        req: &RouteRequest,
    ) -> L3Result<RouteAttributes> {
        let target = req.target()?;
        if !vrs.is_live(req.vr) {
            return Err(L3Error::not_found(format!("virtual router {}", req.vr)));
        }
        let entry = req.entry();
        if self.table.is_live(&entry) {
            return Err(L3Error::AlreadyExists(format!("route {}", entry)));
        }
        check_mpls_label(req.mpls_label)?;

        let mut attrs = RouteAttributes {
            target,
            action: req.action.unwrap_or(self.default_action),
            trap_priority: req.trap_priority,
            priority: req.priority,
            mpls_label: req.mpls_label,
            lookup_class: req.lookup_class,
            flags: RouteFlags::empty(),
        };
        attrs.flags = derive_flags(&entry.prefix, &attrs, req.terminated);

        retain_target(next_hops, groups, target)?;
        if let Err(e) = vrs.retain(req.vr) {
            release_target(next_hops, groups, target)?;
            return Err(e);
        }

        let backend = &self.backend;
        let result = self.table.insert_with(entry, |entry| {
            backend.create_route(entry, &attrs)?;
            Ok::<_, L3Error>(Route {
                attrs: attrs.clone(),
                hit: false,
            })
        });
        if let Err(e) = result {
            vrs.release(req.vr)?;
            release_target(next_hops, groups, target)?;
            return Err(e);
        }
        Ok(attrs)
    }

    pub fn delete_route(
        &mut self,
        vrs: &mut VrOrch,
        next_hops: &mut NextHopOrch,
        groups: &mut NhgOrch,
        entry: &RouteEntry,
    ) -> L3Result<()> {
        if !self.table.is_live(entry) {
            return Err(L3Error::not_found(format!("route {}", entry)));
        }

        if let Err(e) = self.backend.remove_route(entry) {
            let err = L3Error::from(e);
            warn!("RouteOrch: failed to remove route {}: {}", entry, err);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "RouteOrch", "delete_route")
                    .with_object_id(entry.to_string())
                    .with_object_type("route")
                    .with_error(err.to_string())
            );
            return Err(err);
        }

        self.table.release(entry)?;
        let route = self.table.retire(entry)?;
        release_target(next_hops, groups, route.attrs.target)?;
        vrs.release(entry.vr)?;
        self.stats.routes_removed += 1;

        info!("RouteOrch: removed route {}", entry);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "RouteOrch", "delete_route")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(entry.to_string())
                .with_object_type("route")
                .with_details(serde_json::json!({ "target": route.attrs.target.to_string() }))
        );
        Ok(())
    }

    /// Changes one attribute of an installed route in place.
    ///
    /// A new target is retained before the write and the old one released
    /// after it.
    pub fn set_route_attribute(
        &mut self,
        next_hops: &mut NextHopOrch,
        groups: &mut NhgOrch,
        entry: &RouteEntry,
        attr: RouteAttribute,
    ) -> L3Result<()> {
        let current = self.get_route(entry)?.attrs;

        let retarget = match attr {
            RouteAttribute::MplsLabel(label) => {
                check_mpls_label(label)?;
                None
            }
            RouteAttribute::Target(target) if target == current.target => {
                debug!("RouteOrch: route {} already targets {}", entry, target);
                return Ok(());
            }
            RouteAttribute::Target(target) => {
                retain_target(next_hops, groups, target)?;
                Some(target)
            }
            _ => None,
        };

        if let Err(e) = self.backend.set_route_attribute(entry, attr) {
            let err = L3Error::from(e);
            if let Some(target) = retarget {
                release_target(next_hops, groups, target)?;
            }
            warn!("RouteOrch: failed to update route {}: {}", entry, err);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceModify, "RouteOrch", "set_route_attribute")
                    .with_object_id(entry.to_string())
                    .with_object_type("route")
                    .with_error(err.to_string())
                    .with_details(serde_json::json!({ "attribute": format!("{:?}", attr) }))
            );
            return Err(err);
        }

        if let Some(route) = self.table.get_mut(entry) {
            let terminated = route.attrs.flags.contains(RouteFlags::TERMINATED);
            route.attrs.apply(attr);
            route.attrs.flags = derive_flags(&entry.prefix, &route.attrs, terminated);
        }
        if retarget.is_some() {
            release_target(next_hops, groups, current.target)?;
            self.stats.retargets += 1;
        }
        self.stats.routes_updated += 1;

        debug!("RouteOrch: updated route {} with {:?}", entry, attr);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "RouteOrch", "set_route_attribute")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(entry.to_string())
                .with_object_type("route")
                .with_details(serde_json::json!({ "attribute": format!("{:?}", attr) }))
        );
        Ok(())
    }

    /// Records a hardware hit. Returns false for unknown routes.
    pub(crate) fn mark_hit(&mut self, entry: &RouteEntry) -> bool {
        match self.table.get_mut(entry) {
            Some(route) => {
                route.hit = true;
                true
            }
            None => false,
        }
    }

    /// Reads and clears the hit bit.
    pub fn take_route_hit(&mut self, entry: &RouteEntry) -> L3Result<bool> {
        let route = self
            .table
            .get_mut(entry)
            .ok_or_else(|| L3Error::not_found(format!("route {}", entry)))?;
        Ok(std::mem::take(&mut route.hit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neigh::{NeighOrch, NeighborRequest};
    use crate::nhg::GroupRequest;
    use crate::rif::RifOrch;
    use l3_hal::{
        BackendOp, HalError, MemoryBackend, MemoryRegistry, NextHopOid, PortOid, RifAttachment,
        RifAttributes, VrAttributes,
    };
    use l3_types::{IpAddress, IpPrefix, MacAddress};
    use pretty_assertions::assert_eq;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        vrs: VrOrch,
        next_hops: NextHopOrch,
        groups: NhgOrch,
        routes: RouteOrch,
        vr: VirtualRouterOid,
        nhs: Vec<NextHopOid>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let registry = Arc::new(MemoryRegistry::new());
        let port = PortOid::from_raw(0x5).unwrap();
        registry.add_port(port);
        let config = L3OrchConfig::default();

        let mut vrs = VrOrch::new(backend.clone());
        let mut rifs = RifOrch::new(backend.clone(), registry.clone());
        let mut neighbors = NeighOrch::new(backend.clone(), registry);
        let mut next_hops = NextHopOrch::new(backend.clone());
        let vr = vrs.create_vr(VrAttributes::default()).unwrap();
        let rif = rifs
            .create_rif(&mut vrs, RifAttributes::new(vr, RifAttachment::Port(port)))
            .unwrap();

        let mut nhs = Vec::new();
        for host in 1..=2u8 {
            let ip = IpAddress::v4(10, 0, 0, host);
            neighbors
                .add_neighbor(
                    &vrs,
                    &mut rifs,
                    NeighborRequest::new(vr, rif, ip)
                        .with_mac(MacAddress::new([0x00, 0xaa, 0, 0, 0, host])),
                )
                .unwrap();
            nhs.push(
                next_hops
                    .create_next_hop(&vrs, &mut rifs, &mut neighbors, vr, rif, ip)
                    .unwrap(),
            );
        }

        Fixture {
            groups: NhgOrch::new(backend.clone(), &config),
            routes: RouteOrch::new(backend.clone(), &config),
            backend,
            vrs,
            next_hops,
            vr,
            nhs,
        }
    }

    fn prefix(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    impl Fixture {
        fn add(&mut self, req: RouteRequest) -> L3Result<()> {
            self.routes
                .add_route(&mut self.vrs, &mut self.next_hops, &mut self.groups, req)
        }

        fn delete(&mut self, entry: &RouteEntry) -> L3Result<()> {
            self.routes
                .delete_route(&mut self.vrs, &mut self.next_hops, &mut self.groups, entry)
        }
    }

    #[test]
    fn test_add_route_retains_target_and_vr() {
        let mut f = fixture();
        let req = RouteRequest::new(f.vr, prefix("192.168.0.0/16")).via_next_hop(f.nhs[0]);
        let entry = req.entry();
        f.add(req).unwrap();

        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 2);
        let route = f.routes.get_route(&entry).unwrap();
        assert_eq!(route.attrs.action, PacketAction::Forward);
        assert_eq!(route.attrs.flags, RouteFlags::NEXT_HOP_ID);
        assert_eq!(f.backend.route(&entry), Some(route.attrs));

        f.delete(&entry).unwrap();
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
        assert!(matches!(f.delete(&entry), Err(L3Error::NotFound(_))));
    }

    #[test]
    fn test_target_must_be_exclusive() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        let both = RouteRequest::new(f.vr, prefix("10.1.0.0/16"))
            .via_next_hop(f.nhs[1])
            .via_group(group);
        assert!(matches!(f.add(both), Err(L3Error::InvalidArgument(_))));
        let neither = RouteRequest::new(f.vr, prefix("10.1.0.0/16"));
        assert!(matches!(f.add(neither), Err(L3Error::InvalidArgument(_))));
        assert_eq!(f.routes.route_count(), 0);
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 1);
        assert_eq!(f.groups.ref_count(group), 1);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut f = fixture();
        let req = RouteRequest::new(f.vr, prefix("10.2.0.0/16")).via_next_hop(f.nhs[0]);
        f.add(req.clone()).unwrap();
        let dup = req.clone().via_next_hop(f.nhs[1]);
        assert!(matches!(f.add(dup), Err(L3Error::AlreadyExists(_))));
        assert_eq!(
            f.routes.get_route(&req.entry()).unwrap().attrs.target,
            RouteTarget::NextHop(f.nhs[0])
        );
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 1);
    }

    #[test]
    fn test_backend_failure_rolls_back() {
        let mut f = fixture();
        f.backend
            .fail_next(BackendOp::CreateRoute, HalError::table_full("route"));
        let req = RouteRequest::new(f.vr, prefix("10.3.0.0/16")).via_next_hop(f.nhs[0]);
        assert!(matches!(f.add(req), Err(L3Error::Backend(_))));
        assert_eq!(f.routes.route_count(), 0);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
        assert_eq!(f.vrs.ref_count(f.vr), 2);
    }

    #[test]
    fn test_invalid_mpls_label() {
        let mut f = fixture();
        let req = RouteRequest::new(f.vr, prefix("10.4.0.0/16"))
            .via_next_hop(f.nhs[0])
            .with_mpls_label(0x10_0000);
        assert!(matches!(f.add(req), Err(L3Error::InvalidArgument(_))));
    }

    #[test]
    fn test_retarget_in_place() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp(f.nhs.clone()))
            .unwrap();
        let req = RouteRequest::new(f.vr, prefix("0.0.0.0/0")).via_next_hop(f.nhs[0]);
        let entry = req.entry();
        f.add(req).unwrap();
        f.backend.clear_calls();

        f.routes
            .set_route_attribute(
                &mut f.next_hops,
                &mut f.groups,
                &entry,
                RouteAttribute::Target(RouteTarget::Group(group)),
            )
            .unwrap();

        assert_eq!(f.backend.calls(), vec![BackendOp::SetRouteAttribute]);
        let route = f.routes.get_route(&entry).unwrap();
        assert_eq!(route.attrs.target, RouteTarget::Group(group));
        assert_eq!(route.attrs.flags, RouteFlags::DEFAULT | RouteFlags::ECMP);
        assert_eq!(f.groups.ref_count(group), 2);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 2);
        assert!(matches!(
            f.groups.delete_group(&mut f.next_hops, group),
            Err(L3Error::ResourceInUse(_))
        ));
    }

    #[test]
    fn test_failed_retarget_keeps_old_target() {
        let mut f = fixture();
        let req = RouteRequest::new(f.vr, prefix("10.5.0.0/16")).via_next_hop(f.nhs[0]);
        let entry = req.entry();
        f.add(req).unwrap();
        f.backend
            .fail_next(BackendOp::SetRouteAttribute, HalError::timeout("set"));

        let err = f
            .routes
            .set_route_attribute(
                &mut f.next_hops,
                &mut f.groups,
                &entry,
                RouteAttribute::Target(RouteTarget::NextHop(f.nhs[1])),
            )
            .unwrap_err();
        assert!(matches!(err, L3Error::Backend(_)));
        assert_eq!(
            f.routes.get_route(&entry).unwrap().attrs.target,
            RouteTarget::NextHop(f.nhs[0])
        );
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 1);
    }

    #[test]
    fn test_packet_action_flag() {
        let mut f = fixture();
        let req = RouteRequest::new(f.vr, prefix("10.6.0.0/16"))
            .via_next_hop(f.nhs[0])
            .terminated();
        let entry = req.entry();
        f.add(req).unwrap();

        f.routes
            .set_route_attribute(
                &mut f.next_hops,
                &mut f.groups,
                &entry,
                RouteAttribute::PacketAction(PacketAction::Drop),
            )
            .unwrap();
        let route = f.routes.get_route(&entry).unwrap();
        assert_eq!(route.attrs.action, PacketAction::Drop);
        assert_eq!(
            route.attrs.flags,
            RouteFlags::TERMINATED | RouteFlags::NEXT_HOP_ID | RouteFlags::PACKET_ACTION
        );
    }

    #[test]
    fn test_list_and_hits() {
        let mut f = fixture();
        for p in ["10.7.0.0/16", "10.8.0.0/16", "10.9.0.0/16"] {
            f.add(RouteRequest::new(f.vr, prefix(p)).via_next_hop(f.nhs[0]))
                .unwrap();
        }
        let mut buf = [RouteEntry::default(); 2];
        let listed = f.routes.list_routes(Some(f.vr), &mut buf);
        assert_eq!(listed, ListResult { written: 2, total: 3 });
        assert!(listed.is_truncated());

        let entry = RouteEntry::new(f.vr, prefix("10.8.0.0/16"));
        assert!(f.routes.mark_hit(&entry));
        assert_eq!(f.routes.take_route_hit(&entry), Ok(true));
        assert_eq!(f.routes.take_route_hit(&entry), Ok(false));
        assert!(!f.routes.mark_hit(&RouteEntry::new(f.vr, prefix("172.16.0.0/12"))));
    }
}
