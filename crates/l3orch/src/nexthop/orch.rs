//! Next-hop resolver.

use std::collections::BTreeMap;
use std::sync::Arc;

use l3_hal::{
    L3Backend, NeighborEntry, NextHopAttribute, NextHopAttributes, NextHopOid, RouterInterfaceOid,
    VirtualRouterOid,
};
use l3_orch_common::ObjectTable;
use l3_types::{IpAddress, MacAddress};
use log::{debug, error, info, warn};

use super::types::{NextHop, NextHopKey};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{L3Error, L3Result};
use crate::neigh::NeighOrch;
use crate::rif::RifOrch;
use crate::vr::VrOrch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextHopOrchStats {
    pub next_hops_created: u64,
    pub next_hops_removed: u64,
    /// `create_next_hop` calls answered with an existing next-hop.
    pub dedup_hits: u64,
    pub mac_updates: u64,
}

/// Creates, shares and tears down next-hop objects.
///
/// A next-hop's reference count is its owner count (one per unmatched
/// `create_next_hop`) plus one per group membership and route targeting it.
/// Each next-hop holds a reference on its RIF and on the neighbor it
/// resolves through.
pub struct NextHopOrch {
    backend: Arc<dyn L3Backend>,
    table: ObjectTable<NextHopOid, NextHop>,
    index: BTreeMap<NextHopKey, NextHopOid>,
    stats: NextHopOrchStats,
}

impl std::fmt::Debug for NextHopOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextHopOrch")
            .field("next_hop_count", &self.index.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl NextHopOrch {
    pub fn new(backend: Arc<dyn L3Backend>) -> Self {
        Self {
            backend,
            table: ObjectTable::new("next-hop"),
            index: BTreeMap::new(),
            stats: NextHopOrchStats::default(),
        }
    }

    pub fn stats(&self) -> &NextHopOrchStats {
        &self.stats
    }

    pub fn next_hop_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_live(&self, nh: NextHopOid) -> bool {
        self.table.is_live(&nh)
    }

    /// Owners plus dependents. Zero once deleted.
    pub fn ref_count(&self, nh: NextHopOid) -> u32 {
        self.table.ref_count(&nh)
    }

    pub fn find(&self, key: &NextHopKey) -> Option<NextHopOid> {
        self.index.get(key).copied()
    }

    pub fn get_next_hop(&self, nh: NextHopOid) -> L3Result<NextHop> {
        self.table
            .get(&nh)
            .cloned()
            .ok_or_else(|| L3Error::not_found(format!("next-hop {}", nh)))
    }

    /// Returns the next-hop for `(vr, rif, ip)`, creating it on first use.
    ///
    /// Repeated calls with the same triple return the same handle and add
    /// an owner reference each time.
    pub fn create_next_hop(
        &mut self,
        vrs: &VrOrch,
        rifs: &mut RifOrch,
        neighbors: &mut NeighOrch,
        vr: VirtualRouterOid,
        rif: RouterInterfaceOid,
        ip: IpAddress,
    ) -> L3Result<NextHopOid> {
        if !vrs.is_live(vr) {
            return Err(L3Error::not_found(format!("virtual router {}", vr)));
        }
        match rifs.vr_of(rif) {
            None => return Err(L3Error::not_found(format!("router interface {}", rif))),
            Some(rif_vr) if rif_vr != vr => {
                return Err(L3Error::invalid(format!(
                    "router interface {} belongs to virtual router {}, not {}",
                    rif, rif_vr, vr
                )))
            }
            Some(_) => {}
        }

        let key = NextHopKey::new(vr, rif, ip);
        if let Some(&nh) = self.index.get(&key) {
            self.table.retain(&nh)?;
            if let Some(next_hop) = self.table.get_mut(&nh) {
                next_hop.owners += 1;
            }
            self.stats.dedup_hits += 1;
            debug!("NextHopOrch: reusing next-hop {} for {}", nh, key);
            return Ok(nh);
        }

        let neighbor = key.neighbor();
        let mac = neighbors.resolve(&neighbor, rif)?;

        rifs.retain(rif)?;
        if let Err(e) = neighbors.retain(&neighbor) {
            rifs.release(rif)?;
            return Err(e);
        }

        let if_down = !rifs.is_oper_up(rif);
        let attrs = NextHopAttributes { rif, ip, mac };
        let backend = &self.backend;
        let result = self.table.allocate(|| {
            backend
                .create_next_hop(&attrs)
                .map(|nh| {
                    (
                        nh,
                        NextHop {
                            key,
                            mac,
                            owners: 1,
                            if_down,
                        },
                    )
                })
                .map_err(L3Error::from)
        });

        let nh = match result {
            Ok(nh) => nh,
            Err(e) => {
                neighbors.release(&neighbor)?;
                rifs.release(rif)?;
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceCreate, "NextHopOrch", "create_next_hop")
                        .with_object_type("next_hop")
                        .with_error(e.to_string())
                        .with_details(serde_json::json!({ "key": key.to_string() }))
                );
                return Err(e);
            }
        };

        self.index.insert(key, nh);
        self.stats.next_hops_created += 1;

        info!("NextHopOrch: created next-hop {} for {} via {}", nh, key, mac);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceCreate, "NextHopOrch", "create_next_hop")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(nh.to_string())
                .with_object_type("next_hop")
                .with_details(serde_json::json!({
                    "key": key.to_string(),
                    "mac": mac.to_string(),
                }))
        );
        Ok(nh)
    }

    /// Drops one owner reference, tearing the next-hop down with the last.
    ///
    /// Fails with `ResourceInUse` while any group or route references the
    /// next-hop, whatever the owner count.
    pub fn delete_next_hop(
        &mut self,
        rifs: &mut RifOrch,
        neighbors: &mut NeighOrch,
        nh: NextHopOid,
    ) -> L3Result<()> {
        let owners = self
            .table
            .get(&nh)
            .map(|next_hop| next_hop.owners)
            .ok_or_else(|| L3Error::not_found(format!("next-hop {}", nh)))?;

        let dependents = self.table.ref_count(&nh).saturating_sub(owners);
        if dependents > 0 {
            let err = L3Error::in_use(format!(
                "next-hop {} is referenced by {} group member(s) or route(s)",
                nh, dependents
            ));
            warn!("NextHopOrch: {}", err);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "NextHopOrch", "delete_next_hop")
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(nh.to_string())
                    .with_object_type("next_hop")
                    .with_error(err.to_string())
            );
            return Err(err);
        }

        if owners > 1 {
            self.table.release(&nh)?;
            if let Some(next_hop) = self.table.get_mut(&nh) {
                next_hop.owners -= 1;
            }
            debug!("NextHopOrch: next-hop {} now has {} owner(s)", nh, owners - 1);
            return Ok(());
        }

        self.teardown(rifs, neighbors, nh, "delete_next_hop")
    }

    /// Tears a next-hop down regardless of its owner count.
    ///
    /// Fails with `ResourceInUse` unless the only reference left is a single
    /// owner hold.
    pub fn force_delete_next_hop(
        &mut self,
        rifs: &mut RifOrch,
        neighbors: &mut NeighOrch,
        nh: NextHopOid,
    ) -> L3Result<()> {
        if let Err(e) = self.table.ensure_unreferenced(&nh, 1) {
            let err = L3Error::from(e);
            warn!("NextHopOrch: refusing forced delete: {}", err);
            audit_log!(
                AuditRecord::new(
                    AuditCategory::ResourceDelete,
                    "NextHopOrch",
                    "force_delete_next_hop"
                )
                .with_object_id(nh.to_string())
                .with_object_type("next_hop")
                .with_error(err.to_string())
                .with_outcome(AuditOutcome::Denied)
            );
            return Err(err);
        }
        self.teardown(rifs, neighbors, nh, "force_delete_next_hop")
    }

    fn teardown(
        &mut self,
        rifs: &mut RifOrch,
        neighbors: &mut NeighOrch,
        nh: NextHopOid,
        action: &str,
    ) -> L3Result<()> {
        if let Err(e) = self.backend.remove_next_hop(nh) {
            let err = L3Error::from(e);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "NextHopOrch", action)
                    .with_object_id(nh.to_string())
                    .with_object_type("next_hop")
                    .with_error(err.to_string())
            );
            return Err(err);
        }

        self.table.release(&nh)?;
        let next_hop = self.table.retire(&nh)?;
        self.index.remove(&next_hop.key);
        neighbors.release(&next_hop.key.neighbor())?;
        rifs.release(next_hop.key.rif)?;
        self.stats.next_hops_removed += 1;

        info!("NextHopOrch: removed next-hop {} ({})", nh, next_hop.key);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "NextHopOrch", action)
                .with_outcome(AuditOutcome::Success)
                .with_object_id(nh.to_string())
                .with_object_type("next_hop")
                .with_details(serde_json::json!({ "key": next_hop.key.to_string() }))
        );
        Ok(())
    }

    /// Rewrites the destination MAC of every next-hop resolved through
    /// `neighbor` on `rif`. All or nothing: on failure the writes already
    /// made are reverted.
    pub(crate) fn update_mac_for_neighbor(
        &mut self,
        neighbor: &NeighborEntry,
        rif: RouterInterfaceOid,
        mac: MacAddress,
    ) -> L3Result<usize> {
        let targets: Vec<(NextHopOid, MacAddress)> = self
            .table
            .iter()
            .filter(|(_, nh)| nh.key.rif == rif && nh.key.neighbor() == *neighbor && nh.mac != mac)
            .map(|(oid, nh)| (*oid, nh.mac))
            .collect();

        for (done, &(oid, _)) in targets.iter().enumerate() {
            if let Err(e) = self
                .backend
                .set_next_hop_attribute(oid, NextHopAttribute::DestinationMac(mac))
            {
                for &(prev, old_mac) in targets[..done].iter().rev() {
                    if let Err(undo_err) = self
                        .backend
                        .set_next_hop_attribute(prev, NextHopAttribute::DestinationMac(old_mac))
                    {
                        error!(
                            "NextHopOrch: failed to restore MAC {} on next-hop {}: {}",
                            old_mac, prev, undo_err
                        );
                        audit_log!(AuditRecord::new(
                            AuditCategory::ErrorCondition,
                            "NextHopOrch",
                            "restore_mac"
                        )
                        .with_object_id(prev.to_string())
                        .with_object_type("next_hop")
                        .with_error(undo_err.to_string())
                        .with_details(serde_json::json!({ "mac": old_mac.to_string() })));
                    }
                }
                return Err(e.into());
            }
        }

        for (oid, _) in &targets {
            if let Some(nh) = self.table.get_mut(oid) {
                nh.mac = mac;
            }
        }
        self.stats.mac_updates += targets.len() as u64;
        if !targets.is_empty() {
            info!(
                "NextHopOrch: moved {} next-hop(s) for {} to {}",
                targets.len(),
                neighbor,
                mac
            );
        }
        Ok(targets.len())
    }

    /// Marks next-hops on `rifs` down or up. Returns the ones that changed.
    pub(crate) fn set_if_down_for_rifs(
        &mut self,
        rifs: &[RouterInterfaceOid],
        down: bool,
    ) -> Vec<NextHopOid> {
        let mut changed = Vec::new();
        for (oid, nh) in self.table.iter_mut() {
            if rifs.contains(&nh.key.rif) && nh.if_down != down {
                nh.if_down = down;
                changed.push(*oid);
            }
        }
        changed
    }

    /// Takes a reference on behalf of a group member or route.
    pub(crate) fn retain(&mut self, nh: NextHopOid) -> L3Result<()> {
        self.table.retain(&nh)?;
        Ok(())
    }

    pub(crate) fn release(&mut self, nh: NextHopOid) -> L3Result<()> {
        let last = self.table.release(&nh)?;
        debug_assert!(!last, "dependent released owner hold on {}", nh);
        if last {
            error!("NextHopOrch: dependent released last reference on {}", nh);
            self.table.restore(&nh)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neigh::NeighborRequest;
    use l3_hal::{
        BackendOp, HalError, MemoryBackend, MemoryRegistry, PortOid, RifAttachment,
        RifAttributes, VrAttributes,
    };
    use pretty_assertions::assert_eq;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        vrs: VrOrch,
        rifs: RifOrch,
        neighbors: NeighOrch,
        next_hops: NextHopOrch,
        vr: VirtualRouterOid,
        rif: RouterInterfaceOid,
    }

    const IP: IpAddress = IpAddress::v4(10, 0, 0, 1);

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x00, 0xaa, 0x00, 0x00, 0x00, last])
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let registry = Arc::new(MemoryRegistry::new());
        let port = PortOid::from_raw(0x5).unwrap();
        registry.add_port(port);

        let mut vrs = VrOrch::new(backend.clone());
        let mut rifs = RifOrch::new(backend.clone(), registry.clone());
        let mut neighbors = NeighOrch::new(backend.clone(), registry);
        let vr = vrs.create_vr(VrAttributes::default()).unwrap();
        let rif = rifs
            .create_rif(&mut vrs, RifAttributes::new(vr, RifAttachment::Port(port)))
            .unwrap();
        neighbors
            .add_neighbor(
                &vrs,
                &mut rifs,
                NeighborRequest::new(vr, rif, IP).with_mac(mac(1)),
            )
            .unwrap();
        Fixture {
            next_hops: NextHopOrch::new(backend.clone()),
            backend,
            vrs,
            rifs,
            neighbors,
            vr,
            rif,
        }
    }

    impl Fixture {
        fn create(&mut self, ip: IpAddress) -> L3Result<NextHopOid> {
            self.next_hops.create_next_hop(
                &self.vrs,
                &mut self.rifs,
                &mut self.neighbors,
                self.vr,
                self.rif,
                ip,
            )
        }

        fn delete(&mut self, nh: NextHopOid) -> L3Result<()> {
            self.next_hops
                .delete_next_hop(&mut self.rifs, &mut self.neighbors, nh)
        }
    }

    #[test]
    fn test_deduplication() {
        let mut f = fixture();
        let first = f.create(IP).unwrap();
        let second = f.create(IP).unwrap();

        assert_eq!(first, second);
        assert_eq!(f.next_hops.ref_count(first), 2);
        assert_eq!(f.backend.next_hop_count(), 1);
        assert_eq!(f.next_hops.stats().dedup_hits, 1);

        f.delete(first).unwrap();
        assert_eq!(f.next_hops.ref_count(first), 1);
        assert_eq!(f.backend.next_hop_count(), 1);

        f.delete(first).unwrap();
        assert!(!f.next_hops.is_live(first));
        assert_eq!(f.backend.next_hop_count(), 0);
        assert_eq!(f.rifs.ref_count(f.rif), 2);
        assert_eq!(f.neighbors.ref_count(&NeighborEntry::new(f.vr, IP)), 1);
    }

    #[test]
    fn test_unresolved_neighbor() {
        let mut f = fixture();
        let err = f.create(IpAddress::v4(10, 0, 0, 9)).unwrap_err();
        assert!(matches!(err, L3Error::Unresolved(_)));

        f.neighbors
            .add_neighbor(
                &f.vrs,
                &mut f.rifs,
                NeighborRequest::new(f.vr, f.rif, IpAddress::v4(10, 0, 0, 9)),
            )
            .unwrap();
        let err = f.create(IpAddress::v4(10, 0, 0, 9)).unwrap_err();
        assert!(matches!(err, L3Error::Unresolved(_)));
        assert_eq!(f.next_hops.next_hop_count(), 0);
    }

    #[test]
    fn test_missing_rif_or_vr() {
        let mut f = fixture();
        let ghost_rif = RouterInterfaceOid::from_raw(0xdead).unwrap();
        let err = f
            .next_hops
            .create_next_hop(&f.vrs, &mut f.rifs, &mut f.neighbors, f.vr, ghost_rif, IP)
            .unwrap_err();
        assert!(matches!(err, L3Error::NotFound(_)));

        let ghost_vr = VirtualRouterOid::from_raw(0xbeef).unwrap();
        let err = f
            .next_hops
            .create_next_hop(&f.vrs, &mut f.rifs, &mut f.neighbors, ghost_vr, f.rif, IP)
            .unwrap_err();
        assert!(matches!(err, L3Error::NotFound(_)));
    }

    #[test]
    fn test_dependents_block_delete() {
        let mut f = fixture();
        let nh = f.create(IP).unwrap();
        f.next_hops.retain(nh).unwrap();

        assert!(matches!(f.delete(nh), Err(L3Error::ResourceInUse(_))));
        assert!(matches!(
            f.next_hops
                .force_delete_next_hop(&mut f.rifs, &mut f.neighbors, nh),
            Err(L3Error::ResourceInUse(_))
        ));
        assert!(f.next_hops.is_live(nh));

        f.next_hops.release(nh).unwrap();
        f.delete(nh).unwrap();
    }

    #[test]
    fn test_force_delete_with_two_owners_refused() {
        let mut f = fixture();
        let nh = f.create(IP).unwrap();
        f.create(IP).unwrap();
        assert!(matches!(
            f.next_hops
                .force_delete_next_hop(&mut f.rifs, &mut f.neighbors, nh),
            Err(L3Error::ResourceInUse(_))
        ));

        f.delete(nh).unwrap();
        f.next_hops
            .force_delete_next_hop(&mut f.rifs, &mut f.neighbors, nh)
            .unwrap();
        assert!(!f.next_hops.is_live(nh));
    }

    #[test]
    fn test_failed_create_releases_dependencies() {
        let mut f = fixture();
        f.backend
            .fail_next(BackendOp::CreateNextHop, HalError::table_full("next-hop"));
        assert!(matches!(f.create(IP), Err(L3Error::Backend(_))));
        assert_eq!(f.rifs.ref_count(f.rif), 2);
        assert_eq!(f.neighbors.ref_count(&NeighborEntry::new(f.vr, IP)), 1);
        assert_eq!(f.next_hops.next_hop_count(), 0);
    }

    #[test]
    fn test_failed_remove_keeps_next_hop() {
        let mut f = fixture();
        let nh = f.create(IP).unwrap();
        f.backend
            .fail_next(BackendOp::RemoveNextHop, HalError::timeout("remove"));
        assert!(matches!(f.delete(nh), Err(L3Error::Backend(_))));
        assert_eq!(f.next_hops.ref_count(nh), 1);
        assert_eq!(f.next_hops.find(&NextHopKey::new(f.vr, f.rif, IP)), Some(nh));
    }

    #[test]
    fn test_mac_update_in_place() {
        let mut f = fixture();
        let nh = f.create(IP).unwrap();
        f.backend.clear_calls();

        let entry = NeighborEntry::new(f.vr, IP);
        assert_eq!(f.next_hops.update_mac_for_neighbor(&entry, f.rif, mac(2)), Ok(1));
        assert_eq!(f.backend.calls(), vec![BackendOp::SetNextHopAttribute]);
        assert_eq!(f.backend.next_hop(nh).unwrap().mac, mac(2));
        assert_eq!(f.next_hops.get_next_hop(nh).unwrap().mac, mac(2));
    }
}
