//! Neighbor orchestration logic.

use std::sync::Arc;

use l3_hal::{
    AttachmentRegistry, L3Backend, NeighborAttribute, NeighborAttributes, NeighborEntry,
    RouterInterfaceOid, VirtualRouterOid,
};
use l3_orch_common::ObjectTable;
use l3_types::MacAddress;
use log::{debug, error, info, warn};

use super::types::{Neighbor, NeighborRequest};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{L3Error, L3Result};
use crate::list::{fill, ListResult};
use crate::nexthop::NextHopOrch;
use crate::rif::RifOrch;
use crate::vr::VrOrch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighOrchStats {
    pub neighbors_added: u64,
    pub neighbors_removed: u64,
    pub neighbors_updated: u64,
    /// Updates that changed the MAC of a resolved neighbor.
    pub mac_moves: u64,
}

/// Owns the neighbor table.
///
/// A neighbor holds a reference on its RIF. Next-hops resolved through a
/// neighbor hold a reference on it, which blocks deletion and blocks
/// un-resolving it.
pub struct NeighOrch {
    backend: Arc<dyn L3Backend>,
    registry: Arc<dyn AttachmentRegistry>,
    table: ObjectTable<NeighborEntry, Neighbor>,
    stats: NeighOrchStats,
}

impl std::fmt::Debug for NeighOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighOrch")
            .field("neighbor_count", &self.table.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// The write that undoes `attr`, given the attributes before it.
fn undo(attr: NeighborAttribute, before: &NeighborAttributes) -> NeighborAttribute {
    match attr {
        NeighborAttribute::Mac(_) => NeighborAttribute::Mac(before.mac),
        NeighborAttribute::Egress(_) => NeighborAttribute::Egress(before.egress),
        NeighborAttribute::Vlan(_) => NeighborAttribute::Vlan(before.vlan),
        NeighborAttribute::Action(_) => NeighborAttribute::Action(before.action),
    }
}

impl NeighOrch {
    pub fn new(backend: Arc<dyn L3Backend>, registry: Arc<dyn AttachmentRegistry>) -> Self {
        Self {
            backend,
            registry,
            table: ObjectTable::new("neighbor"),
            stats: NeighOrchStats::default(),
        }
    }

    pub fn stats(&self) -> &NeighOrchStats {
        &self.stats
    }

    pub fn neighbor_count(&self) -> usize {
        self.table.len()
    }

    pub fn contains(&self, entry: &NeighborEntry) -> bool {
        self.table.is_live(entry)
    }

    pub fn get_neighbor(&self, entry: &NeighborEntry) -> L3Result<Neighbor> {
        self.table
            .get(entry)
            .cloned()
            .ok_or_else(|| L3Error::not_found(format!("neighbor {}", entry)))
    }

    /// Lists neighbor keys in key order, optionally within one VR.
    pub fn list_neighbors(
        &self,
        vr: Option<VirtualRouterOid>,
        buf: &mut [NeighborEntry],
    ) -> ListResult {
        fill(
            buf,
            self.table
                .iter()
                .map(|(entry, _)| *entry)
                .filter(|entry| vr.map_or(true, |vr| entry.vr == vr)),
        )
    }

    fn validate(&self, req: &NeighborRequest) -> L3Result<()> {
        if req.ip.is_unspecified() {
            return Err(L3Error::invalid("neighbor address is unspecified"));
        }
        if let Some(mac) = req.mac {
            if !mac.is_valid_unicast() {
                return Err(L3Error::invalid(format!(
                    "neighbor MAC {} is not unicast",
                    mac
                )));
            }
        }
        if let Some(egress) = req.egress {
            if !self.registry.egress_exists(&egress) {
                return Err(L3Error::not_found(format!("egress {:?}", egress)));
            }
        }
        Ok(())
    }

    pub fn add_neighbor(
        &mut self,
        vrs: &VrOrch,
        rifs: &mut RifOrch,
        req: NeighborRequest,
    ) -> L3Result<()> {
        let entry = req.entry();
        if !vrs.is_live(req.vr) {
            return Err(L3Error::not_found(format!("virtual router {}", req.vr)));
        }
        match rifs.vr_of(req.rif) {
            None => return Err(L3Error::not_found(format!("router interface {}", req.rif))),
            Some(vr) if vr != req.vr => {
                return Err(L3Error::invalid(format!(
                    "router interface {} belongs to virtual router {}, not {}",
                    req.rif, vr, req.vr
                )))
            }
            Some(_) => {}
        }
        self.validate(&req)?;
        if self.table.is_live(&entry) {
            return Err(L3Error::AlreadyExists(format!("neighbor {}", entry)));
        }

        rifs.retain(req.rif)?;

        let neighbor = req.to_neighbor();
        let backend = &self.backend;
        let result = self.table.insert_with(entry, |entry| {
            if let Some(attrs) = neighbor.hw_attributes() {
                backend.create_neighbor(entry, &attrs)?;
            }
            Ok::<_, L3Error>(neighbor.clone())
        });

        if let Err(e) = result {
            rifs.release(req.rif)?;
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceCreate, "NeighOrch", "add_neighbor")
                    .with_object_id(entry.to_string())
                    .with_object_type("neighbor")
                    .with_error(e.to_string())
            );
            return Err(e);
        }

        self.stats.neighbors_added += 1;
        info!(
            "NeighOrch: added neighbor {} on {} mac {:?} ({:?})",
            entry, req.rif, req.mac, req.state
        );
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceCreate, "NeighOrch", "add_neighbor")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(entry.to_string())
                .with_object_type("neighbor")
                .with_details(serde_json::json!({
                    "rif": req.rif.to_string(),
                    "mac": req.mac.map(|mac| mac.to_string()),
                    "state": req.state,
                    "programmed": neighbor.is_programmed(),
                }))
        );
        Ok(())
    }

    /// Changes MAC, egress, VLAN, state or action of an existing neighbor.
    ///
    /// A MAC change is pushed to every next-hop resolved through the
    /// neighbor as an in-place attribute write. If any of those writes
    /// fails, the neighbor and the already-updated next-hops are put back.
    pub fn update_neighbor(
        &mut self,
        next_hops: &mut NextHopOrch,
        req: NeighborRequest,
    ) -> L3Result<()> {
        let entry = req.entry();
        let current = self.get_neighbor(&entry)?;
        if req.rif != current.rif {
            return Err(L3Error::invalid(format!(
                "neighbor {} is on router interface {}; delete it to move it to {}",
                entry, current.rif, req.rif
            )));
        }
        self.validate(&req)?;

        let target = req.to_neighbor();
        if target == current {
            return Ok(());
        }
        if target.mac.is_none() && self.table.ref_count(&entry) > 1 {
            return Err(L3Error::in_use(format!(
                "next-hops resolve through neighbor {}",
                entry
            )));
        }

        if let Err(e) = self.program(&entry, &current, &target) {
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceModify, "NeighOrch", "update_neighbor")
                    .with_object_id(entry.to_string())
                    .with_object_type("neighbor")
                    .with_error(e.to_string())
            );
            return Err(e);
        }

        let moved = match (current.mac, target.mac) {
            (Some(old), Some(new)) if old != new => Some((old, new)),
            _ => None,
        };
        if let Some((_, new_mac)) = moved {
            if let Err(e) = next_hops.update_mac_for_neighbor(&entry, target.rif, new_mac) {
                if let Err(rollback) = self.program(&entry, &target, &current) {
                    error!(
                        "NeighOrch: failed to restore neighbor {} after next-hop update failure: {}",
                        entry, rollback
                    );
                    audit_log!(
                        AuditRecord::new(AuditCategory::ErrorCondition, "NeighOrch", "restore")
                            .with_object_id(entry.to_string())
                            .with_object_type("neighbor")
                            .with_error(rollback.to_string())
                    );
                }
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceModify, "NeighOrch", "update_neighbor")
                        .with_object_id(entry.to_string())
                        .with_object_type("neighbor")
                        .with_error(e.to_string())
                );
                return Err(e);
            }
            self.stats.mac_moves += 1;
        }

        if let Some(neighbor) = self.table.get_mut(&entry) {
            *neighbor = target.clone();
        }
        self.stats.neighbors_updated += 1;

        debug!("NeighOrch: updated neighbor {} to {:?}", entry, target);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NeighOrch", "update_neighbor")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(entry.to_string())
                .with_object_type("neighbor")
                .with_details(serde_json::json!({
                    "old_mac": current.mac.map(|mac| mac.to_string()),
                    "new_mac": target.mac.map(|mac| mac.to_string()),
                    "programmed": target.is_programmed(),
                }))
        );
        Ok(())
    }

    /// Moves the host-table entry from `from` to `to`. On failure the
    /// backend is left as `from` describes.
    fn program(&self, entry: &NeighborEntry, from: &Neighbor, to: &Neighbor) -> L3Result<()> {
        match (from.hw_attributes(), to.hw_attributes()) {
            (Some(old), Some(new)) => {
                let mut applied = Vec::new();
                for attr in old.diff(&new) {
                    if let Err(e) = self.backend.set_neighbor_attribute(entry, attr) {
                        for done in applied.into_iter().rev() {
                            if let Err(undo_err) =
                                self.backend.set_neighbor_attribute(entry, undo(done, &old))
                            {
                                error!(
                                    "NeighOrch: failed to undo {:?} on {}: {}",
                                    done, entry, undo_err
                                );
                            }
                        }
                        return Err(e.into());
                    }
                    applied.push(attr);
                }
                Ok(())
            }
            (None, Some(new)) => Ok(self.backend.create_neighbor(entry, &new)?),
            (Some(_), None) => Ok(self.backend.remove_neighbor(entry)?),
            (None, None) => Ok(()),
        }
    }

    /// Deletes a neighbor no next-hop resolves through.
    pub fn delete_neighbor(&mut self, rifs: &mut RifOrch, entry: &NeighborEntry) -> L3Result<()> {
        let current = self.get_neighbor(entry)?;
        if let Err(e) = self.table.ensure_unreferenced(entry, 1) {
            warn!("NeighOrch: refusing to delete neighbor {}: {}", entry, e);
            return Err(e.into());
        }

        if current.is_programmed() {
            if let Err(e) = self.backend.remove_neighbor(entry) {
                let err = L3Error::from(e);
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceDelete, "NeighOrch", "delete_neighbor")
                        .with_object_id(entry.to_string())
                        .with_object_type("neighbor")
                        .with_error(err.to_string())
                );
                return Err(err);
            }
        }

        self.table.release(entry)?;
        self.table.retire(entry)?;
        rifs.release(current.rif)?;
        self.stats.neighbors_removed += 1;

        info!("NeighOrch: removed neighbor {}", entry);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "NeighOrch", "delete_neighbor")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(entry.to_string())
                .with_object_type("neighbor")
        );
        Ok(())
    }

    /// MAC a next-hop on `rif` would use to reach `entry`.
    pub(crate) fn resolve(
        &self,
        entry: &NeighborEntry,
        rif: RouterInterfaceOid,
    ) -> L3Result<MacAddress> {
        let neighbor = self
            .table
            .get(entry)
            .ok_or_else(|| L3Error::Unresolved(format!("no neighbor {}", entry)))?;
        if neighbor.rif != rif {
            return Err(L3Error::Unresolved(format!(
                "neighbor {} is on router interface {}, not {}",
                entry, neighbor.rif, rif
            )));
        }
        neighbor
            .mac
            .ok_or_else(|| L3Error::Unresolved(format!("neighbor {} has no MAC", entry)))
    }

    pub(crate) fn retain(&mut self, entry: &NeighborEntry) -> L3Result<()> {
        self.table.retain(entry)?;
        Ok(())
    }

    pub(crate) fn release(&mut self, entry: &NeighborEntry) -> L3Result<()> {
        let last = self.table.release(entry)?;
        debug_assert!(!last, "dependent released creator hold on {}", entry);
        if last {
            error!("NeighOrch: dependent released last reference on {}", entry);
            self.table.restore(entry)?;
        }
        Ok(())
    }

    pub fn ref_count(&self, entry: &NeighborEntry) -> u32 {
        self.table.ref_count(entry)
    }
}
