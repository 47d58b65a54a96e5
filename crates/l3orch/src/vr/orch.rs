//! VrOrch implementation.

use std::sync::Arc;

use l3_hal::{L3Backend, VirtualRouterOid, VrAttribute, VrAttributes};
use l3_orch_common::ObjectTable;
use log::{debug, error, info, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{L3Error, L3Result};

/// Statistics for VrOrch operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VrOrchStats {
    pub vrs_created: u64,
    pub vrs_removed: u64,
    pub vrs_updated: u64,
}

/// Owns the virtual router table.
///
/// A VR's reference count is its creator hold plus one per RIF and route
/// attached to it.
pub struct VrOrch {
    backend: Arc<dyn L3Backend>,
    table: ObjectTable<VirtualRouterOid, VrAttributes>,
    stats: VrOrchStats,
}

impl std::fmt::Debug for VrOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrOrch")
            .field("vr_count", &self.table.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl VrOrch {
    pub fn new(backend: Arc<dyn L3Backend>) -> Self {
        Self {
            backend,
            table: ObjectTable::new("virtual router"),
            stats: VrOrchStats::default(),
        }
    }

    pub fn stats(&self) -> &VrOrchStats {
        &self.stats
    }

    pub fn vr_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_live(&self, vr: VirtualRouterOid) -> bool {
        self.table.is_live(&vr)
    }

    pub fn ref_count(&self, vr: VirtualRouterOid) -> u32 {
        self.table.ref_count(&vr)
    }

    pub fn get_vr(&self, vr: VirtualRouterOid) -> L3Result<VrAttributes> {
        self.table
            .get(&vr)
            .cloned()
            .ok_or_else(|| L3Error::not_found(format!("virtual router {}", vr)))
    }

    pub fn create_vr(&mut self, attrs: VrAttributes) -> L3Result<VirtualRouterOid> {
        if let Some(mac) = attrs.src_mac {
            if !mac.is_valid_unicast() {
                return Err(L3Error::invalid(format!(
                    "virtual router source MAC {} is not unicast",
                    mac
                )));
            }
        }

        let backend = &self.backend;
        let result = self.table.allocate(|| {
            backend
                .create_virtual_router(&attrs)
                .map(|vr| (vr, attrs.clone()))
                .map_err(L3Error::from)
        });

        let vr = match result {
            Ok(vr) => vr,
            Err(e) => {
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceCreate, "VrOrch", "create_vr")
                        .with_object_type("virtual_router")
                        .with_error(e.to_string())
                );
                return Err(e);
            }
        };

        self.stats.vrs_created += 1;
        info!("VrOrch: created virtual router {}", vr);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceCreate, "VrOrch", "create_vr")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(vr.to_string())
                .with_object_type("virtual_router")
                .with_details(serde_json::json!({
                    "admin_v4": attrs.admin_v4,
                    "admin_v6": attrs.admin_v6,
                    "src_mac": attrs.src_mac.map(|mac| mac.to_string()),
                }))
        );
        Ok(vr)
    }

    /// Deletes a VR that no RIF or route still uses.
    pub fn delete_vr(&mut self, vr: VirtualRouterOid) -> L3Result<()> {
        self.table.ensure_unreferenced(&vr, 1)?;

        if let Err(e) = self.backend.remove_virtual_router(vr) {
            let err = L3Error::from(e);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "VrOrch", "delete_vr")
                    .with_object_id(vr.to_string())
                    .with_object_type("virtual_router")
                    .with_error(err.to_string())
            );
            return Err(err);
        }

        self.table.release(&vr)?;
        self.table.retire(&vr)?;
        self.stats.vrs_removed += 1;

        info!("VrOrch: removed virtual router {}", vr);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "VrOrch", "delete_vr")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(vr.to_string())
                .with_object_type("virtual_router")
        );
        Ok(())
    }

    pub fn set_vr_attribute(&mut self, vr: VirtualRouterOid, attr: VrAttribute) -> L3Result<()> {
        if !self.table.is_live(&vr) {
            return Err(L3Error::not_found(format!("virtual router {}", vr)));
        }
        if let VrAttribute::SrcMac(mac) = attr {
            if !mac.is_valid_unicast() {
                return Err(L3Error::invalid(format!(
                    "virtual router source MAC {} is not unicast",
                    mac
                )));
            }
        }

        if let Err(e) = self.backend.set_virtual_router_attribute(vr, attr) {
            let err = L3Error::from(e);
            warn!("VrOrch: failed to set {:?} on virtual router {}: {}", attr, vr, err);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceModify, "VrOrch", "set_vr_attribute")
                    .with_object_id(vr.to_string())
                    .with_object_type("virtual_router")
                    .with_error(err.to_string())
                    .with_details(serde_json::json!({ "attribute": format!("{:?}", attr) }))
            );
            return Err(err);
        }

        if let Some(attrs) = self.table.get_mut(&vr) {
            attrs.apply(attr);
        }
        self.stats.vrs_updated += 1;

        debug!("VrOrch: set {:?} on virtual router {}", attr, vr);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "VrOrch", "set_vr_attribute")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(vr.to_string())
                .with_object_type("virtual_router")
                .with_details(serde_json::json!({ "attribute": format!("{:?}", attr) }))
        );
        Ok(())
    }

    /// Takes a reference on behalf of a RIF or route.
    pub(crate) fn retain(&mut self, vr: VirtualRouterOid) -> L3Result<()> {
        self.table.retain(&vr)?;
        Ok(())
    }

    /// Drops a reference taken with [`retain`](Self::retain). The creator
    /// hold keeps the VR live.
    pub(crate) fn release(&mut self, vr: VirtualRouterOid) -> L3Result<()> {
        let last = self.table.release(&vr)?;
        debug_assert!(!last, "dependent released creator hold on {}", vr);
        if last {
            error!("VrOrch: dependent released last reference on {}", vr);
            self.table.restore(&vr)?;
        }
        Ok(())
    }
}
