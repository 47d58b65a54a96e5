//! RifOrch implementation.

use std::sync::Arc;

use l3_hal::{
    AttachmentRegistry, L3Backend, PortOid, RifAttachment, RifAttribute, RifAttributes,
    RouterInterfaceOid, MIN_RIF_MTU,
};
use l3_orch_common::ObjectTable;
use l3_types::MacAddress;
use log::{debug, error, info};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{L3Error, L3Result};
use crate::vr::VrOrch;

/// A router interface as the orchestrator tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RifEntry {
    pub attrs: RifAttributes,
    /// Follows link state of the attached port. Starts up.
    pub oper_up: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RifOrchStats {
    pub rifs_created: u64,
    pub rifs_removed: u64,
    pub rifs_updated: u64,
    pub oper_changes: u64,
}

/// Owns the router interface table.
///
/// Each RIF holds a reference on its VR. Next-hops and neighbors built on a
/// RIF hold references on it.
pub struct RifOrch {
    backend: Arc<dyn L3Backend>,
    registry: Arc<dyn AttachmentRegistry>,
    table: ObjectTable<RouterInterfaceOid, RifEntry>,
    stats: RifOrchStats,
}

impl std::fmt::Debug for RifOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RifOrch")
            .field("rif_count", &self.table.len())
            .field("stats", &self.stats)
            .finish()
    }
}

fn check_src_mac(mac: MacAddress) -> L3Result<()> {
    if mac.is_valid_unicast() {
        Ok(())
    } else {
        Err(L3Error::invalid(format!(
            "router interface source MAC {} is not unicast",
            mac
        )))
    }
}

fn check_mtu(mtu: u32) -> L3Result<()> {
    if mtu < MIN_RIF_MTU {
        return Err(L3Error::invalid(format!(
            "MTU {} below minimum {}",
            mtu, MIN_RIF_MTU
        )));
    }
    Ok(())
}

impl RifOrch {
    pub fn new(backend: Arc<dyn L3Backend>, registry: Arc<dyn AttachmentRegistry>) -> Self {
        Self {
            backend,
            registry,
            table: ObjectTable::new("router interface"),
            stats: RifOrchStats::default(),
        }
    }

    pub fn stats(&self) -> &RifOrchStats {
        &self.stats
    }

    pub fn rif_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_live(&self, rif: RouterInterfaceOid) -> bool {
        self.table.is_live(&rif)
    }

    pub fn ref_count(&self, rif: RouterInterfaceOid) -> u32 {
        self.table.ref_count(&rif)
    }

    pub fn get_rif(&self, rif: RouterInterfaceOid) -> L3Result<RifEntry> {
        self.table
            .get(&rif)
            .cloned()
            .ok_or_else(|| L3Error::not_found(format!("router interface {}", rif)))
    }

    pub fn create_rif(
        &mut self,
        vrs: &mut VrOrch,
        attrs: RifAttributes,
    ) -> L3Result<RouterInterfaceOid> {
        if !vrs.is_live(attrs.vr) {
            return Err(L3Error::not_found(format!("virtual router {}", attrs.vr)));
        }
        if attrs.attachment.is_null() {
            return Err(L3Error::invalid(format!(
                "{} router interface needs a {} id",
                attrs.rif_type(),
                attrs.rif_type()
            )));
        }
        if !self.registry.attachment_exists(&attrs.attachment) {
            return Err(L3Error::not_found(format!("attachment {}", attrs.attachment)));
        }
        check_mtu(attrs.mtu)?;
        if let Some(mac) = attrs.src_mac {
            check_src_mac(mac)?;
        }

        vrs.retain(attrs.vr)?;

        let backend = &self.backend;
        let result = self.table.allocate(|| {
            backend
                .create_router_interface(&attrs)
                .map(|rif| {
                    (
                        rif,
                        RifEntry {
                            attrs: attrs.clone(),
                            oper_up: true,
                        },
                    )
                })
                .map_err(L3Error::from)
        });

        let rif = match result {
            Ok(rif) => rif,
            Err(e) => {
                vrs.release(attrs.vr)?;
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceCreate, "RifOrch", "create_rif")
                        .with_object_type("router_interface")
                        .with_error(e.to_string())
                        .with_details(serde_json::json!({
                            "vr": attrs.vr.to_string(),
                            "attachment": attrs.attachment.to_string(),
                        }))
                );
                return Err(e);
            }
        };

        self.stats.rifs_created += 1;
        info!(
            "RifOrch: created {} router interface {} on {}",
            attrs.rif_type(),
            rif,
            attrs.attachment
        );
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceCreate, "RifOrch", "create_rif")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(rif.to_string())
                .with_object_type("router_interface")
                .with_details(serde_json::json!({
                    "vr": attrs.vr.to_string(),
                    "type": attrs.rif_type().to_string(),
                    "attachment": attrs.attachment.to_string(),
                    "mtu": attrs.mtu,
                }))
        );
        Ok(rif)
    }

    /// Deletes a RIF that no next-hop or neighbor still uses.
    pub fn delete_rif(&mut self, vrs: &mut VrOrch, rif: RouterInterfaceOid) -> L3Result<()> {
        self.table.ensure_unreferenced(&rif, 1)?;
        let vr = self
            .table
            .get(&rif)
            .map(|entry| entry.attrs.vr)
            .ok_or_else(|| L3Error::not_found(format!("router interface {}", rif)))?;

        if let Err(e) = self.backend.remove_router_interface(rif) {
            let err = L3Error::from(e);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "RifOrch", "delete_rif")
                    .with_object_id(rif.to_string())
                    .with_object_type("router_interface")
                    .with_error(err.to_string())
            );
            return Err(err);
        }

        self.table.release(&rif)?;
        self.table.retire(&rif)?;
        vrs.release(vr)?;
        self.stats.rifs_removed += 1;

        info!("RifOrch: removed router interface {}", rif);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "RifOrch", "delete_rif")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(rif.to_string())
                .with_object_type("router_interface")
        );
        Ok(())
    }

    pub fn set_rif_attribute(
        &mut self,
        rif: RouterInterfaceOid,
        attr: RifAttribute,
    ) -> L3Result<()> {
        if !self.table.is_live(&rif) {
            return Err(L3Error::not_found(format!("router interface {}", rif)));
        }
        match attr {
            RifAttribute::Mtu(mtu) => check_mtu(mtu)?,
            RifAttribute::SrcMac(mac) => check_src_mac(mac)?,
            _ => {}
        }

        self.backend.set_router_interface_attribute(rif, attr)?;

        if let Some(entry) = self.table.get_mut(&rif) {
            entry.attrs.apply(attr);
        }
        self.stats.rifs_updated += 1;

        debug!("RifOrch: set {:?} on router interface {}", attr, rif);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "RifOrch", "set_rif_attribute")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(rif.to_string())
                .with_object_type("router_interface")
                .with_details(serde_json::json!({ "attribute": format!("{:?}", attr) }))
        );
        Ok(())
    }

    /// Records link state for every RIF attached directly to `port` and
    /// returns those RIFs.
    pub fn set_oper_state_for_port(&mut self, port: PortOid, up: bool) -> Vec<RouterInterfaceOid> {
        let mut affected = Vec::new();
        for (rif, entry) in self.table.iter_mut() {
            if entry.attrs.attachment != RifAttachment::Port(port) {
                continue;
            }
            if entry.oper_up != up {
                entry.oper_up = up;
                self.stats.oper_changes += 1;
                info!(
                    "RifOrch: router interface {} oper {}",
                    rif,
                    if up { "up" } else { "down" }
                );
            }
            affected.push(*rif);
        }
        affected
    }

    pub fn is_oper_up(&self, rif: RouterInterfaceOid) -> bool {
        self.table.get(&rif).is_some_and(|entry| entry.oper_up)
    }

    pub(crate) fn vr_of(&self, rif: RouterInterfaceOid) -> Option<l3_hal::VirtualRouterOid> {
        self.table.get(&rif).map(|entry| entry.attrs.vr)
    }

    /// Takes a reference on behalf of a next-hop or neighbor.
    pub(crate) fn retain(&mut self, rif: RouterInterfaceOid) -> L3Result<()> {
        self.table.retain(&rif)?;
        Ok(())
    }

    pub(crate) fn release(&mut self, rif: RouterInterfaceOid) -> L3Result<()> {
        let last = self.table.release(&rif)?;
        debug_assert!(!last, "dependent released creator hold on {}", rif);
        if last {
            error!("RifOrch: dependent released last reference on {}", rif);
            self.table.restore(&rif)?;
        }
        Ok(())
    }
}
