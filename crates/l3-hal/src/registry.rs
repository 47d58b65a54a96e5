//! Liveness view of the L2 objects router interfaces attach to.

use crate::api::{Egress, RifAttachment};
use crate::types::{BridgeOid, LagOid, PortOid};
use l3_types::VlanId;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Read-only view of the port, LAG, VLAN and bridge registries owned by
/// peer subsystems.
pub trait AttachmentRegistry: Send + Sync {
    fn port_exists(&self, port: PortOid) -> bool;
    fn lag_exists(&self, lag: LagOid) -> bool;
    fn vlan_exists(&self, vlan: VlanId) -> bool;
    fn bridge_exists(&self, bridge: BridgeOid) -> bool;

    fn attachment_exists(&self, attachment: &RifAttachment) -> bool {
        match *attachment {
            RifAttachment::Port(port) => self.port_exists(port),
            RifAttachment::Vlan(vlan) => self.vlan_exists(vlan),
            RifAttachment::Lag(lag) => self.lag_exists(lag),
            RifAttachment::Bridge(bridge) => self.bridge_exists(bridge),
        }
    }

    fn egress_exists(&self, egress: &Egress) -> bool {
        match *egress {
            Egress::Port(port) => self.port_exists(port),
            Egress::Lag(lag) => self.lag_exists(lag),
        }
    }
}

#[derive(Debug, Default)]
struct Members {
    ports: HashSet<PortOid>,
    lags: HashSet<LagOid>,
    vlans: HashSet<VlanId>,
    bridges: HashSet<BridgeOid>,
}

/// In-memory registry for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: RwLock<Members>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port(&self, port: PortOid) {
        self.inner.write().ports.insert(port);
    }

    pub fn remove_port(&self, port: PortOid) {
        self.inner.write().ports.remove(&port);
    }

    pub fn add_lag(&self, lag: LagOid) {
        self.inner.write().lags.insert(lag);
    }

    pub fn add_vlan(&self, vlan: VlanId) {
        self.inner.write().vlans.insert(vlan);
    }

    pub fn add_bridge(&self, bridge: BridgeOid) {
        self.inner.write().bridges.insert(bridge);
    }
}

impl AttachmentRegistry for MemoryRegistry {
    fn port_exists(&self, port: PortOid) -> bool {
        self.inner.read().ports.contains(&port)
    }

    fn lag_exists(&self, lag: LagOid) -> bool {
        self.inner.read().lags.contains(&lag)
    }

    fn vlan_exists(&self, vlan: VlanId) -> bool {
        self.inner.read().vlans.contains(&vlan)
    }

    fn bridge_exists(&self, bridge: BridgeOid) -> bool {
        self.inner.read().bridges.contains(&bridge)
    }
}
