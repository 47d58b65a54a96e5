//! Route types.

use l3_hal::{
    NextHopGroupOid, NextHopOid, PacketAction, RouteAttributes, RouteEntry, RouteFlags,
    RouteTarget, VirtualRouterOid,
};
use l3_types::IpPrefix;

use crate::error::{L3Error, L3Result};

/// Largest value a 20-bit MPLS label can take.
pub const MAX_MPLS_LABEL: u32 = 0xF_FFFF;

/// An installed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub attrs: RouteAttributes,
    /// Set by a hardware route-hit event, cleared by `take_route_hit`.
    pub hit: bool,
}

/// Request to install a route.
///
/// Exactly one of `next_hop` and `group` must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub vr: VirtualRouterOid,
    pub prefix: IpPrefix,
    pub next_hop: Option<NextHopOid>,
    pub group: Option<NextHopGroupOid>,
    /// `None` takes the configured default action.
    pub action: Option<PacketAction>,
    pub trap_priority: Option<u8>,
    pub priority: u32,
    pub mpls_label: Option<u32>,
    pub lookup_class: Option<u32>,
    pub terminated: bool,
}

impl RouteRequest {
    pub fn new(vr: VirtualRouterOid, prefix: IpPrefix) -> Self {
        Self {
            vr,
            prefix,
            next_hop: None,
            group: None,
            action: None,
            trap_priority: None,
            priority: 0,
            mpls_label: None,
            lookup_class: None,
            terminated: false,
        }
    }

    pub fn via_next_hop(mut self, nh: NextHopOid) -> Self {
        self.next_hop = Some(nh);
        self
    }

    pub fn via_group(mut self, group: NextHopGroupOid) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_action(mut self, action: PacketAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_trap_priority(mut self, prio: u8) -> Self {
        self.trap_priority = Some(prio);
        self
    }

    pub fn with_priority(mut self, prio: u32) -> Self {
        self.priority = prio;
        self
    }

    pub fn with_mpls_label(mut self, label: u32) -> Self {
        self.mpls_label = Some(label);
        self
    }

    pub fn with_lookup_class(mut self, class: u32) -> Self {
        self.lookup_class = Some(class);
        self
    }

    /// Marks the prefix as locally terminated.
    pub fn terminated(mut self) -> Self {
        self.terminated = true;
        self
    }

    pub fn entry(&self) -> RouteEntry {
        RouteEntry::new(self.vr, self.prefix)
    }

    pub(crate) fn target(&self) -> L3Result<RouteTarget> {
        match (self.next_hop, self.group) {
            (Some(nh), None) => Ok(RouteTarget::NextHop(nh)),
            (None, Some(group)) => Ok(RouteTarget::Group(group)),
            (Some(_), Some(_)) => Err(L3Error::invalid(
                "route names both a next-hop and a group",
            )),
            (None, None) => Err(L3Error::invalid("route names no next-hop or group")),
        }
    }
}

pub(crate) fn check_mpls_label(label: Option<u32>) -> L3Result<()> {
    match label {
        Some(label) if label > MAX_MPLS_LABEL => Err(L3Error::invalid(format!(
            "MPLS label {} exceeds {}",
            label, MAX_MPLS_LABEL
        ))),
        _ => Ok(()),
    }
}

/// Descriptor flags for a route carrying `attrs`.
pub(crate) fn derive_flags(
    prefix: &IpPrefix,
    attrs: &RouteAttributes,
    terminated: bool,
) -> RouteFlags {
    let mut flags = RouteFlags::empty();
    if prefix.is_default() {
        flags |= RouteFlags::DEFAULT;
    }
    if terminated {
        flags |= RouteFlags::TERMINATED;
    }
    flags | attrs.attribute_flags()
}
