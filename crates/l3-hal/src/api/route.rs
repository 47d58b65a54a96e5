//! Route entry attributes.

use super::PacketAction;
use crate::types::{NextHopGroupOid, NextHopOid, VirtualRouterOid};
use bitflags::bitflags;
use l3_types::IpPrefix;
use std::fmt;

/// Hardware key of a route: the owning VR plus a normalised prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteEntry {
    pub vr: VirtualRouterOid,
    pub prefix: IpPrefix,
}

impl RouteEntry {
    pub fn new(vr: VirtualRouterOid, prefix: IpPrefix) -> Self {
        Self { vr, prefix }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vr, self.prefix)
    }
}

/// Where a route sends traffic. Exactly one of a next-hop or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteTarget {
    NextHop(NextHopOid),
    Group(NextHopGroupOid),
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::NextHop(oid) => write!(f, "nh:{}", oid),
            RouteTarget::Group(oid) => write!(f, "nhg:{}", oid),
        }
    }
}

bitflags! {
    /// Route descriptor flags.
    ///
    /// `DEFAULT` follows the prefix and `TERMINATED` is supplied by the
    /// caller for locally terminated prefixes. The rest follow the route's
    /// attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RouteFlags: u32 {
        const DEFAULT = 1 << 0;
        const TERMINATED = 1 << 1;
        const ECMP = 1 << 2;
        const PACKET_ACTION = 1 << 3;
        const TRAP_PRIORITY = 1 << 4;
        const NEXT_HOP_ID = 1 << 5;
    }
}

/// Full attribute set of an installed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAttributes {
    pub target: RouteTarget,
    pub action: PacketAction,
    pub trap_priority: Option<u8>,
    pub priority: u32,
    pub mpls_label: Option<u32>,
    pub lookup_class: Option<u32>,
    pub flags: RouteFlags,
}

impl RouteAttributes {
    /// Flags implied by the target, action and trap priority.
    pub fn attribute_flags(&self) -> RouteFlags {
        let mut flags = match self.target {
            RouteTarget::NextHop(_) => RouteFlags::NEXT_HOP_ID,
            RouteTarget::Group(_) => RouteFlags::ECMP,
        };
        if self.action != PacketAction::Forward {
            flags |= RouteFlags::PACKET_ACTION;
        }
        if self.trap_priority.is_some() {
            flags |= RouteFlags::TRAP_PRIORITY;
        }
        flags
    }

    /// Writes one attribute and refreshes the flags that depend on it.
    pub fn apply(&mut self, attr: RouteAttribute) {
        match attr {
            RouteAttribute::PacketAction(action) => self.action = action,
            RouteAttribute::TrapPriority(prio) => self.trap_priority = prio,
            RouteAttribute::Priority(prio) => self.priority = prio,
            RouteAttribute::MplsLabel(label) => self.mpls_label = label,
            RouteAttribute::LookupClass(class) => self.lookup_class = class,
            RouteAttribute::Target(target) => self.target = target,
        }
        let fixed = self.flags & (RouteFlags::DEFAULT | RouteFlags::TERMINATED);
        self.flags = fixed | self.attribute_flags();
    }
}

/// A single route attribute write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAttribute {
    PacketAction(PacketAction),
    TrapPriority(Option<u8>),
    Priority(u32),
    MplsLabel(Option<u32>),
    LookupClass(Option<u32>),
    Target(RouteTarget),
}
