//! Virtual router and router interface attributes.

use super::PacketAction;
use crate::types::{BridgeOid, LagOid, PortOid, VirtualRouterOid};
use l3_types::{MacAddress, VlanId};
use std::fmt;

/// Smallest MTU a router interface accepts.
pub const MIN_RIF_MTU: u32 = 1514;

const DEFAULT_RIF_MTU: u32 = 9100;

/// Full attribute set of a virtual router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrAttributes {
    pub admin_v4: bool,
    pub admin_v6: bool,
    pub mcast_v4: bool,
    pub mcast_v6: bool,
    /// Falls back to the switch MAC when unset.
    pub src_mac: Option<MacAddress>,
    pub ttl1_action: PacketAction,
    pub ip_options_action: PacketAction,
}

impl Default for VrAttributes {
    fn default() -> Self {
        Self {
            admin_v4: true,
            admin_v6: true,
            mcast_v4: false,
            mcast_v6: false,
            src_mac: None,
            ttl1_action: PacketAction::Trap,
            ip_options_action: PacketAction::Trap,
        }
    }
}

impl VrAttributes {
    pub fn apply(&mut self, attr: VrAttribute) {
        match attr {
            VrAttribute::AdminV4(on) => self.admin_v4 = on,
            VrAttribute::AdminV6(on) => self.admin_v6 = on,
            VrAttribute::McastV4(on) => self.mcast_v4 = on,
            VrAttribute::McastV6(on) => self.mcast_v6 = on,
            VrAttribute::SrcMac(mac) => self.src_mac = Some(mac),
            VrAttribute::Ttl1Action(action) => self.ttl1_action = action,
            VrAttribute::IpOptionsAction(action) => self.ip_options_action = action,
        }
    }
}

/// A single virtual router attribute write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrAttribute {
    AdminV4(bool),
    AdminV6(bool),
    McastV4(bool),
    McastV6(bool),
    SrcMac(MacAddress),
    Ttl1Action(PacketAction),
    IpOptionsAction(PacketAction),
}

/// Router interface type, derived from its attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RifType {
    Port,
    Vlan,
    Lag,
    Bridge,
}

impl fmt::Display for RifType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RifType::Port => "port",
            RifType::Vlan => "vlan",
            RifType::Lag => "lag",
            RifType::Bridge => "bridge",
        };
        f.write_str(s)
    }
}

/// The L2 object a router interface sits on. Each variant carries the one
/// identifier its type requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RifAttachment {
    Port(PortOid),
    Vlan(VlanId),
    Lag(LagOid),
    Bridge(BridgeOid),
}

impl RifAttachment {
    pub fn rif_type(&self) -> RifType {
        match self {
            RifAttachment::Port(_) => RifType::Port,
            RifAttachment::Vlan(_) => RifType::Vlan,
            RifAttachment::Lag(_) => RifType::Lag,
            RifAttachment::Bridge(_) => RifType::Bridge,
        }
    }

    /// True if the attachment names a null handle.
    pub fn is_null(&self) -> bool {
        match self {
            RifAttachment::Port(oid) => oid.is_null(),
            RifAttachment::Lag(oid) => oid.is_null(),
            RifAttachment::Bridge(oid) => oid.is_null(),
            RifAttachment::Vlan(_) => false,
        }
    }
}

impl fmt::Display for RifAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RifAttachment::Port(oid) => write!(f, "port:{}", oid),
            RifAttachment::Vlan(vlan) => write!(f, "vlan:{}", vlan.as_u16()),
            RifAttachment::Lag(oid) => write!(f, "lag:{}", oid),
            RifAttachment::Bridge(oid) => write!(f, "bridge:{}", oid),
        }
    }
}

/// Full attribute set of a router interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RifAttributes {
    pub vr: VirtualRouterOid,
    pub attachment: RifAttachment,
    pub src_mac: Option<MacAddress>,
    pub admin_v4: bool,
    pub admin_v6: bool,
    pub mtu: u32,
    pub ip_redirect: bool,
    pub pimv2: bool,
    pub pimv6: bool,
}

impl RifAttributes {
    /// Admin up on both families, default MTU, everything else off.
    pub fn new(vr: VirtualRouterOid, attachment: RifAttachment) -> Self {
        Self {
            vr,
            attachment,
            src_mac: None,
            admin_v4: true,
            admin_v6: true,
            mtu: DEFAULT_RIF_MTU,
            ip_redirect: false,
            pimv2: false,
            pimv6: false,
        }
    }

    pub fn with_src_mac(mut self, mac: MacAddress) -> Self {
        self.src_mac = Some(mac);
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn rif_type(&self) -> RifType {
        self.attachment.rif_type()
    }

    pub fn apply(&mut self, attr: RifAttribute) {
        match attr {
            RifAttribute::SrcMac(mac) => self.src_mac = Some(mac),
            RifAttribute::AdminV4(on) => self.admin_v4 = on,
            RifAttribute::AdminV6(on) => self.admin_v6 = on,
            RifAttribute::Mtu(mtu) => self.mtu = mtu,
            RifAttribute::IpRedirect(on) => self.ip_redirect = on,
            RifAttribute::PimV2(on) => self.pimv2 = on,
            RifAttribute::PimV6(on) => self.pimv6 = on,
        }
    }
}

/// A single router interface attribute write. The VR and attachment are
/// fixed at create time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RifAttribute {
    SrcMac(MacAddress),
    AdminV4(bool),
    AdminV6(bool),
    Mtu(u32),
    IpRedirect(bool),
    PimV2(bool),
    PimV6(bool),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vr_defaults() {
        let attrs = VrAttributes::default();
        assert!(attrs.admin_v4 && attrs.admin_v6);
        assert!(!attrs.mcast_v4 && !attrs.mcast_v6);
        assert_eq!(attrs.ttl1_action, PacketAction::Trap);
        assert_eq!(attrs.ip_options_action, PacketAction::Trap);
    }

    #[test]
    fn test_vr_apply() {
        let mut attrs = VrAttributes::default();
        attrs.apply(VrAttribute::AdminV6(false));
        attrs.apply(VrAttribute::SrcMac(MacAddress::new([2, 0, 0, 0, 0, 1])));
        assert!(!attrs.admin_v6);
        assert_eq!(attrs.src_mac, Some(MacAddress::new([2, 0, 0, 0, 0, 1])));
    }

    #[test]
    fn test_rif_type_follows_attachment() {
        let vr = VirtualRouterOid::from_raw(1).unwrap();
        let vlan = RifAttachment::Vlan(VlanId::new(10).unwrap());
        let attrs = RifAttributes::new(vr, vlan);
        assert_eq!(attrs.rif_type(), RifType::Vlan);
        assert_eq!(attrs.mtu, DEFAULT_RIF_MTU);
        assert!(RifAttachment::Port(PortOid::NULL).is_null());
        assert_eq!(vlan.to_string(), "vlan:10");
    }
}
