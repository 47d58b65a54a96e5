//! Next-hop and next-hop group attributes.

use crate::types::{NextHopOid, RouterInterfaceOid};
use l3_types::{IpAddress, MacAddress};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the backend programs for one next-hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopAttributes {
    pub rif: RouterInterfaceOid,
    pub ip: IpAddress,
    /// Destination MAC taken from the resolved neighbor.
    pub mac: MacAddress,
}

/// A single next-hop attribute write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHopAttribute {
    DestinationMac(MacAddress),
}

/// Next-hop group flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Equal-cost: every member gets the same share.
    #[default]
    Ecmp,
    /// Weighted: shares are proportional to member weights.
    WeightedEcmp,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupType::Ecmp => f.write_str("ecmp"),
            GroupType::WeightedEcmp => f.write_str("wecmp"),
        }
    }
}

/// One member of a next-hop group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GroupMember {
    pub next_hop: NextHopOid,
    pub weight: u32,
}

impl GroupMember {
    pub fn new(next_hop: NextHopOid, weight: u32) -> Self {
        Self { next_hop, weight }
    }

    /// A member with the unit weight used for plain ECMP.
    pub fn equal(next_hop: NextHopOid) -> Self {
        Self::new(next_hop, 1)
    }
}

/// What the backend programs when creating a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopGroupAttributes {
    pub group_type: GroupType,
    pub resilient_hash: bool,
    pub members: Vec<GroupMember>,
}
