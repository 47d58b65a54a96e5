//! Next-hop group types.

use l3_hal::{GroupMember, GroupType, NextHopOid};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a next-hop group.
///
/// `Growing`, `Shrinking` and `Replacing` are held while a member change is
/// in flight. A group is only left in `Growing` when an incremental
/// replacement added its new members but failed before the old ones were
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Empty,
    Active,
    Growing,
    Shrinking,
    Replacing,
    Deleted,
}

impl GroupState {
    pub(crate) fn settled(member_count: usize) -> Self {
        if member_count == 0 {
            GroupState::Empty
        } else {
            GroupState::Active
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupState::Empty => "empty",
            GroupState::Active => "active",
            GroupState::Growing => "growing",
            GroupState::Shrinking => "shrinking",
            GroupState::Replacing => "replacing",
            GroupState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A next-hop group as programmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopGroup {
    pub group_type: GroupType,
    pub resilient_hash: bool,
    /// Members in request order. Each next-hop appears at most once.
    pub members: Vec<GroupMember>,
    /// Divisor applied to the requested weights before programming. 1 when
    /// weights are programmed as requested.
    pub weight_scale: u32,
    pub state: GroupState,
}

impl NextHopGroup {
    pub fn contains(&self, nh: NextHopOid) -> bool {
        self.member(nh).is_some()
    }

    pub fn member(&self, nh: NextHopOid) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.next_hop == nh)
    }

    /// Members with weights at the scale they were requested at.
    pub fn requested_members(&self) -> Vec<GroupMember> {
        self.members
            .iter()
            .map(|m| GroupMember::new(m.next_hop, m.weight.saturating_mul(self.weight_scale)))
            .collect()
    }
}

/// Request to create a next-hop group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRequest {
    pub group_type: GroupType,
    pub members: Vec<GroupMember>,
    pub resilient_hash: bool,
}

impl GroupRequest {
    pub fn new(group_type: GroupType, members: Vec<GroupMember>) -> Self {
        Self {
            group_type,
            members,
            resilient_hash: false,
        }
    }

    /// Plain ECMP over `next_hops`.
    pub fn ecmp(next_hops: impl IntoIterator<Item = NextHopOid>) -> Self {
        Self::new(
            GroupType::Ecmp,
            next_hops.into_iter().map(GroupMember::equal).collect(),
        )
    }

    pub fn resilient(mut self) -> Self {
        self.resilient_hash = true;
        self
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Divides every weight by the weights' greatest common divisor and
/// returns the divisor.
pub(crate) fn reduce_weights(members: &mut [GroupMember]) -> u32 {
    let divisor = members.iter().fold(0, |acc, m| gcd(acc, m.weight));
    if divisor <= 1 {
        return 1;
    }
    for member in members.iter_mut() {
        member.weight /= divisor;
    }
    divisor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nh(raw: u64) -> NextHopOid {
        NextHopOid::from_raw(raw).unwrap()
    }

    #[test]
    fn test_reduce_weights() {
        let mut members = vec![
            GroupMember::new(nh(1), 20),
            GroupMember::new(nh(2), 30),
            GroupMember::new(nh(3), 50),
        ];
        assert_eq!(reduce_weights(&mut members), 10);
        let weights: Vec<u32> = members.iter().map(|m| m.weight).collect();
        assert_eq!(weights, vec![2, 3, 5]);

        let mut coprime = vec![GroupMember::new(nh(1), 3), GroupMember::new(nh(2), 7)];
        assert_eq!(reduce_weights(&mut coprime), 1);
        assert_eq!(coprime[0].weight, 3);
        assert_eq!(coprime[1].weight, 7);

        let mut empty: Vec<GroupMember> = Vec::new();
        assert_eq!(reduce_weights(&mut empty), 1);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_requested_members_undo_scale() {
        let group = NextHopGroup {
            group_type: GroupType::WeightedEcmp,
            resilient_hash: false,
            members: vec![GroupMember::new(nh(1), 1), GroupMember::new(nh(2), 2)],
            weight_scale: 3,
            state: GroupState::Active,
        };
        assert_eq!(
            group.requested_members(),
            vec![GroupMember::new(nh(1), 3), GroupMember::new(nh(2), 6)]
        );
    }

    #[test]
    fn test_ecmp_request() {
        let req = GroupRequest::ecmp([nh(1), nh(2)]).resilient();
        assert_eq!(req.group_type, GroupType::Ecmp);
        assert!(req.resilient_hash);
        assert_eq!(
            req.members,
            vec![GroupMember::equal(nh(1)), GroupMember::equal(nh(2))]
        );
    }

    #[test]
    fn test_settled_state() {
        assert_eq!(GroupState::settled(0), GroupState::Empty);
        assert_eq!(GroupState::settled(3), GroupState::Active);
        assert_eq!(GroupState::Growing.to_string(), "growing");
    }
}
