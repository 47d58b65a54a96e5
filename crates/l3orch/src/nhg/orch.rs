//! Next-hop group orchestration logic.

use std::collections::BTreeSet;
use std::sync::Arc;

use l3_hal::{
    BackendCapabilities, GroupMember, GroupType, HalError, L3Backend, NextHopGroupAttributes,
    NextHopGroupOid, NextHopOid,
};
use l3_orch_common::ObjectTable;
use log::{debug, error, info, warn};

use super::types::{reduce_weights, GroupRequest, GroupState, NextHopGroup};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::L3OrchConfig;
use crate::error::{L3Error, L3Result};
use crate::list::{fill, ListResult};
use crate::nexthop::NextHopOrch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NhgOrchStats {
    pub groups_created: u64,
    pub groups_removed: u64,
    pub members_added: u64,
    pub members_removed: u64,
    pub replacements: u64,
    /// Incremental member changes that failed after adding members.
    pub partial_replacements: u64,
}

/// Member changes needed to turn one member list into another.
#[derive(Debug, Default)]
struct MemberDiff {
    added: Vec<GroupMember>,
    reweighted: Vec<GroupMember>,
    removed: Vec<NextHopOid>,
}

impl MemberDiff {
    fn between(current: &[GroupMember], target: &[GroupMember]) -> Self {
        let mut diff = MemberDiff::default();
        for member in target {
            match current.iter().find(|m| m.next_hop == member.next_hop) {
                None => diff.added.push(*member),
                Some(old) if old.weight != member.weight => diff.reweighted.push(*member),
                Some(_) => {}
            }
        }
        diff.removed = current
            .iter()
            .filter(|m| !target.iter().any(|t| t.next_hop == m.next_hop))
            .map(|m| m.next_hop)
            .collect();
        diff
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.reweighted.is_empty() && self.removed.is_empty()
    }
}

/// Creates next-hop groups and changes their member sets.
///
/// Every membership holds one reference on its next-hop. Member lists are
/// swapped make-before-break: with an atomic backend in one call, otherwise
/// as adds, then weight changes, then removes.
pub struct NhgOrch {
    backend: Arc<dyn L3Backend>,
    caps: BackendCapabilities,
    normalize_weights: bool,
    table: ObjectTable<NextHopGroupOid, NextHopGroup>,
    stats: NhgOrchStats,
}

impl std::fmt::Debug for NhgOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NhgOrch")
            .field("group_count", &self.table.len())
            .field("caps", &self.caps)
            .field("stats", &self.stats)
            .finish()
    }
}

impl NhgOrch {
    /// Reads the backend's capabilities and narrows them by the configured
    /// operator caps.
    pub fn new(backend: Arc<dyn L3Backend>, config: &L3OrchConfig) -> Self {
        let mut caps = backend.capabilities();
        if let Some(max) = config.max_groups {
            caps.max_groups = caps.max_groups.min(max);
        }
        if let Some(max) = config.max_group_members {
            caps.max_group_members = caps.max_group_members.min(max);
        }
        info!(
            "NhgOrch: {} group slots, {} members per group, atomic replace {}, resilient hash {}",
            caps.max_groups, caps.max_group_members, caps.atomic_group_replace, caps.resilient_hash
        );
        Self {
            backend,
            caps,
            normalize_weights: config.normalize_weights,
            table: ObjectTable::new("next-hop group"),
            stats: NhgOrchStats::default(),
        }
    }

    /// Effective limits after operator caps.
    pub fn capabilities(&self) -> BackendCapabilities {
        self.caps
    }

    pub fn stats(&self) -> &NhgOrchStats {
        &self.stats
    }

    pub fn group_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_live(&self, group: NextHopGroupOid) -> bool {
        self.table.is_live(&group)
    }

    pub fn ref_count(&self, group: NextHopGroupOid) -> u32 {
        self.table.ref_count(&group)
    }

    pub fn get_group(&self, group: NextHopGroupOid) -> L3Result<NextHopGroup> {
        self.table
            .get(&group)
            .cloned()
            .ok_or_else(|| L3Error::not_found(format!("next-hop group {}", group)))
    }

    /// Copies the group's members into `buf`.
    pub fn group_members(
        &self,
        group: NextHopGroupOid,
        buf: &mut [GroupMember],
    ) -> L3Result<ListResult> {
        let entry = self
            .table
            .get(&group)
            .ok_or_else(|| L3Error::not_found(format!("next-hop group {}", group)))?;
        Ok(fill(buf, entry.members.iter().copied()))
    }

    /// Validates a member list. ECMP weights are forced to 1.
    fn normalize(
        &self,
        group_type: GroupType,
        members: &[GroupMember],
        next_hops: &NextHopOrch,
    ) -> L3Result<Vec<GroupMember>> {
        if members.len() > self.caps.max_group_members as usize {
            return Err(L3Error::invalid(format!(
                "{} members exceed the limit of {}",
                members.len(),
                self.caps.max_group_members
            )));
        }

        let mut seen = BTreeSet::new();
        let mut normalized = Vec::with_capacity(members.len());
        for member in members {
            if !seen.insert(member.next_hop) {
                return Err(L3Error::invalid(format!(
                    "next-hop {} listed more than once",
                    member.next_hop
                )));
            }
            if !next_hops.is_live(member.next_hop) {
                return Err(L3Error::not_found(format!("next-hop {}", member.next_hop)));
            }
            match group_type {
                GroupType::Ecmp => normalized.push(GroupMember::equal(member.next_hop)),
                GroupType::WeightedEcmp if member.weight == 0 => {
                    return Err(L3Error::invalid(format!(
                        "next-hop {} has weight 0; omit the member instead",
                        member.next_hop
                    )))
                }
                GroupType::WeightedEcmp => normalized.push(*member),
            }
        }

        Ok(normalized)
    }

    /// Weights as they are programmed, plus the divisor taken out of the
    /// requested ones.
    fn program(
        &self,
        group_type: GroupType,
        mut members: Vec<GroupMember>,
    ) -> (Vec<GroupMember>, u32) {
        if self.normalize_weights && group_type == GroupType::WeightedEcmp {
            let scale = reduce_weights(&mut members);
            (members, scale)
        } else {
            (members, 1)
        }
    }

    fn retain_members(next_hops: &mut NextHopOrch, members: &[GroupMember]) -> L3Result<()> {
        for (taken, member) in members.iter().enumerate() {
            if let Err(e) = next_hops.retain(member.next_hop) {
                Self::release_members(next_hops, &members[..taken])?;
                return Err(e);
            }
        }
        Ok(())
    }

    fn release_members(next_hops: &mut NextHopOrch, members: &[GroupMember]) -> L3Result<()> {
        for member in members {
            next_hops.release(member.next_hop)?;
        }
        Ok(())
    }

    fn set_state(&mut self, group: NextHopGroupOid, state: GroupState) {
        if let Some(entry) = self.table.get_mut(&group) {
            entry.state = state;
        }
    }

    pub fn create_group(
        &mut self,
        next_hops: &mut NextHopOrch,
        req: GroupRequest,
    ) -> L3Result<NextHopGroupOid> {
        let result = self.try_create_group(next_hops, &req);
        match &result {
            Ok(group) => audit_log!(
                AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_group")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(group.to_string())
                    .with_object_type("next_hop_group")
                    .with_details(serde_json::json!({
                        "group_type": req.group_type.to_string(),
                        "member_count": req.members.len(),
                        "resilient_hash": req.resilient_hash,
                    }))
            ),
            Err(e) => {
                warn!("NhgOrch: create_group failed: {}", e);
                audit_log!(
                    AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_group")
                        .with_object_type("next_hop_group")
                        .with_error(e.to_string())
                        .with_details(serde_json::json!({
                            "group_type": req.group_type.to_string(),
                            "member_count": req.members.len(),
                        }))
                );
            }
        }
        result
    }

    fn try_create_group(
        &mut self,
        next_hops: &mut NextHopOrch,
        req: &GroupRequest,
    ) -> L3Result<NextHopGroupOid> {
        if req.resilient_hash && !self.caps.resilient_hash {
            return Err(L3Error::Unsupported("resilient hashing".to_string()));
        }
        if self.table.len() >= self.caps.max_groups as usize {
            return Err(L3Error::Backend(HalError::table_full("next-hop group")));
        }

        let requested = self.normalize(req.group_type, &req.members, next_hops)?;
        let (members, weight_scale) = self.program(req.group_type, requested);
        Self::retain_members(next_hops, &members)?;

        let attrs = NextHopGroupAttributes {
            group_type: req.group_type,
            resilient_hash: req.resilient_hash,
            members,
        };
        let backend = &self.backend;
        let result = self.table.allocate(|| {
            backend
                .create_next_hop_group(&attrs)
                .map(|group| {
                    (
                        group,
                        NextHopGroup {
                            group_type: attrs.group_type,
                            resilient_hash: attrs.resilient_hash,
                            members: attrs.members.clone(),
                            weight_scale,
                            state: GroupState::settled(attrs.members.len()),
                        },
                    )
                })
                .map_err(L3Error::from)
        });

        match result {
            Ok(group) => {
                self.stats.groups_created += 1;
                info!(
                    "NhgOrch: created {} group {} with {} member(s)",
                    attrs.group_type,
                    group,
                    attrs.members.len()
                );
                Ok(group)
            }
            Err(e) => {
                Self::release_members(next_hops, &attrs.members)?;
                Err(e)
            }
        }
    }

    /// Swaps the group's member set for `members`.
    ///
    /// On an incremental backend a failure after the new members were added
    /// leaves the group `Growing` with old and new members present, and
    /// returns the backend error.
    pub fn replace_members(
        &mut self,
        next_hops: &mut NextHopOrch,
        group: NextHopGroupOid,
        members: Vec<GroupMember>,
    ) -> L3Result<()> {
        let current = self.get_group(group)?;
        let requested = match self.normalize(current.group_type, &members, next_hops) {
            Ok(requested) => requested,
            Err(e) => {
                self.audit_failure(group, "replace_members", &e);
                return Err(e);
            }
        };
        let (target, weight_scale) = self.program(current.group_type, requested);

        let diff = MemberDiff::between(&current.members, &target);
        if diff.is_empty() {
            let member_count = target.len();
            if let Some(entry) = self.table.get_mut(&group) {
                entry.members = target;
                entry.weight_scale = weight_scale;
                entry.state = GroupState::settled(member_count);
            }
            debug!("NhgOrch: group {} already has the requested members", group);
            return Ok(());
        }

        Self::retain_members(next_hops, &diff.added)?;
        self.set_state(group, GroupState::Replacing);

        if self.caps.atomic_group_replace {
            if let Err(e) = self.backend.replace_group_members(group, &target) {
                let err = L3Error::from(e);
                self.set_state(group, current.state);
                Self::release_members(next_hops, &diff.added)?;
                self.audit_failure(group, "replace_members", &err);
                return Err(err);
            }
        } else {
            self.apply_incremental(
                next_hops,
                group,
                &current,
                &diff,
                weight_scale,
                "replace_members",
            )?;
        }

        let removed: Vec<GroupMember> = current
            .members
            .iter()
            .filter(|m| diff.removed.contains(&m.next_hop))
            .copied()
            .collect();
        Self::release_members(next_hops, &removed)?;

        let member_count = target.len();
        if let Some(entry) = self.table.get_mut(&group) {
            entry.members = target;
            entry.weight_scale = weight_scale;
            entry.state = GroupState::settled(member_count);
        }
        self.stats.replacements += 1;
        self.stats.members_added += diff.added.len() as u64;
        self.stats.members_removed += diff.removed.len() as u64;

        info!(
            "NhgOrch: replaced members of group {} (+{} -{} ~{})",
            group,
            diff.added.len(),
            diff.removed.len(),
            diff.reweighted.len()
        );
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", "replace_members")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_details(serde_json::json!({
                    "added": diff.added.len(),
                    "removed": diff.removed.len(),
                    "reweighted": diff.reweighted.len(),
                    "atomic": self.caps.atomic_group_replace,
                }))
        );
        Ok(())
    }

    /// Adds, reweights, then removes. Nothing is removed before every add
    /// has landed.
    fn apply_incremental(
        &mut self,
        next_hops: &mut NextHopOrch,
        group: NextHopGroupOid,
        current: &NextHopGroup,
        diff: &MemberDiff,
        weight_scale: u32,
        action: &str,
    ) -> L3Result<()> {
        if !diff.added.is_empty() {
            if let Err(e) = self.backend.add_group_members(group, &diff.added) {
                let err = L3Error::from(e);
                self.set_state(group, current.state);
                Self::release_members(next_hops, &diff.added)?;
                self.audit_failure(group, action, &err);
                return Err(err);
            }
        }

        let mut members = current.members.clone();
        members.extend(diff.added.iter().copied());

        let mut failure = None;
        for update in &diff.reweighted {
            if let Err(e) = self
                .backend
                .set_group_member_weight(group, update.next_hop, update.weight)
            {
                failure = Some(e);
                break;
            }
            if let Some(member) = members.iter_mut().find(|m| m.next_hop == update.next_hop) {
                member.weight = update.weight;
            }
        }
        if failure.is_none() && !diff.removed.is_empty() {
            failure = self.backend.remove_group_members(group, &diff.removed).err();
        }

        let Some(e) = failure else {
            return Ok(());
        };

        let err = L3Error::from(e);
        let member_count = members.len();
        if let Some(entry) = self.table.get_mut(&group) {
            entry.members = members;
            entry.weight_scale = weight_scale;
            entry.state = GroupState::Growing;
        }
        self.stats.partial_replacements += 1;
        self.stats.members_added += diff.added.len() as u64;
        error!(
            "NhgOrch: group {} left growing with {} member(s) after partial {}: {}",
            group, member_count, action, err
        );
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", action)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_error(err.to_string())
                .with_details(serde_json::json!({
                    "state": GroupState::Growing,
                    "member_count": member_count,
                    "pending_removals": diff.removed.len(),
                }))
        );
        Err(err)
    }

    /// Adds members to a live group. Existing members are rejected with
    /// `AlreadyExists`.
    ///
    /// Weighted-ECMP weights are taken at the scale the group was requested
    /// at. When the combined set reduces differently, existing members are
    /// reweighted after the new ones are added.
    pub fn add_members(
        &mut self,
        next_hops: &mut NextHopOrch,
        group: NextHopGroupOid,
        members: Vec<GroupMember>,
    ) -> L3Result<()> {
        let current = self.get_group(group)?;
        if let Some(dup) = members.iter().find(|m| current.contains(m.next_hop)) {
            return Err(L3Error::AlreadyExists(format!(
                "next-hop {} in group {}",
                dup.next_hop, group
            )));
        }
        let limit = self.caps.max_group_members as usize;
        if current.members.len() + members.len() > limit {
            return Err(L3Error::invalid(format!(
                "group {} would have {} members, limit is {}",
                group,
                current.members.len() + members.len(),
                limit
            )));
        }
        let requested = self.normalize(current.group_type, &members, next_hops)?;
        if requested.is_empty() {
            return Ok(());
        }

        let mut combined = current.requested_members();
        combined.extend(requested);
        let (target, weight_scale) = self.program(current.group_type, combined);
        let diff = MemberDiff::between(&current.members, &target);

        Self::retain_members(next_hops, &diff.added)?;
        self.set_state(group, GroupState::Growing);
        if self.caps.atomic_group_replace && !diff.reweighted.is_empty() {
            if let Err(e) = self.backend.replace_group_members(group, &target) {
                let err = L3Error::from(e);
                self.set_state(group, current.state);
                Self::release_members(next_hops, &diff.added)?;
                self.audit_failure(group, "add_members", &err);
                return Err(err);
            }
        } else {
            self.apply_incremental(
                next_hops,
                group,
                &current,
                &diff,
                weight_scale,
                "add_members",
            )?;
        }

        let member_count = target.len();
        if let Some(entry) = self.table.get_mut(&group) {
            entry.members = target;
            entry.weight_scale = weight_scale;
            entry.state = GroupState::settled(member_count);
        }
        self.stats.members_added += diff.added.len() as u64;
        debug!(
            "NhgOrch: added {} member(s) to group {} (~{})",
            diff.added.len(),
            group,
            diff.reweighted.len()
        );
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", "add_members")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_details(serde_json::json!({
                    "added": diff.added.len(),
                    "reweighted": diff.reweighted.len(),
                }))
        );
        Ok(())
    }

    /// Removes members from a live group. Next-hops that are not members are
    /// rejected with `NotFound`.
    pub fn remove_members(
        &mut self,
        next_hops: &mut NextHopOrch,
        group: NextHopGroupOid,
        members: &[NextHopOid],
    ) -> L3Result<()> {
        let current = self.get_group(group)?;
        let mut seen = BTreeSet::new();
        let mut removed = Vec::with_capacity(members.len());
        for &nh in members {
            if !seen.insert(nh) {
                return Err(L3Error::invalid(format!("next-hop {} listed more than once", nh)));
            }
            let member = current
                .member(nh)
                .ok_or_else(|| L3Error::not_found(format!("next-hop {} in group {}", nh, group)))?;
            removed.push(*member);
        }
        if removed.is_empty() {
            return Ok(());
        }

        self.set_state(group, GroupState::Shrinking);
        if let Err(e) = self.backend.remove_group_members(group, members) {
            let err = L3Error::from(e);
            self.set_state(group, current.state);
            self.audit_failure(group, "remove_members", &err);
            return Err(err);
        }

        Self::release_members(next_hops, &removed)?;
        if let Some(entry) = self.table.get_mut(&group) {
            entry.members.retain(|m| !seen.contains(&m.next_hop));
            entry.state = GroupState::settled(entry.members.len());
        }
        self.stats.members_removed += removed.len() as u64;
        debug!("NhgOrch: removed {} member(s) from group {}", removed.len(), group);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", "remove_members")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_details(serde_json::json!({ "removed": removed.len() }))
        );
        Ok(())
    }

    pub fn set_group_resilient_hash(
        &mut self,
        group: NextHopGroupOid,
        enabled: bool,
    ) -> L3Result<()> {
        if enabled && !self.caps.resilient_hash {
            let err = L3Error::Unsupported("resilient hashing".to_string());
            self.audit_failure(group, "set_group_resilient_hash", &err);
            return Err(err);
        }
        let current = self.get_group(group)?;
        if current.resilient_hash == enabled {
            return Ok(());
        }
        if let Err(e) = self.backend.set_group_resilient_hash(group, enabled) {
            let err = L3Error::from(e);
            self.audit_failure(group, "set_group_resilient_hash", &err);
            return Err(err);
        }
        if let Some(entry) = self.table.get_mut(&group) {
            entry.resilient_hash = enabled;
        }
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", "set_group_resilient_hash")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_details(serde_json::json!({ "resilient_hash": enabled }))
        );
        Ok(())
    }

    /// Deletes a group no route references and releases its members.
    pub fn delete_group(
        &mut self,
        next_hops: &mut NextHopOrch,
        group: NextHopGroupOid,
    ) -> L3Result<()> {
        if let Err(e) = self.table.ensure_unreferenced(&group, 1) {
            let err = L3Error::from(e);
            warn!("NhgOrch: refusing to delete group {}: {}", group, err);
            audit_log!(
                AuditRecord::new(AuditCategory::ResourceDelete, "NhgOrch", "delete_group")
                    .with_object_id(group.to_string())
                    .with_object_type("next_hop_group")
                    .with_error(err.to_string())
                    .with_outcome(AuditOutcome::Denied)
            );
            return Err(err);
        }

        if let Err(e) = self.backend.remove_next_hop_group(group) {
            let err = L3Error::from(e);
            self.audit_failure(group, "delete_group", &err);
            return Err(err);
        }

        self.table.release(&group)?;
        let mut removed = self.table.retire(&group)?;
        Self::release_members(next_hops, &removed.members)?;
        removed.state = GroupState::Deleted;
        self.stats.groups_removed += 1;

        info!("NhgOrch: removed group {}", group);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceDelete, "NhgOrch", "delete_group")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_details(serde_json::json!({
                    "state": removed.state,
                    "released_members": removed.members.len(),
                }))
        );
        Ok(())
    }

    fn audit_failure(&self, group: NextHopGroupOid, action: &str, err: &L3Error) {
        warn!("NhgOrch: {} on group {} failed: {}", action, group, err);
        audit_log!(
            AuditRecord::new(AuditCategory::ResourceModify, "NhgOrch", action)
                .with_object_id(group.to_string())
                .with_object_type("next_hop_group")
                .with_error(err.to_string())
        );
    }

    /// Takes a reference on behalf of a route.
    pub(crate) fn retain(&mut self, group: NextHopGroupOid) -> L3Result<()> {
        self.table.retain(&group)?;
        Ok(())
    }

    pub(crate) fn release(&mut self, group: NextHopGroupOid) -> L3Result<()> {
        let last = self.table.release(&group)?;
        debug_assert!(!last, "route released creator hold on {}", group);
        if last {
            error!("NhgOrch: route released last reference on {}", group);
            self.table.restore(&group)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neigh::{NeighOrch, NeighborRequest};
    use crate::rif::RifOrch;
    use crate::vr::VrOrch;
    use l3_hal::{
        BackendOp, MemoryBackend, MemoryRegistry, PortOid, RifAttachment, RifAttributes,
        VrAttributes,
    };
    use l3_types::{IpAddress, MacAddress};
    use pretty_assertions::assert_eq;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        next_hops: NextHopOrch,
        groups: NhgOrch,
        nhs: Vec<NextHopOid>,
    }

    fn fixture_with(caps: BackendCapabilities, config: L3OrchConfig) -> Fixture {
        let backend = Arc::new(MemoryBackend::with_capabilities(caps));
        let registry = Arc::new(MemoryRegistry::new());
        let port = PortOid::from_raw(0x5).unwrap();
        registry.add_port(port);

        let mut vrs = VrOrch::new(backend.clone());
        let mut rifs = RifOrch::new(backend.clone(), registry.clone());
        let mut neighbors = NeighOrch::new(backend.clone(), registry);
        let mut next_hops = NextHopOrch::new(backend.clone());
        let vr = vrs.create_vr(VrAttributes::default()).unwrap();
        let rif = rifs
            .create_rif(&mut vrs, RifAttributes::new(vr, RifAttachment::Port(port)))
            .unwrap();

        let mut nhs = Vec::new();
        for host in 1..=4u8 {
            let ip = IpAddress::v4(10, 0, 0, host);
            neighbors
                .add_neighbor(
                    &vrs,
                    &mut rifs,
                    NeighborRequest::new(vr, rif, ip)
                        .with_mac(MacAddress::new([0x00, 0xaa, 0, 0, 0, host])),
                )
                .unwrap();
            nhs.push(
                next_hops
                    .create_next_hop(&vrs, &mut rifs, &mut neighbors, vr, rif, ip)
                    .unwrap(),
            );
        }

        Fixture {
            groups: NhgOrch::new(backend.clone(), &config),
            backend,
            next_hops,
            nhs,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryBackend::DEFAULT_CAPABILITIES, L3OrchConfig::default())
    }

    fn incremental() -> BackendCapabilities {
        BackendCapabilities {
            atomic_group_replace: false,
            ..MemoryBackend::DEFAULT_CAPABILITIES
        }
    }

    fn next_hop_ids(members: &[GroupMember]) -> Vec<NextHopOid> {
        members.iter().map(|m| m.next_hop).collect()
    }

    #[test]
    fn test_create_retains_each_member_once() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0], f.nhs[1]]))
            .unwrap();

        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 2);
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 2);
        assert_eq!(f.next_hops.ref_count(f.nhs[2]), 1);
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.state, GroupState::Active);
        assert_eq!(f.backend.group(group).unwrap().members, stored.members);
    }

    #[test]
    fn test_ecmp_weights_ignored() {
        let mut f = fixture();
        let req = GroupRequest::new(
            GroupType::Ecmp,
            vec![GroupMember::new(f.nhs[0], 0), GroupMember::new(f.nhs[1], 7)],
        );
        let group = f.groups.create_group(&mut f.next_hops, req).unwrap();
        let weights: Vec<u32> = f
            .groups
            .get_group(group)
            .unwrap()
            .members
            .iter()
            .map(|m| m.weight)
            .collect();
        assert_eq!(weights, vec![1, 1]);
    }

    #[test]
    fn test_weighted_zero_rejected() {
        let mut f = fixture();
        let req = GroupRequest::new(
            GroupType::WeightedEcmp,
            vec![GroupMember::new(f.nhs[0], 0)],
        );
        let err = f.groups.create_group(&mut f.next_hops, req).unwrap_err();
        assert!(matches!(err, L3Error::InvalidArgument(_)));
        assert_eq!(f.groups.group_count(), 0);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
    }

    #[test]
    fn test_weighted_gcd_reduction() {
        let mut f = fixture();
        let req = GroupRequest::new(
            GroupType::WeightedEcmp,
            vec![GroupMember::new(f.nhs[0], 4), GroupMember::new(f.nhs[1], 6)],
        );
        let group = f.groups.create_group(&mut f.next_hops, req.clone()).unwrap();
        assert_eq!(
            f.groups.get_group(group).unwrap().members,
            vec![GroupMember::new(f.nhs[0], 2), GroupMember::new(f.nhs[1], 3)]
        );

        let mut f = fixture_with(
            MemoryBackend::DEFAULT_CAPABILITIES,
            L3OrchConfig {
                normalize_weights: false,
                ..L3OrchConfig::default()
            },
        );
        let req = GroupRequest::new(
            GroupType::WeightedEcmp,
            vec![GroupMember::new(f.nhs[0], 4), GroupMember::new(f.nhs[1], 6)],
        );
        let group = f.groups.create_group(&mut f.next_hops, req).unwrap();
        assert_eq!(f.groups.get_group(group).unwrap().members[0].weight, 4);
    }

    #[test]
    fn test_duplicate_and_unknown_members() {
        let mut f = fixture();
        let err = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0], f.nhs[0]]))
            .unwrap_err();
        assert!(matches!(err, L3Error::InvalidArgument(_)));

        let ghost = NextHopOid::from_raw(0xdead).unwrap();
        let err = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0], ghost]))
            .unwrap_err();
        assert!(matches!(err, L3Error::NotFound(_)));
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
    }

    #[test]
    fn test_member_limit() {
        let mut f = fixture_with(
            MemoryBackend::DEFAULT_CAPABILITIES,
            L3OrchConfig::default().with_max_group_members(2),
        );
        assert_eq!(f.groups.capabilities().max_group_members, 2);
        let err = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp(f.nhs[..3].to_vec()))
            .unwrap_err();
        assert!(matches!(err, L3Error::InvalidArgument(_)));
    }

    #[test]
    fn test_group_slots_exhausted() {
        let mut f = fixture_with(
            MemoryBackend::DEFAULT_CAPABILITIES,
            L3OrchConfig::default().with_max_groups(1),
        );
        f.groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        f.backend.clear_calls();

        let err = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[1]]))
            .unwrap_err();
        assert!(matches!(err, L3Error::Backend(HalError::TableFull { .. })));
        assert!(f.backend.calls().is_empty());
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 1);
    }

    #[test]
    fn test_resilient_hash_requires_capability() {
        let mut f = fixture_with(
            BackendCapabilities {
                resilient_hash: false,
                ..MemoryBackend::DEFAULT_CAPABILITIES
            },
            L3OrchConfig::default(),
        );
        let err = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]).resilient())
            .unwrap_err();
        assert!(matches!(err, L3Error::Unsupported(_)));

        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        assert!(matches!(
            f.groups.set_group_resilient_hash(group, true),
            Err(L3Error::Unsupported(_))
        ));
        f.groups.set_group_resilient_hash(group, false).unwrap();
    }

    #[test]
    fn test_atomic_replace() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0], f.nhs[1]]))
            .unwrap();
        f.backend.clear_calls();

        f.groups
            .replace_members(
                &mut f.next_hops,
                group,
                vec![GroupMember::equal(f.nhs[1]), GroupMember::equal(f.nhs[2])],
            )
            .unwrap();

        assert_eq!(f.backend.calls(), vec![BackendOp::ReplaceGroupMembers]);
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(next_hop_ids(&stored.members), vec![f.nhs[1], f.nhs[2]]);
        assert_eq!(next_hop_ids(&f.backend.group(group).unwrap().members), vec![f.nhs[1], f.nhs[2]]);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 2);
        assert_eq!(f.next_hops.ref_count(f.nhs[2]), 2);
    }

    #[test]
    fn test_atomic_replace_failure_keeps_old_set() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        f.backend
            .fail_next(BackendOp::ReplaceGroupMembers, HalError::timeout("replace"));

        let err = f
            .groups
            .replace_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[1])])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BackendFailure);
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(next_hop_ids(&stored.members), vec![f.nhs[0]]);
        assert_eq!(stored.state, GroupState::Active);
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 1);
    }

    #[test]
    fn test_incremental_replace_adds_before_removes() {
        let mut f = fixture_with(incremental(), L3OrchConfig::default());
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0], f.nhs[1]]))
            .unwrap();
        f.backend.clear_calls();

        f.groups
            .replace_members(
                &mut f.next_hops,
                group,
                vec![GroupMember::equal(f.nhs[1]), GroupMember::equal(f.nhs[2])],
            )
            .unwrap();

        assert_eq!(
            f.backend.calls(),
            vec![BackendOp::AddGroupMembers, BackendOp::RemoveGroupMembers]
        );
        let mut programmed = next_hop_ids(&f.backend.group(group).unwrap().members);
        programmed.sort();
        assert_eq!(programmed, vec![f.nhs[1], f.nhs[2]]);
        assert_eq!(f.groups.get_group(group).unwrap().state, GroupState::Active);
    }

    #[test]
    fn test_incremental_replace_failure_leaves_growing() {
        let mut f = fixture_with(incremental(), L3OrchConfig::default());
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        f.backend
            .fail_next(BackendOp::RemoveGroupMembers, HalError::timeout("remove"));

        let err = f
            .groups
            .replace_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[1])])
            .unwrap_err();
        assert!(matches!(err, L3Error::Backend(_)));

        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.state, GroupState::Growing);
        assert_eq!(next_hop_ids(&stored.members), vec![f.nhs[0], f.nhs[1]]);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 2);
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 2);
        assert_eq!(f.groups.stats().partial_replacements, 1);

        // Retrying converges.
        f.groups
            .replace_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[1])])
            .unwrap();
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.state, GroupState::Active);
        assert_eq!(next_hop_ids(&stored.members), vec![f.nhs[1]]);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
    }

    #[test]
    fn test_incremental_add_failure_is_clean() {
        let mut f = fixture_with(incremental(), L3OrchConfig::default());
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        f.backend
            .fail_next(BackendOp::AddGroupMembers, HalError::table_full("members"));

        assert!(f
            .groups
            .replace_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[1])])
            .is_err());
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.state, GroupState::Active);
        assert_eq!(next_hop_ids(&stored.members), vec![f.nhs[0]]);
        assert_eq!(f.next_hops.ref_count(f.nhs[1]), 1);
    }

    #[test]
    fn test_add_and_remove_members() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([]))
            .unwrap();
        assert_eq!(f.groups.get_group(group).unwrap().state, GroupState::Empty);

        f.groups
            .add_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[0])])
            .unwrap();
        assert!(matches!(
            f.groups
                .add_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[0])]),
            Err(L3Error::AlreadyExists(_))
        ));
        assert!(matches!(
            f.groups.remove_members(&mut f.next_hops, group, &[f.nhs[3]]),
            Err(L3Error::NotFound(_))
        ));

        f.groups
            .remove_members(&mut f.next_hops, group, &[f.nhs[0]])
            .unwrap();
        assert_eq!(f.groups.get_group(group).unwrap().state, GroupState::Empty);
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
    }

    fn weighted(members: &[(NextHopOid, u32)]) -> Vec<GroupMember> {
        members
            .iter()
            .map(|&(nh, weight)| GroupMember::new(nh, weight))
            .collect()
    }

    #[test]
    fn test_add_members_keeps_requested_weight_scale() {
        let mut f = fixture();
        let req = GroupRequest::new(
            GroupType::WeightedEcmp,
            weighted(&[(f.nhs[0], 2), (f.nhs[1], 4)]),
        );
        let group = f.groups.create_group(&mut f.next_hops, req).unwrap();
        assert_eq!(f.groups.get_group(group).unwrap().weight_scale, 2);

        // Same requested weight as nhs[0], so the same share.
        f.groups
            .add_members(&mut f.next_hops, group, weighted(&[(f.nhs[2], 2)]))
            .unwrap();
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.members, weighted(&[(f.nhs[0], 1), (f.nhs[1], 2), (f.nhs[2], 1)]));
        assert_eq!(f.backend.group(group).unwrap().members, stored.members);

        // A coprime weight rescales the existing members in one swap.
        f.backend.clear_calls();
        f.groups
            .add_members(&mut f.next_hops, group, weighted(&[(f.nhs[3], 3)]))
            .unwrap();
        assert_eq!(f.backend.calls(), vec![BackendOp::ReplaceGroupMembers]);
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(
            stored.members,
            weighted(&[(f.nhs[0], 2), (f.nhs[1], 4), (f.nhs[2], 2), (f.nhs[3], 3)])
        );
        assert_eq!(stored.weight_scale, 1);
        assert_eq!(stored.state, GroupState::Active);
        assert_eq!(f.backend.group(group).unwrap().members, stored.members);
        assert_eq!(f.next_hops.ref_count(f.nhs[3]), 2);
    }

    #[test]
    fn test_incremental_add_members_reweights_after_adding() {
        let mut f = fixture_with(incremental(), L3OrchConfig::default());
        let req = GroupRequest::new(
            GroupType::WeightedEcmp,
            weighted(&[(f.nhs[0], 4), (f.nhs[1], 8)]),
        );
        let group = f.groups.create_group(&mut f.next_hops, req).unwrap();
        f.backend.clear_calls();

        f.groups
            .add_members(&mut f.next_hops, group, weighted(&[(f.nhs[2], 2)]))
            .unwrap();
        assert_eq!(
            f.backend.calls(),
            vec![
                BackendOp::AddGroupMembers,
                BackendOp::SetGroupMemberWeight,
                BackendOp::SetGroupMemberWeight,
            ]
        );
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.members, weighted(&[(f.nhs[0], 2), (f.nhs[1], 4), (f.nhs[2], 1)]));
        assert_eq!(f.backend.group(group).unwrap().members, stored.members);
    }

    #[test]
    fn test_replace_with_current_set_settles_growing_group() {
        let mut f = fixture_with(incremental(), L3OrchConfig::default());
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        f.backend
            .fail_next(BackendOp::RemoveGroupMembers, HalError::timeout("remove"));
        assert!(f
            .groups
            .replace_members(&mut f.next_hops, group, vec![GroupMember::equal(f.nhs[1])])
            .is_err());
        assert_eq!(f.groups.get_group(group).unwrap().state, GroupState::Growing);

        // Accept the grown set as final.
        f.backend.clear_calls();
        f.groups
            .replace_members(
                &mut f.next_hops,
                group,
                vec![GroupMember::equal(f.nhs[0]), GroupMember::equal(f.nhs[1])],
            )
            .unwrap();
        assert!(f.backend.calls().is_empty());
        let stored = f.groups.get_group(group).unwrap();
        assert_eq!(stored.state, GroupState::Active);
        assert_eq!(next_hop_ids(&stored.members), vec![f.nhs[0], f.nhs[1]]);
    }

    #[test]
    fn test_group_members_truncates() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp(f.nhs.clone()))
            .unwrap();
        let mut buf = [GroupMember::default(); 2];
        let listed = f.groups.group_members(group, &mut buf).unwrap();
        assert_eq!(listed, ListResult { written: 2, total: 4 });
        assert_eq!(next_hop_ids(&buf), vec![f.nhs[0], f.nhs[1]]);
    }

    #[test]
    fn test_delete_group_releases_members() {
        let mut f = fixture();
        let group = f
            .groups
            .create_group(&mut f.next_hops, GroupRequest::ecmp([f.nhs[0]]))
            .unwrap();
        f.groups.retain(group).unwrap();
        assert!(matches!(
            f.groups.delete_group(&mut f.next_hops, group),
            Err(L3Error::ResourceInUse(_))
        ));
        f.groups.release(group).unwrap();

        f.groups.delete_group(&mut f.next_hops, group).unwrap();
        assert!(!f.groups.is_live(group));
        assert_eq!(f.next_hops.ref_count(f.nhs[0]), 1);
        assert_eq!(f.backend.group_count(), 0);
    }
}
