//! Join logic shared by the store backends.
//!
//! Both backends answer `load_policy_lock` and `load_membership` by walking
//! proxy edges breadth-first over whatever rows they hold, under a single
//! lock acquisition. They differ only in how they fetch a row, which is what
//! [`RowSource`] abstracts.

use std::collections::{BTreeSet, HashSet, VecDeque};

use keyward_core::{AccountId, Group, GroupId, Member, OrgId, Policy, PolicyId, PolicyLock, PolicyMember};
use keyward_perms::MembershipSnapshot;

use crate::error::Result;

/// Synchronous access to current rows.
pub(crate) trait RowSource {
    fn current_policy(&self, org: &OrgId, id: &PolicyId) -> Result<Option<Policy>>;

    /// Current members of a policy, in member-key order.
    fn current_members(&self, org: &OrgId, policy: &PolicyId) -> Result<Vec<PolicyMember>>;

    fn current_group(&self, org: &OrgId, id: &GroupId) -> Result<Option<Group>>;
}

/// Collect the target policy and every policy within `max_depth` proxy hops,
/// with their `Proxy` rows and `account`'s `User` rows.
pub(crate) fn build_policy_lock<S: RowSource + ?Sized>(
    src: &S,
    org: &OrgId,
    target: &PolicyId,
    account: &AccountId,
    max_depth: usize,
) -> Result<Option<PolicyLock>> {
    let Some(root) = src.current_policy(org, target)? else {
        return Ok(None);
    };

    let mut lock = PolicyLock {
        target: Some(*target),
        ..PolicyLock::default()
    };
    let mut seen = HashSet::from([root.id]);
    let mut queue = VecDeque::from([(root, 0usize)]);

    while let Some((policy, depth)) = queue.pop_front() {
        for member in src.current_members(org, &policy.id)? {
            let keep = match &member.member {
                Member::User { account_id, .. } => account_id == account,
                Member::Group { .. } => false,
                Member::Proxy { policy_id, .. } => {
                    if depth < max_depth && seen.insert(*policy_id) {
                        if let Some(proxy) = src.current_policy(org, policy_id)? {
                            queue.push_back((proxy, depth + 1));
                        }
                    }
                    true
                }
            };
            if keep {
                lock.members.push(member);
            }
        }
        lock.policies.push(policy);
    }

    Ok(Some(lock))
}

/// Collect every member row and group that can contribute to `account`'s
/// actions on `policies`.
pub(crate) fn build_membership<S: RowSource + ?Sized>(
    src: &S,
    org: &OrgId,
    account: &AccountId,
    policies: &[PolicyId],
    max_depth: usize,
) -> Result<MembershipSnapshot> {
    let mut snapshot = MembershipSnapshot::new(*account);
    let mut seen = HashSet::new();
    let mut queue: VecDeque<(PolicyId, usize)> = policies
        .iter()
        .filter(|id| seen.insert(**id))
        .map(|id| (*id, 0))
        .collect();
    let mut group_ids = BTreeSet::new();

    while let Some((policy_id, depth)) = queue.pop_front() {
        if src.current_policy(org, &policy_id)?.is_none() {
            continue;
        }
        for member in src.current_members(org, &policy_id)? {
            let keep = match &member.member {
                Member::User { account_id, .. } => account_id == account,
                Member::Group { group_id } => {
                    group_ids.insert(*group_id);
                    true
                }
                Member::Proxy { policy_id, .. } => {
                    if depth < max_depth && seen.insert(*policy_id) {
                        queue.push_back((*policy_id, depth + 1));
                    }
                    true
                }
            };
            if keep {
                snapshot.members.push(member);
            }
        }
    }

    for group_id in group_ids {
        if let Some(group) = src.current_group(org, &group_id)? {
            snapshot.groups.push(group);
        }
    }

    Ok(snapshot)
}
