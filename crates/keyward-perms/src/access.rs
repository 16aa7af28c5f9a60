//! Authorization resolution.
//!
//! An account's actions on a policy are the union of:
//!
//! 1. its direct `User` rows,
//! 2. `Group` rows whose group contains it,
//! 3. `Proxy` rows whose proxy policy resolves, for the same account, to a
//!    non-empty action set.
//!
//! Proxy resolution is bounded by a hop limit and never revisits a policy on
//! the current path. Either cut-off is reported through
//! [`Resolution::truncated`] so a caller can tell "denied" apart from
//! "denied, but a longer chain might have allowed it".

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use keyward_core::{AccountId, Actions, Group, GroupId, Member, PolicyId, PolicyMember, Predicate};

/// The rows needed to resolve one account's actions, fetched in one call.
///
/// `members` holds the current member rows of every policy involved: the
/// requested policies plus those reachable through proxy rows. `groups`
/// holds the current rows of every group those members reference.
#[derive(Debug, Clone)]
pub struct MembershipSnapshot {
    pub account_id: AccountId,
    pub members: Vec<PolicyMember>,
    pub groups: Vec<Group>,
}

impl MembershipSnapshot {
    /// An empty snapshot for an account.
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            members: Vec::new(),
            groups: Vec::new(),
        }
    }

    fn groups_with_account(&self) -> HashSet<GroupId> {
        self.groups
            .iter()
            .filter(|g| !g.deleted && g.contains(&self.account_id))
            .map(|g| g.id)
            .collect()
    }
}

/// Resolved actions for one policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub actions: Actions,
    /// A proxy branch was cut off by the hop limit or a cycle.
    pub truncated: bool,
}

impl Resolution {
    /// Whether the resolved actions satisfy `predicate`.
    pub fn allows(&self, predicate: &Predicate) -> bool {
        predicate.allows(self.actions)
    }
}

struct Resolver<'a> {
    snapshot: &'a MembershipSnapshot,
    my_groups: HashSet<GroupId>,
    max_depth: usize,
    path: Vec<PolicyId>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, policy_id: PolicyId, depth: usize) -> Resolution {
        let snapshot = self.snapshot;
        let mut out = Resolution::default();

        self.path.push(policy_id);
        for row in snapshot
            .members
            .iter()
            .filter(|m| m.policy_id == policy_id && !m.deleted)
        {
            match &row.member {
                Member::User { account_id, .. } => {
                    if *account_id == snapshot.account_id {
                        out.actions.enable_all(row.actions);
                    }
                }
                Member::Group { group_id } => {
                    if self.my_groups.contains(group_id) {
                        out.actions.enable_all(row.actions);
                    }
                }
                Member::Proxy {
                    policy_id: proxy, ..
                } => {
                    if depth + 1 > self.max_depth || self.path.contains(proxy) {
                        out.truncated = true;
                        continue;
                    }
                    let inner = self.resolve(*proxy, depth + 1);
                    out.truncated |= inner.truncated;
                    if inner.actions.is_any() {
                        out.actions.enable_all(row.actions);
                    }
                }
            }
        }
        self.path.pop();

        out
    }
}

/// Resolve the account's actions on one policy.
pub fn resolve(snapshot: &MembershipSnapshot, policy_id: PolicyId, max_depth: usize) -> Resolution {
    let mut resolver = Resolver {
        snapshot,
        my_groups: snapshot.groups_with_account(),
        max_depth,
        path: Vec::new(),
    };
    let resolution = resolver.resolve(policy_id, 0);
    debug!(
        policy = %policy_id,
        account = %snapshot.account_id,
        actions = ?resolution.actions,
        truncated = resolution.truncated,
        "resolved actions"
    );
    resolution
}

/// Resolve the account's actions on several policies.
pub fn resolve_all(
    snapshot: &MembershipSnapshot,
    policy_ids: &[PolicyId],
    max_depth: usize,
) -> HashMap<PolicyId, Resolution> {
    policy_ids
        .iter()
        .map(|id| (*id, resolve(snapshot, *id, max_depth)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::{Action, OrgId, SealFormat, SealedKey};
    use proptest::prelude::*;

    fn org() -> OrgId {
        OrgId::from_bytes([1; 16])
    }

    fn account() -> AccountId {
        AccountId::from_bytes([2; 16])
    }

    fn wrap() -> SealedKey {
        SealedKey {
            format: SealFormat::X25519ChaCha20Poly1305,
            ephemeral_public: [0; 32],
            nonce: vec![0; 12],
            ciphertext: vec![],
        }
    }

    fn row(policy: u8, member: Member, actions: Actions) -> PolicyMember {
        PolicyMember {
            org_id: org(),
            policy_id: PolicyId::from_bytes([policy; 16]),
            member,
            actions,
            version: 1,
            labels: vec![],
            deleted: false,
        }
    }

    fn user(account_id: AccountId) -> Member {
        Member::User {
            account_id,
            wrapped: wrap(),
        }
    }

    fn proxy(policy: u8) -> Member {
        Member::Proxy {
            policy_id: PolicyId::from_bytes([policy; 16]),
            wrapped: wrap(),
        }
    }

    fn pid(n: u8) -> PolicyId {
        PolicyId::from_bytes([n; 16])
    }

    #[test]
    fn test_union_of_direct_and_group() {
        let group = Group::new(org(), "ops").with_account(account());
        let mut snapshot = MembershipSnapshot::new(account());
        snapshot.members = vec![
            row(10, user(account()), Actions::of(&[Action::View])),
            row(10, Member::Group { group_id: group.id }, Actions::of(&[Action::Edit])),
            row(10, user(AccountId::from_bytes([9; 16])), Actions::all()),
        ];
        snapshot.groups = vec![group];

        let r = resolve(&snapshot, pid(10), 3);
        assert_eq!(r.actions, Actions::of(&[Action::View, Action::Edit]));
        assert!(!r.truncated);
    }

    #[test]
    fn test_deleted_group_grants_nothing() {
        let group = Group::new(org(), "ops").with_account(account());
        let mut snapshot = MembershipSnapshot::new(account());
        snapshot.members = vec![row(10, Member::Group { group_id: group.id }, Actions::all())];
        snapshot.groups = vec![group.tombstone()];

        assert_eq!(resolve(&snapshot, pid(10), 3).actions, Actions::NONE);
    }

    #[test]
    fn test_proxy_grants_its_row_actions() {
        let mut snapshot = MembershipSnapshot::new(account());
        snapshot.members = vec![
            row(10, proxy(11), Actions::of(&[Action::View, Action::Share])),
            row(11, proxy(12), Actions::of(&[Action::View])),
            row(12, user(account()), Actions::of(&[Action::Audit])),
        ];

        let r = resolve(&snapshot, pid(10), 3);
        assert_eq!(r.actions, Actions::of(&[Action::View, Action::Share]));

        let shallow = resolve(&snapshot, pid(10), 1);
        assert_eq!(shallow.actions, Actions::NONE);
        assert!(shallow.truncated);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut snapshot = MembershipSnapshot::new(account());
        snapshot.members = vec![
            row(10, proxy(11), Actions::all()),
            row(11, proxy(10), Actions::all()),
        ];

        let r = resolve(&snapshot, pid(10), 3);
        assert_eq!(r.actions, Actions::NONE);
        assert!(r.truncated);
    }

    #[test]
    fn test_resolve_all_covers_every_id() {
        let mut snapshot = MembershipSnapshot::new(account());
        snapshot.members = vec![row(10, user(account()), Actions::all())];

        let map = resolve_all(&snapshot, &[pid(10), pid(11)], 3);
        assert_eq!(map.len(), 2);
        assert!(map[&pid(10)].allows(&Predicate::Any));
        assert!(!map[&pid(11)].allows(&Predicate::Any));
    }

    fn arb_rows() -> impl Strategy<Value = Vec<(u8, u8, u32)>> {
        // (policy 10..13, member selector, bits)
        prop::collection::vec((10u8..13, 0u8..4, any::<u32>()), 0..8)
    }

    fn build(rows: &[(u8, u8, u32)]) -> Vec<PolicyMember> {
        rows.iter()
            .map(|(policy, sel, bits)| {
                let member = match sel {
                    0 => user(account()),
                    1 => user(AccountId::from_bytes([9; 16])),
                    2 => proxy(10 + (policy + 1) % 3),
                    _ => proxy(10 + (policy + 2) % 3),
                };
                row(*policy, member, Actions::from_bits(*bits))
            })
            .collect()
    }

    proptest! {
        #[test]
        fn adding_a_grant_never_removes_actions(
            rows in arb_rows(),
            policy in 10u8..13,
            bits in any::<u32>(),
            depth in 2usize..5,
        ) {
            let mut snapshot = MembershipSnapshot::new(account());
            snapshot.members = build(&rows);
            let before = resolve(&snapshot, pid(policy), depth).actions;

            let grant = Actions::from_bits(bits);
            snapshot.members.push(row(policy, user(account()), grant));
            let after = resolve(&snapshot, pid(policy), depth).actions;

            prop_assert!(after.has_all(before));
            prop_assert!(after.has_all(grant));
        }

        #[test]
        fn deleting_a_grant_never_adds_actions(
            rows in arb_rows(),
            victim in any::<prop::sample::Index>(),
            policy in 10u8..13,
            depth in 2usize..5,
        ) {
            let mut snapshot = MembershipSnapshot::new(account());
            snapshot.members = build(&rows);
            prop_assume!(!snapshot.members.is_empty());
            let before = resolve(&snapshot, pid(policy), depth).actions;

            let i = victim.index(snapshot.members.len());
            snapshot.members[i].deleted = true;
            let after = resolve(&snapshot, pid(policy), depth).actions;

            prop_assert!(before.has_all(after));
        }
    }
}
