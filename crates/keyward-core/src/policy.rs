//! Policies and their members.
//!
//! A [`Policy`] owns an X25519 key pair. Its private key is never stored in
//! the clear: every [`PolicyMember`] that can recover it holds a copy sealed
//! to the member's own public key. The policy row itself carries the
//! symmetric content key, sealed to the policy's public key.

use serde::{Deserialize, Serialize};

use crate::actions::Actions;
use crate::error::{CoreError, Result};
use crate::sealed::{SealedKey, Strength};
use crate::types::{AccountId, GroupId, OrgId, PolicyId};
use crate::versioned::Versioned;

/// The unit of access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub org_id: OrgId,
    pub id: PolicyId,
    pub version: u64,

    /// X25519 public key. Proxy grants *to* this policy are sealed to it.
    pub public_key: [u8; 32],

    /// Content key sealed to `public_key`.
    pub sealed_secret: SealedKey,

    pub strength: Strength,

    /// Opaque audit/display metadata.
    pub labels: Vec<String>,

    pub deleted: bool,
}

impl Policy {
    /// The row that replaces this one at the next version.
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// The tombstone that follows this row.
    pub fn tombstone(&self) -> Self {
        let mut next = self.next_version();
        next.deleted = true;
        next
    }
}

impl Versioned for Policy {
    type Key = (OrgId, PolicyId);

    fn key(&self) -> Self::Key {
        (self.org_id, self.id)
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Discriminant of [`Member`] without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberType {
    User,
    Group,
    Proxy,
}

impl MemberType {
    /// Stable string used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            MemberType::User => "user",
            MemberType::Group => "group",
            MemberType::Proxy => "proxy",
        }
    }

    /// Parse the storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MemberType::User),
            "group" => Some(MemberType::Group),
            "proxy" => Some(MemberType::Proxy),
            _ => None,
        }
    }
}

/// The principal a member row grants to, without key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberKey {
    User(AccountId),
    Group(GroupId),
    Proxy(PolicyId),
}

impl MemberKey {
    /// The member type.
    pub const fn member_type(&self) -> MemberType {
        match self {
            MemberKey::User(_) => MemberType::User,
            MemberKey::Group(_) => MemberType::Group,
            MemberKey::Proxy(_) => MemberType::Proxy,
        }
    }

    /// Raw id bytes of the principal.
    pub fn id_bytes(&self) -> &[u8; 16] {
        match self {
            MemberKey::User(id) => id.as_bytes(),
            MemberKey::Group(id) => id.as_bytes(),
            MemberKey::Proxy(id) => id.as_bytes(),
        }
    }

    /// Rebuild from a stored type and id.
    pub fn from_parts(member_type: MemberType, id: [u8; 16]) -> Self {
        match member_type {
            MemberType::User => MemberKey::User(AccountId::from_bytes(id)),
            MemberType::Group => MemberKey::Group(GroupId::from_bytes(id)),
            MemberType::Proxy => MemberKey::Proxy(PolicyId::from_bytes(id)),
        }
    }
}

/// The principal a member row grants to, with its wrap where one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Member {
    /// An account. `wrapped` is the policy private key sealed to the account.
    User {
        account_id: AccountId,
        wrapped: SealedKey,
    },
    /// A group of accounts. Authorization only; carries no key material.
    Group { group_id: GroupId },
    /// Another policy acting as principal. `wrapped` is sealed to that
    /// policy's public key.
    Proxy {
        policy_id: PolicyId,
        wrapped: SealedKey,
    },
}

impl Member {
    /// The key identifying this principal.
    pub fn key(&self) -> MemberKey {
        match self {
            Member::User { account_id, .. } => MemberKey::User(*account_id),
            Member::Group { group_id } => MemberKey::Group(*group_id),
            Member::Proxy { policy_id, .. } => MemberKey::Proxy(*policy_id),
        }
    }

    /// The member type.
    pub fn member_type(&self) -> MemberType {
        self.key().member_type()
    }

    /// The wrapped policy key, if this variant carries one.
    pub fn wrapped(&self) -> Option<&SealedKey> {
        match self {
            Member::User { wrapped, .. } | Member::Proxy { wrapped, .. } => Some(wrapped),
            Member::Group { .. } => None,
        }
    }
}

/// A grant from a policy to a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMember {
    pub org_id: OrgId,
    pub policy_id: PolicyId,
    pub member: Member,
    pub actions: Actions,
    pub version: u64,
    pub labels: Vec<String>,
    pub deleted: bool,
}

impl PolicyMember {
    /// The member key.
    pub fn member_key(&self) -> MemberKey {
        self.member.key()
    }

    /// The member type.
    pub fn member_type(&self) -> MemberType {
        self.member.member_type()
    }

    /// The tombstone that follows this row.
    pub fn tombstone(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.deleted = true;
        next
    }

    /// Check that this member belongs to the given policy.
    pub fn check_belongs_to(&self, policy: &Policy) -> Result<()> {
        if self.org_id != policy.org_id {
            return Err(CoreError::org_mismatch(&policy.org_id, &self.org_id));
        }
        if self.policy_id != policy.id {
            return Err(CoreError::policy_mismatch(&policy.id, &self.policy_id));
        }
        if let Member::Proxy { policy_id, .. } = &self.member {
            if *policy_id == policy.id {
                return Err(CoreError::InconsistentReference(format!(
                    "policy {} cannot be its own proxy",
                    policy.id
                )));
            }
        }
        Ok(())
    }
}

impl Versioned for PolicyMember {
    type Key = (OrgId, PolicyId, MemberKey);

    fn key(&self) -> Self::Key {
        (self.org_id, self.policy_id, self.member_key())
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Everything recovery needs for one policy, fetched in one round trip.
///
/// `policies` holds the target and every policy reachable from it through
/// proxy members, up to the requested depth. `members` holds, for each of
/// those policies, the current `User` row for the caller (if any) and every
/// current `Proxy` row. Group rows are never included.
#[derive(Debug, Clone, Default)]
pub struct PolicyLock {
    pub target: Option<PolicyId>,
    pub policies: Vec<Policy>,
    pub members: Vec<PolicyMember>,
}

impl PolicyLock {
    /// The policy row with the given id.
    pub fn policy(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id == *id)
    }

    /// Member rows granting from the given policy.
    pub fn members_of<'a>(&'a self, id: &'a PolicyId) -> impl Iterator<Item = &'a PolicyMember> {
        self.members.iter().filter(move |m| m.policy_id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealed::SealFormat;

    fn sealed() -> SealedKey {
        SealedKey {
            format: SealFormat::X25519ChaCha20Poly1305,
            ephemeral_public: [0; 32],
            nonce: vec![0; 12],
            ciphertext: vec![0; 48],
        }
    }

    fn policy() -> Policy {
        Policy {
            org_id: OrgId::from_bytes([1; 16]),
            id: PolicyId::from_bytes([2; 16]),
            version: 1,
            public_key: [3; 32],
            sealed_secret: sealed(),
            strength: Strength::Standard,
            labels: vec![],
            deleted: false,
        }
    }

    fn member(policy: &Policy, member: Member) -> PolicyMember {
        PolicyMember {
            org_id: policy.org_id,
            policy_id: policy.id,
            member,
            actions: Actions::all(),
            version: 1,
            labels: vec![],
            deleted: false,
        }
    }

    #[test]
    fn test_member_key_roundtrip_parts() {
        let key = MemberKey::Proxy(PolicyId::from_bytes([5; 16]));
        let rebuilt = MemberKey::from_parts(key.member_type(), *key.id_bytes());
        assert_eq!(key, rebuilt);
        assert_eq!(MemberType::parse(key.member_type().as_str()), Some(MemberType::Proxy));
    }

    #[test]
    fn test_group_members_carry_no_wrap() {
        let group = Member::Group {
            group_id: GroupId::from_bytes([4; 16]),
        };
        assert!(group.wrapped().is_none());

        let user = Member::User {
            account_id: AccountId::from_bytes([4; 16]),
            wrapped: sealed(),
        };
        assert!(user.wrapped().is_some());
    }

    #[test]
    fn test_member_must_match_policy() {
        let p = policy();
        let ok = member(
            &p,
            Member::Group {
                group_id: GroupId::from_bytes([4; 16]),
            },
        );
        assert!(ok.check_belongs_to(&p).is_ok());

        let mut wrong_org = ok.clone();
        wrong_org.org_id = OrgId::from_bytes([9; 16]);
        assert!(matches!(
            wrong_org.check_belongs_to(&p),
            Err(CoreError::InconsistentReference(_))
        ));

        let self_proxy = member(
            &p,
            Member::Proxy {
                policy_id: p.id,
                wrapped: sealed(),
            },
        );
        assert!(self_proxy.check_belongs_to(&p).is_err());
    }

    #[test]
    fn test_tombstone_bumps_version() {
        let p = policy();
        let t = p.tombstone();
        assert_eq!(t.version, 2);
        assert!(t.deleted);
        assert_eq!(t.key(), p.key());
    }

    #[test]
    fn test_member_json_is_tagged() {
        let m = Member::Group {
            group_id: GroupId::from_bytes([4; 16]),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("Group").is_some());
        let back: Member = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
