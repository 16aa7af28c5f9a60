//! Creating policies and granting members.
//!
//! Granting is itself gated on recovery: [`add_member`] first recovers the
//! policy's private key with the grantor's own key material, then wraps it
//! for the grantee. Anyone who can open a policy can therefore share it, and
//! nobody else can.

use rand::{CryptoRng, RngCore};

use keyward_core::{
    AccountId, Actions, GroupId, Member, MemberKey, OrgId, Policy, PolicyId, PolicyLock,
    PolicyMember, Strength,
};

use crate::crypto::{EncryptionKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{PermsError, Result};
use crate::recovery::recover_policy_key;
use crate::seal::{seal_content_key, wrap_policy_key, SealContext};

/// Who a grant is for, with the public key wraps are sealed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grantee {
    User {
        account_id: AccountId,
        public_key: X25519PublicKey,
    },
    Group {
        group_id: GroupId,
    },
    Proxy {
        policy_id: PolicyId,
        public_key: X25519PublicKey,
    },
}

impl Grantee {
    /// A proxy grantee for an existing policy row.
    pub fn proxy(policy: &Policy) -> Self {
        Grantee::Proxy {
            policy_id: policy.id,
            public_key: X25519PublicKey::from_bytes(policy.public_key),
        }
    }

    /// The member key the resulting row will have.
    pub fn member_key(&self) -> MemberKey {
        match self {
            Grantee::User { account_id, .. } => MemberKey::User(*account_id),
            Grantee::Group { group_id } => MemberKey::Group(*group_id),
            Grantee::Proxy { policy_id, .. } => MemberKey::Proxy(*policy_id),
        }
    }
}

/// A freshly generated policy.
#[derive(Debug, Clone)]
pub struct GeneratedPolicy {
    pub policy: Policy,
    /// The first member, holding every action.
    pub core_member: PolicyMember,
    /// The plaintext content key. Sealed inside `policy`; never stored.
    pub content_key: EncryptionKey,
}

/// Generate a policy whose core member is `grantee`.
///
/// The core member must be able to recover the policy, so it cannot be a
/// group.
pub fn gen_policy<R: RngCore + CryptoRng>(
    rng: &mut R,
    org_id: OrgId,
    grantee: &Grantee,
    strength: Strength,
    labels: Vec<String>,
) -> Result<GeneratedPolicy> {
    if let Grantee::Group { group_id } = grantee {
        return Err(PermsError::InvalidGrantee(format!(
            "group {} cannot be a core member",
            group_id
        )));
    }

    let id = PolicyId::generate_with(rng);
    let policy_secret = X25519StaticSecret::generate(rng);
    let content_key = EncryptionKey::generate(rng);
    let public_key = policy_secret.public_key();

    let sealed_secret = seal_content_key(
        rng,
        &content_key,
        &public_key,
        &SealContext::content(org_id, id),
        strength.seal_format(),
    )?;

    let policy = Policy {
        org_id,
        id,
        version: 1,
        public_key: *public_key.as_bytes(),
        sealed_secret,
        strength,
        labels,
        deleted: false,
    };

    let core_member = wrap_member(rng, &policy, &policy_secret, grantee, Actions::all(), Vec::new())?;

    Ok(GeneratedPolicy {
        policy,
        core_member,
        content_key,
    })
}

/// Build a member row for `grantee` from an already recovered policy key.
pub fn wrap_member<R: RngCore + CryptoRng>(
    rng: &mut R,
    policy: &Policy,
    policy_secret: &X25519StaticSecret,
    grantee: &Grantee,
    actions: Actions,
    labels: Vec<String>,
) -> Result<PolicyMember> {
    let format = policy.strength.seal_format();
    let context = SealContext::member(policy.org_id, policy.id, grantee.member_key());

    let member = match grantee {
        Grantee::User {
            account_id,
            public_key,
        } => Member::User {
            account_id: *account_id,
            wrapped: wrap_policy_key(rng, policy_secret, public_key, &context, format)?,
        },
        Grantee::Group { group_id } => Member::Group {
            group_id: *group_id,
        },
        Grantee::Proxy {
            policy_id,
            public_key,
        } => Member::Proxy {
            policy_id: *policy_id,
            wrapped: wrap_policy_key(rng, policy_secret, public_key, &context, format)?,
        },
    };

    let row = PolicyMember {
        org_id: policy.org_id,
        policy_id: policy.id,
        member,
        actions,
        version: 1,
        labels,
        deleted: false,
    };
    row.check_belongs_to(policy)?;
    Ok(row)
}

/// Grant `grantee` on the lock's target policy.
///
/// The grantor must be able to recover the policy. The returned row is at
/// version 1; a caller re-granting a previously removed member bumps it past
/// the stored history.
#[allow(clippy::too_many_arguments)]
pub fn add_member<R: RngCore + CryptoRng>(
    rng: &mut R,
    lock: &PolicyLock,
    grantor: AccountId,
    grantor_secret: &X25519StaticSecret,
    grantee: &Grantee,
    actions: Actions,
    labels: Vec<String>,
    max_depth: usize,
) -> Result<PolicyMember> {
    let policy_secret = recover_policy_key(lock, grantor, grantor_secret, max_depth)?;
    let policy = lock
        .target
        .and_then(|id| lock.policy(&id))
        .ok_or(PermsError::NoPath)?;

    wrap_member(rng, policy, &policy_secret, grantee, actions, labels)
}
