//! Delegation and recovery.
//!
//! Recovery is an onion unwrap. The caller's X25519 secret opens their own
//! `User` wrap on some policy; that policy's private key opens the `Proxy`
//! wrap it holds on the next policy outward, and so on until the target.
//! Walking from the target inward, the search is:
//!
//! 1. a `User` row for the caller on the current policy (depth 0 = direct),
//! 2. otherwise each `Proxy` row in policy-id order, recursing at depth + 1.
//!
//! Every unwrap is checked against the policy row's public key. A failed
//! check or a wrap that does not authenticate is fatal: it aborts the whole
//! search with `DecryptionFailure` rather than falling through to another
//! branch.

use tracing::{debug, warn};

use keyward_core::{AccountId, Member, MemberKey, PolicyId, PolicyLock, SealedKey};

use crate::crypto::{EncryptionKey, X25519StaticSecret};
use crate::error::{PermsError, Result};
use crate::seal::{open_content_key, unwrap_policy_key, SealContext};

enum Walk {
    Found(X25519StaticSecret),
    Missing { truncated: bool },
}

struct Walker<'a> {
    lock: &'a PolicyLock,
    account_id: AccountId,
    account_secret: &'a X25519StaticSecret,
    max_depth: usize,
    path: Vec<PolicyId>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, policy_id: PolicyId, depth: usize) -> Result<Walk> {
        let lock = self.lock;
        let Some(policy) = lock.policy(&policy_id).filter(|p| !p.deleted) else {
            return Ok(Walk::Missing { truncated: false });
        };

        let live = || lock.members.iter().filter(move |m| m.policy_id == policy_id && !m.deleted);

        for member in live() {
            match &member.member {
                Member::User {
                    account_id,
                    wrapped,
                } if *account_id == self.account_id => {
                    let context = SealContext::member(policy.org_id, policy.id, member.member_key());
                    let secret = unwrap_policy_key(wrapped, self.account_secret, &context, &policy.public_key)
                        .map_err(|e| {
                            warn!(policy = %policy.id, account = %self.account_id, "direct wrap failed to open: {}", e);
                            e
                        })?;
                    debug!(policy = %policy.id, depth, "recovered policy key from direct member");
                    return Ok(Walk::Found(secret));
                }
                Member::User { .. } | Member::Group { .. } | Member::Proxy { .. } => {}
            }
        }

        let mut proxies: Vec<(PolicyId, &SealedKey)> = live()
            .filter_map(|m| match &m.member {
                Member::Proxy { policy_id, wrapped } => Some((*policy_id, wrapped)),
                Member::User { .. } | Member::Group { .. } => None,
            })
            .collect();
        proxies.sort_by_key(|(id, _)| *id);

        self.path.push(policy.id);
        let mut truncated = false;
        for (proxy_id, wrapped) in proxies {
            if depth + 1 > self.max_depth || self.path.contains(&proxy_id) {
                debug!(policy = %policy.id, proxy = %proxy_id, depth, "proxy branch cut off");
                truncated = true;
                continue;
            }

            match self.walk(proxy_id, depth + 1)? {
                Walk::Found(proxy_secret) => {
                    let context = SealContext::member(policy.org_id, policy.id, MemberKey::Proxy(proxy_id));
                    let secret = unwrap_policy_key(wrapped, &proxy_secret, &context, &policy.public_key)
                        .map_err(|e| {
                            warn!(policy = %policy.id, proxy = %proxy_id, "proxy wrap failed to open: {}", e);
                            e
                        })?;
                    debug!(policy = %policy.id, proxy = %proxy_id, depth, "recovered policy key through proxy");
                    self.path.pop();
                    return Ok(Walk::Found(secret));
                }
                Walk::Missing { truncated: t } => truncated |= t,
            }
        }
        self.path.pop();

        Ok(Walk::Missing { truncated })
    }
}

/// Recover the private key of the lock's target policy.
///
/// Fails with `NoPath` when no chain reaches the caller, `ChainTooDeep` when
/// a chain might exist beyond `max_depth` hops (or loops), and
/// `DecryptionFailure` when any wrap on the way is corrupt.
pub fn recover_policy_key(
    lock: &PolicyLock,
    account_id: AccountId,
    account_secret: &X25519StaticSecret,
    max_depth: usize,
) -> Result<X25519StaticSecret> {
    let target = lock.target.ok_or(PermsError::NoPath)?;
    let mut walker = Walker {
        lock,
        account_id,
        account_secret,
        max_depth,
        path: Vec::new(),
    };

    match walker.walk(target, 0)? {
        Walk::Found(secret) => Ok(secret),
        Walk::Missing { truncated: true } => Err(PermsError::ChainTooDeep { max_depth }),
        Walk::Missing { truncated: false } => Err(PermsError::NoPath),
    }
}

/// Recover the content key of the lock's target policy.
pub fn recover_content_key(
    lock: &PolicyLock,
    account_id: AccountId,
    account_secret: &X25519StaticSecret,
    max_depth: usize,
) -> Result<EncryptionKey> {
    let policy_secret = recover_policy_key(lock, account_id, account_secret, max_depth)?;
    let policy = lock
        .target
        .and_then(|id| lock.policy(&id))
        .ok_or(PermsError::NoPath)?;

    open_content_key(
        &policy.sealed_secret,
        &policy_secret,
        &SealContext::content(policy.org_id, policy.id),
    )
}
