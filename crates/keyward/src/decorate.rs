//! Display decoration for member and secret listings.
//!
//! Listings carry ids only. Decoration resolves account ids and group ids to
//! human-readable names through two directories queried concurrently with
//! `tokio::try_join!`: both lookups are polled in the caller's task, the first
//! error wins, and the other lookup is dropped with the join. Results are
//! merged back by map lookup, so the listing keeps its original order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use keyward_core::{AccountId, GroupId, Member, OrgId, PolicyId, PolicyMember, Secret};
use keyward_store::Store;

use crate::error::Result;

/// Display identity of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub account_id: AccountId,
    pub display_name: String,
    pub email: Option<String>,
}

/// Resolves account ids to identities.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Look up many accounts at once. Unknown ids are left out of the map.
    async fn lookup_accounts(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, AccountIdentity>>;
}

/// Resolves group ids to names.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Look up many groups at once. Unknown ids are left out of the map.
    async fn lookup_groups(&self, org: &OrgId, ids: &[GroupId]) -> Result<HashMap<GroupId, String>>;
}

/// A [`GroupDirectory`] backed by the vault's own group rows.
pub struct StoreGroupDirectory<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StoreGroupDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store> GroupDirectory for StoreGroupDirectory<S> {
    async fn lookup_groups(&self, org: &OrgId, ids: &[GroupId]) -> Result<HashMap<GroupId, String>> {
        let mut names = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = self.store.load_group(org, id).await? {
                names.insert(group.id, group.name);
            }
        }
        Ok(names)
    }
}

/// Who a member row refers to, in display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberDisplay {
    Account(AccountIdentity),
    Group { group_id: GroupId, name: String },
    Policy(PolicyId),
    /// The directory did not know the id.
    Unknown,
}

/// A member row with its display identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratedMember {
    pub member: PolicyMember,
    pub display: MemberDisplay,
}

/// A secret row with its author's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratedSecret {
    pub secret: Secret,
    pub author: Option<AccountIdentity>,
}

/// Attach display identities to member rows, keeping their order.
pub async fn decorate_members<A, G>(
    accounts: &A,
    groups: &G,
    org: &OrgId,
    members: Vec<PolicyMember>,
) -> Result<Vec<DecoratedMember>>
where
    A: AccountDirectory + ?Sized,
    G: GroupDirectory + ?Sized,
{
    let mut account_ids = BTreeSet::new();
    let mut group_ids = BTreeSet::new();
    for row in &members {
        match &row.member {
            Member::User { account_id, .. } => {
                account_ids.insert(*account_id);
            }
            Member::Group { group_id } => {
                group_ids.insert(*group_id);
            }
            Member::Proxy { .. } => {}
        }
    }
    let account_ids: Vec<AccountId> = account_ids.into_iter().collect();
    let group_ids: Vec<GroupId> = group_ids.into_iter().collect();

    let (identities, names) = tokio::try_join!(
        accounts.lookup_accounts(&account_ids),
        groups.lookup_groups(org, &group_ids),
    )?;

    Ok(members
        .into_iter()
        .map(|member| {
            let display = match &member.member {
                Member::User { account_id, .. } => identities
                    .get(account_id)
                    .cloned()
                    .map_or(MemberDisplay::Unknown, MemberDisplay::Account),
                Member::Group { group_id } => names.get(group_id).map_or(MemberDisplay::Unknown, |name| {
                    MemberDisplay::Group {
                        group_id: *group_id,
                        name: name.clone(),
                    }
                }),
                Member::Proxy { policy_id, .. } => MemberDisplay::Policy(*policy_id),
            };
            DecoratedMember { member, display }
        })
        .collect())
}

/// Attach author identities to secret rows, keeping their order.
pub async fn decorate_secrets<A>(accounts: &A, secrets: Vec<Secret>) -> Result<Vec<DecoratedSecret>>
where
    A: AccountDirectory + ?Sized,
{
    let authors: Vec<AccountId> = secrets
        .iter()
        .map(|s| s.author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let identities = accounts.lookup_accounts(&authors).await?;

    Ok(secrets
        .into_iter()
        .map(|secret| DecoratedSecret {
            author: identities.get(&secret.author_id).cloned(),
            secret,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use keyward_core::{Actions, Group, SealFormat, SealedKey};
    use keyward_store::MemoryStore;

    use crate::error::VaultError;

    struct Fixed(HashMap<AccountId, AccountIdentity>);

    #[async_trait]
    impl AccountDirectory for Fixed {
        async fn lookup_accounts(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, AccountIdentity>> {
            Ok(ids.iter().filter_map(|id| self.0.get(id).map(|i| (*id, i.clone()))).collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl AccountDirectory for Failing {
        async fn lookup_accounts(&self, _: &[AccountId]) -> Result<HashMap<AccountId, AccountIdentity>> {
            Err(VaultError::Directory("account directory offline".into()))
        }
    }

    /// Never completes; records whether it was still running when dropped.
    struct Stalled {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl GroupDirectory for Stalled {
        async fn lookup_groups(&self, _: &OrgId, _: &[GroupId]) -> Result<HashMap<GroupId, String>> {
            std::future::pending::<()>().await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(HashMap::new())
        }
    }

    fn identity(id: AccountId, name: &str) -> AccountIdentity {
        AccountIdentity {
            account_id: id,
            display_name: name.into(),
            email: None,
        }
    }

    fn row(org: OrgId, policy: PolicyId, member: Member) -> PolicyMember {
        PolicyMember {
            org_id: org,
            policy_id: policy,
            member,
            actions: Actions::all(),
            version: 1,
            labels: vec![],
            deleted: false,
        }
    }

    fn wrap() -> SealedKey {
        SealedKey {
            format: SealFormat::X25519ChaCha20Poly1305,
            ephemeral_public: [0; 32],
            nonce: vec![0; 12],
            ciphertext: vec![],
        }
    }

    #[tokio::test]
    async fn test_listing_order_is_kept() {
        let org = OrgId::generate();
        let policy = PolicyId::generate();
        let (alice, bob) = (AccountId::generate(), AccountId::generate());
        let store = Arc::new(MemoryStore::new());
        let group = Group::new(org, "platform");
        store.save_group(&group).await.unwrap();

        let proxy = PolicyId::generate();
        let members = vec![
            row(org, policy, Member::User { account_id: bob, wrapped: wrap() }),
            row(org, policy, Member::Group { group_id: group.id }),
            row(org, policy, Member::Proxy { policy_id: proxy, wrapped: wrap() }),
            row(org, policy, Member::User { account_id: alice, wrapped: wrap() }),
            row(org, policy, Member::Group { group_id: GroupId::generate() }),
        ];

        let directory = Fixed(HashMap::from([
            (alice, identity(alice, "Alice")),
            (bob, identity(bob, "Bob")),
        ]));
        let decorated = decorate_members(&directory, &StoreGroupDirectory::new(store), &org, members.clone())
            .await
            .unwrap();

        assert_eq!(decorated.len(), members.len());
        for (d, m) in decorated.iter().zip(&members) {
            assert_eq!(&d.member, m);
        }
        assert_eq!(decorated[0].display, MemberDisplay::Account(identity(bob, "Bob")));
        assert_eq!(
            decorated[1].display,
            MemberDisplay::Group {
                group_id: group.id,
                name: "platform".into()
            }
        );
        assert_eq!(decorated[2].display, MemberDisplay::Policy(proxy));
        assert_eq!(decorated[3].display, MemberDisplay::Account(identity(alice, "Alice")));
        assert_eq!(decorated[4].display, MemberDisplay::Unknown);
    }

    #[tokio::test]
    async fn test_first_error_wins_and_other_branch_is_dropped() {
        let org = OrgId::generate();
        let policy = PolicyId::generate();
        let finished = Arc::new(AtomicBool::new(false));
        let stalled = Stalled {
            finished: finished.clone(),
        };
        let members = vec![
            row(org, policy, Member::User { account_id: AccountId::generate(), wrapped: wrap() }),
            row(org, policy, Member::Group { group_id: GroupId::generate() }),
        ];

        let err = decorate_members(&Failing, &stalled, &org, members).await.unwrap_err();
        assert!(matches!(err, VaultError::Directory(_)));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_secret_authors() {
        let author = AccountId::generate();
        let secret = Secret {
            org_id: OrgId::generate(),
            id: keyward_core::SecretId::generate(),
            policy_id: PolicyId::generate(),
            author_id: author,
            name: "/api/token".into(),
            version: 1,
            stream_id: keyward_core::StreamId::generate(),
            created_at: 0,
            deleted: false,
        };
        let directory = Fixed(HashMap::from([(author, identity(author, "Ada"))]));

        let decorated = decorate_secrets(&directory, vec![secret.clone()]).await.unwrap();
        assert_eq!(decorated[0].secret, secret);
        assert_eq!(decorated[0].author.as_ref().map(|a| a.display_name.as_str()), Some("Ada"));
    }
}
