//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Keyward. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use keyward_core::{
    plan_secret_save, validate_batch, AccountId, Actions, Block, CoreError, Group, GroupId,
    Member, MemberKey, MemberType, NameHolder, OrgId, Page, Policy, PolicyId, PolicyLock,
    PolicyMember, SealedKey, Secret, SecretId, StreamId, Strength,
};
use keyward_core::versioned::check_successor;
use keyward_perms::MembershipSnapshot;

use crate::error::{Result, StoreError};
use crate::join::{build_membership, build_policy_lock, RowSource};
use crate::migration;
use crate::traits::{SecretSaved, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row encoding
// ─────────────────────────────────────────────────────────────────────────────

const POLICY_COLS: &str =
    "org_id, policy_id, version, public_key, sealed_secret, strength, labels, deleted";
const MEMBER_COLS: &str =
    "org_id, policy_id, member_type, member_id, version, actions, wrapped, labels, deleted";
const GROUP_COLS: &str = "org_id, group_id, version, name, accounts, deleted";
const SECRET_COLS: &str =
    "org_id, secret_id, version, policy_id, author_id, name, stream_id, created_at, deleted";

fn decode_err(column: &str, e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Blob, format!("{}: {}", column, e).into())
}

/// Bind an unsigned count or version as an SQLite integer.
fn sql_int<T>(value: T, column: &str) -> Result<i64>
where
    T: Copy + std::fmt::Display,
    i64: TryFrom<T>,
{
    i64::try_from(value).map_err(|_| {
        StoreError::InvalidData(format!("{} {} is out of SQLite integer range", column, value))
    })
}

/// Read an SQLite integer column back as an unsigned value.
fn column_uint<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: TryFrom<i64>,
    T::Error: std::fmt::Display,
{
    T::try_from(row.get::<_, i64>(column)?).map_err(|e| decode_err(column, e))
}

fn stored_version(max: Option<i64>) -> Result<Option<u64>> {
    max.map(u64::try_from)
        .transpose()
        .map_err(|e| StoreError::InvalidData(format!("version: {}", e)))
}

fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn cbor_decode<T: DeserializeOwned>(bytes: &[u8], column: &str) -> rusqlite::Result<T> {
    ciborium::from_reader(bytes).map_err(|e| decode_err(column, e))
}

fn row_to_policy(row: &Row<'_>) -> rusqlite::Result<Policy> {
    let sealed: Vec<u8> = row.get("sealed_secret")?;
    let strength: String = row.get("strength")?;
    let labels: Vec<u8> = row.get("labels")?;

    Ok(Policy {
        org_id: OrgId::from_bytes(row.get("org_id")?),
        id: PolicyId::from_bytes(row.get("policy_id")?),
        version: column_uint(row, "version")?,
        public_key: row.get("public_key")?,
        sealed_secret: SealedKey::from_bytes(&sealed).map_err(|e| decode_err("sealed_secret", e))?,
        strength: Strength::parse(&strength).ok_or_else(|| decode_err("strength", &strength))?,
        labels: cbor_decode(&labels, "labels")?,
        deleted: row.get("deleted")?,
    })
}

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<PolicyMember> {
    let member_type: String = row.get("member_type")?;
    let member_type =
        MemberType::parse(&member_type).ok_or_else(|| decode_err("member_type", &member_type))?;
    let wrapped: Option<Vec<u8>> = row.get("wrapped")?;
    let wrapped = wrapped
        .map(|b| SealedKey::from_bytes(&b))
        .transpose()
        .map_err(|e| decode_err("wrapped", e))?;
    let labels: Vec<u8> = row.get("labels")?;

    let member = match (MemberKey::from_parts(member_type, row.get("member_id")?), wrapped) {
        (MemberKey::User(account_id), Some(wrapped)) => Member::User {
            account_id,
            wrapped,
        },
        (MemberKey::Group(group_id), None) => Member::Group { group_id },
        (MemberKey::Proxy(policy_id), Some(wrapped)) => Member::Proxy { policy_id, wrapped },
        (key, _) => return Err(decode_err("wrapped", format!("unexpected wrap for {:?}", key))),
    };

    Ok(PolicyMember {
        org_id: OrgId::from_bytes(row.get("org_id")?),
        policy_id: PolicyId::from_bytes(row.get("policy_id")?),
        member,
        actions: Actions::from_bits(column_uint(row, "actions")?),
        version: column_uint(row, "version")?,
        labels: cbor_decode(&labels, "labels")?,
        deleted: row.get("deleted")?,
    })
}

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    let accounts: Vec<u8> = row.get("accounts")?;
    Ok(Group {
        org_id: OrgId::from_bytes(row.get("org_id")?),
        id: GroupId::from_bytes(row.get("group_id")?),
        version: column_uint(row, "version")?,
        name: row.get("name")?,
        accounts: cbor_decode(&accounts, "accounts")?,
        deleted: row.get("deleted")?,
    })
}

fn row_to_secret(row: &Row<'_>) -> rusqlite::Result<Secret> {
    Ok(Secret {
        org_id: OrgId::from_bytes(row.get("org_id")?),
        id: SecretId::from_bytes(row.get("secret_id")?),
        policy_id: PolicyId::from_bytes(row.get("policy_id")?),
        author_id: AccountId::from_bytes(row.get("author_id")?),
        name: row.get("name")?,
        version: column_uint(row, "version")?,
        stream_id: StreamId::from_bytes(row.get("stream_id")?),
        created_at: row.get("created_at")?,
        deleted: row.get("deleted")?,
    })
}

fn row_to_block(row: &Row<'_>) -> rusqlite::Result<Block> {
    let payload: Vec<u8> = row.get("payload")?;
    Ok(Block {
        org_id: OrgId::from_bytes(row.get("org_id")?),
        stream_id: StreamId::from_bytes(row.get("stream_id")?),
        index: column_uint(row, "idx")?,
        payload: Bytes::from(payload),
    })
}

fn sort_members(members: &mut [PolicyMember]) {
    members.sort_by_key(|m| (m.policy_id, m.member_key()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

/// Row access over a borrowed connection or transaction.
struct SqlRows<'c>(&'c Connection);

impl RowSource for SqlRows<'_> {
    fn current_policy(&self, org: &OrgId, id: &PolicyId) -> Result<Option<Policy>> {
        let row = self
            .0
            .query_row(
                &format!(
                    "SELECT {} FROM policies WHERE org_id = ?1 AND policy_id = ?2
                     ORDER BY version DESC LIMIT 1",
                    POLICY_COLS
                ),
                params![org.as_bytes().as_slice(), id.as_bytes().as_slice()],
                row_to_policy,
            )
            .optional()?;
        Ok(row.filter(|p| !p.deleted))
    }

    fn current_members(&self, org: &OrgId, policy: &PolicyId) -> Result<Vec<PolicyMember>> {
        let mut stmt = self.0.prepare(&format!(
            "SELECT {} FROM policy_members m
             WHERE m.org_id = ?1 AND m.policy_id = ?2 AND m.deleted = 0
               AND m.version = (
                   SELECT MAX(x.version) FROM policy_members x
                   WHERE x.org_id = m.org_id AND x.policy_id = m.policy_id
                     AND x.member_type = m.member_type AND x.member_id = m.member_id
               )",
            MEMBER_COLS
        ))?;
        let mut members = stmt
            .query_map(
                params![org.as_bytes().as_slice(), policy.as_bytes().as_slice()],
                row_to_member,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        sort_members(&mut members);
        Ok(members)
    }

    fn current_group(&self, org: &OrgId, id: &GroupId) -> Result<Option<Group>> {
        let row = self
            .0
            .query_row(
                &format!(
                    "SELECT {} FROM org_groups WHERE org_id = ?1 AND group_id = ?2
                     ORDER BY version DESC LIMIT 1",
                    GROUP_COLS
                ),
                params![org.as_bytes().as_slice(), id.as_bytes().as_slice()],
                row_to_group,
            )
            .optional()?;
        Ok(row.filter(|g| !g.deleted))
    }
}

fn require_policy(conn: &Connection, org: &OrgId, id: &PolicyId) -> Result<Policy> {
    SqlRows(conn).current_policy(org, id)?.ok_or_else(|| {
        CoreError::InconsistentReference(format!("policy {} is not current in org {}", id, org)).into()
    })
}

fn max_version(conn: &Connection, sql: &str, org: &OrgId, id: &[u8]) -> Result<Option<u64>> {
    let max: Option<i64> =
        conn.query_row(sql, params![org.as_bytes().as_slice(), id], |row| row.get(0))?;
    stored_version(max)
}

fn name_holders(conn: &Connection, org: &OrgId, name: &str) -> Result<Vec<NameHolder>> {
    let mut stmt = conn.prepare(
        "SELECT s.secret_id, s.version, s.created_at, s.deleted FROM secrets s
         WHERE s.org_id = ?1 AND s.name = ?2
           AND s.version = (
               SELECT MAX(x.version) FROM secrets x
               WHERE x.org_id = s.org_id AND x.secret_id = s.secret_id
           )",
    )?;
    let latest = stmt
        .query_map(params![org.as_bytes().as_slice(), name], |row| {
            Ok((
                SecretId::from_bytes(row.get("secret_id")?),
                column_uint::<u64>(row, "version")?,
                row.get::<_, i64>("created_at")?,
                row.get::<_, bool>("deleted")?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut streams_stmt = conn.prepare(
        "SELECT DISTINCT stream_id FROM secrets WHERE org_id = ?1 AND secret_id = ?2
         ORDER BY stream_id",
    )?;
    latest
        .into_iter()
        .map(|(id, latest_version, created_at, deleted)| -> Result<NameHolder> {
            let streams = streams_stmt
                .query_map(params![org.as_bytes().as_slice(), id.as_bytes().as_slice()], |row| {
                    Ok(StreamId::from_bytes(row.get(0)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(NameHolder {
                id,
                latest_version,
                created_at,
                deleted,
                streams,
            })
        })
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_policy(&self, org: &OrgId, id: &PolicyId) -> Result<Option<Policy>> {
        let (org, id) = (*org, *id);
        self.run(move |conn| SqlRows(conn).current_policy(&org, &id))
            .await
    }

    async fn load_policy_version(
        &self,
        org: &OrgId,
        id: &PolicyId,
        version: u64,
    ) -> Result<Option<Policy>> {
        let (org, id) = (*org, *id);
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM policies WHERE org_id = ?1 AND policy_id = ?2 AND version = ?3",
                        POLICY_COLS
                    ),
                    params![
                        org.as_bytes().as_slice(),
                        id.as_bytes().as_slice(),
                        sql_int(version, "version")?
                    ],
                    row_to_policy,
                )
                .optional()?)
        })
        .await
    }

    async fn save_policy(&self, policy: &Policy) -> Result<()> {
        let policy = policy.clone();
        self.run(move |conn| {
            let latest = max_version(
                conn,
                "SELECT MAX(version) FROM policies WHERE org_id = ?1 AND policy_id = ?2",
                &policy.org_id,
                policy.id.as_bytes(),
            )?;
            check_successor(latest, policy.version)?;

            conn.execute(
                &format!("INSERT INTO policies ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", POLICY_COLS),
                params![
                    policy.org_id.as_bytes().as_slice(),
                    policy.id.as_bytes().as_slice(),
                    sql_int(policy.version, "version")?,
                    policy.public_key.as_slice(),
                    policy.sealed_secret.to_bytes()?,
                    policy.strength.as_str(),
                    cbor_encode(&policy.labels)?,
                    policy.deleted,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_policies(&self, org: &OrgId, page: Page) -> Result<Vec<Policy>> {
        let org = *org;
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM policies p
                 WHERE p.org_id = ?1 AND p.deleted = 0
                   AND p.version = (
                       SELECT MAX(x.version) FROM policies x
                       WHERE x.org_id = p.org_id AND x.policy_id = p.policy_id
                   )
                 ORDER BY p.policy_id LIMIT ?2 OFFSET ?3",
                POLICY_COLS
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        org.as_bytes().as_slice(),
                        sql_int(page.limit, "limit")?,
                        sql_int(page.offset, "offset")?
                    ],
                    row_to_policy,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn save_policy_member(&self, member: &PolicyMember) -> Result<()> {
        let member = member.clone();
        self.run(move |conn| {
            member.check_belongs_to(&require_policy(conn, &member.org_id, &member.policy_id)?)?;
            if let (Member::Proxy { policy_id, .. }, false) = (&member.member, member.deleted) {
                require_policy(conn, &member.org_id, policy_id)?;
            }

            let key = member.member_key();
            let latest: Option<i64> = conn.query_row(
                "SELECT MAX(version) FROM policy_members
                 WHERE org_id = ?1 AND policy_id = ?2 AND member_type = ?3 AND member_id = ?4",
                params![
                    member.org_id.as_bytes().as_slice(),
                    member.policy_id.as_bytes().as_slice(),
                    key.member_type().as_str(),
                    key.id_bytes().as_slice(),
                ],
                |row| row.get(0),
            )?;
            check_successor(stored_version(latest)?, member.version)?;

            let wrapped = member.member.wrapped().map(|w| w.to_bytes()).transpose()?;
            conn.execute(
                &format!("INSERT INTO policy_members ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", MEMBER_COLS),
                params![
                    member.org_id.as_bytes().as_slice(),
                    member.policy_id.as_bytes().as_slice(),
                    key.member_type().as_str(),
                    key.id_bytes().as_slice(),
                    sql_int(member.version, "version")?,
                    i64::from(member.actions.bits()),
                    wrapped,
                    cbor_encode(&member.labels)?,
                    member.deleted,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_policy_member(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        member: &MemberKey,
    ) -> Result<Option<PolicyMember>> {
        let (org, policy, member) = (*org, *policy, *member);
        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM policy_members
                         WHERE org_id = ?1 AND policy_id = ?2 AND member_type = ?3 AND member_id = ?4
                         ORDER BY version DESC LIMIT 1",
                        MEMBER_COLS
                    ),
                    params![
                        org.as_bytes().as_slice(),
                        policy.as_bytes().as_slice(),
                        member.member_type().as_str(),
                        member.id_bytes().as_slice(),
                    ],
                    row_to_member,
                )
                .optional()?;
            Ok(row.filter(|m| !m.deleted))
        })
        .await
    }

    async fn latest_member_version(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        member: &MemberKey,
    ) -> Result<Option<u64>> {
        let (org, policy, member) = (*org, *policy, *member);
        self.run(move |conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(version) FROM policy_members
                 WHERE org_id = ?1 AND policy_id = ?2 AND member_type = ?3 AND member_id = ?4",
                params![
                    org.as_bytes().as_slice(),
                    policy.as_bytes().as_slice(),
                    member.member_type().as_str(),
                    member.id_bytes().as_slice(),
                ],
                |row| row.get(0),
            )?;
            stored_version(max)
        })
        .await
    }

    async fn list_policy_members(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        page: Page,
    ) -> Result<Vec<PolicyMember>> {
        let (org, policy) = (*org, *policy);
        self.run(move |conn| Ok(page.apply(SqlRows(conn).current_members(&org, &policy)?)))
            .await
    }

    async fn list_proxy_grants_to(&self, org: &OrgId, proxy: &PolicyId) -> Result<Vec<PolicyMember>> {
        let (org, proxy) = (*org, *proxy);
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM policy_members m
                 WHERE m.org_id = ?1 AND m.member_type = 'proxy' AND m.member_id = ?2 AND m.deleted = 0
                   AND m.version = (
                       SELECT MAX(x.version) FROM policy_members x
                       WHERE x.org_id = m.org_id AND x.policy_id = m.policy_id
                         AND x.member_type = m.member_type AND x.member_id = m.member_id
                   )",
                MEMBER_COLS
            ))?;
            let mut rows = stmt
                .query_map(
                    params![org.as_bytes().as_slice(), proxy.as_bytes().as_slice()],
                    row_to_member,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            sort_members(&mut rows);
            Ok(rows)
        })
        .await
    }

    async fn save_group(&self, group: &Group) -> Result<()> {
        let group = group.clone();
        self.run(move |conn| {
            let latest = max_version(
                conn,
                "SELECT MAX(version) FROM org_groups WHERE org_id = ?1 AND group_id = ?2",
                &group.org_id,
                group.id.as_bytes(),
            )?;
            check_successor(latest, group.version)?;

            conn.execute(
                &format!("INSERT INTO org_groups ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", GROUP_COLS),
                params![
                    group.org_id.as_bytes().as_slice(),
                    group.id.as_bytes().as_slice(),
                    sql_int(group.version, "version")?,
                    group.name,
                    cbor_encode(&group.accounts)?,
                    group.deleted,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_group(&self, org: &OrgId, id: &GroupId) -> Result<Option<Group>> {
        let (org, id) = (*org, *id);
        self.run(move |conn| SqlRows(conn).current_group(&org, &id))
            .await
    }

    async fn list_groups(&self, org: &OrgId, page: Page) -> Result<Vec<Group>> {
        let org = *org;
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM org_groups g
                 WHERE g.org_id = ?1 AND g.deleted = 0
                   AND g.version = (
                       SELECT MAX(x.version) FROM org_groups x
                       WHERE x.org_id = g.org_id AND x.group_id = g.group_id
                   )
                 ORDER BY g.group_id LIMIT ?2 OFFSET ?3",
                GROUP_COLS
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        org.as_bytes().as_slice(),
                        sql_int(page.limit, "limit")?,
                        sql_int(page.offset, "offset")?
                    ],
                    row_to_group,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn load_policy_lock(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        account: &AccountId,
        max_depth: usize,
    ) -> Result<Option<PolicyLock>> {
        let (org, policy, account) = (*org, *policy, *account);
        self.run(move |conn| build_policy_lock(&SqlRows(conn), &org, &policy, &account, max_depth))
            .await
    }

    async fn load_membership(
        &self,
        org: &OrgId,
        account: &AccountId,
        policies: &[PolicyId],
        max_depth: usize,
    ) -> Result<MembershipSnapshot> {
        let (org, account, policies) = (*org, *account, policies.to_vec());
        self.run(move |conn| build_membership(&SqlRows(conn), &org, &account, &policies, max_depth))
            .await
    }

    async fn save_secret(&self, secret: &Secret) -> Result<SecretSaved> {
        let secret = secret.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;

            require_policy(&tx, &secret.org_id, &secret.policy_id)?;
            let own_latest = max_version(
                &tx,
                "SELECT MAX(version) FROM secrets WHERE org_id = ?1 AND secret_id = ?2",
                &secret.org_id,
                secret.id.as_bytes(),
            )?;
            let holders = name_holders(&tx, &secret.org_id, &secret.name)?;
            let plan = plan_secret_save(&secret, own_latest, &holders)?;

            let org = secret.org_id.as_bytes().as_slice();
            for id in &plan.purge_secrets {
                tx.execute(
                    "DELETE FROM secrets WHERE org_id = ?1 AND secret_id = ?2",
                    params![org, id.as_bytes().as_slice()],
                )?;
            }
            for stream in &plan.purge_streams {
                tx.execute(
                    "DELETE FROM blocks WHERE org_id = ?1 AND stream_id = ?2",
                    params![org, stream.as_bytes().as_slice()],
                )?;
            }

            tx.execute(
                &format!(
                    "INSERT INTO secrets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    SECRET_COLS
                ),
                params![
                    org,
                    secret.id.as_bytes().as_slice(),
                    sql_int(secret.version, "version")?,
                    secret.policy_id.as_bytes().as_slice(),
                    secret.author_id.as_bytes().as_slice(),
                    secret.name,
                    secret.stream_id.as_bytes().as_slice(),
                    secret.created_at,
                    secret.deleted,
                ],
            )?;
            tx.commit()?;

            if plan.is_destructive() {
                warn!(
                    org = %secret.org_id,
                    name = %secret.name,
                    purged = ?plan.purge_secrets,
                    "secret name taken over, old history purged"
                );
            }
            Ok(SecretSaved {
                purged: plan.purge_secrets,
            })
        })
        .await
    }

    async fn load_secret_by_id(&self, org: &OrgId, id: &SecretId) -> Result<Option<Secret>> {
        let (org, id) = (*org, *id);
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM secrets WHERE org_id = ?1 AND secret_id = ?2
                         ORDER BY version DESC LIMIT 1",
                        SECRET_COLS
                    ),
                    params![org.as_bytes().as_slice(), id.as_bytes().as_slice()],
                    row_to_secret,
                )
                .optional()?)
        })
        .await
    }

    async fn load_secret_version(
        &self,
        org: &OrgId,
        id: &SecretId,
        version: u64,
    ) -> Result<Option<Secret>> {
        let (org, id) = (*org, *id);
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM secrets WHERE org_id = ?1 AND secret_id = ?2 AND version = ?3",
                        SECRET_COLS
                    ),
                    params![
                        org.as_bytes().as_slice(),
                        id.as_bytes().as_slice(),
                        sql_int(version, "version")?
                    ],
                    row_to_secret,
                )
                .optional()?)
        })
        .await
    }

    async fn load_secret_by_name(&self, org: &OrgId, name: &str) -> Result<Option<Secret>> {
        let (org, name) = (*org, name.to_string());
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM secrets s
                         WHERE s.org_id = ?1 AND s.name = ?2
                           AND s.version = (
                               SELECT MAX(x.version) FROM secrets x
                               WHERE x.org_id = s.org_id AND x.secret_id = s.secret_id
                           )
                         ORDER BY s.deleted ASC, s.version DESC LIMIT 1",
                        SECRET_COLS
                    ),
                    params![org.as_bytes().as_slice(), name],
                    row_to_secret,
                )
                .optional()?)
        })
        .await
    }

    async fn list_secrets(&self, org: &OrgId, page: Page) -> Result<Vec<Secret>> {
        let org = *org;
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM secrets s
                 WHERE s.org_id = ?1 AND s.deleted = 0
                   AND s.version = (
                       SELECT MAX(x.version) FROM secrets x
                       WHERE x.org_id = s.org_id AND x.secret_id = s.secret_id
                   )
                 ORDER BY s.name, s.secret_id LIMIT ?2 OFFSET ?3",
                SECRET_COLS
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        org.as_bytes().as_slice(),
                        sql_int(page.limit, "limit")?,
                        sql_int(page.offset, "offset")?
                    ],
                    row_to_secret,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_secret_versions(&self, org: &OrgId, id: &SecretId) -> Result<Vec<Secret>> {
        let (org, id) = (*org, *id);
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM secrets WHERE org_id = ?1 AND secret_id = ?2 ORDER BY version",
                SECRET_COLS
            ))?;
            let rows = stmt
                .query_map(
                    params![org.as_bytes().as_slice(), id.as_bytes().as_slice()],
                    row_to_secret,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn save_blocks(&self, blocks: &[Block]) -> Result<()> {
        let blocks = blocks.to_vec();
        self.run(move |conn| {
            let first = blocks
                .first()
                .ok_or_else(|| CoreError::InvalidBatch("empty batch".into()))?;
            let (org, stream) = (first.org_id, first.stream_id);

            let tx = conn.transaction()?;
            let stored_max: Option<i64> = tx.query_row(
                "SELECT MAX(idx) FROM blocks WHERE org_id = ?1 AND stream_id = ?2",
                params![org.as_bytes().as_slice(), stream.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            let stored_max = stored_max
                .map(u64::try_from)
                .transpose()
                .map_err(|e| StoreError::InvalidData(format!("idx: {}", e)))?;
            validate_batch(&blocks, stored_max)?;

            {
                let mut insert = tx.prepare(
                    "INSERT INTO blocks (org_id, stream_id, idx, payload) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for block in &blocks {
                    insert.execute(params![
                        org.as_bytes().as_slice(),
                        stream.as_bytes().as_slice(),
                        sql_int(block.index, "idx")?,
                        &block.payload[..],
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_blocks(&self, org: &OrgId, stream: &StreamId, page: Page) -> Result<Vec<Block>> {
        let (org, stream) = (*org, *stream);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT org_id, stream_id, idx, payload FROM blocks
                 WHERE org_id = ?1 AND stream_id = ?2
                 ORDER BY idx ASC LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        org.as_bytes().as_slice(),
                        stream.as_bytes().as_slice(),
                        sql_int(page.limit, "limit")?,
                        sql_int(page.offset, "offset")?
                    ],
                    row_to_block,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}
