//! SQLite schema.
//!
//! Each entry of [`MIGRATIONS`] moves the schema up by one version and runs
//! inside the same transaction as the bookkeeping row that records it.

use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};

/// Schema steps, oldest first. Version `n` is `MIGRATIONS[n - 1]`.
const MIGRATIONS: &[&str] = &[SCHEMA_V1, SCHEMA_V2];

/// Version the store expects after [`migrate`].
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;
    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema {applied}, newer than {CURRENT_VERSION}"
        )));
    }

    let tx = conn.transaction()?;
    for (version, sql) in (1u32..).zip(MIGRATIONS).skip(applied as usize) {
        tracing::debug!(version, "applying schema migration");
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, applied_at()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn applied_at() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

const SCHEMA_V1: &str = r#"
        -- Policies: one row per (org, policy, version)
        CREATE TABLE policies (
            org_id BLOB NOT NULL,             -- 16 bytes
            policy_id BLOB NOT NULL,          -- 16 bytes
            version INTEGER NOT NULL,
            public_key BLOB NOT NULL,         -- 32 bytes, X25519
            sealed_secret BLOB NOT NULL,      -- CBOR SealedKey (content key)
            strength TEXT NOT NULL,
            labels BLOB NOT NULL,             -- CBOR array of strings
            deleted INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (org_id, policy_id, version)
        );

        -- Grants from a policy to a user, group, or proxy policy
        CREATE TABLE policy_members (
            org_id BLOB NOT NULL,
            policy_id BLOB NOT NULL,          -- granting policy
            member_type TEXT NOT NULL,        -- 'user' | 'group' | 'proxy'
            member_id BLOB NOT NULL,          -- account, group, or policy id
            version INTEGER NOT NULL,
            actions INTEGER NOT NULL,         -- Actions bitmask
            wrapped BLOB,                     -- CBOR SealedKey; NULL for groups
            labels BLOB NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (org_id, policy_id, member_type, member_id, version)
        );

        -- Groups; accounts stored as a CBOR array
        CREATE TABLE org_groups (
            org_id BLOB NOT NULL,
            group_id BLOB NOT NULL,
            version INTEGER NOT NULL,
            name TEXT NOT NULL,
            accounts BLOB NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (org_id, group_id, version)
        );

        -- Secret metadata
        CREATE TABLE secrets (
            org_id BLOB NOT NULL,
            secret_id BLOB NOT NULL,
            version INTEGER NOT NULL,
            policy_id BLOB NOT NULL,
            author_id BLOB NOT NULL,
            name TEXT NOT NULL,
            stream_id BLOB NOT NULL,
            created_at INTEGER NOT NULL,      -- Unix ms
            deleted INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (org_id, secret_id, version)
        );

        -- Encrypted content blocks
        CREATE TABLE blocks (
            org_id BLOB NOT NULL,
            stream_id BLOB NOT NULL,
            idx INTEGER NOT NULL,
            payload BLOB NOT NULL,            -- CBOR BlockEnvelope

            PRIMARY KEY (org_id, stream_id, idx)
        );

        -- Indexes for common queries
        CREATE INDEX idx_members_principal ON policy_members(org_id, member_type, member_id);
        CREATE INDEX idx_secrets_name ON secrets(org_id, name);
        CREATE INDEX idx_secrets_stream ON secrets(org_id, stream_id);
"#;

/// Listing and purge lookups by policy.
const SCHEMA_V2: &str = r#"
        CREATE INDEX idx_members_policy ON policy_members(org_id, policy_id);
        CREATE INDEX idx_secrets_policy ON secrets(org_id, policy_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "policies",
            "policy_members",
            "org_groups",
            "secrets",
            "blocks",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_newer_schema_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, 0)",
            [CURRENT_VERSION + 1],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
