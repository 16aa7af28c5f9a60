//! Property tests over the Vault and its stores.

use proptest::prelude::*;

use keyward::store::{MemoryStore, SqliteStore, Store};
use keyward::{Block, MemberKey, Page, VaultConfig};
use keyward_testkit::generators::{actions, content, predicate, secret_name, shuffled_batch};
use keyward_testkit::{TestAccount, TestFixture};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn stored_order<S: Store>(store: &S, batch: &[Block]) -> Vec<u64> {
    let first = &batch[0];
    store.save_blocks(batch).await.unwrap();
    store
        .load_blocks(&first.org_id, &first.stream_id, Page::new(0, 1_000))
        .await
        .unwrap()
        .iter()
        .map(|b| b.index)
        .collect()
}

async fn round_trip<S: Store>(fixture: TestFixture<S>, name: &str, content: &[u8]) -> Vec<u8> {
    let (org, vault) = (fixture.org, &fixture.vault);
    let owner = TestAccount::new();
    let policy = vault.create_policy(&org, &owner.grantee(), vec![]).await.unwrap();
    vault
        .write_secret(&org, &owner.id, &owner.key, &policy.id, name, content)
        .await
        .unwrap();
    vault.read_secret(&org, &owner.id, &owner.key, name).await.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn blocks_load_in_index_order_on_both_backends(batch in shuffled_batch(40)) {
        let expected: Vec<u64> = (0..batch.len() as u64).collect();
        let rt = runtime();

        let memory = rt.block_on(stored_order(&MemoryStore::new(), &batch));
        prop_assert_eq!(&memory, &expected);

        let sqlite = SqliteStore::open_memory().unwrap();
        let sqlite = rt.block_on(stored_order(&sqlite, &batch));
        prop_assert_eq!(&sqlite, &expected);
    }

    #[test]
    fn widening_a_grant_never_narrows_access(first in actions(), extra in actions(), p in predicate()) {
        let rt = runtime();
        let (before, after) = rt.block_on(async {
            let fixture = TestFixture::memory().unwrap();
            let (org, vault) = (fixture.org, &fixture.vault);
            let (owner, member) = (TestAccount::new(), TestAccount::new());

            let policy = fixture.policy(&owner).await.unwrap();
            vault
                .add_member(&org, &policy.id, &owner.id, &owner.key, &member.grantee(), first, vec![])
                .await
                .unwrap();
            let before = vault.enabled_actions(&org, &member.id, &policy.id).await.unwrap().actions;

            vault
                .update_member_actions(&org, &policy.id, &owner.id, &MemberKey::User(member.id), first | extra)
                .await
                .unwrap();
            let after = vault.enabled_actions(&org, &member.id, &policy.id).await.unwrap().actions;
            (before, after)
        });

        prop_assert_eq!(before, first);
        prop_assert!(after.has_all(before));
        prop_assert!(after.has_all(extra));
        if p.allows(before) {
            prop_assert!(p.allows(after));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn written_content_reads_back_on_both_backends(name in secret_name(), body in content(3_000)) {
        let config = VaultConfig {
            block_size: 1_024,
            ..VaultConfig::default()
        };
        let rt = runtime();

        let memory = TestFixture::with_store(MemoryStore::new(), config.clone()).unwrap();
        prop_assert_eq!(rt.block_on(round_trip(memory, &name, &body)), body.clone());

        let sqlite = TestFixture::with_store(SqliteStore::open_memory().unwrap(), config).unwrap();
        prop_assert_eq!(rt.block_on(round_trip(sqlite, &name, &body)), body);
    }
}
