//! Property-based tests for the encrypted store and keyring.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use zax_crypto::{Hpk, Keys};

use crate::driver::MemoryDriver;
use crate::encrypted_store::{EncryptedStore, StoreOptions};
use crate::keyring::{Keyring, KeyringOptions};

/// Any JSON-serializable value survives a save/get roundtrip.
fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];
    leaf.prop_recursive(depth, 32, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(".*", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `save` then `get` yields the value structurally; `remove` then
    /// `get` yields `None`.
    #[test]
    fn store_roundtrip(tag in "[a-z][a-z0-9_]{0,16}", value in arb_json(3)) {
        run(async {
            let driver = Arc::new(MemoryDriver::new());
            let store = EncryptedStore::open(driver, "prop", StoreOptions::default())
                .await
                .unwrap();

            store.save(&tag, &value).await.unwrap();
            let loaded: Option<Value> = store.get(&tag).await.unwrap();
            assert_eq!(loaded, Some(value));

            store.remove(&tag).await.unwrap();
            let gone: Option<Value> = store.get(&tag).await.unwrap();
            assert_eq!(gone, None);
        });
    }

    /// After `add_guest(tag, pk)`, both lookups agree with the inputs.
    #[test]
    fn keyring_guest_hpk_invariant(tag in "[A-Za-z][A-Za-z0-9 ]{0,12}") {
        run(async {
            let driver = Arc::new(MemoryDriver::new());
            let mut keyring = Keyring::new(driver, "prop", KeyringOptions::default())
                .await
                .unwrap();

            let guest = Keys::generate();
            keyring.add_guest(&tag, guest.public_key.clone()).await.unwrap();

            assert_eq!(keyring.guest_key(&tag), Some(&guest.public_key));
            let hpk = Hpk::from_public_key(&guest.public_key);
            assert_eq!(keyring.tag_by_hpk(&hpk), Some(tag.as_str()));
        });
    }

    /// Backing up and restoring reproduces the backup and the comm key.
    #[test]
    fn keyring_backup_roundtrip(tags in prop::collection::btree_set("[a-z]{1,8}", 0..5)) {
        run(async {
            let driver = Arc::new(MemoryDriver::new());
            let mut keyring = Keyring::new(driver, "prop", KeyringOptions::default())
                .await
                .unwrap();
            for tag in &tags {
                keyring.add_guest(tag, Keys::generate().public_key).await.unwrap();
            }

            let backup = keyring.backup().unwrap();
            let restored = Keyring::from_backup(
                Arc::new(MemoryDriver::new()),
                "prop-restored",
                KeyringOptions::default(),
                &backup,
            )
            .await
            .unwrap();

            assert_eq!(restored.backup().unwrap(), backup);
            assert_eq!(restored.pub_comm_key(), keyring.pub_comm_key());
        });
    }
}
