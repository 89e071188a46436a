//! Integration tests for the shop record store and the event channel.
//!
//! Tests: RecordStore → Session (in-memory) and PubSub → SubscriberWorker
//!
//! Verifies:
//! - Query-by-example matches exactly the rows whose present fields agree
//! - Updates are pure merges over the stored row
//! - Broken sessions surface as errors from every operation
//! - Both delete policies behave as configured

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use proptest::prelude::*;

    use shopkit_core::{DataError, Value};
    use shopkit_events::{Headers, InMemoryPubSub, PubSub, PublishOptions};
    use shopkit_shop::{Shop, ShopFields};

    use crate::config::{DeletePolicy, StoreConfig};
    use crate::db::{InMemorySession, Session};
    use crate::record_store::RecordStore;
    use crate::workers::SubscriberWorker;

    fn pramod() -> Shop {
        Shop::new(1, "Pramod", "Gaya", "Bihar")
    }

    fn shubh() -> Shop {
        Shop::new(2, "Shubh", "HSR", "Karnataka")
    }

    fn setup() -> (Arc<InMemorySession>, RecordStore<Shop>) {
        let session = Arc::new(InMemorySession::new());
        session.create_table_for::<Shop>().unwrap();
        let store = RecordStore::<Shop>::default();
        store.create(&session, &pramod()).unwrap();
        store.create(&session, &shubh()).unwrap();
        (session, store)
    }

    #[test]
    fn get_by_example() {
        let (session, store) = setup();

        let cases = [
            ("get by id", ShopFields::by_id(1), vec![pramod()]),
            ("get by name", ShopFields::any().name("Pramod"), vec![pramod()]),
            (
                "get by all fields",
                ShopFields::from(&pramod()),
                vec![pramod()],
            ),
            ("get by empty fields", ShopFields::any(), vec![pramod(), shubh()]),
            ("get unknown shop", ShopFields::by_id(9).state("Bihar"), vec![]),
        ];

        for (desc, example, expected) in cases {
            assert_eq!(store.get(&session, &example).unwrap(), expected, "{desc}");
        }
    }

    #[test]
    fn create_then_get_returns_the_created_record() {
        let session = InMemorySession::new();
        session.create_table_for::<Shop>().unwrap();
        let store = RecordStore::<Shop>::default();
        let himalaya = Shop::new(1, "himalaya", "Gaya", "bihar");

        assert_eq!(store.create(&session, &himalaya).unwrap(), vec![himalaya.clone()]);
        assert_eq!(store.get(&session, &ShopFields::by_id(1)).unwrap(), vec![himalaya]);
    }

    #[test]
    fn update_merges_present_fields() {
        let (session, store) = setup();

        let cases = [
            ("update by id", ShopFields::by_id(2), Shop::new(2, "Shubh", "HSR", "Karnataka")),
            (
                "update all fields",
                ShopFields::by_id(2).name("Mahi").location("Dhanbad").state("Jharkhand"),
                Shop::new(2, "Mahi", "Dhanbad", "Jharkhand"),
            ),
            (
                "update few fields",
                ShopFields::by_id(2).location("Gaya").state("Bihar"),
                Shop::new(2, "Mahi", "Gaya", "Bihar"),
            ),
        ];

        for (desc, patch, expected) in cases {
            assert_eq!(store.update(&session, &patch).unwrap(), vec![expected.clone()], "{desc}");
            assert_eq!(store.get(&session, &ShopFields::by_id(2)).unwrap(), vec![expected], "{desc}");
        }

        assert_eq!(store.get(&session, &ShopFields::by_id(1)).unwrap(), vec![pramod()]);
    }

    #[test]
    fn delete_then_get_is_empty() {
        let (session, store) = setup();
        let mut three = shubh();
        three.id = 3;
        store.create(&session, &three).unwrap();

        store.delete(&session, &Value::Int(3)).unwrap();
        assert!(store.get(&session, &ShopFields::by_id(3)).unwrap().is_empty());
    }

    #[test]
    fn idempotent_delete_of_missing_id_succeeds() {
        let (session, store) = setup();
        assert_eq!(store.config().delete_policy, DeletePolicy::Idempotent);

        assert_eq!(store.delete(&session, &Value::Int(99)), Ok(()));
        assert_eq!(store.get(&session, &ShopFields::any()).unwrap().len(), 2);
    }

    #[test]
    fn strict_delete_of_missing_id_is_not_found() {
        let (session, _) = setup();
        let store = RecordStore::<Shop>::new(StoreConfig {
            delete_policy: DeletePolicy::RequireExisting,
        });

        assert_eq!(store.delete(&session, &Value::Int(99)), Err(DataError::not_found("99")));
        assert_eq!(store.delete(&session, &Value::Int(2)), Ok(()));
        assert!(store.get(&session, &ShopFields::by_id(2)).unwrap().is_empty());
    }

    #[test]
    fn closed_session_fails_every_operation() {
        let (session, store) = setup();
        session.close();

        assert!(matches!(
            store.create(&session, &Shop::default()),
            Err(DataError::ConnectionFailure(_))
        ));
        assert!(matches!(
            store.update(&session, &ShopFields::by_id(1).name("Name_Update")),
            Err(DataError::ConnectionFailure(_))
        ));
        assert!(matches!(
            store.delete(&session, &Value::Int(1)),
            Err(DataError::ConnectionFailure(_))
        ));
        assert!(matches!(
            store.get(&session, &ShopFields::any()),
            Err(DataError::ConnectionFailure(_))
        ));
    }

    #[test]
    fn concurrent_contexts_share_one_session() {
        let session = Arc::new(InMemorySession::new());
        session.create_table_for::<Shop>().unwrap();
        let store = Arc::new(RecordStore::<Shop>::default());

        let workers: Vec<_> = (1..=8)
            .map(|id| {
                let session = session.clone();
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .create(&session, &Shop::new(id, format!("shop-{id}"), "X", "Y"))
                        .unwrap();
                    store
                        .update(&session, &ShopFields::by_id(id).state("Z"))
                        .unwrap()
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let all = store.get(&session, &ShopFields::any()).unwrap();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|s| s.state == "Z"));
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn published_notices_reach_the_worker_in_key_order() {
        let pubsub = Arc::new(InMemoryPubSub::new("shop-events", 4));
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));

        let handle = {
            let received = received.clone();
            SubscriberWorker::spawn("shop-notices", pubsub.clone(), move |msg| {
                let body: BTreeMap<String, String> = msg.bind()?;
                received.lock().unwrap().push((msg.partition, body["seq"].clone()));
                Ok::<_, DataError>(())
            })
            .unwrap()
        };

        for seq in 0..5 {
            let body = BTreeMap::from([("seq".to_string(), seq.to_string())]);
            pubsub
                .publish_event_with_options(
                    "shop-events",
                    &body,
                    &Headers::new(),
                    &PublishOptions::with_key("shop-1"),
                )
                .unwrap();
        }

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while handle.stats().processed() < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        handle.shutdown();

        let received = received.lock().unwrap();
        let partitions: Vec<u32> = received.iter().map(|(p, _)| *p).collect();
        let seqs: Vec<&str> = received.iter().map(|(_, s)| s.as_str()).collect();
        assert!(partitions.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(seqs, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(pubsub.lag(), 0);
    }

    fn arb_shop() -> impl Strategy<Value = Shop> {
        (
            1..50i32,
            prop::sample::select(vec!["Pramod", "Shubh", "Mahi", ""]),
            prop::sample::select(vec!["Gaya", "HSR", "Dhanbad"]),
            prop::sample::select(vec!["Bihar", "Karnataka", "Jharkhand"]),
        )
            .prop_map(|(id, name, location, state)| Shop::new(id, name, location, state))
    }

    fn arb_fields() -> impl Strategy<Value = ShopFields> {
        (
            prop::option::of(1..50i32),
            prop::option::of(prop::sample::select(vec!["Pramod", "Shubh", ""])),
            prop::option::of(prop::sample::select(vec!["Gaya", "HSR"])),
            prop::option::of(prop::sample::select(vec!["Bihar", "Karnataka"])),
        )
            .prop_map(|(id, name, location, state)| ShopFields {
                id,
                name: name.map(str::to_string),
                location: location.map(str::to_string),
                state: state.map(str::to_string),
            })
    }

    proptest! {
        #[test]
        fn get_returns_exactly_the_matching_records(
            shops in prop::collection::vec(arb_shop(), 0..20),
            example in arb_fields(),
        ) {
            let session = InMemorySession::new();
            session.create_table_for::<Shop>().unwrap();
            let store = RecordStore::<Shop>::default();

            let mut stored: BTreeMap<i32, Shop> = BTreeMap::new();
            for shop in shops {
                if !stored.contains_key(&shop.id) {
                    store.create(&session, &shop).unwrap();
                    stored.insert(shop.id, shop);
                }
            }

            let expected: Vec<Shop> = stored.values().filter(|s| example.matches(s)).cloned().collect();
            prop_assert_eq!(store.get(&session, &example).unwrap(), expected);
        }

        #[test]
        fn update_is_a_pure_merge(shop in arb_shop(), patch in arb_fields()) {
            let session = InMemorySession::new();
            session.create_table_for::<Shop>().unwrap();
            let store = RecordStore::<Shop>::default();
            store.create(&session, &shop).unwrap();

            let mut patch = patch;
            patch.id = Some(shop.id);

            let updated = store.update(&session, &patch).unwrap();
            prop_assert_eq!(updated, vec![patch.apply_to(&shop)]);
        }
    }
}
