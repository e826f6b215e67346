//! Contract tests run against every `OrderedKv` implementation: any backend
//! conforming to the trait must pass these.

use strata_kv::{InMemoryKv, KeyRange, KvSnapshot, OrderedKv, SurrealConfig, SurrealKv};

async fn exercise(kv: &dyn OrderedKv) {
    kv.open_cf("cf").await.unwrap();

    assert_eq!(kv.get("cf", b"missing").await.unwrap(), None);

    kv.put("cf", b"k1", b"v1").await.unwrap();
    assert_eq!(kv.get("cf", b"k1").await.unwrap(), Some(b"v1".to_vec()));

    kv.put("cf", b"k1", b"v2").await.unwrap();
    assert_eq!(kv.get("cf", b"k1").await.unwrap(), Some(b"v2".to_vec()));

    kv.delete("cf", b"k1").await.unwrap();
    assert_eq!(kv.get("cf", b"k1").await.unwrap(), None);

    for k in [b"a" as &[u8], b"b", b"c", b"d", b"e"] {
        kv.put("cf", k, k).await.unwrap();
    }
    let ascending = kv
        .iter_range("cf", KeyRange::half_open(b"b".to_vec(), b"e".to_vec()), false)
        .await
        .unwrap();
    assert_eq!(
        ascending.into_iter().map(|(k, _)| k).collect::<Vec<_>>(),
        vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
    );

    let descending = kv
        .iter_range("cf", KeyRange::half_open(b"b".to_vec(), b"e".to_vec()), true)
        .await
        .unwrap();
    assert_eq!(
        descending.into_iter().map(|(k, _)| k).collect::<Vec<_>>(),
        vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec()]
    );

    let snapshot = kv.snapshot("cf").await.unwrap();
    kv.put("cf", b"z-late", b"late").await.unwrap();
    assert_eq!(snapshot.get(b"a"), Some(b"a".to_vec()));
    assert_eq!(snapshot.get(b"z-late"), None);
    assert_eq!(kv.get("cf", b"z-late").await.unwrap(), Some(b"late".to_vec()));
    kv.delete("cf", b"z-late").await.unwrap();
}

#[tokio::test]
async fn in_memory_kv_satisfies_the_contract() {
    let kv = InMemoryKv::new();
    exercise(&kv).await;
}

#[tokio::test]
async fn surreal_kv_satisfies_the_contract() {
    let kv = SurrealKv::connect(SurrealConfig::default()).await.unwrap();
    exercise(&kv).await;
}

#[tokio::test]
async fn snapshots_do_not_observe_later_writes() {
    let kv = InMemoryKv::new();
    kv.open_cf("cf").await.unwrap();
    kv.put("cf", b"before", b"1").await.unwrap();

    let snapshot = kv.snapshot("cf").await.unwrap();
    kv.put("cf", b"after", b"2").await.unwrap();

    assert_eq!(snapshot.get(b"before"), Some(b"1".to_vec()));
    assert_eq!(snapshot.get(b"after"), None);
    let keys: Vec<Vec<u8>> = snapshot
        .iter_range(KeyRange::full(), false)
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec![b"before".to_vec()]);

    // The live view sees both.
    assert_eq!(kv.get("cf", b"after").await.unwrap(), Some(b"2".to_vec()));
}

#[tokio::test]
async fn transactions_are_all_or_nothing() {
    let kv = InMemoryKv::new();
    kv.open_cf("cf").await.unwrap();

    let mut txn = kv.transaction().await.unwrap();
    txn.put("cf", b"a", b"1").await.unwrap();
    txn.put("cf", b"b", b"2").await.unwrap();
    drop(txn); // neither commit nor rollback called

    assert_eq!(kv.get("cf", b"a").await.unwrap(), None);
    assert_eq!(kv.get("cf", b"b").await.unwrap(), None);
}
