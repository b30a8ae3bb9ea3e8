//! Multi-replica convergence scenarios.

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use weft_core::entry_io::FetchOptions;
use weft_core::{BlockStore, Ed25519Identity, LoadOptions, Log, LogOptions, MemoryStore};

fn store() -> Arc<dyn BlockStore> {
    Arc::new(MemoryStore::new())
}

fn writer(store: &Arc<dyn BlockStore>, name: &str, seed: u8) -> Log {
    let identity = Arc::new(Ed25519Identity::from_seed(name, [seed; 32]));
    Log::new(Arc::clone(store), identity, LogOptions::with_id("X")).expect("log")
}

fn payloads(log: &Log) -> Vec<Value> {
    log.values().iter().map(|e| e.payload.clone()).collect()
}

fn hashes(log: &Log) -> Vec<String> {
    log.values().iter().map(|e| e.hash.clone()).collect()
}

async fn append_all(log: &mut Log, items: &[&str]) {
    for item in items {
        log.append(json!(item), 1).await.expect("append");
    }
}

#[tokio::test]
async fn appended_after_join_lands_last_on_both_sides() {
    let store = store();
    let mut a = writer(&store, "a", 1);
    let mut b = writer(&store, "b", 2);

    append_all(&mut a, &["x", "y", "z"]).await;
    assert_eq!(payloads(&a), vec![json!("x"), json!("y"), json!("z")]);
    let times: Vec<u64> = a.values().iter().map(|e| e.clock.time).collect();
    assert_eq!(times, vec![1, 2, 3]);

    b.join(&a, None).await.expect("join");
    let w = b.append(json!("w"), 1).await.expect("append");
    assert_eq!(w.clock.time, 4);

    a.join(&b, None).await.expect("join");
    assert_eq!(
        payloads(&a),
        vec![json!("x"), json!("y"), json!("z"), json!("w")]
    );
    let heads: Vec<&str> = a.heads().iter().map(|e| e.hash.as_str()).collect();
    assert_eq!(heads, vec![w.hash.as_str()]);
    assert_eq!(a.clock().time, 4);
    assert_eq!(hashes(&a), hashes(&b));
}

#[tokio::test]
async fn bounded_join_keeps_latest_entries() {
    let store = store();
    let mut a = writer(&store, "a", 1);
    let mut b = writer(&store, "b", 2);

    append_all(&mut a, &["a1", "a2", "a3"]).await;
    append_all(&mut b, &["b1", "b2"]).await;

    let mut full = a.clone();
    full.join(&b, None).await.expect("join");
    assert_eq!(full.len(), 5);
    let expected: Vec<String> = hashes(&full)[3..].to_vec();

    a.join(&b, Some(2)).await.expect("join");
    assert_eq!(a.len(), 2);
    assert_eq!(hashes(&a), expected);

    for head in a.heads() {
        assert!(a.has(&head.hash));
    }
    let held: HashSet<String> = hashes(&a).into_iter().collect();
    let referenced: HashSet<String> = a
        .values()
        .iter()
        .flat_map(|e| e.next.iter().cloned())
        .filter(|n| held.contains(n))
        .collect();
    for head in a.heads() {
        assert!(!referenced.contains(&head.hash));
    }
}

#[tokio::test]
async fn two_writers_interleaving_converge() {
    let store = store();
    let mut a = writer(&store, "a", 1);
    let mut b = writer(&store, "b", 2);

    for round in 0..4 {
        a.append(json!(format!("a{round}")), 4).await.expect("append");
        b.append(json!(format!("b{round}")), 4).await.expect("append");
        if round % 2 == 0 {
            let snapshot = b.clone();
            a.join(&snapshot, None).await.expect("join");
        } else {
            let snapshot = a.clone();
            b.join(&snapshot, None).await.expect("join");
        }
    }

    let a_snapshot = a.clone();
    let b_snapshot = b.clone();
    a.join(&b_snapshot, None).await.expect("join");
    b.join(&a_snapshot, None).await.expect("join");

    assert_eq!(a.len(), 8);
    assert_eq!(hashes(&a), hashes(&b));
    assert_eq!(a.clock().time, b.clock().time);

    let mut fresh = writer(&store, "c", 3);
    fresh.join(&b, None).await.expect("join");
    fresh.join(&a, None).await.expect("join");
    assert_eq!(hashes(&fresh), hashes(&a));
}

#[tokio::test]
async fn three_replicas_converge_in_any_join_order() {
    let store = store();
    let mut logs = [writer(&store, "a", 1), writer(&store, "b", 2), writer(&store, "c", 3)];
    for (i, log) in logs.iter_mut().enumerate() {
        for n in 0..3 {
            log.append(json!(format!("{i}-{n}")), 2).await.expect("append");
        }
    }

    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut results = Vec::new();
    for order in orders {
        let mut merged = writer(&store, "m", 9);
        for i in order {
            merged.join(&logs[i], None).await.expect("join");
        }
        results.push(hashes(&merged));
    }

    assert_eq!(results[0].len(), 9);
    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
}

#[tokio::test]
async fn manifest_exchange_fetches_only_missing_history() {
    let store = store();
    let mut a = writer(&store, "a", 1);
    let mut b = writer(&store, "b", 2);

    append_all(&mut a, &["one", "two"]).await;
    b.join(&a, None).await.expect("join");
    append_all(&mut a, &["three", "four"]).await;

    let manifest = a.to_multihash().await.expect("manifest");
    let known: Vec<_> = b.values().into_iter().cloned().collect();
    let options = LoadOptions {
        fetch: FetchOptions {
            exclude: known,
            ..FetchOptions::default()
        },
        ..LoadOptions::default()
    };
    let delta = Log::from_multihash(
        Arc::clone(&store),
        Arc::clone(b.identity()),
        &manifest,
        options,
    )
    .await
    .expect("load");

    assert_eq!(delta.id(), "X");
    assert_eq!(payloads(&delta), vec![json!("three"), json!("four")]);

    b.join(&delta, None).await.expect("join");
    assert_eq!(hashes(&b), hashes(&a));
    assert_eq!(b.heads().len(), 1);
}

#[tokio::test]
async fn joining_a_different_log_changes_nothing() {
    let store = store();
    let mut a = writer(&store, "a", 1);
    let identity = Arc::new(Ed25519Identity::from_seed("b", [2; 32]));
    let mut other = Log::new(Arc::clone(&store), identity, LogOptions::with_id("Y")).expect("log");

    a.append(json!("mine"), 1).await.expect("append");
    other.append(json!("theirs"), 1).await.expect("append");

    let before = hashes(&a);
    a.join(&other, None).await.expect("join");
    assert_eq!(hashes(&a), before);
}
