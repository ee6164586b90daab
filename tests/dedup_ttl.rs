// tests/dedup_ttl.rs
//
// Deduplicator against both backends:
// - durable: hashes expire after the TTL
// - store unreachable at construction: in-memory set, never expires
// - store failing mid-flight: degrades per call
// - content claimed during an outage stays claimed after recovery
// - concurrent claims of the same content: exactly one winner

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use finsight::clock::ManualClock;
use finsight::config::DedupSettings;
use finsight::{BackendKind, Deduplicator, MemoryTtlStore, TtlStore};

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap())
}

async fn durable(c: &ManualClock) -> (Arc<MemoryTtlStore>, Deduplicator) {
    let store = Arc::new(MemoryTtlStore::with_clock(Arc::new(c.clone())));
    let shared: Arc<dyn TtlStore> = store.clone();
    let dedup = Deduplicator::connect(Some(shared), &DedupSettings::default()).await;
    (store, dedup)
}

#[tokio::test]
async fn seen_hash_expires_after_ttl() {
    let c = clock();
    let (_store, dedup) = durable(&c).await;
    assert_eq!(dedup.backend(), BackendKind::Durable);

    let h = Deduplicator::hash_content("Fed holds rates steady");
    assert!(!dedup.is_duplicate(&h).await);
    dedup.mark_seen(&h).await;
    assert!(dedup.is_duplicate(&h).await);

    c.advance(ChronoDuration::days(7) - ChronoDuration::seconds(1));
    assert!(dedup.is_duplicate(&h).await);

    c.advance(ChronoDuration::seconds(1));
    assert!(!dedup.is_duplicate(&h).await, "hash must be forgotten after 7 days");
}

#[tokio::test]
async fn stored_under_namespaced_key() {
    let c = clock();
    let (store, dedup) = durable(&c).await;
    let h = dedup.mark_seen_text("ECB surprises markets").await;
    assert!(store.exists(&format!("finsight:dedup:{h}")).await.unwrap());
    assert_eq!(dedup.fallback_len(), 0);
}

#[tokio::test]
async fn unreachable_store_falls_back_without_expiry() {
    let c = clock();
    let store = Arc::new(MemoryTtlStore::with_clock(Arc::new(c.clone())));
    store.set_reachable(false);
    let shared: Arc<dyn TtlStore> = store.clone();
    let dedup = Deduplicator::connect(Some(shared), &DedupSettings::default()).await;
    assert_eq!(dedup.backend(), BackendKind::InMemory);

    assert!(!dedup.is_duplicate_text("same text").await);
    dedup.mark_seen_text("same text").await;
    assert!(dedup.is_duplicate_text("same text").await);

    c.advance(ChronoDuration::days(30));
    assert!(dedup.is_duplicate_text("same text").await);
    assert_eq!(dedup.fallback_len(), 1);
}

#[tokio::test]
async fn call_time_failure_uses_local_set() {
    let c = clock();
    let (store, dedup) = durable(&c).await;
    store.set_reachable(false);

    let h = Deduplicator::hash_content("outage article");
    assert!(dedup.try_is_duplicate(&h).await.is_err());
    assert!(!dedup.is_duplicate(&h).await);
    dedup.mark_seen(&h).await;
    assert!(dedup.is_duplicate(&h).await);
    assert_eq!(dedup.backend(), BackendKind::Durable);
}

#[tokio::test]
async fn outage_claim_holds_after_recovery() {
    let c = clock();
    let (store, dedup) = durable(&c).await;
    let h = Deduplicator::hash_content("wire story during outage");

    store.set_reachable(false);
    assert!(dedup.claim(&h).await);

    store.set_reachable(true);
    c.advance(ChronoDuration::minutes(1));
    assert!(dedup.is_duplicate(&h).await);
    assert!(!dedup.claim(&h).await);
    // moved into the store on the first claim after recovery
    assert_eq!(dedup.fallback_len(), 0);
    assert!(store.exists(&format!("finsight:dedup:{h}")).await.unwrap());
    assert!(!dedup.claim(&h).await);
}

#[tokio::test]
async fn no_store_configured_is_in_memory() {
    let dedup = Deduplicator::connect(None, &DedupSettings::default()).await;
    assert_eq!(dedup.backend(), BackendKind::InMemory);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    let c = clock();
    let (_store, dedup) = durable(&c).await;
    let dedup = Arc::new(dedup);
    let h = Deduplicator::hash_content("syndicated wire story");

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let d = dedup.clone();
        let h = h.clone();
        tasks.push(tokio::spawn(async move { d.claim(&h).await }));
    }
    let mut winners = 0;
    for t in tasks {
        if t.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let mem = Arc::new(Deduplicator::in_memory());
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let d = mem.clone();
        let h = h.clone();
        tasks.push(tokio::spawn(async move { d.claim(&h).await }));
    }
    let mut winners = 0;
    for t in tasks {
        if t.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
