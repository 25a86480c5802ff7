//! Integration tests for `ExclusionCacheService` against a real Postgres
//! instance (SPEC_FULL.md §4.4, C4).

mod common;

use common::{TestDataFactory, TestDatabase};
use niche_playlist_forge::models::exclusion::ExclusionReason;
use niche_playlist_forge::services::exclusion_cache::ExclusionCacheService;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn ensure_creates_then_reuses_the_same_entry() {
    let db = TestDatabase::new().await;
    let cache = ExclusionCacheService::new(db.pool.clone(), 182);
    let key = TestDataFactory::exclusion_key("k-pop");

    let first = cache.ensure(key.clone()).await.expect("ensure should succeed");
    assert!(first.excluded.is_empty());

    let second = cache.ensure(key).await.expect("ensure should reuse the row");
    assert_eq!(first.id, second.id);

    db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn put_then_ensure_reflects_the_exclusion() {
    let db = TestDatabase::new().await;
    let cache = ExclusionCacheService::new(db.pool.clone(), 182);
    let key = TestDataFactory::exclusion_key("shoegaze");

    let entry = cache.ensure(key.clone()).await.expect("ensure");
    let excluded = TestDataFactory::excluded(ExclusionReason::WrongLanguage);
    let metadata_id = excluded.metadata_id.clone();
    cache.put(entry.id, excluded).await.expect("put should succeed");

    let reloaded = cache.ensure(key).await.expect("ensure");
    assert_eq!(reloaded.excluded.len(), 1);
    assert_eq!(reloaded.excluded[0].metadata_id, metadata_id);
    assert_eq!(reloaded.excluded[0].reason, ExclusionReason::WrongLanguage);

    db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn remove_clears_a_previously_excluded_artist() {
    let db = TestDatabase::new().await;
    let cache = ExclusionCacheService::new(db.pool.clone(), 182);
    let key = TestDataFactory::exclusion_key("vaporwave");

    let entry = cache.ensure(key.clone()).await.expect("ensure");
    let excluded = TestDataFactory::excluded(ExclusionReason::TooFewFollowersListenersPlays);
    let metadata_id = excluded.metadata_id.clone();
    cache.put(entry.id, excluded).await.expect("put");

    cache.remove(entry.id, &metadata_id).await.expect("remove");

    let reloaded = cache.ensure(key).await.expect("ensure");
    assert!(reloaded.excluded.is_empty());

    db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn stale_non_permanent_exclusions_are_pruned_while_permanent_ones_survive() {
    use chrono::{Duration, Utc};
    use niche_playlist_forge::models::exclusion::Excluded;

    let db = TestDatabase::new().await;
    let cache = ExclusionCacheService::new(db.pool.clone(), 182);
    let key = TestDataFactory::exclusion_key("drone-metal");

    let entry = cache.ensure(key.clone()).await.expect("ensure");
    let stale_temp = Excluded {
        artist_name: "Stale Temp".into(),
        metadata_id: "mid-stale".into(),
        reason: ExclusionReason::TooFewFollowersListenersPlays,
        date_excluded: Utc::now() - Duration::days(400),
    };
    let stale_permanent = Excluded {
        artist_name: "Stale Permanent".into(),
        metadata_id: "mid-permanent".into(),
        reason: ExclusionReason::WrongLanguage,
        date_excluded: Utc::now() - Duration::days(400),
    };
    cache.put(entry.id, stale_temp).await.expect("put temp");
    cache.put(entry.id, stale_permanent).await.expect("put permanent");

    let reloaded = cache.ensure(key).await.expect("ensure prunes on load");
    assert_eq!(reloaded.excluded.len(), 1);
    assert_eq!(reloaded.excluded[0].metadata_id, "mid-permanent");

    db.cleanup().await;
}
