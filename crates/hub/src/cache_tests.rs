// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

const SHORT: Duration = Duration::from_millis(80);
const LONG: Duration = Duration::from_secs(3600);
const WAIT: Duration = Duration::from_millis(150);

fn test_cache() -> Arc<SegmentCache> {
    Arc::new(SegmentCache::new(SHORT, LONG, WAIT))
}

fn body(data: &'static [u8]) -> Bytes {
    Bytes::from_static(data)
}

#[tokio::test]
async fn add_then_get_roundtrip() {
    let cache = test_cache();
    assert!(cache.add("/u/c/seg1.m4s", body(b"one"), "video/mp4").is_none());
    let segment = cache.get("/u/c/seg1.m4s").await;
    let segment = segment.as_deref();
    assert_eq!(segment.map(|s| s.data.as_ref()), Some(b"one".as_slice()));
    assert_eq!(segment.map(|s| s.content_type.as_str()), Some("video/mp4"));
}

#[tokio::test]
async fn add_replaces_and_returns_previous() {
    let cache = test_cache();
    cache.add("/u/c/seg1.m4s", body(b"one"), "");
    let prev = cache.add("/u/c/seg1.m4s", body(b"two"), "");
    assert_eq!(prev.map(|s| s.data.clone()), Some(Bytes::from_static(b"one")));
    let got = cache.get("/u/c/seg1.m4s").await.map(|s| s.data.clone());
    assert_eq!(got, Some(Bytes::from_static(b"two")));
}

#[tokio::test]
async fn get_blocks_until_the_producer_arrives() {
    let cache = test_cache();
    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("/a/c/f.m4s").await.map(|s| s.data.clone()) })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(cache.add("/a/c/f.m4s", body(b"X"), "").is_none());

    let got = tokio::time::timeout(WAIT, reader).await;
    assert_eq!(got.ok().and_then(Result::ok).flatten(), Some(Bytes::from_static(b"X")));
}

#[tokio::test]
async fn get_times_out_and_cleans_the_placeholder() {
    let cache = test_cache();
    let started = std::time::Instant::now();
    assert!(cache.get("/never/written/seg.m4s").await.is_none());
    let waited = started.elapsed();
    assert!(waited >= WAIT, "returned after {waited:?}");
    assert!(waited < WAIT * 4, "returned after {waited:?}");
    assert!(cache.keys().is_empty());
}

#[tokio::test]
async fn del_releases_waiters_with_absence() {
    let cache = test_cache();
    cache.add("/u/c/seg.m4s", body(b"x"), "");
    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("/u/c/other.m4s").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.del("/u/c/other.m4s");
    let got = tokio::time::timeout(Duration::from_millis(80), reader).await;
    assert!(matches!(got, Ok(Ok(None))), "waiter should observe absence promptly");
    assert!(cache.del("/u/c/seg.m4s").is_some());
    assert!(cache.del("/u/c/seg.m4s").is_none());
}

#[tokio::test]
async fn ttl_classification_is_total_on_the_key() {
    let cache = test_cache();
    cache.add("/u/c/seg1.m4s", body(b"m"), "");
    cache.add("/u/c/init-stream0.m4s", body(b"i"), "");
    cache.add("/u/c/out.mpd", body(b"<MPD/>"), "");
    cache.add("/u/c/list.m3u8", body(b"#EXTM3U\n"), "");

    async fn ttl_of(cache: &SegmentCache, key: &str) -> Option<Duration> {
        cache.get(key).await.map(|s| s.ttl())
    }
    assert_eq!(ttl_of(&cache, "/u/c/seg1.m4s").await, Some(SHORT));
    assert_eq!(ttl_of(&cache, "/u/c/init-stream0.m4s").await, Some(LONG));
    assert_eq!(ttl_of(&cache, "/u/c/out.mpd").await, Some(LONG));
    assert_eq!(ttl_of(&cache, "/u/c/list.m3u8").await, Some(LONG));
}

#[tokio::test]
async fn sweep_removes_expired_media() {
    let cache = test_cache();
    cache.add("/u/c/seg1.m4s", body(b"z"), "");
    cache.add("/u/c/init-stream0.m4s", body(b"i"), "");

    assert_eq!(cache.sweep(), 0);
    tokio::time::sleep(SHORT + Duration::from_millis(30)).await;
    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.keys(), vec!["/u/c/init-stream0.m4s".to_owned()]);
}

#[tokio::test]
async fn prefix_delete_is_deferred_until_ripe() {
    let cache = test_cache();
    cache.add("/u/c/init-stream0.m4s", body(b"i"), "");
    cache.del_any("/u/c");

    // Not ripe yet: nothing happens.
    assert_eq!(cache.sweep(), 0);
    assert_eq!(cache.keys().len(), 1);

    tokio::time::sleep(SHORT + Duration::from_millis(30)).await;
    assert_eq!(cache.sweep(), 1);
    assert!(cache.keys().is_empty());
}

#[tokio::test]
async fn cancel_revokes_a_pending_prefix_delete() {
    let cache = test_cache();
    cache.add("/u/c/init-stream0.m4s", body(b"i"), "");
    cache.del_any("/u/c");
    assert_eq!(cache.cancel_del_any("/u/c"), 1);

    tokio::time::sleep(SHORT + Duration::from_millis(30)).await;
    assert_eq!(cache.sweep(), 0);
    assert_eq!(cache.keys().len(), 1);
}

#[tokio::test]
async fn cancel_is_asymmetric() {
    let cache = test_cache();

    // A more specific start revives the broader pending delete...
    cache.del_any("/u");
    assert_eq!(cache.cancel_del_any("/u/c"), 1);

    // ...but a broader start does not revive a more specific one.
    cache.del_any("/u/c");
    assert_eq!(cache.cancel_del_any("/u"), 0);
    assert_eq!(cache.cancel_del_any("/u/c/deeper"), 1);
}

#[tokio::test]
async fn ripe_prefix_respects_path_segments() {
    let cache = test_cache();
    cache.add("/u/c/init-stream0.m4s", body(b"i"), "");
    cache.add("/u/cx/init-stream0.m4s", body(b"i"), "");
    cache.del_any("/u/c");

    tokio::time::sleep(SHORT + Duration::from_millis(30)).await;
    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.keys(), vec!["/u/cx/init-stream0.m4s".to_owned()]);
}

#[tokio::test]
async fn introspection_listings() {
    let cache = test_cache();
    cache.add("/u/c/a.m4s", body(b"1"), "");
    cache.add("/u/c/b.m4s", body(b"2"), "");
    cache.add("/u/d/c.m4s", body(b"3"), "");

    let translations = cache.translations();
    assert_eq!(translations.get("/u/c"), Some(&2));
    assert_eq!(translations.get("/u/d"), Some(&1));

    let mut files: Vec<String> =
        cache.files("/u/c").into_iter().map(|info| info.key).collect();
    files.sort();
    assert_eq!(files, vec!["/u/c/a.m4s".to_owned(), "/u/c/b.m4s".to_owned()]);
}

#[test]
fn key_helpers() {
    assert_eq!(normalize_key("u/c/f.m4s"), "/u/c/f.m4s");
    assert_eq!(normalize_key("/u/c/"), "/u/c");
    assert_eq!(parent_path("/u/c/f.m4s"), "/u/c");
    assert_eq!(parent_path("/f.m4s"), "");
    assert!(is_path_prefix("/u/c", "/u/c/f.m4s"));
    assert!(!is_path_prefix("/u/c", "/u/cx/f.m4s"));
    assert!(!is_path_prefix("/u/c", "/u/c"));
}
