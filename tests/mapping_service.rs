mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{ScriptedGenerator, harness, seed};
use std::sync::Arc;
use std::time::Duration;
use url_mapper::domain::click_worker::run_click_worker;
use url_mapper::prelude::*;

#[tokio::test]
async fn test_generated_code_skips_existing_code() {
    let generator = Arc::new(ScriptedGenerator::new(&["abc123", "xyz789"]));
    let h = harness(generator.clone(), MappingSettings::default());
    seed(&h.store, "abc123", "https://taken.example.com", true, None).await;

    let mapping = h
        .service
        .create(CreateMappingRequest::new("https://example.com"))
        .await
        .unwrap();

    assert_eq!(mapping.short_code, "xyz789");
    assert_eq!(mapping.original_url, "https://example.com");
    assert_eq!(generator.calls(), vec![7, 7]);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_generation_exhausted_is_bounded() {
    let generator = Arc::new(ScriptedGenerator::new(&["aaa111", "bbb222", "ccc333"]));
    let settings = MappingSettings {
        max_attempts: 3,
        ..MappingSettings::default()
    };
    let h = harness(generator.clone(), settings);
    for code in ["aaa111", "bbb222", "ccc333"] {
        seed(&h.store, code, "https://example.com", true, None).await;
    }

    let err = h
        .service
        .create(CreateMappingRequest::new("https://example.com/new"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CodeGenerationExhausted { attempts: 3 }));
    assert_eq!(generator.calls().len(), 3);
}

#[tokio::test]
async fn test_cache_hit_served_without_store() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    h.cache
        .set("url:xyz789", "https://example.com", Duration::from_secs(60))
        .await
        .unwrap();

    let url = h.service.resolve("xyz789").await.unwrap();

    assert_eq!(url, "https://example.com");
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_inactive_mapping_is_not_found() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    seed(&h.store, "dead01", "https://example.com", false, None).await;

    let err = h.service.resolve("dead01").await.unwrap_err();

    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_expired_mapping_is_not_found() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    let expired = seed(
        &h.store,
        "old001",
        "https://example.com",
        true,
        Some(Utc::now() - ChronoDuration::hours(1)),
    )
    .await;

    let err = h.service.resolve("old001").await.unwrap_err();

    assert!(matches!(err, AppError::NotFound { .. }));
    let row = h.store.get(expired.id).unwrap();
    assert!(row.is_active);
    assert_eq!(row.click_count, 0);
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );

    let err = h.service.resolve("never1").await.unwrap_err();

    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_each_resolve_counts_once() {
    let generator = Arc::new(ScriptedGenerator::new(&["abc1234"]));
    let mut h = harness(generator, MappingSettings::default());
    let mapping = h
        .service
        .create(CreateMappingRequest::new("https://example.com"))
        .await
        .unwrap();

    // Populated on create, so both resolves are cache hits.
    h.service.resolve("abc1234").await.unwrap();
    h.service.resolve("abc1234").await.unwrap();

    assert_eq!(h.store.get(mapping.id).unwrap().click_count, 0);
    assert_eq!(h.clicks.recv().await.unwrap().code, "abc1234");
    assert_eq!(h.clicks.recv().await.unwrap().code, "abc1234");
    assert!(h.clicks.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_misses_lose_no_increments() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    let mapping = seed(&h.store, "hot001", "https://example.com", true, None).await;
    let cache = h.cache.clone();
    let service = Arc::new(h.service);

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let service = service.clone();
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            // Keep every call on the store path.
            cache.delete("url:hot001").await.unwrap();
            service.resolve("hot001").await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Calls that raced into a cache hit were queued instead of counted inline.
    let mut queued = 0;
    let mut clicks = h.clicks;
    while clicks.try_recv().is_ok() {
        queued += 1;
    }
    assert_eq!(h.store.get(mapping.id).unwrap().click_count + queued, 50);
}

#[tokio::test]
async fn test_worker_applies_queued_clicks() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    let mapping = seed(&h.store, "abc123", "https://example.com", true, None).await;
    h.cache
        .set("url:abc123", "https://example.com", Duration::from_secs(60))
        .await
        .unwrap();
    let worker = tokio::spawn(run_click_worker(h.clicks, Arc::new(h.store.clone()), 4));

    for _ in 0..10 {
        h.service.resolve("abc123").await.unwrap();
    }
    drop(h.service);
    worker.await.unwrap();

    assert_eq!(h.store.get(mapping.id).unwrap().click_count, 10);
}

#[tokio::test]
async fn test_purge_present_then_absent() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    h.cache
        .set("url:xyz789", "https://example.com", Duration::from_secs(60))
        .await
        .unwrap();

    assert!(h.service.purge("xyz789").await.unwrap());
    assert_eq!(h.cache.get("url:xyz789").await.unwrap(), None);
    assert!(!h.service.purge("xyz789").await.unwrap());
    assert!(!h.service.purge("never1").await.unwrap());
}

#[tokio::test]
async fn test_purge_keeps_store_record() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    h.service
        .create(CreateMappingRequest::new("https://example.com").with_custom_code("keep01"))
        .await
        .unwrap();

    assert!(h.service.purge("keep01").await.unwrap());
    assert_eq!(
        h.service.resolve("keep01").await.unwrap(),
        "https://example.com"
    );
}

#[tokio::test]
async fn test_custom_code_conflict_and_reuse_policy() {
    let settings = MappingSettings {
        allow_code_reuse: true,
        ..MappingSettings::default()
    };
    let h = harness(Arc::new(ScriptedGenerator::new(&[])), settings);
    let request = CreateMappingRequest::new("https://first.example.com").with_custom_code("promo");
    h.service.create(request.clone()).await.unwrap();

    let err = h.service.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::CodeAlreadyExists { .. }));

    assert!(h.service.deactivate("promo").await.unwrap());
    let second = h
        .service
        .create(CreateMappingRequest::new("https://second.example.com").with_custom_code("promo"))
        .await
        .unwrap();

    assert_eq!(second.short_code, "promo");
    assert_eq!(
        h.service.resolve("promo").await.unwrap(),
        "https://second.example.com"
    );
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_expiry_caps_cached_entry() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    h.service
        .create(
            CreateMappingRequest::new("https://example.com")
                .with_custom_code("brief1")
                .with_expires_at(Utc::now() - ChronoDuration::seconds(1)),
        )
        .await
        .unwrap();

    assert!(h.cache.is_empty());
    assert!(matches!(
        h.service.resolve("brief1").await.unwrap_err(),
        AppError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_get_mapping_reports_record_without_counting() {
    let h = harness(
        Arc::new(ScriptedGenerator::new(&[])),
        MappingSettings::default(),
    );
    seed(&h.store, "info01", "https://example.com", true, None).await;

    let mapping = h.service.get_mapping("info01").await.unwrap();

    assert_eq!(mapping.click_count, 0);
    assert!(h.cache.is_empty());
}
