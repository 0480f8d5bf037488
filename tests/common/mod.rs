#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url_mapper::prelude::*;

/// Generator replaying a fixed list of codes, then failing.
pub struct ScriptedGenerator {
    codes: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedGenerator {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Lengths requested so far, one entry per call.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self, length: usize) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(length);
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::InvalidArgument("script exhausted".to_string()))
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub cache: Arc<MemoryCache>,
    pub service: MappingService<InMemoryStore>,
    pub clicks: mpsc::Receiver<ClickEvent>,
}

pub fn harness(generator: Arc<dyn CodeGenerator>, settings: MappingSettings) -> Harness {
    let store = InMemoryStore::new();
    let cache = Arc::new(MemoryCache::new());
    let (tx, clicks) = mpsc::channel(1024);
    let service = MappingService::new(
        Arc::new(store.clone()),
        cache.clone(),
        generator,
        tx,
        settings,
    );

    Harness {
        store,
        cache,
        service,
        clicks,
    }
}

pub fn new_mapping(code: &str, url: &str) -> NewUrlMapping {
    NewUrlMapping {
        original_url: url.to_string(),
        short_code: code.to_string(),
        expires_at: None,
        title: None,
        description: None,
    }
}

/// Inserts a row directly into the store, bypassing the service.
pub async fn seed(
    store: &InMemoryStore,
    code: &str,
    url: &str,
    active: bool,
    expires_at: Option<DateTime<Utc>>,
) -> UrlMapping {
    let mut uow = store.unit_of_work();
    uow.add(NewUrlMapping {
        expires_at,
        ..new_mapping(code, url)
    });
    let mut mapping = uow.save_changes().await.unwrap().remove(0);

    if !active {
        mapping.is_active = false;
        uow.update(mapping.clone());
        mapping = uow.save_changes().await.unwrap().remove(0);
    }
    mapping
}

pub async fn insert_row(pool: &PgPool, code: &str, url: &str, active: bool) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO url_mappings (original_url, short_code, is_active) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(url)
    .bind(code)
    .bind(active)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_expired_row(pool: &PgPool, code: &str, url: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO url_mappings (original_url, short_code, expires_at) VALUES ($1, $2, NOW() - INTERVAL '1 hour') RETURNING id",
    )
    .bind(url)
    .bind(code)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn click_count(pool: &PgPool, id: i64) -> i64 {
    sqlx::query_scalar("SELECT click_count FROM url_mappings WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}
