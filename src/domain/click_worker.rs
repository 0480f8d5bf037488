//! Background worker applying queued click increments.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

use crate::domain::click_event::ClickEvent;
use crate::domain::repositories::UnitOfWorkFactory;
use crate::error::AppError;

/// Retries after the first attempt.
const MAX_RETRIES: usize = 3;

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(10)
        .max_delay(Duration::from_secs(1))
        .map(jitter)
        .take(MAX_RETRIES)
}

fn is_transient(e: &AppError) -> bool {
    matches!(
        e,
        AppError::PersistenceFailure(_) | AppError::Timeout { .. }
    )
}

/// Applies one click increment in its own unit of work, retrying transient
/// store failures with exponential backoff.
///
/// Returns the new click count, or `None` when the code no longer has an
/// active mapping.
///
/// # Errors
///
/// Returns the last store error once retries are exhausted.
pub async fn record_click<F>(factory: &F, event: &ClickEvent) -> Result<Option<i64>, AppError>
where
    F: UnitOfWorkFactory + ?Sized,
{
    RetryIf::spawn(
        retry_strategy(),
        move || async move {
            let mut uow = factory.scope();
            uow.increment_click_count(&event.code).await
        },
        is_transient,
    )
    .await
}

/// Consumes click events until every sender is dropped.
///
/// At most `concurrency` increments run at once. Failures are logged and
/// counted, never propagated. Events still queued when the channel closes are
/// drained before the worker returns.
pub async fn run_click_worker<F>(
    mut rx: mpsc::Receiver<ClickEvent>,
    factory: Arc<F>,
    concurrency: usize,
) where
    F: UnitOfWorkFactory + ?Sized + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    info!(concurrency, "Click worker started");

    while let Some(event) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let factory = factory.clone();

        tasks.spawn(async move {
            let _permit = permit;
            match record_click(factory.as_ref(), &event).await {
                Ok(Some(count)) => debug!(code = %event.code, count, "Click recorded"),
                Ok(None) => debug!(code = %event.code, "Click for inactive code ignored"),
                Err(e) => {
                    metrics::counter!("url_mapper_click_increments_failed_total").increment(1);
                    warn!(code = %event.code, error = %e, "Failed to record click");
                }
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    info!("Click worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::NewUrlMapping;
    use crate::domain::repositories::{UnitOfWork, UrlMappingRepository};
    use crate::infrastructure::persistence::InMemoryStore;

    async fn seeded_store(code: &str) -> (InMemoryStore, i64) {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        uow.add(NewUrlMapping {
            original_url: "https://example.com".to_string(),
            short_code: code.to_string(),
            expires_at: None,
            title: None,
            description: None,
        });
        let id = uow.save_changes().await.unwrap()[0].id;
        (store, id)
    }

    #[tokio::test]
    async fn test_record_click_increments() {
        let (store, id) = seeded_store("abc123").await;

        let count = record_click(&store, &ClickEvent::new("abc123"))
            .await
            .unwrap();

        assert_eq!(count, Some(1));
        assert_eq!(store.get(id).unwrap().click_count, 1);
    }

    #[tokio::test]
    async fn test_record_click_for_unknown_code_is_none() {
        let (store, _) = seeded_store("abc123").await;

        let count = record_click(&store, &ClickEvent::new("zzz999"))
            .await
            .unwrap();

        assert_eq!(count, None);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_close() {
        let (store, id) = seeded_store("abc123").await;
        let (tx, rx) = mpsc::channel(64);
        let worker = tokio::spawn(run_click_worker(rx, Arc::new(store.clone()), 4));

        for _ in 0..25 {
            tx.send(ClickEvent::new("abc123")).await.unwrap();
        }
        drop(tx);
        worker.await.unwrap();

        assert_eq!(store.get(id).unwrap().click_count, 25);
    }

    #[test]
    fn test_only_store_failures_are_retried() {
        assert!(is_transient(&AppError::persistence("connection reset")));
        assert!(is_transient(&AppError::Timeout { millis: 5 }));
        assert!(!is_transient(&AppError::not_found("abc")));
    }
}
