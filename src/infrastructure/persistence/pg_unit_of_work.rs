//! PostgreSQL implementation of the mapping repository and unit of work.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, warn};

use super::PendingChange;
use crate::config::Config;
use crate::domain::entities::{NewUrlMapping, UrlMapping};
use crate::domain::repositories::{UnitOfWork, UnitOfWorkFactory, UrlMappingRepository};
use crate::error::{AppError, map_sqlx_error};

/// Opens a connection pool sized from `config`.
///
/// # Errors
///
/// Returns an error if the database is unreachable within the connect timeout.
pub async fn connect_pool(database_url: &str, config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .connect(database_url)
        .await
}

/// Applies the embedded schema migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Hands out one [`PgUnitOfWork`] per logical operation over a shared pool.
#[derive(Debug, Clone)]
pub struct PgUnitOfWorkFactory {
    pool: PgPool,
}

impl PgUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl UnitOfWorkFactory for PgUnitOfWorkFactory {
    fn scope(&self) -> Box<dyn UnitOfWork> {
        Box::new(PgUnitOfWork::new(self.pool.clone()))
    }
}

/// Unit of work holding at most one open PostgreSQL transaction.
///
/// Reads run inside the open transaction when there is one, otherwise directly
/// on the pool. Dropping the scope with an open transaction rolls it back.
pub struct PgUnitOfWork {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    pending: Vec<PendingChange>,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            pending: Vec::new(),
        }
    }
}

impl Drop for PgUnitOfWork {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("Unit of work dropped with an open transaction, rolling back");
        }
    }
}

/// Runs `$body` with `$ex` bound to the open transaction or, failing that, the pool.
macro_rules! with_executor {
    ($self:ident, |$ex:ident| $body:expr) => {
        match $self.tx.as_mut() {
            Some(tx) => {
                let $ex = &mut **tx;
                $body
            }
            None => {
                let $ex = &$self.pool;
                $body
            }
        }
    };
}

const SELECT_BY_CODE: &str = r#"
    SELECT id, original_url, short_code, click_count, expires_at, is_active,
           title, description, created_at, updated_at
    FROM url_mappings
    WHERE short_code = $1
    ORDER BY is_active DESC, id DESC
    LIMIT 1
"#;

const SELECT_BY_ID: &str = r#"
    SELECT id, original_url, short_code, click_count, expires_at, is_active,
           title, description, created_at, updated_at
    FROM url_mappings
    WHERE id = $1
"#;

const EXISTS_BY_CODE: &str =
    "SELECT EXISTS (SELECT 1 FROM url_mappings WHERE short_code = $1)";

const EXISTS_ACTIVE_BY_CODE: &str =
    "SELECT EXISTS (SELECT 1 FROM url_mappings WHERE short_code = $1 AND is_active)";

const INCREMENT_CLICKS: &str = r#"
    UPDATE url_mappings
    SET click_count = click_count + 1, updated_at = NOW()
    WHERE short_code = $1 AND is_active
    RETURNING click_count
"#;

const INSERT: &str = r#"
    INSERT INTO url_mappings (original_url, short_code, expires_at, title, description)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, original_url, short_code, click_count, expires_at, is_active,
              title, description, created_at, updated_at
"#;

// click_count is left out so a stale in-memory copy cannot undo concurrent increments.
const UPDATE: &str = r#"
    UPDATE url_mappings
    SET original_url = $2, short_code = $3, expires_at = $4, is_active = $5,
        title = $6, description = $7, updated_at = NOW()
    WHERE id = $1
    RETURNING id, original_url, short_code, click_count, expires_at, is_active,
              title, description, created_at, updated_at
"#;

async fn insert_row(conn: &mut PgConnection, new: &NewUrlMapping) -> Result<PgRow, sqlx::Error> {
    sqlx::query(INSERT)
        .bind(&new.original_url)
        .bind(&new.short_code)
        .bind(new.expires_at)
        .bind(&new.title)
        .bind(&new.description)
        .fetch_one(conn)
        .await
}

async fn update_row(
    conn: &mut PgConnection,
    mapping: &UrlMapping,
) -> Result<Option<PgRow>, sqlx::Error> {
    sqlx::query(UPDATE)
        .bind(mapping.id)
        .bind(&mapping.original_url)
        .bind(&mapping.short_code)
        .bind(mapping.expires_at)
        .bind(mapping.is_active)
        .bind(&mapping.title)
        .bind(&mapping.description)
        .fetch_optional(conn)
        .await
}

/// Writes staged changes in order on `conn`.
async fn flush(
    conn: &mut PgConnection,
    pending: Vec<PendingChange>,
) -> Result<Vec<UrlMapping>, AppError> {
    use sqlx::FromRow;

    let mut saved = Vec::with_capacity(pending.len());
    for change in pending {
        let mapping = match change {
            PendingChange::Add(new) => {
                let row = insert_row(&mut *conn, &new)
                    .await
                    .map_err(|e| map_sqlx_error(e, Some(&new.short_code)))?;
                UrlMapping::from_row(&row)?
            }
            PendingChange::Update(mapping) => {
                let row = update_row(&mut *conn, &mapping)
                    .await
                    .map_err(|e| map_sqlx_error(e, Some(&mapping.short_code)))?
                    .ok_or_else(|| {
                        AppError::persistence(format!("no mapping with id {}", mapping.id))
                    })?;
                UrlMapping::from_row(&row)?
            }
        };
        saved.push(mapping);
    }
    Ok(saved)
}

#[async_trait]
impl UrlMappingRepository for PgUnitOfWork {
    async fn find_by_code(&mut self, code: &str) -> Result<Option<UrlMapping>, AppError> {
        let query = sqlx::query_as::<_, UrlMapping>(SELECT_BY_CODE).bind(code);
        Ok(with_executor!(self, |ex| query.fetch_optional(ex).await)?)
    }

    async fn find_by_id(&mut self, id: i64) -> Result<Option<UrlMapping>, AppError> {
        let query = sqlx::query_as::<_, UrlMapping>(SELECT_BY_ID).bind(id);
        Ok(with_executor!(self, |ex| query.fetch_optional(ex).await)?)
    }

    async fn exists_by_code(&mut self, code: &str) -> Result<bool, AppError> {
        let query = sqlx::query_scalar::<_, bool>(EXISTS_BY_CODE).bind(code);
        Ok(with_executor!(self, |ex| query.fetch_one(ex).await)?)
    }

    async fn exists_active_by_code(&mut self, code: &str) -> Result<bool, AppError> {
        let query = sqlx::query_scalar::<_, bool>(EXISTS_ACTIVE_BY_CODE).bind(code);
        Ok(with_executor!(self, |ex| query.fetch_one(ex).await)?)
    }

    async fn increment_click_count(&mut self, code: &str) -> Result<Option<i64>, AppError> {
        let query = sqlx::query_scalar::<_, i64>(INCREMENT_CLICKS).bind(code);
        Ok(with_executor!(self, |ex| query.fetch_optional(ex).await)?)
    }

    fn add(&mut self, mapping: NewUrlMapping) {
        self.pending.push(PendingChange::Add(mapping));
    }

    fn update(&mut self, mapping: UrlMapping) {
        self.pending.push(PendingChange::Update(mapping));
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin_transaction(&mut self) -> Result<(), AppError> {
        if self.tx.is_some() {
            return Err(AppError::TransactionAlreadyActive);
        }
        self.tx = Some(self.pool.begin().await?);
        debug!("Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        let mut tx = self.tx.take().ok_or(AppError::NoActiveTransaction)?;

        // Leftover staged changes are part of this transaction.
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            flush(&mut tx, pending).await?;
        }

        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        let tx = self.tx.take().ok_or(AppError::NoActiveTransaction)?;
        self.pending.clear();
        tx.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }

    async fn save_changes(&mut self) -> Result<Vec<UrlMapping>, AppError> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        match self.tx.as_mut() {
            Some(tx) => flush(tx, pending).await,
            None => {
                let mut tx = self.pool.begin().await?;
                let saved = flush(&mut tx, pending).await?;
                tx.commit().await?;
                Ok(saved)
            }
        }
    }

    fn has_active_transaction(&self) -> bool {
        self.tx.is_some()
    }
}
