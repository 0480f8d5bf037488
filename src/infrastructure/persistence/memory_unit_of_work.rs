//! In-process implementation of the mapping repository and unit of work.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::PendingChange;
use crate::domain::entities::{NewUrlMapping, UrlMapping};
use crate::domain::repositories::{UnitOfWork, UnitOfWorkFactory, UrlMappingRepository};
use crate::error::AppError;

#[derive(Debug, Default)]
struct StoreState {
    rows: BTreeMap<i64, UrlMapping>,
    next_id: i64,
}

impl StoreState {
    /// Enforces the filtered unique index: no two active rows share a code.
    fn ensure_code_free(&self, code: &str, except_id: Option<i64>) -> Result<(), AppError> {
        let taken = self
            .rows
            .values()
            .any(|m| m.is_active && m.short_code == code && Some(m.id) != except_id);
        if taken {
            return Err(AppError::code_exists(code));
        }
        Ok(())
    }

    fn find_by_code(&self, code: &str) -> Option<&UrlMapping> {
        self.rows
            .values()
            .filter(|m| m.short_code == code)
            .max_by_key(|m| (m.is_active, m.id))
    }

    fn apply(&mut self, change: PendingChange) -> Result<(UrlMapping, Undo), AppError> {
        match change {
            PendingChange::Add(new) => self.insert(new),
            PendingChange::Update(mapping) => self.replace(mapping),
        }
    }

    fn insert(&mut self, new: NewUrlMapping) -> Result<(UrlMapping, Undo), AppError> {
        self.ensure_code_free(&new.short_code, None)?;
        self.next_id += 1;
        let mapping = new.into_mapping(self.next_id, Utc::now());
        self.rows.insert(mapping.id, mapping.clone());
        Ok((mapping.clone(), Undo::Inserted(mapping.id)))
    }

    fn replace(&mut self, mut mapping: UrlMapping) -> Result<(UrlMapping, Undo), AppError> {
        let previous = self
            .rows
            .get(&mapping.id)
            .cloned()
            .ok_or_else(|| AppError::persistence(format!("no mapping with id {}", mapping.id)))?;
        if mapping.is_active {
            self.ensure_code_free(&mapping.short_code, Some(mapping.id))?;
        }

        // The stored count wins so a stale copy cannot undo concurrent increments.
        mapping.click_count = previous.click_count;
        mapping.created_at = previous.created_at;
        mapping.updated_at = Utc::now();
        self.rows.insert(mapping.id, mapping.clone());
        Ok((mapping, Undo::Replaced(previous)))
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Inserted(id) => {
                self.rows.remove(&id);
            }
            Undo::Replaced(previous) => {
                self.rows.insert(previous.id, previous);
            }
        }
    }
}

#[derive(Debug)]
enum Undo {
    Inserted(i64),
    Replaced(UrlMapping),
}

/// Mapping store kept in process memory.
///
/// Clones share the same rows. Writes made inside a transaction are visible to
/// other scopes before commit and are reverted on rollback, so isolation is
/// read-uncommitted; the filtered uniqueness rule is always enforced.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork {
            store: self.clone(),
            pending: Vec::new(),
            undo: None,
        }
    }

    /// Number of stored rows, active or not.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the row with `id`.
    pub fn get(&self, id: i64) -> Option<UrlMapping> {
        self.lock().rows.get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UnitOfWorkFactory for InMemoryStore {
    fn scope(&self) -> Box<dyn UnitOfWork> {
        Box::new(self.unit_of_work())
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// An open transaction records an undo log; rollback (or dropping the scope)
/// replays it in reverse.
pub struct InMemoryUnitOfWork {
    store: InMemoryStore,
    pending: Vec<PendingChange>,
    undo: Option<Vec<Undo>>,
}

impl InMemoryUnitOfWork {
    /// Applies `pending` atomically, reverting partial work on failure.
    fn flush(&mut self, pending: Vec<PendingChange>) -> Result<Vec<UrlMapping>, AppError> {
        let mut state = self.store.lock();
        let mut saved = Vec::with_capacity(pending.len());
        let mut undo = Vec::with_capacity(pending.len());

        for change in pending {
            match state.apply(change) {
                Ok((mapping, entry)) => {
                    saved.push(mapping);
                    undo.push(entry);
                }
                Err(e) => {
                    for entry in undo.into_iter().rev() {
                        state.revert(entry);
                    }
                    return Err(e);
                }
            }
        }

        if let Some(log) = self.undo.as_mut() {
            log.extend(undo);
        }
        Ok(saved)
    }

    fn revert_transaction(&mut self, log: Vec<Undo>) {
        let mut state = self.store.lock();
        for entry in log.into_iter().rev() {
            state.revert(entry);
        }
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if let Some(log) = self.undo.take() {
            tracing::warn!("Unit of work dropped with an open transaction, rolling back");
            self.revert_transaction(log);
        }
    }
}

#[async_trait]
impl UrlMappingRepository for InMemoryUnitOfWork {
    async fn find_by_code(&mut self, code: &str) -> Result<Option<UrlMapping>, AppError> {
        Ok(self.store.lock().find_by_code(code).cloned())
    }

    async fn find_by_id(&mut self, id: i64) -> Result<Option<UrlMapping>, AppError> {
        Ok(self.store.get(id))
    }

    async fn exists_by_code(&mut self, code: &str) -> Result<bool, AppError> {
        Ok(self
            .store
            .lock()
            .rows
            .values()
            .any(|m| m.short_code == code))
    }

    async fn exists_active_by_code(&mut self, code: &str) -> Result<bool, AppError> {
        Ok(self
            .store
            .lock()
            .rows
            .values()
            .any(|m| m.is_active && m.short_code == code))
    }

    async fn increment_click_count(&mut self, code: &str) -> Result<Option<i64>, AppError> {
        let mut state = self.store.lock();
        let row = state
            .rows
            .values_mut()
            .find(|m| m.is_active && m.short_code == code);
        Ok(row.map(|m| {
            m.click_count += 1;
            m.updated_at = Utc::now();
            m.click_count
        }))
    }

    fn add(&mut self, mapping: NewUrlMapping) {
        self.pending.push(PendingChange::Add(mapping));
    }

    fn update(&mut self, mapping: UrlMapping) {
        self.pending.push(PendingChange::Update(mapping));
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn begin_transaction(&mut self) -> Result<(), AppError> {
        if self.undo.is_some() {
            return Err(AppError::TransactionAlreadyActive);
        }
        self.undo = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        let log = self.undo.take().ok_or(AppError::NoActiveTransaction)?;

        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            // The log is already detached; a failed flush reverts only its own work.
            if let Err(e) = self.flush(pending) {
                self.revert_transaction(log);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        let log = self.undo.take().ok_or(AppError::NoActiveTransaction)?;
        self.pending.clear();
        self.revert_transaction(log);
        Ok(())
    }

    async fn save_changes(&mut self) -> Result<Vec<UrlMapping>, AppError> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        self.flush(pending)
    }

    fn has_active_transaction(&self) -> bool {
        self.undo.is_some()
    }
}
