use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::{
    error::FallbackError,
    models::{command::NotificationCommand, fallback::UndeliveredCommandRecord},
};

/// Durable home for commands whose dispatch failed.
///
/// Every `persist` call runs in a unit of work of its own. It must never join
/// a transaction owned by the code that triggered the notification, so the
/// record survives whatever that transaction does.
#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn persist(
        &self,
        command: &NotificationCommand,
        error_message: &str,
    ) -> Result<UndeliveredCommandRecord, FallbackError>;
}

type Records = HashMap<i64, UndeliveredCommandRecord>;

/// In-process fallback store with explicit units of work.
///
/// Writes are staged in a [`MemoryUnitOfWork`] and only become visible on
/// `commit`. Dropping a unit of work without committing discards it.
#[derive(Clone, Default)]
pub struct MemoryFallbackStore {
    committed: Arc<Mutex<Records>>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            committed: Arc::clone(&self.committed),
            staged: Vec::new(),
        }
    }

    pub fn find(&self, subject_entity_id: i64) -> Option<UndeliveredCommandRecord> {
        lock(&self.committed).get(&subject_entity_id).cloned()
    }

    pub fn records(&self) -> Vec<UndeliveredCommandRecord> {
        let mut records: Vec<_> = lock(&self.committed).values().cloned().collect();
        records.sort_by_key(|r| r.last_attempt_at);
        records
    }

    pub fn len(&self) -> usize {
        lock(&self.committed).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FallbackStore for MemoryFallbackStore {
    async fn persist(
        &self,
        command: &NotificationCommand,
        error_message: &str,
    ) -> Result<UndeliveredCommandRecord, FallbackError> {
        let mut unit = self.begin();
        unit.stage(UndeliveredCommandRecord::first_attempt(
            command,
            error_message,
            Utc::now(),
        )?);
        let mut written = unit.commit();

        written
            .pop()
            .ok_or_else(|| FallbackError::Unavailable("commit wrote no record".to_string()))
    }
}

pub struct MemoryUnitOfWork {
    committed: Arc<Mutex<Records>>,
    staged: Vec<UndeliveredCommandRecord>,
}

impl MemoryUnitOfWork {
    pub fn stage(&mut self, record: UndeliveredCommandRecord) {
        self.staged.push(record);
    }

    /// Applies staged records in order and returns them as stored.
    pub fn commit(mut self) -> Vec<UndeliveredCommandRecord> {
        let staged = std::mem::take(&mut self.staged);
        let mut committed = lock(&self.committed);

        staged
            .into_iter()
            .map(|record| {
                let stored = match committed.remove(&record.subject_entity_id) {
                    Some(mut existing) => {
                        existing.record_attempt(record);
                        existing
                    }
                    None => record,
                };
                committed.insert(stored.subject_entity_id, stored.clone());
                stored
            })
            .collect()
    }

    pub fn rollback(self) {}
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                discarded = self.staged.len(),
                "Unit of work dropped without commit"
            );
        }
    }
}

fn lock(records: &Mutex<Records>) -> MutexGuard<'_, Records> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}
