//! In-memory stores backed by a `HashMap` under one reader/writer lock.
//!
//! Listing materializes and sorts all keys on every call, which is fine at
//! test and single-node scale.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use lastmile_core::{
    next_offset, validate_key, Page, PageRequest, Record, RecordStore, RequestContext, StoreError,
    UpsertStore,
};

use crate::readiness::ReadyResource;
use crate::storage::Backend;

/// Backend with no external dependencies and nothing to probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    type Store<R: Record> = MemoryStore<R>;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn store<R: Record>(&self) -> MemoryStore<R> {
        MemoryStore::new()
    }

    fn ready_resources(&self) -> Vec<Arc<dyn ReadyResource>> {
        Vec::new()
    }
}

/// Key to record map for one entity type.
///
/// Records go in and come out as clones, so callers never alias the
/// stored values.
pub struct MemoryStore<R> {
    records: RwLock<HashMap<String, R>>,
}

impl<R: Record> MemoryStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn create(&self, _ctx: &RequestContext, record: &R) -> Result<(), StoreError> {
        record.validate()?;
        let mut records = self.records.write();
        match records.entry(record.id().to_string()) {
            Entry::Occupied(slot) => Err(StoreError::AlreadyExists {
                entity: R::ENTITY,
                id: slot.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, _ctx: &RequestContext, id: &str) -> Result<R, StoreError> {
        validate_key::<R>(id)?;
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: R::ENTITY,
                id: id.to_string(),
            })
    }

    async fn list(
        &self,
        _ctx: &RequestContext,
        offset: i64,
        limit: i64,
    ) -> Result<Page<R>, StoreError> {
        let window = PageRequest::new(offset, limit)?;
        let records = self.records.read();

        let mut keys: Vec<&String> = records.keys().collect();
        keys.sort_unstable();
        let total = keys.len();
        if window.offset >= total {
            return Ok(Page::end());
        }

        let end = window.end().min(total);
        let items: Vec<R> = keys[window.offset..end]
            .iter()
            .filter_map(|key| records.get(*key).cloned())
            .collect();

        Ok(Page {
            next_offset: next_offset(window.offset, end - window.offset, total),
            items,
        })
    }
}

#[async_trait]
impl<R: Record> UpsertStore<R> for MemoryStore<R> {
    async fn upsert(&self, _ctx: &RequestContext, record: &R) -> Result<(), StoreError> {
        validate_key::<R>(record.id())?;
        self.records
            .write()
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }
}
