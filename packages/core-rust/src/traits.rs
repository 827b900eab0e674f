use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::StoreError;
use crate::model::Record;
use crate::page::Page;

/// Persistence contract for one entity type.
///
/// Implementations must be safe under concurrent calls from many handler
/// tasks, must hand out independent copies of stored records, and must
/// enumerate records in ascending byte-wise key order so that paging is
/// reproducible whichever backend is configured.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync + 'static {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the key or a required field is blank,
    /// `AlreadyExists` if the key is occupied, `Internal` on backend failure.
    async fn create(&self, ctx: &RequestContext, record: &R) -> Result<(), StoreError>;

    /// Fetches the record stored under `id`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty id, `NotFound` if absent, `Internal`
    /// on backend failure.
    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<R, StoreError>;

    /// Returns up to `limit` records starting at position `offset`.
    ///
    /// An offset at or past the end yields an empty page with no next offset.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `offset < 0` or `limit <= 0`, `Internal` on
    /// backend failure.
    async fn list(&self, ctx: &RequestContext, offset: i64, limit: i64)
        -> Result<Page<R>, StoreError>;
}

/// Unconditional replace-or-insert, for entities that are managed
/// idempotently rather than created once.
#[async_trait]
pub trait UpsertStore<R: Record>: RecordStore<R> {
    /// Writes `record` under its key whether or not one exists.
    ///
    /// Only the key is validated here; field-level validation belongs to
    /// the caller.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty key, `Internal` on backend failure.
    async fn upsert(&self, ctx: &RequestContext, record: &R) -> Result<(), StoreError>;
}
