//! Pluggable persistence for domain records.
//!
//! A [`Backend`] is chosen once at process start and yields one store per
//! entity type. All three backends satisfy the same
//! [`RecordStore`](lastmile_core::RecordStore) contract:
//!
//! - [`MemoryBackend`]: lock-guarded hash maps, for tests and single-node use
//! - [`MongoBackend`]: one collection per entity, `_id` = entity key
//! - [`RedisBackend`]: JSON blobs under `<prefix>:<entity>:<id>` plus a sorted-set index

pub mod backends;
pub mod clients;

#[cfg(test)]
pub(crate) mod conformance;

use std::future::Future;
use std::sync::Arc;

use lastmile_core::{Record, RequestContext, StoreError, UpsertStore};

pub use backends::{MemoryBackend, MemoryStore, MongoBackend, MongoStore, RedisBackend, RedisStore};

use crate::readiness::ReadyResource;

/// A storage mechanism able to produce a store for any record type.
///
/// Selection is static: the application is generic over `B: Backend`, so
/// store calls are never redispatched dynamically per call.
pub trait Backend: Send + Sync + 'static {
    /// Store type produced for record type `R`.
    type Store<R: Record>: UpsertStore<R>;

    /// Short name used in logs, e.g. `"mongo"`.
    fn name(&self) -> &'static str;

    /// Creates the store for record type `R`.
    ///
    /// Network backends share their client handle between stores; the
    /// in-memory backend gives every store its own map.
    fn store<R: Record>(&self) -> Self::Store<R>;

    /// Liveness probes and release hooks for the clients this backend owns.
    fn ready_resources(&self) -> Vec<Arc<dyn ReadyResource>>;
}

/// Runs backend I/O under the call's deadline, if it has one.
///
/// Deadline expiry is a server-side failure and surfaces as `Internal`.
pub(crate) async fn within_deadline<T, F>(
    ctx: &RequestContext,
    op: &'static str,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match ctx.remaining() {
        None => fut.await,
        Some(left) if left.is_zero() => Err(StoreError::internal(anyhow::anyhow!(
            "{op}: deadline exceeded before dispatch"
        ))),
        Some(left) => tokio::time::timeout(left, fut).await.map_err(|_| {
            StoreError::internal(anyhow::anyhow!("{op}: deadline exceeded after {left:?}"))
        })?,
    }
}
