//! Cache-store backend: JSON blobs plus a sorted-set enumeration index.
//!
//! Layout for entity `rider` under prefix `lastmile`:
//!
//! - `lastmile:rider:<id>`: the record, serialized as JSON
//! - `lastmile:riders`: sorted set of ids, every score 0
//!
//! Equal scores make the sorted set order members lexicographically by
//! bytes, which is the same order the other backends list in.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use lastmile_core::{
    next_offset, validate_key, Page, PageRequest, Record, RecordStore, RequestContext, StoreError,
    UpsertStore,
};

use crate::readiness::{ReadyResource, RedisResource};
use crate::storage::{within_deadline, Backend};

/// Backend sharing one multiplexed connection across all stores.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    prefix: Arc<str>,
}

impl RedisBackend {
    #[must_use]
    pub fn new(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: Arc::from(prefix),
        }
    }
}

impl Backend for RedisBackend {
    type Store<R: Record> = RedisStore<R>;

    fn name(&self) -> &'static str {
        "redis"
    }

    fn store<R: Record>(&self) -> RedisStore<R> {
        RedisStore::new(self.conn.clone(), &self.prefix)
    }

    fn ready_resources(&self) -> Vec<Arc<dyn ReadyResource>> {
        vec![Arc::new(RedisResource::new(self.conn.clone()))]
    }
}

/// Store for one entity type under a key prefix.
pub struct RedisStore<R> {
    conn: ConnectionManager,
    prefix: Arc<str>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RedisStore<R> {
    #[must_use]
    pub fn new(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: Arc::from(prefix),
            _record: PhantomData,
        }
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}:{}:{}", self.prefix, R::ENTITY, id)
    }

    fn index_key(&self) -> String {
        format!("{}:{}s", self.prefix, R::ENTITY)
    }

    fn encode(record: &R) -> Result<String, StoreError> {
        serde_json::to_string(record).map_err(StoreError::internal)
    }

    fn decode(blob: &str) -> Result<R, StoreError> {
        serde_json::from_str(blob).map_err(StoreError::internal)
    }

    /// Decodes an MGET reply. Index entries whose blob has vanished come
    /// back as nil and are skipped, not errors.
    fn decode_blobs(blobs: &[Option<String>]) -> Result<Vec<R>, StoreError> {
        blobs.iter().flatten().map(|blob| Self::decode(blob)).collect()
    }

    /// Interprets the `SET NX` reply of a create: nil means the key was taken.
    fn created(reply: Option<String>, id: &str) -> Result<(), StoreError> {
        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::AlreadyExists {
                entity: R::ENTITY,
                id: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for RedisStore<R> {
    async fn create(&self, ctx: &RequestContext, record: &R) -> Result<(), StoreError> {
        record.validate()?;
        let blob = Self::encode(record)?;
        let key = self.record_key(record.id());
        let index = self.index_key();
        let mut conn = self.conn.clone();

        within_deadline(ctx, "redis create", async {
            // ZADD of a member already present with the same score is a no-op,
            // so a losing SET NX leaves the index unchanged.
            let (set, _): (Option<String>, i64) = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(&key)
                .arg(&blob)
                .arg("NX")
                .cmd("ZADD")
                .arg(&index)
                .arg(0)
                .arg(record.id())
                .query_async(&mut conn)
                .await
                .map_err(StoreError::internal)?;
            Self::created(set, record.id())
        })
        .await
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<R, StoreError> {
        validate_key::<R>(id)?;
        let key = self.record_key(id);
        let mut conn = self.conn.clone();

        within_deadline(ctx, "redis get", async {
            let blob: Option<String> = conn.get(&key).await.map_err(StoreError::internal)?;
            match blob {
                Some(blob) => Self::decode(&blob),
                None => Err(StoreError::NotFound {
                    entity: R::ENTITY,
                    id: id.to_string(),
                }),
            }
        })
        .await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        offset: i64,
        limit: i64,
    ) -> Result<Page<R>, StoreError> {
        let window = PageRequest::new(offset, limit)?;
        let index = self.index_key();
        let mut conn = self.conn.clone();

        within_deadline(ctx, "redis list", async {
            let total: usize = conn.zcard(&index).await.map_err(StoreError::internal)?;
            if window.offset >= total {
                return Ok(Page::end());
            }

            let start = isize::try_from(window.offset).map_err(StoreError::internal)?;
            let stop = isize::try_from(window.end().min(total) - 1).map_err(StoreError::internal)?;
            let ids: Vec<String> = conn
                .zrange(&index, start, stop)
                .await
                .map_err(StoreError::internal)?;
            if ids.is_empty() {
                return Ok(Page::end());
            }

            let keys: Vec<String> = ids.iter().map(|id| self.record_key(id)).collect();
            // Explicit MGET: the typed helper sends GET for a single key,
            // which replies with a bare value instead of an array.
            let blobs: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::internal)?;

            let items = Self::decode_blobs(&blobs)?;

            Ok(Page {
                items,
                next_offset: next_offset(window.offset, ids.len(), total),
            })
        })
        .await
    }
}

#[async_trait]
impl<R: Record> UpsertStore<R> for RedisStore<R> {
    async fn upsert(&self, ctx: &RequestContext, record: &R) -> Result<(), StoreError> {
        validate_key::<R>(record.id())?;
        let blob = Self::encode(record)?;
        let key = self.record_key(record.id());
        let index = self.index_key();
        let mut conn = self.conn.clone();

        within_deadline(ctx, "redis upsert", async {
            let written: redis::RedisResult<()> = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(&key)
                .arg(&blob)
                .ignore()
                .cmd("ZADD")
                .arg(&index)
                .arg(0)
                .arg(record.id())
                .ignore()
                .query_async(&mut conn)
                .await;
            written.map_err(StoreError::internal)
        })
        .await
    }
}
