//! Document-store backend: one collection per entity type.
//!
//! Each record is stored as `{ _id: <entity key>, ...record fields }`.
//! Duplicate-key rejection from the primary index provides exclusive
//! creation; listing is a `_id`-sorted skip/limit query plus a count.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};

use lastmile_core::{
    next_offset, validate_key, Page, PageRequest, Record, RecordStore, RequestContext, StoreError,
    UpsertStore,
};

use crate::readiness::{MongoResource, ReadyResource};
use crate::storage::{within_deadline, Backend};

const DUPLICATE_KEY: i32 = 11000;

/// Backend sharing one pooled client across all stores.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
    database: Database,
}

impl MongoBackend {
    #[must_use]
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }
}

impl Backend for MongoBackend {
    type Store<R: Record> = MongoStore<R>;

    fn name(&self) -> &'static str {
        "mongo"
    }

    fn store<R: Record>(&self) -> MongoStore<R> {
        MongoStore::new(&self.database)
    }

    fn ready_resources(&self) -> Vec<Arc<dyn ReadyResource>> {
        vec![Arc::new(MongoResource::new(self.client.clone()))]
    }
}

/// Persisted shape of a record.
#[derive(Debug, Serialize, Deserialize)]
struct MongoDocument<R> {
    #[serde(rename = "_id")]
    id: String,
    #[serde(flatten)]
    record: R,
}

impl<R: Record> MongoDocument<R> {
    fn from_record(record: &R) -> Self {
        Self {
            id: record.id().to_string(),
            record: record.clone(),
        }
    }
}

/// Store over the `R::COLLECTION` collection.
pub struct MongoStore<R: Send + Sync> {
    collection: Collection<MongoDocument<R>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> MongoStore<R> {
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(R::COLLECTION),
            _record: PhantomData,
        }
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    is_duplicate_key_kind(&err.kind)
}

fn is_duplicate_key_kind(kind: &ErrorKind) -> bool {
    match kind {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MongoStore<R> {
    async fn create(&self, ctx: &RequestContext, record: &R) -> Result<(), StoreError> {
        record.validate()?;
        let document = MongoDocument::from_record(record);
        within_deadline(ctx, "mongo insert", async {
            match self.collection.insert_one(document).await {
                Ok(_) => Ok(()),
                Err(err) if is_duplicate_key(&err) => Err(StoreError::AlreadyExists {
                    entity: R::ENTITY,
                    id: record.id().to_string(),
                }),
                Err(err) => Err(StoreError::internal(err)),
            }
        })
        .await
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<R, StoreError> {
        validate_key::<R>(id)?;
        within_deadline(ctx, "mongo find_one", async {
            self.collection
                .find_one(doc! { "_id": id })
                .await
                .map_err(StoreError::internal)?
                .map(|document| document.record)
                .ok_or_else(|| StoreError::NotFound {
                    entity: R::ENTITY,
                    id: id.to_string(),
                })
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
        within_deadline(ctx, "mongo list", async {
            let total = self
                .collection
                .count_documents(doc! {})
                .await
                .map_err(StoreError::internal)?;
            let total = usize::try_from(total).map_err(StoreError::internal)?;
            if window.offset >= total {
                return Ok(Page::end());
            }

            let documents: Vec<MongoDocument<R>> = self
                .collection
                .find(doc! {})
                .sort(doc! { "_id": 1 })
                .skip(u64::try_from(window.offset).map_err(StoreError::internal)?)
                .limit(i64::try_from(window.limit).map_err(StoreError::internal)?)
                .await
                .map_err(StoreError::internal)?
                .try_collect()
                .await
                .map_err(StoreError::internal)?;

            let returned = documents.len();
            Ok(Page {
                items: documents.into_iter().map(|document| document.record).collect(),
                next_offset: next_offset(window.offset, returned, total),
            })
        })
        .await
    }
}

#[async_trait]
impl<R: Record> UpsertStore<R> for MongoStore<R> {
    async fn upsert(&self, ctx: &RequestContext, record: &R) -> Result<(), StoreError> {
        validate_key::<R>(record.id())?;
        let document = MongoDocument::from_record(record);
        within_deadline(ctx, "mongo replace", async {
            self.collection
                .replace_one(doc! { "_id": record.id() }, document)
                .upsert(true)
                .await
                .map(|_| ())
                .map_err(StoreError::internal)
        })
        .await
    }
}
