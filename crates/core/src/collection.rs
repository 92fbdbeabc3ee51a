//! The collection facade: document CRUD against one collection.

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use astra_protocol::command::Command;
use astra_protocol::paths::unescape_field_path;
use astra_protocol::response::{ErrorDescriptor, RawDataApiResponse};
use astra_runtime::events::{EventTarget, LoggingConfig};
use astra_runtime::timeouts::{Timeout, TimeoutCategory, TimeoutDefaults, TimeoutMode};

use crate::cursor::{FindAndRerankCursor, FindCursor};
use crate::cursor::find::FindCursorOptions;
use crate::cursor::rerank::RerankCursorOptions;
use crate::datatypes::SomeId;
use crate::db::Db;
use crate::errors::{
    BulkWriteError, BulkWriteErrorDescriptor, Error, InsertManyError, Result,
    TooManyDocumentsError,
};
use crate::exec::EntityRef;
use crate::options::CollectionOptions;
use crate::results::{
    BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult,
};
use crate::serdes::{SerDes, SerdesTarget};

/// Documents per `insertMany` request.
const INSERT_MANY_CHUNK: usize = 20;

/// Concurrent requests for unordered bulk operations.
const DEFAULT_BULK_CONCURRENCY: usize = 8;

/// The server refuses to count past this many documents.
const SERVER_COUNT_LIMIT: u64 = 1000;

/// A typed handle to one collection of schemaless documents.
///
/// Stateless: spawning is free and involves no server round trip. The type
/// parameter is the document schema; `serde_json::Value` gives a schemaless
/// view.
pub struct Collection<T = Value> {
    db: Db,
    entity: EntityRef,
    _schema: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            entity: self.entity.clone(),
            _schema: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Collection<T> {
    pub(crate) fn spawn(db: Db, name: &str, overrides: CollectionOptions) -> Result<Self> {
        overrides.validate()?;

        let base = CollectionOptions {
            keyspace: Some(db.keyspace()),
            embedding_api_key: db.inner().options.embedding_api_key.clone(),
            reranking_api_key: db.inner().options.reranking_api_key.clone(),
            logging: LoggingConfig::empty(),
            timeout_defaults: TimeoutDefaults::empty(),
            serdes: db.inner().options.serdes.clone(),
        };
        let merged = base.concat(overrides);

        let keyspace = merged
            .keyspace
            .clone()
            .unwrap_or_else(|| db.keyspace());
        let serdes = SerDes::collection(&merged.serdes);
        let logging = db.inner().logging.clone().concat(merged.logging.clone());
        let events = db.inner().events.child(logging.resolve()?);
        let timeouts = db.inner().timeouts.apply(&merged.timeout_defaults);

        let http = Arc::new(db.inner().http.with_header_providers(
            merged.embedding_api_key.clone(),
            merged.reranking_api_key.clone(),
        ));

        Ok(Self {
            db,
            entity: EntityRef {
                http,
                serdes,
                keyspace,
                name: name.to_string(),
                target: EventTarget::Collection,
                events,
                timeouts,
            },
            _schema: PhantomData,
        })
    }
}

impl<T> Collection<T> {
    /// The collection name.
    pub fn name(&self) -> &str {
        &self.entity.name
    }

    /// The keyspace this collection lives in.
    pub fn keyspace(&self) -> &str {
        &self.entity.keyspace
    }

    /// The owning database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    fn ser(&self, value: Value, target: SerdesTarget) -> Result<Value> {
        Ok(self.entity.serdes.serialize(value, target)?)
    }

    fn parse_inserted_ids(&self, raw: &RawDataApiResponse) -> Result<Vec<SomeId>> {
        let values: Vec<Value> = raw
            .status_field("insertedIds")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        values
            .into_iter()
            .map(|value| {
                let value = self
                    .entity
                    .serdes
                    .deserialize(value, SerdesTarget::InsertedId, None)?;
                serde_json::from_value(value).map_err(Error::from)
            })
            .collect()
    }

    fn parse_update_result(&self, raw: &RawDataApiResponse) -> Result<UpdateResult> {
        let matched = raw
            .status_field("matchedCount")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let modified = raw
            .status_field("modifiedCount")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let upserted_id = raw
            .status_field("upsertedId")
            .cloned()
            .map(|value| serde_json::from_value::<SomeId>(value))
            .transpose()?;
        Ok(UpdateResult {
            matched_count: matched,
            modified_count: modified,
            upserted_id,
        })
    }

    fn decode_document(&self, document: Value, raw: &RawDataApiResponse) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let schema = raw.projection_schema();
        let value =
            self.entity
                .serdes
                .deserialize(document, SerdesTarget::Record, schema.as_ref())?;
        serde_json::from_value(value).map_err(Error::from)
    }
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    /// Inserts one document. An explicit `_id` (including `null`) is
    /// persisted as-is; otherwise the server generates one per the
    /// collection's `defaultId` configuration.
    pub async fn insert_one(
        &self,
        document: &T,
        timeout: Option<Timeout>,
    ) -> Result<InsertOneResult> {
        let wire = self.ser(serde_json::to_value(document)?, SerdesTarget::Record)?;
        let command = Command::new("insertOne").arg("document", wire);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        let inserted_id = self
            .parse_inserted_ids(&raw)?
            .into_iter()
            .next()
            .unwrap_or(SomeId::Null);
        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts many documents, in chunks of 20 per request.
    ///
    /// Ordered mode is strictly sequential, aborts on the first failure,
    /// and reports the successfully inserted prefix through
    /// [`InsertManyError`]. Unordered mode fans out up to the configured
    /// concurrency; partial successes are likewise reported.
    pub async fn insert_many(
        &self,
        documents: &[T],
        options: InsertManyOptions,
    ) -> Result<InsertManyResult> {
        let chunk_size = options.chunk_size.unwrap_or(INSERT_MANY_CHUNK).max(1);

        let mut serialized = Vec::with_capacity(documents.len());
        for document in documents {
            serialized.push(self.ser(serde_json::to_value(document)?, SerdesTarget::Record)?);
        }

        if options.ordered {
            self.insert_many_ordered(serialized, chunk_size, options.timeout)
                .await
        } else {
            let concurrency = options.concurrency.unwrap_or(DEFAULT_BULK_CONCURRENCY).max(1);
            self.insert_many_unordered(serialized, chunk_size, concurrency, options.timeout)
                .await
        }
    }

    async fn insert_many_ordered(
        &self,
        documents: Vec<Value>,
        chunk_size: usize,
        timeout: Option<Timeout>,
    ) -> Result<InsertManyResult> {
        let mut tm = self.entity.manager(
            TimeoutMode::Multipart,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        let mut inserted_ids: Vec<SomeId> = Vec::new();

        for chunk in documents.chunks(chunk_size) {
            let command = insert_many_command(chunk, true);
            match self.entity.run(&command, false, &mut tm).await {
                Ok(raw) => inserted_ids.extend(self.parse_inserted_ids(&raw)?),
                Err(Error::DataApiResponse(response_error)) => {
                    // The server reports the ids it did insert before the
                    // failing document.
                    inserted_ids.extend(self.parse_inserted_ids(&response_error.raw)?);
                    let inserted_count = inserted_ids.len();
                    return Err(InsertManyError {
                        partial_result: InsertManyResult {
                            inserted_ids,
                            inserted_count,
                        },
                        descriptors: response_error.errors,
                    }
                    .into());
                }
                Err(other) => return Err(other),
            }
        }

        let inserted_count = inserted_ids.len();
        Ok(InsertManyResult {
            inserted_ids,
            inserted_count,
        })
    }

    async fn insert_many_unordered(
        &self,
        documents: Vec<Value>,
        chunk_size: usize,
        concurrency: usize,
        timeout: Option<Timeout>,
    ) -> Result<InsertManyResult> {
        let chunks: Vec<Vec<Value>> = documents
            .chunks(chunk_size)
            .map(<[Value]>::to_vec)
            .collect();

        let outcomes: Vec<(usize, Result<RawDataApiResponse>)> =
            futures_util::stream::iter(chunks.into_iter().enumerate().map(|(index, chunk)| {
                let entity = self.entity.clone();
                async move {
                    let command = insert_many_command(&chunk, false);
                    let mut tm = entity.manager(
                        TimeoutMode::Multipart,
                        TimeoutCategory::GeneralMethod,
                        timeout,
                    );
                    (index, entity.run(&command, false, &mut tm).await)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut by_index: Vec<(usize, Result<RawDataApiResponse>)> = outcomes;
        by_index.sort_by_key(|(index, _)| *index);

        let mut inserted_ids: Vec<SomeId> = Vec::new();
        let mut descriptors: Vec<ErrorDescriptor> = Vec::new();
        let mut hard_error: Option<Error> = None;

        for (_, outcome) in by_index {
            match outcome {
                Ok(raw) => inserted_ids.extend(self.parse_inserted_ids(&raw)?),
                Err(Error::DataApiResponse(response_error)) => {
                    inserted_ids.extend(self.parse_inserted_ids(&response_error.raw)?);
                    descriptors.extend(response_error.errors);
                }
                Err(other) => hard_error = Some(other),
            }
        }

        if let Some(error) = hard_error {
            return Err(error);
        }
        let inserted_count = inserted_ids.len();
        if descriptors.is_empty() {
            Ok(InsertManyResult {
                inserted_ids,
                inserted_count,
            })
        } else {
            Err(InsertManyError {
                partial_result: InsertManyResult {
                    inserted_ids,
                    inserted_count,
                },
                descriptors,
            }
            .into())
        }
    }

    /// Replaces the first document matching the filter.
    pub async fn replace_one(
        &self,
        filter: Value,
        replacement: &T,
        options: ReplaceOptions,
    ) -> Result<UpdateResult> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let replacement = self.ser(serde_json::to_value(replacement)?, SerdesTarget::Record)?;

        let mut command = Command::new("findOneAndReplace")
            .arg("filter", filter)
            .arg("replacement", replacement);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }
        let mut call_options = Map::new();
        if let Some(upsert) = options.upsert {
            call_options.insert("upsert".into(), upsert.into());
        }
        if !call_options.is_empty() {
            command = command.arg("options", Value::Object(call_options));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        self.parse_update_result(&raw)
    }
}

impl<T: DeserializeOwned> Collection<T> {
    /// Finds the first document matching the filter.
    pub async fn find_one(&self, filter: Value, options: Option<FindOneOptions>) -> Result<Option<T>> {
        let options = options.unwrap_or_default();
        let filter = self.ser(filter, SerdesTarget::Filter)?;

        let mut command = Command::new("findOne").arg("filter", filter);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }
        if let Some(projection) = options.projection {
            command = command.arg("projection", self.ser(projection, SerdesTarget::Projection)?);
        }
        if let Some(include) = options.include_similarity {
            command = command.arg("options", serde_json::json!({ "includeSimilarity": include }));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, true, &mut tm).await?;

        match raw.data.as_ref().and_then(|d| d.document.clone()) {
            Some(document) if !document.is_null() => {
                Ok(Some(self.decode_document(document, &raw)?))
            }
            _ => Ok(None),
        }
    }

    /// Builds a lazy cursor over all documents matching the filter. No
    /// request happens until the cursor is first consumed.
    pub fn find(&self, filter: Value, options: FindOptions) -> Result<FindCursor<T>> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let cursor_options = FindCursorOptions {
            sort: options
                .sort
                .map(|s| self.ser(s, SerdesTarget::Sort))
                .transpose()?,
            projection: options
                .projection
                .map(|p| self.ser(p, SerdesTarget::Projection))
                .transpose()?,
            limit: options.limit,
            skip: options.skip,
            include_similarity: options.include_similarity,
            include_sort_vector: options.include_sort_vector,
            timeout: options.timeout,
        };
        Ok(FindCursor::new(self.entity.clone(), filter, cursor_options))
    }

    /// Builds a lazy cursor over a hybrid find-and-rerank result set.
    pub fn find_and_rerank(
        &self,
        filter: Value,
        options: FindAndRerankOptions,
    ) -> Result<FindAndRerankCursor<T>> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let cursor_options = RerankCursorOptions {
            sort: options
                .sort
                .map(|s| self.ser(s, SerdesTarget::Sort))
                .transpose()?,
            projection: options
                .projection
                .map(|p| self.ser(p, SerdesTarget::Projection))
                .transpose()?,
            limit: options.limit,
            hybrid_limits: options.hybrid_limits,
            rerank_on: options.rerank_on,
            rerank_query: options.rerank_query,
            include_scores: options.include_scores,
            timeout: options.timeout,
        };
        Ok(FindAndRerankCursor::new(
            self.entity.clone(),
            filter,
            cursor_options,
        ))
    }

    /// Updates the first document matching the filter.
    pub async fn update_one(
        &self,
        filter: Value,
        update: Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let update = self.ser(update, SerdesTarget::Record)?;

        let mut command = Command::new("updateOne")
            .arg("filter", filter)
            .arg("update", update);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }
        if let Some(upsert) = options.upsert {
            command = command.arg("options", serde_json::json!({ "upsert": upsert }));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        self.parse_update_result(&raw)
    }

    /// Updates every document matching the filter, following server-side
    /// pagination until completion.
    pub async fn update_many(
        &self,
        filter: Value,
        update: Value,
        options: UpdateManyOptions,
    ) -> Result<UpdateResult> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let update = self.ser(update, SerdesTarget::Record)?;

        let mut tm = self.entity.manager(
            TimeoutMode::Multipart,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let mut result = UpdateResult::default();
        let mut page_state: Option<String> = None;

        loop {
            let mut call_options = Map::new();
            if let Some(upsert) = options.upsert {
                call_options.insert("upsert".into(), upsert.into());
            }
            if let Some(state) = &page_state {
                call_options.insert("pageState".into(), state.clone().into());
            }

            let mut command = Command::new("updateMany")
                .arg("filter", filter.clone())
                .arg("update", update.clone());
            if !call_options.is_empty() {
                command = command.arg("options", Value::Object(call_options));
            }

            let raw = self.entity.run(&command, false, &mut tm).await?;
            let page = self.parse_update_result(&raw)?;
            result.matched_count += page.matched_count;
            result.modified_count += page.modified_count;
            if page.upserted_id.is_some() {
                result.upserted_id = page.upserted_id;
            }

            match raw.status_field("nextPageState").and_then(Value::as_str) {
                Some(state) => page_state = Some(state.to_string()),
                None => return Ok(result),
            }
        }
    }

    /// Atomically updates and returns one document.
    pub async fn find_one_and_update(
        &self,
        filter: Value,
        update: Value,
        options: FindOneAndUpdateOptions,
    ) -> Result<Option<T>> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let update = self.ser(update, SerdesTarget::Record)?;

        let mut command = Command::new("findOneAndUpdate")
            .arg("filter", filter)
            .arg("update", update);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }
        if let Some(projection) = options.projection {
            command = command.arg("projection", self.ser(projection, SerdesTarget::Projection)?);
        }
        let mut call_options = Map::new();
        if let Some(return_document) = options.return_document {
            call_options.insert("returnDocument".into(), return_document.as_str().into());
        }
        if let Some(upsert) = options.upsert {
            call_options.insert("upsert".into(), upsert.into());
        }
        if !call_options.is_empty() {
            command = command.arg("options", Value::Object(call_options));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        match raw.data.as_ref().and_then(|d| d.document.clone()) {
            Some(document) if !document.is_null() => {
                Ok(Some(self.decode_document(document, &raw)?))
            }
            _ => Ok(None),
        }
    }

    /// Atomically replaces and returns one document.
    pub async fn find_one_and_replace(
        &self,
        filter: Value,
        replacement: Value,
        options: FindOneAndUpdateOptions,
    ) -> Result<Option<T>> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let replacement = self.ser(replacement, SerdesTarget::Record)?;

        let mut command = Command::new("findOneAndReplace")
            .arg("filter", filter)
            .arg("replacement", replacement);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }
        if let Some(projection) = options.projection {
            command = command.arg("projection", self.ser(projection, SerdesTarget::Projection)?);
        }
        let mut call_options = Map::new();
        if let Some(return_document) = options.return_document {
            call_options.insert("returnDocument".into(), return_document.as_str().into());
        }
        if let Some(upsert) = options.upsert {
            call_options.insert("upsert".into(), upsert.into());
        }
        if !call_options.is_empty() {
            command = command.arg("options", Value::Object(call_options));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        match raw.data.as_ref().and_then(|d| d.document.clone()) {
            Some(document) if !document.is_null() => {
                Ok(Some(self.decode_document(document, &raw)?))
            }
            _ => Ok(None),
        }
    }

    /// Atomically deletes and returns one document.
    pub async fn find_one_and_delete(
        &self,
        filter: Value,
        options: FindOneAndDeleteOptions,
    ) -> Result<Option<T>> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;

        let mut command = Command::new("findOneAndDelete").arg("filter", filter);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }
        if let Some(projection) = options.projection {
            command = command.arg("projection", self.ser(projection, SerdesTarget::Projection)?);
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        match raw.data.as_ref().and_then(|d| d.document.clone()) {
            Some(document) if !document.is_null() => {
                Ok(Some(self.decode_document(document, &raw)?))
            }
            _ => Ok(None),
        }
    }

    /// Deletes the first document matching the filter.
    pub async fn delete_one(&self, filter: Value, options: DeleteOptions) -> Result<DeleteResult> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;

        let mut command = Command::new("deleteOne").arg("filter", filter);
        if let Some(sort) = options.sort {
            command = command.arg("sort", self.ser(sort, SerdesTarget::Sort)?);
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            options.timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        Ok(DeleteResult {
            deleted_count: raw
                .status_field("deletedCount")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        })
    }

    /// Deletes every document matching the filter, following server-side
    /// continuation until completion.
    pub async fn delete_many(
        &self,
        filter: Value,
        timeout: Option<Timeout>,
    ) -> Result<DeleteResult> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let mut tm = self.entity.manager(
            TimeoutMode::Multipart,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        let mut deleted = 0u64;

        loop {
            let command = Command::new("deleteMany").arg("filter", filter.clone());
            let raw = self.entity.run(&command, false, &mut tm).await?;
            deleted += raw
                .status_field("deletedCount")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            if raw.status_field("moreData").and_then(Value::as_bool) != Some(true) {
                return Ok(DeleteResult {
                    deleted_count: deleted,
                });
            }
        }
    }

    /// Counts documents matching the filter, failing past `upper_bound`
    /// (or the server's own counting limit).
    pub async fn count_documents(
        &self,
        filter: Value,
        upper_bound: u64,
        timeout: Option<Timeout>,
    ) -> Result<u64> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let command = Command::new("countDocuments").arg("filter", filter);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        let raw = self.entity.run(&command, true, &mut tm).await?;

        if raw.status_field("moreData").and_then(Value::as_bool) == Some(true) {
            return Err(TooManyDocumentsError {
                limit: SERVER_COUNT_LIMIT,
                server_limited: true,
            }
            .into());
        }
        let count = raw
            .status_field("count")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        if count > upper_bound {
            return Err(TooManyDocumentsError {
                limit: upper_bound,
                server_limited: false,
            }
            .into());
        }
        Ok(count)
    }

    /// A fast estimate of the collection's total size, ignoring filters.
    pub async fn estimated_document_count(&self, timeout: Option<Timeout>) -> Result<u64> {
        let command = Command::new("estimatedDocumentCount");
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        let raw = self.entity.run(&command, true, &mut tm).await?;
        Ok(raw
            .status_field("count")
            .and_then(Value::as_u64)
            .unwrap_or_default())
    }

    /// The distinct values at an (escaped) field path across all documents
    /// matching the filter. Array elements are flattened one level, as the
    /// path implicitly maps over arrays.
    pub async fn distinct(
        &self,
        key: &str,
        filter: Value,
        timeout: Option<Timeout>,
    ) -> Result<Vec<Value>> {
        let segments = unescape_field_path(key)?;
        if segments.is_empty() {
            return Err(crate::errors::InvalidArgumentsError::new(
                "distinct key must not be empty",
            )
            .into());
        }

        let mut projection = Map::new();
        projection.insert(segments[0].clone(), Value::from(1));

        let mut cursor: FindCursor<Value> = self.clone_erased().find(
            filter,
            FindOptions {
                projection: Some(Value::Object(projection)),
                timeout,
                ..FindOptions::default()
            },
        )?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        while let Some(document) = cursor.next().await? {
            let mut extracted = Vec::new();
            dig_path(&document, &segments, &mut extracted);
            for value in extracted {
                let fingerprint = fingerprint(&value);
                if seen.insert(fingerprint) {
                    out.push(value);
                }
            }
        }
        Ok(out)
    }

    /// Executes a heterogeneous batch of write operations.
    ///
    /// Ordered mode applies operations sequentially and aborts on the
    /// first failure; unordered mode fans out up to the configured
    /// concurrency. Partial successes are reported through
    /// [`BulkWriteError`].
    pub async fn bulk_write(
        &self,
        operations: Vec<BulkWriteOp>,
        options: BulkWriteOptions,
    ) -> Result<BulkWriteResult> {
        if options.ordered {
            let mut tm = self.entity.manager(
                TimeoutMode::Multipart,
                TimeoutCategory::GeneralMethod,
                options.timeout,
            );
            let mut result = BulkWriteResult::default();
            for (index, op) in operations.into_iter().enumerate() {
                match self.apply_bulk_op(&op, &mut tm).await {
                    Ok(raw) => self.absorb_bulk_op(&op, &raw, &mut result)?,
                    Err(Error::DataApiResponse(response_error)) => {
                        return Err(BulkWriteError {
                            partial_result: result,
                            detailed_error_descriptors: vec![BulkWriteErrorDescriptor {
                                index,
                                descriptors: response_error.errors,
                            }],
                        }
                        .into());
                    }
                    Err(other) => return Err(other),
                }
            }
            Ok(result)
        } else {
            let concurrency = options.concurrency.unwrap_or(DEFAULT_BULK_CONCURRENCY).max(1);
            let outcomes: Vec<(usize, BulkWriteOp, Result<RawDataApiResponse>)> =
                futures_util::stream::iter(operations.into_iter().enumerate().map(
                    |(index, op)| {
                        let this = self.clone_erased();
                        let timeout = options.timeout;
                        async move {
                            let mut tm = this.entity.manager(
                                TimeoutMode::Multipart,
                                TimeoutCategory::GeneralMethod,
                                timeout,
                            );
                            let outcome = this.apply_bulk_op(&op, &mut tm).await;
                            (index, op, outcome)
                        }
                    },
                ))
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut result = BulkWriteResult::default();
            let mut failures: Vec<BulkWriteErrorDescriptor> = Vec::new();
            let mut hard_error: Option<Error> = None;

            let mut ordered_outcomes = outcomes;
            ordered_outcomes.sort_by_key(|(index, _, _)| *index);
            for (index, op, outcome) in ordered_outcomes {
                match outcome {
                    Ok(raw) => self.absorb_bulk_op(&op, &raw, &mut result)?,
                    Err(Error::DataApiResponse(response_error)) => {
                        failures.push(BulkWriteErrorDescriptor {
                            index,
                            descriptors: response_error.errors,
                        });
                    }
                    Err(other) => hard_error = Some(other),
                }
            }

            if let Some(error) = hard_error {
                return Err(error);
            }
            if failures.is_empty() {
                Ok(result)
            } else {
                Err(BulkWriteError {
                    partial_result: result,
                    detailed_error_descriptors: failures,
                }
                .into())
            }
        }
    }

    fn clone_erased(&self) -> Collection<Value> {
        Collection {
            db: self.db.clone(),
            entity: self.entity.clone(),
            _schema: PhantomData,
        }
    }

    async fn apply_bulk_op(
        &self,
        op: &BulkWriteOp,
        tm: &mut astra_runtime::timeouts::TimeoutManager,
    ) -> Result<RawDataApiResponse> {
        let command = self.bulk_op_command(op)?;
        self.entity.run(&command, false, tm).await
    }

    fn absorb_bulk_op(
        &self,
        op: &BulkWriteOp,
        raw: &RawDataApiResponse,
        result: &mut BulkWriteResult,
    ) -> Result<()> {
        match op {
            BulkWriteOp::InsertOne { .. } => {
                result.absorb_insert(self.parse_inserted_ids(raw)?.len());
            }
            BulkWriteOp::UpdateOne { .. }
            | BulkWriteOp::UpdateMany { .. }
            | BulkWriteOp::ReplaceOne { .. } => {
                result.absorb_update(&self.parse_update_result(raw)?);
            }
            BulkWriteOp::DeleteOne { .. } | BulkWriteOp::DeleteMany { .. } => {
                result.absorb_delete(&DeleteResult {
                    deleted_count: raw
                        .status_field("deletedCount")
                        .and_then(Value::as_u64)
                        .unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    fn bulk_op_command(&self, op: &BulkWriteOp) -> Result<Command> {
        Ok(match op {
            BulkWriteOp::InsertOne { document } => Command::new("insertOne")
                .arg("document", self.ser(document.clone(), SerdesTarget::Record)?),
            BulkWriteOp::UpdateOne { filter, update, upsert } => Command::new("updateOne")
                .arg("filter", self.ser(filter.clone(), SerdesTarget::Filter)?)
                .arg("update", self.ser(update.clone(), SerdesTarget::Record)?)
                .arg("options", serde_json::json!({ "upsert": upsert })),
            BulkWriteOp::UpdateMany { filter, update, upsert } => Command::new("updateMany")
                .arg("filter", self.ser(filter.clone(), SerdesTarget::Filter)?)
                .arg("update", self.ser(update.clone(), SerdesTarget::Record)?)
                .arg("options", serde_json::json!({ "upsert": upsert })),
            BulkWriteOp::ReplaceOne { filter, replacement, upsert } => {
                Command::new("findOneAndReplace")
                    .arg("filter", self.ser(filter.clone(), SerdesTarget::Filter)?)
                    .arg(
                        "replacement",
                        self.ser(replacement.clone(), SerdesTarget::Record)?,
                    )
                    .arg("options", serde_json::json!({ "upsert": upsert }))
            }
            BulkWriteOp::DeleteOne { filter } => Command::new("deleteOne")
                .arg("filter", self.ser(filter.clone(), SerdesTarget::Filter)?),
            BulkWriteOp::DeleteMany { filter } => Command::new("deleteMany")
                .arg("filter", self.ser(filter.clone(), SerdesTarget::Filter)?),
        })
    }
}

fn insert_many_command(chunk: &[Value], ordered: bool) -> Command {
    Command::new("insertMany")
        .arg("documents", Value::Array(chunk.to_vec()))
        .arg(
            "options",
            serde_json::json!({ "ordered": ordered, "returnDocumentResponses": false }),
        )
}

/// Digs the values at `segments` out of a document, implicitly mapping
/// over arrays for non-numeric segments and flattening terminal arrays.
fn dig_path(value: &Value, segments: &[String], out: &mut Vec<Value>) {
    match segments.split_first() {
        None => match value {
            Value::Null => {}
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        },
        Some((segment, rest)) => match value {
            Value::Object(map) => {
                if let Some(inner) = map.get(segment) {
                    dig_path(inner, rest, out);
                }
            }
            Value::Array(items) => {
                if let Ok(index) = segment.parse::<usize>() {
                    if let Some(inner) = items.get(index) {
                        dig_path(inner, rest, out);
                    }
                } else {
                    for item in items {
                        dig_path(item, segments, out);
                    }
                }
            }
            _ => {}
        },
    }
}

/// A stable dedup key: the type tag plus the canonical JSON rendering.
fn fingerprint(value: &Value) -> String {
    let tag = match value {
        Value::Null => 'n',
        Value::Bool(_) => 'b',
        Value::Number(_) => 'd',
        Value::String(_) => 's',
        Value::Array(_) => 'a',
        Value::Object(_) => 'o',
    };
    format!("{tag}{value}")
}

/// Which version of the document `find_one_and_*` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    After,
}

impl ReturnDocument {
    /// The wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnDocument::Before => "before",
            ReturnDocument::After => "after",
        }
    }
}

/// Options for [`Collection::find_one`].
#[derive(Debug, Clone, Default)]
pub struct FindOneOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub include_similarity: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub include_similarity: Option<bool>,
    pub include_sort_vector: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::find_and_rerank`].
#[derive(Debug, Clone, Default)]
pub struct FindAndRerankOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub limit: Option<u64>,
    pub hybrid_limits: Option<Value>,
    pub rerank_on: Option<String>,
    pub rerank_query: Option<String>,
    pub include_scores: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::insert_many`].
#[derive(Debug, Clone, Default)]
pub struct InsertManyOptions {
    /// Sequential, abort-on-first-failure semantics.
    pub ordered: bool,
    /// Concurrent requests in unordered mode (default 8).
    pub concurrency: Option<usize>,
    /// Documents per request (default 20).
    pub chunk_size: Option<usize>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::update_one`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
    pub sort: Option<Value>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::update_many`].
#[derive(Debug, Clone, Default)]
pub struct UpdateManyOptions {
    pub upsert: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::replace_one`].
#[derive(Debug, Clone, Default)]
pub struct ReplaceOptions {
    pub upsert: Option<bool>,
    pub sort: Option<Value>,
    pub timeout: Option<Timeout>,
}

/// Options for `find_one_and_update` / `find_one_and_replace`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndUpdateOptions {
    pub return_document: Option<ReturnDocument>,
    pub upsert: Option<bool>,
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::find_one_and_delete`].
#[derive(Debug, Clone, Default)]
pub struct FindOneAndDeleteOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Collection::delete_one`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub sort: Option<Value>,
    pub timeout: Option<Timeout>,
}

/// One operation in a [`Collection::bulk_write`] batch.
#[derive(Debug, Clone)]
pub enum BulkWriteOp {
    InsertOne { document: Value },
    UpdateOne { filter: Value, update: Value, upsert: bool },
    UpdateMany { filter: Value, update: Value, upsert: bool },
    ReplaceOne { filter: Value, replacement: Value, upsert: bool },
    DeleteOne { filter: Value },
    DeleteMany { filter: Value },
}

/// Options for [`Collection::bulk_write`].
#[derive(Debug, Clone, Default)]
pub struct BulkWriteOptions {
    /// Sequential, abort-on-first-failure semantics.
    pub ordered: bool,
    /// Concurrent requests in unordered mode (default 8).
    pub concurrency: Option<usize>,
    pub timeout: Option<Timeout>,
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("keyspace", &self.entity.keyspace)
            .field("name", &self.entity.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dig_path_maps_over_arrays() {
        let doc = json!({ "cars": [{ "make": "vw" }, { "make": "audi" }] });
        let mut out = Vec::new();
        dig_path(&doc, &["cars".into(), "make".into()], &mut out);
        assert_eq!(out, vec![json!("vw"), json!("audi")]);
    }

    #[test]
    fn dig_path_supports_numeric_indices() {
        let doc = json!({ "cars": [{ "make": "vw" }, { "make": "audi" }] });
        let mut out = Vec::new();
        dig_path(&doc, &["cars".into(), "1".into(), "make".into()], &mut out);
        assert_eq!(out, vec![json!("audi")]);
    }

    #[test]
    fn dig_path_flattens_terminal_arrays() {
        let doc = json!({ "tags": ["a", "b"] });
        let mut out = Vec::new();
        dig_path(&doc, &["tags".into()], &mut out);
        assert_eq!(out, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn fingerprints_distinguish_types() {
        assert_ne!(fingerprint(&json!("1")), fingerprint(&json!(1)));
        assert_eq!(fingerprint(&json!(1)), fingerprint(&json!(1)));
    }
}
