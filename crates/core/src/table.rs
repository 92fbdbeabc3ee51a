//! The table facade: typed row CRUD against one table.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use astra_protocol::command::Command;
use astra_protocol::response::RawDataApiResponse;
use astra_runtime::events::{EventTarget, LoggingConfig};
use astra_runtime::timeouts::{Timeout, TimeoutCategory, TimeoutDefaults, TimeoutMode};
use futures_util::StreamExt;

use crate::cursor::FindCursor;
use crate::cursor::find::FindCursorOptions;
use crate::db::Db;
use crate::errors::{Error, Result, TableInsertManyError};
use crate::exec::EntityRef;
use crate::options::TableOptions;
use crate::results::{IndexDescriptor, TableInsertManyResult, TableInsertOneResult};
use crate::serdes::{SerDes, SerdesTarget};

/// Rows per `insertMany` request.
const INSERT_MANY_CHUNK: usize = 20;

/// Concurrent requests for unordered inserts.
const DEFAULT_BULK_CONCURRENCY: usize = 8;

/// A typed handle to one schemaful table.
///
/// Stateless: spawning is free and involves no server round trip. Inbound
/// rows are normalized through the server-returned projection schema; the
/// type parameter is the row shape.
pub struct Table<T = Value> {
    db: Db,
    entity: EntityRef,
    _row: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            entity: self.entity.clone(),
            _row: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Table<T> {
    pub(crate) fn spawn(db: Db, name: &str, overrides: TableOptions) -> Result<Self> {
        overrides.validate()?;

        let base = TableOptions {
            keyspace: Some(db.keyspace()),
            embedding_api_key: db.inner().options.embedding_api_key.clone(),
            reranking_api_key: db.inner().options.reranking_api_key.clone(),
            logging: LoggingConfig::empty(),
            timeout_defaults: TimeoutDefaults::empty(),
            serdes: db.inner().options.serdes.clone(),
        };
        let merged = base.concat(overrides);

        let keyspace = merged.keyspace.clone().unwrap_or_else(|| db.keyspace());
        let serdes = SerDes::table(&merged.serdes);
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
                target: EventTarget::Table,
                events,
                timeouts,
            },
            _row: PhantomData,
        })
    }
}

impl<T> Table<T> {
    /// The table name.
    pub fn name(&self) -> &str {
        &self.entity.name
    }

    /// The keyspace this table lives in.
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

    /// Zips `status.primaryKeySchema` (ordered column names) with one
    /// inserted-id row (a value array) into a named primary key map.
    fn zip_primary_key(
        schema_columns: &[String],
        row: &Value,
    ) -> Result<Map<String, Value>> {
        let values = row.as_array().cloned().unwrap_or_else(|| vec![row.clone()]);
        Ok(schema_columns
            .iter()
            .cloned()
            .zip(values)
            .collect())
    }

    fn parse_inserted_primary_keys(raw: &RawDataApiResponse) -> Result<Vec<Map<String, Value>>> {
        let columns: Vec<String> = raw
            .status_field("primaryKeySchema")
            .and_then(Value::as_object)
            .map(|schema| schema.keys().cloned().collect())
            .unwrap_or_default();
        let rows: Vec<Value> = raw
            .status_field("insertedIds")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        rows.iter()
            .map(|row| Self::zip_primary_key(&columns, row))
            .collect()
    }
}

impl<T: Serialize + DeserializeOwned> Table<T> {
    /// Inserts one row, returning its full primary key.
    pub async fn insert_one(
        &self,
        row: &T,
        timeout: Option<Timeout>,
    ) -> Result<TableInsertOneResult> {
        let wire = self.ser(serde_json::to_value(row)?, SerdesTarget::Record)?;
        let command = Command::new("insertOne").arg("document", wire);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        let raw = self.entity.run(&command, false, &mut tm).await?;
        let inserted_id = Self::parse_inserted_primary_keys(&raw)?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(TableInsertOneResult { inserted_id })
    }

    /// Inserts many rows in chunks; ordered mode is sequential and aborts
    /// on the first failure, reporting the inserted prefix.
    pub async fn insert_many(
        &self,
        rows: &[T],
        options: TableInsertManyOptions,
    ) -> Result<TableInsertManyResult> {
        let chunk_size = options.chunk_size.unwrap_or(INSERT_MANY_CHUNK).max(1);

        let mut serialized = Vec::with_capacity(rows.len());
        for row in rows {
            serialized.push(self.ser(serde_json::to_value(row)?, SerdesTarget::Record)?);
        }

        if options.ordered {
            let mut tm = self.entity.manager(
                TimeoutMode::Multipart,
                TimeoutCategory::GeneralMethod,
                options.timeout,
            );
            let mut inserted_ids: Vec<Map<String, Value>> = Vec::new();

            for chunk in serialized.chunks(chunk_size) {
                let command = insert_many_command(chunk, true);
                match self.entity.run(&command, false, &mut tm).await {
                    Ok(raw) => inserted_ids.extend(Self::parse_inserted_primary_keys(&raw)?),
                    Err(Error::DataApiResponse(response_error)) => {
                        inserted_ids
                            .extend(Self::parse_inserted_primary_keys(&response_error.raw)?);
                        let inserted_count = inserted_ids.len();
                        return Err(TableInsertManyError {
                            partial_result: TableInsertManyResult {
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
            Ok(TableInsertManyResult {
                inserted_ids,
                inserted_count,
            })
        } else {
            let concurrency = options
                .concurrency
                .unwrap_or(DEFAULT_BULK_CONCURRENCY)
                .max(1);
            let chunks: Vec<Vec<Value>> = serialized
                .chunks(chunk_size)
                .map(<[Value]>::to_vec)
                .collect();

            let mut outcomes: Vec<(usize, Result<RawDataApiResponse>)> =
                futures_util::stream::iter(chunks.into_iter().enumerate().map(
                    |(index, chunk)| {
                        let entity = self.entity.clone();
                        let timeout = options.timeout;
                        async move {
                            let command = insert_many_command(&chunk, false);
                            let mut tm = entity.manager(
                                TimeoutMode::Multipart,
                                TimeoutCategory::GeneralMethod,
                                timeout,
                            );
                            (index, entity.run(&command, false, &mut tm).await)
                        }
                    },
                ))
                .buffer_unordered(concurrency)
                .collect()
                .await;
            outcomes.sort_by_key(|(index, _)| *index);

            let mut inserted_ids: Vec<Map<String, Value>> = Vec::new();
            let mut descriptors = Vec::new();
            let mut hard_error: Option<Error> = None;

            for (_, outcome) in outcomes {
                match outcome {
                    Ok(raw) => inserted_ids.extend(Self::parse_inserted_primary_keys(&raw)?),
                    Err(Error::DataApiResponse(response_error)) => {
                        inserted_ids
                            .extend(Self::parse_inserted_primary_keys(&response_error.raw)?);
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
                Ok(TableInsertManyResult {
                    inserted_ids,
                    inserted_count,
                })
            } else {
                Err(TableInsertManyError {
                    partial_result: TableInsertManyResult {
                        inserted_ids,
                        inserted_count,
                    },
                    descriptors,
                }
                .into())
            }
        }
    }
}

impl<T: DeserializeOwned> Table<T> {
    /// Finds the first row matching the filter.
    pub async fn find_one(
        &self,
        filter: Value,
        options: Option<TableFindOneOptions>,
    ) -> Result<Option<T>> {
        let options = options.unwrap_or_default();
        let filter = self.ser(filter, SerdesTarget::Filter)?;

        let mut command = Command::new("findOne").arg("filter", filter);
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
        let raw = self.entity.run(&command, true, &mut tm).await?;

        match raw.data.as_ref().and_then(|d| d.document.clone()) {
            Some(row) if !row.is_null() => {
                let schema = raw.projection_schema();
                let value =
                    self.entity
                        .serdes
                        .deserialize(row, SerdesTarget::Record, schema.as_ref())?;
                Ok(Some(serde_json::from_value(value)?))
            }
            _ => Ok(None),
        }
    }

    /// Builds a lazy cursor over all rows matching the filter.
    pub fn find(&self, filter: Value, options: TableFindOptions) -> Result<FindCursor<T>> {
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

    /// Updates the row addressed by a full-primary-key filter.
    pub async fn update_one(
        &self,
        filter: Value,
        update: Value,
        timeout: Option<Timeout>,
    ) -> Result<()> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let update = self.ser(update, SerdesTarget::Record)?;
        let command = Command::new("updateOne")
            .arg("filter", filter)
            .arg("update", update);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        self.entity.run(&command, false, &mut tm).await?;
        Ok(())
    }

    /// Deletes the row addressed by a full-primary-key filter.
    pub async fn delete_one(&self, filter: Value, timeout: Option<Timeout>) -> Result<()> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let command = Command::new("deleteOne").arg("filter", filter);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        self.entity.run(&command, false, &mut tm).await?;
        Ok(())
    }

    /// Deletes every row matching the filter.
    pub async fn delete_many(&self, filter: Value, timeout: Option<Timeout>) -> Result<()> {
        let filter = self.ser(filter, SerdesTarget::Filter)?;
        let command = Command::new("deleteMany").arg("filter", filter);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            timeout,
        );
        self.entity.run(&command, false, &mut tm).await?;
        Ok(())
    }

    /// Creates a secondary index on a column.
    pub async fn create_index(
        &self,
        name: &str,
        column: &str,
        options: CreateIndexOptions,
    ) -> Result<()> {
        let mut definition = Map::new();
        definition.insert("column".into(), column.into());

        let mut index_options = Map::new();
        if let Some(ascii) = options.ascii {
            index_options.insert("ascii".into(), ascii.into());
        }
        if let Some(normalize) = options.normalize {
            index_options.insert("normalize".into(), normalize.into());
        }
        if let Some(case_sensitive) = options.case_sensitive {
            index_options.insert("caseSensitive".into(), case_sensitive.into());
        }
        if !index_options.is_empty() {
            definition.insert("options".into(), Value::Object(index_options));
        }

        let mut command = Command::new("createIndex")
            .arg("name", name)
            .arg("definition", Value::Object(definition));
        if options.if_not_exists {
            command = command.arg("options", serde_json::json!({ "ifNotExists": true }));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::TableAdmin,
            options.timeout,
        );
        self.entity.run(&command, false, &mut tm).await?;
        Ok(())
    }

    /// Creates a vector index on a vector column.
    pub async fn create_vector_index(
        &self,
        name: &str,
        column: &str,
        options: CreateVectorIndexOptions,
    ) -> Result<()> {
        let mut definition = Map::new();
        definition.insert("column".into(), column.into());

        let mut index_options = Map::new();
        if let Some(metric) = &options.metric {
            index_options.insert("metric".into(), metric.clone().into());
        }
        if let Some(source_model) = &options.source_model {
            index_options.insert("sourceModel".into(), source_model.clone().into());
        }
        if !index_options.is_empty() {
            definition.insert("options".into(), Value::Object(index_options));
        }

        let mut command = Command::new("createVectorIndex")
            .arg("name", name)
            .arg("definition", Value::Object(definition));
        if options.if_not_exists {
            command = command.arg("options", serde_json::json!({ "ifNotExists": true }));
        }

        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::TableAdmin,
            options.timeout,
        );
        self.entity.run(&command, false, &mut tm).await?;
        Ok(())
    }

    /// Lists the indexes defined on this table.
    pub async fn list_indexes(&self, timeout: Option<Timeout>) -> Result<Vec<IndexDescriptor>> {
        let command =
            Command::new("listIndexes").arg("options", serde_json::json!({ "explain": true }));
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::TableAdmin,
            timeout,
        );
        let raw = self.entity.run(&command, true, &mut tm).await?;
        Ok(raw
            .status_field("indexes")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    /// Applies an `alterTable` operation (add/drop columns, ...).
    pub async fn alter(&self, operation: Value, timeout: Option<Timeout>) -> Result<()> {
        let command = Command::new("alterTable").arg("operation", operation);
        let mut tm = self.entity.manager(
            TimeoutMode::SingleCall,
            TimeoutCategory::TableAdmin,
            timeout,
        );
        self.entity.run(&command, false, &mut tm).await?;
        Ok(())
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

/// Options for [`Table::insert_many`].
#[derive(Debug, Clone, Default)]
pub struct TableInsertManyOptions {
    /// Sequential, abort-on-first-failure semantics.
    pub ordered: bool,
    /// Concurrent requests in unordered mode (default 8).
    pub concurrency: Option<usize>,
    /// Rows per request (default 20).
    pub chunk_size: Option<usize>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Table::find_one`].
#[derive(Debug, Clone, Default)]
pub struct TableFindOneOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Table::find`].
#[derive(Debug, Clone, Default)]
pub struct TableFindOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub include_similarity: Option<bool>,
    pub include_sort_vector: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Table::create_index`].
#[derive(Debug, Clone, Default)]
pub struct CreateIndexOptions {
    pub if_not_exists: bool,
    pub ascii: Option<bool>,
    pub normalize: Option<bool>,
    pub case_sensitive: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// Options for [`Table::create_vector_index`].
#[derive(Debug, Clone, Default)]
pub struct CreateVectorIndexOptions {
    pub if_not_exists: bool,
    /// Similarity metric (`cosine`, `dot_product`, `euclidean`).
    pub metric: Option<String>,
    /// Source embedding model hint.
    pub source_model: Option<String>,
    pub timeout: Option<Timeout>,
}

impl<T> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
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
    fn primary_keys_zip_schema_order_with_row_values() {
        let raw: RawDataApiResponse = serde_json::from_value(json!({
            "status": {
                "primaryKeySchema": {
                    "partition": { "type": "text" },
                    "cluster": { "type": "int" }
                },
                "insertedIds": [["a", 1], ["b", 2]]
            }
        }))
        .unwrap();

        let keys = Table::<Value>::parse_inserted_primary_keys(&raw).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].get("partition"), Some(&json!("a")));
        assert_eq!(keys[0].get("cluster"), Some(&json!(1)));
        assert_eq!(keys[1].get("partition"), Some(&json!("b")));
    }

    #[test]
    fn missing_schema_yields_empty_keys() {
        let raw: RawDataApiResponse =
            serde_json::from_value(json!({ "status": { "insertedIds": [["a"]] } })).unwrap();
        let keys = Table::<Value>::parse_inserted_primary_keys(&raw).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].is_empty());
    }
}
