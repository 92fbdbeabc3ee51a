//! astra: typed async client for the Data API
//!
//! This crate is the public API for working with Data API databases:
//! collections of schemaless documents, strongly-typed tables, and the
//! administrative surface over keyspaces, collections, tables, indexes,
//! and (on Astra) databases.
//!
//! # Examples
//!
//! ## Documents
//!
//! ```ignore
//! use astra::{DataApiClient, InsertManyOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> astra::Result<()> {
//!     let client = DataApiClient::new("AstraCS:...")?;
//!     let db = client.db("https://<id>-<region>.apps.astra.datastax.com")?;
//!     let movies = db.collection::<serde_json::Value>("movies")?;
//!
//!     movies
//!         .insert_many(
//!             &[json!({ "title": "Alien", "year": 1979 })],
//!             InsertManyOptions::default(),
//!         )
//!         .await?;
//!
//!     let mut cursor = movies.find(json!({ "year": { "$gte": 1970 } }), Default::default())?;
//!     while let Some(movie) = cursor.next().await? {
//!         println!("{movie}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Typed rows
//!
//! ```ignore
//! use astra::DataApiClient;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     age: i32,
//! }
//!
//! # async fn example(db: astra::Db) -> astra::Result<()> {
//! let users = db.table::<User>("users")?;
//! let inserted = users.insert_one(&User { id: "a".into(), age: 3 }, None).await?;
//! println!("primary key: {:?}", inserted.inserted_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Events
//!
//! ```ignore
//! use astra::events::ClientEventKind;
//!
//! # fn example(client: &astra::DataApiClient) {
//! let _sub = client.on(ClientEventKind::CommandFailed, |event, _propagation| {
//!     eprintln!("command failed: {:?}", event.error);
//! });
//! # }
//! ```

pub mod admin;
pub mod client;
pub mod collection;
pub mod cursor;
pub mod datatypes;
pub mod db;
pub mod errors;
pub mod options;
pub mod results;
pub mod serdes;
pub mod table;

mod exec;

pub use admin::{
    AstraAdmin, AstraDbAdmin, CreateDatabaseOptions, DataApiDbAdmin, DbAdmin,
    DropDatabaseOptions, KeyspaceAdminOptions,
};
pub use client::DataApiClient;
pub use collection::{
    BulkWriteOp, BulkWriteOptions, Collection, DeleteOptions, FindAndRerankOptions,
    FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
    InsertManyOptions, ReplaceOptions, ReturnDocument, UpdateManyOptions, UpdateOptions,
};
pub use cursor::{CursorState, FindAndRerankCursor, FindCursor};
pub use datatypes::{
    BigNumber, DataApiBlob, DataApiDuration, DataApiMap, DataApiTimestamp, DataApiUuid,
    DataApiVector, ObjectId, SomeId,
};
pub use db::{
    AstraApiEnvironment, AstraEndpoint, CollectionDefinition, CreateCollectionOptions,
    CreateTableOptions, Db, DEFAULT_KEYSPACE, DefaultIdDefinition, DefaultIdKind,
    DropTableIndexOptions, DropTableOptions, RunCommandOptions, VectorDefinition, VectorMetric,
    parse_astra_endpoint,
};
pub use errors::{
    BulkWriteError, CursorError, DataApiResponseError, DevOpsResponseError, Error, FetchError,
    InsertManyError, InvalidArgumentsError, InvalidOptionsError, Result, SerializationError,
    TableInsertManyError, TimeoutError, TooManyDocumentsError, UnexpectedStateError,
};
pub use options::{
    AdminOptions, ClientOptions, CollectionOptions, DataApiEnvironment, DbOptions,
    HttpClientOptions, TableOptions,
};
pub use results::{
    BulkWriteResult, CollectionDescriptor, DeleteResult, IndexDescriptor, InsertManyResult,
    InsertOneResult, RerankedResult, TableDescriptor, TableInsertManyResult,
    TableInsertOneResult, UpdateResult,
};
pub use serdes::{
    Camel2SnakeCase, Codec, CodecSelector, CodecSignal, KeyTransformer, SerDes, SerdesOptions,
    SerdesTarget,
};
pub use table::{
    CreateIndexOptions, CreateVectorIndexOptions, Table, TableFindOneOptions, TableFindOptions,
    TableInsertManyOptions,
};

/// Field path escaping, re-exported from the wire crate.
pub use astra_protocol::paths::{FieldPathError, escape_field_names, unescape_field_path};

/// The wire-type crate, for direct envelope access.
pub use astra_protocol as protocol;

/// The runtime crate: fetchers, auth providers, timeouts, events.
pub use astra_runtime as runtime;

/// Event types, re-exported from the runtime.
pub mod events {
    pub use astra_runtime::events::{
        ClientEvent, ClientEventKind, EventContext, EventOutput, EventPropagation, EventSelector,
        EventTarget, LoggingConfig, LoggingLayer, Subscription, set_default_event_formatter,
    };
}

/// Auth providers, re-exported from the runtime.
pub mod auth {
    pub use astra_runtime::auth::{
        EmbeddingApiKeyHeadersProvider, HeaderContext, HeadersProvider,
        RerankingApiKeyHeadersProvider, StaticTokenProvider, TokenProvider,
        UsernamePasswordTokenProvider,
    };
}

/// Timeout configuration, re-exported from the runtime.
pub mod timeouts {
    pub use astra_runtime::timeouts::{
        Timeout, TimeoutCategory, TimeoutDefaults, TimeoutDescriptor,
    };
}

/// Transport plumbing, re-exported from the runtime.
pub mod fetch {
    pub use astra_runtime::fetch::{
        DefaultFetcher, FetchRequest, FetchResponse, Fetcher, HttpMethod, HttpVersionPreference,
    };
}

/// Caller identity for the User-Agent header.
pub use astra_runtime::http::Caller;
