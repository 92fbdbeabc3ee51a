//! Data API client runtime - fetchers, auth, timeouts, events, HTTP clients
//!
//! This crate provides the low-level machinery underneath the public client
//! facades:
//!
//! - **Fetcher**: the pluggable HTTP transport abstraction
//! - **Auth**: token and header providers, consulted lazily per request
//! - **Timeouts**: per-call timeout resolution and deadline tracking
//! - **Events**: the structured command-event subsystem with hierarchical
//!   propagation and per-event output routing
//! - **HTTP clients**: the Data API command executor and the DevOps client
//!   with its long-running polling pattern
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   astra-db   │  Facades (Client, Db, Collection, Table, Admin)
//! └──────┬───────┘
//!        │ resolved options per call
//! ┌──────▼───────┐
//! │ astra-runtime│  This crate
//! │  ┌─────────┐ │
//! │  │ http    │ │  Command execution, retries, polling
//! │  └─────────┘ │
//! │  ┌─────────┐ │
//! │  │ events  │ │  Structured events + propagation
//! │  └─────────┘ │
//! │  ┌─────────┐ │
//! │  │ fetch   │ │  HTTP/1 / HTTP/2 / custom transport
//! │  └─────────┘ │
//! └──────────────┘
//! ```
//!
//! The facades own all user-facing typing and serdes; everything here works
//! on already-serialized `serde_json::Value` payloads.

pub mod auth;
pub mod error;
#[cfg(test)]
pub(crate) mod testing;
pub mod events;
pub mod fetch;
pub mod http;
pub mod timeouts;

pub use auth::{
    EmbeddingApiKeyHeadersProvider, HeaderContext, HeadersProvider, RerankingApiKeyHeadersProvider,
    StaticTokenProvider, TokenProvider, UsernamePasswordTokenProvider, merge_headers,
};
pub use error::{
    DataApiResponseError, DevOpsResponseError, Error, FetchError, FetchErrorKind,
    InvalidOptionsError, Result, TimeoutError, UnexpectedStateError,
};
pub use events::{
    ClientEvent, ClientEventKind, EventContext, EventOutput, EventPropagation, EventSelector,
    EventTarget, LoggingConfig, LoggingLayer, ResolvedLogging, Subscription,
    set_default_event_formatter,
};
pub use fetch::{
    DefaultFetcher, FetchFuture, FetchRequest, FetchResponse, Fetcher, HttpMethod,
    HttpVersionPreference,
};
pub use http::data_api::{CommandInfo, DataApiHttpClient, DataApiHttpClientConfig};
pub use http::devops::{
    AdminCommandInfo, DevOpsHttpClient, DevOpsHttpClientConfig, DevOpsRequestSpec, DevOpsResponse,
    LongRunningCommand,
};
pub use http::retry::RetryPolicy;
pub use http::{Caller, DEFAULT_DATA_API_PATH, build_user_agent};
pub use timeouts::{
    Timeout, TimeoutCategory, TimeoutDefaults, TimeoutDescriptor, TimeoutManager, TimeoutMode,
};
