//! Wire types for the Data API protocol (internal).
//!
//! This crate defines the JSON shapes exchanged with a Data API server and
//! the DevOps endpoints, independent of any transport or client logic:
//!
//! - **Command envelope**: the single-key `{ "<commandName>": { ... } }` object
//! - **Response envelope**: `{ status?, data?, errors? }` with error descriptors
//! - **Projection schema**: the server-returned column type descriptors that
//!   drive schema-aware deserialization
//! - **DevOps shapes**: database lifecycle states and info payloads
//! - **Field paths**: the `&.`/`&&` escaping grammar for dotted field paths

pub mod command;
pub mod devops;
pub mod paths;
pub mod response;
pub mod schema;

pub use command::Command;
pub use devops::{AstraDatabaseInfo, AstraDatabaseStatus, CreateAstraDatabaseRequest};
pub use paths::{FieldPathError, escape_field_names, unescape_field_path};
pub use response::{ErrorDescriptor, RawDataApiResponse, ResponseData};
pub use schema::{ColumnDesc, ColumnKind, ColumnTypeRef, ProjectionSchema};
