//! Hierarchical configuration and option resolution.
//!
//! Every option domain is an independent monoid: `empty()` is the identity
//! and `concat(parent, child)` merges field-wise with the child winning.
//! Facades resolve their effective options by folding the chain
//! client → db → collection/table → per-call, so an unspecified field
//! always inherits the parent's effective value.

mod client;
mod db;

pub use client::{ClientOptions, DataApiEnvironment, HttpClientOptions};
pub use db::{AdminOptions, CollectionOptions, DbOptions, TableOptions};

pub(crate) use db::validate_keyspace_name;

use std::collections::HashMap;

/// Right-biased key-wise merge for header maps.
pub(crate) fn merge_header_maps(
    mut base: HashMap<String, String>,
    overrides: HashMap<String, String>,
) -> HashMap<String, String> {
    base.extend(overrides);
    base
}
