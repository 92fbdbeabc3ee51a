//! Per-operation timeout resolution and deadline tracking.
//!
//! Every call resolves a [`TimeoutDescriptor`] out of its inherited defaults
//! and the optional per-call override, then drives a [`TimeoutManager`] that
//! hands out one deadline per network attempt:
//!
//! - **Single-call** mode (most commands): the deadline is
//!   `min(requestTimeoutMs, <category>)` for the one attempt.
//! - **Multipart** mode (paginated cursors, long-running polling): the
//!   category timeout is a wall-clock budget across attempts; each attempt
//!   gets `min(requestTimeoutMs, remaining budget)`.
//!
//! A configured value of `0` means "effectively infinite".

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::TimeoutError;

/// The sentinel a `0` timeout resolves to (the largest `setTimeout`-safe
/// span, roughly 24.8 days).
pub const EFFECTIVELY_INFINITE_MS: u64 = i32::MAX as u64;

/// The full set of timeout fields, with every field resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutDescriptor {
    /// Cap on any single HTTP request.
    pub request_timeout_ms: u64,
    /// Overall budget for general-purpose methods (CRUD, find, ...).
    pub general_method_timeout_ms: u64,
    /// Overall budget for collection lifecycle commands.
    pub collection_admin_timeout_ms: u64,
    /// Overall budget for table lifecycle commands.
    pub table_admin_timeout_ms: u64,
    /// Overall budget for database lifecycle (long-running) commands.
    pub database_admin_timeout_ms: u64,
    /// Overall budget for keyspace lifecycle commands.
    pub keyspace_admin_timeout_ms: u64,
}

impl Default for TimeoutDescriptor {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            general_method_timeout_ms: 30_000,
            collection_admin_timeout_ms: 60_000,
            table_admin_timeout_ms: 30_000,
            database_admin_timeout_ms: 600_000,
            keyspace_admin_timeout_ms: 30_000,
        }
    }
}

impl TimeoutDescriptor {
    /// Reads the field for a category.
    pub fn get(&self, category: TimeoutCategory) -> u64 {
        match category {
            TimeoutCategory::Request => self.request_timeout_ms,
            TimeoutCategory::GeneralMethod => self.general_method_timeout_ms,
            TimeoutCategory::CollectionAdmin => self.collection_admin_timeout_ms,
            TimeoutCategory::TableAdmin => self.table_admin_timeout_ms,
            TimeoutCategory::DatabaseAdmin => self.database_admin_timeout_ms,
            TimeoutCategory::KeyspaceAdmin => self.keyspace_admin_timeout_ms,
        }
    }

    /// Applies a partial override on top of this descriptor, field-wise.
    pub fn apply(&self, overrides: &TimeoutDefaults) -> TimeoutDescriptor {
        TimeoutDescriptor {
            request_timeout_ms: overrides.request_timeout_ms.unwrap_or(self.request_timeout_ms),
            general_method_timeout_ms: overrides
                .general_method_timeout_ms
                .unwrap_or(self.general_method_timeout_ms),
            collection_admin_timeout_ms: overrides
                .collection_admin_timeout_ms
                .unwrap_or(self.collection_admin_timeout_ms),
            table_admin_timeout_ms: overrides
                .table_admin_timeout_ms
                .unwrap_or(self.table_admin_timeout_ms),
            database_admin_timeout_ms: overrides
                .database_admin_timeout_ms
                .unwrap_or(self.database_admin_timeout_ms),
            keyspace_admin_timeout_ms: overrides
                .keyspace_admin_timeout_ms
                .unwrap_or(self.keyspace_admin_timeout_ms),
        }
    }
}

/// A partial timeout descriptor: the override layer and the options monoid.
///
/// `concat` is right-biased per field; `empty` (all `None`) is the identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_method_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_admin_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_admin_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_admin_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace_admin_timeout_ms: Option<u64>,
}

impl TimeoutDefaults {
    /// The identity element: no overrides.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Right-biased field-wise merge.
    pub fn concat(self, other: TimeoutDefaults) -> TimeoutDefaults {
        TimeoutDefaults {
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            general_method_timeout_ms: other
                .general_method_timeout_ms
                .or(self.general_method_timeout_ms),
            collection_admin_timeout_ms: other
                .collection_admin_timeout_ms
                .or(self.collection_admin_timeout_ms),
            table_admin_timeout_ms: other.table_admin_timeout_ms.or(self.table_admin_timeout_ms),
            database_admin_timeout_ms: other
                .database_admin_timeout_ms
                .or(self.database_admin_timeout_ms),
            keyspace_admin_timeout_ms: other
                .keyspace_admin_timeout_ms
                .or(self.keyspace_admin_timeout_ms),
        }
    }

    /// Sets the field for a category.
    pub fn set(&mut self, category: TimeoutCategory, value: u64) {
        match category {
            TimeoutCategory::Request => self.request_timeout_ms = Some(value),
            TimeoutCategory::GeneralMethod => self.general_method_timeout_ms = Some(value),
            TimeoutCategory::CollectionAdmin => self.collection_admin_timeout_ms = Some(value),
            TimeoutCategory::TableAdmin => self.table_admin_timeout_ms = Some(value),
            TimeoutCategory::DatabaseAdmin => self.database_admin_timeout_ms = Some(value),
            TimeoutCategory::KeyspaceAdmin => self.keyspace_admin_timeout_ms = Some(value),
        }
    }
}

/// The named timeout fields an operation can be bound by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutCategory {
    Request,
    GeneralMethod,
    CollectionAdmin,
    TableAdmin,
    DatabaseAdmin,
    KeyspaceAdmin,
}

impl TimeoutCategory {
    /// The descriptor field name for this category.
    pub fn field_name(&self) -> &'static str {
        match self {
            TimeoutCategory::Request => "requestTimeoutMs",
            TimeoutCategory::GeneralMethod => "generalMethodTimeoutMs",
            TimeoutCategory::CollectionAdmin => "collectionAdminTimeoutMs",
            TimeoutCategory::TableAdmin => "tableAdminTimeoutMs",
            TimeoutCategory::DatabaseAdmin => "databaseAdminTimeoutMs",
            TimeoutCategory::KeyspaceAdmin => "keyspaceAdminTimeoutMs",
        }
    }
}

/// A per-call timeout override: a bare number or a partial descriptor.
///
/// A bare number sets both `requestTimeoutMs` and the operation's category
/// timeout in single-call mode, and only the category timeout in multipart
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Shorthand: one number.
    Ms(u64),
    /// Field-wise override.
    Defaults(TimeoutDefaults),
}

impl From<u64> for Timeout {
    fn from(ms: u64) -> Self {
        Timeout::Ms(ms)
    }
}

impl From<TimeoutDefaults> for Timeout {
    fn from(defaults: TimeoutDefaults) -> Self {
        Timeout::Defaults(defaults)
    }
}

/// Whether the category budget spans one attempt or the whole method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutMode {
    /// One-shot commands: one attempt, one deadline.
    SingleCall,
    /// Cursors and pollers: the category budget is wall-clock across
    /// attempts.
    Multipart,
}

/// The deadline for one network attempt, plus the blame for its elapse.
#[derive(Debug, Clone)]
pub struct Deadline {
    ms: u64,
    blame: Vec<TimeoutCategory>,
    described: TimeoutDefaults,
}

impl Deadline {
    /// The attempt deadline. Never negative; zero means the budget is
    /// already exhausted.
    pub fn ms(&self) -> u64 {
        self.ms
    }

    /// The deadline as a `Duration`.
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ms)
    }

    /// True when the overall budget is already spent.
    pub fn exhausted(&self) -> bool {
        self.ms == 0
    }

    /// Builds the error naming the binding category(ies).
    pub fn timeout_error(&self) -> TimeoutError {
        TimeoutError {
            timeout_ms: self.ms,
            categories: self.blame.clone(),
            described: self.described,
        }
    }
}

/// Tracks request vs. overall budgets for one method call.
///
/// Lives exactly as long as the call; [`advance`](Self::advance) is invoked
/// before each network attempt.
#[derive(Debug)]
pub struct TimeoutManager {
    mode: TimeoutMode,
    category: TimeoutCategory,
    request_ms: u64,
    category_ms: u64,
    initial: TimeoutDefaults,
    started_at: Option<Instant>,
}

impl TimeoutManager {
    /// Resolves the effective timeouts for one call.
    pub fn new(
        mode: TimeoutMode,
        category: TimeoutCategory,
        base: &TimeoutDescriptor,
        call_override: Option<Timeout>,
    ) -> Self {
        let mut resolved = *base;
        match call_override {
            Some(Timeout::Ms(ms)) => {
                let mut partial = TimeoutDefaults::empty();
                partial.set(category, ms);
                if mode == TimeoutMode::SingleCall {
                    partial.set(TimeoutCategory::Request, ms);
                }
                resolved = resolved.apply(&partial);
            }
            Some(Timeout::Defaults(partial)) => {
                resolved = resolved.apply(&partial);
            }
            None => {}
        }

        let request_ms = uncap_zero(resolved.request_timeout_ms);
        let category_ms = uncap_zero(resolved.get(category));

        let mut initial = TimeoutDefaults::empty();
        initial.set(TimeoutCategory::Request, request_ms);
        initial.set(category, category_ms);

        Self {
            mode,
            category,
            request_ms,
            category_ms,
            initial,
            started_at: None,
        }
    }

    /// The effective partial descriptor, for inclusion in events and errors.
    pub fn initial(&self) -> TimeoutDefaults {
        self.initial
    }

    /// The category this call is budgeted under.
    pub fn category(&self) -> TimeoutCategory {
        self.category
    }

    /// Computes the deadline for the next network attempt.
    pub fn advance(&mut self) -> Deadline {
        let (ms, blame) = match self.mode {
            TimeoutMode::SingleCall => bind(self.request_ms, self.category_ms, self.category),
            TimeoutMode::Multipart => {
                let started = *self.started_at.get_or_insert_with(Instant::now);
                let elapsed = started.elapsed().as_millis() as u64;
                let remaining = self.category_ms.saturating_sub(elapsed);
                bind(self.request_ms, remaining, self.category)
            }
        };

        Deadline {
            ms,
            blame,
            described: self.initial,
        }
    }
}

fn uncap_zero(ms: u64) -> u64 {
    if ms == 0 { EFFECTIVELY_INFINITE_MS } else { ms }
}

fn bind(request_ms: u64, category_ms: u64, category: TimeoutCategory) -> (u64, Vec<TimeoutCategory>) {
    match request_ms.cmp(&category_ms) {
        std::cmp::Ordering::Less => (request_ms, vec![TimeoutCategory::Request]),
        std::cmp::Ordering::Greater => (category_ms, vec![category]),
        std::cmp::Ordering::Equal => (request_ms, vec![TimeoutCategory::Request, category]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TimeoutDescriptor {
        TimeoutDescriptor {
            request_timeout_ms: 10_000,
            general_method_timeout_ms: 30_000,
            ..TimeoutDescriptor::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let d = TimeoutDescriptor::default();
        assert_eq!(d.request_timeout_ms, 10_000);
        assert_eq!(d.general_method_timeout_ms, 30_000);
        assert_eq!(d.collection_admin_timeout_ms, 60_000);
        assert_eq!(d.table_admin_timeout_ms, 30_000);
        assert_eq!(d.database_admin_timeout_ms, 600_000);
        assert_eq!(d.keyspace_admin_timeout_ms, 30_000);
    }

    #[test]
    fn partial_override_binds_the_category() {
        let mut partial = TimeoutDefaults::empty();
        partial.general_method_timeout_ms = Some(2_000);

        let mut tm = TimeoutManager::new(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            &base(),
            Some(Timeout::Defaults(partial)),
        );

        let deadline = tm.advance();
        assert_eq!(deadline.ms(), 2_000);
        assert_eq!(
            deadline.timeout_error().categories,
            vec![TimeoutCategory::GeneralMethod]
        );
    }

    #[test]
    fn numeric_shorthand_sets_both_in_single_mode() {
        let mut tm = TimeoutManager::new(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            &base(),
            Some(Timeout::Ms(5_000)),
        );

        let deadline = tm.advance();
        assert_eq!(deadline.ms(), 5_000);
        // Both fields were set to the same value, so both take the blame.
        assert_eq!(
            deadline.timeout_error().categories,
            vec![TimeoutCategory::Request, TimeoutCategory::GeneralMethod]
        );
    }

    #[test]
    fn numeric_shorthand_leaves_request_alone_in_multipart_mode() {
        let mut tm = TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::GeneralMethod,
            &base(),
            Some(Timeout::Ms(60_000)),
        );

        let deadline = tm.advance();
        // Request timeout (10s) binds each attempt; the 60s shorthand only
        // widened the overall budget.
        assert_eq!(deadline.ms(), 10_000);
        assert_eq!(
            deadline.timeout_error().categories,
            vec![TimeoutCategory::Request]
        );
    }

    #[test]
    fn multipart_budget_shrinks_with_wall_clock() {
        let mut tm = TimeoutManager::new(
            TimeoutMode::Multipart,
            TimeoutCategory::GeneralMethod,
            &base(),
            None,
        );

        let first = tm.advance();
        assert_eq!(first.ms(), 10_000);

        // Simulate the budget being nearly spent.
        tm.started_at = Some(Instant::now() - std::time::Duration::from_millis(29_995));
        let second = tm.advance();
        assert!(second.ms() <= 10);
        assert_eq!(
            second.timeout_error().categories,
            vec![TimeoutCategory::GeneralMethod]
        );

        // Fully spent: deadline saturates to zero rather than going negative.
        tm.started_at = Some(Instant::now() - std::time::Duration::from_secs(3_600));
        let third = tm.advance();
        assert_eq!(third.ms(), 0);
        assert!(third.exhausted());
        assert!(!third.timeout_error().categories.is_empty());
    }

    #[test]
    fn zero_means_effectively_infinite() {
        let mut partial = TimeoutDefaults::empty();
        partial.request_timeout_ms = Some(0);
        partial.general_method_timeout_ms = Some(0);

        let mut tm = TimeoutManager::new(
            TimeoutMode::SingleCall,
            TimeoutCategory::GeneralMethod,
            &base(),
            Some(Timeout::Defaults(partial)),
        );

        assert_eq!(tm.advance().ms(), EFFECTIVELY_INFINITE_MS);
    }

    #[test]
    fn defaults_concat_is_a_monoid() {
        let a = TimeoutDefaults {
            request_timeout_ms: Some(1),
            general_method_timeout_ms: Some(2),
            ..TimeoutDefaults::empty()
        };
        let b = TimeoutDefaults {
            general_method_timeout_ms: Some(3),
            table_admin_timeout_ms: Some(4),
            ..TimeoutDefaults::empty()
        };
        let c = TimeoutDefaults {
            table_admin_timeout_ms: Some(5),
            ..TimeoutDefaults::empty()
        };

        // Associativity.
        assert_eq!(a.concat(b).concat(c), a.concat(b.concat(c)));
        // Identity.
        assert_eq!(a.concat(TimeoutDefaults::empty()), a);
        assert_eq!(TimeoutDefaults::empty().concat(a), a);
        // Right bias.
        assert_eq!(a.concat(b).general_method_timeout_ms, Some(3));
    }

    #[test]
    fn initial_reports_request_and_category() {
        let tm = TimeoutManager::new(
            TimeoutMode::SingleCall,
            TimeoutCategory::KeyspaceAdmin,
            &TimeoutDescriptor::default(),
            None,
        );
        let initial = tm.initial();
        assert_eq!(initial.request_timeout_ms, Some(10_000));
        assert_eq!(initial.keyspace_admin_timeout_ms, Some(30_000));
        assert_eq!(initial.general_method_timeout_ms, None);
    }
}
