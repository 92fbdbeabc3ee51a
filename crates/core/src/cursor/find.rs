//! The `find` cursor.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use astra_protocol::command::Command;
use astra_runtime::timeouts::{Timeout, TimeoutCategory, TimeoutManager, TimeoutMode};

use crate::datatypes::DataApiVector;
use crate::errors::{CursorError, Error, Result};
use crate::exec::EntityRef;
use crate::serdes::SerdesTarget;

use super::{CursorState, PageState};

type DecodeFn<T> = Arc<dyn Fn(Value) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub(crate) struct FindCursorOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub include_similarity: Option<bool>,
    pub include_sort_vector: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// A lazy, paginated cursor over a `find` result set.
///
/// Builder methods (`filter`, `sort`, `limit`, ...) each return a fresh
/// idle cursor and fail once this cursor has started. Consumption
/// (`next`, `has_next`, `to_vec`) starts the cursor on first use.
pub struct FindCursor<T> {
    ctx: EntityRef,
    filter: Value,
    options: FindCursorOptions,
    decode: DecodeFn<T>,
    mapped: bool,

    state: CursorState,
    page: PageState,
    buffer: VecDeque<Value>,
    consumed: usize,
    sort_vector: Option<Option<DataApiVector>>,
    tm: Option<TimeoutManager>,
}

impl<T: DeserializeOwned> FindCursor<T> {
    pub(crate) fn new(ctx: EntityRef, filter: Value, options: FindCursorOptions) -> Self {
        Self {
            ctx,
            filter,
            options,
            decode: Arc::new(|value| serde_json::from_value(value).map_err(Error::from)),
            mapped: false,
            state: CursorState::Idle,
            page: PageState::NotStarted,
            buffer: VecDeque::new(),
            consumed: 0,
            sort_vector: None,
            tm: None,
        }
    }
}

impl<T: 'static> FindCursor<T> {
    /// The cursor's lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Documents already returned to the caller.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Documents currently buffered client-side.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn guard_idle(&self, what: &str) -> Result<()> {
        if self.state != CursorState::Idle {
            return Err(CursorError::new(
                self.state,
                format!("cannot call {what} on a running/closed cursor"),
            )
            .into());
        }
        Ok(())
    }

    fn spawn(&self) -> FindCursor<T> {
        FindCursor {
            ctx: self.ctx.clone(),
            filter: self.filter.clone(),
            options: self.options.clone(),
            decode: Arc::clone(&self.decode),
            mapped: self.mapped,
            state: CursorState::Idle,
            page: PageState::NotStarted,
            buffer: VecDeque::new(),
            consumed: 0,
            sort_vector: None,
            tm: None,
        }
    }

    /// Returns a new cursor with a different filter.
    pub fn filter(&self, filter: Value) -> Result<FindCursor<T>> {
        self.guard_idle("filter")?;
        let mut next = self.spawn();
        next.filter = self.ctx.serdes.serialize(filter, SerdesTarget::Filter)?;
        Ok(next)
    }

    /// Returns a new cursor with a different sort.
    pub fn sort(&self, sort: Value) -> Result<FindCursor<T>> {
        self.guard_idle("sort")?;
        let mut next = self.spawn();
        next.options.sort = Some(self.ctx.serdes.serialize(sort, SerdesTarget::Sort)?);
        Ok(next)
    }

    /// Returns a new cursor with a limit.
    pub fn limit(&self, limit: u64) -> Result<FindCursor<T>> {
        self.guard_idle("limit")?;
        let mut next = self.spawn();
        next.options.limit = Some(limit);
        Ok(next)
    }

    /// Returns a new cursor skipping the first `skip` results.
    pub fn skip(&self, skip: u64) -> Result<FindCursor<T>> {
        self.guard_idle("skip")?;
        let mut next = self.spawn();
        next.options.skip = Some(skip);
        Ok(next)
    }

    /// Returns a new cursor with a projection.
    ///
    /// Must come before any [`map`](Self::map): the mapping already
    /// depends on the current document shape.
    pub fn project(&self, projection: Value) -> Result<FindCursor<T>> {
        self.guard_idle("project")?;
        if self.mapped {
            return Err(CursorError::new(
                self.state,
                "cannot call project after already using cursor.map",
            )
            .into());
        }
        let mut next = self.spawn();
        next.options.projection = Some(
            self.ctx
                .serdes
                .serialize(projection, SerdesTarget::Projection)?,
        );
        Ok(next)
    }

    /// Returns a new cursor that reports similarity scores.
    pub fn include_similarity(&self, include: bool) -> Result<FindCursor<T>> {
        self.guard_idle("include_similarity")?;
        let mut next = self.spawn();
        next.options.include_similarity = Some(include);
        Ok(next)
    }

    /// Returns a new cursor that reports the sort vector used.
    pub fn include_sort_vector(&self, include: bool) -> Result<FindCursor<T>> {
        self.guard_idle("include_sort_vector")?;
        let mut next = self.spawn();
        next.options.include_sort_vector = Some(include);
        Ok(next)
    }

    /// Returns a new cursor with a per-call timeout override.
    pub fn with_timeout(&self, timeout: impl Into<Timeout>) -> Result<FindCursor<T>> {
        self.guard_idle("with_timeout")?;
        let mut next = self.spawn();
        next.options.timeout = Some(timeout.into());
        Ok(next)
    }

    /// Returns a new cursor mapping every result through `f`, composing
    /// left-to-right with any existing mapping.
    pub fn map<U, F>(&self, f: F) -> Result<FindCursor<U>>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.guard_idle("map")?;
        let decode = Arc::clone(&self.decode);
        Ok(FindCursor {
            ctx: self.ctx.clone(),
            filter: self.filter.clone(),
            options: self.options.clone(),
            decode: Arc::new(move |value| decode(value).map(&f)),
            mapped: true,
            state: CursorState::Idle,
            page: PageState::NotStarted,
            buffer: VecDeque::new(),
            consumed: 0,
            sort_vector: None,
            tm: None,
        })
    }

    /// Closes the cursor. Further consumption fails with a
    /// [`CursorError`] unless the cursor was already exhausted.
    pub fn close(&mut self) {
        self.state = CursorState::Closed;
        self.buffer.clear();
    }

    fn naturally_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.page == PageState::Exhausted
    }

    /// Returns the next result, fetching pages as needed. `Ok(None)`
    /// signals exhaustion.
    pub async fn next(&mut self) -> Result<Option<T>> {
        if self.state == CursorState::Closed {
            if self.naturally_exhausted() {
                return Ok(None);
            }
            return Err(CursorError::new(self.state, "cannot read from a closed cursor").into());
        }

        loop {
            if let Some(document) = self.buffer.pop_front() {
                self.consumed += 1;
                return (self.decode)(document).map(Some);
            }
            match self.page {
                PageState::Exhausted => {
                    self.state = CursorState::Closed;
                    return Ok(None);
                }
                PageState::NotStarted | PageState::More(_) => self.fetch_page().await?,
            }
        }
    }

    /// True when another result is available. Does not consume it, and
    /// never fetches once exhaustion is already known.
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.state == CursorState::Closed {
            return if self.naturally_exhausted() {
                Ok(false)
            } else {
                Err(CursorError::new(self.state, "cannot read from a closed cursor").into())
            };
        }

        loop {
            if !self.buffer.is_empty() {
                return Ok(true);
            }
            match self.page {
                PageState::Exhausted => return Ok(false),
                PageState::NotStarted | PageState::More(_) => self.fetch_page().await?,
            }
        }
    }

    /// Drains up to `max` buffered results (all of them by default)
    /// without any network traffic.
    pub fn consume_buffer(&mut self, max: Option<usize>) -> Result<Vec<T>> {
        let take = max.unwrap_or(self.buffer.len()).min(self.buffer.len());
        let mut out = Vec::with_capacity(take);
        for _ in 0..take {
            let document = self.buffer.pop_front().expect("length checked above");
            self.consumed += 1;
            out.push((self.decode)(document)?);
        }
        Ok(out)
    }

    /// Collects every remaining result.
    pub async fn to_vec(&mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    /// The sort vector the server used, when requested via
    /// [`include_sort_vector`](Self::include_sort_vector). Fetches the
    /// first page if necessary.
    pub async fn sort_vector(&mut self) -> Result<Option<DataApiVector>> {
        if self.sort_vector.is_none() && self.state != CursorState::Closed {
            if let PageState::NotStarted = self.page {
                self.fetch_page().await?;
            }
        }
        Ok(self.sort_vector.clone().flatten())
    }

    async fn fetch_page(&mut self) -> Result<()> {
        self.state = CursorState::Started;

        let mut options = Map::new();
        if let Some(limit) = self.options.limit {
            options.insert("limit".into(), limit.into());
        }
        if let Some(skip) = self.options.skip {
            options.insert("skip".into(), skip.into());
        }
        if let Some(include) = self.options.include_similarity {
            options.insert("includeSimilarity".into(), include.into());
        }
        if let Some(include) = self.options.include_sort_vector {
            options.insert("includeSortVector".into(), include.into());
        }
        if let PageState::More(token) = &self.page {
            options.insert("pageState".into(), token.clone().into());
        }

        let mut command = Command::new("find").arg("filter", self.filter.clone());
        if let Some(sort) = &self.options.sort {
            command = command.arg("sort", sort.clone());
        }
        if let Some(projection) = &self.options.projection {
            command = command.arg("projection", projection.clone());
        }
        if !options.is_empty() {
            command = command.arg("options", Value::Object(options));
        }

        let timeout = self.options.timeout;
        let tm = self.tm.get_or_insert_with(|| {
            self.ctx
                .manager(TimeoutMode::Multipart, TimeoutCategory::GeneralMethod, timeout)
        });
        let raw = self.ctx.run(&command, true, tm).await?;

        let schema = raw.projection_schema();
        if self.options.include_sort_vector == Some(true) && self.sort_vector.is_none() {
            let vector = raw
                .status_field("sortVector")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok());
            self.sort_vector = Some(vector);
        }

        let data = raw.data.unwrap_or_default();
        for document in data.documents.unwrap_or_default() {
            let deserialized =
                self.ctx
                    .serdes
                    .deserialize(document, SerdesTarget::Record, schema.as_ref())?;
            self.buffer.push_back(deserialized);
        }

        self.page = match data.next_page_state {
            Some(token) => PageState::More(token),
            None => PageState::Exhausted,
        };
        tracing::debug!(
            buffered = self.buffer.len(),
            more = matches!(self.page, PageState::More(_)),
            "fetched cursor page"
        );
        Ok(())
    }
}

impl<T> std::fmt::Debug for FindCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindCursor")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("consumed", &self.consumed)
            .field("mapped", &self.mapped)
            .finish()
    }
}
