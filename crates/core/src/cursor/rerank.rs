//! The `findAndRerank` cursor.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use astra_protocol::command::Command;
use astra_runtime::timeouts::{Timeout, TimeoutCategory, TimeoutManager, TimeoutMode};

use crate::errors::{CursorError, Error, Result};
use crate::exec::EntityRef;
use crate::results::RerankedResult;
use crate::serdes::SerdesTarget;

use super::{CursorState, PageState};

type DecodeFn<T> = Arc<dyn Fn(Value) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub(crate) struct RerankCursorOptions {
    pub sort: Option<Value>,
    pub projection: Option<Value>,
    pub limit: Option<u64>,
    pub hybrid_limits: Option<Value>,
    pub rerank_on: Option<String>,
    pub rerank_query: Option<String>,
    pub include_scores: Option<bool>,
    pub timeout: Option<Timeout>,
}

/// A cursor over a hybrid find-and-rerank result set.
///
/// Same lifecycle as [`FindCursor`](super::FindCursor); every element is a
/// [`RerankedResult`] pairing the document with its scores.
pub struct FindAndRerankCursor<T> {
    ctx: EntityRef,
    filter: Value,
    options: RerankCursorOptions,
    decode: DecodeFn<T>,
    mapped: bool,

    state: CursorState,
    page: PageState,
    buffer: VecDeque<RerankedResult<Value>>,
    consumed: usize,
    tm: Option<TimeoutManager>,
}

impl<T: DeserializeOwned> FindAndRerankCursor<T> {
    pub(crate) fn new(ctx: EntityRef, filter: Value, options: RerankCursorOptions) -> Self {
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
            tm: None,
        }
    }
}

impl<T: 'static> FindAndRerankCursor<T> {
    /// The cursor's lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Results already returned to the caller.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Results currently buffered client-side.
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

    fn spawn(&self) -> FindAndRerankCursor<T> {
        FindAndRerankCursor {
            ctx: self.ctx.clone(),
            filter: self.filter.clone(),
            options: self.options.clone(),
            decode: Arc::clone(&self.decode),
            mapped: self.mapped,
            state: CursorState::Idle,
            page: PageState::NotStarted,
            buffer: VecDeque::new(),
            consumed: 0,
            tm: None,
        }
    }

    /// Returns a new cursor with a different filter.
    pub fn filter(&self, filter: Value) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("filter")?;
        let mut next = self.spawn();
        next.filter = self.ctx.serdes.serialize(filter, SerdesTarget::Filter)?;
        Ok(next)
    }

    /// Returns a new cursor with a different hybrid sort.
    pub fn sort(&self, sort: Value) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("sort")?;
        let mut next = self.spawn();
        next.options.sort = Some(self.ctx.serdes.serialize(sort, SerdesTarget::Sort)?);
        Ok(next)
    }

    /// Returns a new cursor with a projection. Must come before
    /// [`map`](Self::map).
    pub fn project(&self, projection: Value) -> Result<FindAndRerankCursor<T>> {
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

    /// Returns a new cursor with a limit on the reranked result set.
    pub fn limit(&self, limit: u64) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("limit")?;
        let mut next = self.spawn();
        next.options.limit = Some(limit);
        Ok(next)
    }

    /// Returns a new cursor with per-retriever candidate limits (a single
    /// number or a per-retriever map).
    pub fn hybrid_limits(&self, limits: Value) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("hybrid_limits")?;
        let mut next = self.spawn();
        next.options.hybrid_limits = Some(limits);
        Ok(next)
    }

    /// Returns a new cursor reranking on the given field.
    pub fn rerank_on(&self, field: impl Into<String>) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("rerank_on")?;
        let mut next = self.spawn();
        next.options.rerank_on = Some(field.into());
        Ok(next)
    }

    /// Returns a new cursor with an explicit rerank query.
    pub fn rerank_query(&self, query: impl Into<String>) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("rerank_query")?;
        let mut next = self.spawn();
        next.options.rerank_query = Some(query.into());
        Ok(next)
    }

    /// Returns a new cursor that reports scores with each result.
    pub fn include_scores(&self, include: bool) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("include_scores")?;
        let mut next = self.spawn();
        next.options.include_scores = Some(include);
        Ok(next)
    }

    /// Returns a new cursor with a per-call timeout override.
    pub fn with_timeout(&self, timeout: impl Into<Timeout>) -> Result<FindAndRerankCursor<T>> {
        self.guard_idle("with_timeout")?;
        let mut next = self.spawn();
        next.options.timeout = Some(timeout.into());
        Ok(next)
    }

    /// Returns a new cursor mapping every document through `f`, composing
    /// left-to-right with any existing mapping.
    pub fn map<U, F>(&self, f: F) -> Result<FindAndRerankCursor<U>>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.guard_idle("map")?;
        let decode = Arc::clone(&self.decode);
        Ok(FindAndRerankCursor {
            ctx: self.ctx.clone(),
            filter: self.filter.clone(),
            options: self.options.clone(),
            decode: Arc::new(move |value| decode(value).map(&f)),
            mapped: true,
            state: CursorState::Idle,
            page: PageState::NotStarted,
            buffer: VecDeque::new(),
            consumed: 0,
            tm: None,
        })
    }

    /// Closes the cursor.
    pub fn close(&mut self) {
        self.state = CursorState::Closed;
        self.buffer.clear();
    }

    fn naturally_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.page == PageState::Exhausted
    }

    /// Returns the next reranked result; `Ok(None)` signals exhaustion.
    pub async fn next(&mut self) -> Result<Option<RerankedResult<T>>> {
        if self.state == CursorState::Closed {
            if self.naturally_exhausted() {
                return Ok(None);
            }
            return Err(CursorError::new(self.state, "cannot read from a closed cursor").into());
        }

        loop {
            if let Some(item) = self.buffer.pop_front() {
                self.consumed += 1;
                let document = (self.decode)(item.document)?;
                return Ok(Some(RerankedResult {
                    document,
                    scores: item.scores,
                }));
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

    /// True when another result is available.
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

    /// Collects every remaining result.
    pub async fn to_vec(&mut self) -> Result<Vec<RerankedResult<T>>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        self.state = CursorState::Started;

        let mut options = Map::new();
        if let Some(limit) = self.options.limit {
            options.insert("limit".into(), limit.into());
        }
        if let Some(limits) = &self.options.hybrid_limits {
            options.insert("hybridLimits".into(), limits.clone());
        }
        if let Some(field) = &self.options.rerank_on {
            options.insert("rerankOn".into(), Value::String(field.clone()));
        }
        if let Some(query) = &self.options.rerank_query {
            options.insert("rerankQuery".into(), Value::String(query.clone()));
        }
        if let Some(include) = self.options.include_scores {
            options.insert("includeScores".into(), include.into());
        }

        let mut command = Command::new("findAndRerank").arg("filter", self.filter.clone());
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
        let scores: Vec<HashMap<String, f64>> = raw
            .status_field("documentResponses")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<ScoresEntry>>(v).ok())
            .map(|entries| entries.into_iter().map(|e| e.scores).collect())
            .unwrap_or_default();

        let data = raw.data.unwrap_or_default();
        for (index, document) in data.documents.unwrap_or_default().into_iter().enumerate() {
            let deserialized =
                self.ctx
                    .serdes
                    .deserialize(document, SerdesTarget::Record, schema.as_ref())?;
            self.buffer.push_back(RerankedResult {
                document: deserialized,
                scores: scores.get(index).cloned().unwrap_or_default(),
            });
        }

        // Rerank result sets are single-page.
        self.page = PageState::Exhausted;
        Ok(())
    }
}

#[derive(serde::Deserialize)]
struct ScoresEntry {
    #[serde(default)]
    scores: HashMap<String, f64>,
}

impl<T> std::fmt::Debug for FindAndRerankCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindAndRerankCursor")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("consumed", &self.consumed)
            .finish()
    }
}
