//! Lazy paginated cursors over `find` result sets.
//!
//! A cursor is an immutable query description plus mutable execution
//! state. Builder methods return a *new*, idle cursor and fail once the
//! original has started; consumption drains an internal page buffer,
//! fetching the next page lazily.

pub(crate) mod find;
pub(crate) mod rerank;

pub use find::FindCursor;
pub use rerank::FindAndRerankCursor;

/// The lifecycle of a cursor. Transitions are one-way forward:
/// `Idle → Started → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, no page fetched yet.
    Idle,
    /// At least one page fetch has happened.
    Started,
    /// Exhausted or explicitly closed.
    Closed,
}

impl std::fmt::Display for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CursorState::Idle => "idle",
            CursorState::Started => "started",
            CursorState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Where the cursor stands in the server-side page sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PageState {
    /// No page fetched yet.
    NotStarted,
    /// More pages follow, resumable with this token.
    More(String),
    /// The server reported the final page.
    Exhausted,
}
