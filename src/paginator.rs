//! Scrollback pagination.
//!
//! Replaying a session's history in one reply would hold the connection
//! for its whole transfer, so the client pulls it in bounded sequential
//! pages instead: request a page, apply it, request the next, until the
//! reported total is reached.
//!
//! Invariants: never more than one page request outstanding; `offset` is
//! monotonically non-decreasing; "fully loaded" holds iff
//! `offset >= total_len`. On detach the paginator resets to `Idle` and a
//! reconnect restarts pagination from zero.

use crate::protocol::{
    encode_page_request, FrameType, ScrollbackPageMeta, SCROLLBACK_PAGE_SIZE,
};
use crate::writer::OutboundChunk;

/// Pagination progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorState {
    /// No request issued yet (raw mode, or freshly reset).
    Idle,
    /// One page request in flight.
    Requesting,
    /// `offset` reached `total_len`; nothing more to fetch.
    Loaded,
}

/// Issues bounded-size sequential page requests for the session history.
#[derive(Debug)]
pub struct ScrollbackPaginator {
    state: PaginatorState,
    /// Bytes already delivered to the scrollback sink.
    offset: u32,
    /// Total history length, learned from the first page.
    total_len: Option<u32>,
}

impl ScrollbackPaginator {
    /// Create a paginator in its initial state.
    pub fn new() -> Self {
        Self {
            state: PaginatorState::Idle,
            offset: 0,
            total_len: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> PaginatorState {
        self.state
    }

    /// Bytes already delivered.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Total history length, once known.
    pub fn total_len(&self) -> Option<u32> {
        self.total_len
    }

    /// True once the whole history has been delivered.
    pub fn is_loaded(&self) -> bool {
        self.state == PaginatorState::Loaded
    }

    /// Begin pagination; called once when framed mode is entered.
    ///
    /// Returns the first page request, or `None` if pagination already
    /// started (at most one request in flight).
    pub fn start(&mut self) -> Option<OutboundChunk> {
        if self.state != PaginatorState::Idle {
            return None;
        }
        self.state = PaginatorState::Requesting;
        Some(Self::page_request(0))
    }

    /// Apply a received page and return the follow-up request, if more of
    /// the history remains.
    ///
    /// The next request is issued only here, after the page's data has
    /// been fully accounted for, so replies can never overlap.
    pub fn apply_page(&mut self, meta: ScrollbackPageMeta, data_len: usize) -> Option<OutboundChunk> {
        if self.state == PaginatorState::Loaded {
            tracing::warn!(offset = meta.offset, "scrollback page after full load, ignoring");
            return None;
        }

        if self.total_len.is_none() {
            self.total_len = Some(meta.total_len);
        }
        let total = self.total_len.unwrap_or(meta.total_len);

        // Offset never moves backwards, even on a duplicate page.
        let delivered = meta.offset.saturating_add(data_len as u32);
        self.offset = self.offset.max(delivered);

        if self.offset >= total {
            self.state = PaginatorState::Loaded;
            tracing::debug!(total, "scrollback fully loaded");
            return None;
        }

        if data_len == 0 {
            // A short reply with no data can never make progress; treat
            // the history as complete rather than re-request forever.
            tracing::warn!(
                offset = self.offset,
                total,
                "empty scrollback page before total reached, stopping pagination"
            );
            self.state = PaginatorState::Loaded;
            return None;
        }

        self.state = PaginatorState::Requesting;
        Some(Self::page_request(self.offset))
    }

    /// Reset to `Idle`; pagination restarts from zero on reconnect.
    pub fn reset(&mut self) {
        self.state = PaginatorState::Idle;
        self.offset = 0;
        self.total_len = None;
    }

    fn page_request(offset: u32) -> OutboundChunk {
        OutboundChunk::framed(
            FrameType::RequestScrollbackPage,
            encode_page_request(offset, SCROLLBACK_PAGE_SIZE),
        )
    }
}

impl Default for ScrollbackPaginator {
    fn default() -> Self {
        Self::new()
    }
}
