//! Fetch collaborator boundary.
//!
//! This module defines **only** the page types and the fetch trait.
//! Pagination policy lives in `paginator.rs`; request spacing in `rate_gate.rs`.
//! Implementations are responsible for transport, authentication and any
//! retry/backoff they want. The core never retries.

use std::fmt;

use async_trait::async_trait;
use lrc_schemas::{Category, RawRecord};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Cursor / page
// ---------------------------------------------------------------------------

/// Position of the next page to fetch.
///
/// Both conventions are carried so a source can use whichever it needs:
/// `page` is the page index (starting at the source's `first_page`),
/// `offset` is the number of records already received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u64,
    pub offset: u64,
    pub page_size: usize,
}

/// Explicit pagination metadata some sources return instead of relying on a
/// short final page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub current: u64,
    pub last: u64,
}

impl PageMeta {
    pub fn is_last(&self) -> bool {
        self.current >= self.last
    }
}

/// One page of raw records in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub meta: Option<PageMeta>,
}

impl Page {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            meta: None,
        }
    }

    pub fn with_meta(records: Vec<RawRecord>, current: u64, last: u64) -> Self {
        Self {
            records,
            meta: Some(PageMeta { current, last }),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a [`SourceFetcher`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream API returned an application-level error.
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The fetcher is not configured for the requested account or category.
    Config(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Api {
                code: Some(c),
                message,
            } => write!(f, "source api error code={c}: {message}"),
            FetchError::Api {
                code: None,
                message,
            } => write!(f, "source api error: {message}"),
            FetchError::Decode(msg) => write!(f, "decode error: {msg}"),
            FetchError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

// ---------------------------------------------------------------------------
// Fetcher trait
// ---------------------------------------------------------------------------

/// Remote source contract.
///
/// Object-safe so callers can hold an `Arc<dyn SourceFetcher>`, and
/// `Send + Sync` so one fetcher can serve concurrent per-account tasks.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Source name, matching the descriptor that drives it.
    fn name(&self) -> &str;

    /// Fetch a single page. An empty result is `Ok` with no records, never an error.
    async fn fetch_page(
        &self,
        account: &str,
        category: Category,
        cursor: &PageCursor,
    ) -> Result<Page, FetchError>;

    /// Balance the source reports directly for `account`, if it has such an endpoint.
    async fn fetch_balance(&self, account: &str) -> Result<Option<Decimal>, FetchError> {
        let _ = account;
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
