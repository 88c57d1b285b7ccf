//! Deterministic fetch collaborator.
//!
//! Pages are indexed from the configured first page. A page index past the
//! script returns an empty page, so a stream whose last page is full ends on
//! the following empty fetch, exactly like a live source.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lrc_schemas::{Category, RawRecord};
use lrc_source::{FetchError, Page, PageCursor, SourceFetcher};
use rust_decimal::Decimal;
use tokio::time::Instant;

/// One `fetch_page` call as observed by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub account: String,
    pub category: Category,
    pub page: u64,
    pub offset: u64,
    pub at: Instant,
}

type StreamId = (String, Category);

pub struct ScriptedSource {
    name: String,
    first_page: u64,
    streams: HashMap<StreamId, Vec<Page>>,
    /// Zero-based request index at which a stream errors.
    failures: HashMap<StreamId, usize>,
    balances: HashMap<String, Decimal>,
    balance_failures: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<FetchCall>>,
    balance_calls: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            first_page: 0,
            streams: HashMap::new(),
            failures: HashMap::new(),
            balances: HashMap::new(),
            balance_failures: HashSet::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            balance_calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Page index the paginator starts from (must match the descriptor).
    pub fn with_first_page(mut self, first_page: u64) -> Self {
        self.first_page = first_page;
        self
    }

    /// Explicit pages for one stream.
    pub fn with_pages(mut self, account: &str, category: Category, pages: Vec<Page>) -> Self {
        self.streams.insert((account.to_string(), category), pages);
        self
    }

    /// Split `records` into pages of `page_size`, without pagination metadata.
    pub fn with_records(
        self,
        account: &str,
        category: Category,
        records: Vec<RawRecord>,
        page_size: usize,
    ) -> Self {
        let pages = records
            .chunks(page_size.max(1))
            .map(|c| Page::new(c.to_vec()))
            .collect();
        self.with_pages(account, category, pages)
    }

    /// Split `records` into pages carrying `{current, last}` metadata.
    pub fn with_marked_records(
        self,
        account: &str,
        category: Category,
        records: Vec<RawRecord>,
        page_size: usize,
    ) -> Self {
        let chunks: Vec<&[RawRecord]> = records.chunks(page_size.max(1)).collect();
        let last = self.first_page + chunks.len().saturating_sub(1) as u64;
        let first = self.first_page;
        let pages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, c)| Page::with_meta(c.to_vec(), first + i as u64, last))
            .collect();
        self.with_pages(account, category, pages)
    }

    /// The `request`-th fetch (zero-based) of this stream returns a transport error.
    pub fn fail_at(mut self, account: &str, category: Category, request: usize) -> Self {
        self.failures.insert((account.to_string(), category), request);
        self
    }

    pub fn with_balance(mut self, account: &str, balance: Decimal) -> Self {
        self.balances.insert(account.to_string(), balance);
        self
    }

    pub fn fail_balance(mut self, account: &str) -> Self {
        self.balance_failures.insert(account.to_string());
        self
    }

    /// Sleep this long inside every page fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// `fetch_balance` calls as (account, instant), in call order.
    pub fn balance_calls(&self) -> Vec<(String, Instant)> {
        self.balance_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Highest number of page fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(
        &self,
        account: &str,
        category: Category,
        cursor: &PageCursor,
    ) -> Result<Page, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(FetchCall {
                account: account.to_string(),
                category,
                page: cursor.page,
                offset: cursor.offset,
                at: Instant::now(),
            });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let id = (account.to_string(), category);
        let index = cursor.page.saturating_sub(self.first_page) as usize;
        if self.failures.get(&id) == Some(&index) {
            return Err(FetchError::Transport(format!(
                "scripted failure at page {}",
                cursor.page
            )));
        }
        Ok(self
            .streams
            .get(&id)
            .and_then(|pages| pages.get(index))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_balance(&self, account: &str) -> Result<Option<Decimal>, FetchError> {
        self.balance_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((account.to_string(), Instant::now()));
        if self.balance_failures.contains(account) {
            return Err(FetchError::Api {
                code: Some(500),
                message: "scripted balance failure".to_string(),
            });
        }
        Ok(self.balances.get(account).copied())
    }
}
