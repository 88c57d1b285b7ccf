//! Page accumulation.
//!
//! [`Paginator::collect`] walks one `(account, category)` stream page by page.
//! Pages are requested strictly one after another; page N+1 is not issued
//! before page N has been appended.
//!
//! A fetch error ends the walk and the records gathered so far are returned
//! with [`StopReason::FetchFailed`]. The error is never propagated.

use lrc_schemas::{Category, RawRecord};
use tracing::{debug, warn};

use crate::provider::{FetchError, PageCursor, SourceFetcher};
use crate::rate_gate::RateGate;
use crate::spec::{PaginationStyle, Termination};

/// Why the walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back with fewer than `page_size` records.
    ShortPage,
    /// Pagination metadata reported the last page.
    LastPage,
    /// A page came back empty.
    EmptyPage,
    /// The fetcher failed; records are those of the pages before the failure.
    FetchFailed(FetchError),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::FetchFailed(_))
    }
}

/// Records of one stream in source order.
#[derive(Debug, Clone)]
pub struct Collected {
    pub records: Vec<RawRecord>,
    pub pages_fetched: usize,
    pub stop: StopReason,
}

pub struct Paginator<'a> {
    fetcher: &'a dyn SourceFetcher,
    style: &'a PaginationStyle,
    gate: Option<&'a RateGate>,
}

impl<'a> Paginator<'a> {
    pub fn new(fetcher: &'a dyn SourceFetcher, style: &'a PaginationStyle) -> Self {
        Self {
            fetcher,
            style,
            gate: None,
        }
    }

    /// Every page request first passes through `gate`.
    pub fn with_gate(mut self, gate: &'a RateGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn collect(&self, account: &str, category: Category) -> Collected {
        let page_size = self.style.page_size;
        let mut records: Vec<RawRecord> = Vec::new();
        let mut cursor = PageCursor {
            page: self.style.first_page,
            offset: 0,
            page_size,
        };
        let mut pages_fetched = 0usize;

        loop {
            if let Some(gate) = self.gate {
                gate.wait().await;
            }

            let page = match self.fetcher.fetch_page(account, category, &cursor).await {
                Ok(p) => p,
                Err(err) => {
                    warn!(
                        source = self.fetcher.name(),
                        account,
                        category = %category,
                        page = cursor.page,
                        kept = records.len(),
                        error = %err,
                        "fetch failed; keeping partial result"
                    );
                    return Collected {
                        records,
                        pages_fetched,
                        stop: StopReason::FetchFailed(err),
                    };
                }
            };

            pages_fetched += 1;
            let n = page.records.len();
            debug!(
                source = self.fetcher.name(),
                account,
                category = %category,
                page = cursor.page,
                records = n,
                "page fetched"
            );
            records.extend(page.records);

            let stop = if n == 0 {
                Some(StopReason::EmptyPage)
            } else {
                match (self.style.termination, page.meta) {
                    (Termination::LastPageMarker, Some(meta)) if meta.is_last() => {
                        Some(StopReason::LastPage)
                    }
                    (Termination::LastPageMarker, Some(_)) => None,
                    _ if n < page_size => Some(StopReason::ShortPage),
                    _ => None,
                }
            };
            if let Some(stop) = stop {
                return Collected {
                    records,
                    pages_fetched,
                    stop,
                };
            }

            cursor.page += 1;
            cursor.offset += n as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Page;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves pre-built pages; `Err` entries fail that call.
    struct Pages {
        pages: Vec<Result<Page, FetchError>>,
        cursors: Mutex<Vec<PageCursor>>,
        first_page: u64,
    }

    impl Pages {
        fn new(first_page: u64, pages: Vec<Result<Page, FetchError>>) -> Self {
            Self {
                pages,
                cursors: Mutex::new(Vec::new()),
                first_page,
            }
        }

        fn seen(&self) -> Vec<PageCursor> {
            self.cursors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceFetcher for Pages {
        fn name(&self) -> &str {
            "pages"
        }

        async fn fetch_page(
            &self,
            _account: &str,
            _category: Category,
            cursor: &PageCursor,
        ) -> Result<Page, FetchError> {
            self.cursors.lock().unwrap().push(*cursor);
            let idx = (cursor.page - self.first_page) as usize;
            match self.pages.get(idx) {
                Some(p) => p.clone(),
                None => Ok(Page::default()),
            }
        }
    }

    fn recs(ids: &[u64]) -> Vec<RawRecord> {
        ids.iter()
            .map(|i| RawRecord::from_value(json!({ "id": i })).unwrap())
            .collect()
    }

    fn ids(c: &Collected) -> Vec<u64> {
        c.records.iter().filter_map(|r| r.u64_field("id")).collect()
    }

    fn style(first_page: u64, page_size: usize, termination: Termination) -> PaginationStyle {
        PaginationStyle {
            first_page,
            page_size,
            termination,
        }
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let f = Pages::new(
            0,
            vec![Ok(Page::new(recs(&[1, 2]))), Ok(Page::new(recs(&[3])))],
        );
        let s = style(0, 2, Termination::ShortPage);
        let c = Paginator::new(&f, &s).collect("a", Category::NormalTx).await;

        assert_eq!(ids(&c), vec![1, 2, 3]);
        assert_eq!(c.stop, StopReason::ShortPage);
        assert_eq!(c.pages_fetched, 2);
    }

    #[tokio::test]
    async fn exact_multiple_ends_on_empty_page() {
        let f = Pages::new(0, vec![Ok(Page::new(recs(&[1, 2])))]);
        let s = style(0, 2, Termination::ShortPage);
        let c = Paginator::new(&f, &s).collect("a", Category::NormalTx).await;

        assert_eq!(ids(&c), vec![1, 2]);
        assert_eq!(c.stop, StopReason::EmptyPage);
        assert_eq!(c.pages_fetched, 2);
    }

    #[tokio::test]
    async fn one_based_pages_and_offsets_advance() {
        let f = Pages::new(
            1,
            vec![Ok(Page::new(recs(&[1, 2]))), Ok(Page::new(recs(&[3])))],
        );
        let s = style(1, 2, Termination::ShortPage);
        Paginator::new(&f, &s).collect("a", Category::Trade).await;

        let seen = f.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].page, seen[0].offset), (1, 0));
        assert_eq!((seen[1].page, seen[1].offset), (2, 2));
    }

    #[tokio::test]
    async fn last_page_marker_overrides_count_heuristic() {
        // Pages shorter than page_size do not stop the walk while the marker
        // says more pages remain.
        let f = Pages::new(
            1,
            vec![
                Ok(Page::with_meta(recs(&[1]), 1, 3)),
                Ok(Page::with_meta(recs(&[2]), 2, 3)),
                Ok(Page::with_meta(recs(&[3]), 3, 3)),
            ],
        );
        let s = style(1, 10, Termination::LastPageMarker);
        let c = Paginator::new(&f, &s).collect("a", Category::Withdrawal).await;

        assert_eq!(ids(&c), vec![1, 2, 3]);
        assert_eq!(c.stop, StopReason::LastPage);
    }

    #[tokio::test]
    async fn marker_strategy_without_meta_falls_back_to_short_page() {
        let f = Pages::new(0, vec![Ok(Page::new(recs(&[1])))]);
        let s = style(0, 10, Termination::LastPageMarker);
        let c = Paginator::new(&f, &s).collect("a", Category::Trade).await;
        assert_eq!(c.stop, StopReason::ShortPage);
    }

    #[tokio::test]
    async fn failure_keeps_pages_before_it() {
        let err = FetchError::Transport("reset".to_string());
        let f = Pages::new(
            0,
            vec![
                Ok(Page::new(recs(&[1, 2]))),
                Ok(Page::new(recs(&[3, 4]))),
                Err(err.clone()),
            ],
        );
        let s = style(0, 2, Termination::ShortPage);
        let c = Paginator::new(&f, &s).collect("a", Category::TokenTx).await;

        assert_eq!(ids(&c), vec![1, 2, 3, 4]);
        assert_eq!(c.stop, StopReason::FetchFailed(err));
        assert!(c.stop.is_failure());
        assert_eq!(c.pages_fetched, 2);
    }

    #[tokio::test]
    async fn failure_on_first_page_is_empty_not_error() {
        let f = Pages::new(0, vec![Err(FetchError::Decode("bad json".to_string()))]);
        let s = style(0, 2, Termination::ShortPage);
        let c = Paginator::new(&f, &s).collect("a", Category::Deposit).await;

        assert!(c.records.is_empty());
        assert_eq!(c.pages_fetched, 0);
        assert!(c.stop.is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn gate_spaces_page_requests() {
        let f = Pages::new(
            0,
            vec![Ok(Page::new(recs(&[1]))), Ok(Page::new(recs(&[2])))],
        );
        let s = style(0, 1, Termination::ShortPage);
        let gate = RateGate::new(std::time::Duration::from_millis(500));
        let t0 = tokio::time::Instant::now();
        Paginator::new(&f, &s)
            .with_gate(&gate)
            .collect("a", Category::NormalTx)
            .await;

        // Three requests: two full pages and the trailing empty one.
        assert_eq!(f.seen().len(), 3);
        assert!(t0.elapsed() >= std::time::Duration::from_millis(1000));
    }
}
