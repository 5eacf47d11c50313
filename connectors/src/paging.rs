//! Pagination and retry engine shared by all connectors.
//!
//! Drives a page-fetch function until exhaustion: an empty page, an absent
//! continuation cursor, or a page shorter than the requested size all end
//! the walk, and an absolute page-count bound guards against continuation
//! tokens that never empty. Rate limits and transient failures retry the
//! same page without advancing the cursor; auth and parameter errors abort
//! immediately, keeping whatever was already accumulated.

use common::{Error, Result};
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MAX_PAGES: usize = 200;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// One fetched page plus the cursor for the next one, if any.
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

/// Identity and ordering for items accumulated across pages.
pub trait PagedItem {
    type Key: Eq + Hash;

    fn key(&self) -> Self::Key;
    fn timestamp_ms(&self) -> i64;
}

/// Accumulated items plus the error that ended the walk early, if any.
///
/// A partial accumulation is valid data; callers decide whether an abort
/// with items in hand is an error or a degraded success.
pub struct PagedFetch<T> {
    pub items: Vec<T>,
    pub aborted: Option<Error>,
}

impl<T> PagedFetch<T> {
    /// Propagate the abort error only when nothing was accumulated;
    /// otherwise the partial result stands.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.aborted {
            Some(err) if self.items.is_empty() => Err(err),
            _ => Ok(self.items),
        }
    }
}

#[derive(Clone)]
pub struct Paginator {
    pub page_size: usize,
    pub max_pages: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            max_pages: DEFAULT_MAX_PAGES,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Execute a single request with the bounded retry policy.
    ///
    /// Retryable failures (429, 5xx, transport) sleep a fixed backoff and
    /// try again up to `max_retries`; anything else returns immediately.
    pub async fn fetch_one<T, F, Fut>(&self, mut fetch: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "transient upstream error (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.max_retries, self.retry_backoff, e
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Walk all pages starting from `start`, deduplicating by item identity
    /// and sorting by timestamp before returning.
    pub async fn fetch_all<T, C, F, Fut>(&self, start: C, mut fetch_page: F) -> PagedFetch<T>
    where
        T: PagedItem,
        C: Clone,
        F: FnMut(C) -> Fut,
        Fut: Future<Output = Result<Page<T, C>>>,
    {
        let mut items: Vec<T> = Vec::new();
        let mut aborted = None;
        let mut cursor = start;
        let mut pages = 0;

        loop {
            if pages >= self.max_pages {
                warn!(
                    "pagination stopped at the {}-page safety bound with {} items",
                    self.max_pages,
                    items.len()
                );
                break;
            }

            let page = match self.fetch_one(|| fetch_page(cursor.clone())).await {
                Ok(page) => page,
                Err(e) => {
                    aborted = Some(e);
                    break;
                }
            };
            pages += 1;

            let fetched = page.items.len();
            items.extend(page.items);

            if fetched == 0 || fetched < self.page_size {
                debug!("pagination exhausted after {} pages ({} items)", pages, items.len());
                break;
            }
            match page.next {
                Some(next) => cursor = next,
                None => {
                    debug!("pagination complete: no continuation cursor after {} pages", pages);
                    break;
                }
            }
        }

        let mut seen: HashSet<T::Key> = HashSet::with_capacity(items.len());
        items.retain(|item| seen.insert(item.key()));
        items.sort_by_key(|item| item.timestamp_ms());

        PagedFetch { items, aborted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
    }

    impl PagedItem for Row {
        type Key = i64;

        fn key(&self) -> i64 {
            self.id
        }

        fn timestamp_ms(&self) -> i64 {
            self.id
        }
    }

    fn rows(range: std::ops::Range<i64>) -> Vec<Row> {
        range.map(|id| Row { id }).collect()
    }

    fn small_paginator(page_size: usize) -> Paginator {
        Paginator {
            page_size,
            max_pages: 5,
            max_retries: 2,
            retry_backoff: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminates_at_page_bound_with_endless_pages() {
        let paginator = small_paginator(2);
        // Cursor never empties: every page is full and points onward.
        let result = paginator
            .fetch_all(0i64, |cursor| async move {
                Ok(Page {
                    items: rows(cursor..cursor + 2),
                    next: Some(cursor + 2),
                })
            })
            .await;

        assert!(result.aborted.is_none());
        assert_eq!(result.items.len(), 10); // 5 pages x 2 items
    }

    #[tokio::test(start_paused = true)]
    async fn deduplicates_overlapping_pages_and_sorts() {
        let paginator = small_paginator(3);
        // Pages overlap by one item and arrive newest-first.
        let result = paginator
            .fetch_all(0usize, |page| async move {
                let items = match page {
                    0 => vec![Row { id: 3 }, Row { id: 2 }, Row { id: 1 }],
                    1 => vec![Row { id: 5 }, Row { id: 4 }, Row { id: 3 }],
                    _ => vec![],
                };
                Ok(Page {
                    items,
                    next: Some(page + 1),
                })
            })
            .await;

        let ids: Vec<i64> = result.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_same_cursor() {
        let paginator = small_paginator(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();

        let result = paginator
            .fetch_all(0i64, move |cursor| {
                let calls = calls_in.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        // First attempt at page 0 is throttled.
                        assert_eq!(cursor, 0);
                        return Err(Error::RateLimited("429".into()));
                    }
                    // The retried call must still see cursor 0.
                    if n == 1 {
                        assert_eq!(cursor, 0);
                    }
                    Ok(Page {
                        items: rows(cursor..cursor + 1),
                        next: Some(cursor + 1),
                    })
                }
            })
            .await;

        assert!(result.aborted.is_none());
        assert_eq!(result.items, rows(0..1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn parameter_error_aborts_with_partial_results() {
        let paginator = small_paginator(2);
        let result = paginator
            .fetch_all(0i64, |cursor| async move {
                if cursor == 0 {
                    Ok(Page {
                        items: rows(0..2),
                        next: Some(2),
                    })
                } else {
                    Err(Error::Parameter("bad symbol".into()))
                }
            })
            .await;

        assert!(matches!(result.aborted, Some(Error::Parameter(_))));
        assert_eq!(result.items, rows(0..2));
        // A partial accumulation survives into_result.
        assert_eq!(result.into_result().unwrap(), rows(0..2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort_and_propagate_when_empty() {
        let paginator = small_paginator(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();

        let result: PagedFetch<Row> = paginator
            .fetch_all(0i64, move |_cursor| {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Upstream {
                        status: 503,
                        message: "unavailable".into(),
                    })
                }
            })
            .await;

        // Initial attempt plus max_retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.aborted.is_some());
        assert!(result.into_result().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn short_page_ends_the_walk() {
        let paginator = small_paginator(3);
        let result = paginator
            .fetch_all(0i64, |cursor| async move {
                Ok(Page {
                    items: rows(cursor..cursor + 1), // fewer than page_size
                    next: Some(cursor + 1),
                })
            })
            .await;

        assert!(result.aborted.is_none());
        assert_eq!(result.items.len(), 1);
    }
}
