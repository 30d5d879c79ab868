//! Offset-paged query accumulation.
//!
//! An `InfiniteQuery<T>` collects the pages of one paged resource. It knows
//! which offset to request next and stops once a page arrives without a
//! continuation marker.
//!
//! # Example
//!
//! ```ignore
//! let mut query = InfiniteQuery::new(client.paging().playlist_tracks);
//!
//! while query.has_next_page() {
//!     query
//!         .fetch_next_page(|offset| client.playlist_tracks_page(&id, offset))
//!         .await?;
//! }
//!
//! for item in query.items() {
//!     println!("{:?}", item);
//! }
//! ```

use color_eyre::Result;
use std::future::Future;

use crate::spotify::types::Page;

/// The state of a paged query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
  /// No page has been requested yet
  Idle,
  /// A page request is in progress
  Fetching,
  /// The last page request succeeded
  Ready,
  /// The last page request failed
  Failed(String),
}

impl QueryState {
  pub fn is_ready(&self) -> bool {
    matches!(self, QueryState::Ready)
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Failed(e) => Some(e),
      _ => None,
    }
  }
}

/// Pages of one offset-paged resource, fetched on demand.
#[derive(Debug)]
pub struct InfiniteQuery<T> {
  pages: Vec<Page<T>>,
  page_size: u32,
  start: u32,
  state: QueryState,
}

impl<T> InfiniteQuery<T> {
  pub fn new(page_size: u32) -> Self {
    Self::starting_at(0, page_size)
  }

  /// Start paging at `offset` instead of the beginning.
  pub fn starting_at(offset: u32, page_size: u32) -> Self {
    Self {
      pages: Vec::new(),
      page_size,
      start: offset,
      state: QueryState::Idle,
    }
  }

  pub fn state(&self) -> &QueryState {
    &self.state
  }

  pub fn pages(&self) -> &[Page<T>] {
    &self.pages
  }

  /// Items of every fetched page, in order.
  pub fn items(&self) -> impl Iterator<Item = &T> {
    self.pages.iter().flat_map(|p| p.items.iter())
  }

  /// Total reported by the most recent page.
  pub fn total(&self) -> Option<u32> {
    self.pages.last().map(|p| p.total)
  }

  /// Offset of the next page, or `None` once the last page had no `next`
  /// or the offset no longer fits.
  pub fn next_page_param(&self) -> Option<u32> {
    match self.pages.last() {
      Some(last) if !last.has_more() => None,
      _ => u32::try_from(self.pages.len())
        .ok()?
        .checked_mul(self.page_size)?
        .checked_add(self.start),
    }
  }

  pub fn has_next_page(&self) -> bool {
    self.next_page_param().is_some()
  }

  /// Fetch the next page with `fetcher(offset)`.
  ///
  /// Returns `Ok(false)` without calling the fetcher when there is nothing
  /// left to fetch. On failure the query keeps the pages it already has.
  pub async fn fetch_next_page<F, Fut>(&mut self, fetcher: F) -> Result<bool>
  where
    F: FnOnce(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
  {
    let Some(offset) = self.next_page_param() else {
      return Ok(false);
    };

    self.state = QueryState::Fetching;
    match fetcher(offset).await {
      Ok(page) => {
        if page.has_more() && (page.items.len() as u32) < self.page_size {
          tracing::warn!(
            offset,
            page_size = self.page_size,
            received = page.items.len(),
            "short page with a continuation marker"
          );
        }
        self.pages.push(page);
        self.state = QueryState::Ready;
        Ok(true)
      }
      Err(e) => {
        self.state = QueryState::Failed(e.to_string());
        Err(e)
      }
    }
  }

  /// Fetch pages until the resource is exhausted.
  pub async fn fetch_all<F, Fut>(&mut self, mut fetcher: F) -> Result<()>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
  {
    while self.fetch_next_page(&mut fetcher).await? {}
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  fn page(offset: u32, len: u32, total: u32) -> Page<u32> {
    let end = offset + len;
    Page {
      items: (offset..end).collect(),
      offset,
      limit: len,
      total,
      next: (end < total).then(|| format!("?offset={}", end)),
    }
  }

  #[tokio::test]
  async fn test_offsets_advance_by_page_size() {
    let requested = Mutex::new(Vec::new());
    let mut query = InfiniteQuery::new(20);

    query
      .fetch_all(|offset| {
        requested.lock().unwrap().push(offset);
        async move { Ok(page(offset, 20u32.min(45 - offset), 45)) }
      })
      .await
      .unwrap();

    assert_eq!(*requested.lock().unwrap(), vec![0, 20, 40]);
    assert_eq!(query.items().count(), 45);
    assert_eq!(query.total(), Some(45));
    assert!(query.state().is_ready());
  }

  #[tokio::test]
  async fn test_no_request_after_last_page() {
    let mut query = InfiniteQuery::new(50);
    query
      .fetch_next_page(|offset| async move { Ok(page(offset, 3, 3)) })
      .await
      .unwrap();

    assert!(!query.has_next_page());
    assert_eq!(query.next_page_param(), None);

    let mut called = false;
    let fetched = query
      .fetch_next_page(|offset| {
        called = true;
        async move { Ok(page(offset, 3, 3)) }
      })
      .await
      .unwrap();

    assert!(!fetched);
    assert!(!called);
  }

  #[tokio::test]
  async fn test_starting_cursor() {
    let mut query = InfiniteQuery::starting_at(100, 50);
    assert_eq!(query.next_page_param(), Some(100));

    query
      .fetch_next_page(|offset| async move { Ok(page(offset, 50, 300)) })
      .await
      .unwrap();
    assert_eq!(query.next_page_param(), Some(150));
  }

  #[tokio::test]
  async fn test_short_page_keeps_cursor_rule() {
    let mut query = InfiniteQuery::new(50);
    query
      .fetch_next_page(|offset| async move { Ok(page(offset, 30, 100)) })
      .await
      .unwrap();

    // Advances by the page size, not by the number of items received
    assert_eq!(query.next_page_param(), Some(50));
  }

  #[tokio::test]
  async fn test_failure_keeps_pages() {
    let mut query = InfiniteQuery::new(10);
    query
      .fetch_next_page(|offset| async move { Ok(page(offset, 10, 30)) })
      .await
      .unwrap();

    let result = query
      .fetch_next_page(|_| async { Err(color_eyre::eyre::eyre!("boom")) })
      .await;

    assert!(result.is_err());
    assert_eq!(query.state().error(), Some("boom"));
    assert_eq!(query.pages().len(), 1);
    assert_eq!(query.next_page_param(), Some(10));
  }

  #[tokio::test]
  async fn test_cursor_past_u32_range_stops() {
    let mut query = InfiniteQuery::starting_at(u32::MAX - 10, 50);
    assert_eq!(query.next_page_param(), Some(u32::MAX - 10));

    query
      .fetch_next_page(|offset| async move {
        Ok(Page {
          items: vec![offset],
          offset,
          limit: 50,
          total: u32::MAX,
          next: Some("more".into()),
        })
      })
      .await
      .unwrap();

    assert_eq!(query.next_page_param(), None);
    assert!(!query.has_next_page());
  }

  #[test]
  fn test_idle_query_starts_at_zero() {
    let query: InfiniteQuery<u32> = InfiniteQuery::new(20);
    assert_eq!(query.state(), &QueryState::Idle);
    assert_eq!(query.next_page_param(), Some(0));
    assert_eq!(query.total(), None);
  }
}
