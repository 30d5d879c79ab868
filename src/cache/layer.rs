//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as SyncMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::storage::{CacheStorage, CachedQuery};
use super::traits::{CacheResult, CacheScope, Cacheable, QueryKey};

type InFlight = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Invalidation count per scope. A fetch that saw an older count than the
/// current one must not write its result back.
type Generations = Arc<SyncMutex<HashMap<CacheScope, u64>>>;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching, scope invalidation, and at most one
/// in-flight fetch per query.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  /// Serve stale cache when a refresh fails
  offline_fallback: bool,
  in_flight: InFlight,
  generations: Generations,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(5),
      offline_fallback: false,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      generations: Arc::new(SyncMutex::new(HashMap::new())),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Serve stale cached data (marked `Offline`) when a refresh fails.
  pub fn with_offline_fallback(mut self, enabled: bool) -> Self {
    self.offline_fallback = enabled;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.stale_time
  }

  fn is_fresh<T>(&self, cached: &CachedQuery<T>) -> bool {
    !cached.invalidated && !self.is_stale(cached.cached_at)
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if fresh and not invalidated, return immediately
  /// 2. If stale/invalidated/missing, fetch from network
  /// 3. On network failure, return the error (or stale cache in offline mode)
  /// 4. Update cache with new data
  pub async fn fetch<T, F, Fut>(&self, key: &dyn QueryKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let hash = key.cache_hash();
    let guard = self.lock_key(&hash).await;
    let result = self.fetch_locked(key, fetcher).await;
    self.release_key(&hash, guard).await;
    result
  }

  async fn fetch_locked<T, F, Fut>(&self, key: &dyn QueryKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let scope = key.scope();
    let generation = self.generation(&scope)?;
    let cached = self.storage.get::<T>(key)?;
    if let Some(cached) = &cached {
      if self.is_fresh(cached) {
        tracing::debug!(key = %key.description(), "cache hit");
        return Ok(CacheResult::from_cache(cached.payload.clone(), cached.cached_at));
      }
    }

    tracing::debug!(key = %key.description(), "fetching");
    match fetcher().await {
      Ok(data) => {
        self.store_if_current(key, &scope, generation, &data)?;
        Ok(CacheResult::from_network(data))
      }
      Err(e) => self.fallback(key, cached, e),
    }
  }

  /// Fetch a list with incremental update support.
  ///
  /// If we have cached data, the fetcher receives the max updated_at from
  /// the cache and only needs to return entities newer than that. New
  /// entities are merged in front of the cached ones (replacing entries
  /// with the same key) and the list is capped at `cap` items.
  pub async fn fetch_incremental<T, F, Fut>(
    &self,
    key: &dyn QueryKey,
    cap: usize,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let hash = key.cache_hash();
    let guard = self.lock_key(&hash).await;
    let result = self.fetch_incremental_locked(key, cap, fetcher).await;
    self.release_key(&hash, guard).await;
    result
  }

  async fn fetch_incremental_locked<T, F, Fut>(
    &self,
    key: &dyn QueryKey,
    cap: usize,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let scope = key.scope();
    let generation = self.generation(&scope)?;
    let cached = self.storage.get::<Vec<T>>(key)?;
    let since = match &cached {
      Some(cached) if self.is_fresh(cached) => {
        tracing::debug!(key = %key.description(), "cache hit");
        return Ok(CacheResult::from_cache(cached.payload.clone(), cached.cached_at));
      }
      // An invalidated list can't be trusted as a merge base
      Some(cached) if !cached.invalidated => cached.max_updated.clone(),
      _ => None,
    };

    tracing::debug!(key = %key.description(), since = ?since, "fetching incrementally");
    let has_base = since.is_some();
    match fetcher(since).await {
      Ok(new_entities) => {
        let mut merged = match &cached {
          Some(cached) if has_base => merge(&cached.payload, new_entities),
          _ => new_entities,
        };
        merged.truncate(cap);
        self.store_if_current(key, &scope, generation, &merged)?;
        Ok(CacheResult::from_network(merged))
      }
      Err(e) => self.fallback(key, cached, e),
    }
  }

  /// Mark every cached query in the given scopes stale.
  ///
  /// The next read of any of them goes to the network.
  ///
  /// Fetches already in flight for these scopes still return their data to
  /// their callers but do not write it back.
  pub fn invalidate(&self, scopes: &[CacheScope]) -> Result<()> {
    for scope in scopes {
      {
        let mut generations = self
          .generations
          .lock()
          .map_err(|e| eyre!("Lock poisoned: {}", e))?;
        *generations.entry(scope.clone()).or_default() += 1;
      }
      let touched = self.storage.invalidate(scope)?;
      tracing::debug!(scope = %scope, touched, "invalidated");
    }
    Ok(())
  }

  /// Drop every cached payload.
  pub fn clear(&self) -> Result<()> {
    self.storage.clear()
  }

  fn generation(&self, scope: &CacheScope) -> Result<u64> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.get(scope).copied().unwrap_or_default())
  }

  /// Store `data` unless its scope was invalidated after the fetch began.
  fn store_if_current<T: Cacheable>(
    &self,
    key: &dyn QueryKey,
    scope: &CacheScope,
    started_at: u64,
    data: &T,
  ) -> Result<()> {
    if self.generation(scope)? != started_at {
      tracing::debug!(
        key = %key.description(),
        "scope invalidated during fetch, not caching"
      );
      return Ok(());
    }
    self.storage.store(key, data)
  }

  fn fallback<T>(
    &self,
    key: &dyn QueryKey,
    cached: Option<CachedQuery<T>>,
    error: color_eyre::Report,
  ) -> Result<CacheResult<T>> {
    match cached {
      Some(cached) if self.offline_fallback => {
        tracing::warn!(
          key = %key.description(),
          error = %error,
          "refresh failed, serving cached data"
        );
        Ok(CacheResult::offline(cached.payload, cached.cached_at))
      }
      _ => Err(error),
    }
  }

  async fn lock_key(&self, hash: &str) -> OwnedMutexGuard<()> {
    let slot = {
      let mut in_flight = self.in_flight.lock().await;
      Arc::clone(in_flight.entry(hash.to_string()).or_default())
    };
    slot.lock_owned().await
  }

  async fn release_key(&self, hash: &str, guard: OwnedMutexGuard<()>) {
    drop(guard);
    let mut in_flight = self.in_flight.lock().await;
    // Only the map holds the slot once nobody is waiting on it
    if in_flight
      .get(hash)
      .is_some_and(|slot| Arc::strong_count(slot) == 1)
    {
      in_flight.remove(hash);
    }
  }
}

/// Put new entities in front, replacing cached entries with the same key.
fn merge<T: Cacheable>(cached: &[T], new_entities: Vec<T>) -> Vec<T> {
  let new_keys: std::collections::HashSet<String> =
    new_entities.iter().map(|e| e.cache_key()).collect();

  let mut merged = new_entities;
  merged.extend(
    cached
      .iter()
      .filter(|e| !new_keys.contains(&e.cache_key()))
      .cloned(),
  );
  merged
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
      offline_fallback: self.offline_fallback,
      in_flight: Arc::clone(&self.in_flight),
      generations: Arc::clone(&self.generations),
    }
  }
}
