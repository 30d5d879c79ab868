//! Core traits and types for the caching system.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Trait for payloads that can be cached.
///
/// Implementors provide a unique key (used when merging incremental results)
/// and optionally an updated_at timestamp for incremental fetching.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (e.g., track id, play timestamp)
  fn cache_key(&self) -> String;

  /// Last modification timestamp (RFC 3339).
  /// Returns None if the entity doesn't track modification time.
  fn updated_at(&self) -> Option<&str>;

  /// Entity type name for storage organization (e.g., "playlist", "artist")
  fn entity_type() -> &'static str;
}

impl<T: Cacheable> Cacheable for Vec<T> {
  fn cache_key(&self) -> String {
    self.iter().map(|e| e.cache_key()).collect::<Vec<_>>().join(",")
  }

  /// Latest timestamp by instant, not by string order: precision and
  /// offsets vary between entries.
  fn updated_at(&self) -> Option<&str> {
    self
      .iter()
      .filter_map(|e| e.updated_at())
      .max_by_key(|ts| parse_timestamp(ts))
  }

  fn entity_type() -> &'static str {
    T::entity_type()
  }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(ts).ok()
}

/// The (resource kind, resource identifier) part of a cache key.
///
/// Invalidation works on scopes: every query sharing a scope (for example
/// all pages of one playlist's tracks) goes stale together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
  pub kind: &'static str,
  pub id: Option<String>,
}

impl CacheScope {
  pub fn new(kind: &'static str, id: impl Into<String>) -> Self {
    Self {
      kind,
      id: Some(id.into()),
    }
  }

  /// A scope with no identifier (e.g., the current user's playlists).
  pub fn kind(kind: &'static str) -> Self {
    Self { kind, id: None }
  }
}

impl fmt::Display for CacheScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.id {
      Some(id) => write!(f, "{}:{}", self.kind, id),
      None => f.write_str(self.kind),
    }
  }
}

/// Identity of a cached query.
pub trait QueryKey: Send + Sync {
  /// Stable, fixed-length storage key
  fn cache_hash(&self) -> String;

  /// Resource the query reads, used for invalidation
  fn scope(&self) -> CacheScope;

  /// Human readable description for logs and inspection
  fn description(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from fresh cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Refresh failed, serving stale or invalidated cached data
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;

  use crate::cache::storage::tests::Item;

  #[test]
  fn test_list_updated_at_compares_instants() {
    let items = vec![
      Item::new("a", Some("2024-05-01T12:00:00Z")),
      Item::new("b", Some("2024-05-01T12:00:00.500Z")),
      Item::new("c", Some("2024-05-01T13:59:00+02:00")),
      Item::new("d", None),
    ];
    assert_eq!(items.updated_at(), Some("2024-05-01T12:00:00.500Z"));
    assert_eq!(Vec::<Item>::new().updated_at(), None);
  }

  #[test]
  fn test_scope_display() {
    assert_eq!(CacheScope::new("playlist", "p1").to_string(), "playlist:p1");
    assert_eq!(CacheScope::kind("user_playlists").to_string(), "user_playlists");
  }
}
