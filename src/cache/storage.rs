//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

use super::traits::{CacheScope, Cacheable, QueryKey};

/// A cached query payload.
#[derive(Debug, Clone)]
pub struct CachedQuery<T> {
  /// The cached payload
  pub payload: T,
  /// When the payload was cached
  pub cached_at: DateTime<Utc>,
  /// Maximum updated_at value for incremental fetching
  pub max_updated: Option<String>,
  /// An invalidation was recorded after this payload was stored
  pub invalidated: bool,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Store (or replace) the payload for a query, clearing any invalidation.
  fn store<T: Cacheable>(&self, key: &dyn QueryKey, payload: &T) -> Result<()>;

  /// Get the cached payload for a query.
  fn get<T: Cacheable>(&self, key: &dyn QueryKey) -> Result<Option<CachedQuery<T>>>;

  /// Mark every query in `scope` stale. Returns the number of entries touched.
  fn invalidate(&self, scope: &CacheScope) -> Result<usize>;

  /// Drop all cached payloads.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn store<T: Cacheable>(&self, _key: &dyn QueryKey, _payload: &T) -> Result<()> {
    Ok(()) // Discard
  }

  fn get<T: Cacheable>(&self, _key: &dyn QueryKey) -> Result<Option<CachedQuery<T>>> {
    Ok(None) // Always miss
  }

  fn invalidate(&self, _scope: &CacheScope) -> Result<usize> {
    Ok(0)
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Wrap a connection that already has the schema applied (see `db::open`).
  pub fn new(conn: Connection) -> Self {
    Self {
      conn: Mutex::new(conn),
    }
  }

  #[cfg(test)]
  pub fn in_memory() -> Result<Self> {
    Ok(Self::new(crate::db::open_in_memory()?))
  }
}

impl CacheStorage for SqliteStorage {
  fn store<T: Cacheable>(&self, key: &dyn QueryKey, payload: &T) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
    let max_updated = payload.updated_at();

    conn
      .execute(
        "INSERT OR REPLACE INTO query_cache
           (query_hash, scope, query_description, entity_type, payload, max_updated, cached_at, invalidated)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'), 0)",
        params![
          key.cache_hash(),
          key.scope().to_string(),
          key.description(),
          T::entity_type(),
          data,
          max_updated
        ],
      )
      .map_err(|e| eyre!("Failed to store query result: {}", e))?;

    Ok(())
  }

  fn get<T: Cacheable>(&self, key: &dyn QueryKey) -> Result<Option<CachedQuery<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String, Option<String>, bool)> = conn
      .query_row(
        "SELECT payload, cached_at, max_updated, invalidated FROM query_cache
         WHERE query_hash = ? AND entity_type = ?",
        params![key.cache_hash(), T::entity_type()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache: {}", e))?;

    let Some((data, cached_at_str, max_updated, invalidated)) = row else {
      return Ok(None);
    };

    // A payload written by an older build may not match the current shape
    let payload: T = match serde_json::from_slice(&data) {
      Ok(payload) => payload,
      Err(e) => {
        tracing::warn!(key = %key.description(), error = %e, "dropping undecodable cache entry");
        return Ok(None);
      }
    };

    Ok(Some(CachedQuery {
      payload,
      cached_at: parse_datetime(&cached_at_str)?,
      max_updated,
      invalidated,
    }))
  }

  fn invalidate(&self, scope: &CacheScope) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let touched = conn
      .execute(
        "UPDATE query_cache SET invalidated = 1 WHERE scope = ?",
        params![scope.to_string()],
      )
      .map_err(|e| eyre!("Failed to invalidate {}: {}", scope, e))?;

    Ok(touched)
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM query_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  pub struct Item {
    pub id: String,
    pub updated: Option<String>,
  }

  impl Item {
    pub fn new(id: &str, updated: Option<&str>) -> Self {
      Self {
        id: id.to_string(),
        updated: updated.map(String::from),
      }
    }
  }

  impl Cacheable for Item {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn updated_at(&self) -> Option<&str> {
      self.updated.as_deref()
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  pub struct Key {
    pub scope: CacheScope,
    pub part: String,
  }

  impl Key {
    pub fn new(kind: &'static str, id: &str, part: &str) -> Self {
      Self {
        scope: CacheScope::new(kind, id),
        part: part.to_string(),
      }
    }
  }

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      format!("{}#{}", self.scope, self.part)
    }

    fn scope(&self) -> CacheScope {
      self.scope.clone()
    }

    fn description(&self) -> String {
      self.cache_hash()
    }
  }

  #[test]
  fn test_store_and_get() {
    let storage = SqliteStorage::in_memory().unwrap();
    let key = Key::new("things", "a", "0");
    let items = vec![
      Item::new("1", Some("2024-01-01T00:00:00Z")),
      Item::new("2", Some("2024-03-01T00:00:00Z")),
    ];

    storage.store(&key, &items).unwrap();
    let cached = storage.get::<Vec<Item>>(&key).unwrap().unwrap();

    assert_eq!(cached.payload, items);
    assert_eq!(cached.max_updated.as_deref(), Some("2024-03-01T00:00:00Z"));
    assert!(!cached.invalidated);
  }

  #[test]
  fn test_miss_on_unknown_key_and_wrong_type() {
    let storage = SqliteStorage::in_memory().unwrap();
    let key = Key::new("things", "a", "0");
    assert!(storage.get::<Item>(&key).unwrap().is_none());

    storage.store(&key, &Item::new("1", None)).unwrap();
    assert!(storage.get::<Item>(&key).unwrap().is_some());

    // Same hash, different entity type
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Other;
    impl Cacheable for Other {
      fn cache_key(&self) -> String {
        String::new()
      }
      fn updated_at(&self) -> Option<&str> {
        None
      }
      fn entity_type() -> &'static str {
        "other"
      }
    }
    assert!(storage.get::<Other>(&key).unwrap().is_none());
  }

  #[test]
  fn test_invalidate_marks_whole_scope() {
    let storage = SqliteStorage::in_memory().unwrap();
    let page0 = Key::new("tracks", "p1", "0");
    let page1 = Key::new("tracks", "p1", "50");
    let other = Key::new("tracks", "p2", "0");
    for key in [&page0, &page1, &other] {
      storage.store(key, &Item::new("x", None)).unwrap();
    }

    let touched = storage.invalidate(&CacheScope::new("tracks", "p1")).unwrap();
    assert_eq!(touched, 2);

    assert!(storage.get::<Item>(&page0).unwrap().unwrap().invalidated);
    assert!(storage.get::<Item>(&page1).unwrap().unwrap().invalidated);
    assert!(!storage.get::<Item>(&other).unwrap().unwrap().invalidated);
  }

  #[test]
  fn test_store_clears_invalidation() {
    let storage = SqliteStorage::in_memory().unwrap();
    let key = Key::new("playlist", "p1", "");
    storage.store(&key, &Item::new("1", None)).unwrap();
    storage.invalidate(&key.scope).unwrap();

    storage.store(&key, &Item::new("1", None)).unwrap();
    assert!(!storage.get::<Item>(&key).unwrap().unwrap().invalidated);
  }

  #[test]
  fn test_clear() {
    let storage = SqliteStorage::in_memory().unwrap();
    let key = Key::new("playlist", "p1", "");
    storage.store(&key, &Item::new("1", None)).unwrap();

    storage.clear().unwrap();
    assert!(storage.get::<Item>(&key).unwrap().is_none());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let key = Key::new("playlist", "p1", "");
    storage.store(&key, &Item::new("1", None)).unwrap();
    assert!(storage.get::<Item>(&key).unwrap().is_none());
  }
}
