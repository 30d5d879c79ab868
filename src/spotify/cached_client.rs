//! Cached Spotify client that wraps SpotifyClient with transparent caching.

use color_eyre::{Report, Result};
use std::future::Future;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::PagingConfig;

use super::cache::{Mutation, SpotifyQueryKey};
use super::client::SpotifyClient;
use super::error::SpotifyResult;
use super::retry::RetryPolicy;
use super::types::{
  Artist, Page, PlayHistory, PlayRequest, Playlist, PlaylistItem, PlaylistSummary, User,
};

/// Spotify client with transparent caching support.
///
/// Reads go through the cache layer; writes go straight to the API and, on
/// success, invalidate the cached reads they affect.
pub struct CachedSpotifyClient<S: CacheStorage> {
  inner: SpotifyClient,
  cache: CacheLayer<S>,
  paging: PagingConfig,
  /// Applied to the recently-played read only
  recent_retry: RetryPolicy,
}

impl<S: CacheStorage> CachedSpotifyClient<S> {
  pub fn new(inner: SpotifyClient, cache: CacheLayer<S>, paging: PagingConfig) -> Self {
    Self {
      inner,
      cache,
      paging,
      recent_retry: RetryPolicy::default(),
    }
  }

  pub fn with_recent_retry(mut self, policy: RetryPolicy) -> Self {
    self.recent_retry = policy;
    self
  }

  pub fn paging(&self) -> &PagingConfig {
    &self.paging
  }

  /// Get the current user's profile with caching.
  pub async fn current_user(&self) -> Result<User> {
    let query_key = SpotifyQueryKey::CurrentUser {
      account: self.inner.account(),
    };

    let result = self
      .cache
      .fetch(&query_key, || {
        let inner = self.inner.clone();
        async move { inner.current_user().await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  /// Get one page of the user's playlists with caching.
  pub async fn playlists_page(&self, offset: u32) -> Result<Page<PlaylistSummary>> {
    let limit = self.paging.playlists;
    let query_key = SpotifyQueryKey::UserPlaylists {
      account: self.inner.account(),
      offset,
      limit,
    };

    let result = self
      .cache
      .fetch(&query_key, || {
        let inner = self.inner.clone();
        async move { inner.user_playlists(offset, limit).await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  /// Get playlist details with caching.
  pub async fn playlist(&self, id: &str) -> Result<Playlist> {
    let query_key = SpotifyQueryKey::Playlist { id: id.to_string() };

    let result = self
      .cache
      .fetch(&query_key, || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.playlist(&id).await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  /// Get one page of a playlist's tracks with caching.
  pub async fn playlist_tracks_page(&self, id: &str, offset: u32) -> Result<Page<PlaylistItem>> {
    let limit = self.paging.playlist_tracks;
    let query_key = SpotifyQueryKey::PlaylistTracks {
      id: id.to_string(),
      offset,
      limit,
    };

    let result = self
      .cache
      .fetch(&query_key, || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move {
          inner
            .playlist_tracks(&id, offset, limit)
            .await
            .map_err(Report::from)
        }
      })
      .await?;

    Ok(result.data)
  }

  /// Get artist details with caching.
  pub async fn artist(&self, id: &str) -> Result<Artist> {
    let query_key = SpotifyQueryKey::Artist { id: id.to_string() };

    let result = self
      .cache
      .fetch(&query_key, || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.artist(&id).await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  /// Get the user's top artists with caching.
  pub async fn top_artists(&self) -> Result<Vec<Artist>> {
    let limit = self.paging.top_artists;
    let query_key = SpotifyQueryKey::TopArtists {
      account: self.inner.account(),
      limit,
    };

    let result = self
      .cache
      .fetch(&query_key, || {
        let inner = self.inner.clone();
        async move { inner.top_artists(limit).await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data.items)
  }

  /// Get recently played tracks with caching, incremental updates and retry.
  ///
  /// Transient failures are retried; a 403 stops immediately since the
  /// token is not going to become valid by asking again.
  pub async fn recently_played(&self) -> Result<Vec<PlayHistory>> {
    let limit = self.paging.recently_played;
    let query_key = SpotifyQueryKey::RecentlyPlayed {
      account: self.inner.account(),
      limit,
    };

    let result = self
      .cache
      .fetch_incremental(&query_key, limit as usize, |played_since| {
        let inner = self.inner.clone();
        let retry = self.recent_retry.clone();
        let after_ms = played_since.as_deref().and_then(unix_millis);

        async move {
          retry
            .run(|| inner.recently_played(limit, after_ms))
            .await
            .map_err(Report::from)
        }
      })
      .await?;

    Ok(result.data)
  }

  /// Append tracks to a playlist.
  pub async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<String> {
    let mutation = Mutation::AddTracks {
      playlist_id: playlist_id.to_string(),
    };
    self
      .mutate(mutation, self.inner.add_tracks(playlist_id, uris))
      .await
  }

  /// Remove tracks from a playlist.
  pub async fn remove_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<String> {
    let mutation = Mutation::RemoveTracks {
      playlist_id: playlist_id.to_string(),
    };
    self
      .mutate(mutation, self.inner.remove_tracks(playlist_id, uris))
      .await
  }

  pub async fn play(&self, request: &PlayRequest) -> Result<()> {
    self.mutate(Mutation::Playback, self.inner.play(request)).await
  }

  pub async fn pause(&self, device_id: Option<&str>) -> Result<()> {
    self
      .mutate(Mutation::Playback, self.inner.pause(device_id))
      .await
  }

  pub async fn next_track(&self, device_id: Option<&str>) -> Result<()> {
    self
      .mutate(Mutation::Playback, self.inner.next_track(device_id))
      .await
  }

  pub async fn previous_track(&self, device_id: Option<&str>) -> Result<()> {
    self
      .mutate(Mutation::Playback, self.inner.previous_track(device_id))
      .await
  }

  pub async fn transfer(&self, device_id: &str, play: bool) -> Result<()> {
    self
      .mutate(Mutation::Playback, self.inner.transfer(device_id, play))
      .await
  }

  /// Drop everything cached.
  pub fn clear_cache(&self) -> Result<()> {
    self.cache.clear()
  }

  /// Run a write; invalidate its scopes on success, log on failure.
  async fn mutate<T, Fut>(&self, mutation: Mutation, request: Fut) -> Result<T>
  where
    Fut: Future<Output = SpotifyResult<T>>,
  {
    match request.await {
      Ok(value) => {
        self.cache.invalidate(&mutation.invalidates())?;
        tracing::info!(mutation = %mutation, "mutation applied");
        Ok(value)
      }
      Err(e) => {
        tracing::error!(mutation = %mutation, status = ?e.status(), error = %e, "mutation failed");
        Err(e.into())
      }
    }
  }
}

/// RFC 3339 timestamp to unix milliseconds.
fn unix_millis(timestamp: &str) -> Option<i64> {
  chrono::DateTime::parse_from_rfc3339(timestamp)
    .ok()
    .map(|dt| dt.timestamp_millis())
}
