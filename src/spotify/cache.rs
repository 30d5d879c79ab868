//! Caching implementations for Spotify types.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::cache::{CacheScope, Cacheable, QueryKey};

use super::types::{Artist, Page, PlayHistory, Playlist, PlaylistItem, PlaylistSummary, User};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for User {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    None
  }

  fn entity_type() -> &'static str {
    "user"
  }
}

impl Cacheable for PlaylistSummary {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    None
  }

  fn entity_type() -> &'static str {
    "playlist_summary"
  }
}

impl Cacheable for Playlist {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    None
  }

  fn entity_type() -> &'static str {
    "playlist"
  }
}

impl Cacheable for PlaylistItem {
  fn cache_key(&self) -> String {
    self
      .track
      .as_ref()
      .map(|t| t.uri.clone())
      .unwrap_or_default()
  }

  fn updated_at(&self) -> Option<&str> {
    self.added_at.as_deref()
  }

  fn entity_type() -> &'static str {
    "playlist_item"
  }
}

impl Cacheable for Artist {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    None
  }

  fn entity_type() -> &'static str {
    "artist"
  }
}

impl Cacheable for PlayHistory {
  fn cache_key(&self) -> String {
    // The same track can be played many times
    format!("{}@{}", self.track.uri, self.played_at)
  }

  fn updated_at(&self) -> Option<&str> {
    Some(&self.played_at)
  }

  fn entity_type() -> &'static str {
    "play_history"
  }
}

impl<T: Cacheable> Cacheable for Page<T> {
  fn cache_key(&self) -> String {
    self.offset.to_string()
  }

  fn updated_at(&self) -> Option<&str> {
    None
  }

  fn entity_type() -> &'static str {
    T::entity_type()
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for Spotify API calls.
///
/// `/me` queries answer differently per account, so they carry the
/// fingerprint of the credential they were sent with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpotifyQueryKey {
  /// The logged-in user's profile
  CurrentUser { account: String },
  /// One page of the user's playlists
  UserPlaylists {
    account: String,
    offset: u32,
    limit: u32,
  },
  /// Playlist details
  Playlist { id: String },
  /// One page of a playlist's tracks
  PlaylistTracks { id: String, offset: u32, limit: u32 },
  /// Artist details
  Artist { id: String },
  /// The user's top artists
  TopArtists { account: String, limit: u32 },
  /// The user's listening history
  RecentlyPlayed { account: String, limit: u32 },
}

impl SpotifyQueryKey {
  fn canonical(&self) -> String {
    match self {
      Self::CurrentUser { account } => format!("me:{}", account),
      Self::UserPlaylists {
        account,
        offset,
        limit,
      } => format!("user_playlists:{}:{}:{}", account, offset, limit),
      Self::Playlist { id } => format!("playlist:{}", id),
      Self::PlaylistTracks { id, offset, limit } => {
        format!("playlist_tracks:{}:{}:{}", id, offset, limit)
      }
      Self::Artist { id } => format!("artist:{}", id),
      Self::TopArtists { account, limit } => format!("top_artists:{}:{}", account, limit),
      Self::RecentlyPlayed { account, limit } => {
        format!("recently_played:{}:{}", account, limit)
      }
    }
  }
}

impl QueryKey for SpotifyQueryKey {
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn scope(&self) -> CacheScope {
    match self {
      Self::CurrentUser { .. } => CacheScope::kind("user"),
      Self::UserPlaylists { .. } => CacheScope::kind("user_playlists"),
      Self::Playlist { id } => CacheScope::new("playlist", id),
      Self::PlaylistTracks { id, .. } => CacheScope::new("playlist_tracks", id),
      Self::Artist { id } => CacheScope::new("artist", id),
      Self::TopArtists { .. } => CacheScope::kind("top_artists"),
      Self::RecentlyPlayed { .. } => CacheScope::kind("recently_played"),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::CurrentUser { .. } => "current user".to_string(),
      Self::UserPlaylists { offset, .. } => format!("my playlists from {}", offset),
      Self::Playlist { id } => format!("playlist {}", id),
      Self::PlaylistTracks { id, offset, .. } => format!("playlist {} tracks from {}", id, offset),
      Self::Artist { id } => format!("artist {}", id),
      Self::TopArtists { .. } => "top artists".to_string(),
      Self::RecentlyPlayed { .. } => "recently played".to_string(),
    }
  }
}

// ============================================================================
// Mutations
// ============================================================================

/// Write operations and the cached reads they make stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
  AddTracks { playlist_id: String },
  RemoveTracks { playlist_id: String },
  /// Play, pause, skip, transfer
  Playback,
}

impl Mutation {
  /// Scopes that must be re-fetched after this mutation succeeds.
  pub fn invalidates(&self) -> Vec<CacheScope> {
    match self {
      Self::AddTracks { playlist_id } | Self::RemoveTracks { playlist_id } => vec![
        CacheScope::new("playlist_tracks", playlist_id),
        CacheScope::new("playlist", playlist_id),
      ],
      Self::Playback => Vec::new(),
    }
  }
}

impl fmt::Display for Mutation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AddTracks { playlist_id } => write!(f, "add tracks to {}", playlist_id),
      Self::RemoveTracks { playlist_id } => write!(f, "remove tracks from {}", playlist_id),
      Self::Playback => f.write_str("playback"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pages_share_a_scope_but_not_a_hash() {
    let first = SpotifyQueryKey::PlaylistTracks {
      id: "p1".into(),
      offset: 0,
      limit: 50,
    };
    let second = SpotifyQueryKey::PlaylistTracks {
      id: "p1".into(),
      offset: 50,
      limit: 50,
    };

    assert_eq!(first.scope(), second.scope());
    assert_ne!(first.cache_hash(), second.cache_hash());
    assert_eq!(first.cache_hash().len(), 64);
  }

  #[test]
  fn test_me_queries_differ_per_account() {
    let alice = SpotifyQueryKey::CurrentUser {
      account: "aaaa".into(),
    };
    let bob = SpotifyQueryKey::CurrentUser {
      account: "bbbb".into(),
    };
    assert_ne!(alice.cache_hash(), bob.cache_hash());

    let alice_recent = SpotifyQueryKey::RecentlyPlayed {
      account: "aaaa".into(),
      limit: 50,
    };
    let bob_recent = SpotifyQueryKey::RecentlyPlayed {
      account: "bbbb".into(),
      limit: 50,
    };
    assert_ne!(alice_recent.cache_hash(), bob_recent.cache_hash());
  }

  #[test]
  fn test_details_and_tracks_have_distinct_scopes() {
    let details = SpotifyQueryKey::Playlist { id: "p1".into() };
    let tracks = SpotifyQueryKey::PlaylistTracks {
      id: "p1".into(),
      offset: 0,
      limit: 50,
    };
    assert_ne!(details.scope(), tracks.scope());
  }

  #[test]
  fn test_remove_tracks_invalidates_tracks_and_details() {
    let mutation = Mutation::RemoveTracks {
      playlist_id: "p1".into(),
    };
    let scopes = mutation.invalidates();

    assert!(scopes.contains(&SpotifyQueryKey::Playlist { id: "p1".into() }.scope()));
    assert!(scopes.contains(
      &SpotifyQueryKey::PlaylistTracks {
        id: "p1".into(),
        offset: 100,
        limit: 50
      }
      .scope()
    ));
    assert!(!scopes.contains(&SpotifyQueryKey::Playlist { id: "p2".into() }.scope()));
  }

  #[test]
  fn test_playback_invalidates_nothing() {
    assert!(Mutation::Playback.invalidates().is_empty());
  }
}
