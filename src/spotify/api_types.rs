//! Serde-deserializable types matching Spotify Web API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::{Deserialize, Serialize};

use super::types::{
  Artist, Page, PlayHistory, Playlist, PlaylistItem, PlaylistSummary, Track, User,
};

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiImage {
  pub url: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiFollowers {
  #[serde(default)]
  pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiOwner {
  pub id: String,
  pub display_name: Option<String>,
}

impl ApiOwner {
  fn into_name(self) -> String {
    self.display_name.unwrap_or(self.id)
  }
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiTracksRef {
  #[serde(default)]
  pub total: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiArtistRef {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiAlbumRef {
  pub name: String,
}

fn first_image(images: Option<Vec<ApiImage>>) -> Option<String> {
  images.and_then(|imgs| imgs.into_iter().next()).map(|i| i.url)
}

// ============================================================================
// Paging objects
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPaging<T> {
  #[serde(default = "Vec::new")]
  pub items: Vec<T>,
  #[serde(default)]
  pub offset: u32,
  #[serde(default)]
  pub limit: u32,
  #[serde(default)]
  pub total: u32,
  pub next: Option<String>,
}

impl<T> ApiPaging<T> {
  pub fn into_page<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.items.into_iter().map(f).collect(),
      offset: self.offset,
      limit: self.limit,
      total: self.total,
      next: self.next,
    }
  }
}

/// Cursor-paged response (recently played)
#[derive(Debug, Deserialize)]
pub struct ApiCursorPaging<T> {
  #[serde(default = "Vec::new")]
  pub items: Vec<T>,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: String,
  pub display_name: Option<String>,
  pub email: Option<String>,
  pub country: Option<String>,
  pub product: Option<String>,
  #[serde(default)]
  pub followers: Option<ApiFollowers>,
}

impl From<ApiUser> for User {
  fn from(u: ApiUser) -> Self {
    User {
      id: u.id,
      display_name: u.display_name,
      email: u.email,
      country: u.country,
      product: u.product,
      followers: u.followers.unwrap_or_default().total,
    }
  }
}

// ============================================================================
// Playlists
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPlaylist {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub owner: ApiOwner,
  pub public: Option<bool>,
  #[serde(default)]
  pub collaborative: bool,
  #[serde(default)]
  pub snapshot_id: String,
  #[serde(default)]
  pub tracks: Option<ApiTracksRef>,
  pub followers: Option<ApiFollowers>,
  pub images: Option<Vec<ApiImage>>,
}

impl ApiPlaylist {
  pub fn into_summary(self) -> PlaylistSummary {
    PlaylistSummary {
      id: self.id,
      name: self.name,
      owner: self.owner.into_name(),
      track_count: self.tracks.unwrap_or_default().total,
      public: self.public,
      snapshot_id: self.snapshot_id,
    }
  }

  pub fn into_full(self) -> Playlist {
    Playlist {
      id: self.id,
      name: self.name,
      description: self.description.filter(|d| !d.is_empty()),
      owner: self.owner.into_name(),
      followers: self.followers.unwrap_or_default().total,
      track_count: self.tracks.unwrap_or_default().total,
      public: self.public,
      collaborative: self.collaborative,
      snapshot_id: self.snapshot_id,
      image_url: first_image(self.images),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiPlaylistItem {
  pub added_at: Option<String>,
  /// Null for removed tracks; episodes deserialize here too
  pub track: Option<ApiTrack>,
}

impl From<ApiPlaylistItem> for PlaylistItem {
  fn from(item: ApiPlaylistItem) -> Self {
    PlaylistItem {
      added_at: item.added_at,
      track: item.track.map(Track::from),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiTrackUris<'a> {
  pub uris: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct ApiTrackRef<'a> {
  pub uri: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiRemoveTracks<'a> {
  pub tracks: Vec<ApiTrackRef<'a>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSnapshot {
  pub snapshot_id: String,
}

// ============================================================================
// Tracks and artists
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTrack {
  pub id: Option<String>,
  pub uri: String,
  pub name: String,
  #[serde(default)]
  pub artists: Vec<ApiArtistRef>,
  pub album: Option<ApiAlbumRef>,
  #[serde(default)]
  pub duration_ms: u64,
  #[serde(default)]
  pub explicit: bool,
}

impl From<ApiTrack> for Track {
  fn from(t: ApiTrack) -> Self {
    Track {
      id: t.id,
      uri: t.uri,
      name: t.name,
      artists: t.artists.into_iter().map(|a| a.name).collect(),
      album: t.album.map(|a| a.name),
      duration_ms: t.duration_ms,
      explicit: t.explicit,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiArtist {
  pub id: String,
  pub name: String,
  pub uri: String,
  #[serde(default)]
  pub genres: Vec<String>,
  pub popularity: Option<u32>,
  pub followers: Option<ApiFollowers>,
  pub images: Option<Vec<ApiImage>>,
}

impl From<ApiArtist> for Artist {
  fn from(a: ApiArtist) -> Self {
    Artist {
      id: a.id,
      name: a.name,
      uri: a.uri,
      genres: a.genres,
      popularity: a.popularity,
      followers: a.followers.unwrap_or_default().total,
      image_url: first_image(a.images),
    }
  }
}

// ============================================================================
// Player
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiContext {
  pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPlayHistory {
  pub track: ApiTrack,
  pub played_at: String,
  pub context: Option<ApiContext>,
}

impl From<ApiPlayHistory> for PlayHistory {
  fn from(p: ApiPlayHistory) -> Self {
    PlayHistory {
      track: p.track.into(),
      played_at: p.played_at,
      context_uri: p.context.map(|c| c.uri),
    }
  }
}

#[derive(Debug, Serialize, Default)]
pub struct ApiPlayBody<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub context_uri: Option<&'a str>,
  #[serde(skip_serializing_if = "no_uris")]
  pub uris: &'a [String],
}

fn no_uris(uris: &&[String]) -> bool {
  uris.is_empty()
}

#[derive(Debug, Serialize)]
pub struct ApiTransferBody<'a> {
  pub device_ids: [&'a str; 1],
  pub play: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub error: ApiErrorDetail,
}
