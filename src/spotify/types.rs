use serde::{Deserialize, Serialize};

/// One page of an offset-paged collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub offset: u32,
  pub limit: u32,
  pub total: u32,
  /// Continuation marker; absent on the last page
  pub next: Option<String>,
}

impl<T> Page<T> {
  pub fn has_more(&self) -> bool {
    self.next.is_some()
  }
}

/// The logged-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub display_name: Option<String>,
  pub email: Option<String>,
  pub country: Option<String>,
  pub product: Option<String>,
  pub followers: u64,
}

impl User {
  pub fn name(&self) -> &str {
    self.display_name.as_deref().unwrap_or(&self.id)
  }
}

/// Playlist entry in the user's playlist list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSummary {
  pub id: String,
  pub name: String,
  pub owner: String,
  pub track_count: u32,
  pub public: Option<bool>,
  pub snapshot_id: String,
}

/// Full playlist details (without the tracks themselves)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub owner: String,
  pub followers: u64,
  pub track_count: u32,
  pub public: Option<bool>,
  pub collaborative: bool,
  pub snapshot_id: String,
  pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
  /// None for local files
  pub id: Option<String>,
  pub uri: String,
  pub name: String,
  pub artists: Vec<String>,
  pub album: Option<String>,
  pub duration_ms: u64,
  pub explicit: bool,
}

impl Track {
  pub fn artist_line(&self) -> String {
    self.artists.join(", ")
  }

  /// Duration as m:ss
  pub fn duration(&self) -> String {
    let secs = self.duration_ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
  }
}

/// A playlist position; the track is None when it is no longer available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
  pub added_at: Option<String>,
  pub track: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
  pub id: String,
  pub name: String,
  pub uri: String,
  pub genres: Vec<String>,
  pub popularity: Option<u32>,
  pub followers: u64,
  pub image_url: Option<String>,
}

/// A play from the user's listening history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayHistory {
  pub track: Track,
  /// RFC 3339 timestamp
  pub played_at: String,
  pub context_uri: Option<String>,
}

/// What to start playing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayRequest {
  /// Album, artist or playlist URI
  pub context_uri: Option<String>,
  /// Explicit track URIs (ignored by Spotify when a context is given)
  pub uris: Vec<String>,
  /// Device to play on (defaults to the active device)
  pub device_id: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_track_duration_format() {
    let track = Track {
      id: Some("t1".into()),
      uri: "spotify:track:t1".into(),
      name: "Song".into(),
      artists: vec!["A".into(), "B".into()],
      album: None,
      duration_ms: 185_432,
      explicit: false,
    };
    assert_eq!(track.duration(), "3:05");
    assert_eq!(track.artist_line(), "A, B");
  }

  #[test]
  fn test_page_has_more_follows_next() {
    let mut page = Page::<u32> {
      items: vec![1],
      offset: 0,
      limit: 1,
      total: 2,
      next: Some("https://api.spotify.com/v1/me/playlists?offset=1&limit=1".into()),
    };
    assert!(page.has_more());
    page.next = None;
    assert!(!page.has_more());
  }
}
