use color_eyre::{eyre::eyre, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::config::SpotifyConfig;
use crate::spotify::api_types::{
  ApiArtist, ApiCursorPaging, ApiErrorBody, ApiPaging, ApiPlayBody, ApiPlayHistory, ApiPlaylist,
  ApiPlaylistItem, ApiRemoveTracks, ApiSnapshot, ApiTrackRef, ApiTrackUris, ApiTransferBody,
  ApiUser,
};
use crate::spotify::error::{SpotifyError, SpotifyResult};
use crate::spotify::types::{
  Artist, Page, PlayHistory, PlayRequest, Playlist, PlaylistItem, PlaylistSummary, User,
};

const USER_AGENT: &str = concat!("sp9s/", env!("CARGO_PKG_VERSION"));

/// Spotify Web API client wrapper
#[derive(Clone)]
pub struct SpotifyClient {
  http: reqwest::Client,
  base_url: String,
  token: Option<String>,
}

impl SpotifyClient {
  pub fn new(config: &SpotifyConfig, token: Option<String>) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self::with_http(http, &config.api_url, token))
  }

  pub fn with_http(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
    Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      token,
    }
  }

  /// The bearer credential, or a precondition failure when there is none.
  fn credential(&self) -> SpotifyResult<&str> {
    self
      .token
      .as_deref()
      .filter(|t| !t.trim().is_empty())
      .ok_or(SpotifyError::MissingCredential)
  }

  /// Short digest of the credential, used to keep one account's cached
  /// `/me` responses away from another's.
  pub fn account(&self) -> String {
    match self.credential() {
      Ok(token) => hex::encode(&Sha256::digest(token.as_bytes())[..8]),
      Err(_) => "anonymous".to_string(),
    }
  }

  fn request(&self, method: Method, path: &str) -> SpotifyResult<RequestBuilder> {
    let token = self.credential()?;
    Ok(
      self
        .http
        .request(method, format!("{}{}", self.base_url, path))
        .bearer_auth(token),
    )
  }

  async fn send(&self, request: RequestBuilder) -> SpotifyResult<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let retry_after = response
      .headers()
      .get(RETRY_AFTER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.parse().ok());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
      .map(|b| b.error.message)
      .unwrap_or(body);

    Err(match status {
      StatusCode::UNAUTHORIZED => SpotifyError::Unauthorized,
      StatusCode::FORBIDDEN => SpotifyError::Forbidden(message),
      StatusCode::TOO_MANY_REQUESTS => SpotifyError::RateLimited { retry_after },
      _ => SpotifyError::Status {
        status: status.as_u16(),
        message,
      },
    })
  }

  async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> SpotifyResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|source| SpotifyError::Decode {
      endpoint: path.to_string(),
      source,
    })
  }

  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SpotifyResult<T> {
    let request = self.request(Method::GET, path)?.query(query);
    let response = self.send(request).await?;
    Self::decode(path, response).await
  }

  /// Get the current user's profile
  pub async fn current_user(&self) -> SpotifyResult<User> {
    let user: ApiUser = self.get("/me", &[]).await?;
    Ok(user.into())
  }

  /// Get one page of the current user's playlists
  pub async fn user_playlists(&self, offset: u32, limit: u32) -> SpotifyResult<Page<PlaylistSummary>> {
    let paging: ApiPaging<ApiPlaylist> = self
      .get(
        "/me/playlists",
        &[("offset", offset.to_string()), ("limit", limit.to_string())],
      )
      .await?;

    Ok(paging.into_page(ApiPlaylist::into_summary))
  }

  /// Get playlist details
  pub async fn playlist(&self, id: &str) -> SpotifyResult<Playlist> {
    let playlist: ApiPlaylist = self.get(&format!("/playlists/{}", id), &[]).await?;
    Ok(playlist.into_full())
  }

  /// Get one page of a playlist's tracks
  pub async fn playlist_tracks(
    &self,
    id: &str,
    offset: u32,
    limit: u32,
  ) -> SpotifyResult<Page<PlaylistItem>> {
    let paging: ApiPaging<ApiPlaylistItem> = self
      .get(
        &format!("/playlists/{}/tracks", id),
        &[("offset", offset.to_string()), ("limit", limit.to_string())],
      )
      .await?;

    Ok(paging.into_page(PlaylistItem::from))
  }

  /// Get artist details
  pub async fn artist(&self, id: &str) -> SpotifyResult<Artist> {
    let artist: ApiArtist = self.get(&format!("/artists/{}", id), &[]).await?;
    Ok(artist.into())
  }

  /// Get the current user's top artists
  pub async fn top_artists(&self, limit: u32) -> SpotifyResult<Page<Artist>> {
    let paging: ApiPaging<ApiArtist> = self
      .get("/me/top/artists", &[("limit", limit.to_string())])
      .await?;

    Ok(paging.into_page(Artist::from))
  }

  /// Get recently played tracks, newest first.
  ///
  /// `after_ms` restricts the result to plays after that unix timestamp.
  pub async fn recently_played(
    &self,
    limit: u32,
    after_ms: Option<i64>,
  ) -> SpotifyResult<Vec<PlayHistory>> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(after) = after_ms {
      query.push(("after", after.to_string()));
    }

    let paging: ApiCursorPaging<ApiPlayHistory> =
      self.get("/me/player/recently-played", &query).await?;

    Ok(paging.items.into_iter().map(PlayHistory::from).collect())
  }

  /// Append tracks to a playlist, returning the new snapshot id
  pub async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> SpotifyResult<String> {
    let path = format!("/playlists/{}/tracks", playlist_id);
    let request = self
      .request(Method::POST, &path)?
      .json(&ApiTrackUris { uris });

    let response = self.send(request).await?;
    let snapshot: ApiSnapshot = Self::decode(&path, response).await?;
    Ok(snapshot.snapshot_id)
  }

  /// Remove every occurrence of the tracks from a playlist, returning the new snapshot id
  pub async fn remove_tracks(&self, playlist_id: &str, uris: &[String]) -> SpotifyResult<String> {
    let path = format!("/playlists/{}/tracks", playlist_id);
    let body = ApiRemoveTracks {
      tracks: uris.iter().map(|uri| ApiTrackRef { uri }).collect(),
    };
    let request = self.request(Method::DELETE, &path)?.json(&body);

    let response = self.send(request).await?;
    let snapshot: ApiSnapshot = Self::decode(&path, response).await?;
    Ok(snapshot.snapshot_id)
  }

  /// Start or resume playback
  pub async fn play(&self, play: &PlayRequest) -> SpotifyResult<()> {
    let body = ApiPlayBody {
      context_uri: play.context_uri.as_deref(),
      uris: &play.uris,
    };
    let request = self
      .request(Method::PUT, "/me/player/play")?
      .query(&device_query(play.device_id.as_deref()))
      .json(&body);

    self.send(request).await?;
    Ok(())
  }

  pub async fn pause(&self, device_id: Option<&str>) -> SpotifyResult<()> {
    self
      .player_command(Method::PUT, "/me/player/pause", device_id)
      .await
  }

  pub async fn next_track(&self, device_id: Option<&str>) -> SpotifyResult<()> {
    self
      .player_command(Method::POST, "/me/player/next", device_id)
      .await
  }

  pub async fn previous_track(&self, device_id: Option<&str>) -> SpotifyResult<()> {
    self
      .player_command(Method::POST, "/me/player/previous", device_id)
      .await
  }

  /// Move playback to another device (e.g., a Web Playback SDK player)
  pub async fn transfer(&self, device_id: &str, play: bool) -> SpotifyResult<()> {
    let body = ApiTransferBody {
      device_ids: [device_id],
      play,
    };
    let request = self.request(Method::PUT, "/me/player")?.json(&body);

    self.send(request).await?;
    Ok(())
  }

  async fn player_command(
    &self,
    method: Method,
    path: &str,
    device_id: Option<&str>,
  ) -> SpotifyResult<()> {
    let request = self
      .request(method, path)?
      .query(&device_query(device_id))
      // Spotify rejects bodiless PUT/POST without a length
      .header(reqwest::header::CONTENT_LENGTH, 0);

    self.send(request).await?;
    Ok(())
  }
}

fn device_query(device_id: Option<&str>) -> Vec<(&'static str, String)> {
  device_id
    .map(|id| vec![("device_id", id.to_string())])
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::{Matcher, Server, ServerGuard};
  use serde_json::json;

  fn client(server: &ServerGuard, token: Option<&str>) -> SpotifyClient {
    SpotifyClient::with_http(
      reqwest::Client::new(),
      &server.url(),
      token.map(String::from),
    )
  }

  #[test]
  fn test_account_fingerprint() {
    let server_url = "http://localhost:1";
    let a = SpotifyClient::with_http(reqwest::Client::new(), server_url, Some("tok-a".into()));
    let b = SpotifyClient::with_http(reqwest::Client::new(), server_url, Some("tok-b".into()));
    let none = SpotifyClient::with_http(reqwest::Client::new(), server_url, None);

    assert_eq!(a.account(), a.clone().account());
    assert_eq!(a.account().len(), 16);
    assert_ne!(a.account(), b.account());
    assert!(!a.account().contains("tok-a"));
    assert_eq!(none.account(), "anonymous");
  }

  #[tokio::test]
  async fn test_current_user_sends_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/me")
      .match_header("authorization", "Bearer tok")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(json!({ "id": "u1", "display_name": "Ada", "followers": { "total": 4 } }).to_string())
      .create_async()
      .await;

    let user = client(&server, Some("tok")).current_user().await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.name(), "Ada");
    assert_eq!(user.followers, 4);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_missing_credential_sends_nothing() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("DELETE", Matcher::Any)
      .expect(0)
      .create_async()
      .await;

    for token in [None, Some("  ")] {
      let err = client(&server, token)
        .remove_tracks("p1", &["spotify:track:t1".to_string()])
        .await
        .unwrap_err();
      assert!(matches!(err, SpotifyError::MissingCredential));
    }
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_playlist_tracks_passes_paging_params() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/playlists/p1/tracks")
      .match_query(Matcher::AllOf(vec![
        Matcher::UrlEncoded("offset".into(), "50".into()),
        Matcher::UrlEncoded("limit".into(), "50".into()),
      ]))
      .with_status(200)
      .with_body(
        json!({ "items": [], "offset": 50, "limit": 50, "total": 50, "next": null }).to_string(),
      )
      .create_async()
      .await;

    let page = client(&server, Some("tok"))
      .playlist_tracks("p1", 50, 50)
      .await
      .unwrap();
    assert!(!page.has_more());
    assert_eq!(page.offset, 50);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_error_statuses_are_classified() {
    let mut server = Server::new_async().await;
    server
      .mock("GET", "/artists/forbidden")
      .with_status(403)
      .with_body(json!({ "error": { "status": 403, "message": "Insufficient client scope" } }).to_string())
      .create_async()
      .await;
    server
      .mock("GET", "/artists/limited")
      .with_status(429)
      .with_header("retry-after", "7")
      .create_async()
      .await;
    server
      .mock("GET", "/artists/broken")
      .with_status(502)
      .with_body("bad gateway")
      .create_async()
      .await;

    let client = client(&server, Some("tok"));

    match client.artist("forbidden").await.unwrap_err() {
      SpotifyError::Forbidden(message) => assert_eq!(message, "Insufficient client scope"),
      other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
      client.artist("limited").await.unwrap_err(),
      SpotifyError::RateLimited {
        retry_after: Some(7)
      }
    ));
    match client.artist("broken").await.unwrap_err() {
      SpotifyError::Status { status, message } => {
        assert_eq!(status, 502);
        assert_eq!(message, "bad gateway");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_malformed_body_is_a_decode_error() {
    let mut server = Server::new_async().await;
    server
      .mock("GET", "/artists/a1")
      .with_status(200)
      .with_body("{\"id\": 42")
      .create_async()
      .await;

    let err = client(&server, Some("tok")).artist("a1").await.unwrap_err();
    assert!(matches!(err, SpotifyError::Decode { .. }));
  }

  #[tokio::test]
  async fn test_remove_tracks_sends_track_objects() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("DELETE", "/playlists/p1/tracks")
      .match_body(Matcher::Json(json!({
        "tracks": [{ "uri": "spotify:track:t1" }, { "uri": "spotify:track:t2" }]
      })))
      .with_status(200)
      .with_body(json!({ "snapshot_id": "snap2" }).to_string())
      .create_async()
      .await;

    let snapshot = client(&server, Some("tok"))
      .remove_tracks(
        "p1",
        &["spotify:track:t1".to_string(), "spotify:track:t2".to_string()],
      )
      .await
      .unwrap();
    assert_eq!(snapshot, "snap2");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_recently_played_after_cursor() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/me/player/recently-played")
      .match_query(Matcher::AllOf(vec![
        Matcher::UrlEncoded("limit".into(), "10".into()),
        Matcher::UrlEncoded("after".into(), "1700000000000".into()),
      ]))
      .with_status(200)
      .with_body(
        json!({
          "items": [{
            "track": { "id": "t1", "uri": "spotify:track:t1", "name": "One", "artists": [], "duration_ms": 1000 },
            "played_at": "2024-05-01T12:00:00.000Z",
            "context": { "uri": "spotify:playlist:p1" }
          }],
          "next": null,
          "cursors": { "after": "1714564800000", "before": "1714564800000" }
        })
        .to_string(),
      )
      .create_async()
      .await;

    let plays = client(&server, Some("tok"))
      .recently_played(10, Some(1_700_000_000_000))
      .await
      .unwrap();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].context_uri.as_deref(), Some("spotify:playlist:p1"));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_play_targets_device() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("PUT", "/me/player/play")
      .match_query(Matcher::UrlEncoded("device_id".into(), "web-player".into()))
      .match_body(Matcher::Json(json!({ "uris": ["spotify:track:t1"] })))
      .with_status(204)
      .create_async()
      .await;

    let request = PlayRequest {
      context_uri: None,
      uris: vec!["spotify:track:t1".to_string()],
      device_id: Some("web-player".to_string()),
    };
    client(&server, Some("tok")).play(&request).await.unwrap();
    mock.assert_async().await;
  }
}
