use crate::auth::{self, AuthClient, Navigation};
use crate::cache::{CacheLayer, CacheStorage};
use crate::commands::{CacheAction, Command};
use crate::config::Config;
use crate::featured::featured_artist;
use crate::query::InfiniteQuery;
use crate::session::{SessionStore, ACCESS_TOKEN};
use crate::spotify::types::{PlayRequest, PlaylistItem};
use crate::spotify::{CachedSpotifyClient, SpotifyClient};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use url::Url;

/// Main application state
pub struct App<S: CacheStorage> {
  /// Application configuration
  config: Config,

  /// Cached Spotify client
  spotify: CachedSpotifyClient<S>,

  /// Token backend client
  auth: AuthClient,

  /// Access token and featured artist slots
  session: Box<dyn SessionStore>,
}

impl<S: CacheStorage> App<S> {
  pub fn new(config: Config, storage: S, session: Box<dyn SessionStore>) -> Result<Self> {
    // Environment wins over the stored session
    let token = match Config::env_token() {
      Some(token) => Some(token),
      None => session.get(ACCESS_TOKEN)?,
    };

    let cache = CacheLayer::new(storage)
      .with_stale_time(config.stale_time())
      .with_offline_fallback(config.cache.offline);
    let client = SpotifyClient::new(&config.spotify, token)?;
    let spotify = CachedSpotifyClient::new(client, cache, config.paging);
    let auth = AuthClient::new(&config.spotify)?;

    Ok(Self {
      config,
      spotify,
      auth,
      session,
    })
  }

  /// Run one command, writing its output to `out`.
  pub async fn run<W: Write>(&self, command: Command, out: &mut W) -> Result<()> {
    tracing::debug!(?command, "running command");

    match command {
      Command::Login => {
        let url = auth::authorize_url(&self.config.spotify)?;
        writeln!(out, "Open this URL to log in:\n\n  {}\n", url)?;
        writeln!(out, "Then run `sp9s callback <redirect url>`.")?;
      }
      Command::Callback { url } => {
        let redirect = Url::parse(&url).map_err(|e| eyre!("Invalid redirect URL: {}", e))?;
        match auth::handle_callback(&redirect, &self.auth, self.session.as_ref()).await? {
          Navigation::Home => writeln!(out, "Logged in.")?,
          Navigation::Login => writeln!(out, "Not logged in. Run `sp9s login` to try again.")?,
        }
      }
      Command::Logout => {
        self.session.clear()?;
        self.spotify.clear_cache()?;
        writeln!(out, "Logged out.")?;
      }
      Command::Me => {
        let user = self.spotify.current_user().await?;
        writeln!(out, "{} ({})", user.name(), user.id)?;
        if let Some(email) = &user.email {
          writeln!(out, "  email:     {}", email)?;
        }
        if let Some(product) = &user.product {
          writeln!(out, "  plan:      {}", product)?;
        }
        writeln!(out, "  followers: {}", user.followers)?;
      }
      Command::Playlists { all } => {
        let mut query = InfiniteQuery::new(self.spotify.paging().playlists);
        if all {
          query
            .fetch_all(|offset| self.spotify.playlists_page(offset))
            .await?;
        } else {
          query
            .fetch_next_page(|offset| self.spotify.playlists_page(offset))
            .await?;
        }

        for playlist in query.items() {
          writeln!(
            out,
            "{:<24} {:<40} {:>5} tracks  by {}",
            playlist.id, playlist.name, playlist.track_count, playlist.owner
          )?;
        }
        write_more_hint(out, &query)?;
      }
      Command::Playlist { id } => {
        let (playlist, tracks) = futures::try_join!(
          self.spotify.playlist(&id),
          self.spotify.playlist_tracks_page(&id, 0)
        )?;

        writeln!(out, "{} by {}", playlist.name, playlist.owner)?;
        if let Some(description) = &playlist.description {
          writeln!(out, "{}", description)?;
        }
        writeln!(
          out,
          "{} tracks, {} followers\n",
          playlist.track_count, playlist.followers
        )?;
        for (i, item) in tracks.items.iter().enumerate() {
          write_item(out, tracks.offset + i as u32, item)?;
        }
        if tracks.has_more() {
          writeln!(
            out,
            "\n... more with `sp9s tracks {} --offset {}`",
            id,
            tracks.offset + self.spotify.paging().playlist_tracks
          )?;
        }
      }
      Command::Tracks { id, offset, all } => {
        let mut query = InfiniteQuery::starting_at(offset, self.spotify.paging().playlist_tracks);
        if all {
          query
            .fetch_all(|o| self.spotify.playlist_tracks_page(&id, o))
            .await?;
        } else {
          query
            .fetch_next_page(|o| self.spotify.playlist_tracks_page(&id, o))
            .await?;
        }

        for page in query.pages() {
          for (i, item) in page.items.iter().enumerate() {
            write_item(out, page.offset + i as u32, item)?;
          }
        }
        write_more_hint(out, &query)?;
      }
      Command::Artist { id } => {
        let artist = self.spotify.artist(&id).await?;
        writeln!(out, "{} ({})", artist.name, artist.uri)?;
        if !artist.genres.is_empty() {
          writeln!(out, "  genres:     {}", artist.genres.join(", "))?;
        }
        if let Some(popularity) = artist.popularity {
          writeln!(out, "  popularity: {}", popularity)?;
        }
        writeln!(out, "  followers:  {}", artist.followers)?;
      }
      Command::Featured => {
        let user = self.spotify.current_user().await?;
        let featured = featured_artist(&user.id, self.session.as_ref(), || {
          self.spotify.top_artists()
        })
        .await?;

        match featured {
          Some(artist) => writeln!(out, "Featured artist: {} ({})", artist.name, artist.uri)?,
          None => writeln!(out, "No top artists yet. Listen to some music first.")?,
        }
      }
      Command::Recent => {
        for play in self.spotify.recently_played().await? {
          writeln!(
            out,
            "{}  {} - {}",
            play.played_at,
            play.track.artist_line(),
            play.track.name
          )?;
        }
      }
      Command::Add { playlist, uris } => {
        let snapshot = self.spotify.add_tracks(&playlist, &uris).await?;
        writeln!(out, "Added {} track(s) (snapshot {}).", uris.len(), snapshot)?;
      }
      Command::Remove { playlist, uris } => {
        let snapshot = self.spotify.remove_tracks(&playlist, &uris).await?;
        writeln!(out, "Removed {} track(s) (snapshot {}).", uris.len(), snapshot)?;
      }
      Command::Play {
        context,
        device,
        uris,
      } => {
        let request = PlayRequest {
          context_uri: context,
          uris,
          device_id: device,
        };
        self.spotify.play(&request).await?;
        writeln!(out, "Playing.")?;
      }
      Command::Pause { device } => {
        self.spotify.pause(device.as_deref()).await?;
        writeln!(out, "Paused.")?;
      }
      Command::Next { device } => {
        self.spotify.next_track(device.as_deref()).await?;
      }
      Command::Previous { device } => {
        self.spotify.previous_track(device.as_deref()).await?;
      }
      Command::Transfer { device, play } => {
        self.spotify.transfer(&device, play).await?;
        writeln!(out, "Playback moved to {}.", device)?;
      }
      Command::Cache {
        action: CacheAction::Clear,
      } => {
        self.spotify.clear_cache()?;
        writeln!(out, "Cache cleared.")?;
      }
    }

    Ok(())
  }
}

fn write_item<W: Write>(out: &mut W, position: u32, item: &PlaylistItem) -> Result<()> {
  match &item.track {
    Some(track) => writeln!(
      out,
      "{:>4}. {} - {} [{}]",
      position + 1,
      track.artist_line(),
      track.name,
      track.duration()
    )?,
    None => writeln!(out, "{:>4}. (unavailable)", position + 1)?,
  }
  Ok(())
}

fn write_more_hint<W: Write, T>(out: &mut W, query: &InfiniteQuery<T>) -> Result<()> {
  if let Some(next) = query.next_page_param() {
    let total = query.total().unwrap_or_default();
    writeln!(out, "\n... {} total, next page at offset {}", total, next)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::session::MemorySession;
  use mockito::{Server, ServerGuard};

  fn config(server: &ServerGuard) -> Config {
    serde_yaml::from_str(&format!(
      r#"
spotify:
  client_id: abc123
  redirect_uri: http://localhost:8888/callback
  auth_backend_url: {url}
  api_url: {url}
"#,
      url = server.url()
    ))
    .unwrap()
  }

  fn app(server: &ServerGuard, session: MemorySession) -> App<SqliteStorage> {
    App::new(
      config(server),
      SqliteStorage::in_memory().unwrap(),
      Box::new(session),
    )
    .unwrap()
  }

  async fn run(app: &App<SqliteStorage>, command: Command) -> String {
    let mut out = Vec::new();
    app.run(command, &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
  }

  #[tokio::test]
  async fn test_featured_artist_is_stable() {
    let mut server = Server::new_async().await;
    server
      .mock("GET", "/me")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"id":"u1","display_name":"Listener"}"#)
      .create_async()
      .await;
    server
      .mock("GET", "/me/top/artists")
      .match_query(mockito::Matcher::Any)
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        r#"{"items":[
          {"id":"a1","name":"First","uri":"spotify:artist:a1"},
          {"id":"a2","name":"Second","uri":"spotify:artist:a2"},
          {"id":"a3","name":"Third","uri":"spotify:artist:a3"}
        ],"offset":0,"limit":20,"total":3,"next":null}"#,
      )
      .create_async()
      .await;

    let session = MemorySession::new();
    session.set(ACCESS_TOKEN, "tok").unwrap();
    let app = app(&server, session);

    let first = run(&app, Command::Featured).await;
    assert!(first.starts_with("Featured artist: "));
    for _ in 0..5 {
      assert_eq!(run(&app, Command::Featured).await, first);
    }
  }

  #[tokio::test]
  async fn test_callback_without_code_asks_for_login() {
    let server = Server::new_async().await;
    let app = app(&server, MemorySession::new());

    let output = run(
      &app,
      Command::Callback {
        url: "http://localhost:8888/callback?state=x".into(),
      },
    )
    .await;
    assert!(output.contains("sp9s login"));
  }

  #[tokio::test]
  async fn test_logout_forgets_the_token() {
    let server = Server::new_async().await;
    let session = MemorySession::new();
    session.set(ACCESS_TOKEN, "tok").unwrap();
    let app = app(&server, session);

    run(&app, Command::Logout).await;
    assert_eq!(app.session.get(ACCESS_TOKEN).unwrap(), None);
  }
}
