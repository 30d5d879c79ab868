use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

const DEFAULT_SCOPES: &[&str] = &[
  "user-read-private",
  "user-read-email",
  "user-top-read",
  "user-read-recently-played",
  "user-read-playback-state",
  "user-modify-playback-state",
  "streaming",
  "playlist-read-private",
  "playlist-modify-public",
  "playlist-modify-private",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub spotify: SpotifyConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub paging: PagingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
  pub client_id: String,
  /// Where Spotify sends the user back after consent (carries `?code=`)
  pub redirect_uri: String,
  /// Local backend that trades an authorization code for an access token
  pub auth_backend_url: String,
  #[serde(default = "default_api_url")]
  pub api_url: String,
  #[serde(default = "default_authorize_url")]
  pub authorize_url: String,
  #[serde(default = "default_scopes")]
  pub scopes: Vec<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl SpotifyConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_authorize_url() -> String {
  DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_scopes() -> Vec<String> {
  DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to send every read to the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Seconds before a cached response is considered stale
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
  /// Serve stale cache when a refresh fails
  #[serde(default)]
  pub offline: bool,
  /// Database location (defaults to $XDG_DATA_HOME/sp9s/sp9s.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_secs: default_stale_secs(),
      offline: false,
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_stale_secs() -> u64 {
  300
}

/// Page sizes per paged resource.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
  pub playlists: u32,
  pub playlist_tracks: u32,
  pub top_artists: u32,
  pub recently_played: u32,
}

impl PagingConfig {
  /// Largest `limit` the Web API accepts on paged endpoints
  pub const MAX_PAGE_SIZE: u32 = 50;

  fn validate(&self) -> Result<()> {
    let sizes = [
      ("playlists", self.playlists),
      ("playlist_tracks", self.playlist_tracks),
      ("top_artists", self.top_artists),
      ("recently_played", self.recently_played),
    ];
    for (name, size) in sizes {
      if size == 0 || size > Self::MAX_PAGE_SIZE {
        return Err(eyre!(
          "paging.{} must be between 1 and {}, got {}",
          name,
          Self::MAX_PAGE_SIZE,
          size
        ));
      }
    }
    Ok(())
  }
}

impl Default for PagingConfig {
  fn default() -> Self {
    Self {
      playlists: 20,
      playlist_tracks: 50,
      top_artists: 20,
      recently_played: 50,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sp9s.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sp9s/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/sp9s/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sp9s.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sp9s").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.spotify.client_id.trim().is_empty() {
      return Err(eyre!("spotify.client_id must not be empty"));
    }
    config.paging.validate()?;
    Ok(config)
  }

  /// Access token override from the environment.
  ///
  /// Checks SP9S_TOKEN. An empty value counts as unset.
  pub fn env_token() -> Option<String> {
    std::env::var("SP9S_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  pub fn stale_time(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.cache.stale_secs as i64)
  }
}
