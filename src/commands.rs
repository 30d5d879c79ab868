//! Available commands

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Print the Spotify consent URL to start logging in
  Login,
  /// Finish logging in with the URL Spotify redirected to
  Callback {
    /// Full redirect URL, including `?code=`
    url: String,
  },
  /// Forget the session and everything cached
  Logout,
  /// Show the logged-in user's profile
  Me,
  /// List your playlists
  Playlists {
    /// Fetch every page instead of just the first
    #[arg(long)]
    all: bool,
  },
  /// Show a playlist's details and first page of tracks
  Playlist { id: String },
  /// List a playlist's tracks
  Tracks {
    id: String,
    /// Offset of the first track to list
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// Fetch every remaining page
    #[arg(long)]
    all: bool,
  },
  /// Show an artist
  Artist { id: String },
  /// Show this session's featured artist (picked from your top artists)
  Featured,
  /// Show recently played tracks
  Recent,
  /// Add tracks to a playlist
  Add {
    playlist: String,
    #[arg(required = true)]
    uris: Vec<String>,
  },
  /// Remove tracks from a playlist
  Remove {
    playlist: String,
    #[arg(required = true)]
    uris: Vec<String>,
  },
  /// Start or resume playback
  Play {
    /// Album, artist or playlist URI to play
    #[arg(long)]
    context: Option<String>,
    /// Device to play on
    #[arg(long)]
    device: Option<String>,
    /// Track URIs to play
    uris: Vec<String>,
  },
  /// Pause playback
  Pause {
    #[arg(long)]
    device: Option<String>,
  },
  /// Skip to the next track
  Next {
    #[arg(long)]
    device: Option<String>,
  },
  /// Skip to the previous track
  Previous {
    #[arg(long)]
    device: Option<String>,
  },
  /// Move playback to another device
  Transfer {
    device: String,
    /// Start playing on the new device
    #[arg(long)]
    play: bool,
  },
  /// Manage the response cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum CacheAction {
  /// Drop every cached response
  Clear,
}
