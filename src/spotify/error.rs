use thiserror::Error;

pub type SpotifyResult<T> = Result<T, SpotifyError>;

/// Failures talking to the Spotify Web API.
#[derive(Debug, Error)]
pub enum SpotifyError {
  /// No access token available; the request was never sent
  #[error("Not logged in. Run `sp9s login` or set SP9S_TOKEN.")]
  MissingCredential,

  #[error("Access token was rejected (401). Run `sp9s login` again.")]
  Unauthorized,

  /// The token is valid but not allowed to do this; retrying won't help
  #[error("Forbidden (403): {0}")]
  Forbidden(String),

  #[error("Rate limited by Spotify (429)")]
  RateLimited { retry_after: Option<u64> },

  #[error("Spotify API error {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Request failed: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Unexpected response from {endpoint}: {source}")]
  Decode {
    endpoint: String,
    #[source]
    source: serde_json::Error,
  },
}

impl SpotifyError {
  /// HTTP status code, when the failure came from a response.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Unauthorized => Some(401),
      Self::Forbidden(_) => Some(403),
      Self::RateLimited { .. } => Some(429),
      Self::Status { status, .. } => Some(*status),
      Self::Network(e) => e.status().map(|s| s.as_u16()),
      Self::MissingCredential | Self::Decode { .. } => None,
    }
  }

  /// Failures that will fail the same way on every attempt.
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::MissingCredential | Self::Forbidden(_))
  }
}
