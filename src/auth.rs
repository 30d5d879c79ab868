//! OAuth authorization-code flow.
//!
//! The user consents on Spotify's authorize page and is sent back to the
//! redirect URI with `?code=`. The code is traded for an access token by the
//! local token backend, which holds the client secret.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use url::Url;

use crate::config::SpotifyConfig;
use crate::session::{SessionStore, ACCESS_TOKEN};

/// Where the front end should go after handling a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
  Login,
  Home,
}

/// Token backend response
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
  pub access_token: String,
  #[serde(default)]
  pub token_type: Option<String>,
  #[serde(default)]
  pub expires_in: Option<u64>,
  #[serde(default)]
  pub refresh_token: Option<String>,
}

/// Build the Spotify consent URL for the configured client.
pub fn authorize_url(config: &SpotifyConfig) -> Result<Url> {
  let scope = config.scopes.join(" ");
  Url::parse_with_params(
    &config.authorize_url,
    &[
      ("client_id", config.client_id.as_str()),
      ("response_type", "code"),
      ("redirect_uri", config.redirect_uri.as_str()),
      ("scope", scope.as_str()),
    ],
  )
  .map_err(|e| eyre!("Invalid authorize_url '{}': {}", config.authorize_url, e))
}

/// Client for the local token backend.
#[derive(Clone)]
pub struct AuthClient {
  http: reqwest::Client,
  backend_url: String,
}

impl AuthClient {
  pub fn new(config: &SpotifyConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self::with_http(http, &config.auth_backend_url))
  }

  pub fn with_http(http: reqwest::Client, backend_url: &str) -> Self {
    Self {
      http,
      backend_url: backend_url.trim_end_matches('/').to_string(),
    }
  }

  /// Trade an authorization code for a credential.
  pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
    let response = self
      .http
      .get(format!("{}/token", self.backend_url))
      .query(&[("code", code)])
      .send()
      .await
      .map_err(|e| eyre!("Token backend unreachable: {}", e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("Token exchange failed ({}): {}", status, body));
    }

    let credential: Credential = response
      .json()
      .await
      .map_err(|e| eyre!("Token backend returned an unexpected body: {}", e))?;

    if credential.access_token.is_empty() {
      return Err(eyre!("Token backend returned an empty access token"));
    }
    Ok(credential)
  }
}

/// Handle the redirect back from Spotify.
///
/// Without a `code` (the user declined, or the URL was mangled) the session
/// is left alone and the user goes back to login. With a code, the exchanged
/// access token is stored in the session and the user goes home.
pub async fn handle_callback(
  redirect: &Url,
  auth: &AuthClient,
  session: &dyn SessionStore,
) -> Result<Navigation> {
  let mut code = None;
  for (name, value) in redirect.query_pairs() {
    match name.as_ref() {
      "code" if !value.is_empty() => code = Some(value.into_owned()),
      "error" => {
        tracing::warn!(error = %value, "authorization was not granted");
        return Ok(Navigation::Login);
      }
      _ => {}
    }
  }

  let Some(code) = code else {
    tracing::info!("callback without an authorization code");
    return Ok(Navigation::Login);
  };

  let credential = auth.exchange_code(&code).await?;
  session.set(ACCESS_TOKEN, &credential.access_token)?;
  tracing::info!(
    token_type = ?credential.token_type,
    expires_in = ?credential.expires_in,
    refreshable = credential.refresh_token.is_some(),
    "stored access token from callback"
  );

  Ok(Navigation::Home)
}
