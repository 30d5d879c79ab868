//! Spotify Web API access: wire types, the HTTP client, and the cached client.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use cached_client::CachedSpotifyClient;
pub use client::SpotifyClient;
pub use error::SpotifyError;
pub use retry::RetryPolicy;
