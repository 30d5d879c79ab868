//! The featured artist: one of the user's top artists, picked at random once
//! per session and then kept.

use color_eyre::{eyre::eyre, Result};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::future::Future;

use crate::session::{featured_artist_key, SessionStore};
use crate::spotify::types::Artist;

/// The featured artist for `user_id`.
///
/// A pick already stored in the session is returned unchanged and
/// `load_candidates` is never called. Otherwise one candidate is chosen
/// uniformly at random and stored. Returns `None` when there is nothing to
/// choose from.
pub async fn featured_artist<F, Fut>(
  user_id: &str,
  session: &dyn SessionStore,
  load_candidates: F,
) -> Result<Option<Artist>>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Vec<Artist>>>,
{
  let key = featured_artist_key(user_id);

  if let Some(stored) = session.get(&key)? {
    match serde_json::from_str::<Artist>(&stored) {
      Ok(artist) => return Ok(Some(artist)),
      Err(e) => {
        tracing::warn!(user = user_id, error = %e, "discarding unreadable featured artist");
        session.remove(&key)?;
      }
    }
  }

  let candidates = load_candidates().await?;
  let Some(artist) = candidates.choose(&mut thread_rng()).cloned() else {
    tracing::debug!(user = user_id, "no top artists to feature");
    return Ok(None);
  };

  let value =
    serde_json::to_string(&artist).map_err(|e| eyre!("Failed to serialize artist: {}", e))?;
  session.set(&key, &value)?;
  tracing::info!(user = user_id, artist = %artist.name, "picked featured artist");

  Ok(Some(artist))
}
