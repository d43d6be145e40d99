//! TTL cache that sits in front of a lookup fetch.

use chrono::{DateTime, Duration, Utc};
use color_eyre::eyre::{eyre, Report};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::KeyValueStore;

/// A cached lookup collection as it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub last_fetched_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub data: Vec<T>,
}

impl<T> CacheEntry<T> {
  pub fn new(data: Vec<T>, now: DateTime<Utc>, expire_days: i64) -> Result<Self, Report> {
    let expires_at = Duration::try_days(expire_days)
      .and_then(|window| now.checked_add_signed(window))
      .ok_or_else(|| eyre!("Cache expiry of {} days is out of range", expire_days))?;

    Ok(Self {
      last_fetched_at: now,
      expires_at,
      data,
    })
  }

  /// Valid up to and including `expires_at`.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    now <= self.expires_at
  }
}

/// Cache layer with a per-key expiry window.
///
/// Each key is refreshed wholesale; there is no merging and no stale
/// fallback when a refresh fails.
#[derive(Clone)]
pub struct TtlCache {
  storage: Arc<dyn KeyValueStore>,
}

impl TtlCache {
  pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
    Self { storage }
  }

  /// Return cached data for `key`, refreshing it first when missing or expired.
  pub async fn get_or_refresh<T, E, F, Fut>(
    &self,
    key: &str,
    expire_days: i64,
    refresh: F,
  ) -> Result<Vec<T>, E>
  where
    T: Serialize + DeserializeOwned,
    E: From<Report>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    self
      .get_or_refresh_at(Utc::now(), key, expire_days, refresh)
      .await
  }

  /// Same as [`Self::get_or_refresh`] with an explicit current time.
  pub async fn get_or_refresh_at<T, E, F, Fut>(
    &self,
    now: DateTime<Utc>,
    key: &str,
    expire_days: i64,
    refresh: F,
  ) -> Result<Vec<T>, E>
  where
    T: Serialize + DeserializeOwned,
    E: From<Report>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    let entry = match self.read_entry::<T>(key) {
      Some(entry) if entry.is_valid_at(now) => {
        debug!(key, expires_at = %entry.expires_at, "Cache hit");
        entry
      }
      stale => {
        debug!(key, expired = stale.is_some(), "Cache miss, refreshing");
        let data = refresh().await?;
        CacheEntry::new(data, now, expire_days)?
      }
    };

    // Written back on hits too; the expiry is left as it was
    let serialized = serde_json::to_string(&entry)
      .map_err(|e| eyre!("Failed to serialize cache entry {}: {}", key, e))?;
    self.storage.set_item(key, &serialized)?;

    Ok(entry.data)
  }

  /// Read and parse an entry. Absent, unreadable and unparseable all count as "no entry".
  fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let raw = match self.storage.get_item(key) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(key, error = %e, "Failed to read cache entry");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(entry) => Some(entry),
      Err(e) => {
        debug!(key, error = %e, "Discarding unparseable cache entry");
        None
      }
    }
  }
}
