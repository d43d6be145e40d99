use color_eyre::Result;
use tracing::info;

use super::storage::KeyValueStore;

/// Key holding the version that last wrote the store.
pub const APP_VERSION_KEY: &str = "appVersion";

/// Wipe the whole store when it was written by a different version.
///
/// Returns `true` if the store was cleared.
pub fn reset_on_version_change(storage: &dyn KeyValueStore, version: &str) -> Result<bool> {
  let previous = storage.get_item(APP_VERSION_KEY)?;
  if previous.as_deref() == Some(version) {
    return Ok(false);
  }

  info!(
    previous = previous.as_deref().unwrap_or("none"),
    current = version,
    "App version changed, clearing cached lookups"
  );
  storage.clear()?;
  storage.set_item(APP_VERSION_KEY, version)?;
  Ok(true)
}
