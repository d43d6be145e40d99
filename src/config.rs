use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Upper bound for a lookup expiry override (about a century).
pub const MAX_EXPIRE_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Object id of the signed-in user, used to find their workflow task
  pub user_object_id: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  #[serde(default = "default_page_size")]
  pub page_size: u32,
}

fn default_page_size() -> u32 {
  100
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_enabled")]
  pub enabled: bool,
  /// Database file (defaults to one per backend under the data directory)
  pub path: Option<PathBuf>,
  /// Per-lookup expiry overrides in days, keyed by resource name
  #[serde(default)]
  pub expire_days: HashMap<String, i64>,
}

fn default_enabled() -> bool {
  true
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      expire_days: HashMap::new(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./engage.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/engage/config.yaml
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
        "No configuration file found. Create one at ~/.config/engage/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("engage.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("engage").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config = Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.api.page_size == 0 {
      return Err(eyre!("api.page_size must be at least 1"));
    }
    if let Some((name, days)) = config.cache.expire_days.iter().find(|(_, d)| **d < 0) {
      return Err(eyre!(
        "cache.expire_days.{} must not be negative (got {})",
        name,
        days
      ));
    }
    if let Some((name, days)) = config
      .cache
      .expire_days
      .iter()
      .find(|(_, d)| **d > MAX_EXPIRE_DAYS)
    {
      return Err(eyre!(
        "cache.expire_days.{} must be at most {} days (got {})",
        name,
        MAX_EXPIRE_DAYS,
        days
      ));
    }

    Ok(config)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks ENGAGE_API_TOKEN first, then API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("ENGAGE_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set ENGAGE_API_TOKEN or API_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  base_url: https://api.example.com/v1\n").unwrap();

    assert_eq!(config.api.page_size, 100);
    assert!(config.cache.enabled);
    assert!(config.cache.path.is_none());
    assert!(config.user_object_id.is_none());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  base_url: https://api.example.com/v1
  page_size: 250
user_object_id: 5b1c9f0e-0000-4000-8000-000000000001
cache:
  enabled: false
  path: /tmp/engage.db
  expire_days:
    countries: 10
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.api.page_size, 250);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/engage.db")));
    assert_eq!(config.cache.expire_days.get("countries"), Some(&10));
  }

  #[test]
  fn test_zero_page_size_rejected() {
    let yaml = "api:\n  base_url: https://x\n  page_size: 0\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_negative_expiry_rejected() {
    let yaml = "api:\n  base_url: https://x\ncache:\n  expire_days:\n    regions: -1\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_oversized_expiry_rejected() {
    let yaml = "api:\n  base_url: https://x\ncache:\n  expire_days:\n    countries: 1000000000\n";
    let err = Config::parse(yaml).unwrap_err();
    assert!(err.to_string().contains("countries"));

    let yaml = "api:\n  base_url: https://x\ncache:\n  expire_days:\n    countries: 36500\n";
    assert!(Config::parse(yaml).is_ok());
  }

  #[test]
  fn test_missing_explicit_path() {
    assert!(Config::load(Some(Path::new("/nonexistent/engage.yaml"))).is_err());
  }
}
