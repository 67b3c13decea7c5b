//! Server configuration, deserialised from `config.toml` and `CC_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use cc_scan::ScanConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:           String,
  #[serde(default = "default_port")]
  pub port:           u16,
  #[serde(default = "default_store_path")]
  pub store_path:     PathBuf,
  /// Public base URL. Check-in responses link survey pages under it.
  #[serde(default)]
  pub server_address: Option<String>,
  #[serde(default)]
  pub scan:           ScanConfig,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("cc.sqlite3") }

impl ServerConfig {
  /// Layer the optional TOML file at `path` under `CC_`-prefixed
  /// environment variables (`CC_SCAN__STORE_TIMEOUT_MS=2000`).
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("CC")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = ServerConfig::load(Path::new("/nonexistent/cc-config.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.scan, ScanConfig::default());
    assert!(cfg.server_address.is_none());
  }

  #[test]
  fn tilde_is_expanded_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    let expanded = expand_tilde(Path::new("~/data/cc.sqlite3"));
    assert_eq!(expanded, PathBuf::from(home).join("data/cc.sqlite3"));
    assert_eq!(expand_tilde(Path::new("/abs/cc.sqlite3")), PathBuf::from("/abs/cc.sqlite3"));
  }
}
