//! Store configuration, read from an optional TOML file with `SHELF_*`
//! environment overrides.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::Deserialize;
use shelf_core::staging::{DeriveOptions, TableNaming};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// SQLite database file.
  pub store_path:            PathBuf,
  /// Lifetime of staging records in seconds; unset disables expiry.
  pub staging_lifetime_secs: Option<i64>,
  /// Appended to a target table name to name its staging table.
  pub table_suffix:          String,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      store_path:            PathBuf::from("shelf.sqlite3"),
      staging_lifetime_secs: None,
      table_suffix:          "_staging".into(),
    }
  }
}

impl StoreConfig {
  /// Load from `path` (missing files are ignored), then apply environment
  /// variables such as `SHELF_STAGING_LIFETIME_SECS`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.as_ref()).required(false))
      .add_source(config::Environment::with_prefix("SHELF"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// Fails with a configuration error when the lifetime is out of range.
  pub fn derive_options(&self) -> Result<DeriveOptions> {
    let lifetime = self
      .staging_lifetime_secs
      .map(|secs| {
        TimeDelta::try_seconds(secs).ok_or_else(|| {
          shelf_core::Error::Configuration(format!(
            "staging_lifetime_secs {secs} is out of range"
          ))
        })
      })
      .transpose()?;
    Ok(DeriveOptions {
      lifetime,
      table_naming: TableNaming::Suffix(self.table_suffix.clone()),
      ..DeriveOptions::default()
    })
  }
}
