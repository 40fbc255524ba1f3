//! Runtime settings, read once at start from an optional TOML file and the
//! process environment (environment wins).

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result, anyhow};
use quarterly_core::financial::FinancialLayout;
use quarterly_store_sqlite::{DEFAULT_EMBEDDING_DIMENSIONS, DatabaseTarget, StoreOptions};
use serde::Deserialize;

use crate::ingest::IngestLimits;

/// Everything a command may need. Keys match the environment variable names
/// in lower case (`DATABASE_URL` → `database_url`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// Required; checked by [`Settings::database_target`].
  #[serde(default)]
  pub database_url:          Option<String>,
  #[serde(default)]
  pub openai_api_key:        Option<String>,
  #[serde(default = "default_provider_url")]
  pub provider_url:          String,
  #[serde(default)]
  pub webhook_url:           Option<String>,
  /// Segments written per transaction by `ingest-call`.
  #[serde(default = "default_chunk_size")]
  pub chunk_size:            usize,
  #[serde(default = "default_max_file_size_mb")]
  pub max_file_size_mb:      u64,
  #[serde(default = "default_embedding_model")]
  pub embedding_model:       String,
  #[serde(default = "default_embedding_dimensions")]
  pub embedding_dimensions:  usize,
  #[serde(default)]
  pub vector_extension_path: Option<PathBuf>,
  #[serde(default)]
  pub financial_layout:      FinancialLayout,
  #[serde(default = "default_refresh_interval_secs")]
  pub refresh_interval_secs: u64,
  #[serde(default = "default_max_staleness_secs")]
  pub max_staleness_secs:    u64,
}

fn environment() -> config::Environment { config::Environment::default().try_parsing(true) }

fn default_provider_url() -> String { "https://api.openai.com/v1".to_owned() }
fn default_chunk_size() -> usize { 50 }
fn default_max_file_size_mb() -> u64 { 25 }
fn default_embedding_model() -> String {
  "sentence-transformers/paraphrase-multilingual-mpnet-base-v2".to_owned()
}
fn default_embedding_dimensions() -> usize { DEFAULT_EMBEDDING_DIMENSIONS }
fn default_refresh_interval_secs() -> u64 { 300 }
fn default_max_staleness_secs() -> u64 { 3600 }

impl Settings {
  /// Load from `file` (if it exists) and then the environment.
  pub fn load(file: &std::path::Path) -> Result<Self> {
    Self::load_from(config::File::from(file).required(false), environment())
  }

  fn load_from<F>(file: F, env: config::Environment) -> Result<Self>
  where
    F: config::Source + Send + Sync + 'static,
  {
    let settings = config::Config::builder()
      .add_source(file)
      .add_source(env)
      .build()
      .context("failed to read configuration")?;
    Self::from_config(settings)
  }

  fn from_config(settings: config::Config) -> Result<Self> {
    let parsed: Self = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    if parsed.chunk_size == 0 {
      return Err(anyhow!("CHUNK_SIZE must be at least 1"));
    }
    Ok(parsed)
  }

  /// Parsed `DATABASE_URL`. Missing or unsupported values abort with a hint.
  pub fn database_target(&self) -> Result<DatabaseTarget> {
    let url = self
      .database_url
      .as_deref()
      .filter(|u| !u.trim().is_empty())
      .ok_or_else(|| {
        anyhow!(
          "DATABASE_URL is not set; export it (e.g. DATABASE_URL=sqlite://quarterly.db) or add \
           `database_url` to the config file"
        )
      })?;
    DatabaseTarget::parse(url).with_context(|| format!("invalid DATABASE_URL {url:?}"))
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      layout:               self.financial_layout,
      embedding_dimensions: self.embedding_dimensions,
      vector_extension:     self.vector_extension_path.clone(),
    }
  }

  pub fn refresh_interval(&self) -> Duration { Duration::from_secs(self.refresh_interval_secs) }

  pub fn max_staleness(&self) -> Duration { Duration::from_secs(self.max_staleness_secs) }

  pub fn max_file_size_bytes(&self) -> u64 { self.max_file_size_mb.saturating_mul(1024 * 1024) }

  pub fn ingest_limits(&self) -> IngestLimits {
    IngestLimits {
      chunk_size:           self.chunk_size,
      max_file_size:        self.max_file_size_bytes(),
      embedding_dimensions: self.embedding_dimensions,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(raw: &str) -> Result<Settings> {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(raw, config::FileFormat::Toml))
      .build()?;
    Settings::from_config(settings)
  }

  #[test]
  fn defaults_apply() {
    let s = from_toml("database_url = \"sqlite::memory:\"").unwrap();
    assert_eq!(s.chunk_size, 50);
    assert_eq!(s.max_file_size_mb, 25);
    assert_eq!(s.embedding_dimensions, 768);
    assert_eq!(s.financial_layout, FinancialLayout::Normalized);
    assert_eq!(s.provider_url, "https://api.openai.com/v1");
    assert_eq!(s.max_staleness(), Duration::from_secs(3600));
    assert!(matches!(s.database_target().unwrap(), DatabaseTarget::Memory));
  }

  #[test]
  fn explicit_values_override_defaults() {
    let s = from_toml(
      r#"
      database_url = "sqlite:///var/lib/quarterly.db"
      chunk_size = 10
      financial_layout = "flat"
      embedding_dimensions = 384
      vector_extension_path = "/usr/lib/vec0.so"
      "#,
    )
    .unwrap();
    assert_eq!(s.chunk_size, 10);
    assert_eq!(s.financial_layout, FinancialLayout::Flat);

    let options = s.store_options();
    assert_eq!(options.embedding_dimensions, 384);
    assert_eq!(options.vector_extension, Some(PathBuf::from("/usr/lib/vec0.so")));
    assert!(matches!(
      s.database_target().unwrap(),
      DatabaseTarget::File(p) if p == PathBuf::from("/var/lib/quarterly.db")
    ));
  }

  #[test]
  fn missing_database_url_explains_itself() {
    let s = from_toml("").unwrap();
    let err = s.database_target().unwrap_err().to_string();
    assert!(err.contains("DATABASE_URL"), "{err}");
  }

  #[test]
  fn postgres_url_is_rejected() {
    let s = from_toml("database_url = \"postgresql://localhost/financial_data\"").unwrap();
    assert!(s.database_target().is_err());
  }

  #[test]
  fn zero_chunk_size_is_rejected() {
    assert!(from_toml("chunk_size = 0").is_err());
  }

  #[test]
  fn environment_overrides_file() {
    let file = config::File::from_str(
      "database_url = \"sqlite://from-file.db\"\nchunk_size = 10\n",
      config::FileFormat::Toml,
    );
    let vars: config::Map<String, String> = [
      ("CHUNK_SIZE", "7"),
      ("FINANCIAL_LAYOUT", "flat"),
      ("MAX_STALENESS_SECS", "60"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();

    let s = Settings::load_from(file, environment().source(Some(vars))).unwrap();
    assert_eq!(s.chunk_size, 7);
    assert_eq!(s.financial_layout, FinancialLayout::Flat);
    assert_eq!(s.max_staleness(), Duration::from_secs(60));
    assert_eq!(s.database_url.as_deref(), Some("sqlite://from-file.db"));
  }

  #[test]
  fn environment_alone_is_enough() {
    let vars: config::Map<String, String> =
      [("DATABASE_URL".to_owned(), "sqlite::memory:".to_owned())].into_iter().collect();
    let empty = config::File::from_str("", config::FileFormat::Toml);

    let s = Settings::load_from(empty, environment().source(Some(vars))).unwrap();
    assert!(matches!(s.database_target().unwrap(), DatabaseTarget::Memory));
    assert_eq!(s.ingest_limits().chunk_size, 50);
  }

  #[test]
  fn file_size_limit_in_bytes() {
    let s = from_toml("max_file_size_mb = 2").unwrap();
    assert_eq!(s.max_file_size_bytes(), 2 * 1024 * 1024);
  }
}
