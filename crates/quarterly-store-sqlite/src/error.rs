//! Error type for `quarterly-store-sqlite`.

use quarterly_core::{company::Symbol, financial::Period};
use thiserror::Error;

use crate::capability::Capability;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] quarterly_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("unsupported database target {0:?}; expected sqlite://<path>, sqlite::memory: or a file path")]
  UnsupportedTarget(String),

  // ── Migrations ──────────────────────────────────────────────────────────

  #[error("migration {version} ({name}) failed: {source}")]
  Migration {
    version: i64,
    name:    &'static str,
    #[source]
    source:  tokio_rusqlite::Error,
  },

  /// An applied migration's SQL no longer matches what this binary ships.
  #[error("migration {version} ({name}) was applied with checksum {recorded}, binary has {expected}")]
  ChecksumMismatch {
    version:  i64,
    name:     String,
    recorded: String,
    expected: String,
  },

  #[error("database schema version {found} is newer than the latest known version {supported}")]
  UnsupportedVersion { found: i64, supported: i64 },

  #[error("required database capability missing: {0}")]
  CapabilityMissing(Capability),

  // ── Domain ──────────────────────────────────────────────────────────────

  #[error("unknown company: {0}")]
  UnknownCompany(Symbol),

  #[error("{symbol} already has a value for {metric} in {period}")]
  DuplicateMetric {
    symbol: Symbol,
    period: String,
    metric: String,
  },

  #[error("earnings call not found: {0}")]
  CallNotFound(i64),

  #[error("earnings call {0} is already processed")]
  AlreadyProcessed(i64),
}

impl Error {
  pub(crate) fn duplicate_metric(symbol: Symbol, period: Period, metric: String) -> Self {
    Self::DuplicateMetric { symbol, period: period.label(), metric }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
