//! [`SqliteStore`], the SQLite implementation of [`FinancialStore`] and
//! [`EarningsStore`].
//!
//! [`FinancialStore`]: quarterly_core::store::FinancialStore
//! [`EarningsStore`]: quarterly_core::store::EarningsStore

mod earnings;
mod financial;

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use quarterly_core::financial::FinancialLayout;
use tracing::debug;

use crate::{DatabaseTarget, Result, migrate::MigrateMode};

/// Embedding length used when none is configured.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Knobs fixed for the lifetime of a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// Which physical table design backs [`quarterly_core::store::FinancialStore`].
  pub layout:               FinancialLayout,
  /// Every stored embedding must have exactly this many values.
  pub embedding_dimensions: usize,
  /// sqlite-vec loadable extension, tried once if `vec0` is not registered.
  pub vector_extension:     Option<PathBuf>,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      layout:               FinancialLayout::default(),
      embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
      vector_extension:     None,
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A quarterly store backed by a single SQLite database.
///
/// Cloning is cheap; clones share the connection and the vector-index flag.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:         tokio_rusqlite::Connection,
  pub(crate) options:      StoreOptions,
  pub(crate) vector_index: Arc<AtomicBool>,
}

impl SqliteStore {
  /// Open a connection without touching the schema.
  ///
  /// Enables WAL journaling and foreign-key enforcement, which SQLite leaves
  /// off by default. Use this when the caller drives migrations and the
  /// capability check itself (the CLI's `setup`).
  pub async fn connect(target: &DatabaseTarget, options: StoreOptions) -> Result<Self> {
    let conn = match target {
      DatabaseTarget::Memory => tokio_rusqlite::Connection::open_in_memory().await?,
      DatabaseTarget::File(path) => tokio_rusqlite::Connection::open(path).await?,
    };
    conn
      .call(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(())
      })
      .await?;
    debug!(%target, layout = %options.layout, "connected");
    Ok(Self { conn, options, vector_index: Arc::new(AtomicBool::new(false)) })
  }

  /// Connect, apply pending migrations and run the capability check.
  pub async fn open_with(target: &DatabaseTarget, options: StoreOptions) -> Result<Self> {
    let store = Self::connect(target, options).await?;
    store.migrate(MigrateMode::Pending).await?;
    store.ensure_capabilities().await?;
    Ok(store)
  }

  /// Open (or create) a store at `path` with default options.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let target = DatabaseTarget::File(path.as_ref().to_path_buf());
    Self::open_with(&target, StoreOptions::default()).await
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_with(&DatabaseTarget::Memory, StoreOptions::default()).await
  }

  pub fn options(&self) -> &StoreOptions { &self.options }

  /// Whether similarity search is served by the `vec_segments` index rather
  /// than a full scan.
  pub fn vector_index_enabled(&self) -> bool { self.vector_index.load(Ordering::Acquire) }

  /// Round-trip a trivial query.
  pub async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// `id` of the company with `symbol`, if any.
pub(crate) fn company_id(conn: &rusqlite::Connection, symbol: &str) -> rusqlite::Result<Option<i64>> {
  use rusqlite::OptionalExtension as _;
  conn
    .query_row(
      "SELECT id FROM companies WHERE symbol = ?1",
      rusqlite::params![symbol],
      |row| row.get(0),
    )
    .optional()
}
