//! Versioned migration runner and schema verification.
//!
//! Applied migrations are recorded in `schema_migrations` together with a
//! SHA-256 of their SQL, and the highest applied version is mirrored into
//! `PRAGMA user_version`. Each migration runs in its own transaction: a
//! failure rolls that migration back, leaves earlier ones applied, and stops
//! the run.

use chrono::Utc;
use tracing::{info, warn};

use crate::{
  Error, Result, SqliteStore,
  encode::encode_dt,
  schema::{MIGRATIONS, MIGRATIONS_TABLE, Migration, latest_version},
};

/// Which migrations a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrateMode {
  /// Only migrations not yet recorded.
  #[default]
  Pending,
  /// Every migration, including recorded ones. Must leave an up-to-date
  /// schema unchanged.
  Reapply,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
  pub applied:   Vec<&'static Migration>,
  pub reapplied: Vec<&'static Migration>,
  pub skipped:   Vec<&'static Migration>,
  /// `PRAGMA user_version` after the run.
  pub version:   i64,
}

/// One row of `schema_migrations`.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
  pub version:    i64,
  pub name:       String,
  pub checksum:   String,
  pub applied_at: String,
}

/// A table or view and its current row count, as listed by
/// [`SqliteStore::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
  pub name: String,
  /// `table` or `view`.
  pub kind: String,
  pub rows: u64,
}

impl SqliteStore {
  /// Bring the schema up to date.
  pub async fn migrate(&self, mode: MigrateMode) -> Result<MigrationReport> {
    let (recorded, user_version) = self.recorded_migrations().await?;

    let supported = latest_version();
    let found = recorded
      .iter()
      .map(|r| r.version)
      .max()
      .unwrap_or(0)
      .max(user_version);
    if found > supported {
      return Err(Error::UnsupportedVersion { found, supported });
    }

    // Refuse to touch anything if a released migration was edited.
    for r in &recorded {
      let Some(m) = MIGRATIONS.iter().find(|m| m.version == r.version) else {
        return Err(Error::UnsupportedVersion { found: r.version, supported });
      };
      let expected = m.checksum();
      if r.checksum != expected {
        return Err(Error::ChecksumMismatch {
          version: r.version,
          name: r.name.clone(),
          recorded: r.checksum.clone(),
          expected,
        });
      }
    }

    let mut report = MigrationReport::default();
    for m in MIGRATIONS {
      let is_recorded = recorded.iter().any(|r| r.version == m.version);
      match (is_recorded, mode) {
        (true, MigrateMode::Pending) => report.skipped.push(m),
        (true, MigrateMode::Reapply) => {
          self.run_migration(m, false).await?;
          info!(version = m.version, name = m.name, "reapplied migration");
          report.reapplied.push(m);
        }
        (false, _) => {
          self.run_migration(m, true).await?;
          info!(version = m.version, name = m.name, "applied migration");
          report.applied.push(m);
        }
      }
    }

    report.version = self.schema_version().await?;
    Ok(report)
  }

  /// Migrations recorded in `schema_migrations`, oldest first.
  pub async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
    Ok(self.recorded_migrations().await?.0)
  }

  /// Current `PRAGMA user_version`.
  pub async fn schema_version(&self) -> Result<i64> {
    let v = self
      .conn
      .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))?))
      .await?;
    Ok(v)
  }

  /// List every user table and view with its row count. Internal tables of
  /// SQLite and of the full-text and vector modules are left out.
  pub async fn verify(&self) -> Result<Vec<TableCount>> {
    let counts = self
      .conn
      .call(|conn| {
        let objects: Vec<(String, String)> = {
          let mut stmt = conn.prepare(
            "SELECT name, type FROM sqlite_master
             WHERE type IN ('table', 'view')
               AND name NOT GLOB 'sqlite_*'
               AND name NOT GLOB 'call_segments_fts_*'
               AND name NOT GLOB 'vec_segments_*'
             ORDER BY type, name",
          )?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut counts = Vec::with_capacity(objects.len());
        for (name, kind) in objects {
          let rows: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", name.replace('"', "\"\"")),
            [],
            |row| row.get(0),
          )?;
          counts.push(TableCount { name, kind, rows: rows as u64 });
        }
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }

  async fn recorded_migrations(&self) -> Result<(Vec<AppliedMigration>, i64)> {
    let out = self
      .conn
      .call(|conn| {
        conn.execute_batch(MIGRATIONS_TABLE)?;
        let mut stmt = conn.prepare(
          "SELECT version, name, checksum, applied_at FROM schema_migrations ORDER BY version",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(AppliedMigration {
              version:    row.get(0)?,
              name:       row.get(1)?,
              checksum:   row.get(2)?,
              applied_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok((rows, user_version))
      })
      .await?;
    Ok(out)
  }

  /// Execute one migration in its own transaction. `record` adds the
  /// bookkeeping row and bumps `user_version`; reapplication only re-runs the
  /// SQL.
  async fn run_migration(&self, m: &'static Migration, record: bool) -> Result<()> {
    let checksum = m.checksum();
    let applied_at = encode_dt(Utc::now());

    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(m.sql)?;
        if record {
          tx.execute(
            "INSERT INTO schema_migrations (version, name, checksum, applied_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![m.version, m.name, checksum, applied_at],
          )?;
          let current: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
          if m.version > current {
            // PRAGMA does not accept bound parameters.
            tx.execute_batch(&format!("PRAGMA user_version = {}", m.version))?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await;

    result.map_err(|source| {
      warn!(version = m.version, name = m.name, error = %source, "migration failed");
      Error::Migration { version: m.version, name: m.name, source }
    })
  }
}
