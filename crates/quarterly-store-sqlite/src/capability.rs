//! Detection of optional SQLite modules.
//!
//! Full-text search (`fts5`) is required; the bundled SQLite always has it.
//! Vector search (`vec0` from sqlite-vec) is optional. When it is missing and
//! an extension path is configured, loading it is tried exactly once. Without
//! it, similarity search falls back to a scan over stored embeddings.

use std::{path::PathBuf, sync::atomic::Ordering};

use strum::{AsRefStr, Display};
use tracing::{info, warn};

use crate::{Error, Result, SqliteStore, schema::vector_index_sql};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
  FullTextSearch,
  VectorSearch,
}

impl Capability {
  pub const ALL: [Capability; 2] = [Capability::FullTextSearch, Capability::VectorSearch];

  /// Virtual table module that provides the capability.
  pub fn module(self) -> &'static str {
    match self {
      Self::FullTextSearch => "fts5",
      Self::VectorSearch => "vec0",
    }
  }

  pub fn is_required(self) -> bool { matches!(self, Self::FullTextSearch) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
  Available,
  /// Missing at first, then provided by loading the configured extension.
  Remediated,
  Missing { reason: String },
}

impl CapabilityStatus {
  pub fn is_available(&self) -> bool { !matches!(self, Self::Missing { .. }) }
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityReport {
  pub entries: Vec<(Capability, CapabilityStatus)>,
}

impl CapabilityReport {
  pub fn status(&self, capability: Capability) -> Option<&CapabilityStatus> {
    self
      .entries
      .iter()
      .find(|(c, _)| *c == capability)
      .map(|(_, s)| s)
  }

  pub fn vector_search(&self) -> bool {
    self
      .status(Capability::VectorSearch)
      .is_some_and(CapabilityStatus::is_available)
  }
}

impl SqliteStore {
  /// Check every capability, remediate the optional one if possible, and
  /// create the vector index when `vec0` is usable.
  ///
  /// Fails only when a required capability is missing.
  pub async fn ensure_capabilities(&self) -> Result<CapabilityReport> {
    let mut report = CapabilityReport::default();

    for capability in Capability::ALL {
      let status = if self.has_module(capability.module()).await? {
        CapabilityStatus::Available
      } else if capability.is_required() {
        return Err(Error::CapabilityMissing(capability));
      } else {
        self.remediate(capability).await?
      };
      report.entries.push((capability, status));
    }

    match report.status(Capability::VectorSearch) {
      Some(CapabilityStatus::Missing { reason }) => {
        warn!(%reason, "vector search unavailable; similarity search will scan all embeddings");
      }
      Some(_) => {
        let indexed = self.create_vector_index().await?;
        self.vector_index.store(true, Ordering::Release);
        info!(dimensions = self.options.embedding_dimensions, indexed, "vector index ready");
      }
      None => {}
    }

    Ok(report)
  }

  async fn has_module(&self, module: &'static str) -> Result<bool> {
    let found = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM pragma_module_list WHERE name = ?1)",
          rusqlite::params![module],
          |row| row.get::<_, bool>(0),
        )?)
      })
      .await?;
    Ok(found)
  }

  /// One attempt to provide `capability`; never retried.
  async fn remediate(&self, capability: Capability) -> Result<CapabilityStatus> {
    let Some(path) = self.options.vector_extension.clone() else {
      return Ok(CapabilityStatus::Missing {
        reason: format!("module {} is not registered and no extension path is configured", capability.module()),
      });
    };

    if let Err(e) = self.load_extension(path.clone()).await {
      return Ok(CapabilityStatus::Missing {
        reason: format!("loading {} failed: {e}", path.display()),
      });
    }

    if self.has_module(capability.module()).await? {
      info!(path = %path.display(), module = capability.module(), "loaded extension");
      Ok(CapabilityStatus::Remediated)
    } else {
      Ok(CapabilityStatus::Missing {
        reason: format!("{} loaded but did not register {}", path.display(), capability.module()),
      })
    }
  }

  async fn load_extension(&self, path: PathBuf) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        // SAFETY: the path comes from operator configuration, not from stored
        // data, and the guard disables extension loading again on drop.
        unsafe {
          let _guard = rusqlite::LoadExtensionGuard::new(conn)?;
          conn.load_extension(&path, None)?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Create `vec_segments` and index any embeddings stored while the module
  /// was unavailable. Returns the number of rows added.
  async fn create_vector_index(&self) -> Result<usize> {
    let ddl = vector_index_sql(self.options.embedding_dimensions);
    let dims_bytes = (self.options.embedding_dimensions * 4) as i64;
    let added = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(&ddl)?;
        let added = tx.execute(
          "INSERT INTO vec_segments (segment_id, embedding)
           SELECT id, embedding FROM call_segments
           WHERE embedding IS NOT NULL
             AND length(embedding) = ?1
             AND id NOT IN (SELECT segment_id FROM vec_segments)",
          rusqlite::params![dims_bytes],
        )?;
        tx.commit()?;
        Ok(added)
      })
      .await?;
    Ok(added)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_full_text_is_required() {
    assert!(Capability::FullTextSearch.is_required());
    assert!(!Capability::VectorSearch.is_required());
    assert_eq!(Capability::VectorSearch.to_string(), "vector-search");
  }

  #[test]
  fn report_lookup() {
    let report = CapabilityReport {
      entries: vec![
        (Capability::FullTextSearch, CapabilityStatus::Available),
        (Capability::VectorSearch, CapabilityStatus::Missing { reason: "absent".into() }),
      ],
    };
    assert!(!report.vector_search());
    assert_eq!(
      report.status(Capability::FullTextSearch),
      Some(&CapabilityStatus::Available)
    );
  }
}
