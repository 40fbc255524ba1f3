//! SQLite backend for the quarterly earnings store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The schema is applied through
//! versioned migrations ([`migrate`]); optional SQLite modules are detected by
//! [`capability`].

mod encode;
mod schema;
mod store;
mod target;
mod view;

pub mod capability;
pub mod error;
pub mod migrate;

pub use capability::{Capability, CapabilityReport, CapabilityStatus};
pub use error::{Error, Result};
pub use migrate::{MigrateMode, MigrationReport, TableCount};
pub use schema::{MIGRATIONS, Migration, latest_version};
pub use store::{DEFAULT_EMBEDDING_DIMENSIONS, SqliteStore, StoreOptions};
pub use target::DatabaseTarget;

#[cfg(test)]
mod tests;
