//! Core types and trait definitions for the quarterly earnings store.
//!
//! This crate is deliberately free of database and HTTP dependencies. The
//! storage backend (`quarterly-store-sqlite`) and the operator binary
//! (`quarterly-cli`) both depend on it.

pub mod company;
pub mod earnings;
pub mod error;
pub mod financial;
pub mod insights;
pub mod overview;
pub mod store;

pub use error::{Error, Result};
