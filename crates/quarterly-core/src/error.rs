//! Error types for `quarterly-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid company symbol: {0:?}")]
  InvalidSymbol(String),

  #[error("quarter must be between 1 and 4, got {0}")]
  InvalidQuarter(i64),

  #[error("{field} must lie within [{min}, {max}], got {value}")]
  OutOfRange {
    field: &'static str,
    min:   f64,
    max:   f64,
    value: f64,
  },

  #[error("embedding has {actual} dimensions, expected {expected}")]
  EmbeddingDimension { expected: usize, actual: usize },

  #[error("embedding must be non-empty and contain only finite values")]
  InvalidEmbedding,

  #[error("unknown sentiment label: {0:?}")]
  UnknownSentimentLabel(String),

  #[error("unknown financial layout: {0:?}")]
  UnknownLayout(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
