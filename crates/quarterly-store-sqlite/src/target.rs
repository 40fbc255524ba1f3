//! Parsing of `DATABASE_URL` values into something SQLite can open.

use std::{fmt, path::PathBuf, str::FromStr};

use crate::{Error, Result};

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
  Memory,
  File(PathBuf),
}

impl DatabaseTarget {
  /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`, `sqlite:<path>`
  /// and bare file paths. Any other `scheme://` URL is rejected.
  pub fn parse(url: &str) -> Result<Self> {
    let url = url.trim();
    if url.is_empty() {
      return Err(Error::UnsupportedTarget(url.to_owned()));
    }
    if matches!(url, "sqlite::memory:" | ":memory:" | "sqlite://:memory:") {
      return Ok(Self::Memory);
    }
    if let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
      if path.is_empty() {
        return Err(Error::UnsupportedTarget(url.to_owned()));
      }
      return Ok(Self::File(PathBuf::from(path)));
    }
    if url.contains("://") {
      return Err(Error::UnsupportedTarget(url.to_owned()));
    }
    Ok(Self::File(PathBuf::from(url)))
  }
}

impl FromStr for DatabaseTarget {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl fmt::Display for DatabaseTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Memory => f.write_str("sqlite::memory:"),
      Self::File(path) => write!(f, "sqlite://{}", path.display()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn memory_forms() {
    assert_eq!(DatabaseTarget::parse("sqlite::memory:").unwrap(), DatabaseTarget::Memory);
    assert_eq!(DatabaseTarget::parse(":memory:").unwrap(), DatabaseTarget::Memory);
  }

  #[test]
  fn file_forms() {
    let expected = DatabaseTarget::File(PathBuf::from("data/quarterly.db"));
    assert_eq!(DatabaseTarget::parse("sqlite://data/quarterly.db").unwrap(), expected);
    assert_eq!(DatabaseTarget::parse("sqlite:data/quarterly.db").unwrap(), expected);
    assert_eq!(DatabaseTarget::parse("data/quarterly.db").unwrap(), expected);
    assert_eq!(
      DatabaseTarget::parse("sqlite:///var/lib/q.db").unwrap(),
      DatabaseTarget::File(PathBuf::from("/var/lib/q.db"))
    );
  }

  #[test]
  fn other_schemes_are_rejected() {
    assert!(matches!(
      DatabaseTarget::parse("postgresql://user:pw@host:5432/db"),
      Err(Error::UnsupportedTarget(_))
    ));
    assert!(DatabaseTarget::parse("").is_err());
    assert!(DatabaseTarget::parse("sqlite://").is_err());
  }
}
