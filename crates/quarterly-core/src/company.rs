//! Companies: the listed issuers every financial fact and earnings call
//! belongs to.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum ticker length accepted by the `companies.symbol` column.
pub const MAX_SYMBOL_LEN: usize = 10;

// ─── Symbol ──────────────────────────────────────────────────────────────────

/// A validated, upper-cased ticker symbol such as `PETR4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
  /// Normalise and validate a ticker. Accepts ASCII letters, digits and `.`;
  /// lower-case input is upper-cased.
  pub fn parse(raw: &str) -> Result<Self> {
    let s = raw.trim().to_ascii_uppercase();
    let valid = !s.is_empty()
      && s.len() <= MAX_SYMBOL_LEN
      && s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.');
    if valid {
      Ok(Self(s))
    } else {
      Err(Error::InvalidSymbol(raw.to_owned()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(&self.0) }
}

impl AsRef<str> for Symbol {
  fn as_ref(&self) -> &str { &self.0 }
}

impl FromStr for Symbol {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for Symbol {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<Symbol> for String {
  fn from(s: Symbol) -> Self { s.0 }
}

// ─── Company ─────────────────────────────────────────────────────────────────

/// A persisted company row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
  pub id:         i64,
  pub symbol:     Symbol,
  pub name:       String,
  pub sector:     Option<String>,
  pub country:    Option<String>,
  pub currency:   Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::FinancialStore::upsert_company`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewCompany {
  pub symbol:   Symbol,
  pub name:     String,
  #[serde(default)]
  pub sector:   Option<String>,
  #[serde(default)]
  pub country:  Option<String>,
  #[serde(default)]
  pub currency: Option<String>,
}

impl NewCompany {
  pub fn new(symbol: Symbol, name: impl Into<String>) -> Self {
    Self {
      symbol,
      name: name.into(),
      sector: None,
      country: None,
      currency: None,
    }
  }
}

/// The reference companies every fresh database is seeded with.
///
/// Must stay in step with the seed `INSERT` in the `financial_core`
/// migration.
pub fn reference_companies() -> Vec<NewCompany> {
  [
    ("PETR4", "Petróleo Brasileiro S.A. - Petrobras", "Energia"),
    ("VALE3", "Vale S.A.", "Mineração"),
  ]
  .into_iter()
  .map(|(symbol, name, sector)| NewCompany {
    symbol:   Symbol(symbol.to_owned()),
    name:     name.to_owned(),
    sector:   Some(sector.to_owned()),
    country:  Some("Brasil".to_owned()),
    currency: Some("BRL".to_owned()),
  })
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn symbol_is_upper_cased() {
    assert_eq!(Symbol::parse(" petr4 ").unwrap().as_str(), "PETR4");
  }

  #[test]
  fn symbol_rejects_bad_input() {
    assert!(Symbol::parse("").is_err());
    assert!(Symbol::parse("TOOLONGSYMBOL").is_err());
    assert!(Symbol::parse("PETR 4").is_err());
    assert!(Symbol::parse("VALE3;--").is_err());
    assert!(Symbol::parse("BRK-B").is_err());
  }

  #[test]
  fn symbol_accepts_class_suffix() {
    assert_eq!(Symbol::parse("brk.b").unwrap().as_str(), "BRK.B");
  }

  #[test]
  fn reference_companies_are_valid_symbols() {
    for c in reference_companies() {
      assert_eq!(Symbol::parse(c.symbol.as_str()).unwrap(), c.symbol);
    }
  }
}
