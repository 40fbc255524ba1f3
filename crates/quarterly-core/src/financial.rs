//! Financial facts, one decimal value per (company, period, metric).
//!
//! Two physical layouts exist for the same facts. The normalised layout
//! (`financial_periods` + `financial_metrics`) is canonical and feeds the
//! `metric_time_series` snapshot; the flat layout (`financial_data`) keeps
//! everything in one table. Callers never see the difference: both sit behind
//! [`crate::store::FinancialStore`].

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result, company::Symbol};

// ─── Period ──────────────────────────────────────────────────────────────────

/// A fiscal quarter, 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quarter(u8);

impl Quarter {
  pub fn new(q: i64) -> Result<Self> {
    match q {
      1..=4 => Ok(Self(q as u8)),
      other => Err(Error::InvalidQuarter(other)),
    }
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for Quarter {
  type Error = Error;

  fn try_from(q: i64) -> Result<Self> { Self::new(q) }
}

impl From<Quarter> for i64 {
  fn from(q: Quarter) -> Self { i64::from(q.0) }
}

impl fmt::Display for Quarter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// A reporting period. `quarter == None` marks an annual figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
  pub year:    i32,
  pub quarter: Option<Quarter>,
}

impl Period {
  pub fn quarterly(year: i32, quarter: i64) -> Result<Self> {
    Ok(Self { year, quarter: Some(Quarter::new(quarter)?) })
  }

  pub fn annual(year: i32) -> Self { Self { year, quarter: None } }

  /// Display label in the Brazilian market convention: `2T25` for the second
  /// quarter of 2025, or the bare year for annual figures.
  pub fn label(&self) -> String {
    match self.quarter {
      Some(q) => quarter_label(self.year, q),
      None => self.year.to_string(),
    }
  }
}

/// `"{quarter}T{yy}"`, e.g. `4T24`.
pub fn quarter_label(year: i32, quarter: Quarter) -> String {
  format!("{}T{:02}", quarter.get(), year.rem_euclid(100))
}

// ─── Layout ──────────────────────────────────────────────────────────────────

/// Which physical table design backs the financial facts.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FinancialLayout {
  /// `financial_periods` + `financial_metrics`, projected into
  /// `metric_time_series`.
  #[default]
  Normalized,
  /// Single `financial_data` table.
  Flat,
}

// ─── Metrics ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::FinancialStore::record_metric`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMetric {
  pub symbol:      Symbol,
  pub period:      Period,
  pub metric_name: String,
  pub value:       Decimal,
  #[serde(default)]
  pub unit:        Option<String>,
  /// Human-readable label; only persisted by the normalised layout.
  #[serde(default)]
  pub label:       Option<String>,
  #[serde(default)]
  pub currency:    Option<String>,
  #[serde(default)]
  pub category:    Option<String>,
}

impl NewMetric {
  pub fn new(
    symbol: Symbol,
    period: Period,
    metric_name: impl Into<String>,
    value: Decimal,
  ) -> Self {
    Self {
      symbol,
      period,
      metric_name: metric_name.into(),
      value,
      unit: None,
      label: None,
      currency: None,
      category: None,
    }
  }
}

/// A stored metric value, read back from either layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
  pub symbol:       Symbol,
  pub period:       Period,
  pub period_label: String,
  pub metric_name:  String,
  pub value:        Decimal,
  pub unit:         Option<String>,
  pub label:        Option<String>,
  pub currency:     Option<String>,
  pub category:     Option<String>,
}

/// A period together with all metrics reported for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodMetrics {
  pub period:       Period,
  pub period_label: String,
  pub metrics:      Vec<MetricRecord>,
}

/// One period's metric data as found in import files: label plus a list of
/// metrics.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodInput {
  pub year:         i32,
  pub quarter:      Option<i64>,
  #[serde(default)]
  pub period_label: Option<String>,
  #[serde(rename = "financial_data")]
  pub metrics:      Vec<MetricInput>,
}

/// One metric inside a [`PeriodInput`].
#[derive(Debug, Clone, Deserialize)]
pub struct MetricInput {
  pub metric_name:     String,
  #[serde(default)]
  pub metric_label:    Option<String>,
  pub value:           Decimal,
  #[serde(default)]
  pub currency:        Option<String>,
  #[serde(default)]
  pub unit:            Option<String>,
  #[serde(default)]
  pub metric_category: Option<String>,
}

impl PeriodInput {
  pub fn period(&self) -> Result<Period> {
    match self.quarter {
      Some(q) => Period::quarterly(self.year, q),
      None => Ok(Period::annual(self.year)),
    }
  }

  /// Expand into one [`NewMetric`] per entry.
  pub fn into_metrics(self, symbol: &Symbol) -> Result<Vec<NewMetric>> {
    let period = self.period()?;
    Ok(
      self
        .metrics
        .into_iter()
        .map(|m| NewMetric {
          symbol: symbol.clone(),
          period,
          metric_name: m.metric_name,
          value: m.value,
          unit: m.unit,
          label: m.metric_label,
          currency: m.currency,
          category: m.metric_category,
        })
        .collect(),
    )
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::FinancialStore::query_metrics`].
#[derive(Debug, Clone)]
pub struct MetricQuery {
  pub symbol:  Symbol,
  /// Restrict to these fiscal years; empty means all.
  pub years:   Vec<i32>,
  /// Restrict to these metric names; empty means all.
  pub metrics: Vec<String>,
  /// Maximum number of periods returned (most recent first).
  pub limit:   Option<usize>,
}

impl MetricQuery {
  pub fn for_symbol(symbol: Symbol) -> Self {
    Self { symbol, years: Vec::new(), metrics: Vec::new(), limit: None }
  }
}

/// Group records (already sorted most-recent-first) into periods, keeping at
/// most `limit` periods.
pub fn group_by_period(records: Vec<MetricRecord>, limit: Option<usize>) -> Vec<PeriodMetrics> {
  let mut out: Vec<PeriodMetrics> = Vec::new();
  for record in records {
    match out.iter_mut().find(|p| p.period == record.period) {
      Some(group) => group.metrics.push(record),
      None => out.push(PeriodMetrics {
        period:       record.period,
        period_label: record.period_label.clone(),
        metrics:      vec![record],
      }),
    }
  }
  if let Some(limit) = limit {
    out.truncate(limit);
  }
  out
}

// ─── Time series snapshot ────────────────────────────────────────────────────

/// One row of the `metric_time_series` projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
  pub symbol:       Symbol,
  pub company_name: String,
  pub period:       Period,
  pub period_label: String,
  pub metric_name:  String,
  pub label:        Option<String>,
  pub value:        Decimal,
  pub currency:     Option<String>,
  pub unit:         Option<String>,
}

/// Freshness bookkeeping for a snapshot projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewStatus {
  pub name:         String,
  /// When the snapshot was last rebuilt; `None` if never.
  pub refreshed_at: Option<DateTime<Utc>>,
  /// When the first write since the last refresh happened; `None` while the
  /// snapshot is current.
  pub dirty_since:  Option<DateTime<Utc>>,
  pub rows:         u64,
}

impl ViewStatus {
  pub fn is_dirty(&self) -> bool { self.dirty_since.is_some() }

  /// Whether pending writes have been invisible to readers for longer than
  /// `max_staleness`.
  pub fn is_overdue(&self, now: DateTime<Utc>, max_staleness: Duration) -> bool {
    let Some(since) = self.dirty_since else {
      return false;
    };
    (now - since)
      .to_std()
      .map(|age| age > max_staleness)
      .unwrap_or(false)
  }
}

/// Result of a snapshot rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
  pub name:         String,
  pub rows:         u64,
  pub refreshed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn record(year: i32, quarter: i64, name: &str) -> MetricRecord {
    let period = Period::quarterly(year, quarter).unwrap();
    MetricRecord {
      symbol: Symbol::parse("PETR4").unwrap(),
      period,
      period_label: period.label(),
      metric_name: name.into(),
      value: Decimal::new(12345, 2),
      unit: None,
      label: None,
      currency: None,
      category: None,
    }
  }

  #[test]
  fn quarter_bounds() {
    assert!(Quarter::new(0).is_err());
    assert!(Quarter::new(5).is_err());
    assert_eq!(Quarter::new(4).unwrap().get(), 4);
  }

  #[test]
  fn period_labels() {
    assert_eq!(Period::quarterly(2025, 2).unwrap().label(), "2T25");
    assert_eq!(Period::quarterly(2009, 1).unwrap().label(), "1T09");
    assert_eq!(Period::annual(2024).label(), "2024");
  }

  #[test]
  fn layout_parses_case_insensitively() {
    assert_eq!("Flat".parse::<FinancialLayout>().unwrap(), FinancialLayout::Flat);
    assert_eq!(FinancialLayout::default().as_ref(), "normalized");
  }

  #[test]
  fn grouping_preserves_order_and_limit() {
    let records = vec![
      record(2025, 2, "revenue"),
      record(2025, 2, "ebitda"),
      record(2025, 1, "revenue"),
      record(2024, 4, "revenue"),
    ];
    let grouped = group_by_period(records, Some(2));
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[0].period_label, "2T25");
    assert_eq!(grouped[0].metrics.len(), 2);
    assert_eq!(grouped[1].period_label, "1T25");
  }

  #[test]
  fn period_input_expands_metrics() {
    let raw = r#"{
      "year": 2024, "quarter": 3, "period_label": "3T24",
      "financial_data": [
        {"metric_name": "receita", "value": 123.45, "currency": "BRL"},
        {"metric_name": "ebitda", "value": "67.80"}
      ]
    }"#;
    let input: PeriodInput = serde_json::from_str(raw).unwrap();
    let metrics = input.into_metrics(&Symbol::parse("PETR4").unwrap()).unwrap();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].period.label(), "3T24");
    assert_eq!(metrics[1].value, Decimal::new(6780, 2));
  }

  #[test]
  fn overdue_only_when_dirty_long_enough() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let mut status = ViewStatus {
      name:         "metric_time_series".into(),
      refreshed_at: None,
      dirty_since:  None,
      rows:         0,
    };
    assert!(!status.is_overdue(now, Duration::from_secs(60)));

    status.dirty_since = Some(now - chrono::Duration::seconds(30));
    assert!(!status.is_overdue(now, Duration::from_secs(60)));

    status.dirty_since = Some(now - chrono::Duration::seconds(120));
    assert!(status.is_overdue(now, Duration::from_secs(60)));
  }
}
