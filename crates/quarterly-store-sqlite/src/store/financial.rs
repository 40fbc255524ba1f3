//! [`FinancialStore`] over both financial layouts.

use quarterly_core::{
  company::{Company, NewCompany, Symbol, reference_companies},
  financial::{
    FinancialLayout, MetricPoint, MetricQuery, NewMetric, Period, PeriodMetrics, RefreshReport,
    ViewStatus, group_by_period,
  },
  store::FinancialStore,
};
use rusqlite::OptionalExtension as _;

use super::{SqliteStore, company_id, is_constraint_violation};
use crate::{
  Error, Result,
  encode::{
    COMPANY_COLUMNS, POINT_COLUMNS, RawCompany, RawMetric, RawPoint, decode_period, encode_period,
  },
};

/// Column values of one metric, ready to bind.
struct MetricRow {
  name:     String,
  label:    Option<String>,
  value:    String,
  currency: Option<String>,
  unit:     Option<String>,
  category: Option<String>,
}

impl From<NewMetric> for MetricRow {
  fn from(m: NewMetric) -> Self {
    Self {
      name:     m.metric_name,
      label:    m.label,
      value:    m.value.to_string(),
      currency: m.currency,
      unit:     m.unit,
      category: m.category,
    }
  }
}

/// Outcome of a metric write, decided inside the connection thread.
enum MetricWrite {
  Written(u64),
  UnknownCompany,
  Duplicate(String),
}

/// Find or create the `financial_periods` row for a company period.
fn period_id(
  conn: &rusqlite::Connection,
  company_id: i64,
  period: Period,
) -> rusqlite::Result<i64> {
  let (year, quarter) = encode_period(period);
  conn.execute(
    "INSERT INTO financial_periods (company_id, year, quarter, period_label)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT DO NOTHING",
    rusqlite::params![company_id, year, quarter, period.label()],
  )?;
  conn.query_row(
    "SELECT id FROM financial_periods
     WHERE company_id = ?1 AND year = ?2 AND COALESCE(quarter, 0) = COALESCE(?3, 0)",
    rusqlite::params![company_id, year, quarter],
    |row| row.get(0),
  )
}

/// Insert `rows` for one company period into the active layout. Stops at the
/// first duplicate and reports its metric name.
fn insert_metrics(
  conn: &rusqlite::Connection,
  layout: FinancialLayout,
  company_id: i64,
  period: Period,
  rows: &[MetricRow],
) -> rusqlite::Result<MetricWrite> {
  let (year, quarter) = encode_period(period);
  let target = match layout {
    FinancialLayout::Normalized => Some(period_id(conn, company_id, period)?),
    FinancialLayout::Flat => None,
  };

  for row in rows {
    let result = match target {
      Some(period_id) => conn.execute(
        "INSERT INTO financial_metrics
           (period_id, metric_name, metric_label, value, currency, unit, metric_category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
          period_id,
          row.name,
          row.label,
          row.value,
          row.currency,
          row.unit,
          row.category,
        ],
      ),
      None => conn.execute(
        "INSERT INTO financial_data (company_id, year, quarter, metric_name, metric_value, unit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![company_id, year, quarter, row.name, row.value, row.unit],
      ),
    };
    match result {
      Ok(_) => {}
      Err(e) if is_constraint_violation(&e) => return Ok(MetricWrite::Duplicate(row.name.clone())),
      Err(e) => return Err(e),
    }
  }
  Ok(MetricWrite::Written(rows.len() as u64))
}

impl SqliteStore {
  async fn read_metrics(&self, symbol: &Symbol) -> Result<Vec<RawMetric>> {
    let sql = match self.options.layout {
      FinancialLayout::Normalized => {
        "SELECT c.symbol, p.year, p.quarter, p.period_label, m.metric_name, m.value,
                m.unit, m.metric_label, m.currency, m.metric_category
         FROM financial_metrics m
         JOIN financial_periods p ON p.id = m.period_id
         JOIN companies c         ON c.id = p.company_id
         WHERE c.symbol = ?1
         ORDER BY p.year DESC, COALESCE(p.quarter, 0) DESC, m.metric_name"
      }
      FinancialLayout::Flat => {
        "SELECT c.symbol, d.year, d.quarter, NULL, d.metric_name, d.metric_value,
                d.unit, NULL, c.currency, NULL
         FROM financial_data d
         JOIN companies c ON c.id = d.company_id
         WHERE c.symbol = ?1
         ORDER BY d.year DESC, COALESCE(d.quarter, 0) DESC, d.metric_name"
      }
    };
    let symbol = symbol.as_str().to_owned();

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params![symbol], RawMetric::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws)
  }
}

// ─── FinancialStore impl ─────────────────────────────────────────────────────

impl FinancialStore for SqliteStore {
  type Error = Error;

  // ── Companies ─────────────────────────────────────────────────────────────

  async fn upsert_company(&self, company: NewCompany) -> Result<Company> {
    let NewCompany { symbol, name, sector, country, currency } = company;
    let symbol = symbol.as_str().to_owned();

    let raw: RawCompany = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO companies (symbol, name, sector, country, currency)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(symbol) DO UPDATE SET
             name     = excluded.name,
             sector   = COALESCE(excluded.sector,   companies.sector),
             country  = COALESCE(excluded.country,  companies.country),
             currency = COALESCE(excluded.currency, companies.currency)",
          rusqlite::params![symbol, name, sector, country, currency],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE symbol = ?1"),
          rusqlite::params![symbol],
          RawCompany::from_row,
        )?)
      })
      .await?;

    raw.into_company()
  }

  async fn get_company(&self, symbol: Symbol) -> Result<Option<Company>> {
    let symbol = symbol.as_str().to_owned();

    let raw: Option<RawCompany> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE symbol = ?1"),
              rusqlite::params![symbol],
              RawCompany::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCompany::into_company).transpose()
  }

  async fn list_companies(&self) -> Result<Vec<Company>> {
    let raws: Vec<RawCompany> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {COMPANY_COLUMNS} FROM companies ORDER BY symbol"))?;
        let rows = stmt
          .query_map([], RawCompany::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCompany::into_company).collect()
  }

  async fn seed_reference_companies(&self) -> Result<u64> {
    let companies = reference_companies();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        for c in &companies {
          inserted += tx.execute(
            "INSERT INTO companies (symbol, name, sector, country, currency)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(symbol) DO NOTHING",
            rusqlite::params![c.symbol.as_str(), c.name, c.sector, c.country, c.currency],
          )? as u64;
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    Ok(inserted)
  }

  // ── Metrics ───────────────────────────────────────────────────────────────

  async fn record_metric(&self, metric: NewMetric) -> Result<()> {
    let symbol = metric.symbol.clone();
    let period = metric.period;
    let layout = self.options.layout;
    let sym = symbol.as_str().to_owned();
    let row = MetricRow::from(metric);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(company_id) = company_id(&tx, &sym)? else {
          return Ok(MetricWrite::UnknownCompany);
        };
        let outcome = insert_metrics(&tx, layout, company_id, period, std::slice::from_ref(&row))?;
        if let MetricWrite::Written(_) = outcome {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?;

    match outcome {
      MetricWrite::Written(_) => Ok(()),
      MetricWrite::UnknownCompany => Err(Error::UnknownCompany(symbol)),
      MetricWrite::Duplicate(metric) => Err(Error::duplicate_metric(symbol, period, metric)),
    }
  }

  async fn replace_period_metrics(
    &self,
    symbol:  Symbol,
    period:  Period,
    metrics: Vec<NewMetric>,
  ) -> Result<u64> {
    let layout = self.options.layout;
    let sym = symbol.as_str().to_owned();
    // Rows are written under `symbol`/`period`; the metrics' own keys are not
    // consulted.
    let rows: Vec<MetricRow> = metrics.into_iter().map(MetricRow::from).collect();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(company_id) = company_id(&tx, &sym)? else {
          return Ok(MetricWrite::UnknownCompany);
        };
        let (year, quarter) = encode_period(period);
        match layout {
          FinancialLayout::Normalized => {
            let period_id = period_id(&tx, company_id, period)?;
            tx.execute(
              "DELETE FROM financial_metrics WHERE period_id = ?1",
              rusqlite::params![period_id],
            )?;
          }
          FinancialLayout::Flat => {
            tx.execute(
              "DELETE FROM financial_data
               WHERE company_id = ?1 AND year = ?2 AND COALESCE(quarter, 0) = COALESCE(?3, 0)",
              rusqlite::params![company_id, year, quarter],
            )?;
          }
        }
        let outcome = insert_metrics(&tx, layout, company_id, period, &rows)?;
        if let MetricWrite::Written(_) = outcome {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?;

    match outcome {
      MetricWrite::Written(n) => Ok(n),
      MetricWrite::UnknownCompany => Err(Error::UnknownCompany(symbol)),
      MetricWrite::Duplicate(metric) => Err(Error::duplicate_metric(symbol, period, metric)),
    }
  }

  async fn query_metrics<'a>(&'a self, query: &'a MetricQuery) -> Result<Vec<PeriodMetrics>> {
    let records = self
      .read_metrics(&query.symbol)
      .await?
      .into_iter()
      .filter(|r| {
        query.years.is_empty() || i32::try_from(r.year).is_ok_and(|y| query.years.contains(&y))
      })
      .filter(|r| query.metrics.is_empty() || query.metrics.contains(&r.metric_name))
      .map(RawMetric::into_record)
      .collect::<Result<Vec<_>>>()?;

    Ok(group_by_period(records, query.limit))
  }

  async fn available_metrics(&self, symbol: Symbol) -> Result<Vec<String>> {
    let mut names: Vec<String> = self
      .read_metrics(&symbol)
      .await?
      .into_iter()
      .map(|r| r.metric_name)
      .collect();
    names.sort();
    names.dedup();
    Ok(names)
  }

  async fn available_periods(&self, symbol: Symbol) -> Result<Vec<Period>> {
    let mut periods: Vec<Period> = Vec::new();
    for raw in self.read_metrics(&symbol).await? {
      let period = decode_period(raw.year, raw.quarter)?;
      // Rows arrive most recent first, so each period's rows are adjacent.
      if periods.last() != Some(&period) {
        periods.push(period);
      }
    }
    Ok(periods)
  }

  // ── Time series snapshot ──────────────────────────────────────────────────

  async fn time_series(&self, symbol: Symbol, metric_name: String) -> Result<Vec<MetricPoint>> {
    let symbol = symbol.as_str().to_owned();

    let raws: Vec<RawPoint> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {POINT_COLUMNS} FROM metric_time_series
           WHERE symbol = ?1 AND metric_name = ?2
           ORDER BY year DESC, COALESCE(quarter, 0) DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![symbol, metric_name], RawPoint::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPoint::into_point).collect()
  }

  async fn refresh_time_series(&self) -> Result<RefreshReport> { self.rebuild_time_series().await }

  async fn time_series_status(&self) -> Result<ViewStatus> { self.read_time_series_status().await }
}
