//! Maintenance of the `metric_time_series` snapshot.
//!
//! SQLite has no materialised views, so the projection is a plain table that
//! is rebuilt in one transaction. Triggers on the source tables stamp
//! `materialized_views.dirty_since` on the first write after a refresh;
//! readers keep seeing the previous snapshot until the next rebuild.

use chrono::Utc;
use quarterly_core::financial::{FinancialLayout, RefreshReport, ViewStatus};
use tracing::info;

use crate::{
  Result, SqliteStore,
  encode::{decode_dt, encode_dt},
  schema::TIME_SERIES_VIEW,
};

const PROJECT_NORMALIZED: &str = "
INSERT INTO metric_time_series (
    symbol, company_name, year, quarter, period_label,
    metric_name, metric_label, value, currency, unit, metric_category
)
SELECT c.symbol, c.name, p.year, p.quarter, p.period_label,
       m.metric_name, m.metric_label, m.value, m.currency, m.unit, m.metric_category
FROM financial_metrics m
JOIN financial_periods p ON p.id = m.period_id
JOIN companies c         ON c.id = p.company_id
";

const PROJECT_FLAT: &str = "
INSERT INTO metric_time_series (
    symbol, company_name, year, quarter, period_label,
    metric_name, metric_label, value, currency, unit, metric_category
)
SELECT c.symbol, c.name, d.year, d.quarter,
       CASE WHEN d.quarter IS NULL THEN CAST(d.year AS TEXT)
            ELSE d.quarter || 'T' || substr(CAST(d.year AS TEXT), 3, 2) END,
       d.metric_name, NULL, d.metric_value, c.currency, d.unit, NULL
FROM financial_data d
JOIN companies c ON c.id = d.company_id
";

impl SqliteStore {
  /// Rebuild the snapshot from the layout this store writes to.
  pub(crate) async fn rebuild_time_series(&self) -> Result<RefreshReport> {
    let projection = match self.options.layout {
      FinancialLayout::Normalized => PROJECT_NORMALIZED,
      FinancialLayout::Flat => PROJECT_FLAT,
    };
    let refreshed_at = Utc::now();
    let stamp = encode_dt(refreshed_at);

    let rows = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM metric_time_series", [])?;
        let rows = tx.execute(projection, [])?;
        tx.execute(
          "UPDATE materialized_views SET refreshed_at = ?1, dirty_since = NULL WHERE name = ?2",
          rusqlite::params![stamp, TIME_SERIES_VIEW],
        )?;
        tx.commit()?;
        Ok(rows)
      })
      .await?;

    info!(view = TIME_SERIES_VIEW, rows, "refreshed snapshot");
    Ok(RefreshReport { name: TIME_SERIES_VIEW.to_owned(), rows: rows as u64, refreshed_at })
  }

  pub(crate) async fn read_time_series_status(&self) -> Result<ViewStatus> {
    let (refreshed_at, dirty_since, rows): (Option<String>, Option<String>, i64) = self
      .conn
      .call(|conn| {
        let (refreshed_at, dirty_since) = conn.query_row(
          "SELECT refreshed_at, dirty_since FROM materialized_views WHERE name = ?1",
          rusqlite::params![TIME_SERIES_VIEW],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let rows = conn.query_row("SELECT COUNT(*) FROM metric_time_series", [], |row| row.get(0))?;
        Ok((refreshed_at, dirty_since, rows))
      })
      .await?;

    Ok(ViewStatus {
      name:         TIME_SERIES_VIEW.to_owned(),
      refreshed_at: refreshed_at.as_deref().map(decode_dt).transpose()?,
      dirty_since:  dirty_since.as_deref().map(decode_dt).transpose()?,
      rows:         rows as u64,
    })
  }
}
