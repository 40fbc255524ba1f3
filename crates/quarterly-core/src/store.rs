//! The `FinancialStore` and `EarningsStore` traits.
//!
//! Both are implemented by storage backends (e.g. `quarterly-store-sqlite`).
//! The operator binary depends on these abstractions, not on a concrete
//! backend, and never on the physical table layout behind them.

use std::future::Future;

use crate::{
  company::{Company, NewCompany, Symbol},
  earnings::{
    CallFilter, CallInsight, CallSegment, DeletedCall, EarningsCall, NewEarningsCall, NewInsight,
    NewSegment,
  },
  financial::{
    MetricPoint, MetricQuery, NewMetric, Period, PeriodMetrics, Quarter, RefreshReport, ViewStatus,
  },
  overview::{CallHighlights, CallOverview, SegmentHit, SimilaritySearch, TextSearch, TimelinePoint},
};

// ─── Financial facts ─────────────────────────────────────────────────────────

/// Companies and their per-period financial metrics.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait FinancialStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Companies ─────────────────────────────────────────────────────────

  /// Insert a company, or update name/sector/country/currency if the symbol
  /// already exists.
  fn upsert_company(
    &self,
    company: NewCompany,
  ) -> impl Future<Output = Result<Company, Self::Error>> + Send + '_;

  fn get_company(
    &self,
    symbol: Symbol,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + '_;

  /// All companies ordered by symbol.
  fn list_companies(&self) -> impl Future<Output = Result<Vec<Company>, Self::Error>> + Send + '_;

  /// Insert the reference companies, leaving existing rows untouched.
  /// Returns the number of rows actually inserted.
  fn seed_reference_companies(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Metrics ───────────────────────────────────────────────────────────

  /// Record one metric value. A second value for the same
  /// (company, period, metric) is rejected; the stored row is unchanged.
  fn record_metric(
    &self,
    metric: NewMetric,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace every metric of one company period with `metrics` in a single
  /// transaction. Returns the number of metrics written.
  fn replace_period_metrics(
    &self,
    symbol: Symbol,
    period: Period,
    metrics: Vec<NewMetric>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Live read of stored metrics, grouped by period, most recent first.
  fn query_metrics<'a>(
    &'a self,
    query: &'a MetricQuery,
  ) -> impl Future<Output = Result<Vec<PeriodMetrics>, Self::Error>> + Send + 'a;

  /// Distinct metric names recorded for `symbol`.
  fn available_metrics(
    &self,
    symbol: Symbol,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Distinct periods recorded for `symbol`, most recent first.
  fn available_periods(
    &self,
    symbol: Symbol,
  ) -> impl Future<Output = Result<Vec<Period>, Self::Error>> + Send + '_;

  // ── Time series snapshot ──────────────────────────────────────────────

  /// Read one metric's history for a company, most recent first.
  ///
  /// Backends may serve this from a snapshot; writes become visible only after
  /// [`FinancialStore::refresh_time_series`].
  fn time_series(
    &self,
    symbol: Symbol,
    metric_name: String,
  ) -> impl Future<Output = Result<Vec<MetricPoint>, Self::Error>> + Send + '_;

  /// Rebuild the time series snapshot from the underlying tables.
  fn refresh_time_series(&self) -> impl Future<Output = Result<RefreshReport, Self::Error>> + Send + '_;

  /// Freshness of the time series snapshot.
  fn time_series_status(&self) -> impl Future<Output = Result<ViewStatus, Self::Error>> + Send + '_;
}

// ─── Earnings calls ──────────────────────────────────────────────────────────

/// Earnings calls and their derived analysis.
pub trait EarningsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Calls ─────────────────────────────────────────────────────────────

  /// Register a call, or update the source metadata of the existing call for
  /// the same (symbol, year, quarter). Processing state is never reset.
  fn register_call(
    &self,
    call: NewEarningsCall,
  ) -> impl Future<Output = Result<EarningsCall, Self::Error>> + Send + '_;

  fn get_call(
    &self,
    call_id: i64,
  ) -> impl Future<Output = Result<Option<EarningsCall>, Self::Error>> + Send + '_;

  fn find_call(
    &self,
    symbol: Symbol,
    year: i32,
    quarter: Quarter,
  ) -> impl Future<Output = Result<Option<EarningsCall>, Self::Error>> + Send + '_;

  /// Calls matching `filter`, most recent period first.
  fn list_calls<'a>(
    &'a self,
    filter: &'a CallFilter,
  ) -> impl Future<Output = Result<Vec<EarningsCall>, Self::Error>> + Send + 'a;

  /// Move a call from pending to processed. Fails if it is already processed.
  fn mark_processed(
    &self,
    call_id: i64,
  ) -> impl Future<Output = Result<EarningsCall, Self::Error>> + Send + '_;

  /// Delete a call together with all of its segments and its insight.
  fn delete_call(
    &self,
    call_id: i64,
  ) -> impl Future<Output = Result<DeletedCall, Self::Error>> + Send + '_;

  // ── Analysis ──────────────────────────────────────────────────────────

  /// Insert a segment, or overwrite the segment with the same number.
  fn save_segment(
    &self,
    call_id: i64,
    segment: NewSegment,
  ) -> impl Future<Output = Result<CallSegment, Self::Error>> + Send + '_;

  /// Save several segments in one transaction.
  fn save_segments(
    &self,
    call_id: i64,
    segments: Vec<NewSegment>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Segments of a call ordered by segment number.
  fn segments(
    &self,
    call_id: i64,
  ) -> impl Future<Output = Result<Vec<CallSegment>, Self::Error>> + Send + '_;

  /// Insert or replace the call's single insight row.
  fn save_insight(
    &self,
    call_id: i64,
    insight: NewInsight,
  ) -> impl Future<Output = Result<CallInsight, Self::Error>> + Send + '_;

  fn get_insight(
    &self,
    call_id: i64,
  ) -> impl Future<Output = Result<Option<CallInsight>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Rows of the always-current call overview, optionally for one company.
  fn overview(
    &self,
    symbol: Option<Symbol>,
  ) -> impl Future<Output = Result<Vec<CallOverview>, Self::Error>> + Send + '_;

  fn search_text<'a>(
    &'a self,
    query: &'a TextSearch,
  ) -> impl Future<Output = Result<Vec<SegmentHit>, Self::Error>> + Send + 'a;

  fn search_similar<'a>(
    &'a self,
    query: &'a SimilaritySearch,
  ) -> impl Future<Output = Result<Vec<SegmentHit>, Self::Error>> + Send + 'a;

  /// Per-call sentiment for a company in chronological order.
  fn sentiment_timeline(
    &self,
    symbol: Symbol,
    start_year: Option<i32>,
    end_year: Option<i32>,
  ) -> impl Future<Output = Result<Vec<TimelinePoint>, Self::Error>> + Send + '_;

  /// The `limit` most positive and most negative segments of one call.
  /// Returns `None` if the call does not exist.
  fn call_highlights(
    &self,
    symbol: Symbol,
    year: i32,
    quarter: Quarter,
    limit: usize,
  ) -> impl Future<Output = Result<Option<CallHighlights>, Self::Error>> + Send + '_;
}
