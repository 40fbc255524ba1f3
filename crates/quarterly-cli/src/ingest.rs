//! File imports: per-period financial metrics and analysed earnings calls.
//!
//! Both commands are idempotent. Re-importing financials replaces each
//! period's metrics; re-ingesting a pending call upserts its segments. A call
//! that is already processed is refused until it is deleted.

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use quarterly_core::{
  company::{NewCompany, Symbol},
  earnings::{CallState, NewEarningsCall, NewSegment},
  financial::PeriodInput,
  insights::{SegmentAnalysis, summarize},
  store::{EarningsStore, FinancialStore},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Context;

// ─── File formats ─────────────────────────────────────────────────────────────

/// `import-financials` input: one company, any number of periods.
#[derive(Debug, Deserialize)]
pub struct FinancialsFile {
  pub symbol:  Symbol,
  /// Registers (or renames) the company before importing when present.
  #[serde(default)]
  pub name:    Option<String>,
  #[serde(default)]
  pub sector:  Option<String>,
  pub periods: Vec<PeriodInput>,
}

/// `ingest-call` input: call metadata plus analysed transcript segments.
#[derive(Debug, Deserialize)]
pub struct CallFile {
  pub call:     NewEarningsCall,
  #[serde(default)]
  pub segments: Vec<SegmentAnalysis>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
  pub symbol:  Symbol,
  pub periods: Vec<(String, u64)>,
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
  pub call_id:           i64,
  pub symbol:            Symbol,
  pub period_label:      String,
  pub segments:          u64,
  pub overall_sentiment: Option<f64>,
  pub key_topics:        Vec<String>,
}

impl IngestSummary {
  fn message(&self) -> String {
    format!(
      "{} {} processed: {} segments, overall sentiment {}, key topics: {}",
      self.symbol,
      self.period_label,
      self.segments,
      self
        .overall_sentiment
        .map_or("n/a".to_owned(), |s| format!("{s:+.3}")),
      if self.key_topics.is_empty() {
        "none".to_owned()
      } else {
        self.key_topics.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
      },
    )
  }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

// ─── import-financials ────────────────────────────────────────────────────────

pub async fn import_financials(ctx: &Context, path: &Path) -> Result<()> {
  let file: FinancialsFile = read_json(path)?;
  let store = ctx.open_store().await?;

  let summary = store_financials(&store, file).await?;
  let total: u64 = summary.periods.iter().map(|(_, n)| n).sum();
  let message = format!(
    "{}: imported {} metrics across {} periods",
    summary.symbol,
    total,
    summary.periods.len()
  );
  ctx.notifier.send(&message).await;
  ctx.emit(&summary, || {
    for (label, n) in &summary.periods {
      println!("{label:<6} {n} metrics");
    }
    println!("{message}");
    println!("run `quarterly refresh` to publish the new figures to metric_time_series");
  })
}

/// Write every period of `file`, replacing what each period held before.
pub async fn store_financials<S: FinancialStore>(
  store: &S,
  file: FinancialsFile,
) -> Result<ImportSummary> {
  let FinancialsFile { symbol, name, sector, periods } = file;

  if let Some(name) = name {
    let mut company = NewCompany::new(symbol.clone(), name);
    company.sector = sector;
    store.upsert_company(company).await?;
  }

  let mut written = Vec::with_capacity(periods.len());
  for input in periods {
    let period = input.period()?;
    if let Some(label) = &input.period_label
      && *label != period.label()
    {
      warn!(given = %label, derived = %period.label(), "period label ignored");
    }
    let metrics = input.into_metrics(&symbol)?;
    let n = store
      .replace_period_metrics(symbol.clone(), period, metrics)
      .await
      .with_context(|| format!("importing {} {}", symbol, period.label()))?;
    info!(%symbol, period = %period.label(), metrics = n, "imported period");
    written.push((period.label(), n));
  }

  Ok(ImportSummary { symbol, periods: written })
}

// ─── ingest-call ──────────────────────────────────────────────────────────────

pub async fn ingest_call(ctx: &Context, path: &Path) -> Result<()> {
  let file: CallFile = read_json(path)?;
  let store = ctx.open_store().await?;

  let result = store_call(&store, file, ctx.settings.ingest_limits()).await;

  match result {
    Ok(summary) => {
      let message = summary.message();
      ctx.notifier.send(&message).await;
      ctx.emit(&summary, || println!("{message}"))
    }
    Err(e) => {
      ctx.notifier.send(&format!("ingest of {} failed: {e:#}", path.display())).await;
      Err(e)
    }
  }
}

/// Bounds applied to an `ingest-call` before anything is written.
#[derive(Debug, Clone, Copy)]
pub struct IngestLimits {
  /// Segments per write batch.
  pub chunk_size:           usize,
  /// Largest accepted audio `file_size`, in bytes.
  pub max_file_size:        u64,
  pub embedding_dimensions: usize,
}

/// Register the call, write its segments in batches of `chunk_size`, store
/// the aggregated insight and mark the call processed.
///
/// Every check that can refuse the file (size, existing processed call,
/// embedding length) runs before the first write.
pub async fn store_call<S: EarningsStore>(
  store: &S,
  file: CallFile,
  limits: IngestLimits,
) -> Result<IngestSummary> {
  let CallFile { call, segments } = file;
  let max_file_size = limits.max_file_size;

  if let Some(size) = call.file_size
    && u64::try_from(size).is_ok_and(|s| s > max_file_size)
  {
    bail!(
      "audio file of {} {} is {size} bytes, above the {max_file_size} byte limit",
      call.company_symbol,
      call.year,
    );
  }

  if let Some(existing) = store
    .find_call(call.company_symbol.clone(), call.year, call.quarter)
    .await?
    && existing.state() == CallState::Processed
  {
    bail!(
      "call {} ({} {}) is already processed; delete it first to re-ingest",
      existing.id,
      existing.company_symbol,
      existing.period_label()
    );
  }

  for analysis in &segments {
    if let Some(embedding) = &analysis.segment.embedding {
      embedding
        .ensure_dimensions(limits.embedding_dimensions)
        .with_context(|| format!("segment {}", analysis.segment.segment_number))?;
    }
  }

  let call = store.register_call(call).await?;
  info!(call_id = call.id, symbol = %call.company_symbol, period = %call.period_label(), "registered call");

  let rows: Vec<NewSegment> = segments.iter().map(|a| a.segment.clone()).collect();
  let mut written = 0;
  for (i, chunk) in rows.chunks(limits.chunk_size.max(1)).enumerate() {
    written += store
      .save_segments(call.id, chunk.to_vec())
      .await
      .with_context(|| format!("writing segment batch {}", i + 1))?;
    info!(call_id = call.id, batch = i + 1, written, total = rows.len(), "saved segments");
  }

  let insight = summarize(&segments);
  let overall_sentiment = insight.overall_sentiment.map(|s| s.get());
  let key_topics = insight.key_topics.clone();
  store.save_insight(call.id, insight).await?;
  store.mark_processed(call.id).await?;

  Ok(IngestSummary {
    call_id: call.id,
    symbol: call.company_symbol.clone(),
    period_label: call.period_label(),
    segments: written,
    overall_sentiment,
    key_topics,
  })
}
