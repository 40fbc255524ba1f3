//! Read commands over earnings calls, plus `delete-call`.

use anyhow::{Context as _, Result};
use quarterly_core::{
  company::Symbol,
  earnings::{CallFilter, CallState},
  overview::TextSearch,
  store::EarningsStore,
};

use crate::Context;

fn parse_symbol(raw: &str) -> Result<Symbol> {
  Symbol::parse(raw).with_context(|| format!("invalid symbol {raw:?}"))
}

pub async fn calls(ctx: &Context, symbol: Option<String>, pending: bool) -> Result<()> {
  let filter = CallFilter {
    symbol: symbol.as_deref().map(parse_symbol).transpose()?,
    year:   None,
    state:  pending.then_some(CallState::Pending),
  };
  let store = ctx.open_store().await?;
  let overview = store.overview(filter.symbol.clone()).await?;
  let calls = store.list_calls(&filter).await?;

  ctx.emit(&calls, || {
    for call in &calls {
      let row = overview.iter().find(|o| o.call_id == call.id);
      println!(
        "{:>5}  {:<6} {:<5} {:<9} {:>4} segments  sentiment {}",
        call.id,
        call.company_symbol,
        call.period_label(),
        match call.state() {
          CallState::Pending => "pending",
          CallState::Processed => "processed",
        },
        row.map_or(0, |o| o.segment_count),
        row
          .and_then(|o| o.overall_sentiment.or(o.avg_sentiment))
          .map_or("n/a".to_owned(), |s| format!("{s:+.3}")),
      );
    }
    if calls.is_empty() {
      println!("no calls");
    }
  })
}

pub async fn search(
  ctx: &Context,
  text: String,
  symbol: Option<String>,
  year: Option<i32>,
  limit: usize,
) -> Result<()> {
  let mut query = TextSearch::new(text);
  query.symbol = symbol.as_deref().map(parse_symbol).transpose()?;
  query.year = year;
  query.limit = limit;

  let store = ctx.open_store().await?;
  let hits = store.search_text(&query).await?;

  ctx.emit(&hits, || {
    for hit in &hits {
      println!(
        "{} {}  #{}  score {:.3}{}",
        hit.company_symbol,
        hit.period_label,
        hit.segment_id,
        hit.score,
        hit
          .sentiment_label
          .map_or(String::new(), |l| format!("  ({l})")),
      );
      println!("    {}", hit.text);
    }
    if hits.is_empty() {
      println!("no matches");
    }
  })
}

pub async fn timeline(
  ctx: &Context,
  symbol: &str,
  from: Option<i32>,
  to: Option<i32>,
) -> Result<()> {
  let symbol = parse_symbol(symbol)?;
  let store = ctx.open_store().await?;
  let points = store.sentiment_timeline(symbol, from, to).await?;

  let fmt = |v: Option<f64>| v.map_or("   n/a".to_owned(), |s| format!("{s:+.3}"));
  ctx.emit(&points, || {
    println!("period  average  overall  segments");
    for p in &points {
      println!(
        "{:<6}  {:>7}  {:>7}  {:>8}",
        p.period_label,
        fmt(p.average_sentiment),
        fmt(p.overall_sentiment),
        p.segment_count
      );
    }
  })
}

pub async fn delete_call(ctx: &Context, id: i64) -> Result<()> {
  let store = ctx.open_store().await?;
  let deleted = store.delete_call(id).await?;
  ctx.emit(&deleted, || {
    println!(
      "deleted call {} with {} segments and {} insight row(s)",
      deleted.call_id, deleted.segments, deleted.insights
    );
  })
}
