//! Schema and maintenance commands: `setup`, `migrate`, `verify`, `status`,
//! `check` and `refresh`.

use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use quarterly_core::{
  earnings::{CallFilter, CallState},
  financial::ViewStatus,
  store::{EarningsStore, FinancialStore},
};
use quarterly_store_sqlite::{
  CapabilityReport, CapabilityStatus, MigrateMode, MigrationReport, SqliteStore, TableCount,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::Context;

// ─── Setup ────────────────────────────────────────────────────────────────────

/// Connection test, migrations, capability check, seed, verification. Stops
/// at the first failing step; a missing optional capability only warns.
pub async fn setup(ctx: &Context) -> Result<()> {
  match run_setup(ctx).await {
    Ok(summary) => {
      ctx.notifier.send(&summary).await;
      println!("{summary}");
      Ok(())
    }
    Err(e) => {
      ctx.notifier.send(&format!("quarterly setup failed: {e:#}")).await;
      Err(e)
    }
  }
}

async fn run_setup(ctx: &Context) -> Result<String> {
  let target = ctx.settings.database_target()?;

  let store = SqliteStore::connect(&target, ctx.settings.store_options())
    .await
    .with_context(|| format!("cannot open {target}"))?;
  store
    .ping()
    .await
    .with_context(|| format!("cannot reach {target}"))?;
  println!("[1/5] connection   ok ({target})");

  let report = store.migrate(MigrateMode::Pending).await?;
  println!("[2/5] migrations   {}", describe_migrations(&report));

  let capabilities = store.ensure_capabilities().await?;
  println!("[3/5] capabilities {}", describe_capabilities(&capabilities));
  for (capability, status) in &capabilities.entries {
    if let CapabilityStatus::Missing { reason } = status {
      println!("      warning: {capability} unavailable: {reason}");
    }
  }

  let seeded = store.seed_reference_companies().await?;
  println!("[4/5] seed         {seeded} reference companies added");

  let tables = store.verify().await?;
  println!("[5/5] verify       {} tables and views", tables.len());
  print_tables(&tables);

  Ok(format!(
    "quarterly setup complete: schema v{}, vector search {}",
    report.version,
    if capabilities.vector_search() { "indexed" } else { "scan" },
  ))
}

// ─── Migrate / verify ─────────────────────────────────────────────────────────

pub async fn migrate(ctx: &Context, reapply: bool) -> Result<()> {
  let target = ctx.settings.database_target()?;
  let store = SqliteStore::connect(&target, ctx.settings.store_options()).await?;
  let mode = if reapply { MigrateMode::Reapply } else { MigrateMode::Pending };

  let report = match store.migrate(mode).await {
    Ok(report) => report,
    Err(e) => {
      ctx.notifier.send(&format!("quarterly migration failed: {e}")).await;
      return Err(e).context("migration failed");
    }
  };

  let summary = format!("migrations: {}", describe_migrations(&report));
  ctx.notifier.send(&summary).await;
  let applied: Vec<_> = report
    .applied
    .iter()
    .chain(&report.reapplied)
    .map(|m| serde_json::json!({ "version": m.version, "name": m.name }))
    .collect();
  ctx.emit(&serde_json::json!({ "version": report.version, "ran": applied }), || {
    println!("{summary}");
  })
}

pub async fn verify(ctx: &Context) -> Result<()> {
  let target = ctx.settings.database_target()?;
  let store = SqliteStore::connect(&target, ctx.settings.store_options()).await?;
  let tables = store.verify().await?;

  let rows: Vec<_> = tables
    .iter()
    .map(|t| serde_json::json!({ "name": t.name, "kind": t.kind, "rows": t.rows }))
    .collect();
  ctx.emit(&rows, || print_tables(&tables))
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusReport {
  schema_version:  i64,
  migrations:      Vec<String>,
  capabilities:    Vec<(String, String)>,
  time_series:     ViewStatus,
  overdue:         bool,
  pending_calls:   usize,
  processed_calls: usize,
}

pub async fn status(ctx: &Context) -> Result<()> {
  let store = ctx.open_store().await?;
  let capabilities = store.ensure_capabilities().await?;
  let time_series = store.time_series_status().await?;
  let overdue = time_series.is_overdue(Utc::now(), ctx.settings.max_staleness());

  let count = |state| CallFilter { state: Some(state), ..Default::default() };
  let pending_calls = store.list_calls(&count(CallState::Pending)).await?.len();
  let processed_calls = store.list_calls(&count(CallState::Processed)).await?.len();

  let report = StatusReport {
    schema_version: store.schema_version().await?,
    migrations: store
      .applied_migrations()
      .await?
      .into_iter()
      .map(|m| format!("{:03} {} ({})", m.version, m.name, m.applied_at))
      .collect(),
    capabilities: capabilities
      .entries
      .iter()
      .map(|(c, s)| (c.to_string(), status_word(s).to_owned()))
      .collect(),
    time_series,
    overdue,
    pending_calls,
    processed_calls,
  };

  ctx.emit(&report, || {
    println!("schema version   {}", report.schema_version);
    for m in &report.migrations {
      println!("  {m}");
    }
    for (name, status) in &report.capabilities {
      println!("{name:<16} {status}");
    }
    let ts = &report.time_series;
    println!(
      "{:<16} {} rows, refreshed {}, {}",
      ts.name,
      ts.rows,
      ts.refreshed_at.map_or("never".to_owned(), |t| t.to_rfc3339()),
      match (ts.dirty_since, report.overdue) {
        (None, _) => "current".to_owned(),
        (Some(since), false) => format!("dirty since {}", since.to_rfc3339()),
        (Some(since), true) => format!("OVERDUE (dirty since {})", since.to_rfc3339()),
      },
    );
    println!("calls            {} pending, {} processed", report.pending_calls, report.processed_calls);
  })
}

// ─── Check ────────────────────────────────────────────────────────────────────

/// Configuration, database connectivity and (when a key is configured) the
/// analysis provider.
pub async fn check(ctx: &Context) -> Result<()> {
  let mut failures = 0;

  let target = match ctx.settings.database_target() {
    Ok(target) => {
      println!("config     ok");
      Some(target)
    }
    Err(e) => {
      println!("config     FAILED: {e:#}");
      failures += 1;
      None
    }
  };

  if let Some(target) = target {
    let reachable = match SqliteStore::connect(&target, ctx.settings.store_options()).await {
      Ok(store) => match store.ping().await {
        Ok(()) => store.schema_version().await,
        Err(e) => Err(e),
      },
      Err(e) => Err(e),
    };
    match reachable {
      Ok(version) => println!("database   ok ({target}, schema v{version})"),
      Err(e) => {
        println!("database   FAILED: {e}");
        failures += 1;
      }
    }
  }

  match &ctx.settings.openai_api_key {
    None => println!("provider   skipped (OPENAI_API_KEY not set)"),
    Some(key) => match ping_provider(&ctx.settings.provider_url, key).await {
      Ok(()) => println!("provider   ok ({})", ctx.settings.provider_url),
      Err(e) => {
        println!("provider   FAILED: {e:#}");
        failures += 1;
      }
    },
  }

  if failures > 0 {
    bail!("{failures} check(s) failed");
  }
  Ok(())
}

async fn ping_provider(base_url: &str, key: &str) -> Result<()> {
  let client = Client::builder()
    .timeout(Duration::from_secs(15))
    .build()
    .context("failed to build HTTP client")?;
  let url = format!("{}/models", base_url.trim_end_matches('/'));
  let resp = client
    .get(&url)
    .bearer_auth(key)
    .send()
    .await
    .with_context(|| format!("GET {url} failed"))?;
  if !resp.status().is_success() {
    bail!("GET {url} → {}", resp.status());
  }
  Ok(())
}

// ─── Refresh ──────────────────────────────────────────────────────────────────

pub async fn refresh(ctx: &Context, watch: bool) -> Result<()> {
  let store = ctx.open_store().await?;

  if !watch {
    let report = store.refresh_time_series().await?;
    let summary = format!("{} refreshed: {} rows", report.name, report.rows);
    ctx.notifier.send(&summary).await;
    return ctx.emit(&report, || println!("{summary}"));
  }

  let period = ctx.settings.refresh_interval();
  let max_staleness = ctx.settings.max_staleness();
  info!(interval_secs = period.as_secs(), "watching metric_time_series");

  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = tokio::signal::ctrl_c() => {
        info!("stopping refresher");
        return Ok(());
      }
    }

    let status = store.time_series_status().await?;
    if !status.is_dirty() {
      continue;
    }
    if status.is_overdue(Utc::now(), max_staleness) {
      warn!(dirty_since = ?status.dirty_since, "snapshot exceeded the staleness bound");
    }
    match store.refresh_time_series().await {
      Ok(report) => {
        ctx
          .notifier
          .send(&format!("{} refreshed: {} rows", report.name, report.rows))
          .await;
      }
      // Keep watching; the next tick retries while the snapshot stays dirty.
      Err(error) => warn!(%error, "scheduled refresh failed"),
    }
  }
}

// ─── Formatting ───────────────────────────────────────────────────────────────

fn describe_migrations(report: &MigrationReport) -> String {
  format!(
    "{} applied, {} reapplied, {} already current; schema v{}",
    report.applied.len(),
    report.reapplied.len(),
    report.skipped.len(),
    report.version,
  )
}

fn describe_capabilities(report: &CapabilityReport) -> String {
  report
    .entries
    .iter()
    .map(|(c, s)| format!("{c}={}", status_word(s)))
    .collect::<Vec<_>>()
    .join(", ")
}

fn status_word(status: &CapabilityStatus) -> &'static str {
  match status {
    CapabilityStatus::Available => "available",
    CapabilityStatus::Remediated => "loaded",
    CapabilityStatus::Missing { .. } => "missing",
  }
}

fn print_tables(tables: &[TableCount]) {
  for t in tables {
    println!("      {:<28} {:<5} {:>8}", t.name, t.kind, t.rows);
  }
}
