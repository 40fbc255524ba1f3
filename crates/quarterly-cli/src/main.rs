//! `quarterly`: operator CLI for the quarterly earnings store.
//!
//! # Usage
//!
//! ```text
//! DATABASE_URL=sqlite://quarterly.db quarterly setup
//! quarterly --config quarterly.toml ingest-call pipeline_output/PETR4_2025Q2_processed.json
//! quarterly search "produção de petróleo" --symbol PETR4
//! ```

mod admin;
mod ingest;
mod notify;
mod query;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use notify::Notifier;
use quarterly_store_sqlite::SqliteStore;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "quarterly", version, about = "Earnings-call and financial-facts store")]
struct Cli {
  /// Optional TOML config file; environment variables take precedence.
  #[arg(short, long, value_name = "FILE", default_value = "quarterly.toml")]
  config: PathBuf,

  /// Emit JSON logs and JSON command output.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Connection test, migrations, capability check, seed data, verification.
  Setup,
  /// Apply schema migrations.
  Migrate {
    /// Re-run every migration, including ones already applied.
    #[arg(long)]
    reapply: bool,
  },
  /// List tables and views with their row counts.
  Verify,
  /// Schema version, capabilities and snapshot freshness.
  Status,
  /// Check configuration, database and provider reachability.
  Check,
  /// Rebuild the metric time-series snapshot.
  Refresh {
    /// Keep running, rebuilding whenever the snapshot is dirty.
    #[arg(long)]
    watch: bool,
  },
  /// Import per-period financial metrics from a JSON file.
  ImportFinancials { file: PathBuf },
  /// Store an analysed earnings call from a JSON file.
  IngestCall { file: PathBuf },
  /// List registered earnings calls.
  Calls {
    #[arg(long)]
    symbol:  Option<String>,
    /// Only calls not yet processed.
    #[arg(long)]
    pending: bool,
  },
  /// Full-text search over transcript segments.
  Search {
    text:   String,
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long)]
    year:   Option<i32>,
    #[arg(long, default_value_t = 10)]
    limit:  usize,
  },
  /// Sentiment per call over time for one company.
  Timeline {
    symbol: String,
    #[arg(long)]
    from:   Option<i32>,
    #[arg(long)]
    to:     Option<i32>,
  },
  /// Delete a call together with its segments and insight.
  DeleteCall { id: i64 },
}

// ─── Context ──────────────────────────────────────────────────────────────────

/// What every command receives.
pub struct Context {
  pub settings: Settings,
  pub notifier: Notifier,
  pub json:     bool,
}

impl Context {
  /// Open the configured store, applying pending migrations.
  pub async fn open_store(&self) -> Result<SqliteStore> {
    use anyhow::Context as _;
    let target = self.settings.database_target()?;
    SqliteStore::open_with(&target, self.settings.store_options())
      .await
      .with_context(|| format!("failed to open store at {target}"))
  }

  /// Print `value` as JSON, or `human` otherwise.
  pub fn emit<T: serde::Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(value)?);
    } else {
      human();
    }
    Ok(())
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  if cli.json {
    tracing_subscriber::fmt().json().with_env_filter(filter).init();
  } else {
    tracing_subscriber::fmt().with_env_filter(filter).init();
  }

  let settings = Settings::load(&cli.config)?;
  let notifier = Notifier::new(settings.webhook_url.clone())?;
  let ctx = Context { settings, notifier, json: cli.json };

  match cli.command {
    Command::Setup => admin::setup(&ctx).await,
    Command::Migrate { reapply } => admin::migrate(&ctx, reapply).await,
    Command::Verify => admin::verify(&ctx).await,
    Command::Status => admin::status(&ctx).await,
    Command::Check => admin::check(&ctx).await,
    Command::Refresh { watch } => admin::refresh(&ctx, watch).await,
    Command::ImportFinancials { file } => ingest::import_financials(&ctx, &file).await,
    Command::IngestCall { file } => ingest::ingest_call(&ctx, &file).await,
    Command::Calls { symbol, pending } => query::calls(&ctx, symbol, pending).await,
    Command::Search { text, symbol, year, limit } => {
      query::search(&ctx, text, symbol, year, limit).await
    }
    Command::Timeline { symbol, from, to } => query::timeline(&ctx, &symbol, from, to).await,
    Command::DeleteCall { id } => query::delete_call(&ctx, id).await,
  }
}
