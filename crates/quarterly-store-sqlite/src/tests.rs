//! Integration tests for `SqliteStore` against in-memory databases.

use std::str::FromStr;

use quarterly_core::{
  company::{NewCompany, Symbol},
  earnings::{
    CallFilter, CallState, ConfidenceScore, EarningsCall, Embedding, NewEarningsCall, NewInsight,
    NewSegment, SentimentLabel, SentimentScore,
  },
  financial::{FinancialLayout, MetricQuery, NewMetric, Period, Quarter},
  overview::{SimilaritySearch, TextSearch},
  store::{EarningsStore, FinancialStore},
};
use rust_decimal::Decimal;

use crate::{
  Capability, CapabilityStatus, DatabaseTarget, Error, MigrateMode, SqliteStore, StoreOptions,
  latest_version,
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn store_with(options: StoreOptions) -> SqliteStore {
  SqliteStore::open_with(&DatabaseTarget::Memory, options)
    .await
    .expect("in-memory store")
}

async fn flat_store() -> SqliteStore {
  store_with(StoreOptions { layout: FinancialLayout::Flat, ..Default::default() }).await
}

fn sym(s: &str) -> Symbol { Symbol::parse(s).unwrap() }

fn q(n: i64) -> Quarter { Quarter::new(n).unwrap() }

fn metric(symbol: &str, period: Period, name: &str, value: &str) -> NewMetric {
  NewMetric::new(sym(symbol), period, name, Decimal::from_str(value).unwrap())
}

fn segment(n: i64, text: &str, sentiment: Option<f64>) -> NewSegment {
  let mut s = NewSegment::new(n, text);
  s.sentiment = sentiment.map(|v| SentimentScore::new(v).unwrap());
  s
}

async fn register(s: &SqliteStore, symbol: &str, year: i32, quarter: i64) -> EarningsCall {
  s.register_call(NewEarningsCall::new(sym(symbol), year, q(quarter)))
    .await
    .unwrap()
}

/// `(type, name, sql)` of every schema object, for before/after comparison.
async fn schema_snapshot(s: &SqliteStore) -> Vec<(String, String, Option<String>)> {
  s.conn
    .call(|conn| {
      let mut stmt =
        conn.prepare("SELECT type, name, sql FROM sqlite_master ORDER BY type, name")?;
      let rows: Vec<(String, String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await
    .unwrap()
}

async fn exec(s: &SqliteStore, sql: &'static str) -> Result<(), tokio_rusqlite::Error> {
  s.conn
    .call(move |conn| {
      conn.execute_batch(sql)?;
      Ok(())
    })
    .await
}

// ─── Migrations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_database_is_fully_migrated() {
  let s = store().await;
  assert_eq!(s.schema_version().await.unwrap(), latest_version());

  let applied = s.applied_migrations().await.unwrap();
  let names: Vec<_> = applied.iter().map(|m| m.name.as_str()).collect();
  assert_eq!(names, ["financial_core", "normalized_financials", "earnings_calls"]);
  assert!(applied.iter().all(|m| m.checksum.len() == 64));
}

#[tokio::test]
async fn pending_run_on_current_schema_skips_everything() {
  let s = store().await;
  let report = s.migrate(MigrateMode::Pending).await.unwrap();
  assert!(report.applied.is_empty());
  assert!(report.reapplied.is_empty());
  assert_eq!(report.skipped.len(), 3);
  assert_eq!(report.version, 3);
}

#[tokio::test]
async fn reapply_leaves_schema_and_seed_unchanged() {
  let s = store().await;
  let before = schema_snapshot(&s).await;

  let report = s.migrate(MigrateMode::Reapply).await.unwrap();
  assert_eq!(report.reapplied.len(), 3);
  assert!(report.applied.is_empty());
  assert_eq!(report.version, 3);

  assert_eq!(schema_snapshot(&s).await, before);
  assert_eq!(s.list_companies().await.unwrap().len(), 2);
  assert_eq!(s.applied_migrations().await.unwrap().len(), 3);
}

#[tokio::test]
async fn edited_migration_is_rejected() {
  let s = store().await;
  exec(&s, "UPDATE schema_migrations SET checksum = 'deadbeef' WHERE version = 2")
    .await
    .unwrap();

  let err = s.migrate(MigrateMode::Pending).await.unwrap_err();
  assert!(matches!(err, Error::ChecksumMismatch { version: 2, .. }), "{err}");
}

#[tokio::test]
async fn newer_schema_is_rejected() {
  let s = store().await;
  exec(&s, "PRAGMA user_version = 99").await.unwrap();

  let err = s.migrate(MigrateMode::Pending).await.unwrap_err();
  assert!(matches!(err, Error::UnsupportedVersion { found: 99, supported: 3 }), "{err}");
}

#[tokio::test]
async fn connect_alone_leaves_schema_untouched() {
  let s = SqliteStore::connect(&DatabaseTarget::Memory, StoreOptions::default())
    .await
    .unwrap();
  s.ping().await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), 0);

  let report = s.migrate(MigrateMode::Pending).await.unwrap();
  assert_eq!(report.applied.len(), 3);
  assert_eq!(report.version, 3);
}

#[tokio::test]
async fn failed_migration_rolls_back_and_keeps_earlier_ones() {
  let s = SqliteStore::connect(&DatabaseTarget::Memory, StoreOptions::default())
    .await
    .unwrap();
  // A conflicting table makes the earnings_calls migration fail halfway.
  exec(&s, "CREATE TABLE earnings_calls (id INTEGER PRIMARY KEY)")
    .await
    .unwrap();

  let err = s.migrate(MigrateMode::Pending).await.unwrap_err();
  assert!(matches!(err, Error::Migration { version: 3, .. }), "{err}");

  let versions: Vec<_> = s
    .applied_migrations()
    .await
    .unwrap()
    .iter()
    .map(|m| m.version)
    .collect();
  assert_eq!(versions, [1, 2]);
  assert_eq!(s.schema_version().await.unwrap(), 2);

  let segments_table = schema_snapshot(&s)
    .await
    .into_iter()
    .any(|(_, name, _)| name == "call_segments");
  assert!(!segments_table);
}

#[tokio::test]
async fn verify_lists_tables_and_views_without_internals() {
  let s = store().await;
  let counts = s.verify().await.unwrap();
  let find = |name: &str| counts.iter().find(|c| c.name == name);

  assert_eq!(find("companies").unwrap().rows, 2);
  assert_eq!(find("earnings_calls").unwrap().rows, 0);
  assert_eq!(find("earnings_call_overview").unwrap().kind, "view");
  assert_eq!(find("materialized_views").unwrap().rows, 1);
  assert!(find("call_segments_fts").is_some());
  assert!(find("call_segments_fts_data").is_none());
  assert!(counts.iter().all(|c| !c.name.starts_with("sqlite_")));
}

// ─── Capabilities ────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_text_available_vector_optional() {
  let s = store().await;
  let report = s.ensure_capabilities().await.unwrap();
  assert_eq!(
    report.status(Capability::FullTextSearch),
    Some(&CapabilityStatus::Available)
  );
  // The bundled SQLite has no sqlite-vec; that is a warning, not an error.
  assert!(matches!(
    report.status(Capability::VectorSearch),
    Some(CapabilityStatus::Missing { .. })
  ));
  assert!(!s.vector_index_enabled());
}

#[tokio::test]
async fn bad_extension_path_is_one_failed_attempt() {
  let s = store_with(StoreOptions {
    vector_extension: Some("/nonexistent/vec0.so".into()),
    ..Default::default()
  })
  .await;
  let report = s.ensure_capabilities().await.unwrap();
  match report.status(Capability::VectorSearch) {
    Some(CapabilityStatus::Missing { reason }) => assert!(reason.contains("/nonexistent/vec0.so")),
    other => panic!("unexpected status {other:?}"),
  }
}

// ─── Companies ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn seeding_is_idempotent() {
  let s = store().await;
  exec(&s, "DELETE FROM companies").await.unwrap();

  assert_eq!(s.seed_reference_companies().await.unwrap(), 2);
  assert_eq!(s.seed_reference_companies().await.unwrap(), 0);

  let companies = s.list_companies().await.unwrap();
  let symbols: Vec<_> = companies.iter().map(|c| c.symbol.as_str()).collect();
  assert_eq!(symbols, ["PETR4", "VALE3"]);
  assert_eq!(companies[0].currency.as_deref(), Some("BRL"));
}

#[tokio::test]
async fn upsert_company_updates_and_keeps_known_fields() {
  let s = store().await;
  let mut itau = NewCompany::new(sym("itub4"), "Itaú");
  itau.sector = Some("Financeiro".into());
  let first = s.upsert_company(itau).await.unwrap();
  assert_eq!(first.symbol.as_str(), "ITUB4");

  let second = s
    .upsert_company(NewCompany::new(sym("ITUB4"), "Itaú Unibanco"))
    .await
    .unwrap();
  assert_eq!(second.id, first.id);
  assert_eq!(second.name, "Itaú Unibanco");
  assert_eq!(second.sector.as_deref(), Some("Financeiro"));

  assert!(s.get_company(sym("ITUB4")).await.unwrap().is_some());
  assert!(s.get_company(sym("XXXX3")).await.unwrap().is_none());
}

// ─── Financial facts ─────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_metric_is_rejected_in_both_layouts() {
  for s in [store().await, flat_store().await] {
    let layout = s.options().layout;
    let period = Period::quarterly(2025, 2).unwrap();
    s.record_metric(metric("PETR4", period, "receita_liquida", "123.45"))
      .await
      .unwrap();

    let err = s
      .record_metric(metric("PETR4", period, "receita_liquida", "999"))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateMetric { .. }), "{layout}: {err}");

    let stored = s
      .query_metrics(&MetricQuery::for_symbol(sym("PETR4")))
      .await
      .unwrap();
    assert_eq!(stored.len(), 1, "{layout}");
    assert_eq!(stored[0].metrics[0].value, Decimal::from_str("123.45").unwrap());
  }
}

#[tokio::test]
async fn annual_figures_are_unique_too() {
  for s in [store().await, flat_store().await] {
    let annual = Period::annual(2024);
    s.record_metric(metric("VALE3", annual, "ebitda", "10"))
      .await
      .unwrap();
    let err = s
      .record_metric(metric("VALE3", annual, "ebitda", "11"))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateMetric { .. }));

    // A quarterly value of the same metric is a different fact.
    s.record_metric(metric("VALE3", Period::quarterly(2024, 4).unwrap(), "ebitda", "3"))
      .await
      .unwrap();
  }
}

#[tokio::test]
async fn metric_for_unknown_company_is_rejected() {
  let s = store().await;
  let err = s
    .record_metric(metric("ABCD3", Period::annual(2024), "lucro", "1"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownCompany(ref sym) if sym.as_str() == "ABCD3"));
}

#[tokio::test]
async fn query_groups_filters_and_limits() {
  let s = store().await;
  for (year, quarter) in [(2024, 3), (2024, 4), (2025, 1)] {
    let p = Period::quarterly(year, quarter).unwrap();
    s.record_metric(metric("PETR4", p, "receita", "100")).await.unwrap();
    s.record_metric(metric("PETR4", p, "ebitda", "40")).await.unwrap();
  }

  let all = s
    .query_metrics(&MetricQuery::for_symbol(sym("PETR4")))
    .await
    .unwrap();
  let labels: Vec<_> = all.iter().map(|p| p.period_label.as_str()).collect();
  assert_eq!(labels, ["1T25", "4T24", "3T24"]);
  assert_eq!(all[0].metrics.len(), 2);

  let mut query = MetricQuery::for_symbol(sym("PETR4"));
  query.years = vec![2024];
  query.metrics = vec!["ebitda".into()];
  query.limit = Some(1);
  let filtered = s.query_metrics(&query).await.unwrap();
  assert_eq!(filtered.len(), 1);
  assert_eq!(filtered[0].period_label, "4T24");
  assert_eq!(filtered[0].metrics.len(), 1);
  assert_eq!(filtered[0].metrics[0].metric_name, "ebitda");

  assert_eq!(
    s.available_metrics(sym("PETR4")).await.unwrap(),
    vec!["ebitda".to_string(), "receita".to_string()]
  );
  let periods = s.available_periods(sym("PETR4")).await.unwrap();
  assert_eq!(periods.len(), 3);
  assert_eq!(periods[0], Period::quarterly(2025, 1).unwrap());
}

#[tokio::test]
async fn replace_period_swaps_the_whole_period() {
  for s in [store().await, flat_store().await] {
    let p = Period::quarterly(2025, 1).unwrap();
    s.record_metric(metric("VALE3", p, "receita", "1")).await.unwrap();
    s.record_metric(metric("VALE3", p, "custo", "2")).await.unwrap();

    let written = s
      .replace_period_metrics(sym("VALE3"), p, vec![
        metric("VALE3", p, "receita", "5"),
        metric("VALE3", p, "lucro", "3"),
      ])
      .await
      .unwrap();
    assert_eq!(written, 2);

    let names = s.available_metrics(sym("VALE3")).await.unwrap();
    assert_eq!(names, vec!["lucro".to_string(), "receita".to_string()]);
  }
}

#[tokio::test]
async fn time_series_is_stale_until_refresh() {
  let s = store().await;
  let status = s.time_series_status().await.unwrap();
  assert!(!status.is_dirty());
  assert!(status.refreshed_at.is_none());

  let p = Period::quarterly(2025, 2).unwrap();
  let mut m = metric("PETR4", p, "producao", "2.7");
  m.unit = Some("MMboe/d".into());
  s.record_metric(m).await.unwrap();

  // Written but not yet visible through the snapshot.
  assert!(s.time_series(sym("PETR4"), "producao".into()).await.unwrap().is_empty());
  assert!(s.time_series_status().await.unwrap().is_dirty());

  let report = s.refresh_time_series().await.unwrap();
  assert_eq!(report.rows, 1);
  let points = s.time_series(sym("PETR4"), "producao".into()).await.unwrap();
  assert_eq!(points.len(), 1);
  assert_eq!(points[0].period_label, "2T25");
  assert_eq!(points[0].company_name, "Petróleo Brasileiro S.A. - Petrobras");
  assert_eq!(points[0].unit.as_deref(), Some("MMboe/d"));

  let status = s.time_series_status().await.unwrap();
  assert!(!status.is_dirty());
  assert!(status.refreshed_at.is_some());
  assert_eq!(status.rows, 1);

  s.record_metric(metric("PETR4", Period::quarterly(2025, 3).unwrap(), "producao", "2.9"))
    .await
    .unwrap();
  assert_eq!(s.time_series(sym("PETR4"), "producao".into()).await.unwrap().len(), 1);
  assert!(s.time_series_status().await.unwrap().is_dirty());
}

#[tokio::test]
async fn flat_layout_feeds_the_snapshot() {
  let s = flat_store().await;
  s.record_metric(metric("VALE3", Period::quarterly(2024, 4).unwrap(), "minerio", "80.1"))
    .await
    .unwrap();
  s.record_metric(metric("VALE3", Period::annual(2024), "minerio", "320"))
    .await
    .unwrap();
  s.refresh_time_series().await.unwrap();

  let points = s.time_series(sym("VALE3"), "minerio".into()).await.unwrap();
  let labels: Vec<_> = points.iter().map(|p| p.period_label.as_str()).collect();
  assert_eq!(labels, ["4T24", "2024"]);
  assert_eq!(points[0].currency.as_deref(), Some("BRL"));
}

// ─── Earnings calls ──────────────────────────────────────────────────────────

#[tokio::test]
async fn call_for_unknown_company_is_rejected() {
  let s = store().await;
  let err = s
    .register_call(NewEarningsCall::new(sym("ZZZZ3"), 2025, q(1)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownCompany(_)));
}

#[tokio::test]
async fn registering_twice_updates_the_same_call() {
  let s = store().await;
  let first = register(&s, "PETR4", 2025, 2).await;
  assert_eq!(first.language_code, "pt_BR");
  assert_eq!(first.state(), CallState::Pending);
  assert_eq!(first.period_label(), "2T25");

  let mut again = NewEarningsCall::new(sym("PETR4"), 2025, q(2));
  again.audio_url = Some("https://ri.example/2T25.mp3".into());
  again.file_size = Some(1_048_576);
  let second = s.register_call(again).await.unwrap();

  assert_eq!(second.id, first.id);
  assert_eq!(second.audio_url.as_deref(), Some("https://ri.example/2T25.mp3"));
  assert_eq!(second.language_code, "pt_BR");
  assert_eq!(s.list_calls(&CallFilter::default()).await.unwrap().len(), 1);
  assert_eq!(
    s.find_call(sym("PETR4"), 2025, q(2)).await.unwrap().map(|c| c.id),
    Some(first.id)
  );
}

#[tokio::test]
async fn processing_is_one_way() {
  let s = store().await;
  let call = register(&s, "VALE3", 2025, 1).await;

  let processed = s.mark_processed(call.id).await.unwrap();
  assert_eq!(processed.state(), CallState::Processed);

  let err = s.mark_processed(call.id).await.unwrap_err();
  assert!(matches!(err, Error::AlreadyProcessed(id) if id == call.id));
  assert!(matches!(s.mark_processed(9999).await, Err(Error::CallNotFound(9999))));

  // Re-registering does not reset the processing state.
  let again = register(&s, "VALE3", 2025, 1).await;
  assert_eq!(again.state(), CallState::Processed);
}

#[tokio::test]
async fn list_calls_filters_by_state_and_symbol() {
  let s = store().await;
  let a = register(&s, "PETR4", 2024, 4).await;
  register(&s, "PETR4", 2025, 1).await;
  register(&s, "VALE3", 2025, 1).await;
  s.mark_processed(a.id).await.unwrap();

  let pending = s
    .list_calls(&CallFilter { state: Some(CallState::Pending), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(pending.len(), 2);

  let petr = s
    .list_calls(&CallFilter { symbol: Some(sym("PETR4")), ..Default::default() })
    .await
    .unwrap();
  let labels: Vec<_> = petr.iter().map(|c| c.period_label()).collect();
  assert_eq!(labels, ["1T25", "4T24"]);

  let in_2024 = s
    .list_calls(&CallFilter { year: Some(2024), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(in_2024.len(), 1);
}

// ─── Segments & insights ─────────────────────────────────────────────────────

#[tokio::test]
async fn scores_outside_bounds_never_reach_the_table() {
  assert!(SentimentScore::new(1.5).is_err());
  assert!(ConfidenceScore::new(-0.2).is_err());

  let s = store().await;
  let call = register(&s, "PETR4", 2025, 2).await;
  let id = call.id;

  let sentiment = s
    .conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO call_segments (call_id, segment_number, segment_text, sentiment_score)
         VALUES (?1, 1, 'x', 1.5)",
        rusqlite::params![id],
      )?;
      Ok(())
    })
    .await;
  assert!(sentiment.is_err());

  let confidence = s
    .conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO call_segments (call_id, segment_number, segment_text, confidence_score)
         VALUES (?1, 2, 'x', 1.2)",
        rusqlite::params![id],
      )?;
      Ok(())
    })
    .await;
  assert!(confidence.is_err());

  assert!(s.segments(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn segment_round_trip_and_upsert() {
  let s = store().await;
  let call = register(&s, "PETR4", 2025, 2).await;

  let mut seg = segment(1, "A produção cresceu.", Some(0.6));
  seg.confidence = Some(ConfidenceScore::new(0.9).unwrap());
  seg.keywords = vec!["produção".into()];
  seg.entities = serde_json::json!({ "amounts": ["R$ 45 bilhões"] });
  seg.timestamp_start = Some(0.0);
  seg.timestamp_end = Some(12.5);
  let saved = s.save_segment(call.id, seg).await.unwrap();
  assert_eq!(saved.sentiment_label, Some(SentimentLabel::Positive));
  assert_eq!(saved.keywords, vec!["produção".to_string()]);
  assert_eq!(saved.entities["amounts"][0], "R$ 45 bilhões");

  let replaced = s
    .save_segment(call.id, segment(1, "Texto corrigido.", Some(-0.4)))
    .await
    .unwrap();
  assert_eq!(replaced.id, saved.id);

  let all = s.segments(call.id).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].text, "Texto corrigido.");
  assert_eq!(all[0].sentiment_label, Some(SentimentLabel::Negative));
}

#[tokio::test]
async fn segment_for_missing_call_is_rejected() {
  let s = store().await;
  let err = s.save_segment(42, segment(1, "x", None)).await.unwrap_err();
  assert!(matches!(err, Error::CallNotFound(42)));
}

#[tokio::test]
async fn embedding_length_must_match_configuration() {
  let s = store().await;
  let call = register(&s, "PETR4", 2025, 2).await;
  let mut seg = segment(1, "x", None);
  seg.embedding = Some(Embedding::new(vec![0.1, 0.2, 0.3]).unwrap());

  let err = s.save_segment(call.id, seg).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(quarterly_core::Error::EmbeddingDimension { expected: 768, actual: 3 })
  ));
}

#[tokio::test]
async fn save_segments_writes_a_batch() {
  let s = store().await;
  let call = register(&s, "VALE3", 2024, 4).await;
  let batch = (1..=5).map(|n| segment(n, "trecho", Some(0.0))).collect();
  assert_eq!(s.save_segments(call.id, batch).await.unwrap(), 5);
  assert_eq!(s.segments(call.id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn insight_is_one_row_per_call() {
  let s = store().await;
  let call = register(&s, "PETR4", 2025, 2).await;

  let mut insight = NewInsight {
    overall_sentiment:    Some(SentimentScore::new(0.3).unwrap()),
    key_topics:           vec!["produção".into()],
    risk_mentions:        1,
    opportunity_mentions: 2,
    guidance_changes:     None,
    summary_text:         Some("primeira".into()),
    highlights:           serde_json::json!({}),
  };
  let first = s.save_insight(call.id, insight.clone()).await.unwrap();

  insight.summary_text = Some("segunda".into());
  let second = s.save_insight(call.id, insight).await.unwrap();
  assert_eq!(second.id, first.id);
  assert_eq!(second.summary_text.as_deref(), Some("segunda"));
  assert_eq!(second.key_topics, vec!["produção".to_string()]);

  let err = s
    .save_insight(777, NewInsight {
      overall_sentiment:    None,
      key_topics:           vec![],
      risk_mentions:        0,
      opportunity_mentions: 0,
      guidance_changes:     None,
      summary_text:         None,
      highlights:           serde_json::json!({}),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::CallNotFound(777)));
}

#[tokio::test]
async fn deleting_a_call_removes_only_its_analysis() {
  let s = store().await;
  let doomed = register(&s, "PETR4", 2024, 4).await;
  let kept = register(&s, "PETR4", 2025, 1).await;

  for call in [&doomed, &kept] {
    s.save_segments(call.id, vec![segment(1, "um", Some(0.2)), segment(2, "dois", None)])
      .await
      .unwrap();
    s.save_insight(call.id, quarterly_core::insights::summarize(&[]))
      .await
      .unwrap();
  }

  let deleted = s.delete_call(doomed.id).await.unwrap();
  assert_eq!(deleted.segments, 2);
  assert_eq!(deleted.insights, 1);

  assert!(s.get_call(doomed.id).await.unwrap().is_none());
  assert!(s.segments(doomed.id).await.unwrap().is_empty());
  assert!(s.get_insight(doomed.id).await.unwrap().is_none());

  assert_eq!(s.segments(kept.id).await.unwrap().len(), 2);
  assert!(s.get_insight(kept.id).await.unwrap().is_some());

  assert!(matches!(s.delete_call(doomed.id).await, Err(Error::CallNotFound(_))));
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_text_search_folds_diacritics_and_filters() {
  let s = store().await;
  let petr = register(&s, "PETR4", 2025, 2).await;
  let vale = register(&s, "VALE3", 2025, 2).await;
  s.save_segment(petr.id, segment(1, "A produção de petróleo cresceu 5%.", Some(0.7)))
    .await
    .unwrap();
  s.save_segment(petr.id, segment(2, "Os custos subiram.", Some(-0.3)))
    .await
    .unwrap();
  s.save_segment(vale.id, segment(1, "A produção de minério caiu.", Some(-0.5)))
    .await
    .unwrap();

  let hits = s.search_text(&TextSearch::new("producao petroleo")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].company_symbol.as_str(), "PETR4");
  assert_eq!(hits[0].period_label, "2T25");

  assert_eq!(s.search_text(&TextSearch::new("produção")).await.unwrap().len(), 2);

  let mut only_vale = TextSearch::new("produção");
  only_vale.symbol = Some(sym("VALE3"));
  let hits = s.search_text(&only_vale).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].call_id, vale.id);

  assert!(s.search_text(&TextSearch::new("***")).await.unwrap().is_empty());
}

// The bundled SQLite has no sqlite-vec, so only the cosine scan runs here; the
// vec0 k-NN path needs VECTOR_EXTENSION_PATH and is not covered by these tests.
#[tokio::test]
async fn similarity_search_falls_back_to_a_scan() {
  let s = store_with(StoreOptions { embedding_dimensions: 3, ..Default::default() }).await;
  assert!(!s.vector_index_enabled());
  let call = register(&s, "PETR4", 2025, 2).await;

  for (n, v) in [(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0]), (3, [0.9, 0.1, 0.0])] {
    let mut seg = segment(n, "trecho", None);
    seg.embedding = Some(Embedding::new(v.to_vec()).unwrap());
    s.save_segment(call.id, seg).await.unwrap();
  }

  let query = SimilaritySearch::new(Embedding::new(vec![1.0, 0.0, 0.0]).unwrap());
  let hits = s.search_similar(&query).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert!((hits[0].score - 1.0).abs() < 1e-6);
  assert!(hits[0].score >= hits[1].score);

  let wrong = SimilaritySearch::new(Embedding::new(vec![1.0, 0.0]).unwrap());
  assert!(s.search_similar(&wrong).await.is_err());
}

#[tokio::test]
async fn overview_reflects_writes_immediately() {
  let s = store().await;
  let call = register(&s, "PETR4", 2025, 2).await;
  s.save_segments(call.id, vec![segment(1, "a", Some(0.5)), segment(2, "b", Some(-0.1))])
    .await
    .unwrap();

  let rows = s.overview(None).await.unwrap();
  assert_eq!(rows.len(), 1);
  let row = &rows[0];
  assert_eq!(row.period_label, "2T25");
  assert_eq!(row.segment_count, 2);
  assert!((row.avg_sentiment.unwrap() - 0.2).abs() < 1e-9);
  assert!(!row.is_processed);
  assert!(row.key_topics.is_empty());
  assert!(row.risk_mentions.is_none());

  let mut insight = quarterly_core::insights::summarize(&[]);
  insight.key_topics = vec!["produção".into()];
  s.save_insight(call.id, insight).await.unwrap();
  s.mark_processed(call.id).await.unwrap();

  let row = s.overview(Some(sym("PETR4"))).await.unwrap().remove(0);
  assert!(row.is_processed);
  assert_eq!(row.key_topics, vec!["produção".to_string()]);
  assert_eq!(row.risk_mentions, Some(0));
  assert!(s.overview(Some(sym("VALE3"))).await.unwrap().is_empty());
}

#[tokio::test]
async fn timeline_is_chronological_and_bounded() {
  let s = store().await;
  for (year, quarter, score) in [(2025, 1, 0.4), (2024, 4, -0.2), (2023, 4, 0.1)] {
    let call = register(&s, "VALE3", year, quarter).await;
    s.save_segment(call.id, segment(1, "x", Some(score))).await.unwrap();
  }

  let points = s.sentiment_timeline(sym("VALE3"), Some(2024), None).await.unwrap();
  let labels: Vec<_> = points.iter().map(|p| p.period_label.as_str()).collect();
  assert_eq!(labels, ["4T24", "1T25"]);
  assert!((points[0].average_sentiment.unwrap() + 0.2).abs() < 1e-9);
  assert_eq!(points[1].segment_count, 1);
}

#[tokio::test]
async fn highlights_pick_the_extremes() {
  let s = store().await;
  let call = register(&s, "PETR4", 2025, 2).await;
  let batch = [0.9, -0.8, 0.1, 0.5, -0.3]
    .iter()
    .enumerate()
    .map(|(i, v)| segment(i as i64 + 1, "trecho", Some(*v)))
    .chain(std::iter::once(segment(6, "sem nota", None)))
    .collect();
  s.save_segments(call.id, batch).await.unwrap();

  let h = s
    .call_highlights(sym("PETR4"), 2025, q(2), 2)
    .await
    .unwrap()
    .unwrap();
  let pos: Vec<_> = h.most_positive.iter().map(|s| s.segment_number).collect();
  let neg: Vec<_> = h.most_negative.iter().map(|s| s.segment_number).collect();
  assert_eq!(pos, [1, 4]);
  assert_eq!(neg, [2, 5]);
  assert!(h.insight.is_none());

  assert!(s.call_highlights(sym("PETR4"), 2020, q(1), 2).await.unwrap().is_none());
}
