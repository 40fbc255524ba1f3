//! [`EarningsStore`]: calls, their segments and insights, and the read paths
//! over them.

use quarterly_core::{
  company::Symbol,
  earnings::{
    CallFilter, CallInsight, CallSegment, CallState, DEFAULT_LANGUAGE, DeletedCall, EarningsCall,
    NewEarningsCall, NewInsight, NewSegment,
  },
  financial::Quarter,
  overview::{CallHighlights, CallOverview, SegmentHit, SimilaritySearch, TextSearch, TimelinePoint},
  store::EarningsStore,
};
use rusqlite::OptionalExtension as _;
use tracing::debug;

use super::{SqliteStore, company_id};
use crate::{
  Error, Result,
  encode::{
    CALL_COLUMNS, HIT_COLUMNS, INSIGHT_COLUMNS, OVERVIEW_COLUMNS, RawCall, RawHit, RawInsight,
    RawOverview, RawSegment, SEGMENT_COLUMNS, decode_embedding, encode_date, encode_dt,
    encode_embedding, encode_strings,
  },
};

/// Extra candidates fetched from the vector index per requested hit when a
/// company filter is applied after the kNN lookup.
const FILTERED_KNN_FACTOR: usize = 4;

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// Column values of one segment, ready to bind.
struct SegmentRow {
  number:     i64,
  text:       String,
  ts_start:   Option<f64>,
  ts_end:     Option<f64>,
  speaker:    Option<String>,
  sentiment:  Option<f64>,
  label:      Option<String>,
  confidence: Option<f64>,
  keywords:   String,
  entities:   String,
  embedding:  Option<Vec<u8>>,
}

/// Outcome of a state-dependent write, decided inside the connection thread.
enum CallWrite<T> {
  Done(T),
  Missing,
  AlreadyProcessed,
}

fn call_exists(conn: &rusqlite::Connection, call_id: i64) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS (SELECT 1 FROM earnings_calls WHERE id = ?1)",
    rusqlite::params![call_id],
    |row| row.get(0),
  )
}

fn read_call(conn: &rusqlite::Connection, call_id: i64) -> rusqlite::Result<Option<RawCall>> {
  conn
    .query_row(
      &format!("SELECT {CALL_COLUMNS} FROM earnings_calls WHERE id = ?1"),
      rusqlite::params![call_id],
      RawCall::from_row,
    )
    .optional()
}

/// Upsert one segment and keep the vector index in step. Returns the row id.
fn write_segment(
  conn: &rusqlite::Connection,
  call_id: i64,
  seg: &SegmentRow,
  vector_index: bool,
) -> rusqlite::Result<i64> {
  conn.execute(
    "INSERT INTO call_segments (
       call_id, segment_number, segment_text, timestamp_start, timestamp_end, speaker,
       sentiment_score, sentiment_label, confidence_score, keywords, entities, embedding
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
     ON CONFLICT(call_id, segment_number) DO UPDATE SET
       segment_text     = excluded.segment_text,
       timestamp_start  = excluded.timestamp_start,
       timestamp_end    = excluded.timestamp_end,
       speaker          = excluded.speaker,
       sentiment_score  = excluded.sentiment_score,
       sentiment_label  = excluded.sentiment_label,
       confidence_score = excluded.confidence_score,
       keywords         = excluded.keywords,
       entities         = excluded.entities,
       embedding        = excluded.embedding",
    rusqlite::params![
      call_id,
      seg.number,
      seg.text,
      seg.ts_start,
      seg.ts_end,
      seg.speaker,
      seg.sentiment,
      seg.label,
      seg.confidence,
      seg.keywords,
      seg.entities,
      seg.embedding,
    ],
  )?;
  let id: i64 = conn.query_row(
    "SELECT id FROM call_segments WHERE call_id = ?1 AND segment_number = ?2",
    rusqlite::params![call_id, seg.number],
    |row| row.get(0),
  )?;

  if vector_index {
    conn.execute("DELETE FROM vec_segments WHERE segment_id = ?1", rusqlite::params![id])?;
    if let Some(blob) = &seg.embedding {
      conn.execute(
        "INSERT INTO vec_segments (segment_id, embedding) VALUES (?1, ?2)",
        rusqlite::params![id, blob],
      )?;
    }
  }
  Ok(id)
}

/// Turn free text into an FTS5 query: every word becomes a quoted term and
/// all terms must match. Returns `None` when nothing searchable remains.
/// Neighbours to request from `vec_segments`. A symbol filter applies after
/// the k-NN scan, so filtered searches over-fetch.
fn knn_k(limit: usize, filtered: bool) -> i64 {
  let k = if filtered { limit.saturating_mul(FILTERED_KNN_FACTOR) } else { limit };
  i64::try_from(k).unwrap_or(i64::MAX)
}

fn fts_query(text: &str) -> Option<String> {
  let terms: Vec<String> = text
    .split_whitespace()
    .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
    .filter(|w| !w.is_empty())
    .map(|w| format!("\"{w}\""))
    .collect();
  (!terms.is_empty()).then(|| terms.join(" "))
}

impl SqliteStore {
  /// Validate and encode a segment outside the connection thread.
  fn segment_row(&self, seg: NewSegment) -> Result<SegmentRow> {
    if let Some(e) = &seg.embedding {
      e.ensure_dimensions(self.options.embedding_dimensions)?;
    }
    let label = seg.effective_label().map(|l| l.as_ref().to_owned());
    Ok(SegmentRow {
      number: seg.segment_number,
      ts_start: seg.timestamp_start,
      ts_end: seg.timestamp_end,
      speaker: seg.speaker,
      sentiment: seg.sentiment.map(|s| s.get()),
      label,
      confidence: seg.confidence.map(|c| c.get()),
      keywords: encode_strings(&seg.keywords)?,
      entities: serde_json::to_string(&seg.entities)?,
      embedding: seg.embedding.as_ref().map(encode_embedding),
      text: seg.text,
    })
  }

  async fn knn_hits(&self, query: &SimilaritySearch) -> Result<Vec<SegmentHit>> {
    let blob = encode_embedding(&query.embedding);
    let symbol = query.symbol.as_ref().map(|s| s.as_str().to_owned());
    let k = knn_k(query.limit, symbol.is_some());

    let rows: Vec<(RawHit, f64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "WITH knn AS (
             SELECT segment_id, distance FROM vec_segments
             WHERE embedding MATCH ?1 AND k = ?2
           )
           SELECT {HIT_COLUMNS}, knn.distance
           FROM knn
           JOIN call_segments s  ON s.id  = knn.segment_id
           JOIN earnings_calls ec ON ec.id = s.call_id
           WHERE (?3 IS NULL OR ec.company_symbol = ?3)
           ORDER BY knn.distance"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![blob, k, symbol], |row| {
            Ok((RawHit::from_row(row)?, row.get::<_, f64>(13)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut hits = Vec::new();
    for (raw, distance) in rows {
      let similarity = 1.0 - distance;
      if similarity >= query.threshold {
        hits.push(raw.into_hit(similarity)?);
      }
    }
    hits.truncate(query.limit);
    Ok(hits)
  }

  async fn scan_hits(&self, query: &SimilaritySearch) -> Result<Vec<SegmentHit>> {
    let symbol = query.symbol.as_ref().map(|s| s.as_str().to_owned());

    let rows: Vec<(RawHit, Vec<u8>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {HIT_COLUMNS}, s.embedding
           FROM call_segments s
           JOIN earnings_calls ec ON ec.id = s.call_id
           WHERE s.embedding IS NOT NULL
             AND (?1 IS NULL OR ec.company_symbol = ?1)"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![symbol], |row| {
            Ok((RawHit::from_row(row)?, row.get::<_, Vec<u8>>(13)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut scored: Vec<(RawHit, f64)> = Vec::with_capacity(rows.len());
    for (raw, blob) in rows {
      let similarity = query.embedding.cosine_similarity(&decode_embedding(&blob)?);
      if similarity >= query.threshold {
        scored.push((raw, similarity));
      }
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(query.limit);

    scored.into_iter().map(|(raw, score)| raw.into_hit(score)).collect()
  }
}

// ─── EarningsStore impl ──────────────────────────────────────────────────────

impl EarningsStore for SqliteStore {
  type Error = Error;

  // ── Calls ─────────────────────────────────────────────────────────────────

  async fn register_call(&self, call: NewEarningsCall) -> Result<EarningsCall> {
    let NewEarningsCall {
      company_symbol,
      year,
      quarter,
      audio_url,
      transcript_url,
      file_size,
      call_date,
      language_code,
      duration_seconds,
    } = call;
    let sym = company_symbol.as_str().to_owned();
    let quarter = i64::from(quarter);
    let call_date = call_date.map(encode_date);
    let insert_language = language_code.clone().unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned());

    let raw: Option<RawCall> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if company_id(&tx, &sym)?.is_none() {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO earnings_calls (
             company_symbol, year, quarter, audio_url, transcript_url, file_size,
             call_date, language_code, duration_seconds
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT(company_symbol, year, quarter) DO UPDATE SET
             audio_url        = COALESCE(excluded.audio_url,        earnings_calls.audio_url),
             transcript_url   = COALESCE(excluded.transcript_url,   earnings_calls.transcript_url),
             file_size        = COALESCE(excluded.file_size,        earnings_calls.file_size),
             call_date        = COALESCE(excluded.call_date,        earnings_calls.call_date),
             language_code    = COALESCE(?10,                       earnings_calls.language_code),
             duration_seconds = COALESCE(excluded.duration_seconds, earnings_calls.duration_seconds)",
          rusqlite::params![
            sym,
            year,
            quarter,
            audio_url,
            transcript_url,
            file_size,
            call_date,
            insert_language,
            duration_seconds,
            language_code,
          ],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {CALL_COLUMNS} FROM earnings_calls
             WHERE company_symbol = ?1 AND year = ?2 AND quarter = ?3"
          ),
          rusqlite::params![sym, year, quarter],
          RawCall::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    match raw {
      Some(raw) => raw.into_call(),
      None => Err(Error::UnknownCompany(company_symbol)),
    }
  }

  async fn get_call(&self, call_id: i64) -> Result<Option<EarningsCall>> {
    let raw = self
      .conn
      .call(move |conn| Ok(read_call(conn, call_id)?))
      .await?;
    raw.map(RawCall::into_call).transpose()
  }

  async fn find_call(
    &self,
    symbol:  Symbol,
    year:    i32,
    quarter: Quarter,
  ) -> Result<Option<EarningsCall>> {
    let symbol = symbol.as_str().to_owned();
    let quarter = i64::from(quarter);

    let raw: Option<RawCall> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CALL_COLUMNS} FROM earnings_calls
                 WHERE company_symbol = ?1 AND year = ?2 AND quarter = ?3"
              ),
              rusqlite::params![symbol, year, quarter],
              RawCall::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCall::into_call).transpose()
  }

  async fn list_calls<'a>(&'a self, filter: &'a CallFilter) -> Result<Vec<EarningsCall>> {
    let symbol = filter.symbol.as_ref().map(|s| s.as_str().to_owned());
    let year = filter.year;
    let processed = filter.state.map(|s| s == CallState::Processed);

    let raws: Vec<RawCall> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CALL_COLUMNS} FROM earnings_calls
           WHERE (?1 IS NULL OR company_symbol = ?1)
             AND (?2 IS NULL OR year = ?2)
             AND (?3 IS NULL OR (processed_at IS NOT NULL) = ?3)
           ORDER BY year DESC, quarter DESC, company_symbol"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![symbol, year, processed], RawCall::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCall::into_call).collect()
  }

  async fn mark_processed(&self, call_id: i64) -> Result<EarningsCall> {
    let now = encode_dt(chrono::Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(raw) = read_call(&tx, call_id)? else {
          return Ok(CallWrite::Missing);
        };
        if raw.processed_at.is_some() {
          return Ok(CallWrite::AlreadyProcessed);
        }
        tx.execute(
          "UPDATE earnings_calls SET processed_at = ?1 WHERE id = ?2 AND processed_at IS NULL",
          rusqlite::params![now, call_id],
        )?;
        let updated = read_call(&tx, call_id)?;
        tx.commit()?;
        Ok(updated.map_or(CallWrite::Missing, CallWrite::Done))
      })
      .await?;

    match outcome {
      CallWrite::Done(raw) => raw.into_call(),
      CallWrite::Missing => Err(Error::CallNotFound(call_id)),
      CallWrite::AlreadyProcessed => Err(Error::AlreadyProcessed(call_id)),
    }
  }

  async fn delete_call(&self, call_id: i64) -> Result<DeletedCall> {
    let vector_index = self.vector_index_enabled();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !call_exists(&tx, call_id)? {
          return Ok(CallWrite::Missing);
        }
        let segment_ids: Vec<i64> = {
          let mut stmt = tx.prepare("SELECT id FROM call_segments WHERE call_id = ?1")?;
          stmt
            .query_map(rusqlite::params![call_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let insights: i64 = tx.query_row(
          "SELECT COUNT(*) FROM call_insights WHERE call_id = ?1",
          rusqlite::params![call_id],
          |row| row.get(0),
        )?;
        if vector_index {
          for id in &segment_ids {
            tx.execute("DELETE FROM vec_segments WHERE segment_id = ?1", rusqlite::params![id])?;
          }
        }
        // Segments and the insight go with the call (ON DELETE CASCADE).
        tx.execute("DELETE FROM earnings_calls WHERE id = ?1", rusqlite::params![call_id])?;
        tx.commit()?;
        Ok(CallWrite::Done(DeletedCall {
          call_id,
          segments: segment_ids.len() as u64,
          insights: insights as u64,
        }))
      })
      .await?;

    match outcome {
      CallWrite::Done(deleted) => {
        debug!(call_id, segments = deleted.segments, "deleted call");
        Ok(deleted)
      }
      CallWrite::Missing | CallWrite::AlreadyProcessed => Err(Error::CallNotFound(call_id)),
    }
  }

  // ── Analysis ──────────────────────────────────────────────────────────────

  async fn save_segment(&self, call_id: i64, segment: NewSegment) -> Result<CallSegment> {
    let row = self.segment_row(segment)?;
    let vector_index = self.vector_index_enabled();

    let raw: Option<RawSegment> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !call_exists(&tx, call_id)? {
          return Ok(None);
        }
        let id = write_segment(&tx, call_id, &row, vector_index)?;
        let raw = tx.query_row(
          &format!("SELECT {SEGMENT_COLUMNS} FROM call_segments WHERE id = ?1"),
          rusqlite::params![id],
          RawSegment::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw
      .ok_or(Error::CallNotFound(call_id))
      .and_then(RawSegment::into_segment)
  }

  async fn save_segments(&self, call_id: i64, segments: Vec<NewSegment>) -> Result<u64> {
    let rows = segments
      .into_iter()
      .map(|s| self.segment_row(s))
      .collect::<Result<Vec<_>>>()?;
    let vector_index = self.vector_index_enabled();

    let written: Option<u64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !call_exists(&tx, call_id)? {
          return Ok(None);
        }
        for row in &rows {
          write_segment(&tx, call_id, row, vector_index)?;
        }
        tx.commit()?;
        Ok(Some(rows.len() as u64))
      })
      .await?;

    written.ok_or(Error::CallNotFound(call_id))
  }

  async fn segments(&self, call_id: i64) -> Result<Vec<CallSegment>> {
    let raws: Vec<RawSegment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SEGMENT_COLUMNS} FROM call_segments WHERE call_id = ?1 ORDER BY segment_number"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![call_id], RawSegment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSegment::into_segment).collect()
  }

  async fn save_insight(&self, call_id: i64, insight: NewInsight) -> Result<CallInsight> {
    let overall = insight.overall_sentiment.map(|s| s.get());
    let key_topics = encode_strings(&insight.key_topics)?;
    let highlights = serde_json::to_string(&insight.highlights)?;
    let NewInsight { risk_mentions, opportunity_mentions, guidance_changes, summary_text, .. } =
      insight;

    let raw: Option<RawInsight> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !call_exists(&tx, call_id)? {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO call_insights (
             call_id, overall_sentiment, key_topics, risk_mentions, opportunity_mentions,
             guidance_changes, summary_text, highlights
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(call_id) DO UPDATE SET
             overall_sentiment    = excluded.overall_sentiment,
             key_topics           = excluded.key_topics,
             risk_mentions        = excluded.risk_mentions,
             opportunity_mentions = excluded.opportunity_mentions,
             guidance_changes     = excluded.guidance_changes,
             summary_text         = excluded.summary_text,
             highlights           = excluded.highlights",
          rusqlite::params![
            call_id,
            overall,
            key_topics,
            risk_mentions,
            opportunity_mentions,
            guidance_changes,
            summary_text,
            highlights,
          ],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {INSIGHT_COLUMNS} FROM call_insights WHERE call_id = ?1"),
          rusqlite::params![call_id],
          RawInsight::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw
      .ok_or(Error::CallNotFound(call_id))
      .and_then(RawInsight::into_insight)
  }

  async fn get_insight(&self, call_id: i64) -> Result<Option<CallInsight>> {
    let raw: Option<RawInsight> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {INSIGHT_COLUMNS} FROM call_insights WHERE call_id = ?1"),
              rusqlite::params![call_id],
              RawInsight::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawInsight::into_insight).transpose()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn overview(&self, symbol: Option<Symbol>) -> Result<Vec<CallOverview>> {
    let symbol = symbol.map(String::from);

    let raws: Vec<RawOverview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {OVERVIEW_COLUMNS} FROM earnings_call_overview
           WHERE (?1 IS NULL OR company_symbol = ?1)
           ORDER BY year DESC, quarter DESC, company_symbol"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![symbol], RawOverview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOverview::into_overview).collect()
  }

  async fn search_text<'a>(&'a self, query: &'a TextSearch) -> Result<Vec<SegmentHit>> {
    let Some(fts) = fts_query(&query.query) else {
      return Ok(Vec::new());
    };
    let symbol = query.symbol.as_ref().map(|s| s.as_str().to_owned());
    let year = query.year;
    let limit = query.limit as i64;

    let rows: Vec<(RawHit, f64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {HIT_COLUMNS}, bm25(call_segments_fts) AS bm25_score
           FROM call_segments_fts
           JOIN call_segments s   ON s.id  = call_segments_fts.rowid
           JOIN earnings_calls ec ON ec.id = s.call_id
           WHERE call_segments_fts MATCH ?1
             AND (?2 IS NULL OR ec.company_symbol = ?2)
             AND (?3 IS NULL OR ec.year = ?3)
           ORDER BY bm25_score
           LIMIT ?4"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![fts, symbol, year, limit], |row| {
            Ok((RawHit::from_row(row)?, row.get::<_, f64>(13)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // bm25 is lower-is-better; flip it so every hit score is higher-is-better.
    rows.into_iter().map(|(raw, rank)| raw.into_hit(-rank)).collect()
  }

  async fn search_similar<'a>(&'a self, query: &'a SimilaritySearch) -> Result<Vec<SegmentHit>> {
    query
      .embedding
      .ensure_dimensions(self.options.embedding_dimensions)?;
    if query.limit == 0 {
      return Ok(Vec::new());
    }
    if self.vector_index_enabled() {
      self.knn_hits(query).await
    } else {
      self.scan_hits(query).await
    }
  }

  async fn sentiment_timeline(
    &self,
    symbol:     Symbol,
    start_year: Option<i32>,
    end_year:   Option<i32>,
  ) -> Result<Vec<TimelinePoint>> {
    let symbol = symbol.as_str().to_owned();

    let raws: Vec<RawOverview> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {OVERVIEW_COLUMNS} FROM earnings_call_overview
           WHERE company_symbol = ?1
             AND (?2 IS NULL OR year >= ?2)
             AND (?3 IS NULL OR year <= ?3)
           ORDER BY year, quarter"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![symbol, start_year, end_year], RawOverview::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOverview::into_timeline_point).collect()
  }

  async fn call_highlights(
    &self,
    symbol:  Symbol,
    year:    i32,
    quarter: Quarter,
    limit:   usize,
  ) -> Result<Option<CallHighlights>> {
    let Some(call) = self.find_call(symbol, year, quarter).await? else {
      return Ok(None);
    };
    let insight = self.get_insight(call.id).await?;

    let mut scored: Vec<CallSegment> = self
      .segments(call.id)
      .await?
      .into_iter()
      .filter(|s| s.sentiment.is_some())
      .collect();
    scored.sort_by(|a, b| {
      let (a, b) = (a.sentiment.map_or(0.0, |s| s.get()), b.sentiment.map_or(0.0, |s| s.get()));
      b.total_cmp(&a)
    });

    let most_positive: Vec<CallSegment> = scored.iter().take(limit).cloned().collect();
    let most_negative: Vec<CallSegment> = scored.iter().rev().take(limit).cloned().collect();

    Ok(Some(CallHighlights { call, insight, most_positive, most_negative }))
  }
}

#[cfg(test)]
mod tests {
  use super::{FILTERED_KNN_FACTOR, fts_query, knn_k};

  #[test]
  fn fts_query_quotes_words_and_drops_syntax() {
    assert_eq!(fts_query("produção recorde").as_deref(), Some("\"produção\" \"recorde\""));
    assert_eq!(fts_query("lucro* OR \"x").as_deref(), Some("\"lucro\" \"OR\" \"x\""));
    assert_eq!(fts_query("  -- ").as_deref(), None);
  }

  #[test]
  fn knn_k_over_fetches_for_filters_without_overflow() {
    assert_eq!(knn_k(10, false), 10);
    assert_eq!(knn_k(10, true), 10 * FILTERED_KNN_FACTOR as i64);
    assert_eq!(knn_k(usize::MAX, true), i64::MAX);
  }
}
