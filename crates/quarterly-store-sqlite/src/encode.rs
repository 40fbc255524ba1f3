//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, decimal
//! values are their canonical string form, string lists and entity bags are
//! compact JSON, and embeddings are little-endian `f32` blobs (the layout
//! sqlite-vec expects).

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quarterly_core::{
  company::{Company, Symbol},
  earnings::{
    CallInsight, CallSegment, ConfidenceScore, EarningsCall, Embedding, SentimentLabel,
    SentimentScore,
  },
  financial::{MetricPoint, MetricRecord, Period, Quarter},
  overview::{CallOverview, SegmentHit, TimelinePoint},
};
use rust_decimal::Decimal;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

/// Accepts RFC 3339 and the bare `YYYY-MM-DD HH:MM:SS` form SQLite's own
/// `datetime()` produces.
pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

pub fn decode_symbol(s: &str) -> Result<Symbol> { Ok(Symbol::parse(s)?) }

pub fn decode_quarter(q: i64) -> Result<Quarter> { Ok(Quarter::new(q)?) }

pub fn decode_period(year: i64, quarter: Option<i64>) -> Result<Period> {
  Ok(Period {
    year:    decode_year(year)?,
    quarter: quarter.map(decode_quarter).transpose()?,
  })
}

pub fn decode_year(year: i64) -> Result<i32> {
  i32::try_from(year).map_err(|_| Error::Decode(format!("year out of range: {year}")))
}

/// `(year, quarter)` as bound parameters; annual periods bind `NULL`.
pub fn encode_period(p: Period) -> (i64, Option<i64>) {
  (i64::from(p.year), p.quarter.map(i64::from))
}

pub fn decode_label(s: &str) -> Result<SentimentLabel> {
  SentimentLabel::from_str(s).map_err(|_| Error::Decode(format!("unknown sentiment label: {s:?}")))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_strings(items: &[String]) -> Result<String> { Ok(serde_json::to_string(items)?) }

pub fn decode_strings(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

pub fn decode_json(s: &str) -> Result<serde_json::Value> { Ok(serde_json::from_str(s)?) }

// ─── Embedding ───────────────────────────────────────────────────────────────

pub fn encode_embedding(e: &Embedding) -> Vec<u8> {
  e.values().iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Embedding> {
  if bytes.len() % 4 != 0 {
    return Err(Error::Decode(format!(
      "embedding blob length {} is not a multiple of 4",
      bytes.len()
    )));
  }
  let values = bytes
    .chunks_exact(4)
    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    .collect();
  Ok(Embedding::new(values)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const COMPANY_COLUMNS: &str = "id, symbol, name, sector, country, currency, created_at";

/// Raw values read directly from a `companies` row.
pub struct RawCompany {
  pub id:         i64,
  pub symbol:     String,
  pub name:       String,
  pub sector:     Option<String>,
  pub country:    Option<String>,
  pub currency:   Option<String>,
  pub created_at: String,
}

impl RawCompany {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      symbol:     row.get(1)?,
      name:       row.get(2)?,
      sector:     row.get(3)?,
      country:    row.get(4)?,
      currency:   row.get(5)?,
      created_at: row.get(6)?,
    })
  }

  pub fn into_company(self) -> Result<Company> {
    Ok(Company {
      id:         self.id,
      symbol:     decode_symbol(&self.symbol)?,
      name:       self.name,
      sector:     self.sector,
      country:    self.country,
      currency:   self.currency,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// A metric row from either financial layout. Columns are selected in this
/// order by both layouts' queries.
pub struct RawMetric {
  pub symbol:       String,
  pub year:         i64,
  pub quarter:      Option<i64>,
  pub period_label: Option<String>,
  pub metric_name:  String,
  pub value:        String,
  pub unit:         Option<String>,
  pub label:        Option<String>,
  pub currency:     Option<String>,
  pub category:     Option<String>,
}

impl RawMetric {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      symbol:       row.get(0)?,
      year:         row.get(1)?,
      quarter:      row.get(2)?,
      period_label: row.get(3)?,
      metric_name:  row.get(4)?,
      value:        row.get(5)?,
      unit:         row.get(6)?,
      label:        row.get(7)?,
      currency:     row.get(8)?,
      category:     row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<MetricRecord> {
    let period = decode_period(self.year, self.quarter)?;
    Ok(MetricRecord {
      symbol: decode_symbol(&self.symbol)?,
      period,
      period_label: self.period_label.unwrap_or_else(|| period.label()),
      metric_name: self.metric_name,
      value: decode_decimal(&self.value)?,
      unit: self.unit,
      label: self.label,
      currency: self.currency,
      category: self.category,
    })
  }
}

pub const POINT_COLUMNS: &str = "symbol, company_name, year, quarter, period_label, metric_name, \
                                 metric_label, value, currency, unit";

/// Raw values read from the `metric_time_series` snapshot.
pub struct RawPoint {
  pub symbol:       String,
  pub company_name: String,
  pub year:         i64,
  pub quarter:      Option<i64>,
  pub period_label: String,
  pub metric_name:  String,
  pub label:        Option<String>,
  pub value:        String,
  pub currency:     Option<String>,
  pub unit:         Option<String>,
}

impl RawPoint {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      symbol:       row.get(0)?,
      company_name: row.get(1)?,
      year:         row.get(2)?,
      quarter:      row.get(3)?,
      period_label: row.get(4)?,
      metric_name:  row.get(5)?,
      label:        row.get(6)?,
      value:        row.get(7)?,
      currency:     row.get(8)?,
      unit:         row.get(9)?,
    })
  }

  pub fn into_point(self) -> Result<MetricPoint> {
    Ok(MetricPoint {
      symbol:       decode_symbol(&self.symbol)?,
      company_name: self.company_name,
      period:       decode_period(self.year, self.quarter)?,
      period_label: self.period_label,
      metric_name:  self.metric_name,
      label:        self.label,
      value:        decode_decimal(&self.value)?,
      currency:     self.currency,
      unit:         self.unit,
    })
  }
}

pub const CALL_COLUMNS: &str = "id, company_symbol, year, quarter, audio_url, transcript_url, \
                                file_size, call_date, language_code, duration_seconds, \
                                processed_at, created_at";

/// Raw values read directly from an `earnings_calls` row.
pub struct RawCall {
  pub id:               i64,
  pub company_symbol:   String,
  pub year:             i64,
  pub quarter:          i64,
  pub audio_url:        Option<String>,
  pub transcript_url:   Option<String>,
  pub file_size:        Option<i64>,
  pub call_date:        Option<String>,
  pub language_code:    String,
  pub duration_seconds: Option<i64>,
  pub processed_at:     Option<String>,
  pub created_at:       String,
}

impl RawCall {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      company_symbol:   row.get(1)?,
      year:             row.get(2)?,
      quarter:          row.get(3)?,
      audio_url:        row.get(4)?,
      transcript_url:   row.get(5)?,
      file_size:        row.get(6)?,
      call_date:        row.get(7)?,
      language_code:    row.get(8)?,
      duration_seconds: row.get(9)?,
      processed_at:     row.get(10)?,
      created_at:       row.get(11)?,
    })
  }

  pub fn into_call(self) -> Result<EarningsCall> {
    Ok(EarningsCall {
      id:               self.id,
      company_symbol:   decode_symbol(&self.company_symbol)?,
      year:             decode_year(self.year)?,
      quarter:          decode_quarter(self.quarter)?,
      audio_url:        self.audio_url,
      transcript_url:   self.transcript_url,
      file_size:        self.file_size,
      call_date:        self.call_date.as_deref().map(decode_date).transpose()?,
      language_code:    self.language_code,
      duration_seconds: self.duration_seconds,
      processed_at:     self.processed_at.as_deref().map(decode_dt).transpose()?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

pub const SEGMENT_COLUMNS: &str = "id, call_id, segment_number, segment_text, timestamp_start, \
                                   timestamp_end, speaker, sentiment_score, sentiment_label, \
                                   confidence_score, keywords, entities, embedding, created_at";

/// Raw values read directly from a `call_segments` row.
pub struct RawSegment {
  pub id:              i64,
  pub call_id:         i64,
  pub segment_number:  i64,
  pub text:            String,
  pub timestamp_start: Option<f64>,
  pub timestamp_end:   Option<f64>,
  pub speaker:         Option<String>,
  pub sentiment:       Option<f64>,
  pub sentiment_label: Option<String>,
  pub confidence:      Option<f64>,
  pub keywords:        String,
  pub entities:        String,
  pub embedding:       Option<Vec<u8>>,
  pub created_at:      String,
}

impl RawSegment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      call_id:         row.get(1)?,
      segment_number:  row.get(2)?,
      text:            row.get(3)?,
      timestamp_start: row.get(4)?,
      timestamp_end:   row.get(5)?,
      speaker:         row.get(6)?,
      sentiment:       row.get(7)?,
      sentiment_label: row.get(8)?,
      confidence:      row.get(9)?,
      keywords:        row.get(10)?,
      entities:        row.get(11)?,
      embedding:       row.get(12)?,
      created_at:      row.get(13)?,
    })
  }

  pub fn into_segment(self) -> Result<CallSegment> {
    Ok(CallSegment {
      id:              self.id,
      call_id:         self.call_id,
      segment_number:  self.segment_number,
      text:            self.text,
      timestamp_start: self.timestamp_start,
      timestamp_end:   self.timestamp_end,
      speaker:         self.speaker,
      sentiment:       self.sentiment.map(SentimentScore::new).transpose()?,
      sentiment_label: self.sentiment_label.as_deref().map(decode_label).transpose()?,
      confidence:      self.confidence.map(ConfidenceScore::new).transpose()?,
      keywords:        decode_strings(&self.keywords)?,
      entities:        decode_json(&self.entities)?,
      embedding:       self.embedding.as_deref().map(decode_embedding).transpose()?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub const INSIGHT_COLUMNS: &str = "id, call_id, overall_sentiment, key_topics, risk_mentions, \
                                   opportunity_mentions, guidance_changes, summary_text, \
                                   highlights, created_at";

/// Raw values read directly from a `call_insights` row.
pub struct RawInsight {
  pub id:                   i64,
  pub call_id:              i64,
  pub overall_sentiment:    Option<f64>,
  pub key_topics:           String,
  pub risk_mentions:        i64,
  pub opportunity_mentions: i64,
  pub guidance_changes:     Option<String>,
  pub summary_text:         Option<String>,
  pub highlights:           String,
  pub created_at:           String,
}

impl RawInsight {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                   row.get(0)?,
      call_id:              row.get(1)?,
      overall_sentiment:    row.get(2)?,
      key_topics:           row.get(3)?,
      risk_mentions:        row.get(4)?,
      opportunity_mentions: row.get(5)?,
      guidance_changes:     row.get(6)?,
      summary_text:         row.get(7)?,
      highlights:           row.get(8)?,
      created_at:           row.get(9)?,
    })
  }

  pub fn into_insight(self) -> Result<CallInsight> {
    Ok(CallInsight {
      id:                   self.id,
      call_id:              self.call_id,
      overall_sentiment:    self.overall_sentiment,
      key_topics:           decode_strings(&self.key_topics)?,
      risk_mentions:        self.risk_mentions,
      opportunity_mentions: self.opportunity_mentions,
      guidance_changes:     self.guidance_changes,
      summary_text:         self.summary_text,
      highlights:           decode_json(&self.highlights)?,
      created_at:           decode_dt(&self.created_at)?,
    })
  }
}

pub const OVERVIEW_COLUMNS: &str = "call_id, company_symbol, year, quarter, period_label, \
                                    call_date, is_processed, segment_count, avg_sentiment, \
                                    overall_sentiment, key_topics, risk_mentions, \
                                    opportunity_mentions";

/// Raw values read from the `earnings_call_overview` view.
pub struct RawOverview {
  pub call_id:              i64,
  pub company_symbol:       String,
  pub year:                 i64,
  pub quarter:              i64,
  pub period_label:         String,
  pub call_date:            Option<String>,
  pub is_processed:         bool,
  pub segment_count:        i64,
  pub avg_sentiment:        Option<f64>,
  pub overall_sentiment:    Option<f64>,
  pub key_topics:           Option<String>,
  pub risk_mentions:        Option<i64>,
  pub opportunity_mentions: Option<i64>,
}

impl RawOverview {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      call_id:              row.get(0)?,
      company_symbol:       row.get(1)?,
      year:                 row.get(2)?,
      quarter:              row.get(3)?,
      period_label:         row.get(4)?,
      call_date:            row.get(5)?,
      is_processed:         row.get(6)?,
      segment_count:        row.get(7)?,
      avg_sentiment:        row.get(8)?,
      overall_sentiment:    row.get(9)?,
      key_topics:           row.get(10)?,
      risk_mentions:        row.get(11)?,
      opportunity_mentions: row.get(12)?,
    })
  }

  pub fn into_overview(self) -> Result<CallOverview> {
    Ok(CallOverview {
      call_id:              self.call_id,
      company_symbol:       decode_symbol(&self.company_symbol)?,
      year:                 decode_year(self.year)?,
      quarter:              self.quarter,
      period_label:         self.period_label,
      call_date:            self.call_date.as_deref().map(decode_date).transpose()?,
      is_processed:         self.is_processed,
      segment_count:        self.segment_count,
      avg_sentiment:        self.avg_sentiment,
      overall_sentiment:    self.overall_sentiment,
      key_topics:           match self.key_topics {
        Some(s) => decode_strings(&s)?,
        None => Vec::new(),
      },
      risk_mentions:        self.risk_mentions,
      opportunity_mentions: self.opportunity_mentions,
    })
  }

  pub fn into_timeline_point(self) -> Result<TimelinePoint> {
    Ok(TimelinePoint {
      year:              decode_year(self.year)?,
      quarter:           self.quarter,
      period_label:      self.period_label,
      average_sentiment: self.avg_sentiment,
      overall_sentiment: self.overall_sentiment,
      segment_count:     self.segment_count,
    })
  }
}

pub const HIT_COLUMNS: &str = "s.id, s.call_id, s.segment_text, s.timestamp_start, \
                               s.timestamp_end, s.sentiment_score, s.sentiment_label, \
                               s.keywords, s.entities, ec.company_symbol, ec.year, ec.quarter, \
                               ec.call_date";

/// A segment joined with its call, as returned by both search paths. The
/// score is attached after the row is read.
pub struct RawHit {
  pub segment_id:      i64,
  pub call_id:         i64,
  pub text:            String,
  pub timestamp_start: Option<f64>,
  pub timestamp_end:   Option<f64>,
  pub sentiment:       Option<f64>,
  pub sentiment_label: Option<String>,
  pub keywords:        String,
  pub entities:        String,
  pub company_symbol:  String,
  pub year:            i64,
  pub quarter:         i64,
  pub call_date:       Option<String>,
}

impl RawHit {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      segment_id:      row.get(0)?,
      call_id:         row.get(1)?,
      text:            row.get(2)?,
      timestamp_start: row.get(3)?,
      timestamp_end:   row.get(4)?,
      sentiment:       row.get(5)?,
      sentiment_label: row.get(6)?,
      keywords:        row.get(7)?,
      entities:        row.get(8)?,
      company_symbol:  row.get(9)?,
      year:            row.get(10)?,
      quarter:         row.get(11)?,
      call_date:       row.get(12)?,
    })
  }

  pub fn into_hit(self, score: f64) -> Result<SegmentHit> {
    let year = decode_year(self.year)?;
    let quarter = decode_quarter(self.quarter)?;
    Ok(SegmentHit {
      segment_id: self.segment_id,
      call_id: self.call_id,
      text: self.text,
      timestamp_start: self.timestamp_start,
      timestamp_end: self.timestamp_end,
      sentiment: self.sentiment,
      sentiment_label: self.sentiment_label.as_deref().map(decode_label).transpose()?,
      keywords: decode_strings(&self.keywords)?,
      entities: decode_json(&self.entities)?,
      company_symbol: decode_symbol(&self.company_symbol)?,
      year,
      quarter: self.quarter,
      period_label: quarterly_core::financial::quarter_label(year, quarter),
      call_date: self.call_date.as_deref().map(decode_date).transpose()?,
      score,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_both_timestamp_forms() {
    assert!(decode_dt("2025-03-01T10:00:00.123Z").is_ok());
    assert!(decode_dt("2025-03-01T10:00:00+00:00").is_ok());
    assert!(decode_dt("2025-03-01 10:00:00").is_ok());
    assert!(decode_dt("yesterday").is_err());
  }

  #[test]
  fn embedding_blob_is_little_endian_f32() {
    let e = Embedding::new(vec![1.0, -0.5]).unwrap();
    let blob = encode_embedding(&e);
    assert_eq!(blob.len(), 8);
    assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
    assert_eq!(decode_embedding(&blob).unwrap(), e);
    assert!(decode_embedding(&blob[..5]).is_err());
  }

  #[test]
  fn decimal_text_keeps_scale() {
    let d = decode_decimal("123456.780").unwrap();
    assert_eq!(d.to_string(), "123456.780");
  }
}
