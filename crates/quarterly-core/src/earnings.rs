//! Earnings calls and their derived analysis.
//!
//! A call is the unit of ingestion. Its segments and its single insight row
//! are owned by the call: deleting the call deletes them. Scores and
//! embeddings arrive already computed; this crate only validates them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  company::Symbol,
  financial::{Quarter, quarter_label},
};

// ─── Bounded scores ──────────────────────────────────────────────────────────

/// Sentiment polarity in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SentimentScore(f64);

impl SentimentScore {
  pub const MAX: f64 = 1.0;
  pub const MIN: f64 = -1.0;

  pub fn new(value: f64) -> Result<Self> {
    check_range("sentiment_score", value, Self::MIN, Self::MAX).map(Self)
  }

  pub fn get(self) -> f64 { self.0 }

  pub fn label(self) -> SentimentLabel { SentimentLabel::from_score(self.0) }
}

impl TryFrom<f64> for SentimentScore {
  type Error = Error;

  fn try_from(v: f64) -> Result<Self> { Self::new(v) }
}

impl From<SentimentScore> for f64 {
  fn from(s: SentimentScore) -> Self { s.0 }
}

/// Model confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
  pub fn new(value: f64) -> Result<Self> {
    check_range("confidence_score", value, 0.0, 1.0).map(Self)
  }

  pub fn get(self) -> f64 { self.0 }
}

impl TryFrom<f64> for ConfidenceScore {
  type Error = Error;

  fn try_from(v: f64) -> Result<Self> { Self::new(v) }
}

impl From<ConfidenceScore> for f64 {
  fn from(s: ConfidenceScore) -> Self { s.0 }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
  if value.is_finite() && (min..=max).contains(&value) {
    Ok(value)
  } else {
    Err(Error::OutOfRange { field, min, max, value })
  }
}

/// Coarse sentiment bucket stored next to the score.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SentimentLabel {
  Positive,
  Negative,
  Neutral,
}

impl SentimentLabel {
  /// Scores above 0.1 are positive, below -0.1 negative.
  pub fn from_score(score: f64) -> Self {
    if score > 0.1 {
      Self::Positive
    } else if score < -0.1 {
      Self::Negative
    } else {
      Self::Neutral
    }
  }
}

// ─── Embedding ───────────────────────────────────────────────────────────────

/// A dense text embedding. The store checks its length against the configured
/// dimension before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
  pub fn new(values: Vec<f32>) -> Result<Self> {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
      return Err(Error::InvalidEmbedding);
    }
    Ok(Self(values))
  }

  pub fn values(&self) -> &[f32] { &self.0 }

  pub fn dimensions(&self) -> usize { self.0.len() }

  pub fn ensure_dimensions(&self, expected: usize) -> Result<()> {
    if self.0.len() == expected {
      Ok(())
    } else {
      Err(Error::EmbeddingDimension { expected, actual: self.0.len() })
    }
  }

  /// Cosine similarity in `[-1, 1]`; zero when either vector has zero norm or
  /// the lengths differ.
  pub fn cosine_similarity(&self, other: &Embedding) -> f64 {
    if self.0.len() != other.0.len() {
      return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (a, b) in self.0.iter().zip(&other.0) {
      let (a, b) = (f64::from(*a), f64::from(*b));
      dot += a * b;
      na += a * a;
      nb += b * b;
    }
    if na == 0.0 || nb == 0.0 {
      return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
  }
}

impl TryFrom<Vec<f32>> for Embedding {
  type Error = Error;

  fn try_from(v: Vec<f32>) -> Result<Self> { Self::new(v) }
}

impl From<Embedding> for Vec<f32> {
  fn from(e: Embedding) -> Self { e.0 }
}

// ─── Earnings call ───────────────────────────────────────────────────────────

/// Processing state of a call; derived from `processed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
  Pending,
  Processed,
}

/// One row of `earnings_calls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsCall {
  pub id:               i64,
  pub company_symbol:   Symbol,
  pub year:             i32,
  pub quarter:          Quarter,
  pub audio_url:        Option<String>,
  pub transcript_url:   Option<String>,
  /// Audio size in bytes.
  pub file_size:        Option<i64>,
  pub call_date:        Option<NaiveDate>,
  pub language_code:    String,
  pub duration_seconds: Option<i64>,
  pub processed_at:     Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
}

impl EarningsCall {
  pub fn state(&self) -> CallState {
    if self.processed_at.is_some() {
      CallState::Processed
    } else {
      CallState::Pending
    }
  }

  pub fn period_label(&self) -> String { quarter_label(self.year, self.quarter) }
}

/// Default `language_code` for new calls.
pub const DEFAULT_LANGUAGE: &str = "pt_BR";

/// Input to [`crate::store::EarningsStore::register_call`].
///
/// Registering the same (symbol, year, quarter) twice updates the source
/// metadata of the existing row rather than creating a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEarningsCall {
  pub company_symbol:   Symbol,
  pub year:             i32,
  pub quarter:          Quarter,
  #[serde(default)]
  pub audio_url:        Option<String>,
  #[serde(default)]
  pub transcript_url:   Option<String>,
  #[serde(default)]
  pub file_size:        Option<i64>,
  #[serde(default)]
  pub call_date:        Option<NaiveDate>,
  #[serde(default)]
  pub language_code:    Option<String>,
  #[serde(default)]
  pub duration_seconds: Option<i64>,
}

impl NewEarningsCall {
  pub fn new(company_symbol: Symbol, year: i32, quarter: Quarter) -> Self {
    Self {
      company_symbol,
      year,
      quarter,
      audio_url: None,
      transcript_url: None,
      file_size: None,
      call_date: None,
      language_code: None,
      duration_seconds: None,
    }
  }
}

/// Filter for [`crate::store::EarningsStore::list_calls`].
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
  pub symbol: Option<Symbol>,
  pub year:   Option<i32>,
  pub state:  Option<CallState>,
}

// ─── Segments ────────────────────────────────────────────────────────────────

/// One transcript chunk of a call, with its analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSegment {
  pub id:              i64,
  pub call_id:         i64,
  pub segment_number:  i64,
  pub text:            String,
  pub timestamp_start: Option<f64>,
  pub timestamp_end:   Option<f64>,
  pub speaker:         Option<String>,
  pub sentiment:       Option<SentimentScore>,
  pub sentiment_label: Option<SentimentLabel>,
  pub confidence:      Option<ConfidenceScore>,
  pub keywords:        Vec<String>,
  /// Named entities grouped by kind, e.g. `{"amounts": ["R$ 45 bilhões"]}`.
  pub entities:        serde_json::Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub embedding:       Option<Embedding>,
  pub created_at:      DateTime<Utc>,
}

/// Input to [`crate::store::EarningsStore::save_segment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSegment {
  pub segment_number:  i64,
  pub text:            String,
  #[serde(default)]
  pub timestamp_start: Option<f64>,
  #[serde(default)]
  pub timestamp_end:   Option<f64>,
  #[serde(default)]
  pub speaker:         Option<String>,
  #[serde(default)]
  pub sentiment:       Option<SentimentScore>,
  #[serde(default)]
  pub sentiment_label: Option<SentimentLabel>,
  #[serde(default)]
  pub confidence:      Option<ConfidenceScore>,
  #[serde(default)]
  pub keywords:        Vec<String>,
  #[serde(default = "empty_object")]
  pub entities:        serde_json::Value,
  #[serde(default)]
  pub embedding:       Option<Embedding>,
}

fn empty_object() -> serde_json::Value { serde_json::Value::Object(Default::default()) }

impl NewSegment {
  pub fn new(segment_number: i64, text: impl Into<String>) -> Self {
    Self {
      segment_number,
      text: text.into(),
      timestamp_start: None,
      timestamp_end: None,
      speaker: None,
      sentiment: None,
      sentiment_label: None,
      confidence: None,
      keywords: Vec::new(),
      entities: empty_object(),
      embedding: None,
    }
  }

  /// The stored label: explicit if given, otherwise derived from the score.
  pub fn effective_label(&self) -> Option<SentimentLabel> {
    self
      .sentiment_label
      .or_else(|| self.sentiment.map(SentimentScore::label))
  }
}

// ─── Insights ────────────────────────────────────────────────────────────────

/// The single call-level summary row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInsight {
  pub id:                   i64,
  pub call_id:              i64,
  pub overall_sentiment:    Option<f64>,
  pub key_topics:           Vec<String>,
  pub risk_mentions:        i64,
  pub opportunity_mentions: i64,
  pub guidance_changes:     Option<String>,
  pub summary_text:         Option<String>,
  pub highlights:           serde_json::Value,
  pub created_at:           DateTime<Utc>,
}

/// Input to [`crate::store::EarningsStore::save_insight`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInsight {
  pub overall_sentiment:    Option<SentimentScore>,
  #[serde(default)]
  pub key_topics:           Vec<String>,
  #[serde(default)]
  pub risk_mentions:        i64,
  #[serde(default)]
  pub opportunity_mentions: i64,
  #[serde(default)]
  pub guidance_changes:     Option<String>,
  #[serde(default)]
  pub summary_text:         Option<String>,
  #[serde(default = "empty_object")]
  pub highlights:           serde_json::Value,
}

/// Row counts removed by [`crate::store::EarningsStore::delete_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedCall {
  pub call_id:  i64,
  pub segments: u64,
  pub insights: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sentiment_bounds() {
    assert!(SentimentScore::new(-1.0).is_ok());
    assert!(SentimentScore::new(1.0).is_ok());
    assert!(SentimentScore::new(1.01).is_err());
    assert!(SentimentScore::new(-1.5).is_err());
    assert!(SentimentScore::new(f64::NAN).is_err());
  }

  #[test]
  fn confidence_bounds() {
    assert!(ConfidenceScore::new(0.0).is_ok());
    assert!(ConfidenceScore::new(1.0).is_ok());
    assert!(ConfidenceScore::new(-0.01).is_err());
    assert!(ConfidenceScore::new(1.2).is_err());
  }

  #[test]
  fn out_of_range_scores_fail_deserialisation() {
    let raw = r#"{"segment_number": 1, "text": "x", "sentiment": 2.0}"#;
    assert!(serde_json::from_str::<NewSegment>(raw).is_err());
  }

  #[test]
  fn label_thresholds() {
    assert_eq!(SentimentLabel::from_score(0.11), SentimentLabel::Positive);
    assert_eq!(SentimentLabel::from_score(0.1), SentimentLabel::Neutral);
    assert_eq!(SentimentLabel::from_score(-0.1), SentimentLabel::Neutral);
    assert_eq!(SentimentLabel::from_score(-0.5), SentimentLabel::Negative);
    assert_eq!("negative".parse::<SentimentLabel>().unwrap(), SentimentLabel::Negative);
  }

  #[test]
  fn effective_label_falls_back_to_score() {
    let mut seg = NewSegment::new(1, "texto");
    assert_eq!(seg.effective_label(), None);
    seg.sentiment = Some(SentimentScore::new(0.4).unwrap());
    assert_eq!(seg.effective_label(), Some(SentimentLabel::Positive));
    seg.sentiment_label = Some(SentimentLabel::Neutral);
    assert_eq!(seg.effective_label(), Some(SentimentLabel::Neutral));
  }

  #[test]
  fn embedding_validation_and_similarity() {
    assert!(Embedding::new(vec![]).is_err());
    assert!(Embedding::new(vec![1.0, f32::NAN]).is_err());

    let a = Embedding::new(vec![1.0, 0.0, 0.0]).unwrap();
    let b = Embedding::new(vec![0.0, 1.0, 0.0]).unwrap();
    assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-9);
    assert!(a.cosine_similarity(&b).abs() < 1e-9);
    assert!(a.ensure_dimensions(3).is_ok());
    assert!(matches!(
      a.ensure_dimensions(768),
      Err(Error::EmbeddingDimension { expected: 768, actual: 3 })
    ));
  }
}
