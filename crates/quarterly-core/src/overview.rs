//! Read models over earnings calls: the overview projection, search hits,
//! sentiment timelines and per-call highlights.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  company::Symbol,
  earnings::{CallInsight, CallSegment, EarningsCall, Embedding, SentimentLabel},
};

/// One row of the `earnings_call_overview` view. Always current: the view is
/// recomputed on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOverview {
  pub call_id:              i64,
  pub company_symbol:       Symbol,
  pub year:                 i32,
  pub quarter:              i64,
  pub period_label:         String,
  pub call_date:            Option<NaiveDate>,
  pub is_processed:         bool,
  pub segment_count:        i64,
  pub avg_sentiment:        Option<f64>,
  pub overall_sentiment:    Option<f64>,
  pub key_topics:           Vec<String>,
  pub risk_mentions:        Option<i64>,
  pub opportunity_mentions: Option<i64>,
}

/// Full-text search over segment text.
#[derive(Debug, Clone)]
pub struct TextSearch {
  pub query:  String,
  pub symbol: Option<Symbol>,
  pub year:   Option<i32>,
  pub limit:  usize,
}

impl TextSearch {
  pub fn new(query: impl Into<String>) -> Self {
    Self { query: query.into(), symbol: None, year: None, limit: 10 }
  }
}

/// Nearest-neighbour search over segment embeddings.
#[derive(Debug, Clone)]
pub struct SimilaritySearch {
  pub embedding: Embedding,
  pub symbol:    Option<Symbol>,
  pub limit:     usize,
  /// Minimum cosine similarity for a hit to be returned.
  pub threshold: f64,
}

impl SimilaritySearch {
  pub fn new(embedding: Embedding) -> Self {
    Self { embedding, symbol: None, limit: 10, threshold: 0.5 }
  }
}

/// A segment matched by a search, with the owning call's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHit {
  pub segment_id:      i64,
  pub call_id:         i64,
  pub text:            String,
  pub timestamp_start: Option<f64>,
  pub timestamp_end:   Option<f64>,
  pub sentiment:       Option<f64>,
  pub sentiment_label: Option<SentimentLabel>,
  pub keywords:        Vec<String>,
  pub entities:        serde_json::Value,
  pub company_symbol:  Symbol,
  pub year:            i32,
  pub quarter:         i64,
  pub period_label:    String,
  pub call_date:       Option<NaiveDate>,
  /// Higher is better. Relevance rank for text search, cosine similarity for
  /// embedding search.
  pub score:           f64,
}

/// Sentiment of one call in a company's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePoint {
  pub year:              i32,
  pub quarter:           i64,
  pub period_label:      String,
  pub average_sentiment: Option<f64>,
  pub overall_sentiment: Option<f64>,
  pub segment_count:     i64,
}

/// A call, its insight, and its most extreme segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallHighlights {
  pub call:          EarningsCall,
  pub insight:       Option<CallInsight>,
  pub most_positive: Vec<CallSegment>,
  pub most_negative: Vec<CallSegment>,
}
