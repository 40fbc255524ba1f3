//! Call-level insight aggregation.
//!
//! Folds already-analysed segments into the single [`NewInsight`] row stored
//! per call. Everything here is counting and averaging; no model runs.

use serde::Deserialize;
use serde_json::json;

use crate::earnings::{NewInsight, NewSegment, SentimentLabel, SentimentScore};

const KEY_TOPIC_COUNT: usize = 5;
const TOP_KEYWORD_COUNT: usize = 10;
const HIGHLIGHT_COUNT: usize = 3;
const HIGHLIGHT_CHARS: usize = 200;
const GUIDANCE_SENTENCES: usize = 3;

const RISK_KEYWORDS: &[&str] = &[
  "risco",
  "incerteza",
  "volatilidade",
  "pressão",
  "desafio",
  "ameaça",
  "exposição",
  "vulnerabilidade",
  "instabilidade",
];

const OPPORTUNITY_KEYWORDS: &[&str] = &[
  "oportunidade",
  "potencial",
  "crescimento",
  "expansão",
  "melhoria",
  "avanço",
  "desenvolvimento",
  "inovação",
];

const GUIDANCE_KEYWORDS: &[&str] = &[
  "projeção",
  "estimativa",
  "meta",
  "objetivo",
  "previsão",
  "expectativa",
  "guidance",
  "outlook",
  "cenário",
  "perspectiva",
];

/// A segment as produced by the upstream analysis step: the storable segment
/// plus the topics it was tagged with (topics are not stored per segment).
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentAnalysis {
  #[serde(flatten)]
  pub segment: NewSegment,
  #[serde(default)]
  pub topics:  Vec<String>,
}

impl From<NewSegment> for SegmentAnalysis {
  fn from(segment: NewSegment) -> Self { Self { segment, topics: Vec::new() } }
}

/// Aggregate analysed segments into the call's insight row.
pub fn summarize(segments: &[SegmentAnalysis]) -> NewInsight {
  let scores: Vec<f64> = segments
    .iter()
    .filter_map(|s| s.segment.sentiment.map(SentimentScore::get))
    .collect();
  let overall = (!scores.is_empty())
    .then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    .and_then(|mean| SentimentScore::new(mean).ok());

  let key_topics = most_common(
    segments.iter().flat_map(|s| s.topics.iter()),
    KEY_TOPIC_COUNT,
  );
  let top_keywords = most_common(
    segments.iter().flat_map(|s| s.segment.keywords.iter()),
    TOP_KEYWORD_COUNT,
  );

  let full_text = segments
    .iter()
    .map(|s| s.segment.text.as_str())
    .collect::<Vec<_>>()
    .join(" ");
  let lowered = full_text.to_lowercase();

  let label = SentimentLabel::from_score(overall.map(SentimentScore::get).unwrap_or(0.0));
  let summary_text = format!(
    "{} segments analysed; overall sentiment {} ({:+.3}); top keywords: {}",
    segments.len(),
    label,
    overall.map(SentimentScore::get).unwrap_or(0.0),
    if top_keywords.is_empty() {
      "none".to_owned()
    } else {
      top_keywords.join(", ")
    },
  );

  NewInsight {
    overall_sentiment: overall,
    key_topics,
    risk_mentions: count_present(&lowered, RISK_KEYWORDS),
    opportunity_mentions: count_present(&lowered, OPPORTUNITY_KEYWORDS),
    guidance_changes: guidance_sentences(&full_text),
    summary_text: Some(summary_text),
    highlights: highlights(segments),
  }
}

/// Number of distinct keywords from `keywords` that occur in `text`.
fn count_present(text: &str, keywords: &[&str]) -> i64 {
  keywords.iter().filter(|k| text.contains(*k)).count() as i64
}

/// Up to `n` most frequent items; ties keep first-seen order.
fn most_common<'a>(items: impl Iterator<Item = &'a String>, n: usize) -> Vec<String> {
  let mut counts: Vec<(&'a String, usize)> = Vec::new();
  for item in items {
    match counts.iter_mut().find(|(k, _)| *k == item) {
      Some((_, c)) => *c += 1,
      None => counts.push((item, 1)),
    }
  }
  // Stable sort keeps insertion order among equal counts.
  counts.sort_by(|a, b| b.1.cmp(&a.1));
  counts.into_iter().take(n).map(|(k, _)| k.clone()).collect()
}

fn guidance_sentences(text: &str) -> Option<String> {
  let found: Vec<&str> = text
    .split('.')
    .map(str::trim)
    .filter(|s| {
      let lower = s.to_lowercase();
      GUIDANCE_KEYWORDS.iter().any(|k| lower.contains(k))
    })
    .take(GUIDANCE_SENTENCES)
    .collect();
  (!found.is_empty()).then(|| found.join(" | "))
}

fn highlights(segments: &[SegmentAnalysis]) -> serde_json::Value {
  let mut scored: Vec<(&NewSegment, f64)> = segments
    .iter()
    .filter_map(|s| s.segment.sentiment.map(|v| (&s.segment, v.get())))
    .collect();
  scored.sort_by(|a, b| a.1.total_cmp(&b.1));

  let entry = |(seg, score): &(&NewSegment, f64)| {
    json!({
      "text": excerpt(&seg.text),
      "sentiment": score,
      "segment_number": seg.segment_number,
    })
  };

  let negative: Vec<_> = scored.iter().take(HIGHLIGHT_COUNT).map(entry).collect();
  let positive: Vec<_> = scored.iter().rev().take(HIGHLIGHT_COUNT).map(entry).collect();

  json!({ "positive": positive, "negative": negative })
}

fn excerpt(text: &str) -> String {
  if text.chars().count() <= HIGHLIGHT_CHARS {
    return text.to_owned();
  }
  let mut cut: String = text.chars().take(HIGHLIGHT_CHARS).collect();
  cut.push_str("...");
  cut
}
