//! SQL schema for the quarterly SQLite store, as ordered migrations.
//!
//! Migrations are applied by [`crate::migrate`] and are expected to be
//! re-runnable: every `CREATE` carries `IF NOT EXISTS` and every seed row uses
//! `ON CONFLICT ... DO NOTHING`. Once released, a migration's SQL must never
//! change; its checksum is recorded when it is applied.

use sha2::{Digest, Sha256};

/// One versioned schema step.
#[derive(Debug)]
pub struct Migration {
  pub version: i64,
  pub name:    &'static str,
  pub sql:     &'static str,
}

impl Migration {
  /// Lower-case hex SHA-256 of the migration SQL.
  pub fn checksum(&self) -> String { hex::encode(Sha256::digest(self.sql.as_bytes())) }
}

/// All migrations, in application order. Versions are contiguous from 1.
pub static MIGRATIONS: &[Migration] = &[
  Migration { version: 1, name: "financial_core", sql: FINANCIAL_CORE },
  Migration { version: 2, name: "normalized_financials", sql: NORMALIZED_FINANCIALS },
  Migration { version: 3, name: "earnings_calls", sql: EARNINGS_CALLS },
];

/// The newest schema version this binary knows how to produce.
pub fn latest_version() -> i64 { MIGRATIONS.last().map_or(0, |m| m.version) }

/// Bookkeeping table for applied migrations. Created outside the versioned
/// sequence because the migrator needs it before it can read any version.
pub const MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    checksum    TEXT NOT NULL,
    applied_at  TEXT NOT NULL
);
";

/// Name of the snapshot table maintained by [`crate::view`].
pub const TIME_SERIES_VIEW: &str = "metric_time_series";

const FINANCIAL_CORE: &str = "
CREATE TABLE IF NOT EXISTS companies (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol      TEXT NOT NULL UNIQUE CHECK (length(symbol) BETWEEN 1 AND 10),
    name        TEXT NOT NULL,
    sector      TEXT,
    country     TEXT,
    currency    TEXT,
    created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Flat layout: one row per (company, period, metric).
CREATE TABLE IF NOT EXISTS financial_data (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id    INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    year          INTEGER NOT NULL,
    quarter       INTEGER CHECK (quarter BETWEEN 1 AND 4),   -- NULL for annual
    metric_name   TEXT NOT NULL,
    metric_value  TEXT NOT NULL,                             -- decimal string
    unit          TEXT,
    created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- NULL quarters are distinct under UNIQUE, so annual rows are keyed as 0.
CREATE UNIQUE INDEX IF NOT EXISTS financial_data_fact_uq
    ON financial_data(company_id, year, COALESCE(quarter, 0), metric_name);
CREATE INDEX IF NOT EXISTS financial_data_company_idx ON financial_data(company_id);
CREATE INDEX IF NOT EXISTS financial_data_year_idx    ON financial_data(year);
CREATE INDEX IF NOT EXISTS financial_data_metric_idx  ON financial_data(metric_name);

INSERT INTO companies (symbol, name, sector, country, currency) VALUES
    ('PETR4', 'Petróleo Brasileiro S.A. - Petrobras', 'Energia',   'Brasil', 'BRL'),
    ('VALE3', 'Vale S.A.',                            'Mineração', 'Brasil', 'BRL')
ON CONFLICT(symbol) DO NOTHING;
";

const NORMALIZED_FINANCIALS: &str = "
CREATE TABLE IF NOT EXISTS financial_periods (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id    INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    year          INTEGER NOT NULL,
    quarter       INTEGER CHECK (quarter BETWEEN 1 AND 4),
    period_label  TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS financial_periods_uq
    ON financial_periods(company_id, year, COALESCE(quarter, 0));

CREATE TABLE IF NOT EXISTS financial_metrics (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    period_id        INTEGER NOT NULL REFERENCES financial_periods(id) ON DELETE CASCADE,
    metric_name      TEXT NOT NULL,
    metric_label     TEXT,
    value            TEXT NOT NULL,
    currency         TEXT,
    unit             TEXT,
    metric_category  TEXT,
    created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (period_id, metric_name)
);

CREATE INDEX IF NOT EXISTS financial_metrics_name_idx     ON financial_metrics(metric_name);
CREATE INDEX IF NOT EXISTS financial_metrics_category_idx ON financial_metrics(metric_category);

-- Snapshot projection; rebuilt only by an explicit refresh.
CREATE TABLE IF NOT EXISTS metric_time_series (
    symbol           TEXT NOT NULL,
    company_name     TEXT NOT NULL,
    year             INTEGER NOT NULL,
    quarter          INTEGER,
    period_label     TEXT NOT NULL,
    metric_name      TEXT NOT NULL,
    metric_label     TEXT,
    value            TEXT NOT NULL,
    currency         TEXT,
    unit             TEXT,
    metric_category  TEXT
);

CREATE INDEX IF NOT EXISTS metric_time_series_lookup_idx
    ON metric_time_series(symbol, metric_name, year, quarter);

CREATE TABLE IF NOT EXISTS materialized_views (
    name          TEXT PRIMARY KEY,
    refreshed_at  TEXT,   -- NULL until the first refresh
    dirty_since   TEXT    -- first write since the last refresh; NULL when current
);

INSERT INTO materialized_views (name) VALUES ('metric_time_series')
ON CONFLICT(name) DO NOTHING;

-- Any write to a source table marks the snapshot dirty, keeping the
-- earliest timestamp so staleness is measured from the first unseen write.
CREATE TRIGGER IF NOT EXISTS financial_metrics_dirty_ai AFTER INSERT ON financial_metrics BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS financial_metrics_dirty_au AFTER UPDATE ON financial_metrics BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS financial_metrics_dirty_ad AFTER DELETE ON financial_metrics BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS financial_periods_dirty_au AFTER UPDATE ON financial_periods BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS companies_dirty_au AFTER UPDATE ON companies BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS financial_data_dirty_ai AFTER INSERT ON financial_data BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS financial_data_dirty_au AFTER UPDATE ON financial_data BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
CREATE TRIGGER IF NOT EXISTS financial_data_dirty_ad AFTER DELETE ON financial_data BEGIN
    UPDATE materialized_views
       SET dirty_since = COALESCE(dirty_since, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
     WHERE name = 'metric_time_series';
END;
";

const EARNINGS_CALLS: &str = "
CREATE TABLE IF NOT EXISTS earnings_calls (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    company_symbol    TEXT NOT NULL REFERENCES companies(symbol) ON UPDATE CASCADE,
    year              INTEGER NOT NULL,
    quarter           INTEGER NOT NULL CHECK (quarter BETWEEN 1 AND 4),
    audio_url         TEXT,
    transcript_url    TEXT,
    file_size         INTEGER CHECK (file_size >= 0),   -- bytes
    call_date         TEXT,                             -- YYYY-MM-DD
    language_code     TEXT NOT NULL DEFAULT 'pt_BR',
    duration_seconds  INTEGER,
    processed_at      TEXT,                             -- NULL while pending
    created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (company_symbol, year, quarter)
);

CREATE TABLE IF NOT EXISTS call_segments (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    call_id           INTEGER NOT NULL REFERENCES earnings_calls(id) ON DELETE CASCADE,
    segment_number    INTEGER NOT NULL,
    segment_text      TEXT NOT NULL,
    timestamp_start   REAL,
    timestamp_end     REAL,
    speaker           TEXT,
    sentiment_score   REAL CHECK (sentiment_score BETWEEN -1 AND 1),
    sentiment_label   TEXT CHECK (sentiment_label IN ('positive', 'negative', 'neutral')),
    confidence_score  REAL CHECK (confidence_score BETWEEN 0 AND 1),
    keywords          TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    entities          TEXT NOT NULL DEFAULT '{}',   -- JSON object
    embedding         BLOB,                         -- little-endian f32
    created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (call_id, segment_number)
);

CREATE TABLE IF NOT EXISTS call_insights (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    call_id               INTEGER NOT NULL UNIQUE REFERENCES earnings_calls(id) ON DELETE CASCADE,
    overall_sentiment     REAL CHECK (overall_sentiment BETWEEN -1 AND 1),
    key_topics            TEXT NOT NULL DEFAULT '[]',
    risk_mentions         INTEGER NOT NULL DEFAULT 0 CHECK (risk_mentions >= 0),
    opportunity_mentions  INTEGER NOT NULL DEFAULT 0 CHECK (opportunity_mentions >= 0),
    guidance_changes      TEXT,
    summary_text          TEXT,
    highlights            TEXT NOT NULL DEFAULT '{}',
    created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS earnings_calls_company_idx   ON earnings_calls(company_symbol);
CREATE INDEX IF NOT EXISTS earnings_calls_period_idx    ON earnings_calls(year DESC, quarter DESC);
CREATE INDEX IF NOT EXISTS call_segments_call_idx       ON call_segments(call_id);
CREATE INDEX IF NOT EXISTS call_segments_sentiment_idx  ON call_segments(sentiment_score);
CREATE INDEX IF NOT EXISTS call_segments_timestamp_idx  ON call_segments(timestamp_start);

-- External-content full-text index over segment text, kept in step by
-- triggers. Diacritics are folded so 'producao' matches 'produção'.
CREATE VIRTUAL TABLE IF NOT EXISTS call_segments_fts USING fts5(
    segment_text,
    content = 'call_segments',
    content_rowid = 'id',
    tokenize = 'unicode61 remove_diacritics 2'
);

CREATE TRIGGER IF NOT EXISTS call_segments_fts_ai AFTER INSERT ON call_segments BEGIN
    INSERT INTO call_segments_fts(rowid, segment_text) VALUES (new.id, new.segment_text);
END;
CREATE TRIGGER IF NOT EXISTS call_segments_fts_ad AFTER DELETE ON call_segments BEGIN
    INSERT INTO call_segments_fts(call_segments_fts, rowid, segment_text)
    VALUES ('delete', old.id, old.segment_text);
END;
CREATE TRIGGER IF NOT EXISTS call_segments_fts_au AFTER UPDATE ON call_segments BEGIN
    INSERT INTO call_segments_fts(call_segments_fts, rowid, segment_text)
    VALUES ('delete', old.id, old.segment_text);
    INSERT INTO call_segments_fts(rowid, segment_text) VALUES (new.id, new.segment_text);
END;

-- Always current: recomputed on every read.
CREATE VIEW IF NOT EXISTS earnings_call_overview AS
SELECT
    ec.id                                                        AS call_id,
    ec.company_symbol                                            AS company_symbol,
    ec.year                                                      AS year,
    ec.quarter                                                   AS quarter,
    ec.quarter || 'T' || substr(CAST(ec.year AS TEXT), 3, 2)     AS period_label,
    ec.call_date                                                 AS call_date,
    ec.processed_at IS NOT NULL                                  AS is_processed,
    COUNT(cs.id)                                                 AS segment_count,
    AVG(cs.sentiment_score)                                      AS avg_sentiment,
    ci.overall_sentiment                                         AS overall_sentiment,
    ci.key_topics                                                AS key_topics,
    ci.risk_mentions                                             AS risk_mentions,
    ci.opportunity_mentions                                      AS opportunity_mentions
FROM earnings_calls ec
LEFT JOIN call_segments cs ON cs.call_id = ec.id
LEFT JOIN call_insights ci ON ci.call_id = ec.id
GROUP BY ec.id;
";

/// DDL for the optional sqlite-vec index. Only executed once the `vec0`
/// module is known to be registered.
pub fn vector_index_sql(dimensions: usize) -> String {
  format!(
    "CREATE VIRTUAL TABLE IF NOT EXISTS vec_segments USING vec0(
         segment_id INTEGER PRIMARY KEY,
         embedding  float[{dimensions}] distance_metric=cosine
     );"
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn versions_are_contiguous() {
    for (i, m) in MIGRATIONS.iter().enumerate() {
      assert_eq!(m.version, i as i64 + 1, "migration {}", m.name);
    }
    assert_eq!(latest_version(), 3);
  }

  #[test]
  fn checksum_is_stable_hex() {
    let sum = MIGRATIONS[0].checksum();
    assert_eq!(sum.len(), 64);
    assert_eq!(sum, MIGRATIONS[0].checksum());
    assert_ne!(sum, MIGRATIONS[1].checksum());
  }

  #[test]
  fn every_create_is_guarded() {
    for m in MIGRATIONS {
      for line in m.sql.lines().map(str::trim_start) {
        if line.starts_with("CREATE ") {
          assert!(line.contains("IF NOT EXISTS"), "{}: {line}", m.name);
        }
      }
    }
    assert!(vector_index_sql(768).contains("IF NOT EXISTS"));
  }
}
