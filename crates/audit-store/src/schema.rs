pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE audits (
  id                  TEXT PRIMARY KEY,
  url                 TEXT NOT NULL,
  query               TEXT,
  status              TEXT NOT NULL CHECK (status IN ('pending','processing','completed','failed')),
  overall_score       INTEGER CHECK (overall_score BETWEEN 0 AND 100),
  module_scores_json  TEXT,
  rule_results_json   TEXT,
  query_fit_score     INTEGER CHECK (query_fit_score BETWEEN 0 AND 100),
  answer_draft        TEXT,
  suggested_faqs_json TEXT,
  error               TEXT,
  created_at          TEXT NOT NULL,
  created_at_ms       INTEGER NOT NULL,
  updated_at_ms       INTEGER NOT NULL
);

CREATE TABLE page_extracts (
  audit_id        TEXT PRIMARY KEY REFERENCES audits(id) ON DELETE CASCADE,
  status_code     INTEGER NOT NULL,
  final_url       TEXT NOT NULL,
  content_type    TEXT,
  title           TEXT,
  word_count      INTEGER NOT NULL,
  truncated       INTEGER NOT NULL CHECK (truncated IN (0,1)) DEFAULT 0,
  extract_json    TEXT NOT NULL,
  created_at_ms   INTEGER NOT NULL
);

CREATE INDEX idx_audits_created ON audits(created_at_ms DESC, id DESC);
CREATE INDEX idx_audits_status ON audits(status);

COMMIT;
"#;
