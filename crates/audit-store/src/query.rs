use crate::{Db, StoreError};
use aeo_core::{Audit, AuditStatus, AuditSummary, PageExtract};
use rusqlite::{OptionalExtension, Row};
use serde::de::DeserializeOwned;

const AUDIT_COLUMNS: &str = "id,url,query,status,overall_score,module_scores_json,rule_results_json,
    query_fit_score,answer_draft,suggested_faqs_json,error,created_at";

/// Raw column values before JSON and status decoding.
struct AuditRow {
    id: String,
    url: String,
    query: Option<String>,
    status: String,
    overall_score: Option<i64>,
    module_scores_json: Option<String>,
    rule_results_json: Option<String>,
    query_fit_score: Option<i64>,
    answer_draft: Option<String>,
    suggested_faqs_json: Option<String>,
    error: Option<String>,
    created_at: String,
}

impl AuditRow {
    fn from_row(r: &Row) -> rusqlite::Result<Self> {
        Ok(AuditRow {
            id: r.get(0)?,
            url: r.get(1)?,
            query: r.get(2)?,
            status: r.get(3)?,
            overall_score: r.get(4)?,
            module_scores_json: r.get(5)?,
            rule_results_json: r.get(6)?,
            query_fit_score: r.get(7)?,
            answer_draft: r.get(8)?,
            suggested_faqs_json: r.get(9)?,
            error: r.get(10)?,
            created_at: r.get(11)?,
        })
    }

    fn into_audit(self) -> Result<Audit, StoreError> {
        let status = parse_status(&self.id, &self.status)?;
        Ok(Audit {
            module_scores: decode(&self.id, self.module_scores_json.as_deref())?,
            rule_results: decode(&self.id, self.rule_results_json.as_deref())?,
            suggested_faqs: decode(&self.id, self.suggested_faqs_json.as_deref())?,
            overall_score: self.overall_score.map(score),
            query_fit_score: self.query_fit_score.map(score),
            id: self.id,
            url: self.url,
            query: self.query,
            status,
            answer_draft: self.answer_draft,
            error: self.error,
            created_at: self.created_at,
        })
    }
}

fn score(v: i64) -> u8 {
    v.clamp(0, 100) as u8
}

fn parse_status(id: &str, s: &str) -> Result<AuditStatus, StoreError> {
    s.parse().map_err(|e: aeo_core::CoreError| StoreError::Corrupt { id: id.to_string(), reason: e.to_string() })
}

fn decode<T: DeserializeOwned>(id: &str, json: Option<&str>) -> Result<Option<T>, StoreError> {
    json.map(|s| serde_json::from_str::<T>(s))
        .transpose()
        .map_err(|e| StoreError::Corrupt { id: id.to_string(), reason: e.to_string() })
}

impl Db {
    pub fn get_audit(&self, id: &str) -> Result<Option<Audit>, StoreError> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE id=?");
        let row = self.conn.query_row(&sql, [id], AuditRow::from_row).optional()?;
        row.map(AuditRow::into_audit).transpose()
    }

    pub fn get_extract(&self, id: &str) -> Result<Option<PageExtract>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT extract_json FROM page_extracts WHERE audit_id=?", [id], |r| r.get(0))
            .optional()?;
        decode(id, json.as_deref())
    }

    /// Newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<AuditSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id,url,query,created_at,overall_score,status FROM audits
             ORDER BY created_at_ms DESC, id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map([limit as i64], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<i64>>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, url, query, created_at, overall, status) = row?;
            let status = parse_status(&id, &status)?;
            out.push(AuditSummary { id, url, query, created_at, overall_score: overall.map(score), status });
        }
        Ok(out)
    }

    pub fn count_audits(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row("SELECT COUNT(1) FROM audits", [], |r| r.get(0))?)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }
}
