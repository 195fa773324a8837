use crate::models::{now_ms, now_stamp};
use crate::{AuditResults, Db, StoreError};
use aeo_core::{Audit, AuditStatus, PageExtract};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_FAILURE: &str = "audit failed";

impl Db {
    /// Insert a new `pending` audit with a fresh v7 id.
    pub fn create_audit(&self, url: &str, query: Option<&str>) -> Result<Audit, StoreError> {
        let id = Uuid::now_v7().to_string();
        let (created_at, created_ms) = now_stamp();
        self.conn.execute(
            "INSERT INTO audits(id,url,query,status,created_at,created_at_ms,updated_at_ms) VALUES (?,?,?,?,?,?,?)",
            params![id, url, query, AuditStatus::Pending.as_str(), created_at, created_ms, created_ms],
        )?;
        debug!(%id, url, "created audit");
        Ok(Audit {
            id,
            url: url.to_string(),
            query: query.map(str::to_string),
            status: AuditStatus::Pending,
            overall_score: None,
            module_scores: None,
            rule_results: None,
            query_fit_score: None,
            answer_draft: None,
            suggested_faqs: None,
            error: None,
            created_at,
        })
    }

    pub fn mark_processing(&self, id: &str) -> Result<(), StoreError> {
        let n = self.conn.execute(
            "UPDATE audits SET status=?, updated_at_ms=? WHERE id=? AND status=?",
            params![AuditStatus::Processing.as_str(), now_ms(), id, AuditStatus::Pending.as_str()],
        )?;
        if n == 0 {
            return Err(self.transition_error(id, AuditStatus::Processing)?);
        }
        Ok(())
    }

    /// Record results and the page extract atomically; `processing -> completed`.
    pub fn complete_audit(&self, id: &str, results: &AuditResults, extract: &PageExtract) -> Result<(), StoreError> {
        let module_scores = serde_json::to_string(&results.score.module_scores)?;
        let rule_results = serde_json::to_string(&results.score.rule_results)?;
        let faqs = results.query.as_ref().map(|q| serde_json::to_string(&q.suggested_faqs)).transpose()?;
        let extract_json = serde_json::to_string(extract)?;
        let at = now_ms();

        let tx = self.conn.unchecked_transaction()?;
        let n = tx.execute(
            "UPDATE audits SET status=?, overall_score=?, module_scores_json=?, rule_results_json=?,
             query_fit_score=?, answer_draft=?, suggested_faqs_json=?, error=NULL, updated_at_ms=?
             WHERE id=? AND status=?",
            params![
                AuditStatus::Completed.as_str(),
                results.score.overall_score,
                module_scores,
                rule_results,
                results.query.as_ref().map(|q| q.query_fit_score),
                results.query.as_ref().map(|q| q.answer_draft.as_str()),
                faqs,
                at,
                id,
                AuditStatus::Processing.as_str(),
            ],
        )?;
        if n == 0 {
            drop(tx);
            return Err(self.transition_error(id, AuditStatus::Completed)?);
        }
        tx.execute(
            "INSERT INTO page_extracts(audit_id,status_code,final_url,content_type,title,word_count,truncated,extract_json,created_at_ms)
             VALUES (?,?,?,?,?,?,?,?,?)",
            params![
                id,
                extract.status_code,
                extract.final_url,
                extract.content_type,
                extract.title,
                extract.word_count as i64,
                if extract.truncated { 1i64 } else { 0i64 },
                extract_json,
                at,
            ],
        )?;
        tx.commit()?;
        debug!(id, overall_score = results.score.overall_score, "completed audit");
        Ok(())
    }

    /// `processing -> failed`, or `pending -> failed` when the audit never got
    /// as far as processing. A blank message is replaced so failed audits
    /// always explain themselves.
    pub fn fail_audit(&self, id: &str, message: &str) -> Result<(), StoreError> {
        let message = if message.trim().is_empty() { DEFAULT_FAILURE } else { message.trim() };
        let n = self.conn.execute(
            "UPDATE audits SET status=?, error=?, updated_at_ms=? WHERE id=? AND status IN (?,?)",
            params![
                AuditStatus::Failed.as_str(),
                message,
                now_ms(),
                id,
                AuditStatus::Pending.as_str(),
                AuditStatus::Processing.as_str(),
            ],
        )?;
        if n == 0 {
            return Err(self.transition_error(id, AuditStatus::Failed)?);
        }
        warn!(id, error = message, "audit failed");
        Ok(())
    }

    /// Explain why a guarded status update touched no row.
    fn transition_error(&self, id: &str, to: AuditStatus) -> Result<StoreError, StoreError> {
        let current: Option<String> = self
            .conn
            .query_row("SELECT status FROM audits WHERE id=?", [id], |r| r.get(0))
            .optional()?;
        let Some(current) = current else { return Ok(StoreError::NotFound(id.to_string())) };
        let source = match current.parse::<AuditStatus>() {
            Ok(from) => match from.transition(to) {
                Err(e) => e,
                Ok(_) => aeo_core::CoreError::InvalidTransition { from: from.as_str(), to: to.as_str() },
            },
            Err(e) => e,
        };
        Ok(StoreError::Transition { id: id.to_string(), source })
    }
}
