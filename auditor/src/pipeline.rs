//! One audit, end to end: validate, persist, fetch, extract, score, analyze.

use abuse_guard::{validate_query, validate_target, GuardError};
use aeo_core::{Audit, AuditSummary, PageExtract};
use audit_store::{AuditResults, Db, StoreError};
use page_extract::extract_content;
use page_fetch::PageFetcher;
use page_score::score_extraction;
use query_fit::analyze_query;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    /// Rejected before anything was stored.
    #[error(transparent)]
    Invalid(#[from] GuardError),

    /// The audit exists and is now `failed`.
    #[error("{message}")]
    Failed { id: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An audit with its stored page extract, as served by `GET /api/audits/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditDetail {
    #[serde(flatten)]
    pub audit: Audit,
    pub extract: Option<PageExtract>,
}

pub struct AuditService<F> {
    store: Mutex<Db>,
    fetcher: F,
    allow_private: bool,
}

impl<F: PageFetcher> AuditService<F> {
    pub fn new(store: Db, fetcher: F, allow_private: bool) -> Self {
        AuditService { store: Mutex::new(store), fetcher, allow_private }
    }

    fn with_store<T>(&self, f: impl FnOnce(&Db) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let db = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }

    /// Input checks only; nothing is stored.
    pub fn validate(&self, req: &AuditRequest) -> Result<(Url, Option<String>), GuardError> {
        let url = validate_target(&req.url, self.allow_private)?;
        let query = validate_query(req.query.as_deref())?;
        Ok((url, query))
    }

    /// Runs the audit to a terminal state. Pipeline failures are recorded on
    /// the audit and surface as [`AuditError::Failed`].
    pub async fn submit(&self, req: &AuditRequest) -> Result<Audit, AuditError> {
        let (url, query) = self.validate(req)?;
        let audit = self.with_store(|db| db.create_audit(url.as_str(), query.as_deref()))?;
        let id = audit.id;

        if let Err(message) = self.run(&id, &url, query.as_deref()).await {
            if let Err(e) = self.with_store(|db| db.fail_audit(&id, &message)) {
                error!(%id, error = %e, "could not record audit failure");
            }
            return Err(AuditError::Failed { id, message });
        }

        let done = self.with_store(|db| db.get_audit(&id))?;
        done.ok_or(AuditError::Store(StoreError::NotFound(id)))
    }

    async fn run(&self, id: &str, url: &Url, query: Option<&str>) -> Result<(), String> {
        self.with_store(|db| db.mark_processing(id)).map_err(|e| e.to_string())?;

        let page = self.fetcher.fetch(url).await.map_err(|e| e.to_string())?;
        let mut extract = extract_content(page.status, &page.headers, &page.body, &page.final_url);
        extract.truncated = page.truncated;

        let score = score_extraction(&extract);
        let analysis = analyze_query(query, &extract);
        info!(
            id,
            url = %url,
            status = page.status,
            elapsed_ms = page.elapsed_ms,
            overall_score = score.overall_score,
            "audit scored"
        );

        let results = AuditResults { score, query: analysis };
        self.with_store(|db| db.complete_audit(id, &results, &extract)).map_err(|e| e.to_string())
    }

    pub fn detail(&self, id: &str) -> Result<Option<AuditDetail>, StoreError> {
        self.with_store(|db| {
            let Some(audit) = db.get_audit(id)? else { return Ok(None) };
            let extract = db.get_extract(id)?;
            Ok(Some(AuditDetail { audit, extract }))
        })
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<AuditSummary>, StoreError> {
        self.with_store(|db| db.list_recent(limit))
    }
}
