use crate::{CoreError, Faq, RuleResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a single audit run.
///
/// `Pending -> Processing -> Completed | Failed`. `Pending -> Failed` is
/// allowed for audits whose processing mark could not be written. Both end
/// states are terminal; an audit is never reprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AuditStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Processing => "processing",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, AuditStatus::Completed | AuditStatus::Failed)
    }

    pub fn can_transition_to(self, next: AuditStatus) -> bool {
        matches!(
            (self, next),
            (AuditStatus::Pending, AuditStatus::Processing)
                | (AuditStatus::Processing, AuditStatus::Completed)
                | (AuditStatus::Processing, AuditStatus::Failed)
                | (AuditStatus::Pending, AuditStatus::Failed)
        )
    }

    /// Checked transition; returns the new status or the rejected pair.
    pub fn transition(self, next: AuditStatus) -> Result<AuditStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition { from: self.as_str(), to: next.as_str() })
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "processing" => Ok(AuditStatus::Processing),
            "completed" => Ok(AuditStatus::Completed),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// A scoring run against one URL, as persisted and served over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: String,
    pub url: String,
    pub query: Option<String>,
    pub status: AuditStatus,
    pub overall_score: Option<u8>,
    pub module_scores: Option<BTreeMap<String, u8>>,
    pub rule_results: Option<Vec<RuleResult>>,
    pub query_fit_score: Option<u8>,
    pub answer_draft: Option<String>,
    pub suggested_faqs: Option<Vec<Faq>>,
    pub error: Option<String>,
    pub created_at: String,
}

/// Row shape of the audit listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub id: String,
    pub url: String,
    pub query: Option<String>,
    pub created_at: String,
    pub overall_score: Option<u8>,
    pub status: AuditStatus,
}

impl From<&Audit> for AuditSummary {
    fn from(a: &Audit) -> Self {
        AuditSummary {
            id: a.id.clone(),
            url: a.url.clone(),
            query: a.query.clone(),
            created_at: a.created_at.clone(),
            overall_score: a.overall_score,
            status: a.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_allows_only_forward_steps() {
        assert!(AuditStatus::Pending.can_transition_to(AuditStatus::Processing));
        assert!(AuditStatus::Processing.can_transition_to(AuditStatus::Completed));
        assert!(AuditStatus::Processing.can_transition_to(AuditStatus::Failed));
        assert!(AuditStatus::Pending.can_transition_to(AuditStatus::Failed));
        assert!(!AuditStatus::Pending.can_transition_to(AuditStatus::Completed));
        assert!(!AuditStatus::Completed.can_transition_to(AuditStatus::Processing));
        assert!(!AuditStatus::Failed.can_transition_to(AuditStatus::Processing));
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let err = AuditStatus::Completed.transition(AuditStatus::Failed).unwrap_err();
        assert_eq!(err, CoreError::InvalidTransition { from: "completed", to: "failed" });
        assert!(AuditStatus::Failed.is_terminal());
        assert!(!AuditStatus::Processing.is_terminal());
    }

    #[test]
    fn status_parses_its_own_text() {
        for s in [AuditStatus::Pending, AuditStatus::Processing, AuditStatus::Completed, AuditStatus::Failed] {
            assert_eq!(s.as_str().parse::<AuditStatus>().unwrap(), s);
        }
        assert!("done".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn missing_query_fields_serialize_as_null() {
        let a = Audit {
            id: "a1".into(),
            url: "https://example.com".into(),
            query: None,
            status: AuditStatus::Completed,
            overall_score: Some(71),
            module_scores: None,
            rule_results: None,
            query_fit_score: None,
            answer_draft: None,
            suggested_faqs: None,
            error: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let v = serde_json::to_value(&a).unwrap();
        assert!(v["queryFitScore"].is_null());
        assert_eq!(v["overallScore"], 71);
        assert_eq!(v["status"], "completed");
    }
}
