use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Partial,
    Fail,
}

impl Verdict {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.999 {
            Verdict::Pass
        } else if score > 0.0 {
            Verdict::Partial
        } else {
            Verdict::Fail
        }
    }
}

/// Outcome of one rule against a page extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub id: String,
    pub module: String,
    pub verdict: Verdict,
    pub score: f64,
    pub weight: f64,
    pub message: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub overall_score: u8,
    pub module_scores: BTreeMap<String, u8>,
    pub rule_results: Vec<RuleResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaqSource {
    Page,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: Option<String>,
    pub source: FaqSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub query_fit_score: u8,
    pub answer_draft: String,
    pub suggested_faqs: Vec<Faq>,
}
