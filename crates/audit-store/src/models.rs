use aeo_core::{QueryAnalysis, ScoreReport};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Everything a finished audit records besides its page extract.
#[derive(Debug, Clone)]
pub struct AuditResults {
    pub score: ScoreReport,
    pub query: Option<QueryAnalysis>,
}

pub(crate) fn now_ms() -> i64 {
    to_ms(OffsetDateTime::now_utc())
}

/// RFC 3339 text and epoch millis of the same instant.
pub(crate) fn now_stamp() -> (String, i64) {
    let now = OffsetDateTime::now_utc();
    (now.format(&Rfc3339).unwrap_or_else(|_| String::new()), to_ms(now))
}

fn to_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}
