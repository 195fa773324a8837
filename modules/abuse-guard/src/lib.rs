//! Request guards for audit submissions: input validation, target host
//! checks, salted client hashing and a per-client submission limiter.

mod limiter;

pub use limiter::{Decision, SubmissionLimiter};

use ipnet::IpNet;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

pub const MAX_URL_LEN: usize = 2048;
pub const MAX_QUERY_LEN: usize = 500;

const BLOCKED_NETS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "::/128",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

const BLOCKED_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal"];

/// Messages double as the 400 response body, so they are user-facing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("url is required")]
    MissingUrl,

    #[error("url must be at most {MAX_URL_LEN} characters")]
    UrlTooLong,

    #[error("url is not valid: {0}")]
    InvalidUrl(String),

    #[error("url must use http or https")]
    UnsupportedScheme,

    #[error("url must include a host")]
    MissingHost,

    #[error("host is not allowed: {0}")]
    BlockedHost(String),

    #[error("query must be at most {MAX_QUERY_LEN} characters")]
    QueryTooLong,
}

/// SHA-256 of `salt:ip`, as 64 lowercase hex characters.
pub fn hash_ip(ip: &str, salt: &str) -> String {
    let mut sha = Sha256::new();
    sha.update(salt.as_bytes());
    sha.update(b":");
    sha.update(ip.trim().as_bytes());
    hex::encode(sha.finalize())
}

/// Normalized host of a URL or bare hostname: lowercase, no trailing dot,
/// no leading `www.`. Applying it to its own output is a no-op.
pub fn extract_domain(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let with_scheme = if s.contains("://") { s.to_string() } else { format!("http://{s}") };
    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);
    (!host.is_empty()).then(|| host.to_string())
}

/// Parse and vet a submitted audit target.
pub fn validate_target(raw: &str, allow_private: bool) -> Result<Url, GuardError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GuardError::MissingUrl);
    }
    if raw.len() > MAX_URL_LEN {
        return Err(GuardError::UrlTooLong);
    }
    let url = Url::parse(raw).map_err(|e| GuardError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GuardError::UnsupportedScheme);
    }
    let host = url.host().ok_or(GuardError::MissingHost)?;
    if !allow_private && host_is_blocked(&host) {
        return Err(GuardError::BlockedHost(host.to_string()));
    }
    Ok(url)
}

/// Trimmed query, `None` when blank.
pub fn validate_query(raw: Option<&str>) -> Result<Option<String>, GuardError> {
    let Some(q) = raw.map(str::trim).filter(|q| !q.is_empty()) else { return Ok(None) };
    if q.chars().count() > MAX_QUERY_LEN {
        return Err(GuardError::QueryTooLong);
    }
    Ok(Some(q.to_string()))
}

fn host_is_blocked(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(d) => {
            let d = d.to_ascii_lowercase();
            d == "localhost" || BLOCKED_SUFFIXES.iter().any(|s| d.ends_with(s))
        }
        Host::Ipv4(v4) => ip_is_blocked(IpAddr::V4(*v4)),
        Host::Ipv6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => ip_is_blocked(IpAddr::V4(v4)),
            None => ip_is_blocked(IpAddr::V6(*v6)),
        },
    }
}

fn ip_is_blocked(ip: IpAddr) -> bool {
    BLOCKED_NETS.iter().filter_map(|n| n.parse::<IpNet>().ok()).any(|net| net.contains(&ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ip_is_stable_hex() {
        let a = hash_ip("203.0.113.9", "pepper");
        let b = hash_ip("203.0.113.9", "pepper");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_ip_separates_ips_and_salts() {
        assert_ne!(hash_ip("203.0.113.9", "pepper"), hash_ip("203.0.113.10", "pepper"));
        assert_ne!(hash_ip("203.0.113.9", "pepper"), hash_ip("203.0.113.9", "salt"));
    }

    #[test]
    fn extract_domain_lowercases_and_is_idempotent() {
        assert_eq!(extract_domain("WWW.Example.COM").as_deref(), Some("example.com"));
        assert_eq!(extract_domain("https://Blog.Example.com/post?x=1").as_deref(), Some("blog.example.com"));
        for host in ["example.com", "blog.example.co.uk", "a-b.io"] {
            let once = extract_domain(host).unwrap();
            assert_eq!(once, host);
            assert_eq!(extract_domain(&once).unwrap(), once);
        }
        assert_eq!(extract_domain("   "), None);
    }

    #[test]
    fn validate_target_accepts_public_http() {
        let u = validate_target("  https://example.com/page  ", false).unwrap();
        assert_eq!(u.as_str(), "https://example.com/page");
    }

    #[test]
    fn validate_target_rejects_bad_input() {
        assert_eq!(validate_target("", false), Err(GuardError::MissingUrl));
        assert_eq!(validate_target("ftp://example.com", false), Err(GuardError::UnsupportedScheme));
        assert!(matches!(validate_target("not a url", false), Err(GuardError::InvalidUrl(_))));
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert_eq!(validate_target(&long, false), Err(GuardError::UrlTooLong));
    }

    #[test]
    fn validate_target_blocks_private_hosts_unless_allowed() {
        for raw in [
            "http://localhost:8080/",
            "http://127.0.0.1/",
            "http://10.1.2.3/",
            "http://192.168.0.10/",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://printer.local/",
        ] {
            assert!(matches!(validate_target(raw, false), Err(GuardError::BlockedHost(_))), "{raw}");
        }
        assert!(validate_target("http://127.0.0.1:3000/", true).is_ok());
        assert!(validate_target("http://93.184.216.34/", false).is_ok());
    }

    #[test]
    fn validate_query_trims_and_bounds() {
        assert_eq!(validate_query(None), Ok(None));
        assert_eq!(validate_query(Some("  ")), Ok(None));
        assert_eq!(validate_query(Some(" what is aeo ")), Ok(Some("what is aeo".into())));
        let long = "q".repeat(MAX_QUERY_LEN + 1);
        assert_eq!(validate_query(Some(&long)), Err(GuardError::QueryTooLong));
    }
}
