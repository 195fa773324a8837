//! JSON HTTP API over the audit service.
//!
//! Routing is a pure function of (method, url, body, client ip) so it can be
//! exercised without sockets; `serve` only moves bytes between `tiny_http`
//! and [`Api::route`].

use crate::pipeline::{AuditError, AuditRequest, AuditService};
use abuse_guard::{hash_ip, Decision, SubmissionLimiter};
use page_fetch::PageFetcher;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, warn};

pub const LIST_LIMIT: usize = 50;
pub const MAX_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub retry_after: Option<u64>,
}

impl ApiResponse {
    fn new(status: u16, body: Value) -> Self {
        ApiResponse { status, body, retry_after: None }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": message.into() }))
    }

    fn method_not_allowed() -> Self {
        Self::error(405, "method not allowed")
    }

    fn internal() -> Self {
        Self::error(500, "internal error")
    }
}

pub struct Api<F> {
    service: Arc<AuditService<F>>,
    limiter: SubmissionLimiter,
    salt: String,
    rt: Handle,
}

impl<F: PageFetcher> Api<F> {
    pub fn new(service: Arc<AuditService<F>>, limiter: SubmissionLimiter, salt: String, rt: Handle) -> Self {
        Api { service, limiter, salt, rt }
    }

    pub fn route(&self, method: &str, url: &str, body: &[u8], client_ip: Option<IpAddr>) -> ApiResponse {
        let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };

        if path == "/healthz" {
            return match method {
                "GET" | "HEAD" => ApiResponse::new(200, json!({ "status": "ok", "version": aeo_core::version() })),
                _ => ApiResponse::method_not_allowed(),
            };
        }
        if path == "/api/audits" {
            return match method {
                "GET" => self.list(),
                "POST" => self.create(body, client_ip),
                _ => ApiResponse::method_not_allowed(),
            };
        }
        if let Some(id) = path.strip_prefix("/api/audits/").filter(|id| !id.contains('/')) {
            return match method {
                "GET" => self.show(id),
                _ => ApiResponse::method_not_allowed(),
            };
        }
        ApiResponse::error(404, "not found")
    }

    fn list(&self) -> ApiResponse {
        match self.service.recent(LIST_LIMIT) {
            Ok(rows) => ApiResponse::new(200, json!(rows)),
            Err(e) => {
                error!(error = %e, "listing audits failed");
                ApiResponse::internal()
            }
        }
    }

    fn show(&self, id: &str) -> ApiResponse {
        match self.service.detail(id) {
            Ok(Some(detail)) => ApiResponse::new(200, json!(detail)),
            Ok(None) => ApiResponse::error(404, "audit not found"),
            Err(e) => {
                error!(id, error = %e, "loading audit failed");
                ApiResponse::internal()
            }
        }
    }

    fn create(&self, body: &[u8], client_ip: Option<IpAddr>) -> ApiResponse {
        if body.len() > MAX_BODY {
            return ApiResponse::error(413, "request body too large");
        }
        let req: AuditRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => return ApiResponse::error(400, format!("invalid JSON body: {e}")),
        };
        if let Err(e) = self.service.validate(&req) {
            return ApiResponse::error(400, e.to_string());
        }

        // Only well-formed submissions count against the client's window.
        let client = client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
        if let Decision::Limited { retry_after } = self.limiter.check(&hash_ip(&client, &self.salt)) {
            let secs = retry_after.as_secs().max(1);
            let mut resp = ApiResponse::error(429, "too many submissions, try again later");
            resp.retry_after = Some(secs);
            return resp;
        }

        match self.rt.block_on(self.service.submit(&req)) {
            Ok(audit) => ApiResponse::new(
                200,
                json!({
                    "id": audit.id,
                    "url": audit.url,
                    "status": audit.status,
                    "overallScore": audit.overall_score,
                }),
            ),
            Err(AuditError::Invalid(e)) => ApiResponse::error(400, e.to_string()),
            Err(AuditError::Failed { id, message }) => {
                warn!(%id, error = %message, "audit failed");
                ApiResponse::new(500, json!({ "error": message, "id": id }))
            }
            Err(AuditError::Store(e)) => {
                error!(error = %e, "audit store error");
                ApiResponse::internal()
            }
        }
    }
}

#[cfg(feature = "serve")]
pub use http::serve;

#[cfg(feature = "serve")]
mod http {
    use super::{Api, ApiResponse, MAX_BODY};
    use anyhow::{anyhow, Result};
    use page_fetch::PageFetcher;
    use std::io::{Cursor, Read};
    use std::sync::Arc;
    use std::time::Instant;
    use tiny_http::{Header, Request, Response, Server};
    use tracing::{error, info, warn};

    /// Blocks until the listener fails; each worker handles one request at a time.
    pub fn serve<F: PageFetcher + 'static>(api: Arc<Api<F>>, bind: &str, workers: usize) -> Result<()> {
        let server = Arc::new(Server::http(bind).map_err(|e| anyhow!("failed to bind {bind}: {e}"))?);
        info!(bind, workers, "listening");

        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers.max(1) {
            let server = server.clone();
            let api = api.clone();
            let handle = std::thread::Builder::new()
                .name(format!("http-worker-{n}"))
                .spawn(move || worker(&server, &api))?;
            handles.push(handle);
        }
        for h in handles {
            if h.join().is_err() {
                error!("http worker panicked");
            }
        }
        Ok(())
    }

    fn worker<F: PageFetcher>(server: &Server, api: &Api<F>) {
        loop {
            let rq = match server.recv() {
                Ok(rq) => rq,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break;
                }
            };
            handle(api, rq);
        }
    }

    fn handle<F: PageFetcher>(api: &Api<F>, mut rq: Request) {
        let started = Instant::now();
        let mut body = Vec::new();
        if let Err(e) = rq.as_reader().take(MAX_BODY as u64 + 1).read_to_end(&mut body) {
            warn!(error = %e, "failed reading request body");
        }
        let method = rq.method().as_str().to_string();
        let url = rq.url().to_string();
        let client_ip = rq.remote_addr().map(|a| a.ip());

        let resp = api.route(&method, &url, &body, client_ip);
        info!(
            method = %method,
            path = %url,
            status = resp.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        if let Err(e) = rq.respond(to_http(resp)) {
            warn!(error = %e, "failed writing response");
        }
    }

    fn to_http(resp: ApiResponse) -> Response<Cursor<Vec<u8>>> {
        let mut out = Response::from_string(resp.body.to_string()).with_status_code(resp.status);
        if let Ok(h) = Header::from_bytes("Content-Type", "application/json") {
            out.add_header(h);
        }
        if let Some(secs) = resp.retry_after {
            if let Ok(h) = Header::from_bytes("Retry-After", secs.to_string()) {
                out.add_header(h);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{ok_page, FakeFetcher};
    use audit_store::Db;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    fn api(fetcher: FakeFetcher, max: u32) -> (Runtime, Api<FakeFetcher>) {
        let rt = Runtime::new().unwrap();
        let svc = Arc::new(AuditService::new(Db::open_in_memory().unwrap(), fetcher, false));
        let api = Api::new(svc, SubmissionLimiter::new(max, Duration::from_secs(60)), "salt".into(), rt.handle().clone());
        (rt, api)
    }

    fn ip() -> Option<IpAddr> {
        Some("203.0.113.7".parse().unwrap())
    }

    #[test]
    fn healthz_reports_version() {
        let (_rt, api) = api(ok_page(), 0);
        let r = api.route("GET", "/healthz", b"", None);
        assert_eq!(r.status, 200);
        assert_eq!(r.body["status"], "ok");
        assert_eq!(api.route("POST", "/healthz", b"", None).status, 405);
    }

    #[test]
    fn unknown_paths_and_methods() {
        let (_rt, api) = api(ok_page(), 0);
        assert_eq!(api.route("GET", "/nope", b"", None).status, 404);
        assert_eq!(api.route("GET", "/api/audits/a/b", b"", None).status, 404);
        assert_eq!(api.route("DELETE", "/api/audits", b"", None).status, 405);
        assert_eq!(api.route("PUT", "/api/audits/abc", b"", None).status, 405);
    }

    #[test]
    fn unknown_audit_is_404() {
        let (_rt, api) = api(ok_page(), 0);
        let r = api.route("GET", "/api/audits/0190d2a0-0000-7000-8000-000000000000", b"", None);
        assert_eq!(r.status, 404);
        assert!(r.body["error"].is_string());
    }

    #[test]
    fn bad_bodies_are_400() {
        let (_rt, api) = api(ok_page(), 0);
        let r = api.route("POST", "/api/audits", b"not json", ip());
        assert_eq!(r.status, 400);
        let r = api.route("POST", "/api/audits", br#"{"query":"x"}"#, ip());
        assert_eq!(r.status, 400);
        assert_eq!(r.body["error"], "url is required");
        let r = api.route("POST", "/api/audits", br#"{"url":"javascript:alert(1)"}"#, ip());
        assert_eq!(r.status, 400);
        assert_eq!(api.route("GET", "/api/audits", b"", None).body, json!([]));
    }

    #[test]
    fn create_then_fetch_and_list() {
        let (_rt, api) = api(ok_page(), 0);
        let r = api.route("POST", "/api/audits", br#"{"url":"https://example.com/aeo"}"#, ip());
        assert_eq!(r.status, 200, "{}", r.body);
        assert_eq!(r.body["status"], "completed");
        assert!(r.body["overallScore"].is_u64());
        let id = r.body["id"].as_str().unwrap().to_string();

        let got = api.route("GET", &format!("/api/audits/{id}?x=1"), b"", None);
        assert_eq!(got.status, 200);
        assert_eq!(got.body["id"], id.as_str());
        assert!(got.body["queryFitScore"].is_null());
        assert_eq!(got.body["extract"]["statusCode"], 200);

        let list = api.route("GET", "/api/audits/", b"", None);
        assert_eq!(list.body.as_array().unwrap().len(), 1);
        assert_eq!(list.body[0]["createdAt"], got.body["createdAt"]);
    }

    #[test]
    fn failed_pipeline_is_500_with_id() {
        let (_rt, api) = api(FakeFetcher::Timeout, 0);
        let r = api.route("POST", "/api/audits", br#"{"url":"https://example.com/slow"}"#, ip());
        assert_eq!(r.status, 500);
        let id = r.body["id"].as_str().unwrap();
        let stored = api.route("GET", &format!("/api/audits/{id}"), b"", None);
        assert_eq!(stored.body["status"], "failed");
        assert!(!stored.body["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn limiter_trips_with_retry_after() {
        let (_rt, api) = api(ok_page(), 1);
        let body = br#"{"url":"https://example.com/aeo"}"#;
        assert_eq!(api.route("POST", "/api/audits", body, ip()).status, 200);
        let r = api.route("POST", "/api/audits", body, ip());
        assert_eq!(r.status, 429);
        assert!(r.retry_after.unwrap() >= 1);
        let other = Some("198.51.100.1".parse().unwrap());
        assert_eq!(api.route("POST", "/api/audits", body, other).status, 200);
    }

    #[test]
    fn rejected_bodies_do_not_spend_the_window() {
        let (_rt, api) = api(ok_page(), 1);
        let rejected: [&[u8]; 3] = [b"not json", br#"{"url":"ftp://example.com"}"#, br#"{"query":"x"}"#];
        for bad in rejected {
            assert_eq!(api.route("POST", "/api/audits", bad, ip()).status, 400);
        }
        let body = br#"{"url":"https://example.com/aeo"}"#;
        assert_eq!(api.route("POST", "/api/audits", body, ip()).status, 200);
        assert_eq!(api.route("POST", "/api/audits", body, ip()).status, 429);
    }
}
