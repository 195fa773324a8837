//! Single-page HTTP fetch with a timeout, a redirect cap and a body size cap.

use reqwest::{header::HeaderMap, redirect::Policy, Client};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_REDIRECTS: usize = 5;
pub const DEFAULT_MAX_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout_ms: u64,
    pub redirects: usize,
    pub max_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            redirects: DEFAULT_REDIRECTS,
            max_bytes: DEFAULT_MAX_BYTES,
            user_agent: format!("aeo-auditor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    /// Lowercased header names; repeated headers joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Set when the body was cut at `max_bytes`.
    pub truncated: bool,
    pub elapsed_ms: u64,
}

impl FetchedPage {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            None => sniff_html(&self.body),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Source of fetched pages. The audit pipeline only sees this trait.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}

pub struct HttpFetcher {
    client: Client,
    opts: FetchOptions,
}

impl HttpFetcher {
    pub fn new(opts: FetchOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .redirect(Policy::limited(opts.redirects))
            .timeout(Duration::from_millis(opts.timeout_ms))
            .user_agent(opts.user_agent.clone())
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(HttpFetcher { client, opts })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.opts
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.opts.timeout_ms)
        } else if e.is_redirect() {
            FetchError::TooManyRedirects(self.opts.redirects)
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();
        let mut resp = self.client.get(url.clone()).send().await.map_err(|e| self.classify(e))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let headers = flatten_headers(resp.headers());

        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = resp.chunk().await.map_err(|e| self.classify(e))? {
            let room = self.opts.max_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        if truncated {
            warn!(url = %url, max_bytes = self.opts.max_bytes, "response body truncated");
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(url = %url, final_url = %final_url, status, bytes = body.len(), elapsed_ms, "fetched page");
        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            headers,
            body,
            truncated,
            elapsed_ms,
        })
    }
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(v) = value.to_str() else { continue };
        out.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                cur.push_str(", ");
                cur.push_str(v);
            })
            .or_insert_with(|| v.to_string());
    }
    out
}

fn sniff_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(1024)];
    let s = String::from_utf8_lossy(head).to_ascii_lowercase();
    s.contains("<html") || s.contains("<!doctype html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve(response: Vec<u8>, stall: bool) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let resp = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    if stall {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    let _ = sock.write_all(&resp).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        addr
    }

    fn http_response(status: &str, extra_headers: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn opts(timeout_ms: u64, redirects: usize, max_bytes: usize) -> FetchOptions {
        FetchOptions { timeout_ms, redirects, max_bytes, ..FetchOptions::default() }
    }

    #[tokio::test]
    async fn reads_status_headers_and_body() {
        let body = b"<html><head><title>Hi</title></head></html>";
        let addr = serve(
            http_response("200 OK", "Content-Type: text/html; charset=utf-8\r\nX-Robots-Tag: noarchive\r\n", body),
            false,
        )
        .await;
        let fetcher = HttpFetcher::new(opts(2_000, 3, 1024)).unwrap();
        let url = Url::parse(&format!("http://{addr}/page")).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.is_html());
        assert!(!page.truncated);
        assert_eq!(page.body, body.to_vec());
        assert_eq!(page.headers.get("x-robots-tag").map(String::as_str), Some("noarchive"));
    }

    #[tokio::test]
    async fn non_success_status_is_not_an_error() {
        let addr = serve(http_response("404 Not Found", "Content-Type: text/html\r\n", b"gone"), false).await;
        let fetcher = HttpFetcher::new(opts(2_000, 3, 1024)).unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.status, 404);
    }

    #[tokio::test]
    async fn body_is_capped_at_max_bytes() {
        let body = vec![b'a'; 10_000];
        let addr = serve(http_response("200 OK", "Content-Type: text/plain\r\n", &body), false).await;
        let fetcher = HttpFetcher::new(opts(2_000, 3, 1024)).unwrap();
        let url = Url::parse(&format!("http://{addr}/big")).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();
        assert!(page.truncated);
        assert_eq!(page.body.len(), 1024);
    }

    #[tokio::test]
    async fn redirect_loop_hits_the_cap() {
        let addr = serve(http_response("302 Found", "Location: /again\r\n", b""), false).await;
        let fetcher = HttpFetcher::new(opts(2_000, 2, 1024)).unwrap();
        let url = Url::parse(&format!("http://{addr}/start")).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects(2)), "got {err:?}");
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let addr = serve(http_response("200 OK", "", b"late"), true).await;
        let fetcher = HttpFetcher::new(opts(200, 3, 1024)).unwrap();
        let url = Url::parse(&format!("http://{addr}/slow")).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(200)), "got {err:?}");
    }

    #[test]
    fn sniffs_html_without_content_type() {
        assert!(sniff_html(b"<!DOCTYPE html><html></html>"));
        assert!(!sniff_html(b"{\"json\": true}"));
    }
}
