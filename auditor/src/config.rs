use page_fetch::FetchOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_DB: &str = "auditor.db";
pub const DEFAULT_SALT: &str = "aeo-auditor";
pub const DEFAULT_MAX_SUBMISSIONS: u32 = 10;
pub const DEFAULT_WINDOW_SECS: u64 = 3600;
pub const SALT_ENV: &str = "AUDITOR_IP_SALT";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct FetchConfig {
    pub timeout_ms: Option<u64>,
    pub redirects: Option<usize>,
    pub max_bytes: Option<usize>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct GuardConfig {
    pub salt: Option<String>,
    pub max_submissions: Option<u32>,
    pub window_secs: Option<u64>,
    pub allow_private_hosts: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub fetch: Option<FetchConfig>,
    pub store: Option<StoreConfig>,
    pub guard: Option<GuardConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("auditor.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config not readable, using defaults");
            return None;
        }
    };
    parse_config(&s).map_err(|e| warn!(path = %path.display(), error = %e, "config not valid YAML, using defaults")).ok()
}

pub fn parse_config(s: &str) -> Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(s)
}

/// Config file values merged over built-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub workers: usize,
    pub db_path: PathBuf,
    pub fetch: FetchOptions,
    pub salt: String,
    pub max_submissions: u32,
    pub window: Duration,
    pub allow_private_hosts: bool,
}

impl Settings {
    /// `env_salt` wins over the file's salt when set and non-blank.
    pub fn resolve(cfg: Option<&Config>, env_salt: Option<String>) -> Settings {
        let server = cfg.and_then(|c| c.server.clone()).unwrap_or_default();
        let fetch = cfg.and_then(|c| c.fetch.clone()).unwrap_or_default();
        let store = cfg.and_then(|c| c.store.clone()).unwrap_or_default();
        let guard = cfg.and_then(|c| c.guard.clone()).unwrap_or_default();

        let defaults = FetchOptions::default();
        let salt = env_salt.filter(|s| !s.trim().is_empty()).or(guard.salt).unwrap_or_else(|| {
            warn!("no ip salt configured, using the built-in default");
            DEFAULT_SALT.to_string()
        });

        Settings {
            bind: server.bind.unwrap_or_else(|| DEFAULT_BIND.to_string()),
            workers: server.workers.unwrap_or(DEFAULT_WORKERS).max(1),
            db_path: store.path.unwrap_or_else(|| PathBuf::from(DEFAULT_DB)),
            fetch: FetchOptions {
                timeout_ms: fetch.timeout_ms.unwrap_or(defaults.timeout_ms),
                redirects: fetch.redirects.unwrap_or(defaults.redirects),
                max_bytes: fetch.max_bytes.unwrap_or(defaults.max_bytes),
                user_agent: fetch.user_agent.unwrap_or(defaults.user_agent),
            },
            salt,
            max_submissions: guard.max_submissions.unwrap_or(DEFAULT_MAX_SUBMISSIONS),
            window: Duration::from_secs(guard.window_secs.unwrap_or(DEFAULT_WINDOW_SECS)),
            allow_private_hosts: guard.allow_private_hosts.unwrap_or(false),
        }
    }
}
