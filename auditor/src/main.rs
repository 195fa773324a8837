use anyhow::{anyhow, Context, Result};
use audit_store::Db;
use clap::{Parser, Subcommand};
use page_fetch::HttpFetcher;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::info;

mod config;
mod pipeline;
mod server;

use config::{load_config, Settings, SALT_ENV};
use pipeline::{AuditError, AuditRequest, AuditService};

const LOG_ENV: &str = "AUDITOR_LOG";

#[derive(Debug, Parser)]
#[command(name = "auditor", version, about = "Answer-engine readiness audits for web pages")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./auditor.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (overrides store.path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Debug logging; AUDITOR_LOG takes precedence when set
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Serve the JSON API
    #[cfg(feature = "serve")]
    Serve {
        /// Listen address, e.g. 127.0.0.1:8080
        #[arg(long)]
        bind: Option<String>,
        /// Number of request worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Audit one URL and print the stored result as JSON
    Audit {
        url: String,
        /// Question or search phrase to test the page against
        #[arg(long)]
        query: Option<String>,
        /// Allow localhost and private network targets
        #[arg(long)]
        allow_private: bool,
    },
    /// List recent audits, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Emit CSV instead of JSON lines
        #[arg(long)]
        csv: bool,
        /// Write to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Print one audit with its page extract
    Show { id: String },
    /// Export all audits to a Parquet file
    Export {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // stdout carries command output, so logs go to stderr
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loaded_cfg = load_config(cli.config.as_deref());
    let mut settings = Settings::resolve(loaded_cfg.as_ref(), std::env::var(SALT_ENV).ok());
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    match cli.command {
        Commands::Version => {
            println!("auditor {} (core {})", env!("CARGO_PKG_VERSION"), aeo_core::version());
        }
        #[cfg(feature = "serve")]
        Commands::Serve { bind, workers } => {
            if let Some(b) = bind {
                settings.bind = b;
            }
            if let Some(w) = workers {
                settings.workers = w.max(1);
            }
            run_server(&settings)?;
        }
        Commands::Audit { url, query, allow_private } => {
            let db = open_db(&settings)?;
            let fetcher = HttpFetcher::new(settings.fetch.clone())?;
            let service = AuditService::new(db, fetcher, allow_private || settings.allow_private_hosts);
            let rt = tokio::runtime::Runtime::new()?;
            let req = AuditRequest { url, query };
            let outcome = rt.block_on(service.submit(&req));
            let id = match outcome {
                Ok(audit) => audit.id,
                Err(AuditError::Failed { id, message }) => {
                    if let Some(detail) = service.detail(&id)? {
                        println!("{}", serde_json::to_string_pretty(&detail)?);
                    }
                    return Err(anyhow!("audit {id} failed: {message}"));
                }
                Err(e) => return Err(e.into()),
            };
            let detail = service.detail(&id)?.ok_or_else(|| anyhow!("audit {id} vanished"))?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Commands::List { limit, csv, out } => {
            let db = open_db(&settings)?;
            let rows = db.list_recent(limit)?;
            let sink: Box<dyn std::io::Write> = match &out {
                Some(path) => Box::new(std::fs::File::create(path)?),
                None => Box::new(std::io::stdout().lock()),
            };
            if csv {
                let mut wtr = csv::Writer::from_writer(sink);
                wtr.write_record(["id", "url", "query", "created_at", "overall_score", "status"])?;
                for r in rows {
                    wtr.write_record([
                        r.id,
                        r.url,
                        r.query.unwrap_or_default(),
                        r.created_at,
                        r.overall_score.map(|v| v.to_string()).unwrap_or_default(),
                        r.status.to_string(),
                    ])?;
                }
                wtr.flush()?;
            } else {
                let mut w = std::io::BufWriter::new(sink);
                for r in rows {
                    writeln!(w, "{}", serde_json::to_string(&r)?)?;
                }
                w.flush()?;
            }
        }
        Commands::Show { id } => {
            let db = open_db(&settings)?;
            let audit = db.get_audit(&id)?.ok_or_else(|| anyhow!("audit not found: {id}"))?;
            let extract = db.get_extract(&id)?;
            let detail = pipeline::AuditDetail { audit, extract };
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Commands::Export { out } => {
            let db = open_db(&settings)?;
            let n = db.export_audits_parquet(&out)?;
            info!(rows = n, path = %out.display(), "export finished");
            println!("{}", serde_json::json!({ "rows": n, "out": out }));
        }
    }
    Ok(())
}

fn open_db(settings: &Settings) -> Result<Db> {
    Db::open_or_create(&settings.db_path)
        .with_context(|| format!("opening audit store at {}", settings.db_path.display()))
}

#[cfg(feature = "serve")]
fn run_server(settings: &Settings) -> Result<()> {
    use abuse_guard::SubmissionLimiter;
    use std::sync::Arc;

    let rt = tokio::runtime::Runtime::new()?;
    let db = open_db(settings)?;
    let fetcher = HttpFetcher::new(settings.fetch.clone())?;
    let service = Arc::new(AuditService::new(db, fetcher, settings.allow_private_hosts));
    let limiter = SubmissionLimiter::new(settings.max_submissions, settings.window);
    let api = Arc::new(server::Api::new(service, limiter, settings.salt.clone(), rt.handle().clone()));
    info!(db = %settings.db_path.display(), "audit store ready");
    server::serve(api, &settings.bind, settings.workers)
}
