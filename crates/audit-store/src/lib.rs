//! SQLite persistence for audits and their page extracts, with a Parquet
//! export of the audit table.

mod arrow_schemas;
mod export_parquet;
mod insert;
mod models;
mod open;
mod query;
mod schema;

pub use models::AuditResults;
pub use open::Db;

use aeo_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("audit not found: {0}")]
    NotFound(String),

    #[error("audit {id}: {source}")]
    Transition {
        id: String,
        #[source]
        source: CoreError,
    },

    #[error("corrupt row for audit {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}
