// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// Kegagalan feature store ClickHouse (selalu recoverable -> cascade lanjut)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("http status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("empty result for job_id={0}")]
    Empty(i64),
}

/// Kegagalan baca snapshot CSV lokal
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    NotFound(String),
    #[error("snapshot read failed: {0}")]
    Read(String),
    #[error("no row for job_id={0}")]
    NoRow(i64),
}

/// Kegagalan baseline store (MySQL)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Schema tidak cocok: kolom yang diharapkan tidak ada
    #[error("missing column: {0}")]
    MissingColumn(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::ColumnNotFound(col) => StoreError::MissingColumn(col.clone()),
            // 42S22 = unknown column
            sqlx::Error::Database(db) if db.code().as_deref() == Some("42S22") => {
                StoreError::MissingColumn(db.message().to_string())
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("contract violation: {0}")]
    Contract(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a plain SQL identifier")]
    BadIdentifier { key: &'static str, value: String },
}
