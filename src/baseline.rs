// ===============================
// src/baseline.rs
// ===============================
//
// Baseline price store (MySQL):
// - lookup      : exact match job_id AND company_id (yang ada saja), LIMIT 1
// - price_label : baris tabel label per job_id
//
// Koneksi dibuka per lookup dan selalu ditutup, termasuk di jalur error.
//
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Connection, Row};
use tracing::warn;

use crate::config::{Args, MysqlCfg};
use crate::domain::{BaselineRow, PriceLabel};
use crate::error::{QuoteError, StoreError};
use crate::metrics::BASELINE_LOOKUPS;

#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Dipanggil hanya jika minimal satu id ada.
    async fn find(
        &self,
        job_id: Option<i64>,
        company_id: Option<i64>,
    ) -> Result<Option<BaselineRow>, StoreError>;

    async fn price_label(&self, job_id: i64) -> Result<Option<PriceLabel>, StoreError>;

    fn table(&self) -> &str;
    fn price_col(&self) -> &str;
}

/// `None` kalau kedua id kosong (tidak ada query)
pub fn baseline_sql(
    table: &str,
    price_col: &str,
    job_id: Option<i64>,
    company_id: Option<i64>,
) -> Option<String> {
    let mut clauses = Vec::with_capacity(2);
    if job_id.is_some() {
        clauses.push("job_id = ?");
    }
    if company_id.is_some() {
        clauses.push("company_id = ?");
    }
    if clauses.is_empty() {
        return None;
    }
    Some(format!(
        "SELECT CAST(job_id AS SIGNED) AS job_id, CAST(company_id AS SIGNED) AS company_id, \
         CAST({price_col} AS DOUBLE) AS price FROM {table} WHERE {} LIMIT 1",
        clauses.join(" AND ")
    ))
}

pub fn label_sql(table: &str) -> String {
    format!(
        "SELECT CAST(job_id AS SIGNED) AS job_id, CAST(price_label AS DOUBLE) AS price_label, \
         CAST(expected_value AS DOUBLE) AS expected_value, \
         CAST(expected_high_quality_applies AS DOUBLE) AS expected_high_quality_applies \
         FROM {table} WHERE job_id = ? LIMIT 1"
    )
}

pub struct MysqlBaselineStore {
    opts: MySqlConnectOptions,
    table: String,
    price_col: String,
    label_table: String,
}

impl MysqlBaselineStore {
    pub fn new(args: &Args) -> Self {
        Self {
            opts: connect_options(&args.mysql),
            table: args.pricing_table.clone(),
            price_col: args.price_col.clone(),
            label_table: args.label_table.clone(),
        }
    }
}

fn connect_options(cfg: &MysqlCfg) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.user)
        .password(&cfg.password)
        .database(&cfg.database)
        .charset(&cfg.charset)
}

fn baseline_from_row(row: &MySqlRow) -> Result<BaselineRow, StoreError> {
    Ok(BaselineRow {
        job_id: row.try_get("job_id")?,
        company_id: row.try_get("company_id")?,
        price: row.try_get("price")?,
    })
}

fn label_from_row(row: &MySqlRow) -> Result<Option<PriceLabel>, StoreError> {
    let job_id: Option<i64> = row.try_get("job_id")?;
    let price_label: Option<f64> = row.try_get("price_label")?;
    // Baris tanpa price_label diperlakukan seperti tidak ada
    Ok(match (job_id, price_label) {
        (Some(job_id), Some(price_label)) => Some(PriceLabel {
            job_id,
            price_label,
            expected_value: row.try_get("expected_value")?,
            expected_high_quality_applies: row.try_get("expected_high_quality_applies")?,
            source: "mysql",
        }),
        _ => None,
    })
}

#[async_trait]
impl BaselineStore for MysqlBaselineStore {
    async fn find(
        &self,
        job_id: Option<i64>,
        company_id: Option<i64>,
    ) -> Result<Option<BaselineRow>, StoreError> {
        let Some(sql) = baseline_sql(&self.table, &self.price_col, job_id, company_id) else {
            return Ok(None);
        };

        let mut conn = MySqlConnection::connect_with(&self.opts).await?;
        let mut query = sqlx::query(&sql);
        if let Some(id) = job_id {
            query = query.bind(id);
        }
        if let Some(id) = company_id {
            query = query.bind(id);
        }
        let fetched = query.fetch_optional(&mut conn).await;
        if let Err(e) = conn.close().await {
            warn!(?e, "mysql close failed");
        }

        fetched?.map(|r| baseline_from_row(&r)).transpose()
    }

    async fn price_label(&self, job_id: i64) -> Result<Option<PriceLabel>, StoreError> {
        let sql = label_sql(&self.label_table);
        let mut conn = MySqlConnection::connect_with(&self.opts).await?;
        let fetched = sqlx::query(&sql).bind(job_id).fetch_optional(&mut conn).await;
        if let Err(e) = conn.close().await {
            warn!(?e, "mysql close failed");
        }

        match fetched? {
            Some(row) => label_from_row(&row),
            None => Ok(None),
        }
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn price_col(&self) -> &str {
        &self.price_col
    }
}

/// Hasil BaselineLookup: row atau tidak, plus alasan gagal untuk diagnosa
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineLookup {
    pub row: Option<BaselineRow>,
    pub error: Option<String>,
}

impl BaselineLookup {
    /// Harga baseline yang otoritatif (NULL -> tidak ada)
    pub fn price(&self) -> Option<f64> {
        self.row.as_ref().and_then(|r| r.price)
    }
}

/// Store tidak tersedia -> diserap jadi `error`; kolom hilang -> hard error.
pub async fn lookup(
    store: &dyn BaselineStore,
    job_id: Option<i64>,
    company_id: Option<i64>,
) -> Result<BaselineLookup, QuoteError> {
    if job_id.is_none() && company_id.is_none() {
        return Ok(BaselineLookup::default());
    }

    match store.find(job_id, company_id).await {
        Ok(row) => {
            let outcome = if row.as_ref().and_then(|r| r.price).is_some() { "hit" } else { "miss" };
            BASELINE_LOOKUPS.with_label_values(&[outcome]).inc();
            Ok(BaselineLookup { row, error: None })
        }
        Err(StoreError::Unavailable(msg)) => {
            BASELINE_LOOKUPS.with_label_values(&["error"]).inc();
            warn!(?job_id, ?company_id, error = %msg, "baseline lookup failed");
            Ok(BaselineLookup { row: None, error: Some(msg) })
        }
        Err(StoreError::MissingColumn(col)) => {
            BASELINE_LOOKUPS.with_label_values(&["contract"]).inc();
            Err(QuoteError::Contract(format!(
                "baseline table `{}` has no expected column: {col}",
                store.table()
            )))
        }
    }
}
