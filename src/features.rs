// ===============================
// src/features.rs
// ===============================
//
// Feature source cascade:
// - ClickHouseSource : HTTP interface, baris terbaru per job_id (FORMAT JSON)
// - CsvSnapshot      : file snapshot lokal, scan penuh, ambil dt terbesar
// - FeatureCascade   : pilih sumber sesuai FeatureMode, fail-soft
//
// Semua kegagalan dikembalikan sebagai alasan (string) di FeatureResolution,
// tidak pernah di-raise ke caller.
//
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ClickHouseCfg, FeatureMode};
use crate::domain::{FeatureResolution, JobFeatures, SourceTag};
use crate::error::{SnapshotError, SourceError};
use crate::metrics::FEATURE_RESOLUTIONS;

/// Seam untuk orchestrator (test memakai resolver in-memory)
#[async_trait]
pub trait FeatureResolver: Send + Sync {
    async fn resolve(&self, job_id: i64, mode: FeatureMode) -> FeatureResolution;
}

// ---- coercion di boundary ----

fn coerce_f64(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_f64(s),
        _ => 0.0,
    }
}

fn coerce_i64(v: Option<&Value>) -> Option<i64> {
    match v {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_f64(s: &str) -> f64 {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .unwrap_or(0.0)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

// =============================================================================
// ClickHouse
// =============================================================================

pub struct ClickHouseSource {
    http: reqwest::Client,
    cfg: ClickHouseCfg,
}

impl ClickHouseSource {
    pub fn new(cfg: ClickHouseCfg) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    pub fn query_for(&self, job_id: i64) -> String {
        format!(
            "SELECT dt, job_id, impression_1d, view_1d, apply_1d, hire_1d \
             FROM {} WHERE job_id = {} ORDER BY dt DESC LIMIT 1 FORMAT JSON",
            self.cfg.table, job_id
        )
    }

    pub async fn fetch(&self, job_id: i64) -> Result<JobFeatures, SourceError> {
        let url = format!("{}/", self.cfg.url.trim_end_matches('/'));
        let sql = self.query_for(job_id);

        let rsp = self
            .http
            .get(url)
            .query(&[("database", self.cfg.database.as_str()), ("query", sql.as_str())])
            .header("X-ClickHouse-User", &self.cfg.user)
            .header("X-ClickHouse-Key", &self.cfg.password)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = rsp.status();
        let body = rsp.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(SourceError::Status { code: status.as_u16(), body: body.trim().to_string() });
        }

        let v: Value =
            serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))?;
        let data = v
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| SourceError::Malformed("no `data` array".to_string()))?;
        let row = data.first().ok_or(SourceError::Empty(job_id))?;
        let obj = row
            .as_object()
            .ok_or_else(|| SourceError::Malformed("row is not an object".to_string()))?;

        Ok(JobFeatures {
            observation_date: obj.get("dt").and_then(|d| d.as_str()).and_then(parse_date),
            job_id: coerce_i64(obj.get("job_id")).unwrap_or(job_id),
            impression_1d: coerce_f64(obj.get("impression_1d")),
            view_1d: coerce_f64(obj.get("view_1d")),
            apply_1d: coerce_f64(obj.get("apply_1d")),
            hire_1d: coerce_f64(obj.get("hire_1d")),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.cfg.timeout)
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

// =============================================================================
// CSV snapshot
// =============================================================================

pub struct CsvSnapshot {
    path: PathBuf,
}

impl CsvSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Scan file di blocking pool; handle file selalu ditutup saat return.
    pub async fn load(&self, job_id: i64) -> Result<JobFeatures, SnapshotError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_latest(&path, job_id))
            .await
            .map_err(|e| SnapshotError::Read(e.to_string()))?
    }
}

/// Baris dengan dt terbesar untuk `job_id`. dt yang tidak valid dianggap
/// paling tua; dt sama -> baris pertama yang menang (perbandingan `>`).
pub fn read_latest(path: &Path, job_id: i64) -> Result<JobFeatures, SnapshotError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => SnapshotError::NotFound(path.display().to_string()),
        _ => SnapshotError::Read(e.to_string()),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| SnapshotError::Read(e.to_string()))?
        .clone();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (c_job, c_dt) = (col("job_id"), col("dt"));
    let (c_imp, c_view, c_apply, c_hire) =
        (col("impression_1d"), col("view_1d"), col("apply_1d"), col("hire_1d"));

    let mut best: Option<(NaiveDate, JobFeatures)> = None;

    for result in reader.byte_records() {
        let record = match result {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(SnapshotError::Read(e.to_string())),
            Err(e) => {
                debug!(error = %e, "csv: skip undecodable row");
                continue;
            }
        };
        // field non-UTF-8 diperlakukan seperti tidak bisa di-parse
        let field = |c: Option<usize>| {
            c.and_then(|i| record.get(i)).and_then(|b| std::str::from_utf8(b).ok())
        };

        let row_job = match field(c_job).and_then(|s| s.parse::<i64>().ok()) {
            Some(id) => id,
            None => continue,
        };
        if row_job != job_id {
            continue;
        }

        let date = field(c_dt).and_then(parse_date);
        let rank = date.unwrap_or(NaiveDate::MIN);
        if let Some((best_rank, _)) = &best {
            if rank <= *best_rank {
                continue;
            }
        }

        let num = |c: Option<usize>| field(c).map(parse_f64).unwrap_or(0.0);
        best = Some((
            rank,
            JobFeatures {
                observation_date: date,
                job_id: row_job,
                impression_1d: num(c_imp),
                view_1d: num(c_view),
                apply_1d: num(c_apply),
                hire_1d: num(c_hire),
            },
        ));
    }

    best.map(|(_, f)| f).ok_or(SnapshotError::NoRow(job_id))
}

// =============================================================================
// Cascade
// =============================================================================

pub struct FeatureCascade {
    clickhouse: ClickHouseSource,
    snapshot: CsvSnapshot,
}

impl FeatureCascade {
    pub fn new(clickhouse: ClickHouseSource, snapshot: CsvSnapshot) -> Self {
        Self { clickhouse, snapshot }
    }
}

fn hit(features: JobFeatures, source: SourceTag, query: Option<String>, error: Option<String>) -> FeatureResolution {
    FEATURE_RESOLUTIONS.with_label_values(&[source.as_str(), "hit"]).inc();
    FeatureResolution { features: Some(features), source, query, error }
}

fn miss(source: SourceTag, query: Option<String>, error: String) -> FeatureResolution {
    FEATURE_RESOLUTIONS.with_label_values(&[source.as_str(), "miss"]).inc();
    FeatureResolution { features: None, source, query, error: Some(error) }
}

#[async_trait]
impl FeatureResolver for FeatureCascade {
    async fn resolve(&self, job_id: i64, mode: FeatureMode) -> FeatureResolution {
        match mode {
            FeatureMode::Off => FeatureResolution {
                features: None,
                source: SourceTag::Off,
                query: None,
                error: None,
            },

            FeatureMode::LocalCsv => match self.snapshot.load(job_id).await {
                Ok(f) => hit(f, SourceTag::LocalCsv, None, None),
                Err(e) => {
                    warn!(job_id, error = %e, "csv snapshot failed");
                    miss(SourceTag::LocalCsv, None, format!("csv_error: {e}"))
                }
            },

            FeatureMode::ClickHouse => {
                let query = Some(self.clickhouse.query_for(job_id));
                match self.clickhouse.fetch(job_id).await {
                    Ok(f) => hit(f, SourceTag::ClickHouse, query, None),
                    Err(e) => {
                        warn!(job_id, error = %e, "clickhouse failed");
                        miss(SourceTag::ClickHouse, query, format!("clickhouse_error: {e}"))
                    }
                }
            }

            FeatureMode::Auto => {
                let query = Some(self.clickhouse.query_for(job_id));
                let ch_err = match self.clickhouse.fetch(job_id).await {
                    Ok(f) => return hit(f, SourceTag::ClickHouse, query, None),
                    Err(e) => format!("clickhouse_error: {e}"),
                };
                debug!(job_id, reason = %ch_err, "falling back to csv snapshot");

                match self.snapshot.load(job_id).await {
                    Ok(f) => hit(f, SourceTag::LocalCsvFallback, query, Some(ch_err)),
                    Err(e) => {
                        let reason = format!("{ch_err} | csv_error: {e}");
                        warn!(job_id, %reason, "no feature source available");
                        miss(SourceTag::LocalCsvFallback, query, reason)
                    }
                }
            }
        }
    }
}
