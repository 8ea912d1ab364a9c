// ===============================
// src/domain.rs
// ===============================
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agregat harian perilaku satu job. Field numerik yang hilang / tidak bisa
/// di-parse sudah di-coerce ke 0.0 saat konstruksi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFeatures {
    pub observation_date: Option<NaiveDate>,
    pub job_id: i64,
    pub impression_1d: f64,
    pub view_1d: f64,
    pub apply_1d: f64,
    pub hire_1d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    #[serde(rename = "clickhouse")]
    ClickHouse,
    LocalCsv,
    LocalCsvFallback,
    Off,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::ClickHouse       => "clickhouse",
            SourceTag::LocalCsv         => "local_csv",
            SourceTag::LocalCsvFallback => "local_csv_fallback",
            SourceTag::Off              => "off",
        }
    }
}

/// Hasil cascade: features atau alasan gagal, tidak pernah panic / raise
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureResolution {
    pub features: Option<JobFeatures>,
    pub source: SourceTag,
    pub query: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineRow {
    pub job_id: Option<i64>,
    pub company_id: Option<i64>,
    pub price: Option<f64>,
}

/// Baris tabel label (endpoint /api/job_pricing/price/{job_id})
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLabel {
    pub job_id: i64,
    pub price_label: f64,
    pub expected_value: Option<f64>,
    pub expected_high_quality_applies: Option<f64>,
    pub source: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket { A, B }
impl Bucket { pub fn as_str(&self) -> &'static str { match self { Bucket::A => "A", Bucket::B => "B" } } }

fn default_brand_factor() -> f64 { 1.0 }
fn default_top_talent_ratio() -> f64 { 0.10 }
fn default_roi_target() -> f64 { 3.0 }
fn default_value_per_unit() -> f64 { 100.0 }

/// Body `POST /api/pricing/quote`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default = "default_brand_factor")]
    pub brand_factor: f64,
    #[serde(default)]
    pub brand_level: Option<f64>,
    #[serde(default = "default_top_talent_ratio")]
    pub top_talent_ratio: f64,
    #[serde(default = "default_roi_target")]
    pub roi_target: f64,
    #[serde(default = "default_value_per_unit")]
    pub value_per_unit: f64,
    #[serde(default)]
    pub expected_value: Option<f64>,
    #[serde(default)]
    pub expected_high_quality_applies: Option<f64>,
}

impl Default for QuoteRequest {
    fn default() -> Self {
        Self {
            job_id: None,
            company_id: None,
            brand_factor: default_brand_factor(),
            brand_level: None,
            top_talent_ratio: default_top_talent_ratio(),
            roi_target: default_roi_target(),
            value_per_unit: default_value_per_unit(),
            expected_value: None,
            expected_high_quality_applies: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteResult {
    pub job_id: Option<i64>,
    pub company_id: Option<i64>,
    pub price: f64,
    pub baseline_price: Option<f64>,
    pub bucket: Bucket,
    pub model_version: &'static str,
    pub source: String,
    pub debug: Map<String, Value>,
}

/// Satu baris JSONL recorder
#[derive(Debug, Clone, Serialize)]
pub struct QuoteEvent {
    pub ts_ms: i64,
    pub request: QuoteRequest,
    pub result: QuoteResult,
}
