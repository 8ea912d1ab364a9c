// ===============================
// src/quote.rs
// ===============================
//
// Orchestrator quote (per request, tanpa state):
// 1) baseline lookup (kalau ada id)  -> disimpan dulu
// 2) feature cascade (kalau ada job_id) -> harga dari features
// 3) urutan keputusan: features > baseline > fallback rule
// 4) bucket A/B dari company_id / job_id / "anonymous"
//
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::info;

use crate::baseline::{self, BaselineStore};
use crate::bucket;
use crate::config::FeatureMode;
use crate::domain::{QuoteRequest, QuoteResult};
use crate::error::QuoteError;
use crate::features::FeatureResolver;
use crate::metrics::{BUCKETS, QUOTES, QUOTE_LATENCY};
use crate::pricing::{self, PricingParams};

pub const MODEL_FEATURE: &str = "feature-price-v1";
pub const MODEL_BASELINE: &str = "baseline-db-v1";
pub const MODEL_FALLBACK: &str = "fallback-rule-v1";

#[derive(Clone)]
pub struct QuoteOrchestrator {
    features: Arc<dyn FeatureResolver>,
    baseline: Arc<dyn BaselineStore>,
    mode: FeatureMode,
}

fn insert_all(debug: &mut Map<String, Value>, v: Value) {
    if let Value::Object(m) = v {
        debug.extend(m);
    }
}

impl QuoteOrchestrator {
    pub fn new(
        features: Arc<dyn FeatureResolver>,
        baseline: Arc<dyn BaselineStore>,
        mode: FeatureMode,
    ) -> Self {
        Self { features, baseline, mode }
    }

    pub fn baseline_store(&self) -> &dyn BaselineStore {
        self.baseline.as_ref()
    }

    pub async fn quote(&self, req: &QuoteRequest) -> Result<QuoteResult, QuoteError> {
        let started = Instant::now();
        let params = PricingParams::from_request(req);

        let mut debug = Map::new();
        debug.insert("feature_mode".into(), json!(self.mode.as_str()));
        debug.insert("baseline_table".into(), json!(self.baseline.table()));
        debug.insert("price_col".into(), json!(self.baseline.price_col()));

        // 1) baseline: hanya disimpan, belum diputuskan
        let base = baseline::lookup(self.baseline.as_ref(), req.job_id, req.company_id).await?;
        if let Some(e) = &base.error {
            debug.insert("baseline_error".into(), json!(e));
        }
        let baseline_price = base.price();

        // 2) features -> harga
        let mut feature_quote = None;
        if let Some(job_id) = req.job_id {
            let res = self.features.resolve(job_id, self.mode).await;
            debug.insert("feature_source".into(), json!(res.source.as_str()));
            if let Some(q) = &res.query {
                debug.insert("feature_query".into(), json!(q));
            }
            if let Some(e) = &res.error {
                debug.insert("feature_error".into(), json!(e));
            }
            if let Some(f) = &res.features {
                let b = pricing::breakdown(
                    f,
                    params.brand_level,
                    params.top_talent_ratio,
                    params.roi_target,
                    params.value_per_unit,
                );
                insert_all(&mut debug, json!(b));
                debug.insert("brand_level".into(), json!(params.brand_level));
                feature_quote = Some((b.price, res.source));
            }
        }

        // 3) features > baseline > fallback
        let (price, model_version, source, baseline_price) = match (feature_quote, baseline_price) {
            (Some((price, tag)), bp) => (price, MODEL_FEATURE, tag.as_str().to_string(), bp),
            (None, Some(bp)) => (bp, MODEL_BASELINE, "db".to_string(), Some(bp)),
            (None, None) => {
                let fb = pricing::fallback_price(
                    req.expected_value,
                    req.expected_high_quality_applies,
                    params.brand_factor,
                );
                insert_all(&mut debug, json!(fb));
                (fb.price, MODEL_FALLBACK, "fallback".to_string(), None)
            }
        };
        // harga final sudah ada di top-level
        debug.remove("price");

        // 4) bucket
        let key = bucket::bucket_key(req.company_id, req.job_id);
        let bucket = bucket::assign(&key);

        let result = QuoteResult {
            job_id: req.job_id.or(base.row.as_ref().and_then(|r| r.job_id)),
            company_id: req.company_id.or(base.row.as_ref().and_then(|r| r.company_id)),
            price,
            baseline_price,
            bucket,
            model_version,
            source,
            debug,
        };

        QUOTES.with_label_values(&[model_version]).inc();
        BUCKETS.with_label_values(&[bucket.as_str()]).inc();
        QUOTE_LATENCY.observe(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            job_id = ?result.job_id,
            company_id = ?result.company_id,
            model_version,
            source = %result.source,
            bucket = ?result.bucket,
            price = result.price,
            "quote"
        );

        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::baseline::tests::MemoryStore;
    use crate::domain::{BaselineRow, Bucket, FeatureResolution, JobFeatures, SourceTag};
    use crate::error::StoreError;

    /// Resolver in-memory: job yang terdaftar dapat features dari ClickHouse
    pub(crate) struct FixedFeatures(pub Vec<JobFeatures>);

    #[async_trait]
    impl FeatureResolver for FixedFeatures {
        async fn resolve(&self, job_id: i64, mode: FeatureMode) -> FeatureResolution {
            if mode == FeatureMode::Off {
                return FeatureResolution { features: None, source: SourceTag::Off, query: None, error: None };
            }
            match self.0.iter().find(|f| f.job_id == job_id) {
                Some(f) => FeatureResolution {
                    features: Some(f.clone()),
                    source: SourceTag::ClickHouse,
                    query: Some(format!("job_id = {job_id}")),
                    error: None,
                },
                None => FeatureResolution {
                    features: None,
                    source: SourceTag::LocalCsvFallback,
                    query: None,
                    error: Some("clickhouse_error: empty | csv_error: no row".into()),
                },
            }
        }
    }

    pub(crate) fn job(job_id: i64, apply_1d: f64) -> JobFeatures {
        JobFeatures {
            observation_date: None,
            job_id,
            impression_1d: 0.0,
            view_1d: 0.0,
            apply_1d,
            hire_1d: 0.0,
        }
    }

    pub(crate) fn orchestrator(features: Vec<JobFeatures>, rows: Vec<BaselineRow>) -> QuoteOrchestrator {
        QuoteOrchestrator::new(
            Arc::new(FixedFeatures(features)),
            Arc::new(MemoryStore::with_rows(rows)),
            FeatureMode::Auto,
        )
    }

    fn baseline(job: i64, company: i64, price: f64) -> BaselineRow {
        BaselineRow { job_id: Some(job), company_id: Some(company), price: Some(price) }
    }

    #[tokio::test]
    async fn features_outrank_baseline() {
        let o = orchestrator(vec![job(10, 10.0)], vec![baseline(10, 5, 499.0)]);
        let req = QuoteRequest { job_id: Some(10), ..QuoteRequest::default() };
        let r = o.quote(&req).await.unwrap();
        assert_eq!(r.model_version, MODEL_FEATURE);
        assert_eq!(r.price, 326.62);
        assert_eq!(r.baseline_price, Some(499.0));
        assert_eq!(r.source, "clickhouse");
        assert_eq!(r.company_id, Some(5));
        assert!(r.debug.contains_key("z_norm"));
    }

    #[tokio::test]
    async fn baseline_when_no_features() {
        let o = orchestrator(vec![], vec![baseline(10, 5, 499.0)]);
        let req = QuoteRequest { job_id: Some(10), ..QuoteRequest::default() };
        let r = o.quote(&req).await.unwrap();
        assert_eq!(r.model_version, MODEL_BASELINE);
        assert_eq!(r.price, 499.0);
        assert_eq!(r.baseline_price, Some(499.0));
        assert_eq!(r.source, "db");
        assert!(r.debug.contains_key("feature_error"));
    }

    #[tokio::test]
    async fn fallback_when_nothing_resolves() {
        let o = orchestrator(vec![], vec![]);
        let req = QuoteRequest {
            job_id: Some(10),
            expected_value: Some(300.0),
            expected_high_quality_applies: Some(2.0),
            ..QuoteRequest::default()
        };
        let r = o.quote(&req).await.unwrap();
        assert_eq!(r.model_version, MODEL_FALLBACK);
        assert_eq!(r.price, 280.0);
        assert_eq!(r.baseline_price, None);
        assert_eq!(r.source, "fallback");
        assert_eq!(r.debug.get("base"), Some(&json!(280.0)));
    }

    #[tokio::test]
    async fn anonymous_request_still_priced() {
        let o = orchestrator(vec![], vec![]);
        let r = o.quote(&QuoteRequest::default()).await.unwrap();
        assert_eq!(r.price, 120.0);
        assert_eq!(r.bucket, bucket::assign("anonymous"));
        assert_eq!(r.job_id, None);
        assert!(!r.debug.contains_key("feature_source"));
    }

    #[tokio::test]
    async fn baseline_only_by_company() {
        let o = orchestrator(vec![job(10, 10.0)], vec![baseline(10, 5, 333.33)]);
        let req = QuoteRequest { company_id: Some(5), ..QuoteRequest::default() };
        let r = o.quote(&req).await.unwrap();
        assert_eq!(r.model_version, MODEL_BASELINE);
        assert_eq!(r.price, 333.33);
        assert_eq!(r.job_id, Some(10));
    }

    #[tokio::test]
    async fn off_mode_skips_features() {
        let o = QuoteOrchestrator::new(
            Arc::new(FixedFeatures(vec![job(10, 10.0)])),
            Arc::new(MemoryStore::with_rows(vec![])),
            FeatureMode::Off,
        );
        let req = QuoteRequest { job_id: Some(10), ..QuoteRequest::default() };
        let r = o.quote(&req).await.unwrap();
        assert_eq!(r.model_version, MODEL_FALLBACK);
        assert_eq!(r.debug.get("feature_source"), Some(&json!("off")));
    }

    #[tokio::test]
    async fn bucket_follows_company_then_job() {
        let o = orchestrator(vec![], vec![]);
        let req = QuoteRequest { job_id: Some(7), company_id: Some(42), ..QuoteRequest::default() };
        assert_eq!(o.quote(&req).await.unwrap().bucket, Bucket::A);
        let req = QuoteRequest { job_id: Some(7), ..QuoteRequest::default() };
        assert_eq!(o.quote(&req).await.unwrap().bucket, Bucket::B);
    }

    #[tokio::test]
    async fn brand_level_feeds_fallback_factor() {
        let o = orchestrator(vec![], vec![]);
        let req = QuoteRequest {
            brand_level: Some(5.0),
            expected_value: Some(300.0),
            expected_high_quality_applies: Some(2.0),
            ..QuoteRequest::default()
        };
        assert_eq!(o.quote(&req).await.unwrap().price, 308.0);
    }

    #[tokio::test]
    async fn store_outage_falls_through_but_contract_violation_fails() {
        let o = QuoteOrchestrator::new(
            Arc::new(FixedFeatures(vec![])),
            Arc::new(MemoryStore::failing(|| StoreError::Unavailable("down".into()))),
            FeatureMode::Auto,
        );
        let r = o.quote(&QuoteRequest { job_id: Some(1), ..QuoteRequest::default() }).await.unwrap();
        assert_eq!(r.model_version, MODEL_FALLBACK);
        assert_eq!(r.debug.get("baseline_error"), Some(&json!("down")));

        let o = QuoteOrchestrator::new(
            Arc::new(FixedFeatures(vec![])),
            Arc::new(MemoryStore::failing(|| StoreError::MissingColumn("price_label".into()))),
            FeatureMode::Auto,
        );
        let err = o.quote(&QuoteRequest { job_id: Some(1), ..QuoteRequest::default() }).await;
        assert!(matches!(err, Err(QuoteError::Contract(_))));
    }
}
