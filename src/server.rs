// ===============================
// src/server.rs
// ===============================
//
// HTTP surface (tipis):
//   GET  /health
//   POST /api/pricing/quote
//   GET  /api/job_pricing/price/{job_id}
//
use std::convert::Infallible;
use std::net::SocketAddr;

use chrono::Utc;
use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::domain::{QuoteEvent, QuoteRequest};
use crate::error::QuoteError;
use crate::quote::QuoteOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: QuoteOrchestrator,
    pub recorder: Option<mpsc::Sender<QuoteEvent>>,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut rsp = Response::new(Body::from(bytes));
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    rsp
}

fn detail(status: StatusCode, msg: impl Into<String>) -> Response<Body> {
    json_response(status, &json!({ "detail": msg.into() }))
}

pub async fn handle(req: Request<Body>, state: AppState) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();

    let rsp = match (&method, path.as_str()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, &json!({ "status": "ok" })),
        (&Method::POST, "/api/pricing/quote") => quote(req, &state).await,
        (&Method::GET, p) if p.starts_with("/api/job_pricing/price/") => {
            let raw = &p["/api/job_pricing/price/".len()..];
            price_label(raw, &state).await
        }
        _ => detail(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(rsp)
}

async fn quote(req: Request<Body>, state: &AppState) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => return detail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    // body kosong = semua default
    let parsed = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        Ok(QuoteRequest::default())
    } else {
        serde_json::from_slice::<QuoteRequest>(&bytes)
            .map_err(|e| QuoteError::BadRequest(e.to_string()))
    };
    let request = match parsed {
        Ok(r) => r,
        Err(e) => return detail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.orchestrator.quote(&request).await {
        Ok(result) => {
            let rsp = json_response(StatusCode::OK, &result);
            if let Some(tx) = &state.recorder {
                let ev = QuoteEvent { ts_ms: Utc::now().timestamp_millis(), request, result };
                if tx.try_send(ev).is_err() {
                    warn!("recorder channel full, quote event dropped");
                }
            }
            rsp
        }
        Err(e) => {
            error!(error = %e, "quote failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn price_label(raw_id: &str, state: &AppState) -> Response<Body> {
    let job_id: i64 = match raw_id.parse() {
        Ok(id) => id,
        Err(_) => return detail(StatusCode::BAD_REQUEST, format!("invalid job_id: {raw_id:?}")),
    };
    match state.orchestrator.baseline_store().price_label(job_id).await {
        Ok(Some(label)) => json_response(StatusCode::OK, &label),
        Ok(None) => detail(StatusCode::NOT_FOUND, format!("job_id={job_id} not found")),
        Err(e) => {
            error!(job_id, error = %e, "price label lookup failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone()))) }
    });

    info!(%addr, "quote api listening");
    Server::try_bind(&addr)?.serve(make_svc).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;

    use crate::baseline::tests::MemoryStore;
    use crate::config::FeatureMode;
    use crate::domain::PriceLabel;
    use crate::error::StoreError;
    use crate::quote::tests::{job, orchestrator, FixedFeatures};

    fn state(orchestrator: QuoteOrchestrator) -> AppState {
        AppState { orchestrator, recorder: None }
    }

    async fn call(state: AppState, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let rsp = handle(req, state).await.unwrap();
        let status = rsp.status();
        let bytes = hyper::body::to_bytes(rsp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health() {
        let (status, body) = call(state(orchestrator(vec![], vec![])), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn quote_round_trip() {
        let s = state(orchestrator(vec![job(10, 10.0)], vec![]));
        let (status, body) = call(
            s,
            Method::POST,
            "/api/pricing/quote",
            r#"{"job_id": 10, "company_id": 42, "unknown_field": true}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 326.62);
        assert_eq!(body["baseline_price"], Value::Null);
        assert_eq!(body["bucket"], "A");
        assert_eq!(body["model_version"], "feature-price-v1");
        assert_eq!(body["source"], "clickhouse");
        assert!(body["debug"].is_object());
    }

    #[tokio::test]
    async fn empty_body_uses_defaults() {
        let s = state(orchestrator(vec![], vec![]));
        let (status, body) = call(s, Method::POST, "/api/pricing/quote", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 120.0);
        assert_eq!(body["model_version"], "fallback-rule-v1");
    }

    #[tokio::test]
    async fn bad_json_is_400() {
        let s = state(orchestrator(vec![], vec![]));
        let (status, body) = call(s, Method::POST, "/api/pricing/quote", "{job_id:").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("bad request"));
    }

    #[tokio::test]
    async fn contract_violation_is_500() {
        let o = QuoteOrchestrator::new(
            Arc::new(FixedFeatures(vec![])),
            Arc::new(MemoryStore::failing(|| StoreError::MissingColumn("price_label".into()))),
            FeatureMode::Auto,
        );
        let (status, body) =
            call(state(o), Method::POST, "/api/pricing/quote", r#"{"job_id": 1}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("contract violation"));
    }

    #[tokio::test]
    async fn price_label_endpoint() {
        let mut store = MemoryStore::with_rows(vec![]);
        store.labels.push(PriceLabel {
            job_id: 5,
            price_label: 288.5,
            expected_value: Some(140.0),
            expected_high_quality_applies: None,
            source: "mysql",
        });
        let o = QuoteOrchestrator::new(Arc::new(FixedFeatures(vec![])), Arc::new(store), FeatureMode::Auto);
        let s = state(o);

        let (status, body) = call(s.clone(), Method::GET, "/api/job_pricing/price/5", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price_label"], 288.5);
        assert_eq!(body["expected_high_quality_applies"], Value::Null);
        assert_eq!(body["source"], "mysql");

        let (status, body) = call(s.clone(), Method::GET, "/api/job_pricing/price/6", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "job_id=6 not found");

        let (status, _) = call(s, Method::GET, "/api/job_pricing/price/abc", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let s = state(orchestrator(vec![], vec![]));
        let (status, _) = call(s, Method::GET, "/api/pricing/quote", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn served_quotes_reach_the_recorder() {
        let (tx, mut rx) = mpsc::channel(4);
        let s = AppState { orchestrator: orchestrator(vec![], vec![]), recorder: Some(tx) };
        let (status, _) = call(s, Method::POST, "/api/pricing/quote", r#"{"company_id": 9}"#).await;
        assert_eq!(status, StatusCode::OK);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.request.company_id, Some(9));
        assert_eq!(ev.result.price, 120.0);
    }
}
