// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, Server, StatusCode};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Quote pipeline --------
pub static QUOTES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("quotes_total", "quotes served by pricing branch"),
        &["model_version"],
    )
    .unwrap()
});

pub static FEATURE_RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "feature_resolutions_total",
            "feature cascade results (labels: source, outcome=hit|miss)",
        ),
        &["source", "outcome"],
    )
    .unwrap()
});

pub static BASELINE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "baseline_lookups_total",
            "baseline store lookups (label: outcome=hit|miss|error|contract)",
        ),
        &["outcome"],
    )
    .unwrap()
});

pub static BUCKETS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("buckets_total", "A/B assignments"), &["bucket"]).unwrap()
});

// End-to-end quote latency (milliseconds)
pub static QUOTE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "quote_latency_ms",
        "Latency of one quote request (ms)",
    ))
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_FEATURE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_feature_mode", "feature mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(QUOTES.clone())),
        REGISTRY.register(Box::new(FEATURE_RESOLUTIONS.clone())),
        REGISTRY.register(Box::new(BASELINE_LOOKUPS.clone())),
        REGISTRY.register(Box::new(BUCKETS.clone())),
        REGISTRY.register(Box::new(QUOTE_LATENCY.clone())),
        REGISTRY.register(Box::new(CONFIG_FEATURE_MODE.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// Hanya `GET /metrics` (dan `/`); path lain 404, method lain 405.
pub async fn scrape(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") | (&Method::GET, "/") => {
            (StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", encode_metrics())
        }
        (_, "/metrics") | (_, "/") => {
            (StatusCode::METHOD_NOT_ALLOWED, "text/plain", b"method not allowed\n".to_vec())
        }
        _ => (StatusCode::NOT_FOUND, "text/plain", b"not found\n".to_vec()),
    };
    let mut rsp = Response::new(Body::from(body));
    *rsp.status_mut() = status;
    rsp.headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    Ok(rsp)
}

// Metrics server di task tersendiri, terpisah dari port API
pub async fn serve_metrics(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let builder = match Server::try_bind(&addr) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(%addr, ?e, "metrics bind failed");
            return;
        }
    };
    tracing::info!("metrics listening on http://{addr}/metrics");

    let make_svc = make_service_fn(|_| async { Ok::<_, Infallible>(service_fn(scrape)) });
    if let Err(e) = builder.serve(make_svc).await {
        tracing::warn!(?e, "metrics server stopped");
    }
}
