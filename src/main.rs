// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/job_pricing

 # quote (features -> baseline -> fallback)
curl -s -XPOST localhost:8000/api/pricing/quote -d '{"job_id": 1001, "company_id": 42}'

# label tersimpan per job
curl -s localhost:8000/api/job_pricing/price/1001

# cabang harga yang dipakai & hasil cascade
curl -s localhost:9898/metrics | egrep '^(quotes_total|feature_resolutions_total|config_feature_mode)'

*/
/*
=============================================================================
Project : job_pricing — job posting price quote service in Rust
Module  : main.rs
Version : 0.3.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Resolves job behavioral features (ClickHouse -> CSV snapshot ->
          none), turns them into a bounded price, falls back to a MySQL
          baseline or a coarse rule, and assigns a stable A/B bucket.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod baseline;
mod bucket;
mod config;
mod domain;
mod error;
mod features;
mod metrics;
mod pricing;
mod quote;
mod recorder;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::baseline::MysqlBaselineStore;
use crate::domain::QuoteEvent;
use crate::features::{ClickHouseSource, CsvSnapshot, FeatureCascade};
use crate::quote::QuoteOrchestrator;
use crate::server::AppState;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let args = match config::load(config::Cli::parse()) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));

    // ---- Startup info + export config ke metrics (tanpa password) ----
    info!(
        feature_mode = args.feature_mode.as_str(),
        clickhouse = %args.clickhouse.url,
        clickhouse_table = %args.clickhouse.table,
        timeout = ?args.clickhouse.timeout,
        feature_csv = %args.feature_csv.display(),
        mysql = %format!("{}@{}:{}/{}", args.mysql.user, args.mysql.host, args.mysql.port, args.mysql.database),
        pricing_table = %args.pricing_table,
        price_col = %args.price_col,
        label_table = %args.label_table,
        "startup config"
    );
    crate::metrics::CONFIG_FEATURE_MODE
        .with_label_values(&[args.feature_mode.as_str()])
        .set(1);

    // ---- Feature cascade ----
    let clickhouse = match ClickHouseSource::new(args.clickhouse.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "clickhouse client init failed");
            std::process::exit(1);
        }
    };
    let cascade = FeatureCascade::new(clickhouse, CsvSnapshot::new(args.feature_csv.clone()));

    // ---- Baseline store ----
    let store = MysqlBaselineStore::new(&args);

    let orchestrator = QuoteOrchestrator::new(Arc::new(cascade), Arc::new(store), args.feature_mode);

    // ---- Recorder (optional) ----
    let recorder = args.record_file.clone().map(|path| {
        let (rec_tx, rec_rx) = mpsc::channel::<QuoteEvent>(8192);
        tokio::spawn(recorder::run(rec_rx, path));
        rec_tx
    });

    // ---- HTTP ----
    let addr: SocketAddr = match args.listen_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!(listen = %args.listen_addr, ?e, "bad listen address");
            std::process::exit(2);
        }
    };
    let state = AppState { orchestrator, recorder };

    if let Err(e) = server::serve(addr, state).await {
        error!(?e, "quote api stopped");
        std::process::exit(1);
    }
}
