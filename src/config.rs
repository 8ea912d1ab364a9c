// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : job_pricing — job posting price quote service in Rust
Module  : config.rs
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
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use crate::error::ConfigError;

/// Mode pemilihan sumber feature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FeatureMode {
    #[default]
    Auto,
    ClickHouse,
    LocalCsv,
    Off,
}

impl FeatureMode {
    pub fn parse(s: &str) -> Option<FeatureMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto"       => Some(FeatureMode::Auto),
            "clickhouse" => Some(FeatureMode::ClickHouse),
            "local_csv"  => Some(FeatureMode::LocalCsv),
            "off"        => Some(FeatureMode::Off),
            _ => None,
        }
    }

    pub fn from_env(key: &str, default_mode: FeatureMode) -> FeatureMode {
        env::var(key)
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or(default_mode)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureMode::Auto       => "auto",
            FeatureMode::ClickHouse => "clickhouse",
            FeatureMode::LocalCsv   => "local_csv",
            FeatureMode::Off        => "off",
        }
    }
}

/// Override via command line (lebih tinggi dari ENV)
#[derive(Debug, Default, Parser)]
#[command(name = "job_pricing", version, about = "Job posting price quote service")]
pub struct Cli {
    /// HTTP listen address, e.g. 0.0.0.0:8000
    #[arg(long)]
    pub listen: Option<String>,
    /// Prometheus metrics port
    #[arg(long)]
    pub metrics_port: Option<u16>,
    /// auto | clickhouse | local_csv | off
    #[arg(long)]
    pub feature_mode: Option<String>,
    /// Append every served quote to this JSONL file
    #[arg(long)]
    pub record_file: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ClickHouseCfg {
    pub url: String,
    pub database: String,
    pub table: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct MysqlCfg {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
}

#[derive(Clone, Debug)]
pub struct Args {
    // server / files / metrics
    pub listen_addr: String,
    pub metrics_port: u16,
    pub record_file: Option<String>,

    // feature cascade
    pub feature_mode: FeatureMode,
    pub clickhouse: ClickHouseCfg,
    pub feature_csv: PathBuf,

    // baseline store
    pub mysql: MysqlCfg,
    pub pricing_table: String,
    pub price_col: String,
    pub label_table: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// `[A-Za-z_][A-Za-z0-9_]*`, boleh dengan prefix `db.`
pub fn is_sql_identifier(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return false;
    }
    parts.iter().all(|p| {
        let mut chars = p.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

fn checked_identifier(key: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = env_or(key, default);
    if is_sql_identifier(&value) {
        Ok(value)
    } else {
        Err(ConfigError::BadIdentifier { key, value })
    }
}

/// 0 / tidak valid -> default 5 detik (timeout 0 membuat semua call gagal)
pub fn timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(5)
}

pub fn load(cli: Cli) -> Result<Args, ConfigError> {
    // Pastikan .env dibaca (agar MYSQL_*, CLICKHOUSE_*, dll ter-load)
    let _ = dotenv();

    // ===== Server =====
    let listen_addr = cli
        .listen
        .unwrap_or_else(|| env_or("LISTEN_ADDR", "0.0.0.0:8000"));
    let metrics_port = cli.metrics_port.unwrap_or_else(|| {
        env::var("METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9898)
    });
    let record_file = cli.record_file.or_else(|| env::var("RECORD_FILE").ok());

    // ===== Feature cascade =====
    // CLI value yang tidak dikenal -> pakai ENV / default
    let feature_mode = cli
        .feature_mode
        .as_deref()
        .and_then(FeatureMode::parse)
        .unwrap_or_else(|| FeatureMode::from_env("FEATURE_MODE", FeatureMode::Auto));

    let ch_timeout = timeout_secs(env::var("CLICKHOUSE_TIMEOUT_SECS").ok().as_deref());

    let clickhouse = ClickHouseCfg {
        url: env_or("CLICKHOUSE_URL", "http://127.0.0.1:8123"),
        database: checked_identifier("CLICKHOUSE_DATABASE", "default")?,
        table: checked_identifier("CLICKHOUSE_TABLE", "job_features_daily")?,
        user: env_or("CLICKHOUSE_USER", "default"),
        password: env_or("CLICKHOUSE_PASSWORD", ""),
        timeout: Duration::from_secs(ch_timeout),
    };
    let feature_csv = PathBuf::from(env_or("FEATURE_CSV_PATH", "data/job_features_daily.csv"));

    // ===== Baseline store =====
    let mysql = MysqlCfg {
        host: env_or("MYSQL_HOST", "127.0.0.1"),
        port: env::var("MYSQL_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3306),
        user: env_or("MYSQL_USER", "root"),
        password: env_or("MYSQL_PASSWORD", ""),
        database: env_or("MYSQL_DB", "job_pricing"),
        charset: env_or("MYSQL_CHARSET", "utf8mb4"),
    };

    Ok(Args {
        listen_addr,
        metrics_port,
        record_file,
        feature_mode,
        clickhouse,
        feature_csv,
        mysql,
        pricing_table: checked_identifier("PRICING_TABLE", "train_samples")?,
        price_col: checked_identifier("PRICE_COL", "price_label")?,
        label_table: checked_identifier("LABEL_TABLE", "job_pricing_label")?,
    })
}
