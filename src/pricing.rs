// ===============================
// src/pricing.rs
// ===============================
//
// Transformasi harga (pure, deterministik):
// - breakdown      : features + parameter -> harga [120, 650] + nilai antara
// - fallback_price : aturan kasar saat tidak ada features / baseline
//
// Konstanta di bawah adalah kalibrasi model harga. Mengubahnya berarti
// mengubah perilaku bisnis.
//
use serde::Serialize;

use crate::domain::{JobFeatures, QuoteRequest};

pub const PRICE_FLOOR: f64 = 120.0;
pub const PRICE_CEILING: f64 = 650.0;

const CORE_LOW: f64 = 250.0;
const CORE_HIGH: f64 = 380.0;
const Z_MIN: f64 = 0.0;
const Z_MAX: f64 = 6.0;
const ROI_EPSILON: f64 = 1e-6;

const BRAND_CENTER: f64 = 3.0;
const BRAND_STEP: f64 = 0.05;

const FALLBACK_EXPECTED_VALUE: f64 = 100.0;
const FALLBACK_HQ_APPLIES: f64 = 1.0;

/// Parameter per request (tidak pernah disimpan)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingParams {
    pub brand_level: f64,
    pub brand_factor: f64,
    pub top_talent_ratio: f64,
    pub roi_target: f64,
    pub value_per_unit: f64,
}

impl PricingParams {
    /// `brand_level` eksplisit menang; kalau tidak ada, diturunkan dari `brand_factor`.
    pub fn from_request(req: &QuoteRequest) -> Self {
        let (brand_level, brand_factor) = match req.brand_level {
            Some(level) => (level, brand_factor_from_level(level)),
            None => (brand_level_from_factor(req.brand_factor), req.brand_factor),
        };
        Self {
            brand_level,
            brand_factor,
            top_talent_ratio: req.top_talent_ratio,
            roi_target: req.roi_target,
            value_per_unit: req.value_per_unit,
        }
    }
}

pub fn brand_factor_from_level(level: f64) -> f64 {
    1.0 + BRAND_STEP * (level - BRAND_CENTER)
}

pub fn brand_level_from_factor(factor: f64) -> f64 {
    BRAND_CENTER + (factor - 1.0) / BRAND_STEP
}

/// NaN (mis. inf * 0) jatuh ke floor; f64::clamp meloloskan NaN.
pub fn clamp_price(p: f64) -> f64 {
    if p.is_nan() {
        return PRICE_FLOOR;
    }
    p.clamp(PRICE_FLOOR, PRICE_CEILING)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Hasil transformasi harga. `price` adalah output final; field lain adalah
/// nilai antara yang ikut dikirim di `debug`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub expected_applies: f64,
    pub expected_value: f64,
    pub price_base: f64,
    pub z_norm: f64,
    pub price_core: f64,
    pub brand_factor: f64,
    pub price: f64,
}

pub fn breakdown(
    f: &JobFeatures,
    brand_level: f64,
    top_talent_ratio: f64,
    roi_target: f64,
    value_per_unit: f64,
) -> PriceBreakdown {
    let ratio = top_talent_ratio.clamp(0.0, 1.0);
    let expected_applies = f.apply_1d * ratio;
    let expected_value = value_per_unit * expected_applies;
    let price_base = expected_value / roi_target.max(ROI_EPSILON);

    // ln(1+x) menekan volume besar ke [0,1]
    let z = price_base.max(0.0).ln_1p();
    let z_norm = ((z - Z_MIN) / (Z_MAX - Z_MIN)).clamp(0.0, 1.0);
    let price_core = CORE_LOW + z_norm * (CORE_HIGH - CORE_LOW);

    let brand_factor = brand_factor_from_level(brand_level);
    let price = round2(clamp_price(price_core * brand_factor));

    PriceBreakdown {
        expected_applies,
        expected_value,
        price_base,
        z_norm,
        price_core,
        brand_factor,
        price,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FallbackQuote {
    pub expected_value: f64,
    pub expected_high_quality_applies: f64,
    pub brand_factor: f64,
    pub base: f64,
    pub price: f64,
}

/// Cabang terakhir: tanpa dependency eksternal, selalu menghasilkan harga.
pub fn fallback_price(
    expected_value: Option<f64>,
    expected_high_quality_applies: Option<f64>,
    brand_factor: f64,
) -> FallbackQuote {
    let ev = expected_value.unwrap_or(FALLBACK_EXPECTED_VALUE);
    let ehq = expected_high_quality_applies.unwrap_or(FALLBACK_HQ_APPLIES);
    let base = 0.6 * ev + 50.0 * ehq;
    FallbackQuote {
        expected_value: ev,
        expected_high_quality_applies: ehq,
        brand_factor,
        base: round2(base),
        price: round2(clamp_price(base * brand_factor)),
    }
}
