// ===============================
// src/bucket.rs
// ===============================
//
// Assignment A/B yang stabil: sha256(key) -> 8 hex digit pertama -> paritas.
// Tidak ada random / jam, jadi key yang sama selalu dapat bucket yang sama.
//
// Catatan operasional: mengganti algoritma hash mengacak ulang anggota bucket.
// Lakukan hanya di batas eksperimen.
//
use sha2::{Digest, Sha256};

use crate::domain::Bucket;

const PREFIX_HEX_DIGITS: usize = 8;

pub fn assign(key: &str) -> Bucket {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    // 8 hex digit selalu muat di u32
    let v = u32::from_str_radix(&digest[..PREFIX_HEX_DIGITS], 16).unwrap_or(0);
    if v % 2 == 0 { Bucket::A } else { Bucket::B }
}

/// company_id, lalu job_id, lalu "anonymous"
pub fn bucket_key(company_id: Option<i64>, job_id: Option<i64>) -> String {
    company_id
        .or(job_id)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}
