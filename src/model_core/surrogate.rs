//! Deterministic surrogate keys
//!
//! Every id is derived from its business key alone (SHA-256 over a table tag
//! plus the length-prefixed key parts, first 8 bytes, top bit cleared), so any
//! run on any machine assigns the same id without a key registry. Two
//! distinct keys colliding is possible in principle and accepted.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

pub fn surrogate_id(parts: &[&str]) -> i64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) >> 1) as i64
}

pub fn chain_id(chain_key: &str) -> i64 {
    surrogate_id(&["chain", chain_key])
}

pub fn store_id(chain_key: &str, store_key: &str) -> i64 {
    surrogate_id(&["store", chain_key, store_key])
}

pub fn product_id(chain_key: &str, product_key: &str) -> i64 {
    surrogate_id(&["product", chain_key, product_key])
}

pub fn date_id(date_key: NaiveDate) -> i64 {
    surrogate_id(&["date", &date_key.format("%Y-%m-%d").to_string()])
}
