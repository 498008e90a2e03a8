use serde::{Deserialize, Serialize};

/// One price at grain (chain, store, product, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMenuPrice {
    pub chain_id: i64,
    pub store_id: i64,
    pub product_id: i64,
    pub date_id: i64,
    pub price: f64,
}

impl FactMenuPrice {
    pub fn grain(&self) -> (i64, i64, i64, i64) {
        (self.chain_id, self.store_id, self.product_id, self.date_id)
    }
}
