use super::surrogate;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimChain {
    pub chain_id: i64,
    pub chain_key: String,
}

impl DimChain {
    pub fn new(chain_key: &str) -> Self {
        Self {
            chain_id: surrogate::chain_id(chain_key),
            chain_key: chain_key.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimStore {
    pub store_id: i64,
    pub chain_id: i64,
    pub store_key: String,
    pub city: String,
    pub province: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimProduct {
    pub product_id: i64,
    pub chain_id: i64,
    pub product_key: String,
    pub recipe: String,
    pub size: String,
    pub crust: String,
    pub category: String,
}

/// Calendar attributes, all derived from `date_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimDate {
    pub date_id: i64,
    pub date_key: NaiveDate,
    pub year_num: i32,
    pub month_num: u32,
    pub month_name: String,
    pub day_num: u32,
    /// Sunday = 0
    pub dow_num: u32,
}

impl DimDate {
    pub fn from_date(date_key: NaiveDate) -> Self {
        Self {
            date_id: surrogate::date_id(date_key),
            date_key,
            year_num: date_key.year(),
            month_num: date_key.month(),
            month_name: date_key.format("%B").to_string(),
            day_num: date_key.day(),
            dow_num: date_key.weekday().num_days_from_sunday(),
        }
    }
}
