use rocket::serde::{Deserialize, Serialize};

use crate::math::liquidity::RangePosition;
use crate::models::PoolKind;

#[derive(Deserialize, rocket::FromForm)]
pub struct QuoteQuery {
    pub token_in: String,
    pub token_out: String,
    /// raw units, decimal string
    pub amount_in: String,
}

#[derive(Deserialize, rocket::FromForm)]
pub struct TicksQuery {
    pub token_a: String,
    pub token_b: String,
    pub tick_spacing: i32,
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
}

#[derive(Deserialize, rocket::FromForm)]
pub struct DepositQuery {
    pub token_a: String,
    pub token_b: String,
    pub tick_spacing: i32,
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
    pub current_price: f64,
    pub amount_a: Option<f64>,
    pub amount_b: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Found,
    NoRoute,
    ZeroOutput,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QuoteResponse {
    pub timestamp_utc: String,
    pub status: QuoteStatus,
    pub amount_in: String,
    pub amount_out: Option<String>,
    pub route_kind: Option<String>,
    pub path: Vec<String>,
    pub tick_spacings: Vec<i32>,
    pub gas_estimate: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TicksResponse {
    pub token0: String,
    pub token1: String,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub tick_spacing: i32,
    pub full_range: bool,
    /// Realised bounds after snapping, B per A; `None` on an open side.
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DepositResponse {
    pub position: RangePosition,
    pub token_a_symbol: String,
    pub token_b_symbol: String,
    pub amount_a: f64,
    pub amount_b: f64,
    pub amount_a_raw: String,
    pub amount_b_raw: String,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PoolEntry {
    pub address: String,
    pub kind: PoolKind,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub reserve0: Option<String>,
    pub reserve1: Option<String>,
    /// token1 per token0
    pub spot_price: Option<f64>,
    pub tick: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PoolsResponse {
    pub count: usize,
    pub refreshing: bool,
    pub cache_age_secs: Option<i64>,
    pub pools: Vec<PoolEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RefreshAccepted {
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
