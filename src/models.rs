use std::str::FromStr;
use std::time::Duration;

use ethers::types::{Address, U256};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::tick_math::{max_tick, price_from_sqrt_price_x96, u256_to_f64};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self { address, symbol: symbol.into(), decimals }
    }

    /// Human amount -> smallest units. Negative, NaN or non-finite input yields zero.
    ///
    /// Scales the float's shortest decimal text exactly, so 18-decimal amounts keep
    /// every digit the float carries. Magnitudes a `Decimal` cannot hold fall back
    /// to float scaling.
    pub fn to_raw(&self, amount: f64) -> U256 {
        if !amount.is_finite() || amount <= 0.0 {
            return U256::zero();
        }
        match Decimal::from_str(&amount.to_string()) {
            Ok(exact) => self.scale_decimal(exact),
            Err(_) => {
                let scaled = (amount * 10f64.powi(self.decimals as i32)).round();
                U256::from_dec_str(&format!("{:.0}", scaled)).unwrap_or_default()
            }
        }
    }

    fn scale_decimal(&self, amount: Decimal) -> U256 {
        let rounded = amount.round_dp(self.decimals as u32);
        let Ok(mantissa) = u128::try_from(rounded.mantissa()) else {
            return U256::zero();
        };
        let shift = (self.decimals as u32).saturating_sub(rounded.scale());
        U256::from(10u8)
            .checked_pow(U256::from(shift))
            .and_then(|factor| U256::from(mantissa).checked_mul(factor))
            .unwrap_or_default()
    }

    /// Smallest units -> exact decimal. `None` when the value does not fit a `Decimal`.
    pub fn to_human(&self, raw: U256) -> Option<Decimal> {
        if raw > U256::from(i128::MAX as u128) {
            return None;
        }
        Decimal::try_from_i128_with_scale(raw.as_u128() as i128, self.decimals as u32).ok()
    }

    /// Lossy float view of a raw amount, for price math and display.
    pub fn to_human_f64(&self, raw: U256) -> f64 {
        u256_to_f64(raw) / 10f64.powi(self.decimals as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRange {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub tick_spacing: i32,
}

impl TickRange {
    pub fn new(tick_lower: i32, tick_upper: i32, tick_spacing: i32) -> EngineResult<Self> {
        if tick_spacing <= 0 {
            return Err(EngineError::InvalidRange(format!("tick spacing {} must be positive", tick_spacing)));
        }
        if tick_lower >= tick_upper {
            return Err(EngineError::InvalidRange(format!(
                "tick_lower {} must be below tick_upper {}", tick_lower, tick_upper
            )));
        }
        if tick_lower % tick_spacing != 0 || tick_upper % tick_spacing != 0 {
            return Err(EngineError::InvalidRange(format!(
                "ticks {}..{} not aligned to spacing {}", tick_lower, tick_upper, tick_spacing
            )));
        }
        let bound = max_tick(tick_spacing);
        if tick_lower < -bound || tick_upper > bound {
            return Err(EngineError::InvalidRange(format!(
                "ticks {}..{} outside +/-{}", tick_lower, tick_upper, bound
            )));
        }
        Ok(Self { tick_lower, tick_upper, tick_spacing })
    }

    pub fn full(tick_spacing: i32) -> EngineResult<Self> {
        if tick_spacing <= 0 {
            return Err(EngineError::InvalidRange(format!("tick spacing {} must be positive", tick_spacing)));
        }
        let bound = max_tick(tick_spacing);
        Self::new(-bound, bound, tick_spacing)
    }

    pub fn is_full_range(&self) -> bool {
        let bound = max_tick(self.tick_spacing);
        self.tick_lower == -bound && self.tick_upper == bound
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    Direct,
    MultiHop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub amount_out: U256,
    pub path: Vec<Address>,
    pub kind: RouteKind,
    pub tick_spacings: Vec<i32>,
    pub gas_estimate: Option<U256>,
}

impl Quote {
    pub fn hops(&self) -> usize {
        self.tick_spacings.len()
    }
}

/// One swap quoting request; built per call, never stored.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub tick_spacings: Vec<i32>,
    pub intermediates: Vec<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolKind {
    Basic { stable: bool },
    Concentrated { tick_spacing: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub address: Address,
    pub kind: PoolKind,
    pub token0: Token,
    pub token1: Token,
    pub reserve0: U256,
    pub reserve1: U256,
    pub sqrt_price_x96: Option<U256>,
    pub tick: Option<i32>,
}

impl PoolSnapshot {
    /// Both sides zero means the reserve fetch never landed.
    pub fn needs_reserves(&self) -> bool {
        self.reserve0.is_zero() && self.reserve1.is_zero()
    }

    /// token1 per token0 in human units.
    pub fn spot_price(&self) -> Option<f64> {
        match (self.kind, self.sqrt_price_x96) {
            (PoolKind::Concentrated { .. }, Some(sqrt)) if !sqrt.is_zero() => Some(price_from_sqrt_price_x96(
                sqrt,
                self.token0.decimals,
                self.token1.decimals,
            )),
            _ => {
                let r0 = self.token0.to_human_f64(self.reserve0);
                let r1 = self.token1.to_human_f64(self.reserve1);
                if r0 > 0.0 { Some(r1 / r0) } else { None }
            }
        }
    }
}

/// Persisted pool listing. Trusted only while `now - timestamp < ttl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub pools: Vec<PoolSnapshot>,
    /// epoch milliseconds
    pub timestamp: i64,
}

impl CacheSnapshot {
    pub fn is_valid_at(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = ttl.as_millis().to_i64().unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) < ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(decimals: u8) -> Token {
        Token::new(Address::from([0x11; 20]), "TKN", decimals)
    }

    #[test]
    fn test_raw_conversion() {
        let usdc = token(6);
        assert_eq!(usdc.to_raw(1.5), U256::from(1_500_000u64));
        assert_eq!(usdc.to_raw(-1.0), U256::zero());
        assert_eq!(usdc.to_raw(f64::NAN), U256::zero());

        let weth = token(18);
        assert_eq!(weth.to_raw(2.0), U256::from(2_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_raw_conversion_keeps_precision_past_2_pow_53() {
        let weth = token(18);
        assert_eq!(weth.to_raw(0.1), U256::exp10(17));
        assert_eq!(weth.to_raw(1234567.891), U256::from_dec_str("1234567891000000000000000").unwrap());
        // digits past the token's precision are rounded off
        assert_eq!(token(6).to_raw(0.0000017), U256::from(2));
    }

    #[test]
    fn test_human_conversion() {
        let usdc = token(6);
        let human = usdc.to_human(U256::from(1_234_567u64)).expect("fits decimal");
        assert_eq!(human.to_string(), "1.234567");
        assert!(usdc.to_human(U256::MAX).is_none());
    }

    #[test]
    fn test_tick_range_invariants() {
        assert!(TickRange::new(-200, 200, 200).is_ok());
        assert!(TickRange::new(200, 200, 200).is_err());
        assert!(TickRange::new(-150, 200, 200).is_err());
        assert!(TickRange::new(-887_400, 0, 200).is_err());

        let full = TickRange::full(200).expect("full range");
        assert_eq!(full.tick_upper, 887_200);
        assert_eq!(full.tick_lower, -887_200);
        assert!(full.is_full_range());
    }

    #[test]
    fn test_cache_validity_window() {
        let saved_at = 1_700_000_000_000i64;
        let snapshot = CacheSnapshot { pools: vec![], timestamp: saved_at };
        let ttl = Duration::from_secs(60 * 60);
        assert!(snapshot.is_valid_at(saved_at + 59 * 60 * 1000, ttl));
        assert!(!snapshot.is_valid_at(saved_at + 61 * 60 * 1000, ttl));
    }

    #[test]
    fn test_basic_pool_spot_price() {
        let pool = PoolSnapshot {
            address: Address::from([0x33; 20]),
            kind: PoolKind::Basic { stable: false },
            token0: Token::new(Address::from([0x01; 20]), "WETH", 18),
            token1: Token::new(Address::from([0x02; 20]), "USDC", 6),
            reserve0: U256::from(10u64) * U256::exp10(18),
            reserve1: U256::from(30_000u64) * U256::exp10(6),
            sqrt_price_x96: None,
            tick: None,
        };
        let price = pool.spot_price().expect("reserves present");
        assert!((price - 3000.0).abs() < 1e-9);
        assert!(!pool.needs_reserves());
    }
}
