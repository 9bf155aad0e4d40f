// Price <-> tick conversion on the 1.0001 logarithmic grid
// ---------------------------------------------------------
// Prices handed to this module are human prices in canonical orientation:
// token1 per 1 token0. Callers working in user (A/B) orientation go through
// `math::liquidity::PairOrientation` first.
//
// All ticks produced here are aligned to the requested spacing and clamped to
// +/- max_tick(spacing).

use ethers::types::U256;
use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::ToPrimitive;

use crate::error::{EngineError, EngineResult};
use crate::models::TickRange;

pub const MAX_TICK: i32 = 887_272;
const TICK_BASE: f64 = 1.0001;
// Absorbs ln() rounding so that an exact on-grid price never floors to tick - 1.
const TICK_EPSILON: f64 = 1e-9;

/// Largest usable tick for a spacing: floor(887272 / s) * s.
pub fn max_tick(tick_spacing: i32) -> i32 {
    (MAX_TICK / tick_spacing) * tick_spacing
}

pub fn min_tick(tick_spacing: i32) -> i32 {
    -max_tick(tick_spacing)
}

fn check_spacing(tick_spacing: i32) -> EngineResult<()> {
    if tick_spacing <= 0 {
        return Err(EngineError::InvalidRange(format!("tick spacing {} must be positive", tick_spacing)));
    }
    Ok(())
}

/// Positive and finite, the only prices the grid can place.
pub fn check_price(price: f64) -> EngineResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::InvalidRange(format!("price {} must be positive and finite", price)));
    }
    Ok(())
}

/// Round to the nearest multiple of `tick_spacing` (ties round up), then clamp.
pub fn nearest_usable_tick(tick: i32, tick_spacing: i32) -> EngineResult<i32> {
    check_spacing(tick_spacing)?;
    let lower = Integer::div_floor(&tick, &tick_spacing) * tick_spacing;
    let upper = lower + tick_spacing;
    let nearest = if tick - lower < upper - tick { lower } else { upper };
    let bound = max_tick(tick_spacing);
    Ok(nearest.clamp(-bound, bound))
}

/// Unrounded tick for a raw (decimals-adjusted) price.
fn raw_tick(raw_price: f64) -> i64 {
    (raw_price.ln() / TICK_BASE.ln() + TICK_EPSILON).floor() as i64
}

/// Human token1-per-token0 price -> aligned tick.
///
/// Non-positive, NaN and infinite prices are rejected instead of mapping to tick 0.
pub fn price_to_tick(price: f64, tick_spacing: i32, decimals0: u8, decimals1: u8) -> EngineResult<i32> {
    check_spacing(tick_spacing)?;
    check_price(price)?;
    let raw_price = price * 10f64.powi(decimals1 as i32 - decimals0 as i32);
    if !raw_price.is_finite() || raw_price <= 0.0 {
        return Err(EngineError::InvalidRange(format!("price {} out of representable range", price)));
    }
    let tick = raw_tick(raw_price).clamp(-(MAX_TICK as i64), MAX_TICK as i64) as i32;
    nearest_usable_tick(tick, tick_spacing)
}

/// Human token1-per-token0 price at `tick`.
pub fn tick_to_price(tick: i32, decimals0: u8, decimals1: u8) -> f64 {
    TICK_BASE.powf(tick as f64) * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

/// Price bounds -> tick range. A missing bound falls back to the full-range edge.
pub fn range_to_ticks(
    price_lower: Option<f64>,
    price_upper: Option<f64>,
    tick_spacing: i32,
    decimals0: u8,
    decimals1: u8,
) -> EngineResult<TickRange> {
    check_spacing(tick_spacing)?;
    let bound = max_tick(tick_spacing);

    let (lower, upper) = match (price_lower, price_upper) {
        (Some(lo), Some(hi)) => (
            price_to_tick(lo, tick_spacing, decimals0, decimals1)?,
            price_to_tick(hi, tick_spacing, decimals0, decimals1)?,
        ),
        _ => return TickRange::full(tick_spacing),
    };

    // Float rounding at extreme precision can invert the pair.
    let (mut lower, mut upper) = if lower > upper { (upper, lower) } else { (lower, upper) };

    if lower == upper {
        if upper + tick_spacing <= bound {
            upper += tick_spacing;
        } else {
            lower -= tick_spacing;
        }
    }

    TickRange::new(lower, upper, tick_spacing)
}

pub fn u256_to_bigint(u: U256) -> BigInt {
    let mut buf = [0u8; 32];
    u.to_big_endian(&mut buf);
    BigInt::from_bytes_be(Sign::Plus, &buf)
}

/// Lossy U256 -> f64 for display and price math.
pub fn u256_to_f64(u: U256) -> f64 {
    u256_to_bigint(u).to_f64().unwrap_or(f64::MAX)
}

/// Human token1-per-token0 price from a Q64.96 square-root price.
pub fn price_from_sqrt_price_x96(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    let sqrt = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
    sqrt * sqrt * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worked_example_price_2_5() {
        // ln(2.5)/ln(1.0001) = 9163.3 -> nearest multiple of 200
        let tick = price_to_tick(2.5, 200, 18, 18).unwrap();
        assert_eq!(tick, 9200);
    }

    #[test]
    fn test_round_trip_on_grid_ticks() {
        for spacing in [1, 10, 50, 60, 100, 200, 2000] {
            for multiple in [-400, -37, -1, 0, 1, 5, 123, 400] {
                let tick: i32 = multiple * spacing;
                if tick.abs() > max_tick(spacing) {
                    continue;
                }
                let price = tick_to_price(tick, 18, 6);
                assert_eq!(price_to_tick(price, spacing, 18, 6).unwrap(), tick, "spacing {} tick {}", spacing, tick);
            }
        }
    }

    #[test]
    fn test_invalid_prices_rejected() {
        assert!(price_to_tick(0.0, 60, 18, 18).is_err());
        assert!(price_to_tick(-3.0, 60, 18, 18).is_err());
        assert!(price_to_tick(f64::NAN, 60, 18, 18).is_err());
        assert!(price_to_tick(f64::INFINITY, 60, 18, 18).is_err());
        assert!(price_to_tick(1.0, 0, 18, 18).is_err());
        assert!(check_price(-5.0).is_err());
        assert!(check_price(2.5).is_ok());
    }

    #[test]
    fn test_clamps_to_max_tick() {
        assert_eq!(price_to_tick(1e300, 200, 18, 18).unwrap(), max_tick(200));
        assert_eq!(price_to_tick(1e-300, 200, 18, 18).unwrap(), -max_tick(200));
    }

    #[test]
    fn test_max_tick_per_spacing() {
        assert_eq!(max_tick(1), 887_272);
        assert_eq!(max_tick(60), 887_220);
        assert_eq!(max_tick(200), 887_200);
        assert_eq!(min_tick(2000), -886_000);
    }

    #[test]
    fn test_nearest_usable_tick_negative() {
        assert_eq!(nearest_usable_tick(-9163, 200).unwrap(), -9200);
        assert_eq!(nearest_usable_tick(-9100, 200).unwrap(), -9000);
        assert_eq!(nearest_usable_tick(-50, 100).unwrap(), 0);
        assert_eq!(nearest_usable_tick(50, 100).unwrap(), 100);
    }

    #[test]
    fn test_range_to_ticks_swaps_and_defaults() {
        let range = range_to_ticks(Some(150.0), Some(110.0), 10, 18, 18).unwrap();
        assert!(range.tick_lower < range.tick_upper);
        assert_eq!(range.tick_lower, price_to_tick(110.0, 10, 18, 18).unwrap());

        let full = range_to_ticks(None, Some(2.0), 200, 18, 18).unwrap();
        assert!(full.is_full_range());
    }

    #[test]
    fn test_range_to_ticks_widens_collapsed_range() {
        let range = range_to_ticks(Some(1.0), Some(1.0001), 200, 18, 18).unwrap();
        assert_eq!(range.tick_lower, 0);
        assert_eq!(range.tick_upper, 200);
    }

    #[test]
    fn test_decimals_adjustment() {
        // 3000 USDC(6) per WETH(18)
        let tick = price_to_tick(3000.0, 1, 18, 6).unwrap();
        let back = tick_to_price(tick, 18, 6);
        assert!((back - 3000.0).abs() / 3000.0 < 1e-4);
        assert!(tick < 0);
    }

    #[test]
    fn test_sqrt_price_conversion() {
        // sqrtPriceX96 = 2^96 encodes a raw price of exactly 1
        let one = U256::one() << 96;
        assert!((price_from_sqrt_price_x96(one, 18, 18) - 1.0).abs() < 1e-12);
        assert!((price_from_sqrt_price_x96(one, 18, 6) - 1e12).abs() < 1.0);
    }
}
