// Range classification + deposit allocation for concentrated-liquidity positions
// -------------------------------------------------------------------------------
// Users think in (A, B) order and quote prices as "B per A". The protocol sorts
// the pair by address into (token0, token1) and prices everything as
// "token1 per token0". `PairOrientation` is the only place that translates
// between the two; amounts, prices, bounds and labels all go through it.
//
// Math is done on human (decimal-adjusted) f64 amounts:
//   L       = amount0 / (1/sqrtC - 1/sqrtU)  == amount0 * sqrtC * sqrtU / (sqrtU - sqrtC)
//   amount1 = L * (sqrtC - sqrtL)

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::tick_math::{range_to_ticks, tick_to_price};
use crate::models::{TickRange, Token};

/// Where the current price sits relative to a position's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangePosition {
    /// current >= upper: the range lies below the price, token1 only.
    BelowRange,
    /// current <= lower: the range lies above the price, token0 only.
    AboveRange,
    InRange,
}

/// Price window in token1-per-token0 (or B-per-A, depending on who holds it).
/// `lower == 0` and `upper == inf` express an unbounded side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBounds {
    pub lower: f64,
    pub upper: f64,
}

impl PriceBounds {
    pub fn new(lower: f64, upper: f64) -> EngineResult<Self> {
        if lower.is_nan() || upper.is_nan() || lower < 0.0 || upper <= lower {
            return Err(EngineError::InvalidRange(format!("bounds [{}, {}] are not a valid window", lower, upper)));
        }
        Ok(Self { lower, upper })
    }

    pub fn full() -> Self {
        Self { lower: 0.0, upper: f64::INFINITY }
    }

    pub fn is_full(&self) -> bool {
        self.lower <= 0.0 && self.upper.is_infinite()
    }

    /// Bounds of the reciprocal price: [lo, hi] -> [1/hi, 1/lo].
    fn inverted(&self) -> Self {
        Self { lower: 1.0 / self.upper, upper: 1.0 / self.lower }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepositInput {
    A(f64),
    B(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepositAmounts {
    pub position: RangePosition,
    pub amount_a: f64,
    pub amount_b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CanonicalInput {
    Token0(f64),
    Token1(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairOrientation {
    token_a: Token,
    token_b: Token,
    a_is_token0: bool,
}

impl PairOrientation {
    pub fn new(token_a: Token, token_b: Token) -> EngineResult<Self> {
        if token_a.address == token_b.address {
            return Err(EngineError::InvalidRange(format!("pair uses the same token twice: {:?}", token_a.address)));
        }
        let a_is_token0 = token_a.address < token_b.address;
        Ok(Self { token_a, token_b, a_is_token0 })
    }

    pub fn a_is_token0(&self) -> bool {
        self.a_is_token0
    }

    pub fn token_a(&self) -> &Token {
        &self.token_a
    }

    pub fn token_b(&self) -> &Token {
        &self.token_b
    }

    pub fn token0(&self) -> &Token {
        if self.a_is_token0 { &self.token_a } else { &self.token_b }
    }

    pub fn token1(&self) -> &Token {
        if self.a_is_token0 { &self.token_b } else { &self.token_a }
    }

    /// (token0 symbol, token1 symbol), for labelling canonical amounts.
    pub fn labels(&self) -> (&str, &str) {
        (&self.token0().symbol, &self.token1().symbol)
    }

    /// B-per-A -> token1-per-token0.
    pub fn canonical_price(&self, price_b_per_a: f64) -> f64 {
        if self.a_is_token0 { price_b_per_a } else { 1.0 / price_b_per_a }
    }

    /// token1-per-token0 -> B-per-A. The mapping is its own inverse.
    pub fn user_price(&self, price_1_per_0: f64) -> f64 {
        self.canonical_price(price_1_per_0)
    }

    pub fn canonical_bounds(&self, bounds: PriceBounds) -> PriceBounds {
        if self.a_is_token0 { bounds } else { bounds.inverted() }
    }

    pub fn canonical_amounts(&self, amount_a: f64, amount_b: f64) -> (f64, f64) {
        if self.a_is_token0 { (amount_a, amount_b) } else { (amount_b, amount_a) }
    }

    /// (amount0, amount1) -> (amount_a, amount_b).
    pub fn user_amounts(&self, amount0: f64, amount1: f64) -> (f64, f64) {
        self.canonical_amounts(amount0, amount1)
    }

    fn canonical_input(&self, input: DepositInput) -> CanonicalInput {
        match (input, self.a_is_token0) {
            (DepositInput::A(x), true) | (DepositInput::B(x), false) => CanonicalInput::Token0(x),
            (DepositInput::A(x), false) | (DepositInput::B(x), true) => CanonicalInput::Token1(x),
        }
    }

    /// B-per-A price bounds -> aligned tick range. A missing bound means full range.
    pub fn range_to_ticks(
        &self,
        price_lower: Option<f64>,
        price_upper: Option<f64>,
        tick_spacing: i32,
    ) -> EngineResult<TickRange> {
        let (lower, upper) = match (price_lower, price_upper) {
            (Some(lo), Some(hi)) if !self.a_is_token0 => {
                if lo <= 0.0 || hi <= 0.0 || !lo.is_finite() || !hi.is_finite() {
                    return Err(EngineError::InvalidRange(format!("bounds [{}, {}] must be positive", lo, hi)));
                }
                (Some(1.0 / hi), Some(1.0 / lo))
            }
            other => other,
        };
        range_to_ticks(lower, upper, tick_spacing, self.token0().decimals, self.token1().decimals)
    }

    /// Canonical price bounds covered by a tick range.
    pub fn tick_bounds(&self, range: &TickRange) -> PriceBounds {
        if range.is_full_range() {
            return PriceBounds::full();
        }
        let (d0, d1) = (self.token0().decimals, self.token1().decimals);
        PriceBounds { lower: tick_to_price(range.tick_lower, d0, d1), upper: tick_to_price(range.tick_upper, d0, d1) }
    }
}

/// Classify a canonical window against a canonical current price.
pub fn classify(bounds: PriceBounds, current_price: f64) -> RangePosition {
    if current_price >= bounds.upper {
        RangePosition::BelowRange
    } else if current_price <= bounds.lower {
        RangePosition::AboveRange
    } else {
        RangePosition::InRange
    }
}

/// In-range counterpart amount, all canonical.
fn in_range_amounts(bounds: PriceBounds, current_price: f64, input: CanonicalInput) -> (f64, f64) {
    if bounds.is_full() {
        return match input {
            CanonicalInput::Token0(x) => (x, x * current_price),
            CanonicalInput::Token1(x) => (x / current_price, x),
        };
    }

    let sqrt_lower = bounds.lower.sqrt();
    let sqrt_upper = bounds.upper.sqrt();
    let sqrt_current = current_price.sqrt();
    // 1/sqrtU -> 0 when the upper side is unbounded
    let inv_gap0 = 1.0 / sqrt_current - 1.0 / sqrt_upper;
    let gap1 = sqrt_current - sqrt_lower;

    match input {
        CanonicalInput::Token0(x) => {
            let liquidity = x / inv_gap0;
            (x, liquidity * gap1)
        }
        CanonicalInput::Token1(x) => {
            let liquidity = x / gap1;
            (liquidity * inv_gap0, x)
        }
    }
}

/// Input checks that need no token metadata: positive current price, non-negative amount.
pub fn check_deposit(current_price: f64, input: DepositInput) -> EngineResult<()> {
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(EngineError::InvalidRange(format!("current price {} must be positive", current_price)));
    }
    let amount = match input {
        DepositInput::A(x) | DepositInput::B(x) => x,
    };
    if !amount.is_finite() || amount < 0.0 {
        return Err(EngineError::InvalidRange(format!("deposit amount {} must be non-negative", amount)));
    }
    Ok(())
}

/// Amounts of both tokens required when the user fixes one side.
///
/// `bounds` and `current_price` are B-per-A; the result is in (A, B) order.
pub fn allocate_deposit(
    pair: &PairOrientation,
    bounds: PriceBounds,
    current_price: f64,
    input: DepositInput,
) -> EngineResult<DepositAmounts> {
    check_deposit(current_price, input)?;

    let canonical_bounds = pair.canonical_bounds(bounds);
    allocate_canonical(pair, canonical_bounds, pair.canonical_price(current_price), input)
}

/// Same as `allocate_deposit`, with the window taken from an aligned tick range.
pub fn allocate_for_ticks(
    pair: &PairOrientation,
    range: &TickRange,
    current_price: f64,
    input: DepositInput,
) -> EngineResult<DepositAmounts> {
    let bounds = pair.tick_bounds(range);
    let user_bounds = if pair.a_is_token0() { bounds } else { bounds.inverted() };
    allocate_deposit(pair, user_bounds, current_price, input)
}

fn allocate_canonical(
    pair: &PairOrientation,
    bounds: PriceBounds,
    current_price: f64,
    input: DepositInput,
) -> EngineResult<DepositAmounts> {
    let canonical = pair.canonical_input(input);
    let position = classify(bounds, current_price);

    let (amount0, amount1) = match (position, canonical) {
        (RangePosition::AboveRange, CanonicalInput::Token0(x)) => (x, 0.0),
        (RangePosition::BelowRange, CanonicalInput::Token1(x)) => (0.0, x),
        (RangePosition::AboveRange, CanonicalInput::Token1(x)) | (RangePosition::BelowRange, CanonicalInput::Token0(x)) => {
            if x > 0.0 {
                let (sym0, sym1) = pair.labels();
                let accepted = if position == RangePosition::AboveRange { sym0 } else { sym1 };
                return Err(EngineError::InvalidRange(format!(
                    "range is single-sided ({:?}); only {} can be deposited", position, accepted
                )));
            }
            (0.0, 0.0)
        }
        (RangePosition::InRange, input) => in_range_amounts(bounds, current_price, input),
    };

    let (amount_a, amount_b) = pair.user_amounts(amount0, amount1);
    log::debug!(
        "deposit allocation: {:?} amount_a={} amount_b={} (a_is_token0={})",
        position, amount_a, amount_b, pair.a_is_token0()
    );
    Ok(DepositAmounts { position, amount_a, amount_b })
}
