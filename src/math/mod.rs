pub mod tick_math;
pub mod liquidity;
