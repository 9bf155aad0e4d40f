pub mod guard;
pub mod repository;
pub mod router;
pub mod aggregator;
pub mod liquidity_plan;
