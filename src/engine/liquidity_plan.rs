// src/engine/liquidity_plan.rs
//
// Builds the approve -> approve -> mint sequence the wallet layer executes for a
// new concentrated-liquidity position. Only one plan per position identity may
// be outstanding; the returned ticket holds that slot until dropped.

use ethers::types::{Address, U256};
use serde::Serialize;

use crate::engine::guard::{GuardTicket, OperationGuard};
use crate::error::{EngineError, EngineResult};
use crate::math::liquidity::{DepositAmounts, PairOrientation};
use crate::models::TickRange;

const BPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MintStep {
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Mint {
        token0: Address,
        token1: Address,
        tick_spacing: i32,
        tick_lower: i32,
        tick_upper: i32,
        amount0_desired: U256,
        amount1_desired: U256,
        amount0_min: U256,
        amount1_min: U256,
        recipient: Address,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MintPlan {
    pub steps: Vec<MintStep>,
}

impl MintPlan {
    pub fn approvals(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, MintStep::Approve { .. })).count()
    }
}

pub struct LiquidityPlanner {
    position_manager: Address,
    guard: OperationGuard,
}

fn with_slippage(amount: U256, slippage_bps: u32) -> U256 {
    amount * U256::from(BPS - slippage_bps) / U256::from(BPS)
}

pub fn mint_key(owner: Address, pair: &PairOrientation, range: &TickRange) -> String {
    format!(
        "mint:{:?}:{:?}:{:?}:{}:{}:{}",
        owner,
        pair.token0().address,
        pair.token1().address,
        range.tick_spacing,
        range.tick_lower,
        range.tick_upper
    )
}

impl LiquidityPlanner {
    pub fn new(position_manager: Address) -> Self {
        Self { position_manager, guard: OperationGuard::new() }
    }

    pub fn is_pending(&self, owner: Address, pair: &PairOrientation, range: &TickRange) -> bool {
        self.guard.is_held(&mint_key(owner, pair, range))
    }

    /// Start a mint flow. A second call for the same position while the first
    /// ticket is alive is rejected with `OperationInProgress`.
    pub fn begin_mint(
        &self,
        owner: Address,
        pair: &PairOrientation,
        range: &TickRange,
        amounts: &DepositAmounts,
        slippage_bps: u32,
    ) -> EngineResult<(MintPlan, GuardTicket)> {
        if slippage_bps >= BPS {
            return Err(EngineError::InvalidRange(format!("slippage {} bps must be below {}", slippage_bps, BPS)));
        }
        let (human0, human1) = pair.canonical_amounts(amounts.amount_a, amounts.amount_b);
        let amount0 = pair.token0().to_raw(human0);
        let amount1 = pair.token1().to_raw(human1);
        if amount0.is_zero() && amount1.is_zero() {
            return Err(EngineError::InvalidRange("nothing to deposit".into()));
        }

        let ticket = self.guard.try_acquire(mint_key(owner, pair, range))?;

        let mut steps = Vec::with_capacity(3);
        for (token, amount) in [(pair.token0().address, amount0), (pair.token1().address, amount1)] {
            if !amount.is_zero() {
                steps.push(MintStep::Approve { token, spender: self.position_manager, amount });
            }
        }
        steps.push(MintStep::Mint {
            token0: pair.token0().address,
            token1: pair.token1().address,
            tick_spacing: range.tick_spacing,
            tick_lower: range.tick_lower,
            tick_upper: range.tick_upper,
            amount0_desired: amount0,
            amount1_desired: amount1,
            amount0_min: with_slippage(amount0, slippage_bps),
            amount1_min: with_slippage(amount1, slippage_bps),
            recipient: owner,
        });

        log::info!("{} planned with {} steps", ticket.key(), steps.len());
        Ok((MintPlan { steps }, ticket))
    }
}
