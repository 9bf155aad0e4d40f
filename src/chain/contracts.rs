// src/chain/contracts.rs
//
// Calldata builders and reply decoders for the read-only views the pool
// listing depends on (factories, pools, ERC20 metadata). Every decoder takes
// the batch slot as-is and returns `None` for placeholders or short replies.

use ethers::abi::{self, ParamType, Token as AbiToken};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;

use crate::chain::rpc::ReadCall;

pub const ALL_POOLS_LENGTH: &str = "allPoolsLength()";
pub const ALL_POOLS: &str = "allPools(uint256)";
pub const TOKEN0: &str = "token0()";
pub const TOKEN1: &str = "token1()";
pub const STABLE: &str = "stable()";
pub const TICK_SPACING: &str = "tickSpacing()";
pub const SLOT0: &str = "slot0()";
pub const GET_RESERVES: &str = "getReserves()";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const SYMBOL: &str = "symbol()";
pub const DECIMALS: &str = "decimals()";

pub fn encode_call(signature: &str, args: &[AbiToken]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

pub fn view(target: Address, signature: &str) -> ReadCall {
    ReadCall::new(target, encode_call(signature, &[]))
}

pub fn all_pools(factory: Address, index: u64) -> ReadCall {
    ReadCall::new(factory, encode_call(ALL_POOLS, &[AbiToken::Uint(U256::from(index))]))
}

pub fn balance_of(token: Address, owner: Address) -> ReadCall {
    ReadCall::new(token, encode_call(BALANCE_OF, &[AbiToken::Address(owner)]))
}

fn decode(types: &[ParamType], slot: Option<&Bytes>) -> Option<Vec<AbiToken>> {
    let raw = slot?;
    abi::decode(types, raw).ok()
}

pub fn decode_uint(slot: Option<&Bytes>) -> Option<U256> {
    decode(&[ParamType::Uint(256)], slot)?.into_iter().next()?.into_uint()
}

pub fn decode_address(slot: Option<&Bytes>) -> Option<Address> {
    decode(&[ParamType::Address], slot)?.into_iter().next()?.into_address()
}

pub fn decode_bool(slot: Option<&Bytes>) -> Option<bool> {
    decode(&[ParamType::Bool], slot)?.into_iter().next()?.into_bool()
}

/// int24 returned in a sign-extended word.
pub fn decode_int24(slot: Option<&Bytes>) -> Option<i32> {
    let word = decode(&[ParamType::Int(24)], slot)?.into_iter().next()?.into_int()?;
    Some(word.low_u32() as i32)
}

pub fn decode_u8(slot: Option<&Bytes>) -> Option<u8> {
    let value = decode_uint(slot)?;
    (value <= U256::from(u8::MAX)).then(|| value.low_u32() as u8)
}

/// ERC20 `symbol()`: dynamic string, with a bytes32 fallback for legacy tokens.
pub fn decode_symbol(slot: Option<&Bytes>) -> Option<String> {
    if let Some(s) = decode(&[ParamType::String], slot).and_then(|t| t.into_iter().next()?.into_string()) {
        return Some(s);
    }
    let raw = slot?;
    if raw.len() != 32 {
        return None;
    }
    let text: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
    String::from_utf8(text).ok().filter(|s| !s.is_empty())
}

/// Concentrated pool `slot0()`: (sqrtPriceX96, tick, ...). Only the first two words matter.
pub fn decode_slot0(slot: Option<&Bytes>) -> Option<(U256, i32)> {
    let raw = slot?;
    if raw.len() < 64 {
        return None;
    }
    let sqrt_price_x96 = U256::from_big_endian(&raw[..32]);
    let tick = U256::from_big_endian(&raw[32..64]).low_u32() as i32;
    Some((sqrt_price_x96, tick))
}

/// Basic pool `getReserves()`: (reserve0, reserve1, blockTimestampLast).
pub fn decode_reserves(slot: Option<&Bytes>) -> Option<(U256, U256)> {
    let raw = slot?;
    if raw.len() < 64 {
        return None;
    }
    Some((U256::from_big_endian(&raw[..32]), U256::from_big_endian(&raw[32..64])))
}
