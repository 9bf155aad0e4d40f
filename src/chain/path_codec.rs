// src/chain/path_codec.rs
//
// Multi-hop route descriptors and quoter call payloads.
//   path  = token(20) | (tick_spacing(3, BE two's complement) | token(20))*
//   call  = selector(quoteExactInput(bytes,uint256)) | abi(path: bytes, amountIn: uint256)
//   reply = amountOut(32) | ... | gasEstimate (word 3, when present)

use bytes::{Buf, BufMut, BytesMut};
use ethers::abi::{self, Token as AbiToken};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;

use crate::error::{EngineError, EngineResult};

pub const ADDRESS_LEN: usize = 20;
pub const TICK_SPACING_LEN: usize = 3;
pub const HOP_LEN: usize = TICK_SPACING_LEN + ADDRESS_LEN;
pub const WORD_LEN: usize = 32;
pub const QUOTE_EXACT_INPUT_SIG: &str = "quoteExactInput(bytes,uint256)";

const SPACING_MIN: i32 = -(1 << 23);
const SPACING_MAX: i32 = (1 << 23) - 1;
const GAS_ESTIMATE_WORD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub tick_spacing: i32,
    pub token: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPath {
    pub token_in: Address,
    pub hops: Vec<Hop>,
}

impl SwapPath {
    pub fn new(tokens: &[Address], tick_spacings: &[i32]) -> EngineResult<Self> {
        if tokens.len() < 2 {
            return Err(EngineError::InvalidPath(format!("need at least two tokens, got {}", tokens.len())));
        }
        if tick_spacings.len() != tokens.len() - 1 {
            return Err(EngineError::InvalidPath(format!(
                "{} tokens need {} tick spacings, got {}",
                tokens.len(), tokens.len() - 1, tick_spacings.len()
            )));
        }
        let hops = tick_spacings
            .iter()
            .zip(&tokens[1..])
            .map(|(&tick_spacing, &token)| Hop { tick_spacing, token })
            .collect();
        Ok(Self { token_in: tokens[0], hops })
    }

    pub fn tokens(&self) -> Vec<Address> {
        std::iter::once(self.token_in).chain(self.hops.iter().map(|h| h.token)).collect()
    }

    pub fn tick_spacings(&self) -> Vec<i32> {
        self.hops.iter().map(|h| h.tick_spacing).collect()
    }

    pub fn token_out(&self) -> Address {
        self.hops.last().map(|h| h.token).unwrap_or(self.token_in)
    }

    pub fn encode(&self) -> EngineResult<Bytes> {
        if self.hops.is_empty() {
            return Err(EngineError::InvalidPath("path has no hops".into()));
        }
        let mut buf = BytesMut::with_capacity(ADDRESS_LEN + HOP_LEN * self.hops.len());
        buf.put_slice(self.token_in.as_bytes());
        for hop in &self.hops {
            if !(SPACING_MIN..=SPACING_MAX).contains(&hop.tick_spacing) {
                return Err(EngineError::InvalidPath(format!("tick spacing {} does not fit 24 bits", hop.tick_spacing)));
            }
            // low 24 bits of the two's complement value
            buf.put_uint((hop.tick_spacing as u32 & 0x00FF_FFFF) as u64, TICK_SPACING_LEN);
            buf.put_slice(hop.token.as_bytes());
        }
        Ok(Bytes::from(buf.freeze()))
    }

    pub fn decode(raw: &[u8]) -> EngineResult<Self> {
        if raw.len() < ADDRESS_LEN + HOP_LEN || (raw.len() - ADDRESS_LEN) % HOP_LEN != 0 {
            return Err(EngineError::InvalidPath(format!("{} bytes is not a valid path length", raw.len())));
        }
        let mut cursor = raw;
        let token_in = Address::from_slice(&cursor[..ADDRESS_LEN]);
        cursor.advance(ADDRESS_LEN);

        let mut hops = Vec::with_capacity(cursor.len() / HOP_LEN);
        while cursor.has_remaining() {
            let unsigned = cursor.get_uint(TICK_SPACING_LEN) as u32;
            // sign-extend from bit 23
            let tick_spacing = ((unsigned << 8) as i32) >> 8;
            let token = Address::from_slice(&cursor[..ADDRESS_LEN]);
            cursor.advance(ADDRESS_LEN);
            hops.push(Hop { tick_spacing, token });
        }
        Ok(Self { token_in, hops })
    }
}

pub fn encode_path(tokens: &[Address], tick_spacings: &[i32]) -> EngineResult<Bytes> {
    SwapPath::new(tokens, tick_spacings)?.encode()
}

pub fn decode_path(raw: &[u8]) -> EngineResult<(Vec<Address>, Vec<i32>)> {
    let path = SwapPath::decode(raw)?;
    Ok((path.tokens(), path.tick_spacings()))
}

pub fn selector(signature: &str) -> [u8; 4] {
    id(signature)
}

/// selector + ABI head/tail for `(bytes path, uint256 amountIn)`.
pub fn encode_quote_call(path: &Bytes, amount_in: U256) -> Bytes {
    let mut call = selector(QUOTE_EXACT_INPUT_SIG).to_vec();
    call.extend(abi::encode(&[AbiToken::Bytes(path.to_vec()), AbiToken::Uint(amount_in)]));
    Bytes::from(call)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteReply {
    pub amount_out: U256,
    pub gas_estimate: Option<U256>,
}

/// Read amountOut (word 0) and, for full quoter replies, the gas estimate (word 3).
pub fn decode_quote_response(raw: Option<&[u8]>) -> EngineResult<QuoteReply> {
    let raw = match raw {
        Some(r) if r.len() >= WORD_LEN => r,
        Some(r) => return Err(EngineError::MalformedResponse(format!("{} bytes, need at least {}", r.len(), WORD_LEN))),
        None => return Err(EngineError::MalformedResponse("no payload".into())),
    };
    let amount_out = U256::from_big_endian(&raw[..WORD_LEN]);
    let gas_offset = GAS_ESTIMATE_WORD * WORD_LEN;
    let gas_estimate = (raw.len() >= gas_offset + WORD_LEN)
        .then(|| U256::from_big_endian(&raw[gas_offset..gas_offset + WORD_LEN]));
    Ok(QuoteReply { amount_out, gas_estimate })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        Address::from([x; 20])
    }

    #[test]
    fn test_single_hop_layout() {
        let encoded = encode_path(&[addr(0xAA), addr(0xBB)], &[200]).unwrap();
        let mut expected = vec![0xAA; 20];
        expected.extend([0x00, 0x00, 0xC8]);
        expected.extend(vec![0xBB; 20]);
        assert_eq!(encoded.to_vec(), expected);
    }

    #[test]
    fn test_two_hop_round_trip() {
        let tokens = vec![addr(1), addr(2), addr(3)];
        let spacings = vec![1, 2000];
        let encoded = encode_path(&tokens, &spacings).unwrap();
        assert_eq!(encoded.len(), 20 + 23 * 2);
        assert_eq!(decode_path(&encoded).unwrap(), (tokens, spacings));
    }

    #[test]
    fn test_negative_spacing_twos_complement() {
        let encoded = encode_path(&[addr(1), addr(2)], &[-1]).unwrap();
        assert_eq!(&encoded[20..23], &[0xFF, 0xFF, 0xFF]);
        let (_, spacings) = decode_path(&encoded).unwrap();
        assert_eq!(spacings, vec![-1]);

        let edge = encode_path(&[addr(1), addr(2)], &[-(1 << 23)]).unwrap();
        assert_eq!(&edge[20..23], &[0x80, 0x00, 0x00]);
        assert_eq!(decode_path(&edge).unwrap().1, vec![-(1 << 23)]);

        assert!(encode_path(&[addr(1), addr(2)], &[1 << 23]).is_err());
    }

    #[test]
    fn test_path_shape_errors() {
        assert!(encode_path(&[addr(1)], &[]).is_err());
        assert!(encode_path(&[addr(1), addr(2)], &[1, 2]).is_err());
        assert!(decode_path(&[0u8; 20]).is_err());
        assert!(decode_path(&[0u8; 44]).is_err());
    }

    #[test]
    fn test_quote_call_layout() {
        let path = encode_path(&[addr(0xAA), addr(0xBB)], &[200]).unwrap();
        let call = encode_quote_call(&path, U256::from(1_000u64));

        // quoteExactInput(bytes,uint256)
        assert_eq!(&call[..4], &[0xcd, 0xca, 0x17, 0x53]);
        let body = &call[4..];
        // head: offset of bytes (0x40), amountIn
        assert_eq!(U256::from_big_endian(&body[0..32]), U256::from(0x40));
        assert_eq!(U256::from_big_endian(&body[32..64]), U256::from(1_000u64));
        // tail: length, then path padded to a word boundary
        assert_eq!(U256::from_big_endian(&body[64..96]), U256::from(43));
        assert_eq!(&body[96..139], path.as_ref());
        assert!(body[139..160].iter().all(|b| *b == 0));
        assert_eq!(body.len(), 160);
    }

    #[test]
    fn test_quote_response_decoding() {
        let mut reply = vec![0u8; 128];
        reply[31] = 150;
        reply[127] = 90;
        let decoded = decode_quote_response(Some(&reply)).unwrap();
        assert_eq!(decoded.amount_out, U256::from(150));
        assert_eq!(decoded.gas_estimate, Some(U256::from(90)));

        let short_word = decode_quote_response(Some(&reply[..32])).unwrap();
        assert_eq!(short_word.gas_estimate, None);

        assert!(decode_quote_response(Some(&reply[..31])).is_err());
        assert!(decode_quote_response(None).is_err());
    }
}
