//! Paths empacotados dos routers de liquidez concentrada.
//!
//! Uniswap V3: `token(20) | fee(3) | token(20) | ...`
//! Algebra:    `token(20) | token(20) | ...`

use ethereum_types::Address;
use sandwich_core::{Error, Result};

const ADDRESS_LEN: usize = 20;
const FEE_LEN: usize = 3;

/// Decodifica um path empacotado em tokens e tiers de taxa
pub fn decode_packed_path(raw: &[u8], with_fees: bool) -> Result<(Vec<Address>, Vec<u32>)> {
    let step = if with_fees { ADDRESS_LEN + FEE_LEN } else { ADDRESS_LEN };
    if raw.len() < ADDRESS_LEN * 2 || (raw.len() - ADDRESS_LEN) % step != 0 {
        return Err(Error::DecodeError(format!("packed path with invalid length {}", raw.len())));
    }

    let hops = (raw.len() - ADDRESS_LEN) / step;
    let mut tokens = Vec::with_capacity(hops + 1);
    let mut fees = Vec::with_capacity(hops);
    let mut offset = 0;
    tokens.push(Address::from_slice(&raw[..ADDRESS_LEN]));
    offset += ADDRESS_LEN;
    for _ in 0..hops {
        if with_fees {
            let f = &raw[offset..offset + FEE_LEN];
            fees.push(u32::from_be_bytes([0, f[0], f[1], f[2]]));
            offset += FEE_LEN;
        }
        tokens.push(Address::from_slice(&raw[offset..offset + ADDRESS_LEN]));
        offset += ADDRESS_LEN;
    }
    Ok((tokens, fees))
}

/// Empacota tokens e tiers; `fees` vazio gera o formato Algebra
pub fn encode_packed_path(tokens: &[Address], fees: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tokens.len() * (ADDRESS_LEN + FEE_LEN));
    for (i, token) in tokens.iter().enumerate() {
        out.extend_from_slice(token.as_bytes());
        if let Some(fee) = fees.get(i).filter(|_| i + 1 < tokens.len()) {
            out.extend_from_slice(&fee.to_be_bytes()[1..]);
        }
    }
    out
}
